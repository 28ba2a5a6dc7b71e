//! Configuration structs with sensible defaults and RON persistence.

use std::path::{Path, PathBuf};

use meadow_octant::BearingConvention;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Top-level runtime configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Shared capture rig settings.
    pub booth: BoothConfig,
    /// Defaults for statically placed impostors.
    pub impostor: ImpostorConfig,
    /// Spawner/AI population settings.
    pub herd: HerdConfig,
    /// Headless demo driver settings.
    pub demo: DemoConfig,
    /// Debug/development settings.
    pub debug: DebugConfig,
}

/// Capture booth configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BoothConfig {
    /// World position of the capture zone, far from the playable area.
    pub position: [f32; 3],
    /// Where hidden mesh clones wait between captures.
    pub park_position: [f32; 3],
    /// Render layer reserved for captures (0..32).
    pub layer: u32,
    /// Perspective projection; orthographic when false.
    pub use_perspective: bool,
    /// Vertical field of view in degrees.
    pub field_of_view: f32,
    /// Edge length of every render target in texels.
    pub render_target_size: u32,
    /// Padding around the mesh bounds.
    pub padding_multiplier: f32,
    /// Lower clamp for the orthographic half-extent.
    pub min_ortho_size: f32,
    /// Upper clamp for the orthographic half-extent.
    pub max_ortho_size: f32,
    /// Scales the computed camera distance.
    pub camera_distance_multiplier: f32,
    /// Eye height above the mesh pivot.
    pub camera_height: f32,
    /// Look-at point as a fraction of the bounds height.
    pub look_at_height_ratio: f32,
    /// Near clip plane.
    pub near_plane: f32,
    /// Far clip plane.
    pub far_plane: f32,
    /// Clear color (RGBA, linear). Alpha 0 keeps the background transparent.
    pub background: [f32; 4],
    /// Serve a request immediately when the booth is idle. When false the
    /// caller pumps the queue once per frame.
    pub drain_on_submit: bool,
}

/// Per-entity impostor configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ImpostorConfig {
    /// Source mesh is animated; recapture at `target_fps`.
    pub is_animated: bool,
    /// Recapture rate for animated meshes (1..=60).
    pub target_fps: u32,
    /// Recapture interval in seconds for static meshes.
    pub static_interval_s: f32,
    /// Capture scale multiplier (0.5..=3).
    pub capture_scale: f32,
    /// Euler rotation (degrees) applied to the mesh while it is captured.
    pub mesh_rotation_offset: [f32; 3],
    /// Measure octants against the parent's facing instead of world North.
    pub follow_parent_rotation: bool,
    /// Extra yaw (degrees) applied to the parent's forward axis.
    pub facing_correction_deg: f32,
    /// Which way the impostor/viewer vector points.
    pub bearing: BearingConvention,
    /// Blend between the two nearest octants.
    pub use_blending: bool,
    /// Blend only within this distance; `<= 0` blends at any distance.
    pub blend_distance: f32,
    /// Capture paired depth targets and use the parallax shader.
    pub use_parallax: bool,
    /// Parallax offset strength (0..=0.1).
    pub parallax_strength: f32,
    /// Minimum parallax ray-march samples.
    pub parallax_min_samples: u32,
    /// Maximum parallax ray-march samples.
    pub parallax_max_samples: u32,
    /// Eye height override; negative uses the booth default.
    pub camera_height: f32,
    /// Look-at ratio override; negative uses the booth default.
    pub look_at_ratio: f32,
    /// Field of view override; non-positive uses the booth default.
    pub field_of_view: f32,
    /// Distance multiplier override; non-positive uses the booth default.
    pub distance_multiplier: f32,
    /// Derive the quad scale from the mesh bounds at spawn.
    pub auto_quad_scale: bool,
    /// Multiplier applied to the derived or manual quad size.
    pub quad_scale_multiplier: f32,
    /// Manual quad size; zero on both axes derives it from bounds.
    pub quad_manual_size: [f32; 2],
    /// Generate a box collider for the quad.
    pub auto_generate_collider: bool,
    /// Regenerate the collider after every capture.
    pub dynamic_collider: bool,
    /// Manual collider size; zero derives it from the quad.
    pub collider_size: [f32; 3],
    /// Manual collider center.
    pub collider_center: [f32; 3],
    /// Snap the spawn position onto the ground.
    pub snap_to_ground: bool,
    /// Height added after snapping.
    pub ground_offset: f32,
    /// Layers considered ground.
    pub ground_layers: u32,
}

/// Billboard facing configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BillboardConfig {
    /// Rotate only around the vertical axis.
    pub lock_to_y_axis: bool,
    /// Ease towards the target rotation instead of snapping.
    pub smooth_rotation: bool,
    /// Easing rate (per second).
    pub rotation_speed: f32,
    /// Changes smaller than this (degrees) are ignored.
    pub dead_zone_deg: f32,
}

/// Spawner/AI population configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HerdConfig {
    /// Number of entities to spawn.
    pub count: u32,
    /// Center of the wander zone.
    pub zone_center: [f32; 3],
    /// Wander zone extent on X and Z.
    pub zone_size: [f32; 2],
    /// Walk speed in units per second.
    pub move_speed: f32,
    /// Turn speed in degrees per second.
    pub rotation_speed_deg: f32,
    /// Shortest idle pause in seconds.
    pub wait_time_min: f32,
    /// Longest idle pause in seconds.
    pub wait_time_max: f32,
    /// Distance at which a waypoint counts as reached.
    pub arrival_tolerance: f32,
    /// Prefix of spawned entity names.
    pub name_prefix: String,
    /// Probe the walking direction to detect the mesh's authored forward.
    pub auto_detect_orientation: bool,
    /// Billboard settings copied onto each member.
    pub billboard: BillboardConfig,
    /// Impostor template copied onto each member.
    pub template: ImpostorConfig,
}

/// Headless demo configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DemoConfig {
    /// Frames to simulate.
    pub frames: u32,
    /// Simulation rate in Hz.
    pub tick_rate: u32,
    /// RNG seed for spawn positions and wandering.
    pub seed: u64,
    /// Radius of the viewer's orbit around the zone center.
    pub viewer_orbit_radius: f32,
    /// Viewer angular speed in degrees per second.
    pub viewer_orbit_speed_deg: f32,
}

/// Debug/development configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    /// Log the backend accounting every N frames (0 disables).
    pub accounting_interval: u32,
    /// Record every backend call in the headless event log.
    pub record_backend_events: bool,
    /// Log level override (e.g., "debug", "info", "warn").
    pub log_level: String,
}

// --- Default implementations ---

impl Default for BoothConfig {
    fn default() -> Self {
        Self {
            position: [10_000.0, 10_000.0, 10_000.0],
            park_position: [10_000.0, 10_000.0, 10_000.0],
            layer: 7,
            use_perspective: true,
            field_of_view: 60.0,
            render_target_size: 256,
            padding_multiplier: 1.2,
            min_ortho_size: 1.0,
            max_ortho_size: 50.0,
            camera_distance_multiplier: 1.5,
            camera_height: 1.7,
            look_at_height_ratio: 0.4,
            near_plane: 0.3,
            far_plane: 1000.0,
            background: [0.0, 0.0, 1.0, 0.0],
            drain_on_submit: true,
        }
    }
}

impl Default for ImpostorConfig {
    fn default() -> Self {
        Self {
            is_animated: false,
            target_fps: 15,
            static_interval_s: 1.0,
            capture_scale: 1.0,
            mesh_rotation_offset: [0.0, 0.0, 0.0],
            follow_parent_rotation: true,
            facing_correction_deg: 0.0,
            bearing: BearingConvention::default(),
            use_blending: true,
            blend_distance: 50.0,
            use_parallax: true,
            parallax_strength: 0.03,
            parallax_min_samples: 8,
            parallax_max_samples: 32,
            camera_height: -1.0,
            look_at_ratio: -1.0,
            field_of_view: -1.0,
            distance_multiplier: -1.0,
            auto_quad_scale: true,
            quad_scale_multiplier: 1.0,
            quad_manual_size: [0.0, 0.0],
            auto_generate_collider: true,
            dynamic_collider: false,
            collider_size: [0.0, 0.0, 0.0],
            collider_center: [0.0, 0.0, 0.0],
            snap_to_ground: true,
            ground_offset: 0.0,
            ground_layers: u32::MAX,
        }
    }
}

impl Default for BillboardConfig {
    fn default() -> Self {
        Self {
            lock_to_y_axis: true,
            smooth_rotation: true,
            rotation_speed: 8.0,
            dead_zone_deg: 8.0,
        }
    }
}

impl Default for HerdConfig {
    fn default() -> Self {
        Self {
            count: 10,
            zone_center: [0.0, 0.0, 0.0],
            zone_size: [50.0, 50.0],
            move_speed: 2.0,
            rotation_speed_deg: 360.0,
            wait_time_min: 1.0,
            wait_time_max: 3.0,
            arrival_tolerance: 0.2,
            name_prefix: "Cow".to_string(),
            auto_detect_orientation: false,
            billboard: BillboardConfig::default(),
            template: ImpostorConfig {
                is_animated: true,
                ..ImpostorConfig::default()
            },
        }
    }
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            frames: 600,
            tick_rate: 60,
            seed: 0x6d65_6164,
            viewer_orbit_radius: 40.0,
            viewer_orbit_speed_deg: 12.0,
        }
    }
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            accounting_interval: 120,
            record_backend_events: false,
            log_level: "info".to_string(),
        }
    }
}

// --- Validation ---

impl ImpostorConfig {
    /// Returns a copy with every numeric option clamped into its legal range.
    #[must_use]
    pub fn validated(&self) -> Self {
        let min_samples = self.parallax_min_samples.clamp(4, 32);
        Self {
            target_fps: self.target_fps.clamp(1, 60),
            static_interval_s: self.static_interval_s.max(0.05),
            capture_scale: self.capture_scale.clamp(0.5, 3.0),
            parallax_strength: self.parallax_strength.clamp(0.0, 0.1),
            parallax_min_samples: min_samples,
            parallax_max_samples: self.parallax_max_samples.clamp(min_samples, 64),
            quad_scale_multiplier: self.quad_scale_multiplier.max(0.0),
            ..self.clone()
        }
    }

    /// Seconds between captures for the current animation mode.
    #[must_use]
    pub fn capture_interval_s(&self) -> f64 {
        if self.is_animated {
            1.0 / f64::from(self.target_fps.clamp(1, 60))
        } else {
            f64::from(self.static_interval_s.max(0.05))
        }
    }
}

impl HerdConfig {
    /// Wait range with `min <= max` and both non-negative.
    #[must_use]
    pub fn wait_range(&self) -> (f32, f32) {
        let lo = self.wait_time_min.max(0.0);
        let hi = self.wait_time_max.max(0.0);
        if lo <= hi { (lo, hi) } else { (hi, lo) }
    }
}

/// Platform default directory for `config.ron`.
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("meadow")
}

// --- Load / Save / Reload ---

const CONFIG_FILE: &str = "config.ron";

fn read_config(path: &Path) -> Result<Config, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    ron::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

impl Config {
    /// Load config from the given directory, or create a default config file.
    pub fn load_or_create(config_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = config_dir.join(CONFIG_FILE);

        if config_path.exists() {
            let config = read_config(&config_path)?;
            log::info!("Loaded config from {}", config_path.display());
            Ok(config)
        } else {
            let config = Config::default();
            config.save(config_dir)?;
            log::info!("Created default config at {}", config_path.display());
            Ok(config)
        }
    }

    /// Save config to the given directory as `config.ron`.
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        let config_path = config_dir.join(CONFIG_FILE);
        let write_error = |source: std::io::Error| ConfigError::Write {
            path: config_path.clone(),
            source,
        };
        std::fs::create_dir_all(config_dir).map_err(write_error)?;

        let pretty = ron::ser::PrettyConfig::new()
            .depth_limit(4)
            .separate_tuple_members(false)
            .enumerate_arrays(false);

        let serialized =
            ron::ser::to_string_pretty(self, pretty).map_err(ConfigError::Serialize)?;

        std::fs::write(&config_path, serialized).map_err(write_error)?;
        Ok(())
    }

    /// Hot-reload: returns `Some(new_config)` if the file changed, `None` otherwise.
    pub fn reload(&self, config_dir: &Path) -> Result<Option<Self>, ConfigError> {
        let new_config = read_config(&config_dir.join(CONFIG_FILE))?;

        if &new_config != self {
            log::info!("Config reloaded with changes");
            Ok(Some(new_config))
        } else {
            Ok(None)
        }
    }

    /// Reports the first value the runtime would clamp.
    ///
    /// Loading never fails on these; callers decide whether to warn.
    pub fn check(&self) -> Result<(), ConfigError> {
        self.impostor.check("impostor")?;
        self.herd.template.check("herd.template")?;
        if self.booth.render_target_size == 0 {
            return Err(out_of_range("booth.render_target_size", 0, ">= 1"));
        }
        if self.booth.layer >= 32 {
            return Err(out_of_range("booth.layer", self.booth.layer, "0..=31"));
        }
        Ok(())
    }
}

fn out_of_range(field: impl Into<String>, value: impl ToString, expected: &'static str) -> ConfigError {
    ConfigError::OutOfRange {
        field: field.into(),
        value: value.to_string(),
        expected,
    }
}

impl ImpostorConfig {
    fn check(&self, section: &str) -> Result<(), ConfigError> {
        let field = |name: &str| format!("{section}.{name}");
        if !(1..=60).contains(&self.target_fps) {
            return Err(out_of_range(field("target_fps"), self.target_fps, "1..=60"));
        }
        if !(0.5..=3.0).contains(&self.capture_scale) {
            return Err(out_of_range(field("capture_scale"), self.capture_scale, "0.5..=3"));
        }
        if self.static_interval_s < 0.05 {
            return Err(out_of_range(
                field("static_interval_s"),
                self.static_interval_s,
                ">= 0.05",
            ));
        }
        if !(0.0..=0.1).contains(&self.parallax_strength) {
            return Err(out_of_range(
                field("parallax_strength"),
                self.parallax_strength,
                "0..=0.1",
            ));
        }
        if !(4..=32).contains(&self.parallax_min_samples) {
            return Err(out_of_range(
                field("parallax_min_samples"),
                self.parallax_min_samples,
                "4..=32",
            ));
        }
        if !(self.parallax_min_samples..=64).contains(&self.parallax_max_samples) {
            return Err(out_of_range(
                field("parallax_max_samples"),
                self.parallax_max_samples,
                "min samples..=64",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_serializes() {
        let config = Config::default();
        let ron_str =
            ron::ser::to_string_pretty(&config, ron::ser::PrettyConfig::new().depth_limit(4))
                .unwrap();
        assert!(ron_str.contains("render_target_size: 256"));
        assert!(ron_str.contains("blend_distance: 50.0"));
        assert!(ron_str.contains("ViewerFromImpostor"));
    }

    #[test]
    fn test_config_roundtrip() {
        let config = Config::default();
        let ron_str = ron::to_string(&config).unwrap();
        let deserialized: Config = ron::from_str(&ron_str).unwrap();
        assert_eq!(config, deserialized);
    }

    #[test]
    fn test_missing_section_uses_default() {
        let ron_str = "(booth: (layer: 9), debug: ())";
        let config: Config = ron::from_str(ron_str).unwrap();
        assert_eq!(config.booth.layer, 9);
        assert_eq!(config.booth.render_target_size, 256);
        assert_eq!(config.herd, HerdConfig::default());
    }

    #[test]
    fn test_extra_field_ignored() {
        let ron_str = "(future_setting: true, impostor: (shiny: false))";
        let result: Result<Config, _> = ron::from_str(ron_str);
        assert!(result.is_ok());
    }

    #[test]
    fn test_bearing_convention_parses() {
        let ron_str = "(impostor: (bearing: ImpostorFromViewer))";
        let config: Config = ron::from_str(ron_str).unwrap();
        assert_eq!(config.impostor.bearing, BearingConvention::ImpostorFromViewer);
    }

    #[test]
    fn test_herd_template_is_animated() {
        let herd = HerdConfig::default();
        assert!(herd.template.is_animated);
        assert!(!ImpostorConfig::default().is_animated);
    }

    #[test]
    fn test_validated_clamps_ranges() {
        let raw = ImpostorConfig {
            target_fps: 240,
            capture_scale: 12.0,
            parallax_strength: 1.0,
            parallax_min_samples: 1,
            parallax_max_samples: 2,
            static_interval_s: 0.0,
            ..ImpostorConfig::default()
        };
        let v = raw.validated();
        assert_eq!(v.target_fps, 60);
        assert_eq!(v.capture_scale, 3.0);
        assert_eq!(v.parallax_strength, 0.1);
        assert_eq!(v.parallax_min_samples, 4);
        assert_eq!(v.parallax_max_samples, 4);
        assert_eq!(v.static_interval_s, 0.05);
    }

    #[test]
    fn test_capture_interval() {
        let mut cfg = ImpostorConfig::default();
        assert_eq!(cfg.capture_interval_s(), 1.0);
        cfg.is_animated = true;
        cfg.target_fps = 20;
        assert!((cfg.capture_interval_s() - 0.05).abs() < 1e-9);
        cfg.target_fps = 0;
        assert_eq!(cfg.capture_interval_s(), 1.0);
    }

    #[test]
    fn test_wait_range_is_ordered() {
        let herd = HerdConfig {
            wait_time_min: 4.0,
            wait_time_max: 2.0,
            ..HerdConfig::default()
        };
        assert_eq!(herd.wait_range(), (2.0, 4.0));
    }

    #[test]
    fn test_default_config_dir_ends_with_meadow() {
        assert!(default_config_dir().ends_with("meadow"));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.herd.count = 42;
        config.booth.use_perspective = false;
        config.impostor.mesh_rotation_offset = [0.0, 180.0, 0.0];

        config.save(dir.path()).unwrap();
        let loaded = Config::load_or_create(dir.path()).unwrap();
        assert_eq!(config, loaded);
    }

    #[test]
    fn test_load_or_create_writes_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_or_create(dir.path()).unwrap();
        assert_eq!(config, Config::default());
        assert!(dir.path().join("config.ron").exists());
    }

    #[test]
    fn test_reload_detects_changes() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default();
        config.save(dir.path()).unwrap();

        let mut modified = config.clone();
        modified.booth.render_target_size = 512;
        modified.save(dir.path()).unwrap();

        let result = config.reload(dir.path()).unwrap();
        assert_eq!(result.unwrap().booth.render_target_size, 512);
    }

    #[test]
    fn test_reload_no_changes() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default();
        config.save(dir.path()).unwrap();

        let result = config.reload(dir.path()).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_default_config_passes_check() {
        assert!(Config::default().check().is_ok());
    }

    #[test]
    fn test_check_names_out_of_range_field() {
        let mut config = Config::default();
        config.herd.template.target_fps = 120;
        let err = config.check().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::OutOfRange { ref field, ref value, .. }
                if field == "herd.template.target_fps" && value == "120"
        ));
        assert!(err.to_string().contains("1..=60"));
        // The clamp agrees with the report.
        assert_eq!(config.herd.template.validated().target_fps, 60);
    }

    #[test]
    fn test_reload_missing_file_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let result = Config::default().reload(dir.path());
        assert!(matches!(result, Err(ConfigError::Read { ref path, .. }) if path.ends_with("config.ron")));
    }

    #[test]
    fn test_invalid_ron_produces_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("config.ron"), "{{not valid}}").unwrap();
        let result = Config::load_or_create(dir.path());
        assert!(matches!(
            result,
            Err(ConfigError::Parse { ref path, .. }) if path.ends_with("config.ron")
        ));
    }
}
