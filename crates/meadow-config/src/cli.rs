//! Command-line argument parsing for the meadow demo driver.

use std::path::PathBuf;

use clap::Parser;

use crate::Config;

/// Meadow command-line arguments.
///
/// CLI values override settings loaded from `config.ron`.
#[derive(Parser, Debug, Default)]
#[command(name = "meadow", about = "Directional impostor herd simulation")]
pub struct CliArgs {
    /// Number of impostor entities to spawn.
    #[arg(long)]
    pub count: Option<u32>,

    /// Frames to simulate before exiting.
    #[arg(long)]
    pub frames: Option<u32>,

    /// RNG seed for spawn placement and wandering.
    #[arg(long)]
    pub seed: Option<u64>,

    /// Render target edge length in texels.
    #[arg(long)]
    pub target_size: Option<u32>,

    /// Capture paired depth targets for parallax.
    #[arg(long)]
    pub parallax: Option<bool>,

    /// Blend between neighbouring octants.
    #[arg(long)]
    pub blending: Option<bool>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Path to config directory (overrides default location).
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Capture with the wgpu backend instead of the CPU rasterizer.
    #[arg(long)]
    pub gpu: bool,
}

impl Config {
    /// Apply CLI overrides to a loaded config.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(count) = args.count {
            self.herd.count = count;
        }
        if let Some(frames) = args.frames {
            self.demo.frames = frames;
        }
        if let Some(seed) = args.seed {
            self.demo.seed = seed;
        }
        if let Some(size) = args.target_size {
            self.booth.render_target_size = size;
        }
        if let Some(parallax) = args.parallax {
            self.herd.template.use_parallax = parallax;
            self.impostor.use_parallax = parallax;
        }
        if let Some(blending) = args.blending {
            self.herd.template.use_blending = blending;
            self.impostor.use_blending = blending;
        }
        if let Some(ref level) = args.log_level {
            self.debug.log_level = level.clone();
        }
    }
}
