//! Shader parameter contract for impostor materials.
//!
//! Any renderer that wants to display impostors must expose these
//! bindings. The clean variant uses the two color slots and the blend
//! amount; the parallax variant adds the paired depth slots and the
//! three ray-march parameters.

use meadow_config::ImpostorConfig;

/// Shader family a material instance is built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderVariant {
    /// Unlit two-texture blend.
    Clean,
    /// Unlit blend with depth-driven parallax offset.
    Parallax,
}

impl ShaderVariant {
    #[must_use]
    pub const fn shader_name(self) -> &'static str {
        match self {
            ShaderVariant::Clean => "Meadow/ImpostorClean",
            ShaderVariant::Parallax => "Meadow/ImpostorParallax",
        }
    }

    #[must_use]
    pub const fn uses_depth(self) -> bool {
        matches!(self, ShaderVariant::Parallax)
    }
}

/// Texture bindings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureSlot {
    Main,
    Blend,
    MainDepth,
    BlendDepth,
}

impl TextureSlot {
    pub const ALL: [TextureSlot; 4] = [
        TextureSlot::Main,
        TextureSlot::Blend,
        TextureSlot::MainDepth,
        TextureSlot::BlendDepth,
    ];

    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    #[must_use]
    pub const fn binding_name(self) -> &'static str {
        match self {
            TextureSlot::Main => "_MainTex",
            TextureSlot::Blend => "_BlendTex",
            TextureSlot::MainDepth => "_DepthTex",
            TextureSlot::BlendDepth => "_BlendDepthTex",
        }
    }

    /// Depth slots only accept depth targets.
    #[must_use]
    pub const fn is_depth(self) -> bool {
        matches!(self, TextureSlot::MainDepth | TextureSlot::BlendDepth)
    }
}

/// Scalar bindings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FloatParam {
    BlendAmount,
    ParallaxStrength,
    ParallaxMinSamples,
    ParallaxMaxSamples,
}

impl FloatParam {
    pub const ALL: [FloatParam; 4] = [
        FloatParam::BlendAmount,
        FloatParam::ParallaxStrength,
        FloatParam::ParallaxMinSamples,
        FloatParam::ParallaxMaxSamples,
    ];

    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    #[must_use]
    pub const fn binding_name(self) -> &'static str {
        match self {
            FloatParam::BlendAmount => "_BlendAmount",
            FloatParam::ParallaxStrength => "_ParallaxStrength",
            FloatParam::ParallaxMinSamples => "_ParallaxMinSamples",
            FloatParam::ParallaxMaxSamples => "_ParallaxMaxSamples",
        }
    }

    /// Value a fresh material starts with.
    #[must_use]
    pub const fn default_value(self) -> f32 {
        match self {
            FloatParam::BlendAmount => 0.0,
            FloatParam::ParallaxStrength => 0.03,
            FloatParam::ParallaxMinSamples => 8.0,
            FloatParam::ParallaxMaxSamples => 32.0,
        }
    }
}

/// Scalar values a material needs for the given impostor configuration.
#[must_use]
pub fn parallax_params(config: &ImpostorConfig) -> [(FloatParam, f32); 3] {
    [
        (FloatParam::ParallaxStrength, config.parallax_strength),
        (FloatParam::ParallaxMinSamples, config.parallax_min_samples as f32),
        (FloatParam::ParallaxMaxSamples, config.parallax_max_samples as f32),
    ]
}
