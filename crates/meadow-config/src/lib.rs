//! Configuration system for the meadow impostor runtime.
//!
//! Provides runtime-configurable settings that persist to disk as RON files.
//! Supports CLI overrides via clap, hot-reload detection, and forward/backward
//! compatible serialization. Every section defaults field by field, so a
//! partially written `config.ron` is always valid.

mod cli;
mod config;
mod error;

pub use cli::CliArgs;
pub use config::{
    BillboardConfig, BoothConfig, Config, DebugConfig, DemoConfig, HerdConfig, ImpostorConfig,
    default_config_dir,
};
pub use error::ConfigError;
pub use meadow_octant::BearingConvention;
