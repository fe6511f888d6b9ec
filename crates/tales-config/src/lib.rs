#![allow(clippy::must_use_candidate)]

mod env;
pub mod generation;
mod loader;
pub mod playback;
pub mod server;
pub mod telemetry;

use std::time::Duration;

use serde::Deserialize;

pub use generation::{GenerationConfig, PAGE_RANGE};
pub use playback::PlaybackConfig;
pub use server::ServerConfig;
pub use telemetry::{LogFormat, TelemetryConfig};

/// Default config file name, looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "audiotales.toml";

/// Top-level AudioTales configuration
///
/// Every section has defaults, so an empty file is a valid configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub playback: PlaybackConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Parse a human duration such as "1s" or "250ms", naming the key on failure
fn parse_duration(key: &str, value: &str) -> anyhow::Result<Duration> {
    duration_str::parse(value).map_err(|e| anyhow::anyhow!("invalid duration for {key} '{value}': {e}"))
}
