use std::time::Duration;

use serde::Deserialize;

/// Narration playback tunables
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlaybackConfig {
    /// Bound on waiting for readiness and playback start (e.g. "1s")
    #[serde(default = "default_ready_timeout")]
    pub ready_timeout: String,
    /// Number of upcoming pages kept warm
    #[serde(default = "default_preload_depth")]
    pub preload_depth: usize,
    /// Narrator voice used for speech synthesis
    #[serde(default = "default_voice")]
    pub default_voice: String,
    /// Narration speed, 0.25 to 4.0
    #[serde(default = "default_speed")]
    pub speed: f64,
    /// Warm page N+1 while page N plays
    #[serde(default = "default_preload_next")]
    pub preload_next: bool,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            ready_timeout: default_ready_timeout(),
            preload_depth: default_preload_depth(),
            default_voice: default_voice(),
            speed: default_speed(),
            preload_next: default_preload_next(),
        }
    }
}

impl PlaybackConfig {
    /// Parsed readiness bound
    ///
    /// # Errors
    ///
    /// Returns an error if the value is not a duration string
    pub fn ready_timeout(&self) -> anyhow::Result<Duration> {
        crate::parse_duration("playback.ready_timeout", &self.ready_timeout)
    }
}

fn default_ready_timeout() -> String {
    "1s".to_owned()
}

const fn default_preload_depth() -> usize {
    tales_narration::DEFAULT_PRELOAD_DEPTH
}

fn default_voice() -> String {
    tales_narration::DEFAULT_VOICE.to_owned()
}

const fn default_speed() -> f64 {
    1.0
}

const fn default_preload_next() -> bool {
    true
}
