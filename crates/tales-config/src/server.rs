use std::time::Duration;

use serde::Deserialize;
use url::Url;

/// Where the AudioTales web app lives and how to talk to it
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Base URL of the web app serving `/api/*`
    #[serde(default = "default_base_url")]
    pub base_url: Url,
    /// Per-request timeout (e.g. "30s"); generation streams are exempt
    #[serde(default = "default_request_timeout")]
    pub request_timeout: String,
    /// Extra attempts for story fetches after the first one fails
    #[serde(default = "default_retries")]
    pub retries: u32,
    /// Pause between story fetch attempts (e.g. "1s")
    #[serde(default = "default_retry_delay")]
    pub retry_delay: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout: default_request_timeout(),
            retries: default_retries(),
            retry_delay: default_retry_delay(),
        }
    }
}

impl ServerConfig {
    /// Parsed request timeout
    ///
    /// # Errors
    ///
    /// Returns an error if the value is not a duration string
    pub fn request_timeout(&self) -> anyhow::Result<Duration> {
        crate::parse_duration("server.request_timeout", &self.request_timeout)
    }

    /// Parsed delay between story fetch attempts
    ///
    /// # Errors
    ///
    /// Returns an error if the value is not a duration string
    pub fn retry_delay(&self) -> anyhow::Result<Duration> {
        crate::parse_duration("server.retry_delay", &self.retry_delay)
    }
}

fn default_base_url() -> Url {
    Url::parse("http://localhost:3000").expect("default base URL is valid")
}

fn default_request_timeout() -> String {
    "30s".to_owned()
}

const fn default_retries() -> u32 {
    3
}

fn default_retry_delay() -> String {
    "1s".to_owned()
}
