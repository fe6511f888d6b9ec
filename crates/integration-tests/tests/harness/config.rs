//! Programmatic configuration builder for integration tests

use tales_client::TalesClient;
use tales_config::Config;

/// Builder for constructing test configurations
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder with defaults and fast retries
    pub fn new(base_url: &str) -> Self {
        let mut config = Config::default();
        config.server.base_url = base_url.parse().expect("mock URL is valid");
        config.server.retry_delay = "10ms".to_owned();
        config.server.request_timeout = "5s".to_owned();
        config.playback.ready_timeout = "200ms".to_owned();

        Self { config }
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.config.server.retries = retries;
        self
    }

    pub fn with_voice(mut self, voice: &str) -> Self {
        self.config.playback.default_voice = voice.to_owned();
        self
    }

    /// Validate and return the configuration
    pub fn build(self) -> Config {
        self.config.validate().expect("test configuration is valid");
        self.config
    }
}

/// Client configured the way the CLI configures it
pub fn client(config: &Config) -> TalesClient {
    TalesClient::from_url(config.server.base_url.clone())
        .unwrap()
        .with_retries(config.server.retries, config.server.retry_delay().unwrap())
        .with_request_timeout(config.server.request_timeout().unwrap())
}
