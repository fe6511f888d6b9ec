use std::path::Path;

use tales_narration::{AVAILABLE_VOICES, is_supported_speed, is_supported_voice};

use crate::Config;
use crate::generation::PAGE_RANGE;

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Reads the file, expands `{{ env.VAR }}` placeholders, then
    /// deserializes and validates the result.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, a placeholder cannot be
    /// expanded, the TOML is invalid, or validation fails
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read config file {}: {e}", path.display()))?;

        Self::parse(&raw)
    }

    /// Load `path` if it exists, otherwise fall back to defaults
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be loaded
    pub fn load_or_default(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Parse configuration from TOML text
    ///
    /// # Errors
    ///
    /// Returns an error if a placeholder cannot be expanded, the TOML is
    /// invalid, or validation fails
    pub fn parse(raw: &str) -> anyhow::Result<Self> {
        let expanded =
            crate::env::expand_env(raw).map_err(|e| anyhow::anyhow!("config variable expansion failed: {e}"))?;

        let config: Self = toml::from_str(&expanded).map_err(|e| anyhow::anyhow!("failed to parse config: {e}"))?;

        config.validate()?;

        Ok(config)
    }

    /// Validate that the configuration is internally consistent
    ///
    /// # Errors
    ///
    /// Returns an error describing the first invalid setting
    pub fn validate(&self) -> anyhow::Result<()> {
        self.validate_server()?;
        self.validate_playback()?;
        self.validate_generation()?;
        Ok(())
    }

    fn validate_server(&self) -> anyhow::Result<()> {
        let scheme = self.server.base_url.scheme();
        if scheme != "http" && scheme != "https" {
            anyhow::bail!("server.base_url must be an http(s) URL, got scheme '{scheme}'");
        }

        if self.server.request_timeout()?.is_zero() {
            anyhow::bail!("server.request_timeout must be greater than 0");
        }
        self.server.retry_delay()?;

        Ok(())
    }

    fn validate_playback(&self) -> anyhow::Result<()> {
        let playback = &self.playback;

        if playback.ready_timeout()?.is_zero() {
            anyhow::bail!("playback.ready_timeout must be greater than 0");
        }

        if playback.preload_depth == 0 {
            anyhow::bail!("playback.preload_depth must be at least 1");
        }

        if !is_supported_speed(playback.speed) {
            anyhow::bail!("playback.speed must be between 0.25 and 4.0, got {}", playback.speed);
        }

        if !is_supported_voice(&playback.default_voice) {
            anyhow::bail!(
                "playback.default_voice '{}' is not one of: {}",
                playback.default_voice,
                AVAILABLE_VOICES.join(", ")
            );
        }

        Ok(())
    }

    fn validate_generation(&self) -> anyhow::Result<()> {
        if !PAGE_RANGE.contains(&self.generation.pages) {
            anyhow::bail!(
                "generation.pages must be between {} and {}, got {}",
                PAGE_RANGE.start(),
                PAGE_RANGE.end(),
                self.generation.pages
            );
        }

        if self.generation.stories_path.trim().is_empty() {
            anyhow::bail!("generation.stories_path must not be empty");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;
    use std::time::Duration;

    use tales_stream::Framing;

    use crate::{Config, LogFormat};

    #[test]
    fn empty_file_uses_defaults() {
        let config = Config::parse("").unwrap();

        assert_eq!(config.server.base_url.as_str(), "http://localhost:3000/");
        assert_eq!(config.server.retries, 3);
        assert_eq!(config.server.retry_delay().unwrap(), Duration::from_secs(1));
        assert_eq!(config.playback.ready_timeout().unwrap(), Duration::from_secs(1));
        assert_eq!(config.playback.preload_depth, 2);
        assert_eq!(config.playback.default_voice, "nova");
        assert!(config.playback.preload_next);
        assert_eq!(config.generation.framing, Framing::Auto);
        assert_eq!(config.generation.pages, 5);
        assert_eq!(config.telemetry.format, LogFormat::Text);
    }

    #[test]
    fn full_file() {
        let config = Config::parse(
            r#"
            [server]
            base_url = "https://tales.example.com"
            request_timeout = "10s"
            retries = 5
            retry_delay = "250ms"

            [playback]
            ready_timeout = "500ms"
            preload_depth = 3
            default_voice = "fable"
            speed = 1.25
            preload_next = false

            [generation]
            framing = "data"
            stories_path = "stories"
            pages = 8

            [telemetry]
            filter = "audiotales=debug"
            format = "json"
            "#,
        )
        .unwrap();

        assert_eq!(config.server.request_timeout().unwrap(), Duration::from_secs(10));
        assert_eq!(config.server.retry_delay().unwrap(), Duration::from_millis(250));
        assert_eq!(config.playback.ready_timeout().unwrap(), Duration::from_millis(500));
        assert_eq!(config.playback.preload_depth, 3);
        assert!(!config.playback.preload_next);
        assert_eq!(config.generation.framing, Framing::Data);
        assert_eq!(config.telemetry.format, LogFormat::Json);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = Config::parse("[playback]\nvolume = 11\n").unwrap_err();
        assert!(err.to_string().contains("volume"));
    }

    #[test]
    fn rejects_unknown_voice() {
        let err = Config::parse("[playback]\ndefault_voice = \"gravel\"\n").unwrap_err();
        assert!(err.to_string().contains("gravel"));
    }

    #[test]
    fn rejects_speed_out_of_range() {
        let err = Config::parse("[playback]\nspeed = 5.0\n").unwrap_err();
        assert!(err.to_string().contains("playback.speed"));
    }

    #[test]
    fn rejects_zero_preload_depth() {
        let err = Config::parse("[playback]\npreload_depth = 0\n").unwrap_err();
        assert!(err.to_string().contains("preload_depth"));
    }

    #[test]
    fn rejects_bad_durations() {
        let err = Config::parse("[playback]\nready_timeout = \"soon\"\n").unwrap_err();
        assert!(err.to_string().contains("playback.ready_timeout"));

        let err = Config::parse("[playback]\nready_timeout = \"0s\"\n").unwrap_err();
        assert!(err.to_string().contains("greater than 0"));
    }

    #[test]
    fn rejects_page_count_out_of_range() {
        let err = Config::parse("[generation]\npages = 11\n").unwrap_err();
        assert!(err.to_string().contains("generation.pages"));
    }

    #[test]
    fn rejects_non_http_base_url() {
        let err = Config::parse("[server]\nbase_url = \"ftp://tales.example.com\"\n").unwrap_err();
        assert!(err.to_string().contains("http(s)"));
    }

    #[test]
    fn rejects_unknown_framing() {
        assert!(Config::parse("[generation]\nframing = \"ndjson\"\n").is_err());
    }

    #[test]
    fn load_expands_environment() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[playback]").unwrap();
        writeln!(file, "default_voice = \"{{{{ env.AUDIOTALES_TEST_VOICE | default(\"nova\") }}}}\"").unwrap();

        temp_env::with_var("AUDIOTALES_TEST_VOICE", Some("shimmer"), || {
            let config = Config::load(file.path()).unwrap();
            assert_eq!(config.playback.default_voice, "shimmer");
        });

        temp_env::with_var_unset("AUDIOTALES_TEST_VOICE", || {
            let config = Config::load(file.path()).unwrap();
            assert_eq!(config.playback.default_voice, "nova");
        });
    }

    #[test]
    fn missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audiotales.toml");

        assert!(Config::load(&path).unwrap_err().to_string().contains("failed to read config file"));
        assert_eq!(Config::load_or_default(&path).unwrap().playback.default_voice, "nova");
    }
}
