use serde::Deserialize;
use tales_stream::Framing;

/// Inclusive bounds on the number of pages per story
pub const PAGE_RANGE: std::ops::RangeInclusive<u32> = 1..=10;

/// Story generation settings
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GenerationConfig {
    /// How progress frames are marked on the wire
    #[serde(default)]
    pub framing: Framing,
    /// Directory, relative to the web app, where generated stories are written
    #[serde(default = "default_stories_path")]
    pub stories_path: String,
    /// Default number of pages per story
    #[serde(default = "default_pages")]
    pub pages: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            framing: Framing::default(),
            stories_path: default_stories_path(),
            pages: default_pages(),
        }
    }
}

fn default_stories_path() -> String {
    "public/stories".to_owned()
}

const fn default_pages() -> u32 {
    5
}
