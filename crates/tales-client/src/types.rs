use serde::{Deserialize, Serialize};

// -- Generation --

/// Request to write and illustrate a new story
#[derive(Debug, Clone, Serialize)]
pub struct StoryRequest {
    /// Story prompt
    pub story: String,
    /// Number of pages to write
    pub pages: u32,
    /// Directory the web app writes the story into
    pub path: String,
}

// -- Speech --

/// Request to narrate a piece of text
#[derive(Debug, Clone, Serialize)]
pub struct SpeakRequest {
    /// Text to narrate
    pub text: String,
    /// Narrator voice
    pub voice: String,
    /// Narration speed (0.25 to 4.0)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
}

impl SpeakRequest {
    /// Check the request the way the speech endpoint would
    ///
    /// # Errors
    ///
    /// Returns a description of the first problem found
    pub fn validate(&self) -> Result<(), String> {
        if self.text.trim().is_empty() {
            return Err("text is required".to_owned());
        }

        if !tales_narration::is_supported_voice(&self.voice) {
            return Err(format!(
                "invalid voice '{}'; available voices are: {}",
                self.voice,
                tales_narration::AVAILABLE_VOICES.join(", ")
            ));
        }

        if let Some(speed) = self.speed
            && !tales_narration::is_supported_speed(speed)
        {
            return Err(format!("speed must be between 0.25 and 4.0, got {speed}"));
        }

        Ok(())
    }
}

/// Body returned by the speech endpoint
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SpeakResponse {
    #[serde(default)]
    pub success: bool,
    /// Base64-encoded MP3
    #[serde(default, rename = "audioData")]
    pub audio_data: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub details: Option<String>,
}

// -- Stories --

/// A generated story as served by the web app
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Story {
    /// Story title (its directory name)
    pub story: String,
    pub pages: Vec<Page>,
}

/// One page of a story; the fields are URLs or text as served
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    /// Page text
    pub txt: String,
    /// Illustration path
    pub png: String,
    /// Pre-rendered narration path, when one exists
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mp3: Option<String>,
}
