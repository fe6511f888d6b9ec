/// Narration-specific result type
pub type Result<T> = std::result::Result<T, NarrationError>;

/// Errors surfaced by the narration session
#[derive(Debug, thiserror::Error)]
pub enum NarrationError {
    /// Payload was not valid base64
    #[error("invalid audio payload: {0}")]
    InvalidPayload(#[from] base64::DecodeError),

    /// The media pipeline failed to load, decode, or start the resource
    #[error("media error: {0}")]
    Media(String),

    /// Narration for a page could not be produced
    #[error("narration unavailable for page {page}: {message}")]
    Source {
        /// Zero-based page index
        page: usize,
        /// Reason reported by the source
        message: String,
    },

    /// The session has been shut down
    #[error("audio session is closed")]
    Closed,
}

impl NarrationError {
    /// Build a media error from anything displayable
    pub fn media(message: impl std::fmt::Display) -> Self {
        Self::Media(message.to_string())
    }
}
