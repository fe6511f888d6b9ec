/// Stream-specific result type
pub type Result<T> = std::result::Result<T, StreamError>;

/// Boxed error from the underlying byte stream
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that end a stream read
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// The byte stream failed mid-read; nothing more can be consumed
    #[error("stream transport failed: {0}")]
    Transport(#[source] BoxError),
}

/// Why a single frame could not become an event
///
/// Recoverable: the reader logs it and moves on to the next frame.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// Payload was not valid JSON, or did not match the shape its `type` requires
    #[error("malformed event payload: {0}")]
    Json(#[from] serde_json::Error),

    /// Payload was JSON but carried no string `type` tag
    #[error("event payload has no type tag")]
    MissingType,
}
