/// Client-specific result type
pub type Result<T> = std::result::Result<T, TalesClientError>;

/// Errors from the AudioTales client
#[derive(Debug, thiserror::Error)]
pub enum TalesClientError {
    /// HTTP transport error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Server returned an error response
    #[error("{status}: {message}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Human-readable error message
        message: String,
        /// Extra explanation the server attached, if any
        details: Option<String>,
    },

    /// The story prompt was rejected by the content filter
    #[error("content filter: {0}")]
    ContentFilter(String),

    /// Failed to parse response
    #[error("failed to parse response: {0}")]
    Parse(String),

    /// Request rejected before it was sent
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Generation stream failed mid-read
    #[error("stream error: {0}")]
    Stream(#[from] tales_stream::StreamError),
}

impl TalesClientError {
    /// Whether repeating the request could succeed
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Http(_) => true,
            Self::Api { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}
