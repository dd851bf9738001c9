//! Error types for Gmail API operations.

/// Result type alias for Gmail API operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Gmail API error types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// HTTP transport error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Message body was not valid base64url.
    #[error("Body decode error: {0}")]
    Decode(#[from] base64::DecodeError),

    /// The access token was missing, expired, or revoked.
    #[error("Not authorized against the Gmail API")]
    Unauthorized,

    /// Message not found.
    #[error("Message not found: {0}")]
    NotFound(String),

    /// Any other non-success response.
    #[error("Gmail API returned status {status}")]
    Api {
        /// HTTP status code.
        status: u16,
    },
}
