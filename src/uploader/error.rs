use thiserror::Error;

/// Errors that can occur along the two-phase upload path
#[derive(Error, Debug)]
pub enum UploadError {
    /// File not found on the local filesystem
    #[error("File not found: {path}")]
    NotFound { path: String },

    /// Path exists but is not a regular file
    #[error("Path is not a file: {path}")]
    NotAFile { path: String },

    /// Zero-byte files are rejected before any network call
    #[error("File is empty: {path}")]
    EmptyFile { path: String },

    /// File size exceeds the configured ceiling
    #[error("File too large: {size} bytes (max: {max} bytes)")]
    TooLarge { size: u64, max: u64 },

    /// The grant endpoint rejected the request or returned a malformed grant
    #[error("Grant request failed: {message}")]
    Grant { message: String },

    /// The storage backend returned a non-200 on the PUT
    #[error("Storage upload failed: status {status}: {body}")]
    Storage { status: u16, body: String },

    /// Connection failure or timeout on either network call
    #[error("Network error: {message}")]
    Transport { message: String },

    /// IO error wrapper
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding error wrapper
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl UploadError {
    /// Map a reqwest failure onto the transport taxonomy
    pub(crate) fn from_request_error(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Transport {
                message: "request timeout".to_string(),
            }
        } else {
            Self::Transport {
                message: error.to_string(),
            }
        }
    }
}

/// Result type for upload operations
pub type Result<T> = std::result::Result<T, UploadError>;
