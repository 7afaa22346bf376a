//! Error types for the core library.

use thiserror::Error;

/// Errors that can occur in core operations.
#[derive(Debug, Error)]
pub enum Error {
    /// HTTP request to the analysis backend failed.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Backend answered with a non-success status.
    #[error("Unexpected HTTP status {status} from {endpoint}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Endpoint that was requested.
        endpoint: String,
    },

    /// Push channel failed.
    #[error("Push channel error: {0}")]
    Channel(#[from] tokio_tungstenite::tungstenite::Error),

    /// Response body could not be decoded.
    #[error("Malformed response: {0}")]
    MalformedResponse(#[from] serde_json::Error),

    /// Authenticity verdict was still processing when the poll deadline passed.
    #[error("Authenticity check still processing after {0} seconds")]
    EnrichmentTimeout(u64),

    /// Endpoint URL could not be built.
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Whether the failure is transient and the user may retry the action.
    ///
    /// Network failures, malformed responses and poll timeouts are all
    /// surfaced the same way: as a retryable condition, never a fatal one.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Network(_)
                | Self::Status { .. }
                | Self::Channel(_)
                | Self::MalformedResponse(_)
                | Self::EnrichmentTimeout(_)
        )
    }
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
