use std::time::Duration;

/// Errors from the remote sheet layer.
#[derive(Debug, thiserror::Error)]
pub enum MirrorError {
    /// The remote API answered HTTP 429.
    #[error("Remote sheet API rate limit exceeded")]
    RateLimited,

    /// The remote call did not finish within the configured timeout.
    #[error("Remote sheet call timed out after {0:?}")]
    Timeout(Duration),

    /// The worker's sheet does not exist (or was deleted).
    #[error("Sheet not found: {0}")]
    SheetNotFound(String),

    /// The remote API returned a non-2xx status other than 429.
    #[error("Remote sheet API error ({status}): {body}")]
    Api { status: u16, body: String },

    /// The HTTP request itself failed (network, DNS, TLS, ...).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The remote answered with something that cannot be used.
    #[error("Malformed remote response: {0}")]
    MalformedResponse(String),

    /// The backend is misconfigured.
    #[error("Invalid sheet backend configuration: {0}")]
    Config(String),
}

impl MirrorError {
    /// Throttling conditions: callers fall back to cached rows silently.
    pub fn is_throttle(&self) -> bool {
        matches!(self, Self::RateLimited | Self::Timeout(_))
    }
}
