use thiserror::Error;

/// Errors from storage uploads.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UploadError {
    /// The backend asked us to slow down.
    #[error("rate limited by storage backend: {0}")]
    RateLimited(String),

    /// The backend refused the content itself. Retrying the same bytes will
    /// fail the same way.
    #[error("payload rejected: {0}")]
    PayloadRejected(String),

    /// Connection failure or server-side error.
    #[error("network error: {0}")]
    Network(String),

    /// The upload did not finish within its deadline.
    #[error("upload timed out after {0} ms")]
    Timeout(u64),

    /// Required credentials are missing or were refused.
    #[error("storage credentials: {0}")]
    Credentials(String),

    /// The item's metadata could not be read or rewritten.
    #[error("invalid metadata: {0}")]
    InvalidMetadata(String),
}

impl UploadError {
    /// Whether the same upload may succeed if attempted again later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            UploadError::RateLimited(_) | UploadError::Network(_) | UploadError::Timeout(_)
        )
    }

    /// Classify an HTTP error status returned by a backend.
    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let detail = format!("{status}: {}", body.chars().take(200).collect::<String>());
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            UploadError::RateLimited(detail)
        } else if status == reqwest::StatusCode::UNAUTHORIZED
            || status == reqwest::StatusCode::FORBIDDEN
        {
            UploadError::Credentials(detail)
        } else if status == reqwest::StatusCode::REQUEST_TIMEOUT {
            UploadError::Network(detail)
        } else if status.is_client_error() {
            UploadError::PayloadRejected(detail)
        } else {
            UploadError::Network(detail)
        }
    }
}

impl From<reqwest::Error> for UploadError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            UploadError::Timeout(0)
        } else if let Some(status) = e.status() {
            UploadError::from_status(status, &e.to_string())
        } else if e.is_decode() {
            UploadError::Network(format!("unreadable response: {e}"))
        } else {
            UploadError::Network(e.to_string())
        }
    }
}

impl From<cndy_types::TypeError> for UploadError {
    fn from(e: cndy_types::TypeError) -> Self {
        UploadError::InvalidMetadata(e.to_string())
    }
}

/// Result alias for upload operations.
pub type UploadResult<T> = Result<T, UploadError>;
