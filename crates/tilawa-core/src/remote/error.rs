//! Network error classification

use std::time::Duration;

use thiserror::Error;

/// Errors from the remote content service
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NetworkError {
    /// The request did not finish within the client's deadline
    #[error("Request timed out after {}s", .0.as_secs_f32())]
    Timeout(Duration),

    /// The server could not be reached at all
    #[error("Content server unreachable: {0}")]
    Unreachable(String),

    /// The server answered with a non-success status
    #[error("Content server returned HTTP {0}")]
    HttpStatus(u16),

    /// The body could not be read or was not JSON
    #[error("Malformed response body: {0}")]
    MalformedBody(String),
}

impl NetworkError {
    /// Classify a reqwest error
    ///
    /// `timeout` is the deadline the request was issued with, reported back
    /// in [`NetworkError::Timeout`].
    pub fn from_reqwest(error: reqwest::Error, timeout: Duration) -> Self {
        if error.is_timeout() {
            NetworkError::Timeout(timeout)
        } else if let Some(status) = error.status() {
            NetworkError::HttpStatus(status.as_u16())
        } else if error.is_decode() || error.is_body() {
            NetworkError::MalformedBody(error.to_string())
        } else {
            NetworkError::Unreachable(error.to_string())
        }
    }

    /// Whether retrying later could plausibly succeed
    pub fn is_transient(&self) -> bool {
        match self {
            NetworkError::Timeout(_) | NetworkError::Unreachable(_) => true,
            NetworkError::HttpStatus(code) => *code >= 500 || *code == 429,
            NetworkError::MalformedBody(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(NetworkError::Timeout(Duration::from_secs(8)).is_transient());
        assert!(NetworkError::Unreachable("refused".into()).is_transient());
        assert!(NetworkError::HttpStatus(503).is_transient());
        assert!(NetworkError::HttpStatus(429).is_transient());
        assert!(!NetworkError::HttpStatus(404).is_transient());
        assert!(!NetworkError::MalformedBody("eof".into()).is_transient());
    }

    #[test]
    fn test_error_display() {
        assert_eq!(
            NetworkError::HttpStatus(502).to_string(),
            "Content server returned HTTP 502"
        );
        assert_eq!(
            NetworkError::Timeout(Duration::from_secs(8)).to_string(),
            "Request timed out after 8s"
        );
    }
}
