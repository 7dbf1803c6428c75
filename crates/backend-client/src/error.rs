//! Backend error type

use serde::{Deserialize, Serialize};

/// Error returned by the backend or by the transport
///
/// A status of `1` means the request never produced an HTTP response
/// (connection refused, DNS failure, timeout). A status of `0` marks a
/// local failure to encode the request or decode the response.
///
/// # Examples
/// ```
/// use backend_client::BackendError;
///
/// let error = BackendError::new(409, "23505", "duplicate key value");
/// assert_eq!(error.status(), 409);
/// assert!(!error.is_network_error());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendError {
    status: u16,
    code: String,
    message: String,
}

impl BackendError {
    /// Create a new backend error
    pub fn new(status: u16, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self { status, code: code.into(), message: message.into() }
    }

    /// Error for a request that failed before a response arrived
    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(1, "NetworkError", message)
    }

    /// Get the HTTP status code
    pub fn status(&self) -> u16 {
        self.status
    }

    /// Get the error code
    pub fn code(&self) -> &str {
        &self.code
    }

    /// Get the error message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Check if this is a connectivity or availability failure
    ///
    /// Network failure statuses: 1, 408, 425, 429, 500, 502, 503, 504, 522, 524
    pub fn is_network_error(&self) -> bool {
        matches!(self.status, 1 | 408 | 425 | 429 | 500 | 502 | 503 | 504 | 522 | 524)
    }
}

impl std::fmt::Display for BackendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "backend error {}: {} - {}", self.status, self.code, self.message)
    }
}

impl std::error::Error for BackendError {}

/// Error body returned by the backend's REST layer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Error code
    #[serde(default)]
    pub code: Option<String>,
    /// Error message
    pub message: String,
    /// Additional detail
    #[serde(default)]
    pub details: Option<String>,
}
