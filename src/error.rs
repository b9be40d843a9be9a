//! Error types for the Thingbox client
//!
//! Every failure of an authenticated call is classified by the response
//! status: a rejected credential, a missing privilege, or any other
//! non-200 answer. Network and decoding failures pass through unclassified.

use reqwest::StatusCode;
use thiserror::Error;

/// Errors that can occur while talking to the Thingbox API
#[derive(Error, Debug)]
pub enum ApiError {
    /// No session token, or the server rejected it (HTTP 401)
    #[error("Unauthenticated: sign in required")]
    Unauthenticated,

    /// Signed in but not permitted (HTTP 403)
    #[error("Forbidden: insufficient privileges")]
    Forbidden,

    /// Any other non-200 response
    #[error("Request failed: HTTP {0}")]
    RequestFailed(StatusCode),

    /// Network failure or unreadable response
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Decode(#[from] serde_json::Error),

    /// The persistent key-value store failed
    #[error("Storage error: {0}")]
    Storage(#[from] std::io::Error),

    /// Bad public key or sealing failure
    #[error("Encryption error: {0}")]
    Encryption(String),

    /// An item to import is missing a field
    #[error("Invalid item: {0}")]
    InvalidItem(String),
}

impl ApiError {
    pub fn is_unauthenticated(&self) -> bool {
        matches!(self, ApiError::Unauthenticated)
    }

    pub fn is_forbidden(&self) -> bool {
        matches!(self, ApiError::Forbidden)
    }

    /// HTTP status behind the error, when the server answered at all
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ApiError::Unauthenticated => None,
            ApiError::Forbidden => Some(StatusCode::FORBIDDEN),
            ApiError::RequestFailed(status) => Some(*status),
            ApiError::Transport(e) => e.status(),
            ApiError::Decode(_)
            | ApiError::Storage(_)
            | ApiError::Encryption(_)
            | ApiError::InvalidItem(_) => None,
        }
    }
}

/// Result type for client operations
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(ApiError::Unauthenticated.is_unauthenticated());
        assert!(!ApiError::Unauthenticated.is_forbidden());
        assert!(ApiError::Forbidden.is_forbidden());

        let failed = ApiError::RequestFailed(StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(failed.status(), Some(StatusCode::INTERNAL_SERVER_ERROR));
        assert_eq!(failed.to_string(), "Request failed: HTTP 500 Internal Server Error");
        assert_eq!(ApiError::Unauthenticated.status(), None);
    }
}
