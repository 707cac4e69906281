//! Error types and handling for ChargeSync
//!
//! This module defines the error types used throughout the engine,
//! providing consistent error handling and reporting.

use thiserror::Error;

/// Result type alias for ChargeSync operations
pub type Result<T> = std::result::Result<T, ChargeSyncError>;

/// Main error type for ChargeSync
#[derive(Debug, Error)]
pub enum ChargeSyncError {
    /// Configuration-related errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Authentication/authorization errors (invalid credentials, failed refresh)
    #[error("Authentication error: {message}")]
    Auth { message: String },

    /// Rate limit rejection from the remote service, with the server's
    /// own reset hint in seconds
    #[error("Rate limited: resets in {resets_in}s")]
    RateLimited { resets_in: u64 },

    /// Network, timeout and transport-level errors
    #[error("Communication error: {message}")]
    Communication { message: String },

    /// Remote API errors other than auth/rate-limit (unexpected status codes)
    #[error("API error: {message}")]
    Api { message: String },

    /// Serialization/deserialization errors
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// File I/O errors
    #[error("I/O error: {message}")]
    Io { message: String },

    /// Validation errors
    #[error("Validation error: {field} - {message}")]
    Validation { field: String, message: String },
}

impl ChargeSyncError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        ChargeSyncError::Config {
            message: message.into(),
        }
    }

    /// Create a new auth error
    pub fn auth<S: Into<String>>(message: S) -> Self {
        ChargeSyncError::Auth {
            message: message.into(),
        }
    }

    /// Create a new rate-limit error carrying the server reset hint
    pub fn rate_limited(resets_in: u64) -> Self {
        ChargeSyncError::RateLimited { resets_in }
    }

    /// Create a new communication error
    pub fn communication<S: Into<String>>(message: S) -> Self {
        ChargeSyncError::Communication {
            message: message.into(),
        }
    }

    /// Create a new API error
    pub fn api<S: Into<String>>(message: S) -> Self {
        ChargeSyncError::Api {
            message: message.into(),
        }
    }

    /// Create a new I/O error
    pub fn io<S: Into<String>>(message: S) -> Self {
        ChargeSyncError::Io {
            message: message.into(),
        }
    }

    /// Create a new validation error
    pub fn validation<S: Into<String>>(field: S, message: S) -> Self {
        ChargeSyncError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Whether this error indicates the credentials are unusable and the
    /// engine needs operator intervention
    pub fn is_auth(&self) -> bool {
        matches!(self, ChargeSyncError::Auth { .. })
    }
}

impl From<std::io::Error> for ChargeSyncError {
    fn from(err: std::io::Error) -> Self {
        ChargeSyncError::io(err.to_string())
    }
}

impl From<serde_yaml::Error> for ChargeSyncError {
    fn from(err: serde_yaml::Error) -> Self {
        ChargeSyncError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for ChargeSyncError {
    fn from(err: serde_json::Error) -> Self {
        ChargeSyncError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<reqwest::Error> for ChargeSyncError {
    fn from(err: reqwest::Error) -> Self {
        ChargeSyncError::communication(err.to_string())
    }
}

impl From<chrono::ParseError> for ChargeSyncError {
    fn from(err: chrono::ParseError) -> Self {
        ChargeSyncError::validation("datetime", &err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = ChargeSyncError::config("test config error");
        assert!(matches!(err, ChargeSyncError::Config { .. }));

        let err = ChargeSyncError::rate_limited(120);
        assert!(matches!(err, ChargeSyncError::RateLimited { resets_in: 120 }));

        let err = ChargeSyncError::validation("field", "test validation error");
        assert!(matches!(err, ChargeSyncError::Validation { .. }));
    }

    #[test]
    fn test_error_display() {
        let err = ChargeSyncError::auth("refresh token rejected");
        let error_string = format!("{}", err);
        assert_eq!(error_string, "Authentication error: refresh token rejected");

        let err = ChargeSyncError::rate_limited(45);
        let error_string = format!("{}", err);
        assert_eq!(error_string, "Rate limited: resets in 45s");

        let err = ChargeSyncError::validation("api.base_url", "must not be empty");
        let error_string = format!("{}", err);
        assert_eq!(
            error_string,
            "Validation error: api.base_url - must not be empty"
        );
    }

    #[test]
    fn test_is_auth() {
        assert!(ChargeSyncError::auth("x").is_auth());
        assert!(!ChargeSyncError::api("x").is_auth());
        assert!(!ChargeSyncError::rate_limited(10).is_auth());
    }
}
