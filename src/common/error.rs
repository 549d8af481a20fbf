//! Error types for the API tester
//!
//! Error messages are meant to be read by whoever is running the suite,
//! with hints on how to fix configuration problems. Anything that might
//! carry a credential is redacted before it reaches a log or a response.

use std::io;
use thiserror::Error;

use super::config::Environment;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the API tester
#[derive(Error, Debug)]
pub enum Error {
    // === Configuration Errors ===
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(String),

    // === Permission Errors ===
    #[error("Write operation '{operation}' is not permitted in the {environment} environment")]
    PermissionDenied {
        operation: String,
        environment: Environment,
    },

    // === Request Errors ===
    #[error("Invalid endpoint '{0}'")]
    InvalidEndpoint(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Request to {url} timed out after {attempts} attempt(s)")]
    Timeout { url: String, attempts: u32 },

    #[error("Connection to {url} failed: {message}")]
    Connection { url: String, message: String },

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    // === Signing Errors ===
    #[error("Failed to sign token: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    // === IO Errors ===
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to read file '{path}': {error}")]
    FileRead { path: String, error: String },

    // === Serialization Errors ===
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a permission denied error for a write operation
    pub fn permission_denied(operation: &str, environment: Environment) -> Self {
        Self::PermissionDenied {
            operation: operation.to_string(),
            environment,
        }
    }

    /// Create a connection error
    pub fn connection(url: &str, message: &str) -> Self {
        Self::Connection {
            url: url.to_string(),
            message: message.to_string(),
        }
    }

    /// Stable code used in JSON error bodies
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Configuration(_) | Error::ConfigParse(_) => "CONFIGURATION_ERROR",
            Error::PermissionDenied { .. } => "PERMISSION_DENIED",
            Error::InvalidEndpoint(_) | Error::Validation(_) => "VALIDATION_ERROR",
            Error::Timeout { .. } => "TIMEOUT",
            Error::Connection { .. } => "CONNECTION_ERROR",
            _ => "INTERNAL_ERROR",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_codes() {
        assert_eq!(
            Error::Configuration("missing".into()).kind(),
            "CONFIGURATION_ERROR"
        );
        assert_eq!(
            Error::permission_denied("create_artist", Environment::Production).kind(),
            "PERMISSION_DENIED"
        );
        assert_eq!(Error::InvalidEndpoint("../x".into()).kind(), "VALIDATION_ERROR");
        assert_eq!(Error::Internal("boom".into()).kind(), "INTERNAL_ERROR");
    }

    #[test]
    fn test_permission_denied_message_names_environment() {
        let err = Error::permission_denied("POST artist", Environment::Production);
        assert_eq!(
            err.to_string(),
            "Write operation 'POST artist' is not permitted in the production environment"
        );
    }
}
