//! # Fixture Errors
//!
//! Error taxonomy for disposable backing-service fixtures.
//!
//! - Uses `thiserror` for structured error definitions
//! - Named fields on every variant so callers can assert on them
//! - `FixtureError` is what tests see; `RuntimeError` is what a container
//!   runtime reports to the lifecycle manager

use thiserror::Error;

/// Errors surfaced by the fixture lifecycle manager to test code.
#[derive(Debug, Error)]
pub enum FixtureError {
    #[error("Startup timeout: {image} not reachable within {timeout_ms}ms")]
    StartupTimeout { image: String, timeout_ms: u64 },

    #[error("Resource unavailable for {image}: {reason}")]
    ResourceUnavailable { image: String, reason: String },

    #[error("Invalid state: cannot {operation} while {state}")]
    InvalidState { operation: String, state: String },

    #[error("Restart of {id} failed: {reason}")]
    RestartFailed { id: String, reason: String },

    #[error("Connection refused: {endpoint}")]
    ConnectionRefused { endpoint: String },

    #[error("Database error on {endpoint}: {reason}")]
    Database { endpoint: String, reason: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Smoke check of {url} failed: {reason}")]
    Smoke { url: String, reason: String }
}

impl FixtureError {
    pub fn invalid_state(operation: &str, state: impl std::fmt::Display) -> Self {
        Self::InvalidState {
            operation: operation.to_string(),
            state: state.to_string()
        }
    }

    /// True for the errors that abort a test group during acquire.
    pub fn is_startup_failure(&self) -> bool {
        matches!(
            self,
            Self::StartupTimeout { .. } | Self::ResourceUnavailable { .. }
        )
    }
}

pub type FixtureResult<T> = Result<T, FixtureError>;

/// Errors reported by a container runtime implementation.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("Runtime unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Container did not become ready: {reason}")]
    StartupTimeout { reason: String },

    #[error("Container not found: {id}")]
    NotFound { id: String },

    #[error("Runtime operation {operation} on {id} failed: {reason}")]
    Operation {
        operation: String,
        id: String,
        reason: String
    }
}

impl RuntimeError {
    pub fn operation(operation: &str, id: &str, reason: impl std::fmt::Display) -> Self {
        Self::Operation {
            operation: operation.to_string(),
            id: id.to_string(),
            reason: reason.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_state_message() {
        let err = FixtureError::invalid_state("restart", "Partitioned");
        assert_eq!(
            err.to_string(),
            "Invalid state: cannot restart while Partitioned"
        );
    }

    #[test]
    fn test_startup_failure_classification() {
        let timeout = FixtureError::StartupTimeout {
            image: "postgres:16".to_string(),
            timeout_ms: 500
        };
        let unavailable = FixtureError::ResourceUnavailable {
            image: "postgres:16".to_string(),
            reason: "no such image".to_string()
        };
        let refused = FixtureError::ConnectionRefused {
            endpoint: "localhost:5432".to_string()
        };

        assert!(timeout.is_startup_failure());
        assert!(unavailable.is_startup_failure());
        assert!(!refused.is_startup_failure());
    }

    #[test]
    fn test_runtime_operation_message() {
        let err = RuntimeError::operation("pause", "abc123", "daemon gone");
        assert_eq!(
            err.to_string(),
            "Runtime operation pause on abc123 failed: daemon gone"
        );
    }
}
