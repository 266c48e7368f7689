//! Error types for the core domain

use thiserror::Error;

/// Core error type for domain and engine operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Entity not found: {entity_type} with id {id}")]
    NotFound { entity_type: String, id: String },

    #[error("Invalid agent: {message}")]
    InvalidAgent { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Execution error: {message}")]
    Execution { message: String },

    #[error("Checkpoint error: {message}")]
    Checkpoint { message: String },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Internal(err.to_string())
    }
}

impl Error {
    /// Create a validation error with a formatted message
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a not found error for a specific entity type and ID
    pub fn not_found<S1: Into<String>, S2: Into<String>>(entity_type: S1, id: S2) -> Self {
        Self::NotFound {
            entity_type: entity_type.into(),
            id: id.into(),
        }
    }

    /// Create an invalid agent error
    pub fn invalid_agent<S: Into<String>>(message: S) -> Self {
        Self::InvalidAgent {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create an execution error, preserving the original fault message
    pub fn execution<S: Into<String>>(message: S) -> Self {
        Self::Execution {
            message: message.into(),
        }
    }

    /// Create a checkpoint error
    pub fn checkpoint<S: Into<String>>(message: S) -> Self {
        Self::Checkpoint {
            message: message.into(),
        }
    }

    /// Check if this error is a not found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }

    /// Check if this error is an execution error
    pub fn is_execution(&self) -> bool {
        matches!(self, Error::Execution { .. })
    }

    /// Get the error category for logging and metrics
    pub fn category(&self) -> &'static str {
        match self {
            Error::Validation { .. } => "validation",
            Error::NotFound { .. } => "not_found",
            Error::InvalidAgent { .. } => "invalid_agent",
            Error::Configuration { .. } => "configuration",
            Error::Execution { .. } => "execution",
            Error::Checkpoint { .. } => "checkpoint",
            Error::Serialization(_) => "serialization",
            Error::Io(_) => "io",
            Error::Internal(_) => "internal",
        }
    }
}

/// Convenience result type for core operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let validation_err = Error::validation("Test validation error");
        assert!(!validation_err.is_not_found());
        assert_eq!(validation_err.category(), "validation");

        let not_found_err = Error::not_found("Task", "task-123");
        assert!(not_found_err.is_not_found());
        assert_eq!(not_found_err.category(), "not_found");

        let exec_err = Error::execution("callback exploded");
        assert!(exec_err.is_execution());
        assert_eq!(exec_err.category(), "execution");
    }

    #[test]
    fn test_error_from_conversions() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid json").unwrap_err();
        let core_err: Error = json_err.into();
        assert_eq!(core_err.category(), "serialization");

        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let core_err: Error = io_err.into();
        assert_eq!(core_err.category(), "io");
    }

    #[test]
    fn test_error_display_preserves_message() {
        let err = Error::execution("agent callback fault: timeout waiting for response");
        let display_str = format!("{}", err);
        assert!(display_str.contains("timeout waiting for response"));

        let err = Error::not_found("Checkpoint", "cp-042");
        let display_str = format!("{}", err);
        assert!(display_str.contains("Checkpoint"));
        assert!(display_str.contains("cp-042"));
    }
}
