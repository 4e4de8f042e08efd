// Allow unused assignments for diagnostic fields - they're used by the macros
#![allow(unused_assignments)]

use miette::Diagnostic;
use thiserror::Error;

/// Core error type for the watcher data model
#[derive(Error, Debug, Diagnostic)]
pub enum CoreError {
    /// Validation failed
    #[error("Validation failed for {resource_type}: {details}")]
    #[diagnostic(
        code(lookout::validation_failed),
        help("{help_text}")
    )]
    ValidationFailed {
        #[allow(unused)]
        resource_type: String,
        #[allow(unused)]
        details: String,
        #[allow(unused)]
        help_text: String,
    },

    /// Trigger payload does not match its declared type
    #[error("Invalid {trigger_type} trigger data: {message}")]
    #[diagnostic(
        code(lookout::invalid_trigger_data),
        help("The stored trigger payload must decode as the shape of its identifierType")
    )]
    InvalidTriggerData {
        #[allow(unused)]
        trigger_type: String,
        #[allow(unused)]
        message: String,
    },

    /// Illegal execution status transition
    #[error("Invalid status transition: cannot transition from {from} to {to}")]
    #[diagnostic(
        code(lookout::invalid_status_transition),
        help("Terminal execution states (Success, Failure, Error) never change")
    )]
    InvalidStatusTransition {
        #[allow(unused)]
        from: String,
        #[allow(unused)]
        to: String,
    },

    /// Serialization error
    #[error("Serialization error: {message}")]
    #[diagnostic(
        code(lookout::serialization_error),
        help("Ensure the payload is valid JSON or YAML")
    )]
    SerializationError {
        #[allow(unused)]
        message: String,
        #[source]
        #[allow(unused)]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, CoreError>;

impl CoreError {
    /// Create a ValidationFailed error
    pub fn validation_failed(
        resource_type: impl Into<String>,
        details: impl Into<String>,
        help_text: impl Into<String>,
    ) -> Self {
        Self::ValidationFailed {
            resource_type: resource_type.into(),
            details: details.into(),
            help_text: help_text.into(),
        }
    }

    /// Create an InvalidTriggerData error
    pub fn invalid_trigger_data(
        trigger_type: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::InvalidTriggerData {
            trigger_type: trigger_type.into(),
            message: message.into(),
        }
    }

    /// Create an InvalidStatusTransition error
    pub fn invalid_status_transition(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self::InvalidStatusTransition {
            from: from.into(),
            to: to.into(),
        }
    }

    /// Create a SerializationError
    pub fn serialization_error(
        message: impl Into<String>,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::SerializationError {
            message: message.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = CoreError::validation_failed(
            "Watcher",
            "name must not be empty",
            "Provide a watcher name",
        );
        assert!(matches!(err, CoreError::ValidationFailed { .. }));

        let err = CoreError::invalid_status_transition("Success", "Progressing");
        assert_eq!(
            err.to_string(),
            "Invalid status transition: cannot transition from Success to Progressing"
        );
    }
}
