//! Propagation errors.

use thiserror::Error;

use propel_connector::error::ConnectorError;
use propel_connector::gateway::GatewayError;

use crate::actions::ActionError;
use crate::expression::ExpressionError;

/// Errors raised while building or executing a propagation run.
#[derive(Debug, Error)]
pub enum PropagationError {
    /// One mapping item could not be evaluated.
    #[error("Mapping evaluation failed for '{ext_attr_name}': {message}")]
    MappingEvaluation {
        ext_attr_name: String,
        message: String,
    },

    /// Expression error.
    #[error("Expression error: {0}")]
    Expression(#[from] ExpressionError),

    /// Gateway error.
    #[error("{0}")]
    Gateway(#[from] GatewayError),

    /// Connector error outside a gateway call.
    #[error("Connector error: {0}")]
    Connector(#[from] ConnectorError),

    /// Action hook error.
    #[error("Action error: {0}")]
    Action(#[from] ActionError),

    /// A primary resource did not succeed; the run was aborted.
    #[error("Propagation aborted: primary resource '{resource}' failed: {reason}")]
    PrimaryResourceFailure { resource: String, reason: String },

    /// No connector facade is registered for the resource.
    #[error("No connector available for resource {name}")]
    ConnectorNotFound { name: String },

    /// The task has no remote key to act on.
    #[error("No account id known for resource {resource}")]
    MissingAccountId { resource: String },

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type for propagation operations.
pub type PropagationResult<T> = Result<T, PropagationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err = PropagationError::PrimaryResourceFailure {
            resource: "ldap".to_string(),
            reason: "request timeout".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Propagation aborted: primary resource 'ldap' failed: request timeout"
        );

        let err: PropagationError = ConnectorError::operation_failed("boom").into();
        assert_eq!(err.to_string(), "Connector error: operation failed: boom");
    }
}
