//! Connector error types
//!
//! Errors raised by connector facades. Transient errors come from the remote
//! side being unreachable and may clear on a later run; everything else is
//! permanent for the attributes that were sent.

use thiserror::Error;

type BoxedCause = Box<dyn std::error::Error + Send + Sync>;

/// Error reported by a connector facade.
#[derive(Debug, Error)]
pub enum ConnectorError {
    /// The resource could not be reached.
    #[error("cannot reach resource: {message}")]
    Unreachable {
        message: String,
        #[source]
        source: Option<BoxedCause>,
    },

    /// The resource answered but refused work for now (busy, maintenance).
    #[error("resource busy: {message}")]
    Busy { message: String },

    /// The connector's bind credentials were rejected.
    #[error("bind rejected by resource: {message}")]
    BindRejected { message: String },

    /// The connector instance is misconfigured.
    #[error("invalid configuration: {message}")]
    InvalidConfiguration { message: String },

    /// The facade does not implement the operation.
    #[error("unsupported operation: {operation}")]
    UnsupportedOperation { operation: String },

    #[error("object not found: {identifier}")]
    ObjectNotFound { identifier: String },

    #[error("object already exists: {identifier}")]
    ObjectAlreadyExists { identifier: String },

    /// The resource rejected the attribute values.
    #[error("constraint violation: {message}")]
    ConstraintViolation { message: String },

    /// A value could not be encoded for the resource.
    #[error("invalid data: {message}")]
    InvalidData { message: String },

    /// Any other failure of the remote operation.
    #[error("operation failed: {message}")]
    OperationFailed {
        message: String,
        #[source]
        source: Option<BoxedCause>,
    },
}

impl ConnectorError {
    /// Whether re-running the propagation may succeed without a change.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ConnectorError::Unreachable { .. } | ConnectorError::Busy { .. }
        )
    }

    /// Stable code for logs and execution history.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            ConnectorError::Unreachable { .. } => "UNREACHABLE",
            ConnectorError::Busy { .. } => "BUSY",
            ConnectorError::BindRejected { .. } => "BIND_REJECTED",
            ConnectorError::InvalidConfiguration { .. } => "INVALID_CONFIG",
            ConnectorError::UnsupportedOperation { .. } => "UNSUPPORTED_OPERATION",
            ConnectorError::ObjectNotFound { .. } => "OBJECT_NOT_FOUND",
            ConnectorError::ObjectAlreadyExists { .. } => "OBJECT_EXISTS",
            ConnectorError::ConstraintViolation { .. } => "CONSTRAINT_VIOLATION",
            ConnectorError::InvalidData { .. } => "INVALID_DATA",
            ConnectorError::OperationFailed { .. } => "OPERATION_FAILED",
        }
    }

    /// Message of the innermost cause, or this error's own text.
    #[must_use]
    pub fn root_cause_message(&self) -> String {
        let mut current: &(dyn std::error::Error + 'static) = self;
        while let Some(next) = current.source() {
            current = next;
        }
        current.to_string()
    }

    pub fn unreachable(message: impl Into<String>) -> Self {
        ConnectorError::Unreachable {
            message: message.into(),
            source: None,
        }
    }

    pub fn operation_failed(message: impl Into<String>) -> Self {
        ConnectorError::OperationFailed {
            message: message.into(),
            source: None,
        }
    }

    /// Operation failure keeping the client library's error as cause.
    pub fn operation_failed_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        ConnectorError::OperationFailed {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

/// Result type for connector operations.
pub type ConnectorResult<T> = Result<T, ConnectorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(ConnectorError::unreachable("ldap://dc1:389").is_transient());
        assert!(ConnectorError::Busy {
            message: "server is unwilling to perform".to_string(),
        }
        .is_transient());

        assert!(!ConnectorError::BindRejected {
            message: "cn=admin".to_string(),
        }
        .is_transient());
        assert!(!ConnectorError::ObjectAlreadyExists {
            identifier: "uid=jdoe".to_string(),
        }
        .is_transient());
    }

    #[test]
    fn test_error_display() {
        let err = ConnectorError::ObjectNotFound {
            identifier: "uid=jdoe,ou=people".to_string(),
        };
        assert_eq!(err.to_string(), "object not found: uid=jdoe,ou=people");
        assert_eq!(err.error_code(), "OBJECT_NOT_FOUND");
    }

    #[test]
    fn test_root_cause_message() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "LDAP: error code 50");
        let err = ConnectorError::operation_failed_with_source("modify failed", io);

        assert_eq!(err.to_string(), "operation failed: modify failed");
        assert_eq!(err.root_cause_message(), "LDAP: error code 50");

        let plain = ConnectorError::operation_failed("boom");
        assert_eq!(plain.root_cause_message(), "operation failed: boom");
    }
}
