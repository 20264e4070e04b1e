//! Per-resource propagation outcomes.

use serde::{Deserialize, Serialize};

use propel_connector::operation::ConnectorObject;

use crate::task::ExecStatus;

/// Outcome of a run for one resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropagationStatus {
    pub resource: String,
    pub status: ExecStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before_object: Option<ConnectorObject>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after_object: Option<ConnectorObject>,
}

/// Accumulates statuses in execution order.
pub trait PropagationReporter: Send {
    fn record(
        &mut self,
        resource: &str,
        status: ExecStatus,
        failure_reason: Option<String>,
        before_object: Option<ConnectorObject>,
        after_object: Option<ConnectorObject>,
    );

    fn statuses(&self) -> &[PropagationStatus];

    /// Whether a status was already recorded for `resource`.
    fn contains(&self, resource: &str) -> bool {
        self.statuses().iter().any(|s| s.resource == resource)
    }
}

/// In-memory, append-only reporter.
#[derive(Debug, Clone, Default)]
pub struct DefaultPropagationReporter {
    statuses: Vec<PropagationStatus>,
}

impl DefaultPropagationReporter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn into_statuses(self) -> Vec<PropagationStatus> {
        self.statuses
    }
}

impl PropagationReporter for DefaultPropagationReporter {
    fn record(
        &mut self,
        resource: &str,
        status: ExecStatus,
        failure_reason: Option<String>,
        before_object: Option<ConnectorObject>,
        after_object: Option<ConnectorObject>,
    ) {
        self.statuses.push(PropagationStatus {
            resource: resource.to_string(),
            status,
            failure_reason,
            before_object,
            after_object,
        });
    }

    fn statuses(&self) -> &[PropagationStatus] {
        &self.statuses
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_in_order() {
        let mut reporter = DefaultPropagationReporter::new();
        reporter.record("ldap", ExecStatus::Success, None, None, None);
        reporter.record("db", ExecStatus::Failure, Some("boom".to_string()), None, None);

        assert!(reporter.contains("db"));
        assert!(!reporter.contains("crm"));

        let statuses = reporter.into_statuses();
        assert_eq!(statuses[0].resource, "ldap");
        assert_eq!(statuses[1].failure_reason.as_deref(), Some("boom"));
    }

    #[test]
    fn test_status_serializes_without_empty_fields() {
        let status = PropagationStatus {
            resource: "ldap".to_string(),
            status: ExecStatus::Submitted,
            failure_reason: None,
            before_object: None,
            after_object: None,
        };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json, serde_json::json!({ "resource": "ldap", "status": "SUBMITTED" }));
    }
}
