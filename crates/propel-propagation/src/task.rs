//! Propagation tasks and their executions.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use propel_connector::operation::AttributeSet;
use propel_connector::types::{PropagationMode, ResourceOperation};

use crate::ids::TaskId;
use crate::resource::ExternalResource;
use crate::subject::SubjectKind;

/// One (subject, resource, operation) unit of work.
///
/// Tasks are built per run and never persisted; only their executions are
/// handed to the history sink.
#[derive(Debug, Clone)]
pub struct PropagationTask {
    pub id: TaskId,
    pub subject_kind: SubjectKind,
    pub subject_key: String,
    pub resource: Arc<ExternalResource>,
    pub operation: ResourceOperation,
    pub mode: PropagationMode,
    pub object_class: String,
    /// Remote key of the subject on the resource.
    pub account_id: Option<String>,
    /// Remote key before this change, when it is a rename.
    pub old_account_id: Option<String>,
    pub attributes: AttributeSet,
}

impl PropagationTask {
    #[must_use]
    pub fn resource_name(&self) -> &str {
        &self.resource.name
    }

    #[must_use]
    pub fn is_primary(&self) -> bool {
        self.resource.propagation_primary
    }

    /// Account id to look the remote object up by: the old one on rename.
    #[must_use]
    pub fn lookup_account_id(&self) -> Option<&str> {
        self.old_account_id
            .as_deref()
            .or(self.account_id.as_deref())
    }
}

/// Outcome of executing one task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecStatus {
    /// One-phase call succeeded.
    Success,
    /// One-phase call failed, or the task was never run because of an abort.
    Failure,
    /// Two-phases call accepted.
    Submitted,
    /// Two-phases call rejected.
    Unsubmitted,
    /// The connector lacks the capability; nothing was sent.
    NotAttempted,
}

impl ExecStatus {
    /// Status for a completed attempt under `mode`.
    #[must_use]
    pub fn for_outcome(mode: PropagationMode, succeeded: bool) -> Self {
        match (mode, succeeded) {
            (PropagationMode::OnePhase, true) => ExecStatus::Success,
            (PropagationMode::OnePhase, false) => ExecStatus::Failure,
            (PropagationMode::TwoPhases, true) => ExecStatus::Submitted,
            (PropagationMode::TwoPhases, false) => ExecStatus::Unsubmitted,
        }
    }

    #[must_use]
    pub fn is_successful(&self) -> bool {
        matches!(self, ExecStatus::Success | ExecStatus::Submitted)
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecStatus::Success => "SUCCESS",
            ExecStatus::Failure => "FAILURE",
            ExecStatus::Submitted => "SUBMITTED",
            ExecStatus::Unsubmitted => "UNSUBMITTED",
            ExecStatus::NotAttempted => "NOT_ATTEMPTED",
        }
    }
}

impl std::fmt::Display for ExecStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Record of one task execution, as handed to the history sink.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskExecution {
    pub task_id: TaskId,
    pub resource: String,
    pub operation: ResourceOperation,
    pub status: ExecStatus,
    pub message: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
}

impl TaskExecution {
    #[must_use]
    pub fn duration_ms(&self) -> i64 {
        (self.ended_at - self.started_at).num_milliseconds()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exec_status_for_outcome() {
        assert_eq!(
            ExecStatus::for_outcome(PropagationMode::OnePhase, true),
            ExecStatus::Success
        );
        assert_eq!(
            ExecStatus::for_outcome(PropagationMode::TwoPhases, false),
            ExecStatus::Unsubmitted
        );
        assert!(ExecStatus::Submitted.is_successful());
        assert!(!ExecStatus::Unsubmitted.is_successful());
        assert!(!ExecStatus::NotAttempted.is_successful());
    }

    #[test]
    fn test_exec_status_serde() {
        let json = serde_json::to_string(&ExecStatus::NotAttempted).unwrap();
        assert_eq!(json, "\"NOT_ATTEMPTED\"");
        assert_eq!(ExecStatus::Failure.to_string(), "FAILURE");
    }
}
