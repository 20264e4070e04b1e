//! Audit and notification hand-off at the end of a run.

use async_trait::async_trait;

use crate::error::PropagationResult;
use crate::reporter::PropagationStatus;
use crate::task::PropagationTask;

/// Receives the outcome of every run, aborted or not.
#[async_trait]
pub trait PropagationNotifier: Send + Sync {
    async fn notify(
        &self,
        statuses: &[PropagationStatus],
        tasks: &[PropagationTask],
    ) -> PropagationResult<()>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

#[async_trait]
impl PropagationNotifier for NoopNotifier {
    async fn notify(
        &self,
        _statuses: &[PropagationStatus],
        _tasks: &[PropagationTask],
    ) -> PropagationResult<()> {
        Ok(())
    }
}
