//! Execution history sink.

use async_trait::async_trait;

use crate::error::PropagationResult;
use crate::task::TaskExecution;

/// Persists task executions. Storage is owned by the caller.
#[async_trait]
pub trait ExecutionSink: Send + Sync {
    async fn save_exec(&self, execution: &TaskExecution) -> PropagationResult<()>;
}

/// Sink that drops every execution.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopExecutionSink;

#[async_trait]
impl ExecutionSink for NoopExecutionSink {
    async fn save_exec(&self, _execution: &TaskExecution) -> PropagationResult<()> {
        Ok(())
    }
}
