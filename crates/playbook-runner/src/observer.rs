use std::fmt;

use playbook_core::WorkspaceError;
use tracing::{error, info, warn};

use crate::adapter::CommandSpec;
use crate::error::ExecutionError;

/// Steps of one execution, in order. There are no retries between steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Serializing,
    Writing,
    Running,
    CleaningUp,
    Done,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Serializing => "serializing",
            Stage::Writing => "writing",
            Stage::Running => "running",
            Stage::CleaningUp => "cleaning_up",
            Stage::Done => "done",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Observability port for [`PlaybookExecutor`](crate::PlaybookExecutor).
///
/// All methods default to no-ops.
pub trait ExecutionObserver: Send + Sync {
    fn stage(&self, _run_id: &str, _stage: Stage) {}

    fn command(&self, _run_id: &str, _spec: &CommandSpec) {}

    /// An artifact could not be deleted. The run's outcome is unaffected.
    fn cleanup_failed(&self, _run_id: &str, _error: &WorkspaceError) {}

    fn finished(&self, _run_id: &str, _outcome: Result<(), &ExecutionError>) {}
}

/// Forwards every observation to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl ExecutionObserver for TracingObserver {
    fn stage(&self, run_id: &str, stage: Stage) {
        info!(run_id, stage = stage.as_str(), "playbook execution stage");
    }

    fn command(&self, run_id: &str, spec: &CommandSpec) {
        info!(run_id, argv = ?spec.argv(), "running command");
    }

    fn cleanup_failed(&self, run_id: &str, error: &WorkspaceError) {
        warn!(run_id, error = %error, "failed to delete run artifact");
    }

    fn finished(&self, run_id: &str, outcome: Result<(), &ExecutionError>) {
        match outcome {
            Ok(()) => info!(run_id, "playbook execution succeeded"),
            Err(e) if e.is_cancellation() => info!(run_id, "playbook execution cancelled"),
            Err(e) => error!(run_id, error = %e, "playbook execution failed"),
        }
    }
}
