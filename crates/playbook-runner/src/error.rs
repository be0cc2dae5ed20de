use std::process::ExitStatus;

use playbook_core::{PlaybookError, WorkspaceError};
use thiserror::Error;

/// Failure of a single [`ProcessRunner::run`](crate::ProcessRunner::run) call.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("cancelled")]
    Cancelled,

    #[error("failed to launch '{program}': {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("runner exited unsuccessfully ({status})")]
    Exited { status: ExitStatus },

    #[error("I/O error while running: {0}")]
    Io(#[from] std::io::Error),
}

/// The single terminal error of one execution.
///
/// Each variant carries the run ID of the call that produced it.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("run {run_id}: serialization failed: {source}")]
    Serialization {
        run_id: String,
        #[source]
        source: PlaybookError,
    },

    #[error("run {run_id}: workspace error: {source}")]
    Workspace {
        run_id: String,
        #[source]
        source: WorkspaceError,
    },

    #[error("run {run_id}: failed to launch '{program}': {source}")]
    Launch {
        run_id: String,
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("run {run_id}: runner failed: {source}")]
    Runtime {
        run_id: String,
        #[source]
        source: RunError,
    },

    #[error("run {run_id}: cancelled")]
    Cancelled { run_id: String },
}

impl ExecutionError {
    pub fn run_id(&self) -> &str {
        match self {
            ExecutionError::Serialization { run_id, .. }
            | ExecutionError::Workspace { run_id, .. }
            | ExecutionError::Launch { run_id, .. }
            | ExecutionError::Runtime { run_id, .. }
            | ExecutionError::Cancelled { run_id } => run_id,
        }
    }

    /// User-initiated cancellation, not an alertable failure.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, ExecutionError::Cancelled { .. })
    }

    pub(crate) fn from_run(run_id: &str, err: RunError) -> Self {
        let run_id = run_id.to_string();
        match err {
            RunError::Cancelled => ExecutionError::Cancelled { run_id },
            RunError::Launch { program, source } => ExecutionError::Launch {
                run_id,
                program,
                source,
            },
            other => ExecutionError::Runtime {
                run_id,
                source: other,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_errors_map_to_taxonomy() {
        let cancelled = ExecutionError::from_run("p1", RunError::Cancelled);
        assert!(cancelled.is_cancellation());
        assert_eq!(cancelled.run_id(), "p1");

        let launch = ExecutionError::from_run(
            "p1",
            RunError::Launch {
                program: "nope".into(),
                source: std::io::Error::from(std::io::ErrorKind::NotFound),
            },
        );
        assert!(matches!(launch, ExecutionError::Launch { ref program, .. } if program == "nope"));
        assert!(!launch.is_cancellation());

        let io = ExecutionError::from_run("p2", RunError::Io(std::io::Error::other("pipe")));
        assert!(matches!(io, ExecutionError::Runtime { .. }));
        assert!(io.to_string().starts_with("run p2:"));
    }
}
