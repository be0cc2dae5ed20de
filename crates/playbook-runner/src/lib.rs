//! `playbook-runner` executes a [`Playbook`] against an [`Inventory`] by
//! handing rendered documents to an external automation runner.
//!
//! # Architecture
//!
//! ```text
//! PlaybookExecutor::execute
//!     │  serialize playbook + inventory     (playbook_core::document)
//!     │  reserve + write both artifacts     (playbook_core::Workspace)
//!     ▼
//! RunnerAdapter   ← builds argv/env for the runner (ansible-playbook by default)
//!     │
//!     ▼
//! ProcessRunner   ← spawns the child, one reader task per stream
//!     │              lines fan out through the OutputHub
//!     ▼
//! OutputHub       ← broadcast channels for stdout and stderr;
//!                    subscribers filter by run ID
//! ```
//!
//! Both artifacts are deleted after every call that wrote them, whatever the
//! outcome. Cancelling the token kills the child.
//!
//! [`Playbook`]: playbook_core::Playbook
//! [`Inventory`]: playbook_core::Inventory

pub mod adapter;
pub mod error;
pub mod executor;
pub mod observer;
pub mod output;
pub mod process;

pub use adapter::{AnsiblePlaybookAdapter, CommandSpec, RunnerAdapter};
pub use error::{ExecutionError, RunError};
pub use executor::PlaybookExecutor;
pub use observer::{ExecutionObserver, Stage, TracingObserver};
pub use output::{OutputEvent, OutputHub, OutputLine, OutputSource, OutputSubscription, Received};
pub use process::ProcessRunner;
pub use tokio_util::sync::CancellationToken;
