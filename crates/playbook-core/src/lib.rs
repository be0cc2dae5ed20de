pub mod action;
pub mod config;
pub mod definition;
pub mod document;
pub mod error;
pub mod inventory;
pub mod io;
pub mod playbook;
pub mod workspace;

pub use action::{ActionRegistry, ModuleAction};
pub use document::Document;
pub use error::{PlaybookError, Result};
pub use inventory::Inventory;
pub use playbook::{Play, Playbook, Task};
pub use workspace::{Workspace, WorkspaceError};
