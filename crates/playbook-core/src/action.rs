//! Module actions: the unit of work a task wraps.
//!
//! Every action exposes a stable identifier (the module name the runner
//! resolves, e.g. `ansible.builtin.command`) and an argument mapping. The
//! serializer splices that mapping into the task entry under the identifier
//! key, so the action type itself never appears in a rendered document.
//!
//! New action kinds are added through [`ActionRegistry::register`]; the
//! registry is what turns a definition file's `{module, args}` pair back into
//! a typed action.

use std::collections::HashMap;
use std::fmt;

use serde_yaml::{Mapping, Value};

use crate::error::{PlaybookError, Result};

pub const COMMAND: &str = "ansible.builtin.command";
pub const SHELL: &str = "ansible.builtin.shell";
pub const DEBUG: &str = "ansible.builtin.debug";
pub const COPY: &str = "ansible.builtin.copy";

/// A pluggable unit of work with a stable identifier and argument mapping.
pub trait ModuleAction: fmt::Debug + Send + Sync {
    /// Module name the runner resolves. Must be non-empty and stable.
    fn identifier(&self) -> &str;

    /// Arguments passed to the module.
    fn args(&self) -> Mapping;
}

// ---------------------------------------------------------------------------
// Builtin actions
// ---------------------------------------------------------------------------

/// Runs a literal command without a shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandAction {
    pub command: String,
}

impl CommandAction {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

impl ModuleAction for CommandAction {
    fn identifier(&self) -> &str {
        COMMAND
    }

    fn args(&self) -> Mapping {
        single("cmd", &self.command)
    }
}

/// Runs a command through the target's shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellAction {
    pub command: String,
}

impl ShellAction {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

impl ModuleAction for ShellAction {
    fn identifier(&self) -> &str {
        SHELL
    }

    fn args(&self) -> Mapping {
        single("cmd", &self.command)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebugAction {
    pub msg: String,
}

impl DebugAction {
    pub fn new(msg: impl Into<String>) -> Self {
        Self { msg: msg.into() }
    }
}

impl ModuleAction for DebugAction {
    fn identifier(&self) -> &str {
        DEBUG
    }

    fn args(&self) -> Mapping {
        single("msg", &self.msg)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CopySource {
    /// Path on the controller.
    Path(String),
    /// Inline file content.
    Content(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyAction {
    pub source: CopySource,
    pub dest: String,
}

impl ModuleAction for CopyAction {
    fn identifier(&self) -> &str {
        COPY
    }

    fn args(&self) -> Mapping {
        let mut args = match &self.source {
            CopySource::Path(src) => single("src", src),
            CopySource::Content(content) => single("content", content),
        };
        args.insert("dest".into(), Value::String(self.dest.clone()));
        args
    }
}

/// An action whose arguments are passed through verbatim.
///
/// Used for modules that have no dedicated type; the serializer still
/// validates that every argument is representable.
#[derive(Debug, Clone, PartialEq)]
pub struct RawAction {
    pub identifier: String,
    pub args: Mapping,
}

impl ModuleAction for RawAction {
    fn identifier(&self) -> &str {
        &self.identifier
    }

    fn args(&self) -> Mapping {
        self.args.clone()
    }
}

fn single(key: &str, value: &str) -> Mapping {
    let mut m = Mapping::new();
    m.insert(key.into(), Value::String(value.to_string()));
    m
}

// ---------------------------------------------------------------------------
// ActionRegistry
// ---------------------------------------------------------------------------

type Builder = Box<dyn Fn(&Mapping) -> Result<Box<dyn ModuleAction>> + Send + Sync>;

/// Maps module identifiers to constructors.
pub struct ActionRegistry {
    builders: HashMap<String, Builder>,
}

impl fmt::Debug for ActionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut ids: Vec<&String> = self.builders.keys().collect();
        ids.sort();
        f.debug_struct("ActionRegistry").field("actions", &ids).finish()
    }
}

impl Default for ActionRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl ActionRegistry {
    /// An empty registry with no action kinds.
    pub fn empty() -> Self {
        Self {
            builders: HashMap::new(),
        }
    }

    /// A registry preloaded with command, shell, debug and copy.
    pub fn with_builtins() -> Self {
        let mut reg = Self::empty();
        reg.register(COMMAND, |args| {
            Ok(Box::new(CommandAction::new(required_str(COMMAND, args, "cmd")?)))
        });
        reg.register(SHELL, |args| {
            Ok(Box::new(ShellAction::new(required_str(SHELL, args, "cmd")?)))
        });
        reg.register(DEBUG, |args| {
            Ok(Box::new(DebugAction::new(required_str(DEBUG, args, "msg")?)))
        });
        reg.register(COPY, |args| {
            let dest = required_str(COPY, args, "dest")?;
            let source = match (optional_str(args, "src"), optional_str(args, "content")) {
                (Some(src), None) => CopySource::Path(src),
                (None, Some(content)) => CopySource::Content(content),
                _ => {
                    return Err(PlaybookError::InvalidAction {
                        action: COPY.to_string(),
                        reason: "exactly one of 'src' or 'content' is required".into(),
                    })
                }
            };
            Ok(Box::new(CopyAction { source, dest }))
        });
        reg
    }

    /// Register (or replace) the constructor for `identifier`.
    pub fn register<F>(&mut self, identifier: impl Into<String>, builder: F)
    where
        F: Fn(&Mapping) -> Result<Box<dyn ModuleAction>> + Send + Sync + 'static,
    {
        self.builders.insert(identifier.into(), Box::new(builder));
    }

    /// Register `identifier` as a pass-through module backed by [`RawAction`].
    pub fn register_passthrough(&mut self, identifier: impl Into<String>) {
        let id: String = identifier.into();
        let owned = id.clone();
        self.register(id, move |args| {
            Ok(Box::new(RawAction {
                identifier: owned.clone(),
                args: args.clone(),
            }))
        });
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.builders.contains_key(identifier)
    }

    pub fn build(&self, identifier: &str, args: &Mapping) -> Result<Box<dyn ModuleAction>> {
        let builder = self
            .builders
            .get(identifier)
            .ok_or_else(|| PlaybookError::UnknownAction(identifier.to_string()))?;
        builder(args)
    }
}

fn optional_str(args: &Mapping, key: &str) -> Option<String> {
    args.get(key).and_then(Value::as_str).map(str::to_string)
}

fn required_str(action: &str, args: &Mapping, key: &str) -> Result<String> {
    match optional_str(args, key) {
        Some(s) if !s.is_empty() => Ok(s),
        _ => Err(PlaybookError::InvalidAction {
            action: action.to_string(),
            reason: format!("missing string argument '{key}'"),
        }),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
