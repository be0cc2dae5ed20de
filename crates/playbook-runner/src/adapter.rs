use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use playbook_core::config::RunnerConfig;

/// Program, arguments, and extra environment for one runner invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    /// Set on the child only; the parent environment is untouched.
    pub env: BTreeMap<String, String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Default::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Program followed by its arguments.
    pub fn argv(&self) -> Vec<&str> {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect()
    }
}

/// Builds the runner command line for a pair of written artifacts.
pub trait RunnerAdapter: fmt::Debug + Send + Sync {
    fn command(&self, playbook: &Path, inventory: &Path) -> CommandSpec;
}

// ---------------------------------------------------------------------------
// AnsiblePlaybookAdapter
// ---------------------------------------------------------------------------

/// `ansible-playbook [-v…] --inventory <inventory> [extra…] <playbook>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnsiblePlaybookAdapter {
    pub executable: String,
    pub verbosity: u8,
    /// Sets `ANSIBLE_FORCE_COLOR=true` on the child.
    pub force_color: bool,
    pub extra_args: Vec<String>,
    pub env: BTreeMap<String, String>,
}

impl Default for AnsiblePlaybookAdapter {
    fn default() -> Self {
        Self::from(&RunnerConfig::default())
    }
}

impl From<&RunnerConfig> for AnsiblePlaybookAdapter {
    fn from(cfg: &RunnerConfig) -> Self {
        Self {
            executable: cfg.executable.clone(),
            verbosity: cfg.verbosity,
            force_color: cfg.force_color,
            extra_args: cfg.extra_args.clone(),
            env: cfg.env.clone(),
        }
    }
}

impl RunnerAdapter for AnsiblePlaybookAdapter {
    fn command(&self, playbook: &Path, inventory: &Path) -> CommandSpec {
        let mut spec = CommandSpec::new(&self.executable);
        if self.verbosity > 0 {
            let level = usize::from(self.verbosity.min(4));
            spec = spec.arg(format!("-{}", "v".repeat(level)));
        }
        spec = spec
            .arg("--inventory")
            .arg(inventory.display().to_string())
            .args(self.extra_args.iter().cloned())
            .arg(playbook.display().to_string());

        for (k, v) in &self.env {
            spec = spec.env(k, v);
        }
        if self.force_color {
            spec = spec.env("ANSIBLE_FORCE_COLOR", "true");
        }
        spec
    }
}
