use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::workspace::{Workspace, DEFAULT_EXTENSION};

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// WorkspaceConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    #[serde(default = "default_workspace_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_extension")]
    pub extension: String,
}

fn default_workspace_dir() -> PathBuf {
    std::env::temp_dir()
}

fn default_extension() -> String {
    DEFAULT_EXTENSION.to_string()
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            dir: default_workspace_dir(),
            extension: default_extension(),
        }
    }
}

impl WorkspaceConfig {
    pub fn build(&self) -> Workspace {
        Workspace::new(&self.dir, &self.extension)
    }
}

// ---------------------------------------------------------------------------
// RunnerConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunnerConfig {
    #[serde(default = "default_executable")]
    pub executable: String,
    /// Number of `v`s in the verbosity flag; 0 omits it.
    #[serde(default = "default_verbosity")]
    pub verbosity: u8,
    #[serde(default = "default_force_color")]
    pub force_color: bool,
    #[serde(default)]
    pub extra_args: Vec<String>,
    /// Extra environment for the child process only.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

fn default_executable() -> String {
    "ansible-playbook".to_string()
}

fn default_verbosity() -> u8 {
    2
}

fn default_force_color() -> bool {
    true
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            executable: default_executable(),
            verbosity: default_verbosity(),
            force_color: default_force_color(),
            extra_args: Vec::new(),
            env: BTreeMap::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// OutputConfig / LogConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Records buffered per channel before slow subscribers start lagging.
    #[serde(default = "default_capacity")]
    pub capacity: usize,
    /// How long output may keep arriving after the runner has exited.
    #[serde(default = "default_drain_timeout_ms")]
    pub drain_timeout_ms: u64,
}

fn default_capacity() -> usize {
    1024
}

fn default_drain_timeout_ms() -> u64 {
    1000
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            drain_timeout_ms: default_drain_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// ExecutorConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutorConfig {
    #[serde(default)]
    pub workspace: WorkspaceConfig,
    #[serde(default)]
    pub runner: RunnerConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub log: LogConfig,
}

impl ExecutorConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        let cfg: ExecutorConfig = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    /// Load `path` if given, defaults otherwise.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::load(p),
            None => Ok(Self::default()),
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(path, data.as_bytes())?;
        Ok(())
    }

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        if self.runner.executable.trim().is_empty() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "runner.executable is empty".to_string(),
            });
        }

        if self.runner.verbosity > 4 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: format!(
                    "runner.verbosity={} is above the runner maximum of 4",
                    self.runner.verbosity
                ),
            });
        }

        if self.output.capacity == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "output.capacity must be greater than 0".to_string(),
            });
        }

        if self.workspace.dir.is_relative() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: format!(
                    "workspace.dir '{}' is relative; artifacts land under the current directory",
                    self.workspace.dir.display()
                ),
            });
        }

        if self.workspace.extension.is_empty() || self.workspace.extension.contains('/') {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: format!(
                    "workspace.extension '{}' is not a valid file extension",
                    self.workspace.extension
                ),
            });
        }

        warnings
    }

    pub fn has_errors(&self) -> bool {
        self.validate().iter().any(|w| w.level == WarnLevel::Error)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn empty_file_yields_defaults() {
        let cfg: ExecutorConfig = serde_yaml::from_str("{}").unwrap();
        assert_eq!(cfg, ExecutorConfig::default());
        assert_eq!(cfg.runner.executable, "ansible-playbook");
        assert_eq!(cfg.runner.verbosity, 2);
        assert!(cfg.runner.force_color);
        assert_eq!(cfg.output.capacity, 1024);
        assert_eq!(cfg.output.drain_timeout_ms, 1000);
        assert_eq!(cfg.workspace.extension, "yml");
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let yaml = "runner:\n  executable: /opt/bin/runner\nlog:\n  format: json\n";
        let cfg: ExecutorConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.runner.executable, "/opt/bin/runner");
        assert_eq!(cfg.runner.verbosity, 2);
        assert_eq!(cfg.log.format, LogFormat::Json);
        assert_eq!(cfg.log.level, "info");
    }

    #[test]
    fn save_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        let mut cfg = ExecutorConfig::default();
        cfg.runner.extra_args = vec!["--check".into()];
        cfg.runner.env.insert("ANSIBLE_NOCOWS".into(), "1".into());
        cfg.save(&path).unwrap();
        assert_eq!(ExecutorConfig::load(&path).unwrap(), cfg);
    }

    #[test]
    fn load_missing_file_fails() {
        let dir = TempDir::new().unwrap();
        assert!(ExecutorConfig::load(&dir.path().join("nope.yaml")).is_err());
        assert!(ExecutorConfig::load_or_default(None).is_ok());
    }

    #[test]
    fn validate_default_has_no_warnings() {
        let mut cfg = ExecutorConfig::default();
        cfg.workspace.dir = PathBuf::from("/tmp");
        assert!(cfg.validate().is_empty());
    }

    #[test]
    fn validate_flags_bad_values() {
        let mut cfg = ExecutorConfig::default();
        cfg.runner.executable = " ".into();
        cfg.runner.verbosity = 7;
        cfg.output.capacity = 0;
        cfg.workspace.dir = PathBuf::from("relative/dir");
        let warnings = cfg.validate();
        assert!(warnings.iter().any(|w| w.message.contains("runner.executable")));
        assert!(warnings.iter().any(|w| w.message.contains("verbosity=7")));
        assert!(warnings.iter().any(|w| w.message.contains("output.capacity")));
        assert!(warnings.iter().any(|w| w.message.contains("relative")));
        assert!(cfg.has_errors());
    }
}
