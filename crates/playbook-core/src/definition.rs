//! Serde shapes for playbook and inventory definition files.
//!
//! Definitions are what callers hand in over the wire or on disk; `build`
//! resolves each task's `{module, args}` pair through an [`ActionRegistry`]
//! into the typed domain model.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};

use crate::action::ActionRegistry;
use crate::error::{PlaybookError, Result};
use crate::inventory::Inventory;
use crate::playbook::{Play, Playbook, Task};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModuleActionDef {
    pub module: String,
    #[serde(default)]
    pub args: Mapping,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskDef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub module_action: ModuleActionDef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub when: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub with_items: Vec<Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlayDef {
    #[serde(default)]
    pub name: String,
    pub hosts: String,
    #[serde(default)]
    pub tasks: Vec<TaskDef>,
    #[serde(default)]
    pub vars: Mapping,
    #[serde(default)]
    pub any_errors_fatal: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlaybookDef {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub r#become: bool,
    #[serde(default)]
    pub plays: Vec<PlayDef>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InventoryDef {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub host_groups: BTreeMap<String, Vec<String>>,
}

impl TaskDef {
    pub fn build(&self, registry: &ActionRegistry) -> Result<Task> {
        let action = registry.build(&self.module_action.module, &self.module_action.args)?;
        Ok(Task {
            name: self.name.clone(),
            action,
            when: self.when.clone(),
            with_items: self.with_items.clone(),
        })
    }
}

impl PlayDef {
    pub fn build(&self, registry: &ActionRegistry) -> Result<Play> {
        let tasks = self
            .tasks
            .iter()
            .map(|t| t.build(registry))
            .collect::<Result<Vec<_>>>()?;
        Ok(Play {
            name: self.name.clone(),
            hosts: self.hosts.clone(),
            tasks,
            vars: self.vars.clone(),
            any_errors_fatal: self.any_errors_fatal,
        })
    }
}

impl PlaybookDef {
    /// Build the domain playbook. `fallback_id` is used when the definition
    /// carries no `id`.
    pub fn build(&self, registry: &ActionRegistry, fallback_id: &str) -> Result<Playbook> {
        let plays = self
            .plays
            .iter()
            .map(|p| p.build(registry))
            .collect::<Result<Vec<_>>>()?;
        Ok(Playbook {
            id: self.id.clone().unwrap_or_else(|| fallback_id.to_string()),
            name: self.name.clone(),
            description: self.description.clone(),
            r#become: self.r#become,
            plays,
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        load_file(path)
    }
}

impl InventoryDef {
    pub fn build(&self, fallback_id: &str) -> Inventory {
        let mut inventory = Inventory::new(self.id.clone().unwrap_or_else(|| fallback_id.to_string()));
        inventory.name = self.name.clone();
        for (group, hosts) in &self.host_groups {
            inventory.add_hosts(group.clone(), hosts.iter().cloned());
        }
        inventory
    }

    pub fn load(path: &Path) -> Result<Self> {
        load_file(path)
    }
}

/// Read a YAML (`.yaml`/`.yml`) or JSON (`.json`) definition file.
fn load_file<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let data = std::fs::read_to_string(path)?;
    match path.extension().and_then(|e| e.to_str()) {
        Some("yaml") | Some("yml") => Ok(serde_yaml::from_str(&data)?),
        Some("json") => Ok(serde_json::from_str(&data)?),
        other => Err(PlaybookError::UnsupportedFormat(
            other.unwrap_or("<none>").to_string(),
        )),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
