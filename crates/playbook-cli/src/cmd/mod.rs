pub mod config;
pub mod render;
pub mod run;

use std::path::Path;

use anyhow::Context;
use playbook_core::definition::{InventoryDef, PlaybookDef};
use playbook_core::{ActionRegistry, Inventory, Playbook};

/// Load and build a playbook definition. A definition without an `id` gets
/// `fallback_id`, or a fresh UUID when that is `None`.
pub fn load_playbook(path: &Path, fallback_id: Option<&str>) -> anyhow::Result<Playbook> {
    let def = PlaybookDef::load(path)
        .with_context(|| format!("failed to load playbook '{}'", path.display()))?;
    let fallback = fallback_id
        .map(str::to_string)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    def.build(&ActionRegistry::with_builtins(), &fallback)
        .with_context(|| format!("invalid playbook '{}'", path.display()))
}

pub fn load_inventory(path: &Path) -> anyhow::Result<Inventory> {
    let def = InventoryDef::load(path)
        .with_context(|| format!("failed to load inventory '{}'", path.display()))?;
    Ok(def.build(&uuid::Uuid::new_v4().to_string()))
}
