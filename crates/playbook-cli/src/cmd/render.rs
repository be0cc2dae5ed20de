use crate::output::print_json;
use playbook_core::document::{encode_yaml, inventory_document, playbook_document};
use std::path::Path;

pub fn run(playbook: &Path, inventory: Option<&Path>, json: bool) -> anyhow::Result<()> {
    let book = super::load_playbook(playbook, None)?;
    let book_doc = playbook_document(&book)?;

    let inventory_doc = match inventory {
        Some(path) => Some(inventory_document(&super::load_inventory(path)?)?),
        None => None,
    };

    if json {
        let value = serde_json::json!({
            "playbook": book_doc,
            "inventory": inventory_doc,
        });
        return print_json(&value);
    }

    print!("{}", encode_yaml(&book_doc)?);
    if let Some(doc) = inventory_doc {
        println!("---");
        print!("{}", encode_yaml(&doc)?);
    }
    Ok(())
}
