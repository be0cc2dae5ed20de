//! Pure transforms from the domain model to a generic [`Document`] and from
//! a document to text.
//!
//! Serialization is all-or-nothing: every value is checked before it is
//! placed in the output, and the first unrepresentable one aborts with
//! [`PlaybookError::Serialization`] naming its location. A value is
//! representable when it survives a round trip through JSON with string map
//! keys: no YAML tags, no NaN or infinite floats, no non-string keys.

use serde_yaml::{Mapping, Value};

use crate::error::{PlaybookError, Result};
use crate::inventory::Inventory;
use crate::playbook::{Play, Playbook, Task};

/// Generic nested-mapping form handed to the text encoder.
pub type Document = Value;

/// Serialize a playbook into a sequence of play documents.
pub fn playbook_document(book: &Playbook) -> Result<Document> {
    let plays = book
        .plays
        .iter()
        .enumerate()
        .map(|(i, play)| play_document(play, book.r#become, &format!("plays[{i}]")))
        .collect::<Result<Vec<_>>>()?;
    Ok(Value::Sequence(plays))
}

fn play_document(play: &Play, r#become: bool, path: &str) -> Result<Document> {
    let mut m = Mapping::new();
    m.insert("name".into(), Value::String(play.name.clone()));
    m.insert("hosts".into(), Value::String(play.hosts.clone()));
    if r#become {
        m.insert("become".into(), Value::Bool(true));
    }

    check_mapping(&play.vars, &format!("{path}.vars"))?;
    m.insert("vars".into(), Value::Mapping(play.vars.clone()));
    m.insert("any_errors_fatal".into(), Value::Bool(play.any_errors_fatal));

    let tasks = play
        .tasks
        .iter()
        .enumerate()
        .map(|(i, task)| task_document(task, &format!("{path}.tasks[{i}]")))
        .collect::<Result<Vec<_>>>()?;
    m.insert("tasks".into(), Value::Sequence(tasks));
    Ok(Value::Mapping(m))
}

fn task_document(task: &Task, path: &str) -> Result<Document> {
    let mut m = Mapping::new();
    if let Some(name) = &task.name {
        m.insert("name".into(), Value::String(name.clone()));
    }
    if let Some(when) = task.when.as_deref().filter(|w| !w.is_empty()) {
        m.insert("when".into(), Value::String(when.to_string()));
    }
    if !task.with_items.is_empty() {
        let items = Value::Sequence(task.with_items.clone());
        check_value(&items, &format!("{path}.with_items"))?;
        m.insert("with_items".into(), items);
    }

    let id = task.action.identifier();
    if id.is_empty() {
        return Err(PlaybookError::serialization(
            path,
            "module action has an empty identifier",
        ));
    }
    let args = task.action.args();
    check_mapping(&args, &format!("{path}.{id}"))?;
    m.insert(Value::String(id.to_string()), Value::Mapping(args));
    Ok(Value::Mapping(m))
}

/// Serialize an inventory into `{group: {hosts: {host: {ansible_connection: local}}}}`.
pub fn inventory_document(inventory: &Inventory) -> Result<Document> {
    let mut groups = Mapping::new();
    for (group, hosts) in &inventory.groups {
        let mut entries = Mapping::new();
        for host in hosts {
            let mut vars = Mapping::new();
            vars.insert("ansible_connection".into(), "local".into());
            entries.insert(Value::String(host.clone()), Value::Mapping(vars));
        }
        let mut body = Mapping::new();
        body.insert("hosts".into(), Value::Mapping(entries));
        groups.insert(Value::String(group.clone()), Value::Mapping(body));
    }
    Ok(Value::Mapping(groups))
}

/// Encode a document as YAML text.
pub fn encode_yaml(doc: &Document) -> Result<String> {
    Ok(serde_yaml::to_string(doc)?)
}

pub fn render_playbook(book: &Playbook) -> Result<String> {
    encode_yaml(&playbook_document(book)?)
}

pub fn render_inventory(inventory: &Inventory) -> Result<String> {
    encode_yaml(&inventory_document(inventory)?)
}

// ---------------------------------------------------------------------------
// Representability checks
// ---------------------------------------------------------------------------

fn check_mapping(m: &Mapping, path: &str) -> Result<()> {
    for (k, v) in m {
        let Value::String(key) = k else {
            return Err(PlaybookError::serialization(
                path,
                format!("mapping key {k:?} is not a string"),
            ));
        };
        check_value(v, &format!("{path}.{key}"))?;
    }
    Ok(())
}

fn check_value(v: &Value, path: &str) -> Result<()> {
    match v {
        Value::Null | Value::Bool(_) | Value::String(_) => Ok(()),
        Value::Number(n) => {
            if n.is_nan() || n.is_infinite() {
                Err(PlaybookError::serialization(
                    path,
                    format!("non-finite number {n}"),
                ))
            } else {
                Ok(())
            }
        }
        Value::Sequence(items) => items
            .iter()
            .enumerate()
            .try_for_each(|(i, item)| check_value(item, &format!("{path}[{i}]"))),
        Value::Mapping(m) => check_mapping(m, path),
        Value::Tagged(t) => Err(PlaybookError::serialization(
            path,
            format!("tagged value {} is not supported", t.tag),
        )),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
