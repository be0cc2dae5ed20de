use std::collections::{BTreeMap, BTreeSet};

/// Named collection of host groups.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Inventory {
    pub id: String,
    pub name: String,
    pub groups: BTreeMap<String, BTreeSet<String>>,
}

impl Inventory {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    /// Add `hosts` to `group`, creating the group if needed.
    pub fn with_group<I, S>(mut self, group: impl Into<String>, hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.add_hosts(group, hosts);
        self
    }

    pub fn add_hosts<I, S>(&mut self, group: impl Into<String>, hosts: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.groups
            .entry(group.into())
            .or_default()
            .extend(hosts.into_iter().map(Into::into));
    }

    pub fn hosts(&self, group: &str) -> Option<&BTreeSet<String>> {
        self.groups.get(group)
    }
}
