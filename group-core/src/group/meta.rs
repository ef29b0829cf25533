// group-core/src/group/meta.rs

use std::collections::HashMap;

use tokio::sync::RwLock;

use crate::config::GroupDefinition;

/// Process-local description of a group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupMeta {
    pub name: String,
    /// Read-time cap on `get_fds`; `None` or zero means unbounded.
    pub max_clients: Option<usize>,
}

impl GroupMeta {
    pub fn new(name: impl Into<String>, max_clients: Option<usize>) -> Self {
        Self {
            name: name.into(),
            max_clients,
        }
    }

    /// Sample size for `get_fds`, or `None` to return every member.
    pub fn sample_bound(&self) -> Option<usize> {
        self.max_clients.filter(|&n| n > 0)
    }
}

impl From<&GroupDefinition> for GroupMeta {
    fn from(def: &GroupDefinition) -> Self {
        Self::new(def.name.clone(), def.max_clients)
    }
}

/// Local group registry. Never holds membership data.
#[derive(Debug, Default)]
pub(crate) struct LocalGroups {
    groups: RwLock<HashMap<String, GroupMeta>>,
}

impl LocalGroups {
    pub(crate) fn from_definitions(defs: &[GroupDefinition]) -> Self {
        let groups = defs
            .iter()
            .map(|def| (def.name.clone(), GroupMeta::from(def)))
            .collect();
        Self {
            groups: RwLock::new(groups),
        }
    }

    /// Registers `meta` unless the name is already known.
    ///
    /// Returns true if it was inserted.
    pub(crate) async fn register(&self, meta: GroupMeta) -> bool {
        let mut groups = self.groups.write().await;
        if groups.contains_key(&meta.name) {
            return false;
        }
        groups.insert(meta.name.clone(), meta);
        true
    }

    pub(crate) async fn get(&self, name: &str) -> Option<GroupMeta> {
        self.groups.read().await.get(name).cloned()
    }

    pub(crate) async fn sample_bound(&self, name: &str) -> Option<usize> {
        self.groups
            .read()
            .await
            .get(name)
            .and_then(GroupMeta::sample_bound)
    }

    /// All known groups, sorted by name.
    pub(crate) async fn list(&self) -> Vec<GroupMeta> {
        let mut all: Vec<GroupMeta> = self.groups.read().await.values().cloned().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }
}
