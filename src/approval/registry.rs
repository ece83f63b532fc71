// SPDX-License-Identifier: MIT

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;

use super::quorum::QuorumPolicy;
use crate::error::ApprovalError;

/// A named set of approvers with a default quorum policy
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ApprovalGroup {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub quorum: QuorumPolicy,
    pub members: BTreeSet<String>,
}

impl ApprovalGroup {
    pub fn new<I, S>(id: impl Into<String>, quorum: QuorumPolicy, members: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            quorum,
            members: members.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_member(&self, member_id: &str) -> bool {
        self.members.contains(member_id)
    }
}

/// Source of group snapshots for the state machine
pub trait GroupSource {
    fn group(&self, id: &str) -> Option<&ApprovalGroup>;
}

impl GroupSource for HashMap<String, ApprovalGroup> {
    fn group(&self, id: &str) -> Option<&ApprovalGroup> {
        self.get(id)
    }
}

/// Shared registry of approval groups.
///
/// Groups can be replaced (membership changes) but never removed, so a step
/// that references a group can always be opened.
#[derive(Clone)]
pub struct GroupRegistry {
    groups: Arc<RwLock<HashMap<String, ApprovalGroup>>>,
}

impl GroupRegistry {
    pub fn new() -> Self {
        Self {
            groups: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Register or replace a group
    pub async fn register(&self, group: ApprovalGroup) -> Result<(), ApprovalError> {
        if group.members.is_empty() {
            return Err(ApprovalError::invalid(format!(
                "group '{}' has no members",
                group.id
            )));
        }
        let mut groups = self.groups.write().await;
        if groups.insert(group.id.clone(), group.clone()).is_some() {
            log::info!(
                "Replaced approval group '{}' ({} members)",
                group.id,
                group.members.len()
            );
        }
        Ok(())
    }

    pub async fn get(&self, id: &str) -> Option<ApprovalGroup> {
        let groups = self.groups.read().await;
        groups.get(id).cloned()
    }

    pub async fn contains(&self, id: &str) -> bool {
        self.groups.read().await.contains_key(id)
    }

    /// Copy the named groups as they are right now. Unknown ids are skipped.
    pub async fn snapshot<'a, I>(&self, ids: I) -> HashMap<String, ApprovalGroup>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let groups = self.groups.read().await;
        ids.into_iter()
            .filter_map(|id| groups.get(id).map(|g| (id.to_string(), g.clone())))
            .collect()
    }

    pub async fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.groups.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }
}

impl Default for GroupRegistry {
    fn default() -> Self {
        Self::new()
    }
}
