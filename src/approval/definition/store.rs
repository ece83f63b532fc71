// SPDX-License-Identifier: MIT

//! Versioned workflow definitions per organization

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::types::WorkflowDefinition;
use crate::approval::registry::GroupRegistry;
use crate::error::ApprovalError;

/// Holds every published version of every organization's workflow.
///
/// Published versions are immutable. Runs keep the `Arc` they captured at
/// submission, so publishing a new version never touches them.
#[derive(Clone)]
pub struct DefinitionStore {
    versions: Arc<RwLock<HashMap<String, Vec<Arc<WorkflowDefinition>>>>>,
}

impl DefinitionStore {
    pub fn new() -> Self {
        Self {
            versions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Validate and publish a definition as the next version for its organization.
    ///
    /// Every group a step names must already be registered in `groups`.
    pub async fn publish(
        &self,
        mut definition: WorkflowDefinition,
        groups: &GroupRegistry,
    ) -> Result<Arc<WorkflowDefinition>, ApprovalError> {
        definition.validate()?;
        for id in definition.group_ids() {
            if !groups.contains(id).await {
                return Err(ApprovalError::UnknownGroup(id.to_string()));
            }
        }
        definition.sort_steps();

        let mut versions = self.versions.write().await;
        let history = versions
            .entry(definition.organization_id.clone())
            .or_default();
        definition.version = history.len() as u32 + 1;

        let published = Arc::new(definition);
        history.push(published.clone());
        log::info!(
            "Published workflow '{}' v{} for '{}' ({} steps)",
            published.name,
            published.version,
            published.organization_id,
            published.steps.len()
        );
        Ok(published)
    }

    /// Latest version for an organization
    pub async fn current(&self, organization_id: &str) -> Option<Arc<WorkflowDefinition>> {
        let versions = self.versions.read().await;
        versions
            .get(organization_id)
            .and_then(|history| history.last().cloned())
    }

    pub async fn version(
        &self,
        organization_id: &str,
        version: u32,
    ) -> Option<Arc<WorkflowDefinition>> {
        let versions = self.versions.read().await;
        let index = (version as usize).checked_sub(1)?;
        versions
            .get(organization_id)
            .and_then(|history| history.get(index).cloned())
    }

    pub async fn organizations(&self) -> Vec<String> {
        let mut orgs: Vec<String> = self.versions.read().await.keys().cloned().collect();
        orgs.sort();
        orgs
    }
}

impl Default for DefinitionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::approval::definition::Step;
    use crate::approval::quorum::QuorumPolicy;
    use crate::approval::registry::ApprovalGroup;

    async fn registry() -> GroupRegistry {
        let groups = GroupRegistry::new();
        for id in ["a", "b", "z"] {
            groups
                .register(ApprovalGroup::new(id, QuorumPolicy::AnyOne, ["alice"]))
                .await
                .unwrap();
        }
        groups
    }

    #[tokio::test]
    async fn test_publish_assigns_versions() {
        let store = DefinitionStore::new();
        let groups = registry().await;
        let v1 = store
            .publish(WorkflowDefinition::new("union", vec![Step::new(1, "a")]), &groups)
            .await
            .unwrap();
        let v2 = store
            .publish(
                WorkflowDefinition::new("union", vec![Step::new(1, "a"), Step::new(2, "b")]),
                &groups,
            )
            .await
            .unwrap();

        assert_eq!(v1.version, 1);
        assert_eq!(v2.version, 2);
        assert_eq!(store.current("union").await.unwrap().version, 2);
        assert_eq!(store.version("union", 1).await.unwrap().steps.len(), 1);
        assert!(store.version("union", 0).await.is_none());
        assert!(store.version("union", 3).await.is_none());
    }

    #[tokio::test]
    async fn test_earlier_versions_stay_untouched() {
        let store = DefinitionStore::new();
        let groups = registry().await;
        let captured = store
            .publish(WorkflowDefinition::new("union", vec![Step::new(1, "a")]), &groups)
            .await
            .unwrap();
        store
            .publish(WorkflowDefinition::new("union", vec![Step::new(1, "z")]), &groups)
            .await
            .unwrap();

        assert_eq!(captured.steps[0].group, "a");
    }

    #[tokio::test]
    async fn test_publish_sorts_steps() {
        let store = DefinitionStore::new();
        let groups = registry().await;
        let def = store
            .publish(
                WorkflowDefinition::new("union", vec![Step::new(2, "b"), Step::new(1, "a")]),
                &groups,
            )
            .await
            .unwrap();
        assert_eq!(def.steps[0].ordinal, 1);
    }

    #[tokio::test]
    async fn test_unknown_group_not_published() {
        let store = DefinitionStore::new();
        let groups = registry().await;
        let result = store
            .publish(
                WorkflowDefinition::new("union", vec![Step::new(1, "a"), Step::new(2, "deans")]),
                &groups,
            )
            .await;
        assert_eq!(
            result.unwrap_err(),
            ApprovalError::UnknownGroup("deans".to_string())
        );
        assert!(store.current("union").await.is_none());
    }

    #[tokio::test]
    async fn test_invalid_definition_not_published() {
        let store = DefinitionStore::new();
        let groups = registry().await;
        let result = store
            .publish(WorkflowDefinition::new("union", vec![]), &groups)
            .await;
        assert!(result.is_err());
        assert!(store.current("union").await.is_none());
        assert!(store.organizations().await.is_empty());
    }
}
