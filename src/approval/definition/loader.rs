//! Catalog loader - YAML file loading and parsing
//!
//! A catalog file carries approval groups and workflow definitions together.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

use super::store::DefinitionStore;
use super::types::WorkflowDefinition;
use crate::approval::attributes::EventAttributes;
use crate::approval::registry::{ApprovalGroup, GroupRegistry};
use crate::error::{ApprovalError, EngineError};

/// Groups plus workflows, as authored
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Catalog {
    #[serde(default)]
    pub groups: Vec<ApprovalGroup>,
    #[serde(default)]
    pub workflows: Vec<WorkflowDefinition>,
}

impl Catalog {
    /// Validate every workflow and check each step's group is declared
    pub fn validate(&self) -> Result<(), ApprovalError> {
        let mut group_ids = HashSet::new();
        for group in &self.groups {
            if group.members.is_empty() {
                return Err(ApprovalError::invalid(format!(
                    "group '{}' has no members",
                    group.id
                )));
            }
            if !group_ids.insert(group.id.as_str()) {
                return Err(ApprovalError::invalid(format!(
                    "group '{}' declared twice",
                    group.id
                )));
            }
        }

        for workflow in &self.workflows {
            workflow.validate()?;
            for step in &workflow.steps {
                if !group_ids.contains(step.group.as_str()) {
                    return Err(ApprovalError::UnknownGroup(step.group.clone()));
                }
            }
        }
        Ok(())
    }

    /// Register the groups and publish the workflows
    pub async fn install(
        self,
        groups: &GroupRegistry,
        definitions: &DefinitionStore,
    ) -> Result<(), ApprovalError> {
        self.validate()?;
        for group in self.groups {
            groups.register(group).await?;
        }
        for workflow in self.workflows {
            definitions.publish(workflow, groups).await?;
        }
        Ok(())
    }
}

/// Loads catalogs and event snapshots from YAML (or JSON) files
pub struct DefinitionLoader;

impl DefinitionLoader {
    pub fn new() -> Self {
        Self
    }

    /// Load and validate a catalog from a YAML file
    pub fn load_catalog<P: AsRef<Path>>(&self, path: P) -> Result<Catalog, EngineError> {
        let content = fs::read_to_string(path)?;
        Self::parse_yaml(&content)
    }

    /// Parse and validate a catalog from a YAML string
    pub fn parse_yaml(content: &str) -> Result<Catalog, EngineError> {
        let catalog: Catalog = serde_yaml::from_str(content)?;
        catalog.validate()?;
        Ok(catalog)
    }

    /// Load an event attribute snapshot
    pub fn load_attributes<P: AsRef<Path>>(&self, path: P) -> Result<EventAttributes, EngineError> {
        let content = fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&content)?)
    }
}

impl Default for DefinitionLoader {
    fn default() -> Self {
        Self::new()
    }
}
