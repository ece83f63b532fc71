// SPDX-License-Identifier: MIT

//! Workflow definition types
//!
//! These are the structures organizations author (usually as YAML) to say
//! which approval groups review their events and under what conditions.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::approval::attributes::{builtin_kind, EventAttributes, FieldKind};
use crate::approval::condition::{self, ConditionGroup};
use crate::approval::quorum::QuorumPolicy;
use crate::approval::registry::ApprovalGroup;
use crate::error::ApprovalError;

/// Whether status queries expose who voted, or only the counts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TallyVisibility {
    #[default]
    Counts,
    Voters,
}

/// A custom event attribute an organization may branch on
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct FieldDefinition {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: FieldKind,
    #[serde(default)]
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Authored form of a step: the condition may be text or a tree
#[derive(Debug, Deserialize)]
struct StepDefinition {
    ordinal: u32,
    group: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    when: Option<String>,
    #[serde(default)]
    condition: Option<ConditionGroup>,
    #[serde(default)]
    quorum: Option<QuorumPolicy>,
}

/// One approval step of a workflow
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(try_from = "StepDefinition")]
pub struct Step {
    /// Position within the definition, unique per definition
    pub ordinal: u32,
    /// Approval group that reviews this step
    pub group: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Absent means the step always applies
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<ConditionGroup>,
    /// Overrides the group's own policy
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quorum: Option<QuorumPolicy>,
}

impl TryFrom<StepDefinition> for Step {
    type Error = ApprovalError;

    fn try_from(raw: StepDefinition) -> Result<Self, Self::Error> {
        let condition = match (raw.when, raw.condition) {
            (Some(_), Some(_)) => {
                return Err(ApprovalError::invalid(format!(
                    "step {} sets both 'when' and 'condition'",
                    raw.ordinal
                )))
            }
            (Some(text), None) => Some(condition::parse(&text)?),
            (None, tree) => tree,
        };
        Ok(Step {
            ordinal: raw.ordinal,
            group: raw.group,
            name: raw.name,
            condition,
            quorum: raw.quorum,
        })
    }
}

impl Step {
    pub fn new(ordinal: u32, group: impl Into<String>) -> Self {
        Self {
            ordinal,
            group: group.into(),
            name: None,
            condition: None,
            quorum: None,
        }
    }

    pub fn when(mut self, condition: ConditionGroup) -> Self {
        self.condition = Some(condition);
        self
    }

    pub fn with_quorum(mut self, quorum: QuorumPolicy) -> Self {
        self.quorum = Some(quorum);
        self
    }

    /// The step's override, or else the group's policy
    pub fn effective_quorum(&self, group: &ApprovalGroup) -> QuorumPolicy {
        self.quorum.unwrap_or(group.quorum)
    }

    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.group)
    }
}

/// An organization's approval workflow, one version of it
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct WorkflowDefinition {
    pub organization_id: String,
    #[serde(default)]
    pub name: String,
    /// Assigned by the definition store on publish
    #[serde(default)]
    pub version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tally_visibility: Option<TallyVisibility>,
    #[serde(default)]
    pub fields: Vec<FieldDefinition>,
    pub steps: Vec<Step>,
}

impl WorkflowDefinition {
    pub fn new(organization_id: impl Into<String>, steps: Vec<Step>) -> Self {
        let organization_id = organization_id.into();
        Self {
            name: organization_id.clone(),
            organization_id,
            version: 0,
            tally_visibility: None,
            fields: Vec::new(),
            steps,
        }
    }

    pub fn with_field(mut self, field: FieldDefinition) -> Self {
        self.fields.push(field);
        self
    }

    /// Type of a builtin or declared custom field
    pub fn field_kind(&self, name: &str) -> Option<FieldKind> {
        builtin_kind(name).or_else(|| {
            self.fields
                .iter()
                .find(|f| f.name == name)
                .map(|f| f.kind)
        })
    }

    /// Put steps in ordinal order
    pub fn sort_steps(&mut self) {
        self.steps.sort_by_key(|s| s.ordinal);
    }

    /// Distinct group ids referenced by the steps, in step order
    pub fn group_ids(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.steps
            .iter()
            .map(|s| s.group.as_str())
            .filter(|g| seen.insert(*g))
            .collect()
    }

    /// Bring declared custom attributes to their declared type.
    ///
    /// A date written as text becomes a date, and a date-shaped value of a
    /// text field stays text. Anything else that does not fit is an
    /// `AttributeMismatch`. Undeclared or absent attributes are left alone.
    pub fn conform_attributes(&self, attrs: &mut EventAttributes) -> Result<(), ApprovalError> {
        for field in &self.fields {
            if let Some(value) = attrs.custom.get_mut(&field.name) {
                let conformed = value.coerce(field.kind).ok_or_else(|| {
                    ApprovalError::AttributeMismatch {
                        field: field.name.clone(),
                        expected: field.kind,
                        found: value.kind(),
                    }
                })?;
                *value = conformed;
            }
        }
        Ok(())
    }

    /// Check structure and every step condition. Never repairs anything.
    pub fn validate(&self) -> Result<(), ApprovalError> {
        if self.steps.is_empty() {
            return Err(ApprovalError::invalid(format!(
                "workflow for '{}' has no steps",
                self.organization_id
            )));
        }

        let mut names = HashSet::new();
        for field in &self.fields {
            if builtin_kind(&field.name).is_some() {
                return Err(ApprovalError::invalid(format!(
                    "custom field '{}' shadows a builtin attribute",
                    field.name
                )));
            }
            if field.kind == FieldKind::Visibility {
                return Err(ApprovalError::invalid(format!(
                    "custom field '{}' cannot have type visibility",
                    field.name
                )));
            }
            if !names.insert(field.name.as_str()) {
                return Err(ApprovalError::invalid(format!(
                    "custom field '{}' declared twice",
                    field.name
                )));
            }
        }

        let mut ordinals = HashSet::new();
        for step in &self.steps {
            if !ordinals.insert(step.ordinal) {
                return Err(ApprovalError::invalid(format!(
                    "duplicate step ordinal {}",
                    step.ordinal
                )));
            }
            if let Some(tree) = &step.condition {
                condition::validate(tree, &|name: &str| self.field_kind(name)).map_err(
                    |e| match e {
                        ApprovalError::MalformedExpression(msg) => {
                            ApprovalError::malformed(format!("step {}: {}", step.ordinal, msg))
                        }
                        other => other,
                    },
                )?;
            }
        }
        Ok(())
    }
}
