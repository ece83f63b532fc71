// SPDX-License-Identifier: MIT

//! Typed error handling for approval-flow
//!
//! `ApprovalError` covers everything the routing engine itself can reject.
//! `EngineError` wraps it together with the I/O, parsing and configuration
//! failures raised by the loader and the CLI.

use thiserror::Error;

use crate::approval::attributes::FieldKind;
use crate::approval::run::{RunId, RunStatus};

/// Top-level error type for approval-flow
#[derive(Debug, Error)]
pub enum EngineError {
    /// Routing engine errors
    #[error("Approval error: {0}")]
    Approval(#[from] ApprovalError),

    /// Configuration errors (invalid env values)
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    /// Generic error wrapper
    #[error("{0}")]
    Other(String),
}

/// Errors raised by the approval routing engine
///
/// Definition errors (`MalformedExpression`, `EmptyWorkflow`,
/// `InvalidDefinition`, `UnknownGroup`) surface at authoring or submission
/// time. `UnknownMember` rejects a single decision. None of them leave a run
/// in a half-updated state.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ApprovalError {
    /// A condition references an unknown field, misuses an operator or is
    /// structurally invalid
    #[error("Malformed expression: {0}")]
    MalformedExpression(String),

    /// No step of the workflow applies to the submitted event
    #[error("No applicable approval step for organization '{organization_id}'")]
    EmptyWorkflow { organization_id: String },

    /// The organization has never published a workflow
    #[error("No workflow defined for organization '{organization_id}'")]
    NoWorkflowDefined { organization_id: String },

    /// The decider is not part of the step's member snapshot
    #[error("Member '{member_id}' may not decide on step {ordinal}")]
    UnknownMember { member_id: String, ordinal: u32 },

    /// A step references a group the registry does not know
    #[error("Approval group '{0}' not found")]
    UnknownGroup(String),

    /// Structural problems with a definition or group
    #[error("Invalid definition: {0}")]
    InvalidDefinition(String),

    /// No run with this id
    #[error("Approval run {0} not found")]
    RunNotFound(RunId),

    /// The run already finished and cannot take this request
    #[error("Approval run {run_id} is already {status}")]
    RunTerminal { run_id: RunId, status: RunStatus },

    /// The run is still collecting decisions
    #[error("Approval run {run_id} is still {status}")]
    RunInProgress { run_id: RunId, status: RunStatus },

    /// An event attribute does not match the type its workflow declares
    #[error("Attribute '{field}' is declared {expected} but the event has {found}")]
    AttributeMismatch {
        field: String,
        expected: FieldKind,
        found: FieldKind,
    },
}

impl ApprovalError {
    /// Create a malformed expression error
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedExpression(message.into())
    }

    /// Create an invalid definition error
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidDefinition(message.into())
    }
}

impl EngineError {
    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create from a generic error
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }
}

impl From<String> for EngineError {
    fn from(s: String) -> Self {
        Self::Other(s)
    }
}
