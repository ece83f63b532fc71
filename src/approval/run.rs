// SPDX-License-Identifier: MIT

//! Approval runs and the state machine that advances them
//!
//! An `EventApprovalRun` is created once per submitted event. Its effective
//! step sequence is fixed at creation; afterwards only decisions and
//! cancellation move it forward. Every transition returns the events it
//! produced so the caller can publish them after the change is committed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use uuid::Uuid;

use super::attributes::EventAttributes;
use super::definition::{Step, TallyVisibility, WorkflowDefinition};
use super::notify::{ApprovalEvent, ApprovalEventKind};
use super::quorum::{QuorumPolicy, QuorumState, Tally};
use super::recorder::{self, Decision, Verdict};
use super::registry::{ApprovalGroup, GroupSource};
use super::resolver::resolve_effective_steps;
use crate::error::ApprovalError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(transparent)]
pub struct RunId(Uuid);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for RunId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    InProgress,
    Approved,
    Rejected,
    Cancelled,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunStatus::InProgress)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::InProgress => "in_progress",
            RunStatus::Approved => "approved",
            RunStatus::Rejected => "rejected",
            RunStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    InReview,
    Approved,
    Rejected,
    Skipped,
}

impl StepStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StepStatus::Approved | StepStatus::Rejected | StepStatus::Skipped
        )
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StepStatus::Pending => "pending",
            StepStatus::InReview => "in_review",
            StepStatus::Approved => "approved",
            StepStatus::Rejected => "rejected",
            StepStatus::Skipped => "skipped",
        };
        f.write_str(s)
    }
}

/// Runtime state of one effective step
#[derive(Debug, Clone)]
pub struct StepInstance {
    pub(crate) step: Step,
    pub(crate) status: StepStatus,
    /// Resolved when the step opens
    pub(crate) quorum: Option<QuorumPolicy>,
    /// Members allowed to decide, copied from the group when the step opens
    pub(crate) members: BTreeSet<String>,
    pub(crate) decisions: Vec<Decision>,
    pub(crate) opened_at: Option<DateTime<Utc>>,
    pub(crate) settled_at: Option<DateTime<Utc>>,
}

impl StepInstance {
    pub(crate) fn pending(step: Step) -> Self {
        Self {
            step,
            status: StepStatus::Pending,
            quorum: None,
            members: BTreeSet::new(),
            decisions: Vec::new(),
            opened_at: None,
            settled_at: None,
        }
    }

    pub(crate) fn open(&mut self, group: &ApprovalGroup) {
        self.quorum = Some(self.step.effective_quorum(group));
        self.members = group.members.clone();
        self.status = StepStatus::InReview;
        self.opened_at = Some(Utc::now());
    }

    fn settle(&mut self, status: StepStatus) {
        self.status = status;
        self.settled_at = Some(Utc::now());
    }

    pub fn ordinal(&self) -> u32 {
        self.step.ordinal
    }

    pub fn group_id(&self) -> &str {
        &self.step.group
    }

    pub fn step(&self) -> &Step {
        &self.step
    }

    pub fn status(&self) -> StepStatus {
        self.status
    }

    pub fn quorum(&self) -> Option<QuorumPolicy> {
        self.quorum
    }

    pub fn members(&self) -> &BTreeSet<String> {
        &self.members
    }

    pub fn decisions(&self) -> &[Decision] {
        &self.decisions
    }

    pub fn tally(&self) -> Tally {
        self.decisions
            .iter()
            .fold(Tally::default(), |mut tally, d| {
                match d.verdict {
                    Verdict::Approve => tally.approvals += 1,
                    Verdict::Reject => tally.rejections += 1,
                }
                tally
            })
    }

    /// Quorum outcome of the current tally. Pending until the step opens.
    pub fn quorum_state(&self) -> QuorumState {
        match self.quorum {
            Some(policy) => policy.evaluate(self.members.len(), self.tally()),
            None => QuorumState::Pending,
        }
    }

    fn view(&self, visibility: TallyVisibility) -> StepView {
        StepView {
            ordinal: self.ordinal(),
            group: self.step.group.clone(),
            name: self.step.name.clone(),
            status: self.status,
            quorum: self.quorum,
            members: self.members.len(),
            required: self
                .quorum
                .map(|q| q.required_approvals(self.members.len())),
            tally: self.tally(),
            voters: match visibility {
                TallyVisibility::Voters => Some(self.decisions.clone()),
                TallyVisibility::Counts => None,
            },
            opened_at: self.opened_at,
            settled_at: self.settled_at,
        }
    }
}

/// Why a decision did not affect the run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StaleReason {
    /// The run already reached a terminal status
    RunTerminal,
    /// The decision names a step that is not the active one
    StepNotActive,
}

impl fmt::Display for StaleReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StaleReason::RunTerminal => write!(f, "run is terminal"),
            StaleReason::StepNotActive => write!(f, "step is not active"),
        }
    }
}

/// Result of feeding one decision to a run
#[derive(Debug, Clone, PartialEq)]
pub enum Applied {
    Recorded {
        /// Status of the decided step after the decision
        step_status: StepStatus,
        /// False when the member repeated an earlier verdict
        changed: bool,
        events: Vec<ApprovalEvent>,
    },
    Stale(StaleReason),
}

/// One event's journey through its approval workflow
#[derive(Debug, Clone)]
pub struct EventApprovalRun {
    id: RunId,
    definition: Arc<WorkflowDefinition>,
    attributes: EventAttributes,
    steps: Vec<StepInstance>,
    status: RunStatus,
    active: Option<usize>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl EventApprovalRun {
    /// Resolve the effective steps for `attributes` and open the first one
    pub fn start(
        id: RunId,
        definition: Arc<WorkflowDefinition>,
        attributes: EventAttributes,
        groups: &dyn GroupSource,
    ) -> Result<(Self, Vec<ApprovalEvent>), ApprovalError> {
        let mut steps: Vec<StepInstance> = resolve_effective_steps(&definition, &attributes)?
            .into_iter()
            .cloned()
            .map(StepInstance::pending)
            .collect();

        let first = &mut steps[0];
        let group = lookup(groups, first.group_id())?;
        first.open(group);
        let events = vec![ApprovalEvent::step(
            id,
            ApprovalEventKind::StepOpened,
            first.ordinal(),
            StepStatus::InReview,
        )];

        let now = Utc::now();
        let run = Self {
            id,
            definition,
            attributes,
            steps,
            status: RunStatus::InProgress,
            active: Some(0),
            created_at: now,
            updated_at: now,
        };
        Ok((run, events))
    }

    /// Record a decision on the step with `ordinal` and advance the run if
    /// the step's quorum settles.
    ///
    /// Nothing is modified when an error is returned.
    pub fn apply_decision(
        &mut self,
        ordinal: u32,
        decision: Decision,
        groups: &dyn GroupSource,
    ) -> Result<Applied, ApprovalError> {
        if self.status.is_terminal() {
            return Ok(Applied::Stale(StaleReason::RunTerminal));
        }
        let idx = match self.active {
            Some(idx) if self.steps[idx].ordinal() == ordinal => idx,
            _ => return Ok(Applied::Stale(StaleReason::StepNotActive)),
        };

        // Record on a copy so a failed lookup of the next group leaves the
        // step as it was.
        let mut step = self.steps[idx].clone();
        let outcome = recorder::record(&mut step, decision)?;
        if !outcome.changed() {
            return Ok(Applied::Recorded {
                step_status: step.status,
                changed: false,
                events: Vec::new(),
            });
        }

        let quorum = step.quorum_state();
        let next_group = match (quorum, self.steps.get(idx + 1)) {
            (QuorumState::Approved, Some(next)) => Some(lookup(groups, next.group_id())?),
            _ => None,
        };
        self.steps[idx] = step;
        self.updated_at = Utc::now();

        let events = match quorum {
            QuorumState::Pending => Vec::new(),
            QuorumState::Approved => self.approve_step(idx, next_group),
            QuorumState::Rejected => self.reject_step(idx),
        };
        Ok(Applied::Recorded {
            step_status: self.steps[idx].status,
            changed: true,
            events,
        })
    }

    fn approve_step(&mut self, idx: usize, next_group: Option<&ApprovalGroup>) -> Vec<ApprovalEvent> {
        let step = &mut self.steps[idx];
        step.settle(StepStatus::Approved);
        let mut events = vec![ApprovalEvent::step(
            self.id,
            ApprovalEventKind::StepApproved,
            step.ordinal(),
            StepStatus::Approved,
        )];

        match next_group {
            Some(group) => {
                let next = &mut self.steps[idx + 1];
                next.open(group);
                self.active = Some(idx + 1);
                events.push(ApprovalEvent::step(
                    self.id,
                    ApprovalEventKind::StepOpened,
                    next.ordinal(),
                    StepStatus::InReview,
                ));
            }
            None => {
                self.finish(RunStatus::Approved);
                events.push(ApprovalEvent::run(
                    self.id,
                    ApprovalEventKind::RunApproved,
                    RunStatus::Approved,
                ));
            }
        }
        events
    }

    fn reject_step(&mut self, idx: usize) -> Vec<ApprovalEvent> {
        let step = &mut self.steps[idx];
        step.settle(StepStatus::Rejected);
        let ordinal = step.ordinal();
        self.skip_unsettled();
        self.finish(RunStatus::Rejected);
        vec![
            ApprovalEvent::step(
                self.id,
                ApprovalEventKind::StepRejected,
                ordinal,
                StepStatus::Rejected,
            ),
            ApprovalEvent::run(self.id, ApprovalEventKind::RunRejected, RunStatus::Rejected),
        ]
    }

    /// Withdraw the event. Repeating a cancel is a no-op.
    pub fn cancel(&mut self) -> Result<Vec<ApprovalEvent>, ApprovalError> {
        match self.status {
            RunStatus::Cancelled => Ok(Vec::new()),
            RunStatus::Approved | RunStatus::Rejected => Err(ApprovalError::RunTerminal {
                run_id: self.id,
                status: self.status,
            }),
            RunStatus::InProgress => {
                self.skip_unsettled();
                self.finish(RunStatus::Cancelled);
                Ok(vec![ApprovalEvent::run(
                    self.id,
                    ApprovalEventKind::RunCancelled,
                    RunStatus::Cancelled,
                )])
            }
        }
    }

    fn skip_unsettled(&mut self) {
        for step in self.steps.iter_mut().filter(|s| !s.status.is_terminal()) {
            step.settle(StepStatus::Skipped);
        }
    }

    fn finish(&mut self, status: RunStatus) {
        self.status = status;
        self.active = None;
        self.updated_at = Utc::now();
    }

    pub fn id(&self) -> RunId {
        self.id
    }

    pub fn status(&self) -> RunStatus {
        self.status
    }

    pub fn definition(&self) -> &Arc<WorkflowDefinition> {
        &self.definition
    }

    pub fn attributes(&self) -> &EventAttributes {
        &self.attributes
    }

    pub fn steps(&self) -> &[StepInstance] {
        &self.steps
    }

    /// Index of the step under review; `None` once terminal
    pub fn active_step(&self) -> Option<usize> {
        self.active
    }

    pub fn active_ordinal(&self) -> Option<u32> {
        self.active.map(|idx| self.steps[idx].ordinal())
    }

    pub fn view(&self, visibility: TallyVisibility) -> RunStatusView {
        RunStatusView {
            run_id: self.id,
            organization_id: self.definition.organization_id.clone(),
            definition_version: self.definition.version,
            status: self.status,
            active_step: self.active,
            active_ordinal: self.active_ordinal(),
            steps: self.steps.iter().map(|s| s.view(visibility)).collect(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

fn lookup<'g>(groups: &'g dyn GroupSource, id: &str) -> Result<&'g ApprovalGroup, ApprovalError> {
    groups
        .group(id)
        .ok_or_else(|| ApprovalError::UnknownGroup(id.to_string()))
}

/// Read-only snapshot of a run for status queries
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunStatusView {
    pub run_id: RunId,
    pub organization_id: String,
    pub definition_version: u32,
    pub status: RunStatus,
    pub active_step: Option<usize>,
    pub active_ordinal: Option<u32>,
    pub steps: Vec<StepView>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepView {
    pub ordinal: u32,
    pub group: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub status: StepStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quorum: Option<QuorumPolicy>,
    pub members: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required: Option<usize>,
    pub tally: Tally,
    /// Individual decisions, only under voter visibility
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voters: Option<Vec<Decision>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub opened_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settled_at: Option<DateTime<Utc>>,
}
