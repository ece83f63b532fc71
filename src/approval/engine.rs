// SPDX-License-Identifier: MIT

//! Approval engine - the entry point embedders call
//!
//! Each run sits behind its own mutex, so decisions on one run are
//! serialized while different runs proceed independently. Status reads are
//! served from a `watch` snapshot and never wait on a writer.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;

use super::attributes::EventAttributes;
use super::definition::{DefinitionStore, TallyVisibility, WorkflowDefinition};
use super::notify::{Dispatcher, NotificationSink, Outbox};
use super::recorder::{Decision, Verdict};
use super::registry::GroupRegistry;
use super::run::{
    Applied, EventApprovalRun, RunId, RunStatus, RunStatusView, StaleReason, StepStatus,
};
use crate::config::EngineConfig;
use crate::error::ApprovalError;

struct RunHandle {
    run: Mutex<EventApprovalRun>,
    view: watch::Sender<RunStatusView>,
    visibility: TallyVisibility,
}

impl RunHandle {
    fn refresh(&self, run: &EventApprovalRun) {
        self.view.send_replace(run.view(self.visibility));
    }
}

/// Result of submitting an event
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Submission {
    pub run_id: RunId,
    pub status: RunStatus,
    pub active_step: Option<usize>,
    pub active_ordinal: Option<u32>,
}

/// A member's verdict addressed to one step of one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecisionRequest {
    pub run_id: RunId,
    /// Ordinal of the step the member believes is active
    pub ordinal: u32,
    pub member_id: String,
    pub verdict: Verdict,
}

impl DecisionRequest {
    pub fn new(run_id: RunId, ordinal: u32, member_id: impl Into<String>, verdict: Verdict) -> Self {
        Self {
            run_id,
            ordinal,
            member_id: member_id.into(),
            verdict,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DecisionOutcome {
    Recorded {
        status: RunStatus,
        active_step: Option<usize>,
        active_ordinal: Option<u32>,
        step_status: StepStatus,
        changed: bool,
    },
    /// The decision was ignored; the run is unchanged
    Stale {
        reason: StaleReason,
        status: RunStatus,
        active_step: Option<usize>,
    },
}

impl DecisionOutcome {
    pub fn status(&self) -> RunStatus {
        match self {
            DecisionOutcome::Recorded { status, .. } | DecisionOutcome::Stale { status, .. } => {
                *status
            }
        }
    }

    pub fn is_stale(&self) -> bool {
        matches!(self, DecisionOutcome::Stale { .. })
    }
}

pub struct ApprovalEngine {
    config: EngineConfig,
    definitions: DefinitionStore,
    groups: GroupRegistry,
    runs: RwLock<HashMap<RunId, Arc<RunHandle>>>,
    outbox: Outbox,
}

impl ApprovalEngine {
    pub fn new(
        config: EngineConfig,
        definitions: DefinitionStore,
        groups: GroupRegistry,
        outbox: Outbox,
    ) -> Self {
        Self {
            config,
            definitions,
            groups,
            runs: RwLock::new(HashMap::new()),
            outbox,
        }
    }

    /// Build an engine with a dispatcher delivering to `sinks`.
    ///
    /// The dispatcher stops once the engine is dropped.
    pub fn with_sinks(
        config: EngineConfig,
        definitions: DefinitionStore,
        groups: GroupRegistry,
        sinks: Vec<Arc<dyn NotificationSink>>,
    ) -> (Self, JoinHandle<()>) {
        let (outbox, rx) = Outbox::channel();
        let dispatcher = Dispatcher::new(rx, sinks, config.delivery.clone()).spawn();
        (Self::new(config, definitions, groups, outbox), dispatcher)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn definitions(&self) -> &DefinitionStore {
        &self.definitions
    }

    pub fn groups(&self) -> &GroupRegistry {
        &self.groups
    }

    /// Publish the next workflow version for an organization.
    ///
    /// Fails with `UnknownGroup` when a step names a group that is not
    /// registered with this engine.
    pub async fn publish(
        &self,
        definition: WorkflowDefinition,
    ) -> Result<Arc<WorkflowDefinition>, ApprovalError> {
        self.definitions.publish(definition, &self.groups).await
    }

    /// Start an approval run against the organization's current workflow
    pub async fn submit(&self, mut attributes: EventAttributes) -> Result<Submission, ApprovalError> {
        let definition = self
            .definitions
            .current(&attributes.organization_id)
            .await
            .ok_or_else(|| ApprovalError::NoWorkflowDefined {
                organization_id: attributes.organization_id.clone(),
            })?;

        definition.conform_attributes(&mut attributes)?;

        let groups = self.groups.snapshot(definition.group_ids()).await;
        let run_id = RunId::new();
        let (run, events) =
            EventApprovalRun::start(run_id, definition.clone(), attributes, &groups)?;

        let visibility = definition
            .tally_visibility
            .unwrap_or(self.config.tally_visibility);
        let (view, _) = watch::channel(run.view(visibility));
        let submission = Submission {
            run_id,
            status: run.status(),
            active_step: run.active_step(),
            active_ordinal: run.active_ordinal(),
        };
        log::info!(
            "Started run {} for '{}' v{} ({} effective steps)",
            run_id,
            definition.organization_id,
            definition.version,
            run.steps().len()
        );

        let handle = Arc::new(RunHandle {
            run: Mutex::new(run),
            view,
            visibility,
        });
        self.runs.write().await.insert(run_id, handle);
        self.outbox.publish(events);
        Ok(submission)
    }

    /// Apply one decision. Stale decisions are logged and reported, not failed.
    pub async fn decide(&self, request: DecisionRequest) -> Result<DecisionOutcome, ApprovalError> {
        let handle = self.handle(request.run_id).await?;
        let mut run = handle.run.lock().await;

        let groups = self.groups.snapshot(run.definition().group_ids()).await;
        let decision = Decision::new(request.member_id.clone(), request.verdict);
        let applied = run.apply_decision(request.ordinal, decision, &groups)?;

        match applied {
            Applied::Recorded {
                step_status,
                changed,
                events,
            } => {
                if changed {
                    handle.refresh(&run);
                    log::debug!(
                        "Run {}: {} on step {} by '{}', step now {}",
                        request.run_id,
                        request.verdict,
                        request.ordinal,
                        request.member_id,
                        step_status
                    );
                }
                self.outbox.publish(events);
                Ok(DecisionOutcome::Recorded {
                    status: run.status(),
                    active_step: run.active_step(),
                    active_ordinal: run.active_ordinal(),
                    step_status,
                    changed,
                })
            }
            Applied::Stale(reason) => {
                log::warn!(
                    "Ignoring stale decision on run {} step {} by '{}': {}",
                    request.run_id,
                    request.ordinal,
                    request.member_id,
                    reason
                );
                Ok(DecisionOutcome::Stale {
                    reason,
                    status: run.status(),
                    active_step: run.active_step(),
                })
            }
        }
    }

    /// Withdraw the event. Cancelling twice is the same as once.
    pub async fn cancel(&self, run_id: RunId) -> Result<RunStatus, ApprovalError> {
        let handle = self.handle(run_id).await?;
        let mut run = handle.run.lock().await;
        let events = run.cancel()?;
        if !events.is_empty() {
            log::info!("Cancelled run {}", run_id);
            handle.refresh(&run);
            self.outbox.publish(events);
        }
        Ok(run.status())
    }

    /// Latest committed snapshot of a run
    pub async fn status(&self, run_id: RunId) -> Result<RunStatusView, ApprovalError> {
        let handle = self.handle(run_id).await?;
        let view = handle.view.borrow().clone();
        Ok(view)
    }

    /// Subscribe to snapshots of a run as it changes
    pub async fn watch(&self, run_id: RunId) -> Result<watch::Receiver<RunStatusView>, ApprovalError> {
        Ok(self.handle(run_id).await?.view.subscribe())
    }

    /// Snapshots of every run, oldest first
    pub async fn runs(&self) -> Vec<RunStatusView> {
        let runs = self.runs.read().await;
        let mut views: Vec<RunStatusView> =
            runs.values().map(|h| h.view.borrow().clone()).collect();
        views.sort_by_key(|v| v.created_at);
        views
    }

    /// Drop a finished run and return its final snapshot.
    ///
    /// Runs still collecting decisions are kept and `RunInProgress` is
    /// returned.
    pub async fn forget(&self, run_id: RunId) -> Result<RunStatusView, ApprovalError> {
        let mut runs = self.runs.write().await;
        let handle = runs
            .get(&run_id)
            .cloned()
            .ok_or(ApprovalError::RunNotFound(run_id))?;
        let view = handle.view.borrow().clone();
        if !view.status.is_terminal() {
            return Err(ApprovalError::RunInProgress {
                run_id,
                status: view.status,
            });
        }
        runs.remove(&run_id);
        log::debug!("Forgot run {} ({})", run_id, view.status);
        Ok(view)
    }

    async fn handle(&self, run_id: RunId) -> Result<Arc<RunHandle>, ApprovalError> {
        self.runs
            .read()
            .await
            .get(&run_id)
            .cloned()
            .ok_or(ApprovalError::RunNotFound(run_id))
    }
}
