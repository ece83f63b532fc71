// SPDX-License-Identifier: MIT

//! Transition notifications
//!
//! The state machine returns the events of each transition. The engine pushes
//! them into the `Outbox` after the transition is committed in memory, and a
//! `Dispatcher` task delivers them to the registered sinks. Delivery failures
//! are retried, then logged; they never undo or repeat a transition.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::run::{RunId, RunStatus, StepStatus};
use crate::config::DeliveryPolicy;
use crate::error::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum ApprovalEventKind {
    StepOpened,
    StepApproved,
    StepRejected,
    RunApproved,
    RunRejected,
    RunCancelled,
}

impl fmt::Display for ApprovalEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// One state transition of one run
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ApprovalEvent {
    pub run_id: RunId,
    pub kind: ApprovalEventKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step_ordinal: Option<u32>,
    /// New status of the step (step events) or of the run (run events)
    pub status: String,
    pub at: DateTime<Utc>,
}

impl ApprovalEvent {
    pub fn step(run_id: RunId, kind: ApprovalEventKind, ordinal: u32, status: StepStatus) -> Self {
        Self {
            run_id,
            kind,
            step_ordinal: Some(ordinal),
            status: status.to_string(),
            at: Utc::now(),
        }
    }

    pub fn run(run_id: RunId, kind: ApprovalEventKind, status: RunStatus) -> Self {
        Self {
            run_id,
            kind,
            step_ordinal: None,
            status: status.to_string(),
            at: Utc::now(),
        }
    }
}

/// Destination for approval events (persistence, email, push...)
#[async_trait]
pub trait NotificationSink: Send + Sync {
    fn name(&self) -> &str;

    async fn deliver(&self, event: &ApprovalEvent) -> Result<(), EngineError>;
}

/// Writes every event to the log
pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    fn name(&self) -> &str {
        "log"
    }

    async fn deliver(&self, event: &ApprovalEvent) -> Result<(), EngineError> {
        match event.step_ordinal {
            Some(ordinal) => log::info!(
                "[{}] {} step={} status={}",
                event.run_id,
                event.kind,
                ordinal,
                event.status
            ),
            None => log::info!("[{}] {} status={}", event.run_id, event.kind, event.status),
        }
        Ok(())
    }
}

/// Forwards events into a channel owned by an embedder
pub struct ChannelSink {
    tx: mpsc::Sender<ApprovalEvent>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<ApprovalEvent>) -> Self {
        Self { tx }
    }
}

#[async_trait]
impl NotificationSink for ChannelSink {
    fn name(&self) -> &str {
        "channel"
    }

    async fn deliver(&self, event: &ApprovalEvent) -> Result<(), EngineError> {
        self.tx
            .send(event.clone())
            .await
            .map_err(|_| EngineError::other("notification channel closed"))
    }
}

/// Sending half of the notification queue. Never blocks.
#[derive(Clone)]
pub struct Outbox {
    tx: mpsc::UnboundedSender<ApprovalEvent>,
}

impl Outbox {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ApprovalEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn publish(&self, events: Vec<ApprovalEvent>) {
        for event in events {
            if let Err(e) = self.tx.send(event) {
                log::warn!(
                    "Dropping {} for run {}: outbox closed",
                    e.0.kind,
                    e.0.run_id
                );
            }
        }
    }
}

/// Drains the outbox and delivers each event to every sink
pub struct Dispatcher {
    rx: mpsc::UnboundedReceiver<ApprovalEvent>,
    sinks: Vec<Arc<dyn NotificationSink>>,
    policy: DeliveryPolicy,
}

impl Dispatcher {
    pub fn new(
        rx: mpsc::UnboundedReceiver<ApprovalEvent>,
        sinks: Vec<Arc<dyn NotificationSink>>,
        policy: DeliveryPolicy,
    ) -> Self {
        Self { rx, sinks, policy }
    }

    /// Run until every `Outbox` clone is dropped
    pub async fn run(mut self) {
        while let Some(event) = self.rx.recv().await {
            self.dispatch(&event).await;
        }
        log::debug!("Outbox closed, dispatcher stopping");
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn dispatch(&self, event: &ApprovalEvent) {
        let deliveries = self
            .sinks
            .iter()
            .map(|sink| deliver_with_retry(sink.as_ref(), event, &self.policy));
        futures::future::join_all(deliveries).await;
    }
}

async fn deliver_with_retry(
    sink: &dyn NotificationSink,
    event: &ApprovalEvent,
    policy: &DeliveryPolicy,
) -> bool {
    let attempts = policy.max_attempts.max(1);
    for attempt in 1..=attempts {
        match sink.deliver(event).await {
            Ok(()) => return true,
            Err(e) if attempt < attempts => {
                log::warn!(
                    "Sink '{}' failed on {} for run {} (attempt {}/{}): {}",
                    sink.name(),
                    event.kind,
                    event.run_id,
                    attempt,
                    attempts,
                    e
                );
                tokio::time::sleep(backoff(policy.backoff, attempt)).await;
            }
            Err(e) => {
                log::error!(
                    "Giving up on {} for run {} via '{}': {}",
                    event.kind,
                    event.run_id,
                    sink.name(),
                    e
                );
            }
        }
    }
    false
}

fn backoff(base: Duration, attempt: u32) -> Duration {
    base * attempt
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails a fixed number of times before accepting
    struct FlakySink {
        failures_left: AtomicU32,
        calls: AtomicU32,
    }

    impl FlakySink {
        fn new(failures: u32) -> Self {
            Self {
                failures_left: AtomicU32::new(failures),
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl NotificationSink for FlakySink {
        fn name(&self) -> &str {
            "flaky"
        }

        async fn deliver(&self, _event: &ApprovalEvent) -> Result<(), EngineError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let left = self.failures_left.load(Ordering::SeqCst);
            if left > 0 {
                self.failures_left.store(left - 1, Ordering::SeqCst);
                return Err(EngineError::other("unavailable"));
            }
            Ok(())
        }
    }

    fn policy(max_attempts: u32) -> DeliveryPolicy {
        DeliveryPolicy {
            max_attempts,
            backoff: Duration::from_millis(1),
        }
    }

    fn event() -> ApprovalEvent {
        ApprovalEvent::run(RunId::new(), ApprovalEventKind::RunApproved, RunStatus::Approved)
    }

    #[tokio::test]
    async fn test_retry_until_success() {
        let sink = FlakySink::new(2);
        assert!(deliver_with_retry(&sink, &event(), &policy(3)).await);
        assert_eq!(sink.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let sink = FlakySink::new(10);
        assert!(!deliver_with_retry(&sink, &event(), &policy(2)).await);
        assert_eq!(sink.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_dispatcher_fans_out_in_order() {
        let (outbox, rx) = Outbox::channel();
        let (tx_a, mut rx_a) = mpsc::channel(8);
        let (tx_b, mut rx_b) = mpsc::channel(8);
        let sinks: Vec<Arc<dyn NotificationSink>> = vec![
            Arc::new(ChannelSink::new(tx_a)),
            Arc::new(ChannelSink::new(tx_b)),
        ];
        let handle = Dispatcher::new(rx, sinks, policy(1)).spawn();

        let run_id = RunId::new();
        outbox.publish(vec![
            ApprovalEvent::step(run_id, ApprovalEventKind::StepApproved, 1, StepStatus::Approved),
            ApprovalEvent::run(run_id, ApprovalEventKind::RunApproved, RunStatus::Approved),
        ]);
        drop(outbox);
        handle.await.unwrap();

        for rx in [&mut rx_a, &mut rx_b] {
            assert_eq!(rx.recv().await.unwrap().kind, ApprovalEventKind::StepApproved);
            assert_eq!(rx.recv().await.unwrap().kind, ApprovalEventKind::RunApproved);
        }
    }

    #[test]
    fn test_event_serializes_without_missing_ordinal() {
        let json = serde_json::to_value(event()).unwrap();
        assert_eq!(json["kind"], "RunApproved");
        assert_eq!(json["status"], "approved");
        assert!(json.get("step_ordinal").is_none());
    }

    #[test]
    fn test_publish_after_receiver_dropped_does_not_panic() {
        let (outbox, rx) = Outbox::channel();
        drop(rx);
        outbox.publish(vec![event()]);
    }
}
