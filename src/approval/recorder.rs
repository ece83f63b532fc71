// SPDX-License-Identifier: MIT

//! Decision recording with overwrite-by-member semantics

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::run::StepInstance;
use crate::error::ApprovalError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Approve,
    Reject,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Approve => write!(f, "approve"),
            Verdict::Reject => write!(f, "reject"),
        }
    }
}

/// One member's verdict on one step
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Decision {
    pub member_id: String,
    pub verdict: Verdict,
    pub at: DateTime<Utc>,
}

impl Decision {
    pub fn new(member_id: impl Into<String>, verdict: Verdict) -> Self {
        Self {
            member_id: member_id.into(),
            verdict,
            at: Utc::now(),
        }
    }
}

/// What recording a decision did to the step's tally
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    /// First decision from this member
    Inserted,
    /// Member flipped their verdict
    Changed { previous: Verdict },
    /// Same verdict as before; nothing was touched
    Unchanged,
}

impl RecordOutcome {
    pub fn changed(&self) -> bool {
        !matches!(self, RecordOutcome::Unchanged)
    }
}

/// Record `decision` on `step`, keeping at most one decision per member.
///
/// Only members of the snapshot taken when the step opened may decide.
pub fn record(step: &mut StepInstance, decision: Decision) -> Result<RecordOutcome, ApprovalError> {
    if !step.members.contains(&decision.member_id) {
        return Err(ApprovalError::UnknownMember {
            member_id: decision.member_id,
            ordinal: step.ordinal(),
        });
    }

    match step
        .decisions
        .iter_mut()
        .find(|d| d.member_id == decision.member_id)
    {
        Some(existing) if existing.verdict == decision.verdict => Ok(RecordOutcome::Unchanged),
        Some(existing) => {
            let previous = existing.verdict;
            *existing = decision;
            Ok(RecordOutcome::Changed { previous })
        }
        None => {
            step.decisions.push(decision);
            Ok(RecordOutcome::Inserted)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::approval::definition::Step;
    use crate::approval::quorum::{QuorumPolicy, Tally};
    use crate::approval::registry::ApprovalGroup;

    fn open_step(members: &[&str]) -> StepInstance {
        let group = ApprovalGroup::new("deans", QuorumPolicy::Majority, members.iter().copied());
        let mut step = StepInstance::pending(Step::new(1, "deans"));
        step.open(&group);
        step
    }

    #[test]
    fn test_first_decision_is_inserted() {
        let mut step = open_step(&["dana", "eve"]);
        let outcome = record(&mut step, Decision::new("dana", Verdict::Approve)).unwrap();
        assert_eq!(outcome, RecordOutcome::Inserted);
        assert!(outcome.changed());
        assert_eq!(step.decisions().len(), 1);
    }

    #[test]
    fn test_repeat_is_unchanged_and_keeps_original_timestamp() {
        let mut step = open_step(&["dana", "eve"]);
        record(&mut step, Decision::new("dana", Verdict::Reject)).unwrap();
        let before = step.decisions().to_vec();

        let outcome = record(&mut step, Decision::new("dana", Verdict::Reject)).unwrap();
        assert_eq!(outcome, RecordOutcome::Unchanged);
        assert!(!outcome.changed());
        assert_eq!(step.decisions(), before.as_slice());
    }

    #[test]
    fn test_flip_overwrites_previous_verdict() {
        let mut step = open_step(&["dana", "eve"]);
        record(&mut step, Decision::new("dana", Verdict::Reject)).unwrap();
        let outcome = record(&mut step, Decision::new("dana", Verdict::Approve)).unwrap();

        assert_eq!(
            outcome,
            RecordOutcome::Changed {
                previous: Verdict::Reject
            }
        );
        assert_eq!(step.decisions().len(), 1);
        assert_eq!(
            step.tally(),
            Tally {
                approvals: 1,
                rejections: 0
            }
        );
    }

    #[test]
    fn test_unknown_member_is_not_recorded() {
        let mut step = open_step(&["dana"]);
        let err = record(&mut step, Decision::new("mallory", Verdict::Approve)).unwrap_err();
        assert_eq!(
            err,
            ApprovalError::UnknownMember {
                member_id: "mallory".to_string(),
                ordinal: 1
            }
        );
        assert!(step.decisions().is_empty());
    }
}
