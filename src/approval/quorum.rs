// SPDX-License-Identifier: MIT

//! Quorum policies and their arithmetic

use serde::{Deserialize, Serialize};
use std::fmt;

/// How many members of a group must agree to settle a step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum QuorumPolicy {
    /// One approval is enough; only a unanimous rejection rejects
    #[default]
    #[serde(alias = "ANY_ONE")]
    AnyOne,
    /// Strictly more than half must approve
    #[serde(alias = "MAJORITY")]
    Majority,
    /// Everyone must approve; one rejection rejects
    #[serde(alias = "ALL")]
    All,
}

/// Approve/reject counts for one step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Tally {
    pub approvals: usize,
    pub rejections: usize,
}

/// Outcome of applying a policy to a tally
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuorumState {
    Pending,
    Approved,
    Rejected,
}

impl QuorumPolicy {
    /// Approvals needed out of `members`
    pub fn required_approvals(&self, members: usize) -> usize {
        match self {
            QuorumPolicy::AnyOne => 1.min(members),
            QuorumPolicy::Majority => members / 2 + 1,
            QuorumPolicy::All => members,
        }
    }

    /// Settle a tally against a snapshot of `members` voters.
    ///
    /// A step is rejected once approval can no longer reach the required
    /// count with the members who have not rejected.
    pub fn evaluate(&self, members: usize, tally: Tally) -> QuorumState {
        let required = self.required_approvals(members);
        if members > 0 && tally.approvals >= required {
            return QuorumState::Approved;
        }
        if tally.rejections > members - required.min(members) {
            return QuorumState::Rejected;
        }
        QuorumState::Pending
    }
}

impl fmt::Display for QuorumPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuorumPolicy::AnyOne => write!(f, "any_one"),
            QuorumPolicy::Majority => write!(f, "majority"),
            QuorumPolicy::All => write!(f, "all"),
        }
    }
}
