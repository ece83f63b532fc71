// SPDX-License-Identifier: MIT

//! Event approval routing engine
//!
//! Decides which approval groups must review a submitted campus event,
//! tracks each group's quorum and drives the run to a terminal outcome.

pub mod approval;
pub mod config;
pub mod error;
