// SPDX-License-Identifier: MIT

pub mod attributes;
pub mod condition;
pub mod definition;
pub mod engine;
pub mod notify;
pub mod quorum;
pub mod recorder;
pub mod registry;
pub mod resolver;
pub mod run;
