// SPDX-License-Identifier: MIT

//! Condition evaluation for approval steps
//!
//! A step condition is a `ConditionGroup` tree. It can be authored as a tree
//! directly or as a text expression such as:
//! - `expected_attendance > 100`
//! - `location in ['EMPAC', 'Alumni House'] and has_external_link == true`
//! - `not (visibility == 'public')`

mod ast;
mod evaluator;
mod parser;
mod validate;

pub use ast::{CompareOp, ConditionGroup, Literal, LogicalOp};
pub use evaluator::evaluate;
pub use parser::parse;
pub use validate::{check_operand, validate};
