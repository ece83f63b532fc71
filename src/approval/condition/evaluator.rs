//! Condition expression evaluator

use super::ast::{CompareOp, ConditionGroup, Literal, LogicalOp};
use super::validate::{check_arity, check_operand};
use crate::approval::attributes::{parse_date, EventAttributes, FieldValue};
use chrono::NaiveDate;
use crate::error::ApprovalError;

/// Evaluate a condition tree against an event snapshot.
///
/// `and`/`or` short-circuit in child order. A comparison on a field the
/// snapshot does not carry, or one whose operator or literal does not fit the
/// field type, fails with `MalformedExpression`.
pub fn evaluate(tree: &ConditionGroup, attrs: &EventAttributes) -> Result<bool, ApprovalError> {
    match tree {
        ConditionGroup::Comparison {
            field,
            operator,
            value,
        } => evaluate_comparison(field, *operator, value, attrs),
        ConditionGroup::Combinator { op, children } => {
            check_arity(*op, children.len())?;
            match op {
                LogicalOp::And => {
                    for child in children {
                        if !evaluate(child, attrs)? {
                            return Ok(false);
                        }
                    }
                    Ok(true)
                }
                LogicalOp::Or => {
                    for child in children {
                        if evaluate(child, attrs)? {
                            return Ok(true);
                        }
                    }
                    Ok(false)
                }
                LogicalOp::Not => Ok(!evaluate(&children[0], attrs)?),
            }
        }
    }
}

fn evaluate_comparison(
    field: &str,
    op: CompareOp,
    value: &Literal,
    attrs: &EventAttributes,
) -> Result<bool, ApprovalError> {
    let actual = attrs.field(field).ok_or_else(|| {
        ApprovalError::malformed(format!("field '{}' is not present on the event", field))
    })?;
    check_operand(field, actual.kind(), op, value)?;

    let result = match op {
        CompareOp::Eq => scalar_equals(&actual, value),
        CompareOp::Neq => !scalar_equals(&actual, value),
        CompareOp::Gt => compare_integers(&actual, value, |a, b| a > b),
        CompareOp::Gte => compare_integers(&actual, value, |a, b| a >= b),
        CompareOp::Lt => compare_integers(&actual, value, |a, b| a < b),
        CompareOp::Lte => compare_integers(&actual, value, |a, b| a <= b),
        CompareOp::Contains => check_contains(&actual, value),
        CompareOp::NotContains => !check_contains(&actual, value),
        CompareOp::In => list_contains(&actual, value),
        CompareOp::NotIn => !list_contains(&actual, value),
        CompareOp::Before => compare_dates(&actual, value, |a, b| a < b),
        CompareOp::After => compare_dates(&actual, value, |a, b| a > b),
        CompareOp::Between => date_between(&actual, value),
    };
    log::debug!("condition {} {} {} -> {}", field, op, value, result);
    Ok(result)
}

fn scalar_equals(actual: &FieldValue<'_>, expected: &Literal) -> bool {
    match (actual, expected) {
        (FieldValue::Integer(n), Literal::Integer(rn)) => n == rn,
        (FieldValue::Text(s), Literal::Text(rs)) => s == rs,
        (FieldValue::Boolean(b), Literal::Boolean(rb)) => b == rb,
        (FieldValue::Visibility(v), Literal::Text(name)) => v.as_str() == name,
        (FieldValue::Date(d), Literal::Text(rs)) => parse_date(rs) == Some(*d),
        _ => false,
    }
}

fn compare_integers<F>(actual: &FieldValue<'_>, expected: &Literal, cmp: F) -> bool
where
    F: Fn(i64, i64) -> bool,
{
    match (actual, expected) {
        (FieldValue::Integer(n), Literal::Integer(rn)) => cmp(*n, *rn),
        _ => false,
    }
}

fn compare_dates<F>(actual: &FieldValue<'_>, expected: &Literal, cmp: F) -> bool
where
    F: Fn(NaiveDate, NaiveDate) -> bool,
{
    match (actual, expected) {
        (FieldValue::Date(d), Literal::Text(rs)) => parse_date(rs).map_or(false, |r| cmp(*d, r)),
        _ => false,
    }
}

/// Inclusive on both ends
fn date_between(actual: &FieldValue<'_>, bounds: &Literal) -> bool {
    match bounds {
        Literal::List(items) if items.len() == 2 => {
            compare_dates(actual, &items[0], |d, from| d >= from)
                && compare_dates(actual, &items[1], |d, to| d <= to)
        }
        _ => false,
    }
}

fn check_contains(actual: &FieldValue<'_>, expected: &Literal) -> bool {
    match (actual, expected) {
        (FieldValue::Text(s), Literal::Text(substr)) => s.contains(substr.as_str()),
        _ => false,
    }
}

fn list_contains(actual: &FieldValue<'_>, expected: &Literal) -> bool {
    match expected {
        Literal::List(items) => items.iter().any(|item| scalar_equals(actual, item)),
        _ => false,
    }
}
