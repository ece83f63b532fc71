// SPDX-License-Identifier: MIT

//! Static checks on condition trees

use super::ast::{CompareOp, ConditionGroup, Literal, LogicalOp};
use crate::approval::attributes::{parse_date, FieldKind, Visibility};
use crate::error::ApprovalError;

/// Check a whole tree against a field schema.
///
/// `kind_of` maps a field name to its declared type, `None` for unknown fields.
pub fn validate<F>(tree: &ConditionGroup, kind_of: &F) -> Result<(), ApprovalError>
where
    F: Fn(&str) -> Option<FieldKind>,
{
    match tree {
        ConditionGroup::Comparison {
            field,
            operator,
            value,
        } => {
            let kind = kind_of(field)
                .ok_or_else(|| ApprovalError::malformed(format!("unknown field '{}'", field)))?;
            check_operand(field, kind, *operator, value)
        }
        ConditionGroup::Combinator { op, children } => {
            check_arity(*op, children.len())?;
            for child in children {
                validate(child, kind_of)?;
            }
            Ok(())
        }
    }
}

/// `not` takes exactly one child; `and`/`or` need at least one
pub(super) fn check_arity(op: LogicalOp, children: usize) -> Result<(), ApprovalError> {
    match op {
        LogicalOp::Not if children != 1 => Err(ApprovalError::malformed(format!(
            "'not' requires exactly one child, found {}",
            children
        ))),
        LogicalOp::And | LogicalOp::Or if children == 0 => Err(ApprovalError::malformed(
            format!("'{:?}' requires at least one child", op).to_lowercase(),
        )),
        _ => Ok(()),
    }
}

/// Check that an operator and literal make sense for a field type
pub fn check_operand(
    field: &str,
    kind: FieldKind,
    op: CompareOp,
    value: &Literal,
) -> Result<(), ApprovalError> {
    let supported = match kind {
        FieldKind::Integer => matches!(
            op,
            CompareOp::Eq
                | CompareOp::Neq
                | CompareOp::Gt
                | CompareOp::Gte
                | CompareOp::Lt
                | CompareOp::Lte
                | CompareOp::In
                | CompareOp::NotIn
        ),
        FieldKind::Text => matches!(
            op,
            CompareOp::Eq
                | CompareOp::Neq
                | CompareOp::Contains
                | CompareOp::NotContains
                | CompareOp::In
                | CompareOp::NotIn
        ),
        FieldKind::Boolean => matches!(op, CompareOp::Eq | CompareOp::Neq),
        FieldKind::Visibility => matches!(
            op,
            CompareOp::Eq | CompareOp::Neq | CompareOp::In | CompareOp::NotIn
        ),
        FieldKind::Date => matches!(
            op,
            CompareOp::Eq
                | CompareOp::Neq
                | CompareOp::Before
                | CompareOp::After
                | CompareOp::Between
        ),
    };
    if !supported {
        return Err(ApprovalError::malformed(format!(
            "operator '{}' is not defined for {} field '{}'",
            op, kind, field
        )));
    }

    match (op, value) {
        (CompareOp::In | CompareOp::NotIn, Literal::List(items)) => {
            for item in items {
                check_scalar(field, kind, item)?;
            }
            Ok(())
        }
        (CompareOp::In | CompareOp::NotIn, other) => Err(ApprovalError::malformed(format!(
            "'{}' on field '{}' needs a list, got {}",
            op, field, other
        ))),
        (CompareOp::Between, Literal::List(bounds)) if bounds.len() == 2 => {
            check_scalar(field, kind, &bounds[0])?;
            check_scalar(field, kind, &bounds[1])
        }
        (CompareOp::Between, other) => Err(ApprovalError::malformed(format!(
            "'between' on field '{}' needs [from, to], got {}",
            field, other
        ))),
        (_, scalar) => check_scalar(field, kind, scalar),
    }
}

fn check_scalar(field: &str, kind: FieldKind, value: &Literal) -> Result<(), ApprovalError> {
    let ok = match (kind, value) {
        (FieldKind::Integer, Literal::Integer(_)) => true,
        (FieldKind::Text, Literal::Text(_)) => true,
        (FieldKind::Boolean, Literal::Boolean(_)) => true,
        (FieldKind::Visibility, Literal::Text(name)) => Visibility::parse(name).is_some(),
        (FieldKind::Date, Literal::Text(date)) => parse_date(date).is_some(),
        _ => false,
    };
    if ok {
        Ok(())
    } else {
        Err(ApprovalError::malformed(format!(
            "value {} does not fit {} field '{}'",
            value, kind, field
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::approval::attributes::builtin_kind;
    use crate::approval::condition::parse;

    fn check(expr: &str) -> Result<(), ApprovalError> {
        validate(&parse(expr)?, &builtin_kind)
    }

    #[test]
    fn test_valid_expressions() {
        assert!(check("expected_attendance > 100").is_ok());
        assert!(check("location contains 'Hall'").is_ok());
        assert!(check("visibility in ['public', 'restricted']").is_ok());
        assert!(check("has_external_link == false").is_ok());
        assert!(check("not (location == 'DCC') or expected_attendance <= 10").is_ok());
    }

    #[test]
    fn test_unknown_field() {
        let err = check("budget > 10").unwrap_err();
        assert_eq!(
            err,
            ApprovalError::MalformedExpression("unknown field 'budget'".to_string())
        );
    }

    #[test]
    fn test_contains_on_integer_is_malformed() {
        assert!(matches!(
            check("expected_attendance contains '1'"),
            Err(ApprovalError::MalformedExpression(_))
        ));
    }

    #[test]
    fn test_ordering_on_boolean_is_malformed() {
        assert!(check("has_external_link > true").is_err());
    }

    #[test]
    fn test_literal_type_mismatch() {
        assert!(check("expected_attendance == 'many'").is_err());
        assert!(check("location == 5").is_err());
        assert!(check("visibility == 'campus'").is_err());
        assert!(check("location in 'DCC'").is_err());
        assert!(check("expected_attendance in [1, 'two']").is_err());
    }

    fn date_kind(name: &str) -> Option<FieldKind> {
        match name {
            "starts_on" => Some(FieldKind::Date),
            other => builtin_kind(other),
        }
    }

    fn check_dates(expr: &str) -> Result<(), ApprovalError> {
        validate(&parse(expr)?, &date_kind)
    }

    #[test]
    fn test_date_operators() {
        assert!(check_dates("starts_on before '2026-06-01'").is_ok());
        assert!(check_dates("starts_on == '2026-06-01'").is_ok());
        assert!(check_dates("starts_on between ['2026-01-01', '2026-05-31']").is_ok());

        // wrong shape for between
        assert!(check_dates("starts_on between ['2026-01-01']").is_err());
        assert!(check_dates("starts_on between '2026-01-01'").is_err());
        // not a date
        assert!(check_dates("starts_on after 'next week'").is_err());
        assert!(check_dates("starts_on after 20260101").is_err());
        // operators that do not apply to dates
        assert!(check_dates("starts_on > '2026-01-01'").is_err());
        assert!(check_dates("starts_on in ['2026-01-01']").is_err());
        // date operators on other kinds
        assert!(check_dates("expected_attendance before 10").is_err());
        assert!(check_dates("location after '2026-01-01'").is_err());
    }

    #[test]
    fn test_combinator_arity() {
        let not_two = ConditionGroup::Combinator {
            op: LogicalOp::Not,
            children: vec![
                ConditionGroup::compare("location", CompareOp::Eq, "DCC".into()),
                ConditionGroup::compare("location", CompareOp::Eq, "EMPAC".into()),
            ],
        };
        assert!(validate(&not_two, &builtin_kind).is_err());

        let empty_and = ConditionGroup::all(vec![]);
        assert_eq!(
            validate(&empty_and, &builtin_kind),
            Err(ApprovalError::MalformedExpression(
                "'and' requires at least one child".to_string()
            ))
        );
    }
}
