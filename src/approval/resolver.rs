// SPDX-License-Identifier: MIT

//! Effective step resolution

use super::attributes::EventAttributes;
use super::condition;
use super::definition::{Step, WorkflowDefinition};
use crate::error::ApprovalError;

/// Steps of `definition` that apply to `attrs`, in ordinal order.
///
/// A step applies when it has no condition or its condition holds. Order is
/// never inferred from conditions.
pub fn resolve_effective_steps<'a>(
    definition: &'a WorkflowDefinition,
    attrs: &EventAttributes,
) -> Result<Vec<&'a Step>, ApprovalError> {
    let mut ordered: Vec<&Step> = definition.steps.iter().collect();
    ordered.sort_by_key(|s| s.ordinal);

    let mut effective = Vec::with_capacity(ordered.len());
    for step in ordered {
        if step_applies(step, attrs)? {
            effective.push(step);
        } else {
            log::debug!(
                "Step {} ({}) does not apply to event",
                step.ordinal,
                step.label()
            );
        }
    }

    if effective.is_empty() {
        return Err(ApprovalError::EmptyWorkflow {
            organization_id: definition.organization_id.clone(),
        });
    }
    Ok(effective)
}

fn step_applies(step: &Step, attrs: &EventAttributes) -> Result<bool, ApprovalError> {
    match &step.condition {
        None => Ok(true),
        Some(tree) => condition::evaluate(tree, attrs),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::approval::attributes::Visibility;
    use crate::approval::condition::parse;

    fn big_event_workflow() -> WorkflowDefinition {
        WorkflowDefinition::new(
            "union",
            vec![
                Step::new(1, "a").when(parse("expected_attendance > 100").unwrap()),
                Step::new(2, "b"),
                Step::new(3, "c").when(parse("expected_attendance > 100").unwrap()),
            ],
        )
    }

    fn ordinals(steps: &[&Step]) -> Vec<u32> {
        steps.iter().map(|s| s.ordinal).collect()
    }

    #[test]
    fn test_small_event_keeps_only_unconditional_step() {
        let def = big_event_workflow();
        let attrs = EventAttributes::new("union", 50, "DCC", Visibility::Public);
        let steps = resolve_effective_steps(&def, &attrs).unwrap();
        assert_eq!(ordinals(&steps), vec![2]);
    }

    #[test]
    fn test_large_event_keeps_all_in_order() {
        let def = big_event_workflow();
        let attrs = EventAttributes::new("union", 500, "DCC", Visibility::Public);
        let steps = resolve_effective_steps(&def, &attrs).unwrap();
        assert_eq!(ordinals(&steps), vec![1, 2, 3]);
    }

    #[test]
    fn test_unsorted_definition_resolves_in_ordinal_order() {
        let def = WorkflowDefinition::new(
            "union",
            vec![Step::new(9, "z"), Step::new(3, "c"), Step::new(5, "e")],
        );
        let attrs = EventAttributes::new("union", 5, "DCC", Visibility::Private);
        let steps = resolve_effective_steps(&def, &attrs).unwrap();
        assert_eq!(ordinals(&steps), vec![3, 5, 9]);
    }

    #[test]
    fn test_empty_workflow() {
        let def = WorkflowDefinition::new(
            "union",
            vec![Step::new(1, "a").when(parse("visibility == 'restricted'").unwrap())],
        );
        let attrs = EventAttributes::new("union", 5, "DCC", Visibility::Public);
        assert_eq!(
            resolve_effective_steps(&def, &attrs),
            Err(ApprovalError::EmptyWorkflow {
                organization_id: "union".to_string()
            })
        );
    }

    #[test]
    fn test_malformed_condition_surfaces() {
        let def = WorkflowDefinition::new(
            "union",
            vec![
                Step::new(1, "a"),
                Step::new(2, "b").when(parse("catering == true").unwrap()),
            ],
        );
        let attrs = EventAttributes::new("union", 5, "DCC", Visibility::Public);
        assert!(matches!(
            resolve_effective_steps(&def, &attrs),
            Err(ApprovalError::MalformedExpression(_))
        ));
    }
}
