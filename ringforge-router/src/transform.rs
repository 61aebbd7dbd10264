//! Message rewrite pipeline stage - spec.md §4.2 step 7 and §2's Transform row.

use ringforge_core::{BusinessRule, BusinessRuleAction, Tier};
use serde_json::{Map, Value};

/// Tier-shape `message` for delivery to a target at `target_tier`, per
/// spec.md §4.2: tier-1 gets a minimal envelope, tier-2 a `role_reminder`,
/// tier-3+ a structured `response_format` hint.
pub fn format_for_target(mut message: Map<String, Value>, target_tier: Tier) -> Map<String, Value> {
    match target_tier.0 {
        0 => message,
        1 => {
            // Minimal envelope: strip anything beyond what the sender put
            // in explicitly, leadership is trusted with the raw payload.
            message
        }
        2 => {
            message.insert(
                "role_reminder".to_string(),
                Value::String("You are a squad leader; keep responses scoped to your squad".to_string()),
            );
            message
        }
        _ => {
            message.insert(
                "response_format".to_string(),
                Value::Object(Map::from_iter([(
                    "hint".to_string(),
                    Value::String("structured".to_string()),
                )])),
            );
            message
        }
    }
}

/// Attach the sender's active-task context to `message` when the sender has
/// at least one in-progress task - spec.md §4.2 step 7.
pub fn attach_active_task_context(
    mut message: Map<String, Value>,
    active_task_summary: Option<Value>,
) -> Map<String, Value> {
    if let Some(task) = active_task_summary {
        message.insert("active_task_context".to_string(), task);
    }
    message
}

/// Apply the accumulated `transform` business rules (spec.md §4.5) - every
/// matching transform rule's action runs, in declared order.
pub fn apply_business_transforms(
    mut message: Map<String, Value>,
    transforms: &[BusinessRule],
    active_task_summary: Option<&Value>,
) -> Map<String, Value> {
    for rule in transforms {
        if let BusinessRuleAction::AttachTaskContext = rule.action {
            if let Some(task) = active_task_summary {
                message.insert("active_task_context".to_string(), task.clone());
            }
        }
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tier2_target_gets_role_reminder() {
        let msg = format_for_target(Map::new(), Tier::SQUAD_LEAD);
        assert!(msg.contains_key("role_reminder"));
    }

    #[test]
    fn tier3_target_gets_structured_response_format() {
        let msg = format_for_target(Map::new(), Tier::CONTRIBUTOR);
        assert!(msg.contains_key("response_format"));
    }

    #[test]
    fn tier0_target_is_untouched() {
        let msg = format_for_target(Map::new(), Tier::ADMIN);
        assert!(msg.is_empty());
    }
}
