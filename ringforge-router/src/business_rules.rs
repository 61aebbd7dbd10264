//! Fleet-configurable BusinessRules engine - spec.md §4.5.

use crate::rate_limiter::WindowLimit;
use ringforge_core::{BusinessRule, BusinessRuleAction, BusinessRuleKind};
use ringforge_storage::{get_json, put_json, KvStore};
use serde_json::{Map, Value};

fn condition_matches(condition: &Map<String, Value>, context: &Map<String, Value>) -> bool {
    condition.iter().all(|(key, expected)| match context.get(key) {
        None => false,
        Some(actual) => match expected {
            Value::Array(any_of) => any_of.contains(actual),
            other => other == actual,
        },
    })
}

fn parse_window_ms(per: &str) -> i64 {
    match per {
        "second" => 1_000,
        "minute" => 60_000,
        "hour" => 3_600_000,
        "day" => 86_400_000,
        _ => 60_000,
    }
}

/// Outcome of evaluating a fleet's rule list against a routing context.
#[derive(Debug, Clone, Default)]
pub struct RuleEvaluation {
    pub access: Option<(BusinessRuleAction, Option<String>)>,
    pub transforms: Vec<BusinessRule>,
    pub rate_limit_override: Option<WindowLimit>,
}

impl RuleEvaluation {
    pub fn is_denied(&self) -> bool {
        matches!(self.access, Some((BusinessRuleAction::Deny, _)))
    }

    pub fn deny_message(&self) -> Option<&str> {
        match &self.access {
            Some((BusinessRuleAction::Deny, msg)) => msg.as_deref(),
            _ => None,
        }
    }
}

/// Evaluate `rules` in declared order against `context`. The first matching
/// access rule decides (allow/deny); absent a match, access defaults to
/// allow. All matching transform rules accumulate. The first matching
/// rate-limit rule sets an override for the (tier, action) it targets.
pub fn evaluate(rules: &[BusinessRule], context: &Map<String, Value>) -> RuleEvaluation {
    let mut result = RuleEvaluation::default();

    for rule in rules {
        if !condition_matches(&rule.condition, context) {
            continue;
        }
        match rule.kind {
            BusinessRuleKind::Access => {
                if result.access.is_none() {
                    result.access = Some((rule.action.clone(), rule.message.clone()));
                }
            }
            BusinessRuleKind::Transform => {
                result.transforms.push(rule.clone());
            }
            BusinessRuleKind::RateLimit => {
                if result.rate_limit_override.is_none() {
                    if let Some(limit) = rule.limit {
                        let window_ms = rule.per.as_deref().map(parse_window_ms).unwrap_or(60_000);
                        result.rate_limit_override = Some(WindowLimit { max: limit, window_ms });
                    }
                }
            }
        }
    }

    result
}

/// Built-in defaults applied to any fleet that has never customized its
/// rule list - spec.md §4.5.
pub fn default_rules() -> Vec<BusinessRule> {
    vec![
        BusinessRule {
            id: "default-critical-bypass".to_string(),
            kind: BusinessRuleKind::Access,
            condition: Map::from_iter([("priority".to_string(), Value::String("critical".to_string()))]),
            action: BusinessRuleAction::Allow,
            message: None,
            limit: None,
            per: None,
            auto_forward: false,
        },
        BusinessRule {
            id: "default-deny-cross-squad-3-4".to_string(),
            kind: BusinessRuleKind::Access,
            condition: Map::from_iter([
                ("cross_squad".to_string(), Value::Bool(true)),
                ("sender_tier".to_string(), Value::Array(vec![Value::from(3), Value::from(4)])),
            ]),
            action: BusinessRuleAction::Deny,
            message: Some("Cross-squad messaging requires Tier 1+ role".to_string()),
            limit: None,
            per: None,
            auto_forward: false,
        },
        BusinessRule {
            id: "default-restricted-cant-dm-leadership".to_string(),
            kind: BusinessRuleKind::Access,
            condition: Map::from_iter([
                ("sender_tier".to_string(), Value::from(4)),
                ("target_tier".to_string(), Value::Array(vec![Value::from(0), Value::from(1)])),
            ]),
            action: BusinessRuleAction::Deny,
            message: Some("Restricted agents may not contact leadership directly".to_string()),
            limit: None,
            per: None,
            auto_forward: false,
        },
        BusinessRule {
            id: "default-tier4-dm-rate-cap".to_string(),
            kind: BusinessRuleKind::RateLimit,
            condition: Map::from_iter([
                ("sender_tier".to_string(), Value::from(4)),
                ("action".to_string(), Value::String("dm".to_string())),
            ]),
            action: BusinessRuleAction::Other("rate_limit".to_string()),
            message: None,
            limit: Some(5),
            per: Some("minute".to_string()),
            auto_forward: false,
        },
    ]
}

fn rules_key(fleet_id: &str) -> String {
    format!("biz_rules:{fleet_id}")
}

pub async fn load_rules(store: &dyn KvStore, fleet_id: &str) -> ringforge_core::RingForgeResult<Vec<BusinessRule>> {
    match get_json::<Vec<BusinessRule>>(store, &rules_key(fleet_id)).await? {
        Some(rules) => Ok(rules),
        None => Ok(default_rules()),
    }
}

pub async fn save_rules(
    store: &dyn KvStore,
    fleet_id: &str,
    rules: &[BusinessRule],
) -> ringforge_core::RingForgeResult<()> {
    put_json(store, &rules_key(fleet_id), &rules.to_vec()).await
}

pub async fn add_rule(store: &dyn KvStore, fleet_id: &str, rule: BusinessRule) -> ringforge_core::RingForgeResult<Vec<BusinessRule>> {
    let mut rules = load_rules(store, fleet_id).await?;
    rules.push(rule);
    save_rules(store, fleet_id, &rules).await?;
    Ok(rules)
}

pub async fn remove_rule(store: &dyn KvStore, fleet_id: &str, rule_id: &str) -> ringforge_core::RingForgeResult<Vec<BusinessRule>> {
    let mut rules = load_rules(store, fleet_id).await?;
    rules.retain(|r| r.id != rule_id);
    save_rules(store, fleet_id, &rules).await?;
    Ok(rules)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn critical_priority_allows_even_when_a_later_rule_would_deny() {
        let rules = default_rules();
        let context = Map::from_iter([
            ("priority".to_string(), Value::String("critical".to_string())),
            ("cross_squad".to_string(), Value::Bool(true)),
            ("sender_tier".to_string(), Value::from(4)),
        ]);
        let eval = evaluate(&rules, &context);
        assert!(!eval.is_denied());
    }

    #[test]
    fn cross_squad_tier4_without_critical_priority_is_denied() {
        let rules = default_rules();
        let context = Map::from_iter([
            ("priority".to_string(), Value::String("normal".to_string())),
            ("cross_squad".to_string(), Value::Bool(true)),
            ("sender_tier".to_string(), Value::from(4)),
        ]);
        let eval = evaluate(&rules, &context);
        assert!(eval.is_denied());
    }

    #[test]
    fn no_matching_rule_defaults_to_allow() {
        let rules = default_rules();
        let context = Map::from_iter([("priority".to_string(), Value::String("normal".to_string()))]);
        let eval = evaluate(&rules, &context);
        assert!(!eval.is_denied());
    }

    #[test]
    fn tier4_dm_rate_rule_overrides_the_tier_default() {
        let rules = default_rules();
        let context = Map::from_iter([
            ("sender_tier".to_string(), Value::from(4)),
            ("action".to_string(), Value::String("dm".to_string())),
        ]);
        let eval = evaluate(&rules, &context);
        assert_eq!(eval.rate_limit_override, Some(WindowLimit { max: 5, window_ms: 60_000 }));
    }
}
