//! Tiered access control - spec.md §4.3.

use crate::tier::tier_for_agent;
use ringforge_core::{Agent, DeniedSuggestion, RouterError, Scope, SquadId, Tier};

/// Outcome of an access-control check. `Denied` always carries a reason and,
/// per spec.md §4.3, an actionable suggestion the client can act on.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Allowed,
    Denied { reason: String, suggestion: DeniedSuggestion },
}

impl Decision {
    pub fn into_router_error(self) -> Option<RouterError> {
        match self {
            Decision::Allowed => None,
            Decision::Denied { reason, suggestion } => {
                Some(RouterError::denied(reason, Some(suggestion)))
            }
        }
    }
}

/// Resolves the id of an agent's squad leader, used to build the
/// `your_squad_leader` suggestion on denial. Implemented against whatever
/// directory the caller has; kept abstract so `ringforge-router` has no
/// storage dependency of its own.
pub trait SquadLeaderLookup {
    fn squad_leader_id(&self, squad_id: &SquadId) -> Option<String>;
}

pub(crate) fn suggestion_for(sender: &Agent, tier4: bool, lookup: &dyn SquadLeaderLookup) -> DeniedSuggestion {
    let your_squad_leader = sender.squad_id.as_ref().and_then(|sid| lookup.squad_leader_id(sid));
    DeniedSuggestion {
        your_squad_leader,
        alternative: Some("message:escalate".to_string()),
        required_format: if tier4 { Some("structured".to_string()) } else { None },
    }
}

/// Can `sender` direct-message `target`? Same-squad is always allowed
/// regardless of tier. A squadless sender may additionally always reach
/// tier 0-2 agents.
pub fn can_dm(sender: &Agent, target: &Agent, lookup: &dyn SquadLeaderLookup) -> Decision {
    let sender_tier = tier_for_agent(sender);
    let target_tier = tier_for_agent(target);

    let same_squad = sender.squad_id.is_some() && sender.squad_id == target.squad_id;
    if same_squad {
        return Decision::Allowed;
    }

    let reaches_fleet = sender_tier.0 <= 1;
    let squad_lead_reach = sender_tier == Tier::SQUAD_LEAD && target_tier.0 <= 2;
    let squadless_reach = sender.squad_id.is_none() && target_tier.0 <= 2;

    if reaches_fleet || squad_lead_reach || squadless_reach {
        return Decision::Allowed;
    }

    let tier4 = sender_tier == Tier::RESTRICTED;
    Decision::Denied {
        reason: "Cross-squad messaging requires Tier 1+ role".to_string(),
        suggestion: suggestion_for(sender, tier4, lookup),
    }
}

/// Can `sender` broadcast to `scope`?
pub fn can_broadcast(sender: &Agent, scope: &Scope, lookup: &dyn SquadLeaderLookup) -> Decision {
    let sender_tier = tier_for_agent(sender);

    match scope {
        Scope::Fleet => {
            if sender_tier.0 <= 1 {
                Decision::Allowed
            } else {
                Decision::Denied {
                    reason: "Fleet-wide broadcast requires Tier 0/1 role".to_string(),
                    suggestion: suggestion_for(sender, sender_tier == Tier::RESTRICTED, lookup),
                }
            }
        }
        Scope::Squad(_) => {
            if sender_tier == Tier::RESTRICTED {
                return Decision::Denied {
                    reason: "Tier 4 agents cannot broadcast".to_string(),
                    suggestion: suggestion_for(sender, true, lookup),
                };
            }
            // Tiers 0/1 may also target a specific squad; tiers 2/3 are
            // restricted to their own squad, enforced by the caller
            // resolving the target squad id against `sender.squad_id`.
            Decision::Allowed
        }
        Scope::Role(_) => {
            if sender_tier.0 <= 1 {
                Decision::Allowed
            } else {
                Decision::Denied {
                    reason: "Role-targeted broadcast requires Tier 0/1 role".to_string(),
                    suggestion: suggestion_for(sender, sender_tier == Tier::RESTRICTED, lookup),
                }
            }
        }
    }
}

/// Can `sender` escalate to an agent at `target_tier`? Permitted when the
/// target is strictly senior, at the same tier, or the sender is tier 0.
pub fn can_escalate(sender: &Agent, target_tier: Tier) -> Decision {
    let sender_tier = tier_for_agent(sender);
    if target_tier < sender_tier || target_tier == sender_tier || sender_tier == Tier::ADMIN {
        Decision::Allowed
    } else {
        Decision::Denied {
            reason: "Escalation may only go upward in the role hierarchy".to_string(),
            suggestion: DeniedSuggestion {
                your_squad_leader: None,
                alternative: None,
                required_format: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ringforge_core::EntityIdType;
    use ringforge_core::{AgentId, ContextTier, FleetId, SquadId};

    struct NoLeader;
    impl SquadLeaderLookup for NoLeader {
        fn squad_leader_id(&self, _squad_id: &SquadId) -> Option<String> {
            Some("ag_leader_s1".to_string())
        }
    }

    fn agent(squad: Option<SquadId>, slug: Option<&str>) -> Agent {
        Agent {
            agent_id: AgentId::new("ag_x"),
            fleet_id: FleetId::new_v4(),
            squad_id: squad,
            name: "x".to_string(),
            display_name: "X".to_string(),
            role_template_id: None,
            role_slug: slug.map(|s| s.to_string()),
            context_tier: ContextTier::Tier0,
            metadata: serde_json::Map::new(),
        }
    }

    #[test]
    fn cross_squad_tier3_dm_is_denied_with_squad_leader_suggestion() {
        let s1 = SquadId::new_v4();
        let s2 = SquadId::new_v4();
        let sender = agent(Some(s1), Some("backend-dev"));
        let target = agent(Some(s2), Some("backend-dev"));
        let decision = can_dm(&sender, &target, &NoLeader);
        match decision {
            Decision::Denied { reason, suggestion } => {
                assert_eq!(reason, "Cross-squad messaging requires Tier 1+ role");
                assert_eq!(suggestion.your_squad_leader.as_deref(), Some("ag_leader_s1"));
                assert_eq!(suggestion.alternative.as_deref(), Some("message:escalate"));
            }
            other => panic!("expected denial, got {other:?}"),
        }
    }

    #[test]
    fn same_squad_dm_always_allowed() {
        let s1 = SquadId::new_v4();
        let sender = agent(Some(s1), Some("backend-dev"));
        let target = agent(Some(s1), Some("backend-dev"));
        assert_eq!(can_dm(&sender, &target, &NoLeader), Decision::Allowed);
    }

    #[test]
    fn tier1_reaches_anyone_in_fleet() {
        let sender = agent(None, Some("tech-lead"));
        let target = agent(Some(SquadId::new_v4()), Some("backend-dev"));
        assert_eq!(can_dm(&sender, &target, &NoLeader), Decision::Allowed);
    }

    #[test]
    fn escalation_only_goes_upward_or_same_tier() {
        let sender = agent(None, Some("backend-dev")); // tier 3
        assert_eq!(can_escalate(&sender, Tier::LEADERSHIP), Decision::Allowed);
        assert_eq!(can_escalate(&sender, Tier::CONTRIBUTOR), Decision::Allowed);
        assert_ne!(can_escalate(&sender, Tier::RESTRICTED), Decision::Allowed);
    }

    #[test]
    fn tier4_broadcast_is_forbidden() {
        let sender = agent(None, None); // tier 4
        assert_ne!(can_broadcast(&sender, &Scope::Fleet, &NoLeader), Decision::Allowed);
    }
}
