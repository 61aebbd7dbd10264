//! Role-slug -> tier resolution - spec.md §4.3.

use ringforge_core::{Agent, ContextTier, Tier};

const TIER1_SLUGS: &[&str] = &["tech-lead", "product-manager", "consultant"];
const TIER2_SLUGS: &[&str] = &["squad-leader", "devops"];
const TIER3_SLUGS: &[&str] = &[
    "backend-dev",
    "frontend-dev",
    "fullstack-dev",
    "qa-engineer",
    "designer",
    "data-engineer",
    "mobile-dev",
    "marketer",
    "technical-writer",
    "security-expert",
];

/// Resolve an agent's access-control tier from its role slug, `fleet_admin`
/// metadata flag, and `context_tier` - spec.md §4.3's table.
pub fn tier_for_agent(agent: &Agent) -> Tier {
    if agent.is_fleet_admin() {
        return Tier::ADMIN;
    }
    if agent.context_tier == ContextTier::Tier3 {
        return Tier::RESTRICTED;
    }
    match agent.role_slug.as_deref() {
        Some(slug) if TIER1_SLUGS.contains(&slug) => Tier::LEADERSHIP,
        Some(slug) if TIER2_SLUGS.contains(&slug) => Tier::SQUAD_LEAD,
        Some(slug) if TIER3_SLUGS.contains(&slug) => Tier::CONTRIBUTOR,
        Some(_unknown_slug) => Tier::CONTRIBUTOR,
        None => Tier::RESTRICTED,
    }
}

/// Resolve the tier implied by a bare role slug, with no agent context
/// available - used when escalating to a role rather than a specific agent.
/// An unrecognized slug is treated as tier3 (a contributor role), matching
/// `tier_for_agent`'s fallback for agents with an unknown slug.
pub fn tier_for_slug(slug: &str) -> Tier {
    if TIER1_SLUGS.contains(&slug) {
        Tier::LEADERSHIP
    } else if TIER2_SLUGS.contains(&slug) {
        Tier::SQUAD_LEAD
    } else {
        Tier::CONTRIBUTOR
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ringforge_core::EntityIdType;
    use ringforge_core::{AgentId, FleetId};
    use serde_json::json;

    fn agent(role_slug: Option<&str>, context_tier: ContextTier, admin: bool) -> Agent {
        let mut metadata = serde_json::Map::new();
        if admin {
            metadata.insert("fleet_admin".to_string(), json!(true));
        }
        Agent {
            agent_id: AgentId::new("ag_x"),
            fleet_id: FleetId::new_v4(),
            squad_id: None,
            name: "x".to_string(),
            display_name: "X".to_string(),
            role_template_id: None,
            role_slug: role_slug.map(|s| s.to_string()),
            context_tier,
            metadata,
        }
    }

    #[test]
    fn fleet_admin_metadata_overrides_everything() {
        let a = agent(Some("backend-dev"), ContextTier::Tier0, true);
        assert_eq!(tier_for_agent(&a), Tier::ADMIN);
    }

    #[test]
    fn known_tier_slugs_resolve_correctly() {
        assert_eq!(tier_for_agent(&agent(Some("tech-lead"), ContextTier::Tier0, false)), Tier::LEADERSHIP);
        assert_eq!(tier_for_agent(&agent(Some("squad-leader"), ContextTier::Tier0, false)), Tier::SQUAD_LEAD);
        assert_eq!(tier_for_agent(&agent(Some("qa-engineer"), ContextTier::Tier0, false)), Tier::CONTRIBUTOR);
    }

    #[test]
    fn unknown_slug_falls_back_to_tier3() {
        let a = agent(Some("totally-made-up"), ContextTier::Tier0, false);
        assert_eq!(tier_for_agent(&a), Tier::CONTRIBUTOR);
    }

    #[test]
    fn unroled_agent_is_tier4() {
        let a = agent(None, ContextTier::Tier0, false);
        assert_eq!(tier_for_agent(&a), Tier::RESTRICTED);
    }

    #[test]
    fn context_tier3_forces_tier4_even_with_a_role() {
        let a = agent(Some("backend-dev"), ContextTier::Tier3, false);
        assert_eq!(tier_for_agent(&a), Tier::RESTRICTED);
    }
}
