//! The Router: AccessControl tiers, rate limiting, fleet-configurable
//! business rules, message transforms, and the pipeline that strings them
//! together - spec.md §4.2-§4.5.

pub mod access_control;
pub mod business_rules;
pub mod deliver;
pub mod directory;
pub mod rate_limiter;
pub mod router;
pub mod tier;
pub mod transform;

pub use access_control::{can_broadcast, can_dm, can_escalate, Decision, SquadLeaderLookup};
pub use business_rules::{default_rules, evaluate, RuleEvaluation};
pub use deliver::{AnnouncementDeliverer, BroadcastDeliverer, DmDeliverer, DmOutcome, EscalationDeliverer, ThreadReplyDeliverer};
pub use directory::{ActiveTaskLookup, AgentDirectory, NoActiveTasks};
pub use rate_limiter::{default_tier_limit, RateDecision, RateLimiter, TierLimit, WindowLimit};
pub use router::Router;
pub use tier::{tier_for_agent, tier_for_slug};
pub use transform::{apply_business_transforms, attach_active_task_context, format_for_target};
