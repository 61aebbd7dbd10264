//! The Router pipeline: Validate -> BusinessRules -> AccessControl ->
//! RateLimit -> Transform -> Deliver, per spec.md §4.2.

use crate::access_control::{can_broadcast, can_dm, can_escalate, suggestion_for, Decision, SquadLeaderLookup};
use crate::business_rules::{self, evaluate};
use crate::deliver::{AnnouncementDeliverer, BroadcastDeliverer, DmDeliverer, DmOutcome, EscalationDeliverer, ThreadReplyDeliverer};
use crate::directory::{ActiveTaskLookup, AgentDirectory, NoActiveTasks};
use crate::rate_limiter::{default_tier_limit, RateDecision, RateLimiter, TierLimit};
use crate::tier::{tier_for_agent, tier_for_slug};
use crate::transform::{apply_business_transforms, attach_active_task_context, format_for_target};
use ringforge_core::{
    Action, Agent, AnnouncementId, EscalationId, FleetId, MessageId, Priority, RouterError, Scope, SquadId, ThreadId,
};
use ringforge_storage::KvStore;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

/// A squad-leader lookup backed by an `AgentDirectory`, resolved once per
/// routed message and handed to the (synchronous) access-control checks.
struct DirectoryLeaderLookup {
    leader_agent_id: Option<String>,
}

impl SquadLeaderLookup for DirectoryLeaderLookup {
    fn squad_leader_id(&self, _squad_id: &SquadId) -> Option<String> {
        self.leader_agent_id.clone()
    }
}

/// Wires together everything the pipeline needs: a read-only view of
/// agents/squads, the rate limiter, the fleet's business rules, and the
/// concrete deliverers that perform the final hop.
pub struct Router {
    directory: Arc<dyn AgentDirectory>,
    rate_limiter: Arc<RateLimiter>,
    store: Arc<dyn KvStore>,
    active_tasks: Arc<dyn ActiveTaskLookup>,
    dm: Arc<dyn DmDeliverer>,
    broadcast: Arc<dyn BroadcastDeliverer>,
    escalation: Arc<dyn EscalationDeliverer>,
    thread_reply: Arc<dyn ThreadReplyDeliverer>,
    announcement: Arc<dyn AnnouncementDeliverer>,
    deadline: Duration,
}

impl Router {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        directory: Arc<dyn AgentDirectory>,
        rate_limiter: Arc<RateLimiter>,
        store: Arc<dyn KvStore>,
        dm: Arc<dyn DmDeliverer>,
        broadcast: Arc<dyn BroadcastDeliverer>,
        escalation: Arc<dyn EscalationDeliverer>,
        thread_reply: Arc<dyn ThreadReplyDeliverer>,
        announcement: Arc<dyn AnnouncementDeliverer>,
        deadline_ms: i64,
    ) -> Self {
        Self {
            directory,
            rate_limiter,
            store,
            active_tasks: Arc::new(NoActiveTasks),
            dm,
            broadcast,
            escalation,
            thread_reply,
            announcement,
            deadline: Duration::from_millis(deadline_ms.max(0) as u64),
        }
    }

    pub fn with_active_task_lookup(mut self, lookup: Arc<dyn ActiveTaskLookup>) -> Self {
        self.active_tasks = lookup;
        self
    }

    async fn load_agent(&self, agent_id: &ringforge_core::AgentId) -> Result<Agent, RouterError> {
        self.directory.get_agent(agent_id).await.ok_or_else(|| RouterError::agent_not_found(agent_id))
    }

    fn validate_same_fleet(&self, fleet_id: &FleetId, sender: &Agent, target: &Agent) -> Result<(), RouterError> {
        if &sender.fleet_id != fleet_id || &target.fleet_id != fleet_id {
            return Err(RouterError::not_in_this_fleet(sender.fleet_id, target.fleet_id));
        }
        Ok(())
    }

    async fn leader_lookup(&self, fleet_id: &FleetId, squad_id: Option<&SquadId>) -> DirectoryLeaderLookup {
        let leader_agent_id = match squad_id {
            Some(sid) => self.directory.squad_leader(fleet_id, sid).await.map(|a| a.agent_id.to_string()),
            None => None,
        };
        DirectoryLeaderLookup { leader_agent_id }
    }

    fn business_context(
        sender_tier: ringforge_core::Tier,
        target_tier: Option<ringforge_core::Tier>,
        action: Action,
        cross_squad: bool,
        priority: Priority,
    ) -> Map<String, Value> {
        let mut ctx = Map::new();
        ctx.insert("sender_tier".to_string(), Value::from(sender_tier.0));
        if let Some(t) = target_tier {
            ctx.insert("target_tier".to_string(), Value::from(t.0));
        }
        ctx.insert("action".to_string(), Value::String(action_str(action).to_string()));
        ctx.insert("cross_squad".to_string(), Value::Bool(cross_squad));
        ctx.insert("priority".to_string(), Value::String(priority_str(priority).to_string()));
        ctx
    }

    async fn rate_limit_for(
        &self,
        fleet_id: &FleetId,
        sender_tier: ringforge_core::Tier,
        action: Action,
        biz_override: Option<crate::rate_limiter::WindowLimit>,
    ) -> TierLimit {
        match biz_override {
            Some(w) => TierLimit::Window(w),
            None => {
                let _ = fleet_id;
                default_tier_limit(sender_tier, action)
            }
        }
    }

    /// Route a direct message, spec.md §4.2 / §4.6.
    #[instrument(skip(self, message), fields(fleet = %fleet_id, sender = %sender_id, target = %target_id))]
    pub async fn route_dm(
        &self,
        fleet_id: FleetId,
        sender_id: ringforge_core::AgentId,
        target_id: ringforge_core::AgentId,
        message: Map<String, Value>,
        correlation_id: Option<String>,
        priority: Priority,
    ) -> Result<DmOutcome, RouterError> {
        tokio::time::timeout(self.deadline, self.route_dm_inner(fleet_id, sender_id, target_id, message, correlation_id, priority))
            .await
            .map_err(|_| RouterError::Timeout)?
    }

    async fn route_dm_inner(
        &self,
        fleet_id: FleetId,
        sender_id: ringforge_core::AgentId,
        target_id: ringforge_core::AgentId,
        message: Map<String, Value>,
        correlation_id: Option<String>,
        priority: Priority,
    ) -> Result<DmOutcome, RouterError> {
        // 1. Validate: load and fleet-scope both agents.
        let sender = self.load_agent(&sender_id).await?;
        let target = self.load_agent(&target_id).await?;
        self.validate_same_fleet(&fleet_id, &sender, &target)?;

        let sender_tier = tier_for_agent(&sender);
        let target_tier = tier_for_agent(&target);
        let cross_squad = !(sender.squad_id.is_some() && sender.squad_id == target.squad_id);

        // 2. BusinessRules.
        let lookup = self.leader_lookup(&fleet_id, sender.squad_id.as_ref()).await;
        let rules = business_rules::load_rules(self.store.as_ref(), &fleet_id.to_string())
            .await
            .map_err(|e| RouterError::StoreFailed { reason: e.to_string() })?;
        let context = Self::business_context(sender_tier, Some(target_tier), Action::Dm, cross_squad, priority);
        let eval = evaluate(&rules, &context);
        if eval.is_denied() {
            let tier4 = sender_tier == ringforge_core::Tier::RESTRICTED;
            return Err(RouterError::denied(
                eval.deny_message().unwrap_or("denied by fleet business rule").to_string(),
                Some(suggestion_for(&sender, tier4, &lookup)),
            ));
        }

        // 3. AccessControl - skipped when a business rule already allowed
        // explicitly (e.g. the critical-priority bypass), per spec.md §4.5.
        if eval.access.is_none() {
            if let Decision::Denied { reason, suggestion } = can_dm(&sender, &target, &lookup) {
                return Err(RouterError::denied(reason, Some(suggestion)));
            }
        }

        // 4. RateLimit.
        let limit = self.rate_limit_for(&fleet_id, sender_tier, Action::Dm, eval.rate_limit_override).await;
        match self.rate_limiter.check_rate(&sender_id, Action::Dm, limit) {
            RateDecision::Limited { retry_after_ms } => return Err(RouterError::Limited { retry_after_ms }),
            RateDecision::Allowed => {}
        }

        // 5. Transform.
        let active_task = self.active_tasks.active_task_summary(&sender_id);
        let message = format_for_target(message, target_tier);
        let message = attach_active_task_context(message, active_task.clone());
        let message = apply_business_transforms(message, &eval.transforms, active_task.as_ref());

        // 6. Deliver.
        let outcome = self.dm.send_message(&fleet_id, &sender, &target, message, correlation_id).await?;
        self.rate_limiter.record(&sender_id, Action::Dm);
        Ok(outcome)
    }

    /// Route a broadcast, spec.md §4.2 / §4.7.
    #[instrument(skip(self, message), fields(fleet = %fleet_id, sender = %sender_id))]
    pub async fn route_broadcast(
        &self,
        fleet_id: FleetId,
        sender_id: ringforge_core::AgentId,
        scope: Scope,
        message: Map<String, Value>,
        priority: Priority,
    ) -> Result<usize, RouterError> {
        tokio::time::timeout(self.deadline, self.route_broadcast_inner(fleet_id, sender_id, scope, message, priority))
            .await
            .map_err(|_| RouterError::Timeout)?
    }

    async fn route_broadcast_inner(
        &self,
        fleet_id: FleetId,
        sender_id: ringforge_core::AgentId,
        scope: Scope,
        message: Map<String, Value>,
        priority: Priority,
    ) -> Result<usize, RouterError> {
        let sender = self.load_agent(&sender_id).await?;
        if sender.fleet_id != fleet_id {
            return Err(RouterError::not_in_this_fleet(sender.fleet_id, fleet_id));
        }
        let sender_tier = tier_for_agent(&sender);

        // Tier 2/3 may only target their own squad, never the fleet or a role.
        if let Scope::Squad(ref squad_ref) = scope {
            if sender_tier.0 >= 2 {
                let owns_squad = sender.squad_id.as_ref().map(|s| s.to_string()) == Some(squad_ref.0.clone());
                if !owns_squad {
                    return Err(RouterError::denied("Can only broadcast to your own squad", None));
                }
            }
        }

        let lookup = self.leader_lookup(&fleet_id, sender.squad_id.as_ref()).await;
        let rules = business_rules::load_rules(self.store.as_ref(), &fleet_id.to_string())
            .await
            .map_err(|e| RouterError::StoreFailed { reason: e.to_string() })?;
        let context = Self::business_context(sender_tier, None, Action::Broadcast, true, priority);
        let eval = evaluate(&rules, &context);
        if eval.is_denied() {
            let tier4 = sender_tier == ringforge_core::Tier::RESTRICTED;
            return Err(RouterError::denied(
                eval.deny_message().unwrap_or("denied by fleet business rule").to_string(),
                Some(suggestion_for(&sender, tier4, &lookup)),
            ));
        }

        if eval.access.is_none() {
            if let Decision::Denied { reason, suggestion } = can_broadcast(&sender, &scope, &lookup) {
                return Err(RouterError::denied(reason, Some(suggestion)));
            }
        }

        let limit = self.rate_limit_for(&fleet_id, sender_tier, Action::Broadcast, eval.rate_limit_override).await;
        match self.rate_limiter.check_rate(&sender_id, Action::Broadcast, limit) {
            RateDecision::Limited { retry_after_ms } => return Err(RouterError::Limited { retry_after_ms }),
            RateDecision::Allowed => {}
        }

        let active_task = self.active_tasks.active_task_summary(&sender_id);
        let message = attach_active_task_context(message, active_task.clone());
        let message = apply_business_transforms(message, &eval.transforms, active_task.as_ref());

        let reached = self.broadcast.broadcast(&fleet_id, &sender, &scope, message, priority).await?;
        self.rate_limiter.record(&sender_id, Action::Broadcast);
        Ok(reached)
    }

    /// Route an escalation, spec.md §4.2 / §4.8.
    #[instrument(skip(self, body, context_refs), fields(fleet = %fleet_id, sender = %sender_id))]
    pub async fn route_escalation(
        &self,
        fleet_id: FleetId,
        sender_id: ringforge_core::AgentId,
        target_role: String,
        subject: String,
        body: String,
        priority: Priority,
        context_refs: Vec<String>,
    ) -> Result<EscalationId, RouterError> {
        let sender = self.load_agent(&sender_id).await?;
        if sender.fleet_id != fleet_id {
            return Err(RouterError::not_in_this_fleet(sender.fleet_id, fleet_id));
        }
        let sender_tier = tier_for_agent(&sender);
        let target_tier = tier_for_slug(&target_role);

        if let Decision::Denied { reason, suggestion } = can_escalate(&sender, target_tier) {
            return Err(RouterError::denied(reason, Some(suggestion)));
        }

        let limit = self.rate_limit_for(&fleet_id, sender_tier, Action::Escalate, None).await;
        match self.rate_limiter.check_rate(&sender_id, Action::Escalate, limit) {
            RateDecision::Limited { retry_after_ms } => return Err(RouterError::Limited { retry_after_ms }),
            RateDecision::Allowed => {}
        }

        let id = self
            .escalation
            .escalate(&fleet_id, &sender, &target_role, subject, body, priority, context_refs)
            .await?;
        self.rate_limiter.record(&sender_id, Action::Escalate);
        Ok(id)
    }

    /// Route a thread reply, spec.md §4.2 / §4.9.
    #[instrument(skip(self, body, metadata, refs), fields(thread = %thread_id, agent = %agent_id))]
    pub async fn route_thread_reply(
        &self,
        thread_id: ThreadId,
        agent_id: ringforge_core::AgentId,
        body: Value,
        refs: Vec<String>,
        metadata: Map<String, Value>,
    ) -> Result<MessageId, RouterError> {
        let agent = self.load_agent(&agent_id).await?;
        let limit = self.rate_limit_for(&agent.fleet_id, tier_for_agent(&agent), Action::ThreadReply, None).await;
        match self.rate_limiter.check_rate(&agent_id, Action::ThreadReply, limit) {
            RateDecision::Limited { retry_after_ms } => return Err(RouterError::Limited { retry_after_ms }),
            RateDecision::Allowed => {}
        }
        let id = self.thread_reply.reply(&thread_id, &agent, body, refs, metadata).await?;
        self.rate_limiter.record(&agent_id, Action::ThreadReply);
        Ok(id)
    }

    /// Route an announcement, spec.md §4.2 / §4.10 - shares AccessControl
    /// semantics with a fleet/role/squad broadcast but produces a persisted
    /// `Announcement` rather than a transient fan-out message.
    #[instrument(skip(self, body, metadata), fields(fleet = %fleet_id, sender = %sender_id))]
    pub async fn route_announcement(
        &self,
        fleet_id: FleetId,
        sender_id: ringforge_core::AgentId,
        scope: Scope,
        body: String,
        priority: Priority,
        metadata: Map<String, Value>,
    ) -> Result<AnnouncementId, RouterError> {
        let sender = self.load_agent(&sender_id).await?;
        if sender.fleet_id != fleet_id {
            return Err(RouterError::not_in_this_fleet(sender.fleet_id, fleet_id));
        }
        let sender_tier = tier_for_agent(&sender);
        if sender_tier.0 > 1 {
            let lookup = self.leader_lookup(&fleet_id, sender.squad_id.as_ref()).await;
            return Err(RouterError::denied(
                "Announcements require Tier 0/1 role",
                Some(suggestion_for(&sender, sender_tier == ringforge_core::Tier::RESTRICTED, &lookup)),
            ));
        }
        self.announcement.announce(&fleet_id, &sender, &scope, body, priority, metadata).await
    }
}

fn action_str(action: Action) -> &'static str {
    match action {
        Action::Dm => "dm",
        Action::Broadcast => "broadcast",
        Action::Escalate => "escalate",
        Action::ThreadReply => "thread_reply",
    }
}

fn priority_str(priority: Priority) -> &'static str {
    match priority {
        Priority::Low => "low",
        Priority::Normal => "normal",
        Priority::High => "high",
        Priority::Critical => "critical",
    }
}
