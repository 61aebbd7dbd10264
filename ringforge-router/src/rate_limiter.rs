//! Per-agent, per-action sliding-window rate limiting - spec.md §4.4.

use dashmap::DashMap;
use parking_lot::Mutex;
use ringforge_core::{now_ms, Action, AgentId, DurationMs, Tier};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// A sliding window cap: at most `max` events per `window_ms`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowLimit {
    pub max: u32,
    pub window_ms: i64,
}

/// The tier-default limit for an (tier, action) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TierLimit {
    Unlimited,
    Forbidden,
    Window(WindowLimit),
}

const MINUTE_MS: i64 = 60_000;
const HOUR_MS: i64 = 3_600_000;

/// The default limit table from spec.md §4.4. `BusinessRules` rate-limit
/// rules may override this for a specific (tier, action) pair.
pub fn default_tier_limit(tier: Tier, action: Action) -> TierLimit {
    use Action::*;
    match (tier.0, action) {
        (0, _) | (1, _) => TierLimit::Unlimited,
        (2, Dm) => TierLimit::Window(WindowLimit { max: 60, window_ms: MINUTE_MS }),
        (2, Broadcast) => TierLimit::Window(WindowLimit { max: 10, window_ms: HOUR_MS }),
        (3, Dm) => TierLimit::Window(WindowLimit { max: 20, window_ms: MINUTE_MS }),
        (3, Broadcast) => TierLimit::Window(WindowLimit { max: 3, window_ms: HOUR_MS }),
        (4, Dm) => TierLimit::Window(WindowLimit { max: 5, window_ms: MINUTE_MS }),
        (4, Broadcast) => TierLimit::Forbidden,
        // Escalation and thread-reply are not tiered in spec.md §4.4's table;
        // treat as unlimited at the rate-limiter layer (AccessControl still
        // governs who may perform them).
        (_, Escalate) | (_, ThreadReply) => TierLimit::Unlimited,
        _ => TierLimit::Unlimited,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed,
    Limited { retry_after_ms: DurationMs },
}

/// Sliding-window counter state, one `Vec<i64>` of monotonic-millisecond
/// timestamps per (agent, action).
pub struct RateLimiter {
    windows: DashMap<(AgentId, Action), Arc<Mutex<Vec<i64>>>>,
    max_window_ms: i64,
}

impl RateLimiter {
    pub fn new(max_window_ms: i64) -> Self {
        Self { windows: DashMap::new(), max_window_ms }
    }

    fn bucket(&self, agent_id: &AgentId, action: Action) -> Arc<Mutex<Vec<i64>>> {
        self.windows
            .entry((agent_id.clone(), action))
            .or_insert_with(|| Arc::new(Mutex::new(Vec::new())))
            .clone()
    }

    /// Check whether `agent_id` may perform `action` given its `tier`,
    /// against an explicit limit (the tier default, or a BusinessRules
    /// override). Does not record the event - call `record` after the
    /// downstream delivery succeeds.
    pub fn check_rate(&self, agent_id: &AgentId, action: Action, limit: TierLimit) -> RateDecision {
        let limit = match limit {
            TierLimit::Unlimited => return RateDecision::Allowed,
            TierLimit::Forbidden => {
                // Forbidden is an AccessControl concern, not a rate concern;
                // treat as an immediate (non-retryable) limit at the window
                // boundary so callers never silently allow it.
                return RateDecision::Limited { retry_after_ms: i64::MAX };
            }
            TierLimit::Window(w) => w,
        };

        let bucket = self.bucket(agent_id, action);
        let mut timestamps = bucket.lock();
        let now = now_ms();
        let cutoff = now - limit.window_ms;
        timestamps.retain(|&t| t > cutoff);

        if timestamps.len() as u32 >= limit.max {
            let oldest = *timestamps.last().unwrap_or(&now);
            let retry_after_ms = (oldest + limit.window_ms - now).max(1);
            debug!(%agent_id, ?action, retry_after_ms, "rate limited");
            RateDecision::Limited { retry_after_ms }
        } else {
            RateDecision::Allowed
        }
    }

    /// Record that `agent_id` performed `action` now. Only called after the
    /// downstream operation actually succeeds - spec.md §4.2 step 8.
    pub fn record(&self, agent_id: &AgentId, action: Action) {
        let bucket = self.bucket(agent_id, action);
        bucket.lock().insert(0, now_ms());
    }

    /// Evict timestamps older than the longest tracked window from every
    /// bucket. Intended to run on a periodic interval (spec.md §4.4: every
    /// 5 minutes).
    pub fn run_janitor_pass(&self) {
        let cutoff = now_ms() - self.max_window_ms;
        for entry in self.windows.iter() {
            entry.value().lock().retain(|&t| t > cutoff);
        }
    }

    pub async fn spawn_janitor(self: Arc<Self>, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            self.run_janitor_pass();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unlimited_tiers_are_never_limited() {
        let limiter = RateLimiter::new(HOUR_MS);
        let agent = AgentId::new("ag_a");
        for _ in 0..1000 {
            assert_eq!(
                limiter.check_rate(&agent, Action::Dm, TierLimit::Unlimited),
                RateDecision::Allowed
            );
            limiter.record(&agent, Action::Dm);
        }
    }

    #[test]
    fn tier4_dm_allows_five_then_limits() {
        let limiter = RateLimiter::new(HOUR_MS);
        let agent = AgentId::new("ag_r");
        let limit = default_tier_limit(Tier::RESTRICTED, Action::Dm);
        for i in 0..5 {
            assert_eq!(limiter.check_rate(&agent, Action::Dm, limit), RateDecision::Allowed, "attempt {i}");
            limiter.record(&agent, Action::Dm);
        }
        match limiter.check_rate(&agent, Action::Dm, limit) {
            RateDecision::Limited { retry_after_ms } => {
                assert!(retry_after_ms > 0 && retry_after_ms <= MINUTE_MS);
            }
            RateDecision::Allowed => panic!("6th dm should be limited"),
        }
    }

    #[test]
    fn pruned_events_free_up_the_window() {
        let limiter = RateLimiter::new(HOUR_MS);
        let agent = AgentId::new("ag_r");
        let bucket = limiter.bucket(&agent, Action::Dm);
        // Simulate 5 events from well outside the 1-minute window.
        {
            let mut ts = bucket.lock();
            for _ in 0..5 {
                ts.push(now_ms() - 2 * MINUTE_MS);
            }
        }
        let limit = default_tier_limit(Tier::RESTRICTED, Action::Dm);
        assert_eq!(limiter.check_rate(&agent, Action::Dm, limit), RateDecision::Allowed);
    }

    #[test]
    fn janitor_evicts_entries_older_than_the_longest_window() {
        let limiter = RateLimiter::new(HOUR_MS);
        let agent = AgentId::new("ag_r");
        let bucket = limiter.bucket(&agent, Action::Dm);
        bucket.lock().push(now_ms() - 2 * HOUR_MS);
        limiter.run_janitor_pass();
        assert!(bucket.lock().is_empty());
    }
}
