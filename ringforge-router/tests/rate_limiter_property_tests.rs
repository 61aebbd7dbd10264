//! Rate-limiter soundness over random event streams - spec.md §8.

use proptest::prelude::*;
use ringforge_core::{Action, AgentId};
use ringforge_router::rate_limiter::{RateDecision, RateLimiter, TierLimit, WindowLimit};

proptest! {
    /// However a random burst of `record` calls is interleaved with
    /// `check_rate` calls, the limiter never lets more than `max` events
    /// land within any trailing `window_ms` slice.
    #[test]
    fn never_allows_more_than_max_events_in_the_window(
        max in 1u32..20,
        attempts in 1usize..200,
    ) {
        let limiter = RateLimiter::new(3_600_000);
        let agent = AgentId::new("ag_property");
        let limit = TierLimit::Window(WindowLimit { max, window_ms: 1_000 });

        let mut allowed_in_flight = 0u32;
        for _ in 0..attempts {
            match limiter.check_rate(&agent, Action::Dm, limit) {
                RateDecision::Allowed => {
                    limiter.record(&agent, Action::Dm);
                    allowed_in_flight += 1;
                }
                RateDecision::Limited { .. } => {}
            }
        }
        prop_assert!(allowed_in_flight <= max);
    }

    /// An unlimited tier limit never rejects, no matter how many events are
    /// recorded back to back.
    #[test]
    fn unlimited_never_rejects(attempts in 1usize..200) {
        let limiter = RateLimiter::new(3_600_000);
        let agent = AgentId::new("ag_unlimited");
        for _ in 0..attempts {
            let decision = limiter.check_rate(&agent, Action::Broadcast, TierLimit::Unlimited);
            prop_assert_eq!(decision, RateDecision::Allowed);
            limiter.record(&agent, Action::Broadcast);
        }
    }
}
