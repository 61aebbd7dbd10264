//! Thread monotonicity over random `add_message` sequences - spec.md §8.

use proptest::prelude::*;
use ringforge_core::{AgentId, EntityIdType, FleetId, TenantId, ThreadScope};
use ringforge_messaging::notifications::Notifications;
use ringforge_messaging::threads::{NewThread, Threads};
use ringforge_storage::{InMemoryKvStore, PubSub};
use serde_json::{Map, Value};
use std::sync::Arc;

fn threads() -> Threads {
    let store = InMemoryKvStore::new();
    let pubsub = Arc::new(PubSub::default());
    let notifications = Arc::new(Notifications::new(store.clone(), pubsub.clone()));
    Threads::new(store, pubsub, notifications)
}

proptest! {
    /// Whatever order a random batch of `add_message` calls lands in,
    /// `message_count` always matches the number of calls that succeeded
    /// and `thread_messages` always returns them in non-decreasing
    /// timestamp order.
    #[test]
    fn message_count_and_ordering_survive_any_add_sequence(bodies in prop::collection::vec("[a-z]{1,12}", 1..40)) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let threads = threads();
            let thread = threads
                .create_thread(NewThread {
                    fleet_id: FleetId::new_v4(),
                    tenant_id: TenantId::new_v4(),
                    scope: ThreadScope::Squad,
                    subject: "monotonic".to_string(),
                    participant_ids: vec![],
                    task_id: None,
                    created_by: AgentId::new("ag_seed"),
                })
                .await
                .unwrap();

            let agent = AgentId::new("ag_writer");
            for body in &bodies {
                threads
                    .add_message(&thread.thread_id, &agent, Value::String(body.clone()), vec![], Map::new())
                    .await
                    .unwrap();
            }

            let reloaded = threads.thread_messages(&thread.thread_id, usize::MAX, None).await.unwrap();
            prop_assert_eq!(reloaded.len(), bodies.len());

            for window in reloaded.windows(2) {
                prop_assert!(window[0].timestamp <= window[1].timestamp);
            }
        });
        Ok(())
    }
}
