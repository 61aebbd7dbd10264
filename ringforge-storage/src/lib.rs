//! RingForge Storage - KV document store and pub/sub fan-out.
//!
//! A schemaless prefix-scannable document store, since the hub's persisted
//! state (queues, threads, escalations, notifications, business rules) is
//! keyed JSON, not a fixed set of cacheable entity structs.

mod kv;
mod pubsub;

pub use kv::*;
pub use pubsub::*;
