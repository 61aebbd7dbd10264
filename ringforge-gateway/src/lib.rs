//! RingForge Hub gateway - the duplex channel protocol endpoint and admin
//! control plane. State/routes/ws/auth modules wired together, with
//! `ringforge-hub` as the thin binary that loads config and starts the
//! server.

pub mod active_tasks;
pub mod admin_store;
pub mod auth;
pub mod connections;
pub mod error;
pub mod frame;
pub mod metrics;
pub mod routes;
pub mod state;
pub mod sync_files;
#[cfg(test)]
mod test_support;
pub mod ws;

pub use error::{to_reply_error, AdminApiError};
pub use frame::Frame;
pub use routes::create_router;
pub use state::GatewayState;
pub use ws::{broadcast_drain, ws_handler};
