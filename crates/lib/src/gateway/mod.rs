//! Gateway: HTTP control plane.
//!
//! Single port. Serves a health check, accepts inbound Stack chat events and watch
//! announcements from the chat sidecar, and reloads the command table on request.

mod server;

pub use server::{router, run_gateway, GatewayState, StackEvent, WatchRequest};
