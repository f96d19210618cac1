//! Upstream connection lifecycle: per-server transports, the connection
//! state machine, and the manager that reconciles the live set against
//! config reloads (spec §4.1).

pub mod connection;
pub mod legacy_sse;
pub mod manager;

pub use connection::{Capabilities, ConnectionState, UpstreamConnection};
pub use manager::{spawn_health_loop, UpstreamManager};
