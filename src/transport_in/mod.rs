//! Inbound transport adapters (spec §4.7, §6): the aggregated `stdio` and
//! `http` surfaces a client actually connects to, as opposed to the
//! upstream-facing transports in [`crate::upstream`].

pub mod http;
pub mod stdio;

pub use http::{create_router, start_http_server, InboundState};
