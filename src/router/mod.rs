//! Inbound session routing: namespacing, cursors, pagination, the session
//! table, coalesced list-changed notifications, reverse fan-out, and the
//! method-dispatch table that ties them together (spec §4.2, §4.3).

pub mod cursor;
pub mod dispatch;
pub mod namespace;
pub mod notify;
pub mod pagination;
pub mod reverse;
pub mod session;

pub use dispatch::Router;
pub use pagination::PaginationMode;
pub use session::{InboundSession, SessionTable, VisibilityMode};
