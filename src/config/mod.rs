//! Configuration: descriptors, on-disk format, env substitution, loading,
//! diffing, and hot-reload watching (spec §4.6, §6).

pub mod app;
pub mod descriptor;
pub mod diff;
pub mod loader;
pub mod substitute;
pub mod template;
pub mod watcher;

pub use app::{AppConfig, ServerTemplate};
pub use descriptor::{is_valid_upstream_name, validate_descriptor, TransportKind, UpstreamDescriptor};
pub use diff::{diff_descriptors, ConfigDiff, Modified};
pub use loader::{ConfigManager, LoadOutcome};
pub use template::{connection_key, render_descriptor, SessionContext};
pub use watcher::{ConfigWatcher, TransportConfigChanged, WatcherState};
