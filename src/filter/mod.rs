//! Tag-based visibility filtering: the boolean DSL, its JSON-query sibling,
//! and named presets (spec §4.5).

pub mod dsl;
pub mod preset;
pub mod query;

pub use dsl::TagExpr;
pub use preset::{Preset, PresetChanged, PresetStore};
pub use query::FilterQuery;
