//! Layered merging of raw TOML trees.
//!
//! Merging happens before deserialization so that a key missing from an
//! upper layer never resets the value from a lower one.

mod deep;
mod types;

pub use deep::{deep_merge_tracking, record_leaves};
pub use types::{ConfigLayer, FieldSources};
