//! Subscriber and query filtering.

pub mod spec;

pub use spec::{FilterSpec, LEVEL_NONE};
