//! Small helpers shared by the orderflow crates.

pub mod formatting;

pub use formatting::{format_duration_minutes, truncate_id};
