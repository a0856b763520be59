//! Common types for the orderflow workflow engine.
//!
//! Shared data types used by the storage, configuration, core and service
//! crates: statuses, roles, order snapshots, transition verdicts and the audit
//! ledger.

/// Event types for subscribers of committed changes.
pub mod events;
/// Audit ledger entries.
pub mod history;
/// Order snapshots, statuses and storage records.
pub mod order;
/// Registry trait for pluggable implementations.
pub mod registry;
/// Actor roles.
pub mod role;
/// Storage namespaces.
pub mod storage;
/// Transition table entries, verdicts and requests.
pub mod transition;
/// Formatting helpers.
pub mod utils;
/// Configuration schema validation.
pub mod validation;

pub use events::*;
pub use history::*;
pub use order::*;
pub use registry::*;
pub use role::*;
pub use storage::*;
pub use transition::*;
pub use utils::{format_duration_minutes, truncate_id};
pub use validation::*;
