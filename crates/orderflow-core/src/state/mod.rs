//! State management for orders.
//!
//! This module holds the static transition table that defines legal status
//! changes and the record store that persists orders with compare-and-swap.

pub mod order;
pub mod transitions;

pub use order::{OrderStore, OrderStoreError};
pub use transitions::{TableIntegrityError, TransitionTable, TRANSITIONS};
