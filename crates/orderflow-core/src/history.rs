//! Append-only audit ledger.
//!
//! History entries live inside the order record. Appending happens only on a
//! record the executor is about to commit, so an entry becomes visible exactly
//! when its status change does. Reads go through the last committed record and
//! never wait on a commit in progress.

use crate::state::{OrderStore, OrderStoreError};
use orderflow_types::{OrderRecord, OrderStatus, StatusHistoryEntry};
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;

/// Reasons an entry cannot be appended, or a stored ledger is inconsistent.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HistoryError {
	#[error("Duplicate history entry id {0}")]
	DuplicateEntry(String),
	#[error("Entry belongs to order {actual}, not {expected}")]
	WrongOrder { expected: String, actual: String },
	#[error("Entry starts at {actual} but the order is at {expected}")]
	BrokenChain {
		expected: OrderStatus,
		actual: OrderStatus,
	},
	#[error("Entry {0} is older than the previous entry")]
	OutOfOrder(String),
	#[error("Ledger ends at {ledger} but the order is at {order}")]
	StatusMismatch {
		ledger: OrderStatus,
		order: OrderStatus,
	},
}

/// Read access to the ledger and the append rules it enforces.
pub struct HistoryStore {
	orders: Arc<OrderStore>,
}

impl HistoryStore {
	pub fn new(orders: Arc<OrderStore>) -> Self {
		Self { orders }
	}

	/// Adds `entry` to `record` if it continues the ledger.
	///
	/// The entry must belong to the record's order, start from the order's
	/// current status, carry a fresh id and not predate the last entry.
	pub(crate) fn append(
		record: &mut OrderRecord,
		entry: StatusHistoryEntry,
	) -> Result<(), HistoryError> {
		if entry.order_id != record.order.id {
			return Err(HistoryError::WrongOrder {
				expected: record.order.id.clone(),
				actual: entry.order_id,
			});
		}
		if entry.from_status != record.order.status {
			return Err(HistoryError::BrokenChain {
				expected: record.order.status,
				actual: entry.from_status,
			});
		}
		if record.history.iter().any(|e| e.id == entry.id) {
			return Err(HistoryError::DuplicateEntry(entry.id));
		}
		if let Some(last) = record.history.last() {
			if entry.changed_at < last.changed_at {
				return Err(HistoryError::OutOfOrder(entry.id));
			}
		}
		record.history.push(entry);
		Ok(())
	}

	/// Checks that a stored ledger is one unbroken chain from the initial
	/// status to the order's current status.
	pub fn verify(record: &OrderRecord) -> Result<(), HistoryError> {
		let mut status = OrderStatus::INITIAL;
		let mut ids = HashSet::new();
		let mut previous = None;

		for entry in &record.history {
			if entry.order_id != record.order.id {
				return Err(HistoryError::WrongOrder {
					expected: record.order.id.clone(),
					actual: entry.order_id.clone(),
				});
			}
			if entry.from_status != status {
				return Err(HistoryError::BrokenChain {
					expected: status,
					actual: entry.from_status,
				});
			}
			if !ids.insert(entry.id.as_str()) {
				return Err(HistoryError::DuplicateEntry(entry.id.clone()));
			}
			if previous.is_some_and(|at| entry.changed_at < at) {
				return Err(HistoryError::OutOfOrder(entry.id.clone()));
			}
			status = entry.to_status;
			previous = Some(entry.changed_at);
		}

		if status != record.order.status {
			return Err(HistoryError::StatusMismatch {
				ledger: status,
				order: record.order.status,
			});
		}
		Ok(())
	}

	/// Returns the entries of an order ordered by `changed_at`, ties in commit
	/// order.
	pub async fn list_by_order(
		&self,
		order_id: &str,
	) -> Result<Vec<StatusHistoryEntry>, OrderStoreError> {
		let mut history = self.orders.load(order_id).await?.into_value().history;
		history.sort_by_key(|entry| entry.changed_at);
		Ok(history)
	}
}
