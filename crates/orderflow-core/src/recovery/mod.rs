//! Ledger audit over stored orders.
//!
//! Walks every stored order record and checks that its history is one unbroken
//! chain from the initial status to the order's current status. Meant to be run
//! after restoring storage from a backup or after a crash, before the engine
//! takes traffic again. It only reports; nothing is repaired.

use crate::history::HistoryStore;
use crate::state::{OrderStore, OrderStoreError};
use orderflow_storage::StorageError;
use orderflow_types::truncate_id;
use serde::Serialize;
use std::sync::Arc;
use tracing::instrument;

/// A stored order whose ledger failed verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerIssue {
	pub order_id: String,
	pub problem: String,
}

/// Result of auditing every stored order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LedgerReport {
	/// Number of order records examined.
	pub total_orders: usize,
	/// Records whose ledger matched their status.
	pub consistent: usize,
	pub issues: Vec<LedgerIssue>,
}

impl LedgerReport {
	pub fn is_clean(&self) -> bool {
		self.issues.is_empty()
	}
}

/// Verifies the ledgers of all stored orders.
pub struct LedgerAuditor {
	orders: Arc<OrderStore>,
}

impl LedgerAuditor {
	pub fn new(orders: Arc<OrderStore>) -> Self {
		Self { orders }
	}

	/// Audits every stored order.
	///
	/// Records that cannot be decoded are reported as issues. Backend failures
	/// abort the audit.
	#[instrument(skip_all)]
	pub async fn audit(&self) -> Result<LedgerReport, OrderStoreError> {
		let mut report = LedgerReport::default();

		for order_id in self.orders.list_ids().await? {
			let record = match self.orders.load(&order_id).await {
				Ok(snapshot) => snapshot.into_value(),
				// Removed since listing.
				Err(OrderStoreError::NotFound(_)) => continue,
				Err(OrderStoreError::Storage(StorageError::Serialization(e))) => {
					report.total_orders += 1;
					report.issues.push(LedgerIssue {
						order_id,
						problem: format!("Unreadable record: {}", e),
					});
					continue;
				},
				Err(e) => return Err(e),
			};

			report.total_orders += 1;
			match HistoryStore::verify(&record) {
				Ok(()) => report.consistent += 1,
				Err(e) => {
					tracing::warn!(order_id = %truncate_id(&order_id), error = %e, "Inconsistent ledger");
					report.issues.push(LedgerIssue {
						order_id,
						problem: e.to_string(),
					});
				},
			}
		}

		tracing::info!(
			total = report.total_orders,
			consistent = report.consistent,
			issues = report.issues.len(),
			"Ledger audit finished"
		);
		Ok(report)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::Utc;
	use orderflow_storage::{
		implementations::memory::MemoryStorage, StorageInterface, StorageService,
	};
	use orderflow_types::{NewOrder, OrderStatus};

	#[tokio::test]
	async fn test_audit_reports_broken_ledgers() {
		let backend = Arc::new(MemoryStorage::new());
		let storage = StorageService::new(Box::new(SharedMemory(backend.clone())));
		let orders = Arc::new(OrderStore::new(Arc::new(storage), 3));

		for id in ["a", "b"] {
			orders
				.create(
					NewOrder {
						id: Some(id.into()),
						..Default::default()
					},
					"u-1",
					Utc::now(),
				)
				.await
				.unwrap();
		}

		// Status moved without an entry.
		let snapshot = orders.load("b").await.unwrap();
		let mut tampered = snapshot.value.clone();
		tampered.order.status = OrderStatus::Approved;
		orders.commit(&snapshot, &tampered).await.unwrap();

		backend
			.set_bytes("orders:c", b"not json".to_vec())
			.await
			.unwrap();

		let report = LedgerAuditor::new(orders).audit().await.unwrap();
		assert_eq!(report.total_orders, 3);
		assert_eq!(report.consistent, 1);
		assert!(!report.is_clean());
		let flagged: Vec<_> = report.issues.iter().map(|i| i.order_id.as_str()).collect();
		assert_eq!(flagged, vec!["b", "c"]);
	}

	/// Lets the test keep a handle on the backend it gives away.
	struct SharedMemory(Arc<MemoryStorage>);

	#[async_trait::async_trait]
	impl StorageInterface for SharedMemory {
		async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError> {
			self.0.get_bytes(key).await
		}

		async fn set_bytes(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
			self.0.set_bytes(key, value).await
		}

		async fn delete(&self, key: &str) -> Result<(), StorageError> {
			self.0.delete(key).await
		}

		async fn exists(&self, key: &str) -> Result<bool, StorageError> {
			self.0.exists(key).await
		}

		async fn compare_and_swap(
			&self,
			key: &str,
			expected: Option<&[u8]>,
			value: Vec<u8>,
		) -> Result<(), StorageError> {
			self.0.compare_and_swap(key, expected, value).await
		}

		async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
			self.0.keys_with_prefix(prefix).await
		}

		fn config_schema(&self) -> Box<dyn orderflow_types::ConfigSchema> {
			self.0.config_schema()
		}
	}
}
