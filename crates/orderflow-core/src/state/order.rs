//! Order record persistence.
//!
//! Each order is stored as one [`OrderRecord`] holding the order snapshot and
//! its history, under `orders:<id>`. Writes that depend on what was read go
//! through compare-and-swap on the exact bytes read, so a concurrent writer
//! turns into a [`OrderStoreError::Conflict`] instead of a lost update.
//!
//! This store never changes an order's status. Status changes are built by the
//! transition executor and handed to [`OrderStore::commit`] as a whole record.

use chrono::{DateTime, Utc};
use orderflow_storage::{Snapshot, StorageError, StorageService};
use orderflow_types::{NewOrder, Order, OrderDetails, OrderRecord, OrderStatus, StorageKey};
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur while reading or writing order records.
#[derive(Debug, Error)]
pub enum OrderStoreError {
	#[error("Order not found: {0}")]
	NotFound(String),
	#[error("Order already exists: {0}")]
	AlreadyExists(String),
	/// The record changed between read and write.
	#[error("Order {0} was modified concurrently")]
	Conflict(String),
	#[error("Storage error: {0}")]
	Storage(#[from] StorageError),
}

impl OrderStoreError {
	/// Returns true for backend failures that may succeed on retry.
	pub fn is_transient(&self) -> bool {
		matches!(self, OrderStoreError::Storage(e) if e.is_transient())
	}
}

/// Typed access to order records.
pub struct OrderStore {
	storage: Arc<StorageService>,
	detail_update_attempts: u32,
}

impl OrderStore {
	pub fn new(storage: Arc<StorageService>, detail_update_attempts: u32) -> Self {
		Self {
			storage,
			detail_update_attempts: detail_update_attempts.max(1),
		}
	}

	/// Loads a record together with the bytes a later commit is conditioned on.
	pub async fn load(&self, order_id: &str) -> Result<Snapshot<OrderRecord>, OrderStoreError> {
		self.storage
			.load(StorageKey::Orders.as_str(), order_id)
			.await
			.map_err(|e| match e {
				StorageError::NotFound => OrderStoreError::NotFound(order_id.to_string()),
				other => OrderStoreError::Storage(other),
			})
	}

	/// Gets the current order snapshot.
	pub async fn get_order(&self, order_id: &str) -> Result<Order, OrderStoreError> {
		Ok(self.load(order_id).await?.into_value().order)
	}

	/// Registers a new order in the initial status with an empty history.
	pub async fn create(
		&self,
		new_order: NewOrder,
		actor_id: &str,
		now: DateTime<Utc>,
	) -> Result<Order, OrderStoreError> {
		let id = new_order
			.id
			.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
		let order = Order {
			id: id.clone(),
			status: OrderStatus::INITIAL,
			created_by: actor_id.to_string(),
			created_at: now,
			updated_at: now,
			details: new_order.details,
		};

		self.storage
			.insert_new(StorageKey::Orders.as_str(), &id, &OrderRecord::new(order.clone()))
			.await
			.map_err(|e| match e {
				StorageError::PreconditionFailed(_) => OrderStoreError::AlreadyExists(id.clone()),
				other => OrderStoreError::Storage(other),
			})?;

		Ok(order)
	}

	/// Applies `updater` to the order details and persists the result.
	///
	/// On a concurrent change the record is reloaded and `updater` applied again,
	/// up to the configured number of attempts. Status and history are carried
	/// over from the latest read untouched.
	pub async fn update_details<F>(
		&self,
		order_id: &str,
		mut updater: F,
	) -> Result<Order, OrderStoreError>
	where
		F: FnMut(&mut OrderDetails),
	{
		for attempt in 1..=self.detail_update_attempts {
			let snapshot = self.load(order_id).await?;
			let mut record = snapshot.value.clone();

			updater(&mut record.order.details);
			record.order.updated_at = Utc::now().max(record.order.updated_at);

			match self.commit(&snapshot, &record).await {
				Ok(()) => return Ok(record.order),
				Err(OrderStoreError::Conflict(_)) => {
					tracing::debug!(
						order_id = %orderflow_types::truncate_id(order_id),
						attempt,
						"Order changed during detail update, retrying"
					);
				},
				Err(e) => return Err(e),
			}
		}

		Err(OrderStoreError::Conflict(order_id.to_string()))
	}

	/// Replaces a record if it is still exactly what `previous` was read from.
	pub async fn commit(
		&self,
		previous: &Snapshot<OrderRecord>,
		record: &OrderRecord,
	) -> Result<(), OrderStoreError> {
		self.storage
			.replace(StorageKey::Orders.as_str(), &record.order.id, previous, record)
			.await
			.map_err(|e| match e {
				StorageError::PreconditionFailed(_) => {
					OrderStoreError::Conflict(record.order.id.clone())
				},
				other => OrderStoreError::Storage(other),
			})
	}

	/// Lists the ids of all stored orders.
	pub async fn list_ids(&self) -> Result<Vec<String>, OrderStoreError> {
		Ok(self.storage.list_ids(StorageKey::Orders.as_str()).await?)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use orderflow_storage::implementations::memory::MemoryStorage;
	use orderflow_types::EquipmentItem;

	fn store() -> OrderStore {
		OrderStore::new(
			Arc::new(StorageService::new(Box::new(MemoryStorage::new()))),
			3,
		)
	}

	fn new_order(id: &str) -> NewOrder {
		NewOrder {
			id: Some(id.into()),
			details: OrderDetails::default(),
		}
	}

	#[tokio::test]
	async fn test_create_and_get() {
		let store = store();
		let created = store.create(new_order("ord-1"), "u-1", Utc::now()).await.unwrap();
		assert_eq!(created.status, OrderStatus::Created);
		assert_eq!(created.created_by, "u-1");

		let loaded = store.get_order("ord-1").await.unwrap();
		assert_eq!(loaded, created);
		assert!(store.load("ord-1").await.unwrap().value.history.is_empty());
	}

	#[tokio::test]
	async fn test_create_generates_id() {
		let store = store();
		let created = store
			.create(NewOrder::default(), "u-1", Utc::now())
			.await
			.unwrap();
		assert!(!created.id.is_empty());
		assert_eq!(store.list_ids().await.unwrap(), vec![created.id]);
	}

	#[tokio::test]
	async fn test_create_refuses_duplicate_id() {
		let store = store();
		store.create(new_order("ord-1"), "u-1", Utc::now()).await.unwrap();
		let result = store.create(new_order("ord-1"), "u-2", Utc::now()).await;
		assert!(matches!(result, Err(OrderStoreError::AlreadyExists(_))));
	}

	#[tokio::test]
	async fn test_missing_order() {
		let result = store().get_order("nope").await;
		assert!(matches!(result, Err(OrderStoreError::NotFound(_))));
	}

	#[tokio::test]
	async fn test_update_details_keeps_status() {
		let store = store();
		store.create(new_order("ord-1"), "u-1", Utc::now()).await.unwrap();

		let updated = store
			.update_details("ord-1", |details| {
				details.hospital = Some("Central".into());
				details.equipment = Some(vec![EquipmentItem {
					id: "eq-1".into(),
					name: "Drill".into(),
					quantity: 1,
					confirmed: false,
					confirmed_price: None,
				}]);
			})
			.await
			.unwrap();

		assert_eq!(updated.status, OrderStatus::Created);
		assert_eq!(updated.details.hospital.as_deref(), Some("Central"));
		assert_eq!(store.get_order("ord-1").await.unwrap(), updated);
	}

	#[tokio::test]
	async fn test_commit_detects_stale_snapshot() {
		let store = store();
		store.create(new_order("ord-1"), "u-1", Utc::now()).await.unwrap();

		let stale = store.load("ord-1").await.unwrap();
		store
			.update_details("ord-1", |d| d.evidence_count += 1)
			.await
			.unwrap();

		let mut record = stale.value.clone();
		record.order.details.procedure = Some("Knee".into());
		let result = store.commit(&stale, &record).await;
		assert!(matches!(result, Err(OrderStoreError::Conflict(_))));
		assert_eq!(
			store.get_order("ord-1").await.unwrap().details.evidence_count,
			1
		);
	}
}
