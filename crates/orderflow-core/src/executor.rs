//! Transition executor.
//!
//! The only component that changes an order's status. A transition is committed
//! as one compare-and-swap of the order record carrying both the new status and
//! its history entry, so either both are stored or neither is.

use crate::engine::context::{self, ContextError, OrderContextProvider};
use crate::engine::event_bus::EventBus;
use crate::history::{HistoryError, HistoryStore};
use crate::state::{OrderStore, OrderStoreError, TransitionTable};
use crate::validation::TransitionValidator;
use chrono::{DateTime, Utc};
use orderflow_storage::Snapshot;
use orderflow_types::{
	truncate_id, HistoryMetadata, Order, OrderRecord, OrderStatus, StateTransition,
	StatusHistoryEntry, TransitionRequest, TransitionValidation, UserRole, WorkflowEvent,
};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::instrument;

/// Errors returned by [`TransitionExecutor::execute`].
#[derive(Debug, Error)]
pub enum TransitionError {
	#[error("Order not found: {0}")]
	OrderNotFound(String),
	/// The role may not perform this move from the order's current status.
	#[error("Role {role} may not move an order from {from} to {to}")]
	NotAllowed {
		from: OrderStatus,
		to: OrderStatus,
		role: UserRole,
	},
	/// Business rules blocked the move; the order has to be fixed first.
	#[error("Transition to {to} failed validation: {}", .validation.errors.join("; "))]
	ValidationFailed {
		to: OrderStatus,
		validation: TransitionValidation,
	},
	/// The order is no longer in the status the request was based on.
	#[error("Order {order_id} is in {actual}, expected {expected}")]
	StaleState {
		order_id: String,
		expected: OrderStatus,
		actual: OrderStatus,
	},
	/// The order's details kept changing under every commit attempt.
	#[error("Order {order_id} kept changing after {attempts} commit attempts")]
	ContentionExhausted { order_id: String, attempts: u32 },
	#[error(transparent)]
	Context(#[from] ContextError),
	#[error("Audit ledger error: {0}")]
	Ledger(#[from] HistoryError),
	#[error("Persistence error: {0}")]
	Persistence(String),
}

impl TransitionError {
	/// Returns true when refreshing the order and submitting again may succeed.
	pub fn is_retryable(&self) -> bool {
		matches!(
			self,
			TransitionError::StaleState { .. }
				| TransitionError::ContentionExhausted { .. }
				| TransitionError::Persistence(_)
		)
	}
}

impl From<OrderStoreError> for TransitionError {
	fn from(err: OrderStoreError) -> Self {
		match err {
			OrderStoreError::NotFound(id) => TransitionError::OrderNotFound(id),
			other => TransitionError::Persistence(other.to_string()),
		}
	}
}

/// Validates and commits status transitions.
pub struct TransitionExecutor {
	orders: Arc<OrderStore>,
	table: TransitionTable,
	validator: TransitionValidator,
	context_provider: Arc<dyn OrderContextProvider>,
	event_bus: EventBus,
	retry_delay: Duration,
	commit_attempts: u32,
}

impl TransitionExecutor {
	pub fn new(
		orders: Arc<OrderStore>,
		context_provider: Arc<dyn OrderContextProvider>,
		event_bus: EventBus,
		retry_delay: Duration,
		commit_attempts: u32,
	) -> Self {
		Self {
			orders,
			table: TransitionTable,
			validator: TransitionValidator::new(),
			context_provider,
			event_bus,
			retry_delay,
			commit_attempts: commit_attempts.max(1),
		}
	}

	/// Moves an order to `request.target` and records the change.
	///
	/// A commit that loses a race against another transition fails with
	/// [`TransitionError::StaleState`]. A commit that loses only against a
	/// detail edit is re-validated on the fresh record and tried again.
	#[instrument(skip_all, fields(order_id = %truncate_id(&request.order_id), to = %request.target, role = %request.role))]
	pub async fn execute(&self, request: TransitionRequest) -> Result<Order, TransitionError> {
		for attempt in 1..=self.commit_attempts {
			let snapshot = self
				.with_retry("load", || self.orders.load(&request.order_id))
				.await?;
			let current = snapshot.value.order.status;

			if let Some(expected) = request.expected_status {
				if expected != current {
					return Err(TransitionError::StaleState {
						order_id: request.order_id.clone(),
						expected,
						actual: current,
					});
				}
			}

			let transition = self
				.table
				.transition(current, request.target, request.role)
				.ok_or(TransitionError::NotAllowed {
					from: current,
					to: request.target,
					role: request.role,
				})?;

			let now = Utc::now();
			let validation = {
				let context =
					context::gather(self.context_provider.as_ref(), &snapshot.value.order, now)
						.await?;
				self.validator
					.validate(&context, request.target, request.role)
			};
			if !validation.is_valid {
				tracing::info!(errors = ?validation.errors, "Transition blocked by validation");
				return Err(TransitionError::ValidationFailed {
					to: request.target,
					validation,
				});
			}

			let acknowledged = acknowledged_warnings(&request, validation.warnings);
			let record = build_record(&snapshot.value, &request, &transition, acknowledged, now)?;

			match self.commit(&snapshot, &record).await {
				Ok(()) => {
					let entry_time = record.order.updated_at;
					tracing::info!(from = %current, "Transition committed");
					self.event_bus
						.publish(WorkflowEvent::TransitionCommitted {
							order_id: record.order.id.clone(),
							from: current,
							to: request.target,
							role: request.role,
							actor_id: request.actor_id.clone(),
							changed_at: entry_time,
						})
						.ok();
					return Ok(record.order);
				},
				Err(OrderStoreError::Conflict(_)) => {
					let actual = self
						.with_retry("reload", || self.orders.get_order(&request.order_id))
						.await?
						.status;
					if actual != current {
						tracing::info!(expected = %current, actual = %actual, "Lost transition race");
						return Err(TransitionError::StaleState {
							order_id: request.order_id.clone(),
							expected: current,
							actual,
						});
					}
					tracing::debug!(attempt, "Order details changed during commit, re-validating");
				},
				Err(e) => return Err(e.into()),
			}
		}

		tracing::warn!(attempts = self.commit_attempts, "Giving up after repeated detail edits");
		Err(TransitionError::ContentionExhausted {
			order_id: request.order_id,
			attempts: self.commit_attempts,
		})
	}

	async fn commit(
		&self,
		snapshot: &Snapshot<OrderRecord>,
		record: &OrderRecord,
	) -> Result<(), OrderStoreError> {
		self.with_retry("commit", || self.orders.commit(snapshot, record))
			.await
	}

	/// Runs `operation`, repeating it once after the configured delay when it
	/// fails with a transient storage error.
	async fn with_retry<T, F, Fut>(&self, name: &str, mut operation: F) -> Result<T, OrderStoreError>
	where
		F: FnMut() -> Fut,
		Fut: Future<Output = Result<T, OrderStoreError>>,
	{
		match operation().await {
			Err(e) if e.is_transient() => {
				tracing::warn!(operation = name, error = %e, "Storage operation failed, retrying once");
				tokio::time::sleep(self.retry_delay).await;
				operation().await
			},
			other => other,
		}
	}
}

/// Keeps the warnings the request acknowledged. Warnings raised only now, for
/// example from context that changed since the caller's preview, were never
/// accepted and are not recorded as such.
fn acknowledged_warnings(request: &TransitionRequest, warnings: Vec<String>) -> Vec<String> {
	let (accepted, unseen): (Vec<String>, Vec<String>) = warnings
		.into_iter()
		.partition(|warning| request.acknowledged_warnings.contains(warning));
	if !unseen.is_empty() {
		tracing::warn!(warnings = ?unseen, "Committing with warnings the actor did not acknowledge");
	}
	accepted
}

/// Builds the record to commit: the order in its new status plus the entry
/// that records the move.
fn build_record(
	current: &OrderRecord,
	request: &TransitionRequest,
	transition: &StateTransition,
	acknowledged_warnings: Vec<String>,
	now: DateTime<Utc>,
) -> Result<OrderRecord, HistoryError> {
	let mut record = current.clone();

	// Entries never predate the previous one, even if the clock stepped back.
	let mut changed_at = now.max(record.order.updated_at);
	if let Some(last) = record.history.last() {
		changed_at = changed_at.max(last.changed_at);
	}

	let entry = StatusHistoryEntry {
		id: uuid::Uuid::new_v4().to_string(),
		order_id: record.order.id.clone(),
		from_status: record.order.status,
		to_status: request.target,
		changed_by: request.actor_id.clone(),
		changed_at,
		notes: request.notes.clone(),
		metadata: Some(HistoryMetadata {
			role: request.role,
			estimated_minutes: transition.estimated_minutes,
			acknowledged_warnings,
		}),
	};

	HistoryStore::append(&mut record, entry)?;
	record.order.status = request.target;
	record.order.updated_at = changed_at;
	Ok(record)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::engine::context::NoopContextProvider;
	use async_trait::async_trait;
	use chrono::Duration as ChronoDuration;
	use orderflow_storage::{
		implementations::memory::MemoryStorage, StorageError, StorageInterface, StorageService,
	};
	use crate::validation::{ScheduleConflict, StockShortage};
	use orderflow_types::{ConfigSchema, NewOrder, OrderDetails, Schema};
	use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

	/// Memory backend whose compare-and-swap fails a set number of times.
	struct FlakyStorage {
		inner: MemoryStorage,
		cas_failures: AtomicU32,
	}

	impl FlakyStorage {
		fn new(cas_failures: u32) -> Self {
			Self {
				inner: MemoryStorage::new(),
				cas_failures: AtomicU32::new(cas_failures),
			}
		}
	}

	struct NoSettings;

	impl ConfigSchema for NoSettings {
		fn validate(&self, config: &toml::Value) -> Result<(), orderflow_types::ValidationError> {
			Schema::new(vec![], vec![]).validate(config)
		}
	}

	#[async_trait]
	impl StorageInterface for FlakyStorage {
		async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError> {
			self.inner.get_bytes(key).await
		}

		async fn set_bytes(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
			self.inner.set_bytes(key, value).await
		}

		async fn delete(&self, key: &str) -> Result<(), StorageError> {
			self.inner.delete(key).await
		}

		async fn exists(&self, key: &str) -> Result<bool, StorageError> {
			self.inner.exists(key).await
		}

		async fn compare_and_swap(
			&self,
			key: &str,
			expected: Option<&[u8]>,
			value: Vec<u8>,
		) -> Result<(), StorageError> {
			// Creation goes through untouched so tests can set up orders.
			if expected.is_some()
				&& self
					.cas_failures
					.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
					.is_ok()
			{
				return Err(StorageError::Backend("disk unavailable".into()));
			}
			self.inner.compare_and_swap(key, expected, value).await
		}

		async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
			self.inner.keys_with_prefix(prefix).await
		}

		fn config_schema(&self) -> Box<dyn ConfigSchema> {
			Box::new(NoSettings)
		}
	}

	fn setup(backend: Box<dyn StorageInterface>) -> (Arc<OrderStore>, TransitionExecutor) {
		let orders = Arc::new(OrderStore::new(Arc::new(StorageService::new(backend)), 3));
		let executor = TransitionExecutor::new(
			orders.clone(),
			Arc::new(NoopContextProvider),
			EventBus::new(16),
			Duration::from_millis(1),
			3,
		);
		(orders, executor)
	}

	async fn create(orders: &OrderStore, details: OrderDetails) -> Order {
		orders
			.create(
				NewOrder {
					id: Some("ord-1".into()),
					details,
				},
				"u-1",
				Utc::now(),
			)
			.await
			.unwrap()
	}

	fn submit() -> TransitionRequest {
		TransitionRequest::new(
			"ord-1",
			OrderStatus::PendingApproval,
			UserRole::CommercialManager,
			"u-1",
		)
	}

	#[tokio::test]
	async fn test_commit_writes_status_and_entry_together() {
		let (orders, executor) = setup(Box::new(MemoryStorage::new()));
		create(&orders, OrderDetails::default()).await;

		let order = executor
			.execute(
				submit()
					.with_notes("first submission")
					.acknowledging(["No equipment lines have been added yet"]),
			)
			.await
			.unwrap();
		assert_eq!(order.status, OrderStatus::PendingApproval);

		let record = orders.load("ord-1").await.unwrap().into_value();
		assert_eq!(record.order, order);
		assert_eq!(record.history.len(), 1);
		let entry = &record.history[0];
		assert_eq!(entry.from_status, OrderStatus::Created);
		assert_eq!(entry.to_status, OrderStatus::PendingApproval);
		assert_eq!(entry.notes.as_deref(), Some("first submission"));
		let metadata = entry.metadata.as_ref().unwrap();
		assert_eq!(metadata.role, UserRole::CommercialManager);
		assert_eq!(metadata.estimated_minutes, Some(10));
		assert_eq!(
			metadata.acknowledged_warnings,
			vec!["No equipment lines have been added yet".to_string()]
		);
		assert_eq!(order.updated_at, entry.changed_at);
	}

	#[tokio::test]
	async fn test_unknown_order() {
		let (_, executor) = setup(Box::new(MemoryStorage::new()));
		let result = executor.execute(submit()).await;
		assert!(matches!(result, Err(TransitionError::OrderNotFound(_))));
	}

	#[tokio::test]
	async fn test_not_allowed_leaves_order_untouched() {
		let (orders, executor) = setup(Box::new(MemoryStorage::new()));
		let created = create(&orders, OrderDetails::default()).await;

		let request = TransitionRequest::new("ord-1", OrderStatus::Billed, UserRole::Technician, "t-1");
		let result = executor.execute(request).await;
		assert!(matches!(result, Err(TransitionError::NotAllowed { .. })));
		assert!(!result.unwrap_err().is_retryable());

		let record = orders.load("ord-1").await.unwrap().into_value();
		assert_eq!(record.order, created);
		assert!(record.history.is_empty());
	}

	#[tokio::test]
	async fn test_expected_status_mismatch_is_stale() {
		let (orders, executor) = setup(Box::new(MemoryStorage::new()));
		create(&orders, OrderDetails::default()).await;
		executor.execute(submit()).await.unwrap();

		let result = executor
			.execute(submit().expecting(OrderStatus::Created))
			.await;
		match result {
			Err(e @ TransitionError::StaleState { .. }) => {
				assert!(e.is_retryable());
				if let TransitionError::StaleState { expected, actual, .. } = e {
					assert_eq!(expected, OrderStatus::Created);
					assert_eq!(actual, OrderStatus::PendingApproval);
				}
			},
			other => panic!("expected stale state, got {:?}", other),
		}
		assert_eq!(orders.load("ord-1").await.unwrap().value.history.len(), 1);
	}

	#[tokio::test]
	async fn test_validation_failure_carries_verdict() {
		let (orders, executor) = setup(Box::new(MemoryStorage::new()));
		create(&orders, OrderDetails::default()).await;

		for (target, role) in [
			(OrderStatus::PendingApproval, UserRole::CommercialManager),
			(OrderStatus::Approved, UserRole::OperationsManager),
		] {
			executor
				.execute(TransitionRequest::new("ord-1", target, role, "u-1"))
				.await
				.unwrap();
		}

		let request = TransitionRequest::new(
			"ord-1",
			OrderStatus::DoctorConfirmation,
			UserRole::CommercialManager,
			"u-1",
		);
		match executor.execute(request).await {
			Err(TransitionError::ValidationFailed { to, validation }) => {
				assert_eq!(to, OrderStatus::DoctorConfirmation);
				assert!(!validation.is_valid);
				assert_eq!(validation.errors.len(), 2);
			},
			other => panic!("expected validation failure, got {:?}", other),
		}
		assert_eq!(
			orders.get_order("ord-1").await.unwrap().status,
			OrderStatus::Approved
		);
	}

	#[tokio::test]
	async fn test_concurrent_executes_single_winner() {
		let (orders, executor) = setup(Box::new(MemoryStorage::new()));
		create(&orders, OrderDetails::default()).await;
		let executor = Arc::new(executor);

		let mut handles = Vec::new();
		for (target, role) in [
			(OrderStatus::PendingApproval, UserRole::CommercialManager),
			(OrderStatus::Cancelled, UserRole::GeneralAdmin),
			(OrderStatus::PendingApproval, UserRole::GeneralAdmin),
			(OrderStatus::Cancelled, UserRole::CommercialManager),
		] {
			let executor = executor.clone();
			handles.push(tokio::spawn(async move {
				executor
					.execute(
						TransitionRequest::new("ord-1", target, role, "u-1")
							.expecting(OrderStatus::Created),
					)
					.await
			}));
		}

		let mut committed = 0;
		for handle in handles {
			match handle.await.unwrap() {
				Ok(_) => committed += 1,
				Err(TransitionError::StaleState { .. }) | Err(TransitionError::NotAllowed { .. }) => {},
				Err(other) => panic!("unexpected error {:?}", other),
			}
		}
		assert_eq!(committed, 1);
		let record = orders.load("ord-1").await.unwrap().into_value();
		assert_eq!(record.history.len(), 1);
		assert_eq!(record.history[0].to_status, record.order.status);
	}

	#[tokio::test]
	async fn test_transient_commit_failure_retried_once() {
		let (orders, executor) = setup(Box::new(FlakyStorage::new(1)));
		create(&orders, OrderDetails::default()).await;

		let order = executor.execute(submit()).await.unwrap();
		assert_eq!(order.status, OrderStatus::PendingApproval);
	}

	#[tokio::test]
	async fn test_persistent_commit_failure_surfaces() {
		let (orders, executor) = setup(Box::new(FlakyStorage::new(2)));
		let created = create(&orders, OrderDetails::default()).await;

		let result = executor.execute(submit()).await;
		assert!(matches!(result, Err(TransitionError::Persistence(_))));

		let record = orders.load("ord-1").await.unwrap().into_value();
		assert_eq!(record.order, created);
		assert!(record.history.is_empty());
	}

	#[tokio::test]
	async fn test_unacknowledged_warning_not_recorded() {
		let (orders, executor) = setup(Box::new(MemoryStorage::new()));
		create(&orders, OrderDetails::default()).await;

		executor.execute(submit()).await.unwrap();

		let record = orders.load("ord-1").await.unwrap().into_value();
		let metadata = record.history[0].metadata.as_ref().unwrap();
		assert!(metadata.acknowledged_warnings.is_empty());
	}

	/// Provider that edits the order's details while the executor is between
	/// its read and its commit, as many times as `edits_left` allows.
	struct EditingProvider {
		orders: Arc<OrderStore>,
		edits_left: AtomicU32,
	}

	impl EditingProvider {
		fn new(orders: Arc<OrderStore>, edits: u32) -> Self {
			Self {
				orders,
				edits_left: AtomicU32::new(edits),
			}
		}
	}

	#[async_trait]
	impl OrderContextProvider for EditingProvider {
		async fn schedule_conflicts(
			&self,
			_order: &Order,
		) -> Result<Vec<ScheduleConflict>, ContextError> {
			let edit = self
				.edits_left
				.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
			if let Ok(left) = edit {
				self.orders
					.update_details("ord-1", |d| d.hospital = Some(format!("North-{}", left)))
					.await
					.map_err(|e| ContextError(e.to_string()))?;
			}
			Ok(Vec::new())
		}

		async fn stock_shortages(&self, _order: &Order) -> Result<Vec<StockShortage>, ContextError> {
			Ok(Vec::new())
		}
	}

	#[tokio::test]
	async fn test_detail_edit_race_is_not_stale() {
		let (orders, _) = setup(Box::new(MemoryStorage::new()));
		create(&orders, OrderDetails::default()).await;
		let executor = TransitionExecutor::new(
			orders.clone(),
			Arc::new(EditingProvider::new(orders.clone(), 1)),
			EventBus::new(16),
			Duration::from_millis(1),
			3,
		);

		let order = executor.execute(submit()).await.unwrap();
		assert_eq!(order.status, OrderStatus::PendingApproval);
		assert_eq!(order.details.hospital.as_deref(), Some("North-1"));
		assert_eq!(orders.load("ord-1").await.unwrap().value.history.len(), 1);
	}

	#[tokio::test]
	async fn test_endless_detail_edits_exhaust_attempts() {
		let (orders, _) = setup(Box::new(MemoryStorage::new()));
		let created = create(&orders, OrderDetails::default()).await;
		let executor = TransitionExecutor::new(
			orders.clone(),
			Arc::new(EditingProvider::new(orders.clone(), 100)),
			EventBus::new(16),
			Duration::from_millis(1),
			3,
		);

		match executor.execute(submit()).await {
			Err(e @ TransitionError::ContentionExhausted { .. }) => {
				assert!(e.is_retryable());
				assert_eq!(e.to_string(), "Order ord-1 kept changing after 3 commit attempts");
			},
			other => panic!("expected exhausted attempts, got {:?}", other),
		}

		let record = orders.load("ord-1").await.unwrap().into_value();
		assert_eq!(record.order.status, created.status);
		assert!(record.history.is_empty());
	}

	/// Provider that commits a competing transition through a second executor
	/// the first time it is asked, so the order's status moves before the
	/// caller's commit.
	struct RivalProvider {
		rival: TransitionExecutor,
		fired: AtomicBool,
	}

	#[async_trait]
	impl OrderContextProvider for RivalProvider {
		async fn schedule_conflicts(
			&self,
			_order: &Order,
		) -> Result<Vec<ScheduleConflict>, ContextError> {
			if !self.fired.swap(true, Ordering::SeqCst) {
				let cancel = TransitionRequest::new(
					"ord-1",
					OrderStatus::Cancelled,
					UserRole::CommercialManager,
					"u-2",
				);
				self.rival
					.execute(cancel)
					.await
					.map_err(|e| ContextError(e.to_string()))?;
			}
			Ok(Vec::new())
		}

		async fn stock_shortages(&self, _order: &Order) -> Result<Vec<StockShortage>, ContextError> {
			Ok(Vec::new())
		}
	}

	#[tokio::test]
	async fn test_transition_committed_mid_flight_is_stale() {
		let (orders, rival) = setup(Box::new(MemoryStorage::new()));
		create(&orders, OrderDetails::default()).await;
		let executor = TransitionExecutor::new(
			orders.clone(),
			Arc::new(RivalProvider {
				rival,
				fired: AtomicBool::new(false),
			}),
			EventBus::new(16),
			Duration::from_millis(1),
			3,
		);

		match executor.execute(submit()).await {
			Err(TransitionError::StaleState {
				expected, actual, ..
			}) => {
				assert_eq!(expected, OrderStatus::Created);
				assert_eq!(actual, OrderStatus::Cancelled);
			},
			other => panic!("expected stale state, got {:?}", other),
		}

		let record = orders.load("ord-1").await.unwrap().into_value();
		assert_eq!(record.order.status, OrderStatus::Cancelled);
		let moves: Vec<_> = record
			.history
			.iter()
			.map(|entry| (entry.from_status, entry.to_status))
			.collect();
		assert_eq!(moves, vec![(OrderStatus::Created, OrderStatus::Cancelled)]);
	}

	#[tokio::test]
	async fn test_entry_time_never_precedes_previous() {
		let (orders, executor) = setup(Box::new(MemoryStorage::new()));
		create(&orders, OrderDetails::default()).await;
		executor.execute(submit()).await.unwrap();

		// Push the last entry into the future, as if written by a fast clock.
		let snapshot = orders.load("ord-1").await.unwrap();
		let mut record = snapshot.value.clone();
		let future = Utc::now() + ChronoDuration::hours(1);
		record.history[0].changed_at = future;
		record.order.updated_at = future;
		orders.commit(&snapshot, &record).await.unwrap();

		let request = TransitionRequest::new(
			"ord-1",
			OrderStatus::Approved,
			UserRole::OperationsManager,
			"u-2",
		);
		let order = executor.execute(request).await.unwrap();
		let history = orders.load("ord-1").await.unwrap().into_value().history;
		assert!(history[1].changed_at >= history[0].changed_at);
		assert_eq!(order.updated_at, history[1].changed_at);
	}
}
