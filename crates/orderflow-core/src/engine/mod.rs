//! Workflow engine facade.
//!
//! `WorkflowEngine` is the library entry point. It answers which moves a role
//! has, validates candidate moves, commits them through the executor and
//! exposes the audit history. Every call that acts on an order takes the
//! actor's role (and, for writes, the actor id) explicitly.

pub mod context;
pub mod event_bus;

use crate::catalog::StatusCatalog;
use crate::executor::{TransitionError, TransitionExecutor};
use crate::history::HistoryStore;
use crate::recovery::{LedgerAuditor, LedgerReport};
use crate::state::{OrderStore, OrderStoreError, TransitionTable};
use crate::validation::TransitionValidator;
use chrono::Utc;
use context::{ContextError, OrderContextProvider};
use event_bus::EventBus;
use orderflow_config::Config;
use orderflow_types::{
	truncate_id, NewOrder, Order, OrderDetails, OrderStatus, StateTransition,
	StatusHistoryEntry, TransitionRequest, TransitionValidation, UserRole, WorkflowEvent,
};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;

/// Errors returned by engine operations other than executing a transition.
#[derive(Debug, Error)]
pub enum EngineError {
	#[error("Order not found: {0}")]
	OrderNotFound(String),
	#[error("Order already exists: {0}")]
	AlreadyExists(String),
	#[error("Order {0} kept changing; giving up")]
	Conflict(String),
	#[error(transparent)]
	Context(#[from] ContextError),
	#[error("Storage error: {0}")]
	Storage(String),
}

impl From<OrderStoreError> for EngineError {
	fn from(err: OrderStoreError) -> Self {
		match err {
			OrderStoreError::NotFound(id) => EngineError::OrderNotFound(id),
			OrderStoreError::AlreadyExists(id) => EngineError::AlreadyExists(id),
			OrderStoreError::Conflict(id) => EngineError::Conflict(id),
			OrderStoreError::Storage(e) => EngineError::Storage(e.to_string()),
		}
	}
}

/// Order lifecycle workflow engine.
pub struct WorkflowEngine {
	pub(crate) config: Config,
	pub(crate) orders: Arc<OrderStore>,
	pub(crate) history: HistoryStore,
	pub(crate) executor: TransitionExecutor,
	pub(crate) validator: TransitionValidator,
	pub(crate) table: TransitionTable,
	pub(crate) catalog: StatusCatalog,
	pub(crate) context_provider: Arc<dyn OrderContextProvider>,
	pub(crate) event_bus: EventBus,
}

impl WorkflowEngine {
	/// Configuration the engine was built with.
	pub fn config(&self) -> &Config {
		&self.config
	}

	/// Human-facing labels for statuses and roles.
	pub fn status_catalog(&self) -> &StatusCatalog {
		&self.catalog
	}

	/// The static transition table.
	pub fn transition_table(&self) -> &TransitionTable {
		&self.table
	}

	/// Moves `role` may make from `status`, in declared order.
	pub fn valid_transitions(&self, status: OrderStatus, role: UserRole) -> Vec<StateTransition> {
		self.table.valid_transitions(status, role)
	}

	/// Like [`valid_transitions`](Self::valid_transitions) for a role name. An
	/// unknown name has no moves.
	pub fn valid_transitions_for_role_name(
		&self,
		status: OrderStatus,
		role: &str,
	) -> Vec<StateTransition> {
		self.table.valid_transitions_for_role_name(status, role)
	}

	/// Validates moving `order` to `target` as `role`.
	///
	/// Business rule failures are reported inside the verdict. Only failing to
	/// gather external facts is an error.
	pub async fn validate_transition(
		&self,
		order: &Order,
		target: OrderStatus,
		role: UserRole,
	) -> Result<TransitionValidation, EngineError> {
		let context = context::gather(self.context_provider.as_ref(), order, Utc::now()).await?;
		Ok(self.validator.validate(&context, target, role))
	}

	/// Validates a move for the stored order with id `order_id`.
	pub async fn validate_transition_by_id(
		&self,
		order_id: &str,
		target: OrderStatus,
		role: UserRole,
	) -> Result<TransitionValidation, EngineError> {
		let order = self.orders.get_order(order_id).await?;
		self.validate_transition(&order, target, role).await
	}

	/// Commits a transition and its audit entry.
	pub async fn execute_transition(
		&self,
		request: TransitionRequest,
	) -> Result<Order, TransitionError> {
		self.executor.execute(request).await
	}

	/// Audit entries of an order, oldest first.
	pub async fn history(&self, order_id: &str) -> Result<Vec<StatusHistoryEntry>, EngineError> {
		Ok(self.history.list_by_order(order_id).await?)
	}

	/// Registers a new order in the initial status. No history entry is written.
	pub async fn create_order(
		&self,
		new_order: NewOrder,
		actor_id: &str,
	) -> Result<Order, EngineError> {
		let order = self.orders.create(new_order, actor_id, Utc::now()).await?;
		tracing::info!(order_id = %truncate_id(&order.id), created_by = %actor_id, "Order created");
		self.event_bus
			.publish(WorkflowEvent::OrderCreated {
				order_id: order.id.clone(),
				created_by: actor_id.to_string(),
			})
			.ok();
		Ok(order)
	}

	/// Current snapshot of an order.
	pub async fn get_order(&self, order_id: &str) -> Result<Order, EngineError> {
		Ok(self.orders.get_order(order_id).await?)
	}

	/// Edits the facts of an order. The status cannot be changed this way.
	///
	/// `updater` may run more than once when another writer races the update.
	pub async fn update_order_details<F>(
		&self,
		order_id: &str,
		updater: F,
	) -> Result<Order, EngineError>
	where
		F: FnMut(&mut OrderDetails),
	{
		Ok(self.orders.update_details(order_id, updater).await?)
	}

	/// Ids of all stored orders.
	pub async fn list_order_ids(&self) -> Result<Vec<String>, EngineError> {
		Ok(self.orders.list_ids().await?)
	}

	/// Checks every stored ledger against its order's status.
	pub async fn verify_ledgers(&self) -> Result<LedgerReport, EngineError> {
		Ok(LedgerAuditor::new(self.orders.clone()).audit().await?)
	}

	/// Subscribes to events committed from now on.
	pub fn subscribe(&self) -> broadcast::Receiver<WorkflowEvent> {
		self.event_bus.subscribe()
	}
}
