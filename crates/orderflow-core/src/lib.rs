//! Core workflow engine for hospital equipment orders.
//!
//! This crate defines the order lifecycle: the static table of legal status
//! changes and the roles allowed to make them, the business rules that gate
//! each change, the executor that commits a change together with its audit
//! entry, and the engine facade tying these to a storage backend.

pub mod builder;
pub mod catalog;
pub mod engine;
pub mod executor;
pub mod history;
pub mod recovery;
pub mod state;
pub mod validation;

pub use builder::{BuilderError, WorkflowBuilder, WorkflowFactories};
pub use catalog::{StatusCatalog, StatusCategory, StatusMetadata};
pub use engine::context::{ContextError, NoopContextProvider, OrderContextProvider};
pub use engine::event_bus::EventBus;
pub use engine::{EngineError, WorkflowEngine};
pub use executor::{TransitionError, TransitionExecutor};
pub use history::{HistoryError, HistoryStore};
pub use recovery::{LedgerIssue, LedgerReport};
pub use state::{OrderStore, OrderStoreError, TableIntegrityError, TransitionTable};
pub use validation::{OrderContext, ScheduleConflict, StockShortage, TransitionValidator};
