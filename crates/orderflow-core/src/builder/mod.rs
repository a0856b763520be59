//! Builder pattern for constructing workflow engines.
//!
//! Storage backends are pluggable: the builder receives a map of factory
//! functions keyed by implementation name and instantiates the ones configured
//! under `[storage.implementations]`. The order context provider can be
//! replaced; by default no external facts are supplied.

use crate::catalog::StatusCatalog;
use crate::engine::context::{NoopContextProvider, OrderContextProvider};
use crate::engine::{event_bus::EventBus, WorkflowEngine};
use crate::executor::TransitionExecutor;
use crate::history::HistoryStore;
use crate::state::{OrderStore, TableIntegrityError, TransitionTable};
use crate::validation::TransitionValidator;
use orderflow_config::Config;
use orderflow_storage::{StorageError, StorageInterface, StorageService};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur during engine construction.
#[derive(Debug, Error)]
pub enum BuilderError {
	#[error("Configuration error: {0}")]
	Config(String),
	#[error("Transition table is inconsistent: {0}")]
	Table(#[from] TableIntegrityError),
}

/// Factory functions needed to build a WorkflowEngine.
pub struct WorkflowFactories<SF> {
	pub storage_factories: HashMap<String, SF>,
}

/// Builder for constructing a WorkflowEngine with pluggable implementations.
pub struct WorkflowBuilder {
	config: Config,
	context_provider: Arc<dyn OrderContextProvider>,
}

impl WorkflowBuilder {
	/// Creates a new WorkflowBuilder with the given configuration.
	pub fn new(config: Config) -> Self {
		Self {
			config,
			context_provider: Arc::new(NoopContextProvider),
		}
	}

	/// Sets the source of schedule conflicts and stock shortages.
	pub fn with_context_provider(mut self, provider: Arc<dyn OrderContextProvider>) -> Self {
		self.context_provider = provider;
		self
	}

	/// Builds the engine on the primary storage implementation.
	///
	/// Every configured implementation with a known factory is instantiated so
	/// configuration mistakes surface at startup, but only the primary one is
	/// used.
	pub fn build<SF>(self, factories: WorkflowFactories<SF>) -> Result<WorkflowEngine, BuilderError>
	where
		SF: Fn(&toml::Value) -> Result<Box<dyn StorageInterface>, StorageError>,
	{
		let mut storage_impls = HashMap::new();
		for (name, config) in &self.config.storage.implementations {
			if let Some(factory) = factories.storage_factories.get(name) {
				match factory(config) {
					Ok(implementation) => {
						storage_impls.insert(name.clone(), implementation);
						let is_primary = &self.config.storage.primary == name;
						tracing::info!(component = "storage", implementation = %name, enabled = %is_primary, "Loaded");
					},
					Err(e) => {
						tracing::error!(
							component = "storage",
							implementation = %name,
							error = %e,
							"Failed to create storage implementation"
						);
						return Err(BuilderError::Config(format!(
							"Failed to create storage implementation '{}': {}",
							name, e
						)));
					},
				}
			} else {
				tracing::warn!(component = "storage", implementation = %name, "Unknown implementation, skipping");
			}
		}

		let primary_storage = &self.config.storage.primary;
		let backend = storage_impls.remove(primary_storage).ok_or_else(|| {
			BuilderError::Config(format!(
				"Primary storage '{}' failed to load or has invalid configuration",
				primary_storage
			))
		})?;

		self.build_with_storage(backend)
	}

	/// Builds the engine on an already constructed storage backend.
	pub fn build_with_storage(
		self,
		backend: Box<dyn StorageInterface>,
	) -> Result<WorkflowEngine, BuilderError> {
		let table = TransitionTable;
		table.check_integrity()?;

		let engine_config = &self.config.engine;
		let storage = Arc::new(StorageService::new(backend));
		let orders = Arc::new(OrderStore::new(
			storage,
			engine_config.detail_update_attempts,
		));
		let event_bus = EventBus::new(engine_config.event_channel_capacity);

		let executor = TransitionExecutor::new(
			orders.clone(),
			self.context_provider.clone(),
			event_bus.clone(),
			engine_config.persistence_retry_delay(),
			engine_config.detail_update_attempts,
		);

		tracing::info!(
			engine_id = %engine_config.id,
			transitions = table.entries().len(),
			"Workflow engine ready"
		);

		Ok(WorkflowEngine {
			history: HistoryStore::new(orders.clone()),
			orders,
			executor,
			validator: TransitionValidator::new(),
			table,
			catalog: StatusCatalog,
			context_provider: self.context_provider,
			event_bus,
			config: self.config,
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use orderflow_storage::implementations::file;
	use orderflow_types::ImplementationRegistry;
	use tempfile::TempDir;

	fn config(primary: &str, extra: &str) -> Config {
		format!(
			r#"
[engine]
id = "builder-test"

[storage]
primary = "{}"
[storage.implementations.memory]
{}
"#,
			primary, extra
		)
		.parse()
		.unwrap()
	}

	fn factories() -> WorkflowFactories<orderflow_storage::StorageFactory> {
		let mut storage_factories = HashMap::new();
		for (name, factory) in orderflow_storage::get_all_implementations() {
			storage_factories.insert(name.to_string(), factory);
		}
		WorkflowFactories { storage_factories }
	}

	#[tokio::test]
	async fn test_build_with_memory_storage() {
		let engine = WorkflowBuilder::new(config("memory", ""))
			.build(factories())
			.unwrap();
		assert_eq!(engine.config().engine.id, "builder-test");
		assert!(engine.list_order_ids().await.unwrap().is_empty());
	}

	#[tokio::test]
	async fn test_build_with_file_storage() {
		let dir = TempDir::new().unwrap();
		let extra = format!(
			"[storage.implementations.file]\nstorage_path = \"{}\"\n",
			dir.path().display()
		);
		let engine = WorkflowBuilder::new(config("file", &extra))
			.build(factories())
			.unwrap();
		let order = engine
			.create_order(Default::default(), "u-1")
			.await
			.unwrap();
		assert_eq!(engine.get_order(&order.id).await.unwrap(), order);
	}

	#[test]
	fn test_invalid_backend_config_fails() {
		let extra = "[storage.implementations.file]\nstorage_path = \"\"\n";
		let result = WorkflowBuilder::new(config("memory", extra)).build(factories());
		assert!(matches!(result, Err(BuilderError::Config(_))));
	}

	#[test]
	fn test_primary_without_factory_fails() {
		let mut storage_factories = HashMap::new();
		storage_factories.insert(file::Registry::NAME.to_string(), file::Registry::factory());
		let result = WorkflowBuilder::new(config("memory", ""))
			.build(WorkflowFactories { storage_factories });
		assert!(matches!(result, Err(BuilderError::Config(_))));
	}
}
