//! Storage module for the orderflow workflow engine.
//!
//! This module provides abstractions for persistent storage of order records,
//! supporting different backend implementations such as in-memory or file-based
//! storage. Every backend offers an atomic compare-and-swap, which the engine
//! uses as its optimistic concurrency guard.

use async_trait::async_trait;
use orderflow_types::{ConfigSchema, ImplementationRegistry};
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

/// Re-export implementations
pub mod implementations {
	pub mod file;
	pub mod memory;
}

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
	/// Error that occurs when a requested item is not found.
	#[error("Not found")]
	NotFound,
	/// The stored value no longer matches what the caller expected.
	#[error("Precondition failed for key {0}")]
	PreconditionFailed(String),
	/// Error that occurs during serialization/deserialization.
	#[error("Serialization error: {0}")]
	Serialization(String),
	/// Error that occurs in the storage backend.
	#[error("Backend error: {0}")]
	Backend(String),
	/// Error that occurs during configuration validation.
	#[error("Configuration error: {0}")]
	Configuration(String),
}

impl StorageError {
	/// Returns true for infrastructure failures that may succeed on retry.
	pub fn is_transient(&self) -> bool {
		matches!(self, StorageError::Backend(_))
	}
}

/// Trait defining the low-level interface for storage backends.
///
/// Backends store opaque bytes under string keys. `compare_and_swap` must be
/// atomic with respect to every other write on the same key.
#[async_trait]
pub trait StorageInterface: Send + Sync {
	/// Retrieves raw bytes for the given key.
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError>;

	/// Stores raw bytes, overwriting any previous value.
	async fn set_bytes(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError>;

	/// Deletes the value associated with the given key.
	async fn delete(&self, key: &str) -> Result<(), StorageError>;

	/// Checks if a key exists in storage.
	async fn exists(&self, key: &str) -> Result<bool, StorageError>;

	/// Writes `value` only if the current bytes equal `expected`.
	///
	/// `expected = None` means the key must not exist yet. On mismatch the
	/// backend returns `StorageError::PreconditionFailed` and writes nothing.
	async fn compare_and_swap(
		&self,
		key: &str,
		expected: Option<&[u8]>,
		value: Vec<u8>,
	) -> Result<(), StorageError>;

	/// Lists keys starting with `prefix`, sorted.
	async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StorageError>;

	/// Returns the configuration schema for validation.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;
}

/// Type alias for storage factory functions.
pub type StorageFactory = fn(&toml::Value) -> Result<Box<dyn StorageInterface>, StorageError>;

/// Registry trait for storage implementations.
pub trait StorageRegistry: ImplementationRegistry<Factory = StorageFactory> {}

/// Get all registered storage implementations as (name, factory) pairs.
pub fn get_all_implementations() -> Vec<(&'static str, StorageFactory)> {
	use implementations::{file, memory};

	vec![
		(file::Registry::NAME, file::Registry::factory()),
		(memory::Registry::NAME, memory::Registry::factory()),
	]
}

/// A value read from storage together with the exact bytes it was decoded from.
///
/// Passing a snapshot back to [`StorageService::replace`] makes the write
/// conditional on nobody having changed the value in between.
#[derive(Debug, Clone)]
pub struct Snapshot<T> {
	pub value: T,
	raw: Vec<u8>,
}

impl<T> Snapshot<T> {
	pub fn into_value(self) -> T {
		self.value
	}
}

/// High-level storage service that provides typed operations.
///
/// The StorageService wraps a low-level storage backend and provides
/// convenient methods for storing and retrieving typed data with
/// automatic serialization/deserialization.
pub struct StorageService {
	/// The underlying storage backend implementation.
	backend: Box<dyn StorageInterface>,
}

fn make_key(namespace: &str, id: &str) -> String {
	format!("{}:{}", namespace, id)
}

fn encode<T: Serialize>(data: &T) -> Result<Vec<u8>, StorageError> {
	serde_json::to_vec(data).map_err(|e| StorageError::Serialization(e.to_string()))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StorageError> {
	serde_json::from_slice(bytes).map_err(|e| StorageError::Serialization(e.to_string()))
}

impl StorageService {
	/// Creates a new StorageService with the specified backend.
	pub fn new(backend: Box<dyn StorageInterface>) -> Self {
		Self { backend }
	}

	/// Stores a value only if nothing exists under the key yet.
	pub async fn insert_new<T: Serialize>(
		&self,
		namespace: &str,
		id: &str,
		data: &T,
	) -> Result<(), StorageError> {
		self.backend
			.compare_and_swap(&make_key(namespace, id), None, encode(data)?)
			.await
	}

	/// Retrieves a value together with the bytes needed for a conditional write.
	pub async fn load<T: DeserializeOwned>(
		&self,
		namespace: &str,
		id: &str,
	) -> Result<Snapshot<T>, StorageError> {
		let raw = self.backend.get_bytes(&make_key(namespace, id)).await?;
		let value = decode(&raw)?;
		Ok(Snapshot { value, raw })
	}

	/// Replaces a value only if it still matches `previous`.
	///
	/// Returns `StorageError::PreconditionFailed` when another writer changed the
	/// value since `previous` was loaded.
	pub async fn replace<T: Serialize>(
		&self,
		namespace: &str,
		id: &str,
		previous: &Snapshot<T>,
		data: &T,
	) -> Result<(), StorageError> {
		self.backend
			.compare_and_swap(&make_key(namespace, id), Some(&previous.raw), encode(data)?)
			.await
	}

	/// Lists the ids stored under a namespace.
	pub async fn list_ids(&self, namespace: &str) -> Result<Vec<String>, StorageError> {
		let prefix = make_key(namespace, "");
		let keys = self.backend.keys_with_prefix(&prefix).await?;
		Ok(keys
			.into_iter()
			.filter_map(|key| key.strip_prefix(&prefix).map(str::to_string))
			.collect())
	}
}
