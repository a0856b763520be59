//! File-based storage backend.
//!
//! Each key is stored in its own file under a base directory. Writes go to a
//! temporary file that is renamed over the target, so readers always see either
//! the previous or the new value and never a partial write. Conditional writes
//! hold an advisory lock on a shared lock file, which also serializes writers in
//! other processes pointed at the same directory.

use crate::{StorageError, StorageFactory, StorageInterface, StorageRegistry};
use async_trait::async_trait;
use fs2::FileExt;
use orderflow_types::{ConfigSchema, Field, FieldType, ImplementationRegistry, Schema, ValidationError};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const RECORD_EXTENSION: &str = "rec";
const LOCK_FILE_NAME: &str = ".orderflow.lock";

fn backend_err(e: impl std::fmt::Display) -> StorageError {
	StorageError::Backend(e.to_string())
}

/// Encodes a key into a filesystem-safe file stem.
///
/// ASCII alphanumerics, `-` and `_` are kept; every other byte becomes `%XX`.
/// The encoding is reversible so keys can be listed back from the directory.
fn encode_key(key: &str) -> String {
	let mut out = String::with_capacity(key.len());
	for byte in key.bytes() {
		if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
			out.push(byte as char);
		} else {
			out.push_str(&format!("%{:02X}", byte));
		}
	}
	out
}

/// Reverses [`encode_key`]. Returns `None` for stems this backend did not write.
fn decode_key(stem: &str) -> Option<String> {
	let bytes = stem.as_bytes();
	let mut out = Vec::with_capacity(bytes.len());
	let mut i = 0;
	while i < bytes.len() {
		if bytes[i] == b'%' {
			let hex = stem.get(i + 1..i + 3)?;
			out.push(u8::from_str_radix(hex, 16).ok()?);
			i += 3;
		} else {
			out.push(bytes[i]);
			i += 1;
		}
	}
	String::from_utf8(out).ok()
}

/// Shared state moved into blocking tasks.
struct FileStore {
	base_path: PathBuf,
	sync_writes: bool,
}

impl FileStore {
	fn file_path(&self, key: &str) -> PathBuf {
		self.base_path
			.join(format!("{}.{}", encode_key(key), RECORD_EXTENSION))
	}

	/// Runs `op` while holding the directory's exclusive lock.
	fn with_lock<R>(
		&self,
		op: impl FnOnce() -> Result<R, StorageError>,
	) -> Result<R, StorageError> {
		fs::create_dir_all(&self.base_path).map_err(backend_err)?;
		let lock_file = OpenOptions::new()
			.create(true)
			.truncate(false)
			.read(true)
			.write(true)
			.open(self.base_path.join(LOCK_FILE_NAME))
			.map_err(backend_err)?;
		lock_file.lock_exclusive().map_err(backend_err)?;
		let result = op();
		if let Err(e) = FileExt::unlock(&lock_file) {
			tracing::warn!(error = %e, "Failed to release storage lock");
		}
		result
	}

	fn read(&self, path: &Path) -> Result<Option<Vec<u8>>, StorageError> {
		match fs::read(path) {
			Ok(data) => Ok(Some(data)),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
			Err(e) => Err(backend_err(e)),
		}
	}

	/// Writes to a temp file and renames it over `path`.
	fn write_atomically(&self, path: &Path, value: &[u8]) -> Result<(), StorageError> {
		let temp_path = path.with_extension("tmp");
		{
			let mut file = File::create(&temp_path).map_err(backend_err)?;
			file.write_all(value).map_err(backend_err)?;
			if self.sync_writes {
				file.sync_all().map_err(backend_err)?;
			}
		}
		fs::rename(&temp_path, path).map_err(backend_err)
	}

	fn set(&self, key: &str, value: &[u8]) -> Result<(), StorageError> {
		let path = self.file_path(key);
		self.with_lock(|| self.write_atomically(&path, value))
	}

	fn compare_and_swap(
		&self,
		key: &str,
		expected: Option<&[u8]>,
		value: &[u8],
	) -> Result<(), StorageError> {
		let path = self.file_path(key);
		self.with_lock(|| {
			let current = self.read(&path)?;
			if current.as_deref() != expected {
				return Err(StorageError::PreconditionFailed(key.to_string()));
			}
			self.write_atomically(&path, value)
		})
	}

	fn delete(&self, key: &str) -> Result<(), StorageError> {
		let path = self.file_path(key);
		self.with_lock(|| match fs::remove_file(&path) {
			Ok(()) => Ok(()),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
			Err(e) => Err(backend_err(e)),
		})
	}

	fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
		let entries = match fs::read_dir(&self.base_path) {
			Ok(entries) => entries,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
			Err(e) => return Err(backend_err(e)),
		};

		let mut keys = Vec::new();
		for entry in entries {
			let path = entry.map_err(backend_err)?.path();
			if path.extension() != Some(std::ffi::OsStr::new(RECORD_EXTENSION)) {
				continue;
			}
			let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
				continue;
			};
			match decode_key(stem) {
				Some(key) if key.starts_with(prefix) => keys.push(key),
				Some(_) => {},
				None => tracing::debug!("Skipping unrecognised file {:?}", path),
			}
		}
		keys.sort();
		Ok(keys)
	}
}

/// File-based storage implementation.
///
/// Blocking filesystem work runs on tokio's blocking pool. A dropped caller
/// cannot interrupt a write halfway: the blocking task runs to completion and
/// the rename makes the new value visible in one step.
pub struct FileStorage {
	inner: Arc<FileStore>,
}

impl FileStorage {
	/// Creates a new FileStorage rooted at `base_path`.
	pub fn new(base_path: PathBuf, sync_writes: bool) -> Self {
		Self {
			inner: Arc::new(FileStore {
				base_path,
				sync_writes,
			}),
		}
	}

	async fn blocking<R, F>(&self, op: F) -> Result<R, StorageError>
	where
		R: Send + 'static,
		F: FnOnce(&FileStore) -> Result<R, StorageError> + Send + 'static,
	{
		let inner = Arc::clone(&self.inner);
		tokio::task::spawn_blocking(move || op(&inner))
			.await
			.map_err(|e| StorageError::Backend(format!("Storage task failed: {}", e)))?
	}
}

#[async_trait]
impl StorageInterface for FileStorage {
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError> {
		let path = self.inner.file_path(key);
		match tokio::fs::read(&path).await {
			Ok(data) => Ok(data),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StorageError::NotFound),
			Err(e) => Err(backend_err(e)),
		}
	}

	async fn set_bytes(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
		let key = key.to_string();
		self.blocking(move |store| store.set(&key, &value)).await
	}

	async fn delete(&self, key: &str) -> Result<(), StorageError> {
		let key = key.to_string();
		self.blocking(move |store| store.delete(&key)).await
	}

	async fn exists(&self, key: &str) -> Result<bool, StorageError> {
		tokio::fs::try_exists(self.inner.file_path(key))
			.await
			.map_err(backend_err)
	}

	async fn compare_and_swap(
		&self,
		key: &str,
		expected: Option<&[u8]>,
		value: Vec<u8>,
	) -> Result<(), StorageError> {
		let key = key.to_string();
		let expected = expected.map(<[u8]>::to_vec);
		self.blocking(move |store| store.compare_and_swap(&key, expected.as_deref(), &value))
			.await
	}

	async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
		let prefix = prefix.to_string();
		self.blocking(move |store| store.keys_with_prefix(&prefix))
			.await
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(FileStorageSchema)
	}
}

/// Configuration schema for FileStorage.
pub struct FileStorageSchema;

impl ConfigSchema for FileStorageSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![],
			vec![
				Field::new("storage_path", FieldType::String).with_validator(|value| {
					match value.as_str() {
						Some(path) if path.trim().is_empty() => {
							Err("storage_path cannot be empty".into())
						},
						_ => Ok(()),
					}
				}),
				Field::new("sync_writes", FieldType::Boolean),
			],
		);
		schema.validate(config)
	}
}

/// Factory function to create a file storage backend from configuration.
///
/// Configuration parameters:
/// - `storage_path`: base directory for record files (default: "./data/orders")
/// - `sync_writes`: fsync each record before it becomes visible (default: true)
pub fn create_storage(config: &toml::Value) -> Result<Box<dyn StorageInterface>, StorageError> {
	FileStorageSchema
		.validate(config)
		.map_err(|e| StorageError::Configuration(e.to_string()))?;

	let storage_path = config
		.get("storage_path")
		.and_then(|v| v.as_str())
		.unwrap_or("./data/orders");
	let sync_writes = config
		.get("sync_writes")
		.and_then(|v| v.as_bool())
		.unwrap_or(true);

	Ok(Box::new(FileStorage::new(
		PathBuf::from(storage_path),
		sync_writes,
	)))
}

/// Registry for the file storage implementation.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "file";
	type Factory = StorageFactory;

	fn factory() -> Self::Factory {
		create_storage
	}
}

impl StorageRegistry for Registry {}
