//! Storage namespaces used by the workflow engine.

/// Namespace prefix of stored records. Keys are `{namespace}:{id}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageKey {
	/// Order records: the order snapshot plus its status history.
	Orders,
}

impl StorageKey {
	pub fn as_str(&self) -> &'static str {
		match self {
			StorageKey::Orders => "orders",
		}
	}
}
