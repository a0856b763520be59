//! Registry trait for pluggable implementations.

/// Declares the configuration name and factory of a pluggable implementation.
///
/// Storage backends provide a `Registry` struct implementing this trait so the
/// service can map `[storage.implementations.<name>]` sections to factories.
pub trait ImplementationRegistry {
	/// Name used in configuration files, e.g. `"memory"` for
	/// `storage.implementations.memory`.
	const NAME: &'static str;

	/// Factory function type this implementation provides.
	type Factory;

	/// Returns the factory that builds the implementation from its config section.
	fn factory() -> Self::Factory;
}
