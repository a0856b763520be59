//! Command-line entry point for the orderflow workflow engine.
//!
//! Loads configuration, builds the engine on the configured storage backend
//! and runs a single command against it. Results are printed as JSON on
//! stdout; logs go to stderr.

use clap::Parser;
use orderflow_config::Config;
use orderflow_core::{WorkflowBuilder, WorkflowEngine, WorkflowFactories};
use std::path::PathBuf;

mod commands;

use commands::Command;
use orderflow_storage::implementations::file::create_storage as create_file_storage;
use orderflow_storage::implementations::memory::create_storage as create_memory_storage;

/// Command-line arguments for the orderflow CLI.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
	/// Path to configuration file
	#[arg(short, long, default_value = "config.toml")]
	config: PathBuf,

	/// Log level (trace, debug, info, warn, error)
	#[arg(short, long, default_value = "info")]
	log_level: String,

	#[command(subcommand)]
	command: Command,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let args = Args::parse();

	use tracing_subscriber::{fmt, EnvFilter};

	let env_filter =
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

	fmt()
		.with_env_filter(env_filter)
		.with_writer(std::io::stderr)
		.with_target(true)
		.init();

	let config = Config::from_file(&args.config).await?;
	tracing::info!("Loaded configuration [{}]", config.engine.id);

	let engine = build_engine(config)?;

	let output = commands::run(&engine, args.command).await?;
	println!("{}", serde_json::to_string_pretty(&output)?);
	Ok(())
}

/// Macro to create a factory HashMap with the appropriate type aliases
macro_rules! create_factory_map {
    ($interface:path, $error:path, $( $name:literal => $factory:expr ),* $(,)?) => {{
        let mut factories = std::collections::HashMap::new();
        $(
            factories.insert(
                $name.to_string(),
                $factory as fn(&toml::Value) -> Result<Box<dyn $interface>, $error>
            );
        )*
        factories
    }};
}

/// Builds the workflow engine with the available storage backends.
fn build_engine(config: Config) -> Result<WorkflowEngine, Box<dyn std::error::Error>> {
	let storage_factories = create_factory_map!(
		orderflow_storage::StorageInterface,
		orderflow_storage::StorageError,
		"file" => create_file_storage,
		"memory" => create_memory_storage,
	);

	Ok(WorkflowBuilder::new(config).build(WorkflowFactories { storage_factories })?)
}
