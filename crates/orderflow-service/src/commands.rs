//! Subcommands of the orderflow CLI.
//!
//! Every command runs against a built engine and produces a JSON value that
//! `main` prints.

use clap::Subcommand;
use orderflow_core::WorkflowEngine;
use orderflow_types::{
	format_duration_minutes, NewOrder, OrderDetails, OrderStatus, StateTransition,
	TransitionRequest, UserRole,
};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};

/// Operations exposed on the command line.
#[derive(Subcommand, Debug)]
pub enum Command {
	/// List every status with its display metadata
	Statuses,
	/// Show the moves a role may make from a status
	Transitions {
		#[arg(long)]
		status: OrderStatus,
		/// Role name; unknown names have no moves
		#[arg(long)]
		role: String,
	},
	/// Check the transition table for structural mistakes
	CheckTable,
	/// Register a new order in the initial status
	Create {
		/// JSON file with the order id and details
		#[arg(long)]
		file: Option<PathBuf>,
		#[arg(long)]
		actor: String,
	},
	/// Show an order
	Show {
		#[arg(long)]
		order: String,
	},
	/// Replace the details of an order from a JSON file
	UpdateDetails {
		#[arg(long)]
		order: String,
		#[arg(long)]
		file: PathBuf,
	},
	/// Validate a move without committing it
	Validate {
		#[arg(long)]
		order: String,
		#[arg(long)]
		to: OrderStatus,
		#[arg(long)]
		role: UserRole,
	},
	/// Commit a move and its audit entry
	Execute {
		#[arg(long)]
		order: String,
		#[arg(long)]
		to: OrderStatus,
		#[arg(long)]
		role: UserRole,
		#[arg(long)]
		actor: String,
		#[arg(long)]
		notes: Option<String>,
		/// Fail if the order is no longer in this status
		#[arg(long)]
		expect: Option<OrderStatus>,
		/// Warning shown by `validate` that the actor accepts; repeat for each
		#[arg(long = "acknowledge")]
		acknowledged: Vec<String>,
	},
	/// Show the audit history of an order
	History {
		#[arg(long)]
		order: String,
	},
	/// Check every stored ledger against its order's status
	VerifyLedgers,
}

/// Runs `command` against `engine`.
pub async fn run(
	engine: &WorkflowEngine,
	command: Command,
) -> Result<Value, Box<dyn std::error::Error>> {
	match command {
		Command::Statuses => Ok(serde_json::to_value(engine.status_catalog().all())?),
		Command::Transitions { status, role } => {
			let moves = engine.valid_transitions_for_role_name(status, &role);
			Ok(Value::Array(moves.iter().map(describe_transition).collect()))
		},
		Command::CheckTable => {
			engine.transition_table().check_integrity()?;
			Ok(json!({
				"consistent": true,
				"transitions": engine.transition_table().entries().len(),
			}))
		},
		Command::Create { file, actor } => {
			let new_order = match file {
				Some(path) => read_json::<NewOrder>(&path).await?,
				None => NewOrder::default(),
			};
			let order = engine.create_order(new_order, &actor).await?;
			Ok(serde_json::to_value(order)?)
		},
		Command::Show { order } => Ok(serde_json::to_value(engine.get_order(&order).await?)?),
		Command::UpdateDetails { order, file } => {
			let details = read_json::<OrderDetails>(&file).await?;
			let updated = engine
				.update_order_details(&order, |current| *current = details.clone())
				.await?;
			Ok(serde_json::to_value(updated)?)
		},
		Command::Validate { order, to, role } => {
			let validation = engine.validate_transition_by_id(&order, to, role).await?;
			Ok(serde_json::to_value(validation)?)
		},
		Command::Execute {
			order,
			to,
			role,
			actor,
			notes,
			expect,
			acknowledged,
		} => {
			let mut request =
				TransitionRequest::new(order, to, role, actor).acknowledging(acknowledged);
			if let Some(notes) = notes {
				request = request.with_notes(notes);
			}
			if let Some(expected) = expect {
				request = request.expecting(expected);
			}
			let order = engine.execute_transition(request).await?;
			Ok(serde_json::to_value(order)?)
		},
		Command::History { order } => Ok(serde_json::to_value(engine.history(&order).await?)?),
		Command::VerifyLedgers => Ok(serde_json::to_value(engine.verify_ledgers().await?)?),
	}
}

fn describe_transition(transition: &StateTransition) -> Value {
	json!({
		"from": transition.from,
		"to": transition.to,
		"description": transition.description,
		"allowed_roles": transition.allowed_roles,
		"estimated": transition.estimated_minutes.map(format_duration_minutes),
	})
}

async fn read_json<T: serde::de::DeserializeOwned>(
	path: &Path,
) -> Result<T, Box<dyn std::error::Error>> {
	let content = tokio::fs::read_to_string(path).await?;
	Ok(serde_json::from_str(&content)?)
}
