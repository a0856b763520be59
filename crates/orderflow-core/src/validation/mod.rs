//! Transition validation.
//!
//! The validator is a pure function of an [`OrderContext`], a target status and
//! a role. It first checks legality against the transition table, then applies
//! the business rules of the target status. Facts that live outside the order
//! (schedule conflicts, stock shortages) and the evaluation instant are part of
//! the context, so the same inputs always produce the same verdict.

mod rules;

use crate::state::TransitionTable;
use chrono::{DateTime, Utc};
use orderflow_types::{Order, OrderStatus, TransitionValidation, UserRole};
use serde::{Deserialize, Serialize};

/// Another booking that overlaps with this order's surgery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleConflict {
	/// Order that holds the overlapping booking.
	pub conflicting_order_id: String,
	/// Technician booked twice, when the conflict is about a person.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub technician_id: Option<String>,
	pub description: String,
}

/// Equipment the stock oracle cannot fully supply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockShortage {
	pub equipment_id: String,
	pub name: String,
	pub requested: u32,
	pub available: u32,
}

/// Everything a validation run reads.
#[derive(Debug, Clone)]
pub struct OrderContext<'a> {
	pub order: &'a Order,
	pub schedule_conflicts: Vec<ScheduleConflict>,
	pub stock_shortages: Vec<StockShortage>,
	/// Instant date rules are evaluated against.
	pub now: DateTime<Utc>,
}

impl<'a> OrderContext<'a> {
	/// Context with no external facts.
	pub fn new(order: &'a Order, now: DateTime<Utc>) -> Self {
		Self {
			order,
			schedule_conflicts: Vec::new(),
			stock_shortages: Vec::new(),
			now,
		}
	}

	pub fn with_schedule_conflicts(mut self, conflicts: Vec<ScheduleConflict>) -> Self {
		self.schedule_conflicts = conflicts;
		self
	}

	pub fn with_stock_shortages(mut self, shortages: Vec<StockShortage>) -> Self {
		self.stock_shortages = shortages;
		self
	}
}

/// Validates candidate transitions against the table and the business rules.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransitionValidator {
	table: TransitionTable,
}

impl TransitionValidator {
	pub fn new() -> Self {
		Self::default()
	}

	/// Produces the verdict for moving `context.order` to `to` as `role`.
	///
	/// An illegal move yields a single error and no rule output.
	pub fn validate(
		&self,
		context: &OrderContext<'_>,
		to: OrderStatus,
		role: UserRole,
	) -> TransitionValidation {
		let from = context.order.status;
		if self.table.transition(from, to, role).is_none() {
			return TransitionValidation::rejected(format!(
				"Transition not permitted: {} -> {} for role {}",
				from, to, role
			));
		}

		let mut findings = rules::Findings::default();
		rules::apply(context, to, &mut findings);
		findings.into_validation()
	}
}
