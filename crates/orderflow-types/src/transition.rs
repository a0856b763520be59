//! Transition types: the static table entries, validation verdicts, and the
//! request the executor commits.

use serde::{Deserialize, Serialize};

use crate::{OrderStatus, UserRole};

/// A permitted move between two statuses, gated by role.
///
/// Entries are defined once in the static transition table and never mutated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StateTransition {
	pub from: OrderStatus,
	pub to: OrderStatus,
	pub allowed_roles: &'static [UserRole],
	pub description: &'static str,
	/// Typical time the step takes, in minutes.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub estimated_minutes: Option<u32>,
}

impl StateTransition {
	/// Returns true when `role` may perform this transition.
	pub fn allows(&self, role: UserRole) -> bool {
		self.allowed_roles.contains(&role)
	}
}

/// Verdict of validating a candidate transition against an order.
///
/// Errors block the transition. Warnings and required actions are advisory and
/// never affect `is_valid`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionValidation {
	pub is_valid: bool,
	#[serde(default)]
	pub errors: Vec<String>,
	#[serde(default)]
	pub warnings: Vec<String>,
	#[serde(default)]
	pub required_actions: Vec<String>,
}

impl TransitionValidation {
	/// Builds a verdict, deriving `is_valid` from the error list.
	pub fn new(errors: Vec<String>, warnings: Vec<String>, required_actions: Vec<String>) -> Self {
		Self {
			is_valid: errors.is_empty(),
			errors,
			warnings,
			required_actions,
		}
	}

	/// Verdict with a single blocking error and nothing else.
	pub fn rejected(error: impl Into<String>) -> Self {
		Self::new(vec![error.into()], Vec::new(), Vec::new())
	}

	/// Returns true when the caller must show warnings before committing.
	pub fn needs_acknowledgment(&self) -> bool {
		!self.warnings.is_empty()
	}
}

/// Request to move an order to a new status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRequest {
	pub order_id: String,
	pub target: OrderStatus,
	pub role: UserRole,
	pub actor_id: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub notes: Option<String>,
	/// Status the caller validated against. When set, the request fails as
	/// stale if the order has moved on since.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub expected_status: Option<OrderStatus>,
	/// Warnings the actor was shown and accepted. Only these are recorded as
	/// acknowledged in the audit entry.
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub acknowledged_warnings: Vec<String>,
}

impl TransitionRequest {
	pub fn new(
		order_id: impl Into<String>,
		target: OrderStatus,
		role: UserRole,
		actor_id: impl Into<String>,
	) -> Self {
		Self {
			order_id: order_id.into(),
			target,
			role,
			actor_id: actor_id.into(),
			notes: None,
			expected_status: None,
			acknowledged_warnings: Vec::new(),
		}
	}

	/// Attaches free-text notes recorded in the audit entry.
	pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
		self.notes = Some(notes.into());
		self
	}

	/// Pins the status the caller validated against.
	pub fn expecting(mut self, status: OrderStatus) -> Self {
		self.expected_status = Some(status);
		self
	}

	/// Records the warnings the actor accepted before submitting.
	pub fn acknowledging<I, S>(mut self, warnings: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.acknowledged_warnings = warnings.into_iter().map(Into::into).collect();
		self
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_validity_derived_from_errors() {
		let ok = TransitionValidation::new(vec![], vec!["late".into()], vec!["call".into()]);
		assert!(ok.is_valid);
		assert!(ok.needs_acknowledgment());

		let blocked = TransitionValidation::rejected("no equipment");
		assert!(!blocked.is_valid);
		assert_eq!(blocked.errors, vec!["no equipment".to_string()]);
	}
}
