//! Actor roles.
//!
//! A role is an attribute of whoever performs a call, never of the order. It is
//! passed explicitly into every engine operation together with the actor id.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Role of the acting party.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
	/// Captures orders and handles the doctor relationship.
	CommercialManager,
	/// Approves orders and plans technicians.
	OperationsManager,
	/// Unrestricted administrator.
	GeneralAdmin,
	/// Issues remissions and invoices.
	AdministrativeManager,
	/// Runs the warehouse and equipment transport.
	WarehouseChief,
	/// Field technician supporting the surgery.
	Technician,
	/// Records the doctor's answer on the doctor's behalf.
	DoctorProxy,
}

impl UserRole {
	/// Returns every role.
	pub fn all() -> impl Iterator<Item = Self> {
		[
			Self::CommercialManager,
			Self::OperationsManager,
			Self::GeneralAdmin,
			Self::AdministrativeManager,
			Self::WarehouseChief,
			Self::Technician,
			Self::DoctorProxy,
		]
		.into_iter()
	}

	/// Returns the snake_case role name.
	pub fn as_str(&self) -> &'static str {
		match self {
			Self::CommercialManager => "commercial_manager",
			Self::OperationsManager => "operations_manager",
			Self::GeneralAdmin => "general_admin",
			Self::AdministrativeManager => "administrative_manager",
			Self::WarehouseChief => "warehouse_chief",
			Self::Technician => "technician",
			Self::DoctorProxy => "doctor_proxy",
		}
	}
}

impl fmt::Display for UserRole {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Error returned when a role name is not recognised.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Unknown role: {0}")]
pub struct UnknownRoleError(pub String);

impl FromStr for UserRole {
	type Err = UnknownRoleError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::all()
			.find(|role| role.as_str() == s)
			.ok_or_else(|| UnknownRoleError(s.to_string()))
	}
}
