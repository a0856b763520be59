//! Order types for the workflow engine.
//!
//! This module defines the order status set, the order snapshot the validator
//! reads, and the storage record that keeps an order and its audit history
//! together so both are always written in one step.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::StatusHistoryEntry;

/// Status of an order in the equipment logistics workflow.
///
/// Variants are declared in typical flow order, which is also their `Ord` order.
/// The flow is not strictly linear: exceptional exits (rejection, cancellation)
/// branch off from several points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
	/// Order has been captured by commercial staff.
	Created,
	/// Order is waiting for operations approval.
	PendingApproval,
	/// Order has been approved internally.
	Approved,
	/// Doctor is being contacted by phone to confirm the request.
	DoctorConfirmation,
	/// Doctor confirmed the request.
	DoctorApproved,
	/// Doctor declined the request.
	DoctorRejected,
	/// Equipment templates have been prepared by the warehouse.
	TemplatesReady,
	/// Technicians have been assigned to the surgery.
	TechniciansAssigned,
	/// Equipment has left the warehouse.
	EquipmentTransported,
	/// Delivery remission has been issued.
	RemissionCreated,
	/// Surgery room has been prepared.
	SurgeryPrepared,
	/// Surgery has been performed.
	SurgeryCompleted,
	/// Order is complete and waiting to be invoiced.
	ReadyForBilling,
	/// Order has been invoiced.
	Billed,
	/// Order was cancelled.
	Cancelled,
	/// Order was rejected during approval.
	Rejected,
}

impl OrderStatus {
	/// Status every new order starts in.
	pub const INITIAL: OrderStatus = OrderStatus::Created;

	/// Returns every status in declaration order.
	pub fn all() -> impl Iterator<Item = Self> {
		[
			Self::Created,
			Self::PendingApproval,
			Self::Approved,
			Self::DoctorConfirmation,
			Self::DoctorApproved,
			Self::DoctorRejected,
			Self::TemplatesReady,
			Self::TechniciansAssigned,
			Self::EquipmentTransported,
			Self::RemissionCreated,
			Self::SurgeryPrepared,
			Self::SurgeryCompleted,
			Self::ReadyForBilling,
			Self::Billed,
			Self::Cancelled,
			Self::Rejected,
		]
		.into_iter()
	}

	/// Returns true when no transition may leave this status.
	pub fn is_terminal(&self) -> bool {
		matches!(
			self,
			Self::Billed | Self::Cancelled | Self::Rejected | Self::DoctorRejected
		)
	}

	/// Returns the snake_case name used in storage and on the command line.
	pub fn as_str(&self) -> &'static str {
		match self {
			Self::Created => "created",
			Self::PendingApproval => "pending_approval",
			Self::Approved => "approved",
			Self::DoctorConfirmation => "doctor_confirmation",
			Self::DoctorApproved => "doctor_approved",
			Self::DoctorRejected => "doctor_rejected",
			Self::TemplatesReady => "templates_ready",
			Self::TechniciansAssigned => "technicians_assigned",
			Self::EquipmentTransported => "equipment_transported",
			Self::RemissionCreated => "remission_created",
			Self::SurgeryPrepared => "surgery_prepared",
			Self::SurgeryCompleted => "surgery_completed",
			Self::ReadyForBilling => "ready_for_billing",
			Self::Billed => "billed",
			Self::Cancelled => "cancelled",
			Self::Rejected => "rejected",
		}
	}
}

impl fmt::Display for OrderStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Error returned when a status name is not part of the status set.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Unknown order status: {0}")]
pub struct UnknownStatusError(pub String);

impl FromStr for OrderStatus {
	type Err = UnknownStatusError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::all()
			.find(|status| status.as_str() == s)
			.ok_or_else(|| UnknownStatusError(s.to_string()))
	}
}

/// Contact details of the surgeon the order is for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DoctorContact {
	/// Display name of the doctor.
	pub name: String,
	/// Phone used for the confirmation call.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub phone: Option<String>,
}

/// Outcome of the confirmation phone call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DoctorDecision {
	Approved,
	Rejected,
}

/// Doctor answer recorded by commercial staff or the doctor proxy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DoctorResponse {
	pub decision: DoctorDecision,
	pub responded_at: DateTime<Utc>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub notes: Option<String>,
}

/// One equipment line of an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EquipmentItem {
	/// Catalog identifier of the product.
	pub id: String,
	/// Display name of the product.
	pub name: String,
	/// Requested units.
	#[serde(default = "default_quantity")]
	pub quantity: u32,
	/// Whether the warehouse confirmed the line.
	#[serde(default)]
	pub confirmed: bool,
	/// Price agreed for billing, when confirmed.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub confirmed_price: Option<Decimal>,
}

fn default_quantity() -> u32 {
	1
}

/// Technician assigned to support the surgery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TechnicianAssignment {
	pub technician_id: String,
	pub name: String,
	pub assigned_at: DateTime<Utc>,
}

/// Denormalized facts about an order that business rules read.
///
/// Fields that may legitimately be unknown are optional. For equipment the
/// distinction matters: `None` means the equipment list is not available,
/// `Some(vec![])` means the order is known to have no equipment lines.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderDetails {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub hospital: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub procedure: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub doctor: Option<DoctorContact>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub doctor_response: Option<DoctorResponse>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub surgery_at: Option<DateTime<Utc>>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub equipment: Option<Vec<EquipmentItem>>,
	#[serde(default)]
	pub technicians: Vec<TechnicianAssignment>,
	/// Number of evidence files uploaded for the order.
	#[serde(default)]
	pub evidence_count: u32,
}

impl OrderDetails {
	/// Equipment lines confirmed by the warehouse, or `None` when unknown.
	pub fn confirmed_equipment(&self) -> Option<Vec<&EquipmentItem>> {
		self.equipment
			.as_ref()
			.map(|items| items.iter().filter(|item| item.confirmed).collect())
	}

	/// Equipment lines without a confirmed price, or `None` when unknown.
	pub fn unpriced_equipment(&self) -> Option<Vec<&EquipmentItem>> {
		self.equipment.as_ref().map(|items| {
			items
				.iter()
				.filter(|item| item.confirmed_price.is_none())
				.collect()
		})
	}
}

/// Snapshot of an order as the workflow engine sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
	/// Unique identifier for this order.
	pub id: String,
	/// Current status of the order.
	pub status: OrderStatus,
	/// Actor that created the order.
	pub created_by: String,
	/// Timestamp when this order was created.
	pub created_at: DateTime<Utc>,
	/// Timestamp when this order was last updated.
	pub updated_at: DateTime<Utc>,
	/// Facts used by transition validation.
	#[serde(default)]
	pub details: OrderDetails,
}

/// Input for registering a new order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewOrder {
	/// Identifier to use; a UUID is generated when absent.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub id: Option<String>,
	#[serde(default)]
	pub details: OrderDetails,
}

/// Storage record holding an order together with its audit history.
///
/// Status and history live in the same record so that a status change and its
/// audit entry are persisted by a single atomic write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRecord {
	pub order: Order,
	#[serde(default)]
	pub history: Vec<StatusHistoryEntry>,
}

impl OrderRecord {
	/// Wraps a freshly created order with an empty history.
	pub fn new(order: Order) -> Self {
		Self {
			order,
			history: Vec::new(),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_status_round_trips_through_str() {
		for status in OrderStatus::all() {
			assert_eq!(status.as_str().parse::<OrderStatus>(), Ok(status));
		}
		assert!("shipped".parse::<OrderStatus>().is_err());
	}

	#[test]
	fn test_status_serde_uses_snake_case() {
		let json = serde_json::to_string(&OrderStatus::DoctorConfirmation).unwrap();
		assert_eq!(json, "\"doctor_confirmation\"");
	}

	#[test]
	fn test_terminal_statuses() {
		let terminal: Vec<_> = OrderStatus::all().filter(|s| s.is_terminal()).collect();
		assert_eq!(
			terminal,
			vec![
				OrderStatus::DoctorRejected,
				OrderStatus::Billed,
				OrderStatus::Cancelled,
				OrderStatus::Rejected
			]
		);
	}

	#[test]
	fn test_equipment_unknown_vs_empty() {
		let unknown = OrderDetails::default();
		assert!(unknown.confirmed_equipment().is_none());

		let empty = OrderDetails {
			equipment: Some(vec![]),
			..Default::default()
		};
		assert_eq!(empty.confirmed_equipment().map(|v| v.len()), Some(0));
	}

	#[test]
	fn test_details_deserialize_with_defaults() {
		let details: OrderDetails = serde_json::from_str(
			r#"{"equipment":[{"id":"p1","name":"Drill","confirmed":true,"confirmed_price":"120.50"}]}"#,
		)
		.unwrap();
		let items = details.equipment.unwrap();
		assert_eq!(items[0].quantity, 1);
		assert_eq!(items[0].confirmed_price, Some(Decimal::new(12050, 2)));
		assert!(details.technicians.is_empty());
	}
}
