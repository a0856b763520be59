//! Status catalog: human-facing metadata for statuses and roles.
//!
//! Used for labeling only. No workflow decision reads from here; legality lives
//! in the transition table and gating in the validator.

use orderflow_types::{OrderStatus, UserRole};
use serde::Serialize;

/// Broad phase of the lifecycle a status belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusCategory {
	Intake,
	Confirmation,
	Logistics,
	Surgery,
	Billing,
	Closed,
}

/// Display metadata for one status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatusMetadata {
	pub status: OrderStatus,
	pub label: &'static str,
	pub category: StatusCategory,
	pub icon: &'static str,
	/// Hex color used by status badges.
	pub color: &'static str,
	pub is_terminal: bool,
}

/// Lookup of status and role metadata.
#[derive(Debug, Clone, Copy, Default)]
pub struct StatusCatalog;

impl StatusCatalog {
	/// Returns the metadata of a status.
	pub fn metadata(&self, status: OrderStatus) -> StatusMetadata {
		let (label, category, icon, color) = match status {
			OrderStatus::Created => ("Created", StatusCategory::Intake, "file-plus", "#64748b"),
			OrderStatus::PendingApproval => {
				("Pending approval", StatusCategory::Intake, "hourglass", "#f59e0b")
			},
			OrderStatus::Approved => ("Approved", StatusCategory::Intake, "check", "#10b981"),
			OrderStatus::DoctorConfirmation => (
				"Doctor confirmation",
				StatusCategory::Confirmation,
				"phone",
				"#3b82f6",
			),
			OrderStatus::DoctorApproved => (
				"Doctor approved",
				StatusCategory::Confirmation,
				"user-check",
				"#22c55e",
			),
			OrderStatus::DoctorRejected => (
				"Doctor rejected",
				StatusCategory::Closed,
				"user-x",
				"#ef4444",
			),
			OrderStatus::TemplatesReady => {
				("Templates ready", StatusCategory::Logistics, "package", "#8b5cf6")
			},
			OrderStatus::TechniciansAssigned => (
				"Technicians assigned",
				StatusCategory::Logistics,
				"users",
				"#6366f1",
			),
			OrderStatus::EquipmentTransported => (
				"Equipment transported",
				StatusCategory::Logistics,
				"truck",
				"#0ea5e9",
			),
			OrderStatus::RemissionCreated => (
				"Remission created",
				StatusCategory::Logistics,
				"file-text",
				"#14b8a6",
			),
			OrderStatus::SurgeryPrepared => {
				("Surgery prepared", StatusCategory::Surgery, "clipboard", "#a855f7")
			},
			OrderStatus::SurgeryCompleted => (
				"Surgery completed",
				StatusCategory::Surgery,
				"activity",
				"#16a34a",
			),
			OrderStatus::ReadyForBilling => {
				("Ready for billing", StatusCategory::Billing, "receipt", "#eab308")
			},
			OrderStatus::Billed => ("Billed", StatusCategory::Billing, "dollar-sign", "#15803d"),
			OrderStatus::Cancelled => ("Cancelled", StatusCategory::Closed, "slash", "#6b7280"),
			OrderStatus::Rejected => ("Rejected", StatusCategory::Closed, "x-circle", "#dc2626"),
		};

		StatusMetadata {
			status,
			label,
			category,
			icon,
			color,
			is_terminal: status.is_terminal(),
		}
	}

	/// Returns the metadata of every status, in declaration order.
	pub fn all(&self) -> Vec<StatusMetadata> {
		OrderStatus::all().map(|status| self.metadata(status)).collect()
	}

	/// Returns the display label of a status.
	pub fn label(&self, status: OrderStatus) -> &'static str {
		self.metadata(status).label
	}

	/// Returns the display label of a role.
	pub fn role_label(&self, role: UserRole) -> &'static str {
		match role {
			UserRole::CommercialManager => "Commercial manager",
			UserRole::OperationsManager => "Operations manager",
			UserRole::GeneralAdmin => "General administrator",
			UserRole::AdministrativeManager => "Administrative manager",
			UserRole::WarehouseChief => "Warehouse chief",
			UserRole::Technician => "Technician",
			UserRole::DoctorProxy => "Doctor (proxy)",
		}
	}
}
