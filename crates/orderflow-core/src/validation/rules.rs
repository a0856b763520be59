//! Business rules keyed by target status.
//!
//! Rules on unknown equipment data: a blocking rule fails with
//! [`EQUIPMENT_UNAVAILABLE`], an advisory rule treats it like an empty list.

use super::OrderContext;
use orderflow_types::{DoctorDecision, EquipmentItem, OrderStatus, TransitionValidation};

pub(super) const EQUIPMENT_UNAVAILABLE: &str = "Equipment data unavailable for this order";

const SCHEDULE_SURGERY: &str = "Schedule the surgery date";
const RECORD_DOCTOR_RESPONSE: &str = "Record the doctor's response";
const ASSIGN_TECHNICIANS: &str = "Assign technicians first";
const GIVE_REASON: &str = "Give a reason in the notes";

#[derive(Debug, Default)]
pub(super) struct Findings {
	errors: Vec<String>,
	warnings: Vec<String>,
	required_actions: Vec<String>,
}

impl Findings {
	fn error(&mut self, message: impl Into<String>) {
		self.errors.push(message.into());
	}

	fn warn(&mut self, message: impl Into<String>) {
		self.warnings.push(message.into());
	}

	fn require(&mut self, message: impl Into<String>) {
		self.required_actions.push(message.into());
	}

	pub(super) fn into_validation(self) -> TransitionValidation {
		TransitionValidation::new(self.errors, self.warnings, self.required_actions)
	}
}

fn names(items: &[&EquipmentItem]) -> String {
	items
		.iter()
		.map(|item| item.name.as_str())
		.collect::<Vec<_>>()
		.join(", ")
}

pub(super) fn apply(context: &OrderContext<'_>, to: OrderStatus, findings: &mut Findings) {
	match to {
		OrderStatus::PendingApproval => submit_for_approval(context, findings),
		OrderStatus::Approved => approve(context, findings),
		OrderStatus::DoctorConfirmation => contact_doctor(context, findings),
		OrderStatus::DoctorApproved => doctor_approved(context, findings),
		OrderStatus::DoctorRejected => doctor_rejected(context, findings),
		OrderStatus::TemplatesReady => templates_ready(context, findings),
		OrderStatus::TechniciansAssigned => technicians_assigned(context, findings),
		OrderStatus::EquipmentTransported => equipment_transported(context, findings),
		OrderStatus::RemissionCreated => remission_created(context, findings),
		OrderStatus::SurgeryPrepared => surgery_prepared(context, findings),
		OrderStatus::SurgeryCompleted => surgery_completed(context, findings),
		OrderStatus::ReadyForBilling => ready_for_billing(context, findings),
		OrderStatus::Billed => billed(context, findings),
		OrderStatus::Cancelled | OrderStatus::Rejected => findings.require(GIVE_REASON),
		OrderStatus::Created => {},
	}
}

fn submit_for_approval(context: &OrderContext<'_>, findings: &mut Findings) {
	let details = &context.order.details;
	if details.equipment.as_ref().is_none_or(Vec::is_empty) {
		findings.warn("No equipment lines have been added yet");
	}
	if details.surgery_at.is_none() {
		findings.require(SCHEDULE_SURGERY);
	}
}

fn approve(context: &OrderContext<'_>, findings: &mut Findings) {
	if let Some(surgery_at) = context.order.details.surgery_at {
		if surgery_at < context.now {
			findings.warn("Surgery date is already in the past");
		}
	}
}

fn contact_doctor(context: &OrderContext<'_>, findings: &mut Findings) {
	let details = &context.order.details;
	match &details.equipment {
		None => findings.error(EQUIPMENT_UNAVAILABLE),
		Some(items) if items.is_empty() => findings.error("Order has no equipment line items"),
		Some(_) => {},
	}
	match &details.doctor {
		None => findings.error("No doctor contact recorded"),
		Some(doctor) if doctor.phone.as_deref().is_none_or(|p| p.trim().is_empty()) => {
			findings.warn(format!("Doctor {} has no phone number on file", doctor.name));
		},
		Some(_) => {},
	}
	if details.surgery_at.is_none() {
		findings.require(SCHEDULE_SURGERY);
	}
}

fn doctor_approved(context: &OrderContext<'_>, findings: &mut Findings) {
	match &context.order.details.doctor_response {
		Some(response) if response.decision == DoctorDecision::Rejected => {
			findings.error("The recorded doctor response is a rejection");
		},
		Some(_) => {},
		None => findings.require(RECORD_DOCTOR_RESPONSE),
	}
}

fn doctor_rejected(context: &OrderContext<'_>, findings: &mut Findings) {
	match &context.order.details.doctor_response {
		Some(response) if response.decision == DoctorDecision::Approved => {
			findings.warn("The recorded doctor response is an approval");
		},
		Some(_) => {},
		None => findings.require(RECORD_DOCTOR_RESPONSE),
	}
	findings.require(GIVE_REASON);
}

fn templates_ready(context: &OrderContext<'_>, findings: &mut Findings) {
	let details = &context.order.details;
	match details.confirmed_equipment() {
		None => findings.error(EQUIPMENT_UNAVAILABLE),
		Some(confirmed) if confirmed.is_empty() => findings.error(
			"Missing equipment confirmation: no equipment line has been confirmed by the warehouse",
		),
		Some(_) => {},
	}
	for shortage in &context.stock_shortages {
		findings.warn(format!(
			"Insufficient stock for {}: requested {}, available {}",
			shortage.name, shortage.requested, shortage.available
		));
	}
	if context.order.status == OrderStatus::DoctorConfirmation && details.doctor_response.is_none()
	{
		findings.require("Record the doctor's response before preparing templates");
	}
}

fn technicians_assigned(context: &OrderContext<'_>, findings: &mut Findings) {
	let details = &context.order.details;
	if details.technicians.is_empty() {
		findings.error("No technicians assigned");
	}
	if details.confirmed_equipment().is_none_or(|c| c.is_empty()) {
		findings.warn("No equipment has been confirmed yet");
	}
	for conflict in &context.schedule_conflicts {
		findings.warn(format!(
			"Schedule conflict with order {}: {}",
			conflict.conflicting_order_id, conflict.description
		));
	}
}

fn equipment_transported(context: &OrderContext<'_>, findings: &mut Findings) {
	let details = &context.order.details;
	match details.confirmed_equipment() {
		None => findings.error(EQUIPMENT_UNAVAILABLE),
		Some(confirmed) if confirmed.is_empty() => {
			findings.error("No confirmed equipment to transport");
		},
		Some(_) => {},
	}
	for shortage in &context.stock_shortages {
		findings.error(format!(
			"Cannot transport {}: requested {}, available {}",
			shortage.name, shortage.requested, shortage.available
		));
	}
	if let Some(items) = &details.equipment {
		let unconfirmed: Vec<&EquipmentItem> = items.iter().filter(|i| !i.confirmed).collect();
		if !unconfirmed.is_empty() {
			findings.warn(format!(
				"Unconfirmed items will not be transported: {}",
				names(&unconfirmed)
			));
		}
	}
	if details.technicians.is_empty() {
		findings.require(ASSIGN_TECHNICIANS);
	}
}

fn remission_created(context: &OrderContext<'_>, findings: &mut Findings) {
	if context.order.details.evidence_count == 0 {
		findings.warn("No evidence attached yet");
	}
}

fn surgery_prepared(context: &OrderContext<'_>, findings: &mut Findings) {
	let details = &context.order.details;
	match details.surgery_at {
		None => findings.error("Surgery date is unknown"),
		Some(at) if at < context.now => findings.warn("Surgery date and time are in the past"),
		Some(_) => {},
	}
	if details.technicians.is_empty() {
		findings.require(ASSIGN_TECHNICIANS);
	}
}

fn surgery_completed(context: &OrderContext<'_>, findings: &mut Findings) {
	let details = &context.order.details;
	if let Some(at) = details.surgery_at {
		if at > context.now {
			findings.warn("Surgery date is in the future");
		}
	}
	if details.evidence_count == 0 {
		findings.require("Upload surgery evidence");
	}
}

fn ready_for_billing(context: &OrderContext<'_>, findings: &mut Findings) {
	match context.order.details.unpriced_equipment() {
		None => findings.require("Load equipment data and confirm prices"),
		Some(unpriced) if !unpriced.is_empty() => {
			findings.require(format!("Confirm prices for: {}", names(&unpriced)));
		},
		Some(_) => {},
	}
}

fn billed(context: &OrderContext<'_>, findings: &mut Findings) {
	match &context.order.details.equipment {
		None => findings.error(EQUIPMENT_UNAVAILABLE),
		Some(items) if items.is_empty() => findings.error("Order has no equipment to bill"),
		Some(_) => {},
	}
	if let Some(unpriced) = context.order.details.unpriced_equipment() {
		if !unpriced.is_empty() {
			findings.error(format!(
				"Items without a confirmed price: {}",
				names(&unpriced)
			));
		}
	}
}
