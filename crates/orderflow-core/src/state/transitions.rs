//! Static transition table.
//!
//! The table is the only source of legal moves. A `(from, to, role)` triple not
//! listed here is forbidden. Entries for one `from` status are declared happy
//! path first and exceptional exits (rejection, cancellation) last; queries keep
//! that order.

use once_cell::sync::Lazy;
use orderflow_types::{OrderStatus, StateTransition, UserRole};
use std::collections::{HashMap, HashSet, VecDeque};
use thiserror::Error;

use OrderStatus::*;
use UserRole::*;

const SALES: &[UserRole] = &[CommercialManager, GeneralAdmin];
const OPERATIONS: &[UserRole] = &[OperationsManager, GeneralAdmin];
const DOCTOR_CONTACT: &[UserRole] = &[CommercialManager, OperationsManager, GeneralAdmin];
const DOCTOR_ANSWER: &[UserRole] = &[DoctorProxy, CommercialManager, GeneralAdmin];
const WAREHOUSE: &[UserRole] = &[WarehouseChief, OperationsManager, GeneralAdmin];
const FIELD: &[UserRole] = &[WarehouseChief, Technician, OperationsManager, GeneralAdmin];
const REMISSION: &[UserRole] = &[AdministrativeManager, WarehouseChief, GeneralAdmin];
const SURGERY: &[UserRole] = &[Technician, OperationsManager, GeneralAdmin];
const CLOSING: &[UserRole] = &[Technician, AdministrativeManager, OperationsManager, GeneralAdmin];
const BILLING: &[UserRole] = &[AdministrativeManager, GeneralAdmin];
const LATE_CANCEL: &[UserRole] = &[CommercialManager, OperationsManager, GeneralAdmin];

const fn edge(
	from: OrderStatus,
	to: OrderStatus,
	allowed_roles: &'static [UserRole],
	description: &'static str,
	estimated_minutes: Option<u32>,
) -> StateTransition {
	StateTransition {
		from,
		to,
		allowed_roles,
		description,
		estimated_minutes,
	}
}

/// Every permitted transition, in declared order.
pub static TRANSITIONS: &[StateTransition] = &[
	edge(Created, PendingApproval, SALES, "Submit order for approval", Some(10)),
	edge(Created, Cancelled, SALES, "Cancel order", None),
	edge(PendingApproval, Approved, OPERATIONS, "Approve order", Some(60)),
	edge(PendingApproval, Rejected, OPERATIONS, "Reject order", None),
	edge(PendingApproval, Cancelled, SALES, "Cancel order", None),
	edge(Approved, DoctorConfirmation, DOCTOR_CONTACT, "Call doctor to confirm", Some(30)),
	edge(Approved, Cancelled, SALES, "Cancel order", None),
	edge(DoctorConfirmation, DoctorApproved, DOCTOR_ANSWER, "Record doctor approval", Some(15)),
	edge(DoctorConfirmation, TemplatesReady, WAREHOUSE, "Prepare equipment templates", Some(90)),
	edge(DoctorConfirmation, DoctorRejected, DOCTOR_ANSWER, "Record doctor rejection", None),
	edge(DoctorConfirmation, Cancelled, SALES, "Cancel order", None),
	edge(DoctorApproved, TemplatesReady, WAREHOUSE, "Prepare equipment templates", Some(90)),
	edge(DoctorApproved, Cancelled, SALES, "Cancel order", None),
	edge(TemplatesReady, TechniciansAssigned, OPERATIONS, "Assign technicians", Some(30)),
	edge(TemplatesReady, Cancelled, LATE_CANCEL, "Cancel order", None),
	edge(TechniciansAssigned, EquipmentTransported, FIELD, "Transport equipment", Some(120)),
	edge(TechniciansAssigned, Cancelled, OPERATIONS, "Cancel order", None),
	edge(EquipmentTransported, RemissionCreated, REMISSION, "Issue remission", Some(20)),
	edge(RemissionCreated, SurgeryPrepared, SURGERY, "Prepare surgery room", Some(60)),
	edge(SurgeryPrepared, SurgeryCompleted, SURGERY, "Complete surgery", Some(240)),
	edge(SurgeryPrepared, Cancelled, OPERATIONS, "Cancel order", None),
	edge(SurgeryCompleted, ReadyForBilling, CLOSING, "Close for billing", Some(30)),
	edge(ReadyForBilling, Billed, BILLING, "Issue invoice", Some(60)),
];

/// Outgoing entries grouped by `from`, each group in declared order.
static BY_SOURCE: Lazy<HashMap<OrderStatus, Vec<&'static StateTransition>>> = Lazy::new(|| {
	let mut index: HashMap<OrderStatus, Vec<&'static StateTransition>> = HashMap::new();
	for transition in TRANSITIONS {
		index.entry(transition.from).or_default().push(transition);
	}
	index
});

/// Structural problems the integrity check can find in a table.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TableIntegrityError {
	#[error("Terminal status {0} has outgoing transitions")]
	TerminalHasExit(OrderStatus),
	#[error("Non-terminal status {0} has no outgoing transition")]
	DeadEnd(OrderStatus),
	#[error("Transition {from} -> {to} allows no role")]
	NoRoles { from: OrderStatus, to: OrderStatus },
	#[error("Transition {from} -> {to} is declared more than once")]
	Duplicate { from: OrderStatus, to: OrderStatus },
	#[error("Status {0} is unreachable from the initial status")]
	Unreachable(OrderStatus),
}

/// Read-only view over the static transition table.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransitionTable;

impl TransitionTable {
	/// Every entry in declared order.
	pub fn entries(&self) -> &'static [StateTransition] {
		TRANSITIONS
	}

	/// Entries leaving `from` for any role.
	pub fn outgoing(&self, from: OrderStatus) -> Vec<StateTransition> {
		BY_SOURCE
			.get(&from)
			.map(|entries| entries.iter().map(|t| **t).collect())
			.unwrap_or_default()
	}

	/// Entries leaving `current` that `role` may perform.
	///
	/// Empty for terminal statuses and for roles without moves.
	pub fn valid_transitions(&self, current: OrderStatus, role: UserRole) -> Vec<StateTransition> {
		BY_SOURCE
			.get(&current)
			.map(|entries| {
				entries
					.iter()
					.filter(|t| t.allows(role))
					.map(|t| **t)
					.collect()
			})
			.unwrap_or_default()
	}

	/// Like [`valid_transitions`](Self::valid_transitions) for a role given by
	/// name. An unknown name has no moves.
	pub fn valid_transitions_for_role_name(
		&self,
		current: OrderStatus,
		role: &str,
	) -> Vec<StateTransition> {
		match role.parse::<UserRole>() {
			Ok(role) => self.valid_transitions(current, role),
			Err(_) => Vec::new(),
		}
	}

	/// The entry for `from -> to` if `role` may perform it.
	pub fn transition(
		&self,
		from: OrderStatus,
		to: OrderStatus,
		role: UserRole,
	) -> Option<StateTransition> {
		BY_SOURCE
			.get(&from)?
			.iter()
			.find(|t| t.to == to && t.allows(role))
			.map(|t| **t)
	}

	/// Checks the structural invariants of the table.
	pub fn check_integrity(&self) -> Result<(), TableIntegrityError> {
		check_entries(TRANSITIONS)
	}
}

fn check_entries(entries: &[StateTransition]) -> Result<(), TableIntegrityError> {
	let mut seen = HashSet::new();
	for entry in entries {
		if entry.from.is_terminal() {
			return Err(TableIntegrityError::TerminalHasExit(entry.from));
		}
		if entry.allowed_roles.is_empty() {
			return Err(TableIntegrityError::NoRoles {
				from: entry.from,
				to: entry.to,
			});
		}
		if !seen.insert((entry.from, entry.to)) {
			return Err(TableIntegrityError::Duplicate {
				from: entry.from,
				to: entry.to,
			});
		}
	}

	for status in OrderStatus::all().filter(|s| !s.is_terminal()) {
		if !entries.iter().any(|e| e.from == status) {
			return Err(TableIntegrityError::DeadEnd(status));
		}
	}

	let mut reached = HashSet::from([OrderStatus::INITIAL]);
	let mut queue = VecDeque::from([OrderStatus::INITIAL]);
	while let Some(current) = queue.pop_front() {
		for entry in entries.iter().filter(|e| e.from == current) {
			if reached.insert(entry.to) {
				queue.push_back(entry.to);
			}
		}
	}
	match OrderStatus::all().find(|s| !reached.contains(s)) {
		Some(status) => Err(TableIntegrityError::Unreachable(status)),
		None => Ok(()),
	}
}
