//! Audit ledger types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{OrderStatus, UserRole};

/// Immutable record of one committed status transition.
///
/// Exactly one entry is written per committed transition and entries are never
/// updated or deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusHistoryEntry {
	pub id: String,
	pub order_id: String,
	pub from_status: OrderStatus,
	pub to_status: OrderStatus,
	/// Actor id of whoever performed the transition.
	pub changed_by: String,
	pub changed_at: DateTime<Utc>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub notes: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub metadata: Option<HistoryMetadata>,
}

/// Context captured alongside an audit entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryMetadata {
	/// Role the actor acted under.
	pub role: UserRole,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub estimated_minutes: Option<u32>,
	/// Warnings the actor accepted that the commit-time validation also raised.
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub acknowledged_warnings: Vec<String>,
}
