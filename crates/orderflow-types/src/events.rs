//! Event types published by the workflow engine.
//!
//! Notification and calendar collaborators subscribe to these events instead of
//! polling order status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{OrderStatus, UserRole};

/// Events emitted after a change has been durably committed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkflowEvent {
	/// A new order was registered in the initial status.
	OrderCreated { order_id: String, created_by: String },
	/// A transition was committed together with its audit entry.
	TransitionCommitted {
		order_id: String,
		from: OrderStatus,
		to: OrderStatus,
		role: UserRole,
		actor_id: String,
		changed_at: DateTime<Utc>,
	},
}
