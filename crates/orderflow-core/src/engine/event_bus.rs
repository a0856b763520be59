//! Broadcast channel for workflow events.
//!
//! Every subscriber receives every event published after it subscribed. A
//! subscriber that falls behind by more than the channel capacity loses the
//! oldest events and sees a `Lagged` error on its next receive.

use orderflow_types::WorkflowEvent;
use tokio::sync::broadcast;

/// Cloneable handle to the workflow event channel.
#[derive(Clone)]
pub struct EventBus {
	sender: broadcast::Sender<WorkflowEvent>,
}

impl EventBus {
	/// Creates a new event bus holding up to `capacity` undelivered events.
	pub fn new(capacity: usize) -> Self {
		let (sender, _) = broadcast::channel(capacity);
		Self { sender }
	}

	/// Subscribes to events published from now on.
	pub fn subscribe(&self) -> broadcast::Receiver<WorkflowEvent> {
		self.sender.subscribe()
	}

	/// Publishes an event to all current subscribers.
	///
	/// Fails only when nobody is subscribed; callers usually ignore that.
	pub fn publish(
		&self,
		event: WorkflowEvent,
	) -> Result<(), broadcast::error::SendError<WorkflowEvent>> {
		self.sender.send(event)?;
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn test_subscribers_receive_events() {
		let bus = EventBus::new(8);
		let mut first = bus.subscribe();
		let mut second = bus.subscribe();

		bus.publish(WorkflowEvent::OrderCreated {
			order_id: "ord-1".into(),
			created_by: "u-1".into(),
		})
		.unwrap();

		for receiver in [&mut first, &mut second] {
			match receiver.recv().await.unwrap() {
				WorkflowEvent::OrderCreated { order_id, .. } => assert_eq!(order_id, "ord-1"),
				other => panic!("unexpected event {:?}", other),
			}
		}
	}

	#[test]
	fn test_publish_without_subscribers() {
		let bus = EventBus::new(8);
		let result = bus.publish(WorkflowEvent::OrderCreated {
			order_id: "ord-1".into(),
			created_by: "u-1".into(),
		});
		assert!(result.is_err());
	}
}
