//! Broadcast bus for engine events.
//!
//! Observers (notification dispatch, audit logging, the host application)
//! subscribe here. Publishing never blocks the engine; a bus with no
//! subscribers simply drops events.

use tokio::sync::broadcast;

use responder_types::EngineEvent;

/// Broadcast-based event bus shared by the engine and its observers.
pub struct EventBus {
	sender: broadcast::Sender<EngineEvent>,
}

impl EventBus {
	/// Creates a bus buffering up to `capacity` events per subscriber.
	pub fn new(capacity: usize) -> Self {
		let (sender, _) = broadcast::channel(capacity);
		Self { sender }
	}

	/// A new subscriber receiving every event published after this call.
	pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
		self.sender.subscribe()
	}

	/// Publishes to all current subscribers. Erring when nobody listens
	/// is not critical; callers typically ignore the result.
	pub fn publish(
		&self,
		event: EngineEvent,
	) -> Result<(), broadcast::error::SendError<EngineEvent>> {
		self.sender.send(event)?;
		Ok(())
	}
}

impl Clone for EventBus {
	fn clone(&self) -> Self {
		Self {
			sender: self.sender.clone(),
		}
	}
}
