use tokio::sync::broadcast;

use crate::dto::ws::ServerMessage;

/// Outbound message fan-out of a single room.
///
/// Every player socket subscribes once while joining; a lagging receiver loses
/// the oldest messages and is sent a full sync instead.
pub struct RoomHub {
    sender: broadcast::Sender<ServerMessage>,
}

impl RoomHub {
    /// Construct a new hub backed by a Tokio broadcast channel with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _receiver) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Register a new subscriber that will receive subsequent messages.
    pub fn subscribe(&self) -> broadcast::Receiver<ServerMessage> {
        self.sender.subscribe()
    }

    /// Send a message to every subscriber, ignoring delivery errors.
    pub fn broadcast(&self, message: ServerMessage) {
        let _ = self.sender.send(message);
    }
}
