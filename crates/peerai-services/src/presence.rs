//! Presence broadcaster: outbound queues of every live connection.
//!
//! Sends never block: each connection drains its own unbounded queue into
//! its socket. A queue whose receiver is gone is skipped; the connection's
//! disconnect event removes it.

use tokio::sync::mpsc;

use peerai_core::{PeerId, ServerEvent};

use crate::registry::Registry;

/// Outbound half of a connection's event queue.
pub type Outbound = mpsc::UnboundedSender<ServerEvent>;

#[derive(Debug, Default)]
pub struct Presence {
    connections: Vec<(PeerId, Outbound)>,
}

impl Presence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&mut self, id: PeerId, outbound: Outbound) {
        self.detach(&id);
        self.connections.push((id, outbound));
    }

    pub fn detach(&mut self, id: &PeerId) -> bool {
        let before = self.connections.len();
        self.connections.retain(|(k, _)| k != id);
        before != self.connections.len()
    }

    pub fn is_connected(&self, id: &PeerId) -> bool {
        self.connections.iter().any(|(k, _)| k == id)
    }

    /// Deliver to one connection. False if it is unknown or closed.
    pub fn send_to(&self, id: &PeerId, event: ServerEvent) -> bool {
        match self.connections.iter().find(|(k, _)| k == id) {
            Some((_, tx)) => tx.send(event).is_ok(),
            None => false,
        }
    }

    /// Deliver to every connection. Returns how many accepted it.
    pub fn broadcast(&self, event: &ServerEvent) -> usize {
        self.connections
            .iter()
            .filter(|(_, tx)| tx.send(event.clone()).is_ok())
            .count()
    }

    pub fn publish_count(&self, online: usize) -> usize {
        self.broadcast(&ServerEvent::OnlineUsersCount(online))
    }

    /// Push the full registry table to everyone.
    pub fn publish_snapshot(&self, registry: &Registry) -> usize {
        self.broadcast(&ServerEvent::UsersUpdate(registry.snapshot()))
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}
