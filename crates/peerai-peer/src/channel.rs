//! Direct peer channel abstraction.
//!
//! The session logic only needs an ordered, reliable byte pipe plus an
//! offer/answer handshake whose payloads travel through the signaling relay.
//! Payloads are opaque JSON to everything but the connector that made them.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use peerai_core::PeerId;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChannelError {
    #[error("negotiation failed: {0}")]
    NegotiationFailed(String),
    #[error("send failed: {0}")]
    SendFailed(String),
    #[error("channel closed")]
    Closed,
}

#[async_trait]
pub trait DataChannel: Send + Sync {
    async fn send(&self, data: Vec<u8>) -> Result<(), ChannelError>;

    /// Next message from the remote side; `None` once the remote closed.
    async fn recv(&self) -> Option<Vec<u8>>;

    async fn close(&self);
}

#[async_trait]
pub trait PeerConnector: Send + Sync {
    /// Start an outgoing connection. Returns the offer payload to relay.
    async fn create_offer(&self, remote: &PeerId) -> Result<Value, ChannelError>;

    /// Accept an incoming offer. Returns our open channel and the answer to relay.
    async fn accept_offer(
        &self,
        from: &PeerId,
        offer: &Value,
    ) -> Result<(Arc<dyn DataChannel>, Value), ChannelError>;

    /// Whether `answer` was produced for `offer`.
    fn answers(&self, offer: &Value, answer: &Value) -> bool;

    /// Finish an outgoing connection once the remote answered.
    async fn complete(
        &self,
        remote: &PeerId,
        answer: &Value,
    ) -> Result<Arc<dyn DataChannel>, ChannelError>;
}
