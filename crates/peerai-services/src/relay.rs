//! Signaling relay: forwards offers and answers between peers.
//!
//! The payload is never inspected. A target that is not connected means the
//! message is dropped without telling the sender; the sender sees a stalled
//! negotiation and applies its own timeout.

use peerai_core::{PeerId, ServerEvent, SignalingEnvelope};

use crate::presence::Presence;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Delivered,
    Dropped,
}

/// Forward `envelope` to its target, tagged with the sender's id.
pub fn relay(presence: &Presence, from: &PeerId, envelope: SignalingEnvelope) -> Delivery {
    let to = envelope.to.clone();
    let kind = envelope.kind;
    if presence.send_to(&to, ServerEvent::relayed(from.clone(), envelope)) {
        tracing::trace!(from = %from, to = %to, ?kind, "signal relayed");
        Delivery::Delivered
    } else {
        tracing::debug!(from = %from, to = %to, ?kind, "signal target not connected, dropped");
        Delivery::Dropped
    }
}
