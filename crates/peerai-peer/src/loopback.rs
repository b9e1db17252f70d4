//! In-memory connector for tests and single-process simulation.
//!
//! Every connector created from the same `LoopbackNetwork` can reach the
//! others. An offer carries a token naming a channel pair parked in the
//! network; the responder takes one half on accept, the initiator takes the
//! other on complete.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use peerai_core::PeerId;

use crate::channel::{ChannelError, DataChannel, PeerConnector};

// ── Channel ───────────────────────────────────────────────────────────────────

pub struct LoopbackChannel {
    tx: Mutex<Option<mpsc::UnboundedSender<Vec<u8>>>>,
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Vec<u8>>>,
}

impl LoopbackChannel {
    pub fn pair() -> (Arc<Self>, Arc<Self>) {
        let (a_tx, b_rx) = mpsc::unbounded_channel();
        let (b_tx, a_rx) = mpsc::unbounded_channel();
        let a = Arc::new(Self {
            tx: Mutex::new(Some(a_tx)),
            rx: tokio::sync::Mutex::new(a_rx),
        });
        let b = Arc::new(Self {
            tx: Mutex::new(Some(b_tx)),
            rx: tokio::sync::Mutex::new(b_rx),
        });
        (a, b)
    }

    fn sender(&self) -> Option<mpsc::UnboundedSender<Vec<u8>>> {
        self.tx.lock().ok().and_then(|tx| tx.clone())
    }
}

#[async_trait]
impl DataChannel for LoopbackChannel {
    async fn send(&self, data: Vec<u8>) -> Result<(), ChannelError> {
        let tx = self.sender().ok_or(ChannelError::Closed)?;
        tx.send(data).map_err(|_| ChannelError::Closed)
    }

    async fn recv(&self) -> Option<Vec<u8>> {
        self.rx.lock().await.recv().await
    }

    async fn close(&self) {
        // Dropping our sender ends the remote's receive stream.
        if let Ok(mut tx) = self.tx.lock() {
            tx.take();
        }
    }
}

// ── Network ───────────────────────────────────────────────────────────────────

#[derive(Default)]
struct Parked {
    initiator: Option<Arc<LoopbackChannel>>,
    responder: Option<Arc<LoopbackChannel>>,
}

#[derive(Clone, Default)]
pub struct LoopbackNetwork {
    pending: Arc<Mutex<HashMap<u64, Parked>>>,
    next_token: Arc<AtomicU64>,
}

impl LoopbackNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connector(&self) -> LoopbackConnector {
        LoopbackConnector {
            network: self.clone(),
        }
    }

    /// Handshakes started but not yet fully claimed by both sides.
    pub fn pending(&self) -> usize {
        self.pending.lock().map(|p| p.len()).unwrap_or(0)
    }

    fn park(&self) -> u64 {
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        let (initiator, responder) = LoopbackChannel::pair();
        if let Ok(mut pending) = self.pending.lock() {
            pending.insert(
                token,
                Parked {
                    initiator: Some(initiator),
                    responder: Some(responder),
                },
            );
        }
        token
    }

    fn claim(&self, token: u64, initiator: bool) -> Option<Arc<LoopbackChannel>> {
        let mut pending = self.pending.lock().ok()?;
        let parked = pending.get_mut(&token)?;
        let half = if initiator {
            parked.initiator.take()
        } else {
            parked.responder.take()
        };
        if parked.initiator.is_none() && parked.responder.is_none() {
            pending.remove(&token);
        }
        half
    }
}

fn token_of(payload: &Value, kind: &str) -> Result<u64, ChannelError> {
    if payload.get("type").and_then(Value::as_str) != Some(kind) {
        return Err(ChannelError::NegotiationFailed(format!("expected {kind} payload")));
    }
    payload
        .get("token")
        .and_then(Value::as_u64)
        .ok_or_else(|| ChannelError::NegotiationFailed("missing token".into()))
}

// ── Connector ─────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct LoopbackConnector {
    network: LoopbackNetwork,
}

#[async_trait]
impl PeerConnector for LoopbackConnector {
    async fn create_offer(&self, remote: &PeerId) -> Result<Value, ChannelError> {
        let token = self.network.park();
        tracing::trace!(remote = %remote, token, "loopback offer");
        Ok(json!({ "type": "offer", "token": token }))
    }

    async fn accept_offer(
        &self,
        from: &PeerId,
        offer: &Value,
    ) -> Result<(Arc<dyn DataChannel>, Value), ChannelError> {
        let token = token_of(offer, "offer")?;
        let channel = self
            .network
            .claim(token, false)
            .ok_or_else(|| ChannelError::NegotiationFailed(format!("unknown offer {token}")))?;
        tracing::trace!(from = %from, token, "loopback answer");
        Ok((channel, json!({ "type": "answer", "token": token })))
    }

    fn answers(&self, offer: &Value, answer: &Value) -> bool {
        matches!(
            (token_of(offer, "offer"), token_of(answer, "answer")),
            (Ok(o), Ok(a)) if o == a
        )
    }

    async fn complete(
        &self,
        remote: &PeerId,
        answer: &Value,
    ) -> Result<Arc<dyn DataChannel>, ChannelError> {
        let token = token_of(answer, "answer")?;
        let channel = self
            .network
            .claim(token, true)
            .ok_or_else(|| ChannelError::NegotiationFailed(format!("unknown answer {token}")))?;
        tracing::trace!(remote = %remote, token, "loopback connected");
        Ok(channel)
    }
}
