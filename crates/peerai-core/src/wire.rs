//! Signaling wire protocol: the JSON events exchanged over the `/ws` socket.
//!
//! Every frame is a single JSON object `{"event": <name>, "data": <payload>}`.
//! Peer-originated frames decode as [`ClientEvent`], server-originated frames
//! as [`ServerEvent`]. Offer and answer payloads are opaque and are relayed
//! without inspection.

use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

// ── Identifiers ───────────────────────────────────────────────────────────────

/// Opaque connection identifier, assigned by the server on connect.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(String);

impl PeerId {
    /// Fresh random identifier: 64 random bits, hex-encoded.
    pub fn random() -> Self {
        let bytes: [u8; 8] = rand::random();
        Self(hex::encode(bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PeerId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for PeerId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

// ── Registry records ──────────────────────────────────────────────────────────

/// Presence and load counters for one connected peer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerRecord {
    /// Able to run inference locally, i.e. eligible as a helper.
    pub capable: bool,
    /// In-flight tasks assigned to this peer as helper. Never negative.
    pub load: u32,
    /// Completed tasks this peer has serviced.
    pub helped: u64,
}

/// Full registry table in insertion order.
///
/// Serializes as a JSON object whose keys keep the registry's order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistrySnapshot {
    entries: Vec<(PeerId, PeerRecord)>,
}

impl RegistrySnapshot {
    pub fn new(entries: Vec<(PeerId, PeerRecord)>) -> Self {
        Self { entries }
    }

    pub fn get(&self, id: &PeerId) -> Option<&PeerRecord> {
        self.entries.iter().find(|(k, _)| k == id).map(|(_, r)| r)
    }

    pub fn iter(&self) -> impl Iterator<Item = &(PeerId, PeerRecord)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Serialize for RegistrySnapshot {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (id, record) in &self.entries {
            map.serialize_entry(id, record)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for RegistrySnapshot {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct SnapshotVisitor;

        impl<'de> Visitor<'de> for SnapshotVisitor {
            type Value = RegistrySnapshot;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of peer id to peer record")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((id, record)) = access.next_entry::<PeerId, PeerRecord>()? {
                    entries.push((id, record));
                }
                Ok(RegistrySnapshot { entries })
            }
        }

        deserializer.deserialize_map(SnapshotVisitor)
    }
}

// ── Signaling ─────────────────────────────────────────────────────────────────

/// The two negotiation message kinds the relay forwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    Offer,
    Answer,
}

/// A negotiation message addressed to another peer. Never stored.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalingEnvelope {
    pub to: PeerId,
    pub kind: SignalKind,
    /// Opaque to the server.
    pub payload: serde_json::Value,
}

// ── Events ────────────────────────────────────────────────────────────────────

/// Events sent by a peer to the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ClientEvent {
    Join {
        capable: bool,
    },
    RequestComputation,
    Offer {
        to: PeerId,
        offer: serde_json::Value,
    },
    Answer {
        to: PeerId,
        answer: serde_json::Value,
    },
    ComputationCompleted {
        #[serde(rename = "helperId")]
        helper_id: PeerId,
    },
}

impl ClientEvent {
    /// The signaling envelope carried by an offer or answer, if any.
    pub fn into_envelope(self) -> Option<SignalingEnvelope> {
        match self {
            ClientEvent::Offer { to, offer } => Some(SignalingEnvelope {
                to,
                kind: SignalKind::Offer,
                payload: offer,
            }),
            ClientEvent::Answer { to, answer } => Some(SignalingEnvelope {
                to,
                kind: SignalKind::Answer,
                payload: answer,
            }),
            _ => None,
        }
    }

    /// Event name as it appears on the wire, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::Join { .. } => "join",
            ClientEvent::RequestComputation => "requestComputation",
            ClientEvent::Offer { .. } => "offer",
            ClientEvent::Answer { .. } => "answer",
            ClientEvent::ComputationCompleted { .. } => "computationCompleted",
        }
    }
}

/// Events sent by the server to one or all peers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ServerEvent {
    /// First frame on every connection: the id the server assigned.
    Welcome { id: PeerId },
    OnlineUsersCount(usize),
    UsersUpdate(RegistrySnapshot),
    /// Matchmaking result. `None` means no helper is available.
    PeerId {
        #[serde(rename = "peerId")]
        peer_id: Option<PeerId>,
    },
    Offer {
        from: PeerId,
        offer: serde_json::Value,
    },
    Answer {
        from: PeerId,
        answer: serde_json::Value,
    },
}

impl ServerEvent {
    /// Build the relayed form of an envelope, tagged with its sender.
    pub fn relayed(from: PeerId, envelope: SignalingEnvelope) -> Self {
        match envelope.kind {
            SignalKind::Offer => ServerEvent::Offer {
                from,
                offer: envelope.payload,
            },
            SignalKind::Answer => ServerEvent::Answer {
                from,
                answer: envelope.payload,
            },
        }
    }
}
