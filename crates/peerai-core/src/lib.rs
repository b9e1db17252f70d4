pub mod config;
pub mod wire;

pub use wire::{
    ClientEvent, PeerId, PeerRecord, RegistrySnapshot, ServerEvent, SignalKind, SignalingEnvelope,
};
