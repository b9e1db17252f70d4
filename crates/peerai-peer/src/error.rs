use thiserror::Error;

use crate::channel::ChannelError;
use crate::state::InvalidTransition;

#[derive(Debug, Error)]
pub enum PeerError {
    #[error("no capable peer available")]
    Unavailable,
    #[error("channel: {0}")]
    Channel(#[from] ChannelError),
    #[error("signaling: {0}")]
    Signaling(String),
    #[error("protocol: {0}")]
    Protocol(String),
    #[error("exchange timed out")]
    Timeout,
    #[error("session superseded")]
    Superseded,
    #[error("disconnected from signaling server")]
    Disconnected,
    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),
}

impl From<serde_json::Error> for PeerError {
    fn from(e: serde_json::Error) -> Self {
        PeerError::Protocol(e.to_string())
    }
}
