//! Client side of peerai: the per-remote session state machine and the
//! pieces it is built from.
//!
//! A `PeerClient` either asks the server for a helper and drives an
//! initiator session against it, or (when capable) answers offers with a
//! responder session that runs the request through its `Compute`.

pub mod channel;
pub mod client;
pub mod compute;
pub mod error;
mod initiator;
pub mod loopback;
mod responder;
pub mod session;
pub mod signaling;
pub mod state;
pub mod store;

pub use channel::{ChannelError, DataChannel, PeerConnector};
pub use client::{PeerClient, PresenceView};
pub use compute::{
    ChatRole, Compute, ComputeError, PromptMessage, TaskReply, TaskRequest, FALLBACK_REPLY,
};
pub use error::PeerError;
pub use loopback::{LoopbackChannel, LoopbackConnector, LoopbackNetwork};
pub use session::{SessionEvent, SessionTable};
pub use signaling::{Signaler, SignalingClient};
pub use state::{transition, InvalidTransition, Role, SessionState, Trigger};
pub use store::{build_request, ChatMessage, InMemoryMessageStore, MessageStore};
