//! HTTP and WebSocket handlers.

pub mod status;
pub mod ws;

use peerai_services::BrokerHandle;

#[derive(Clone)]
pub struct ApiState {
    pub broker: BrokerHandle,
}

pub use status::{handle_peers, handle_status};
pub use ws::handle_ws;
