//! Connection to the signaling server.

use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};

use peerai_core::config::PeerConfig;
use peerai_core::{ClientEvent, ServerEvent};

use crate::channel::PeerConnector;
use crate::client::PeerClient;
use crate::compute::Compute;
use crate::error::PeerError;

/// Outbound half of the signaling connection.
pub trait Signaler: Send + Sync {
    fn send(&self, event: ClientEvent) -> Result<(), PeerError>;
}

impl Signaler for mpsc::UnboundedSender<ClientEvent> {
    fn send(&self, event: ClientEvent) -> Result<(), PeerError> {
        mpsc::UnboundedSender::send(self, event).map_err(|_| PeerError::Disconnected)
    }
}

/// A `PeerClient` wired to a live WebSocket.
///
/// Frames are pumped by two background tasks; both are aborted on drop.
pub struct SignalingClient {
    client: PeerClient,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl SignalingClient {
    pub async fn connect(
        settings: &PeerConfig,
        connector: Arc<dyn PeerConnector>,
        compute: Option<Arc<dyn Compute>>,
    ) -> Result<Self, PeerError> {
        let url = settings.server_url.as_str();
        let (ws_stream, _) = connect_async(url)
            .await
            .map_err(|e| PeerError::Signaling(e.to_string()))?;
        let (mut write, mut read) = ws_stream.split();
        tracing::info!(url, "connected to signaling server");

        let (tx, mut rx) = mpsc::unbounded_channel::<ClientEvent>();
        let client = PeerClient::new(settings, Arc::new(tx), connector, compute);

        let writer = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                let text = match serde_json::to_string(&event) {
                    Ok(t) => t,
                    Err(e) => {
                        tracing::warn!(error = %e, "failed to encode client event");
                        continue;
                    }
                };
                if let Err(e) = write.send(Message::Text(text.into())).await {
                    tracing::debug!(error = %e, "signaling write failed");
                    break;
                }
            }
            let _ = write.close().await;
        });

        let reader_client = client.clone();
        let reader = tokio::spawn(async move {
            while let Some(frame) = read.next().await {
                match frame {
                    Ok(Message::Text(text)) => {
                        match serde_json::from_str::<ServerEvent>(text.as_str()) {
                            Ok(event) => reader_client.handle_server_event(event),
                            Err(e) => tracing::warn!(error = %e, "malformed server event ignored"),
                        }
                    }
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        tracing::debug!(error = %e, "signaling read failed");
                        break;
                    }
                }
            }
            reader_client.handle_disconnect();
        });

        Ok(Self {
            client,
            reader,
            writer,
        })
    }

    pub fn client(&self) -> &PeerClient {
        &self.client
    }

    /// Resolves once the server closes the connection.
    pub async fn closed(&mut self) {
        let _ = (&mut self.reader).await;
    }
}

impl Drop for SignalingClient {
    fn drop(&mut self) {
        self.reader.abort();
        self.writer.abort();
    }
}
