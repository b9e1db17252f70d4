//! `/ws`: one WebSocket per peer, bridged to the broker.
//!
//! Inbound text frames are decoded as `ClientEvent`s and dispatched with the
//! connection's id. The broker's outbound queue for this connection is
//! drained by a writer task. Closing the socket is the `disconnect` event.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use peerai_core::{ClientEvent, ServerEvent};

use super::ApiState;

pub async fn handle_ws(ws: WebSocketUpgrade, State(state): State<ApiState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: ApiState) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (outbound, mut rx) = mpsc::unbounded_channel::<ServerEvent>();

    let id = match state.broker.connect(outbound).await {
        Ok(id) => id,
        Err(e) => {
            tracing::warn!(error = %e, "rejecting connection");
            return;
        }
    };

    let writer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let text = match serde_json::to_string(&event) {
                Ok(t) => t,
                Err(e) => {
                    tracing::warn!(error = %e, "failed to encode server event");
                    continue;
                }
            };
            if ws_tx.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(result) = ws_rx.next().await {
        match result {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientEvent>(text.as_str()) {
                Ok(event) => {
                    tracing::trace!(peer = %id, event = event.name(), "event received");
                    if state.broker.dispatch(id.clone(), event).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!(peer = %id, error = %e, "malformed event ignored");
                }
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => {} // ping/pong handled by axum, binary unused
            Err(e) => {
                tracing::debug!(peer = %id, error = %e, "socket error");
                break;
            }
        }
    }

    // The broker drops our outbound queue on disconnect, which ends the writer.
    let _ = state.broker.disconnect(id);
    let _ = writer.await;
}
