//! peerai integration test harness.
//!
//! Every test starts its own broker and HTTP server on an ephemeral
//! loopback port and talks to it over real WebSockets:
//!
//!   cargo test --test integration
//!
//! Tests never share a server, so they can run in parallel.

mod api;
mod exchange;
mod infra;
mod protocol;

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use peerai_api::ApiState;
use peerai_core::config::{MatchmakingConfig, PeerConfig, ServerConfig};
use peerai_core::{ClientEvent, PeerId, ServerEvent};
use peerai_services::Broker;

/// How long a test waits for any single server event.
pub const RECV_TIMEOUT: Duration = Duration::from_secs(5);

// ── Server ────────────────────────────────────────────────────────────────────

pub struct TestServer {
    pub addr: SocketAddr,
    shutdown: broadcast::Sender<()>,
    server: JoinHandle<()>,
}

impl TestServer {
    pub async fn start() -> Result<Self> {
        Self::with_matchmaking(MatchmakingConfig::default()).await
    }

    pub async fn with_matchmaking(matchmaking: MatchmakingConfig) -> Result<Self> {
        let (shutdown, _) = broadcast::channel(1);
        let (broker, handle) = Broker::new(&matchmaking, shutdown.subscribe());
        tokio::spawn(broker.run());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .context("failed to bind test listener")?;
        let addr = listener.local_addr()?;
        let server = tokio::spawn(async move {
            let state = ApiState { broker: handle };
            if let Err(e) = peerai_api::serve_on(listener, state, &ServerConfig::default()).await {
                eprintln!("test server exited: {e:#}");
            }
        });

        Ok(Self {
            addr,
            shutdown,
            server,
        })
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }

    pub fn api_url(&self, path: &str) -> String {
        format!("http://{}/api{}", self.addr, path)
    }

    /// Peer settings pointing at this server.
    pub fn peer_config(&self, capable: bool) -> PeerConfig {
        PeerConfig {
            server_url: self.ws_url(),
            capable,
            exchange_timeout_secs: 10,
            ..PeerConfig::default()
        }
    }

    pub async fn get_json(&self, path: &str) -> Result<serde_json::Value> {
        let url = self.api_url(path);
        reqwest::get(&url)
            .await
            .with_context(|| format!("GET {url}"))?
            .error_for_status()?
            .json()
            .await
            .context("failed to parse response")
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        let _ = self.shutdown.send(());
        self.server.abort();
    }
}

// ── Raw WebSocket peer ────────────────────────────────────────────────────────

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// A peer speaking the wire protocol directly, for protocol-level tests.
pub struct WsPeer {
    pub id: PeerId,
    ws: WsStream,
}

impl WsPeer {
    /// Connect and consume the welcome frame.
    pub async fn connect(server: &TestServer) -> Result<Self> {
        let (mut ws, _) = connect_async(server.ws_url())
            .await
            .context("websocket connect failed")?;
        match next_event(&mut ws).await? {
            ServerEvent::Welcome { id } => Ok(Self { id, ws }),
            other => bail!("expected welcome, got {other:?}"),
        }
    }

    pub async fn send(&mut self, event: ClientEvent) -> Result<()> {
        let text = serde_json::to_string(&event)?;
        self.send_raw(&text).await
    }

    pub async fn send_raw(&mut self, text: &str) -> Result<()> {
        self.ws.send(Message::Text(text.into())).await?;
        Ok(())
    }

    pub async fn join(&mut self, capable: bool) -> Result<()> {
        self.send(ClientEvent::Join { capable }).await
    }

    pub async fn recv(&mut self) -> Result<ServerEvent> {
        next_event(&mut self.ws).await
    }

    /// Skip events until one matches.
    pub async fn recv_until(&mut self, pred: impl Fn(&ServerEvent) -> bool) -> Result<ServerEvent> {
        loop {
            let event = self.recv().await?;
            if pred(&event) {
                return Ok(event);
            }
        }
    }

    /// Fails if anything arrives within `wait`.
    pub async fn expect_silence(&mut self, wait: Duration) -> Result<()> {
        match tokio::time::timeout(wait, next_event(&mut self.ws)).await {
            Err(_) => Ok(()),
            Ok(Ok(event)) => bail!("unexpected event: {event:?}"),
            Ok(Err(e)) => Err(e),
        }
    }

    pub async fn close(mut self) -> Result<()> {
        self.ws.close(None).await?;
        Ok(())
    }
}

async fn next_event(ws: &mut WsStream) -> Result<ServerEvent> {
    loop {
        let frame = tokio::time::timeout(RECV_TIMEOUT, ws.next())
            .await
            .context("timed out waiting for server event")?
            .context("connection closed")??;
        if let Message::Text(text) = frame {
            return serde_json::from_str(text.as_str()).context("bad server event");
        }
    }
}

/// Wait until `peer` has been told that `helper` joined as capable.
pub async fn seen_capable(peer: &mut WsPeer, helper: &PeerId) -> Result<()> {
    peer.recv_until(|e| match e {
        ServerEvent::UsersUpdate(s) => s.get(helper).is_some_and(|r| r.capable),
        _ => false,
    })
    .await?;
    Ok(())
}

/// Poll `/api/status` until `pred` holds.
pub async fn wait_for_status(
    server: &TestServer,
    pred: impl Fn(&serde_json::Value) -> bool,
) -> Result<serde_json::Value> {
    let deadline = tokio::time::Instant::now() + RECV_TIMEOUT;
    loop {
        let status = server.get_json("/status").await?;
        if pred(&status) {
            return Ok(status);
        }
        if tokio::time::Instant::now() >= deadline {
            bail!("status never matched, last: {status}");
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
