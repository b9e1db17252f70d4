//! The local peer: reacts to server events and drives exchanges.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{oneshot, watch};

use peerai_core::config::PeerConfig;
use peerai_core::{ClientEvent, PeerId, RegistrySnapshot, ServerEvent};

use crate::channel::PeerConnector;
use crate::compute::{Compute, TaskReply, TaskRequest};
use crate::error::PeerError;
use crate::session::SessionTable;
use crate::signaling::Signaler;
use crate::state::Role;
use crate::{initiator, responder};

/// What the server last told us about who is online.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PresenceView {
    pub online: usize,
    pub peers: RegistrySnapshot,
}

struct Inner {
    capable: bool,
    exchange_timeout: Duration,
    signaler: Arc<dyn Signaler>,
    connector: Arc<dyn PeerConnector>,
    compute: Option<Arc<dyn Compute>>,
    sessions: SessionTable,
    local_id: watch::Sender<Option<PeerId>>,
    presence: watch::Sender<PresenceView>,
    /// Outstanding match requests, answered by the server in order.
    matches: Mutex<VecDeque<oneshot::Sender<Option<PeerId>>>>,
}

#[derive(Clone)]
pub struct PeerClient {
    inner: Arc<Inner>,
}

impl PeerClient {
    pub fn new(
        settings: &PeerConfig,
        signaler: Arc<dyn Signaler>,
        connector: Arc<dyn PeerConnector>,
        compute: Option<Arc<dyn Compute>>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                capable: settings.capable,
                exchange_timeout: Duration::from_secs(settings.exchange_timeout_secs),
                signaler,
                connector,
                compute,
                sessions: SessionTable::new(),
                local_id: watch::channel(None).0,
                presence: watch::channel(PresenceView::default()).0,
                matches: Mutex::new(VecDeque::new()),
            }),
        }
    }

    pub fn is_capable(&self) -> bool {
        self.inner.capable
    }

    pub fn local_id(&self) -> Option<PeerId> {
        self.inner.local_id.borrow().clone()
    }

    /// Wait until the server has assigned us an id.
    pub async fn assigned_id(&self) -> Result<PeerId, PeerError> {
        let mut rx = self.inner.local_id.subscribe();
        let id = rx
            .wait_for(Option::is_some)
            .await
            .map_err(|_| PeerError::Disconnected)?;
        id.clone().ok_or(PeerError::Disconnected)
    }

    pub fn presence(&self) -> watch::Receiver<PresenceView> {
        self.inner.presence.subscribe()
    }

    pub fn sessions(&self) -> &SessionTable {
        &self.inner.sessions
    }

    /// Announce ourselves and our capability.
    pub fn join(&self) -> Result<(), PeerError> {
        self.signal(ClientEvent::Join {
            capable: self.inner.capable,
        })
    }

    pub async fn request_computation(&self, request: TaskRequest) -> Result<TaskReply, PeerError> {
        initiator::run(self, request, None).await
    }

    /// Like `request_computation`, bounded by the configured exchange timeout.
    pub async fn request_computation_with_timeout(
        &self,
        request: TaskRequest,
    ) -> Result<TaskReply, PeerError> {
        self.request_computation_within(request, self.inner.exchange_timeout)
            .await
    }

    pub async fn request_computation_within(
        &self,
        request: TaskRequest,
        deadline: Duration,
    ) -> Result<TaskReply, PeerError> {
        initiator::run(self, request, Some(deadline)).await
    }

    pub fn handle_server_event(&self, event: ServerEvent) {
        match event {
            ServerEvent::Welcome { id } => {
                tracing::info!(id = %id, "assigned peer id");
                self.inner.local_id.send_replace(Some(id));
            }
            ServerEvent::OnlineUsersCount(online) => {
                self.inner.presence.send_modify(|p| p.online = online);
            }
            ServerEvent::UsersUpdate(peers) => {
                self.inner.presence.send_modify(|p| p.peers = peers);
            }
            ServerEvent::PeerId { peer_id } => {
                let waiter = self.lock_matches().pop_front();
                match waiter {
                    Some(tx) => {
                        let _ = tx.send(peer_id);
                    }
                    None => tracing::debug!("unsolicited match result dropped"),
                }
            }
            ServerEvent::Offer { from, offer } => {
                let Some(compute) = self.responder_compute() else {
                    tracing::warn!(from = %from, "offer ignored: not a capable peer");
                    return;
                };
                let ticket = self.inner.sessions.open(from, Role::Responder);
                tokio::spawn(responder::run(self.clone(), compute, ticket, offer));
            }
            ServerEvent::Answer { from, answer } => {
                if !self.inner.sessions.deliver_answer(&from, answer) {
                    tracing::debug!(from = %from, "answer without pending offer dropped");
                }
            }
        }
    }

    /// The signaling connection is gone; fail pending match requests.
    pub fn handle_disconnect(&self) {
        let dropped = self.lock_matches().drain(..).count();
        tracing::info!(pending_matches = dropped, "signaling disconnected");
    }

    // ── Crate-internal ───────────────────────────────────────────────────────

    pub(crate) fn signal(&self, event: ClientEvent) -> Result<(), PeerError> {
        self.inner.signaler.send(event)
    }

    pub(crate) fn connector(&self) -> &dyn PeerConnector {
        self.inner.connector.as_ref()
    }

    /// Ask the server for a helper. `None` from the server is `Unavailable`.
    pub(crate) async fn match_helper(&self) -> Result<PeerId, PeerError> {
        let rx = {
            let mut waiters = self.lock_matches();
            self.signal(ClientEvent::RequestComputation)?;
            let (tx, rx) = oneshot::channel();
            waiters.push_back(tx);
            rx
        };
        rx.await
            .map_err(|_| PeerError::Disconnected)?
            .ok_or(PeerError::Unavailable)
    }

    fn responder_compute(&self) -> Option<Arc<dyn Compute>> {
        if !self.inner.capable {
            return None;
        }
        self.inner.compute.clone()
    }

    fn lock_matches(&self) -> std::sync::MutexGuard<'_, VecDeque<oneshot::Sender<Option<PeerId>>>> {
        self.inner
            .matches
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
