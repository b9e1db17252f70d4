//! Live peer sessions, at most one per remote id.
//!
//! Opening a session for a remote that already has one replaces it: the old
//! entry is marked `Closed` and its task is told to stop before the new
//! session makes any transition. Each session carries a generation number;
//! a task whose generation no longer matches the table is superseded.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{broadcast, mpsc, oneshot};

use peerai_core::PeerId;

use crate::error::PeerError;
use crate::state::{transition, Role, SessionState, Trigger};

const EVENT_CAPACITY: usize = 256;

/// A state change of one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionEvent {
    pub remote: PeerId,
    pub role: Role,
    pub generation: u64,
    pub state: SessionState,
}

struct Entry {
    role: Role,
    generation: u64,
    state: SessionState,
    cancel: Option<oneshot::Sender<()>>,
    answer: Option<mpsc::UnboundedSender<Value>>,
}

/// Handed to the task driving a freshly opened session.
pub(crate) struct SessionTicket {
    pub remote: PeerId,
    pub generation: u64,
    pub cancel: oneshot::Receiver<()>,
    pub answer: Option<mpsc::UnboundedReceiver<Value>>,
}

struct Inner {
    entries: DashMap<PeerId, Entry>,
    next_generation: AtomicU64,
    events: broadcast::Sender<SessionEvent>,
}

#[derive(Clone)]
pub struct SessionTable {
    inner: Arc<Inner>,
}

impl Default for SessionTable {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionTable {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                entries: DashMap::new(),
                next_generation: AtomicU64::new(1),
                events,
            }),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }

    /// Current role, generation and state of the session with `remote`.
    pub fn lookup(&self, remote: &PeerId) -> Option<SessionEvent> {
        self.inner.entries.get(remote).map(|e| SessionEvent {
            remote: remote.clone(),
            role: e.role,
            generation: e.generation,
            state: e.state,
        })
    }

    /// Create a session in `Idle`, superseding any live one for `remote`.
    pub(crate) fn open(&self, remote: PeerId, role: Role) -> SessionTicket {
        let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);
        let (cancel_tx, cancel_rx) = oneshot::channel();
        let (answer_tx, answer_rx) = match role {
            Role::Initiator => {
                let (tx, rx) = mpsc::unbounded_channel();
                (Some(tx), Some(rx))
            }
            Role::Responder => (None, None),
        };

        let entry = Entry {
            role,
            generation,
            state: SessionState::Idle,
            cancel: Some(cancel_tx),
            answer: answer_tx,
        };

        if let Some(old) = self.inner.entries.insert(remote.clone(), entry) {
            self.supersede(&remote, old);
        }
        self.emit(&remote, role, generation, SessionState::Idle);
        tracing::debug!(remote = %remote, ?role, generation, "session opened");

        SessionTicket {
            remote,
            generation,
            cancel: cancel_rx,
            answer: answer_rx,
        }
    }

    fn supersede(&self, remote: &PeerId, mut old: Entry) {
        if let Ok(state) = transition(old.role, old.state, Trigger::Superseded) {
            self.emit(remote, old.role, old.generation, state);
        }
        if let Some(cancel) = old.cancel.take() {
            let _ = cancel.send(());
        }
        tracing::info!(remote = %remote, generation = old.generation, "session superseded");
    }

    /// Apply `trigger` to the session `(remote, generation)`.
    ///
    /// Terminal states remove the entry. A missing entry or a generation
    /// mismatch means the session was superseded.
    pub(crate) fn advance(
        &self,
        remote: &PeerId,
        generation: u64,
        trigger: Trigger,
    ) -> Result<SessionState, PeerError> {
        let next = {
            let mut entry = self
                .inner
                .entries
                .get_mut(remote)
                .ok_or(PeerError::Superseded)?;
            if entry.generation != generation {
                return Err(PeerError::Superseded);
            }
            let next = transition(entry.role, entry.state, trigger)?;
            entry.state = next;
            self.emit(remote, entry.role, generation, next);
            next
        };

        if next.is_terminal() {
            self.inner
                .entries
                .remove_if(remote, |_, e| e.generation == generation);
        }
        Ok(next)
    }

    /// Move a live session to `Errored` and drop it. No-op if it is gone.
    pub(crate) fn fail(&self, remote: &PeerId, generation: u64) {
        if self.advance(remote, generation, Trigger::Failed).is_ok() {
            tracing::debug!(remote = %remote, generation, "session errored");
        }
    }

    /// Queue an answer for the initiator session negotiating with `from`.
    ///
    /// Answers to an earlier offer can still be in flight after a
    /// supersede, so the session task checks each one against its own offer.
    pub(crate) fn deliver_answer(&self, from: &PeerId, answer: Value) -> bool {
        let Some(entry) = self.inner.entries.get(from) else {
            return false;
        };
        if entry.role != Role::Initiator || entry.state != SessionState::Negotiating {
            return false;
        }
        entry
            .answer
            .as_ref()
            .is_some_and(|tx| tx.send(answer).is_ok())
    }

    fn emit(&self, remote: &PeerId, role: Role, generation: u64, state: SessionState) {
        let _ = self.inner.events.send(SessionEvent {
            remote: remote.clone(),
            role,
            generation,
            state,
        });
    }
}
