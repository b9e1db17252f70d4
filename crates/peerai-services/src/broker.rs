//! Broker: the single task that owns the registry.
//!
//! Connections never touch registry state directly. They send
//! `BrokerCommand`s through a `BrokerHandle`; the broker applies them one at
//! a time, in arrival order, and broadcasts the result of every mutation
//! before taking the next command.

use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::{broadcast, mpsc, oneshot};

use peerai_core::config::MatchmakingConfig;
use peerai_core::{ClientEvent, PeerId, RegistrySnapshot, ServerEvent};

use crate::matchmaker::find_helper;
use crate::presence::{Outbound, Presence};
use crate::registry::Registry;
use crate::relay::relay;
use crate::reservation::ReservationLedger;

#[derive(Debug, Clone, thiserror::Error)]
pub enum BrokerError {
    #[error("broker is not running")]
    Stopped,
}

pub enum BrokerCommand {
    /// A transport connection opened. Replies with its assigned id.
    Connect {
        outbound: Outbound,
        reply: oneshot::Sender<PeerId>,
    },
    /// A decoded event from a live connection.
    Event { from: PeerId, event: ClientEvent },
    /// The transport connection closed.
    Disconnect { id: PeerId },
    Status { reply: oneshot::Sender<BrokerStatus> },
}

/// Point-in-time view of the broker for the HTTP API.
#[derive(Debug, Clone, Serialize)]
pub struct BrokerStatus {
    pub online: usize,
    pub capable: usize,
    pub total_load: u64,
    pub total_helped: u64,
    pub reservations: usize,
    pub uptime_secs: u64,
    pub peers: RegistrySnapshot,
}

// ── Handle ────────────────────────────────────────────────────────────────────

/// Cheap, clonable sender side of the broker's command queue.
#[derive(Clone)]
pub struct BrokerHandle {
    tx: mpsc::UnboundedSender<BrokerCommand>,
}

impl BrokerHandle {
    pub async fn connect(&self, outbound: Outbound) -> Result<PeerId, BrokerError> {
        let (reply, rx) = oneshot::channel();
        self.send(BrokerCommand::Connect { outbound, reply })?;
        rx.await.map_err(|_| BrokerError::Stopped)
    }

    pub fn dispatch(&self, from: PeerId, event: ClientEvent) -> Result<(), BrokerError> {
        self.send(BrokerCommand::Event { from, event })
    }

    pub fn disconnect(&self, id: PeerId) -> Result<(), BrokerError> {
        self.send(BrokerCommand::Disconnect { id })
    }

    pub async fn status(&self) -> Result<BrokerStatus, BrokerError> {
        let (reply, rx) = oneshot::channel();
        self.send(BrokerCommand::Status { reply })?;
        rx.await.map_err(|_| BrokerError::Stopped)
    }

    fn send(&self, cmd: BrokerCommand) -> Result<(), BrokerError> {
        self.tx.send(cmd).map_err(|_| BrokerError::Stopped)
    }
}

// ── Broker ────────────────────────────────────────────────────────────────────

pub struct Broker {
    registry: Registry,
    presence: Presence,
    reservations: ReservationLedger,
    commands: mpsc::UnboundedReceiver<BrokerCommand>,
    reap_interval: Duration,
    started_at: Instant,
    shutdown: broadcast::Receiver<()>,
}

impl Broker {
    pub fn new(
        config: &MatchmakingConfig,
        shutdown: broadcast::Receiver<()>,
    ) -> (Self, BrokerHandle) {
        let (tx, commands) = mpsc::unbounded_channel();
        let broker = Self {
            registry: Registry::new(),
            presence: Presence::new(),
            reservations: ReservationLedger::new(config.reservation_ttl_secs),
            commands,
            reap_interval: Duration::from_secs(config.reap_interval_secs.max(1)),
            started_at: Instant::now(),
            shutdown,
        };
        (broker, BrokerHandle { tx })
    }

    pub async fn run(mut self) {
        let mut reap = tokio::time::interval(self.reap_interval);
        tracing::info!(
            lease = self.reservations.lease_enabled(),
            "broker started"
        );

        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    tracing::info!("broker shutting down");
                    return;
                }

                cmd = self.commands.recv() => match cmd {
                    Some(cmd) => self.apply(cmd),
                    None => {
                        tracing::info!("all broker handles dropped, stopping");
                        return;
                    }
                },

                _ = reap.tick(), if self.reservations.lease_enabled() => {
                    self.reap_expired(Instant::now());
                }
            }
        }
    }

    /// Apply one command to the registry and emit its broadcasts.
    pub fn apply(&mut self, cmd: BrokerCommand) {
        match cmd {
            BrokerCommand::Connect { outbound, reply } => {
                let id = self.on_connect(outbound);
                let _ = reply.send(id);
            }
            BrokerCommand::Event { from, event } => self.on_event(from, event),
            BrokerCommand::Disconnect { id } => self.on_disconnect(&id),
            BrokerCommand::Status { reply } => {
                let _ = reply.send(self.status());
            }
        }
    }

    fn on_connect(&mut self, outbound: Outbound) -> PeerId {
        let id = loop {
            let candidate = PeerId::random();
            if !self.registry.contains(&candidate) {
                break candidate;
            }
        };
        self.registry.register(id.clone());
        self.presence.attach(id.clone(), outbound);
        self.presence
            .send_to(&id, ServerEvent::Welcome { id: id.clone() });
        tracing::info!(peer = %id, online = self.registry.len(), "peer connected");
        id
    }

    fn on_disconnect(&mut self, id: &PeerId) {
        self.presence.detach(id);
        if self.registry.remove(id).is_none() {
            return;
        }
        let dropped = self.reservations.forget(id);
        tracing::info!(
            peer = %id,
            online = self.registry.len(),
            dropped_reservations = dropped,
            "peer disconnected"
        );
        self.presence.publish_count(self.registry.len());
        self.presence.publish_snapshot(&self.registry);
    }

    fn on_event(&mut self, from: PeerId, event: ClientEvent) {
        if !self.registry.contains(&from) {
            tracing::debug!(peer = %from, event = event.name(), "event from unknown peer ignored");
            return;
        }

        match event {
            ClientEvent::Join { capable } => match self.registry.set_capability(&from, capable) {
                Some(online) => {
                    tracing::info!(peer = %from, capable, "peer joined");
                    self.presence.publish_count(online);
                    self.presence.publish_snapshot(&self.registry);
                }
                None => {
                    tracing::warn!(peer = %from, capable, "conflicting capability announcement ignored");
                }
            },

            ClientEvent::RequestComputation => match find_helper(&mut self.registry, &from) {
                Some(helper) => {
                    tracing::info!(requester = %from, helper = %helper, "helper matched");
                    self.reservations.open(from.clone(), helper.clone());
                    self.presence.send_to(
                        &from,
                        ServerEvent::PeerId {
                            peer_id: Some(helper),
                        },
                    );
                    self.presence.publish_snapshot(&self.registry);
                }
                None => {
                    tracing::info!(requester = %from, "no capable helper available");
                    self.presence
                        .send_to(&from, ServerEvent::PeerId { peer_id: None });
                }
            },

            ClientEvent::ComputationCompleted { helper_id } => {
                match self.registry.complete(&helper_id) {
                    Some(record) => {
                        self.reservations.close(&helper_id, &from);
                        tracing::info!(
                            helper = %helper_id,
                            reporter = %from,
                            load = record.load,
                            helped = record.helped,
                            "computation completed"
                        );
                        self.presence.publish_snapshot(&self.registry);
                    }
                    None => {
                        tracing::debug!(helper = %helper_id, "completion for unknown helper ignored");
                    }
                }
            }

            signal @ (ClientEvent::Offer { .. } | ClientEvent::Answer { .. }) => {
                if let Some(envelope) = signal.into_envelope() {
                    relay(&self.presence, &from, envelope);
                }
            }
        }
    }

    /// Release the load held by reservations whose lease ran out.
    fn reap_expired(&mut self, now: Instant) {
        for r in self.reservations.expire(now) {
            if let Some(load) = self.registry.decrement_load(&r.helper) {
                tracing::warn!(
                    requester = %r.requester,
                    helper = %r.helper,
                    load,
                    "reservation lease expired, load released"
                );
                self.presence.publish_snapshot(&self.registry);
            }
        }
    }

    pub fn status(&self) -> BrokerStatus {
        let mut capable = 0;
        let mut total_load = 0u64;
        let mut total_helped = 0u64;
        for (_, r) in self.registry.iter() {
            if r.capable {
                capable += 1;
            }
            total_load += u64::from(r.load);
            total_helped += r.helped;
        }
        BrokerStatus {
            online: self.registry.len(),
            capable,
            total_load,
            total_helped,
            reservations: self.reservations.len(),
            uptime_secs: self.started_at.elapsed().as_secs(),
            peers: self.registry.snapshot(),
        }
    }
}
