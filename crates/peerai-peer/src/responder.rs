//! Helper side of an exchange: answer the offer, run the request, reply.

use std::sync::Arc;

use serde_json::Value;

use peerai_core::{ClientEvent, PeerId};

use crate::channel::{ChannelError, DataChannel};
use crate::client::PeerClient;
use crate::compute::{Compute, TaskReply, TaskRequest};
use crate::error::PeerError;
use crate::session::SessionTicket;
use crate::state::Trigger;

pub(crate) async fn run(
    client: PeerClient,
    compute: Arc<dyn Compute>,
    mut ticket: SessionTicket,
    offer: Value,
) {
    let mut flow = Responder {
        client: &client,
        remote: ticket.remote.clone(),
        generation: ticket.generation,
        channel: None,
    };

    let outcome = tokio::select! {
        Ok(()) = &mut ticket.cancel => Err(PeerError::Superseded),
        r = flow.exchange(compute.as_ref(), offer) => r,
    };

    if let Some(channel) = flow.channel.take() {
        channel.close().await;
    }

    match outcome {
        Ok(()) => tracing::info!(requester = %flow.remote, "request served"),
        Err(PeerError::Superseded) => {
            tracing::debug!(requester = %flow.remote, generation = flow.generation, "responder superseded")
        }
        Err(e) => {
            tracing::warn!(requester = %flow.remote, error = %e, "responder failed");
            client.sessions().fail(&flow.remote, flow.generation);
        }
    }
}

struct Responder<'a> {
    client: &'a PeerClient,
    remote: PeerId,
    generation: u64,
    channel: Option<Arc<dyn DataChannel>>,
}

impl Responder<'_> {
    async fn exchange(&mut self, compute: &dyn Compute, offer: Value) -> Result<(), PeerError> {
        let sessions = self.client.sessions();

        sessions.advance(&self.remote, self.generation, Trigger::OfferReceived)?;
        let (channel, answer) = self
            .client
            .connector()
            .accept_offer(&self.remote, &offer)
            .await?;
        self.channel = Some(channel.clone());
        self.client.signal(ClientEvent::Answer {
            to: self.remote.clone(),
            answer,
        })?;
        sessions.advance(&self.remote, self.generation, Trigger::AnswerSent)?;

        let data = channel.recv().await.ok_or(ChannelError::Closed)?;
        let request: TaskRequest = serde_json::from_slice(&data)?;
        sessions.advance(&self.remote, self.generation, Trigger::RequestReceived)?;

        let reply = match compute.compute(request).await {
            Ok(text) => TaskReply::ok(text),
            Err(e) => {
                tracing::warn!(requester = %self.remote, error = %e, "compute failed");
                TaskReply::failed(&e)
            }
        };
        channel.send(serde_json::to_vec(&reply)?).await?;
        sessions.advance(&self.remote, self.generation, Trigger::ReplySent)?;

        match self.client.local_id() {
            Some(own) => self
                .client
                .signal(ClientEvent::ComputationCompleted { helper_id: own })?,
            None => tracing::warn!("completion not reported: no id assigned yet"),
        }
        Ok(())
    }
}
