//! Requester side of an exchange: match, offer, send the request, await the reply.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::sync::mpsc;

use peerai_core::{ClientEvent, PeerId};

use crate::channel::{ChannelError, DataChannel};
use crate::client::PeerClient;
use crate::compute::{TaskReply, TaskRequest};
use crate::error::PeerError;
use crate::state::{Role, Trigger};

pub(crate) async fn run(
    client: &PeerClient,
    request: TaskRequest,
    deadline: Option<Duration>,
) -> Result<TaskReply, PeerError> {
    let started = Instant::now();
    let helper = within(deadline, client.match_helper()).await??;
    let remaining = deadline.map(|d| d.saturating_sub(started.elapsed()));

    let mut ticket = client.sessions().open(helper, Role::Initiator);
    let mut flow = Initiator {
        client,
        remote: ticket.remote.clone(),
        generation: ticket.generation,
        answers: ticket.answer.take(),
        channel: None,
    };

    let outcome = tokio::select! {
        Ok(()) = &mut ticket.cancel => Err(PeerError::Superseded),
        r = within(remaining, flow.exchange(request)) => r.and_then(|r| r),
    };

    if let Some(channel) = flow.channel.take() {
        channel.close().await;
    }

    match &outcome {
        Ok(reply) => {
            tracing::info!(helper = %flow.remote, failed = reply.is_error(), "exchange complete")
        }
        Err(PeerError::Superseded) => {
            tracing::debug!(helper = %flow.remote, generation = flow.generation, "exchange superseded")
        }
        Err(e) => {
            tracing::warn!(helper = %flow.remote, error = %e, "exchange failed");
            client.sessions().fail(&flow.remote, flow.generation);
        }
    }
    outcome
}

async fn within<F: Future>(deadline: Option<Duration>, fut: F) -> Result<F::Output, PeerError> {
    match deadline {
        Some(d) => tokio::time::timeout(d, fut)
            .await
            .map_err(|_| PeerError::Timeout),
        None => Ok(fut.await),
    }
}

struct Initiator<'a> {
    client: &'a PeerClient,
    remote: PeerId,
    generation: u64,
    answers: Option<mpsc::UnboundedReceiver<Value>>,
    channel: Option<Arc<dyn DataChannel>>,
}

impl Initiator<'_> {
    async fn exchange(&mut self, request: TaskRequest) -> Result<TaskReply, PeerError> {
        let sessions = self.client.sessions();
        let connector = self.client.connector();

        let offer = connector.create_offer(&self.remote).await?;
        sessions.advance(&self.remote, self.generation, Trigger::OfferSent)?;
        self.client.signal(ClientEvent::Offer {
            to: self.remote.clone(),
            offer: offer.clone(),
        })?;

        let answer = self.await_answer(&offer).await?;
        let channel = connector.complete(&self.remote, &answer).await?;
        self.channel = Some(channel.clone());
        sessions.advance(&self.remote, self.generation, Trigger::AnswerReceived)?;

        sessions.advance(&self.remote, self.generation, Trigger::RequestSent)?;
        channel.send(serde_json::to_vec(&request)?).await?;

        let data = channel.recv().await.ok_or(ChannelError::Closed)?;
        let reply: TaskReply = serde_json::from_slice(&data)?;
        sessions.advance(&self.remote, self.generation, Trigger::ReplyReceived)?;

        // Report failures never discard a received reply.
        if let Err(e) = self.client.signal(ClientEvent::ComputationCompleted {
            helper_id: self.remote.clone(),
        }) {
            tracing::warn!(helper = %self.remote, error = %e, "completion report not sent");
        }
        Ok(reply)
    }

    /// Next answer to `offer`, skipping answers left over from earlier offers.
    async fn await_answer(&mut self, offer: &Value) -> Result<Value, PeerError> {
        let answers = self.answers.as_mut().ok_or(PeerError::Superseded)?;
        loop {
            let answer = answers.recv().await.ok_or(PeerError::Superseded)?;
            if self.client.connector().answers(offer, &answer) {
                return Ok(answer);
            }
            tracing::debug!(helper = %self.remote, generation = self.generation, "stale answer skipped");
        }
    }
}
