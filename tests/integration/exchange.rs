use crate::*;

use std::sync::Arc;

use async_trait::async_trait;
use peerai_peer::{
    build_request, ChatMessage, ChatRole, Compute, ComputeError, InMemoryMessageStore,
    LoopbackNetwork, MessageStore, PeerClient, PeerError, SignalingClient, TaskReply, TaskRequest,
    FALLBACK_REPLY,
};

/// Replies with how many messages it saw and the last one.
struct Echo;

#[async_trait]
impl Compute for Echo {
    async fn compute(&self, request: TaskRequest) -> Result<String, ComputeError> {
        let last = request
            .messages
            .last()
            .map(|m| m.content.clone())
            .unwrap_or_default();
        Ok(format!("{} messages, last: {}", request.messages.len(), last))
    }
}

struct Unloaded;

#[async_trait]
impl Compute for Unloaded {
    async fn compute(&self, _request: TaskRequest) -> Result<String, ComputeError> {
        Err(ComputeError::Unavailable("weights not loaded".into()))
    }
}

async fn connect(
    server: &TestServer,
    net: &LoopbackNetwork,
    compute: Option<Arc<dyn Compute>>,
) -> Result<SignalingClient> {
    let settings = server.peer_config(compute.is_some());
    let peer = SignalingClient::connect(&settings, Arc::new(net.connector()), compute).await?;
    peer.client().assigned_id().await?;
    peer.client().join()?;
    Ok(peer)
}

async fn wait_for_capable(client: &PeerClient) -> Result<()> {
    let mut presence = client.presence();
    tokio::time::timeout(
        RECV_TIMEOUT,
        presence.wait_for(|p| p.peers.iter().any(|(_, r)| r.capable)),
    )
    .await
    .context("no capable peer appeared")?
    .context("presence feed closed")?;
    Ok(())
}

fn chat(store: &InMemoryMessageStore) -> TaskRequest {
    store.append(
        "chat",
        ChatMessage {
            role: ChatRole::User,
            content: "what is rust?".into(),
            timestamp_ms: 1,
        },
    );
    store.append(
        "chat",
        ChatMessage {
            role: ChatRole::Assistant,
            content: "a language".into(),
            timestamp_ms: 2,
        },
    );
    store.append(
        "chat",
        ChatMessage {
            role: ChatRole::User,
            content: "tell me more".into(),
            timestamp_ms: 3,
        },
    );
    build_request(store, "chat", "You are a helpful AI assistant.")
}

#[tokio::test]
async fn test_end_to_end_exchange() -> Result<()> {
    let server = TestServer::start().await?;
    let net = LoopbackNetwork::new();

    let helper = connect(&server, &net, Some(Arc::new(Echo))).await?;
    let requester = connect(&server, &net, None).await?;
    wait_for_capable(requester.client()).await?;

    let store = InMemoryMessageStore::new();
    let reply = requester
        .client()
        .request_computation_with_timeout(chat(&store))
        .await?;
    assert_eq!(reply, TaskReply::ok("4 messages, last: tell me more"));

    // Both sides report completion; the second one clamps at zero load.
    let status = wait_for_status(&server, |s| s["total_helped"] == 2).await?;
    assert_eq!(status["total_load"], 0);
    assert_eq!(status["reservations"], 0);

    assert!(requester.client().sessions().is_empty());
    assert!(helper.client().sessions().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_sequential_exchanges_reuse_helper() -> Result<()> {
    let server = TestServer::start().await?;
    let net = LoopbackNetwork::new();

    let _helper = connect(&server, &net, Some(Arc::new(Echo))).await?;
    let requester = connect(&server, &net, None).await?;
    wait_for_capable(requester.client()).await?;

    let store = InMemoryMessageStore::new();
    for _ in 0..3 {
        let reply = requester
            .client()
            .request_computation_with_timeout(build_request(&store, "empty", "sys"))
            .await?;
        assert_eq!(reply.reply, "1 messages, last: sys");
    }

    wait_for_status(&server, |s| s["total_helped"] == 6).await?;
    Ok(())
}

#[tokio::test]
async fn test_compute_failure_returns_fallback_reply() -> Result<()> {
    let server = TestServer::start().await?;
    let net = LoopbackNetwork::new();

    let _helper = connect(&server, &net, Some(Arc::new(Unloaded))).await?;
    let requester = connect(&server, &net, None).await?;
    wait_for_capable(requester.client()).await?;

    let reply = requester
        .client()
        .request_computation_with_timeout(build_request(&InMemoryMessageStore::new(), "s", "sys"))
        .await?;
    assert_eq!(reply.reply, FALLBACK_REPLY);
    assert!(reply.error.as_deref().unwrap_or_default().contains("weights not loaded"));
    Ok(())
}

#[tokio::test]
async fn test_no_capable_peer_is_unavailable() -> Result<()> {
    let server = TestServer::start().await?;
    let net = LoopbackNetwork::new();

    let requester = connect(&server, &net, None).await?;
    let result = requester
        .client()
        .request_computation(build_request(&InMemoryMessageStore::new(), "s", "sys"))
        .await;
    assert!(matches!(result, Err(PeerError::Unavailable)));
    assert!(requester.client().sessions().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_presence_view_follows_server() -> Result<()> {
    let server = TestServer::start().await?;
    let net = LoopbackNetwork::new();

    let a = connect(&server, &net, None).await?;
    let b = connect(&server, &net, Some(Arc::new(Echo))).await?;
    let b_id = b.client().assigned_id().await?;

    let mut presence = a.client().presence();
    tokio::time::timeout(RECV_TIMEOUT, presence.wait_for(|p| p.online == 2))
        .await
        .context("count never reached 2")??;

    drop(b);
    tokio::time::timeout(
        RECV_TIMEOUT,
        presence.wait_for(|p| p.online == 1 && p.peers.get(&b_id).is_none()),
    )
    .await
    .context("departure never observed")??;
    Ok(())
}
