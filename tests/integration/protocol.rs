use crate::*;

use peerai_core::{PeerRecord, RegistrySnapshot};
use serde_json::json;

fn snapshot_of(event: ServerEvent) -> RegistrySnapshot {
    match event {
        ServerEvent::UsersUpdate(snapshot) => snapshot,
        other => panic!("expected usersUpdate, got {other:?}"),
    }
}

fn is_update(event: &ServerEvent) -> bool {
    matches!(event, ServerEvent::UsersUpdate(_))
}

#[tokio::test]
async fn test_join_broadcasts_count_then_snapshot() -> Result<()> {
    let server = TestServer::start().await?;
    let mut a = WsPeer::connect(&server).await?;
    let mut b = WsPeer::connect(&server).await?;

    let (a_id, b_id) = (a.id.clone(), b.id.clone());

    a.join(true).await?;

    for peer in [&mut a, &mut b] {
        assert_eq!(peer.recv().await?, ServerEvent::OnlineUsersCount(2));
        let snapshot = snapshot_of(peer.recv().await?);
        let order: Vec<_> = snapshot.iter().map(|(id, _)| id.clone()).collect();
        assert_eq!(order, [a_id.clone(), b_id.clone()]);
        assert!(snapshot.get(&a_id).unwrap().capable);
        assert!(!snapshot.get(&b_id).unwrap().capable);
    }
    Ok(())
}

#[tokio::test]
async fn test_request_without_helpers_gets_null() -> Result<()> {
    let server = TestServer::start().await?;
    let mut a = WsPeer::connect(&server).await?;
    a.join(false).await?;
    a.send(ClientEvent::RequestComputation).await?;

    let reply = a
        .recv_until(|e| matches!(e, ServerEvent::PeerId { .. }))
        .await?;
    assert_eq!(reply, ServerEvent::PeerId { peer_id: None });

    // A failed match changes nothing, so nothing is broadcast.
    a.expect_silence(Duration::from_millis(200)).await
}

#[tokio::test]
async fn test_requester_never_matched_with_itself() -> Result<()> {
    let server = TestServer::start().await?;
    let mut solo = WsPeer::connect(&server).await?;
    solo.join(true).await?;
    solo.send(ClientEvent::RequestComputation).await?;

    let reply = solo
        .recv_until(|e| matches!(e, ServerEvent::PeerId { .. }))
        .await?;
    assert_eq!(reply, ServerEvent::PeerId { peer_id: None });
    Ok(())
}

#[tokio::test]
async fn test_match_and_completion_update_load() -> Result<()> {
    let server = TestServer::start().await?;
    let mut helper = WsPeer::connect(&server).await?;
    let mut requester = WsPeer::connect(&server).await?;

    helper.join(true).await?;
    requester.join(false).await?;
    seen_capable(&mut requester, &helper.id).await?;
    requester.send(ClientEvent::RequestComputation).await?;

    let reply = requester
        .recv_until(|e| matches!(e, ServerEvent::PeerId { .. }))
        .await?;
    assert_eq!(
        reply,
        ServerEvent::PeerId {
            peer_id: Some(helper.id.clone())
        }
    );
    // The match itself is broadcast with the helper's load raised.
    let after_match = snapshot_of(requester.recv().await?);
    assert_eq!(
        after_match.get(&helper.id),
        Some(&PeerRecord {
            capable: true,
            load: 1,
            helped: 0
        })
    );

    requester
        .send(ClientEvent::ComputationCompleted {
            helper_id: helper.id.clone(),
        })
        .await?;
    let after_done = snapshot_of(requester.recv().await?);
    assert_eq!(
        after_done.get(&helper.id),
        Some(&PeerRecord {
            capable: true,
            load: 0,
            helped: 1
        })
    );

    // The helper saw the same sequence of snapshots.
    let mut last = None;
    while last.as_ref() != Some(&after_done) {
        last = Some(snapshot_of(helper.recv_until(is_update).await?));
    }
    Ok(())
}

#[tokio::test]
async fn test_second_completion_clamps_load() -> Result<()> {
    let server = TestServer::start().await?;
    let mut helper = WsPeer::connect(&server).await?;
    let mut requester = WsPeer::connect(&server).await?;
    helper.join(true).await?;
    requester.join(false).await?;
    seen_capable(&mut requester, &helper.id).await?;
    requester.send(ClientEvent::RequestComputation).await?;
    requester
        .recv_until(|e| matches!(e, ServerEvent::PeerId { .. }))
        .await?;

    let done = ClientEvent::ComputationCompleted {
        helper_id: helper.id.clone(),
    };
    requester.send(done.clone()).await?;
    helper.send(done).await?;

    let status = wait_for_status(&server, |s| s["total_helped"] == 2).await?;
    assert_eq!(status["total_load"], 0);
    Ok(())
}

#[tokio::test]
async fn test_offer_and_answer_are_relayed_verbatim() -> Result<()> {
    let server = TestServer::start().await?;
    let mut h = WsPeer::connect(&server).await?;
    let mut r = WsPeer::connect(&server).await?;

    let offer = json!({"type": "offer", "sdp": "v=0\r\no=- 1 1 IN IP4 0.0.0.0", "nested": [1, {"x": null}]});
    r.send(ClientEvent::Offer {
        to: h.id.clone(),
        offer: offer.clone(),
    })
    .await?;
    assert_eq!(
        h.recv().await?,
        ServerEvent::Offer {
            from: r.id.clone(),
            offer
        }
    );

    let answer = json!({"type": "answer", "sdp": "v=0"});
    h.send(ClientEvent::Answer {
        to: r.id.clone(),
        answer: answer.clone(),
    })
    .await?;
    assert_eq!(
        r.recv().await?,
        ServerEvent::Answer {
            from: h.id.clone(),
            answer
        }
    );
    Ok(())
}

#[tokio::test]
async fn test_relay_preserves_order() -> Result<()> {
    let server = TestServer::start().await?;
    let mut h = WsPeer::connect(&server).await?;
    let mut r = WsPeer::connect(&server).await?;

    for n in 0..20 {
        r.send(ClientEvent::Offer {
            to: h.id.clone(),
            offer: json!({ "n": n }),
        })
        .await?;
    }
    for n in 0..20 {
        match h.recv().await? {
            ServerEvent::Offer { offer, .. } => assert_eq!(offer["n"], n),
            other => panic!("expected offer, got {other:?}"),
        }
    }
    Ok(())
}

#[tokio::test]
async fn test_offer_to_unknown_peer_is_dropped() -> Result<()> {
    let server = TestServer::start().await?;
    let mut r = WsPeer::connect(&server).await?;

    r.send(ClientEvent::Offer {
        to: PeerId::from("00000000deadbeef"),
        offer: json!({}),
    })
    .await?;
    r.expect_silence(Duration::from_millis(200)).await
}

#[tokio::test]
async fn test_disconnect_broadcasts_updated_presence() -> Result<()> {
    let server = TestServer::start().await?;
    let mut a = WsPeer::connect(&server).await?;
    let mut b = WsPeer::connect(&server).await?;
    a.join(false).await?;
    b.join(true).await?;
    let b_id = b.id.clone();

    b.close().await?;

    a.recv_until(|e| *e == ServerEvent::OnlineUsersCount(1))
        .await?;
    let snapshot = snapshot_of(a.recv().await?);
    assert_eq!(snapshot.len(), 1);
    assert!(snapshot.get(&b_id).is_none());
    assert!(snapshot.get(&a.id).is_some());
    Ok(())
}
