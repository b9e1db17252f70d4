use crate::*;

#[tokio::test]
async fn test_status_counts_peers() -> Result<()> {
    let server = TestServer::start().await?;

    let status = server.get_json("/status").await?;
    assert_eq!(status["online"], 0);
    assert_eq!(status["capable"], 0);

    let mut helper = WsPeer::connect(&server).await?;
    let mut requester = WsPeer::connect(&server).await?;
    helper.join(true).await?;
    requester.join(false).await?;
    requester
        .recv_until(|e| *e == ServerEvent::OnlineUsersCount(2))
        .await?;
    helper
        .recv_until(|e| *e == ServerEvent::OnlineUsersCount(2))
        .await?;

    let status = wait_for_status(&server, |s| s["capable"] == 1).await?;
    assert_eq!(status["online"], 2);
    assert_eq!(status["total_load"], 0);
    assert!(status["uptime_secs"].is_u64());
    Ok(())
}

#[tokio::test]
async fn test_peers_listed_in_connection_order() -> Result<()> {
    let server = TestServer::start().await?;
    let mut first = WsPeer::connect(&server).await?;
    let second = WsPeer::connect(&server).await?;
    first.join(true).await?;
    first.recv().await?;

    let peers = server.get_json("/peers").await?;
    let list = peers["peers"].as_array().context("peers must be an array")?;
    assert_eq!(list.len(), 2);
    assert_eq!(list[0]["id"], first.id.as_str());
    assert_eq!(list[0]["capable"], true);
    assert_eq!(list[1]["id"], second.id.as_str());
    assert_eq!(list[1]["capable"], false);
    assert_eq!(list[1]["load"], 0);
    assert_eq!(list[1]["helped"], 0);
    Ok(())
}

#[tokio::test]
async fn test_reservations_visible_until_completion() -> Result<()> {
    let server = TestServer::start().await?;
    let mut helper = WsPeer::connect(&server).await?;
    let mut requester = WsPeer::connect(&server).await?;
    helper.join(true).await?;
    requester.join(false).await?;
    seen_capable(&mut requester, &helper.id).await?;
    requester.send(ClientEvent::RequestComputation).await?;
    requester
        .recv_until(|e| matches!(e, ServerEvent::PeerId { peer_id: Some(_) }))
        .await?;

    let status = server.get_json("/status").await?;
    assert_eq!(status["reservations"], 1);
    assert_eq!(status["total_load"], 1);

    requester
        .send(ClientEvent::ComputationCompleted {
            helper_id: helper.id.clone(),
        })
        .await?;
    wait_for_status(&server, |s| s["reservations"] == 0 && s["total_helped"] == 1).await?;
    Ok(())
}

#[tokio::test]
async fn test_expired_lease_releases_load() -> Result<()> {
    let server = TestServer::with_matchmaking(MatchmakingConfig {
        reservation_ttl_secs: 1,
        reap_interval_secs: 1,
    })
    .await?;
    let mut helper = WsPeer::connect(&server).await?;
    let mut requester = WsPeer::connect(&server).await?;
    helper.join(true).await?;
    requester.join(false).await?;
    seen_capable(&mut requester, &helper.id).await?;
    requester.send(ClientEvent::RequestComputation).await?;
    requester
        .recv_until(|e| matches!(e, ServerEvent::PeerId { peer_id: Some(_) }))
        .await?;

    // Nobody reports completion; the reaper gives the slot back.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let status = server.get_json("/status").await?;
        if status["total_load"] == 0 && status["reservations"] == 0 {
            assert_eq!(status["total_helped"], 0);
            break;
        }
        if tokio::time::Instant::now() >= deadline {
            bail!("lease never expired: {status}");
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    Ok(())
}
