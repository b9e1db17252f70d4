use crate::*;

#[tokio::test]
async fn test_server_assigns_distinct_ids() -> Result<()> {
    let server = TestServer::start().await?;

    let a = WsPeer::connect(&server).await?;
    let b = WsPeer::connect(&server).await?;

    for id in [&a.id, &b.id] {
        assert_eq!(id.as_str().len(), 16, "id should be 16 hex chars: {id}");
        assert!(id.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }
    assert_ne!(a.id, b.id);
    Ok(())
}

#[tokio::test]
async fn test_connect_alone_broadcasts_nothing() -> Result<()> {
    let server = TestServer::start().await?;

    let mut a = WsPeer::connect(&server).await?;
    let _b = WsPeer::connect(&server).await?;

    // Presence is published on join, not on connect.
    a.expect_silence(Duration::from_millis(200)).await
}

#[tokio::test]
async fn test_malformed_frames_keep_connection_open() -> Result<()> {
    let server = TestServer::start().await?;
    let mut a = WsPeer::connect(&server).await?;

    a.send_raw("not json at all").await?;
    a.send_raw(r#"{"event":"launchMissiles","data":{}}"#).await?;
    a.send_raw(r#"{"event":"join","data":{"capable":"yes"}}"#).await?;

    a.join(true).await?;
    assert_eq!(a.recv().await?, ServerEvent::OnlineUsersCount(1));
    Ok(())
}
