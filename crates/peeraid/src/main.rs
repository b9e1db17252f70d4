//! peeraid: peerai signaling and matchmaking server.

use anyhow::{Context, Result};

use peerai_api::ApiState;
use peerai_core::config::PeeraiConfig;
use peerai_services::Broker;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Load config
    match PeeraiConfig::write_default_if_missing() {
        Ok(path) => tracing::debug!(path = %path.display(), "config file"),
        Err(e) => tracing::warn!(error = %e, "failed to write default config"),
    }
    let config = PeeraiConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, using defaults");
        let mut config = PeeraiConfig::default();
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config
    });

    tracing::info!(
        bind = %config.server.bind_addr,
        port = config.server.port,
        origins = config.server.allowed_origins.len(),
        reservation_ttl_secs = config.matchmaking.reservation_ttl_secs,
        "peeraid starting"
    );

    // ── Shutdown channel ─────────────────────────────────────────────────────
    let (shutdown_tx, _) = tokio::sync::broadcast::channel::<()>(1);

    {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("shutdown signal received");
            let _ = shutdown.send(());
        });
    }

    // ── Spawn tasks ──────────────────────────────────────────────────────────

    let (broker, handle) = Broker::new(&config.matchmaking, shutdown_tx.subscribe());
    let broker_task = tokio::spawn(broker.run());

    let api_task = {
        let state = ApiState { broker: handle };
        let server = config.server.clone();
        tokio::spawn(async move {
            peerai_api::serve(state, &server)
                .await
                .context("HTTP server failed")
        })
    };

    // ── Wait for exit ────────────────────────────────────────────────────────

    let mut shutdown_rx = shutdown_tx.subscribe();

    tokio::select! {
        _ = shutdown_rx.recv() => tracing::info!("shutting down"),
        r = broker_task        => tracing::error!("broker exited: {:?}", r),
        r = api_task           => match r {
            Ok(Err(e)) => {
                tracing::error!(error = %e, "api task exited");
                return Err(e);
            }
            other => tracing::error!("api task exited: {:?}", other),
        },
    }

    Ok(())
}
