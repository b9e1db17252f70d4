//! /status and /peers handlers: read-only views of the registry.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use super::ApiState;

// ── /status ───────────────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct StatusResponse {
    pub online: usize,
    pub capable: usize,
    pub total_load: u64,
    pub total_helped: u64,
    pub reservations: usize,
    pub uptime_secs: u64,
}

pub async fn handle_status(
    State(state): State<ApiState>,
) -> Result<Json<StatusResponse>, (StatusCode, String)> {
    let status = state.broker.status().await.map_err(unavailable)?;
    Ok(Json(StatusResponse {
        online: status.online,
        capable: status.capable,
        total_load: status.total_load,
        total_helped: status.total_helped,
        reservations: status.reservations,
        uptime_secs: status.uptime_secs,
    }))
}

// ── /peers ────────────────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct PeersResponse {
    pub peers: Vec<PeerJson>,
}

#[derive(Serialize)]
pub struct PeerJson {
    pub id: String,
    pub capable: bool,
    pub load: u32,
    pub helped: u64,
}

pub async fn handle_peers(
    State(state): State<ApiState>,
) -> Result<Json<PeersResponse>, (StatusCode, String)> {
    let status = state.broker.status().await.map_err(unavailable)?;
    let peers = status
        .peers
        .iter()
        .map(|(id, r)| PeerJson {
            id: id.to_string(),
            capable: r.capable,
            load: r.load,
            helped: r.helped,
        })
        .collect();
    Ok(Json(PeersResponse { peers }))
}

fn unavailable(e: peerai_services::BrokerError) -> (StatusCode, String) {
    (StatusCode::SERVICE_UNAVAILABLE, e.to_string())
}
