use std::time::Duration;

use axum::{extract::State, response::IntoResponse, Json};
use serde::Serialize;

use super::metrics::resident_memory_bytes;
use super::state::ServerState;
use crate::bridge::SERVER_VERSION;

#[derive(Serialize)]
struct ServerStats {
    pub uptime: String,
    pub hash: String,
    pub version: &'static str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SessionHealth {
    bound: bool,
    state: Option<String>,
    in_flight: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CatalogHealth {
    nodes: usize,
    templates: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthReport {
    status: &'static str,
    uptime: String,
    uptime_secs: u64,
    version: &'static str,
    hash: String,
    session: SessionHealth,
    resident_memory_bytes: Option<u64>,
    catalog: CatalogHealth,
}

pub fn format_uptime(duration: Duration) -> String {
    let total_seconds = duration.as_secs();

    let days = total_seconds / 86_400;
    let hours = (total_seconds % 86_400) / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    format!("{}d {:02}:{:02}:{:02}", days, hours, minutes, seconds)
}

pub async fn home(State(state): State<ServerState>) -> impl IntoResponse {
    Json(ServerStats {
        uptime: format_uptime(state.start_time.elapsed()),
        hash: state.hash.clone(),
        version: SERVER_VERSION,
    })
}

pub async fn health(State(state): State<ServerState>) -> impl IntoResponse {
    let session = state.bridge.sessions().current();
    let (nodes, templates) = state.bridge.catalog().counts();
    let uptime = state.start_time.elapsed();

    Json(HealthReport {
        status: "ok",
        uptime: format_uptime(uptime),
        uptime_secs: uptime.as_secs(),
        version: SERVER_VERSION,
        hash: state.hash.clone(),
        session: SessionHealth {
            bound: session.is_some(),
            state: session.as_ref().map(|s| s.state.to_string()),
            in_flight: session.as_ref().map_or(0, |s| s.in_flight),
        },
        resident_memory_bytes: resident_memory_bytes(),
        catalog: CatalogHealth { nodes, templates },
    })
}
