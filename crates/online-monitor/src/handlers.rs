use std::collections::BTreeMap;

use axum::{Json, extract::State, http::StatusCode};
use serde::Serialize;

use crate::chart::ChartBucket;
use crate::state::{AppState, now_millis};

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

#[derive(Serialize)]
pub struct ReadinessResponse {
    pub status: &'static str,
    pub uptime_seconds: u64,
    pub snapshot_age_seconds: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct OnlineResponse {
    pub success: bool,
    pub servers: BTreeMap<String, u32>,
    pub total: u64,
    pub updated: i64,
}

#[derive(Debug, Serialize)]
pub struct ChartResponse {
    pub success: bool,
    pub updated: i64,
    pub data: Vec<ChartBucket>,
}

pub async fn get_online(State(state): State<AppState>) -> Json<OnlineResponse> {
    let snapshot = state.store.snapshot().await;
    Json(OnlineResponse {
        success: true,
        servers: snapshot.servers,
        total: snapshot.total,
        updated: snapshot.updated,
    })
}

pub async fn get_chart(State(state): State<AppState>) -> Json<ChartResponse> {
    let view = state.charts.get_or_refresh(now_millis(), &state.store).await;
    Json(ChartResponse {
        success: true,
        updated: view.updated,
        data: view.data.to_vec(),
    })
}

pub async fn get_metrics(State(state): State<AppState>) -> String {
    state.metrics.render()
}

pub async fn get_health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

pub async fn get_ready(State(state): State<AppState>) -> (StatusCode, Json<ReadinessResponse>) {
    let readiness = state.readiness().await;
    let status = if readiness.is_ready { "ready" } else { "stale" };
    let status_code = if readiness.is_ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status_code,
        Json(ReadinessResponse {
            status,
            uptime_seconds: state.uptime_seconds(),
            snapshot_age_seconds: readiness.snapshot_age_seconds,
        }),
    )
}
