use crate::http::types::WatchStatusOut;
use crate::service::watcher::SharedStatus;
use crate::Telemetry;
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};

pub struct HttpState {
    pub status: SharedStatus,
    pub telemetry: Telemetry,
}

pub async fn healthz(State(state): State<std::sync::Arc<HttpState>>) -> impl IntoResponse {
    let status = state.status.read().await;
    if let Some(err) = &status.last_error {
        return (StatusCode::SERVICE_UNAVAILABLE, format!("degraded - {err}"));
    }
    (StatusCode::OK, format!("ok - known_files={}", status.known_files))
}

pub async fn status(State(state): State<std::sync::Arc<HttpState>>) -> impl IntoResponse {
    let snapshot = state.status.read().await.clone();
    (StatusCode::OK, Json(WatchStatusOut::from(snapshot)))
}

pub async fn metrics(State(state): State<std::sync::Arc<HttpState>>) -> impl IntoResponse {
    let body = state.telemetry.gather();
    (StatusCode::OK, body)
}
