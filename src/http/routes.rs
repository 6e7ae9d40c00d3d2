use crate::http::handlers::{healthz, metrics, status, HttpState};
use axum::{routing::get, Router};

pub fn router(state: std::sync::Arc<HttpState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/status", get(status))
        .route("/metrics", get(metrics))
        .with_state(state)
}
