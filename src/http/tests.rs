#[cfg(test)]
mod tests {
    use crate::domain::state::WatcherState;
    use crate::http::handlers::{healthz, status, HttpState};
    use crate::service::watcher::WatchStatus;
    use crate::telemetry::Telemetry;
    use axum::body::to_bytes;
    use axum::extract::State as AxState;
    use axum::response::IntoResponse;
    use std::collections::BTreeSet;
    use std::path::PathBuf;
    use std::sync::Arc;
    use tokio::sync::RwLock;

    fn state_with(last_error: Option<&str>) -> Arc<HttpState> {
        let status = WatchStatus {
            dir: PathBuf::from("/data"),
            state: WatcherState::Idle,
            cycles: 3,
            last_poll_at: None,
            last_error: last_error.map(str::to_string),
            known_files: 2,
            failed: BTreeSet::from(["b.txt".to_string()]),
        };
        Arc::new(HttpState { status: Arc::new(RwLock::new(status)), telemetry: Telemetry::new() })
    }

    #[tokio::test]
    async fn healthz_reports_degraded_after_listing_error() {
        let resp = healthz(AxState(state_with(Some("cannot list /data")))).await.into_response();
        assert_eq!(resp.status(), axum::http::StatusCode::SERVICE_UNAVAILABLE);

        let resp = healthz(AxState(state_with(None))).await.into_response();
        assert_eq!(resp.status(), axum::http::StatusCode::OK);
    }

    #[tokio::test]
    async fn status_lists_failed_names() {
        let resp = status(AxState(state_with(None))).await.into_response();
        assert_eq!(resp.status(), axum::http::StatusCode::OK);
        let body = to_bytes(resp.into_body(), 16_384).await.unwrap();
        let v: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(v["state"], "idle");
        assert_eq!(v["failed"][0], "b.txt");
        assert_eq!(v["known_files"], 2);
    }
}
