use crate::domain::state::WatcherState;
use crate::service::watcher::WatchStatus;
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct WatchStatusOut {
    pub dir: String,
    pub state: String,
    pub cycles: u64,
    pub last_poll_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub known_files: usize,
    pub failed: Vec<String>,
}

impl From<WatchStatus> for WatchStatusOut {
    fn from(s: WatchStatus) -> Self {
        Self {
            dir: s.dir.display().to_string(),
            state: match s.state {
                WatcherState::Idle => "idle".to_string(),
                WatcherState::Polling => "polling".to_string(),
            },
            cycles: s.cycles,
            last_poll_at: s.last_poll_at,
            last_error: s.last_error,
            known_files: s.known_files,
            failed: s.failed.into_iter().collect(),
        }
    }
}
