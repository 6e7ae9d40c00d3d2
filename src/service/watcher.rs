use crate::domain::snapshot::{ChangeSet, DirectorySnapshot};
use crate::domain::state::WatcherState;
use crate::service::detector::ChangeDetector;
use crate::service::ingest::{IngestPipeline, IngestReport};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeSet;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Error, Debug)]
pub enum WatchError {
    #[error("cannot list {}: {source}", .dir.display())]
    Listing {
        dir: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Externally visible state of a watcher, refreshed after every cycle.
#[derive(Debug, Clone, Serialize)]
pub struct WatchStatus {
    pub dir: PathBuf,
    pub state: WatcherState,
    pub cycles: u64,
    pub last_poll_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub known_files: usize,
    /// Names whose last ingest attempt failed. They are not retried
    /// automatically because the baseline already moved past them.
    pub failed: BTreeSet<String>,
}

pub type SharedStatus = Arc<RwLock<WatchStatus>>;

#[derive(Debug)]
pub struct PollReport {
    pub changes: ChangeSet,
    pub ingest: IngestReport,
}

/// Polling loop: list the directory, diff against the baseline, ingest every
/// changed name, commit the new baseline, sleep. Cycles never overlap.
pub struct Watcher {
    dir: PathBuf,
    interval: Duration,
    detector: ChangeDetector,
    pipeline: IngestPipeline,
    status: SharedStatus,
}

impl Watcher {
    /// Capture the starting listing of `dir`; files already present are
    /// never reported.
    pub async fn new(dir: impl Into<PathBuf>, interval: Duration, pipeline: IngestPipeline) -> Result<Self, WatchError> {
        let dir = dir.into();
        let initial = capture(&dir).await?;
        pipeline.telemetry.known_files.set(initial.len() as i64);
        let status = WatchStatus {
            dir: dir.clone(),
            state: WatcherState::Idle,
            cycles: 0,
            last_poll_at: None,
            last_error: None,
            known_files: initial.len(),
            failed: BTreeSet::new(),
        };
        Ok(Self {
            dir,
            interval,
            detector: ChangeDetector::new(initial),
            pipeline,
            status: Arc::new(RwLock::new(status)),
        })
    }

    pub fn status(&self) -> SharedStatus {
        self.status.clone()
    }

    pub fn detector(&self) -> &ChangeDetector {
        &self.detector
    }

    /// Run one POLLING phase. A listing error aborts the cycle and leaves the
    /// baseline untouched; ingest failures are part of the report.
    pub async fn poll_once(&mut self) -> Result<PollReport, WatchError> {
        self.set_state(WatcherState::Polling).await;
        let res = self.cycle().await;

        let mut status = self.status.write().await;
        status.cycles += 1;
        status.last_poll_at = Some(Utc::now());
        status.known_files = self.detector.baseline().len();
        match &res {
            Ok(report) => {
                status.last_error = None;
                for (name, _) in &report.ingest.published {
                    status.failed.remove(name);
                }
                for name in &report.ingest.removed {
                    status.failed.remove(name);
                }
                for name in report.ingest.failed_names() {
                    status.failed.insert(name.to_string());
                }
            }
            Err(e) => {
                self.pipeline.telemetry.poll_errors.inc();
                status.last_error = Some(e.to_string());
            }
        }
        debug_assert!(status.state.can_transition(WatcherState::Idle));
        status.state = WatcherState::Idle;
        drop(status);

        self.pipeline.telemetry.known_files.set(self.detector.baseline().len() as i64);
        res
    }

    async fn cycle(&mut self) -> Result<PollReport, WatchError> {
        let current = capture(&self.dir).await?;
        let changes = self.detector.diff(&current);

        let ingest = if changes.is_empty() {
            debug!(dir = %self.dir.display(), "no changes");
            IngestReport::default()
        } else {
            let names: Vec<&str> = changes.iter().collect();
            info!(dir = %self.dir.display(), changes = ?names, "found changes");
            self.pipeline.telemetry.files_detected.inc_by(changes.len() as u64);
            self.pipeline.ingest(&self.dir, &changes).await
        };

        // every name was attempted; failures stay in the status ledger
        self.detector.commit(current);
        Ok(PollReport { changes, ingest })
    }

    async fn set_state(&self, next: WatcherState) {
        let mut status = self.status.write().await;
        debug_assert!(status.state.can_transition(next));
        status.state = next;
    }

    /// Poll until `shutdown` is cancelled. Errors of a single cycle are
    /// logged and never stop the loop.
    pub async fn run(mut self, shutdown: CancellationToken) {
        info!(dir = %self.dir.display(), interval_ms = self.interval.as_millis() as u64, "watching directory");
        loop {
            match self.poll_once().await {
                Ok(report) if !report.ingest.is_clean() => {
                    let failed: Vec<&str> = report.ingest.failed_names().collect();
                    warn!(failed = ?failed, "files not ingested, not retried automatically");
                }
                Ok(_) => {}
                Err(e) => error!(error = %e, "poll cycle failed"),
            }

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }
        info!(dir = %self.dir.display(), "watcher stopped");
    }
}

async fn capture(dir: &Path) -> Result<DirectorySnapshot, WatchError> {
    DirectorySnapshot::capture(dir).await.map_err(|source| WatchError::Listing { dir: dir.to_path_buf(), source })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::resource::{SubscriptionPath, TopicPath};
    use crate::notify::{MemoryBroker, SubscriptionSettings};
    use crate::store::MemoryObjectStore;
    use crate::Telemetry;
    use tempfile::TempDir;

    async fn setup(dir: &Path) -> (Watcher, MemoryObjectStore, MemoryBroker, SubscriptionPath) {
        let store = MemoryObjectStore::new();
        let broker = MemoryBroker::new();
        let topic = TopicPath::new("p", "files");
        let sub = SubscriptionPath::new("p", "files-sub");
        broker.create_topic(&topic).await.unwrap();
        broker.create_subscription(&sub, &topic, SubscriptionSettings::default()).await.unwrap();
        let pipeline = IngestPipeline::new(Arc::new(store.clone()), Arc::new(broker.clone()), topic, Telemetry::new());
        let watcher = Watcher::new(dir, Duration::from_millis(20), pipeline).await.unwrap();
        (watcher, store, broker, sub)
    }

    #[tokio::test]
    async fn files_present_at_start_are_not_reported() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("old.txt"), "1").unwrap();
        let (mut watcher, store, _broker, _sub) = setup(dir.path()).await;

        let report = watcher.poll_once().await.unwrap();
        assert!(report.changes.is_empty());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn new_file_is_uploaded_and_announced() {
        let dir = TempDir::new().unwrap();
        let (mut watcher, store, broker, sub) = setup(dir.path()).await;

        std::fs::write(dir.path().join("a.txt"), "4").unwrap();
        let report = watcher.poll_once().await.unwrap();
        assert!(report.changes.contains("a.txt"));
        assert_eq!(report.ingest.published.len(), 1);
        assert_eq!(store.object("a.txt").await.unwrap(), b"4".to_vec());
        assert_eq!(broker.backlog(&sub).await.unwrap(), 1);

        // nothing new on the next cycle
        let report = watcher.poll_once().await.unwrap();
        assert!(report.changes.is_empty());
        let status = watcher.status();
        let status = status.read().await;
        assert_eq!(status.cycles, 2);
        assert_eq!(status.known_files, 1);
        assert_eq!(status.state, WatcherState::Idle);
    }

    #[tokio::test]
    async fn listing_error_is_surfaced_and_baseline_kept() {
        let root = TempDir::new().unwrap();
        let dir = root.path().join("watched");
        std::fs::create_dir(&dir).unwrap();
        std::fs::write(dir.join("a.txt"), "1").unwrap();
        let (mut watcher, _store, _broker, _sub) = setup(&dir).await;

        std::fs::remove_dir_all(&dir).unwrap();
        let err = watcher.poll_once().await.unwrap_err();
        assert!(matches!(err, WatchError::Listing { .. }));
        assert!(watcher.detector().baseline().contains("a.txt"));
        assert!(watcher.status().read().await.last_error.is_some());
        assert_eq!(watcher.pipeline.telemetry.poll_errors.get(), 1);
    }

    #[tokio::test]
    async fn failed_ingest_is_recorded_and_not_retried() {
        let dir = TempDir::new().unwrap();
        let store = MemoryObjectStore::new();
        // topic never created, every publish fails
        let broker = MemoryBroker::new();
        let pipeline =
            IngestPipeline::new(Arc::new(store), Arc::new(broker), TopicPath::new("p", "files"), Telemetry::new());
        let mut watcher = Watcher::new(dir.path(), Duration::from_millis(20), pipeline).await.unwrap();

        std::fs::write(dir.path().join("a.txt"), "4").unwrap();
        let report = watcher.poll_once().await.unwrap();
        assert!(!report.ingest.is_clean());
        assert!(watcher.status().read().await.failed.contains("a.txt"));

        let report = watcher.poll_once().await.unwrap();
        assert!(report.changes.is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn backslash_in_file_name_is_uploaded() {
        let dir = TempDir::new().unwrap();
        let (mut watcher, store, broker, sub) = setup(dir.path()).await;

        std::fs::write(dir.path().join("a\\b.txt"), "2").unwrap();
        let report = watcher.poll_once().await.unwrap();
        assert!(report.ingest.is_clean());
        assert_eq!(report.ingest.published.len(), 1);
        assert_eq!(store.object("a\\b.txt").await.unwrap(), b"2".to_vec());
        assert_eq!(broker.backlog(&sub).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn run_stops_on_shutdown() {
        let dir = TempDir::new().unwrap();
        let (watcher, store, _broker, _sub) = setup(dir.path()).await;
        let status = watcher.status();
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(watcher.run(shutdown.clone()));

        std::fs::write(dir.path().join("a.txt"), "4").unwrap();
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        while store.object("a.txt").await.is_none() && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(store.object("a.txt").await.is_some());

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(2), handle).await.unwrap().unwrap();
        assert!(status.read().await.cycles >= 1);
    }

    #[tokio::test]
    async fn run_keeps_polling_after_listing_error() {
        let root = TempDir::new().unwrap();
        let dir = root.path().join("watched");
        std::fs::create_dir(&dir).unwrap();
        let (watcher, store, _broker, _sub) = setup(&dir).await;
        let status = watcher.status();
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(watcher.run(shutdown.clone()));

        std::fs::remove_dir_all(&dir).unwrap();
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        while status.read().await.last_error.is_none() && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(status.read().await.last_error.is_some());
        assert!(!handle.is_finished());

        // directory comes back with a new file
        std::fs::create_dir(&dir).unwrap();
        std::fs::write(dir.join("b.txt"), "5").unwrap();
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        while (store.object("b.txt").await.is_none() || status.read().await.last_error.is_some())
            && tokio::time::Instant::now() < deadline
        {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(store.object("b.txt").await.unwrap(), b"5".to_vec());
        assert!(status.read().await.last_error.is_none());

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(2), handle).await.unwrap().unwrap();
    }
}
