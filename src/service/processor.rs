use crate::domain::error::DomainError;
use crate::domain::message::{AckDecision, NotificationMessage};
use crate::notify::MessageHandler;
use crate::store::{ObjectStore, StoreError};
use crate::Telemetry;
use async_trait::async_trait;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum ProcessError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("download of {name} failed: {source}")]
    Download {
        name: String,
        #[source]
        source: StoreError,
    },

    #[error("cannot read downloaded {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("processing of {name} did not finish within {timeout:?}")]
    TimedOut { name: String, timeout: Duration },
}

/// Result of one successfully processed notification.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessedFile {
    pub name: String,
    pub value: f64,
    pub result: f64,
}

pub fn square(value: f64) -> f64 {
    value * value
}

/// Parse file content as a single floating point number, ignoring
/// surrounding whitespace.
pub fn parse_value(name: &str, content: &str) -> Result<f64, DomainError> {
    content.trim().parse::<f64>().map_err(|source| DomainError::NotANumber {
        name: name.to_string(),
        content: content.to_string(),
        source,
    })
}

/// Decode, download, parse and transform one message. Nothing here
/// acknowledges; callers derive the ack decision from the returned result.
pub async fn process_message(
    store: &dyn ObjectStore,
    download_dir: &Path,
    message: &NotificationMessage,
) -> Result<ProcessedFile, ProcessError> {
    let name = message.file_name()?;
    let local = download_dir.join(name);
    store
        .get(name, &local)
        .await
        .map_err(|source| ProcessError::Download { name: name.to_string(), source })?;
    let content = tokio::fs::read_to_string(&local)
        .await
        .map_err(|source| ProcessError::Read { path: local.clone(), source })?;
    let value = parse_value(name, &content)?;
    Ok(ProcessedFile { name: name.to_string(), value, result: square(value) })
}

/// Message handler that squares the number stored in each announced file.
#[derive(Clone)]
pub struct FileProcessor {
    store: Arc<dyn ObjectStore>,
    download_dir: PathBuf,
    telemetry: Telemetry,
    timeout: Option<Duration>,
    results: Option<mpsc::UnboundedSender<ProcessedFile>>,
}

impl FileProcessor {
    pub fn new(store: Arc<dyn ObjectStore>, download_dir: impl Into<PathBuf>, telemetry: Telemetry) -> Self {
        Self { store, download_dir: download_dir.into(), telemetry, timeout: None, results: None }
    }

    /// Give up on (and nack) a message whose processing takes longer than `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Also send every successful result to `tx`.
    pub fn with_results(mut self, tx: mpsc::UnboundedSender<ProcessedFile>) -> Self {
        self.results = Some(tx);
        self
    }

    pub async fn process(&self, message: &NotificationMessage) -> Result<ProcessedFile, ProcessError> {
        let work = process_message(self.store.as_ref(), &self.download_dir, message);
        match self.timeout {
            None => work.await,
            Some(limit) => match tokio::time::timeout(limit, work).await {
                Ok(res) => res,
                Err(_) => Err(ProcessError::TimedOut {
                    name: String::from_utf8_lossy(&message.data).into_owned(),
                    timeout: limit,
                }),
            },
        }
    }
}

#[async_trait]
impl MessageHandler for FileProcessor {
    async fn handle(&self, message: NotificationMessage) -> AckDecision {
        let start = Instant::now();
        let res = self.process(&message).await;
        self.telemetry.processing_hist.observe(start.elapsed().as_secs_f64());

        match &res {
            Ok(done) => {
                info!(
                    message_id = %message.id,
                    name = %done.name,
                    value = done.value,
                    result = done.result,
                    "processed file"
                );
                self.telemetry.messages_acked.inc();
                if let Some(tx) = &self.results {
                    let _ = tx.send(done.clone());
                }
            }
            Err(e) => {
                warn!(
                    message_id = %message.id,
                    attempt = message.delivery_attempt,
                    error = %e,
                    "processing failed, leaving message for redelivery"
                );
                self.telemetry.messages_nacked.inc();
            }
        }
        AckDecision::from(&res)
    }
}
