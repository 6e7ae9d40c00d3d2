use crate::domain::message::MessageId;
use crate::domain::resource::TopicPath;
use crate::domain::snapshot::ChangeSet;
use crate::notify::{Notifier, NotifyError};
use crate::store::{ObjectStore, StoreError};
use crate::Telemetry;
use std::io;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("upload of {name} failed: {source}")]
    Upload {
        name: String,
        #[source]
        source: StoreError,
    },

    #[error("publish for {name} failed: {source}")]
    Publish {
        name: String,
        #[source]
        source: NotifyError,
    },
}

impl IngestError {
    pub fn name(&self) -> &str {
        match self {
            IngestError::Upload { name, .. } | IngestError::Publish { name, .. } => name,
        }
    }
}

/// What happened to each name of one change set.
#[derive(Debug, Default)]
pub struct IngestReport {
    /// Uploaded and announced.
    pub published: Vec<(String, MessageId)>,
    /// No longer present locally; nothing to upload.
    pub removed: Vec<String>,
    pub failed: Vec<IngestError>,
}

impl IngestReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn failed_names(&self) -> impl Iterator<Item = &str> {
        self.failed.iter().map(IngestError::name)
    }
}

/// Uploads changed files and announces each one on the topic.
#[derive(Clone)]
pub struct IngestPipeline {
    pub store: Arc<dyn ObjectStore>,
    pub notifier: Arc<dyn Notifier>,
    pub topic: TopicPath,
    pub telemetry: Telemetry,
}

impl IngestPipeline {
    pub fn new(store: Arc<dyn ObjectStore>, notifier: Arc<dyn Notifier>, topic: TopicPath, telemetry: Telemetry) -> Self {
        Self { store, notifier, topic, telemetry }
    }

    /// Attempt every name in `changes`. A failure on one name never stops the
    /// others; nothing is retried or rolled back.
    pub async fn ingest(&self, base_dir: &Path, changes: &ChangeSet) -> IngestReport {
        let mut report = IngestReport::default();
        for name in changes.iter() {
            let path = base_dir.join(name);
            if !self.source_exists(&path).await {
                info!(name, "file no longer present, nothing to upload");
                report.removed.push(name.to_string());
                continue;
            }
            match self.ingest_one(name, &path).await {
                Ok(id) => report.published.push((name.to_string(), id)),
                Err(e) => {
                    warn!(name, error = %e, "ingest failed");
                    report.failed.push(e);
                }
            }
        }
        report
    }

    /// Upload then publish. The message is only sent once the object is
    /// readable, so a consumer never sees a notification for a missing object.
    pub async fn ingest_one(&self, name: &str, path: &Path) -> Result<MessageId, IngestError> {
        if let Err(source) = self.store.put(name, path).await {
            self.telemetry.upload_failures.inc();
            return Err(IngestError::Upload { name: name.to_string(), source });
        }
        self.telemetry.files_uploaded.inc();
        info!(name, "uploaded");

        match self.notifier.publish(&self.topic, name.as_bytes().to_vec()).await {
            Ok(id) => {
                self.telemetry.messages_published.inc();
                info!(name, message_id = %id, topic = %self.topic, "published");
                Ok(id)
            }
            Err(source) => {
                self.telemetry.publish_failures.inc();
                Err(IngestError::Publish { name: name.to_string(), source })
            }
        }
    }

    async fn source_exists(&self, path: &Path) -> bool {
        match tokio::fs::metadata(path).await {
            Ok(_) => true,
            Err(e) if e.kind() == io::ErrorKind::NotFound => false,
            // anything else is left for the upload to report
            Err(_) => true,
        }
    }
}
