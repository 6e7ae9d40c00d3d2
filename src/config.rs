use crate::domain::resource::{SubscriptionPath, TopicPath};
use anyhow::{bail, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Watch a directory, upload new files, announce them, and square the numbers
/// they contain on the consuming side.
#[derive(Debug, Clone, Parser)]
#[command(name = "file-relay", version)]
pub struct Config {
    /// Bucket receiving the uploaded files.
    #[arg(long = "bucket", env = "BUCKET_NAME")]
    pub bucket_name: String,

    #[arg(long = "project", env = "PROJECT_ID")]
    pub project_id: String,

    /// Topic new-file notifications are published on.
    #[arg(long = "topic", env = "TOPIC_ID")]
    pub topic_id: String,

    /// Subscription the consumer pulls from.
    #[arg(long = "subscription", env = "SUBSCRIPTION_ID")]
    pub subscription_id: String,

    #[arg(long, env = "WATCH_DIR", default_value = "/data")]
    pub watch_dir: PathBuf,

    #[arg(long = "poll-interval-ms", env = "POLL_INTERVAL_MS", default_value_t = 1_000)]
    pub poll_interval_ms: u64,

    /// Length of one pull session.
    #[arg(long = "pull-timeout-secs", env = "PULL_TIMEOUT_SECS", default_value_t = 1_000)]
    pub pull_timeout_secs: u64,

    /// Directory holding one subdirectory per bucket.
    #[arg(long, env = "STORE_ROOT", default_value = "buckets")]
    pub store_root: PathBuf,

    /// Where consumed objects are materialized.
    #[arg(long, env = "DOWNLOAD_DIR", default_value = "downloaded_files")]
    pub download_dir: PathBuf,

    #[arg(long = "ack-deadline-secs", env = "ACK_DEADLINE_SECS", default_value_t = 10)]
    pub ack_deadline_secs: u64,

    /// Delay before a rejected message is delivered again.
    #[arg(long = "retry-delay-ms", env = "RETRY_DELAY_MS", default_value_t = 1_000)]
    pub retry_delay_ms: u64,

    /// Upper bound on the processing of a single message.
    #[arg(long = "handler-timeout-secs", env = "HANDLER_TIMEOUT_SECS")]
    pub handler_timeout_secs: Option<u64>,

    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    #[arg(long, env = "LOG_JSON")]
    pub log_json: bool,

    /// Serve /healthz, /status and /metrics on this address.
    #[arg(long, env = "METRICS_ADDR")]
    pub metrics_addr: Option<SocketAddr>,
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        for (flag, value) in [
            ("bucket", &self.bucket_name),
            ("project", &self.project_id),
            ("topic", &self.topic_id),
            ("subscription", &self.subscription_id),
        ] {
            if value.trim().is_empty() {
                bail!("--{flag} must not be empty");
            }
        }
        if self.poll_interval_ms == 0 {
            bail!("--poll-interval-ms must be positive");
        }
        if self.pull_timeout_secs == 0 {
            bail!("--pull-timeout-secs must be positive");
        }
        if self.ack_deadline_secs == 0 {
            bail!("--ack-deadline-secs must be positive");
        }
        if self.handler_timeout_secs == Some(0) {
            bail!("--handler-timeout-secs must be positive");
        }
        Ok(())
    }

    pub fn topic_path(&self) -> TopicPath {
        TopicPath::new(&self.project_id, &self.topic_id)
    }

    pub fn subscription_path(&self) -> SubscriptionPath {
        SubscriptionPath::new(&self.project_id, &self.subscription_id)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn pull_timeout(&self) -> Duration {
        Duration::from_secs(self.pull_timeout_secs)
    }

    pub fn ack_deadline(&self) -> Duration {
        Duration::from_secs(self.ack_deadline_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn handler_timeout(&self) -> Option<Duration> {
        self.handler_timeout_secs.map(Duration::from_secs)
    }
}
