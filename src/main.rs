use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use file_relay_service::http::{router, HttpState};
use file_relay_service::notify::{MemoryBroker, SubscriptionSettings};
use file_relay_service::service::{Consumer, FileProcessor, IngestPipeline, Watcher};
use file_relay_service::store::LocalObjectStore;
use file_relay_service::telemetry::init_tracing;
use file_relay_service::{Config, Telemetry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();
    init_tracing(Some(&config.log_level), config.log_json);
    config.validate()?;

    let telemetry = Telemetry::new();
    let store = Arc::new(LocalObjectStore::open(&config.store_root, &config.bucket_name).await?);
    info!(bucket = %store.bucket_dir().display(), "object store ready");

    let topic = config.topic_path();
    let subscription = config.subscription_path();
    let broker = MemoryBroker::new();
    broker.create_topic(&topic).await?;
    broker
        .create_subscription(
            &subscription,
            &topic,
            SubscriptionSettings {
                ack_deadline: config.ack_deadline(),
                retry_delay: config.retry_delay(),
                ..Default::default()
            },
        )
        .await?;
    let broker = Arc::new(broker);

    let pipeline = IngestPipeline::new(store.clone(), broker.clone(), topic, telemetry.clone());
    let watcher = Watcher::new(&config.watch_dir, config.poll_interval(), pipeline).await?;
    let status = watcher.status();

    let mut processor = FileProcessor::new(store.clone(), &config.download_dir, telemetry.clone());
    if let Some(limit) = config.handler_timeout() {
        processor = processor.with_timeout(limit);
    }
    let consumer = Consumer::new(broker.clone(), subscription, Arc::new(processor));

    let shutdown = CancellationToken::new();
    let watch_task = tokio::spawn(watcher.run(shutdown.clone()));
    let pull_timeout = config.pull_timeout();
    let consume_shutdown = shutdown.clone();
    let mut consume_task = tokio::spawn(async move { consumer.run(pull_timeout, consume_shutdown).await });

    if let Some(addr) = config.metrics_addr {
        let app = router(Arc::new(HttpState { status, telemetry: telemetry.clone() }));
        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!(%addr, "serving health and metrics");
        let http_shutdown = shutdown.clone();
        tokio::spawn(async move {
            let served = axum::serve(listener, app)
                .with_graceful_shutdown(async move { http_shutdown.cancelled().await })
                .await;
            if let Err(e) = served {
                error!(error = %e, "http server failed");
            }
        });
    }

    // keep running until ctrl-c, or until the consumer gives up
    tokio::select! {
        res = tokio::signal::ctrl_c() => {
            res?;
            info!("shutting down");
        }
        joined = &mut consume_task => {
            shutdown.cancel();
            watch_task.await?;
            joined??;
            return Ok(());
        }
    }
    shutdown.cancel();

    watch_task.await?;
    consume_task.await??;
    Ok(())
}
