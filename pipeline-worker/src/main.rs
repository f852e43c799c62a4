// Pipeline Worker - consume, process, retry
// ============================================================================
//
// Runs two consumer loops against Kafka:
// 1. Main topic (KAFKA_TOPIC, group KAFKA_GROUP_ID): each Input is processed
//    by ProcessingService. On failure the record is wrapped in a
//    RetryEnvelope and published to the exception topic.
// 2. Exception topic (KAFKA_EXCEPTION_TOPIC, group KAFKA_EXCEPTION_GROUP_ID):
//    each envelope's record is processed by RetryProcessingService. On
//    failure the envelope is re-enqueued with its attempt count bumped.
//
// Guarantees:
// - At-least-once per consumer group (offsets stored after handling)
// - Malformed payloads are logged and skipped
// - No retry limit: a permanently failing record cycles forever
//
// ============================================================================

mod services;

use anyhow::{Context, Result};
use pipeline_config::Config;
use pipeline_shared::kafka::{Input, metrics};
use pipeline_shared::pipeline::RetryPipeline;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use services::{ProcessingService, RetryProcessingService};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::from_env()?;

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.rust_log.clone()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("=== Pipeline Worker Starting ===");
    info!("Kafka Brokers: {}", config.kafka.brokers);
    info!(
        "Main Topic: {} (group: {})",
        config.kafka.topic, config.kafka.group_id
    );
    info!(
        "Exception Topic: {} (group: {})",
        config.kafka.exception_topic, config.kafka.exception_group_id
    );
    info!("Kafka SSL: {}", config.kafka.ssl_enabled);
    info!("Kafka SASL: {}", config.kafka.has_sasl());

    let pipeline = RetryPipeline::<Input>::from_config(&config)
        .context("Failed to initialize retry pipeline")?;
    let retry_producer = pipeline.retry_producer().clone();

    let handles = pipeline.start(ProcessingService, RetryProcessingService);
    info!("Pipeline started, waiting for messages");

    let metrics_task = config.metrics_log_interval().map(|interval| {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // First tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                log_metrics_summary();
            }
        })
    });

    wait_for_shutdown_signal().await?;

    handles.shutdown().await;
    if let Some(task) = metrics_task {
        task.abort();
    }
    log_metrics_summary();

    if let Err(e) = retry_producer
        .flush(config.shutdown_flush_timeout())
        .await
    {
        error!(error = %e, "Failed to flush exception topic producer");
    }

    info!("=== Pipeline Worker Stopped ===");
    Ok(())
}

/// Resolve on SIGTERM or Ctrl-C
async fn wait_for_shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut sigterm =
            signal(SignalKind::terminate()).context("Failed to register SIGTERM handler")?;
        tokio::select! {
            _ = sigterm.recv() => {
                info!("SIGTERM received, initiating graceful shutdown...");
            }
            _ = tokio::signal::ctrl_c() => {
                info!("SIGINT received, initiating graceful shutdown...");
            }
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c()
            .await
            .context("Failed to listen for Ctrl-C")?;
        info!("Ctrl-C received, initiating graceful shutdown...");
    }
    Ok(())
}

fn log_metrics_summary() {
    info!(
        consumed = metrics::total(&metrics::KAFKA_CONSUME_SUCCESS),
        handler_failures = metrics::total(&metrics::HANDLER_FAILURE),
        malformed = metrics::total(&metrics::DESERIALIZATION_FAILURE),
        consume_errors = metrics::total(&metrics::KAFKA_CONSUME_FAILURE),
        retries_published = metrics::total(&metrics::RETRY_PUBLISHED),
        retries_lost = metrics::total(&metrics::RETRY_PUBLISH_FAILURE),
        "Pipeline metrics"
    );
}
