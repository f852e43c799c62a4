// Input Producer
// ============================================================================
//
// Reads one JSON Input per line from stdin and publishes each to the main
// topic. Blank lines are ignored; lines that do not parse are reported and
// skipped.
//
//   echo '{"id":1}' | input-producer
//
// ============================================================================

use anyhow::{Context, Result};
use pipeline_config::Config;
use pipeline_shared::kafka::{Input, MessageProducer, PipelineRecord, ProducerBinding};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.rust_log.clone()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let producer: MessageProducer<Input> =
        MessageProducer::new(&config.kafka, ProducerBinding::main(&config.kafka))
            .context("Failed to initialize main topic producer")?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut published: u64 = 0;
    let mut skipped: u64 = 0;
    let mut line_number: u64 = 0;

    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        line_number += 1;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let input: Input = match serde_json::from_str(line) {
            Ok(input) => input,
            Err(e) => {
                warn!(line = line_number, error = %e, "Skipping line that is not a valid Input");
                skipped += 1;
                continue;
            }
        };

        let key = input.record_key();
        match producer.publish_keyed(Some(&key), &input).await {
            Ok(_) => published += 1,
            Err(e) => {
                error!(line = line_number, id = input.id, error = %e, "Failed to publish input");
                skipped += 1;
            }
        }
    }

    producer
        .flush(config.shutdown_flush_timeout())
        .await
        .context("Failed to flush main topic producer")?;

    info!(
        topic = %producer.topic(),
        published = published,
        skipped = skipped,
        "Input publishing finished"
    );
    Ok(())
}
