use pipeline_config::KafkaConfig;
use pipeline_error::{PipelineError, PipelineResult};
use serde::Serialize;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

use super::metrics;
use super::transport::{KafkaSink, RecordSink};
use super::types::{Ack, ProducerBinding};

/// Typed producer bound to a single topic
///
/// Records are serialized to JSON, the same format `MessageConsumer<T>`
/// decodes. Clones share the underlying connection, so one producer per topic
/// can be handed to every call site that publishes there and used
/// concurrently without external locking.
///
/// Failures are returned to the caller. The producer never retries on its
/// own beyond the transport's configured delivery retries.
pub struct MessageProducer<T> {
    sink: Arc<dyn RecordSink>,
    topic: String,
    _record: PhantomData<fn(&T)>,
}

impl<T: Serialize> MessageProducer<T> {
    /// Create a Kafka producer for `binding.topic`.
    ///
    /// # Configuration
    /// - `acks`, `enable.idempotence`, `retries`: from `KafkaConfig` (default: all / true / i32::MAX)
    /// - `compression.type`: from `KafkaConfig` (default: snappy)
    /// - `linger.ms=10`: Small batching window for low latency.
    pub fn new(config: &KafkaConfig, binding: ProducerBinding) -> anyhow::Result<Self> {
        let sink = KafkaSink::create(config)?;

        info!(
            topic = %binding.topic,
            brokers = %binding.brokers,
            "Kafka producer initialized"
        );

        Ok(Self::with_sink(Arc::new(sink), binding.topic))
    }

    /// Bind a producer to an existing transport
    pub fn with_sink(sink: Arc<dyn RecordSink>, topic: impl Into<String>) -> Self {
        Self {
            sink,
            topic: topic.into(),
            _record: PhantomData,
        }
    }

    /// Publish `record` to the bound topic and wait for the broker's acknowledgement
    pub async fn publish(&self, record: &T) -> PipelineResult<Ack> {
        self.publish_keyed(None, record).await
    }

    /// Publish with a partition key (records with equal keys share a partition)
    pub async fn publish_keyed(&self, key: Option<&str>, record: &T) -> PipelineResult<Ack> {
        let payload = match serde_json::to_vec(record) {
            Ok(payload) => payload,
            Err(e) => {
                metrics::KAFKA_PRODUCE_FAILURE
                    .with_label_values(&[self.topic.as_str()])
                    .inc();
                return Err(PipelineError::Serialization(e));
            }
        };

        let start = Instant::now();
        let result = self
            .sink
            .send(&self.topic, key.map(str::as_bytes), &payload)
            .await;
        let latency = start.elapsed();

        match result {
            Ok(ack) => {
                metrics::KAFKA_PRODUCE_SUCCESS
                    .with_label_values(&[self.topic.as_str()])
                    .inc();
                metrics::KAFKA_PRODUCE_LATENCY.observe(latency.as_secs_f64());

                debug!(
                    topic = %ack.topic,
                    partition = ack.partition,
                    offset = ack.offset,
                    latency_ms = latency.as_millis(),
                    "Record persisted to Kafka"
                );
                Ok(ack)
            }
            Err(e) => {
                metrics::KAFKA_PRODUCE_FAILURE
                    .with_label_values(&[self.topic.as_str()])
                    .inc();

                error!(
                    error = %e,
                    topic = %self.topic,
                    latency_ms = latency.as_millis(),
                    "Failed to send record to Kafka"
                );
                Err(e)
            }
        }
    }

    /// Get topic name
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Flush pending messages (for graceful shutdown)
    pub async fn flush(&self, timeout: Duration) -> PipelineResult<()> {
        info!(topic = %self.topic, "Flushing Kafka producer (timeout: {:?})", timeout);
        self.sink.flush(timeout).await?;
        info!(topic = %self.topic, "Kafka producer flushed successfully");
        Ok(())
    }
}

// Implement Clone manually so `T` does not need to be Clone
impl<T> Clone for MessageProducer<T> {
    fn clone(&self) -> Self {
        Self {
            sink: Arc::clone(&self.sink),
            topic: self.topic.clone(),
            _record: PhantomData,
        }
    }
}
