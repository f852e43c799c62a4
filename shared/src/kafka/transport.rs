// ============================================================================
// Transport seams
// ============================================================================
//
// The consumer loop and the producer talk to the broker only through these
// two traits. The Kafka implementations live here; an in-process broker used
// by tests lives in `kafka::memory`.
//
// ============================================================================

use anyhow::Context;
use async_trait::async_trait;
use pipeline_config::{ConsumerConfig, KafkaConfig};
use pipeline_error::{PipelineError, PipelineResult};
use rdkafka::Message;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::error::KafkaError;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::util::Timeout;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use super::config::{create_consumer_config, create_producer_config};
use super::types::{Ack, Delivery, ReceivedMessage};

/// Receiving side of a broker connection, exclusively owned by one consumer
#[async_trait]
pub trait MessageSource: Send {
    /// Attach to `topic` under the source's consumer group
    fn subscribe(&mut self, topic: &str) -> PipelineResult<()>;

    /// Wait for the next delivery.
    ///
    /// `Ok(None)` means the source is exhausted and will never yield again.
    async fn recv(&mut self) -> PipelineResult<Option<Delivery>>;

    /// Record that `message` has been processed so the group checkpoint can advance
    fn ack(&mut self, message: &ReceivedMessage) -> PipelineResult<()>;

    /// Release the connection. The consumer loop calls this exactly once.
    fn close(&mut self);
}

/// Publishing side of a broker connection, shared by every producer clone
#[async_trait]
pub trait RecordSink: Send + Sync {
    async fn send(&self, topic: &str, key: Option<&[u8]>, payload: &[u8]) -> PipelineResult<Ack>;

    /// Wait for in-flight messages to be acknowledged
    async fn flush(&self, timeout: Duration) -> PipelineResult<()>;
}

// ============================================================================
// Kafka consumer transport
// ============================================================================

/// `MessageSource` backed by an rdkafka `StreamConsumer`
pub struct KafkaSource {
    /// None once closed
    consumer: Option<StreamConsumer>,
    group_id: String,
    topic: Option<String>,
}

impl KafkaSource {
    /// Create a consumer in `group_id`. Does not subscribe.
    pub fn create(
        config: &KafkaConfig,
        consumer_config: &ConsumerConfig,
        group_id: &str,
    ) -> anyhow::Result<Self> {
        info!(
            brokers = %config.brokers,
            group_id = %group_id,
            "Initializing Kafka consumer"
        );

        let consumer: StreamConsumer = create_consumer_config(config, consumer_config, group_id)
            .create()
            .context("Failed to create Kafka consumer")?;

        Ok(Self {
            consumer: Some(consumer),
            group_id: group_id.to_string(),
            topic: None,
        })
    }
}

#[async_trait]
impl MessageSource for KafkaSource {
    fn subscribe(&mut self, topic: &str) -> PipelineResult<()> {
        let consumer = self
            .consumer
            .as_ref()
            .ok_or_else(|| PipelineError::Kafka("consumer already closed".to_string()))?;

        consumer.subscribe(&[topic]).map_err(|e| {
            PipelineError::Kafka(format!("failed to subscribe to '{}': {}", topic, e))
        })?;
        self.topic = Some(topic.to_string());

        info!(
            topic = %topic,
            group_id = %self.group_id,
            "Kafka consumer subscribed"
        );
        Ok(())
    }

    async fn recv(&mut self) -> PipelineResult<Option<Delivery>> {
        let Some(consumer) = self.consumer.as_ref() else {
            return Ok(None);
        };

        match consumer.recv().await {
            Ok(message) => Ok(Some(Delivery::Message(ReceivedMessage {
                topic: message.topic().to_string(),
                partition: message.partition(),
                offset: message.offset(),
                key: message.key().map(<[u8]>::to_vec),
                payload: message.payload().map(<[u8]>::to_vec),
            }))),
            Err(KafkaError::PartitionEOF(partition)) => Ok(Some(Delivery::PartitionEof {
                topic: self.topic.clone().unwrap_or_default(),
                partition,
                offset: -1,
            })),
            Err(e) => Err(PipelineError::Transport(e.to_string())),
        }
    }

    fn ack(&mut self, message: &ReceivedMessage) -> PipelineResult<()> {
        let Some(consumer) = self.consumer.as_ref() else {
            return Ok(());
        };

        // The stored offset is the next one to read
        consumer
            .store_offset(&message.topic, message.partition, message.offset + 1)
            .map_err(|e| PipelineError::Transport(format!("failed to store offset: {}", e)))
    }

    fn close(&mut self) {
        if let Some(consumer) = self.consumer.take() {
            consumer.unsubscribe();
            // Dropping the StreamConsumer closes it and commits stored offsets
            drop(consumer);
            info!(
                topic = %self.topic.as_deref().unwrap_or("-"),
                group_id = %self.group_id,
                "Kafka consumer closed"
            );
        }
    }
}

// ============================================================================
// Kafka producer transport
// ============================================================================

/// `RecordSink` backed by an rdkafka `FutureProducer`
///
/// Configured for:
/// - At-least-once delivery (`acks=all`, idempotent writes)
/// - Small batching window for low latency
#[derive(Clone)]
pub struct KafkaSink {
    producer: Arc<FutureProducer>,
    send_timeout: Duration,
}

impl KafkaSink {
    pub fn create(config: &KafkaConfig) -> anyhow::Result<Self> {
        info!(brokers = %config.brokers, "Initializing Kafka producer...");

        let producer: FutureProducer = create_producer_config(config)
            .create()
            .context("Failed to create Kafka producer")?;

        Ok(Self {
            producer: Arc::new(producer),
            send_timeout: Duration::from_millis(config.producer_send_timeout_ms),
        })
    }
}

#[async_trait]
impl RecordSink for KafkaSink {
    async fn send(&self, topic: &str, key: Option<&[u8]>, payload: &[u8]) -> PipelineResult<Ack> {
        let mut record = FutureRecord::<[u8], [u8]>::to(topic).payload(payload);
        if let Some(key) = key {
            record = record.key(key);
        }

        match self
            .producer
            .send(record, Timeout::After(self.send_timeout))
            .await
        {
            Ok((partition, offset)) => Ok(Ack {
                topic: topic.to_string(),
                partition,
                offset,
            }),
            Err((kafka_err, _)) => Err(PipelineError::Publish {
                topic: topic.to_string(),
                reason: kafka_err.to_string(),
            }),
        }
    }

    async fn flush(&self, timeout: Duration) -> PipelineResult<()> {
        debug!("Flushing Kafka producer (timeout: {:?})", timeout);
        self.producer
            .flush(Timeout::After(timeout))
            .map_err(|e| PipelineError::Transport(format!("failed to flush producer: {}", e)))
    }
}
