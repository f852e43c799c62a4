use chrono::{DateTime, Utc};
use pipeline_config::KafkaConfig;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::Display;

/// A record type that can travel through the retry pipeline
///
/// `record_key` is used as the Kafka partition key when the record is
/// republished, so every retry of the same logical record lands on the same
/// partition. It is also the identifier that appears in logs.
pub trait PipelineRecord: Serialize + DeserializeOwned + Send + Sync + 'static {
    fn record_key(&self) -> String;
}

/// Record carried on the main topic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Input {
    pub id: i64,
    /// Opaque business data. `Null` means absent and is omitted from the wire.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub payload: Value,
}

impl Input {
    pub fn new(id: i64) -> Self {
        Self {
            id,
            payload: Value::Null,
        }
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }
}

impl PipelineRecord for Input {
    fn record_key(&self) -> String {
        self.id.to_string()
    }
}

// ============================================================================
// Retry Envelope
// ============================================================================

/// Wrapper for records on the exception topic
///
/// The original record is embedded unchanged under `message`, so it always
/// deserializes back as `T`. A record that fails again in the retry processor
/// is re-enqueued through [`RetryEnvelope::next_attempt`], which keeps a single
/// level of wrapping and only updates the bookkeeping fields.
///
/// `attempt` is informational. Nothing caps it: a permanently failing record
/// cycles through the exception topic indefinitely.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryEnvelope<T> {
    /// The original record, as consumed from the main topic
    pub message: T,
    /// 1 for the first failure, incremented on every re-enqueue
    pub attempt: u32,
    /// Display of the failure that caused the latest publish
    pub last_error: String,
    pub first_failed_at: DateTime<Utc>,
    pub last_failed_at: DateTime<Utc>,
}

impl<T> RetryEnvelope<T> {
    /// Wrap a record after its first processing failure
    pub fn wrap(message: T, error: impl Display) -> Self {
        let now = Utc::now();
        Self {
            message,
            attempt: 1,
            last_error: error.to_string(),
            first_failed_at: now,
            last_failed_at: now,
        }
    }

    /// Rewrap for another pass through the exception topic
    pub fn next_attempt(self, error: impl Display) -> Self {
        Self {
            attempt: self.attempt.saturating_add(1),
            last_error: error.to_string(),
            last_failed_at: Utc::now(),
            ..self
        }
    }
}

impl<T: PipelineRecord> PipelineRecord for RetryEnvelope<T> {
    fn record_key(&self) -> String {
        self.message.record_key()
    }
}

// ============================================================================
// Transport-level types
// ============================================================================

/// A data message handed to a consumer loop by its transport
#[derive(Debug, Clone, PartialEq)]
pub struct ReceivedMessage {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<Vec<u8>>,
    pub payload: Option<Vec<u8>>,
}

/// Result of one blocking receive
#[derive(Debug, Clone, PartialEq)]
pub enum Delivery {
    Message(ReceivedMessage),
    /// No more messages are currently available in this partition.
    /// Not data, not an error.
    PartitionEof {
        topic: String,
        partition: i32,
        offset: i64,
    },
}

/// Broker acknowledgement of a published record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ack {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
}

/// (brokers, topic, group) that determines what a consumer observes and
/// which offset checkpoint it shares with its group
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerBinding {
    pub brokers: String,
    pub topic: String,
    pub group_id: String,
}

impl ConsumerBinding {
    pub fn new(
        brokers: impl Into<String>,
        topic: impl Into<String>,
        group_id: impl Into<String>,
    ) -> Self {
        Self {
            brokers: brokers.into(),
            topic: topic.into(),
            group_id: group_id.into(),
        }
    }

    /// Main topic under the main consumer group
    pub fn main(config: &KafkaConfig) -> Self {
        Self::new(&config.brokers, &config.topic, &config.group_id)
    }

    /// Exception topic under the exception consumer group
    pub fn exception(config: &KafkaConfig) -> Self {
        Self::new(
            &config.brokers,
            &config.exception_topic,
            &config.exception_group_id,
        )
    }
}

/// (brokers, topic) that determines where a producer publishes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProducerBinding {
    pub brokers: String,
    pub topic: String,
}

impl ProducerBinding {
    pub fn new(brokers: impl Into<String>, topic: impl Into<String>) -> Self {
        Self {
            brokers: brokers.into(),
            topic: topic.into(),
        }
    }

    pub fn main(config: &KafkaConfig) -> Self {
        Self::new(&config.brokers, &config.topic)
    }

    pub fn exception(config: &KafkaConfig) -> Self {
        Self::new(&config.brokers, &config.exception_topic)
    }
}
