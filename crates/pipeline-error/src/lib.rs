use thiserror::Error;

pub type PipelineResult<T> = Result<T, PipelineError>;

/// Error taxonomy for the consume/process/retry pipeline
///
/// Every variant is contained at message granularity by the consumer loop;
/// none of them is allowed to terminate a loop or the process.
#[derive(Error, Debug)]
pub enum PipelineError {
    // ===== Transport Errors =====
    /// Broker unreachable or consume-level fault
    #[error("Kafka transport error: {0}")]
    Transport(String),

    /// Client creation or subscription failed
    #[error("Kafka client error: {0}")]
    Kafka(String),

    // ===== Serialization Errors =====
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Payload does not match the topic's schema
    #[error("Failed to deserialize message from {topic}[{partition}]@{offset}: {source}")]
    Deserialization {
        topic: String,
        partition: i32,
        offset: i64,
        #[source]
        source: serde_json::Error,
    },

    #[error("Message from {topic}[{partition}]@{offset} has no payload")]
    EmptyPayload {
        topic: String,
        partition: i32,
        offset: i64,
    },

    // ===== Processing Errors =====
    /// Processing callback failed or panicked
    #[error("Handler error: {0}")]
    Handler(#[source] anyhow::Error),

    /// Publishing to a topic failed (including retry republish)
    #[error("Failed to publish to '{topic}': {reason}")]
    Publish { topic: String, reason: String },

    // ===== Lifecycle Errors =====
    #[error("Consumer for '{topic}' was started without a subscription")]
    NotSubscribed { topic: String },
}

impl PipelineError {
    /// Stable code for log fields and metric labels
    pub fn error_code(&self) -> &'static str {
        match self {
            PipelineError::Transport(_) => "TRANSPORT_ERROR",
            PipelineError::Kafka(_) => "KAFKA_ERROR",
            PipelineError::Serialization(_) => "SERIALIZATION_ERROR",
            PipelineError::Deserialization { .. } => "DESERIALIZATION_ERROR",
            PipelineError::EmptyPayload { .. } => "EMPTY_PAYLOAD",
            PipelineError::Handler(_) => "HANDLER_ERROR",
            PipelineError::Publish { .. } => "PUBLISH_ERROR",
            PipelineError::NotSubscribed { .. } => "NOT_SUBSCRIBED",
        }
    }
}
