// ============================================================================
// Kafka Configuration
// ============================================================================

use crate::constants::*;
use crate::{env_or, env_parse_or};

/// Kafka connection and topology configuration
///
/// Two logical endpoints share one broker list: the main topic (consumed by the
/// primary processor) and the exception topic (retry envelopes, consumed by the
/// retry processor). Each has its own consumer group.
#[derive(Clone, Debug)]
pub struct KafkaConfig {
    /// Comma-separated list of Kafka brokers (e.g., "kafka1:9092,kafka2:9092")
    pub brokers: String,
    /// Main topic carrying `Input` records
    pub topic: String,
    /// Consumer group for the main topic
    pub group_id: String,
    /// Exception topic carrying retry envelopes
    pub exception_topic: String,
    /// Consumer group for the exception topic
    pub exception_group_id: String,
    /// SSL/TLS enabled
    pub ssl_enabled: bool,
    /// Path to CA certificate file (for self-signed certificates)
    pub ssl_ca_location: Option<String>,
    /// SASL mechanism (e.g., "SCRAM-SHA-256", "PLAIN")
    pub sasl_mechanism: Option<String>,
    pub sasl_username: Option<String>,
    pub sasl_password: Option<String>,
    // producer-specific settings
    pub producer_compression: String, // "zstd" | "snappy" | "gzip" | "lz4" | "none"
    pub producer_acks: String,        // "all" | "1" | "-1" | "0"
    pub producer_linger_ms: u32,
    pub producer_batch_size: u32,
    pub producer_max_in_flight: u32,
    pub producer_retries: u32,
    pub producer_request_timeout_ms: u32,
    pub producer_delivery_timeout_ms: u32,
    pub producer_enable_idempotence: bool,
    /// How long `publish` waits for the delivery report
    pub producer_send_timeout_ms: u64,
}

impl Default for KafkaConfig {
    fn default() -> Self {
        Self {
            brokers: DEFAULT_BROKERS.to_string(),
            topic: DEFAULT_TOPIC.to_string(),
            group_id: DEFAULT_GROUP_ID.to_string(),
            exception_topic: DEFAULT_EXCEPTION_TOPIC.to_string(),
            exception_group_id: DEFAULT_EXCEPTION_GROUP_ID.to_string(),
            ssl_enabled: false,
            ssl_ca_location: None,
            sasl_mechanism: None,
            sasl_username: None,
            sasl_password: None,
            producer_compression: DEFAULT_PRODUCER_COMPRESSION.to_string(),
            producer_acks: DEFAULT_PRODUCER_ACKS.to_string(),
            producer_linger_ms: DEFAULT_PRODUCER_LINGER_MS,
            producer_batch_size: DEFAULT_PRODUCER_BATCH_SIZE,
            producer_max_in_flight: DEFAULT_PRODUCER_MAX_IN_FLIGHT,
            producer_retries: DEFAULT_PRODUCER_RETRIES,
            producer_request_timeout_ms: DEFAULT_PRODUCER_REQUEST_TIMEOUT_MS,
            producer_delivery_timeout_ms: DEFAULT_PRODUCER_DELIVERY_TIMEOUT_MS,
            producer_enable_idempotence: true,
            producer_send_timeout_ms: DEFAULT_PRODUCER_SEND_TIMEOUT_MS,
        }
    }
}

impl KafkaConfig {
    pub(crate) fn from_env() -> Self {
        Self {
            brokers: env_or("KAFKA_BROKERS", DEFAULT_BROKERS),
            topic: env_or("KAFKA_TOPIC", DEFAULT_TOPIC),
            group_id: env_or("KAFKA_GROUP_ID", DEFAULT_GROUP_ID),
            exception_topic: env_or("KAFKA_EXCEPTION_TOPIC", DEFAULT_EXCEPTION_TOPIC),
            exception_group_id: env_or("KAFKA_EXCEPTION_GROUP_ID", DEFAULT_EXCEPTION_GROUP_ID),
            ssl_enabled: env_parse_or("KAFKA_SSL_ENABLED", false),
            ssl_ca_location: std::env::var("KAFKA_SSL_CA_LOCATION").ok(),
            sasl_mechanism: std::env::var("KAFKA_SASL_MECHANISM").ok(),
            sasl_username: std::env::var("KAFKA_SASL_USERNAME").ok(),
            sasl_password: std::env::var("KAFKA_SASL_PASSWORD").ok(),
            producer_compression: env_or(
                "KAFKA_PRODUCER_COMPRESSION",
                DEFAULT_PRODUCER_COMPRESSION,
            ),
            producer_acks: env_or("KAFKA_PRODUCER_ACKS", DEFAULT_PRODUCER_ACKS),
            producer_linger_ms: env_parse_or("KAFKA_PRODUCER_LINGER_MS", DEFAULT_PRODUCER_LINGER_MS),
            producer_batch_size: env_parse_or(
                "KAFKA_PRODUCER_BATCH_SIZE",
                DEFAULT_PRODUCER_BATCH_SIZE,
            ),
            producer_max_in_flight: env_parse_or(
                "KAFKA_PRODUCER_MAX_IN_FLIGHT",
                DEFAULT_PRODUCER_MAX_IN_FLIGHT,
            ),
            producer_retries: env_parse_or("KAFKA_PRODUCER_RETRIES", DEFAULT_PRODUCER_RETRIES),
            producer_request_timeout_ms: env_parse_or(
                "KAFKA_PRODUCER_REQUEST_TIMEOUT_MS",
                DEFAULT_PRODUCER_REQUEST_TIMEOUT_MS,
            ),
            producer_delivery_timeout_ms: env_parse_or(
                "KAFKA_PRODUCER_DELIVERY_TIMEOUT_MS",
                DEFAULT_PRODUCER_DELIVERY_TIMEOUT_MS,
            ),
            producer_enable_idempotence: env_parse_or("KAFKA_PRODUCER_ENABLE_IDEMPOTENCE", true),
            producer_send_timeout_ms: env_parse_or(
                "KAFKA_PRODUCER_SEND_TIMEOUT_MS",
                DEFAULT_PRODUCER_SEND_TIMEOUT_MS,
            ),
        }
    }

    /// Returns true when SASL credentials are fully specified
    pub fn has_sasl(&self) -> bool {
        self.sasl_mechanism.is_some() && self.sasl_username.is_some() && self.sasl_password.is_some()
    }
}
