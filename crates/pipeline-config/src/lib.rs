// ============================================================================
// Pipeline Config - Centralized configuration management
// ============================================================================
//
// Configuration for the retry pipeline worker and its helper binaries.
// Everything is loaded from environment variables (optionally via .env)
// with sensible defaults for a local single-broker setup.
//
// ============================================================================

mod constants;
mod consumer;
mod kafka;
mod logging;

pub use consumer::ConsumerConfig;
pub use kafka::KafkaConfig;
pub use logging::LoggingConfig;

use anyhow::{Result, bail};
use constants::*;
use std::str::FromStr;
use std::time::Duration;

/// Main configuration structure for the pipeline worker
#[derive(Clone, Debug)]
pub struct Config {
    pub rust_log: String,
    /// How often the worker logs a metrics summary (0 disables it)
    pub metrics_log_interval_secs: u64,
    /// Upper bound for the producer flush on shutdown
    pub shutdown_flush_timeout_secs: u64,

    // Sub-configurations
    pub logging: LoggingConfig,
    pub kafka: KafkaConfig,
    pub consumer: ConsumerConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rust_log: "info".to_string(),
            metrics_log_interval_secs: DEFAULT_METRICS_LOG_INTERVAL_SECS,
            shutdown_flush_timeout_secs: DEFAULT_SHUTDOWN_FLUSH_TIMEOUT_SECS,
            logging: LoggingConfig::default(),
            kafka: KafkaConfig::default(),
            consumer: ConsumerConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            rust_log: env_or("RUST_LOG", "info"),
            metrics_log_interval_secs: env_parse_or(
                "METRICS_LOG_INTERVAL_SECS",
                DEFAULT_METRICS_LOG_INTERVAL_SECS,
            ),
            shutdown_flush_timeout_secs: env_parse_or(
                "SHUTDOWN_FLUSH_TIMEOUT_SECS",
                DEFAULT_SHUTDOWN_FLUSH_TIMEOUT_SECS,
            ),
            logging: LoggingConfig::from_env(),
            kafka: KafkaConfig::from_env(),
            consumer: ConsumerConfig::from_env(),
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject topologies the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        let kafka = &self.kafka;
        for (name, value) in [
            ("KAFKA_BROKERS", &kafka.brokers),
            ("KAFKA_TOPIC", &kafka.topic),
            ("KAFKA_GROUP_ID", &kafka.group_id),
            ("KAFKA_EXCEPTION_TOPIC", &kafka.exception_topic),
            ("KAFKA_EXCEPTION_GROUP_ID", &kafka.exception_group_id),
        ] {
            if value.trim().is_empty() {
                bail!("{} must not be empty", name);
            }
        }

        // Retry envelopes on the main topic would fail to deserialize as Input
        if kafka.topic == kafka.exception_topic {
            bail!(
                "KAFKA_EXCEPTION_TOPIC must differ from KAFKA_TOPIC (both are '{}')",
                kafka.topic
            );
        }

        if kafka.sasl_mechanism.is_some() && !kafka.has_sasl() {
            tracing::warn!(
                "KAFKA_SASL_MECHANISM is set but username/password are missing; SASL will not be configured"
            );
        }

        Ok(())
    }

    pub fn shutdown_flush_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_flush_timeout_secs)
    }

    /// Period of the worker's metrics summary, `None` when disabled
    pub fn metrics_log_interval(&self) -> Option<Duration> {
        match self.metrics_log_interval_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}

pub(crate) fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

pub(crate) fn env_parse_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.kafka.brokers, "localhost:9092");
        assert_eq!(config.kafka.topic, "input");
        assert_eq!(config.kafka.exception_topic, "input-exceptions");
        assert_eq!(config.consumer.auto_offset_reset, "earliest");
    }

    #[test]
    fn test_zero_metrics_interval_disables_summary() {
        let mut config = Config::default();
        assert_eq!(config.metrics_log_interval(), Some(Duration::from_secs(30)));

        config.metrics_log_interval_secs = 0;
        assert_eq!(config.metrics_log_interval(), None);
    }

    #[test]
    fn test_same_main_and_exception_topic_rejected() {
        let mut config = Config::default();
        config.kafka.exception_topic = config.kafka.topic.clone();

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("must differ"));
    }

    #[test]
    fn test_empty_group_rejected() {
        let mut config = Config::default();
        config.kafka.exception_group_id = "  ".to_string();

        let err = config.validate().unwrap_err();
        assert_eq!(err.to_string(), "KAFKA_EXCEPTION_GROUP_ID must not be empty");
    }

    #[test]
    #[serial]
    fn test_from_env_reads_topology() {
        // SAFETY: serialized with other env-mutating tests
        unsafe {
            std::env::set_var("KAFKA_BROKERS", "k1:9092,k2:9092");
            std::env::set_var("KAFKA_TOPIC", "orders");
            std::env::set_var("KAFKA_EXCEPTION_TOPIC", "orders-retry");
            std::env::set_var("KAFKA_CONSUMER_ERROR_PAUSE_MS", "250");
            std::env::set_var("KAFKA_PRODUCER_LINGER_MS", "not-a-number");
        }

        let config = Config::from_env().unwrap();

        unsafe {
            std::env::remove_var("KAFKA_BROKERS");
            std::env::remove_var("KAFKA_TOPIC");
            std::env::remove_var("KAFKA_EXCEPTION_TOPIC");
            std::env::remove_var("KAFKA_CONSUMER_ERROR_PAUSE_MS");
            std::env::remove_var("KAFKA_PRODUCER_LINGER_MS");
        }

        assert_eq!(config.kafka.brokers, "k1:9092,k2:9092");
        assert_eq!(config.kafka.topic, "orders");
        assert_eq!(config.kafka.exception_topic, "orders-retry");
        assert_eq!(config.consumer.error_pause(), Duration::from_millis(250));
        // Unparseable values fall back to the default
        assert_eq!(config.kafka.producer_linger_ms, 10);
    }

    #[test]
    #[serial]
    fn test_from_env_rejects_colliding_topics() {
        unsafe {
            std::env::set_var("KAFKA_TOPIC", "same");
            std::env::set_var("KAFKA_EXCEPTION_TOPIC", "same");
        }

        let result = Config::from_env();

        unsafe {
            std::env::remove_var("KAFKA_TOPIC");
            std::env::remove_var("KAFKA_EXCEPTION_TOPIC");
        }

        assert!(result.is_err());
    }
}
