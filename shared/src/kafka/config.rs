use pipeline_config::{ConsumerConfig, KafkaConfig};
use rdkafka::config::ClientConfig;
use tracing::info;

/// Creates a new `rdkafka::config::ClientConfig` from the application's `KafkaConfig`.
///
/// Producers and consumers both start from this so they agree on brokers
/// and security settings.
///
/// It handles:
/// - Setting up bootstrap servers.
/// - Enabling SSL/TLS (optionally with a custom CA) if `ssl_enabled` is true.
/// - Configuring SASL authentication if mechanism, username and password are provided.
pub fn create_client_config(config: &KafkaConfig) -> ClientConfig {
    let mut client_config = ClientConfig::new();
    client_config.set("bootstrap.servers", &config.brokers);

    // Default to plaintext if SSL is not explicitly enabled and no SASL.
    client_config.set("security.protocol", "plaintext");

    if config.ssl_enabled {
        info!("Enabling SSL/TLS for Kafka connection");
        client_config.set("security.protocol", "ssl");

        if let Some(ca_location) = &config.ssl_ca_location {
            client_config.set("ssl.ca.location", ca_location);
        }
    }

    if let (Some(mechanism), Some(username), Some(password)) = (
        &config.sasl_mechanism,
        &config.sasl_username,
        &config.sasl_password,
    ) {
        info!(sasl_mechanism = %mechanism, "Configuring SASL authentication");
        client_config
            .set("sasl.mechanism", mechanism)
            .set("sasl.username", username)
            .set("sasl.password", password);

        if config.ssl_enabled {
            client_config.set("security.protocol", "sasl_ssl");
        } else {
            client_config.set("security.protocol", "sasl_plaintext");
        }
    }

    client_config
}

/// Client configuration for a pipeline consumer in `group_id`.
///
/// - `enable.partition.eof=true`: end-of-partition is reported to the loop, which skips it.
/// - `enable.auto.offset.store=false`: the loop stores an offset only after the
///   message has been handled; auto-commit then checkpoints stored offsets.
/// - `auto.offset.reset`: from `ConsumerConfig` (default "earliest").
pub fn create_consumer_config(
    config: &KafkaConfig,
    consumer: &ConsumerConfig,
    group_id: &str,
) -> ClientConfig {
    let mut client_config = create_client_config(config);
    client_config
        .set("group.id", group_id)
        // Offset management
        .set("enable.auto.commit", "true")
        .set("enable.auto.offset.store", "false")
        .set("auto.offset.reset", &consumer.auto_offset_reset)
        .set("enable.partition.eof", "true")
        .set("allow.auto.create.topics", "true")
        // Session management
        .set("session.timeout.ms", consumer.session_timeout_ms.to_string())
        .set(
            "heartbeat.interval.ms",
            consumer.heartbeat_interval_ms.to_string(),
        )
        .set(
            "max.poll.interval.ms",
            consumer.max_poll_interval_ms.to_string(),
        );
    client_config
}

/// Client configuration for a pipeline producer.
pub fn create_producer_config(config: &KafkaConfig) -> ClientConfig {
    let mut client_config = create_client_config(config);
    client_config
        // Reliability settings
        .set("acks", &config.producer_acks)
        .set(
            "enable.idempotence",
            if config.producer_enable_idempotence {
                "true"
            } else {
                "false"
            },
        )
        .set(
            "max.in.flight.requests.per.connection",
            config.producer_max_in_flight.to_string(),
        )
        .set("retries", config.producer_retries.to_string())
        // Performance settings
        .set("compression.type", &config.producer_compression)
        .set("linger.ms", config.producer_linger_ms.to_string())
        .set("batch.size", config.producer_batch_size.to_string())
        // Timeout settings
        .set(
            "request.timeout.ms",
            config.producer_request_timeout_ms.to_string(),
        )
        .set(
            "delivery.timeout.ms",
            config.producer_delivery_timeout_ms.to_string(),
        );
    client_config
}
