use once_cell::sync::Lazy;
use prometheus::{Histogram, IntCounterVec, opts, register_histogram, register_int_counter_vec};

// ============================================================================
// Producer Metrics
// ============================================================================

/// Kafka producer success counter
pub static KAFKA_PRODUCE_SUCCESS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        opts!(
            "kafka_produce_success_total",
            "Total number of successful Kafka produce operations"
        ),
        &["topic"]
    )
    .expect("Failed to register kafka_produce_success_total metric")
});

/// Kafka producer failure counter
pub static KAFKA_PRODUCE_FAILURE: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        opts!(
            "kafka_produce_failure_total",
            "Total number of failed Kafka produce operations"
        ),
        &["topic"]
    )
    .expect("Failed to register kafka_produce_failure_total metric")
});

/// Kafka producer latency histogram
pub static KAFKA_PRODUCE_LATENCY: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "kafka_produce_latency_seconds",
        "Kafka produce operation latency in seconds",
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]
    )
    .expect("Failed to register kafka_produce_latency_seconds metric")
});

// ============================================================================
// Consumer Metrics
// ============================================================================

/// Messages handed to a handler that completed without error
pub static KAFKA_CONSUME_SUCCESS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        opts!(
            "kafka_consume_success_total",
            "Total number of Kafka messages handled successfully"
        ),
        &["topic"]
    )
    .expect("Failed to register kafka_consume_success_total metric")
});

/// Transport-level consume errors
pub static KAFKA_CONSUME_FAILURE: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        opts!(
            "kafka_consume_failure_total",
            "Total number of Kafka consumer transport errors"
        ),
        &["topic"]
    )
    .expect("Failed to register kafka_consume_failure_total metric")
});

/// Messages dropped because the payload did not match the topic schema
pub static DESERIALIZATION_FAILURE: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        opts!(
            "pipeline_deserialization_failure_total",
            "Messages dropped because they failed to deserialize"
        ),
        &["topic"]
    )
    .expect("Failed to register pipeline_deserialization_failure_total metric")
});

/// Handler invocations that returned an error or panicked
pub static HANDLER_FAILURE: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        opts!(
            "pipeline_handler_failure_total",
            "Handler invocations that failed or panicked"
        ),
        &["topic"]
    )
    .expect("Failed to register pipeline_handler_failure_total metric")
});

// ============================================================================
// Retry Metrics
// ============================================================================

/// Records published to an exception topic
pub static RETRY_PUBLISHED: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        opts!(
            "pipeline_retry_published_total",
            "Records published to the exception topic after a processing failure"
        ),
        &["topic"]
    )
    .expect("Failed to register pipeline_retry_published_total metric")
});

/// Retry publishes that failed; each one is a lost record
pub static RETRY_PUBLISH_FAILURE: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        opts!(
            "pipeline_retry_publish_failure_total",
            "Records lost because the exception topic publish failed"
        ),
        &["topic"]
    )
    .expect("Failed to register pipeline_retry_publish_failure_total metric")
});

/// Sum of a counter vector across all label values
pub fn total(counter: &IntCounterVec) -> u64 {
    use prometheus::core::Collector;

    counter
        .collect()
        .iter()
        .flat_map(|family| family.get_metric())
        .map(|metric| metric.get_counter().get_value() as u64)
        .sum()
}
