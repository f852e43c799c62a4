// ============================================================================
// Kafka Pipeline Test
// ============================================================================
//
// Runs the retry pipeline against a real broker. Requires Kafka reachable at
// KAFKA_BROKERS (default localhost:9092) with topic auto-creation enabled:
//
//   cargo test -p pipeline-shared --test kafka_pipeline_test -- --ignored
//
// ============================================================================


use pipeline_config::Config;
use pipeline_shared::kafka::{Input, MessageProducer, ProducerBinding};
use pipeline_shared::pipeline::RetryPipeline;
use serial_test::serial;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use test_utils::{Seen, init_tracing, wait_until};

fn isolated_config() -> Config {
    let suffix = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_millis();

    let mut config = Config::default();
    if let Ok(brokers) = std::env::var("KAFKA_BROKERS") {
        config.kafka.brokers = brokers;
    }
    config.kafka.topic = format!("pipeline-test-input-{}", suffix);
    config.kafka.group_id = format!("pipeline-test-processors-{}", suffix);
    config.kafka.exception_topic = format!("pipeline-test-exceptions-{}", suffix);
    config.kafka.exception_group_id = format!("pipeline-test-retry-{}", suffix);
    config.validate().unwrap();
    config
}

#[tokio::test]
#[ignore = "requires a running Kafka broker"]
#[serial]
async fn test_failed_input_round_trips_through_kafka() {
    init_tracing();
    let config = isolated_config();

    let producer: MessageProducer<Input> =
        MessageProducer::new(&config.kafka, ProducerBinding::main(&config.kafka)).unwrap();
    producer.publish(&Input::new(1)).await.unwrap();
    producer.publish(&Input::new(2)).await.unwrap();

    let processed = Seen::default();
    let retried = Seen::default();
    let (main_seen, retry_seen) = (processed.clone(), retried.clone());

    let pipeline = RetryPipeline::<Input>::from_config(&config).unwrap();
    let retry_producer = pipeline.retry_producer().clone();
    let handles = pipeline.start(
        move |input: &Input| -> anyhow::Result<()> {
            main_seen.push(input.id);
            anyhow::ensure!(input.id != 1, "input 1 rejected");
            Ok(())
        },
        move |input: &Input| -> anyhow::Result<()> {
            retry_seen.push(input.id);
            Ok(())
        },
    );

    let timeout = Duration::from_secs(60);
    assert!(wait_until(timeout, || processed.len() == 2).await);
    assert!(wait_until(timeout, || retried.ids() == vec![1]).await);

    handles.shutdown().await;
    retry_producer.flush(Duration::from_secs(5)).await.unwrap();
}
