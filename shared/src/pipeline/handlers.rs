use async_trait::async_trait;
use std::marker::PhantomData;
use tracing::{debug, error, info, warn};

use super::processor::{Processor, run_processor};
use crate::kafka::consumer::RecordHandler;
use crate::kafka::metrics;
use crate::kafka::producer::MessageProducer;
use crate::kafka::types::{PipelineRecord, RetryEnvelope};

/// Handler for the main topic
///
/// Runs the processor on each record. A failed record is wrapped in a
/// [`RetryEnvelope`] and published to the exception topic; the failure is
/// never returned to the consumer loop.
pub struct PrimaryHandler<T, P> {
    processor: P,
    retry_producer: MessageProducer<RetryEnvelope<T>>,
    _record: PhantomData<fn(T)>,
}

impl<T, P> PrimaryHandler<T, P> {
    pub fn new(processor: P, retry_producer: MessageProducer<RetryEnvelope<T>>) -> Self {
        Self {
            processor,
            retry_producer,
            _record: PhantomData,
        }
    }
}

#[async_trait]
impl<T, P> RecordHandler<T> for PrimaryHandler<T, P>
where
    T: PipelineRecord,
    P: Processor<T>,
{
    async fn handle(&self, record: T) -> anyhow::Result<()> {
        let failure = match run_processor(&self.processor, &record) {
            Ok(()) => {
                debug!(record_key = %record.record_key(), "Record processed");
                return Ok(());
            }
            Err(e) => format!("{:#}", e),
        };

        warn!(
            record_key = %record.record_key(),
            error = %failure,
            "Processing failed, routing record to exception topic"
        );
        publish_retry(&self.retry_producer, RetryEnvelope::wrap(record, failure)).await;
        Ok(())
    }
}

/// Handler for the exception topic
///
/// Runs the processor on the wrapped record. A record that fails again is
/// re-enqueued with [`RetryEnvelope::next_attempt`], so the envelope never
/// nests and the cycle continues until the processor succeeds.
pub struct RetryHandler<T, P> {
    processor: P,
    retry_producer: MessageProducer<RetryEnvelope<T>>,
    _record: PhantomData<fn(T)>,
}

impl<T, P> RetryHandler<T, P> {
    pub fn new(processor: P, retry_producer: MessageProducer<RetryEnvelope<T>>) -> Self {
        Self {
            processor,
            retry_producer,
            _record: PhantomData,
        }
    }
}

#[async_trait]
impl<T, P> RecordHandler<RetryEnvelope<T>> for RetryHandler<T, P>
where
    T: PipelineRecord,
    P: Processor<T>,
{
    async fn handle(&self, envelope: RetryEnvelope<T>) -> anyhow::Result<()> {
        let failure = match run_processor(&self.processor, &envelope.message) {
            Ok(()) => {
                info!(
                    record_key = %envelope.record_key(),
                    attempt = envelope.attempt,
                    "Retried record processed"
                );
                return Ok(());
            }
            Err(e) => format!("{:#}", e),
        };

        warn!(
            record_key = %envelope.record_key(),
            attempt = envelope.attempt,
            error = %failure,
            "Retry failed, re-enqueueing record"
        );
        publish_retry(&self.retry_producer, envelope.next_attempt(failure)).await;
        Ok(())
    }
}

/// Publish `envelope` keyed by its record. A failed publish loses the record.
async fn publish_retry<T>(producer: &MessageProducer<RetryEnvelope<T>>, envelope: RetryEnvelope<T>)
where
    T: PipelineRecord,
{
    let key = envelope.record_key();

    match producer.publish_keyed(Some(&key), &envelope).await {
        Ok(ack) => {
            metrics::RETRY_PUBLISHED
                .with_label_values(&[producer.topic()])
                .inc();
            debug!(
                record_key = %key,
                topic = %ack.topic,
                partition = ack.partition,
                offset = ack.offset,
                attempt = envelope.attempt,
                "Record published to exception topic"
            );
        }
        Err(e) => {
            metrics::RETRY_PUBLISH_FAILURE
                .with_label_values(&[producer.topic()])
                .inc();
            error!(
                record_key = %key,
                topic = %producer.topic(),
                attempt = envelope.attempt,
                error = %e,
                error_code = e.error_code(),
                "Failed to publish record to exception topic, record dropped"
            );
        }
    }
}
