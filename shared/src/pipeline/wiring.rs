use anyhow::Context;
use pipeline_config::Config;
use tracing::info;

use super::handlers::{PrimaryHandler, RetryHandler};
use super::processor::Processor;
use crate::kafka::consumer::{ConsumerHandle, MessageConsumer};
use crate::kafka::producer::MessageProducer;
use crate::kafka::types::{ConsumerBinding, PipelineRecord, ProducerBinding, RetryEnvelope};

/// The two consumers and the shared exception-topic producer, ready to start
pub struct RetryPipeline<T> {
    main: MessageConsumer<T>,
    exception: MessageConsumer<RetryEnvelope<T>>,
    retry_producer: MessageProducer<RetryEnvelope<T>>,
}

impl<T: PipelineRecord> RetryPipeline<T> {
    /// Connect both consumers and the exception producer to Kafka
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let retry_producer =
            MessageProducer::new(&config.kafka, ProducerBinding::exception(&config.kafka))
                .context("Failed to create exception topic producer")?;

        let main = MessageConsumer::new(
            &config.kafka,
            &config.consumer,
            ConsumerBinding::main(&config.kafka),
        )
        .context("Failed to create main topic consumer")?
        .with_payload_logging(config.logging.log_payloads);

        let exception = MessageConsumer::new(
            &config.kafka,
            &config.consumer,
            ConsumerBinding::exception(&config.kafka),
        )
        .context("Failed to create exception topic consumer")?
        .with_payload_logging(config.logging.log_payloads);

        Ok(Self::new(main, exception, retry_producer))
    }

    pub fn new(
        main: MessageConsumer<T>,
        exception: MessageConsumer<RetryEnvelope<T>>,
        retry_producer: MessageProducer<RetryEnvelope<T>>,
    ) -> Self {
        Self {
            main,
            exception,
            retry_producer,
        }
    }

    /// Producer both handlers publish failed records through
    pub fn retry_producer(&self) -> &MessageProducer<RetryEnvelope<T>> {
        &self.retry_producer
    }

    /// Start both consumer loops.
    ///
    /// `processor` runs on main-topic records and `retry_processor` on records
    /// taken back off the exception topic.
    pub fn start<P, R>(self, processor: P, retry_processor: R) -> PipelineHandles
    where
        P: Processor<T>,
        R: Processor<T>,
    {
        info!(
            main_topic = %self.main.binding().topic,
            main_group = %self.main.binding().group_id,
            exception_topic = %self.exception.binding().topic,
            exception_group = %self.exception.binding().group_id,
            "Starting retry pipeline"
        );

        let primary = PrimaryHandler::new(processor, self.retry_producer.clone());
        let retry = RetryHandler::new(retry_processor, self.retry_producer);

        PipelineHandles {
            main: self.main.start_receiving(primary),
            exception: self.exception.start_receiving(retry),
        }
    }
}

/// Handles of the two running consumer loops
pub struct PipelineHandles {
    pub main: ConsumerHandle,
    pub exception: ConsumerHandle,
}

impl PipelineHandles {
    pub fn cancel(&self) {
        self.main.cancel();
        self.exception.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.main.is_closed() && self.exception.is_closed()
    }

    /// Cancel both loops and wait until both transports are released
    pub async fn shutdown(self) {
        info!("Shutting down retry pipeline");
        self.cancel();
        tokio::join!(self.main.closed(), self.exception.closed());
        info!("Retry pipeline stopped");
    }
}
