use async_trait::async_trait;
use futures_util::FutureExt;
use pipeline_config::{ConsumerConfig, KafkaConfig};
use pipeline_error::{PipelineError, PipelineResult};
use serde::de::DeserializeOwned;
use std::marker::PhantomData;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::metrics;
use super::transport::{KafkaSource, MessageSource};
use super::types::{ConsumerBinding, Delivery, ReceivedMessage};
use crate::utils::{panic_message, payload_preview};

/// Callback invoked by a consumer loop for every decoded record
///
/// The loop awaits the handler before receiving the next message. Errors and
/// panics are logged by the loop and never stop it.
#[async_trait]
pub trait RecordHandler<T>: Send + Sync + 'static {
    async fn handle(&self, record: T) -> anyhow::Result<()>;
}

/// Consumer lifecycle. Closed is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConsumerState {
    /// Bound to a topic and group, not subscribed
    Created = 0,
    /// Attached to the topic under the group
    Subscribed = 1,
    /// Loop running
    Receiving = 2,
    /// Cancellation requested, loop not yet exited
    Cancelling = 3,
    /// Transport released
    Closed = 4,
}

impl ConsumerState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ConsumerState::Created,
            1 => ConsumerState::Subscribed,
            2 => ConsumerState::Receiving,
            3 => ConsumerState::Cancelling,
            _ => ConsumerState::Closed,
        }
    }
}

/// Typed consumer of one topic under one consumer group
///
/// The consumer exclusively owns its transport. [`start_receiving`] consumes
/// it, so a consumer can only ever run one loop and cannot be restarted
/// after it has closed.
///
/// [`start_receiving`]: MessageConsumer::start_receiving
pub struct MessageConsumer<T> {
    binding: ConsumerBinding,
    source: Box<dyn MessageSource>,
    state: ConsumerState,
    error_pause: Duration,
    log_payloads: bool,
    _record: PhantomData<fn() -> T>,
}

impl<T> MessageConsumer<T>
where
    T: DeserializeOwned + Send + 'static,
{
    /// Create a Kafka consumer for `binding` and subscribe it.
    ///
    /// # Configuration
    /// - `enable.partition.eof=true`: end-of-partition markers are skipped by the loop.
    /// - `auto.offset.reset=earliest`: Read from beginning on first start.
    /// - Offsets are stored after each handled message and auto-committed.
    pub fn new(
        config: &KafkaConfig,
        consumer_config: &ConsumerConfig,
        binding: ConsumerBinding,
    ) -> anyhow::Result<Self> {
        let source = KafkaSource::create(config, consumer_config, &binding.group_id)?;

        let mut consumer = Self::with_source(binding, Box::new(source))
            .with_error_pause(consumer_config.error_pause());
        consumer.subscribe()?;

        info!(
            topic = %consumer.binding.topic,
            group_id = %consumer.binding.group_id,
            "Kafka consumer initialized"
        );
        Ok(consumer)
    }

    /// Bind a consumer to an arbitrary transport. The result is not yet subscribed.
    pub fn with_source(binding: ConsumerBinding, source: Box<dyn MessageSource>) -> Self {
        Self {
            binding,
            source,
            state: ConsumerState::Created,
            error_pause: Duration::from_secs(1),
            log_payloads: false,
            _record: PhantomData,
        }
    }

    /// Pause after a transport error before receiving again
    pub fn with_error_pause(mut self, pause: Duration) -> Self {
        self.error_pause = pause;
        self
    }

    /// Include raw payloads in deserialization warnings
    pub fn with_payload_logging(mut self, enabled: bool) -> Self {
        self.log_payloads = enabled;
        self
    }

    /// Attach to the bound topic. Subscribing twice is a no-op.
    pub fn subscribe(&mut self) -> PipelineResult<()> {
        if self.state == ConsumerState::Subscribed {
            return Ok(());
        }
        self.source.subscribe(&self.binding.topic)?;
        self.state = ConsumerState::Subscribed;
        Ok(())
    }

    pub fn binding(&self) -> &ConsumerBinding {
        &self.binding
    }

    pub fn state(&self) -> ConsumerState {
        self.state
    }

    /// Spawn the receive loop and return immediately.
    ///
    /// The loop runs until the handle is cancelled or the transport is
    /// exhausted, then releases the transport exactly once. A consumer that
    /// was never subscribed is closed without receiving anything.
    pub fn start_receiving<H>(self, handler: H) -> ConsumerHandle
    where
        H: RecordHandler<T>,
    {
        let token = CancellationToken::new();
        let subscribed = self.state == ConsumerState::Subscribed;
        let initial = if subscribed {
            ConsumerState::Receiving
        } else {
            ConsumerState::Closed
        };
        let state = Arc::new(AtomicU8::new(initial as u8));
        let topic = self.binding.topic.clone();

        let task = if subscribed {
            tokio::spawn(self.run(handler, token.clone(), state.clone()))
        } else {
            let mut consumer = self;
            let err = PipelineError::NotSubscribed {
                topic: consumer.binding.topic.clone(),
            };
            error!(
                topic = %consumer.binding.topic,
                error = %err,
                "Refusing to start consumer loop"
            );
            consumer.source.close();
            tokio::spawn(async {})
        };

        ConsumerHandle {
            topic,
            token,
            state,
            task,
        }
    }

    async fn run<H>(mut self, handler: H, token: CancellationToken, state: Arc<AtomicU8>)
    where
        H: RecordHandler<T>,
    {
        info!(
            topic = %self.binding.topic,
            group_id = %self.binding.group_id,
            "Consumer loop started"
        );

        loop {
            let next = tokio::select! {
                biased;
                _ = token.cancelled() => break,
                next = self.source.recv() => next,
            };

            match next {
                Ok(Some(Delivery::Message(message))) => {
                    dispatch::<T, H>(&handler, &message, self.log_payloads).await;

                    if let Err(e) = self.source.ack(&message) {
                        warn!(
                            topic = %message.topic,
                            partition = message.partition,
                            offset = message.offset,
                            error = %e,
                            "Failed to store consumer offset"
                        );
                    }
                }
                Ok(Some(Delivery::PartitionEof {
                    topic,
                    partition,
                    offset,
                })) => {
                    debug!(
                        topic = %topic,
                        partition = partition,
                        offset = offset,
                        "Reached end of partition"
                    );
                }
                Ok(None) => {
                    info!(topic = %self.binding.topic, "Message source exhausted");
                    break;
                }
                Err(e) => {
                    metrics::KAFKA_CONSUME_FAILURE
                        .with_label_values(&[self.binding.topic.as_str()])
                        .inc();
                    error!(
                        topic = %self.binding.topic,
                        group_id = %self.binding.group_id,
                        error = %e,
                        error_code = e.error_code(),
                        "Kafka consume error"
                    );

                    if !self.error_pause.is_zero() {
                        tokio::select! {
                            biased;
                            _ = token.cancelled() => break,
                            _ = tokio::time::sleep(self.error_pause) => {}
                        }
                    }
                }
            }
        }

        if token.is_cancelled() {
            info!(topic = %self.binding.topic, "Closing consumer");
        }
        self.source.close();
        state.store(ConsumerState::Closed as u8, Ordering::SeqCst);

        info!(
            topic = %self.binding.topic,
            group_id = %self.binding.group_id,
            "Consumer closed"
        );
    }
}

/// Decode and hand one message to the handler, containing every failure
async fn dispatch<T, H>(handler: &H, message: &ReceivedMessage, log_payloads: bool)
where
    T: DeserializeOwned + Send + 'static,
    H: RecordHandler<T>,
{
    let record: T = match decode(message) {
        Ok(record) => record,
        Err(e) => {
            metrics::DESERIALIZATION_FAILURE
                .with_label_values(&[message.topic.as_str()])
                .inc();

            if log_payloads {
                let preview = message.payload.as_deref().map(payload_preview);
                warn!(
                    topic = %message.topic,
                    partition = message.partition,
                    offset = message.offset,
                    error = %e,
                    payload = ?preview,
                    "Dropping message that failed to deserialize"
                );
            } else {
                warn!(
                    topic = %message.topic,
                    partition = message.partition,
                    offset = message.offset,
                    error = %e,
                    "Dropping message that failed to deserialize"
                );
            }
            return;
        }
    };

    let outcome = AssertUnwindSafe(handler.handle(record))
        .catch_unwind()
        .await;

    match outcome {
        Ok(Ok(())) => {
            metrics::KAFKA_CONSUME_SUCCESS
                .with_label_values(&[message.topic.as_str()])
                .inc();
            debug!(
                topic = %message.topic,
                partition = message.partition,
                offset = message.offset,
                "Message handled"
            );
        }
        Ok(Err(e)) => {
            metrics::HANDLER_FAILURE
                .with_label_values(&[message.topic.as_str()])
                .inc();
            let e = PipelineError::Handler(e);
            error!(
                topic = %message.topic,
                partition = message.partition,
                offset = message.offset,
                error = %e,
                error_code = e.error_code(),
                "Error inside handler"
            );
        }
        Err(panic) => {
            metrics::HANDLER_FAILURE
                .with_label_values(&[message.topic.as_str()])
                .inc();
            error!(
                topic = %message.topic,
                partition = message.partition,
                offset = message.offset,
                panic = %panic_message(panic.as_ref()),
                "Handler panicked"
            );
        }
    }
}

/// Decode a message payload as `T`
pub fn decode<T: DeserializeOwned>(message: &ReceivedMessage) -> PipelineResult<T> {
    let payload = message
        .payload
        .as_deref()
        .ok_or_else(|| PipelineError::EmptyPayload {
            topic: message.topic.clone(),
            partition: message.partition,
            offset: message.offset,
        })?;

    serde_json::from_slice(payload).map_err(|source| PipelineError::Deserialization {
        topic: message.topic.clone(),
        partition: message.partition,
        offset: message.offset,
        source,
    })
}

/// Lifecycle handle of a running consumer loop
///
/// Dropping the handle does not stop the loop.
pub struct ConsumerHandle {
    topic: String,
    token: CancellationToken,
    state: Arc<AtomicU8>,
    task: JoinHandle<()>,
}

impl ConsumerHandle {
    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn state(&self) -> ConsumerState {
        ConsumerState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub fn is_closed(&self) -> bool {
        self.state() == ConsumerState::Closed
    }

    /// Signal the loop to stop. Safe to call more than once.
    ///
    /// Cancellation is cooperative: the loop observes it at its next wait,
    /// so a handler that is mid-flight runs to completion first.
    pub fn cancel(&self) {
        if self.token.is_cancelled() {
            debug!(topic = %self.topic, "Consumer already cancelled");
            return;
        }

        let _ = self.state.compare_exchange(
            ConsumerState::Receiving as u8,
            ConsumerState::Cancelling as u8,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
        self.token.cancel();
        info!(topic = %self.topic, "Consumer cancellation requested");
    }

    /// Wait for the loop to exit and the transport to be released
    pub async fn closed(self) {
        if let Err(e) = self.task.await {
            error!(topic = %self.topic, error = %e, "Consumer task failed");
        }
    }

    /// Cancel and wait for the loop to close
    pub async fn shutdown(self) {
        self.cancel();
        self.closed().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kafka::types::Input;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::AtomicUsize;

    /// Finite source that replays a script, then reports exhaustion
    struct ScriptedSource {
        script: VecDeque<PipelineResult<Delivery>>,
        acked: Arc<Mutex<Vec<i64>>>,
        closes: Arc<AtomicUsize>,
    }

    impl ScriptedSource {
        fn new(script: Vec<PipelineResult<Delivery>>) -> Self {
            Self {
                script: script.into(),
                acked: Arc::new(Mutex::new(Vec::new())),
                closes: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    #[async_trait]
    impl MessageSource for ScriptedSource {
        fn subscribe(&mut self, _topic: &str) -> PipelineResult<()> {
            Ok(())
        }

        async fn recv(&mut self) -> PipelineResult<Option<Delivery>> {
            self.script.pop_front().transpose()
        }

        fn ack(&mut self, message: &ReceivedMessage) -> PipelineResult<()> {
            self.acked.lock().unwrap().push(message.offset);
            Ok(())
        }

        fn close(&mut self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct RecordingHandler {
        seen: Arc<Mutex<Vec<i64>>>,
    }

    #[async_trait]
    impl RecordHandler<Input> for RecordingHandler {
        async fn handle(&self, record: Input) -> anyhow::Result<()> {
            self.seen.lock().unwrap().push(record.id);
            Ok(())
        }
    }

    fn message(topic: &str, offset: i64, payload: &[u8]) -> PipelineResult<Delivery> {
        Ok(Delivery::Message(ReceivedMessage {
            topic: topic.to_string(),
            partition: 0,
            offset,
            key: None,
            payload: Some(payload.to_vec()),
        }))
    }

    fn binding(topic: &str) -> ConsumerBinding {
        ConsumerBinding::new("memory", topic, "unit-tests")
    }

    #[tokio::test]
    async fn test_malformed_payload_does_not_stop_loop() {
        let topic = "consumer-unit-malformed";
        let source = ScriptedSource::new(vec![
            message(topic, 0, b"{not json"),
            message(topic, 1, br#"{"id":1}"#),
            message(topic, 2, br#"{"id":2}"#),
            message(topic, 3, br#"{"id":3}"#),
        ]);
        let acked = source.acked.clone();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let mut consumer: MessageConsumer<Input> =
            MessageConsumer::with_source(binding(topic), Box::new(source));
        consumer.subscribe().unwrap();
        consumer
            .start_receiving(RecordingHandler { seen: seen.clone() })
            .closed()
            .await;

        assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3]);
        // The malformed message is dropped, but its offset still advances
        assert_eq!(*acked.lock().unwrap(), vec![0, 1, 2, 3]);
        assert_eq!(
            metrics::DESERIALIZATION_FAILURE
                .with_label_values(&[topic])
                .get(),
            1
        );
    }

    #[tokio::test]
    async fn test_empty_payload_is_dropped() {
        let topic = "consumer-unit-empty";
        let source = ScriptedSource::new(vec![
            Ok(Delivery::Message(ReceivedMessage {
                topic: topic.to_string(),
                partition: 0,
                offset: 0,
                key: None,
                payload: None,
            })),
            message(topic, 1, br#"{"id":9}"#),
        ]);
        let seen = Arc::new(Mutex::new(Vec::new()));

        let mut consumer: MessageConsumer<Input> =
            MessageConsumer::with_source(binding(topic), Box::new(source));
        consumer.subscribe().unwrap();
        consumer
            .start_receiving(RecordingHandler { seen: seen.clone() })
            .closed()
            .await;

        assert_eq!(*seen.lock().unwrap(), vec![9]);
    }

    #[tokio::test]
    async fn test_partition_eof_is_skipped() {
        let topic = "consumer-unit-eof";
        let source = ScriptedSource::new(vec![
            Ok(Delivery::PartitionEof {
                topic: topic.to_string(),
                partition: 0,
                offset: 0,
            }),
            message(topic, 0, br#"{"id":5}"#),
            Ok(Delivery::PartitionEof {
                topic: topic.to_string(),
                partition: 0,
                offset: 1,
            }),
        ]);
        let acked = source.acked.clone();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let mut consumer: MessageConsumer<Input> =
            MessageConsumer::with_source(binding(topic), Box::new(source));
        consumer.subscribe().unwrap();
        consumer
            .start_receiving(RecordingHandler { seen: seen.clone() })
            .closed()
            .await;

        assert_eq!(*seen.lock().unwrap(), vec![5]);
        assert_eq!(*acked.lock().unwrap(), vec![0]);
        assert_eq!(
            metrics::KAFKA_CONSUME_FAILURE.with_label_values(&[topic]).get(),
            0
        );
    }

    #[tokio::test]
    async fn test_transport_error_is_not_fatal() {
        let topic = "consumer-unit-transport";
        let source = ScriptedSource::new(vec![
            Err(PipelineError::Transport("broker unreachable".to_string())),
            message(topic, 0, br#"{"id":1}"#),
        ]);
        let seen = Arc::new(Mutex::new(Vec::new()));

        let mut consumer: MessageConsumer<Input> =
            MessageConsumer::with_source(binding(topic), Box::new(source))
                .with_error_pause(Duration::ZERO);
        consumer.subscribe().unwrap();
        consumer
            .start_receiving(RecordingHandler { seen: seen.clone() })
            .closed()
            .await;

        assert_eq!(*seen.lock().unwrap(), vec![1]);
        assert_eq!(
            metrics::KAFKA_CONSUME_FAILURE.with_label_values(&[topic]).get(),
            1
        );
    }

    struct FlakyHandler {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl RecordHandler<Input> for FlakyHandler {
        async fn handle(&self, record: Input) -> anyhow::Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match record.id {
                1 => anyhow::bail!("processing failed for {}", record.id),
                2 => panic!("handler blew up"),
                _ => Ok(()),
            }
        }
    }

    #[tokio::test]
    async fn test_handler_errors_and_panics_are_contained() {
        let topic = "consumer-unit-handler";
        let source = ScriptedSource::new(vec![
            message(topic, 0, br#"{"id":1}"#),
            message(topic, 1, br#"{"id":2}"#),
            message(topic, 2, br#"{"id":3}"#),
        ]);
        let handler = Arc::new(FlakyHandler {
            calls: AtomicUsize::new(0),
        });

        struct Shared(Arc<FlakyHandler>);

        #[async_trait]
        impl RecordHandler<Input> for Shared {
            async fn handle(&self, record: Input) -> anyhow::Result<()> {
                self.0.handle(record).await
            }
        }

        let mut consumer: MessageConsumer<Input> =
            MessageConsumer::with_source(binding(topic), Box::new(source));
        consumer.subscribe().unwrap();
        consumer
            .start_receiving(Shared(handler.clone()))
            .closed()
            .await;

        assert_eq!(handler.calls.load(Ordering::SeqCst), 3);
        assert_eq!(metrics::HANDLER_FAILURE.with_label_values(&[topic]).get(), 2);
        assert_eq!(
            metrics::KAFKA_CONSUME_SUCCESS.with_label_values(&[topic]).get(),
            1
        );
    }

    /// Source that blocks forever, like an idle topic
    struct IdleSource {
        closes: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl MessageSource for IdleSource {
        fn subscribe(&mut self, _topic: &str) -> PipelineResult<()> {
            Ok(())
        }

        async fn recv(&mut self) -> PipelineResult<Option<Delivery>> {
            std::future::pending().await
        }

        fn ack(&mut self, _message: &ReceivedMessage) -> PipelineResult<()> {
            Ok(())
        }

        fn close(&mut self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_cancel_releases_transport_exactly_once() {
        let closes = Arc::new(AtomicUsize::new(0));
        let source = IdleSource {
            closes: closes.clone(),
        };

        let mut consumer: MessageConsumer<Input> =
            MessageConsumer::with_source(binding("consumer-unit-cancel"), Box::new(source));
        assert_eq!(consumer.state(), ConsumerState::Created);
        consumer.subscribe().unwrap();
        assert_eq!(consumer.state(), ConsumerState::Subscribed);

        let handle = consumer.start_receiving(RecordingHandler {
            seen: Arc::new(Mutex::new(Vec::new())),
        });
        assert_eq!(handle.state(), ConsumerState::Receiving);

        handle.cancel();
        assert!(matches!(
            handle.state(),
            ConsumerState::Cancelling | ConsumerState::Closed
        ));
        // Second cancel is a no-op
        handle.cancel();

        tokio::time::timeout(Duration::from_secs(2), handle.closed())
            .await
            .expect("cancelled consumer should close promptly");

        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_shutdown_reaches_closed_state() {
        let closes = Arc::new(AtomicUsize::new(0));
        let mut consumer: MessageConsumer<Input> = MessageConsumer::with_source(
            binding("consumer-unit-shutdown"),
            Box::new(IdleSource {
                closes: closes.clone(),
            }),
        );
        consumer.subscribe().unwrap();

        let handle = consumer.start_receiving(RecordingHandler {
            seen: Arc::new(Mutex::new(Vec::new())),
        });
        let state = handle.state.clone();

        handle.shutdown().await;

        assert_eq!(
            ConsumerState::from_u8(state.load(Ordering::SeqCst)),
            ConsumerState::Closed
        );
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unsubscribed_consumer_never_receives() {
        let source = ScriptedSource::new(vec![message("t", 0, br#"{"id":1}"#)]);
        let closes = source.closes.clone();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let consumer: MessageConsumer<Input> =
            MessageConsumer::with_source(binding("t"), Box::new(source));
        let handle = consumer.start_receiving(RecordingHandler { seen: seen.clone() });

        assert!(handle.is_closed());
        handle.closed().await;

        assert!(seen.lock().unwrap().is_empty());
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_decode_reports_position() {
        let message = ReceivedMessage {
            topic: "input".to_string(),
            partition: 3,
            offset: 17,
            key: None,
            payload: Some(b"[]".to_vec()),
        };

        let err = decode::<Input>(&message).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Deserialization {
                partition: 3,
                offset: 17,
                ..
            }
        ));
    }
}
