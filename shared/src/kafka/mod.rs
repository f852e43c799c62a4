// Kafka module for the consume -> process -> retry pipeline
//
// Typed JSON producers and consumers over a pluggable transport. The Kafka
// transport is built on rdkafka; `memory` provides an in-process broker with
// the same semantics for tests.

pub mod config;
pub mod consumer;
pub mod memory;
pub mod metrics;
pub mod producer;
pub mod transport;
pub mod types;

// Re-export commonly used types
pub use config::create_client_config;
pub use consumer::{ConsumerHandle, ConsumerState, MessageConsumer, RecordHandler};
pub use memory::MemoryBroker;
pub use producer::MessageProducer;
pub use transport::{KafkaSink, KafkaSource, MessageSource, RecordSink};
pub use types::{
    Ack, ConsumerBinding, Delivery, Input, PipelineRecord, ProducerBinding, ReceivedMessage,
    RetryEnvelope,
};
