// ============================================================================
// In-process broker
// ============================================================================
//
// A single-partition, append-only log per topic with per-group committed
// offsets. Implements both transport traits so a full pipeline can run
// without Kafka. Used by the integration tests.
//
// Semantics mirrored from the Kafka consumer configuration:
// - a new group starts at the earliest offset
// - a source that catches up with the log reports PartitionEof once, then
//   blocks until the next publish
// - `ack` commits offset + 1 for the group
//
// ============================================================================

use async_trait::async_trait;
use pipeline_error::{PipelineError, PipelineResult};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Notify;

use super::transport::{MessageSource, RecordSink};
use super::types::{Ack, Delivery, ReceivedMessage};

const PARTITION: i32 = 0;

#[derive(Debug, Clone)]
struct StoredMessage {
    key: Option<Vec<u8>>,
    payload: Vec<u8>,
}

#[derive(Default)]
struct BrokerState {
    topics: HashMap<String, Vec<StoredMessage>>,
    /// (group, topic) -> next offset to read
    committed: HashMap<(String, String), i64>,
    /// topic -> number of upcoming sends to reject
    failing_sends: HashMap<String, usize>,
}

#[derive(Default)]
struct Inner {
    state: Mutex<BrokerState>,
    published: Notify,
}

/// Cheaply cloneable handle to an in-process broker
#[derive(Clone, Default)]
pub struct MemoryBroker {
    inner: Arc<Inner>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, BrokerState> {
        // A poisoned lock only means a test thread panicked mid-append
        self.inner
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Append raw bytes to `topic`, bypassing serialization
    pub fn publish_raw(&self, topic: &str, payload: impl Into<Vec<u8>>) -> Ack {
        let offset = {
            let mut state = self.state();
            let log = state.topics.entry(topic.to_string()).or_default();
            log.push(StoredMessage {
                key: None,
                payload: payload.into(),
            });
            log.len() as i64 - 1
        };
        self.inner.published.notify_waiters();

        Ack {
            topic: topic.to_string(),
            partition: PARTITION,
            offset,
        }
    }

    /// Reject the next `count` sends to `topic`
    pub fn fail_next_sends(&self, topic: &str, count: usize) {
        self.state().failing_sends.insert(topic.to_string(), count);
    }

    /// Number of messages ever appended to `topic`
    pub fn len(&self, topic: &str) -> usize {
        self.state().topics.get(topic).map_or(0, Vec::len)
    }

    pub fn is_empty(&self, topic: &str) -> bool {
        self.len(topic) == 0
    }

    /// Raw payloads of `topic` in append order
    pub fn payloads(&self, topic: &str) -> Vec<Vec<u8>> {
        self.state()
            .topics
            .get(topic)
            .map(|log| log.iter().map(|m| m.payload.clone()).collect())
            .unwrap_or_default()
    }

    /// Keys of `topic` in append order
    pub fn keys(&self, topic: &str) -> Vec<Option<Vec<u8>>> {
        self.state()
            .topics
            .get(topic)
            .map(|log| log.iter().map(|m| m.key.clone()).collect())
            .unwrap_or_default()
    }

    /// Payloads of `topic` decoded as `T`; undecodable entries are skipped
    pub fn records<T: DeserializeOwned>(&self, topic: &str) -> Vec<T> {
        self.payloads(topic)
            .iter()
            .filter_map(|p| serde_json::from_slice(p).ok())
            .collect()
    }

    /// Next offset `group_id` will read from `topic`, if it has committed
    pub fn committed_offset(&self, group_id: &str, topic: &str) -> Option<i64> {
        self.state()
            .committed
            .get(&(group_id.to_string(), topic.to_string()))
            .copied()
    }

    /// A new consumer connection in `group_id`
    pub fn source(&self, group_id: &str) -> MemorySource {
        MemorySource {
            broker: self.clone(),
            group_id: group_id.to_string(),
            topic: None,
            position: 0,
            eof_reported: false,
            closed: false,
        }
    }
}

#[async_trait]
impl RecordSink for MemoryBroker {
    async fn send(&self, topic: &str, key: Option<&[u8]>, payload: &[u8]) -> PipelineResult<Ack> {
        let offset = {
            let mut state = self.state();

            if let Some(remaining) = state.failing_sends.get_mut(topic) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(PipelineError::Publish {
                        topic: topic.to_string(),
                        reason: "broker rejected the write".to_string(),
                    });
                }
            }

            let log = state.topics.entry(topic.to_string()).or_default();
            log.push(StoredMessage {
                key: key.map(<[u8]>::to_vec),
                payload: payload.to_vec(),
            });
            log.len() as i64 - 1
        };
        self.inner.published.notify_waiters();

        Ok(Ack {
            topic: topic.to_string(),
            partition: PARTITION,
            offset,
        })
    }

    async fn flush(&self, _timeout: Duration) -> PipelineResult<()> {
        Ok(())
    }
}

/// Consumer connection to a [`MemoryBroker`]
pub struct MemorySource {
    broker: MemoryBroker,
    group_id: String,
    topic: Option<String>,
    position: i64,
    eof_reported: bool,
    closed: bool,
}

impl MemorySource {
    fn poll(&mut self, topic: &str) -> Option<Delivery> {
        let state = self.broker.state();
        let log = state.topics.get(topic);

        if let Some(stored) = log.and_then(|log| log.get(self.position as usize)) {
            let delivery = Delivery::Message(ReceivedMessage {
                topic: topic.to_string(),
                partition: PARTITION,
                offset: self.position,
                key: stored.key.clone(),
                payload: Some(stored.payload.clone()),
            });
            self.position += 1;
            self.eof_reported = false;
            return Some(delivery);
        }

        if !self.eof_reported {
            self.eof_reported = true;
            return Some(Delivery::PartitionEof {
                topic: topic.to_string(),
                partition: PARTITION,
                offset: self.position,
            });
        }

        None
    }
}

#[async_trait]
impl MessageSource for MemorySource {
    fn subscribe(&mut self, topic: &str) -> PipelineResult<()> {
        if self.closed {
            return Err(PipelineError::Kafka("consumer already closed".to_string()));
        }

        self.position = self
            .broker
            .committed_offset(&self.group_id, topic)
            .unwrap_or(0);
        self.topic = Some(topic.to_string());
        self.eof_reported = false;
        Ok(())
    }

    async fn recv(&mut self) -> PipelineResult<Option<Delivery>> {
        if self.closed {
            return Ok(None);
        }
        let topic = self
            .topic
            .clone()
            .ok_or_else(|| PipelineError::Transport("recv before subscribe".to_string()))?;

        let broker = self.broker.clone();
        loop {
            // Register interest before checking the log so a publish between
            // the check and the await is not missed
            let published = broker.inner.published.notified();
            tokio::pin!(published);
            published.as_mut().enable();

            if let Some(delivery) = self.poll(&topic) {
                return Ok(Some(delivery));
            }

            published.await;
        }
    }

    fn ack(&mut self, message: &ReceivedMessage) -> PipelineResult<()> {
        let mut state = self.broker.state();
        let next = message.offset + 1;
        let entry = state
            .committed
            .entry((self.group_id.clone(), message.topic.clone()))
            .or_insert(0);
        *entry = (*entry).max(next);
        Ok(())
    }

    fn close(&mut self) {
        self.closed = true;
    }
}
