//! In-process broker used by the dry-run backend and tests.

use crate::error::{ProducerError, Result};
use crate::writer::{BrokerWriter, OutboundMessage};
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, info};

/// Accepts writes per `(topic, partition)` without a network.
///
/// [`MemoryBroker::new`] only counts writes. [`MemoryBroker::recording`]
/// also keeps every message for inspection, so it grows with traffic.
///
/// Topics are created on demand with `default_partitions` partitions when
/// auto-creation is on; otherwise they must be declared with
/// [`MemoryBroker::create_topic`].
pub struct MemoryBroker {
    topics: DashMap<String, usize>,
    messages: Option<Mutex<Vec<OutboundMessage>>>,
    auto_create: bool,
    default_partitions: usize,
    failing: AtomicBool,
    latency: Mutex<Option<Duration>>,
    written: AtomicU64,
    flushes: AtomicU64,
}

impl MemoryBroker {
    pub fn new(default_partitions: usize, auto_create: bool) -> Self {
        Self::with_store(default_partitions, auto_create, None)
    }

    /// Broker that keeps a copy of every accepted message.
    pub fn recording(default_partitions: usize, auto_create: bool) -> Self {
        Self::with_store(default_partitions, auto_create, Some(Mutex::new(Vec::new())))
    }

    fn with_store(
        default_partitions: usize,
        auto_create: bool,
        messages: Option<Mutex<Vec<OutboundMessage>>>,
    ) -> Self {
        MemoryBroker {
            topics: DashMap::new(),
            messages,
            auto_create,
            default_partitions,
            failing: AtomicBool::new(false),
            latency: Mutex::new(None),
            written: AtomicU64::new(0),
            flushes: AtomicU64::new(0),
        }
    }

    pub fn create_topic(&self, topic: impl Into<String>, partitions: usize) {
        self.topics.insert(topic.into(), partitions);
    }

    /// Make subsequent writes fail until turned off again.
    pub fn fail_writes(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.latency.lock() = latency;
    }

    pub fn is_recording(&self) -> bool {
        self.messages.is_some()
    }

    /// Messages kept so far; always empty unless built with [`MemoryBroker::recording`].
    pub fn messages(&self) -> Vec<OutboundMessage> {
        self.messages
            .as_ref()
            .map(|messages| messages.lock().clone())
            .unwrap_or_default()
    }

    pub fn messages_for(&self, topic: &str, partition: usize) -> Vec<OutboundMessage> {
        self.messages()
            .into_iter()
            .filter(|m| m.topic == topic && m.partition == partition)
            .collect()
    }

    pub fn written(&self) -> u64 {
        self.written.load(Ordering::Relaxed)
    }

    pub fn flushes(&self) -> u64 {
        self.flushes.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl BrokerWriter for MemoryBroker {
    async fn partition_count(&self, topic: &str) -> Result<usize> {
        if let Some(count) = self.topics.get(topic) {
            return Ok(*count);
        }
        if !self.auto_create {
            return Err(ProducerError::UnknownTopic(topic.to_string()));
        }

        let count = *self
            .topics
            .entry(topic.to_string())
            .or_insert(self.default_partitions);
        info!(topic = %topic, partitions = count, "auto-created topic");
        Ok(count)
    }

    async fn write(&self, message: OutboundMessage) -> Result<()> {
        let latency = *self.latency.lock();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        if self.failing.load(Ordering::SeqCst) {
            return Err(ProducerError::Write(format!(
                "injected failure writing to {}[{}]",
                message.topic, message.partition
            )));
        }

        match self.topics.get(&message.topic) {
            Some(count) if message.partition < *count => {}
            Some(count) => {
                return Err(ProducerError::Write(format!(
                    "partition {} out of range for {} ({} partitions)",
                    message.partition, message.topic, *count
                )))
            }
            None => return Err(ProducerError::UnknownTopic(message.topic)),
        }

        debug!(
            topic = %message.topic,
            partition = message.partition,
            bytes = message.payload.len(),
            "dry-run write"
        );
        if let Some(messages) = &self.messages {
            messages.lock().push(message);
        }
        self.written.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn flush(&self, _timeout: Duration) -> Result<()> {
        self.flushes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "dry_run"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn message(topic: &str, partition: usize) -> OutboundMessage {
        OutboundMessage {
            topic: topic.to_string(),
            partition,
            key: Bytes::from_static(b"k"),
            payload: Bytes::from_static(b"v"),
        }
    }

    #[tokio::test]
    async fn test_unknown_topic_without_auto_create() {
        let broker = MemoryBroker::new(4, false);
        assert!(matches!(
            broker.partition_count("orders").await,
            Err(ProducerError::UnknownTopic(_))
        ));

        broker.create_topic("orders", 2);
        assert_eq!(broker.partition_count("orders").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_auto_create_uses_default_partitions() {
        let broker = MemoryBroker::recording(6, true);
        assert_eq!(broker.partition_count("events").await.unwrap(), 6);
        broker.write(message("events", 5)).await.unwrap();
        assert_eq!(broker.messages_for("events", 5).len(), 1);
        assert_eq!(broker.written(), 1);
    }

    #[tokio::test]
    async fn test_counting_broker_keeps_no_messages() {
        let broker = MemoryBroker::new(2, true);
        assert!(!broker.is_recording());
        broker.partition_count("events").await.unwrap();
        for _ in 0..3 {
            broker.write(message("events", 1)).await.unwrap();
        }
        assert_eq!(broker.written(), 3);
        assert!(broker.messages().is_empty());
        assert!(broker.messages_for("events", 1).is_empty());
    }

    #[tokio::test]
    async fn test_rejects_out_of_range_partition() {
        let broker = MemoryBroker::recording(4, false);
        broker.create_topic("orders", 2);
        assert!(matches!(
            broker.write(message("orders", 2)).await,
            Err(ProducerError::Write(_))
        ));
        assert!(broker.messages().is_empty());
    }

    #[tokio::test]
    async fn test_injected_failure() {
        let broker = MemoryBroker::new(1, true);
        broker.partition_count("orders").await.unwrap();
        broker.fail_writes(true);
        assert!(broker.write(message("orders", 0)).await.is_err());
        broker.fail_writes(false);
        assert!(broker.write(message("orders", 0)).await.is_ok());
    }
}
