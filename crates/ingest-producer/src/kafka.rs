//! librdkafka-backed writer.

use crate::error::{ProducerError, Result};
use crate::settings::ProducerSettings;
use crate::writer::{BrokerWriter, OutboundMessage};
use async_trait::async_trait;
use dashmap::DashMap;
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::util::Timeout;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const METADATA_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_METADATA_TTL: Duration = Duration::from_secs(60);

pub struct KafkaWriter {
    producer: FutureProducer,
    partitions: DashMap<String, (usize, Instant)>,
    metadata_ttl: Duration,
    async_writes: bool,
    allow_auto_topic_creation: bool,
}

impl KafkaWriter {
    pub fn new(settings: &ProducerSettings) -> Result<Self> {
        let mut client_config = ClientConfig::new();
        for (key, value) in settings.client_properties() {
            client_config.set(key, value);
        }

        let producer: FutureProducer = client_config
            .create()
            .map_err(|e| ProducerError::Config(format!("failed to create kafka producer: {}", e)))?;

        info!(brokers = %settings.bootstrap_servers, "kafka producer created");
        Ok(KafkaWriter {
            producer,
            partitions: DashMap::new(),
            metadata_ttl: settings.metadata_ttl.unwrap_or(DEFAULT_METADATA_TTL),
            async_writes: settings.async_writes,
            allow_auto_topic_creation: settings.allow_auto_topic_creation,
        })
    }

    async fn fetch_partition_count(&self, topic: &str) -> Result<Option<usize>> {
        let producer = self.producer.clone();
        let name = topic.to_string();

        let metadata = tokio::task::spawn_blocking(move || {
            producer.client().fetch_metadata(Some(name.as_str()), METADATA_TIMEOUT)
        })
        .await
        .map_err(|e| ProducerError::Write(format!("metadata task failed: {}", e)))?
        .map_err(|e| ProducerError::Write(format!("metadata fetch failed: {}", e)))?;

        let count = metadata
            .topics()
            .iter()
            .find(|t| t.name() == topic && t.error().is_none())
            .map(|t| t.partitions().len());
        Ok(count)
    }
}

#[async_trait]
impl BrokerWriter for KafkaWriter {
    async fn partition_count(&self, topic: &str) -> Result<usize> {
        if let Some(entry) = self.partitions.get(topic) {
            let (count, fetched_at) = *entry;
            if fetched_at.elapsed() < self.metadata_ttl {
                return Ok(count);
            }
        }

        let mut count = self.fetch_partition_count(topic).await?;
        if count.is_none() && self.allow_auto_topic_creation {
            // The metadata request asks the broker to create the topic; the
            // second lookup sees it once the broker allows auto-creation.
            debug!(topic = %topic, "topic missing, retrying metadata for auto-creation");
            count = self.fetch_partition_count(topic).await?;
        }

        let count = count.ok_or_else(|| ProducerError::UnknownTopic(topic.to_string()))?;
        self.partitions
            .insert(topic.to_string(), (count, Instant::now()));
        Ok(count)
    }

    async fn write(&self, message: OutboundMessage) -> Result<()> {
        let partition = i32::try_from(message.partition).map_err(|_| {
            ProducerError::Write(format!("partition {} out of range", message.partition))
        })?;

        let record = FutureRecord::to(&message.topic)
            .partition(partition)
            .key(&message.key[..])
            .payload(&message.payload[..]);

        if self.async_writes {
            // Fire and forget: delivery reports are not awaited.
            return match self.producer.send_result(record) {
                Ok(_delivery) => Ok(()),
                Err((e, _)) => Err(ProducerError::Write(e.to_string())),
            };
        }

        self.producer
            .send(record, Timeout::Never)
            .await
            .map(|_| ())
            .map_err(|(e, _)| ProducerError::Write(e.to_string()))
    }

    async fn flush(&self, timeout: Duration) -> Result<()> {
        let producer = self.producer.clone();
        tokio::task::spawn_blocking(move || producer.flush(Timeout::After(timeout)))
            .await
            .map_err(|e| ProducerError::Write(format!("flush task failed: {}", e)))?
            .map_err(|e| {
                warn!(error = %e, "kafka flush incomplete");
                ProducerError::Timeout(timeout)
            })
    }

    fn name(&self) -> &'static str {
        "kafka"
    }
}
