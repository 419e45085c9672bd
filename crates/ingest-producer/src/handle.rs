use crate::config::{Backend, ProducerConfig};
use crate::error::{ProducerError, Result};
use crate::memory::MemoryBroker;
use crate::settings::ProducerSettings;
use crate::writer::{BrokerWriter, OutboundMessage};
use ingest_core::{parse_key_suffix, Balancer, BalancerStrategy, Record};
use once_cell::sync::OnceCell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// The process-wide write path to the broker.
///
/// Shared by every worker through an `Arc`; the writer does its own
/// synchronization so no lock is taken here.
pub struct ProducerHandle {
    settings: ProducerSettings,
    balancer: Balancer,
    writer: Arc<dyn BrokerWriter>,
    closed: AtomicBool,
}

impl std::fmt::Debug for ProducerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProducerHandle")
            .field("backend", &self.writer.name())
            .field("balancer", &self.balancer.strategy())
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish()
    }
}

impl ProducerHandle {
    pub fn new(settings: ProducerSettings, writer: Arc<dyn BrokerWriter>) -> Self {
        ProducerHandle {
            balancer: Balancer::new(settings.balancer),
            settings,
            writer,
            closed: AtomicBool::new(false),
        }
    }

    /// Build the handle for the configured backend.
    pub fn build(config: &ProducerConfig) -> Result<Self> {
        let settings = ProducerSettings::from_config(config);

        let writer: Arc<dyn BrokerWriter> = match config.backend {
            Backend::DryRun => dry_run_writer(config)?,
            Backend::Kafka => kafka_writer(&settings)?,
        };

        info!(
            backend = writer.name(),
            brokers = %settings.bootstrap_servers,
            balancer = settings.balancer.as_str(),
            acks = settings.required_acks.as_str(),
            tls = settings.tls.is_some(),
            "producer built"
        );
        Ok(ProducerHandle::new(settings, writer))
    }

    pub fn settings(&self) -> &ProducerSettings {
        &self.settings
    }

    pub fn balancer(&self) -> BalancerStrategy {
        self.balancer.strategy()
    }

    pub fn backend(&self) -> &'static str {
        self.writer.name()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Route `record` to a partition and write it. Returns the partition.
    pub async fn publish(&self, record: &Record) -> Result<usize> {
        if self.is_closed() {
            return Err(ProducerError::Write("producer is closed".to_string()));
        }

        let topic = record.topic();
        let partition_count = self.writer.partition_count(topic).await?;
        if partition_count == 0 {
            return Err(ProducerError::NoPartitions(topic.to_string()));
        }

        if self.balancer.strategy() == BalancerStrategy::KeySuffix {
            if let Err(e) = parse_key_suffix(record.key()) {
                warn!(
                    topic = %topic,
                    key = %record.key_lossy(),
                    error = %e,
                    "malformed key suffix, routing to partition 0"
                );
            }
        }

        let partition = self.balancer.partition(record.key(), partition_count);
        debug!(topic = %topic, partition, partitions = partition_count, "publishing record");

        self.writer
            .write(OutboundMessage {
                topic: topic.to_string(),
                partition,
                key: record.key().clone(),
                payload: record.payload().clone(),
            })
            .await?;
        Ok(partition)
    }

    /// Flush buffered messages and refuse further writes.
    pub async fn close(&self, timeout: Duration) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        info!(timeout = ?timeout, "flushing producer");
        match tokio::time::timeout(timeout, self.writer.flush(timeout)).await {
            Ok(result) => result,
            Err(_) => Err(ProducerError::Timeout(timeout)),
        }
    }
}

/// Counting-only in-memory broker; payloads are not kept.
fn dry_run_writer(config: &ProducerConfig) -> Result<Arc<MemoryBroker>> {
    if config.dry_run_partitions == 0 {
        return Err(ProducerError::Config(
            "dry_run_partitions must be at least 1".to_string(),
        ));
    }
    Ok(Arc::new(MemoryBroker::new(config.dry_run_partitions, true)))
}

#[cfg(feature = "kafka")]
fn kafka_writer(settings: &ProducerSettings) -> Result<Arc<dyn BrokerWriter>> {
    Ok(Arc::new(crate::kafka::KafkaWriter::new(settings)?))
}

#[cfg(not(feature = "kafka"))]
fn kafka_writer(_settings: &ProducerSettings) -> Result<Arc<dyn BrokerWriter>> {
    Err(ProducerError::BackendUnavailable("kafka"))
}

/// Holds the single [`ProducerHandle`] of the process.
#[derive(Default)]
pub struct ProducerCell {
    cell: OnceCell<Arc<ProducerHandle>>,
}

impl ProducerCell {
    pub fn new() -> Self {
        ProducerCell {
            cell: OnceCell::new(),
        }
    }

    /// Build the handle on first use; later calls return the same handle and
    /// never run `build`.
    pub fn get_or_build<F>(&self, build: F) -> Result<Arc<ProducerHandle>>
    where
        F: FnOnce() -> Result<ProducerHandle>,
    {
        self.cell
            .get_or_try_init(|| build().map(Arc::new))
            .cloned()
    }

    pub fn get(&self) -> Option<Arc<ProducerHandle>> {
        self.cell.get().cloned()
    }
}
