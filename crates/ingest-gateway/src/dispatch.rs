//! Turns accepted requests into publish jobs on the worker pool.

use crate::metrics::GatewayMetrics;
use async_trait::async_trait;
use bytes::Bytes;
use ingest_core::{Record, RecordError};
use ingest_producer::ProducerHandle;
use ingest_worker::{Job, PoolError, WorkerPool};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("invalid request: {0}")]
    InvalidRequest(#[from] RecordError),

    #[error("worker pool is closed")]
    PoolClosed,

    #[error("worker pool error: {0}")]
    Pool(PoolError),
}

impl From<PoolError> for DispatchError {
    fn from(err: PoolError) -> Self {
        match err {
            PoolError::Closed => DispatchError::PoolClosed,
            other => DispatchError::Pool(other),
        }
    }
}

/// One message on its way to the broker.
pub struct PublishTask {
    record: Record,
    producer: Arc<ProducerHandle>,
    metrics: Arc<GatewayMetrics>,
}

impl PublishTask {
    pub fn new(record: Record, producer: Arc<ProducerHandle>, metrics: Arc<GatewayMetrics>) -> Self {
        PublishTask {
            record,
            producer,
            metrics,
        }
    }
}

#[async_trait]
impl Job for PublishTask {
    async fn run(self: Box<Self>) {
        let topic = self.record.topic();
        match self.producer.publish(&self.record).await {
            Ok(partition) => {
                self.metrics.inc_delivered(topic);
                debug!(topic = %topic, partition, "message delivered");
            }
            Err(e) => {
                self.metrics.inc_errored(topic);
                error!(
                    topic = %topic,
                    key = %self.record.key_lossy(),
                    error = %e,
                    "failed to publish message"
                );
            }
        }
    }
}

/// Accepts `(topic, key, payload)` and queues a [`PublishTask`].
///
/// Returns as soon as the task is queued; the broker outcome only reaches
/// the metrics and the log.
#[derive(Clone)]
pub struct Dispatcher {
    pool: Arc<WorkerPool>,
    producer: Arc<ProducerHandle>,
    metrics: Arc<GatewayMetrics>,
}

impl Dispatcher {
    pub fn new(
        pool: Arc<WorkerPool>,
        producer: Arc<ProducerHandle>,
        metrics: Arc<GatewayMetrics>,
    ) -> Self {
        Dispatcher {
            pool,
            producer,
            metrics,
        }
    }

    pub async fn dispatch(
        &self,
        topic: impl Into<String>,
        key: impl Into<Bytes>,
        payload: impl Into<Bytes>,
    ) -> Result<(), DispatchError> {
        let record = Record::new(topic, key, payload)?;

        // Counted before submission, so a closed pool still shows the attempt.
        self.metrics.inc_queued(record.topic());

        let task = PublishTask::new(record, self.producer.clone(), self.metrics.clone());
        self.pool.submit(task).await?;
        Ok(())
    }
}
