use crate::config::GatewayConfig;
use crate::dispatch::Dispatcher;
use crate::error::Result;
use crate::metrics::GatewayMetrics;
use ingest_producer::{probe, Backend, ProducerCell, ProducerError, ProducerHandle, TlsMaterial};
use ingest_worker::WorkerPool;
use std::sync::Arc;
use tracing::info;

/// Everything the servers and the shutdown path share.
///
/// Built once in `main` and handed out behind an `Arc`.
pub struct AppContext {
    pub config: GatewayConfig,
    pub pool: Arc<WorkerPool>,
    pub producer: Arc<ProducerHandle>,
    pub metrics: Arc<GatewayMetrics>,
    pub dispatcher: Dispatcher,
}

impl AppContext {
    /// Load TLS material, build the producer, check broker connectivity and
    /// start the worker pool. Any failure here is fatal for the process.
    pub async fn initialize(config: GatewayConfig, producers: &ProducerCell) -> Result<Self> {
        config.validate()?;

        let tls = TlsMaterial::load(&config.producer.tls).map_err(ProducerError::from)?;
        let producer = producers.get_or_build(|| ProducerHandle::build(&config.producer))?;

        if config.producer.backend == Backend::DryRun {
            info!("dry-run backend selected, skipping broker connectivity check");
        } else {
            probe(&config.producer, tls.as_ref()).await?;
        }

        Self::with_producer(config, producer)
    }

    /// Assemble the context around an existing producer and start the pool.
    pub fn with_producer(config: GatewayConfig, producer: Arc<ProducerHandle>) -> Result<Self> {
        let metrics = Arc::new(GatewayMetrics::new()?);
        let pool = Arc::new(WorkerPool::new(config.pool.clone())?);
        pool.start()?;
        metrics.set_pool_state(0, pool.worker_count());

        let dispatcher = Dispatcher::new(pool.clone(), producer.clone(), metrics.clone());
        Ok(AppContext {
            config,
            pool,
            producer,
            metrics,
            dispatcher,
        })
    }

    /// Refresh pool gauges and render the registry.
    pub fn render_metrics(&self) -> std::result::Result<String, prometheus::Error> {
        self.metrics
            .set_pool_state(self.pool.queued(), self.pool.worker_count());
        self.metrics.encode()
    }
}
