use crate::context::AppContext;
use ingest_worker::DrainReport;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Coordinates the stop sequence: close the pool to new jobs, let the HTTP
/// listeners stop, drain the worker pool, then close the producer.
#[derive(Clone, Default)]
pub struct ShutdownCoordinator {
    token: CancellationToken,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        ShutdownCoordinator {
            token: CancellationToken::new(),
        }
    }

    /// Token the servers watch to stop accepting connections.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn trigger(&self) {
        self.token.cancel();
    }

    pub fn is_triggered(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Cancel the token on Ctrl-C or SIGTERM.
    pub fn listen_for_signals(&self) -> JoinHandle<()> {
        let token = self.token.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = ctrl_c() => info!("received Ctrl-C"),
                _ = terminate() => info!("received SIGTERM"),
                _ = token.cancelled() => return,
            }
            token.cancel();
        })
    }

    /// Tell the servers to stop and refuse new jobs.
    ///
    /// Handlers waiting for queue space answer 503 at once, so graceful
    /// server shutdown is not held up by a full queue.
    pub fn stop_intake(&self, ctx: &AppContext) {
        self.token.cancel();
        ctx.pool.close();
    }

    /// Run the stop sequence once the servers have been told to stop.
    pub async fn shutdown(&self, ctx: &AppContext) -> DrainReport {
        self.stop_intake(ctx);

        let grace = ctx.config.pool.drain_grace();
        info!(grace = ?grace, "shutting down, draining worker pool");
        let report = ctx.pool.drain(grace).await;
        if report.is_clean() {
            info!(elapsed = ?report.elapsed, "worker pool drained");
        } else {
            warn!(
                interrupted = report.interrupted,
                abandoned = report.abandoned,
                elapsed = ?report.elapsed,
                "worker pool stopped before all messages were published"
            );
        }

        let flush_timeout = ctx.config.producer.flush_timeout();
        if let Err(e) = ctx.producer.close(flush_timeout).await {
            error!(error = %e, "producer did not flush cleanly");
        } else {
            info!("producer closed");
        }
        report
    }
}

async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}

#[cfg(unix)]
async fn terminate() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(e) => {
            error!(error = %e, "failed to listen for SIGTERM");
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn terminate() {
    std::future::pending::<()>().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GatewayConfig;
    use ingest_producer::{Backend, MemoryBroker, ProducerHandle, ProducerSettings};
    use ingest_worker::PoolState;
    use std::sync::Arc;
    use std::time::Duration;

    fn context(broker: Arc<MemoryBroker>) -> AppContext {
        let mut config = GatewayConfig::default();
        config.producer.backend = Backend::DryRun;
        config.pool.size = 1;
        config.pool.drain_grace_secs = 1;
        let producer = Arc::new(ProducerHandle::new(
            ProducerSettings::from_config(&config.producer),
            broker,
        ));
        AppContext::with_producer(config, producer).unwrap()
    }

    #[tokio::test]
    async fn test_shutdown_drains_then_flushes() {
        let broker = Arc::new(MemoryBroker::new(2, true));
        let ctx = context(broker.clone());
        for _ in 0..10 {
            ctx.dispatcher.dispatch("orders", "k", "v").await.unwrap();
        }

        let coordinator = ShutdownCoordinator::new();
        let report = coordinator.shutdown(&ctx).await;

        assert!(coordinator.is_triggered());
        assert!(report.is_clean());
        assert_eq!(broker.written(), 10);
        assert_eq!(broker.flushes(), 1);
        assert_eq!(ctx.pool.state(), PoolState::Stopped);
        assert!(ctx.producer.is_closed());
    }

    #[tokio::test]
    async fn test_shutdown_bounded_by_grace() {
        let broker = Arc::new(MemoryBroker::new(2, true));
        broker.set_latency(Some(Duration::from_millis(400)));
        let ctx = context(broker.clone());
        for _ in 0..10 {
            ctx.dispatcher.dispatch("orders", "k", "v").await.unwrap();
        }

        let started = std::time::Instant::now();
        let report = ShutdownCoordinator::new().shutdown(&ctx).await;

        assert!(started.elapsed() < Duration::from_millis(1800));
        assert!(!report.is_clean());
        assert!(report.abandoned > 0);
        assert!(broker.written() < 10);
    }

    #[tokio::test]
    async fn test_listener_exits_on_manual_trigger() {
        let coordinator = ShutdownCoordinator::new();
        let listener = coordinator.listen_for_signals();
        coordinator.trigger();
        tokio::time::timeout(Duration::from_secs(1), listener)
            .await
            .unwrap()
            .unwrap();
    }
}
