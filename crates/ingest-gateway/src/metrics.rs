use prometheus::{Encoder, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

/// Prometheus metrics for the gateway
pub struct GatewayMetrics {
    pub registry: Registry,

    // Message counters by topic
    pub messages_queued: IntCounterVec,
    pub messages_delivered: IntCounterVec,
    pub messages_errored: IntCounterVec,

    // Pool gauges, refreshed on scrape
    pub pool_queue_depth: IntGauge,
    pub pool_workers: IntGauge,
}

impl GatewayMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let messages_queued = IntCounterVec::new(
            Opts::new(
                "ingest_messages_queued_total",
                "Messages accepted for publishing, by topic",
            ),
            &["topic"],
        )?;
        registry.register(Box::new(messages_queued.clone()))?;

        let messages_delivered = IntCounterVec::new(
            Opts::new(
                "ingest_messages_delivered_total",
                "Messages written to the broker, by topic",
            ),
            &["topic"],
        )?;
        registry.register(Box::new(messages_delivered.clone()))?;

        let messages_errored = IntCounterVec::new(
            Opts::new(
                "ingest_messages_errored_total",
                "Messages whose broker write failed, by topic",
            ),
            &["topic"],
        )?;
        registry.register(Box::new(messages_errored.clone()))?;

        let pool_queue_depth =
            IntGauge::new("ingest_pool_queue_depth", "Jobs waiting in the worker pool queue")?;
        registry.register(Box::new(pool_queue_depth.clone()))?;

        let pool_workers = IntGauge::new("ingest_pool_workers", "Configured worker count")?;
        registry.register(Box::new(pool_workers.clone()))?;

        Ok(GatewayMetrics {
            registry,
            messages_queued,
            messages_delivered,
            messages_errored,
            pool_queue_depth,
            pool_workers,
        })
    }

    pub fn inc_queued(&self, topic: &str) {
        self.messages_queued.with_label_values(&[topic]).inc();
    }

    pub fn inc_delivered(&self, topic: &str) {
        self.messages_delivered.with_label_values(&[topic]).inc();
    }

    pub fn inc_errored(&self, topic: &str) {
        self.messages_errored.with_label_values(&[topic]).inc();
    }

    pub fn queued(&self, topic: &str) -> u64 {
        self.messages_queued.with_label_values(&[topic]).get()
    }

    pub fn delivered(&self, topic: &str) -> u64 {
        self.messages_delivered.with_label_values(&[topic]).get()
    }

    pub fn errored(&self, topic: &str) -> u64 {
        self.messages_errored.with_label_values(&[topic]).get()
    }

    pub fn set_pool_state(&self, queue_depth: usize, workers: usize) {
        self.pool_queue_depth.set(queue_depth as i64);
        self.pool_workers.set(workers as i64);
    }

    /// Text exposition of everything in the registry.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
