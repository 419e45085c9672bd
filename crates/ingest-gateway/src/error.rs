use ingest_producer::ProducerError;
use ingest_worker::PoolError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("failed to load configuration: {0}")]
    Config(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Producer(#[from] ProducerError),

    #[error("worker pool error: {0}")]
    Pool(#[from] PoolError),

    #[error("metrics error: {0}")]
    Metrics(#[from] prometheus::Error),
}

pub type Result<T> = std::result::Result<T, GatewayError>;
