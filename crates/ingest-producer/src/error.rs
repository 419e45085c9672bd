use crate::tls::TlsError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProducerError {
    #[error("TLS setup failed: {0}")]
    Tls(#[from] TlsError),

    #[error("no broker addresses configured")]
    NoAddresses,

    #[error("kafka is not reachable: {last_error}")]
    BrokerUnreachable { attempted: Vec<String>, last_error: String },

    #[error("unknown topic: {0}")]
    UnknownTopic(String),

    #[error("topic {0} reports no partitions")]
    NoPartitions(String),

    #[error("broker write failed: {0}")]
    Write(String),

    #[error("broker operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("backend {0} is not available in this build")]
    BackendUnavailable(&'static str),

    #[error("producer configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, ProducerError>;
