//! Producer side of the gateway: configuration, TLS material, the startup
//! connectivity probe, and the shared handle every worker writes through.

pub mod config;
pub mod settings;
pub mod tls;
pub mod probe;
pub mod writer;
pub mod memory;
pub mod handle;
#[cfg(feature = "kafka")]
pub mod kafka;
mod error;

pub use config::{Backend, Compression, ProducerConfig, RequiredAcks, TlsConfig};
pub use settings::ProducerSettings;
pub use tls::{TlsError, TlsMaterial};
pub use probe::probe;
pub use writer::{BrokerWriter, OutboundMessage};
pub use memory::MemoryBroker;
pub use handle::{ProducerCell, ProducerHandle};
pub use error::{ProducerError, Result};
