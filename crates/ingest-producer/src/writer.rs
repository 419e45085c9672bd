use crate::error::Result;
use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;

/// A message with its partition already assigned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub topic: String,
    pub partition: usize,
    pub key: Bytes,
    pub payload: Bytes,
}

/// Outbound seam to a broker client.
///
/// Implementations are shared by every worker, so all methods take `&self`.
#[async_trait]
pub trait BrokerWriter: Send + Sync {
    /// Current partition count for `topic`.
    async fn partition_count(&self, topic: &str) -> Result<usize>;

    async fn write(&self, message: OutboundMessage) -> Result<()>;

    /// Deliver anything still buffered, bounded by `timeout`.
    async fn flush(&self, timeout: Duration) -> Result<()>;

    fn name(&self) -> &'static str;
}
