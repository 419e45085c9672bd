//! HTTP ingestion gateway: accepts messages on `POST /push` and publishes
//! them to the broker from a bounded worker pool.

pub mod api;
pub mod config;
pub mod context;
pub mod dispatch;
pub mod metrics;
pub mod shutdown;
mod error;

pub use config::{GatewayConfig, LogFormat, MonitoringConfig, ServerConfig};
pub use context::AppContext;
pub use dispatch::{DispatchError, Dispatcher, PublishTask};
pub use error::{GatewayError, Result};
pub use metrics::GatewayMetrics;
pub use shutdown::ShutdownCoordinator;
