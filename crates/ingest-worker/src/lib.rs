pub mod pool;
pub mod job;
pub mod config;
mod error;

pub use pool::{DrainReport, PoolState, WorkerPool};
pub use job::{BoxedJob, FutureJob, Job};
pub use config::PoolConfig;
pub use error::{PoolError, Result};
