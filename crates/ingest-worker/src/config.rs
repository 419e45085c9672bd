use crate::{PoolError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Number of concurrent workers, fixed for the pool's lifetime
    pub size: usize,
    /// Maximum number of queued jobs before submitters are suspended
    pub capacity: usize,
    /// How long shutdown waits for queued and in-flight jobs
    pub drain_grace_secs: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        PoolConfig {
            size: 10,
            capacity: 1000,
            drain_grace_secs: 3,
        }
    }
}

impl PoolConfig {
    pub fn new(size: usize, capacity: usize) -> Self {
        PoolConfig {
            size,
            capacity,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.size == 0 {
            return Err(PoolError::InvalidConfig("size must be at least 1".to_string()));
        }
        if self.capacity == 0 {
            return Err(PoolError::InvalidConfig("capacity must be at least 1".to_string()));
        }
        Ok(())
    }

    pub fn drain_grace(&self) -> Duration {
        Duration::from_secs(self.drain_grace_secs)
    }
}
