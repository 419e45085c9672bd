use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    /// The queue no longer accepts work because the pool is draining or stopped
    #[error("worker pool is closed")]
    Closed,

    #[error("worker pool already started")]
    AlreadyStarted,

    #[error("invalid pool configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, PoolError>;
