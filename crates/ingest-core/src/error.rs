use thiserror::Error;

/// Validation failures for an inbound message. These are caller errors and
/// are never retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecordError {
    #[error("topic name is empty")]
    EmptyTopic,

    #[error("key is empty")]
    EmptyKey,

    #[error("body is empty")]
    EmptyPayload,

    #[error("Payload size exceeds maximum allowed size of {max} bytes (got {actual})")]
    PayloadTooLarge { max: usize, actual: usize },
}

pub type Result<T> = std::result::Result<T, RecordError>;
