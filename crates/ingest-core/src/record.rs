use crate::{RecordError, Result, MAX_PAYLOAD_SIZE};
use bytes::Bytes;

/// A validated message waiting to be written to the broker.
///
/// The fields are immutable once constructed; cloning is cheap because key
/// and payload are reference-counted buffers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    topic: String,
    key: Bytes,
    payload: Bytes,
}

impl Record {
    /// Validate and build a record.
    ///
    /// Checks run in request order: topic, then key, then payload.
    pub fn new(
        topic: impl Into<String>,
        key: impl Into<Bytes>,
        payload: impl Into<Bytes>,
    ) -> Result<Self> {
        let topic = topic.into();
        let key = key.into();
        let payload = payload.into();

        if topic.is_empty() {
            return Err(RecordError::EmptyTopic);
        }
        if key.is_empty() {
            return Err(RecordError::EmptyKey);
        }
        if payload.is_empty() {
            return Err(RecordError::EmptyPayload);
        }
        if payload.len() > MAX_PAYLOAD_SIZE {
            return Err(RecordError::PayloadTooLarge {
                max: MAX_PAYLOAD_SIZE,
                actual: payload.len(),
            });
        }

        Ok(Record { topic, key, payload })
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn key(&self) -> &Bytes {
        &self.key
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Key rendered for log lines. Keys arrive from query strings so they are
    /// almost always UTF-8.
    pub fn key_lossy(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.key)
    }

    pub fn into_parts(self) -> (String, Bytes, Bytes) {
        (self.topic, self.key, self.payload)
    }
}
