//! Partition assignment for outbound messages.
//!
//! Both strategies are pure: the same `(key, partition_count)` always maps to
//! the same partition, and the result is always in `[0, partition_count)`.

use murmur2::{murmur2, KAFKA_SEED};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Delimiter separating the shard identifier from the rest of a key.
pub const KEY_SUFFIX_DELIMITER: u8 = b',';

/// Which balancer the producer routes messages with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BalancerStrategy {
    /// Kafka-compatible murmur2 hashing of the whole key
    #[default]
    Hash,
    /// `suffix mod partitions`, where the suffix is the number after the last comma
    #[serde(alias = "keySuffix")]
    KeySuffix,
}

impl BalancerStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            BalancerStrategy::Hash => "hash",
            BalancerStrategy::KeySuffix => "key_suffix",
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SuffixParseError {
    #[error("key suffix is not valid UTF-8")]
    NotUtf8,

    #[error("key suffix {0:?} is not a decimal integer")]
    NotNumeric(String),
}

/// Stateless partition selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Balancer {
    strategy: BalancerStrategy,
}

impl Balancer {
    pub fn new(strategy: BalancerStrategy) -> Self {
        Balancer { strategy }
    }

    pub fn strategy(&self) -> BalancerStrategy {
        self.strategy
    }

    /// Pick the partition for `key` on a topic with `partition_count` partitions.
    ///
    /// A key-suffix key whose suffix does not parse lands on partition 0.
    ///
    /// # Panics
    /// Panics if `partition_count` is zero; callers check the count first.
    pub fn partition(&self, key: &[u8], partition_count: usize) -> usize {
        assert!(partition_count > 0, "partition_count must be positive");

        match self.strategy {
            BalancerStrategy::Hash => hash_partition(key, partition_count),
            BalancerStrategy::KeySuffix => match parse_key_suffix(key) {
                Ok(value) => value.rem_euclid(partition_count as i64) as usize,
                Err(_) => 0,
            },
        }
    }
}

/// Mirrors the Java client's `toPositive(murmur2(key)) % numPartitions`.
fn hash_partition(key: &[u8], partition_count: usize) -> usize {
    let hash = murmur2(key, KAFKA_SEED) & 0x7fff_ffff;
    hash as usize % partition_count
}

/// Extract the numeric shard identifier trailing the last comma of `key`.
/// Without a comma the whole key is parsed.
pub fn parse_key_suffix(key: &[u8]) -> Result<i64, SuffixParseError> {
    let start = key
        .iter()
        .rposition(|b| *b == KEY_SUFFIX_DELIMITER)
        .map_or(0, |idx| idx + 1);

    let suffix = std::str::from_utf8(&key[start..]).map_err(|_| SuffixParseError::NotUtf8)?;
    suffix
        .parse::<i64>()
        .map_err(|_| SuffixParseError::NotNumeric(suffix.to_string()))
}
