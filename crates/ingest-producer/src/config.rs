use ingest_core::BalancerStrategy;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Which broker client the producer handle writes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    /// librdkafka via the `kafka` cargo feature
    #[default]
    Kafka,
    /// In-process broker that records and logs writes
    DryRun,
}

impl Backend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::Kafka => "kafka",
            Backend::DryRun => "dry_run",
        }
    }
}

/// Acknowledgment level requested from the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequiredAcks {
    #[default]
    None,
    One,
    All,
}

impl RequiredAcks {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequiredAcks::None => "0",
            RequiredAcks::One => "1",
            RequiredAcks::All => "all",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Compression {
    /// Leave the client library's default in place
    #[default]
    None,
    Gzip,
    Snappy,
    Lz4,
    Zstd,
}

impl Compression {
    pub fn as_str(&self) -> &'static str {
        match self {
            Compression::None => "none",
            Compression::Gzip => "gzip",
            Compression::Snappy => "snappy",
            Compression::Lz4 => "lz4",
            Compression::Zstd => "zstd",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TlsConfig {
    pub enabled: bool,
    pub skip_verify: bool,
    pub server_name: Option<String>,
    pub ca_file: Option<PathBuf>,
    pub cert_file: Option<PathBuf>,
    pub key_file: Option<PathBuf>,
}

/// Startup configuration of the broker producer.
///
/// Numeric tuning fields use zero for "leave the client default"; see
/// [`crate::ProducerSettings`] for the mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProducerConfig {
    pub backend: Backend,
    pub addresses: Vec<String>,
    pub balancer: BalancerStrategy,

    pub max_attempts: u32,
    pub batch_size: u32,
    pub batch_bytes: u64,
    pub batch_timeout_ms: u64,

    pub read_timeout_secs: u64,
    pub write_timeout_secs: u64,
    pub dial_timeout_secs: u64,
    pub idle_timeout_secs: u64,
    pub metadata_ttl_secs: u64,

    pub required_acks: RequiredAcks,
    #[serde(rename = "async")]
    pub async_writes: bool,
    pub compression: Compression,
    pub allow_auto_topic_creation: bool,
    pub client_id: Option<String>,

    /// Budget for flushing buffered messages when the producer closes
    pub flush_timeout_secs: u64,
    /// Partition count given to topics the dry-run backend creates
    pub dry_run_partitions: usize,

    pub tls: TlsConfig,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        ProducerConfig {
            backend: Backend::Kafka,
            addresses: vec!["127.0.0.1:9092".to_string()],
            balancer: BalancerStrategy::Hash,
            max_attempts: 0,
            batch_size: 0,
            batch_bytes: 0,
            batch_timeout_ms: 0,
            read_timeout_secs: 0,
            write_timeout_secs: 0,
            dial_timeout_secs: 0,
            idle_timeout_secs: 0,
            metadata_ttl_secs: 0,
            required_acks: RequiredAcks::None,
            async_writes: false,
            compression: Compression::None,
            allow_auto_topic_creation: false,
            client_id: None,
            flush_timeout_secs: 5,
            dry_run_partitions: 4,
            tls: TlsConfig::default(),
        }
    }
}

/// Dial timeout used by the probe when none is configured.
pub const DEFAULT_DIAL_TIMEOUT: Duration = Duration::from_secs(10);

impl ProducerConfig {
    pub fn dial_timeout(&self) -> Duration {
        if self.dial_timeout_secs > 0 {
            Duration::from_secs(self.dial_timeout_secs)
        } else {
            DEFAULT_DIAL_TIMEOUT
        }
    }

    pub fn flush_timeout(&self) -> Duration {
        Duration::from_secs(self.flush_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yaml_config() {
        let yaml = r#"
addresses: ["kafka-1:9093", "kafka-2:9093"]
balancer: keySuffix
batch_size: 100
required_acks: all
async: true
compression: zstd
tls:
  enabled: true
  ca_file: /etc/kafka/ca.pem
"#;
        let config: ProducerConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.addresses.len(), 2);
        assert_eq!(config.balancer, BalancerStrategy::KeySuffix);
        assert_eq!(config.batch_size, 100);
        assert_eq!(config.required_acks, RequiredAcks::All);
        assert!(config.async_writes);
        assert_eq!(config.compression, Compression::Zstd);
        assert!(config.tls.enabled);
        assert_eq!(config.tls.ca_file, Some(PathBuf::from("/etc/kafka/ca.pem")));
        assert_eq!(config.backend, Backend::Kafka);
        assert_eq!(config.flush_timeout_secs, 5);
    }

    #[test]
    fn test_dial_timeout_default() {
        let mut config = ProducerConfig::default();
        assert_eq!(config.dial_timeout(), DEFAULT_DIAL_TIMEOUT);
        config.dial_timeout_secs = 2;
        assert_eq!(config.dial_timeout(), Duration::from_secs(2));
    }

    #[test]
    fn test_enum_strings() {
        assert_eq!(RequiredAcks::All.as_str(), "all");
        assert_eq!(Compression::Lz4.as_str(), "lz4");
        assert_eq!(Backend::DryRun.as_str(), "dry_run");
        let backend: Backend = serde_json::from_str("\"dry_run\"").unwrap();
        assert_eq!(backend, Backend::DryRun);
    }
}
