use crate::config::{Compression, ProducerConfig, RequiredAcks, TlsConfig};
use ingest_core::BalancerStrategy;
use std::collections::BTreeMap;
use std::time::Duration;

/// Producer settings resolved from [`ProducerConfig`].
///
/// `None` means the field was zero or absent in configuration and the client
/// library default stays in effect. Booleans and the ack level always apply
/// as written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProducerSettings {
    pub bootstrap_servers: String,
    pub balancer: BalancerStrategy,
    pub required_acks: RequiredAcks,
    pub async_writes: bool,
    pub allow_auto_topic_creation: bool,
    pub max_attempts: Option<u32>,
    pub batch_size: Option<u32>,
    pub batch_bytes: Option<u64>,
    pub batch_timeout: Option<Duration>,
    pub read_timeout: Option<Duration>,
    pub write_timeout: Option<Duration>,
    pub dial_timeout: Option<Duration>,
    pub idle_timeout: Option<Duration>,
    pub metadata_ttl: Option<Duration>,
    pub compression: Option<Compression>,
    pub client_id: Option<String>,
    pub tls: Option<TlsConfig>,
}

fn positive<T: Default + PartialEq>(value: T) -> Option<T> {
    if value == T::default() {
        None
    } else {
        Some(value)
    }
}

fn secs(value: u64) -> Option<Duration> {
    positive(value).map(Duration::from_secs)
}

fn millis(d: Duration) -> String {
    d.as_millis().to_string()
}

impl ProducerSettings {
    pub fn from_config(config: &ProducerConfig) -> Self {
        ProducerSettings {
            bootstrap_servers: config.addresses.join(","),
            balancer: config.balancer,
            required_acks: config.required_acks,
            async_writes: config.async_writes,
            allow_auto_topic_creation: config.allow_auto_topic_creation,
            max_attempts: positive(config.max_attempts),
            batch_size: positive(config.batch_size),
            batch_bytes: positive(config.batch_bytes),
            batch_timeout: positive(config.batch_timeout_ms).map(Duration::from_millis),
            read_timeout: secs(config.read_timeout_secs),
            write_timeout: secs(config.write_timeout_secs),
            dial_timeout: secs(config.dial_timeout_secs),
            idle_timeout: secs(config.idle_timeout_secs),
            metadata_ttl: secs(config.metadata_ttl_secs),
            compression: match config.compression {
                Compression::None => None,
                other => Some(other),
            },
            client_id: config.client_id.clone().filter(|id| !id.is_empty()),
            tls: config.tls.enabled.then(|| config.tls.clone()),
        }
    }

    /// Render as librdkafka client properties. Unset fields are omitted so
    /// the library defaults apply.
    pub fn client_properties(&self) -> BTreeMap<&'static str, String> {
        let mut props = BTreeMap::new();
        props.insert("bootstrap.servers", self.bootstrap_servers.clone());
        props.insert("acks", self.required_acks.as_str().to_string());

        if let Some(attempts) = self.max_attempts {
            // Attempts include the first send; librdkafka counts retries only.
            props.insert("retries", attempts.saturating_sub(1).to_string());
        }
        if let Some(size) = self.batch_size {
            props.insert("batch.num.messages", size.to_string());
        }
        if let Some(bytes) = self.batch_bytes {
            props.insert("batch.size", bytes.to_string());
        }
        if let Some(linger) = self.batch_timeout {
            props.insert("linger.ms", millis(linger));
        }
        if let Some(timeout) = self.read_timeout {
            props.insert("socket.timeout.ms", millis(timeout));
        }
        if let Some(timeout) = self.write_timeout {
            props.insert("message.timeout.ms", millis(timeout));
        }
        if let Some(timeout) = self.dial_timeout {
            props.insert("socket.connection.setup.timeout.ms", millis(timeout));
        }
        if let Some(timeout) = self.idle_timeout {
            props.insert("connections.max.idle.ms", millis(timeout));
        }
        if let Some(ttl) = self.metadata_ttl {
            props.insert("metadata.max.age.ms", millis(ttl));
        }
        if let Some(compression) = self.compression {
            props.insert("compression.type", compression.as_str().to_string());
        }
        if let Some(client_id) = &self.client_id {
            props.insert("client.id", client_id.clone());
        }

        if let Some(tls) = &self.tls {
            props.insert("security.protocol", "ssl".to_string());
            if let Some(ca) = &tls.ca_file {
                props.insert("ssl.ca.location", ca.display().to_string());
            }
            if let Some(cert) = &tls.cert_file {
                props.insert("ssl.certificate.location", cert.display().to_string());
            }
            if let Some(key) = &tls.key_file {
                props.insert("ssl.key.location", key.display().to_string());
            }
            if tls.skip_verify {
                props.insert("enable.ssl.certificate.verification", "false".to_string());
                props.insert("ssl.endpoint.identification.algorithm", "none".to_string());
            }
        }

        props
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_zero_values_use_library_defaults() {
        let settings = ProducerSettings::from_config(&ProducerConfig::default());
        assert_eq!(settings.max_attempts, None);
        assert_eq!(settings.batch_size, None);
        assert_eq!(settings.batch_timeout, None);
        assert_eq!(settings.read_timeout, None);
        assert_eq!(settings.compression, None);
        assert_eq!(settings.tls, None);

        let props = settings.client_properties();
        assert_eq!(props.len(), 2);
        assert_eq!(props["bootstrap.servers"], "127.0.0.1:9092");
        assert_eq!(props["acks"], "0");
    }

    #[test]
    fn test_explicit_values_are_mapped() {
        let config = ProducerConfig {
            addresses: vec!["a:9092".to_string(), "b:9092".to_string()],
            max_attempts: 5,
            batch_size: 200,
            batch_bytes: 1_048_576,
            batch_timeout_ms: 25,
            read_timeout_secs: 10,
            write_timeout_secs: 7,
            dial_timeout_secs: 3,
            idle_timeout_secs: 60,
            metadata_ttl_secs: 30,
            required_acks: RequiredAcks::All,
            compression: Compression::Snappy,
            client_id: Some("gateway-1".to_string()),
            ..Default::default()
        };

        let props = ProducerSettings::from_config(&config).client_properties();
        assert_eq!(props["bootstrap.servers"], "a:9092,b:9092");
        assert_eq!(props["acks"], "all");
        assert_eq!(props["retries"], "4");
        assert_eq!(props["batch.num.messages"], "200");
        assert_eq!(props["batch.size"], "1048576");
        assert_eq!(props["linger.ms"], "25");
        assert_eq!(props["socket.timeout.ms"], "10000");
        assert_eq!(props["message.timeout.ms"], "7000");
        assert_eq!(props["socket.connection.setup.timeout.ms"], "3000");
        assert_eq!(props["connections.max.idle.ms"], "60000");
        assert_eq!(props["metadata.max.age.ms"], "30000");
        assert_eq!(props["compression.type"], "snappy");
        assert_eq!(props["client.id"], "gateway-1");
        assert!(!props.contains_key("security.protocol"));
    }

    #[test]
    fn test_booleans_apply_literally() {
        let mut config = ProducerConfig::default();
        assert!(!ProducerSettings::from_config(&config).async_writes);
        config.async_writes = true;
        config.allow_auto_topic_creation = true;
        let settings = ProducerSettings::from_config(&config);
        assert!(settings.async_writes);
        assert!(settings.allow_auto_topic_creation);
    }

    #[test]
    fn test_tls_only_when_enabled() {
        let mut config = ProducerConfig::default();
        config.tls.ca_file = Some(PathBuf::from("/certs/ca.pem"));
        assert!(ProducerSettings::from_config(&config).tls.is_none());

        config.tls.enabled = true;
        config.tls.skip_verify = true;
        config.tls.cert_file = Some(PathBuf::from("/certs/client.pem"));
        config.tls.key_file = Some(PathBuf::from("/certs/client.key"));
        let props = ProducerSettings::from_config(&config).client_properties();
        assert_eq!(props["security.protocol"], "ssl");
        assert_eq!(props["ssl.ca.location"], "/certs/ca.pem");
        assert_eq!(props["ssl.certificate.location"], "/certs/client.pem");
        assert_eq!(props["ssl.key.location"], "/certs/client.key");
        assert_eq!(props["enable.ssl.certificate.verification"], "false");
    }
}
