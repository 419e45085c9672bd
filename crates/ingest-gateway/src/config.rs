use crate::error::{GatewayError, Result};
use config::{Config, Environment, File, Map};
use ingest_producer::{Backend, ProducerConfig};
use ingest_worker::PoolConfig;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;

/// Prefix of environment overrides, e.g. `INGEST__POOL__SIZE=16`.
pub const ENV_PREFIX: &str = "INGEST";
const ENV_SEPARATOR: &str = "__";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub server: ServerConfig,
    pub pool: PoolConfig,
    pub producer: ProducerConfig,
    pub monitoring: MonitoringConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            listen: "0.0.0.0:8080".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    pub metrics_listen: String,
    pub log_level: String,
    pub log_format: LogFormat,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        MonitoringConfig {
            metrics_listen: "0.0.0.0:8081".to_string(),
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
        }
    }
}

impl GatewayConfig {
    /// Load from an optional file, then apply `INGEST__*` environment
    /// overrides. A file that is named explicitly must exist.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with_env(path, None)
    }

    /// Like [`GatewayConfig::load`] with the environment taken from `env`
    /// instead of the process when given.
    pub fn load_with_env(path: Option<&Path>, env: Option<Map<String, String>>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }

        let config = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator(ENV_SEPARATOR)
                    .separator(ENV_SEPARATOR)
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("producer.addresses")
                    .source(env),
            )
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// Reject configurations the gateway cannot start with.
    pub fn validate(&self) -> Result<()> {
        self.pool
            .validate()
            .map_err(|e| GatewayError::InvalidConfig(format!("pool: {}", e)))?;

        parse_addr("server.listen", &self.server.listen)?;
        parse_addr("monitoring.metrics_listen", &self.monitoring.metrics_listen)?;

        if self.producer.backend == Backend::Kafka && self.producer.addresses.is_empty() {
            return Err(GatewayError::InvalidConfig(
                "producer.addresses must list at least one broker".to_string(),
            ));
        }
        Ok(())
    }

    pub fn listen_addr(&self) -> Result<SocketAddr> {
        parse_addr("server.listen", &self.server.listen)
    }

    pub fn metrics_addr(&self) -> Result<SocketAddr> {
        parse_addr("monitoring.metrics_listen", &self.monitoring.metrics_listen)
    }
}

fn parse_addr(field: &str, value: &str) -> Result<SocketAddr> {
    value
        .parse()
        .map_err(|e| GatewayError::InvalidConfig(format!("{} {:?}: {}", field, value, e)))
}
