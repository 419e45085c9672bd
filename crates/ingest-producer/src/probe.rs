use crate::config::ProducerConfig;
use crate::error::{ProducerError, Result};
use crate::tls::TlsMaterial;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Check that at least one configured broker address accepts a connection.
///
/// Addresses are tried in order, each bounded by the dial timeout. When TLS
/// material is given the handshake must also complete. Returns the first
/// address that answered.
pub async fn probe(config: &ProducerConfig, tls: Option<&TlsMaterial>) -> Result<String> {
    if config.addresses.is_empty() {
        return Err(ProducerError::NoAddresses);
    }

    let dial_timeout = config.dial_timeout();
    let mut last_error = String::new();

    for address in &config.addresses {
        match dial(address, tls, dial_timeout).await {
            Ok(()) => {
                info!(address = %address, tls = tls.is_some(), "broker is reachable");
                return Ok(address.clone());
            }
            Err(e) => {
                warn!(address = %address, error = %e, "broker address not reachable");
                last_error = e;
            }
        }
    }

    Err(ProducerError::BrokerUnreachable {
        attempted: config.addresses.clone(),
        last_error,
    })
}

async fn dial(
    address: &str,
    tls: Option<&TlsMaterial>,
    dial_timeout: Duration,
) -> std::result::Result<(), String> {
    let attempt = async {
        let stream = TcpStream::connect(address)
            .await
            .map_err(|e| format!("dial {}: {}", address, e))?;

        if let Some(tls) = tls {
            let name = tls.server_name_for(address).map_err(|e| e.to_string())?;
            let stream = tls
                .connector()
                .connect(name, stream)
                .await
                .map_err(|e| format!("TLS handshake with {}: {}", address, e))?;
            debug!(address = %address, "TLS handshake completed");
            drop(stream);
        }
        Ok(())
    };

    match timeout(dial_timeout, attempt).await {
        Ok(result) => result,
        Err(_) => Err(format!("dial {}: timed out after {:?}", address, dial_timeout)),
    }
}
