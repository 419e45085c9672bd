//! TLS material for broker connections.
//!
//! PEM files are read once at startup and turned into a rustls
//! [`ClientConfig`]. Any unreadable or malformed file is fatal.

use crate::config::TlsConfig;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use std::fmt;
use std::fs;
use std::io::{BufReader, Cursor};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio_rustls::TlsConnector;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum TlsError {
    #[error("failed to read {kind} file {}: {source}", path.display())]
    Read {
        kind: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid certificate in {}: {reason}", path.display())]
    InvalidCertificate { path: PathBuf, reason: String },

    #[error("invalid private key in {}: {reason}", path.display())]
    InvalidPrivateKey { path: PathBuf, reason: String },

    #[error("client certificate and key must be configured together")]
    IncompleteKeyPair,

    #[error("invalid TLS server name: {0}")]
    InvalidServerName(String),

    #[error("TLS configuration error: {0}")]
    Config(#[from] rustls::Error),
}

/// Loaded TLS state shared by the probe and the broker client.
#[derive(Clone)]
pub struct TlsMaterial {
    config: Arc<ClientConfig>,
    server_name: Option<String>,
    skip_verify: bool,
}

impl fmt::Debug for TlsMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsMaterial")
            .field("server_name", &self.server_name)
            .field("skip_verify", &self.skip_verify)
            .finish()
    }
}

fn provider() -> Arc<CryptoProvider> {
    Arc::new(rustls::crypto::ring::default_provider())
}

impl TlsMaterial {
    /// Returns `Ok(None)` when TLS is disabled.
    pub fn load(config: &TlsConfig) -> Result<Option<Self>, TlsError> {
        if !config.enabled {
            return Ok(None);
        }

        let provider = provider();
        let builder = ClientConfig::builder_with_provider(provider.clone())
            .with_safe_default_protocol_versions()?;

        let builder = if config.skip_verify {
            warn!("TLS certificate verification is disabled for broker connections");
            builder
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(SkipServerVerification(provider)))
        } else {
            builder.with_root_certificates(root_store(config.ca_file.as_deref())?)
        };

        let client_config = match (&config.cert_file, &config.key_file) {
            (Some(cert_path), Some(key_path)) => {
                let certs = read_certificates(cert_path, "certificate")?;
                let key = read_private_key(key_path)?;
                debug!(cert = %cert_path.display(), "loaded TLS client certificate");
                builder.with_client_auth_cert(certs, key)?
            }
            (None, None) => builder.with_no_client_auth(),
            _ => return Err(TlsError::IncompleteKeyPair),
        };

        // An empty name means unset: fall back to the broker host.
        let server_name = config.server_name.clone().filter(|name| !name.is_empty());
        if let Some(name) = &server_name {
            ServerName::try_from(name.clone())
                .map_err(|_| TlsError::InvalidServerName(name.clone()))?;
        }

        Ok(Some(TlsMaterial {
            config: Arc::new(client_config),
            server_name,
            skip_verify: config.skip_verify,
        }))
    }

    pub fn client_config(&self) -> &Arc<ClientConfig> {
        &self.config
    }

    pub fn connector(&self) -> TlsConnector {
        TlsConnector::from(self.config.clone())
    }

    pub fn skip_verify(&self) -> bool {
        self.skip_verify
    }

    /// Name presented for SNI and verification: the configured server name,
    /// otherwise the host part of `address`.
    pub fn server_name_for(&self, address: &str) -> Result<ServerName<'static>, TlsError> {
        let name = match &self.server_name {
            Some(name) => name.clone(),
            None => host_of(address).to_string(),
        };
        ServerName::try_from(name.clone()).map_err(|_| TlsError::InvalidServerName(name))
    }
}

fn host_of(address: &str) -> &str {
    let host = match address.rsplit_once(':') {
        Some((host, port)) if port.chars().all(|c| c.is_ascii_digit()) => host,
        _ => address,
    };
    host.trim_start_matches('[').trim_end_matches(']')
}

fn root_store(ca_file: Option<&Path>) -> Result<RootCertStore, TlsError> {
    let mut store = RootCertStore::empty();

    match ca_file {
        Some(path) => {
            for cert in read_certificates(path, "CA")? {
                store.add(cert).map_err(|e| TlsError::InvalidCertificate {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                })?;
            }
        }
        None => {
            let native = rustls_native_certs::load_native_certs();
            for err in &native.errors {
                warn!(error = %err, "failed to load a native root certificate");
            }
            let (added, ignored) = store.add_parsable_certificates(native.certs);
            debug!(added, ignored, "loaded native root certificates");
        }
    }

    if store.is_empty() {
        warn!("TLS root store is empty; broker certificates cannot be verified");
    }
    Ok(store)
}

fn read_file(path: &Path, kind: &'static str) -> Result<Vec<u8>, TlsError> {
    fs::read(path).map_err(|source| TlsError::Read {
        kind,
        path: path.to_path_buf(),
        source,
    })
}

fn read_certificates(
    path: &Path,
    kind: &'static str,
) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    let data = read_file(path, kind)?;
    let mut reader = BufReader::new(Cursor::new(data));
    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| TlsError::InvalidCertificate {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

    if certs.is_empty() {
        return Err(TlsError::InvalidCertificate {
            path: path.to_path_buf(),
            reason: "no certificates found in PEM data".to_string(),
        });
    }
    Ok(certs)
}

fn read_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, TlsError> {
    let data = read_file(path, "private key")?;
    let mut reader = BufReader::new(Cursor::new(data));
    rustls_pemfile::private_key(&mut reader)
        .map_err(|e| TlsError::InvalidPrivateKey {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?
        .ok_or_else(|| TlsError::InvalidPrivateKey {
            path: path.to_path_buf(),
            reason: "no private key found in PEM data".to_string(),
        })
}

/// Accepts any server certificate. Handshake signatures are still checked
/// so the peer must hold the key for the certificate it sends.
#[derive(Debug)]
struct SkipServerVerification(Arc<CryptoProvider>);

impl ServerCertVerifier for SkipServerVerification {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &self.0.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &self.0.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}
