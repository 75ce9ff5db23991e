//! TLS transport for the push gateways
//!
//! The client authenticates with a certificate and private key read from one
//! PEM file. Encrypted PKCS#8 keys are decrypted with the configured
//! passphrase; unencrypted keys ignore it.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use pkcs8::EncryptedPrivateKeyInfo;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer, ServerName};
use rustls::{ClientConfig, RootCertStore};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tracing::{debug, info, warn};

use crate::config::GatewayConfig;
use crate::error::{ApnsError, ApnsResult};

/// Byte stream to a gateway
pub trait AsyncStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> AsyncStream for T {}

pub type GatewayStream = Box<dyn AsyncStream>;

/// Host and port of a gateway endpoint
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GatewayAddress {
    pub host: String,
    pub port: u16,
}

impl GatewayAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for GatewayAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Opens the byte stream behind a gateway connection
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, address: &GatewayAddress) -> ApnsResult<GatewayStream>;
}

/// Client certificate chain and private key
pub struct ClientIdentity {
    pub cert_chain: Vec<CertificateDer<'static>>,
    pub private_key: PrivateKeyDer<'static>,
}

impl fmt::Debug for ClientIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientIdentity")
            .field("cert_chain", &self.cert_chain.len())
            .finish_non_exhaustive()
    }
}

impl ClientIdentity {
    /// Load certificate chain and key from a PEM file
    pub fn from_pem_file(path: &Path, passphrase: Option<&str>) -> ApnsResult<Self> {
        let pem_bytes = fs::read(path)
            .map_err(|e| certificate_error(path, format!("failed to read file: {e}")))?;
        Self::from_pem(path, &pem_bytes, passphrase)
    }

    fn from_pem(path: &Path, pem_bytes: &[u8], passphrase: Option<&str>) -> ApnsResult<Self> {
        let cert_chain = rustls_pemfile::certs(&mut &pem_bytes[..])
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| certificate_error(path, format!("invalid certificate block: {e}")))?;

        if cert_chain.is_empty() {
            return Err(certificate_error(path, "no CERTIFICATE block found"));
        }

        let private_key = match rustls_pemfile::private_key(&mut &pem_bytes[..])
            .map_err(|e| certificate_error(path, format!("invalid private key block: {e}")))?
        {
            Some(key) => key,
            None => decrypt_private_key(path, pem_bytes, passphrase)?,
        };

        Ok(Self {
            cert_chain,
            private_key,
        })
    }
}

fn decrypt_private_key(
    path: &Path,
    pem_bytes: &[u8],
    passphrase: Option<&str>,
) -> ApnsResult<PrivateKeyDer<'static>> {
    let blocks = pem::parse_many(pem_bytes)
        .map_err(|e| certificate_error(path, format!("PEM parse error: {e}")))?;

    let encrypted = blocks
        .iter()
        .find(|block| block.tag() == "ENCRYPTED PRIVATE KEY")
        .ok_or_else(|| certificate_error(path, "no private key block found"))?;

    let passphrase = passphrase.ok_or_else(|| {
        certificate_error(path, "private key is encrypted but no passphrase is configured")
    })?;

    let info = EncryptedPrivateKeyInfo::try_from(encrypted.contents())
        .map_err(|e| certificate_error(path, format!("invalid encrypted private key: {e}")))?;

    let document = info
        .decrypt(passphrase)
        .map_err(|e| certificate_error(path, format!("failed to decrypt private key: {e}")))?;

    Ok(PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(
        document.as_bytes().to_vec(),
    )))
}

fn certificate_error(path: &Path, reason: impl Into<String>) -> ApnsError {
    ApnsError::Certificate {
        path: path.to_path_buf(),
        reason: reason.into(),
    }
}

/// Platform trust roots plus any extra CA certificates
fn load_root_store(ca_certificate_path: Option<&PathBuf>) -> ApnsResult<RootCertStore> {
    let mut roots = RootCertStore::empty();

    match rustls_native_certs::load_native_certs() {
        Ok(certs) => {
            let (added, ignored) = roots.add_parsable_certificates(certs);
            debug!(added, ignored, "Loaded platform trust roots");
        }
        Err(e) => warn!(error = %e, "Failed to load platform trust roots"),
    }

    if let Some(path) = ca_certificate_path {
        let pem_bytes = fs::read(path)
            .map_err(|e| certificate_error(path, format!("failed to read file: {e}")))?;

        for cert in rustls_pemfile::certs(&mut &pem_bytes[..]) {
            let cert = cert
                .map_err(|e| certificate_error(path, format!("invalid certificate block: {e}")))?;
            roots
                .add(cert)
                .map_err(|e| certificate_error(path, format!("rejected trust root: {e}")))?;
        }
    }

    Ok(roots)
}

/// TLS over TCP, authenticated with the configured client certificate
#[derive(Clone)]
pub struct TlsGatewayConnector {
    tls: TlsConnector,
    connect_timeout: Duration,
}

impl TlsGatewayConnector {
    pub fn from_config(config: &GatewayConfig) -> ApnsResult<Self> {
        let certificate_path = config.certificate_path.as_ref().ok_or_else(|| {
            ApnsError::InvalidArgument(
                "a client certificate must be configured before connecting".to_string(),
            )
        })?;

        let identity = ClientIdentity::from_pem_file(
            certificate_path,
            config.certificate_passphrase.as_deref(),
        )?;
        let roots = load_root_store(config.ca_certificate_path.as_ref())?;

        let provider = Arc::new(rustls::crypto::aws_lc_rs::default_provider());
        let client_config = ClientConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()
            .map_err(|e| certificate_error(certificate_path, format!("TLS setup failed: {e}")))?
            .with_root_certificates(roots)
            .with_client_auth_cert(identity.cert_chain, identity.private_key)
            .map_err(|e| {
                certificate_error(certificate_path, format!("rejected client identity: {e}"))
            })?;

        Ok(Self {
            tls: TlsConnector::from(Arc::new(client_config)),
            connect_timeout: config.connect_timeout,
        })
    }
}

#[async_trait]
impl Connector for TlsGatewayConnector {
    async fn connect(&self, address: &GatewayAddress) -> ApnsResult<GatewayStream> {
        let connection_error = |source: io::Error| ApnsError::Connection {
            address: address.to_string(),
            source,
        };

        let tcp = tokio::time::timeout(
            self.connect_timeout,
            TcpStream::connect((address.host.as_str(), address.port)),
        )
        .await
        .map_err(|_| connection_error(timed_out("connection timed out")))?
        .map_err(connection_error)?;

        tcp.set_nodelay(true).map_err(connection_error)?;

        let server_name = ServerName::try_from(address.host.clone()).map_err(|e| {
            ApnsError::InvalidArgument(format!("invalid gateway host '{}': {e}", address.host))
        })?;

        let stream = tokio::time::timeout(self.connect_timeout, self.tls.connect(server_name, tcp))
            .await
            .map_err(|_| connection_error(timed_out("TLS handshake timed out")))?
            .map_err(connection_error)?;

        info!(address = %address, "TLS session established with push gateway");

        Ok(Box::new(stream))
    }
}

fn timed_out(message: &str) -> io::Error {
    io::Error::new(io::ErrorKind::TimedOut, message.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rcgen::{CertificateParams, KeyPair};
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn generated_identity() -> (String, String) {
        let key_pair = KeyPair::generate().unwrap();
        let cert = CertificateParams::new(vec!["push-client".to_string()])
            .unwrap()
            .self_signed(&key_pair)
            .unwrap();
        (cert.pem(), key_pair.serialize_pem())
    }

    fn write_pem(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_identity_from_combined_pem() {
        let (cert, key) = generated_identity();
        let file = write_pem(&format!("{cert}\n{key}"));

        let identity = ClientIdentity::from_pem_file(file.path(), None).unwrap();
        assert_eq!(identity.cert_chain.len(), 1);
        assert!(matches!(identity.private_key, PrivateKeyDer::Pkcs8(_)));
    }

    #[test]
    fn test_passphrase_ignored_for_plain_key() {
        let (cert, key) = generated_identity();
        let file = write_pem(&format!("{key}\n{cert}"));

        assert!(ClientIdentity::from_pem_file(file.path(), Some("secret")).is_ok());
    }

    #[test]
    fn test_missing_key() {
        let (cert, _) = generated_identity();
        let file = write_pem(&cert);

        let err = ClientIdentity::from_pem_file(file.path(), None).unwrap_err();
        assert!(matches!(err, ApnsError::Certificate { .. }));
        assert!(err.to_string().contains("no private key"));
    }

    #[test]
    fn test_missing_certificate() {
        let (_, key) = generated_identity();
        let file = write_pem(&key);

        let err = ClientIdentity::from_pem_file(file.path(), None).unwrap_err();
        assert!(err.to_string().contains("no CERTIFICATE"));
    }

    #[test]
    fn test_unreadable_file() {
        let err =
            ClientIdentity::from_pem_file(Path::new("/nonexistent/push.pem"), None).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/push.pem"));
    }

    #[test]
    fn test_connector_requires_certificate() {
        let err = TlsGatewayConnector::from_config(&GatewayConfig::default()).err().unwrap();
        assert!(matches!(err, ApnsError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_connection_refused_reports_address() {
        let (cert, key) = generated_identity();
        let file = write_pem(&format!("{cert}\n{key}"));

        let config = GatewayConfig::new(file.path(), crate::config::Environment::Sandbox)
            .with_connect_timeout(Duration::from_secs(5));
        let connector = TlsGatewayConnector::from_config(&config).unwrap();

        // Bind then drop to get a local port with no listener
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();

        let address = GatewayAddress::new("127.0.0.1", port);
        let err = connector.connect(&address).await.err().unwrap();

        match err {
            ApnsError::Connection { address: reported, .. } => {
                assert_eq!(reported, format!("127.0.0.1:{port}"));
            }
            other => panic!("expected connection error, got {other:?}"),
        }
    }

    #[test]
    fn test_address_display() {
        let address = GatewayAddress::new("gateway.push.apple.com", 2195);
        assert_eq!(address.to_string(), "gateway.push.apple.com:2195");
    }
}
