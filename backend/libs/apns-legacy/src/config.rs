use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tracing::info;

use crate::error::{ApnsError, ApnsResult};

/// Seconds allowed for TCP + TLS establishment
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Read window; zero polls the socket once without waiting
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::ZERO;

/// Bytes requested per socket read
pub const DEFAULT_READ_CHUNK_SIZE: usize = 8192;

/// Gateway environment selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    Sandbox,
    #[default]
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Sandbox => "sandbox",
            Environment::Production => "production",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = ApnsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sandbox" | "development" => Ok(Environment::Sandbox),
            "production" => Ok(Environment::Production),
            other => Err(ApnsError::InvalidArgument(format!(
                "environment must be 'sandbox' or 'production', got '{other}'"
            ))),
        }
    }
}

/// Numeric codes used by older callers: 1 = sandbox, 2 = production
impl TryFrom<u8> for Environment {
    type Error = ApnsError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Environment::Sandbox),
            2 => Ok(Environment::Production),
            other => Err(ApnsError::InvalidArgument(format!(
                "environment code must be 1 (sandbox) or 2 (production), got {other}"
            ))),
        }
    }
}

/// Connection lifetime used by `send_notification` and `poll_feedback`
/// when the connection is not already open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionMode {
    /// Connect for the operation and close afterwards
    #[default]
    Ephemeral,
    /// Connect on demand and keep the socket open for later calls
    Persistent,
}

impl FromStr for ConnectionMode {
    type Err = ApnsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ephemeral" => Ok(ConnectionMode::Ephemeral),
            "persistent" => Ok(ConnectionMode::Persistent),
            other => Err(ApnsError::InvalidArgument(format!(
                "connection mode must be 'ephemeral' or 'persistent', got '{other}'"
            ))),
        }
    }
}

/// Gateway connection configuration
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub default_environment: Environment,
    /// PEM file holding the client certificate chain and private key
    pub certificate_path: Option<PathBuf>,
    pub certificate_passphrase: Option<String>,
    /// Extra trust roots appended to the platform store
    pub ca_certificate_path: Option<PathBuf>,
    pub connect_timeout: Duration,
    /// How long `read` waits for data before returning an empty buffer
    pub read_timeout: Duration,
    pub read_chunk_size: usize,
    pub connection_mode: ConnectionMode,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            default_environment: Environment::default(),
            certificate_path: None,
            certificate_passphrase: None,
            ca_certificate_path: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
            read_chunk_size: DEFAULT_READ_CHUNK_SIZE,
            connection_mode: ConnectionMode::default(),
        }
    }
}

impl GatewayConfig {
    /// Create new gateway configuration
    pub fn new(certificate_path: impl Into<PathBuf>, environment: Environment) -> Self {
        Self {
            default_environment: environment,
            certificate_path: Some(certificate_path.into()),
            ..Default::default()
        }
    }

    /// Set certificate passphrase
    pub fn with_passphrase(mut self, passphrase: impl Into<String>) -> Self {
        self.certificate_passphrase = Some(passphrase.into());
        self
    }

    pub fn with_ca_certificate(mut self, path: impl Into<PathBuf>) -> Self {
        self.ca_certificate_path = Some(path.into());
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn with_read_chunk_size(mut self, size: usize) -> Self {
        self.read_chunk_size = size.max(1);
        self
    }

    pub fn with_connection_mode(mut self, mode: ConnectionMode) -> Self {
        self.connection_mode = mode;
        self
    }

    /// Load gateway configuration from environment variables
    ///
    /// **Environment Variables**:
    /// - `APNS_CERTIFICATE_PATH`: PEM file with certificate and private key
    /// - `APNS_CERTIFICATE_PASSPHRASE`: Passphrase for an encrypted key (optional)
    /// - `APNS_ENVIRONMENT`: `sandbox` or `production` (default: production)
    /// - `APNS_CA_CERT_PATH`: Additional trust roots (optional)
    /// - `APNS_CONNECT_TIMEOUT_SECS`: Connect timeout (default: 30)
    /// - `APNS_READ_TIMEOUT_SECS`: Read window (default: 0, no waiting)
    /// - `APNS_CONNECTION_MODE`: `ephemeral` or `persistent` (default: ephemeral)
    pub fn from_env() -> ApnsResult<Self> {
        let certificate_path =
            std::env::var("APNS_CERTIFICATE_PATH").map_err(|_| ApnsError::MissingEnvVar {
                var_name: "APNS_CERTIFICATE_PATH".to_string(),
                hint: "Set to the PEM file holding the push certificate and key".to_string(),
            })?;

        let default_environment = match std::env::var("APNS_ENVIRONMENT") {
            Ok(value) => value.parse()?,
            Err(_) => Environment::default(),
        };

        let connection_mode = match std::env::var("APNS_CONNECTION_MODE") {
            Ok(value) => value.parse()?,
            Err(_) => ConnectionMode::default(),
        };

        let connect_timeout =
            env_secs("APNS_CONNECT_TIMEOUT_SECS")?.unwrap_or(DEFAULT_CONNECT_TIMEOUT);
        let read_timeout = env_secs("APNS_READ_TIMEOUT_SECS")?.unwrap_or(DEFAULT_READ_TIMEOUT);

        let config = Self {
            default_environment,
            certificate_path: Some(PathBuf::from(certificate_path)),
            certificate_passphrase: std::env::var("APNS_CERTIFICATE_PASSPHRASE").ok(),
            ca_certificate_path: std::env::var("APNS_CA_CERT_PATH").ok().map(PathBuf::from),
            connect_timeout,
            read_timeout,
            read_chunk_size: DEFAULT_READ_CHUNK_SIZE,
            connection_mode,
        };

        info!(
            environment = %config.default_environment,
            certificate = ?config.certificate_path,
            connection_mode = ?config.connection_mode,
            "APNs gateway configuration loaded"
        );

        Ok(config)
    }
}

fn env_secs(var_name: &str) -> ApnsResult<Option<Duration>> {
    match std::env::var(var_name) {
        Ok(value) => value
            .trim()
            .parse::<u64>()
            .map(|secs| Some(Duration::from_secs(secs)))
            .map_err(|e| ApnsError::InvalidArgument(format!("{var_name}='{value}': {e}"))),
        Err(_) => Ok(None),
    }
}
