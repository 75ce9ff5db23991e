//! Gateway connection lifecycle
//!
//! `Disconnected -> Connecting -> Connected -> Disconnected`. A connection owns
//! at most one socket; dropping the connection releases it.

use std::marker::PhantomData;
use std::sync::Arc;

use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, info, warn};

use crate::config::{Environment, GatewayConfig};
use crate::error::{ApnsError, ApnsResult};
use crate::tls::{Connector, GatewayAddress, GatewayStream, TlsGatewayConnector};

/// Endpoints of one gateway role
pub trait GatewayRole: Send + Sync + 'static {
    /// Role name used in logs
    const NAME: &'static str;

    fn resolve_address(environment: Environment) -> GatewayAddress;
}

/// Notification delivery gateway (port 2195)
#[derive(Debug, Clone, Copy)]
pub enum Message {}

impl GatewayRole for Message {
    const NAME: &'static str = "message";

    fn resolve_address(environment: Environment) -> GatewayAddress {
        match environment {
            Environment::Sandbox => GatewayAddress::new("gateway.sandbox.push.apple.com", 2195),
            Environment::Production => GatewayAddress::new("gateway.push.apple.com", 2195),
        }
    }
}

/// Stale-token feedback gateway (port 2196)
#[derive(Debug, Clone, Copy)]
pub enum Feedback {}

impl GatewayRole for Feedback {
    const NAME: &'static str = "feedback";

    fn resolve_address(environment: Environment) -> GatewayAddress {
        match environment {
            Environment::Sandbox => GatewayAddress::new("feedback.sandbox.push.apple.com", 2196),
            Environment::Production => GatewayAddress::new("feedback.push.apple.com", 2196),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// A single-owner connection to one gateway role
pub struct GatewayConnection<R: GatewayRole> {
    config: GatewayConfig,
    connector: Option<Arc<dyn Connector>>,
    state: ConnectionState,
    stream: Option<GatewayStream>,
    address: Option<GatewayAddress>,
    _role: PhantomData<R>,
}

impl<R: GatewayRole> GatewayConnection<R> {
    /// Connection that opens TLS sockets from `config`
    pub fn new(config: GatewayConfig) -> Self {
        Self {
            config,
            connector: None,
            state: ConnectionState::Disconnected,
            stream: None,
            address: None,
            _role: PhantomData,
        }
    }

    /// Connection that opens its byte stream through `connector`
    pub fn with_connector(config: GatewayConfig, connector: Arc<dyn Connector>) -> Self {
        let mut connection = Self::new(config);
        connection.connector = Some(connector);
        connection
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// Address of the open connection
    pub fn peer_address(&self) -> Option<&GatewayAddress> {
        self.address.as_ref()
    }

    /// Open the connection; `None` uses the configured default environment
    pub async fn connect(&mut self, environment: Option<Environment>) -> ApnsResult<()> {
        if self.state != ConnectionState::Disconnected {
            return Err(ApnsError::InvalidState(
                "connection has already been opened and must be closed first".to_string(),
            ));
        }
        if self.config.certificate_path.is_none() {
            return Err(ApnsError::InvalidArgument(
                "a client certificate must be configured before connecting".to_string(),
            ));
        }

        let environment = environment.unwrap_or(self.config.default_environment);
        let address = R::resolve_address(environment);
        let connector = self.connector()?;

        self.state = ConnectionState::Connecting;
        match connector.connect(&address).await {
            Ok(stream) => {
                info!(
                    gateway = R::NAME,
                    environment = %environment,
                    address = %address,
                    "Connected to push gateway"
                );
                self.stream = Some(stream);
                self.address = Some(address);
                self.state = ConnectionState::Connected;
                Ok(())
            }
            Err(e) => {
                if e.is_caller_error() {
                    debug!(
                        gateway = R::NAME,
                        address = %address,
                        error = %e,
                        "Push gateway connection attempt misconfigured"
                    );
                } else {
                    warn!(
                        gateway = R::NAME,
                        address = %address,
                        error = %e,
                        "Push gateway connection failed"
                    );
                }
                self.state = ConnectionState::Disconnected;
                Err(e)
            }
        }
    }

    fn connector(&self) -> ApnsResult<Arc<dyn Connector>> {
        match &self.connector {
            Some(connector) => Ok(Arc::clone(connector)),
            None => Ok(Arc::new(TlsGatewayConnector::from_config(&self.config)?)),
        }
    }

    /// Release the socket if held; always ends `Disconnected`
    pub async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = stream.shutdown().await {
                debug!(gateway = R::NAME, error = %e, "Ignoring socket shutdown error");
            }
            info!(gateway = R::NAME, address = ?self.address, "Closed push gateway connection");
        }
        self.address = None;
        self.state = ConnectionState::Disconnected;
    }

    /// Read up to `max_bytes` without blocking past the read window
    ///
    /// Returns `None` at end of stream and an empty buffer when nothing
    /// arrived within `read_timeout`. The default zero window polls the socket
    /// once and returns whatever is already buffered.
    pub async fn read(&mut self, max_bytes: usize) -> ApnsResult<Option<Bytes>> {
        let read_timeout = self.config.read_timeout;
        let stream = self.stream_mut()?;

        let mut buf = vec![0u8; max_bytes.max(1)];
        let n = match tokio::time::timeout(read_timeout, stream.read(&mut buf)).await {
            Ok(result) => result?,
            Err(_) => {
                debug!(gateway = R::NAME, "No data from push gateway within read window");
                return Ok(Some(Bytes::new()));
            }
        };

        if n == 0 {
            debug!(gateway = R::NAME, "Push gateway closed the stream");
            return Ok(None);
        }

        buf.truncate(n);
        debug!(gateway = R::NAME, bytes = n, "Read from push gateway");
        Ok(Some(Bytes::from(buf)))
    }

    /// Write all of `data` and flush; returns the number of bytes written
    pub async fn write(&mut self, data: &[u8]) -> ApnsResult<usize> {
        let stream = self.stream_mut()?;

        stream.write_all(data).await.map_err(ApnsError::Write)?;
        stream.flush().await.map_err(ApnsError::Write)?;

        debug!(gateway = R::NAME, bytes = data.len(), "Wrote to push gateway");
        Ok(data.len())
    }

    fn stream_mut(&mut self) -> ApnsResult<&mut GatewayStream> {
        match (self.state, self.stream.as_mut()) {
            (ConnectionState::Connected, Some(stream)) => Ok(stream),
            _ => Err(ApnsError::InvalidState(
                "the connection to the push gateway is not open".to_string(),
            )),
        }
    }

    /// Connect when needed; true when this call opened the connection
    pub(crate) async fn ensure_connected(&mut self) -> ApnsResult<bool> {
        if self.is_connected() {
            return Ok(false);
        }
        self.connect(None).await?;
        Ok(true)
    }
}

impl<R: GatewayRole> Drop for GatewayConnection<R> {
    fn drop(&mut self) {
        if self.stream.take().is_some() {
            debug!(gateway = R::NAME, address = ?self.address, "Released gateway socket on drop");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::io::DuplexStream;

    /// Hands out one duplex stream, or the configured error
    struct StubConnector {
        stream: Mutex<Option<DuplexStream>>,
    }

    #[async_trait]
    impl Connector for StubConnector {
        async fn connect(&self, address: &GatewayAddress) -> ApnsResult<GatewayStream> {
            match self.stream.lock().unwrap().take() {
                Some(stream) => Ok(Box::new(stream)),
                None => Err(ApnsError::InvalidArgument(format!(
                    "invalid gateway host '{}'",
                    address.host
                ))),
            }
        }
    }

    fn stub(stream: Option<DuplexStream>) -> Arc<dyn Connector> {
        Arc::new(StubConnector {
            stream: Mutex::new(stream),
        })
    }

    #[test]
    fn test_message_addresses() {
        assert_eq!(
            Message::resolve_address(Environment::Production).to_string(),
            "gateway.push.apple.com:2195"
        );
        assert_eq!(
            Message::resolve_address(Environment::Sandbox).to_string(),
            "gateway.sandbox.push.apple.com:2195"
        );
    }

    #[test]
    fn test_feedback_addresses() {
        assert_eq!(
            Feedback::resolve_address(Environment::Production).to_string(),
            "feedback.push.apple.com:2196"
        );
        assert_eq!(
            Feedback::resolve_address(Environment::Sandbox).to_string(),
            "feedback.sandbox.push.apple.com:2196"
        );
    }

    #[tokio::test]
    async fn test_io_requires_connection() {
        let mut conn = GatewayConnection::<Message>::new(GatewayConfig::default());

        assert!(!conn.is_connected());
        assert!(matches!(conn.read(6).await, Err(ApnsError::InvalidState(_))));
        assert!(matches!(conn.write(&[0]).await, Err(ApnsError::InvalidState(_))));
    }

    #[tokio::test]
    async fn test_connect_without_certificate() {
        let mut conn = GatewayConnection::<Feedback>::new(GatewayConfig::default());

        let err = conn.connect(None).await.unwrap_err();
        assert!(matches!(err, ApnsError::InvalidArgument(_)));
        assert_eq!(conn.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let mut conn = GatewayConnection::<Message>::new(GatewayConfig::default());

        conn.close().await;
        conn.close().await;
        assert_eq!(conn.state(), ConnectionState::Disconnected);
        assert!(conn.peer_address().is_none());
    }

    #[tokio::test]
    async fn test_read_returns_empty_on_silent_socket() {
        let (client, mut server) = tokio::io::duplex(64);
        let config = GatewayConfig::new("client.pem", Environment::Sandbox);
        let mut conn = GatewayConnection::<Message>::with_connector(config, stub(Some(client)));
        conn.connect(None).await.unwrap();

        let silent = tokio::time::timeout(Duration::from_secs(2), conn.read(6)).await;
        assert_eq!(silent.unwrap().unwrap(), Some(Bytes::new()));

        server.write_all(&[8, 7]).await.unwrap();
        assert_eq!(conn.read(6).await.unwrap(), Some(Bytes::from_static(&[8, 7])));

        drop(server);
        assert_eq!(conn.read(6).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_read_window_waits_for_late_data() {
        let (client, mut server) = tokio::io::duplex(64);
        let config = GatewayConfig::new("client.pem", Environment::Sandbox)
            .with_read_timeout(Duration::from_secs(5));
        let mut conn = GatewayConnection::<Message>::with_connector(config, stub(Some(client)));
        conn.connect(None).await.unwrap();

        let writer = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            server.write_all(&[1]).await.unwrap();
            server
        });

        assert_eq!(conn.read(6).await.unwrap(), Some(Bytes::from_static(&[1])));
        let _server = writer.await.unwrap();
    }

    #[tokio::test]
    async fn test_connector_error_leaves_connection_closed() {
        let config = GatewayConfig::new("client.pem", Environment::Production);
        let mut conn = GatewayConnection::<Feedback>::with_connector(config, stub(None));

        let err = conn.connect(None).await.unwrap_err();
        assert!(err.is_caller_error());
        assert_eq!(conn.state(), ConnectionState::Disconnected);
        assert!(conn.peer_address().is_none());

        // A failed attempt does not block the next one
        assert!(conn.connect(None).await.is_err());
    }
}
