//! Builder pattern for constructing a [`Client`].

use std::sync::Arc;
use std::time::Duration;

use crate::client::Client;
use crate::config::{Capabilities, ClientConfig};
use crate::reconnect::ReconnectBackoff;
use crate::transport::{Connector, WsConnector};
use crate::types::ClientError;

/// Fluent builder for [`Client`].
///
/// # Example
///
/// ```rust,no_run
/// # use kg_client::{ClientBuilder, Credentials};
/// # async fn demo() -> Result<(), kg_client::ClientError> {
/// let client = ClientBuilder::new()
///     .url("ws://localhost:8080/ws")
///     .namespace("default")
///     .request_timeout(std::time::Duration::from_secs(10))
///     .build()?;
/// client.connect(Credentials::new("ada", "secret")).await?;
/// let result = client.execute("?edge(X,Y)").await?;
/// println!("{} rows", result.row_count);
/// # Ok(())
/// # }
/// ```
pub struct ClientBuilder {
    config: ClientConfig,
    connector: Option<Arc<dyn Connector>>,
}

impl ClientBuilder {
    pub fn new() -> Self {
        Self {
            config: ClientConfig::default(),
            connector: None,
        }
    }

    /// Start from a loaded config; later calls override individual fields.
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    // ── Target ───────────────────────────────────────────────────────

    /// Engine WebSocket URL (e.g. `wss://engine.example.com/ws`).
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.config.url = url.into();
        self
    }

    /// Knowledge graph to bind on connect.
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.config.namespace = namespace.into();
        self
    }

    /// Replace the WebSocket transport (custom sockets, tests).
    pub fn connector(mut self, connector: impl Connector) -> Self {
        self.connector = Some(Arc::new(connector));
        self
    }

    // ── Timing ───────────────────────────────────────────────────────

    /// Default deadline for [`Client::execute`] (default 30s, zero = none).
    pub fn request_timeout(mut self, d: Duration) -> Self {
        self.config.request_timeout_ms = d.as_millis() as u64;
        self
    }

    /// Deadline for the login reply (default 10s, zero = none).
    pub fn handshake_timeout(mut self, d: Duration) -> Self {
        self.config.handshake_timeout_ms = d.as_millis() as u64;
        self
    }

    /// Ping interval while connected (default 30s, zero disables keepalive).
    pub fn keepalive_interval(mut self, d: Duration) -> Self {
        self.config.keepalive_interval_ms = d.as_millis() as u64;
        self
    }

    // ── Reconnect ────────────────────────────────────────────────────

    pub fn auto_reconnect(mut self, enabled: bool) -> Self {
        self.config.reconnect.enabled = enabled;
        self
    }

    pub fn reconnect_backoff(mut self, backoff: ReconnectBackoff) -> Self {
        self.config.reconnect.base_delay_ms = backoff.base_delay.as_millis() as u64;
        self.config.reconnect.max_delay_ms = backoff.max_delay.as_millis() as u64;
        self.config.reconnect.max_attempts = backoff.max_attempts;
        self
    }

    // ── Capabilities / limits ────────────────────────────────────────

    pub fn capabilities(mut self, capabilities: Capabilities) -> Self {
        self.config.capabilities = capabilities;
        self
    }

    /// Whether the engine expects a `login` handshake (default true).
    pub fn login(mut self, enabled: bool) -> Self {
        self.config.capabilities.login = enabled;
        self
    }

    /// Whether the engine may stream results in chunks (default true).
    pub fn streaming(mut self, enabled: bool) -> Self {
        self.config.capabilities.streaming = enabled;
        self
    }

    /// Maximum inbound frame size (default 16 MiB).
    pub fn max_frame_bytes(mut self, n: usize) -> Self {
        self.config.max_frame_bytes = n;
        self
    }

    /// Build the [`Client`] and start its dispatcher task.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn build(self) -> Result<Client, ClientError> {
        if self.config.url.is_empty() {
            return Err(ClientError::Config("url is required".into()));
        }
        if self.config.namespace.is_empty() {
            return Err(ClientError::Config("namespace is required".into()));
        }
        if self.connector.is_none()
            && !(self.config.url.starts_with("ws://") || self.config.url.starts_with("wss://"))
        {
            return Err(ClientError::Config(format!(
                "url must use ws:// or wss://, got {}",
                self.config.url
            )));
        }
        if tokio::runtime::Handle::try_current().is_err() {
            return Err(ClientError::Config(
                "Client must be built within a Tokio runtime".into(),
            ));
        }

        let connector = self
            .connector
            .unwrap_or_else(|| Arc::new(WsConnector));
        Ok(Client::spawn(self.config, connector))
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ConnectionState;

    #[tokio::test]
    async fn builds_disconnected_client() {
        let client = ClientBuilder::new().build().unwrap();
        assert_eq!(client.state(), ConnectionState::Disconnected);
        assert!(client.session().is_none());
        assert!(client.session_id().is_none());
    }

    #[tokio::test]
    async fn rejects_non_websocket_url() {
        let err = ClientBuilder::new().url("http://localhost").build().unwrap_err();
        assert!(matches!(err, ClientError::Config(_)), "{err:?}");
    }

    #[tokio::test]
    async fn rejects_empty_namespace() {
        let err = ClientBuilder::new().namespace("").build().unwrap_err();
        assert!(matches!(err, ClientError::Config(_)), "{err:?}");
    }

    #[test]
    fn requires_runtime() {
        let err = ClientBuilder::new().build().unwrap_err();
        assert!(matches!(err, ClientError::Config(_)), "{err:?}");
    }

    #[tokio::test]
    async fn execute_before_connect_is_not_connected() {
        let client = ClientBuilder::new().build().unwrap();
        let err = client.execute("?edge(X,Y)").await.unwrap_err();
        assert_eq!(err, ClientError::NotConnected);
    }

    #[tokio::test]
    async fn disconnect_when_idle_is_a_no_op() {
        let client = ClientBuilder::new().build().unwrap();
        client.disconnect().await;
        client.disconnect().await;
        assert_eq!(client.state(), ConnectionState::Disconnected);
    }
}
