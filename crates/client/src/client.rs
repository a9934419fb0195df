//! Public client handle.

use std::sync::Arc;
use std::time::Duration;

use kg_protocol::{QueryResult, SessionId};
use tokio::sync::{mpsc, oneshot, watch};

use crate::builder::ClientBuilder;
use crate::config::ClientConfig;
use crate::fanout::Subscription;
use crate::session::{Command, Dispatcher, Shared};
use crate::transport::Connector;
use crate::types::{ClientError, ConnectionState, Credentials, Session};
use crate::Notification;

const COMMAND_CAPACITY: usize = 256;

/// Handle to one engine connection.
///
/// Cheap to clone; every clone drives the same connection.  The connection is
/// closed when the last clone is dropped.
#[derive(Clone)]
pub struct Client {
    commands: mpsc::Sender<Command>,
    shared: Arc<Shared>,
    request_timeout: Duration,
}

impl Client {
    /// Start a new builder.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Build a client over WebSocket from a config.
    pub fn from_config(config: ClientConfig) -> Result<Self, ClientError> {
        ClientBuilder::new().config(config).build()
    }

    /// Spawn the dispatcher task.  Must run inside a Tokio runtime.
    pub(crate) fn spawn(config: ClientConfig, connector: Arc<dyn Connector>) -> Self {
        let (commands, commands_rx) = mpsc::channel(COMMAND_CAPACITY);
        let shared = Arc::new(Shared::new());
        let request_timeout = config.request_timeout();

        let dispatcher = Dispatcher::new(config, connector, shared.clone(), commands_rx);
        tokio::spawn(dispatcher.run());

        Self {
            commands,
            shared,
            request_timeout,
        }
    }

    /// Open the connection and authenticate.
    ///
    /// Resolves once the engine accepts or rejects the login.  Automatic
    /// reconnects reuse these credentials.
    pub async fn connect(&self, credentials: Credentials) -> Result<Session, ClientError> {
        let (reply, rx) = oneshot::channel();
        self.command(Command::Connect { credentials, reply }).await?;
        rx.await.map_err(|_| ClientError::Shutdown)?
    }

    /// Run a program with the configured default timeout.
    pub async fn execute(&self, program: impl Into<String>) -> Result<QueryResult, ClientError> {
        self.execute_with_timeout(program, self.request_timeout).await
    }

    /// Run a program.  A zero `timeout` waits indefinitely.
    ///
    /// Outcomes are delivered in the order requests were sent.  Fails at once
    /// with [`ClientError::NotConnected`] unless the session is established.
    pub async fn execute_with_timeout(
        &self,
        program: impl Into<String>,
        timeout: Duration,
    ) -> Result<QueryResult, ClientError> {
        let (reply, rx) = oneshot::channel();
        self.command(Command::Execute {
            program: program.into(),
            timeout,
            reply,
        })
        .await?;
        rx.await.map_err(|_| ClientError::Shutdown)?
    }

    /// Close the connection, stop reconnecting, and reject everything in flight.
    /// Safe to call any number of times.
    pub async fn disconnect(&self) {
        let (reply, rx) = oneshot::channel();
        if self.command(Command::Disconnect { reply }).await.is_ok() {
            let _ = rx.await;
        }
    }

    /// Register a handler for unsolicited engine notifications.
    pub fn on_notification<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&Notification) + Send + Sync + 'static,
    {
        self.shared.notifications.subscribe(handler)
    }

    /// Register a handler for connection state transitions.
    pub fn on_state_change<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&ConnectionState) + Send + Sync + 'static,
    {
        self.shared.state_changes.subscribe(handler)
    }

    pub fn state(&self) -> ConnectionState {
        *self.shared.state.borrow()
    }

    /// Receiver that observes every state transition.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    pub fn session(&self) -> Option<Session> {
        self.shared.session.read().clone()
    }

    pub fn session_id(&self) -> Option<SessionId> {
        self.shared
            .session
            .read()
            .as_ref()
            .and_then(|s| s.session_id.clone())
    }

    pub fn bound_namespace(&self) -> Option<String> {
        self.shared
            .session
            .read()
            .as_ref()
            .map(|s| s.bound_namespace.clone())
    }

    pub fn role(&self) -> Option<String> {
        self.shared.session.read().as_ref().map(|s| s.role.clone())
    }

    async fn command(&self, cmd: Command) -> Result<(), ClientError> {
        self.commands
            .send(cmd)
            .await
            .map_err(|_| ClientError::Shutdown)
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("state", &self.state())
            .field("session", &self.session())
            .finish()
    }
}
