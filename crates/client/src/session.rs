//! Session state machine.
//!
//! One dispatcher task per client owns every piece of mutable protocol state:
//! the link, the session, the ledger, the streaming assembly, the reconnect
//! counter and all timers.  Public handles talk to it through [`Command`]s and
//! read the snapshots it publishes in [`Shared`].
//!
//! ```text
//! disconnected ──connect──▶ connecting ──authenticated──▶ connected
//!      ▲                      │  ▲                            │
//!      │    auth_error /      │  │ retry due                  │ unexpected close
//!      │    pre-auth close    ▼  │                            ▼
//!      └──────────────────── reconnecting ◀──────────────────┘
//!                 (ceiling reached)
//! ```

use std::sync::Arc;
use std::time::Duration;

use kg_protocol::{ClientMessage, QueryResult, ServerMessage};
use parking_lot::RwLock;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{Instant, Interval, MissedTickBehavior};

use crate::assembler::StreamingAssembly;
use crate::config::ClientConfig;
use crate::fanout::Subscribers;
use crate::ledger::{Ledger, Responder, Settled};
use crate::reconnect::ReconnectBackoff;
use crate::transport::{Connector, Link, LinkEvent};
use crate::types::{ClientError, ConnectionState, Credentials, Session, TransportError};
use crate::Notification;

/// Query parameter carrying the namespace in the connection URL.
pub const NAMESPACE_PARAM: &str = "kg";

/// Requests from public handles to the dispatcher.
pub(crate) enum Command {
    Connect {
        credentials: Credentials,
        reply: oneshot::Sender<Result<Session, ClientError>>,
    },
    Execute {
        program: String,
        timeout: Duration,
        reply: Responder<QueryResult>,
    },
    Disconnect {
        reply: oneshot::Sender<()>,
    },
}

/// State the dispatcher publishes for handles to read.
pub(crate) struct Shared {
    pub state: watch::Sender<ConnectionState>,
    pub session: RwLock<Option<Session>>,
    pub notifications: Subscribers<Notification>,
    pub state_changes: Subscribers<ConnectionState>,
}

impl Shared {
    pub fn new() -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            state,
            session: RwLock::new(None),
            notifications: Subscribers::new(),
            state_changes: Subscribers::new(),
        }
    }
}

enum Event {
    Command(Option<Command>),
    Opened {
        generation: u64,
        result: Result<Link, TransportError>,
    },
    Link(LinkEvent),
    RequestDeadline,
    RetryDue,
    HandshakeDeadline,
    KeepaliveTick,
}

pub(crate) struct Dispatcher {
    config: ClientConfig,
    backoff: ReconnectBackoff,
    connector: Arc<dyn Connector>,
    shared: Arc<Shared>,

    commands: mpsc::Receiver<Command>,
    opened_tx: mpsc::UnboundedSender<(u64, Result<Link, TransportError>)>,
    opened_rx: mpsc::UnboundedReceiver<(u64, Result<Link, TransportError>)>,

    state: ConnectionState,
    link: Option<Link>,
    /// Bumped on every open attempt and teardown; stale opens are closed.
    generation: u64,
    credentials: Credentials,
    session: Option<Session>,
    /// Caller awaiting `connect()`.  Retries have none.
    waiter: Option<oneshot::Sender<Result<Session, ClientError>>>,
    /// The current connecting phase was started by the retry timer.
    retrying: bool,
    attempts: u32,

    ledger: Ledger<QueryResult>,
    assembly: Option<StreamingAssembly>,

    handshake_deadline: Option<Instant>,
    retry_at: Option<Instant>,
    keepalive: Option<Interval>,
}

impl Dispatcher {
    pub fn new(
        config: ClientConfig,
        connector: Arc<dyn Connector>,
        shared: Arc<Shared>,
        commands: mpsc::Receiver<Command>,
    ) -> Self {
        let (opened_tx, opened_rx) = mpsc::unbounded_channel();
        Self {
            backoff: config.reconnect.backoff(),
            config,
            connector,
            shared,
            commands,
            opened_tx,
            opened_rx,
            state: ConnectionState::Disconnected,
            link: None,
            generation: 0,
            credentials: Credentials::default(),
            session: None,
            waiter: None,
            retrying: false,
            attempts: 0,
            ledger: Ledger::new(),
            assembly: None,
            handshake_deadline: None,
            retry_at: None,
            keepalive: None,
        }
    }

    /// Run until every client handle has been dropped.
    pub async fn run(mut self) {
        loop {
            let event = tokio::select! {
                cmd = self.commands.recv() => Event::Command(cmd),
                Some((generation, result)) = self.opened_rx.recv() => {
                    Event::Opened { generation, result }
                }
                ev = next_link_event(&mut self.link) => Event::Link(ev),
                _ = wait_until(self.ledger.next_deadline()) => Event::RequestDeadline,
                _ = wait_until(self.retry_at) => Event::RetryDue,
                _ = wait_until(self.handshake_deadline) => Event::HandshakeDeadline,
                _ = tick(&mut self.keepalive) => Event::KeepaliveTick,
            };

            match event {
                Event::Command(Some(cmd)) => self.on_command(cmd),
                Event::Command(None) => {
                    tracing::debug!("all client handles dropped, shutting down");
                    self.teardown("client dropped");
                    return;
                }
                Event::Opened { generation, result } => self.on_opened(generation, result),
                Event::Link(LinkEvent::Text(text)) => self.on_text(text),
                Event::Link(LinkEvent::Closed { reason }) => self.on_closed(reason),
                Event::RequestDeadline => {
                    self.ledger.expire(Instant::now());
                }
                Event::RetryDue => self.on_retry_due(),
                Event::HandshakeDeadline => self.on_handshake_deadline(),
                Event::KeepaliveTick => self.on_keepalive(),
            }
        }
    }

    // ── Commands ─────────────────────────────────────────────────────

    fn on_command(&mut self, cmd: Command) {
        match cmd {
            Command::Connect { credentials, reply } => self.on_connect(credentials, reply),
            Command::Execute {
                program,
                timeout,
                reply,
            } => self.on_execute(program, timeout, reply),
            Command::Disconnect { reply } => {
                self.teardown("client disconnected");
                let _ = reply.send(());
            }
        }
    }

    fn on_connect(
        &mut self,
        credentials: Credentials,
        reply: oneshot::Sender<Result<Session, ClientError>>,
    ) {
        match self.state {
            ConnectionState::Connected => {
                let _ = reply.send(self.session.clone().ok_or(ClientError::NotConnected));
            }
            ConnectionState::Connecting => {
                let _ = reply.send(Err(ClientError::ConnectInProgress));
            }
            ConnectionState::Disconnected | ConnectionState::Reconnecting => {
                self.retry_at = None;
                self.retrying = false;
                self.attempts = 0;
                self.credentials = credentials;
                self.waiter = Some(reply);
                self.begin_open();
            }
        }
    }

    fn on_execute(&mut self, program: String, timeout: Duration, reply: Responder<QueryResult>) {
        let open = self.link.as_ref().is_some_and(Link::is_open);
        if self.state != ConnectionState::Connected || !open {
            let _ = reply.send(Err(ClientError::NotConnected));
            return;
        }

        if let Err(e) = self.send(&ClientMessage::Execute { program }) {
            let _ = reply.send(Err(e.into()));
            return;
        }
        let id = self.ledger.push(reply, timeout, Instant::now());
        tracing::trace!(id, in_flight = self.ledger.len(), "request sent");
    }

    // ── Connection lifecycle ─────────────────────────────────────────

    fn begin_open(&mut self) {
        self.generation += 1;
        self.set_state(ConnectionState::Connecting);

        let url = build_url(&self.config.url, &self.config.namespace);
        tracing::info!(url = %url, attempt = self.attempts, "connecting to engine");

        let connector = self.connector.clone();
        let opened_tx = self.opened_tx.clone();
        let generation = self.generation;
        tokio::spawn(async move {
            let result = connector.open(&url).await;
            let _ = opened_tx.send((generation, result));
        });
    }

    fn on_opened(&mut self, generation: u64, result: Result<Link, TransportError>) {
        if generation != self.generation || self.state != ConnectionState::Connecting {
            if let Ok(link) = result {
                tracing::debug!(generation, "closing superseded connection");
                link.close();
            }
            return;
        }

        let link = match result {
            Ok(link) => link,
            Err(e) => {
                tracing::warn!(error = %e, "failed to open connection");
                self.fail_handshake(e);
                return;
            }
        };
        self.link = Some(link);

        if !self.config.capabilities.login {
            self.on_authenticated(Session {
                session_id: None,
                bound_namespace: self.config.namespace.clone(),
                role: String::new(),
            });
            return;
        }

        let login = ClientMessage::Login {
            username: self.credentials.username.clone(),
            password: self.credentials.password.clone(),
        };
        if let Err(e) = self.send(&login) {
            self.fail_handshake(e);
            return;
        }
        let timeout = self.config.handshake_timeout();
        self.handshake_deadline = (!timeout.is_zero()).then(|| Instant::now() + timeout);
    }

    fn on_handshake(&mut self, msg: ServerMessage) {
        match msg {
            ServerMessage::Authenticated {
                session_id,
                knowledge_graph,
                role,
            } => self.on_authenticated(Session {
                session_id: Some(session_id),
                bound_namespace: knowledge_graph,
                role,
            }),
            ServerMessage::AuthError { message } => {
                tracing::warn!(message = %message, "authentication rejected");
                self.handshake_deadline = None;
                self.retrying = false;
                self.attempts = 0;
                self.drop_link();
                self.set_state(ConnectionState::Disconnected);
                if let Some(waiter) = self.waiter.take() {
                    let _ = waiter.send(Err(ClientError::Auth(message)));
                }
            }
            other => {
                tracing::debug!(kind = other.kind(), "discarding message received before authentication");
            }
        }
    }

    fn on_authenticated(&mut self, session: Session) {
        self.handshake_deadline = None;
        self.retrying = false;
        self.attempts = 0;

        tracing::info!(
            session_id = session.session_id.as_ref().map(|s| s.as_str()).unwrap_or("-"),
            namespace = %session.bound_namespace,
            role = %session.role,
            "authenticated"
        );

        self.publish_session(Some(session.clone()));
        self.set_state(ConnectionState::Connected);
        self.start_keepalive();

        if let Some(waiter) = self.waiter.take() {
            let _ = waiter.send(Ok(session));
        }
    }

    /// Any failure before the session is established.
    fn fail_handshake(&mut self, err: TransportError) {
        self.handshake_deadline = None;
        self.drop_link();
        if let Some(waiter) = self.waiter.take() {
            let _ = waiter.send(Err(err.into()));
        }
        if self.retrying {
            self.schedule_retry();
        } else {
            self.set_state(ConnectionState::Disconnected);
        }
    }

    fn on_handshake_deadline(&mut self) {
        self.handshake_deadline = None;
        if self.state == ConnectionState::Connecting && self.link.is_some() {
            tracing::warn!("no handshake reply before the deadline");
            self.fail_handshake(TransportError::HandshakeTimeout);
        }
    }

    fn on_closed(&mut self, reason: String) {
        self.link = None;
        match self.state {
            ConnectionState::Connecting => {
                tracing::warn!(reason = %reason, "connection closed during handshake");
                self.fail_handshake(TransportError::ClosedBeforeAuthenticated);
            }
            ConnectionState::Connected => self.on_connection_lost(reason),
            _ => {}
        }
    }

    fn on_connection_lost(&mut self, reason: String) {
        tracing::warn!(reason = %reason, pending = self.ledger.live(), "connection lost");
        self.assembly = None;
        self.ledger
            .reject_all(&ClientError::Transport(TransportError::Closed(reason)));
        self.publish_session(None);

        if self.config.reconnect.enabled {
            self.schedule_retry();
        } else {
            self.set_state(ConnectionState::Disconnected);
        }
    }

    fn schedule_retry(&mut self) {
        if !self.backoff.can_retry(self.attempts) {
            tracing::error!(attempts = self.attempts, "reconnect attempts exhausted");
            self.retry_at = None;
            self.retrying = false;
            self.set_state(ConnectionState::Disconnected);
            return;
        }

        self.attempts += 1;
        let delay = self.backoff.delay_for_attempt(self.attempts);
        tracing::info!(
            attempt = self.attempts,
            max_attempts = self.backoff.max_attempts,
            delay_ms = delay.as_millis() as u64,
            "reconnecting"
        );
        self.retry_at = Some(Instant::now() + delay);
        self.set_state(ConnectionState::Reconnecting);
    }

    fn on_retry_due(&mut self) {
        self.retry_at = None;
        if self.state != ConnectionState::Reconnecting {
            return;
        }
        self.retrying = true;
        self.begin_open();
    }

    /// Intentional close.  Idempotent.
    fn teardown(&mut self, reason: &str) {
        self.generation += 1;
        self.retry_at = None;
        self.retrying = false;
        self.attempts = 0;
        self.handshake_deadline = None;
        self.assembly = None;
        self.drop_link();

        let rejected = self
            .ledger
            .reject_all(&ClientError::Transport(TransportError::Closed(reason.to_string())));
        if let Some(waiter) = self.waiter.take() {
            let _ = waiter.send(Err(TransportError::ClosedBeforeAuthenticated.into()));
        }
        self.publish_session(None);

        if self.state != ConnectionState::Disconnected {
            tracing::info!(reason, rejected, "disconnecting");
        }
        self.set_state(ConnectionState::Disconnected);
    }

    // ── Inbound dispatch ─────────────────────────────────────────────

    fn on_text(&mut self, text: String) {
        if text.len() > self.config.max_frame_bytes {
            tracing::warn!(
                bytes = text.len(),
                max = self.config.max_frame_bytes,
                "inbound frame exceeds max_frame_bytes, dropping"
            );
            return;
        }
        let Some(msg) = kg_protocol::decode(&text) else {
            return;
        };

        match self.state {
            ConnectionState::Connecting => self.on_handshake(msg),
            ConnectionState::Connected => self.on_message(msg),
            _ => tracing::debug!(kind = msg.kind(), "message with no session, dropping"),
        }
    }

    fn on_message(&mut self, msg: ServerMessage) {
        let streaming = self.config.capabilities.streaming;
        match msg {
            ServerMessage::Result(result) => {
                self.note_namespace_switch(result.switched_kg.as_deref());
                if let Some(partial) = self.assembly.take() {
                    tracing::warn!(rows = partial.rows_so_far(), "single-shot result during a stream, discarding partial rows");
                }
                self.settle(Ok(result));
            }
            ServerMessage::ResultStart(header) if streaming => {
                self.note_namespace_switch(header.switched_kg.as_deref());
                if let Some(partial) = self.assembly.replace(StreamingAssembly::begin(header)) {
                    tracing::warn!(rows = partial.rows_so_far(), "result_start during a stream, discarding partial rows");
                }
            }
            ServerMessage::ResultChunk(chunk) if streaming => match self.assembly.as_mut() {
                Some(assembly) => assembly.push(chunk),
                None => tracing::debug!("result_chunk with no active stream, ignoring"),
            },
            ServerMessage::ResultEnd {} if streaming => match self.assembly.take() {
                Some(assembly) => {
                    let result = assembly.finish();
                    self.note_namespace_switch(result.switched_kg.as_deref());
                    self.settle(Ok(result));
                }
                None => tracing::debug!("result_end with no active stream, ignoring"),
            },
            other @ (ServerMessage::ResultStart(_)
            | ServerMessage::ResultChunk(_)
            | ServerMessage::ResultEnd {}) => {
                tracing::debug!(kind = other.kind(), "streaming not enabled, dropping");
            }
            ServerMessage::Error {
                message,
                validation_errors,
            } => {
                if let Some(partial) = self.assembly.take() {
                    tracing::debug!(rows = partial.rows_so_far(), "error mid-stream, discarding partial rows");
                }
                self.settle(Err(ClientError::Protocol {
                    message,
                    validation_errors: validation_errors.unwrap_or_default(),
                }));
            }
            ServerMessage::Notification(payload) => self.shared.notifications.emit(&payload),
            ServerMessage::Pong {} => tracing::trace!("received pong"),
            other @ (ServerMessage::Authenticated { .. } | ServerMessage::AuthError { .. }) => {
                tracing::debug!(kind = other.kind(), "handshake reply after authentication, ignoring");
            }
        }
    }

    fn settle(&mut self, outcome: Result<QueryResult, ClientError>) {
        match self.ledger.settle_head(outcome) {
            Settled::Delivered { id } => tracing::trace!(id, "request settled"),
            Settled::Stale { id } => tracing::debug!(id, "discarding reply for timed-out request"),
            Settled::Empty => tracing::debug!("reply with no request in flight, ignoring"),
        }
    }

    fn note_namespace_switch(&mut self, switched: Option<&str>) {
        let (Some(target), Some(session)) = (switched, self.session.as_mut()) else {
            return;
        };
        if session.bound_namespace == target {
            return;
        }
        tracing::info!(from = %session.bound_namespace, to = %target, "namespace switched");
        session.bound_namespace = target.to_string();
        *self.shared.session.write() = self.session.clone();
    }

    // ── Keepalive ────────────────────────────────────────────────────

    fn start_keepalive(&mut self) {
        let period = self.config.keepalive_interval();
        if period.is_zero() {
            return;
        }
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.keepalive = Some(interval);
    }

    fn on_keepalive(&mut self) {
        let open = self.link.as_ref().is_some_and(Link::is_open);
        if self.state != ConnectionState::Connected || !open {
            return;
        }
        if let Err(e) = self.send(&ClientMessage::Ping {}) {
            tracing::debug!(error = %e, "failed to send ping");
        }
    }

    // ── Helpers ──────────────────────────────────────────────────────

    fn send(&self, msg: &ClientMessage) -> Result<(), TransportError> {
        let link = self
            .link
            .as_ref()
            .ok_or_else(|| TransportError::Closed("no connection".into()))?;
        let text = kg_protocol::encode(msg)
            .map_err(|e| TransportError::Closed(format!("failed to encode message: {e}")))?;
        link.send_text(text)
    }

    fn drop_link(&mut self) {
        if let Some(link) = self.link.take() {
            link.close();
        }
    }

    fn publish_session(&mut self, session: Option<Session>) {
        self.session = session.clone();
        *self.shared.session.write() = session;
    }

    fn set_state(&mut self, next: ConnectionState) {
        if self.state == next {
            return;
        }
        let prev = self.state;
        self.state = next;
        if prev == ConnectionState::Connected {
            self.keepalive = None;
        }
        tracing::info!(from = %prev, to = %next, "connection state changed");
        self.shared.state.send_replace(next);
        self.shared.state_changes.emit(&next);
    }
}

/// Append the namespace query parameter to the engine URL.
pub(crate) fn build_url(base: &str, namespace: &str) -> String {
    let sep = if base.contains('?') { '&' } else { '?' };
    format!("{base}{sep}{NAMESPACE_PARAM}={namespace}")
}

async fn next_link_event(link: &mut Option<Link>) -> LinkEvent {
    match link {
        Some(link) => link.inbound.recv().await.unwrap_or(LinkEvent::Closed {
            reason: "transport dropped".into(),
        }),
        None => std::future::pending().await,
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn tick(keepalive: &mut Option<Interval>) {
    match keepalive {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}
