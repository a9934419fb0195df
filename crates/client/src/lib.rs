//! `kg-client`: resilient client for a query engine spoken to over one
//! persistent WebSocket.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  Command   ┌──────────────────────────────────────────┐
//! │ Client (any  │──────────▶ │ Dispatcher task (owns all protocol state) │
//! │ number of    │ ◀───────── │  session state machine + handshake        │
//! │ clones)      │  oneshot   │  pending-request ledger (FIFO)            │
//! └──────────────┘            │  streaming assembler                      │
//!        ▲                    │  reconnect timer + keepalive              │
//!        │ snapshots /        └───────────────┬──────────────────────────┘
//!        │ handlers                           │ Link (text frames)
//!        └────────────────────────────────────▼
//!                                      Connector (WebSocket)
//! ```
//!
//! # Connection flow
//!
//! 1. Connect WS to `<url>?kg=<namespace>`
//! 2. Send `login { username, password }`
//! 3. Wait for `authenticated { session_id, knowledge_graph, role }` or `auth_error`
//! 4. Main loop:
//!    - `execute { program }` per request; replies are matched strictly in send order
//!    - `result` or `result_start`/`result_chunk`*/`result_end` resolve the oldest request
//!    - `error` rejects the oldest request
//!    - `notification` goes to subscribers
//!    - periodic `ping` keeps the connection alive
//! 5. On unexpected close: reject in-flight requests, reconnect with jittered
//!    exponential back-off up to the configured ceiling
//!
//! The protocol has no request ids, so pipelining relies on the engine
//! answering every request exactly once and in order.

mod assembler;
pub mod builder;
pub mod client;
pub mod config;
mod fanout;
mod ledger;
pub mod reconnect;
mod session;
pub mod transport;
pub mod types;

// ── Re-exports for ergonomic imports ─────────────────────────────────

pub use builder::ClientBuilder;
pub use client::Client;
pub use config::{Capabilities, ClientConfig, ReconnectConfig};
pub use fanout::Subscription;
pub use reconnect::ReconnectBackoff;
pub use transport::{Connector, Link, LinkEvent, LinkPeer, Outbound, WsConnector};
pub use types::{ClientError, ConnectionState, Credentials, Session, TransportError};

// Re-export protocol types so callers never need to import kg-protocol directly.
pub use kg_protocol::{QueryResult, Row, SessionId, ValidationError};

/// Payload of an unsolicited engine notification (every field but `type`).
pub type Notification = serde_json::Map<String, serde_json::Value>;
