//! Query-engine wire protocol: message types and the text codec.
//!
//! Every frame is a JSON object tagged by its `type` field.  The protocol
//! carries no request identifiers: replies are correlated with requests by
//! order alone, so this crate only describes shapes and never tracks state.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One result row, positionally aligned with the result's `columns`.
pub type Row = Vec<Value>;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Client → engine
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Messages the client sends.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Handshake: authenticate the connection.
    Login { username: String, password: String },

    /// Run one program or meta-command.
    Execute { program: String },

    /// Keepalive probe.
    Ping {},
}

impl fmt::Debug for ClientMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Login { username, .. } => f
                .debug_struct("Login")
                .field("username", username)
                .field("password", &"<redacted>")
                .finish(),
            Self::Execute { program } => {
                f.debug_struct("Execute").field("program", program).finish()
            }
            Self::Ping {} => f.write_str("Ping"),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Engine → client
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Messages the engine sends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Handshake accepted.
    Authenticated {
        session_id: SessionId,
        knowledge_graph: String,
        #[serde(default)]
        role: String,
    },

    /// Handshake rejected.
    AuthError { message: String },

    /// Single-shot query outcome.
    Result(QueryResult),

    /// Opens a streamed outcome.
    ResultStart(ResultStart),

    /// One slice of rows of a streamed outcome.
    ResultChunk(ResultChunk),

    /// Closes a streamed outcome.
    ResultEnd {},

    /// The in-flight request failed.
    Error {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        validation_errors: Option<Vec<ValidationError>>,
    },

    /// Unsolicited push; the payload is everything except `type`.
    Notification(serde_json::Map<String, Value>),

    /// Keepalive acknowledgment.
    Pong {},
}

impl ServerMessage {
    /// Wire tag of this message, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Authenticated { .. } => "authenticated",
            Self::AuthError { .. } => "auth_error",
            Self::Result(_) => "result",
            Self::ResultStart(_) => "result_start",
            Self::ResultChunk(_) => "result_chunk",
            Self::ResultEnd {} => "result_end",
            Self::Error { .. } => "error",
            Self::Notification(_) => "notification",
            Self::Pong {} => "pong",
        }
    }
}

/// A complete query outcome, whether delivered whole or assembled from a stream.
///
/// Engines that omit the counters still decode: `row_count` falls back to
/// the number of rows, the rest to zero/false.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "WireQueryResult")]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
    pub row_count: u64,
    pub total_count: u64,
    pub truncated: bool,
    pub execution_time_ms: f64,
    /// Per-row origin labels, aligned with `rows`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row_provenance: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    /// Set when the program switched the session to another knowledge graph.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub switched_kg: Option<String>,
}

#[derive(Deserialize)]
struct WireQueryResult {
    columns: Vec<String>,
    rows: Vec<Row>,
    #[serde(default)]
    row_count: Option<u64>,
    #[serde(default)]
    total_count: u64,
    #[serde(default)]
    truncated: bool,
    #[serde(default)]
    execution_time_ms: f64,
    #[serde(default)]
    row_provenance: Option<Vec<String>>,
    #[serde(default)]
    metadata: Option<Value>,
    #[serde(default)]
    switched_kg: Option<String>,
}

impl From<WireQueryResult> for QueryResult {
    fn from(wire: WireQueryResult) -> Self {
        Self {
            row_count: wire.row_count.unwrap_or(wire.rows.len() as u64),
            columns: wire.columns,
            rows: wire.rows,
            total_count: wire.total_count,
            truncated: wire.truncated,
            execution_time_ms: wire.execution_time_ms,
            row_provenance: wire.row_provenance,
            metadata: wire.metadata,
            switched_kg: wire.switched_kg,
        }
    }
}

/// Header of a streamed outcome: everything but the rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultStart {
    pub columns: Vec<String>,
    #[serde(default)]
    pub total_count: u64,
    #[serde(default)]
    pub truncated: bool,
    #[serde(default)]
    pub execution_time_ms: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub switched_kg: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultChunk {
    pub rows: Vec<Row>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row_provenance: Option<Vec<String>>,
}

/// Structured per-statement diagnostic attached to an `error`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationError {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub statement: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<u32>,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.line, self.column) {
            (Some(line), Some(col)) => write!(f, "{line}:{col}: {}", self.message),
            (Some(line), None) => write!(f, "{line}: {}", self.message),
            _ => f.write_str(&self.message),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Session identifier
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Opaque session identifier.
///
/// Engines that authenticate send a string; the login-less variant sends a
/// number.  Both are normalized to their textual form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "RawSessionId", into = "String")]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<SessionId> for String {
    fn from(id: SessionId) -> Self {
        id.0
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawSessionId {
    Text(String),
    Number(serde_json::Number),
}

impl From<RawSessionId> for SessionId {
    fn from(raw: RawSessionId) -> Self {
        match raw {
            RawSessionId::Text(s) => Self(s),
            RawSessionId::Number(n) => Self(n.to_string()),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Codec
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Serialize an outgoing message to a text frame.
pub fn encode(msg: &ClientMessage) -> Result<String, serde_json::Error> {
    serde_json::to_string(msg)
}

/// Parse an inbound text frame.
///
/// Unparseable frames and unknown tags yield `None`: one corrupt frame must
/// never take the session down.
pub fn decode(text: &str) -> Option<ServerMessage> {
    match serde_json::from_str::<ServerMessage>(text) {
        Ok(msg) => Some(msg),
        Err(e) => {
            tracing::debug!(error = %e, bytes = text.len(), "dropping unparseable frame");
            None
        }
    }
}
