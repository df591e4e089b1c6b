pub mod source;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use source::{ServerStatus, SourceConfig, SourceKind};

// --- Error types ---

#[derive(Debug, thiserror::Error)]
pub enum OmniError {
    /// An RPC was issued on a client that is not ready or already disconnected.
    #[error("not connected")]
    NotConnected,

    #[error("no server running for source: {0}")]
    ServerNotFound(String),

    /// The peer answered with a JSON-RPC error object.
    #[error("server error {code}: {message}")]
    Server { code: i32, message: String },

    /// Spawn failed or child I/O failed at startup.
    #[error("process error: {0}")]
    Process(String),

    /// The stream closed or an RPC timed out mid-flight.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Valid JSON arrived but did not match the expected RPC shape.
    #[error("response parse error: {0}")]
    ResponseParse(String),

    /// The source has no usable command configured.
    #[error("Not configured")]
    NotConfigured,

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type OmniResult<T> = Result<T, OmniError>;

// --- Tool types ---

/// A tool advertised by an MCP server via `tools/list`.
///
/// Names are unique within a source but not globally.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tool {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, rename = "inputSchema")]
    pub input_schema: Option<serde_json::Value>,
}

/// Flattened outcome of a `tools/call` round-trip.
///
/// `content` is the newline-joined text of every text content item the
/// server returned; non-text items are dropped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub content: String,
    pub is_error: bool,
}

impl ToolResult {
    pub fn success(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: false,
        }
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: true,
        }
    }
}

// --- Search types ---

/// One normalized hit from a single source.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    /// Fresh opaque identity, assigned at construction.
    pub id: Uuid,
    pub source: SourceKind,
    pub title: String,
    pub snippet: String,
    pub url: Option<String>,
    /// Relevance in [0, 1], higher is better.
    pub relevance: f64,
    pub metadata: HashMap<String, String>,
}

impl SearchResult {
    pub fn new(
        source: SourceKind,
        title: impl Into<String>,
        snippet: impl Into<String>,
        relevance: f64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            source,
            title: title.into(),
            snippet: snippet.into(),
            url: None,
            relevance,
            metadata: HashMap::new(),
        }
    }

    pub fn with_url(mut self, url: Option<String>) -> Self {
        self.url = url;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}
