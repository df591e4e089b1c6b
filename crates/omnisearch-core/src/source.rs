//! Source identity, per-source configuration, and connection status.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// The closed set of supported backends.
///
/// Every per-source map in the supervisor is keyed by this enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Notion,
    Obsidian,
    Neo4j,
    GoogleDrive,
    #[serde(rename = "github")]
    GitHub,
}

impl SourceKind {
    /// All kinds, in enum order.
    pub const ALL: [SourceKind; 5] = [
        SourceKind::Notion,
        SourceKind::Obsidian,
        SourceKind::Neo4j,
        SourceKind::GoogleDrive,
        SourceKind::GitHub,
    ];

    /// Human-readable display name.
    pub fn display_name(&self) -> &'static str {
        match self {
            SourceKind::Notion => "Notion",
            SourceKind::Obsidian => "Obsidian",
            SourceKind::Neo4j => "Neo4j",
            SourceKind::GoogleDrive => "Google Drive",
            SourceKind::GitHub => "GitHub",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Launch configuration for one source's MCP server.
///
/// Pushed in by the UI collaborator and replaced atomically per kind. A new
/// config takes effect on the next start, never on a running client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub kind: SourceKind,
    #[serde(default)]
    pub enabled: bool,
    /// Program to exec, resolved via PATH.
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
    /// Overlay on the inherited environment; overlay wins on key conflict.
    /// Entries with empty values are treated as unset and never forwarded.
    #[serde(default)]
    pub env: HashMap<String, String>,
}

impl SourceConfig {
    pub fn new(kind: SourceKind) -> Self {
        Self {
            kind,
            enabled: false,
            command: None,
            args: Vec::new(),
            env: HashMap::new(),
        }
    }

    /// Whether this config can actually launch a child process.
    pub fn is_runnable(&self) -> bool {
        self.enabled && self.command.as_deref().is_some_and(|c| !c.is_empty())
    }

    /// The env overlay with empty-valued entries stripped.
    pub fn effective_env(&self) -> HashMap<String, String> {
        self.env
            .iter()
            .filter(|(_, v)| !v.is_empty())
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

/// Connection state of one source's MCP server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ServerStatus {
    Disconnected,
    Connecting,
    Connected { tool_count: u32 },
    Error { message: String },
}

impl ServerStatus {
    pub fn is_connected(&self) -> bool {
        matches!(self, ServerStatus::Connected { .. })
    }
}
