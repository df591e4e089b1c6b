//! Per-source query shaping and payload parsing.
//!
//! Each source module exposes two pure functions: `build_query` turns the
//! user's query into the tool invocation that source understands, and `parse`
//! turns the raw tool output back into normalized search results. Parsing is
//! best-effort throughout: items missing required fields are skipped, never
//! fatal.

pub mod drive;
pub mod github;
pub mod neo4j;
pub mod notion;
pub mod obsidian;
pub mod score;

use std::collections::HashMap;

use omnisearch_core::{SearchResult, SourceKind};
use serde_json::Value;

/// Maximum snippet length, in characters.
pub const SNIPPET_LEN: usize = 200;

/// A tool name plus its arguments, ready for `tools/call`.
#[derive(Debug, Clone)]
pub struct ToolInvocation {
    pub tool: &'static str,
    pub arguments: HashMap<String, Value>,
}

/// Shape the user query for the given source.
pub fn build_query(kind: SourceKind, query: &str) -> ToolInvocation {
    match kind {
        SourceKind::Notion => notion::build_query(query),
        SourceKind::Obsidian => obsidian::build_query(query),
        SourceKind::Neo4j => neo4j::build_query(query),
        SourceKind::GoogleDrive => drive::build_query(query),
        SourceKind::GitHub => github::build_query(query),
    }
}

/// Parse one source's raw tool output into scored results.
pub fn parse(kind: SourceKind, raw: &str, query: &str) -> Vec<SearchResult> {
    match kind {
        SourceKind::Notion => notion::parse(raw, query),
        SourceKind::Obsidian => obsidian::parse(raw, query),
        SourceKind::Neo4j => neo4j::parse(raw, query),
        SourceKind::GoogleDrive => drive::parse(raw, query),
        SourceKind::GitHub => github::parse(raw, query),
    }
}

/// First `SNIPPET_LEN` characters of the body.
pub(crate) fn snippet(body: &str) -> String {
    body.chars().take(SNIPPET_LEN).collect()
}

/// Keep only well-formed absolute URLs.
pub(crate) fn valid_url(raw: Option<String>) -> Option<String> {
    let raw = raw?;
    url::Url::parse(&raw).ok().map(|_| raw)
}
