//! Server registry and lifecycle, plus the fan-out search.
//!
//! All per-source maps live behind one lock, so every status transition and
//! the client/tools/status commit that follows a handshake are single
//! critical sections. State is published as immutable snapshots over a watch
//! channel; readers clone a snapshot and never touch the manager's lock.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use omnisearch_core::{
    OmniError, OmniResult, SearchResult, ServerStatus, SourceConfig, SourceKind, Tool, ToolResult,
};
use omnisearch_mcp::McpClient;
use serde_json::Value;
use tokio::sync::{watch, RwLock};
use tracing::{debug, info, warn};

/// Point-in-time view of every source's status and cached tool catalog.
#[derive(Debug, Clone)]
pub struct StatusSnapshot {
    pub statuses: HashMap<SourceKind, ServerStatus>,
    pub tools: HashMap<SourceKind, Vec<Tool>>,
    pub taken_at: DateTime<Utc>,
}

/// Everything the manager owns, mutated only under one write lock.
struct ManagerState {
    configs: HashMap<SourceKind, SourceConfig>,
    clients: HashMap<SourceKind, Arc<McpClient>>,
    statuses: HashMap<SourceKind, ServerStatus>,
    tools: HashMap<SourceKind, Vec<Tool>>,
}

impl ManagerState {
    fn new() -> Self {
        Self {
            configs: HashMap::new(),
            clients: HashMap::new(),
            statuses: SourceKind::ALL
                .into_iter()
                .map(|kind| (kind, ServerStatus::Disconnected))
                .collect(),
            tools: HashMap::new(),
        }
    }

    fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            statuses: self.statuses.clone(),
            tools: self.tools.clone(),
            taken_at: Utc::now(),
        }
    }
}

/// Supervises one MCP client per configured source.
pub struct ServerManager {
    state: RwLock<ManagerState>,
    snapshot_tx: watch::Sender<StatusSnapshot>,
}

impl ServerManager {
    pub fn new() -> Self {
        let state = ManagerState::new();
        let (snapshot_tx, _) = watch::channel(state.snapshot());

        Self {
            state: RwLock::new(state),
            snapshot_tx,
        }
    }

    /// Replace the config for its kind. A running client is untouched; the
    /// new config takes effect on the next start.
    pub async fn update_config(&self, config: SourceConfig) {
        self.state.write().await.configs.insert(config.kind, config);
    }

    /// Start one source's server: spawn, handshake, cache the tool catalog.
    ///
    /// Always leaves the status at `Connected` or `Error`, never `Connecting`.
    pub async fn start_server(&self, kind: SourceKind) -> OmniResult<()> {
        // The guard and the Connecting transition share one critical section,
        // so at most one start is in flight per kind.
        let config = {
            let mut state = self.state.write().await;

            let config = state.configs.get(&kind).cloned();
            let Some(config) = config.filter(SourceConfig::is_runnable) else {
                warn!(source = %kind, "start requested without a usable config");
                state.statuses.insert(
                    kind,
                    ServerStatus::Error {
                        message: "Not configured".into(),
                    },
                );
                self.publish(&state);
                return Err(OmniError::NotConfigured);
            };

            if state.clients.contains_key(&kind)
                || state.statuses.get(&kind) == Some(&ServerStatus::Connecting)
            {
                debug!(source = %kind, "server already running or starting, ignoring start");
                return Ok(());
            }

            state.statuses.insert(kind, ServerStatus::Connecting);
            self.publish(&state);
            config
        };

        match self.connect(&config).await {
            Ok((client, tools)) => {
                let stale = {
                    let mut state = self.state.write().await;

                    // A stop racing the handshake wins; it already published
                    // Disconnected, so throw the fresh client away.
                    if state.statuses.get(&kind) != Some(&ServerStatus::Connecting) {
                        Some(client)
                    } else {
                        let tool_count = tools.len() as u32;
                        state.clients.insert(kind, Arc::new(client));
                        state.tools.insert(kind, tools);
                        state
                            .statuses
                            .insert(kind, ServerStatus::Connected { tool_count });
                        self.publish(&state);
                        info!(source = %kind, tools = tool_count, "server connected");
                        None
                    }
                };

                if let Some(client) = stale {
                    client.disconnect().await;
                }
                Ok(())
            }
            Err(e) => {
                warn!(source = %kind, error = %e, "server start failed");

                let mut state = self.state.write().await;
                // A concurrent stop already settled the status; leave it.
                if state.statuses.get(&kind) == Some(&ServerStatus::Connecting) {
                    state.statuses.insert(
                        kind,
                        ServerStatus::Error {
                            message: e.to_string(),
                        },
                    );
                    self.publish(&state);
                }
                Err(e)
            }
        }
    }

    async fn connect(&self, config: &SourceConfig) -> OmniResult<(McpClient, Vec<Tool>)> {
        let command = config.command.as_deref().unwrap_or_default();
        let client = McpClient::spawn(
            config.kind.display_name(),
            command,
            &config.args,
            &config.effective_env(),
        )?;

        if let Err(e) = client.initialize().await {
            client.disconnect().await;
            return Err(e);
        }

        match client.list_tools().await {
            Ok(tools) => Ok((client, tools)),
            Err(e) => {
                client.disconnect().await;
                Err(e)
            }
        }
    }

    /// Stop one source's server and clear its cached tools. Also cancels an
    /// in-flight start for the kind.
    pub async fn stop_server(&self, kind: SourceKind) {
        let client = {
            let mut state = self.state.write().await;
            let client = state.clients.remove(&kind);
            state.tools.remove(&kind);
            state.statuses.insert(kind, ServerStatus::Disconnected);
            self.publish(&state);
            client
        };

        if let Some(client) = client {
            client.disconnect().await;
            info!(source = %kind, "server stopped");
        }
    }

    /// Start every enabled source concurrently. Failures are reflected in
    /// the per-kind status rather than returned.
    pub async fn start_all_enabled(&self) {
        let kinds: Vec<SourceKind> = {
            let state = self.state.read().await;
            state
                .configs
                .values()
                .filter(|c| c.enabled)
                .map(|c| c.kind)
                .collect()
        };

        join_all(kinds.into_iter().map(|kind| async move {
            let _ = self.start_server(kind).await;
        }))
        .await;
    }

    /// Stop every running server.
    pub async fn stop_all(&self) {
        let kinds: Vec<SourceKind> = self.state.read().await.clients.keys().copied().collect();
        for kind in kinds {
            self.stop_server(kind).await;
        }
    }

    /// Dispatch one tool call to the source's client.
    pub async fn call_tool(
        &self,
        kind: SourceKind,
        name: &str,
        arguments: HashMap<String, Value>,
    ) -> OmniResult<ToolResult> {
        let client = self
            .state
            .read()
            .await
            .clients
            .get(&kind)
            .cloned()
            .ok_or_else(|| OmniError::ServerNotFound(kind.display_name().to_string()))?;

        let result = client.call_tool(name, arguments).await;

        if let Err(OmniError::ConnectionFailed(message)) = &result {
            // The child is gone; demote the source until the next start.
            warn!(source = %kind, error = %message, "connection lost");
            self.drop_client(kind, message.clone()).await;
        }

        result
    }

    /// Fan out the query to every connected source, then merge and rank.
    ///
    /// Per-source failures are logged and swallowed; the merged list is
    /// sorted by relevance, descending, ties keeping insertion order.
    pub async fn search_across_sources(&self, query: &str) -> Vec<SearchResult> {
        let kinds: Vec<SourceKind> = self.state.read().await.clients.keys().copied().collect();

        // The per-source futures are owned by this one, so cancelling the
        // outer search drops them and orphans their in-flight awaiters.
        let batches = join_all(kinds.into_iter().map(|kind| self.search_one(kind, query))).await;

        let mut results: Vec<SearchResult> = batches.into_iter().flatten().collect();
        sort_by_relevance(&mut results);
        results
    }

    async fn search_one(&self, kind: SourceKind, query: &str) -> Vec<SearchResult> {
        let invocation = omnisearch_sources::build_query(kind, query);
        match self.call_tool(kind, invocation.tool, invocation.arguments).await {
            Ok(result) if !result.is_error => {
                omnisearch_sources::parse(kind, &result.content, query)
            }
            Ok(result) => {
                debug!(source = %kind, output = %result.content, "search tool reported an error");
                Vec::new()
            }
            Err(e) => {
                warn!(source = %kind, error = %e, "search failed");
                Vec::new()
            }
        }
    }

    // --- Observations ---

    pub async fn status(&self, kind: SourceKind) -> ServerStatus {
        self.state
            .read()
            .await
            .statuses
            .get(&kind)
            .cloned()
            .unwrap_or(ServerStatus::Disconnected)
    }

    pub async fn statuses(&self) -> HashMap<SourceKind, ServerStatus> {
        self.state.read().await.statuses.clone()
    }

    /// Cached tool catalog for a kind; empty once the source is stopped.
    pub async fn tools(&self, kind: SourceKind) -> Vec<Tool> {
        self.state
            .read()
            .await
            .tools
            .get(&kind)
            .cloned()
            .unwrap_or_default()
    }

    /// Subscribe to status snapshots. The receiver always holds the latest.
    pub fn subscribe(&self) -> watch::Receiver<StatusSnapshot> {
        self.snapshot_tx.subscribe()
    }

    // --- Internals ---

    async fn drop_client(&self, kind: SourceKind, message: String) {
        let client = {
            let mut state = self.state.write().await;
            let client = state.clients.remove(&kind);
            state.tools.remove(&kind);
            state.statuses.insert(kind, ServerStatus::Error { message });
            self.publish(&state);
            client
        };

        if let Some(client) = client {
            client.disconnect().await;
        }
    }

    fn publish(&self, state: &ManagerState) {
        self.snapshot_tx.send_replace(state.snapshot());
    }
}

impl Default for ServerManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Stable descending sort; equal scores keep their insertion order.
fn sort_by_relevance(results: &mut [SearchResult]) {
    results.sort_by(|a, b| {
        b.relevance
            .partial_cmp(&a.relevance)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}
