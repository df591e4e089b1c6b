//! Integration tests for the server manager.
//!
//! Mock servers are small `sh` scripts speaking just enough newline-delimited
//! JSON-RPC for the handshake, the tool listing, and one search call. Request
//! ids are deterministic (1 = initialize, 2 = tools/list, 3 = tools/call), so
//! the scripts can answer positionally after reading each request line.

use std::collections::HashMap;
use std::sync::Arc;

use omnisearch_core::{OmniError, ServerStatus, SourceConfig, SourceKind};
use omnisearch_manager::ServerManager;

const NOTION_MOCK: &str = r#"
read line
printf '%s\n' '{"jsonrpc":"2.0","id":1,"result":{"protocolVersion":"2024-11-05","capabilities":{"tools":{"listChanged":false}},"serverInfo":{"name":"notion-mock","version":"1"}}}'
read line
read line
printf '%s\n' '{"jsonrpc":"2.0","id":2,"result":{"tools":[{"name":"notion-search","description":"Search pages"}]}}'
read line
printf '%s\n' '{"jsonrpc":"2.0","id":3,"result":{"content":[{"type":"text","text":"{\"results\":[{\"title\":\"Alpha\",\"content\":\"alpha body\",\"url\":\"https://example.com/a\"}]}"}]}}'
cat >/dev/null
"#;

const OBSIDIAN_MOCK: &str = r#"
read line
printf '%s\n' '{"jsonrpc":"2.0","id":1,"result":{"protocolVersion":"2024-11-05","capabilities":{"tools":{}},"serverInfo":{"name":"obsidian-mock","version":"1"}}}'
read line
read line
printf '%s\n' '{"jsonrpc":"2.0","id":2,"result":{"tools":[{"name":"search"},{"name":"read_note"}]}}'
read line
printf '%s\n' '{"jsonrpc":"2.0","id":3,"result":{"content":[{"type":"text","text":"[{\"path\":\"notes/alpha-notes.md\",\"content\":\"beta body\"}]"}]}}'
cat >/dev/null
"#;

fn mock_config(kind: SourceKind, script: &str) -> SourceConfig {
    SourceConfig {
        kind,
        enabled: true,
        command: Some("sh".to_string()),
        args: vec!["-c".to_string(), script.to_string()],
        env: HashMap::new(),
    }
}

// ---------------------------------------------------------------------------
// Configuration guards
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_start_with_missing_command() {
    let manager = ServerManager::new();
    let mut config = SourceConfig::new(SourceKind::Notion);
    config.enabled = true;
    manager.update_config(config).await;

    let err = manager.start_server(SourceKind::Notion).await.unwrap_err();
    assert!(matches!(err, OmniError::NotConfigured));

    assert_eq!(
        manager.status(SourceKind::Notion).await,
        ServerStatus::Error {
            message: "Not configured".into()
        }
    );
}

#[tokio::test]
async fn test_start_disabled_or_unknown_config() {
    let manager = ServerManager::new();

    // No config at all.
    let err = manager.start_server(SourceKind::Neo4j).await.unwrap_err();
    assert!(matches!(err, OmniError::NotConfigured));

    // Present but disabled.
    let mut config = mock_config(SourceKind::Obsidian, NOTION_MOCK);
    config.enabled = false;
    manager.update_config(config).await;

    let err = manager.start_server(SourceKind::Obsidian).await.unwrap_err();
    assert!(matches!(err, OmniError::NotConfigured));
    assert_eq!(
        manager.status(SourceKind::Obsidian).await,
        ServerStatus::Error {
            message: "Not configured".into()
        }
    );
}

#[tokio::test]
async fn test_spawn_failure_sets_error_status() {
    let manager = ServerManager::new();
    let mut config = SourceConfig::new(SourceKind::GitHub);
    config.enabled = true;
    config.command = Some("/nonexistent/mcp-server-binary".to_string());
    manager.update_config(config).await;

    let err = manager.start_server(SourceKind::GitHub).await.unwrap_err();
    assert!(matches!(err, OmniError::Process(_)));

    match manager.status(SourceKind::GitHub).await {
        ServerStatus::Error { message } => assert!(message.contains("failed to spawn")),
        other => panic!("expected Error status, got {other:?}"),
    }

    // No client was registered for the failed start.
    let err = manager
        .call_tool(SourceKind::GitHub, "search_code", HashMap::new())
        .await
        .unwrap_err();
    assert!(matches!(err, OmniError::ServerNotFound(_)));
}

// ---------------------------------------------------------------------------
// Lifecycle against a scripted server
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_start_search_stop_roundtrip() {
    let manager = Arc::new(ServerManager::new());
    manager
        .update_config(mock_config(SourceKind::Notion, NOTION_MOCK))
        .await;

    manager.start_server(SourceKind::Notion).await.unwrap();
    assert_eq!(
        manager.status(SourceKind::Notion).await,
        ServerStatus::Connected { tool_count: 1 }
    );

    let tools = manager.tools(SourceKind::Notion).await;
    assert_eq!(tools.len(), 1);
    assert_eq!(tools[0].name, "notion-search");

    let results = manager.search_across_sources("alpha").await;
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].title, "Alpha");
    assert_eq!(results[0].source, SourceKind::Notion);
    assert_eq!(results[0].relevance, 1.0);
    assert_eq!(results[0].url.as_deref(), Some("https://example.com/a"));

    manager.stop_server(SourceKind::Notion).await;
    assert_eq!(
        manager.status(SourceKind::Notion).await,
        ServerStatus::Disconnected
    );
    assert!(manager.tools(SourceKind::Notion).await.is_empty());

    let err = manager
        .call_tool(SourceKind::Notion, "notion-search", HashMap::new())
        .await
        .unwrap_err();
    assert!(matches!(err, OmniError::ServerNotFound(_)));
}

#[tokio::test]
async fn test_search_merges_and_ranks_across_sources() {
    let manager = Arc::new(ServerManager::new());
    manager
        .update_config(mock_config(SourceKind::Notion, NOTION_MOCK))
        .await;
    manager
        .update_config(mock_config(SourceKind::Obsidian, OBSIDIAN_MOCK))
        .await;

    manager.start_all_enabled().await;
    assert_eq!(
        manager.status(SourceKind::Notion).await,
        ServerStatus::Connected { tool_count: 1 }
    );
    assert_eq!(
        manager.status(SourceKind::Obsidian).await,
        ServerStatus::Connected { tool_count: 2 }
    );

    let results = manager.search_across_sources("alpha").await;
    assert_eq!(results.len(), 2);

    // Exact title match outranks a mere containment.
    assert_eq!(results[0].title, "Alpha");
    assert_eq!(results[0].source, SourceKind::Notion);
    assert_eq!(results[1].title, "alpha-notes.md");
    assert_eq!(results[1].source, SourceKind::Obsidian);

    for pair in results.windows(2) {
        assert!(pair[0].relevance >= pair[1].relevance);
    }

    manager.stop_all().await;
    for kind in SourceKind::ALL {
        assert_eq!(manager.status(kind).await, ServerStatus::Disconnected);
    }
}

#[tokio::test]
async fn test_start_all_enabled_skips_disabled() {
    let manager = Arc::new(ServerManager::new());
    manager
        .update_config(mock_config(SourceKind::Notion, NOTION_MOCK))
        .await;
    let mut disabled = mock_config(SourceKind::Obsidian, OBSIDIAN_MOCK);
    disabled.enabled = false;
    manager.update_config(disabled).await;

    manager.start_all_enabled().await;

    assert!(manager.status(SourceKind::Notion).await.is_connected());
    assert_eq!(
        manager.status(SourceKind::Obsidian).await,
        ServerStatus::Disconnected
    );

    manager.stop_all().await;
}

// ---------------------------------------------------------------------------
// Status publication
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_snapshot_subscription_sees_transitions() {
    let manager = ServerManager::new();
    let rx = manager.subscribe();

    // Initial snapshot: everything disconnected.
    assert!(rx
        .borrow()
        .statuses
        .values()
        .all(|s| *s == ServerStatus::Disconnected));

    let mut config = SourceConfig::new(SourceKind::Neo4j);
    config.enabled = true;
    manager.update_config(config).await;
    let _ = manager.start_server(SourceKind::Neo4j).await;

    let snapshot = rx.borrow();
    assert_eq!(
        snapshot.statuses.get(&SourceKind::Neo4j),
        Some(&ServerStatus::Error {
            message: "Not configured".into()
        })
    );
}

#[tokio::test]
async fn test_search_with_nothing_connected_is_empty() {
    let manager = Arc::new(ServerManager::new());
    assert!(manager.search_across_sources("anything").await.is_empty());
}
