//! Obsidian adapter: vault search returning note paths.

use std::collections::HashMap;

use omnisearch_core::{SearchResult, SourceKind};
use serde::Deserialize;
use serde_json::json;

use crate::score::relevance;
use crate::{snippet, ToolInvocation};

pub fn build_query(query: &str) -> ToolInvocation {
    ToolInvocation {
        tool: "search",
        arguments: HashMap::from([("query".to_string(), json!(query))]),
    }
}

#[derive(Deserialize)]
struct Item {
    path: Option<String>,
    #[serde(default)]
    content: Option<String>,
}

pub fn parse(raw: &str, query: &str) -> Vec<SearchResult> {
    let Ok(items) = serde_json::from_str::<Vec<Item>>(raw) else {
        return Vec::new();
    };

    items
        .into_iter()
        .filter_map(|item| {
            let path = item.path?;
            // The note title is the last path component.
            let title = path.rsplit('/').next().unwrap_or(&path).to_string();
            let body = item.content.unwrap_or_default();
            let result = SearchResult::new(
                SourceKind::Obsidian,
                title.clone(),
                snippet(&body),
                relevance(query, &title, &body),
            )
            .with_url(Some(format!("file://{path}")))
            .with_metadata("path", path);
            Some(result)
        })
        .collect()
}
