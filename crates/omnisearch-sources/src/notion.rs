//! Notion adapter: `notion-search` over workspace pages.

use std::collections::HashMap;

use omnisearch_core::{SearchResult, SourceKind};
use serde::Deserialize;
use serde_json::json;

use crate::score::relevance;
use crate::{snippet, valid_url, ToolInvocation};

pub fn build_query(query: &str) -> ToolInvocation {
    ToolInvocation {
        tool: "notion-search",
        arguments: HashMap::from([("query".to_string(), json!(query))]),
    }
}

#[derive(Deserialize)]
struct Payload {
    #[serde(default)]
    results: Vec<Item>,
}

#[derive(Deserialize)]
struct Item {
    title: Option<String>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    url: Option<String>,
}

pub fn parse(raw: &str, query: &str) -> Vec<SearchResult> {
    let Ok(payload) = serde_json::from_str::<Payload>(raw) else {
        return Vec::new();
    };

    payload
        .results
        .into_iter()
        .filter_map(|item| {
            let title = item.title?;
            let body = item.content.unwrap_or_default();
            let result = SearchResult::new(
                SourceKind::Notion,
                title.clone(),
                snippet(&body),
                relevance(query, &title, &body),
            )
            .with_url(valid_url(item.url));
            Some(result)
        })
        .collect()
}
