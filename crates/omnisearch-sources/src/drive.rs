//! Google Drive adapter: file search by name.

use std::collections::HashMap;

use omnisearch_core::{SearchResult, SourceKind};
use serde::Deserialize;
use serde_json::json;

use crate::score::relevance;
use crate::{snippet, valid_url, ToolInvocation};

pub fn build_query(query: &str) -> ToolInvocation {
    ToolInvocation {
        tool: "search",
        arguments: HashMap::from([("query".to_string(), json!(query))]),
    }
}

#[derive(Deserialize)]
struct Item {
    name: Option<String>,
    #[serde(default, rename = "mimeType")]
    mime_type: Option<String>,
    #[serde(default, rename = "webViewLink")]
    web_view_link: Option<String>,
}

pub fn parse(raw: &str, query: &str) -> Vec<SearchResult> {
    let Ok(items) = serde_json::from_str::<Vec<Item>>(raw) else {
        return Vec::new();
    };

    items
        .into_iter()
        .filter_map(|item| {
            let name = item.name?;
            let body = item.mime_type.unwrap_or_default();
            let mut result = SearchResult::new(
                SourceKind::GoogleDrive,
                name.clone(),
                snippet(&body),
                relevance(query, &name, &body),
            )
            .with_url(valid_url(item.web_view_link));
            if !body.is_empty() {
                result = result.with_metadata("mime_type", body);
            }
            Some(result)
        })
        .collect()
}
