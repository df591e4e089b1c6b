//! GitHub adapter: code search across repositories.

use std::collections::HashMap;

use omnisearch_core::{SearchResult, SourceKind};
use serde::Deserialize;
use serde_json::json;

use crate::score::relevance;
use crate::{snippet, valid_url, ToolInvocation};

pub fn build_query(query: &str) -> ToolInvocation {
    ToolInvocation {
        tool: "search_code",
        arguments: HashMap::from([("q".to_string(), json!(query))]),
    }
}

#[derive(Deserialize)]
struct Payload {
    #[serde(default)]
    items: Vec<Item>,
}

#[derive(Deserialize)]
struct Item {
    name: Option<String>,
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    repository: Option<Repository>,
    #[serde(default)]
    html_url: Option<String>,
}

#[derive(Deserialize, Default)]
struct Repository {
    #[serde(default)]
    full_name: Option<String>,
}

pub fn parse(raw: &str, query: &str) -> Vec<SearchResult> {
    let Ok(payload) = serde_json::from_str::<Payload>(raw) else {
        return Vec::new();
    };

    payload
        .items
        .into_iter()
        .filter_map(|item| {
            let name = item.name?;
            let body = item.path.unwrap_or_default();
            let mut result = SearchResult::new(
                SourceKind::GitHub,
                name.clone(),
                snippet(&body),
                relevance(query, &name, &body),
            )
            .with_url(valid_url(item.html_url));
            if let Some(repo) = item.repository.and_then(|r| r.full_name) {
                result = result.with_metadata("repository", repo);
            }
            Some(result)
        })
        .collect()
}
