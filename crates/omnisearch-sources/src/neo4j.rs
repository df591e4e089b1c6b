//! Neo4j adapter: Cypher lookup over node names and descriptions.

use std::collections::HashMap;

use omnisearch_core::{SearchResult, SourceKind};
use serde::Deserialize;
use serde_json::json;

use crate::score::relevance;
use crate::{snippet, ToolInvocation};

const CYPHER: &str = "MATCH (n) WHERE n.name CONTAINS $query OR n.description CONTAINS $query \
                      RETURN n LIMIT 10";

pub fn build_query(query: &str) -> ToolInvocation {
    ToolInvocation {
        tool: "execute_query",
        arguments: HashMap::from([
            ("query".to_string(), json!(CYPHER)),
            ("params".to_string(), json!({ "query": query })),
        ]),
    }
}

#[derive(Deserialize)]
struct Payload {
    #[serde(default)]
    records: Vec<Record>,
}

#[derive(Deserialize)]
struct Record {
    n: Option<Node>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct Node {
    properties: Properties,
    labels: Option<Vec<String>>,
}

#[derive(Deserialize, Default)]
struct Properties {
    name: Option<String>,
    description: Option<String>,
}

pub fn parse(raw: &str, query: &str) -> Vec<SearchResult> {
    let Ok(payload) = serde_json::from_str::<Payload>(raw) else {
        return Vec::new();
    };

    payload
        .records
        .into_iter()
        .filter_map(|record| {
            let node = record.n?;
            let name = node.properties.name?;
            let body = node.properties.description.unwrap_or_default();

            let mut result = SearchResult::new(
                SourceKind::Neo4j,
                name.clone(),
                snippet(&body),
                relevance(query, &name, &body),
            );
            if let Some(labels) = node.labels.filter(|l| !l.is_empty()) {
                result = result.with_metadata("labels", labels.join(","));
            }
            Some(result)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_query_carries_cypher_and_params() {
        let inv = build_query("graph");
        assert_eq!(inv.tool, "execute_query");

        let cypher = inv.arguments.get("query").unwrap().as_str().unwrap();
        assert!(cypher.contains("CONTAINS $query"));
        assert!(cypher.contains("LIMIT 10"));

        assert_eq!(inv.arguments.get("params").unwrap()["query"], "graph");
    }

    #[test]
    fn test_records_without_name_are_skipped() {
        let raw = r#"{"records":[
            {"n":{"properties":{"name":"X","description":"desc"},"labels":["A"]}},
            {"n":{"properties":{}}}
        ]}"#;
        let results = parse(raw, "x");

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].title, "X");
        assert_eq!(results[0].snippet, "desc");
        assert_eq!(results[0].metadata.get("labels").unwrap(), "A");
    }

    #[test]
    fn test_record_without_node_is_skipped() {
        let raw = r#"{"records":[{},{"n":{"properties":{"name":"Y"}}}]}"#;
        let results = parse(raw, "y");
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].title, "Y");
        assert!(results[0].metadata.get("labels").is_none());
    }
}
