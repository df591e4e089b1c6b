use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use omnisearch_core::{SourceConfig, SourceKind};
use omnisearch_manager::ServerManager;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "omnisearch", about = "Omnisearch — unified search across MCP sources")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "omnisearch.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the status of every configured source
    Status,
    /// List the tools advertised by a source
    Tools {
        /// Source kind (notion, obsidian, neo4j, google_drive, github)
        source: String,
    },
    /// Search across every enabled source
    Search {
        /// The query to fan out
        query: String,
    },
    /// Call one tool on one source
    Call {
        source: String,
        tool: String,
        /// Tool arguments as a JSON object
        #[arg(default_value = "{}")]
        arguments: String,
    },
}

#[derive(serde::Deserialize, Default)]
struct CliConfig {
    #[serde(default)]
    sources: HashMap<SourceKind, SourceEntry>,
}

#[derive(serde::Deserialize)]
struct SourceEntry {
    #[serde(default)]
    enabled: bool,
    #[serde(default)]
    command: Option<String>,
    #[serde(default)]
    args: Vec<String>,
    #[serde(default)]
    env: HashMap<String, String>,
}

impl SourceEntry {
    fn into_config(self, kind: SourceKind) -> SourceConfig {
        SourceConfig {
            kind,
            enabled: self.enabled,
            command: self.command,
            args: self.args,
            env: self.env,
        }
    }
}

fn parse_kind(raw: &str) -> anyhow::Result<SourceKind> {
    serde_json::from_value(serde_json::Value::String(raw.to_string()))
        .map_err(|_| anyhow::anyhow!("unknown source '{raw}'"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config: CliConfig = match tokio::fs::read_to_string(&cli.config).await {
        Ok(raw) => toml::from_str(&raw)?,
        Err(e) => {
            anyhow::bail!("failed to read config file '{}': {}", cli.config.display(), e);
        }
    };

    let manager = Arc::new(ServerManager::new());
    for (kind, entry) in config.sources {
        manager.update_config(entry.into_config(kind)).await;
    }

    match cli.command {
        Commands::Status => {
            manager.start_all_enabled().await;
            let statuses = manager.statuses().await;
            let mut kinds: Vec<_> = statuses.keys().copied().collect();
            kinds.sort();
            for kind in kinds {
                println!("{:<14} {:?}", kind.to_string(), statuses[&kind]);
            }
            manager.stop_all().await;
        }
        Commands::Tools { source } => {
            let kind = parse_kind(&source)?;
            manager.start_server(kind).await?;
            let tools = manager.tools(kind).await;
            if tools.is_empty() {
                println!("No tools advertised by {kind}.");
            } else {
                for tool in tools {
                    println!(
                        "  {} — {}",
                        tool.name,
                        tool.description.as_deref().unwrap_or("(no description)")
                    );
                }
            }
            manager.stop_all().await;
        }
        Commands::Search { query } => {
            // Empty queries match everything; refuse them before fan-out.
            if query.trim().is_empty() {
                anyhow::bail!("search query must not be empty");
            }

            manager.start_all_enabled().await;
            let results = manager.search_across_sources(&query).await;
            info!(count = results.len(), "search complete");

            if results.is_empty() {
                println!("No results.");
            }
            for result in results {
                println!("[{}] {} ({:.2})", result.source, result.title, result.relevance);
                if !result.snippet.is_empty() {
                    println!("    {}", result.snippet);
                }
                if let Some(url) = &result.url {
                    println!("    {url}");
                }
            }
            manager.stop_all().await;
        }
        Commands::Call { source, tool, arguments } => {
            let kind = parse_kind(&source)?;
            let args: HashMap<String, serde_json::Value> = serde_json::from_str(&arguments)
                .map_err(|e| anyhow::anyhow!("arguments must be a JSON object: {e}"))?;

            manager.start_server(kind).await?;
            let result = manager.call_tool(kind, &tool, args).await?;
            if result.is_error {
                eprintln!("Tool reported an error:");
            }
            println!("{}", result.content);
            manager.stop_all().await;
        }
    }

    Ok(())
}
