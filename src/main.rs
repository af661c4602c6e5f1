use anyhow::Context;
use futures::future::{BoxFuture, FutureExt};
use std::sync::Arc;
use tracing::info;

use db_explorer::config::Config;
use db_explorer::services::database::MySqlConnector;
use db_explorer::storage::SqliteStorage;
use db_explorer::{ConnectionDescriptor, DatabaseExplorer, ExpansionState, TreeNode};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration (logging settings come from it)
    let config = Config::from_env().context("Failed to load configuration")?;

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_new(&config.logging.level)
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_ansi(config.logging.use_ansi())
        .init();

    // Initialize SQLite storage
    let storage = Arc::new(
        SqliteStorage::new(&config.storage.path)
            .await
            .with_context(|| format!("Failed to open state store at {}", config.storage.path))?,
    );
    info!("Using state store at {}", config.storage.path);

    let explorer = DatabaseExplorer::new(
        Arc::new(MySqlConnector::new(config.connect_timeout())),
        storage.clone(),
        storage,
        config.query_timeout(),
    );
    explorer.init().await?;

    if let Some(url) = &config.connection.url {
        let descriptor = ConnectionDescriptor::from_url(url)?;
        explorer.add_connection(descriptor).await?;
    }

    let roots = explorer.root_nodes();
    if roots.is_empty() {
        info!("No connections registered; set MYSQL_URL to add one");
    }
    for root in roots {
        print_tree(&explorer, root, 0).await;
    }

    explorer.shutdown().await;
    Ok(())
}

/// Print `node` and, when it was left expanded, its children
fn print_tree<'a>(explorer: &'a DatabaseExplorer, node: TreeNode, depth: usize) -> BoxFuture<'a, ()> {
    async move {
        let expanded = explorer.expansion_state(&node.identity) == ExpansionState::Expanded;
        let marker = match (node.kind.is_expandable(), expanded) {
            (false, _) => " ",
            (true, true) => "-",
            (true, false) => "+",
        };
        let description = node
            .description
            .as_deref()
            .map(|d| format!("  ({})", d))
            .unwrap_or_default();
        println!("{}{} {}{}", "  ".repeat(depth), marker, node.label, description);

        if expanded {
            for child in explorer.children_or_placeholder(&node).await {
                print_tree(explorer, child, depth + 1).await;
            }
        }
    }
    .boxed()
}
