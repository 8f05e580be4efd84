use std::sync::Arc;

use clap::Parser;
use minglog_core::{LinkGraphSettings, Settings};
use minglog_links::{
    ConsistencyChecker, EventBus, LinkDatabase, LinkStore, ModuleRegistry, NodeKey,
    ReferenceParser, SqliteContentOracle, SyncOrchestrator, content_channel,
};
use tracing::info;

mod cli;

use cli::{Cli, Command};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let settings = Settings::load()?;

    let level = settings.logging.level.clone();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| level.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Command::Config { output } = &cli.command {
        match output {
            Some(path) => {
                settings.save_to_path(path)?;
                info!("Wrote configuration to {}", path.display());
            }
            None => print!("{}", settings.to_toml()?),
        }
        return Ok(());
    }

    let graph_settings = LinkGraphSettings::from(&settings);
    let db_path = settings.database_path()?;
    let db = LinkDatabase::open(&db_path).await?;

    let registry = ModuleRegistry::default();
    let oracle = Arc::new(SqliteContentOracle::new(db.pool().clone(), registry.clone()));
    let store = LinkStore::from_settings(
        db.pool().clone(),
        oracle,
        EventBus::default(),
        &graph_settings,
    );

    match cli.command {
        Command::Check => {
            let checker =
                ConsistencyChecker::new(store, registry, graph_settings.checker.clone());
            let report = checker.check_consistency().await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Fix { issue_ids } => {
            let checker =
                ConsistencyChecker::new(store, registry, graph_settings.checker.clone());
            let report = checker.check_consistency().await?;
            let ids = if issue_ids.is_empty() {
                report.auto_fixable_ids()
            } else {
                issue_ids
            };
            let result = checker.auto_fix(&ids).await;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Command::Stats => {
            let stats = store.get_link_stats().await?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        Command::Parse {
            module,
            id,
            text,
            dry_run,
        } => {
            let parser = ReferenceParser::new(store, registry);
            let source = NodeKey::new(module, id);
            let source = (!dry_run).then_some(&source);
            let references = parser.parse_references(&text, source).await?;
            println!("{}", serde_json::to_string_pretty(&references)?);
        }
        Command::Watch => {
            let orchestrator = Arc::new(SyncOrchestrator::new(store, registry, &graph_settings));
            // Module stores embedding the library publish here; the CLI only reconciles.
            let content_tx = content_channel();
            let handle = Arc::clone(&orchestrator).start(content_tx.subscribe());

            info!("Watching {} (Ctrl-C to stop)", db_path.display());
            tokio::signal::ctrl_c().await?;
            info!("Shutting down");
            handle.shutdown().await;
        }
        Command::Config { .. } => {}
    }

    db.close().await;
    Ok(())
}
