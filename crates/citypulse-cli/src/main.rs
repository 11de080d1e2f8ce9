use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use citypulse_ingest::{IngestConfig, IngestPipeline};
use citypulse_storage::{EventStore, PgStore};
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "citypulse=info,citypulse_ingest=info,citypulse_web=info,citypulse_storage=info";

#[derive(Debug, Parser)]
#[command(name = "citypulse")]
#[command(about = "CityPulse event-discovery pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run one scrape cycle against the configured store.
    Scrape,
    /// Serve the HTTP surface (cron trigger + dashboard API).
    Serve {
        #[arg(long, env = "CITYPULSE_WEB_PORT", default_value_t = 8000)]
        port: u16,
    },
    /// Create the store schema if it does not exist.
    Migrate,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn connect_store() -> Result<Arc<PgStore>> {
    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set (store configuration is required)")?;
    let store = PgStore::connect(&database_url)
        .await
        .context("connecting to the event store")?;
    Ok(Arc::new(store))
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Scrape) {
        Commands::Scrape => {
            let store = connect_store().await?;
            store.ensure_schema().await?;
            let pipeline =
                IngestPipeline::new(store as Arc<dyn EventStore>, IngestConfig::from_env())?;
            let summary = pipeline.run_once().await?;
            println!(
                "scrape complete: run_id={} total={} inserted={} updated={} swept={} errors={}",
                summary.run_id,
                summary.total,
                summary.inserted,
                summary.updated,
                summary.swept,
                summary.errors.len()
            );
        }
        Commands::Serve { port } => {
            let store = connect_store().await?;
            store.ensure_schema().await?;
            let store: Arc<dyn EventStore> = store;
            let pipeline = Arc::new(IngestPipeline::new(
                Arc::clone(&store),
                IngestConfig::from_env(),
            )?);
            let cron_secret = std::env::var("CRON_SECRET").ok();
            let state = citypulse_web::AppState::new(store, Some(pipeline), cron_secret);
            citypulse_web::serve(state, port).await?;
        }
        Commands::Migrate => {
            let store = connect_store().await?;
            store.ensure_schema().await?;
            println!("store schema ensured");
        }
    }

    Ok(())
}
