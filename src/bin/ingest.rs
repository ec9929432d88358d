use anyhow::Result;
use clap::{Parser, ValueEnum};
use ico_ingest::config::Config;
use ico_ingest::pipeline::{Pipeline, PipelineKind};
use ico_ingest::repository::Database;
use ico_ingest::scheduler::Scheduler;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "ingest")]
#[command(about = "Record ICO contributions from every payment source", long_about = None)]
struct Cli {
    /// Run one pipeline and exit instead of scheduling both
    #[arg(long, value_enum)]
    once: Option<RunKind>,
}

#[derive(Clone, Copy, ValueEnum)]
enum RunKind {
    Full,
    Frequent,
}

impl From<RunKind> for PipelineKind {
    fn from(kind: RunKind) -> Self {
        match kind {
            RunKind::Full => PipelineKind::Full,
            RunKind::Frequent => PipelineKind::Frequent,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    info!("Starting ICO ingestion");

    let config = Config::from_env()?;
    info!("Configuration loaded");
    info!("Bitcoin address: {}", config.bitcoin.address);
    info!("Ethereum address: {}", config.ethereum.address);
    info!("Tezos address: {}", config.tezos.address);

    let db = Database::new(&config.database_url)?;
    info!("Database initialized");

    let scheduler = Scheduler::new(Pipeline::new(&config, db)?);

    let Some(kind) = cli.once else {
        scheduler.run().await;
        return Ok(());
    };

    let report = scheduler.run_once(kind.into()).await;
    if !report.is_success() {
        anyhow::bail!("sources failed: {}", report.failed_sources().join(", "));
    }

    Ok(())
}
