use anyhow::Result;
use clap::{Parser, Subcommand};
use ico_ingest::config::Config;
use ico_ingest::query::commands::{RecordQuery, cmd_records, cmd_senders, cmd_stats};
use ico_ingest::query::formatters::OutputFormat;
use ico_ingest::repository::{BlockchainRepository, Database};

#[derive(Parser)]
#[command(name = "query")]
#[command(about = "Query recorded ICO contributions", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "table")]
    format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Recorded transactions, newest first
    Records {
        /// BTC, ETH, XTZ, "Revolut (USD)" or "Revolut (EUR)"
        #[arg(long)]
        tx_type: Option<String>,

        #[arg(long, default_value = "100")]
        limit: usize,

        #[arg(long, default_value = "0")]
        offset: usize,
    },
    /// Sender addresses linked to a transaction
    Senders {
        tx_hash: String,
    },
    Stats,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let format = OutputFormat::from(cli.format.as_str());

    let db = Database::new(&Config::database_url())?;
    let repo = BlockchainRepository::new(&db.conn);

    match cli.command {
        Commands::Records {
            tx_type,
            limit,
            offset,
        } => {
            let query = RecordQuery {
                tx_type,
                limit,
                offset,
            };
            cmd_records(&repo, query, &format)?;
        }
        Commands::Senders { tx_hash } => {
            cmd_senders(&repo, &tx_hash, &format)?;
        }
        Commands::Stats => {
            cmd_stats(&repo, &format)?;
        }
    }

    Ok(())
}
