//! Phrasebook CLI Entry Point
//!
//! Runs a single command against the store at `--db` and prints the
//! result as JSON on stdout. Logs go to stderr.

use clap::Parser;
use phrasebook::{CliResult, Command};
use phrasebook_core::{IndexConfig, PhraseBook, RocksKv};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "phrasebook")]
#[command(about = "Project-scoped phrase notes with reciprocal relations")]
#[command(version)]
struct Args {
    /// Database directory
    #[arg(long, env = "PHRASEBOOK_DB", default_value = "./.phrasebook")]
    db: PathBuf,

    /// JSON file with index settings
    #[arg(long)]
    config: Option<PathBuf>,

    /// Pretty-print output
    #[arg(long)]
    pretty: bool,

    #[command(subcommand)]
    command: Command,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "phrasebook=info,phrasebook_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Err(e) = run(args).await {
        tracing::error!("{}", e);
        std::process::exit(e.exit_code());
    }
}

async fn run(args: Args) -> CliResult<()> {
    let config = match &args.config {
        Some(path) => phrasebook::load_config(path)?,
        None => IndexConfig::default(),
    };

    tracing::debug!("Opening store at {:?}", args.db);
    let store = Arc::new(RocksKv::open(&args.db)?);
    let mut book = PhraseBook::load(store, config).await?;

    let output = phrasebook::execute(&mut book, args.command).await?;
    let text = if args.pretty {
        serde_json::to_string_pretty(&output)?
    } else {
        serde_json::to_string(&output)?
    };
    println!("{}", text);
    Ok(())
}
