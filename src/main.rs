//! Command-line relationship generator
//!
//! Reads a JSON corpus (articles plus entity facts), runs the full
//! pipeline, and emits the surviving edge rows together with the batch
//! report.

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use serde::Serialize;
use tracing::error;
use tracing_subscriber::EnvFilter;

use signalgraph::generator::{BatchReport, Corpus, MemoryEdgeStore, RelationshipGenerator};
use signalgraph::types::EdgeRecord;
use signalgraph::CoreConfig;

#[derive(Debug, Parser)]
#[command(
    name = "signalgraph",
    about = "Generate entity relationship graphs from an annotated news corpus"
)]
struct Cli {
    /// JSON corpus file: {"articles": [...], "facts": [...]}
    #[arg(long)]
    input: PathBuf,

    /// Process articles published in the last N days
    #[arg(long, default_value_t = 30)]
    days: i64,

    /// Generate but do not persist edges
    #[arg(long)]
    dry_run: bool,

    /// Optional core configuration JSON file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Write the result JSON here instead of stdout
    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(Serialize)]
struct Output {
    edges: Vec<EdgeRecord>,
    report: BatchReport,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(%err, "relationship generation failed");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let corpus: Corpus = serde_json::from_str(&fs::read_to_string(&cli.input)?)?;

    let config = match &cli.config {
        Some(path) => serde_json::from_str::<CoreConfig>(&fs::read_to_string(path)?)?,
        None => CoreConfig::default(),
    };

    let generator = RelationshipGenerator::new(config);
    let mut store = MemoryEdgeStore::new();

    let report = generator.run(&corpus, &mut store, Some(cli.days), cli.dry_run);

    let output = Output {
        edges: store.iter().cloned().collect(),
        report,
    };
    let rendered = serde_json::to_string_pretty(&output)?;

    match &cli.output {
        Some(path) => fs::write(path, rendered)?,
        None => println!("{rendered}"),
    }

    Ok(())
}
