use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

use account_annotator::{
    import_rows, load_registry_csv, load_transactions, save_transactions, Annotator,
    AnnotatorConfig, SqliteRegistry,
};

#[derive(Parser)]
#[command(author, version, about = "Annotate transactions with account identity")]
struct Cli {
    /// JSON config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Registry database (overrides the config file)
    #[arg(short, long, global = true)]
    registry: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the registry schema
    Init,
    /// Load accounts and control programs from CSV into the registry
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Annotate a JSON file of decoded transactions
    Annotate {
        #[arg(short, long)]
        input: PathBuf,
        /// Write annotated transactions here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Registry lookup deadline in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,
    },
}

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = AnnotatorConfig::load_or_default(cli.config.as_deref())?;
    if let Some(registry) = cli.registry {
        config.registry_path = registry;
    }

    match cli.command {
        Commands::Init => run_init(&config)?,
        Commands::Import { csv } => run_import(&config, csv)?,
        Commands::Annotate {
            input,
            output,
            timeout_ms,
        } => {
            if let Some(ms) = timeout_ms {
                config.lookup_timeout_ms = Some(ms);
            }
            run_annotate(&config, input, output)?
        }
    }

    Ok(())
}

fn open_registry(config: &AnnotatorConfig) -> Result<SqliteRegistry> {
    SqliteRegistry::open(&config.registry_path, config.wal)
        .with_context(|| format!("Failed to open registry {:?}", config.registry_path))
}

fn run_init(config: &AnnotatorConfig) -> Result<()> {
    open_registry(config)?;
    info!(path = ?config.registry_path, "registry initialized");
    Ok(())
}

fn run_import(config: &AnnotatorConfig, csv_path: PathBuf) -> Result<()> {
    let registry = open_registry(config)?;

    let rows = load_registry_csv(&csv_path)?;
    info!(rows = rows.len(), path = ?csv_path, "loaded registry CSV");

    let stats = import_rows(&registry, &rows)?;
    let total = registry.count_control_programs()?;
    info!(
        inserted = stats.programs_inserted,
        skipped = stats.programs_skipped,
        total,
        "registry import complete"
    );

    Ok(())
}

fn run_annotate(config: &AnnotatorConfig, input: PathBuf, output: Option<PathBuf>) -> Result<()> {
    let registry = open_registry(config)?;
    let mut annotator = Annotator::new(registry);
    if let Some(timeout) = config.lookup_timeout() {
        annotator = annotator.with_lookup_timeout(timeout);
    }

    let mut transactions = load_transactions(&input)?;
    let summary = annotator
        .annotate(&mut transactions)
        .context("Failed to annotate transactions")?;

    match output {
        Some(path) => {
            save_transactions(&path, &transactions)?;
            info!(path = ?path, "wrote annotated transactions");
        }
        None => println!("{}", serde_json::to_string_pretty(&transactions)?),
    }

    info!(
        resolved = summary.programs_resolved,
        unknown = summary.programs_unknown(),
        "annotation complete"
    );

    Ok(())
}
