use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use schemars::schema_for;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use civic_core::config::PipelineConfig;
use civic_core::db::{RetryPolicy, SqliteStore, VotingStore};
use civic_core::fallback::FallbackAdapter;
use civic_core::orchestrator::{BatchOrchestrator, CancellationToken};
use civic_core::resolver::RepresentativeResolver;
use civic_core::schema::{RawDocument, TimeRange};
use civic_core::source::DirectorySource;

#[derive(Parser)]
#[command(name = "civic")]
#[command(about = "Council minutes voting-record extractor", long_about = None)]
struct Cli {
    /// Log at debug level unless RUST_LOG is set
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract voting records for a council and date range
    Process(ProcessArgs),
    /// Print the detected layout of a minutes text file
    Detect { file: PathBuf },
    /// Inspect or merge representative identities
    Representatives {
        #[command(subcommand)]
        command: RepresentativeCommands,
    },
    /// Export canonical JSON Schemas
    Schema {
        #[command(subcommand)]
        command: SchemaCommands,
    },
}

#[derive(clap::Args)]
struct ProcessArgs {
    #[arg(long)]
    council: String,

    /// First meeting date, YYYY-MM-DD
    #[arg(long)]
    from: String,

    /// Last meeting date, YYYY-MM-DD (inclusive)
    #[arg(long)]
    to: String,

    /// Directory holding pipeline.toml and fields.yaml
    #[arg(long, default_value = "config")]
    config_dir: PathBuf,

    /// Root of <council>/<name>.txt minutes files
    #[arg(long, default_value = "minutes")]
    source_dir: PathBuf,

    /// Overrides storage.db_path
    #[arg(long)]
    db: Option<String>,

    /// Re-run documents that were already processed
    #[arg(long)]
    reprocess: bool,

    /// Overrides pipeline.workers
    #[arg(long)]
    workers: Option<usize>,

    /// Stop starting new documents after this many seconds
    #[arg(long)]
    deadline_secs: Option<u64>,
}

#[derive(Subcommand)]
enum RepresentativeCommands {
    /// List active identities
    List {
        #[arg(long, default_value = "config")]
        config_dir: PathBuf,
        #[arg(long)]
        db: Option<String>,
    },
    /// Merge two identities into one
    Merge {
        a: String,
        b: String,
        #[arg(long, default_value = "config")]
        config_dir: PathBuf,
        #[arg(long)]
        db: Option<String>,
    },
}

#[derive(Subcommand)]
enum SchemaCommands {
    /// Export JSON Schema files for canonical types
    Export {
        /// Output directory (default: ./schemas)
        #[arg(long, default_value = "schemas")]
        out_dir: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Process(args) => process(args),
        Commands::Detect { file } => detect(file),
        Commands::Representatives { command } => match command {
            RepresentativeCommands::List { config_dir, db } => list_representatives(config_dir, db),
            RepresentativeCommands::Merge { a, b, config_dir, db } => {
                merge_representatives(config_dir, db, &a, &b)
            }
        },
        Commands::Schema { command } => match command {
            SchemaCommands::Export { out_dir } => schema_export(out_dir),
        },
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(config_dir: &Path) -> Result<PipelineConfig> {
    PipelineConfig::load_from_dir(config_dir)
        .with_context(|| format!("loading configuration from {}", config_dir.display()))
}

fn open_store(config: &PipelineConfig, db: Option<String>) -> Result<Arc<SqliteStore>> {
    let path = db.unwrap_or_else(|| config.storage.db_path.clone());
    let store = SqliteStore::open(&path, RetryPolicy::from(&config.storage))
        .with_context(|| format!("opening database {path}"))?;
    Ok(Arc::new(store))
}

fn open_resolver(config: &PipelineConfig, store: Arc<SqliteStore>) -> Result<RepresentativeResolver> {
    let store: Arc<dyn VotingStore> = store;
    Ok(RepresentativeResolver::from_config(store, &config.resolver)?)
}

fn process(args: ProcessArgs) -> Result<()> {
    let mut config = load_config(&args.config_dir)?;
    if args.reprocess {
        config.pipeline.reprocess = true;
    }
    if let Some(workers) = args.workers {
        config.pipeline.workers = workers;
    }
    config.validate()?;

    let range = TimeRange::parse(&args.from, &args.to)?;
    let store = open_store(&config, args.db)?;
    let resolver = open_resolver(&config, store.clone())?;
    let fallback = FallbackAdapter::from_config(&config.fallback)?;
    let orchestrator = BatchOrchestrator::new(
        Arc::new(DirectorySource::new(args.source_dir.clone())),
        store,
        Arc::new(resolver),
        fallback,
        &config,
    )?;

    let cancel = CancellationToken::new();
    if let Some(secs) = args.deadline_secs {
        let token = cancel.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_secs(secs));
            tracing::warn!(deadline_secs = secs, "Deadline reached, cancelling remaining documents");
            token.cancel();
        });
    }

    let result = orchestrator.run(&args.council, &range, &cancel);
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

fn detect(file: PathBuf) -> Result<()> {
    let text = fs::read_to_string(&file).with_context(|| format!("reading {}", file.display()))?;
    let doc = RawDocument::new(file.display().to_string(), text, None);
    println!("{}", doc.format());
    Ok(())
}

fn list_representatives(config_dir: PathBuf, db: Option<String>) -> Result<()> {
    let config = load_config(&config_dir)?;
    let resolver = open_resolver(&config, open_store(&config, db)?)?;
    let reps = resolver.representatives()?;
    println!("{}", serde_json::to_string_pretty(&reps)?);
    Ok(())
}

fn merge_representatives(config_dir: PathBuf, db: Option<String>, a: &str, b: &str) -> Result<()> {
    let config = load_config(&config_dir)?;
    let resolver = open_resolver(&config, open_store(&config, db)?)?;
    let outcome = resolver.merge(a, b)?;
    match outcome.absorbed {
        Some(absorbed) => println!("Merged {absorbed} into {}", outcome.survivor),
        None => println!("{a} and {b} are already {}", outcome.survivor),
    }
    Ok(())
}

fn schema_export(out_dir: PathBuf) -> Result<()> {
    fs::create_dir_all(&out_dir)?;

    let record_schema = schema_for!(civic_core::schema::VotingRecord);
    fs::write(
        out_dir.join("VotingRecord.schema.json"),
        serde_json::to_string_pretty(&record_schema)?,
    )?;

    let rep_schema = schema_for!(civic_core::schema::Representative);
    fs::write(
        out_dir.join("Representative.schema.json"),
        serde_json::to_string_pretty(&rep_schema)?,
    )?;

    let result_schema = schema_for!(civic_core::schema::ProcessingResult);
    fs::write(
        out_dir.join("ProcessingResult.schema.json"),
        serde_json::to_string_pretty(&result_schema)?,
    )?;

    // Shape the fallback service is asked to return
    fs::write(
        out_dir.join("FallbackRecords.schema.json"),
        serde_json::to_string_pretty(&civic_core::fallback::response_schema())?,
    )?;

    println!("Exported schemas to {}", out_dir.display());
    Ok(())
}
