//! maturity-store - command line entry point
//!
//! ## Usage
//!
//! ```bash
//! # Create the store and a default config.toml
//! maturity-store init
//!
//! # Import a dataset (JSON array of objects)
//! maturity-store import startups.json --replace
//!
//! # Queries print JSON to stdout
//! maturity-store list --status Ativa
//! maturity-store best --status Ativa
//! maturity-store stats --category Saúde
//! maturity-store query descriptor.json
//!
//! # Write report files
//! maturity-store export ./reports
//! ```
//!
//! ## Environment Variables
//!
//! - `MATURITY_STORE_CONFIG` - Path to config file
//! - `MATURITY_STORE_DIR` - Storage directory
//! - `RUST_LOG` - Log filter (logs go to stderr)

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{ArgGroup, Parser, Subcommand};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

use maturity_store::config::{BatchMode, ConflictPolicy};
use maturity_store::db::AdHocQuery;
use maturity_store::services::{drain_events, LoggingEventListener};
use maturity_store::{export, AssessmentDb, Config, Dataset, Services};

#[derive(Parser, Debug)]
#[command(name = "maturity-store")]
#[command(about = "Maturity assessment scoring engine")]
struct Args {
    /// Path to config file
    #[arg(short, long, env = "MATURITY_STORE_CONFIG")]
    config: Option<PathBuf>,

    /// Storage directory
    #[arg(long, env = "MATURITY_STORE_DIR")]
    storage_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the storage directory, config and schema
    Init,

    /// Import a JSON dataset
    Import {
        file: PathBuf,

        /// Upsert entities that already exist
        #[arg(long)]
        replace: bool,

        /// Roll back the whole batch on any failing row
        #[arg(long)]
        all_or_nothing: bool,
    },

    /// List entities by status or category
    #[command(group(ArgGroup::new("filter").required(true).args(["status", "category"])))]
    List {
        #[arg(long)]
        status: Option<String>,

        #[arg(long)]
        category: Option<String>,
    },

    /// Best-ranked entity with its breakdown
    Best {
        #[arg(long)]
        status: Option<String>,
    },

    /// Group statistics, all categories or one
    Stats {
        #[arg(long)]
        category: Option<String>,
    },

    /// Dimension and criterion scores of one entity
    Entity { name: String },

    /// First K entities of the ranking
    Top {
        k: usize,

        #[arg(long)]
        status: Option<String>,
    },

    /// Run a structured read-only query from a JSON descriptor
    Query { descriptor: PathBuf },

    /// Rebuild group statistics from stored entities
    Recompute,

    /// Write JSON reports
    Export { dir: Option<PathBuf> },
}

fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::from_default_env().add_directive("maturity_store=info".parse()?))
        .init();

    let args = Args::parse();
    let config = load_config(&args)?;

    std::fs::create_dir_all(&config.storage_dir)
        .with_context(|| format!("creating {}", config.storage_dir.display()))?;

    if let Command::Init = args.command {
        let config_path = config.config_path();
        if !config_path.exists() {
            config.save(&config_path)?;
            info!(path = %config_path.display(), "Created default config");
        }
    }

    let mut config = config;
    if let Command::Import { replace, all_or_nothing, .. } = &args.command {
        if *replace {
            config.import.conflict_policy = ConflictPolicy::Replace;
        }
        if *all_or_nothing {
            config.import.batch_mode = BatchMode::AllOrNothing;
        }
    }

    let db = Arc::new(
        AssessmentDb::open(&config.database_path())
            .with_context(|| format!("opening store at {}", config.database_path().display()))?,
    );
    let config = Arc::new(config);
    let services = Services::new(db.clone(), config.clone());
    let query = &services.query;

    match args.command {
        Command::Init => print_json(&services.query.stats()?)?,
        Command::Import { file, .. } => {
            let mut receiver = services.events.subscribe();
            let dataset = Dataset::load(&file).with_context(|| format!("loading {}", file.display()))?;
            let result = services.import.import_batch(&dataset);
            drain_events(&mut receiver, &LoggingEventListener);
            print_json(&result?)?;
        }
        Command::List { status: Some(status), .. } => print_json(&query.list_by_status(&status)?)?,
        Command::List { category: Some(category), .. } => print_json(&query.list_by_category(&category)?)?,
        Command::List { .. } => bail!("either --status or --category is required"),
        Command::Best { status } => {
            let best = match status {
                Some(status) => query.best_with_status(&status)?,
                None => query.best_overall()?,
            };
            print_json(&best)?;
        }
        Command::Stats { category } => print_json(&query.group_statistics(category.as_deref())?)?,
        Command::Entity { name } => print_json(&query.entity_breakdown(&name)?)?,
        Command::Top { k, status } => print_json(&query.top_k(k, status.as_deref())?)?,
        Command::Query { descriptor } => {
            let json = std::fs::read_to_string(&descriptor)
                .with_context(|| format!("reading {}", descriptor.display()))?;
            let ad_hoc = AdHocQuery::from_json_str(&json)?;
            print_json(&query.run_ad_hoc(&ad_hoc)?)?;
        }
        Command::Recompute => {
            let categories = services.import.recompute_group_statistics()?;
            print_json(&serde_json::json!({ "categories": categories }))?;
        }
        Command::Export { dir } => {
            let dir = dir.unwrap_or_else(|| config.export_dir());
            print_json(&export::export_all(&db, &config, &dir)?)?;
        }
    }

    Ok(())
}

fn load_config(args: &Args) -> anyhow::Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::load(path).with_context(|| format!("loading config {}", path.display()))?,
        None => Config::default(),
    };

    // Apply CLI overrides
    if let Some(dir) = &args.storage_dir {
        config.storage_dir = dir.clone();
    }

    // Fall back to the config saved by `init`
    if args.config.is_none() {
        let saved = config.config_path();
        if saved.exists() {
            let storage_dir = config.storage_dir.clone();
            config = Config::load(&saved).with_context(|| format!("loading config {}", saved.display()))?;
            config.storage_dir = storage_dir;
        }
    }

    Ok(config)
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
