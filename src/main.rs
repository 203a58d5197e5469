//! Binary entry point for adt-twincache.
//!
//! Runs one full resync of a Digital Twins instance into the twin cache, or
//! one of the read-only diagnostic commands.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(missing_docs)]
// Allow print_stderr in main binary for CLI output
#![allow(clippy::print_stderr)]
#![allow(clippy::print_stdout)]
// Allow multiple crate versions from transitive dependencies
#![allow(clippy::multiple_crate_versions)]

use adt_twincache::config::ConnectorConfig;
use adt_twincache::observability;
use adt_twincache::services::TwinCacheConnector;
use adt_twincache::{StoreStrategy, TypeCatalog};
use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::process::ExitCode;

/// Resynchronize Azure Digital Twins into a `RedisGraph` twin cache.
#[derive(Parser)]
#[command(name = "adt-twincache")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to a TOML configuration file.
    #[arg(short, long, global = true, env = "TWIN_CACHE_CONFIG")]
    config: Option<PathBuf>,

    /// Store strategy, overriding configuration.
    #[arg(short, long, global = true, value_enum)]
    strategy: Option<StrategyArg>,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Run a full resync into a new cache generation.
    Sync {
        /// Keep the staged CSV artifacts after a successful load.
        #[arg(long)]
        keep_artifacts: bool,

        /// Print the run report as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Write the CSV artifacts of a fresh projection without loading them.
    Export {
        /// Output directory.
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Print the resolved type catalog.
    Schema {
        /// Output format.
        #[arg(short, long, value_enum, default_value = "json")]
        format: SchemaFormat,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum StrategyArg {
    Bulk,
    Direct,
}

impl From<StrategyArg> for StoreStrategy {
    fn from(value: StrategyArg) -> Self {
        match value {
            StrategyArg::Bulk => Self::BulkLoad,
            StrategyArg::Direct => Self::DirectQuery,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum SchemaFormat {
    Json,
    Toml,
}

fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        },
    };

    let observability = match observability::init(&config.logging, &config.metrics, cli.verbose)
    {
        Ok(handle) => handle,
        Err(e) => {
            eprintln!("Failed to initialize observability: {e}");
            return ExitCode::FAILURE;
        },
    };

    let result = run_command(cli.command, &config);
    observability.flush();

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        },
    }
}

fn load_config(cli: &Cli) -> adt_twincache::Result<ConnectorConfig> {
    let config = ConnectorConfig::load(cli.config.as_deref())?;
    Ok(match cli.strategy {
        Some(strategy) => config.with_strategy(strategy.into()),
        None => config,
    })
}

fn run_command(command: Commands, config: &ConnectorConfig) -> anyhow::Result<()> {
    let connector = TwinCacheConnector::connect(config)?;

    match command {
        Commands::Sync {
            keep_artifacts,
            json,
        } => {
            let mut settings = connector.settings().clone();
            settings.keep_artifacts = keep_artifacts;
            let report = connector.with_settings(settings).run()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!(
                    "Loaded {} twins and {} relationships into {} in {}ms",
                    report.twins, report.relationships, report.graph, report.elapsed_ms
                );
                if !report.pruned.is_empty() {
                    println!("Pruned: {}", report.pruned.join(", "));
                }
            }
        },

        Commands::Export { output } => {
            let artifacts = connector
                .export(&output)
                .with_context(|| format!("exporting to {}", output.display()))?;
            for artifact in artifacts.iter() {
                println!("{}\t{} rows", artifact.path.display(), artifact.rows);
            }
        },

        Commands::Schema { format } => {
            let catalog = connector.resolve_schema()?;
            println!("{}", render_catalog(&catalog, format)?);
        },
    }

    Ok(())
}

fn render_catalog(catalog: &TypeCatalog, format: SchemaFormat) -> anyhow::Result<String> {
    Ok(match format {
        SchemaFormat::Json => serde_json::to_string_pretty(catalog)?,
        SchemaFormat::Toml => toml::to_string_pretty(catalog)?,
    })
}
