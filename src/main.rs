//! # arbinsync CLI
//!
//! Command-line front end for the incremental Arbin extractor.
//!
//! ## Usage
//!
//! ```bash
//! # Run a full extraction pass
//! arbinsync run --config extractor.toml
//!
//! # List the test channels the catalog resolves to
//! arbinsync channels --config extractor.toml
//!
//! # Show extraction progress per test channel
//! arbinsync checkpoints --config extractor.toml
//!
//! # Generate a small synthetic dataset for testing
//! arbinsync demo /tmp/arbin-demo
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::info;

use arbinsync::catalog;
use arbinsync::checkpoint::CheckpointStore;
use arbinsync::config::ExtractorConfig;
use arbinsync::demo;
use arbinsync::extract::Extractor;
use arbinsync::sqlite::SqliteStore;

/// arbinsync - Incremental Arbin Battery Test Data Extractor
#[derive(Parser)]
#[command(name = "arbinsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Verbosity level (-v for info, -vv for debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one full extraction pass over every test channel
    Run {
        /// Configuration file path
        #[arg(short, long, default_value = "extractor.toml")]
        config: PathBuf,
    },

    /// List the test channels the catalog resolves to
    Channels {
        /// Configuration file path
        #[arg(short, long, default_value = "extractor.toml")]
        config: PathBuf,
    },

    /// Show extraction progress recorded in the checkpoint file
    Checkpoints {
        /// Configuration file path
        #[arg(short, long, default_value = "extractor.toml")]
        config: PathBuf,
    },

    /// Generate a small synthetic master + result database pair
    Demo {
        /// Directory to create the database files in
        #[arg(value_name = "DIR", default_value = "arbin-demo")]
        dir: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    match cli.command {
        Commands::Run { config } => run_extract(config),
        Commands::Channels { config } => run_channels(config),
        Commands::Checkpoints { config } => run_checkpoints(config),
        Commands::Demo { dir } => run_demo(dir),
    }
}

fn load_config(path: &Path) -> Result<ExtractorConfig> {
    ExtractorConfig::load(path)
        .with_context(|| format!("Failed to load configuration from {}", path.display()))
}

/// Run one full extraction pass
fn run_extract(config: PathBuf) -> Result<()> {
    let cfg = load_config(&config)?;
    info!("Database dir: {}", cfg.database_dir.display());
    info!("Output dir:   {}", cfg.output_dir.display());

    let store = SqliteStore::new(&cfg.database_dir, &cfg.master_database);
    let summary = Extractor::new(&cfg, &store)
        .run()
        .context("Extraction run failed")?;

    println!(
        "{} extracted, {} up to date, {} failed",
        summary.extracted, summary.skipped, summary.failed
    );
    if summary.failed > 0 {
        std::process::exit(1);
    }
    Ok(())
}

/// List resolvable test channels
fn run_channels(config: PathBuf) -> Result<()> {
    let cfg = load_config(&config)?;
    let store = SqliteStore::new(&cfg.database_dir, &cfg.master_database);

    let channels = catalog::list_test_channels(&cfg, &store)
        .context("Failed to resolve the test-channel catalog")?;
    for test_channel in &channels {
        println!(
            "{} (test id {})",
            test_channel.display_name(&cfg.channel_delimiter),
            test_channel.test_id
        );
    }
    println!("{} test channels", channels.len());
    Ok(())
}

/// Show checkpointed extraction progress
fn run_checkpoints(config: PathBuf) -> Result<()> {
    let cfg = load_config(&config)?;
    let checkpoints = CheckpointStore::load(&cfg.checkpoint_path)
        .with_context(|| format!("Failed to load {}", cfg.checkpoint_path.display()))?;

    for (name, cp) in checkpoints.iter() {
        let last = chrono::DateTime::from_timestamp(cp.last_time as i64, 0)
            .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| cp.last_time.to_string());
        println!("{name}: {} rows, last data time {last}", cp.row_count);
    }
    println!("{} test channels extracted", checkpoints.len());
    Ok(())
}

/// Generate the demo dataset
fn run_demo(dir: PathBuf) -> Result<()> {
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create {}", dir.display()))?;
    demo::generate(&dir, "ArbinMasterData")
        .context("Failed to generate the demo dataset")?;

    println!("Demo dataset written to {}", dir.display());
    println!("Run it with a configuration pointing database_dir there:");
    println!("  database_dir = {:?}", dir.display().to_string());
    Ok(())
}
