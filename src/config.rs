//! # Extractor Configuration
//!
//! Run configuration for the extractor, loaded from a TOML file. Every field
//! has a default so a partial (or missing) file still yields a usable
//! configuration for local runs.
//!
//! ## Example
//!
//! ```toml
//! database_dir = "/data/arbin"
//! output_dir = "/data/export"
//! checkpoint_path = "/data/export/converted.json"
//! excluded_tests = ["burn_in", "shakedown_ch3"]
//! channel_delimiter = "_ch"
//! min_database_ordinal = 2
//! attempts = 3
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Errors that can occur while loading configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// I/O error reading the config file
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// TOML syntax or type error
    #[error("TOML parse error: {0}")]
    ParseError(#[from] toml::de::Error),
}

/// Run configuration consumed by every extraction component.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    /// Directory holding the master and result database files.
    pub database_dir: PathBuf,

    /// Directory the per-channel CSV exports are written to.
    pub output_dir: PathBuf,

    /// Path of the durable checkpoint file.
    pub checkpoint_path: PathBuf,

    /// Name of the master catalog database.
    pub master_database: String,

    /// Exclusion entries. Every entry excludes any test with that exact
    /// name; entries containing
    /// [`channel_delimiter`](Self::channel_delimiter) additionally exclude
    /// the matching test+channel display name.
    pub excluded_tests: Vec<String>,

    /// Delimiter between test name and one-based channel label in display
    /// names (and therefore in output file names).
    pub channel_delimiter: String,

    /// Origin databases numbered below this ordinal are considered corrupt;
    /// a test-channel whose first window references one is skipped.
    pub min_database_ordinal: u32,

    /// Bounded retry count for each per-database pull.
    pub attempts: u32,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            database_dir: PathBuf::from("."),
            output_dir: PathBuf::from("export"),
            checkpoint_path: PathBuf::from("export/converted.json"),
            master_database: "ArbinMasterData".to_string(),
            excluded_tests: Vec::new(),
            channel_delimiter: "_ch".to_string(),
            min_database_ordinal: 0,
            attempts: 3,
        }
    }
}

impl ExtractorConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        Ok(toml::from_str(&text)?)
    }

    /// Exclusion entries matched against bare test names. Every entry
    /// participates, so a test literally named like a display name (say
    /// `foo_ch2`) is still excludable.
    pub fn excluded_names(&self) -> impl Iterator<Item = &str> {
        self.excluded_tests.iter().map(String::as_str)
    }

    /// Exclusion entries naming a test+channel display name.
    pub fn excluded_channels(&self) -> impl Iterator<Item = &str> {
        self.excluded_tests
            .iter()
            .map(String::as_str)
            .filter(|entry| entry.contains(self.channel_delimiter.as_str()))
    }
}
