//! # arbinsync - Incremental Battery Test Data Extraction
//!
//! `arbinsync` turns the fragmented relational databases written by Arbin
//! battery cyclers into one unified, gap-filled CSV time series per test
//! channel, extracting incrementally so repeated runs only touch channels
//! with fresh data.
//!
//! ## Key Features
//!
//! - **Catalog Reconciliation**: Resolves test names, test ids, channels,
//!   and per-channel activity windows from the master catalog, applying
//!   exclusion lists and duplicate-name resolution.
//!
//! - **End-Time Correction**: The catalog's recorded window end routinely
//!   lags reality; the true end is recovered from the newest step event
//!   found by walking the result-database chain backwards.
//!
//! - **Unified Time Series**: Raw electrical samples, step events, and
//!   auxiliary samples are outer-joined on their native 100 ns timestamps,
//!   auxiliary signals interpolated onto the raw sample grid, and the rest
//!   forward-filled into a dense table.
//!
//! - **Durable Checkpoints**: Progress per test-channel (last data time,
//!   row count) is persisted atomically after each channel, so interrupted
//!   runs resume where they left off.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::path::Path;
//!
//! use arbinsync::config::ExtractorConfig;
//! use arbinsync::extract::Extractor;
//! use arbinsync::sqlite::SqliteStore;
//!
//! let cfg = ExtractorConfig::load(Path::new("extractor.toml"))?;
//! let store = SqliteStore::new(&cfg.database_dir, &cfg.master_database);
//!
//! let summary = Extractor::new(&cfg, &store).run()?;
//! println!(
//!     "{} extracted, {} up to date, {} failed",
//!     summary.extracted, summary.skipped, summary.failed
//! );
//! # Ok::<(), anyhow::Error>(())
//! ```
//!
//! This produces, per test-channel, a `<test>_ch<N>.csv` with the unified
//! table and a `<test>_ch<N>_Metadata.csv` carrying the catalog row, plus
//! a JSON checkpoint file tracking extraction progress.
//!
//! ## Store Backends
//!
//! All database access goes through the traits in [`store`]
//! ([`CatalogQuery`](store::CatalogQuery), [`ChannelQuery`](store::ChannelQuery),
//! [`Connect`](store::Connect)). The shipped backend is
//! [`sqlite::SqliteStore`], which reads the fixed Arbin schema from a
//! directory of SQLite files; tests substitute in-memory fakes.

#![deny(missing_docs)]

pub mod catalog;
pub mod checkpoint;
pub mod config;
pub mod csv_writer;
pub mod demo;
pub mod extract;
pub mod join;
pub mod sqlite;
pub mod store;
pub mod time;
pub mod windows;

pub use checkpoint::{Checkpoint, CheckpointStore};
pub use config::ExtractorConfig;
pub use extract::{Extractor, RunSummary};
pub use join::UnifiedRecord;
pub use sqlite::SqliteStore;
