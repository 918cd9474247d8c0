//! # Extraction Orchestrator
//!
//! Drives a full run: resolve the catalog, then per test-channel in
//! sequence — reconcile windows, gate on freshness, pull and join, write
//! the CSV pair, update and persist the checkpoint. One channel's failure
//! is logged and the run continues; the checkpoint file is persisted after
//! every successful channel so a crash loses at most the channel in
//! progress.

use std::fs;

use log::{error, info, warn};

use crate::catalog::{self, TestChannel};
use crate::checkpoint::{CheckpointError, CheckpointStore};
use crate::config::ExtractorConfig;
use crate::csv_writer::{self, CsvError};
use crate::join;
use crate::store::{CatalogQuery, Connect, StoreError};
use crate::windows::{self, ReconcileError};

/// Errors that can occur while orchestrating an extraction
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    /// Catalog query failure
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Window reconciliation failure
    #[error(transparent)]
    Reconcile(#[from] ReconcileError),

    /// Checkpoint load/persist failure
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    /// CSV export failure
    #[error(transparent)]
    Csv(#[from] CsvError),

    /// I/O failure creating the output directory
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Per-run counters reported by [`Extractor::run`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Test-channels with fresh data that were extracted and committed.
    pub extracted: usize,
    /// Test-channels with no fresh data (or blocked by the corruption
    /// guard).
    pub skipped: usize,
    /// Test-channels whose extraction failed; the run continued.
    pub failed: usize,
}

/// Sequential batch extractor over one store backend.
#[derive(Debug)]
pub struct Extractor<'a, S> {
    cfg: &'a ExtractorConfig,
    store: &'a S,
}

impl<'a, S: CatalogQuery + Connect> Extractor<'a, S> {
    /// Create an extractor over a store backend.
    pub fn new(cfg: &'a ExtractorConfig, store: &'a S) -> Self {
        Self { cfg, store }
    }

    /// Run one full extraction pass over every resolvable test-channel.
    pub fn run(&self) -> Result<RunSummary, ExtractError> {
        let channels = catalog::list_test_channels(self.cfg, self.store)?;
        info!("{} test channels in catalog", channels.len());

        let mut checkpoints = CheckpointStore::load(&self.cfg.checkpoint_path)?;
        info!("{} test channels previously converted", checkpoints.len());

        let mut summary = RunSummary::default();
        for test_channel in &channels {
            let name = test_channel.display_name(&self.cfg.channel_delimiter);
            match self.extract_channel(test_channel, &name, &mut checkpoints) {
                Ok(true) => summary.extracted += 1,
                Ok(false) => summary.skipped += 1,
                Err(err) => {
                    error!("extraction failed for {name}: {err}");
                    summary.failed += 1;
                }
            }
        }
        info!(
            "run complete: {} extracted, {} skipped, {} failed",
            summary.extracted, summary.skipped, summary.failed
        );
        Ok(summary)
    }

    /// Extract one test-channel. `Ok(true)` means data was committed,
    /// `Ok(false)` means there was nothing fresh to do.
    fn extract_channel(
        &self,
        test_channel: &TestChannel,
        name: &str,
        checkpoints: &mut CheckpointStore,
    ) -> Result<bool, ExtractError> {
        let prior = checkpoints.get(name).copied();
        match &prior {
            Some(cp) => info!(
                "updating {name} (test id {}, {} rows so far)",
                test_channel.test_id, cp.row_count
            ),
            None => info!("new test {name} (test id {})", test_channel.test_id),
        }

        let reconciled =
            windows::resolve_windows(self.store, test_channel.test_id, test_channel.channel)?;
        if !windows::is_fresh(self.cfg, &reconciled.windows, prior.as_ref()) {
            info!("no new data: {name}");
            return Ok(false);
        }

        let outcome = join::pull_and_join(
            self.cfg,
            self.store,
            test_channel.test_id,
            test_channel.channel,
            &reconciled.windows,
        );
        let metadata = self.fetch_metadata(test_channel.test_id, test_channel.channel)?;

        fs::create_dir_all(&self.cfg.output_dir)?;
        csv_writer::write_records(
            &self.cfg.output_dir.join(format!("{name}.csv")),
            &outcome.records,
        )?;
        csv_writer::write_metadata(
            &self.cfg.output_dir.join(format!("{name}_Metadata.csv")),
            &metadata,
        )?;

        checkpoints.update(name, outcome.last_time, outcome.row_count);
        checkpoints.persist()?;

        let old_rows = prior.map_or(0, |cp| cp.row_count);
        let finished = chrono::DateTime::from_timestamp(outcome.last_time as i64, 0)
            .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| outcome.last_time.to_string());
        info!(
            "finished {name}: last data time {finished}, rows {old_rows} -> {}",
            outcome.row_count
        );
        Ok(true)
    }

    /// Fetch the catalog metadata row with the same bounded retry the
    /// signal pulls get; the master database is no less flaky than the
    /// result databases.
    fn fetch_metadata(&self, test_id: i64, channel: i64) -> Result<Vec<(String, String)>, StoreError> {
        let attempts = self.cfg.attempts.max(1);
        let mut last_error = StoreError::Transient("no attempts made".into());
        for attempt in 1..=attempts {
            match self.store.channel_metadata(test_id, channel) {
                Ok(row) => return Ok(row),
                Err(error) => {
                    warn!("metadata read failed (attempt {attempt}/{attempts}): {error}");
                    last_error = error;
                }
            }
        }
        Err(last_error)
    }
}
