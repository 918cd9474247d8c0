//! # Window Reconciler
//!
//! Decides, per test/channel, which time windows bound that channel's
//! activity and whether any window extends past the previous checkpoint.
//!
//! The master catalog records a start and end time per activity window, but
//! the instrument does not reliably write session termination, so the
//! recorded end time routinely lags the real one. The authoritative "how far
//! did this channel actually get" signal is the most recent entry in the
//! result databases' event table. Reconciliation pulls that event time and,
//! when it exceeds every recorded end, substitutes it on the window that
//! held the maximum end.
//!
//! Older result files predate the event table entirely, so the event lookup
//! walks the channel's origin databases newest to oldest and treats any
//! lookup failure as "keep walking"; exhausting the list means time zero.

use log::{info, warn};

use crate::checkpoint::Checkpoint;
use crate::config::ExtractorConfig;
use crate::store::{database_ordinal, CatalogQuery, StoreError, WindowRow};
use crate::time;

/// One contiguous period a test-channel was active, after end-time
/// reconciliation.
#[derive(Debug, Clone, PartialEq)]
pub struct ActivityWindow {
    /// Catalog window identifier.
    pub window_id: i64,
    /// Window start, epoch seconds.
    pub start: f64,
    /// Window end, epoch seconds, possibly corrected from the event table.
    pub end: f64,
    /// Origin result databases, ordered oldest to newest.
    pub databases: Vec<String>,
}

impl ActivityWindow {
    fn from_row(row: WindowRow) -> Self {
        Self {
            window_id: row.window_id,
            start: row.start,
            end: row.end,
            databases: row.databases,
        }
    }
}

/// Result of window reconciliation for one test/channel.
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciled {
    /// Activity windows ordered by start time.
    pub windows: Vec<ActivityWindow>,
    /// Whether an end time was corrected from the event table.
    pub end_corrected: bool,
}

/// Errors that can occur during window reconciliation
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    /// The catalog lists the test/channel but has no window rows for it.
    /// This is a catalog inconsistency and fails the test-channel hard.
    #[error("no activity windows for test id {test_id} channel {channel}")]
    NoWindows {
        /// The live test id.
        test_id: i64,
        /// The zero-based channel.
        channel: i64,
    },

    /// Store failure while reading the catalog.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Resolve and reconcile the activity windows for a test/channel.
pub fn resolve_windows(
    catalog: &impl CatalogQuery,
    test_id: i64,
    channel: i64,
) -> Result<Reconciled, ReconcileError> {
    let rows = catalog.channel_windows(test_id, channel)?;
    if rows.is_empty() {
        return Err(ReconcileError::NoWindows { test_id, channel });
    }
    let mut windows: Vec<ActivityWindow> = rows.into_iter().map(ActivityWindow::from_row).collect();

    let event_tick = latest_event_tick(catalog, &windows, test_id, channel);
    let event_epoch = time::to_epoch(event_tick);

    // The window holding the maximum recorded end is the one whose end the
    // instrument may have failed to close out.
    let max_index = max_end_index(&windows);
    let max_end = windows[max_index].end;
    let mut end_corrected = false;
    if max_end > 0.0 {
        if event_epoch > max_end {
            info!(
                "last event {event_epoch} past recorded stop {max_end} on test id {test_id} \
                 channel {channel}; correcting window end"
            );
            windows[max_index].end = event_epoch;
            end_corrected = true;
        }
    } else {
        // No window ever recorded a positive end; the event time is all
        // there is.
        windows[max_index].end = event_epoch;
    }

    Ok(Reconciled {
        windows,
        end_corrected,
    })
}

/// Whether the (reconciled) windows contain data past the checkpoint.
///
/// Always fresh when there is no prior checkpoint. Never fresh when the
/// corrupted-origin guard trips, regardless of timestamps.
#[must_use]
pub fn is_fresh(
    cfg: &ExtractorConfig,
    windows: &[ActivityWindow],
    checkpoint: Option<&Checkpoint>,
) -> bool {
    if windows.is_empty() {
        return false;
    }
    if !origin_allowed(windows, cfg.min_database_ordinal) {
        return false;
    }
    match checkpoint {
        None => true,
        Some(cp) => max_end(windows) > cp.last_time,
    }
}

/// Corrupted-database guard: the lowest-numbered origin database referenced
/// by the first window must be at or above the configured minimum ordinal.
/// Below-threshold channels are skipped for the run, logged, never fatal.
#[must_use]
pub fn origin_allowed(windows: &[ActivityWindow], min_database_ordinal: u32) -> bool {
    let Some(min_ordinal) = min_origin_ordinal(windows) else {
        // No parsable ordinal; nothing to judge.
        return true;
    };
    if min_ordinal < min_database_ordinal {
        warn!(
            "first window references origin database ordinal {min_ordinal} below minimum \
             {min_database_ordinal}; skipping as corrupt"
        );
        return false;
    }
    true
}

/// Minimum database ordinal referenced by the first window, if any name
/// carries a parsable trailing number.
#[must_use]
pub fn min_origin_ordinal(windows: &[ActivityWindow]) -> Option<u32> {
    windows
        .first()?
        .databases
        .iter()
        .filter_map(|name| database_ordinal(name))
        .min()
}

/// Maximum (reconciled) end time across windows.
#[must_use]
pub fn max_end(windows: &[ActivityWindow]) -> f64 {
    windows.iter().map(|w| w.end).fold(f64::NEG_INFINITY, f64::max)
}

fn max_end_index(windows: &[ActivityWindow]) -> usize {
    let mut index = 0;
    for (i, window) in windows.iter().enumerate() {
        if window.end > windows[index].end {
            index = i;
        }
    }
    index
}

/// Most recent event tick for the test/channel, probing origin databases
/// newest to oldest across all windows. A failed lookup falls through to
/// the next older database; no event anywhere means tick zero.
fn latest_event_tick(
    catalog: &impl CatalogQuery,
    windows: &[ActivityWindow],
    test_id: i64,
    channel: i64,
) -> i64 {
    for window in windows.iter().rev() {
        for database in window.databases.iter().rev() {
            match catalog.latest_event_tick(database, test_id, channel) {
                Ok(Some(tick)) => return tick,
                Ok(None) => continue,
                Err(error) => {
                    // Older result files lack the event table; treat the
                    // failure as exhausted for this database.
                    warn!("event lookup failed on {database}: {error}");
                    continue;
                }
            }
        }
    }
    warn!("unable to find any events for test id {test_id} channel {channel}");
    0
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::store::{StoreResult, WindowRow};

    #[derive(Default)]
    struct FakeCatalog {
        windows: Vec<WindowRow>,
        // database name -> latest event tick; absent means lookup failure
        events: HashMap<String, Option<i64>>,
    }

    impl CatalogQuery for FakeCatalog {
        fn test_names(&self) -> StoreResult<Vec<String>> {
            Ok(Vec::new())
        }

        fn test_ids(&self, _: &str) -> StoreResult<Vec<i64>> {
            Ok(Vec::new())
        }

        fn channel_ids(&self, _: i64) -> StoreResult<Vec<i64>> {
            Ok(Vec::new())
        }

        fn channel_windows(&self, _: i64, _: i64) -> StoreResult<Vec<WindowRow>> {
            Ok(self.windows.clone())
        }

        fn latest_event_tick(&self, database: &str, _: i64, _: i64) -> StoreResult<Option<i64>> {
            match self.events.get(database) {
                Some(tick) => Ok(*tick),
                None => Err(StoreError::Transient(format!("no event table in {database}"))),
            }
        }

        fn channel_metadata(&self, _: i64, _: i64) -> StoreResult<Vec<(String, String)>> {
            Ok(Vec::new())
        }
    }

    fn window(id: i64, start: f64, end: f64, dbs: &[&str]) -> WindowRow {
        WindowRow {
            window_id: id,
            start,
            end,
            databases: dbs.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn cfg(min_ordinal: u32) -> ExtractorConfig {
        ExtractorConfig {
            min_database_ordinal: min_ordinal,
            ..ExtractorConfig::default()
        }
    }

    #[test]
    fn test_event_past_recorded_stop_corrects_end() {
        let catalog = FakeCatalog {
            windows: vec![window(1, 1000.0, 2000.0, &["ArbinResultData3"])],
            events: HashMap::from([("ArbinResultData3".to_string(), Some(time::to_tick(2500.0)))]),
        };
        let reconciled = resolve_windows(&catalog, 7, 0).unwrap();
        assert!(reconciled.end_corrected);
        assert!((reconciled.windows[0].end - 2500.0).abs() < 1e-6);
    }

    #[test]
    fn test_event_before_recorded_stop_is_ignored() {
        let catalog = FakeCatalog {
            windows: vec![window(1, 1000.0, 2000.0, &["ArbinResultData3"])],
            events: HashMap::from([("ArbinResultData3".to_string(), Some(time::to_tick(1500.0)))]),
        };
        let reconciled = resolve_windows(&catalog, 7, 0).unwrap();
        assert!(!reconciled.end_corrected);
        assert_eq!(reconciled.windows[0].end, 2000.0);
    }

    #[test]
    fn test_no_positive_end_takes_event_time_unconditionally() {
        let catalog = FakeCatalog {
            windows: vec![window(1, 1000.0, 0.0, &["ArbinResultData3"])],
            events: HashMap::from([("ArbinResultData3".to_string(), Some(time::to_tick(1200.0)))]),
        };
        let reconciled = resolve_windows(&catalog, 7, 0).unwrap();
        assert!((reconciled.windows[0].end - 1200.0).abs() < 1e-6);
    }

    #[test]
    fn test_event_lookup_walks_backward_through_databases() {
        // Newest database has no event table; the older one answers.
        let catalog = FakeCatalog {
            windows: vec![window(
                1,
                1000.0,
                0.0,
                &["ArbinResultData3", "ArbinResultData4"],
            )],
            events: HashMap::from([("ArbinResultData3".to_string(), Some(time::to_tick(1100.0)))]),
        };
        let reconciled = resolve_windows(&catalog, 7, 0).unwrap();
        assert!((reconciled.windows[0].end - 1100.0).abs() < 1e-6);
    }

    #[test]
    fn test_no_events_anywhere_is_time_zero() {
        let catalog = FakeCatalog {
            windows: vec![window(1, 1000.0, 0.0, &["ArbinResultData3"])],
            events: HashMap::new(),
        };
        let reconciled = resolve_windows(&catalog, 7, 0).unwrap();
        assert_eq!(reconciled.windows[0].end, 0.0);
    }

    #[test]
    fn test_no_windows_is_a_hard_error() {
        let catalog = FakeCatalog::default();
        let error = resolve_windows(&catalog, 7, 0).unwrap_err();
        assert!(matches!(
            error,
            ReconcileError::NoWindows { test_id: 7, channel: 0 }
        ));
    }

    #[test]
    fn test_freshness_against_corrected_end() {
        let catalog = FakeCatalog {
            windows: vec![window(1, 1000.0, 2000.0, &["ArbinResultData3"])],
            events: HashMap::from([("ArbinResultData3".to_string(), Some(time::to_tick(2500.0)))]),
        };
        let reconciled = resolve_windows(&catalog, 7, 0).unwrap();

        let below = Checkpoint {
            last_time: 2400.0,
            row_count: 10,
        };
        let at = Checkpoint {
            last_time: 2500.0,
            row_count: 10,
        };
        assert!(is_fresh(&cfg(0), &reconciled.windows, Some(&below)));
        assert!(!is_fresh(&cfg(0), &reconciled.windows, Some(&at)));
        assert!(is_fresh(&cfg(0), &reconciled.windows, None));
    }

    #[test]
    fn test_corruption_guard_blocks_regardless_of_timestamps() {
        let windows = vec![ActivityWindow {
            window_id: 1,
            start: 1000.0,
            end: 1_000_000.0,
            databases: vec!["ArbinResultData1".to_string(), "ArbinResultData5".to_string()],
        }];
        assert!(!is_fresh(&cfg(2), &windows, None));
        assert!(is_fresh(&cfg(1), &windows, None));
    }

    #[test]
    fn test_min_origin_ordinal_uses_first_window_only() {
        let windows = vec![
            ActivityWindow {
                window_id: 1,
                start: 0.0,
                end: 1.0,
                databases: vec!["ArbinResultData7".to_string()],
            },
            ActivityWindow {
                window_id: 2,
                start: 2.0,
                end: 3.0,
                databases: vec!["ArbinResultData1".to_string()],
            },
        ];
        assert_eq!(min_origin_ordinal(&windows), Some(7));
    }
}
