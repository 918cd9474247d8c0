//! # Catalog Resolver
//!
//! Enumerates the `(test, channel)` identities an extraction run will visit.
//!
//! Resolution walks the master catalog: every known test name, minus names
//! matching any exclusion entry exactly, in descending lexical order (a stable
//! tie-break that keeps checkpoint names consistent across runs); per name
//! only the most recent test id is live; per channel the display name is
//! checked against the channel-qualified exclusion list.

use std::collections::HashSet;

use log::warn;

use crate::config::ExtractorConfig;
use crate::store::{CatalogQuery, StoreResult};

/// One resolvable test/channel identity. Immutable once resolved.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TestChannel {
    /// Test name as entered on the instrument.
    pub test_name: String,
    /// The live (most recent) test id for the name.
    pub test_id: i64,
    /// Zero-based channel number.
    pub channel: i64,
}

impl TestChannel {
    /// Display name used for checkpoints and output files:
    /// `test_name + delimiter + (channel + 1)`. The `+ 1` converts the
    /// zero-based internal channel to the one-based label shown in the
    /// vendor UI.
    #[must_use]
    pub fn display_name(&self, delimiter: &str) -> String {
        format!("{}{}{}", self.test_name, delimiter, self.channel + 1)
    }
}

/// List every extractable test/channel in the catalog.
///
/// An empty catalog yields an empty list, not an error. Display names are
/// unique in the returned sequence; a collision is logged and the later
/// entry dropped.
pub fn list_test_channels(
    cfg: &ExtractorConfig,
    catalog: &impl CatalogQuery,
) -> StoreResult<Vec<TestChannel>> {
    let excluded_names: HashSet<&str> = cfg.excluded_names().collect();
    let excluded_channels: HashSet<&str> = cfg.excluded_channels().collect();

    let mut names: Vec<String> = catalog
        .test_names()?
        .into_iter()
        .filter(|name| !excluded_names.contains(name.as_str()))
        .collect();
    names.sort_unstable_by(|a, b| b.cmp(a));
    names.dedup();

    let mut seen_display_names = HashSet::new();
    let mut channels = Vec::new();
    for name in names {
        let test_ids = catalog.test_ids(&name)?;
        // Names get re-used across reruns; only the chronologically last id
        // is live.
        let Some(&test_id) = test_ids.last() else {
            warn!("test name `{name}` has no test ids, skipping");
            continue;
        };
        for channel in catalog.channel_ids(test_id)? {
            let test_channel = TestChannel {
                test_name: name.clone(),
                test_id,
                channel,
            };
            let display_name = test_channel.display_name(&cfg.channel_delimiter);
            if excluded_channels.contains(display_name.as_str()) {
                continue;
            }
            if !seen_display_names.insert(display_name.clone()) {
                warn!("duplicate display name `{display_name}`, dropping later entry");
                continue;
            }
            channels.push(test_channel);
        }
    }
    Ok(channels)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::store::{StoreError, StoreResult, WindowRow};

    #[derive(Default)]
    struct FakeCatalog {
        names: Vec<String>,
        ids: HashMap<String, Vec<i64>>,
        channels: HashMap<i64, Vec<i64>>,
    }

    impl CatalogQuery for FakeCatalog {
        fn test_names(&self) -> StoreResult<Vec<String>> {
            Ok(self.names.clone())
        }

        fn test_ids(&self, test_name: &str) -> StoreResult<Vec<i64>> {
            Ok(self.ids.get(test_name).cloned().unwrap_or_default())
        }

        fn channel_ids(&self, test_id: i64) -> StoreResult<Vec<i64>> {
            Ok(self.channels.get(&test_id).cloned().unwrap_or_default())
        }

        fn channel_windows(&self, _: i64, _: i64) -> StoreResult<Vec<WindowRow>> {
            Err(StoreError::Transient("not used".into()))
        }

        fn latest_event_tick(&self, _: &str, _: i64, _: i64) -> StoreResult<Option<i64>> {
            Ok(None)
        }

        fn channel_metadata(&self, _: i64, _: i64) -> StoreResult<Vec<(String, String)>> {
            Ok(Vec::new())
        }
    }

    fn fixture() -> FakeCatalog {
        let mut catalog = FakeCatalog::default();
        catalog.names = vec!["alpha".into(), "beta".into(), "gamma".into()];
        catalog.ids.insert("alpha".into(), vec![10, 17]);
        catalog.ids.insert("beta".into(), vec![20]);
        catalog.ids.insert("gamma".into(), vec![30]);
        catalog.channels.insert(17, vec![0, 1]);
        catalog.channels.insert(20, vec![3]);
        catalog.channels.insert(30, vec![5]);
        catalog
    }

    fn config(excluded: &[&str]) -> ExtractorConfig {
        ExtractorConfig {
            excluded_tests: excluded.iter().map(|s| s.to_string()).collect(),
            ..ExtractorConfig::default()
        }
    }

    #[test]
    fn test_descending_name_order_and_last_id_wins() {
        let channels = list_test_channels(&config(&[]), &fixture()).unwrap();
        let order: Vec<&str> = channels.iter().map(|c| c.test_name.as_str()).collect();
        assert_eq!(order, vec!["gamma", "beta", "alpha", "alpha"]);
        // `alpha` was re-run as test id 17; 10 is dead.
        assert!(channels.iter().all(|c| c.test_name != "alpha" || c.test_id == 17));
    }

    #[test]
    fn test_bare_name_exclusion() {
        let channels = list_test_channels(&config(&["beta"]), &fixture()).unwrap();
        assert!(channels.iter().all(|c| c.test_name != "beta"));
        assert_eq!(channels.len(), 3);
    }

    #[test]
    fn test_channel_qualified_exclusion() {
        // `alpha_ch2` is channel index 1 (one-based label 2).
        let channels = list_test_channels(&config(&["alpha_ch2"]), &fixture()).unwrap();
        assert!(channels
            .iter()
            .all(|c| !(c.test_name == "alpha" && c.channel == 1)));
        assert!(channels
            .iter()
            .any(|c| c.test_name == "alpha" && c.channel == 0));
    }

    #[test]
    fn test_delimiter_named_test_is_excludable_by_name() {
        // A test whose literal name looks like a display name must still
        // respond to an exact-name exclusion entry.
        let mut catalog = fixture();
        catalog.names.push("delta_ch2".into());
        catalog.ids.insert("delta_ch2".into(), vec![40]);
        catalog.channels.insert(40, vec![0, 1]);

        let channels = list_test_channels(&config(&["delta_ch2"]), &catalog).unwrap();
        assert!(channels.iter().all(|c| c.test_name != "delta_ch2"));
        // The other tests are untouched.
        assert_eq!(channels.len(), 4);
    }

    #[test]
    fn test_display_name_off_by_one() {
        let tc = TestChannel {
            test_name: "cells".into(),
            test_id: 1,
            channel: 43,
        };
        assert_eq!(tc.display_name("_ch"), "cells_ch44");
    }

    #[test]
    fn test_empty_catalog_is_valid() {
        let channels =
            list_test_channels(&config(&[]), &FakeCatalog::default()).unwrap();
        assert!(channels.is_empty());
    }

    #[test]
    fn test_no_duplicate_identities() {
        let mut catalog = fixture();
        catalog.names.push("beta".into());
        let channels = list_test_channels(&config(&[]), &catalog).unwrap();
        let unique: HashSet<_> = channels.iter().collect();
        assert_eq!(unique.len(), channels.len());
    }
}
