//! # Store Collaborator Contracts
//!
//! The extractor core never talks to a database driver directly. It consumes
//! the narrow query contracts defined here; a backend (see [`crate::sqlite`])
//! implements them over the fixed Arbin schema.
//!
//! Three contracts cover the whole surface:
//!
//! - [`CatalogQuery`]: master-database lookups (test names, ids, channels,
//!   activity windows, latest event per result database, metadata).
//! - [`ChannelQuery`]: the three per-result-database signal queries, each
//!   restricted to a channel and a half-open tick range.
//! - [`Connect`]: connection lifecycle for named result databases.
//!
//! A failed open or query is a [`StoreError::Transient`] and is retryable;
//! an empty result set is **not** an error anywhere in these contracts.

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors raised by store collaborators
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Connection or query failure; the caller may retry a bounded number
    /// of times.
    #[error("transient store failure: {0}")]
    Transient(String),

    /// A row was present but could not be decoded into its row type.
    #[error("invalid data: {0}")]
    InvalidData(String),
}

/// One measured quantity in the raw channel table, keyed by the vendor's
/// `data_type` code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Quantity {
    /// Channel current (code 22), in A.
    Current,
    /// Channel voltage (code 21), in V.
    Voltage,
    /// Accumulated charge capacity (code 23), in Ah.
    ChargeCapacity,
    /// Accumulated discharge capacity (code 24), in Ah.
    DischargeCapacity,
    /// Accumulated charge energy (code 25), in Wh.
    ChargeEnergy,
    /// Accumulated discharge energy (code 26), in Wh.
    DischargeEnergy,
    /// Voltage derivative dV/dt (code 27), in V/s.
    DvDt,
    /// Internal resistance (code 30), in Ohm.
    InternalResistance,
}

impl Quantity {
    /// All quantities in the vendor export column order.
    pub const ALL: [Quantity; 8] = [
        Quantity::Current,
        Quantity::Voltage,
        Quantity::ChargeCapacity,
        Quantity::DischargeCapacity,
        Quantity::ChargeEnergy,
        Quantity::DischargeEnergy,
        Quantity::DvDt,
        Quantity::InternalResistance,
    ];

    /// Map a raw-table `data_type` code to its quantity. Unknown codes are
    /// ignored by callers (the instrument logs more types than we export).
    #[must_use]
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            22 => Some(Self::Current),
            21 => Some(Self::Voltage),
            23 => Some(Self::ChargeCapacity),
            24 => Some(Self::DischargeCapacity),
            25 => Some(Self::ChargeEnergy),
            26 => Some(Self::DischargeEnergy),
            27 => Some(Self::DvDt),
            30 => Some(Self::InternalResistance),
            _ => None,
        }
    }

    /// Positional index into per-row quantity arrays, following
    /// [`Quantity::ALL`] order.
    #[must_use]
    pub fn index(self) -> usize {
        Self::ALL.iter().position(|q| *q == self).unwrap_or(0)
    }
}

/// One auxiliary sensor kind, keyed by the auxiliary table's `data_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuxKind {
    /// Auxiliary voltage probe (code 0).
    Voltage,
    /// Temperature sensor (code 1).
    Temperature,
}

impl AuxKind {
    /// Map an auxiliary-table `data_type` code to its kind.
    #[must_use]
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::Voltage),
            1 => Some(Self::Temperature),
            _ => None,
        }
    }
}

/// One reading of one measured quantity at one tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawSample {
    /// Fixed-point timestamp.
    pub tick: i64,
    /// Which quantity this value belongs to.
    pub quantity: Quantity,
    /// The measured value.
    pub value: f64,
}

/// One step/cycle boundary marker. The event table is the authoritative
/// source of step and cycle indices and of each window's true start anchor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepEvent {
    /// Fixed-point timestamp.
    pub tick: i64,
    /// Step index active from this event onward.
    pub step_index: i64,
    /// Cycle index active from this event onward.
    pub cycle_index: i64,
}

/// One auxiliary sensor reading at one tick, sampled on its own cadence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AuxSample {
    /// Fixed-point timestamp.
    pub tick: i64,
    /// Which sensor this value belongs to.
    pub kind: AuxKind,
    /// The measured value.
    pub value: f64,
}

/// One activity-window row from the master catalog, before reconciliation.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowRow {
    /// The catalog's window (IV channel list) identifier.
    pub window_id: i64,
    /// Recorded start, epoch seconds. Reliable.
    pub start: f64,
    /// Recorded end, epoch seconds. Known to be unreliable; see
    /// [`crate::windows::resolve_windows`].
    pub end: f64,
    /// Origin result databases, ordered oldest to newest. A run that
    /// outlives one database's capacity chains into the next.
    pub databases: Vec<String>,
}

/// Master-catalog query contract.
pub trait CatalogQuery {
    /// All distinct test names in the catalog.
    fn test_names(&self) -> StoreResult<Vec<String>>;

    /// Test ids recorded for a name, in the store's chronological order
    /// (oldest first). Names are re-used; only the last id is live.
    fn test_ids(&self, test_name: &str) -> StoreResult<Vec<i64>>;

    /// Zero-based channel ids bound to a test id.
    fn channel_ids(&self, test_id: i64) -> StoreResult<Vec<i64>>;

    /// Activity-window rows for a test/channel, ordered by start time then
    /// window id.
    fn channel_windows(&self, test_id: i64, channel: i64) -> StoreResult<Vec<WindowRow>>;

    /// Most recent event tick recorded for a test/channel in the named
    /// result database. `None` when the database has no matching events.
    fn latest_event_tick(
        &self,
        database: &str,
        test_id: i64,
        channel: i64,
    ) -> StoreResult<Option<i64>>;

    /// The full catalog row for a test/channel as (column, value) pairs,
    /// used for the metadata CSV.
    fn channel_metadata(&self, test_id: i64, channel: i64) -> StoreResult<Vec<(String, String)>>;
}

/// Per-result-database signal query contract. All ranges are half-open
/// `[min_tick, max_tick)` in the store's native tick units.
pub trait ChannelQuery {
    /// Raw channel measurements for a channel in a tick range.
    fn raw_samples(&self, channel: i64, min_tick: i64, max_tick: i64)
        -> StoreResult<Vec<RawSample>>;

    /// Step/cycle boundary events for a channel in a tick range.
    fn step_events(&self, channel: i64, min_tick: i64, max_tick: i64)
        -> StoreResult<Vec<StepEvent>>;

    /// Auxiliary sensor samples for a channel in a tick range.
    fn aux_samples(&self, channel: i64, min_tick: i64, max_tick: i64)
        -> StoreResult<Vec<AuxSample>>;
}

/// Connection lifecycle for named result databases.
pub trait Connect {
    /// The per-database query handle this connector produces.
    type Channel: ChannelQuery;

    /// Open a handle to the named result database. The handle is dropped to
    /// disconnect; there are no held-open connections across test-channels.
    fn open(&self, database: &str) -> StoreResult<Self::Channel>;
}

/// Parse the numeric ordinal off the end of a result database name
/// (`ArbinResultData12` → `12`). Returns `None` for names without a
/// trailing number.
#[must_use]
pub fn database_ordinal(name: &str) -> Option<u32> {
    let digits: String = name
        .chars()
        .rev()
        .take_while(char::is_ascii_digit)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quantity_codes_roundtrip() {
        for quantity in Quantity::ALL {
            let code = match quantity {
                Quantity::Current => 22,
                Quantity::Voltage => 21,
                Quantity::ChargeCapacity => 23,
                Quantity::DischargeCapacity => 24,
                Quantity::ChargeEnergy => 25,
                Quantity::DischargeEnergy => 26,
                Quantity::DvDt => 27,
                Quantity::InternalResistance => 30,
            };
            assert_eq!(Quantity::from_code(code), Some(quantity));
        }
        assert_eq!(Quantity::from_code(99), None);
    }

    #[test]
    fn test_quantity_index_matches_all_order() {
        for (i, quantity) in Quantity::ALL.iter().enumerate() {
            assert_eq!(quantity.index(), i);
        }
    }

    #[test]
    fn test_aux_kind_codes() {
        assert_eq!(AuxKind::from_code(0), Some(AuxKind::Voltage));
        assert_eq!(AuxKind::from_code(1), Some(AuxKind::Temperature));
        assert_eq!(AuxKind::from_code(7), None);
    }

    #[test]
    fn test_database_ordinal_parses_trailing_digits() {
        assert_eq!(database_ordinal("ArbinResultData12"), Some(12));
        assert_eq!(database_ordinal("ArbinResultData1"), Some(1));
        assert_eq!(database_ordinal("ArbinMasterData"), None);
        assert_eq!(database_ordinal(""), None);
    }
}
