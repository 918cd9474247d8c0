//! # Signal Join Pipeline
//!
//! Pulls the three raw signal sets (channel measurements, step/cycle
//! boundary events, auxiliary sensor samples) for each activity window,
//! aligns them onto a common tick index, fills gaps, derives the elapsed
//! time fields, and concatenates windows into one ordered table.
//!
//! ## Join semantics
//!
//! The three signals live in different tables with different sampling
//! cadences. Per origin database:
//!
//! 1. Raw samples pivot into one row per distinct tick with one optional
//!    slot per measured quantity (first value wins on duplicate ticks).
//! 2. Step events mark the row at their tick with step and cycle indices;
//!    repeated `(step, cycle)` pairs keep only the earliest event.
//! 3. Auxiliary values are linearly resampled onto the raw tick index so
//!    the outer join never invents extra aux timestamps.
//!
//! After all windows are concatenated, still-missing values are filled
//! forward from the preceding row, rows that never acquired a step index
//! are dropped (join artifacts, not real samples), elapsed step time is
//! recomputed against the filled step basis, and rows with exactly zero
//! elapsed step time are dropped — those are the duplicate boundary rows
//! the step-event join introduced.

use std::collections::{BTreeMap, HashSet};

use log::{info, warn};
use serde::Serialize;

use crate::config::ExtractorConfig;
use crate::store::{AuxKind, AuxSample, ChannelQuery, Connect, Quantity, RawSample, StepEvent};
use crate::time;
use crate::windows::{max_end, ActivityWindow};

/// One synthesized output row of the unified table, in the vendor export
/// column layout.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnifiedRecord {
    /// Dense 0-based data-point ordinal.
    #[serde(rename = "Data_Point")]
    pub data_point: u64,
    /// Seconds since the test's time anchor (first step event of the first
    /// non-empty database).
    #[serde(rename = "Test_Time")]
    pub test_time: f64,
    /// Wall-clock time, epoch seconds.
    #[serde(rename = "DateTime")]
    pub date_time: f64,
    /// Seconds since the most recent step boundary, rounded to 4 decimals.
    #[serde(rename = "Step_Time")]
    pub step_time: f64,
    /// Active step index. Always integral.
    #[serde(rename = "Step_Index")]
    pub step_index: i64,
    /// Active cycle index. Always integral.
    #[serde(rename = "Cycle_Index")]
    pub cycle_index: i64,
    /// Channel current, A.
    #[serde(rename = "Current")]
    pub current: Option<f64>,
    /// Channel voltage, V.
    #[serde(rename = "Voltage")]
    pub voltage: Option<f64>,
    /// Accumulated charge capacity, Ah.
    #[serde(rename = "Charge_Capacity")]
    pub charge_capacity: Option<f64>,
    /// Accumulated discharge capacity, Ah.
    #[serde(rename = "Discharge_Capacity")]
    pub discharge_capacity: Option<f64>,
    /// Accumulated charge energy, Wh.
    #[serde(rename = "Charge_Energy")]
    pub charge_energy: Option<f64>,
    /// Accumulated discharge energy, Wh.
    #[serde(rename = "Discharge_Energy")]
    pub discharge_energy: Option<f64>,
    /// Voltage derivative, V/s.
    #[serde(rename = "dV/dt")]
    pub dv_dt: Option<f64>,
    /// Internal resistance, Ohm.
    #[serde(rename = "Internal_Resistance")]
    pub internal_resistance: Option<f64>,
    /// Interpolated temperature, °C.
    #[serde(rename = "Temperature")]
    pub temperature: Option<f64>,
    /// Interpolated auxiliary voltage, V.
    #[serde(rename = "Aux_Voltage")]
    pub aux_voltage: Option<f64>,
    /// Not measured by this system; always 0 for schema parity.
    #[serde(rename = "AC_Impedance")]
    pub ac_impedance: f64,
    /// Not measured by this system; always 0 for schema parity.
    #[serde(rename = "Is_FC_Data")]
    pub is_fc_data: i64,
    /// Not measured by this system; always 0 for schema parity.
    #[serde(rename = "ACI_Phase_Angle")]
    pub aci_phase_angle: f64,
}

/// Result of one test-channel's pull-and-join.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinOutcome {
    /// The unified table, non-decreasing in wall-clock time.
    pub records: Vec<UnifiedRecord>,
    /// Maximum reconciled window end time; the checkpoint value even when
    /// no rows qualified.
    pub last_time: f64,
    /// Number of rows in `records`.
    pub row_count: u64,
}

/// Tracks which origin database supplies the test-time anchor.
///
/// The anchor is the first step-event tick of the first *non-empty*
/// database seen, in window order; databases that return no raw or step
/// rows are passed over. Every elapsed-test-time value for the whole
/// test/channel is relative to this single tick.
#[derive(Debug, Default)]
pub struct AnchorTracker {
    anchor: Option<i64>,
}

impl AnchorTracker {
    /// Observe a non-empty database's first step tick; returns the anchor
    /// in effect (the first one ever observed).
    pub fn observe(&mut self, first_step_tick: i64) -> i64 {
        *self.anchor.get_or_insert(first_step_tick)
    }

    /// The anchor, if any non-empty database has been observed yet.
    #[must_use]
    pub fn get(&self) -> Option<i64> {
        self.anchor
    }
}

/// One joined (but not yet finalized) row keyed by tick.
#[derive(Debug, Clone, Default)]
struct JoinedRow {
    step_index: Option<i64>,
    cycle_index: Option<i64>,
    quantities: [Option<f64>; 8],
    temperature: Option<f64>,
    aux_voltage: Option<f64>,
}

/// A joined row with its derived time fields, pre-concatenation.
#[derive(Debug, Clone)]
struct WorkRow {
    date_time: f64,
    test_time: f64,
    /// Wall-clock time of the most recent step-carrying row; own time on
    /// step rows, filled forward later, undefined before the first step.
    step_basis: Option<f64>,
    row: JoinedRow,
}

/// Pull and join all signals for a test/channel across its reconciled
/// windows.
///
/// Store failures are retried up to the configured attempt count and the
/// affected database then skipped with a warning; nothing here is fatal.
/// When no database yields rows the outcome is an empty table with
/// `row_count = 0` and `last_time` equal to the maximum window end.
pub fn pull_and_join<C: Connect>(
    cfg: &ExtractorConfig,
    connector: &C,
    test_id: i64,
    channel: i64,
    windows: &[ActivityWindow],
) -> JoinOutcome {
    let last_time = if windows.is_empty() { 0.0 } else { max_end(windows) };
    let mut anchor = AnchorTracker::default();
    let mut work: Vec<WorkRow> = Vec::new();

    for window in windows {
        let min_tick = time::to_tick(window.start);
        let max_tick = time::to_tick(window.end);
        for database in &window.databases {
            info!("pulling {database} for test id {test_id} channel {channel}");
            let Some((raw, steps, aux)) =
                pull_database(cfg, connector, database, channel, min_tick, max_tick)
            else {
                continue;
            };
            if raw.is_empty() || steps.is_empty() {
                // Contributes nothing; the anchor tracker must not observe
                // it so the first non-empty database supplies the anchor.
                continue;
            }
            let first_step_tick = steps.iter().map(|e| e.tick).min().unwrap_or(min_tick);
            let anchor_tick = anchor.observe(first_step_tick);
            for (tick, row) in join_signals(&raw, &steps, &aux) {
                work.push(WorkRow {
                    date_time: time::to_epoch(tick),
                    test_time: time::to_epoch(tick - anchor_tick),
                    step_basis: row.step_index.is_some().then(|| time::to_epoch(tick)),
                    row,
                });
            }
        }
    }

    if work.is_empty() {
        warn!("no data for test id {test_id} channel {channel}");
        return JoinOutcome {
            records: Vec::new(),
            last_time,
            row_count: 0,
        };
    }

    let records = finalize(work);
    let row_count = records.len() as u64;
    JoinOutcome {
        records,
        last_time,
        row_count,
    }
}

/// Open a database and run the three range queries, with bounded retry.
/// Returns `None` once the attempt budget is exhausted.
fn pull_database<C: Connect>(
    cfg: &ExtractorConfig,
    connector: &C,
    database: &str,
    channel: i64,
    min_tick: i64,
    max_tick: i64,
) -> Option<(Vec<RawSample>, Vec<StepEvent>, Vec<AuxSample>)> {
    let attempts = cfg.attempts.max(1);
    for attempt in 1..=attempts {
        let result = connector.open(database).and_then(|conn| {
            let raw = conn.raw_samples(channel, min_tick, max_tick)?;
            let steps = conn.step_events(channel, min_tick, max_tick)?;
            let aux = conn.aux_samples(channel, min_tick, max_tick)?;
            Ok((raw, steps, aux))
        });
        match result {
            Ok(signals) => return Some(signals),
            Err(error) => {
                warn!("read of {database} failed (attempt {attempt}/{attempts}): {error}");
            }
        }
    }
    warn!("skipping {database} after {attempts} failed attempts");
    None
}

/// Outer-join the three signal sets by tick into ordered joined rows.
fn join_signals(
    raw: &[RawSample],
    steps: &[StepEvent],
    aux: &[AuxSample],
) -> BTreeMap<i64, JoinedRow> {
    let mut rows: BTreeMap<i64, JoinedRow> = BTreeMap::new();

    // Pivot raw samples; the first value per (tick, quantity) wins.
    let mut sorted_raw: Vec<&RawSample> = raw.iter().collect();
    sorted_raw.sort_by_key(|s| s.tick);
    let mut raw_ticks: Vec<i64> = Vec::new();
    for sample in sorted_raw {
        if raw_ticks.last() != Some(&sample.tick) {
            raw_ticks.push(sample.tick);
        }
        let slot =
            &mut rows.entry(sample.tick).or_default().quantities[sample.quantity.index()];
        if slot.is_none() {
            *slot = Some(sample.value);
        }
    }

    // Step events; a repeated (step, cycle) pair keeps only its earliest
    // event so later bookkeeping rows do not reset step time.
    let mut sorted_steps = steps.to_vec();
    sorted_steps.sort_by_key(|e| e.tick);
    let mut seen = HashSet::new();
    for event in sorted_steps {
        if !seen.insert((event.step_index, event.cycle_index)) {
            continue;
        }
        let row = rows.entry(event.tick).or_default();
        row.step_index = Some(event.step_index);
        row.cycle_index = Some(event.cycle_index);
    }

    // Resample aux onto the raw tick index. An empty aux set contributes
    // nothing; the raw rows already exist, so the join needs no synthetic
    // key.
    for kind in [AuxKind::Temperature, AuxKind::Voltage] {
        let series = aux_series(aux, kind);
        if series.is_empty() {
            continue;
        }
        for &tick in &raw_ticks {
            let value = interpolate(&series, tick);
            if let Some(row) = rows.get_mut(&tick) {
                match kind {
                    AuxKind::Temperature => row.temperature = Some(value),
                    AuxKind::Voltage => row.aux_voltage = Some(value),
                }
            }
        }
    }

    rows
}

/// Sorted (tick, value) series for one aux sensor kind, first value per
/// tick wins.
fn aux_series(aux: &[AuxSample], kind: AuxKind) -> Vec<(i64, f64)> {
    let mut series: Vec<(i64, f64)> = aux
        .iter()
        .filter(|s| s.kind == kind)
        .map(|s| (s.tick, s.value))
        .collect();
    series.sort_by_key(|(tick, _)| *tick);
    series.dedup_by_key(|(tick, _)| *tick);
    series
}

/// Piecewise-linear interpolation with endpoint clamping.
fn interpolate(series: &[(i64, f64)], tick: i64) -> f64 {
    match series.binary_search_by_key(&tick, |(t, _)| *t) {
        Ok(i) => series[i].1,
        Err(0) => series[0].1,
        Err(i) if i == series.len() => series[i - 1].1,
        Err(i) => {
            let (x0, y0) = series[i - 1];
            let (x1, y1) = series[i];
            let fraction = (tick - x0) as f64 / (x1 - x0) as f64;
            y0 + fraction * (y1 - y0)
        }
    }
}

/// Forward-fill, drop step-less rows, recompute step time, dedup boundary
/// artifacts, and assign the dense data-point index.
fn finalize(mut rows: Vec<WorkRow>) -> Vec<UnifiedRecord> {
    forward_fill(&mut rows);

    let mut records = Vec::new();
    let mut data_point = 0u64;
    for work in rows {
        // Rows that never acquired a step index are join artifacts from
        // before the first step event.
        let (Some(step_index), Some(cycle_index), Some(basis)) =
            (work.row.step_index, work.row.cycle_index, work.step_basis)
        else {
            continue;
        };
        let step_time = work.date_time - basis;
        if step_time == 0.0 {
            // Duplicate boundary rows introduced by the step-event join.
            continue;
        }
        let q = work.row.quantities;
        records.push(UnifiedRecord {
            data_point,
            test_time: work.test_time,
            date_time: work.date_time,
            step_time: round4(step_time),
            step_index,
            cycle_index,
            current: q[Quantity::Current.index()],
            voltage: q[Quantity::Voltage.index()],
            charge_capacity: q[Quantity::ChargeCapacity.index()],
            discharge_capacity: q[Quantity::DischargeCapacity.index()],
            charge_energy: q[Quantity::ChargeEnergy.index()],
            discharge_energy: q[Quantity::DischargeEnergy.index()],
            dv_dt: q[Quantity::DvDt.index()],
            internal_resistance: q[Quantity::InternalResistance.index()],
            temperature: work.row.temperature,
            aux_voltage: work.row.aux_voltage,
            ac_impedance: 0.0,
            is_fc_data: 0,
            aci_phase_angle: 0.0,
        });
        data_point += 1;
    }
    records
}

/// Carry last-known values forward through gaps, across database and
/// window boundaries.
fn forward_fill(rows: &mut [WorkRow]) {
    let mut last: Option<(JoinedRow, Option<f64>)> = None;
    for work in rows.iter_mut() {
        if let Some((prev_row, prev_basis)) = &last {
            if work.row.step_index.is_none() {
                work.row.step_index = prev_row.step_index;
            }
            if work.row.cycle_index.is_none() {
                work.row.cycle_index = prev_row.cycle_index;
            }
            for (slot, prev_slot) in work.row.quantities.iter_mut().zip(prev_row.quantities) {
                if slot.is_none() {
                    *slot = prev_slot;
                }
            }
            if work.row.temperature.is_none() {
                work.row.temperature = prev_row.temperature;
            }
            if work.row.aux_voltage.is_none() {
                work.row.aux_voltage = prev_row.aux_voltage;
            }
            if work.step_basis.is_none() {
                work.step_basis = *prev_basis;
            }
        }
        last = Some((work.row.clone(), work.step_basis));
    }
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}
