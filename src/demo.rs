//! # Demo Dataset Generator
//!
//! Builds a small synthetic master + result database pair in the Arbin
//! schema so the extractor can be exercised end to end without instrument
//! data. Used by the `demo` CLI subcommand and by the integration tests.
//!
//! The generated test (`demo_cells`, test id 17) runs one channel through
//! three steps across two cycles, with raw current/voltage/capacity
//! samples every 10 seconds and a coarser temperature trace. The recorded
//! window end deliberately lags the last event so a run also exercises the
//! end-time correction path.

use std::path::Path;

use rusqlite::{params, Connection};

use crate::sqlite::transient;
use crate::store::StoreResult;
use crate::time;

/// Test name used by the generated dataset.
pub const DEMO_TEST_NAME: &str = "demo_cells";

/// Result database name used by the generated dataset.
pub const DEMO_RESULT_DATABASE: &str = "ArbinResultData3";

/// Start of the generated activity window, epoch seconds (2018-01-01).
pub const DEMO_START: f64 = 1_514_764_800.0;

const DEMO_TEST_ID: i64 = 17;
const DEMO_CHANNEL: i64 = 0;
const STEP_SECONDS: f64 = 200.0;
const RUN_SECONDS: f64 = 1200.0;

/// Create the master database and `ArbinResultData3.sqlite` under `dir`.
/// Expects a directory without existing demo files.
pub fn generate(dir: &Path, master: &str) -> StoreResult<()> {
    let master_path = dir.join(format!("{master}.sqlite"));
    let result_path = dir.join(format!("{DEMO_RESULT_DATABASE}.sqlite"));

    let master_conn = Connection::open(master_path).map_err(transient)?;
    create_master_schema(&master_conn)?;
    populate_master(&master_conn)?;

    let result_conn = Connection::open(result_path).map_err(transient)?;
    create_result_schema(&result_conn)?;
    populate_result(&result_conn)?;
    Ok(())
}

/// Create the master-catalog tables the extractor queries.
pub fn create_master_schema(conn: &Connection) -> StoreResult<()> {
    conn.execute_batch(
        "CREATE TABLE TestList_Table (
             Test_ID INTEGER,
             test_name TEXT,
             First_Start_DateTime REAL
         );
         CREATE TABLE Resume_Table (
             test_id INTEGER,
             Channel_ID INTEGER
         );
         CREATE TABLE TestIVChList_Table (
             test_id INTEGER,
             IV_Ch_ID INTEGER,
             First_Start_DateTime REAL,
             Last_End_DateTime REAL,
             Databases TEXT,
             Schedule_File_Name TEXT
         );",
    )
    .map_err(transient)
}

/// Create the result-database tables the extractor queries.
pub fn create_result_schema(conn: &Connection) -> StoreResult<()> {
    conn.execute_batch(
        "CREATE TABLE Event_Table (
             Test_ID INTEGER,
             Channel_ID INTEGER,
             Date_Time INTEGER,
             New_Step_ID INTEGER,
             New_Cycle_ID INTEGER
         );
         CREATE TABLE Channel_RawData_Table (
             channel_id INTEGER,
             data_type INTEGER,
             date_time INTEGER,
             data_value REAL
         );
         CREATE TABLE Auxiliary_Table (
             AuxCh_ID INTEGER,
             data_type INTEGER,
             date_time INTEGER,
             data_value REAL
         );",
    )
    .map_err(transient)
}

fn populate_master(conn: &Connection) -> StoreResult<()> {
    conn.execute(
        "INSERT INTO TestList_Table (Test_ID, test_name, First_Start_DateTime) \
         VALUES (?1, ?2, ?3)",
        params![DEMO_TEST_ID, DEMO_TEST_NAME, DEMO_START],
    )
    .map_err(transient)?;
    conn.execute(
        "INSERT INTO Resume_Table (test_id, Channel_ID) VALUES (?1, ?2)",
        params![DEMO_TEST_ID, DEMO_CHANNEL],
    )
    .map_err(transient)?;
    // Recorded end lags the real run by two steps; the event table holds
    // the truth.
    let recorded_end = DEMO_START + RUN_SECONDS - 2.0 * STEP_SECONDS;
    conn.execute(
        "INSERT INTO TestIVChList_Table \
         (test_id, IV_Ch_ID, First_Start_DateTime, Last_End_DateTime, Databases, \
          Schedule_File_Name) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            DEMO_TEST_ID,
            DEMO_CHANNEL,
            DEMO_START,
            recorded_end,
            format!("{DEMO_RESULT_DATABASE},"),
            "demo_schedule.sdu"
        ],
    )
    .map_err(transient)?;
    Ok(())
}

fn populate_result(conn: &Connection) -> StoreResult<()> {
    // Step boundaries, one tick ahead of the samples they gate. Three
    // steps per cycle, two cycles.
    let mut step_index = 0i64;
    let mut offset = 0.0;
    while offset < RUN_SECONDS {
        let cycle = 1 + (step_index / 3);
        let step = 1 + (step_index % 3);
        conn.execute(
            "INSERT INTO Event_Table \
             (Test_ID, Channel_ID, Date_Time, New_Step_ID, New_Cycle_ID) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                DEMO_TEST_ID,
                DEMO_CHANNEL,
                time::to_tick(DEMO_START + offset) - 1,
                step,
                cycle
            ],
        )
        .map_err(transient)?;
        step_index += 1;
        offset += STEP_SECONDS;
    }

    // Raw current/voltage/charge-capacity every 10 s. Codes follow the
    // vendor raw table: 22 current, 21 voltage, 23 charge capacity.
    let mut t = 0.0;
    while t < RUN_SECONDS {
        let tick = time::to_tick(DEMO_START + t);
        let phase = (t / STEP_SECONDS) as i64 % 2;
        let current = if phase == 0 { 1.5 } else { -1.5 };
        let voltage = 3.2 + 0.5 * (t / RUN_SECONDS);
        let capacity = 1.1 * (t / RUN_SECONDS);
        for (code, value) in [(22, current), (21, voltage), (23, capacity)] {
            conn.execute(
                "INSERT INTO Channel_RawData_Table \
                 (channel_id, data_type, date_time, data_value) \
                 VALUES (?1, ?2, ?3, ?4)",
                params![DEMO_CHANNEL, code, tick, value],
            )
            .map_err(transient)?;
        }
        t += 10.0;
    }

    // Temperature (code 1) on a coarser cadence.
    let mut t = 0.0;
    while t < RUN_SECONDS {
        conn.execute(
            "INSERT INTO Auxiliary_Table (AuxCh_ID, data_type, date_time, data_value) \
             VALUES (?1, ?2, ?3, ?4)",
            params![
                DEMO_CHANNEL,
                1,
                time::to_tick(DEMO_START + t),
                23.0 + 2.0 * (t / RUN_SECONDS)
            ],
        )
        .map_err(transient)?;
        t += 30.0;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::SqliteStore;
    use crate::store::{CatalogQuery, ChannelQuery, Connect};

    #[test]
    fn test_generated_dataset_is_queryable() {
        let dir = tempfile::tempdir().unwrap();
        generate(dir.path(), "ArbinMasterData").unwrap();

        let store = SqliteStore::new(dir.path(), "ArbinMasterData");
        assert_eq!(store.test_names().unwrap(), vec![DEMO_TEST_NAME.to_string()]);
        assert_eq!(store.test_ids(DEMO_TEST_NAME).unwrap(), vec![17]);
        assert_eq!(store.channel_ids(17).unwrap(), vec![0]);

        let windows = store.channel_windows(17, 0).unwrap();
        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].databases, vec![DEMO_RESULT_DATABASE.to_string()]);

        // The event table runs past the recorded end.
        let event_tick = store
            .latest_event_tick(DEMO_RESULT_DATABASE, 17, 0)
            .unwrap()
            .unwrap();
        assert!(time::to_epoch(event_tick) > windows[0].end);

        let channel = store.open(DEMO_RESULT_DATABASE).unwrap();
        let raw = channel
            .raw_samples(0, time::to_tick(DEMO_START), i64::MAX)
            .unwrap();
        assert!(!raw.is_empty());
    }
}
