//! # SQLite Store Backend
//!
//! Implements the store contracts over the fixed Arbin schema, one SQLite
//! file per database name inside a configured directory. The master
//! catalog lives in its own file (`ArbinMasterData.sqlite` by default);
//! result databases are the numbered `ArbinResultData<N>.sqlite` chain.
//!
//! Connections are opened per request and dropped immediately after; the
//! extractor never holds a connection across test-channels. Every driver
//! failure maps to [`StoreError::Transient`] so the join pipeline's bounded
//! retry applies uniformly.

use std::path::PathBuf;

use rusqlite::types::ValueRef;
use rusqlite::Connection;

use crate::store::{
    AuxKind, AuxSample, CatalogQuery, ChannelQuery, Connect, Quantity, RawSample, StepEvent,
    StoreError, StoreResult, WindowRow,
};

/// Store backend over a directory of Arbin-schema SQLite files.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    dir: PathBuf,
    master: String,
}

/// An open handle to one result database.
#[derive(Debug)]
pub struct SqliteChannel {
    conn: Connection,
}

pub(crate) fn transient(error: rusqlite::Error) -> StoreError {
    StoreError::Transient(error.to_string())
}

impl SqliteStore {
    /// Create a backend rooted at `dir`, with `master` naming the master
    /// catalog database.
    pub fn new(dir: impl Into<PathBuf>, master: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            master: master.into(),
        }
    }

    /// Path of a named database file inside the store directory.
    #[must_use]
    pub fn database_path(&self, database: &str) -> PathBuf {
        self.dir.join(format!("{database}.sqlite"))
    }

    fn open_database(&self, database: &str) -> StoreResult<Connection> {
        let path = self.database_path(database);
        if !path.exists() {
            return Err(StoreError::Transient(format!(
                "database file not found: {}",
                path.display()
            )));
        }
        Connection::open(&path).map_err(transient)
    }

    fn open_master(&self) -> StoreResult<Connection> {
        self.open_database(&self.master)
    }
}

impl CatalogQuery for SqliteStore {
    fn test_names(&self) -> StoreResult<Vec<String>> {
        let conn = self.open_master()?;
        let mut stmt = conn
            .prepare("SELECT DISTINCT test_name FROM TestList_Table")
            .map_err(transient)?;
        let names = stmt
            .query_map([], |row| row.get(0))
            .map_err(transient)?
            .collect::<Result<Vec<String>, _>>()
            .map_err(transient)?;
        Ok(names)
    }

    fn test_ids(&self, test_name: &str) -> StoreResult<Vec<i64>> {
        let conn = self.open_master()?;
        let mut stmt = conn
            .prepare(
                "SELECT Test_ID FROM TestList_Table WHERE test_name = ?1 \
                 ORDER BY First_Start_DateTime",
            )
            .map_err(transient)?;
        let ids = stmt
            .query_map([test_name], |row| row.get(0))
            .map_err(transient)?
            .collect::<Result<Vec<i64>, _>>()
            .map_err(transient)?;
        Ok(ids)
    }

    fn channel_ids(&self, test_id: i64) -> StoreResult<Vec<i64>> {
        let conn = self.open_master()?;
        let mut stmt = conn
            .prepare("SELECT Channel_ID FROM Resume_Table WHERE test_id = ?1")
            .map_err(transient)?;
        let channels = stmt
            .query_map([test_id], |row| row.get(0))
            .map_err(transient)?
            .collect::<Result<Vec<i64>, _>>()
            .map_err(transient)?;
        Ok(channels)
    }

    fn channel_windows(&self, test_id: i64, channel: i64) -> StoreResult<Vec<WindowRow>> {
        let conn = self.open_master()?;
        let mut stmt = conn
            .prepare(
                "SELECT IV_Ch_ID, First_Start_DateTime, Last_End_DateTime, Databases \
                 FROM TestIVChList_Table \
                 WHERE test_id = ?1 AND IV_Ch_ID = ?2 \
                 ORDER BY First_Start_DateTime, IV_Ch_ID",
            )
            .map_err(transient)?;
        let rows = stmt
            .query_map([test_id, channel], |row| {
                let databases: String = row.get(3)?;
                Ok(WindowRow {
                    window_id: row.get(0)?,
                    start: row.get(1)?,
                    end: row.get(2)?,
                    databases: split_database_list(&databases),
                })
            })
            .map_err(transient)?
            .collect::<Result<Vec<WindowRow>, _>>()
            .map_err(transient)?;
        Ok(rows)
    }

    fn latest_event_tick(
        &self,
        database: &str,
        test_id: i64,
        channel: i64,
    ) -> StoreResult<Option<i64>> {
        let conn = self.open_database(database)?;
        conn.query_row(
            "SELECT MAX(Date_Time) FROM Event_Table \
             WHERE Test_ID = ?1 AND Channel_ID = ?2",
            [test_id, channel],
            |row| row.get::<_, Option<i64>>(0),
        )
        .map_err(transient)
    }

    fn channel_metadata(&self, test_id: i64, channel: i64) -> StoreResult<Vec<(String, String)>> {
        let conn = self.open_master()?;
        let mut stmt = conn
            .prepare("SELECT * FROM TestIVChList_Table WHERE test_id = ?1 AND IV_Ch_ID = ?2")
            .map_err(transient)?;
        let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();
        let mut rows = stmt.query([test_id, channel]).map_err(transient)?;
        let Some(row) = rows.next().map_err(transient)? else {
            return Ok(Vec::new());
        };
        let mut pairs = Vec::with_capacity(columns.len());
        for (i, column) in columns.iter().enumerate() {
            let value = match row.get_ref(i).map_err(transient)? {
                ValueRef::Null => String::new(),
                ValueRef::Integer(v) => v.to_string(),
                ValueRef::Real(v) => v.to_string(),
                ValueRef::Text(v) => String::from_utf8_lossy(v).into_owned(),
                ValueRef::Blob(_) => {
                    return Err(StoreError::InvalidData(format!(
                        "unexpected blob in catalog column {column}"
                    )))
                }
            };
            pairs.push((column.clone(), value));
        }
        Ok(pairs)
    }
}

impl Connect for SqliteStore {
    type Channel = SqliteChannel;

    fn open(&self, database: &str) -> StoreResult<Self::Channel> {
        Ok(SqliteChannel {
            conn: self.open_database(database)?,
        })
    }
}

impl ChannelQuery for SqliteChannel {
    fn raw_samples(
        &self,
        channel: i64,
        min_tick: i64,
        max_tick: i64,
    ) -> StoreResult<Vec<RawSample>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT data_type, date_time, data_value FROM Channel_RawData_Table \
                 WHERE channel_id = ?1 AND date_time >= ?2 AND date_time < ?3",
            )
            .map_err(transient)?;
        let samples = stmt
            .query_map([channel, min_tick, max_tick], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, f64>(2)?,
                ))
            })
            .map_err(transient)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(transient)?;
        // The instrument logs more data types than the export carries;
        // unknown codes are skipped.
        Ok(samples
            .into_iter()
            .filter_map(|(code, tick, value)| {
                Quantity::from_code(code).map(|quantity| RawSample {
                    tick,
                    quantity,
                    value,
                })
            })
            .collect())
    }

    fn step_events(
        &self,
        channel: i64,
        min_tick: i64,
        max_tick: i64,
    ) -> StoreResult<Vec<StepEvent>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT date_time, New_Step_ID, New_Cycle_ID FROM Event_Table \
                 WHERE Channel_ID = ?1 AND date_time >= ?2 AND date_time < ?3",
            )
            .map_err(transient)?;
        let events = stmt
            .query_map([channel, min_tick, max_tick], |row| {
                Ok(StepEvent {
                    tick: row.get(0)?,
                    step_index: row.get(1)?,
                    cycle_index: row.get(2)?,
                })
            })
            .map_err(transient)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(transient)?;
        Ok(events)
    }

    fn aux_samples(
        &self,
        channel: i64,
        min_tick: i64,
        max_tick: i64,
    ) -> StoreResult<Vec<AuxSample>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT data_type, date_time, data_value FROM Auxiliary_Table \
                 WHERE AuxCh_ID = ?1 AND date_time >= ?2 AND date_time < ?3",
            )
            .map_err(transient)?;
        let samples = stmt
            .query_map([channel, min_tick, max_tick], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, f64>(2)?,
                ))
            })
            .map_err(transient)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(transient)?;
        Ok(samples
            .into_iter()
            .filter_map(|(code, tick, value)| {
                AuxKind::from_code(code).map(|kind| AuxSample { tick, kind, value })
            })
            .collect())
    }
}

fn split_database_list(list: &str) -> Vec<String> {
    // The catalog stores the chain comma-joined with a trailing comma.
    list.split(',')
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_database_list_drops_trailing_comma() {
        assert_eq!(
            split_database_list("ArbinResultData1,ArbinResultData2,"),
            vec!["ArbinResultData1", "ArbinResultData2"]
        );
        assert!(split_database_list("").is_empty());
    }

    #[test]
    fn test_missing_database_file_is_transient() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::new(dir.path(), "ArbinMasterData");
        let error = store.test_names().unwrap_err();
        assert!(matches!(error, StoreError::Transient(_)));
    }
}
