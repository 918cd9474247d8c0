//! # CSV Export Writer
//!
//! Writes the unified per-channel table and its metadata companion in the
//! vendor export layout: one `<display_name>.csv` with the standardized
//! column set, one `<display_name>_Metadata.csv` carrying the full catalog
//! row for the test/channel.

use std::path::Path;

use csv::WriterBuilder;

use crate::join::UnifiedRecord;

/// Errors that can occur while writing CSV exports
#[derive(Debug, thiserror::Error)]
pub enum CsvError {
    /// I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// CSV serialization error
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
}

/// Column headers of the unified table, in output order.
pub const HEADERS: [&str; 19] = [
    "Data_Point",
    "Test_Time",
    "DateTime",
    "Step_Time",
    "Step_Index",
    "Cycle_Index",
    "Current",
    "Voltage",
    "Charge_Capacity",
    "Discharge_Capacity",
    "Charge_Energy",
    "Discharge_Energy",
    "dV/dt",
    "Internal_Resistance",
    "Temperature",
    "Aux_Voltage",
    "AC_Impedance",
    "Is_FC_Data",
    "ACI_Phase_Angle",
];

/// Write the unified table. An empty table still writes the header row, so
/// a channel with no qualifying data produces a well-formed (empty) export.
pub fn write_records(path: &Path, records: &[UnifiedRecord]) -> Result<(), CsvError> {
    let mut writer = WriterBuilder::new().has_headers(false).from_path(path)?;
    writer.write_record(HEADERS)?;
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;
    Ok(())
}

/// Write the metadata companion: one header row of catalog column names
/// and one row of values.
pub fn write_metadata(path: &Path, row: &[(String, String)]) -> Result<(), CsvError> {
    let mut writer = WriterBuilder::new().has_headers(false).from_path(path)?;
    writer.write_record(row.iter().map(|(column, _)| column.as_str()))?;
    writer.write_record(row.iter().map(|(_, value)| value.as_str()))?;
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(data_point: u64) -> UnifiedRecord {
        UnifiedRecord {
            data_point,
            test_time: 1.5,
            date_time: 1_514_764_800.5,
            step_time: 1.5,
            step_index: 1,
            cycle_index: 1,
            current: Some(1.25),
            voltage: Some(3.7),
            charge_capacity: None,
            discharge_capacity: None,
            charge_energy: None,
            discharge_energy: None,
            dv_dt: None,
            internal_resistance: None,
            temperature: Some(25.0),
            aux_voltage: None,
            ac_impedance: 0.0,
            is_fc_data: 0,
            aci_phase_angle: 0.0,
        }
    }

    #[test]
    fn test_empty_table_still_writes_headers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cells_ch1.csv");
        write_records(&path, &[]).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next().unwrap(), HEADERS.join(","));
        assert_eq!(lines.next(), None);
    }

    #[test]
    fn test_record_serialization_matches_headers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cells_ch1.csv");
        write_records(&path, &[record(0), record(1)]).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        let first: Vec<&str> = lines[1].split(',').collect();
        assert_eq!(first.len(), HEADERS.len());
        assert_eq!(first[0], "0");
        // Missing quantities serialize as empty cells.
        assert_eq!(first[8], "");
        // Placeholder columns are literal zeros.
        assert_eq!(first[16], "0.0");
        assert_eq!(first[17], "0");
    }

    #[test]
    fn test_metadata_layout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cells_ch1_Metadata.csv");
        let row = vec![
            ("Test_ID".to_string(), "17".to_string()),
            ("Schedule_File_Name".to_string(), "rate_study.sdu".to_string()),
        ];
        write_metadata(&path, &row).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "Test_ID,Schedule_File_Name");
        assert_eq!(lines[1], "17,rate_study.sdu");
    }
}
