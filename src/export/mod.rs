//! # Export Service
//!
//! Renders the full reading history as CSV text.
//!
//! Column order is part of the external contract:
//! `timestamp,voltage,current,energy,power,fee,temperature,duration`.
//! Timestamps render in the process's local zone with whole-second
//! precision; sub-second information and the acquisition-time zone are lost
//! in the text form (the store keeps full precision).

use chrono::{Local, TimeZone};

use crate::error::{AtorchLoggerError, Result};
use crate::store::ReadingStore;

/// CSV header line naming the fixed column order
pub const CSV_HEADER: &str = "timestamp,voltage,current,energy,power,fee,temperature,duration";

/// Export every stored reading as CSV text
///
/// Reads the full store, sorts ascending by acquisition timestamp, and
/// renders one line per reading under a header line. Numeric fields are
/// plain decimals in the units the store holds (mV, mA, Wh, W, centi-fee,
/// degrees C, seconds).
///
/// # Errors
///
/// A store read failure propagates as [`AtorchLoggerError::Export`]; no
/// partial text is produced.
pub async fn export_csv(store: &ReadingStore) -> Result<String> {
    let mut readings = store
        .get_all()
        .await
        .map_err(|e| AtorchLoggerError::Export(format!("Store read failed: {}", e)))?;

    readings.sort_by_key(|r| r.timestamp_ms);

    let mut text = String::with_capacity(CSV_HEADER.len() + readings.len() * 64);
    text.push_str(CSV_HEADER);
    text.push('\n');

    for reading in &readings {
        let row = format!(
            "{},{},{},{},{},{},{},{}\n",
            format_timestamp(reading.timestamp_ms)?,
            reading.voltage_mv,
            reading.current_ma,
            reading.energy_wh,
            reading.power_w,
            reading.fee_centi,
            reading.temperature_c,
            reading.duration_s,
        );
        text.push_str(&row);
    }

    Ok(text)
}

/// Render an epoch-milliseconds timestamp as a local-time display string
///
/// `YYYY-MM-DD HH:MM:SS`, in the zone the process runs in at export time,
/// not the zone of acquisition.
pub fn format_timestamp(timestamp_ms: i64) -> Result<String> {
    let datetime = Local
        .timestamp_millis_opt(timestamp_ms)
        .single()
        .ok_or_else(|| {
            AtorchLoggerError::Export(format!("Timestamp {} out of range", timestamp_ms))
        })?;

    Ok(datetime.format("%Y-%m-%d %H:%M:%S").to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Reading;
    use chrono::NaiveDateTime;

    fn reading(timestamp_ms: i64, voltage_mv: u32) -> Reading {
        Reading {
            timestamp_ms,
            voltage_mv,
            current_ma: 2_500,
            energy_wh: 1_230,
            power_w: 31,
            fee_centi: 45,
            temperature_c: 28,
            duration_s: 3_723,
        }
    }

    async fn store_with(readings: &[Reading]) -> ReadingStore {
        let store = ReadingStore::open("sqlite::memory:").await.unwrap();
        for reading in readings {
            store.append(reading).await.unwrap();
        }
        store
    }

    #[tokio::test]
    async fn test_empty_store_exports_header_only() {
        let store = store_with(&[]).await;
        let text = export_csv(&store).await.unwrap();
        assert_eq!(text, format!("{}\n", CSV_HEADER));
    }

    #[tokio::test]
    async fn test_rows_are_sorted_by_timestamp() {
        // Inserted out of chronological order on purpose
        let t1 = 1_700_000_001_000;
        let t2 = 1_700_000_002_000;
        let t3 = 1_700_000_003_000;
        let store = store_with(&[reading(t2, 200), reading(t3, 300), reading(t1, 100)]).await;

        let text = export_csv(&store).await.unwrap();
        let rows: Vec<&str> = text.lines().skip(1).collect();
        assert_eq!(rows.len(), 3);

        let voltages: Vec<&str> = rows
            .iter()
            .map(|row| row.split(',').nth(1).unwrap())
            .collect();
        assert_eq!(voltages, vec!["100", "200", "300"]);
    }

    #[tokio::test]
    async fn test_row_renders_every_field_as_plain_decimal() {
        let store = store_with(&[reading(1_700_000_000_000, 12_400)]).await;

        let text = export_csv(&store).await.unwrap();
        let row = text.lines().nth(1).unwrap();
        let columns: Vec<&str> = row.split(',').collect();
        assert_eq!(columns.len(), 8);

        assert_eq!(columns[1], "12400");
        assert_eq!(columns[2], "2500");
        assert_eq!(columns[3], "1230");
        assert_eq!(columns[4], "31");
        assert_eq!(columns[5], "45");
        assert_eq!(columns[6], "28");
        assert_eq!(columns[7], "3723");

        // Timestamp column parses back as a whole-second local datetime
        let parsed = NaiveDateTime::parse_from_str(columns[0], "%Y-%m-%d %H:%M:%S");
        assert!(parsed.is_ok(), "Unparsable timestamp column: {}", columns[0]);
    }

    #[test]
    fn test_format_timestamp_truncates_subsecond_precision() {
        // Two instants inside the same second render identically
        let base = 1_700_000_000_000;
        assert_eq!(
            format_timestamp(base + 1).unwrap(),
            format_timestamp(base + 999).unwrap()
        );
    }

    #[test]
    fn test_format_timestamp_out_of_range_fails() {
        assert!(format_timestamp(i64::MAX).is_err());
    }

    #[test]
    fn test_header_column_order() {
        assert_eq!(
            CSV_HEADER,
            "timestamp,voltage,current,energy,power,fee,temperature,duration"
        );
    }
}
