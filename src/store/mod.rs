//! # Durable Reading Store
//!
//! Append-only SQLite storage of decoded readings, keyed by acquisition
//! timestamp.
//!
//! The store outlives any single device session: it is opened once at
//! startup and shared (via `Arc`) between the session and the export
//! service. Each operation is an independent transaction; there is no
//! cross-operation transaction.

use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use tracing::info;

use crate::atorch::protocol::DcReport;
use crate::error::Result;

/// Schema of the single readings table
///
/// `timestamp` is the primary key: a colliding key fails the insert loudly
/// instead of silently overwriting an existing reading.
const CREATE_READINGS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS readings (
    timestamp     INTEGER PRIMARY KEY,
    voltage_mv    INTEGER NOT NULL,
    current_ma    INTEGER NOT NULL,
    energy_wh     INTEGER NOT NULL,
    power_w       INTEGER NOT NULL,
    fee_centi     INTEGER NOT NULL,
    temperature_c INTEGER NOT NULL,
    duration_s    INTEGER NOT NULL
)
"#;

/// One persisted telemetry sample
///
/// A decoded [`DcReport`] stamped with the acquisition timestamp assigned at
/// the moment of successful decode. The timestamp is the store's unique key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::FromRow)]
pub struct Reading {
    /// Acquisition timestamp in milliseconds since the Unix epoch
    #[sqlx(rename = "timestamp")]
    pub timestamp_ms: i64,

    /// Voltage in millivolts
    pub voltage_mv: u32,

    /// Current in milliamps
    pub current_ma: u32,

    /// Accumulated energy in watt-hours
    pub energy_wh: u32,

    /// Instantaneous power in watts
    pub power_w: u32,

    /// Accumulated fee in hundredths of the device currency
    pub fee_centi: u32,

    /// Temperature in degrees Celsius
    pub temperature_c: i32,

    /// Elapsed meter session duration in seconds
    pub duration_s: u32,
}

impl Reading {
    /// Stamp a decoded report with its acquisition timestamp
    pub fn from_report(report: &DcReport, timestamp_ms: i64) -> Self {
        Self {
            timestamp_ms,
            voltage_mv: report.voltage_mv,
            current_ma: report.current_ma,
            energy_wh: report.energy_wh,
            power_w: report.power_w,
            fee_centi: report.fee_centi,
            temperature_c: report.temperature_c,
            duration_s: report.duration_s,
        }
    }
}

/// Timestamp-keyed durable store of readings
#[derive(Clone)]
pub struct ReadingStore {
    pool: SqlitePool,
}

impl ReadingStore {
    /// Open the store, creating the readings table on first use
    ///
    /// # Arguments
    ///
    /// * `url` - SQLite connection URL, e.g. `sqlite://meter_log.db?mode=rwc`
    ///   or `sqlite::memory:` for tests
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::AtorchLoggerError::Store`] if the database
    /// cannot be opened or the schema cannot be created.
    pub async fn open(url: &str) -> Result<Self> {
        // An in-memory database lives inside its connection; a pool of one
        // keeps every operation on the same database. The write workload is
        // a single session appending sequentially, so one connection is
        // enough for file-backed stores too.
        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(1)
            .connect(url)
            .await?;

        sqlx::query(CREATE_READINGS_TABLE).execute(&pool).await?;

        info!("Reading store opened at {}", url);
        Ok(Self { pool })
    }

    /// Append one reading as a single durable transaction
    ///
    /// # Errors
    ///
    /// Fails on storage errors and on a timestamp key collision; an existing
    /// reading is never overwritten.
    pub async fn append(&self, reading: &Reading) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO readings
                (timestamp, voltage_mv, current_ma, energy_wh, power_w, fee_centi, temperature_c, duration_s)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(reading.timestamp_ms)
        .bind(reading.voltage_mv)
        .bind(reading.current_ma)
        .bind(reading.energy_wh)
        .bind(reading.power_w)
        .bind(reading.fee_centi)
        .bind(reading.temperature_c)
        .bind(reading.duration_s)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Full scan of every stored reading
    ///
    /// The returned order is unspecified; callers that need chronological
    /// order sort by timestamp themselves (see [`crate::export`]).
    pub async fn get_all(&self) -> Result<Vec<Reading>> {
        let readings: Vec<Reading> = sqlx::query_as("SELECT * FROM readings")
            .fetch_all(&self.pool)
            .await?;

        Ok(readings)
    }

    /// Delete every stored reading
    ///
    /// Destructive and irreversible. Confirmation is the caller's concern;
    /// the store performs the operation unconditionally.
    pub async fn clear(&self) -> Result<()> {
        sqlx::query("DELETE FROM readings").execute(&self.pool).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_reading(timestamp_ms: i64) -> Reading {
        Reading {
            timestamp_ms,
            voltage_mv: 12_400,
            current_ma: 2_500,
            energy_wh: 1_230,
            power_w: 31,
            fee_centi: 45,
            temperature_c: 28,
            duration_s: 3_723,
        }
    }

    async fn memory_store() -> ReadingStore {
        ReadingStore::open("sqlite::memory:").await.unwrap()
    }

    #[tokio::test]
    async fn test_append_then_get_all_round_trips() {
        let store = memory_store().await;
        let reading = sample_reading(1_700_000_000_000);

        store.append(&reading).await.unwrap();
        let all = store.get_all().await.unwrap();

        assert_eq!(all.len(), 1);
        assert_eq!(all[0], reading);
    }

    #[tokio::test]
    async fn test_append_preserves_every_field() {
        let store = memory_store().await;
        let reading = Reading {
            timestamp_ms: 42,
            voltage_mv: 1,
            current_ma: 2,
            energy_wh: 3,
            power_w: 4,
            fee_centi: 5,
            temperature_c: -6,
            duration_s: 7,
        };

        store.append(&reading).await.unwrap();
        assert_eq!(store.get_all().await.unwrap(), vec![reading]);
    }

    #[tokio::test]
    async fn test_duplicate_timestamp_fails_loudly() {
        let store = memory_store().await;
        let reading = sample_reading(1_700_000_000_000);

        store.append(&reading).await.unwrap();
        let second = store.append(&reading).await;
        assert!(second.is_err(), "Key collision must not silently overwrite");

        // The original reading is untouched
        assert_eq!(store.get_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_clear_empties_the_store() {
        let store = memory_store().await;
        for i in 0..5 {
            store.append(&sample_reading(1_000 + i)).await.unwrap();
        }

        store.clear().await.unwrap();
        assert!(store.get_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_clear_on_empty_store_is_ok() {
        let store = memory_store().await;
        store.clear().await.unwrap();
        assert!(store.get_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_file_backed_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!(
            "sqlite://{}?mode=rwc",
            dir.path().join("readings.db").display()
        );

        {
            let store = ReadingStore::open(&url).await.unwrap();
            store.append(&sample_reading(123)).await.unwrap();
        }

        let reopened = ReadingStore::open(&url).await.unwrap();
        let all = reopened.get_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].timestamp_ms, 123);
    }

    #[tokio::test]
    async fn test_from_report_copies_measurement_fields() {
        let report = DcReport {
            voltage_mv: 5_000,
            current_ma: 1_000,
            capacity_centi_ah: 10,
            energy_wh: 50,
            power_w: 5,
            fee_centi: 1,
            temperature_c: 21,
            duration_s: 60,
            backlight: 3,
        };

        let reading = Reading::from_report(&report, 999);
        assert_eq!(reading.timestamp_ms, 999);
        assert_eq!(reading.voltage_mv, 5_000);
        assert_eq!(reading.power_w, 5);
        assert_eq!(reading.duration_s, 60);
    }
}
