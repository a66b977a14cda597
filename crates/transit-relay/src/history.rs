//! Append-only location history.
//!
//! Accepted updates are handed to a [`HistorySink`] on a spawned task; the
//! relay never waits for the write. Failures are logged and counted.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::counter;
use parking_lot::Mutex;
use rusqlite::{Connection, params};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use transit_core::{OperatorId, RouteId, SessionSnapshot, VehicleId};

use crate::errors::HistoryError;
use crate::telemetry::{HISTORY_WRITES_TOTAL, HISTORY_WRITE_FAILURES_TOTAL};

/// One row of location history.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LocationRecord {
    /// Reporting operator.
    pub operator_id: OperatorId,
    /// Vehicle.
    pub vehicle_id: VehicleId,
    /// Route.
    pub route_id: RouteId,
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
    /// Direction of travel in degrees from north.
    pub heading: Option<f64>,
    /// Ground speed as reported by the device.
    pub speed: Option<f64>,
    /// Device time of the fix.
    pub recorded_at: DateTime<Utc>,
    /// Relay time the update was accepted.
    pub received_at: DateTime<Utc>,
}

impl LocationRecord {
    /// Build a record from an accepted snapshot.
    pub fn from_snapshot(snapshot: &SessionSnapshot, received_at: DateTime<Utc>) -> Self {
        Self {
            operator_id: snapshot.operator_id.clone(),
            vehicle_id: snapshot.vehicle_id.clone(),
            route_id: snapshot.route_id.clone(),
            latitude: snapshot.latitude,
            longitude: snapshot.longitude,
            heading: snapshot.heading,
            speed: snapshot.speed,
            recorded_at: snapshot.timestamp,
            received_at,
        }
    }
}

/// Destination for accepted location updates.
#[async_trait]
pub trait HistorySink: Send + Sync {
    /// Persist one record.
    async fn record(&self, record: LocationRecord) -> Result<(), HistoryError>;
}

/// Discards every record.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopHistorySink;

#[async_trait]
impl HistorySink for NoopHistorySink {
    async fn record(&self, _record: LocationRecord) -> Result<(), HistoryError> {
        Ok(())
    }
}

/// Write `record` on a background task.
///
/// The returned handle may be dropped; failures are reported through logs
/// and the `history_write_failures_total` counter.
pub fn spawn_record(
    sink: Arc<dyn HistorySink>,
    record: LocationRecord,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let operator_id = record.operator_id.clone();
        match sink.record(record).await {
            Ok(()) => counter!(HISTORY_WRITES_TOTAL).increment(1),
            Err(e) => {
                counter!(HISTORY_WRITE_FAILURES_TOTAL).increment(1);
                warn!(operator_id = %operator_id, error = %e, "history write failed");
            }
        }
    })
}

const MIGRATION: &str = "
CREATE TABLE IF NOT EXISTS location_history (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    operator_id TEXT NOT NULL,
    vehicle_id  TEXT NOT NULL,
    route_id    TEXT NOT NULL,
    latitude    REAL NOT NULL,
    longitude   REAL NOT NULL,
    heading     REAL,
    speed       REAL,
    recorded_at TEXT NOT NULL,
    received_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_location_history_vehicle
    ON location_history(vehicle_id, recorded_at);
CREATE INDEX IF NOT EXISTS idx_location_history_route
    ON location_history(route_id, recorded_at);
";

/// `SQLite`-backed history. Writes run on the blocking pool.
#[derive(Clone)]
pub struct SqliteHistorySink {
    conn: Arc<Mutex<Connection>>,
}

impl std::fmt::Debug for SqliteHistorySink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteHistorySink").finish_non_exhaustive()
    }
}

impl SqliteHistorySink {
    /// Open (or create) the database at `path` and apply the schema.
    pub fn open(path: &Path) -> Result<Self, HistoryError> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA busy_timeout = 5000;")?;
        debug!(?path, "history database opened");
        Self::with_connection(conn)
    }

    /// In-memory database, for tests.
    pub fn in_memory() -> Result<Self, HistoryError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, HistoryError> {
        conn.execute_batch(MIGRATION)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Total rows stored.
    pub fn count(&self) -> Result<u64, HistoryError> {
        let conn = self.conn.lock();
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM location_history", [], |row| {
            row.get(0)
        })?;
        Ok(u64::try_from(n).unwrap_or(0))
    }

    /// Most recent records for a vehicle, newest first.
    pub fn recent_for_vehicle(
        &self,
        vehicle_id: &VehicleId,
        limit: usize,
    ) -> Result<Vec<LocationRecord>, HistoryError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT operator_id, vehicle_id, route_id, latitude, longitude, heading, speed,
                    recorded_at, received_at
             FROM location_history
             WHERE vehicle_id = ?1
             ORDER BY recorded_at DESC, id DESC
             LIMIT ?2",
        )?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = stmt.query_map(params![vehicle_id.as_str(), limit], row_to_record)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(HistoryError::from)
    }

    fn insert(conn: &Connection, record: &LocationRecord) -> Result<(), HistoryError> {
        let _ = conn.execute(
            "INSERT INTO location_history
                (operator_id, vehicle_id, route_id, latitude, longitude, heading, speed,
                 recorded_at, received_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                record.operator_id.as_str(),
                record.vehicle_id.as_str(),
                record.route_id.as_str(),
                record.latitude,
                record.longitude,
                record.heading,
                record.speed,
                record.recorded_at.to_rfc3339(),
                record.received_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }
}

#[async_trait]
impl HistorySink for SqliteHistorySink {
    async fn record(&self, record: LocationRecord) -> Result<(), HistoryError> {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || Self::insert(&conn.lock(), &record))
            .await
            .map_err(|e| HistoryError::Task(e.to_string()))?
    }
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<LocationRecord> {
    Ok(LocationRecord {
        operator_id: OperatorId::from_string(row.get(0)?),
        vehicle_id: VehicleId::from_string(row.get(1)?),
        route_id: RouteId::from_string(row.get(2)?),
        latitude: row.get(3)?,
        longitude: row.get(4)?,
        heading: row.get(5)?,
        speed: row.get(6)?,
        recorded_at: parse_time(&row.get::<_, String>(7)?, 7)?,
        received_at: parse_time(&row.get::<_, String>(8)?, 8)?,
    })
}

fn parse_time(value: &str, column: usize) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                column,
                rusqlite::types::Type::Text,
                Box::new(e),
            )
        })
}
