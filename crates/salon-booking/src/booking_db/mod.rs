//! Booking database module - SQLite-backed storage for services, slots, appointments and knowledge documents
pub mod appointment_store;
pub mod document_store;
pub mod migration;
pub mod schema;
pub mod service_store;
pub mod slot_store;

pub use appointment_store::AppointmentStore;
pub use document_store::DocumentStore;
pub use migration::MigrationManager;
pub use schema::*;
pub use service_store::ServiceStore;
pub use slot_store::SlotStore;

use chrono::NaiveDate;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::functions::FunctionFlags;
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::{BookingError, BookingResult};

pub type DbPool = Arc<Pool<SqliteConnectionManager>>;

/// Runs on every pooled connection. Pragmas here are per-connection in SQLite.
fn configure_connection(conn: &mut Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "PRAGMA foreign_keys = ON;
         PRAGMA busy_timeout = 5000;",
    )?;
    // SQLite's LOWER() only folds ASCII.
    conn.create_scalar_function(
        "casefold",
        1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| Ok(ctx.get::<Option<String>>(0)?.map(|s| s.to_lowercase())),
    )
}

pub struct BookingDatabase {
    pub services: ServiceStore,
    pub slots: SlotStore,
    pub appointments: AppointmentStore,
    pub documents: DocumentStore,
    pool: DbPool,
}

impl BookingDatabase {
    /// Open (or create) the database file and apply pending migrations.
    pub fn new(db_path: &Path) -> anyhow::Result<Self> {
        Self::with_pool_size(db_path, 10)
    }

    pub fn with_pool_size(db_path: &Path, max_size: u32) -> anyhow::Result<Self> {
        info!("Opening booking database at: {}", db_path.display());
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let manager = SqliteConnectionManager::file(db_path)
            .with_flags(
                rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                    | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                    | rusqlite::OpenFlags::SQLITE_OPEN_FULL_MUTEX,
            )
            .with_init(configure_connection);
        let pool = Pool::builder()
            .max_size(max_size)
            .build(manager)
            .map_err(|e| anyhow::anyhow!("Failed to create connection pool: {}", e))?;

        {
            let mut conn = pool.get()?;
            conn.execute_batch(
                "PRAGMA journal_mode = WAL;
                 PRAGMA synchronous = NORMAL;",
            )?;
            MigrationManager::new(&mut conn).initialize_database()?;
        }

        info!("Booking database initialized successfully");
        Ok(Self::from_pool(Arc::new(pool)))
    }

    /// A private in-memory database.
    ///
    /// Every `:memory:` connection is its own database, so the pool holds exactly one.
    /// Callers must not keep a connection checked out across store calls.
    pub fn new_in_memory() -> anyhow::Result<Self> {
        let manager = SqliteConnectionManager::memory().with_init(configure_connection);
        let pool = Pool::builder().max_size(1).build(manager)?;
        {
            let mut conn = pool.get()?;
            MigrationManager::new(&mut conn).initialize_database()?;
        }
        Ok(Self::from_pool(Arc::new(pool)))
    }

    fn from_pool(pool: DbPool) -> Self {
        Self {
            services: ServiceStore::new(Arc::clone(&pool)),
            slots: SlotStore::new(Arc::clone(&pool)),
            appointments: AppointmentStore::new(Arc::clone(&pool)),
            documents: DocumentStore::new(Arc::clone(&pool)),
            pool,
        }
    }

    fn get_conn(&self) -> BookingResult<r2d2::PooledConnection<SqliteConnectionManager>> {
        Ok(self.pool.get()?)
    }

    pub fn stats(&self) -> BookingResult<DatabaseStats> {
        let conn = self.get_conn()?;
        Ok(migration::get_database_stats(&conn)?)
    }

    /// Totals and rates (percent) across all appointments, plus bookings on `today`.
    pub fn dashboard_summary(&self, today: NaiveDate) -> BookingResult<DashboardSummary> {
        let conn = self.get_conn()?;
        let (total, completed, cancelled): (i64, i64, i64) = conn.query_row(
            "SELECT COUNT(*),
                    COALESCE(SUM(CASE WHEN status = 'completed' THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(CASE WHEN status = 'cancelled' THEN 1 ELSE 0 END), 0)
             FROM appointments",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?;
        let todays_bookings: i64 = conn.query_row(
            "SELECT COUNT(*) FROM appointments a
             JOIN time_slots t ON t.id = a.time_slot_id
             WHERE t.date = ?1",
            [format_date(today)],
            |row| row.get(0),
        )?;

        let rate = |part: i64| {
            if total > 0 {
                part as f64 / total as f64 * 100.0
            } else {
                0.0
            }
        };
        Ok(DashboardSummary {
            total_bookings: total,
            completion_rate: rate(completed),
            todays_bookings,
            cancellation_rate: rate(cancelled),
        })
    }

    /// Most recently created appointments first.
    pub fn recent_bookings(&self, limit: usize) -> BookingResult<Vec<RecentBooking>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT a.id, a.customer_name, s.name, t.date, t.start_time, a.status
             FROM appointments a
             JOIN services s ON s.id = a.service_id
             JOIN time_slots t ON t.id = a.time_slot_id
             ORDER BY a.created_at DESC, a.id DESC
             LIMIT ?1",
        )?;
        let rows = stmt.query_map([limit as i64], |row| {
            Ok(RecentBooking {
                id: row.get(0)?,
                customer_name: row.get(1)?,
                service: RecentBookingService { name: row.get(2)? },
                time_slot: RecentBookingSlot {
                    date: date_col(row, 3)?,
                    start_time: row.get(4)?,
                },
                status: appointment_status_col(row, 5)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Per-day totals for slot dates in `[start, end]`. Revenue counts completed visits only.
    pub fn daily_analytics(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> BookingResult<Vec<DailyAnalytics>> {
        if start > end {
            return Err(BookingError::invalid(format!(
                "start date {} is after end date {}",
                start, end
            )));
        }
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT t.date,
                    COUNT(a.id),
                    SUM(CASE WHEN a.status = 'completed' THEN 1 ELSE 0 END),
                    SUM(CASE WHEN a.status = 'cancelled' THEN 1 ELSE 0 END),
                    SUM(CASE WHEN a.status = 'completed' THEN s.price ELSE 0.0 END),
                    AVG(s.duration_minutes)
             FROM appointments a
             JOIN time_slots t ON t.id = a.time_slot_id
             JOIN services s ON s.id = a.service_id
             WHERE t.date BETWEEN ?1 AND ?2
             GROUP BY t.date
             ORDER BY t.date",
        )?;
        let rows = stmt.query_map(params![format_date(start), format_date(end)], |row| {
            Ok(DailyAnalytics {
                date: date_col(row, 0)?,
                total_bookings: row.get(1)?,
                completed_bookings: row.get(2)?,
                cancelled_bookings: row.get(3)?,
                total_revenue: row.get::<_, Option<f64>>(4)?.unwrap_or(0.0),
                avg_service_duration: row.get::<_, Option<f64>>(5)?.unwrap_or(0.0),
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}

impl Drop for BookingDatabase {
    fn drop(&mut self) {
        if let Ok(conn) = self.pool.get() {
            if let Err(e) = conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);") {
                warn!("WAL checkpoint on shutdown failed: {}", e);
            }
        }
    }
}
