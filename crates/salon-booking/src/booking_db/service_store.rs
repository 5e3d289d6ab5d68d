use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use std::sync::Arc;
use tracing::info;

use crate::booking_db::schema::*;
use crate::error::{BookingError, BookingResult};

pub(crate) const SERVICE_COLUMNS: &str =
    "id, name, description, duration_minutes, price, is_active, created_at, updated_at";

/// Map eight service columns starting at `offset`.
pub(crate) fn service_from_row(row: &Row, offset: usize) -> rusqlite::Result<Service> {
    Ok(Service {
        id: row.get(offset)?,
        name: row.get(offset + 1)?,
        description: row.get(offset + 2)?,
        duration_minutes: row.get(offset + 3)?,
        price: row.get(offset + 4)?,
        is_active: row.get(offset + 5)?,
        created_at: timestamp_col(row, offset + 6)?,
        updated_at: timestamp_col(row, offset + 7)?,
    })
}

pub(crate) fn fetch_service(conn: &Connection, id: i64) -> rusqlite::Result<Option<Service>> {
    conn.query_row(
        &format!("SELECT {} FROM services WHERE id = ?1", SERVICE_COLUMNS),
        [id],
        |row| service_from_row(row, 0),
    )
    .optional()
}

pub(crate) fn service_not_found(id: i64) -> BookingError {
    BookingError::not_found(format!("Service with ID {} not found.", id))
}

fn validate_fields(name: Option<&str>, duration: Option<i64>, price: Option<f64>) -> BookingResult<()> {
    if matches!(name, Some(n) if n.trim().is_empty()) {
        return Err(BookingError::invalid("Service name must not be empty"));
    }
    if matches!(duration, Some(d) if d <= 0) {
        return Err(BookingError::invalid("Service duration must be a positive number of minutes"));
    }
    if matches!(price, Some(p) if !(p >= 0.0 && p.is_finite())) {
        return Err(BookingError::invalid("Service price must not be negative"));
    }
    Ok(())
}

/// Catalog of bookable services. Services are deactivated, never deleted.
pub struct ServiceStore {
    pool: Arc<Pool<SqliteConnectionManager>>,
}

impl ServiceStore {
    pub fn new(pool: Arc<Pool<SqliteConnectionManager>>) -> Self {
        Self { pool }
    }

    fn get_conn(&self) -> BookingResult<r2d2::PooledConnection<SqliteConnectionManager>> {
        Ok(self.pool.get()?)
    }

    pub fn create(&self, new: NewService) -> BookingResult<Service> {
        validate_fields(Some(&new.name), Some(new.duration_minutes), Some(new.price))?;
        let conn = self.get_conn()?;
        let now = now_timestamp();
        conn.execute(
            "INSERT INTO services (name, description, duration_minutes, price, is_active, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, 1, ?5, ?5)",
            params![new.name.trim(), new.description, new.duration_minutes, new.price, now],
        )?;
        let id = conn.last_insert_rowid();
        info!("Created service {} ({})", id, new.name.trim());

        fetch_service(&conn, id)?.ok_or_else(|| service_not_found(id))
    }

    pub fn get(&self, id: i64) -> BookingResult<Service> {
        let conn = self.get_conn()?;
        fetch_service(&conn, id)?.ok_or_else(|| service_not_found(id))
    }

    /// Services ordered by id; inactive ones only when asked for.
    pub fn list(&self, include_inactive: bool) -> BookingResult<Vec<Service>> {
        let conn = self.get_conn()?;
        let sql = if include_inactive {
            format!("SELECT {} FROM services ORDER BY id", SERVICE_COLUMNS)
        } else {
            format!("SELECT {} FROM services WHERE is_active = 1 ORDER BY id", SERVICE_COLUMNS)
        };
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([], |row| service_from_row(row, 0))?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn count(&self) -> BookingResult<i64> {
        let conn = self.get_conn()?;
        Ok(conn.query_row("SELECT COUNT(*) FROM services", [], |row| row.get(0))?)
    }

    /// Apply a partial edit.
    ///
    /// Name and duration are frozen once any appointment references the service;
    /// changing either then fails with `Conflict`. Price, description and the active
    /// flag can always change.
    pub fn update(&self, id: i64, update: ServiceUpdate) -> BookingResult<Service> {
        validate_fields(update.name.as_deref(), update.duration_minutes, update.price)?;

        let mut conn = self.get_conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let current = fetch_service(&tx, id)?.ok_or_else(|| service_not_found(id))?;

        let name = update
            .name
            .as_deref()
            .map(str::trim)
            .unwrap_or(&current.name)
            .to_string();
        let duration = update.duration_minutes.unwrap_or(current.duration_minutes);

        if name != current.name || duration != current.duration_minutes {
            let referenced: i64 = tx.query_row(
                "SELECT COUNT(*) FROM appointments WHERE service_id = ?1",
                [id],
                |row| row.get(0),
            )?;
            if referenced > 0 {
                return Err(BookingError::conflict(
                    "Service name and duration cannot change once appointments reference it",
                ));
            }
        }

        tx.execute(
            "UPDATE services
             SET name = ?1, description = ?2, duration_minutes = ?3, price = ?4, is_active = ?5, updated_at = ?6
             WHERE id = ?7",
            params![
                name,
                update.description.or(current.description),
                duration,
                update.price.unwrap_or(current.price),
                update.is_active.unwrap_or(current.is_active),
                now_timestamp(),
                id,
            ],
        )?;
        let updated = fetch_service(&tx, id)?.ok_or_else(|| service_not_found(id))?;
        tx.commit()?;
        Ok(updated)
    }

    /// Soft delete. Existing appointments keep their reference.
    pub fn deactivate(&self, id: i64) -> BookingResult<Service> {
        self.update(
            id,
            ServiceUpdate {
                is_active: Some(false),
                ..Default::default()
            },
        )
    }
}
