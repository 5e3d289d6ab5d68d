//! Appointment lifecycle with its slot side effects.
//!
//! Every write here runs in a single `BEGIN IMMEDIATE` transaction that touches the
//! appointment row and its slot together, so `time_slots.is_available` is false exactly
//! when a non-cancelled appointment references the slot.

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row, TransactionBehavior};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::booking_db::schema::*;
use crate::booking_db::service_store::{
    fetch_service, service_from_row, service_not_found, SERVICE_COLUMNS,
};
use crate::booking_db::slot_store::{
    claim_slot, fetch_slot, release_slot, slot_from_row, slot_not_found, SLOT_COLUMNS,
};
use crate::error::{BookingError, BookingResult};
use crate::scheduling::{slot_effect, AppointmentStatus, SlotEffect, TransitionPolicy};

const APPOINTMENT_COLUMNS: &str = "id, customer_name, customer_phone, customer_email, service_id, \
     time_slot_id, notes, status, created_at, updated_at";

const SLOT_TAKEN: &str = "This time slot is no longer available.";

fn prefixed(columns: &str, alias: &str) -> String {
    columns
        .split(',')
        .map(|c| format!("{}.{}", alias, c.trim()))
        .collect::<Vec<_>>()
        .join(", ")
}

/// `SELECT` of appointment, service and slot columns, followed by `tail`.
fn detail_sql(tail: &str) -> String {
    format!(
        "SELECT {}, {}, {}
         FROM appointments a
         JOIN services s ON s.id = a.service_id
         JOIN time_slots t ON t.id = a.time_slot_id
         {}",
        prefixed(APPOINTMENT_COLUMNS, "a"),
        prefixed(SERVICE_COLUMNS, "s"),
        prefixed(SLOT_COLUMNS, "t"),
        tail
    )
}

fn detail_from_row(row: &Row) -> rusqlite::Result<AppointmentDetail> {
    let appointment = Appointment {
        id: row.get(0)?,
        customer_name: row.get(1)?,
        customer_phone: row.get(2)?,
        customer_email: row.get(3)?,
        service_id: row.get(4)?,
        time_slot_id: row.get(5)?,
        notes: row.get(6)?,
        status: appointment_status_col(row, 7)?,
        created_at: timestamp_col(row, 8)?,
        updated_at: timestamp_col(row, 9)?,
    };
    Ok(AppointmentDetail {
        appointment,
        service: service_from_row(row, 10)?,
        time_slot: slot_from_row(row, 18)?,
    })
}

fn fetch_detail(conn: &Connection, id: i64) -> rusqlite::Result<Option<AppointmentDetail>> {
    conn.query_row(&detail_sql("WHERE a.id = ?1"), [id], detail_from_row)
        .optional()
}

fn required_detail(conn: &Connection, id: i64) -> BookingResult<AppointmentDetail> {
    fetch_detail(conn, id)?
        .ok_or_else(|| BookingError::not_found(format!("Appointment with ID {} not found.", id)))
}

/// The partial unique index on active appointments reports a lost race as a constraint error.
fn constraint_as_conflict(err: rusqlite::Error) -> BookingError {
    match &err {
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation => {
            warn!("Active-appointment constraint rejected write: {}", err);
            BookingError::conflict(SLOT_TAKEN)
        }
        _ => BookingError::Database(err),
    }
}

fn non_blank(value: &str, field: &str) -> BookingResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(BookingError::invalid(format!("{} must not be empty", field)));
    }
    Ok(trimmed.to_string())
}

fn optional_text(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub struct AppointmentStore {
    pool: Arc<Pool<SqliteConnectionManager>>,
}

impl AppointmentStore {
    pub fn new(pool: Arc<Pool<SqliteConnectionManager>>) -> Self {
        Self { pool }
    }

    fn get_conn(&self) -> BookingResult<r2d2::PooledConnection<SqliteConnectionManager>> {
        Ok(self.pool.get()?)
    }

    /// Book a slot for a customer.
    ///
    /// The slot is claimed with a compare-and-set inside the transaction, so of several
    /// concurrent attempts on one slot exactly one succeeds and the rest get `Conflict`.
    pub fn book(&self, new: NewAppointment) -> BookingResult<AppointmentDetail> {
        let customer_name = non_blank(&new.customer_name, "Customer name")?;
        let customer_phone = non_blank(&new.customer_phone, "Customer phone")?;

        let mut conn = self.get_conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let service =
            fetch_service(&tx, new.service_id)?.ok_or_else(|| service_not_found(new.service_id))?;
        if !service.is_active {
            return Err(BookingError::invalid(format!(
                "Service '{}' is no longer offered",
                service.name
            )));
        }
        fetch_slot(&tx, new.time_slot_id)?.ok_or_else(|| slot_not_found(new.time_slot_id))?;
        if !claim_slot(&tx, new.time_slot_id)? {
            debug!("Slot {} already taken", new.time_slot_id);
            return Err(BookingError::conflict(SLOT_TAKEN));
        }

        let now = now_timestamp();
        tx.execute(
            "INSERT INTO appointments
             (customer_name, customer_phone, customer_email, service_id, time_slot_id, notes, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
            params![
                customer_name,
                customer_phone,
                optional_text(new.customer_email),
                new.service_id,
                new.time_slot_id,
                optional_text(new.notes),
                AppointmentStatus::Scheduled.as_str(),
                now,
            ],
        )
        .map_err(constraint_as_conflict)?;
        let id = tx.last_insert_rowid();
        let detail = required_detail(&tx, id)?;
        tx.commit()?;

        info!(
            "Booked appointment {} for slot {} ({})",
            id, new.time_slot_id, service.name
        );
        Ok(detail)
    }

    /// Cancel and free the slot. Cancelling twice changes nothing the second time.
    pub fn cancel(&self, id: i64) -> BookingResult<AppointmentDetail> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let current = required_detail(&tx, id)?;
        if current.appointment.status == AppointmentStatus::Cancelled {
            debug!("Appointment {} already cancelled", id);
            return Ok(current);
        }

        tx.execute(
            "UPDATE appointments SET status = ?1, updated_at = ?2 WHERE id = ?3",
            params![AppointmentStatus::Cancelled.as_str(), now_timestamp(), id],
        )?;
        release_slot(&tx, current.appointment.time_slot_id)?;
        let detail = required_detail(&tx, id)?;
        tx.commit()?;

        info!("Cancelled appointment {}", id);
        Ok(detail)
    }

    /// Move an appointment to `status`, applying the slot side effect of the change.
    ///
    /// Leaving `cancelled` re-claims the slot and fails with `Conflict` when the slot was
    /// booked by someone else in the meantime.
    pub fn set_status(
        &self,
        id: i64,
        status: AppointmentStatus,
        policy: TransitionPolicy,
    ) -> BookingResult<AppointmentDetail> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let current = required_detail(&tx, id)?;
        let from = current.appointment.status;
        policy.check(from, status)?;

        let slot_id = current.appointment.time_slot_id;
        match slot_effect(from, status) {
            SlotEffect::Release => {
                release_slot(&tx, slot_id)?;
            }
            SlotEffect::Reclaim => {
                if !claim_slot(&tx, slot_id)? {
                    return Err(BookingError::conflict(
                        "The time slot for this appointment has been booked by someone else.",
                    ));
                }
            }
            SlotEffect::None => {}
        }

        tx.execute(
            "UPDATE appointments SET status = ?1, updated_at = ?2 WHERE id = ?3",
            params![status.as_str(), now_timestamp(), id],
        )
        .map_err(constraint_as_conflict)?;
        let detail = required_detail(&tx, id)?;
        tx.commit()?;

        info!("Appointment {} status {} -> {}", id, from, status);
        Ok(detail)
    }

    pub fn get(&self, id: i64) -> BookingResult<AppointmentDetail> {
        let conn = self.get_conn()?;
        required_detail(&conn, id)
    }

    /// Active appointments for a phone number, soonest first.
    pub fn list_by_phone(&self, phone: &str) -> BookingResult<Vec<AppointmentDetail>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&detail_sql(
            "WHERE a.customer_phone = ?1 AND a.status != 'cancelled'
             ORDER BY t.date, t.start_time, a.id",
        ))?;
        let rows = stmt.query_map([phone.trim()], detail_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// All appointments in insertion order.
    pub fn list_all(&self, offset: usize, limit: usize) -> BookingResult<Vec<AppointmentDetail>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&detail_sql("ORDER BY a.id LIMIT ?1 OFFSET ?2"))?;
        let rows = stmt.query_map(params![limit as i64, offset as i64], detail_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}
