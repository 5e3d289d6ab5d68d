use chrono::NaiveDate;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use std::sync::Arc;
use tracing::{debug, info};

use crate::booking_db::schema::*;
use crate::error::{BookingError, BookingResult};
use crate::scheduling::{plan_slots, OperatingHours};

pub(crate) const SLOT_COLUMNS: &str = "id, date, start_time, end_time, is_available, created_at";

/// Map six slot columns starting at `offset`.
pub(crate) fn slot_from_row(row: &Row, offset: usize) -> rusqlite::Result<TimeSlot> {
    Ok(TimeSlot {
        id: row.get(offset)?,
        date: date_col(row, offset + 1)?,
        start_time: time_col(row, offset + 2)?,
        end_time: time_col(row, offset + 3)?,
        is_available: row.get(offset + 4)?,
        created_at: timestamp_col(row, offset + 5)?,
    })
}

pub(crate) fn fetch_slot(conn: &Connection, id: i64) -> rusqlite::Result<Option<TimeSlot>> {
    conn.query_row(
        &format!("SELECT {} FROM time_slots WHERE id = ?1", SLOT_COLUMNS),
        [id],
        |row| slot_from_row(row, 0),
    )
    .optional()
}

pub(crate) fn slot_not_found(id: i64) -> BookingError {
    BookingError::not_found(format!("Time slot with ID {} not found.", id))
}

/// Compare-and-set a slot from available to taken. `false` means someone else holds it.
pub(crate) fn claim_slot(conn: &Connection, id: i64) -> rusqlite::Result<bool> {
    let changed = conn.execute(
        "UPDATE time_slots SET is_available = 0 WHERE id = ?1 AND is_available = 1",
        [id],
    )?;
    Ok(changed == 1)
}

pub(crate) fn release_slot(conn: &Connection, id: i64) -> rusqlite::Result<bool> {
    let changed = conn.execute("UPDATE time_slots SET is_available = 1 WHERE id = ?1", [id])?;
    Ok(changed == 1)
}

fn slots_for_date(conn: &Connection, date: NaiveDate, only_available: bool) -> rusqlite::Result<Vec<TimeSlot>> {
    let sql = if only_available {
        format!(
            "SELECT {} FROM time_slots WHERE date = ?1 AND is_available = 1 ORDER BY start_time",
            SLOT_COLUMNS
        )
    } else {
        format!("SELECT {} FROM time_slots WHERE date = ?1 ORDER BY start_time", SLOT_COLUMNS)
    };
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([format_date(date)], |row| slot_from_row(row, 0))?;
    rows.collect()
}

/// Time slots and the availability ledger.
pub struct SlotStore {
    pool: Arc<Pool<SqliteConnectionManager>>,
}

impl SlotStore {
    pub fn new(pool: Arc<Pool<SqliteConnectionManager>>) -> Self {
        Self { pool }
    }

    fn get_conn(&self) -> BookingResult<r2d2::PooledConnection<SqliteConnectionManager>> {
        Ok(self.pool.get()?)
    }

    /// Persist the planned slots for `date` in one transaction.
    ///
    /// A planned window that overlaps any slot already stored for the day is skipped,
    /// so regenerating never duplicates slots, never touches their availability and
    /// never adds overlapping ones even when the slot length changed. Returns every
    /// slot of the day along with how many were newly created.
    pub fn generate(&self, date: NaiveDate, hours: &OperatingHours) -> BookingResult<SlotGeneration> {
        let windows = plan_slots(date, hours)?;
        let day = format_date(date);

        let mut conn = self.get_conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let now = now_timestamp();
        let mut created = 0;
        let mut skipped = 0;
        {
            // HH:MM text compares in time order.
            let mut overlap = tx.prepare(
                "SELECT EXISTS(SELECT 1 FROM time_slots
                 WHERE date = ?1 AND start_time < ?3 AND end_time > ?2)",
            )?;
            let mut insert = tx.prepare(
                "INSERT INTO time_slots (date, start_time, end_time, is_available, created_at)
                 VALUES (?1, ?2, ?3, 1, ?4)",
            )?;
            for window in &windows {
                let start = format_time(window.start_time);
                let end = format_time(window.end_time);
                let taken: bool = overlap.query_row(params![day, start, end], |row| row.get(0))?;
                if taken {
                    skipped += 1;
                    continue;
                }
                created += insert.execute(params![day, start, end, now])?;
            }
        }
        let slots = slots_for_date(&tx, date, false)?;
        tx.commit()?;

        info!(
            "Generated {} time slots for {} ({} planned, {} overlapping existing slots)",
            created,
            date,
            windows.len(),
            skipped
        );
        Ok(SlotGeneration {
            date,
            created,
            slots,
        })
    }

    pub fn get(&self, id: i64) -> BookingResult<TimeSlot> {
        let conn = self.get_conn()?;
        fetch_slot(&conn, id)?.ok_or_else(|| slot_not_found(id))
    }

    /// All slots of a day, available or not, by start time.
    pub fn list_by_date(&self, date: NaiveDate) -> BookingResult<Vec<TimeSlot>> {
        let conn = self.get_conn()?;
        Ok(slots_for_date(&conn, date, false)?)
    }

    /// Available slots of a day by start time.
    pub fn list_available(&self, date: NaiveDate) -> BookingResult<Vec<TimeSlot>> {
        let conn = self.get_conn()?;
        Ok(slots_for_date(&conn, date, true)?)
    }

    /// Available slots of a day, generating the day first if it has no slots at all.
    pub fn ensure_available(&self, date: NaiveDate, hours: &OperatingHours) -> BookingResult<Vec<TimeSlot>> {
        let existing = {
            let conn = self.get_conn()?;
            conn.query_row(
                "SELECT COUNT(*) FROM time_slots WHERE date = ?1",
                [format_date(date)],
                |row| row.get::<_, i64>(0),
            )?
        };
        if existing == 0 {
            debug!("No slots for {}, generating", date);
            self.generate(date, hours)?;
        }
        self.list_available(date)
    }

    /// Overwrite a slot's flag. Missing slots are a no-op; returns whether a row changed.
    pub fn set_availability(&self, id: i64, available: bool) -> BookingResult<bool> {
        let conn = self.get_conn()?;
        let changed = conn.execute(
            "UPDATE time_slots SET is_available = ?1 WHERE id = ?2",
            params![available, id],
        )?;
        Ok(changed == 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::booking_db::BookingDatabase;
    use chrono::NaiveTime;

    fn june_first() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
    }

    #[test]
    fn test_generate_persists_default_day() {
        let db = BookingDatabase::new_in_memory().unwrap();
        let generated = db.slots.generate(june_first(), &OperatingHours::default()).unwrap();
        assert_eq!(generated.created, 9);
        assert_eq!(generated.slots.len(), 9);
        assert!(generated.slots.iter().all(|s| s.is_available));
        assert_eq!(generated.slots[0].start_time, NaiveTime::from_hms_opt(9, 0, 0).unwrap());
        assert_eq!(generated.slots[8].end_time, NaiveTime::from_hms_opt(18, 0, 0).unwrap());
    }

    #[test]
    fn test_generate_is_idempotent() {
        let db = BookingDatabase::new_in_memory().unwrap();
        let first = db.slots.generate(june_first(), &OperatingHours::default()).unwrap();
        db.slots.set_availability(first.slots[0].id, false).unwrap();

        let second = db.slots.generate(june_first(), &OperatingHours::default()).unwrap();
        assert_eq!(second.created, 0);
        assert_eq!(second.slots.len(), 9);
        assert!(!second.slots[0].is_available);
        assert_eq!(db.stats().unwrap().total_slots, 9);
    }

    #[test]
    fn test_list_available_excludes_taken_slots() {
        let db = BookingDatabase::new_in_memory().unwrap();
        let slots = db.slots.generate(june_first(), &OperatingHours::default()).unwrap().slots;
        db.slots.set_availability(slots[1].id, false).unwrap();

        let available = db.slots.list_available(june_first()).unwrap();
        assert_eq!(available.len(), 8);
        assert!(available.iter().all(|s| s.id != slots[1].id));
        assert!(available.windows(2).all(|w| w[0].start_time < w[1].start_time));
        assert_eq!(db.slots.list_by_date(june_first()).unwrap().len(), 9);
    }

    #[test]
    fn test_set_availability_missing_slot_is_noop() {
        let db = BookingDatabase::new_in_memory().unwrap();
        assert!(!db.slots.set_availability(999, false).unwrap());
    }

    #[test]
    fn test_ensure_available_generates_empty_day_once() {
        let db = BookingDatabase::new_in_memory().unwrap();
        let available = db.slots.ensure_available(june_first(), &OperatingHours::default()).unwrap();
        assert_eq!(available.len(), 9);

        for slot in &available {
            db.slots.set_availability(slot.id, false).unwrap();
        }
        // A fully booked day stays fully booked.
        let again = db.slots.ensure_available(june_first(), &OperatingHours::default()).unwrap();
        assert!(again.is_empty());
    }

    #[test]
    fn test_claim_is_compare_and_set() {
        let db = BookingDatabase::new_in_memory().unwrap();
        let slot = db.slots.generate(june_first(), &OperatingHours::default()).unwrap().slots[0].clone();
        let conn = db.slots.get_conn().unwrap();
        assert!(claim_slot(&conn, slot.id).unwrap());
        assert!(!claim_slot(&conn, slot.id).unwrap());
        assert!(release_slot(&conn, slot.id).unwrap());
        assert!(claim_slot(&conn, slot.id).unwrap());
    }

    #[test]
    fn test_get_missing_slot() {
        let db = BookingDatabase::new_in_memory().unwrap();
        assert!(matches!(db.slots.get(7), Err(BookingError::NotFound(_))));
    }

    #[test]
    fn test_regenerate_with_other_length_never_overlaps() {
        let db = BookingDatabase::new_in_memory().unwrap();
        db.slots.generate(june_first(), &OperatingHours::new(9, 18, 60)).unwrap();

        let longer = db.slots.generate(june_first(), &OperatingHours::new(9, 18, 90)).unwrap();
        assert_eq!(longer.created, 0);
        assert_eq!(longer.slots.len(), 9);

        let evening = db.slots.generate(june_first(), &OperatingHours::new(9, 21, 90)).unwrap();
        // 18:00-19:30 and 19:30-21:00 are the only free windows.
        assert_eq!(evening.created, 2);
        let slots = db.slots.list_by_date(june_first()).unwrap();
        assert_eq!(slots.len(), 11);
        for (i, a) in slots.iter().enumerate() {
            for b in &slots[i + 1..] {
                assert!(
                    a.end_time <= b.start_time || b.end_time <= a.start_time,
                    "{}-{} overlaps {}-{}",
                    a.start_time,
                    a.end_time,
                    b.start_time,
                    b.end_time
                );
            }
        }
    }
}
