//! Fixed-duration slot planning for one day of operating hours.
//!
//! Planning is pure: it only computes the windows. Persisting them (and skipping
//! windows that overlap slots already stored for the date) is the job of the slot store.

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::error::{BookingError, BookingResult};

/// Opening window and slot length used when generating a day's slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatingHours {
    pub start_hour: u32,
    pub end_hour: u32,
    pub slot_minutes: u32,
}

impl Default for OperatingHours {
    fn default() -> Self {
        Self {
            start_hour: 9,
            end_hour: 18,
            slot_minutes: 60,
        }
    }
}

impl OperatingHours {
    pub fn new(start_hour: u32, end_hour: u32, slot_minutes: u32) -> Self {
        Self {
            start_hour,
            end_hour,
            slot_minutes,
        }
    }

    /// Hours are clock hours of one calendar day, so the latest closing time is 23:00.
    /// Slots are stored as same-day `HH:MM` pairs and a slot ending at midnight would
    /// sort before its own start.
    pub fn validate(&self) -> BookingResult<()> {
        if self.start_hour > 23 || self.end_hour > 23 {
            return Err(BookingError::invalid(format!(
                "Operating hours must be between 0 and 23, the salon must close by 23:00 (got {}-{})",
                self.start_hour, self.end_hour
            )));
        }
        if self.slot_minutes == 0 {
            return Err(BookingError::invalid("Slot duration must be positive"));
        }
        Ok(())
    }
}

/// A planned `[start_time, end_time)` interval, not yet persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotWindow {
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
}

/// Plan back-to-back slots from `start_hour:00` up to `end_hour:00`.
///
/// A trailing interval shorter than `slot_minutes` is dropped. An empty or inverted
/// window yields no slots.
pub fn plan_slots(date: NaiveDate, hours: &OperatingHours) -> BookingResult<Vec<SlotWindow>> {
    hours.validate()?;
    if hours.start_hour >= hours.end_hour {
        return Ok(Vec::new());
    }

    let at_hour = |hour: u32| -> BookingResult<NaiveDateTime> {
        date.and_hms_opt(hour, 0, 0)
            .ok_or_else(|| BookingError::invalid(format!("Invalid hour {}", hour)))
    };
    let close = at_hour(hours.end_hour)?;
    let step = Duration::minutes(i64::from(hours.slot_minutes));

    let mut windows = Vec::new();
    let mut cursor = at_hour(hours.start_hour)?;
    while cursor + step <= close {
        let slot_end = cursor + step;
        windows.push(SlotWindow {
            date,
            start_time: cursor.time(),
            end_time: slot_end.time(),
        });
        cursor = slot_end;
    }
    Ok(windows)
}
