//! Row types for the booking database and the text encodings used to store them.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::Row;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::warn;

use crate::error::BookingError;
use crate::scheduling::AppointmentStatus;

pub(crate) const DATE_FORMAT: &str = "%Y-%m-%d";
pub(crate) const TIME_FORMAT: &str = "%H:%M";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Service {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub duration_minutes: i64,
    pub price: f64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewService {
    pub name: String,
    pub description: Option<String>,
    pub duration_minutes: i64,
    pub price: f64,
}

/// Partial edit of a service. `None` leaves the column untouched.
#[derive(Debug, Clone, Default)]
pub struct ServiceUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub duration_minutes: Option<i64>,
    pub price: Option<f64>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeSlot {
    pub id: i64,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub is_available: bool,
    pub created_at: DateTime<Utc>,
}

/// Result of generating a day's slots.
#[derive(Debug, Clone, Serialize)]
pub struct SlotGeneration {
    pub date: NaiveDate,
    /// Rows inserted by this call; zero when the day was already generated.
    pub created: usize,
    pub slots: Vec<TimeSlot>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    pub id: i64,
    pub customer_name: String,
    pub customer_phone: String,
    pub customer_email: Option<String>,
    pub service_id: i64,
    pub time_slot_id: i64,
    pub notes: Option<String>,
    pub status: AppointmentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An appointment together with the service and slot it references.
#[derive(Debug, Clone, Serialize)]
pub struct AppointmentDetail {
    #[serde(flatten)]
    pub appointment: Appointment,
    pub service: Service,
    pub time_slot: TimeSlot,
}

#[derive(Debug, Clone)]
pub struct NewAppointment {
    pub customer_name: String,
    pub customer_phone: String,
    pub customer_email: Option<String>,
    pub service_id: i64,
    pub time_slot_id: i64,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    Processing,
    Ready,
    Error,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Processing => "processing",
            DocumentStatus::Ready => "ready",
            DocumentStatus::Error => "error",
        }
    }
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentStatus {
    type Err = BookingError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "processing" => Ok(DocumentStatus::Processing),
            "ready" => Ok(DocumentStatus::Ready),
            "error" => Ok(DocumentStatus::Error),
            other => Err(BookingError::invalid(format!(
                "Invalid document status '{}'. Expected processing, ready or error",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeDocument {
    pub id: i64,
    pub title: String,
    pub file_name: String,
    pub file_type: String,
    pub file_size: i64,
    #[serde(skip_serializing)]
    pub file_path: String,
    pub content: Option<String>,
    pub tags: Option<String>,
    pub status: DocumentStatus,
    pub error_message: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewDocument {
    pub title: String,
    pub file_name: String,
    pub file_type: String,
    pub file_size: i64,
    pub file_path: String,
    pub tags: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DocumentUpdate {
    pub title: Option<String>,
    pub tags: Option<String>,
    pub status: Option<DocumentStatus>,
    pub content: Option<String>,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentChunk {
    pub id: i64,
    pub document_id: i64,
    pub content: String,
    pub chunk_index: i64,
    pub tokens: i64,
    pub created_at: DateTime<Utc>,
}

/// A chunk hit from knowledge search, with its document's title.
#[derive(Debug, Clone, Serialize)]
pub struct ChunkMatch {
    pub document_id: i64,
    pub document_title: String,
    pub content: String,
    pub chunk_index: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSummary {
    pub total_bookings: i64,
    pub completion_rate: f64,
    pub todays_bookings: i64,
    pub cancellation_rate: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecentBooking {
    pub id: i64,
    pub customer_name: String,
    pub service: RecentBookingService,
    pub time_slot: RecentBookingSlot,
    pub status: AppointmentStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecentBookingService {
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecentBookingSlot {
    pub date: NaiveDate,
    /// `HH:MM`
    pub start_time: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DailyAnalytics {
    pub date: NaiveDate,
    pub total_bookings: i64,
    pub completed_bookings: i64,
    pub cancelled_bookings: i64,
    pub total_revenue: f64,
    pub avg_service_duration: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DatabaseStats {
    pub total_services: i64,
    pub total_slots: i64,
    pub total_appointments: i64,
    pub total_documents: i64,
    pub total_chunks: i64,
    pub database_size_bytes: i64,
}

/// Fixed-width RFC 3339 so stored timestamps sort lexically.
pub(crate) fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(value: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S") {
        return DateTime::from_naive_utc_and_offset(dt, Utc);
    }
    warn!("Failed to parse timestamp '{}', using current time", value);
    Utc::now()
}

fn conversion_error<E>(idx: usize, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

pub(crate) fn timestamp_col(row: &Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    Ok(parse_timestamp(&row.get::<_, String>(idx)?))
}

pub(crate) fn date_col(row: &Row, idx: usize) -> rusqlite::Result<NaiveDate> {
    let raw: String = row.get(idx)?;
    NaiveDate::parse_from_str(&raw, DATE_FORMAT).map_err(|e| conversion_error(idx, e))
}

pub(crate) fn time_col(row: &Row, idx: usize) -> rusqlite::Result<NaiveTime> {
    let raw: String = row.get(idx)?;
    NaiveTime::parse_from_str(&raw, TIME_FORMAT).map_err(|e| conversion_error(idx, e))
}

pub(crate) fn appointment_status_col(row: &Row, idx: usize) -> rusqlite::Result<AppointmentStatus> {
    let raw: String = row.get(idx)?;
    raw.parse().map_err(|e: BookingError| conversion_error(idx, e))
}

pub(crate) fn document_status_col(row: &Row, idx: usize) -> rusqlite::Result<DocumentStatus> {
    let raw: String = row.get(idx)?;
    raw.parse().map_err(|e: BookingError| conversion_error(idx, e))
}

pub(crate) fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

pub(crate) fn format_time(time: NaiveTime) -> String {
    time.format(TIME_FORMAT).to_string()
}

/// Parse a `YYYY-MM-DD` date coming from a caller.
pub fn parse_date(value: &str) -> Result<NaiveDate, BookingError> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT).map_err(|_| {
        BookingError::invalid(format!(
            "Invalid date '{}'. Please use YYYY-MM-DD format.",
            value
        ))
    })
}
