//! Staff endpoints for services, time slots and appointments.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use tracing::info;
use validator::Validate;

use crate::api::chat_api::BookingForm;
use crate::api::validate_payload;
use crate::booking_db::{
    parse_date, AppointmentDetail, NewService, Service, ServiceUpdate, SlotGeneration, TimeSlot,
};
use crate::error::BookingResult;
use crate::metrics;
use crate::scheduling::{AppointmentStatus, OperatingHours};
use crate::shared_state::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct ServiceCreate {
    #[validate(length(min = 1, max = 100, message = "must be 1-100 characters"))]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[validate(range(min = 1, message = "must be a positive number of minutes"))]
    pub duration_minutes: i64,
    #[validate(range(min = 0.0, message = "must not be negative"))]
    pub price: f64,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct ServicePatch {
    #[validate(length(min = 1, max = 100, message = "must be 1-100 characters"))]
    pub name: Option<String>,
    pub description: Option<String>,
    #[validate(range(min = 1, message = "must be a positive number of minutes"))]
    pub duration_minutes: Option<i64>,
    #[validate(range(min = 0.0, message = "must not be negative"))]
    pub price: Option<f64>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ServiceListQuery {
    #[serde(default)]
    pub include_inactive: bool,
}

/// Optional overrides of the configured operating hours.
#[derive(Debug, Default, Deserialize)]
pub struct GenerateSlotsRequest {
    pub start_hour: Option<u32>,
    pub end_hour: Option<u32>,
    pub slot_duration_minutes: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct Pagination {
    #[serde(default)]
    pub skip: usize,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    100
}

#[derive(Debug, Deserialize)]
pub struct StatusUpdate {
    /// Wire name such as `checked-in`; unknown names are a 400, not a body rejection.
    pub status: String,
}

pub async fn create_service(
    State(state): State<AppState>,
    Json(payload): Json<ServiceCreate>,
) -> BookingResult<(StatusCode, Json<Service>)> {
    validate_payload(&payload)?;
    let service = state.database.services.create(NewService {
        name: payload.name,
        description: payload.description,
        duration_minutes: payload.duration_minutes,
        price: payload.price,
    })?;
    Ok((StatusCode::CREATED, Json(service)))
}

pub async fn list_services(
    State(state): State<AppState>,
    Query(query): Query<ServiceListQuery>,
) -> BookingResult<Json<Vec<Service>>> {
    Ok(Json(state.database.services.list(query.include_inactive)?))
}

pub async fn get_service(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> BookingResult<Json<Service>> {
    Ok(Json(state.database.services.get(id)?))
}

pub async fn update_service(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(payload): Json<ServicePatch>,
) -> BookingResult<Json<Service>> {
    validate_payload(&payload)?;
    let updated = state.database.services.update(
        id,
        ServiceUpdate {
            name: payload.name,
            description: payload.description,
            duration_minutes: payload.duration_minutes,
            price: payload.price,
            is_active: payload.is_active,
        },
    )?;
    Ok(Json(updated))
}

/// Services are never removed, only hidden from customers.
pub async fn deactivate_service(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> BookingResult<Json<Service>> {
    let service = state.database.services.deactivate(id)?;
    info!("Deactivated service {}", id);
    Ok(Json(service))
}

pub async fn list_timeslots(
    State(state): State<AppState>,
    Path(date): Path<String>,
) -> BookingResult<Json<Vec<TimeSlot>>> {
    let date = parse_date(&date)?;
    let hours = state.config.operating_hours();
    Ok(Json(state.database.slots.ensure_available(date, &hours)?))
}

pub async fn generate_timeslots(
    State(state): State<AppState>,
    Path(date): Path<String>,
    body: Option<Json<GenerateSlotsRequest>>,
) -> BookingResult<Json<SlotGeneration>> {
    let date = parse_date(&date)?;
    let defaults = state.config.operating_hours();
    let overrides = body.map(|Json(b)| b).unwrap_or_default();
    let hours = OperatingHours::new(
        overrides.start_hour.unwrap_or(defaults.start_hour),
        overrides.end_hour.unwrap_or(defaults.end_hour),
        overrides.slot_duration_minutes.unwrap_or(defaults.slot_minutes),
    );
    Ok(Json(state.database.slots.generate(date, &hours)?))
}

pub async fn list_appointments(
    State(state): State<AppState>,
    Query(page): Query<Pagination>,
) -> BookingResult<Json<Vec<AppointmentDetail>>> {
    Ok(Json(state.database.appointments.list_all(page.skip, page.limit)?))
}

pub async fn create_appointment(
    State(state): State<AppState>,
    Json(form): Json<BookingForm>,
) -> BookingResult<(StatusCode, Json<AppointmentDetail>)> {
    validate_payload(&form)?;
    match state.database.appointments.book(form.into()) {
        Ok(detail) => {
            metrics::record_booking("booked");
            Ok((StatusCode::CREATED, Json(detail)))
        }
        Err(e) => {
            metrics::record_booking(e.outcome_label());
            Err(e)
        }
    }
}

pub async fn get_appointment(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> BookingResult<Json<AppointmentDetail>> {
    Ok(Json(state.database.appointments.get(id)?))
}

pub async fn appointments_by_phone(
    State(state): State<AppState>,
    Path(phone): Path<String>,
) -> BookingResult<Json<Vec<AppointmentDetail>>> {
    Ok(Json(state.database.appointments.list_by_phone(&phone)?))
}

pub async fn update_appointment_status(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(payload): Json<StatusUpdate>,
) -> BookingResult<Json<AppointmentDetail>> {
    let status: AppointmentStatus = payload.status.parse()?;
    let policy = state.config.transition_policy();
    Ok(Json(state.database.appointments.set_status(id, status, policy)?))
}

pub async fn cancel_appointment(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> BookingResult<Json<AppointmentDetail>> {
    Ok(Json(state.database.appointments.cancel(id)?))
}
