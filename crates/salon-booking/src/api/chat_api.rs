//! Customer-facing endpoints: chat, form booking and health.

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use crate::agent::NOT_CONFIGURED_REPLY;
use crate::api::validate_payload;
use crate::booking_db::schema::{format_date, format_time};
use crate::booking_db::NewAppointment;
use crate::error::BookingResult;
use crate::metrics;
use crate::shared_state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ChatRequest {
    #[validate(length(min = 1, message = "must not be empty"))]
    pub message: String,
    #[serde(default)]
    pub conversation_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub response: String,
    pub conversation_id: String,
}

/// Booking form submitted outside the chat.
#[derive(Debug, Deserialize, Validate)]
pub struct BookingForm {
    #[validate(length(min = 1, max = 100, message = "must be 1-100 characters"))]
    pub customer_name: String,
    #[validate(length(min = 1, max = 20, message = "must be 1-20 characters"))]
    pub customer_phone: String,
    #[serde(default)]
    #[validate(email(message = "must be a valid email address"))]
    pub customer_email: Option<String>,
    pub service_id: i64,
    pub time_slot_id: i64,
    #[serde(default)]
    pub notes: Option<String>,
}

impl From<BookingForm> for NewAppointment {
    fn from(form: BookingForm) -> Self {
        NewAppointment {
            customer_name: form.customer_name,
            customer_phone: form.customer_phone,
            customer_email: form.customer_email.filter(|e| !e.trim().is_empty()),
            service_id: form.service_id,
            time_slot_id: form.time_slot_id,
            notes: form.notes,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct BookingConfirmation {
    pub success: bool,
    pub message: String,
    pub appointment_id: i64,
    pub customer_name: String,
    pub service_name: String,
    pub appointment_date: String,
    pub appointment_time: String,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: "nail-salon-chatbot-api",
    })
}

/// Always answers 200 once the payload is valid; agent failures come back as text.
pub async fn chat(
    State(state): State<AppState>,
    Json(payload): Json<ChatRequest>,
) -> BookingResult<Json<ChatResponse>> {
    validate_payload(&payload)?;
    let conversation_id = payload
        .conversation_id
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let response = match &state.agent {
        Some(agent) => agent.chat(&conversation_id, &payload.message).await,
        None => NOT_CONFIGURED_REPLY.to_string(),
    };

    Ok(Json(ChatResponse {
        response,
        conversation_id,
    }))
}

pub async fn book_appointment(
    State(state): State<AppState>,
    Json(form): Json<BookingForm>,
) -> BookingResult<Json<BookingConfirmation>> {
    validate_payload(&form)?;
    let detail = match state.database.appointments.book(form.into()) {
        Ok(detail) => {
            metrics::record_booking("booked");
            detail
        }
        Err(e) => {
            metrics::record_booking(e.outcome_label());
            return Err(e);
        }
    };
    info!(
        "Form booking {} for {}",
        detail.appointment.id, detail.appointment.customer_name
    );

    Ok(Json(BookingConfirmation {
        success: true,
        message: "Appointment booked successfully!".to_string(),
        appointment_id: detail.appointment.id,
        customer_name: detail.appointment.customer_name,
        service_name: detail.service.name,
        appointment_date: format_date(detail.time_slot.date),
        appointment_time: format!(
            "{} - {}",
            format_time(detail.time_slot.start_time),
            format_time(detail.time_slot.end_time)
        ),
    }))
}
