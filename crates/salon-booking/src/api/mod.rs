//! API module - HTTP surface for chat, booking, administration and the knowledge base

pub mod admin_api;
pub mod chat_api;
pub mod dashboard_api;
pub mod knowledge_api;

use axum::{
    extract::{DefaultBodyLimit, MatchedPath, Request},
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Router,
};
use std::time::Duration;
use tower_http::{
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use validator::Validate;

use crate::error::{BookingError, BookingResult};
use crate::metrics;
use crate::shared_state::AppState;

/// Run derive-based validation and report the failing fields as `InvalidArgument`.
pub(crate) fn validate_payload<T: Validate>(payload: &T) -> BookingResult<()> {
    payload.validate().map_err(|errors| {
        let mut fields: Vec<String> = errors
            .field_errors()
            .into_iter()
            .map(|(field, errs)| {
                let reason = errs
                    .first()
                    .and_then(|e| e.message.as_ref().map(|m| m.to_string()))
                    .unwrap_or_else(|| "is invalid".to_string());
                format!("{} {}", field, reason)
            })
            .collect();
        fields.sort();
        BookingError::invalid(format!("Invalid request: {}", fields.join("; ")))
    })
}

async fn track_requests(request: Request, next: Next) -> Response {
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_owned())
        .unwrap_or_else(|| "unmatched".to_string());
    let response = next.run(request).await;
    metrics::inc_request(&route, response.status().as_str());
    response
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let admin = Router::new()
        .route(
            "/services",
            get(admin_api::list_services).post(admin_api::create_service),
        )
        .route(
            "/services/:id",
            get(admin_api::get_service)
                .patch(admin_api::update_service)
                .delete(admin_api::deactivate_service),
        )
        .route("/timeslots/:date", get(admin_api::list_timeslots))
        .route("/timeslots/generate/:date", post(admin_api::generate_timeslots))
        .route(
            "/appointments",
            get(admin_api::list_appointments).post(admin_api::create_appointment),
        )
        .route("/appointments/:id", get(admin_api::get_appointment))
        .route(
            "/appointments/phone/:phone",
            get(admin_api::appointments_by_phone),
        )
        .route(
            "/appointments/:id/status",
            axum::routing::patch(admin_api::update_appointment_status),
        )
        .route("/appointments/:id/cancel", post(admin_api::cancel_appointment))
        .route("/dashboard/summary", get(dashboard_api::summary))
        .route("/dashboard/recent-bookings", get(dashboard_api::recent_bookings))
        .route("/dashboard/analytics", get(dashboard_api::analytics))
        .route("/dashboard/stats", get(dashboard_api::stats));

    let knowledge = Router::new()
        .route("/documents", get(knowledge_api::list_documents))
        .route(
            "/documents/:id",
            get(knowledge_api::get_document)
                .put(knowledge_api::update_document)
                .delete(knowledge_api::delete_document),
        )
        .route("/documents/:id/chunks", get(knowledge_api::document_chunks))
        .route(
            "/documents/upload",
            post(knowledge_api::upload_document)
                .layer(DefaultBodyLimit::max(state.config.max_upload_bytes)),
        )
        .route("/search", get(knowledge_api::search));

    let api = Router::new()
        .route("/health", get(chat_api::health))
        .route("/chat", post(chat_api::chat))
        .route("/book-appointment", post(chat_api::book_appointment))
        .nest("/admin", admin)
        .nest("/knowledge", knowledge);

    let timeout = Duration::from_secs(state.config.request_timeout_seconds);

    Router::new()
        .route("/health", get(chat_api::health))
        .route("/metrics", get(metrics::get_metrics))
        .nest("/api/v1", api)
        .route_layer(middleware::from_fn(track_requests))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(timeout))
        .with_state(state)
}

#[cfg(test)]
pub(crate) mod test_support {
    use axum::body::Body;
    use axum::http::{header, Method, Request, StatusCode};
    use axum::Router;
    use serde_json::Value;
    use std::sync::Arc;
    use tower::ServiceExt;

    use crate::booking_db::{BookingDatabase, NewService};
    use crate::config::create_test_config;
    use crate::shared_state::AppState;

    pub fn test_app() -> (Router, Arc<BookingDatabase>) {
        let database = Arc::new(BookingDatabase::new_in_memory().unwrap());
        let state = AppState::new(create_test_config(), database.clone(), None);
        (super::build_router(state), database)
    }

    pub fn gel(database: &BookingDatabase) -> i64 {
        database
            .services
            .create(NewService {
                name: "Gel Manicure".into(),
                description: Some("Long-lasting gel polish".into()),
                duration_minutes: 60,
                price: 200000.0,
            })
            .unwrap()
            .id
    }

    pub async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };
        (status, value)
    }
}
