use axum::http::StatusCode;
use axum::response::IntoResponse;
use lazy_static::lazy_static;
use prometheus::{Encoder, Histogram, HistogramOpts, IntCounterVec, Registry, TextEncoder};
use std::sync::OnceLock;
use tracing::error;

lazy_static! {
    static ref REGISTRY: Registry = Registry::new();
}
static REQ_COUNTER: OnceLock<IntCounterVec> = OnceLock::new();
static BOOKING_COUNTER: OnceLock<IntCounterVec> = OnceLock::new();
static AGENT_TURN_TIME: OnceLock<Histogram> = OnceLock::new();

/// Register the collectors. Calling it again is a no-op.
pub fn init_metrics() -> anyhow::Result<()> {
    let requests = IntCounterVec::new(
        prometheus::opts!("http_requests_total", "Total HTTP requests per route"),
        &["route", "status"],
    )?;
    if REQ_COUNTER.set(requests.clone()).is_ok() {
        REGISTRY.register(Box::new(requests))?;
    }

    let bookings = IntCounterVec::new(
        prometheus::opts!("bookings_total", "Booking attempts by outcome"),
        &["outcome"],
    )?;
    if BOOKING_COUNTER.set(bookings.clone()).is_ok() {
        REGISTRY.register(Box::new(bookings))?;
    }

    let turns = Histogram::with_opts(
        HistogramOpts::new("agent_turn_seconds", "Wall time of one chat turn")
            .buckets(vec![0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]),
    )?;
    if AGENT_TURN_TIME.set(turns.clone()).is_ok() {
        REGISTRY.register(Box::new(turns))?;
    }
    Ok(())
}

pub fn inc_request(route: &str, status: &str) {
    if let Some(counter) = REQ_COUNTER.get() {
        counter.with_label_values(&[route, status]).inc();
    }
}

/// `outcome` is `booked` or a `BookingError::outcome_label`.
pub fn record_booking(outcome: &str) {
    if let Some(counter) = BOOKING_COUNTER.get() {
        counter.with_label_values(&[outcome]).inc();
    }
}

pub fn observe_agent_turn(seconds: f64) {
    if let Some(histogram) = AGENT_TURN_TIME.get() {
        histogram.observe(seconds);
    }
}

pub async fn get_metrics() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = vec![];
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!("Failed to encode metrics: {}", e);
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; version=0.0.4")],
            Vec::new(),
        );
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4")],
        buffer,
    )
}
