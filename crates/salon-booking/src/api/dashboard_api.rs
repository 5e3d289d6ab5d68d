use axum::{
    extract::{Query, State},
    Json,
};
use chrono::{Duration, Local};
use serde::Deserialize;

use crate::booking_db::{parse_date, DailyAnalytics, DashboardSummary, DatabaseStats, RecentBooking};
use crate::error::BookingResult;
use crate::shared_state::AppState;

#[derive(Debug, Deserialize)]
pub struct RecentQuery {
    #[serde(default = "default_recent_limit")]
    pub limit: usize,
}

fn default_recent_limit() -> usize {
    10
}

/// Dates as `YYYY-MM-DD`. Defaults to the last seven days including today.
#[derive(Debug, Default, Deserialize)]
pub struct AnalyticsQuery {
    pub start: Option<String>,
    pub end: Option<String>,
}

pub async fn summary(State(state): State<AppState>) -> BookingResult<Json<DashboardSummary>> {
    let today = Local::now().date_naive();
    Ok(Json(state.database.dashboard_summary(today)?))
}

pub async fn recent_bookings(
    State(state): State<AppState>,
    Query(query): Query<RecentQuery>,
) -> BookingResult<Json<Vec<RecentBooking>>> {
    Ok(Json(state.database.recent_bookings(query.limit.min(100))?))
}

pub async fn analytics(
    State(state): State<AppState>,
    Query(query): Query<AnalyticsQuery>,
) -> BookingResult<Json<Vec<DailyAnalytics>>> {
    let end = match query.end.as_deref() {
        Some(end) => parse_date(end)?,
        None => Local::now().date_naive(),
    };
    let start = match query.start.as_deref() {
        Some(start) => parse_date(start)?,
        None => end - Duration::days(6),
    };
    Ok(Json(state.database.daily_analytics(start, end)?))
}

pub async fn stats(State(state): State<AppState>) -> BookingResult<Json<DatabaseStats>> {
    Ok(Json(state.database.stats()?))
}
