//! Dashboard stats endpoint

use axum::{Json, Router, extract::State, routing::get};
use calrules_core::report::{BatchReport, Stat};
use chrono::Utc;

use crate::routes::AppError;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/api/stats", get(get_stats))
}

/// GET /api/stats - Stat cards for the last run
async fn get_stats(State(state): State<AppState>) -> Result<Json<Vec<Stat>>, AppError> {
    if let Some(report) = state.last_report.read().await.as_ref() {
        return Ok(Json(report.stats()));
    }

    // Nothing has run yet: count active rules from the store.
    let mut empty = BatchReport::build(Utc::now(), &[], Vec::new(), Vec::new());
    empty.active_rules = state.store.active_rules()?.len();
    Ok(Json(empty.stats()))
}
