//! Sync log endpoint

use axum::{
    Json, Router,
    extract::{Query, State},
    routing::get,
};
use calrules_core::report::{LogPage, LogStatus};
use serde::Deserialize;

use crate::routes::AppError;
use crate::state::AppState;

const DEFAULT_LIMIT: usize = 50;

pub fn router() -> Router<AppState> {
    Router::new().route("/api/logs", get(list_logs))
}

#[derive(Deserialize)]
pub struct LogQuery {
    #[serde(default)]
    pub offset: usize,
    pub limit: Option<usize>,
    pub status: Option<LogStatus>,
}

/// GET /api/logs?offset&limit&status - Page through the last run's log
async fn list_logs(State(state): State<AppState>, Query(query): Query<LogQuery>) -> Result<Json<LogPage>, AppError> {
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT);
    let page = match state.last_report.read().await.as_ref() {
        Some(report) => report.logs(query.status, query.offset, limit),
        None => LogPage {
            total: 0,
            offset: query.offset,
            entries: Vec::new(),
        },
    };
    Ok(Json(page))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use calrules_core::{Rule, RuleKind, RuleStatus};

    use crate::routes::testing::{send, state};

    #[tokio::test]
    async fn test_empty_before_first_sync() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(dir.path(), Vec::new());

        let (status, body) = send(&state, "GET", "/api/logs", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 0);
    }

    #[tokio::test]
    async fn test_filter_and_page() {
        let dir = tempfile::tempdir().unwrap();
        let mut rule = Rule::new("late", "Late", RuleKind::Filter, "return startHour < 18;");
        rule.status = RuleStatus::Active;
        let state = state(dir.path(), vec![rule]);
        send(&state, "POST", "/api/sync", None).await;

        let (_, body) = send(&state, "GET", "/api/logs?status=warning", None).await;
        assert_eq!(body["total"], 1);
        assert_eq!(body["entries"][0]["status"], "warning");

        let (_, body) = send(&state, "GET", "/api/logs?offset=1&limit=1", None).await;
        assert_eq!(body["total"], 2);
        assert_eq!(body["offset"], 1);
        assert_eq!(body["entries"].as_array().unwrap().len(), 1);
    }
}
