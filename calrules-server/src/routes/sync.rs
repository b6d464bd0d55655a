//! Sync pass endpoint

use axum::{Json, Router, extract::State, routing::post};
use calrules_core::report::Stat;
use calrules_core::{BatchRunner, fetch_with_retries};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::routes::AppError;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/api/sync", post(run_sync))
}

/// Summary of a finished pass. The full log is paged via `/api/logs`.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub events: usize,
    pub included: usize,
    pub excluded: usize,
    pub stats: Vec<Stat>,
}

/// POST /api/sync - Fetch events, run active rules, keep the report
async fn run_sync(State(state): State<AppState>) -> Result<Json<SyncSummary>, AppError> {
    let config = state.config().await;

    let source = config.event_source(None)?;
    let events = fetch_with_retries(&*source, config.fetch_retries()).await?;

    let runner = BatchRunner::from_store(state.store.as_ref(), config.evaluator(), config.engine.mode)?
        .with_workers(config.workers());
    let report = runner.run(events).await;
    report.save(&config.state_path())?;

    tracing::info!(
        events = report.decisions.len(),
        included = report.included().count(),
        compile_errors = report.compile_errors.len(),
        "Sync pass finished"
    );

    let summary = SyncSummary {
        started_at: report.started_at,
        finished_at: report.finished_at,
        events: report.decisions.len(),
        included: report.included().count(),
        excluded: report.excluded_count(),
        stats: report.stats(),
    };
    *state.last_report.write().await = Some(report);

    Ok(Json(summary))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use calrules_core::{Rule, RuleKind, RuleStatus};

    use crate::routes::testing::{send, state};

    #[tokio::test]
    async fn test_sync_applies_active_rules_and_keeps_report() {
        let dir = tempfile::tempdir().unwrap();
        let mut rule = Rule::new(
            "work-hours",
            "Work Hours",
            RuleKind::Filter,
            "return startHour >= 9 && endHour <= 18;",
        );
        rule.status = RuleStatus::Active;
        let state = state(dir.path(), vec![rule]);

        let (status, body) = send(&state, "POST", "/api/sync", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["events"], 2);
        assert_eq!(body["included"], 1);
        assert_eq!(body["excluded"], 1);

        assert!(state.last_report.read().await.is_some());
        assert!(dir.path().join("state").join("last_run.json").exists());
    }
}
