//! Event endpoints

use axum::{Json, Router, extract::State, routing::get};
use calrules_core::{Event, fetch_with_retries};

use crate::routes::AppError;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/api/events", get(list_events))
}

/// GET /api/events - Events from the configured source, before any rule runs
async fn list_events(State(state): State<AppState>) -> Result<Json<Vec<Event>>, AppError> {
    let config = state.config().await;
    let source = config.event_source(None)?;
    let events = fetch_with_retries(&*source, config.fetch_retries()).await?;
    Ok(Json(events))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;

    use crate::routes::testing::{send, state};

    #[tokio::test]
    async fn test_lists_source_events() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(dir.path(), Vec::new());

        let (status, body) = send(&state, "GET", "/api/events", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body[0]["title"], "Standup");
        assert_eq!(body.as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_missing_source_is_400() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(dir.path(), Vec::new());
        state.config.write().await.events = None;

        let (status, _) = send(&state, "GET", "/api/events", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
