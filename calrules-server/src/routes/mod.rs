pub mod events;
pub mod logs;
pub mod rules;
pub mod settings;
pub mod stats;
pub mod sync;

use axum::{
    Json, Router,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use calrules_core::CalRulesError;
use serde::Serialize;

use crate::state::AppState;

/// Every `/api` route, ready for layers.
pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(rules::router())
        .merge(events::router())
        .merge(sync::router())
        .merge(logs::router())
        .merge(stats::router())
        .merge(settings::router())
        .with_state(state)
}

/// Standard API error response
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Convert errors to JSON responses. Library errors pick their status code.
pub struct AppError {
    status: StatusCode,
    error: anyhow::Error,
}

impl AppError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        AppError {
            status: StatusCode::BAD_REQUEST,
            error: anyhow::anyhow!(message.into()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!("{:#}", self.error);
        }
        let body = Json(ErrorResponse {
            error: self.error.to_string(),
        });
        (self.status, body).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        let error = err.into();
        let status = match error.downcast_ref::<CalRulesError>() {
            Some(CalRulesError::RuleNotFound(_)) => StatusCode::NOT_FOUND,
            Some(CalRulesError::Config(_) | CalRulesError::InvalidRule(_)) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        AppError { status, error }
    }
}
