//! Engine and sync settings endpoints

use std::time::Duration;

use axum::{
    Json, Router,
    extract::State,
    routing::get,
};
use calrules_core::{CalrulesConfig, RunMode};
use serde::{Deserialize, Serialize};

use crate::routes::AppError;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/api/settings", get(get_settings).put(put_settings))
}

/// The dashboard's view of the config. Durations are humantime strings.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub sync: SyncSettings,
    pub engine: EngineSettings,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSettings {
    pub frequency: String,
    pub auto_retry: bool,
    pub max_retries: u32,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineSettings {
    pub timeout: String,
    pub mode: RunMode,
    pub coerce_non_boolean: bool,
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default)]
    pub workers: Option<usize>,
}

impl From<&CalrulesConfig> for Settings {
    fn from(config: &CalrulesConfig) -> Self {
        Settings {
            sync: SyncSettings {
                frequency: humantime::format_duration(config.sync.frequency).to_string(),
                auto_retry: config.sync.auto_retry,
                max_retries: config.sync.max_retries,
            },
            engine: EngineSettings {
                timeout: humantime::format_duration(config.engine.timeout).to_string(),
                mode: config.engine.mode,
                coerce_non_boolean: config.engine.coerce_non_boolean,
                timezone: config.engine.timezone.clone(),
                workers: config.engine.workers,
            },
        }
    }
}

impl Settings {
    /// Write these settings over `config`, leaving paths untouched.
    fn apply(self, config: &mut CalrulesConfig) -> Result<(), AppError> {
        let frequency = parse_duration("frequency", &self.sync.frequency)?;
        let timeout = parse_duration("timeout", &self.engine.timeout)?;
        if self.engine.workers == Some(0) {
            return Err(AppError::bad_request("workers must be at least 1"));
        }

        config.sync.frequency = frequency;
        config.sync.auto_retry = self.sync.auto_retry;
        config.sync.max_retries = self.sync.max_retries;
        config.engine.timeout = timeout;
        config.engine.mode = self.engine.mode;
        config.engine.coerce_non_boolean = self.engine.coerce_non_boolean;
        config.engine.timezone = self.engine.timezone;
        config.engine.workers = self.engine.workers;
        Ok(())
    }
}

fn parse_duration(field: &str, value: &str) -> Result<Duration, AppError> {
    match humantime::parse_duration(value) {
        Ok(d) if !d.is_zero() => Ok(d),
        Ok(_) => Err(AppError::bad_request(format!("{} must be greater than zero", field))),
        Err(e) => Err(AppError::bad_request(format!("Invalid {} '{}': {}", field, value, e))),
    }
}

/// GET /api/settings
async fn get_settings(State(state): State<AppState>) -> Json<Settings> {
    Json(Settings::from(&*state.config.read().await))
}

/// PUT /api/settings - Takes effect from the next sync pass
async fn put_settings(State(state): State<AppState>, Json(req): Json<Settings>) -> Result<Json<Settings>, AppError> {
    let mut config = state.config.write().await;

    let mut updated = config.clone();
    req.apply(&mut updated)?;
    if let Some(path) = &state.config_path {
        updated.save(path)?;
    }
    *config = updated;

    Ok(Json(Settings::from(&*config)))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::http::StatusCode;
    use serde_json::json;

    use crate::routes::testing::{send, state};

    #[tokio::test]
    async fn test_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(dir.path(), Vec::new());

        let (status, body) = send(&state, "GET", "/api/settings", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["sync"]["frequency"], "15m");
        assert_eq!(body["sync"]["autoRetry"], true);
        assert_eq!(body["engine"]["timeout"], "50ms");
        assert_eq!(body["engine"]["mode"], "continue");
    }

    #[tokio::test]
    async fn test_update_applies_to_config() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(dir.path(), Vec::new());

        let settings = json!({
            "sync": {"frequency": "5m", "autoRetry": false, "maxRetries": 1},
            "engine": {"timeout": "100ms", "mode": "short_circuit", "coerceNonBoolean": true}
        });
        let (status, body) = send(&state, "PUT", "/api/settings", Some(settings)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["engine"]["mode"], "short_circuit");

        let config = state.config().await;
        assert_eq!(config.sync.frequency, Duration::from_secs(300));
        assert_eq!(config.fetch_retries(), 0);
        assert_eq!(config.engine.timeout, Duration::from_millis(100));
        assert!(config.engine.coerce_non_boolean);
    }

    #[tokio::test]
    async fn test_invalid_duration_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(dir.path(), Vec::new());

        let settings = json!({
            "sync": {"frequency": "often", "autoRetry": true, "maxRetries": 3},
            "engine": {"timeout": "50ms", "mode": "continue", "coerceNonBoolean": false}
        });
        let (status, body) = send(&state, "PUT", "/api/settings", Some(settings)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("frequency"));
        assert_eq!(state.config().await.sync.frequency, Duration::from_secs(900));
    }
}
