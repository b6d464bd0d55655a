//! Rule endpoints

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
};
use calrules_core::{CalRulesError, CompileError, Evaluator, Rule, RuleKind, RuleStatus};
use serde::{Deserialize, Serialize};

use crate::routes::AppError;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/rules", get(list_rules).post(create_rule))
        .route("/api/rules/{id}", get(get_rule).put(update_rule).delete(delete_rule))
        .route("/api/rules/{id}/code", get(get_code).put(put_code))
        .route("/api/rules/{id}/enable", post(enable))
        .route("/api/rules/{id}/disable", post(disable))
        .route("/api/rules/{id}/pause", post(pause))
        .route("/api/rules/{id}/toggle", post(toggle))
        .route("/api/rules/{id}/duplicate", post(duplicate))
}

/// A rule as saved, plus the compile error its code would hit on the next run.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedRule {
    #[serde(flatten)]
    pub rule: Rule,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compile_error: Option<CompileError>,
}

impl From<Rule> for SavedRule {
    fn from(rule: Rule) -> Self {
        let compile_error = Evaluator::default().compile(&rule).err();
        SavedRule { rule, compile_error }
    }
}

/// GET /api/rules - All rules in store order
async fn list_rules(State(state): State<AppState>) -> Result<Json<Vec<Rule>>, AppError> {
    Ok(Json(state.store.list_rules()?))
}

/// Request body for saving a rule. Without an `id` a new draft is created
/// under a slug of the name; with one, that rule is inserted or replaced.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRuleRequest {
    pub id: Option<String>,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: RuleKind,
    #[serde(flatten)]
    pub fields: RuleFields,
}

/// Optional rule fields. Absent fields keep their current value.
#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct RuleFields {
    pub description: Option<String>,
    pub priority: Option<i32>,
    pub status: Option<RuleStatus>,
    /// Starter code for the rule type is used when a new rule has none.
    pub code: Option<String>,
}

impl RuleFields {
    fn is_empty(&self) -> bool {
        self.description.is_none() && self.priority.is_none() && self.status.is_none() && self.code.is_none()
    }

    fn apply(self, rule: &mut Rule) {
        if let Some(description) = self.description {
            rule.description = description;
        }
        if let Some(priority) = self.priority {
            rule.priority = priority;
        }
        if let Some(status) = self.status {
            rule.status = status;
        }
        if let Some(code) = self.code {
            rule.code = code;
        }
    }
}

fn check_name(name: &str) -> Result<(), AppError> {
    if name.trim().is_empty() {
        return Err(AppError::bad_request("Rule name must not be empty"));
    }
    Ok(())
}

/// POST /api/rules - Create a draft rule, or save one by id
async fn create_rule(
    State(state): State<AppState>,
    Json(req): Json<CreateRuleRequest>,
) -> Result<(StatusCode, Json<SavedRule>), AppError> {
    check_name(&req.name)?;

    let Some(id) = req.id else {
        let mut rule = state.store.create_rule(&req.name, req.kind)?;
        if !req.fields.is_empty() {
            req.fields.apply(&mut rule);
            rule = state.store.save_rule(rule)?;
        }
        return Ok((StatusCode::CREATED, Json(rule.into())));
    };

    let (status, mut rule) = match state.store.get_rule(&id) {
        Ok(existing) => (StatusCode::OK, existing),
        Err(CalRulesError::RuleNotFound(_)) => {
            let code = Rule::template_code(&req.name, req.kind);
            (StatusCode::CREATED, Rule::new(id, req.name.clone(), req.kind, code))
        }
        Err(e) => return Err(e.into()),
    };
    rule.name = req.name;
    rule.kind = req.kind;
    req.fields.apply(&mut rule);

    Ok((status, Json(state.store.save_rule(rule)?.into())))
}

/// Request body for updating a stored rule
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRuleRequest {
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<RuleKind>,
    #[serde(flatten)]
    pub fields: RuleFields,
}

/// PUT /api/rules/:id - Change any of a rule's fields
async fn update_rule(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<UpdateRuleRequest>,
) -> Result<Json<SavedRule>, AppError> {
    let mut rule = state.store.get_rule(&id)?;
    if let Some(name) = req.name {
        check_name(&name)?;
        rule.name = name;
    }
    if let Some(kind) = req.kind {
        rule.kind = kind;
    }
    req.fields.apply(&mut rule);

    Ok(Json(state.store.save_rule(rule)?.into()))
}

/// GET /api/rules/:id
async fn get_rule(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Rule>, AppError> {
    Ok(Json(state.store.get_rule(&id)?))
}

/// DELETE /api/rules/:id
async fn delete_rule(State(state): State<AppState>, Path(id): Path<String>) -> Result<StatusCode, AppError> {
    state.store.delete_rule(&id)?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Serialize, Deserialize)]
pub struct RuleCode {
    pub code: String,
}

/// GET /api/rules/:id/code
async fn get_code(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<RuleCode>, AppError> {
    let code = state.store.get_rule_code(&id)?;
    Ok(Json(RuleCode { code }))
}

/// PUT /api/rules/:id/code - Code is saved even when it does not compile
async fn put_code(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<RuleCode>,
) -> Result<Json<SavedRule>, AppError> {
    let rule = state.store.save_rule_code(&id, &req.code)?;
    Ok(Json(rule.into()))
}

async fn enable(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<SavedRule>, AppError> {
    Ok(Json(state.store.enable(&id)?.into()))
}

async fn disable(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<SavedRule>, AppError> {
    Ok(Json(state.store.disable(&id)?.into()))
}

async fn pause(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<SavedRule>, AppError> {
    Ok(Json(state.store.pause(&id)?.into()))
}

async fn toggle(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<SavedRule>, AppError> {
    Ok(Json(state.store.toggle(&id)?.into()))
}

async fn duplicate(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<Rule>), AppError> {
    Ok((StatusCode::CREATED, Json(state.store.duplicate(&id)?)))
}
