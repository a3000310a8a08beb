//! Administration endpoints: path/extension exclusions, ignored error
//! patterns, schedules, and scan configuration (§4.7).

use axum::extract::{Path as AxumPath, State};
use axum::http::StatusCode;
use axum::response::Json;
use custodian_core::model::{Exclusion, ExclusionType, IgnoredErrorPattern, OperationKind, ScanSchedule};
use serde::Deserialize;

use crate::errors::{AppError, AppResult};
use crate::state::AppState;

pub async fn list_exclusions(State(state): State<AppState>) -> AppResult<Json<Vec<Exclusion>>> {
    Ok(Json(state.catalog.exclusions().await?))
}

#[derive(Debug, Deserialize)]
pub struct AddExclusionBody {
    #[serde(rename = "type")]
    kind: String,
    value: String,
}

pub async fn add_exclusion(State(state): State<AppState>, Json(body): Json<AddExclusionBody>) -> AppResult<StatusCode> {
    if body.value.trim().is_empty() {
        return Err(AppError::bad_request("exclusion value must not be empty"));
    }
    let kind = match body.kind.as_str() {
        "path" => ExclusionType::Path,
        "extension" => ExclusionType::Extension,
        other => return Err(AppError::bad_request(format!("unknown exclusion type: {other}"))),
    };
    state.catalog.add_exclusion(kind, &body.value).await?;
    Ok(StatusCode::CREATED)
}

pub async fn remove_exclusion(State(state): State<AppState>, AxumPath(id): AxumPath<i64>) -> AppResult<StatusCode> {
    if state.catalog.remove_exclusion(id).await? == 0 {
        return Err(AppError::not_found(format!("exclusion {id} not found")));
    }
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_ignored_patterns(State(state): State<AppState>) -> AppResult<Json<Vec<IgnoredErrorPattern>>> {
    Ok(Json(state.catalog.ignored_error_patterns().await?))
}

#[derive(Debug, Deserialize)]
pub struct AddPatternBody {
    pattern: String,
    description: Option<String>,
}

pub async fn add_ignored_pattern(State(state): State<AppState>, Json(body): Json<AddPatternBody>) -> AppResult<StatusCode> {
    if body.pattern.trim().is_empty() {
        return Err(AppError::bad_request("pattern must not be empty"));
    }
    state.catalog.add_ignored_pattern(&body.pattern, body.description.as_deref()).await?;
    Ok(StatusCode::CREATED)
}

pub async fn remove_ignored_pattern(State(state): State<AppState>, AxumPath(id): AxumPath<i64>) -> AppResult<StatusCode> {
    if state.catalog.remove_ignored_pattern(id).await? == 0 {
        return Err(AppError::not_found(format!("pattern {id} not found")));
    }
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_schedules(State(state): State<AppState>) -> AppResult<Json<Vec<ScanSchedule>>> {
    Ok(Json(state.catalog.schedules().await?))
}

#[derive(Debug, Deserialize)]
pub struct AddScheduleBody {
    name: String,
    time_expression: String,
    variant: String,
}

pub async fn add_schedule(State(state): State<AppState>, Json(body): Json<AddScheduleBody>) -> AppResult<StatusCode> {
    let variant = match body.variant.as_str() {
        "scan" => OperationKind::Scan,
        "cleanup" => OperationKind::Cleanup,
        "file_changes" | "file-changes" => OperationKind::FileChanges,
        other => return Err(AppError::bad_request(format!("unknown variant: {other}"))),
    };
    if body.name.trim().is_empty() || body.time_expression.trim().is_empty() {
        return Err(AppError::bad_request("name and time_expression are required"));
    }
    state.catalog.add_schedule(&body.name, &body.time_expression, variant).await?;
    Ok(StatusCode::CREATED)
}

pub async fn remove_schedule(State(state): State<AppState>, AxumPath(id): AxumPath<i64>) -> AppResult<StatusCode> {
    if state.catalog.remove_schedule(id).await? == 0 {
        return Err(AppError::not_found(format!("schedule {id} not found")));
    }
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct SetConfigBody {
    value: String,
}

pub async fn get_config(
    State(state): State<AppState>,
    AxumPath(key): AxumPath<String>,
) -> AppResult<Json<custodian_core::model::ScanConfiguration>> {
    state.catalog.get_config(&key).await?.map(Json).ok_or_else(|| AppError::not_found(format!("config key {key} not set")))
}

pub async fn set_config(
    State(state): State<AppState>,
    AxumPath(key): AxumPath<String>,
    Json(body): Json<SetConfigBody>,
) -> AppResult<StatusCode> {
    state.catalog.set_config(&key, &body.value).await?;
    Ok(StatusCode::NO_CONTENT)
}
