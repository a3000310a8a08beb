//! Operation-control and status endpoints for scan/cleanup/file-changes
//! (§4.7). Start endpoints spawn the operation in the background and
//! return immediately; progress is polled through the status endpoint.

use std::path::PathBuf;

use axum::extract::{Path as AxumPath, State};
use axum::http::StatusCode;
use axum::response::Json;
use custodian_core::engine::{run_cleanup, run_file_changes, run_rescan, run_scan, RescanRequest, ScanRequest};
use custodian_core::model::OperationKind;
use custodian_core::progress;
use serde::{Deserialize, Serialize};

use crate::errors::{AppError, AppResult};
use crate::state::AppState;

fn parse_kind(s: &str) -> AppResult<OperationKind> {
    match s {
        "scan" => Ok(OperationKind::Scan),
        "cleanup" => Ok(OperationKind::Cleanup),
        "file_changes" | "file-changes" => Ok(OperationKind::FileChanges),
        other => Err(AppError::bad_request(format!("unknown operation variant: {other}"))),
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct StartScanBody {
    #[serde(default)]
    deep_scan: bool,
}

pub async fn start_scan(State(state): State<AppState>, Json(body): Json<StartScanBody>) -> AppResult<StatusCode> {
    if state.engine.status(OperationKind::Scan).await?.map(|s| s.is_active).unwrap_or(false) {
        return Err(AppError::conflict("scan already active"));
    }
    let engine = state.engine.clone();
    tokio::spawn(async move {
        if let Err(e) = run_scan(&engine, ScanRequest { deep_scan: body.deep_scan }).await {
            tracing::error!(error = %e, "scan run failed");
        }
    });
    Ok(StatusCode::ACCEPTED)
}

#[derive(Debug, Deserialize)]
pub struct RescanBody {
    paths: Vec<PathBuf>,
    #[serde(default)]
    deep_scan: bool,
}

pub async fn start_rescan(State(state): State<AppState>, Json(body): Json<RescanBody>) -> AppResult<StatusCode> {
    if body.paths.is_empty() {
        return Err(AppError::bad_request("rescan requires at least one path"));
    }
    if state.engine.status(OperationKind::Scan).await?.map(|s| s.is_active).unwrap_or(false) {
        return Err(AppError::conflict("scan already active"));
    }
    let engine = state.engine.clone();
    tokio::spawn(async move {
        if let Err(e) = run_rescan(&engine, RescanRequest { paths: body.paths, deep_scan: body.deep_scan }).await {
            tracing::error!(error = %e, "targeted rescan failed");
        }
    });
    Ok(StatusCode::ACCEPTED)
}

pub async fn start_cleanup(State(state): State<AppState>) -> AppResult<StatusCode> {
    if state.engine.status(OperationKind::Cleanup).await?.map(|s| s.is_active).unwrap_or(false) {
        return Err(AppError::conflict("cleanup already active"));
    }
    let engine = state.engine.clone();
    tokio::spawn(async move {
        if let Err(e) = run_cleanup(&engine).await {
            tracing::error!(error = %e, "cleanup run failed");
        }
    });
    Ok(StatusCode::ACCEPTED)
}

pub async fn start_file_changes(State(state): State<AppState>) -> AppResult<StatusCode> {
    if state.engine.status(OperationKind::FileChanges).await?.map(|s| s.is_active).unwrap_or(false) {
        return Err(AppError::conflict("file-changes already active"));
    }
    let engine = state.engine.clone();
    tokio::spawn(async move {
        if let Err(e) = run_file_changes(&engine).await {
            tracing::error!(error = %e, "file-changes run failed");
        }
    });
    Ok(StatusCode::ACCEPTED)
}

pub async fn cancel(State(state): State<AppState>, AxumPath(kind): AxumPath<String>) -> AppResult<StatusCode> {
    state.engine.cancel(parse_kind(&kind)?).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn recover_stuck_scan(State(state): State<AppState>) -> AppResult<Json<serde_json::Value>> {
    let reset = state.engine.recover_stuck_scan().await?;
    Ok(Json(serde_json::json!({ "reset": reset })))
}

pub async fn reset_operation(State(state): State<AppState>, AxumPath(kind): AxumPath<String>) -> AppResult<Json<serde_json::Value>> {
    let reset = state.engine.reset_operation(parse_kind(&kind)?).await?;
    Ok(Json(serde_json::json!({ "reset": reset })))
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    is_running: bool,
    phase: String,
    phase_number: i32,
    total_phases: i32,
    phase_current: i64,
    phase_total: i64,
    files_processed: i64,
    total_files: i64,
    current_file: Option<String>,
    progress_message: String,
    progress_percentage: f64,
    counters: custodian_core::model::OperationCounters,
    duration_seconds: Option<f64>,
    start_time: Option<chrono::DateTime<chrono::Utc>>,
}

pub async fn status(State(state): State<AppState>, AxumPath(kind): AxumPath<String>) -> AppResult<Json<StatusResponse>> {
    let kind = parse_kind(&kind)?;
    let Some(op) = state.engine.status(kind).await? else {
        return Ok(Json(StatusResponse {
            is_running: false,
            phase: "idle".to_string(),
            phase_number: 0,
            total_phases: kind.phase_weights().len() as i32,
            phase_current: 0,
            phase_total: 0,
            files_processed: 0,
            total_files: 0,
            current_file: None,
            progress_message: "idle".to_string(),
            progress_percentage: 0.0,
            counters: custodian_core::model::OperationCounters::default(),
            duration_seconds: None,
            start_time: None,
        }));
    };

    let elapsed = (chrono::Utc::now() - op.start_time).num_milliseconds() as f64 / 1000.0;
    let percentage = progress::percent_complete(kind, op.phase_number, op.phase_current, op.phase_total);
    let message = progress::progress_message(
        kind,
        op.phase_number,
        op.current_file.as_deref(),
        op.files_processed,
        op.total_files,
        elapsed,
    );

    Ok(Json(StatusResponse {
        is_running: op.is_active,
        phase: op.phase,
        phase_number: op.phase_number,
        total_phases: kind.phase_weights().len() as i32,
        phase_current: op.phase_current,
        phase_total: op.phase_total,
        files_processed: op.files_processed,
        total_files: op.total_files,
        current_file: op.current_file,
        progress_message: message,
        progress_percentage: percentage,
        counters: op.counters,
        duration_seconds: op.is_active.then_some(elapsed),
        start_time: op.is_active.then_some(op.start_time),
    }))
}
