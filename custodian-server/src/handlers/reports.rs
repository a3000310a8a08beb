//! Scan-report endpoints (§4.7). Multi-report bundle download returns the
//! list of report ids to include; producing the archive itself is out of
//! scope for this service.

use axum::extract::{Path as AxumPath, Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use custodian_core::model::{OperationKind, ScanReport};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{AppError, AppResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    scan_type: Option<String>,
    page: Option<i64>,
    page_size: Option<i64>,
}

fn parse_kind(s: &str) -> AppResult<OperationKind> {
    match s {
        "scan" => Ok(OperationKind::Scan),
        "cleanup" => Ok(OperationKind::Cleanup),
        "file_changes" | "file-changes" => Ok(OperationKind::FileChanges),
        other => Err(AppError::bad_request(format!("unknown scan_type: {other}"))),
    }
}

pub async fn list(State(state): State<AppState>, Query(q): Query<ListQuery>) -> AppResult<Json<Vec<ScanReport>>> {
    let scan_type = q.scan_type.as_deref().map(parse_kind).transpose()?;
    let page = q.page.unwrap_or(1).max(1);
    let page_size = q.page_size.unwrap_or(50).clamp(1, 500);
    Ok(Json(state.catalog.list_reports(scan_type, page_size, (page - 1) * page_size).await?))
}

pub async fn get_one(State(state): State<AppState>, AxumPath(report_id): AxumPath<Uuid>) -> AppResult<Json<ScanReport>> {
    state
        .catalog
        .get_report(report_id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::not_found(format!("report {report_id} not found")))
}

pub async fn latest(State(state): State<AppState>, AxumPath(scan_type): AxumPath<String>) -> AppResult<Json<ScanReport>> {
    let kind = parse_kind(&scan_type)?;
    state.catalog.latest_report(kind).await?.map(Json).ok_or_else(|| AppError::not_found(format!("no {kind} reports yet")))
}

pub async fn delete(State(state): State<AppState>, AxumPath(report_id): AxumPath<Uuid>) -> AppResult<StatusCode> {
    if state.catalog.delete_report(report_id).await? == 0 {
        return Err(AppError::not_found(format!("report {report_id} not found")));
    }
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct BundleBody {
    report_ids: Vec<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct BundleResponse {
    report_ids: Vec<Uuid>,
}

/// Resolves a bundle request to the set of report ids the caller should
/// package; archive production happens outside this service.
pub async fn bundle(State(state): State<AppState>, Json(body): Json<BundleBody>) -> AppResult<Json<BundleResponse>> {
    let mut found = Vec::new();
    for id in body.report_ids {
        if state.catalog.get_report(id).await?.is_some() {
            found.push(id);
        }
    }
    Ok(Json(BundleResponse { report_ids: found }))
}
