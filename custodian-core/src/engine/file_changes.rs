use chrono::Utc;
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::catalog::ScanResultUpdate;
use crate::model::{OperationKind, ScanReport, ScanStatus, TerminalPhase};
use crate::prober::{self, hash_file};
use crate::write::WriteMessage;

use super::{merge_patterns, Engine};

const HASH_BATCH_SIZE: i64 = 100;

/// One detected change, surfaced in the operation counters as JSON and used
/// to drive phase 3's targeted rescans (§4.4.3).
#[derive(Debug, Clone, Serialize)]
struct ChangeDescriptor {
    file_path: String,
    change_type: &'static str,
    stored_hash: Option<String>,
    current_hash: Option<String>,
}

/// File-changes: detects files that were modified or deleted since their
/// last scan, then rescans the modified ones to see if the change
/// introduced corruption (§4.4.3).
pub async fn run_file_changes(engine: &Engine) -> crate::error::Result<()> {
    let started_at = Utc::now();
    let total = engine.catalog().counts().await?.total;
    let mut state = engine.begin(OperationKind::FileChanges, 1, total).await?;
    let ctx = engine.run_context();

    state.phase_number = 2;
    state.phase = OperationKind::FileChanges.phase_name(2).to_string();
    engine.publish(&state).await?;

    // Phase 2 — checking hashes.
    let mut changes: Vec<ChangeDescriptor> = Vec::new();
    let mut offset = 0i64;
    let mut since_progress = 0i64;

    loop {
        if engine.is_cancelled(OperationKind::FileChanges, state.operation_id).await? {
            engine.finish(state, TerminalPhase::Cancelled, None).await?;
            return Ok(());
        }

        let rows = ctx
            .catalog
            .list(&crate::catalog::ListFilter {
                limit: HASH_BATCH_SIZE,
                offset,
                ..Default::default()
            })
            .await?;
        if rows.is_empty() {
            break;
        }

        for row in &rows {
            if engine.is_cancelled(OperationKind::FileChanges, state.operation_id).await? {
                engine.finish(state, TerminalPhase::Cancelled, None).await?;
                return Ok(());
            }

            state.current_file = Some(row.file_path.clone());
            let path = std::path::Path::new(&row.file_path);
            match tokio::fs::metadata(path).await {
                Err(_) => {
                    changes.push(ChangeDescriptor {
                        file_path: row.file_path.clone(),
                        change_type: "deleted",
                        stored_hash: row.file_hash.clone(),
                        current_hash: None,
                    });
                }
                Ok(metadata) => {
                    let current_modified: chrono::DateTime<Utc> =
                        metadata.modified().map(chrono::DateTime::from).unwrap_or_else(|_| Utc::now());
                    let stored_modified = row.last_modified.unwrap_or(chrono::DateTime::<Utc>::MIN_UTC);
                    if current_modified > stored_modified {
                        if let Ok(current_hash) = hash_file(path).await {
                            if Some(&current_hash) != row.file_hash.as_ref() {
                                changes.push(ChangeDescriptor {
                                    file_path: row.file_path.clone(),
                                    change_type: "modified",
                                    stored_hash: row.file_hash.clone(),
                                    current_hash: Some(current_hash),
                                });
                            }
                        }
                    }
                }
            }

            state.files_processed += 1;
            since_progress += 1;
            if since_progress >= 5 {
                state.phase_current = state.files_processed;
                engine.publish(&state).await?;
                since_progress = 0;
            }
        }

        offset += rows.len() as i64;
        state.phase_current = state.files_processed;
        engine.publish(&state).await?;
    }

    state.counters.changes_found = changes.len() as i64;
    state.counters.changed_files_json = serde_json::to_string(&changes).ok();
    engine.publish(&state).await?;

    // Phase 3 — verifying changes: rescan modified files through the prober.
    state.phase_number = 3;
    state.phase = OperationKind::FileChanges.phase_name(3).to_string();
    state.phase_current = 0;
    state.phase_total = changes.iter().filter(|c| c.change_type == "modified").count() as i64;
    engine.publish(&state).await?;

    let ignored = merge_patterns(&ctx.catalog.ignored_error_patterns().await?);
    let mut corrupted_found = 0i64;

    for change in changes.iter().filter(|c| c.change_type == "modified") {
        if engine.is_cancelled(OperationKind::FileChanges, state.operation_id).await? {
            engine.finish(state, TerminalPhase::Cancelled, None).await?;
            return Ok(());
        }
        let Some(existing) = ctx.catalog.get_by_path(&change.file_path).await? else {
            continue;
        };
        state.current_file = Some(change.file_path.clone());
        let path = std::path::Path::new(&change.file_path);
        let size = existing.file_size.unwrap_or(0).max(0) as u64;
        let verdict = prober::probe_file(ctx.tools.as_ref(), path, size, existing.deep_scan, &ignored).await;
        if verdict.is_corrupted() {
            corrupted_found += 1;
        }

        let output = verdict.output_lines().join("\n");
        ctx.writer
            .send(WriteMessage::UpdateScanResult {
                id: existing.id,
                update: ScanResultUpdate {
                    scan_status: verdict.scan_status(),
                    is_corrupted: Some(verdict.is_corrupted()),
                    has_warnings: verdict.has_warnings(),
                    warning_details: verdict.warning_details().map(str::to_owned),
                    corruption_details: verdict.corruption_details().map(str::to_owned),
                    scan_tool: verdict.scan_tool().map(str::to_owned),
                    scan_duration: Some(0.0),
                    scan_output: if output.is_empty() { None } else { Some(output) },
                    file_hash: change.current_hash.clone(),
                    scan_date: Some(Utc::now()),
                    deep_scan: existing.deep_scan,
                },
            })
            .await?;

        state.phase_current += 1;
        engine.publish(&state).await?;
    }

    // Deleted files have no remaining content to rescan; mark them absent.
    for change in changes.iter().filter(|c| c.change_type == "deleted") {
        if let Some(existing) = ctx.catalog.get_by_path(&change.file_path).await? {
            ctx.writer
                .send(WriteMessage::UpdateScanResult {
                    id: existing.id,
                    update: ScanResultUpdate {
                        scan_status: ScanStatus::Error,
                        is_corrupted: None,
                        has_warnings: false,
                        warning_details: None,
                        corruption_details: Some("file no longer exists on disk".to_string()),
                        scan_tool: None,
                        scan_duration: None,
                        scan_output: None,
                        file_hash: existing.file_hash.clone(),
                        scan_date: Some(Utc::now()),
                        deep_scan: existing.deep_scan,
                    },
                })
                .await?;
        }
    }

    state.counters.corrupted_found = corrupted_found;

    let report = ScanReport {
        id: 0,
        report_id: Uuid::now_v7(),
        operation_id: state.operation_id,
        scan_type: OperationKind::FileChanges,
        started_at,
        completed_at: Utc::now(),
        duration_seconds: (Utc::now() - started_at).num_milliseconds() as f64 / 1000.0,
        directories: Vec::new(),
        files_scanned: 0,
        files_corrupted: 0,
        files_with_warnings: 0,
        orphaned_records_found: 0,
        orphaned_records_deleted: 0,
        files_changed: changes.len() as i64,
        files_corrupted_new: corrupted_found,
    };
    ctx.writer.send(WriteMessage::InsertReport(report)).await?;

    engine.finish(state, TerminalPhase::Completed, None).await?;
    info!(changes_found = changes.len(), corrupted_found, "file-changes complete");
    Ok(())
}
