use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use futures::stream::{FuturesUnordered, StreamExt};
use tracing::{info, warn};
use uuid::Uuid;

use crate::catalog::ScanResultUpdate;
use crate::discovery::{self, ExclusionSet};
use crate::model::{NewScanResult, OperationKind, OperationState, ScanReport, ScanStatus, TerminalPhase};
use crate::prober::{self, Verdict};
use crate::write::{BatchItem, ScanResultUpdateBatch, WriteMessage};

use super::{chunked, merge_patterns, Engine};

const ADDING_BATCH_SIZE: usize = 100;
const FULL_SCAN_BATCH_SIZE: i64 = 1000;
const RESCAN_BATCH_SIZE: i64 = 100;
const WRITE_BATCH_SIZE: usize = 50;

/// A full (or incremental) scan of the configured roots.
#[derive(Debug, Clone, Default)]
pub struct ScanRequest {
    pub deep_scan: bool,
}

/// A targeted rescan of an explicit file list, entering phase 3 directly.
#[derive(Debug, Clone)]
pub struct RescanRequest {
    pub paths: Vec<PathBuf>,
    pub deep_scan: bool,
}

pub async fn run_scan(engine: &Engine, request: ScanRequest) -> crate::error::Result<()> {
    let mut state = engine.begin(OperationKind::Scan, 1, 0).await?;
    let ctx = engine.run_context();
    let started_at = Utc::now();

    // Phase 1 — discovery. The walk itself is synchronous, so progress is
    // relayed through a shared counter a lightweight task mirrors into the
    // operation state at the bounded rate (no more than once per 100 files).
    let known = ctx.catalog.known_paths().await?;
    let exclusion_rows = ctx.catalog.exclusions().await?;
    let exclusions = ExclusionSet::from_rows(&exclusion_rows);
    let cancel_flag: Arc<AtomicBool> = Arc::new(AtomicBool::new(false));
    let roots = engine.config().scan_roots.clone();

    let watcher = {
        let cancel_flag = cancel_flag.clone();
        let engine = engine.clone();
        let operation_id = state.operation_id;
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(std::time::Duration::from_millis(250)).await;
                match engine.is_cancelled(OperationKind::Scan, operation_id).await {
                    Ok(true) => {
                        cancel_flag.store(true, Ordering::Relaxed);
                        break;
                    }
                    Ok(false) => continue,
                    Err(_) => break,
                }
            }
        })
    };
    let discovered = {
        let roots = roots.clone();
        let cancel_flag = cancel_flag.clone();
        let max_workers = ctx.max_workers;
        let max_files_per_scan = ctx.max_files_per_scan;
        let result = tokio::task::spawn_blocking(move || {
            discovery::discover(&roots, &exclusions, &known, &cancel_flag, max_workers, max_files_per_scan, |_count| {})
        })
        .await
        .map_err(|e| crate::error::CatalogError::Internal(format!("discovery task panicked: {e}")));
        watcher.abort();
        result?
    };

    state.phase_current = discovered.len() as i64;
    state.counters.discovery_count = discovered.len() as i64;
    engine.publish(&state).await?;

    if engine.is_cancelled(OperationKind::Scan, state.operation_id).await? {
        engine.finish(state, TerminalPhase::Cancelled, None).await?;
        return Ok(());
    }

    // Phase 2 — adding.
    state.phase_number = 2;
    state.phase = OperationKind::Scan.phase_name(2).to_string();
    state.phase_current = 0;
    state.phase_total = discovered.len() as i64;
    engine.publish(&state).await?;

    for batch in chunked(&discovered, ADDING_BATCH_SIZE) {
        if engine.is_cancelled(OperationKind::Scan, state.operation_id).await? {
            engine.finish(state, TerminalPhase::Cancelled, None).await?;
            return Ok(());
        }
        for file in batch {
            let new = NewScanResult {
                file_path: file.path.to_string_lossy().into_owned(),
                file_size: file.file_size,
                file_type: file
                    .path
                    .extension()
                    .and_then(|e| e.to_str())
                    .unwrap_or("")
                    .to_lowercase(),
                creation_date: file.created,
                last_modified: file.modified,
                discovered_date: Utc::now(),
            };
            ctx.writer.send(WriteMessage::InsertDiscovered(new)).await?;
        }
        state.phase_current += batch.len() as i64;
        engine.publish(&state).await?;
    }

    // Phase 3 — scanning.
    state.phase_number = 3;
    state.phase = OperationKind::Scan.phase_name(3).to_string();
    state.phase_current = 0;
    engine.publish(&state).await?;

    let ignored = merge_patterns(&ctx.catalog.ignored_error_patterns().await?);
    let batch_size = FULL_SCAN_BATCH_SIZE;

    let mut files_scanned = 0i64;
    let mut files_corrupted = 0i64;
    let mut files_with_warnings = 0i64;
    let mut pending_updates: Vec<BatchItem> = Vec::new();

    loop {
        if engine.is_cancelled(OperationKind::Scan, state.operation_id).await? {
            flush_updates(&ctx, &mut pending_updates).await?;
            engine.finish(state, TerminalPhase::Cancelled, None).await?;
            return Ok(());
        }

        let pending = ctx
            .catalog
            .list(&crate::catalog::ListFilter {
                status: Some(ScanStatus::Pending),
                limit: batch_size,
                offset: 0,
                ..Default::default()
            })
            .await?;
        if pending.is_empty() {
            break;
        }
        state.phase_total += pending.len() as i64;

        let mut tasks = FuturesUnordered::new();
        for row in pending {
            let tools = ctx.tools.clone();
            let ignored = ignored.clone();
            let path = PathBuf::from(&row.file_path);
            let size = row.file_size.unwrap_or(0).max(0) as u64;
            let deep_scan = row.deep_scan || request.deep_scan;
            tasks.push(async move {
                let start = std::time::Instant::now();
                let verdict = prober::probe_file(tools.as_ref(), &path, size, deep_scan, &ignored).await;
                (row.id, path, verdict, start.elapsed().as_secs_f64(), deep_scan)
            });
            if tasks.len() >= ctx.max_workers {
                if let Some((id, path, verdict, duration, deep_scan)) = tasks.next().await {
                    record_verdict(id, &path, verdict, duration, deep_scan, &mut files_scanned, &mut files_corrupted, &mut files_with_warnings, &mut pending_updates).await?;
                    state.phase_current += 1;
                    state.files_processed += 1;
                    state.current_file = Some(path.display().to_string());
                    if pending_updates.len() >= WRITE_BATCH_SIZE {
                        flush_updates(&ctx, &mut pending_updates).await?;
                    }
                    if state.files_processed % 20 == 0 {
                        engine.publish(&state).await?;
                    }
                }
            }
        }
        while let Some((id, path, verdict, duration, deep_scan)) = tasks.next().await {
            record_verdict(id, &path, verdict, duration, deep_scan, &mut files_scanned, &mut files_corrupted, &mut files_with_warnings, &mut pending_updates).await?;
            state.phase_current += 1;
            state.files_processed += 1;
            state.current_file = Some(path.display().to_string());
            if pending_updates.len() >= WRITE_BATCH_SIZE {
                flush_updates(&ctx, &mut pending_updates).await?;
            }
        }
        flush_updates(&ctx, &mut pending_updates).await?;
        engine.publish(&state).await?;
    }

    let remaining_pending = ctx
        .catalog
        .list(&crate::catalog::ListFilter {
            status: Some(ScanStatus::Pending),
            limit: 1,
            offset: 0,
            ..Default::default()
        })
        .await?;
    if !remaining_pending.is_empty() {
        warn!(
            operation_id = %state.operation_id,
            "scan completed with pending rows remaining (pagination or cancellation partial-completion)"
        );
    }

    let report = ScanReport {
        id: 0,
        report_id: Uuid::now_v7(),
        operation_id: state.operation_id,
        scan_type: OperationKind::Scan,
        started_at,
        completed_at: Utc::now(),
        duration_seconds: (Utc::now() - started_at).num_milliseconds() as f64 / 1000.0,
        directories: engine.config().scan_roots.iter().map(|p| p.display().to_string()).collect(),
        files_scanned,
        files_corrupted,
        files_with_warnings,
        orphaned_records_found: 0,
        orphaned_records_deleted: 0,
        files_changed: 0,
        files_corrupted_new: 0,
    };
    ctx.writer.send(WriteMessage::InsertReport(report)).await?;

    engine.finish(state, TerminalPhase::Completed, None).await?;
    info!(files_scanned, files_corrupted, files_with_warnings, "scan complete");
    Ok(())
}

/// Resets the given paths to `pending` and runs phase 3 directly.
pub async fn run_rescan(engine: &Engine, request: RescanRequest) -> crate::error::Result<()> {
    let mut state = engine.begin(OperationKind::Scan, 3, request.paths.len() as i64).await?;
    let ctx = engine.run_context();
    let started_at = Utc::now();

    for batch in chunked(&request.paths, RESCAN_BATCH_SIZE as usize) {
        for path in batch {
            if let Some(existing) = ctx.catalog.get_by_path(&path.to_string_lossy()).await? {
                ctx.writer
                    .send(WriteMessage::UpdateScanResult {
                        id: existing.id,
                        update: ScanResultUpdate {
                            scan_status: ScanStatus::Pending,
                            is_corrupted: existing.is_corrupted,
                            has_warnings: existing.has_warnings,
                            warning_details: existing.warning_details.clone(),
                            corruption_details: existing.corruption_details.clone(),
                            scan_tool: existing.scan_tool.clone(),
                            scan_duration: existing.scan_duration,
                            scan_output: existing.scan_output.clone(),
                            file_hash: existing.file_hash.clone(),
                            scan_date: None,
                            deep_scan: request.deep_scan || existing.deep_scan,
                        },
                    })
                    .await?;
            }
        }
    }

    let ignored = merge_patterns(&ctx.catalog.ignored_error_patterns().await?);
    let mut files_scanned = 0i64;
    let mut files_corrupted = 0i64;
    let mut files_with_warnings = 0i64;

    for path in &request.paths {
        if engine.is_cancelled(OperationKind::Scan, state.operation_id).await? {
            engine.finish(state, TerminalPhase::Cancelled, None).await?;
            return Ok(());
        }
        let Some(existing) = ctx.catalog.get_by_path(&path.to_string_lossy()).await? else {
            continue;
        };
        let size = existing.file_size.unwrap_or(0).max(0) as u64;
        let deep_scan = request.deep_scan || existing.deep_scan;
        let verdict = prober::probe_file(ctx.tools.as_ref(), path, size, deep_scan, &ignored).await;
        let mut pending_updates = Vec::new();
        record_verdict(
            existing.id,
            path,
            verdict,
            0.0,
            deep_scan,
            &mut files_scanned,
            &mut files_corrupted,
            &mut files_with_warnings,
            &mut pending_updates,
        )
        .await?;
        flush_updates(&ctx, &mut pending_updates).await?;
        state.phase_current += 1;
        state.files_processed += 1;
        state.current_file = Some(path.display().to_string());
        engine.publish(&state).await?;
    }

    let report = ScanReport {
        id: 0,
        report_id: Uuid::now_v7(),
        operation_id: state.operation_id,
        scan_type: OperationKind::Scan,
        started_at,
        completed_at: Utc::now(),
        duration_seconds: (Utc::now() - started_at).num_milliseconds() as f64 / 1000.0,
        directories: Vec::new(),
        files_scanned,
        files_corrupted,
        files_with_warnings,
        orphaned_records_found: 0,
        orphaned_records_deleted: 0,
        files_changed: 0,
        files_corrupted_new: 0,
    };
    ctx.writer.send(WriteMessage::InsertReport(report)).await?;
    engine.finish(state, TerminalPhase::Completed, None).await?;
    Ok(())
}

/// Builds the scan-result update for one verdict and appends it to the
/// pending write batch; the caller flushes via [`flush_updates`] once it
/// accumulates enough items (§5 "one batched transaction").
#[allow(clippy::too_many_arguments)]
async fn record_verdict(
    id: i64,
    path: &std::path::Path,
    verdict: Verdict,
    duration: f64,
    deep_scan: bool,
    files_scanned: &mut i64,
    files_corrupted: &mut i64,
    files_with_warnings: &mut i64,
    pending_updates: &mut Vec<BatchItem>,
) -> crate::error::Result<()> {
    *files_scanned += 1;
    if verdict.is_corrupted() {
        *files_corrupted += 1;
    }
    if verdict.has_warnings() {
        *files_with_warnings += 1;
    }

    let output = verdict.output_lines().join("\n");
    let file_hash = if matches!(verdict, Verdict::Error { .. }) {
        None
    } else {
        crate::prober::hash_file(path).await.ok()
    };

    let update = ScanResultUpdate {
        scan_status: verdict.scan_status(),
        is_corrupted: if matches!(verdict, Verdict::Error { .. }) {
            None
        } else {
            Some(verdict.is_corrupted())
        },
        has_warnings: verdict.has_warnings(),
        warning_details: verdict.warning_details().map(str::to_owned),
        corruption_details: verdict
            .corruption_details()
            .map(str::to_owned)
            .or_else(|| verdict.error_message().map(str::to_owned)),
        scan_tool: verdict.scan_tool().map(str::to_owned),
        scan_duration: Some(duration),
        scan_output: if output.is_empty() { None } else { Some(output) },
        file_hash,
        scan_date: Some(Utc::now()),
        deep_scan,
    };
    pending_updates.push(BatchItem { id, update });
    Ok(())
}

/// Sends the accumulated scan-result updates as one
/// `BatchUpdateScanResults` message, applied inside a single transaction by
/// the write serializer.
async fn flush_updates(ctx: &super::RunContext, pending_updates: &mut Vec<BatchItem>) -> crate::error::Result<()> {
    if pending_updates.is_empty() {
        return Ok(());
    }
    let items = std::mem::take(pending_updates);
    ctx.writer.send(WriteMessage::BatchUpdateScanResults(ScanResultUpdateBatch { items })).await
}
