use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::model::{OperationKind, ScanReport, TerminalPhase};
use crate::write::WriteMessage;

use super::{chunked, Engine};

const DELETE_BATCH_SIZE: usize = 50;

/// Cleanup: finds `scan_results` rows whose backing file no longer exists
/// and removes them (§4.4.2).
pub async fn run_cleanup(engine: &Engine) -> crate::error::Result<()> {
    let started_at = Utc::now();

    // Phase 1 — counts total rows, sets phase totals.
    let total = engine.catalog().counts().await?.total;
    let mut state = engine.begin(OperationKind::Cleanup, 1, total).await?;
    let ctx = engine.run_context();

    state.phase_number = 2;
    state.phase = OperationKind::Cleanup.phase_name(2).to_string();
    engine.publish(&state).await?;

    // Phase 2 — iterate all rows, probing filesystem existence.
    let mut orphaned_ids = Vec::new();
    let mut offset = 0i64;
    const SCAN_BATCH: i64 = 500;
    loop {
        if engine.is_cancelled(OperationKind::Cleanup, state.operation_id).await? {
            engine.finish(state, TerminalPhase::Cancelled, None).await?;
            return Ok(());
        }

        let rows = ctx
            .catalog
            .list(&crate::catalog::ListFilter {
                limit: SCAN_BATCH,
                offset,
                ..Default::default()
            })
            .await?;
        if rows.is_empty() {
            break;
        }

        for row in &rows {
            if engine.is_cancelled(OperationKind::Cleanup, state.operation_id).await? {
                engine.finish(state, TerminalPhase::Cancelled, None).await?;
                return Ok(());
            }
            if !tokio::fs::try_exists(&row.file_path).await.unwrap_or(false) {
                orphaned_ids.push(row.id);
            }
            state.current_file = Some(row.file_path.clone());
            state.phase_current += 1;
            state.files_processed += 1;
        }
        engine.publish(&state).await?;
        offset += rows.len() as i64;
    }

    state.counters.orphaned_found = orphaned_ids.len() as i64;

    if engine.is_cancelled(OperationKind::Cleanup, state.operation_id).await? {
        engine.finish(state, TerminalPhase::Cancelled, None).await?;
        return Ok(());
    }

    // Phase 3 — delete in batches of 50.
    state.phase_number = 3;
    state.phase = OperationKind::Cleanup.phase_name(3).to_string();
    state.phase_current = 0;
    state.phase_total = orphaned_ids.len() as i64;
    engine.publish(&state).await?;

    let mut deleted = 0u64;
    for batch in chunked(&orphaned_ids, DELETE_BATCH_SIZE) {
        ctx.writer.send(WriteMessage::DeleteScanResults(batch.to_vec())).await?;
        deleted += batch.len() as u64;
        state.phase_current += batch.len() as i64;
        engine.publish(&state).await?;
    }

    let report = ScanReport {
        id: 0,
        report_id: Uuid::now_v7(),
        operation_id: state.operation_id,
        scan_type: OperationKind::Cleanup,
        started_at,
        completed_at: Utc::now(),
        duration_seconds: (Utc::now() - started_at).num_milliseconds() as f64 / 1000.0,
        directories: Vec::new(),
        files_scanned: 0,
        files_corrupted: 0,
        files_with_warnings: 0,
        orphaned_records_found: orphaned_ids.len() as i64,
        orphaned_records_deleted: deleted as i64,
        files_changed: 0,
        files_corrupted_new: 0,
    };
    ctx.writer.send(WriteMessage::InsertReport(report)).await?;

    engine.finish(state, TerminalPhase::Completed, None).await?;
    info!(orphaned_found = orphaned_ids.len(), deleted, "cleanup complete");
    Ok(())
}
