use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::operation_state::OperationKind;

/// Immutable summary row written on terminal completion of an operation.
///
/// Never written for a cancelled operation (§4.4.4) — only `completed`
/// operations produce one, keyed by `operation_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanReport {
    pub id: i64,
    pub report_id: Uuid,
    pub operation_id: Uuid,
    pub scan_type: OperationKind,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_seconds: f64,
    pub directories: Vec<String>,

    // Scan counters
    pub files_scanned: i64,
    pub files_corrupted: i64,
    pub files_with_warnings: i64,

    // Cleanup counters
    pub orphaned_records_found: i64,
    pub orphaned_records_deleted: i64,

    // File-changes counters
    pub files_changed: i64,
    pub files_corrupted_new: i64,
}
