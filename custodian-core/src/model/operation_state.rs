use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Which of the three coupled long-running operations a row belongs to.
///
/// Each variant owns its own table (`scan_state`, `cleanup_state`,
/// `file_changes_state`) but the shared shape below is identical across all
/// three, mirroring the common base the operation handlers shared upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Scan,
    Cleanup,
    FileChanges,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OperationKind::Scan => "scan",
            OperationKind::Cleanup => "cleanup",
            OperationKind::FileChanges => "file_changes",
        };
        f.write_str(s)
    }
}

impl OperationKind {
    pub fn table_name(&self) -> &'static str {
        match self {
            OperationKind::Scan => "scan_state",
            OperationKind::Cleanup => "cleanup_state",
            OperationKind::FileChanges => "file_changes_state",
        }
    }

    /// Per-variant phase weights used by the progress tracker (§4.6), in
    /// the order the phases run.
    pub fn phase_weights(&self) -> &'static [f64] {
        match self {
            OperationKind::Scan => &[0.20, 0.10, 0.70],
            OperationKind::Cleanup => &[0.10, 0.80, 0.10],
            OperationKind::FileChanges => &[0.05, 0.80, 0.15],
        }
    }

    pub fn phase_name(&self, phase_number: i32) -> &'static str {
        match (self, phase_number) {
            (OperationKind::Scan, 1) => "discovery",
            (OperationKind::Scan, 2) => "adding",
            (OperationKind::Scan, 3) => "scanning",
            (OperationKind::Cleanup, 1) => "scanning_db",
            (OperationKind::Cleanup, 2) => "checking_files",
            (OperationKind::Cleanup, 3) => "deleting_entries",
            (OperationKind::FileChanges, 1) => "starting",
            (OperationKind::FileChanges, 2) => "checking_hashes",
            (OperationKind::FileChanges, 3) => "verifying_changes",
            _ => "unknown",
        }
    }
}

/// Terminal or transient lifecycle phase of an operation-state row.
///
/// The in-flight phases (`discovery`, `adding`, `scanning`, ...) are
/// variant-specific strings produced by [`OperationKind::phase_name`]; the
/// values here are the shared states every variant can land in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalPhase {
    Idle,
    Completed,
    Cancelled,
    Interrupted,
    Error,
}

impl fmt::Display for TerminalPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TerminalPhase::Idle => "idle",
            TerminalPhase::Completed => "completed",
            TerminalPhase::Cancelled => "cancelled",
            TerminalPhase::Interrupted => "interrupted",
            TerminalPhase::Error => "error",
        };
        f.write_str(s)
    }
}

impl FromStr for TerminalPhase {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "idle" => Ok(TerminalPhase::Idle),
            "completed" => Ok(TerminalPhase::Completed),
            "cancelled" => Ok(TerminalPhase::Cancelled),
            "interrupted" => Ok(TerminalPhase::Interrupted),
            "error" => Ok(TerminalPhase::Error),
            _ => Err(()),
        }
    }
}

/// Variant-specific counters carried alongside the common operation shape.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OperationCounters {
    /// scan only: a rough pre-discovery estimate of total candidate files.
    pub estimated_total: i64,
    /// scan only: number of new files discovery has found so far.
    pub discovery_count: i64,
    /// cleanup only: count of rows whose backing file no longer exists.
    pub orphaned_found: i64,
    /// file_changes only: count of rows whose file changed or was deleted.
    pub changes_found: i64,
    /// file_changes only: count of changed files that rescanned as corrupted.
    pub corrupted_found: i64,
    /// file_changes only: JSON array snapshot of the change descriptors.
    pub changed_files_json: Option<String>,
}

/// The common operation-state shape shared by scan/cleanup/file-changes.
///
/// Invariant: at most one row of a given [`OperationKind`] has
/// `is_active=true` at any instant; enforced by the Operation Engine, not
/// this type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationState {
    pub id: i64,
    pub operation_id: Uuid,
    pub kind: OperationKind,
    pub is_active: bool,
    /// Either a variant-specific in-flight phase name or a [`TerminalPhase`]
    /// rendered as text; stored as plain text so recovery code doesn't need
    /// to know every variant's phase vocabulary.
    pub phase: String,
    pub phase_number: i32,
    pub phase_current: i64,
    pub phase_total: i64,
    pub files_processed: i64,
    pub total_files: i64,
    pub current_file: Option<String>,
    pub progress_message: Option<String>,
    pub error_message: Option<String>,
    pub cancel_requested: bool,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub counters: OperationCounters,
}

impl OperationState {
    pub fn new(kind: OperationKind) -> Self {
        Self {
            id: 0,
            operation_id: Uuid::now_v7(),
            kind,
            is_active: true,
            phase: TerminalPhase::Idle.to_string(),
            phase_number: 0,
            phase_current: 0,
            phase_total: 0,
            files_processed: 0,
            total_files: 0,
            current_file: None,
            progress_message: None,
            error_message: None,
            cancel_requested: false,
            start_time: Utc::now(),
            end_time: None,
            counters: OperationCounters::default(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        TerminalPhase::from_str(&self.phase).is_ok() && self.phase != TerminalPhase::Idle.to_string()
    }
}
