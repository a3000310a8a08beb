use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// User-managed substring: any corruption candidate line matching an active
/// pattern is stripped before classification (§4.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IgnoredErrorPattern {
    pub id: i64,
    pub pattern: String,
    pub description: Option<String>,
    pub created_date: DateTime<Utc>,
    pub is_active: bool,
}

/// A generic key/value row. `scan_paths` is the well-known key holding the
/// comma-joined active scan roots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfiguration {
    pub id: i64,
    pub key: String,
    pub value: String,
    pub description: Option<String>,
    pub updated_date: DateTime<Utc>,
}

pub const SCAN_PATHS_KEY: &str = "scan_paths";

/// A named trigger the (external) cron scheduler submits operations
/// through. The engine only stores and exposes these; it never reads the
/// clock on their behalf.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanSchedule {
    pub id: i64,
    pub name: String,
    pub time_expression: String,
    pub variant: super::operation_state::OperationKind,
    pub is_active: bool,
    pub last_run: Option<DateTime<Utc>>,
    pub next_run: Option<DateTime<Utc>>,
    pub created_date: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExclusionType {
    Path,
    Extension,
}

impl std::fmt::Display for ExclusionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ExclusionType::Path => "path",
            ExclusionType::Extension => "extension",
        })
    }
}

/// Consumed by the Discovery Walker (§4.3) to skip subtrees/extensions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Exclusion {
    pub id: i64,
    pub exclusion_type: ExclusionType,
    pub value: String,
    pub created_date: DateTime<Utc>,
}
