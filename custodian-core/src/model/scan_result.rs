use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle state of a [`ScanResult`] row.
///
/// Transitions: `Pending -> Scanning -> {Completed, Error}`, with an allowed
/// reset back to `Pending` (targeted rescan, crash recovery).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanStatus {
    Pending,
    Scanning,
    Completed,
    Error,
}

impl fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ScanStatus::Pending => "pending",
            ScanStatus::Scanning => "scanning",
            ScanStatus::Completed => "completed",
            ScanStatus::Error => "error",
        };
        f.write_str(s)
    }
}

impl FromStr for ScanStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ScanStatus::Pending),
            "scanning" => Ok(ScanStatus::Scanning),
            "completed" => Ok(ScanStatus::Completed),
            "error" => Ok(ScanStatus::Error),
            other => Err(format!("unknown scan_status: {other}")),
        }
    }
}

/// One durable row per discovered file path.
///
/// `is_corrupted` is tri-state: `None` means "not yet scanned". Aggregate
/// queries must use the effective-healthy/corrupted/warning formulas in
/// [`crate::catalog`], never raw `is_corrupted`, because `marked_as_good`
/// overrides it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanResult {
    pub id: i64,
    pub file_path: String,
    pub file_size: Option<i64>,
    pub file_type: Option<String>,
    pub creation_date: Option<DateTime<Utc>>,
    pub last_modified: Option<DateTime<Utc>>,
    pub scan_status: ScanStatus,
    pub is_corrupted: Option<bool>,
    pub has_warnings: bool,
    pub warning_details: Option<String>,
    pub corruption_details: Option<String>,
    pub marked_as_good: bool,
    pub scan_tool: Option<String>,
    pub scan_duration: Option<f64>,
    pub scan_output: Option<String>,
    pub file_hash: Option<String>,
    pub discovered_date: Option<DateTime<Utc>>,
    pub scan_date: Option<DateTime<Utc>>,
    pub deep_scan: bool,
    pub ignored_error_types: Option<String>,
}

impl ScanResult {
    /// `effective_healthy = (NOT is_corrupted) OR marked_as_good`.
    pub fn effective_healthy(&self) -> bool {
        self.marked_as_good || !self.is_corrupted.unwrap_or(false)
    }

    /// `effective_corrupted = is_corrupted AND NOT marked_as_good AND NOT has_warnings`.
    pub fn effective_corrupted(&self) -> bool {
        self.is_corrupted.unwrap_or(false) && !self.marked_as_good && !self.has_warnings
    }

    /// `effective_warning = has_warnings AND NOT marked_as_good`.
    pub fn effective_warning(&self) -> bool {
        self.has_warnings && !self.marked_as_good
    }
}

/// Minimal metadata captured during discovery, before a row is probed.
#[derive(Debug, Clone)]
pub struct NewScanResult {
    pub file_path: String,
    pub file_size: i64,
    pub file_type: String,
    pub creation_date: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
    pub discovered_date: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(is_corrupted: Option<bool>, marked_as_good: bool, has_warnings: bool) -> ScanResult {
        ScanResult {
            id: 1,
            file_path: "/media/a.mp4".into(),
            file_size: Some(100),
            file_type: Some("video/mp4".into()),
            creation_date: None,
            last_modified: None,
            scan_status: ScanStatus::Completed,
            is_corrupted,
            has_warnings,
            warning_details: None,
            corruption_details: None,
            marked_as_good,
            scan_tool: Some("ffmpeg".into()),
            scan_duration: Some(1.0),
            scan_output: None,
            file_hash: None,
            discovered_date: None,
            scan_date: None,
            deep_scan: false,
            ignored_error_types: None,
        }
    }

    #[test]
    fn marked_as_good_overrides_corruption() {
        let r = row(Some(true), true, false);
        assert!(r.effective_healthy());
        assert!(!r.effective_corrupted());
    }

    #[test]
    fn warnings_are_not_corruption() {
        let r = row(Some(true), false, true);
        assert!(!r.effective_corrupted());
        assert!(r.effective_warning());
    }

    #[test]
    fn plain_corrupted_row() {
        let r = row(Some(true), false, false);
        assert!(!r.effective_healthy());
        assert!(r.effective_corrupted());
        assert!(!r.effective_warning());
    }

    #[test]
    fn scan_status_round_trips_through_strings() {
        for s in [
            ScanStatus::Pending,
            ScanStatus::Scanning,
            ScanStatus::Completed,
            ScanStatus::Error,
        ] {
            let parsed: ScanStatus = s.to_string().parse().unwrap();
            assert_eq!(parsed, s);
        }
    }
}
