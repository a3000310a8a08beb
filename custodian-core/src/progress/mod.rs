//! The Progress Tracker (§4.6): turns an operation's phase/counters into the
//! percentage, ETA, and human-readable message the API surfaces.

use crate::model::OperationKind;

/// Computes overall percent complete across an operation's weighted phases.
///
/// `phase_weights` sums to 1.0 for a given [`OperationKind`]; completed
/// phases contribute their full weight, the current phase contributes
/// `weight * (phase_current / phase_total)`. Clamped to `[0, 100]`.
pub fn percent_complete(kind: OperationKind, phase_number: i32, phase_current: i64, phase_total: i64) -> f64 {
    let weights = kind.phase_weights();
    if phase_number < 1 {
        return 0.0;
    }
    let idx = (phase_number - 1) as usize;
    if idx >= weights.len() {
        return 100.0;
    }

    let completed: f64 = weights[..idx].iter().sum();
    let current_fraction = if phase_total > 0 {
        (phase_current as f64 / phase_total as f64).clamp(0.0, 1.0)
    } else {
        0.0
    };
    let percent = (completed + weights[idx] * current_fraction) * 100.0;
    percent.clamp(0.0, 100.0)
}

/// Estimated seconds remaining, extrapolated linearly from files processed
/// so far against elapsed time. `None` until at least one file has been
/// processed, matching the original's suppression of a misleadingly precise
/// early estimate.
pub fn estimate_seconds_remaining(files_processed: i64, total_files: i64, elapsed_secs: f64) -> Option<f64> {
    if files_processed <= 0 || total_files <= files_processed || elapsed_secs <= 0.0 {
        return None;
    }
    let rate = files_processed as f64 / elapsed_secs;
    if rate <= 0.0 {
        return None;
    }
    let remaining = (total_files - files_processed) as f64;
    Some(remaining / rate)
}

/// Formats a duration in seconds as `"Ns"`, `"Nm Ks"`, or `"Nh Km"`,
/// matching the original's three-tier time formatting.
pub fn format_eta(seconds: f64) -> String {
    let total = seconds.round().max(0.0) as i64;
    if total < 60 {
        format!("{total}s")
    } else if total < 3600 {
        let minutes = total / 60;
        let secs = total % 60;
        format!("{minutes}m {secs}s")
    } else {
        let hours = total / 3600;
        let minutes = (total % 3600) / 60;
        format!("{hours}h {minutes}m")
    }
}

/// Assembles the human-readable progress line shown in operation status
/// responses: `"{phase_name}: current file: {basename} - {processed} of
/// {total} files ETA: {eta}"` when a current file is known, otherwise the
/// same without the "current file" clause (§4.6).
pub fn progress_message(
    kind: OperationKind,
    phase_number: i32,
    current_file: Option<&str>,
    files_processed: i64,
    total_files: i64,
    elapsed_secs: f64,
) -> String {
    let phase_name = kind.phase_name(phase_number);

    let eta = match estimate_seconds_remaining(files_processed, total_files, elapsed_secs) {
        Some(secs) => format_eta(secs),
        None => "unknown".to_string(),
    };

    let basename = current_file.map(|path| {
        std::path::Path::new(path)
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string())
    });

    match basename {
        Some(basename) => {
            format!("{phase_name}: current file: {basename} - {files_processed} of {total_files} files ETA: {eta}")
        }
        None => format!("{phase_name}: {files_processed} of {total_files} files ETA: {eta}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_complete_weights_phases_correctly() {
        // Scan weights: [0.20, 0.10, 0.70]. Mid-way through phase 3.
        let percent = percent_complete(OperationKind::Scan, 3, 50, 100);
        assert!((percent - 65.0).abs() < 0.001, "got {percent}");
    }

    #[test]
    fn percent_complete_clamps_to_100() {
        let percent = percent_complete(OperationKind::Scan, 3, 100, 100);
        assert!((percent - 100.0).abs() < 0.001);
    }

    #[test]
    fn percent_complete_at_phase_one_start_is_zero() {
        let percent = percent_complete(OperationKind::Scan, 1, 0, 10);
        assert_eq!(percent, 0.0);
    }

    #[test]
    fn eta_suppressed_until_files_processed() {
        assert_eq!(estimate_seconds_remaining(0, 100, 10.0), None);
    }

    #[test]
    fn eta_suppressed_when_already_complete() {
        assert_eq!(estimate_seconds_remaining(100, 100, 10.0), None);
    }

    #[test]
    fn format_eta_tiers() {
        assert_eq!(format_eta(45.0), "45s");
        assert_eq!(format_eta(125.0), "2m 5s");
        assert_eq!(format_eta(3725.0), "1h 2m");
    }

    #[test]
    fn progress_message_includes_eta_when_available() {
        let msg = progress_message(OperationKind::Scan, 3, None, 50, 100, 50.0);
        assert!(msg.contains("ETA"));
        assert!(msg.starts_with("scanning: 50 of 100 files"));
    }

    #[test]
    fn progress_message_includes_current_file_basename() {
        let msg = progress_message(OperationKind::Scan, 3, Some("/media/videos/clip.mp4"), 50, 100, 50.0);
        assert!(msg.contains("current file: clip.mp4"));
        assert!(!msg.contains("/media/videos"));
    }

    #[test]
    fn progress_message_omits_current_file_clause_when_unknown() {
        let msg = progress_message(OperationKind::Scan, 3, None, 50, 100, 50.0);
        assert!(!msg.contains("current file"));
    }

    #[test]
    fn progress_message_shows_unknown_eta_before_any_file_processed() {
        let msg = progress_message(OperationKind::Scan, 1, None, 0, 100, 0.0);
        assert!(msg.contains("ETA: unknown"));
    }
}
