//! Phrase table and pure classification rules for external-tool output.
//!
//! Centralized here so the image and video code paths can never drift on
//! what counts as a genuine corruption signal versus tool noise (§9).

/// Outcome of classifying one tool's stderr/exit-code pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepVerdict {
    Pass,
    PassWithWarning(String),
    Fail(String),
}

impl StepVerdict {
    pub fn is_fail(&self) -> bool {
        matches!(self, StepVerdict::Fail(_))
    }
}

/// Substrings that mark an ImageMagick `identify` stderr line as a harmless
/// ICC/XMP profile warning rather than real corruption.
pub const PROFILE_WARNING_PHRASES: [&str; 2] = ["corruptimageprofile", "@warning/profile.c"];

/// Any of these outside the profile-warning whitelist means corruption.
pub const CORRUPTION_KEYWORDS: [&str; 4] = ["error", "corrupt", "truncated", "damaged"];

/// EXIF/TIFF metadata complaints that do not indicate real corruption.
pub const EXIF_TIFF_WARNING_PHRASE: &str = "invalid tiff header in exif data";

/// Phrases that mark a GIF header complaint as the well-known false positive.
pub const GIF_HEADER_PHRASES: [&str; 2] = ["cannot identify image file", "improper image header"];

pub const NAL_UNIT_PHRASE: &str = "invalid nal unit";
pub const REFERENCE_FRAMES_PHRASE_A: &str = "number of reference frames";
pub const REFERENCE_FRAMES_PHRASE_B: &str = "exceeds max";

/// Strict-pass error patterns: (substring, human description). `"invalid nal
/// unit"` is intentionally first and handled specially by the caller — a
/// NAL-only strict pass with exit code 0 remains a warning (§4.2 step 4d).
pub const STRICT_ERROR_PATTERNS: [(&str, &str); 7] = [
    (NAL_UNIT_PHRASE, "Invalid NAL unit structure"),
    ("error while decoding mb", "Macroblock decoding error"),
    ("cabac decode", "CABAC decoding failure"),
    ("concealing errors", "Error concealment activated"),
    ("corrupted frame", "Frame corruption detected"),
    ("packet corrupt", "Packet corruption detected"),
    ("crc mismatch", "CRC checksum failure"),
];

/// Strips any line matching a user-managed ignored-error substring (§3).
/// Matching is case-insensitive and substring-based, matching the original
/// noisy-tool-output heuristics.
pub fn strip_ignored_lines<'a>(lines: impl IntoIterator<Item = &'a str>, ignored_patterns: &[String]) -> Vec<String> {
    lines
        .into_iter()
        .filter(|line| {
            let lower = line.to_lowercase();
            !ignored_patterns
                .iter()
                .any(|pattern| !pattern.is_empty() && lower.contains(&pattern.to_lowercase()))
        })
        .map(str::to_owned)
        .collect()
}

/// Classifies the stderr of the raster "identify" tool.
///
/// Matches media_checker.py's `_check_image_corruption` ImageMagick branch:
/// non-zero exit is a failure (subject to the GIF-header carve-out); a zero
/// exit with profile-only warnings passes with a warning; any other
/// corruption keyword outside that whitelist fails.
pub fn classify_identify_output(stderr: &str, exit_code: i32, is_gif: bool) -> StepVerdict {
    let lower = stderr.to_lowercase();

    if exit_code != 0 {
        if is_gif && GIF_HEADER_PHRASES.iter().any(|p| lower.contains(p)) {
            return StepVerdict::PassWithWarning(
                "GIF header warning: non-standard header detected (file may still be playable)".to_string(),
            );
        }
        return StepVerdict::Fail(format!("raster tool identify failed (exit {exit_code})"));
    }

    if stderr.trim().is_empty() {
        return StepVerdict::Pass;
    }

    if PROFILE_WARNING_PHRASES.iter().all(|p| lower.contains(p)) {
        return StepVerdict::PassWithWarning(
            "raster tool profile warning: non-corrupting metadata complaint".to_string(),
        );
    }

    if CORRUPTION_KEYWORDS.iter().any(|k| lower.contains(k)) {
        return StepVerdict::Fail(format!("raster tool warnings: {}", truncate(stderr, 200)));
    }

    StepVerdict::Pass
}

/// Classifies the stderr of the video/audio probe in "decode to null" mode
/// when run against an image file (§4.2 step 4 for images).
pub fn classify_decode_to_null_for_image(stderr: &str, exit_code: i32) -> StepVerdict {
    if exit_code != 0 && !stderr.trim().is_empty() {
        return StepVerdict::Fail("image validation failed via decode-to-null probe".to_string());
    }
    if stderr.trim().is_empty() {
        return StepVerdict::Pass;
    }
    let lower = stderr.to_lowercase();
    if lower.contains(EXIF_TIFF_WARNING_PHRASE) {
        return StepVerdict::PassWithWarning(
            "EXIF metadata warning: invalid TIFF header in EXIF data (image displays correctly)".to_string(),
        );
    }
    StepVerdict::Fail(format!("decode-to-null validation warnings: {}", truncate(stderr, 200)))
}

/// Classifies the bounded (first-30s) decode pass stderr for video (§4.2
/// step 2). NAL-unit-only complaints are a warning unless accompanied by
/// another error class or a non-zero exit code; reference-frame-limit
/// complaints are always a warning.
pub fn classify_bounded_decode(stderr: &str, exit_code: i32) -> StepVerdict {
    if stderr.trim().is_empty() {
        return if exit_code != 0 {
            StepVerdict::Fail("bounded decode pass failed".to_string())
        } else {
            StepVerdict::Pass
        };
    }

    let mut significant: Vec<String> = Vec::new();
    let mut has_nal = false;
    let mut has_reference_frames = false;
    let mut has_other = false;

    for line in stderr.lines() {
        let lower = line.to_lowercase();
        if lower.contains(NAL_UNIT_PHRASE) {
            has_nal = true;
        } else if lower.contains(REFERENCE_FRAMES_PHRASE_A) && lower.contains(REFERENCE_FRAMES_PHRASE_B) {
            has_reference_frames = true;
        } else if (lower.contains("error") && !lower.contains("duration"))
            || lower.contains("corrupt")
            || lower.contains("broken")
            || lower.contains("no frame")
        {
            significant.push(line.to_string());
            has_other = true;
        }
    }

    if has_nal && (has_other || exit_code != 0) {
        significant.push("Invalid NAL unit errors detected".to_string());
    }

    if !significant.is_empty() {
        return StepVerdict::Fail(format!("video decode errors: {}", significant.join("; ")));
    }

    if (has_nal || has_reference_frames) && exit_code == 0 {
        let mut warnings = Vec::new();
        if has_nal {
            warnings.push("NAL unit errors detected");
        }
        if has_reference_frames {
            warnings.push("H.264 reference frame count exceeds profile limit");
        }
        return StepVerdict::PassWithWarning(format!(
            "{} (video may have minor playback issues)",
            warnings.join(" and ")
        ));
    }

    if exit_code != 0 {
        return StepVerdict::Fail("bounded decode pass failed".to_string());
    }

    StepVerdict::Pass
}

/// Classifies the strict-flags decode pass (§4.2 step 4d). A NAL-only
/// outcome with exit code 0 remains a warning, never corruption.
pub fn classify_strict_pass(stderr: &str, exit_code: i32) -> StepVerdict {
    if stderr.trim().is_empty() {
        return if exit_code != 0 {
            StepVerdict::Fail("strict error detection failed".to_string())
        } else {
            StepVerdict::Pass
        };
    }

    let lower = stderr.to_lowercase();
    let mut found = Vec::new();
    let mut nal_only = true;

    for (pattern, description) in STRICT_ERROR_PATTERNS {
        if lower.contains(pattern) {
            found.push(description.to_string());
            if *pattern != NAL_UNIT_PHRASE {
                nal_only = false;
            }
        }
    }

    if found.is_empty() {
        return if exit_code != 0 {
            StepVerdict::Fail("strict error detection failed".to_string())
        } else {
            StepVerdict::Pass
        };
    }

    if !nal_only || exit_code != 0 {
        return StepVerdict::Fail(found.join(", "));
    }

    StepVerdict::PassWithWarning("NAL unit warnings only (strict mode)".to_string())
}

/// Classifies the 10-second quick-scan pass that runs on every video
/// regardless of `deep_scan` (§4.2 step 3).
pub fn classify_quick_scan(stderr: &str, exit_code: i32) -> StepVerdict {
    if exit_code != 0 && !stderr.trim().is_empty() {
        return StepVerdict::Fail("quick scan detected issues in first 10 seconds".to_string());
    }
    StepVerdict::Pass
}

/// Parses an `r_frame_rate` token (`"30000/1001"` or `"30"`) into a float.
fn parse_framerate(raw: &str) -> Option<f64> {
    if let Some((num, den)) = raw.split_once('/') {
        let num: f64 = num.trim().parse().ok()?;
        let den: f64 = den.trim().parse().ok()?;
        if den == 0.0 {
            return None;
        }
        Some(num / den)
    } else {
        raw.trim().parse().ok()
    }
}

/// Parses `frame_count`'s `csv=p=0` line (`framerate,frame_count,duration`)
/// into `(expected_frames, actual_frames)`, where expected is
/// `framerate * duration` truncated to an integer.
pub fn parse_frame_counts(stdout: &str) -> Option<(u64, u64)> {
    let line = stdout.lines().find(|l| !l.trim().is_empty())?;
    let mut parts = line.split(',');
    let framerate = parse_framerate(parts.next()?.trim())?;
    let actual: u64 = parts.next()?.trim().parse().ok()?;
    let duration: f64 = parts.next()?.trim().parse().ok()?;
    let expected = (framerate * duration) as u64;
    Some((expected, actual))
}

/// Classifies frame integrity (§4.2 enhanced pipeline, frame count check):
/// >5% frame loss is corruption, 1-5% is a warning, below that is healthy.
pub fn classify_frame_integrity(expected_frames: u64, actual_frames: u64) -> StepVerdict {
    if expected_frames == 0 {
        return StepVerdict::Pass;
    }
    let diff = expected_frames.abs_diff(actual_frames);
    let percent = diff as f64 / expected_frames as f64 * 100.0;
    if percent > 5.0 {
        StepVerdict::Fail(format!(
            "significant frame loss: expected {expected_frames} frames, decoded {actual_frames} ({percent:.1}%)"
        ))
    } else if percent > 1.0 {
        StepVerdict::PassWithWarning(format!(
            "minor frame inconsistency: expected {expected_frames} frames, decoded {actual_frames} ({percent:.1}%)"
        ))
    } else {
        StepVerdict::Pass
    }
}

/// Classifies the temporal-outlier sweep (§4.2 enhanced pipeline, signalstats
/// check): counts `TOUT`/`VREP` tag hits across the `signalstats` CSV rows
/// (`pts,tout,vrep`) and fails when either hit rate crosses its threshold.
pub fn classify_temporal_outliers(stdout: &str) -> StepVerdict {
    let mut total = 0u32;
    let mut high_tout = 0u32;
    let mut high_vrep = 0u32;

    for line in stdout.lines() {
        let mut parts = line.split(',');
        let _pts = parts.next();
        let tout: f64 = match parts.next().and_then(|v| v.trim().parse().ok()) {
            Some(v) => v,
            None => continue,
        };
        let vrep: f64 = match parts.next().and_then(|v| v.trim().parse().ok()) {
            Some(v) => v,
            None => continue,
        };
        total += 1;
        if tout > 0.1 {
            high_tout += 1;
        }
        if vrep > 0.5 {
            high_vrep += 1;
        }
    }

    if total == 0 {
        return StepVerdict::Pass;
    }

    let tout_percent = high_tout as f64 / total as f64 * 100.0;
    let vrep_percent = high_vrep as f64 / total as f64 * 100.0;

    if tout_percent > 5.0 {
        return StepVerdict::Fail(format!("high temporal outlier rate: {tout_percent:.1}% of frames"));
    }
    if vrep_percent > 10.0 {
        return StepVerdict::Fail(format!("high vertical repetition rate: {vrep_percent:.1}% of frames"));
    }
    StepVerdict::Pass
}

/// Classifies one multi-point sample (§4.2 enhanced pipeline, multi-point
/// sampling check): any nonzero exit or nonempty stderr fails that sample
/// outright — unlike the ratio-based checks above, one bad sample point
/// fails the whole pass.
pub fn classify_sample_point(offset_secs: f64, stderr: &str, exit_code: i32) -> StepVerdict {
    if exit_code != 0 || !stderr.trim().is_empty() {
        return StepVerdict::Fail(format!("corruption detected at sample point {offset_secs:.1}s"));
    }
    StepVerdict::Pass
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        s[..max].to_string()
    }
}

/// Truncates captured tool output to at most `max_chars` characters, then to
/// at most `max_lines` lines, appending the same sentinels the original
/// emitted (§4.2 "Output capture").
pub fn truncate_scan_output(lines: &[String], max_lines: usize, max_chars: usize) -> Vec<String> {
    if lines.is_empty() {
        return Vec::new();
    }
    let mut joined = lines.join("\n");
    if joined.len() > max_chars {
        joined.truncate(max_chars);
        joined.push_str("\n... [Output truncated due to length]");
    }
    let mut split: Vec<String> = joined.lines().map(str::to_owned).collect();
    if split.len() > max_lines {
        split.truncate(max_lines);
        split.push("... [Output truncated due to line count]".to_string());
    }
    split
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_warning_is_pass_with_warning() {
        let stderr = "identify: CorruptImageProfile `XMP' @ warning/profile.c/SetImageProfileInternal/1746.";
        match classify_identify_output(stderr, 0, false) {
            StepVerdict::PassWithWarning(_) => {}
            other => panic!("expected PassWithWarning, got {other:?}"),
        }
    }

    #[test]
    fn generic_corruption_keyword_fails() {
        let stderr = "identify: corrupt image data";
        assert!(classify_identify_output(stderr, 0, false).is_fail());
    }

    #[test]
    fn gif_header_failure_demoted_on_nonzero_exit() {
        let stderr = "identify: improper image header `x.gif' @ error/gif.c/ReadGIFImage/1180.";
        match classify_identify_output(stderr, 1, true) {
            StepVerdict::PassWithWarning(_) => {}
            other => panic!("expected PassWithWarning for gif header issue, got {other:?}"),
        }
    }

    #[test]
    fn non_gif_header_failure_on_nonzero_exit_is_fail() {
        let stderr = "identify: improper image header `x.png' @ error/png.c/ReadPNGImage/1180.";
        assert!(classify_identify_output(stderr, 1, false).is_fail());
    }

    #[test]
    fn webp_exif_warning_demoted() {
        let stderr = "Invalid TIFF header in EXIF data";
        match classify_decode_to_null_for_image(stderr, 0) {
            StepVerdict::PassWithWarning(_) => {}
            other => panic!("expected PassWithWarning, got {other:?}"),
        }
    }

    #[test]
    fn nal_unit_only_with_zero_exit_is_warning() {
        let stderr = "[h264] invalid nal unit size";
        match classify_bounded_decode(stderr, 0) {
            StepVerdict::PassWithWarning(_) => {}
            other => panic!("expected PassWithWarning, got {other:?}"),
        }
    }

    #[test]
    fn nal_unit_with_other_errors_is_corruption() {
        let stderr = "[h264] invalid nal unit size\n[h264] corrupted frame detected";
        assert!(classify_bounded_decode(stderr, 0).is_fail());
    }

    #[test]
    fn reference_frame_warning_only_is_warning() {
        let stderr = "[h264] Number of reference frames (5) exceeds max (4; actual 6, removing excess)";
        match classify_bounded_decode(stderr, 0) {
            StepVerdict::PassWithWarning(_) => {}
            other => panic!("expected PassWithWarning, got {other:?}"),
        }
    }

    #[test]
    fn strict_pass_nal_only_zero_exit_is_warning() {
        let stderr = "invalid nal unit size detected repeatedly";
        match classify_strict_pass(stderr, 0) {
            StepVerdict::PassWithWarning(_) => {}
            other => panic!("expected PassWithWarning, got {other:?}"),
        }
    }

    #[test]
    fn strict_pass_with_cabac_is_corruption() {
        let stderr = "cabac decode of intra4x4 pred failed";
        assert!(classify_strict_pass(stderr, 0).is_fail());
    }

    #[test]
    fn truncate_scan_output_applies_char_cap_then_line_cap() {
        let lines: Vec<String> = (0..200).map(|i| format!("line {i}")).collect();
        let out = truncate_scan_output(&lines, 100, 5000);
        assert!(out.len() <= 101);
        assert_eq!(out.last().unwrap(), "... [Output truncated due to line count]");
    }

    #[test]
    fn frame_count_line_parses_fractional_framerate() {
        let (expected, actual) = parse_frame_counts("30000/1001,895,30.0\n").unwrap();
        assert_eq!(expected, 899);
        assert_eq!(actual, 895);
    }

    #[test]
    fn frame_integrity_small_gap_is_warning() {
        match classify_frame_integrity(300, 294) {
            StepVerdict::PassWithWarning(_) => {}
            other => panic!("expected PassWithWarning, got {other:?}"),
        }
    }

    #[test]
    fn frame_integrity_large_gap_is_corruption() {
        assert!(classify_frame_integrity(300, 200).is_fail());
    }

    #[test]
    fn frame_integrity_within_tolerance_passes() {
        assert_eq!(classify_frame_integrity(300, 299), StepVerdict::Pass);
    }

    #[test]
    fn temporal_outliers_high_tout_rate_fails() {
        let stdout = "0.0,0.2,0.0\n1.0,0.3,0.0\n2.0,0.0,0.0\n3.0,0.0,0.0\n";
        assert!(classify_temporal_outliers(stdout).is_fail());
    }

    #[test]
    fn temporal_outliers_clean_passes() {
        let stdout = "0.0,0.0,0.0\n1.0,0.0,0.0\n";
        assert_eq!(classify_temporal_outliers(stdout), StepVerdict::Pass);
    }

    #[test]
    fn sample_point_nonzero_exit_fails() {
        assert!(classify_sample_point(0.0, "", 1).is_fail());
    }

    #[test]
    fn sample_point_clean_passes() {
        assert_eq!(classify_sample_point(0.0, "", 0), StepVerdict::Pass);
    }

    #[test]
    fn ignored_patterns_strip_matching_lines() {
        let lines = vec!["benign warning X", "real corruption Y"];
        let ignored = vec!["benign warning".to_string()];
        let kept = strip_ignored_lines(lines, &ignored);
        assert_eq!(kept, vec!["real corruption Y".to_string()]);
    }
}
