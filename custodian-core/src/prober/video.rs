use std::path::Path;

use super::classify::{self, StepVerdict};
use super::process::video_timeout_secs;
use super::{ProbeTools, Verdict};

/// Video size thresholds (GiB) gating the enhanced pipeline's heavier
/// sub-checks, matching [`super::process::video_timeout_secs`]'s GiB
/// conversion.
const GIB: f64 = 1_073_741_824.0;
const TEMPORAL_OUTLIER_GATE_GIB: f64 = 1.0;
const MULTIPOINT_SAMPLING_GATE_GIB: f64 = 5.0;

/// Video/audio probe pipeline (§4.2 video steps):
/// 1. structural probe (stream presence, duration sanity)
/// 2. bounded (first-30s) decode pass — always runs
/// 3. 10-second quick scan — always runs
/// 4. enhanced pipeline, run when the quick/bounded passes already found
///    corruption or `deep_scan` was requested:
///    a. frame-integrity check (expected vs. decoded frame count) — always
///    b. temporal-outlier sweep — only above 1GB
///    c. multi-point sampling (start / ~50% / last 10s) — only above 5GB
///    d. strict-flags full decode pass
pub async fn probe(
    tools: &dyn ProbeTools,
    path: &Path,
    file_size: u64,
    deep_scan: bool,
    ignored_patterns: &[String],
) -> Verdict {
    let mut output = Vec::new();
    let mut worst = StepVerdict::Pass;
    let mut worst_source = "video/audio probe";
    let timeout_secs = video_timeout_secs(file_size);

    let structure = match tools.probe_structure(path).await {
        Ok(r) => r,
        Err(e) => {
            return Verdict::Error {
                message: format!("failed to run structural probe: {e}"),
            };
        }
    };
    output.push(format!("structure probe (exit {}): {}", structure.exit_code, structure.stdout));
    let structure_verdict = classify_structure(&structure.stdout, structure.exit_code);
    if outranks(&structure_verdict, &worst) {
        worst = structure_verdict.clone();
        worst_source = "structural probe";
    }
    if structure_verdict.is_fail() {
        let output = classify::truncate_scan_output(&output, 100, 5000);
        return Verdict::Corrupted {
            scan_tool: worst_source.to_string(),
            corruption_details: match worst {
                StepVerdict::Fail(d) => d,
                _ => unreachable!(),
            },
            output,
        };
    }

    let bounded = match tools.bounded_decode(path, timeout_secs).await {
        Ok(r) => r,
        Err(e) => {
            return Verdict::Error {
                message: format!("failed to run bounded decode pass: {e}"),
            };
        }
    };
    let cleaned = classify::strip_ignored_lines(bounded.stderr.lines(), ignored_patterns);
    let stderr = cleaned.join("\n");
    output.push(format!("bounded decode (exit {}): {}", bounded.exit_code, stderr));
    let verdict = classify::classify_bounded_decode(&stderr, bounded.exit_code);
    if outranks(&verdict, &worst) {
        worst = verdict;
        worst_source = "bounded decode pass";
    }

    let quick = match tools.quick_scan(path, 60).await {
        Ok(r) => r,
        Err(e) => {
            return Verdict::Error {
                message: format!("failed to run quick scan: {e}"),
            };
        }
    };
    let cleaned = classify::strip_ignored_lines(quick.stderr.lines(), ignored_patterns);
    let stderr = cleaned.join("\n");
    output.push(format!("quick scan (exit {}): {}", quick.exit_code, stderr));
    let verdict = classify::classify_quick_scan(&stderr, quick.exit_code);
    if outranks(&verdict, &worst) {
        worst = verdict;
        worst_source = "quick scan";
    }

    if !(worst.is_fail() || deep_scan) {
        let output = classify::truncate_scan_output(&output, 100, 5000);
        return finalize(worst, worst_source, output);
    }

    let size_gib = file_size as f64 / GIB;

    let frame_count = match tools.frame_count(path).await {
        Ok(r) => r,
        Err(e) => {
            return Verdict::Error {
                message: format!("failed to run frame integrity check: {e}"),
            };
        }
    };
    output.push(format!("frame count (exit {}): {}", frame_count.exit_code, frame_count.stdout));
    if frame_count.exit_code == 0 {
        if let Some((expected, actual)) = classify::parse_frame_counts(&frame_count.stdout) {
            let verdict = classify::classify_frame_integrity(expected, actual);
            if outranks(&verdict, &worst) {
                worst = verdict;
                worst_source = "frame integrity analysis";
            }
        }
    }

    if size_gib > TEMPORAL_OUTLIER_GATE_GIB {
        let outliers = match tools.temporal_outliers(path, timeout_secs).await {
            Ok(r) => r,
            Err(e) => {
                return Verdict::Error {
                    message: format!("failed to run temporal outlier sweep: {e}"),
                };
            }
        };
        output.push(format!("temporal outliers (exit {}): {} lines", outliers.exit_code, outliers.stdout.lines().count()));
        if outliers.exit_code == 0 {
            let verdict = classify::classify_temporal_outliers(&outliers.stdout);
            if outranks(&verdict, &worst) {
                worst = verdict;
                worst_source = "temporal outlier analysis";
            }
        }
    }

    if size_gib > MULTIPOINT_SAMPLING_GATE_GIB {
        let duration_secs = parse_duration_secs(&structure.stdout).unwrap_or(0.0);
        for offset in sample_offsets(duration_secs) {
            let sample = match tools.sample_point_decode(path, offset, timeout_secs).await {
                Ok(r) => r,
                Err(e) => {
                    return Verdict::Error {
                        message: format!("failed to run multi-point sample at {offset:.1}s: {e}"),
                    };
                }
            };
            let cleaned = classify::strip_ignored_lines(sample.stderr.lines(), ignored_patterns);
            let stderr = cleaned.join("\n");
            output.push(format!("sample @ {offset:.1}s (exit {}): {}", sample.exit_code, stderr));
            let verdict = classify::classify_sample_point(offset, &stderr, sample.exit_code);
            if outranks(&verdict, &worst) {
                worst = verdict;
                worst_source = "multi-point sampling";
            }
        }
    }

    let strict = match tools.strict_decode(path, timeout_secs).await {
        Ok(r) => r,
        Err(e) => {
            return Verdict::Error {
                message: format!("failed to run strict decode pass: {e}"),
            };
        }
    };
    let cleaned = classify::strip_ignored_lines(strict.stderr.lines(), ignored_patterns);
    let stderr = cleaned.join("\n");
    output.push(format!("strict decode (exit {}): {}", strict.exit_code, stderr));
    let verdict = classify::classify_strict_pass(&stderr, strict.exit_code);
    if outranks(&verdict, &worst) {
        worst = verdict;
        worst_source = "strict decode pass";
    }

    let output = classify::truncate_scan_output(&output, 100, 5000);
    finalize(worst, worst_source, output)
}

fn finalize(worst: StepVerdict, worst_source: &str, output: Vec<String>) -> Verdict {
    match worst {
        StepVerdict::Pass => Verdict::Healthy {
            scan_tool: "video/audio probe".to_string(),
            output,
        },
        StepVerdict::PassWithWarning(details) => Verdict::Warning {
            scan_tool: worst_source.to_string(),
            warning_details: details,
            output,
        },
        StepVerdict::Fail(details) => Verdict::Corrupted {
            scan_tool: worst_source.to_string(),
            corruption_details: details,
            output,
        },
    }
}

fn outranks(candidate: &StepVerdict, current: &StepVerdict) -> bool {
    rank(candidate) > rank(current)
}

fn rank(v: &StepVerdict) -> u8 {
    match v {
        StepVerdict::Pass => 0,
        StepVerdict::PassWithWarning(_) => 1,
        StepVerdict::Fail(_) => 2,
    }
}

/// Structural probe passes when at least one stream was reported; a
/// non-positive or missing duration is a warning, not corruption, since
/// some legitimate containers omit it.
fn classify_structure(stdout: &str, exit_code: i32) -> StepVerdict {
    if exit_code != 0 || stdout.trim().is_empty() {
        return StepVerdict::Fail("no decodable stream found".to_string());
    }
    if !stdout.contains("codec_type") {
        return StepVerdict::Fail("no decodable stream found".to_string());
    }
    match parse_duration_secs(stdout) {
        Some(d) if d > 0.0 => StepVerdict::Pass,
        _ => StepVerdict::PassWithWarning("duration missing or non-positive".to_string()),
    }
}

fn parse_duration_secs(stdout: &str) -> Option<f64> {
    stdout
        .lines()
        .find_map(|line| line.strip_prefix("duration="))
        .and_then(|v| v.trim().parse::<f64>().ok())
}

/// Sample offsets for multi-point analysis: start, midpoint, and ten
/// seconds before the end (clamped to non-negative).
fn sample_offsets(duration_secs: f64) -> Vec<f64> {
    if duration_secs <= 0.0 {
        return vec![0.0];
    }
    let mid = duration_secs / 2.0;
    let near_end = (duration_secs - 10.0).max(0.0);
    vec![0.0, mid, near_end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prober::process::ProcessOutput;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct ScriptedTools {
        structure: ProcessOutput,
        bounded: ProcessOutput,
        quick: ProcessOutput,
        frame_count: Option<ProcessOutput>,
        temporal: Option<ProcessOutput>,
        strict: Option<ProcessOutput>,
        samples: Mutex<VecDeque<ProcessOutput>>,
    }

    fn ok(stdout: &str, stderr: &str) -> ProcessOutput {
        ProcessOutput {
            exit_code: 0,
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
            timed_out: false,
        }
    }

    #[async_trait]
    impl ProbeTools for ScriptedTools {
        async fn identify(&self, _path: &std::path::Path) -> crate::error::Result<ProcessOutput> {
            unimplemented!()
        }
        async fn decode_to_null(&self, _path: &std::path::Path, _t: u64) -> crate::error::Result<ProcessOutput> {
            unimplemented!()
        }
        async fn bounded_decode(&self, _path: &std::path::Path, _t: u64) -> crate::error::Result<ProcessOutput> {
            Ok(self.bounded.clone())
        }
        async fn probe_structure(&self, _path: &std::path::Path) -> crate::error::Result<ProcessOutput> {
            Ok(self.structure.clone())
        }
        async fn strict_decode(&self, _path: &std::path::Path, _t: u64) -> crate::error::Result<ProcessOutput> {
            Ok(self.strict.clone().unwrap())
        }
        async fn sample_point_decode(
            &self,
            _path: &std::path::Path,
            _offset: f64,
            _t: u64,
        ) -> crate::error::Result<ProcessOutput> {
            Ok(self.samples.lock().unwrap().pop_front().unwrap())
        }
        async fn quick_scan(&self, _path: &std::path::Path, _t: u64) -> crate::error::Result<ProcessOutput> {
            Ok(self.quick.clone())
        }
        async fn frame_count(&self, _path: &std::path::Path) -> crate::error::Result<ProcessOutput> {
            Ok(self.frame_count.clone().unwrap())
        }
        async fn temporal_outliers(&self, _path: &std::path::Path, _t: u64) -> crate::error::Result<ProcessOutput> {
            Ok(self.temporal.clone().unwrap())
        }
    }

    #[tokio::test]
    async fn clean_quick_scan_is_healthy() {
        let tools = ScriptedTools {
            structure: ok("codec_type=video\nduration=12.5", ""),
            bounded: ok("", ""),
            quick: ok("", ""),
            frame_count: None,
            temporal: None,
            strict: None,
            samples: Mutex::new(VecDeque::new()),
        };
        let verdict = probe(&tools, Path::new("clean.mp4"), 1024, false, &[]).await;
        assert!(matches!(verdict, Verdict::Healthy { .. }));
    }

    #[tokio::test]
    async fn missing_stream_is_corrupted() {
        let tools = ScriptedTools {
            structure: ok("", ""),
            bounded: ok("", ""),
            quick: ok("", ""),
            frame_count: None,
            temporal: None,
            strict: None,
            samples: Mutex::new(VecDeque::new()),
        };
        let verdict = probe(&tools, Path::new("broken.mp4"), 1024, false, &[]).await;
        assert!(verdict.is_corrupted());
    }

    #[tokio::test]
    async fn quick_scan_failure_without_deep_scan_is_corrupted() {
        let tools = ScriptedTools {
            structure: ok("codec_type=video\nduration=30.0", ""),
            bounded: ok("", ""),
            quick: ProcessOutput {
                exit_code: 1,
                stdout: String::new(),
                stderr: "quick scan detected issues".to_string(),
                timed_out: false,
            },
            frame_count: Some(ok("", "")),
            temporal: None,
            strict: Some(ok("", "")),
            samples: Mutex::new(VecDeque::new()),
        };
        let verdict = probe(&tools, Path::new("quick.mp4"), 1024, false, &[]).await;
        assert!(verdict.is_corrupted());
    }

    #[tokio::test]
    async fn deep_scan_with_frame_loss_is_corrupted() {
        let tools = ScriptedTools {
            structure: ok("codec_type=video\nduration=30.0", ""),
            bounded: ok("", ""),
            quick: ok("", ""),
            frame_count: Some(ok("30/1,700,30.0", "")),
            temporal: None,
            strict: Some(ok("", "")),
            samples: Mutex::new(VecDeque::new()),
        };
        let verdict = probe(&tools, Path::new("deep.mp4"), 1024, true, &[]).await;
        assert!(verdict.is_corrupted());
    }

    #[tokio::test]
    async fn large_file_triggers_multipoint_sampling() {
        let six_gib = 6 * 1024 * 1024 * 1024;
        let tools = ScriptedTools {
            structure: ok("codec_type=video\nduration=30.0", ""),
            bounded: ok("", ""),
            quick: ok("", ""),
            frame_count: Some(ok("30/1,900,30.0", "")),
            temporal: Some(ok("", "")),
            strict: Some(ok("", "")),
            samples: Mutex::new(VecDeque::from(vec![
                ok("", ""),
                ProcessOutput {
                    exit_code: 1,
                    stdout: String::new(),
                    stderr: "crc mismatch".to_string(),
                    timed_out: false,
                },
                ok("", ""),
            ])),
        };
        let verdict = probe(&tools, Path::new("large.mp4"), six_gib, true, &[]).await;
        assert!(verdict.is_corrupted());
    }
}
