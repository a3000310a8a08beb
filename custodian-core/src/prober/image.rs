use std::path::Path;

use super::classify::{self, StepVerdict};
use super::process::video_timeout_secs;
use super::{ProbeTools, Verdict};

/// Image probe pipeline (§4.2 image steps):
/// 1. in-process header verification via the `image` crate
/// 2. in-process full decode/transform to catch truncated payloads
/// 3. external raster-tool (`identify`) classification
/// 4. a decode-to-null pass, run for every image type, carrying the
///    EXIF/header demotions
pub async fn probe(tools: &dyn ProbeTools, path: &Path, ext: &str, ignored_patterns: &[String]) -> Verdict {
    let mut output = Vec::new();
    let mut worst = StepVerdict::Pass;
    let mut worst_source = "image decoder";

    match verify_header(path) {
        Ok(format) => output.push(format!("header verify: {format}")),
        Err(e) => {
            return Verdict::Corrupted {
                scan_tool: "image decoder".to_string(),
                corruption_details: format!("header verification failed: {e}"),
                output: vec![format!("header verify failed: {e}")],
            };
        }
    }

    match decode_and_transform(path) {
        Ok(()) => output.push("full decode: ok".to_string()),
        Err(e) => {
            return Verdict::Corrupted {
                scan_tool: "image decoder".to_string(),
                corruption_details: format!("full decode failed: {e}"),
                output: vec![format!("full decode failed: {e}")],
            };
        }
    }

    let is_gif = ext == "gif";
    match tools.identify(path).await {
        Ok(result) => {
            let cleaned = classify::strip_ignored_lines(result.stderr.lines(), ignored_patterns);
            let stderr = cleaned.join("\n");
            output.push(format!("identify (exit {}): {}", result.exit_code, stderr));
            let verdict = classify::classify_identify_output(&stderr, result.exit_code, is_gif);
            if outranks(&verdict, &worst) {
                worst = verdict;
                worst_source = "raster tool identify";
            }
        }
        Err(e) => {
            return Verdict::Error {
                message: format!("failed to run raster tool identify: {e}"),
            };
        }
    }

    let timeout_secs = video_timeout_secs(0);
    match tools.decode_to_null(path, timeout_secs).await {
        Ok(result) => {
            let cleaned = classify::strip_ignored_lines(result.stderr.lines(), ignored_patterns);
            let stderr = cleaned.join("\n");
            output.push(format!("decode-to-null (exit {}): {}", result.exit_code, stderr));
            let verdict = classify::classify_decode_to_null_for_image(&stderr, result.exit_code);
            if outranks(&verdict, &worst) {
                worst = verdict;
                worst_source = "decode-to-null probe";
            }
        }
        Err(e) => {
            return Verdict::Error {
                message: format!("failed to run decode-to-null probe: {e}"),
            };
        }
    }

    let output = classify::truncate_scan_output(&output, 100, 5000);

    match worst {
        StepVerdict::Pass => Verdict::Healthy {
            scan_tool: "image decoder".to_string(),
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

fn verify_header(path: &Path) -> Result<String, String> {
    let reader = ::image::ImageReader::open(path).map_err(|e| e.to_string())?;
    let reader = reader.with_guessed_format().map_err(|e| e.to_string())?;
    let format = reader.format().ok_or_else(|| "unrecognized image format".to_string())?;
    Ok(format!("{format:?}"))
}

fn decode_and_transform(path: &Path) -> Result<(), String> {
    let img = ::image::open(path).map_err(|e| e.to_string())?;
    let (w, h) = (img.width(), img.height());
    if w == 0 || h == 0 {
        return Err("zero-dimension image".to_string());
    }
    let _ = img.thumbnail(1, 1);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prober::process::ProcessOutput;
    use async_trait::async_trait;
    use std::path::PathBuf;
    use std::sync::Mutex;

    struct FakeTools {
        identify: Mutex<Option<ProcessOutput>>,
        decode_to_null: Mutex<Option<ProcessOutput>>,
    }

    #[async_trait]
    impl ProbeTools for FakeTools {
        async fn identify(&self, _path: &std::path::Path) -> crate::error::Result<ProcessOutput> {
            Ok(self.identify.lock().unwrap().take().unwrap())
        }
        async fn decode_to_null(&self, _path: &std::path::Path, _t: u64) -> crate::error::Result<ProcessOutput> {
            Ok(self.decode_to_null.lock().unwrap().take().unwrap())
        }
        async fn bounded_decode(&self, _path: &std::path::Path, _t: u64) -> crate::error::Result<ProcessOutput> {
            unimplemented!()
        }
        async fn probe_structure(&self, _path: &std::path::Path) -> crate::error::Result<ProcessOutput> {
            unimplemented!()
        }
        async fn strict_decode(&self, _path: &std::path::Path, _t: u64) -> crate::error::Result<ProcessOutput> {
            unimplemented!()
        }
        async fn sample_point_decode(
            &self,
            _path: &std::path::Path,
            _offset: f64,
            _t: u64,
        ) -> crate::error::Result<ProcessOutput> {
            unimplemented!()
        }
        async fn quick_scan(&self, _path: &std::path::Path, _t: u64) -> crate::error::Result<ProcessOutput> {
            unimplemented!()
        }
        async fn frame_count(&self, _path: &std::path::Path) -> crate::error::Result<ProcessOutput> {
            unimplemented!()
        }
        async fn temporal_outliers(&self, _path: &std::path::Path, _t: u64) -> crate::error::Result<ProcessOutput> {
            unimplemented!()
        }
    }

    fn fixture(name: &str) -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures").join(name)
    }

    #[tokio::test]
    async fn missing_file_is_corrupted_not_error() {
        let tools = FakeTools {
            identify: Mutex::new(None),
            decode_to_null: Mutex::new(None),
        };
        let verdict = probe(&tools, &fixture("does-not-exist.png"), "png", &[]).await;
        assert!(verdict.is_corrupted());
    }
}
