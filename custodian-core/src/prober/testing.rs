//! A scriptable [`ProbeTools`] double, always compiled (not `#[cfg(test)]`)
//! so integration tests in other workspace crates can drive deterministic
//! scan outcomes without requiring real `ffmpeg`/`identify` binaries.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;

use super::process::ProcessOutput;
use super::ProbeTools;
use crate::error::Result;

fn healthy() -> ProcessOutput {
    ProcessOutput { exit_code: 0, stdout: String::new(), stderr: String::new(), timed_out: false }
}

/// Default "structural probe passed" output: a 12.5s stream with a
/// `codec_type` line, satisfying `video.rs`'s `classify_structure`.
fn healthy_structure() -> ProcessOutput {
    ProcessOutput { exit_code: 0, stdout: "codec_type=video\nduration=12.5\n".to_string(), stderr: String::new(), timed_out: false }
}

/// Per-file script of canned tool output. Every `ProbeTools` method for a
/// scripted path returns the same [`ProcessOutput`]; paths with no script
/// entry default to a healthy result (a passing structural probe for
/// `probe_structure`, zero-output success for everything else).
#[derive(Debug, Clone, Default)]
pub struct ScriptedProbeTools {
    scripts: HashMap<PathBuf, ProcessOutput>,
    /// Artificial per-call delay, useful for giving a cancellation request
    /// a window to land mid-batch in concurrency tests.
    delay: Option<Duration>,
}

impl ScriptedProbeTools {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers canned output every probe call against `path` returns.
    pub fn script(mut self, path: impl Into<PathBuf>, output: ProcessOutput) -> Self {
        self.scripts.insert(path.into(), output);
        self
    }

    /// Makes every probe call await `delay` before returning.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    async fn lookup(&self, path: &Path, default: ProcessOutput) -> ProcessOutput {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.scripts.get(path).cloned().unwrap_or(default)
    }
}

#[async_trait]
impl ProbeTools for ScriptedProbeTools {
    async fn identify(&self, path: &Path) -> Result<ProcessOutput> {
        Ok(self.lookup(path, healthy()).await)
    }

    async fn decode_to_null(&self, path: &Path, _timeout_secs: u64) -> Result<ProcessOutput> {
        Ok(self.lookup(path, healthy()).await)
    }

    async fn bounded_decode(&self, path: &Path, _timeout_secs: u64) -> Result<ProcessOutput> {
        Ok(self.lookup(path, healthy()).await)
    }

    async fn probe_structure(&self, path: &Path) -> Result<ProcessOutput> {
        Ok(self.lookup(path, healthy_structure()).await)
    }

    async fn strict_decode(&self, path: &Path, _timeout_secs: u64) -> Result<ProcessOutput> {
        Ok(self.lookup(path, healthy()).await)
    }

    async fn sample_point_decode(&self, path: &Path, _offset_secs: f64, _timeout_secs: u64) -> Result<ProcessOutput> {
        Ok(self.lookup(path, healthy()).await)
    }

    async fn quick_scan(&self, path: &Path, _timeout_secs: u64) -> Result<ProcessOutput> {
        Ok(self.lookup(path, healthy()).await)
    }

    async fn frame_count(&self, path: &Path) -> Result<ProcessOutput> {
        Ok(self.lookup(path, healthy()).await)
    }

    async fn temporal_outliers(&self, path: &Path, _timeout_secs: u64) -> Result<ProcessOutput> {
        Ok(self.lookup(path, healthy()).await)
    }
}

/// Canned output for a corrupted raster file: non-zero exit, with a
/// corruption-phrase line in stderr so `classify` flags it.
pub fn corrupted_image_output() -> ProcessOutput {
    ProcessOutput { exit_code: 1, stdout: String::new(), stderr: "identify: Corrupt JPEG data\n".to_string(), timed_out: false }
}

/// Canned output for a structural-probe failure: the recognized
/// "no decodable stream" signal video.rs's `classify_structure` emits for
/// a non-zero exit.
pub fn corrupted_video_structure_output() -> ProcessOutput {
    ProcessOutput { exit_code: 1, stdout: String::new(), stderr: "Invalid data found when processing input\n".to_string(), timed_out: false }
}
