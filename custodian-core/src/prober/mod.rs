//! The Media Prober (§4.2): classifies a single file as healthy, warned, or
//! corrupted by shelling out to external raster/video tools and applying the
//! demotion rules in [`classify`]. Pure with respect to the catalog — every
//! function here returns a [`Verdict`] and never touches storage directly.

pub mod classify;
pub mod hash;
pub mod image;
pub mod process;
pub mod testing;
pub mod video;

use std::path::Path;

use async_trait::async_trait;

use crate::error::Result;
use crate::model::ScanStatus;
use process::ProcessOutput;

pub use hash::hash_file;

/// The externally observable result of probing one file.
#[derive(Debug, Clone)]
pub enum Verdict {
    Healthy {
        scan_tool: String,
        output: Vec<String>,
    },
    Warning {
        scan_tool: String,
        warning_details: String,
        output: Vec<String>,
    },
    Corrupted {
        scan_tool: String,
        corruption_details: String,
        output: Vec<String>,
    },
    Error {
        message: String,
    },
}

impl Verdict {
    pub fn scan_status(&self) -> ScanStatus {
        match self {
            Verdict::Error { .. } => ScanStatus::Error,
            _ => ScanStatus::Completed,
        }
    }

    pub fn is_corrupted(&self) -> bool {
        matches!(self, Verdict::Corrupted { .. })
    }

    pub fn has_warnings(&self) -> bool {
        matches!(self, Verdict::Warning { .. })
    }

    pub fn scan_tool(&self) -> Option<&str> {
        match self {
            Verdict::Healthy { scan_tool, .. }
            | Verdict::Warning { scan_tool, .. }
            | Verdict::Corrupted { scan_tool, .. } => Some(scan_tool),
            Verdict::Error { .. } => None,
        }
    }

    pub fn output_lines(&self) -> &[String] {
        match self {
            Verdict::Healthy { output, .. } | Verdict::Warning { output, .. } | Verdict::Corrupted { output, .. } => {
                output
            }
            Verdict::Error { .. } => &[],
        }
    }

    pub fn corruption_details(&self) -> Option<&str> {
        match self {
            Verdict::Corrupted { corruption_details, .. } => Some(corruption_details),
            _ => None,
        }
    }

    pub fn warning_details(&self) -> Option<&str> {
        match self {
            Verdict::Warning { warning_details, .. } => Some(warning_details),
            _ => None,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            Verdict::Error { message } => Some(message),
            _ => None,
        }
    }
}

pub const SUPPORTED_IMAGE_EXTENSIONS: [&str; 7] = ["jpg", "jpeg", "png", "gif", "bmp", "tiff", "webp"];
pub const SUPPORTED_VIDEO_EXTENSIONS: [&str; 8] = ["mp4", "mkv", "avi", "mov", "wmv", "flv", "webm", "m4v"];

/// Abstracts the external tool invocations so the classification pipeline
/// can be exercised in tests without requiring real ImageMagick/ffmpeg
/// binaries on the machine running the test suite.
#[async_trait]
pub trait ProbeTools: Send + Sync {
    async fn identify(&self, path: &Path) -> Result<ProcessOutput>;
    async fn decode_to_null(&self, path: &Path, timeout_secs: u64) -> Result<ProcessOutput>;
    async fn bounded_decode(&self, path: &Path, timeout_secs: u64) -> Result<ProcessOutput>;
    async fn probe_structure(&self, path: &Path) -> Result<ProcessOutput>;
    async fn strict_decode(&self, path: &Path, timeout_secs: u64) -> Result<ProcessOutput>;
    async fn sample_point_decode(&self, path: &Path, offset_secs: f64, timeout_secs: u64) -> Result<ProcessOutput>;
    /// Second-pass 10-second quick scan: the cheap check run on every video
    /// regardless of `deep_scan`, ahead of the enhanced pipeline decision.
    async fn quick_scan(&self, path: &Path, timeout_secs: u64) -> Result<ProcessOutput>;
    /// Expected-vs-decoded frame count, for the enhanced pipeline's frame
    /// integrity check.
    async fn frame_count(&self, path: &Path) -> Result<ProcessOutput>;
    /// `ffprobe` signalstats sweep (`tout`/`vrep` tags), for the enhanced
    /// pipeline's temporal outlier check.
    async fn temporal_outliers(&self, path: &Path, timeout_secs: u64) -> Result<ProcessOutput>;
}

/// Shells out to `identify`/`ffprobe`/`ffmpeg` on the system `PATH`. This is
/// the production implementation; tests substitute a fake.
pub struct SystemProbeTools;

#[async_trait]
impl ProbeTools for SystemProbeTools {
    async fn identify(&self, path: &Path) -> Result<ProcessOutput> {
        process::run("identify", &["-verbose", &path.to_string_lossy()], 30).await
    }

    async fn decode_to_null(&self, path: &Path, timeout_secs: u64) -> Result<ProcessOutput> {
        process::run(
            "ffmpeg",
            &["-v", "error", "-i", &path.to_string_lossy(), "-f", "null", "-"],
            timeout_secs,
        )
        .await
    }

    async fn bounded_decode(&self, path: &Path, timeout_secs: u64) -> Result<ProcessOutput> {
        process::run(
            "ffmpeg",
            &[
                "-v",
                "warning",
                "-t",
                "30",
                "-i",
                &path.to_string_lossy(),
                "-f",
                "null",
                "-",
            ],
            timeout_secs,
        )
        .await
    }

    async fn probe_structure(&self, path: &Path) -> Result<ProcessOutput> {
        process::run(
            "ffprobe",
            &[
                "-v",
                "error",
                "-show_entries",
                "stream=codec_type,duration",
                "-of",
                "default=noprint_wrappers=1",
                &path.to_string_lossy(),
            ],
            30,
        )
        .await
    }

    async fn strict_decode(&self, path: &Path, timeout_secs: u64) -> Result<ProcessOutput> {
        process::run(
            "ffmpeg",
            &[
                "-v",
                "warning",
                "-err_detect",
                "+crccheck+bitstream+buffer+careful+compliant+aggressive",
                "-i",
                &path.to_string_lossy(),
                "-f",
                "null",
                "-",
            ],
            timeout_secs,
        )
        .await
    }

    async fn sample_point_decode(&self, path: &Path, offset_secs: f64, timeout_secs: u64) -> Result<ProcessOutput> {
        process::run(
            "ffmpeg",
            &[
                "-v",
                "warning",
                "-ss",
                &offset_secs.to_string(),
                "-err_detect",
                "+crccheck+bitstream",
                "-i",
                &path.to_string_lossy(),
                "-t",
                "5",
                "-f",
                "null",
                "-",
            ],
            timeout_secs,
        )
        .await
    }

    async fn quick_scan(&self, path: &Path, timeout_secs: u64) -> Result<ProcessOutput> {
        process::run(
            "ffmpeg",
            &["-v", "error", "-t", "10", "-i", &path.to_string_lossy(), "-f", "null", "-"],
            timeout_secs,
        )
        .await
    }

    async fn frame_count(&self, path: &Path) -> Result<ProcessOutput> {
        process::run(
            "ffprobe",
            &[
                "-v",
                "quiet",
                "-select_streams",
                "v:0",
                "-count_frames",
                "-show_entries",
                "stream=r_frame_rate,nb_read_frames,duration",
                "-of",
                "csv=p=0",
                &path.to_string_lossy(),
            ],
            120,
        )
        .await
    }

    async fn temporal_outliers(&self, path: &Path, timeout_secs: u64) -> Result<ProcessOutput> {
        process::run(
            "ffprobe",
            &[
                "-v",
                "quiet",
                "-f",
                "lavfi",
                "-i",
                &format!("movie={},signalstats=stat=tout+vrep", path.to_string_lossy()),
                "-show_entries",
                "frame=pkt_pts_time:frame_tags=lavfi.signalstats.TOUT,lavfi.signalstats.VREP",
                "-of",
                "csv=p=0",
            ],
            timeout_secs,
        )
        .await
    }
}

/// Probes one file end to end, dispatching on extension and honoring
/// `deep_scan`. Extensions outside the supported image/video sets yield a
/// healthy `"unsupported"` verdict rather than an error — the file is
/// still cataloged, just not probed.
pub async fn probe_file(
    tools: &dyn ProbeTools,
    path: &Path,
    file_size: u64,
    deep_scan: bool,
    ignored_patterns: &[String],
) -> Verdict {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default();

    if SUPPORTED_IMAGE_EXTENSIONS.contains(&ext.as_str()) {
        image::probe(tools, path, &ext, ignored_patterns).await
    } else if SUPPORTED_VIDEO_EXTENSIONS.contains(&ext.as_str()) {
        video::probe(tools, path, file_size, deep_scan, ignored_patterns).await
    } else {
        Verdict::Healthy {
            scan_tool: "unsupported".to_string(),
            output: vec![format!("extension .{ext} is not a probed media type")],
        }
    }
}
