use std::time::Duration;

use tokio::process::Command;
use tokio::time::timeout;

use crate::error::{CatalogError, Result};

/// Characters never permitted in an external-tool argument. Arguments are
/// passed as an argv list (never through a shell), but a file path can still
/// carry bytes that would let a careless caller build a shell string later —
/// reject them at the boundary instead.
const DANGEROUS_CHARS: [char; 9] = [';', '|', '&', '$', '`', '\n', '\r', '<', '>'];

/// Result of running an external tool to completion or timeout.
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
}

impl ProcessOutput {
    pub fn succeeded(&self) -> bool {
        !self.timed_out && self.exit_code == 0
    }
}

/// Validates that no argument contains a disallowed character.
pub fn validate_args<'a>(args: impl IntoIterator<Item = &'a str>) -> Result<()> {
    for arg in args {
        if arg.chars().any(|c| DANGEROUS_CHARS.contains(&c)) {
            return Err(CatalogError::InvalidArgument(format!(
                "argument contains a disallowed character: {arg:?}"
            )));
        }
    }
    Ok(())
}

/// Invokes `program` with `args`, capturing stdout and stderr separately and
/// enforcing `timeout_secs`. Never goes through a shell.
pub async fn run(program: &str, args: &[&str], timeout_secs: u64) -> Result<ProcessOutput> {
    validate_args(args.iter().copied())?;

    let mut command = Command::new(program);
    command.args(args);
    command.stdout(std::process::Stdio::piped());
    command.stderr(std::process::Stdio::piped());
    command.stdin(std::process::Stdio::null());
    command.kill_on_drop(true);

    let child = command
        .spawn()
        .map_err(|e| CatalogError::Internal(format!("failed to spawn {program}: {e}")))?;

    match timeout(Duration::from_secs(timeout_secs), child.wait_with_output()).await {
        Ok(Ok(output)) => Ok(ProcessOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            timed_out: false,
        }),
        Ok(Err(e)) => Err(CatalogError::Internal(format!("{program} failed: {e}"))),
        Err(_) => Ok(ProcessOutput {
            exit_code: -1,
            stdout: String::new(),
            stderr: format!("{program} timed out after {timeout_secs}s"),
            timed_out: true,
        }),
    }
}

/// Dynamic video/audio probe timeout, matching the original's scaling by
/// file size: `min(30 + size_gb * 10, 300)` seconds.
pub fn video_timeout_secs(file_size_bytes: u64) -> u64 {
    let size_gb = file_size_bytes as f64 / 1_073_741_824.0;
    let scaled = 30.0 + size_gb * 10.0;
    scaled.min(300.0).max(30.0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_dangerous_characters() {
        assert!(validate_args(["foo; rm -rf /"]).is_err());
        assert!(validate_args(["/normal/path.mp4"]).is_ok());
    }

    #[test]
    fn timeout_scales_with_size_and_caps_at_300() {
        assert_eq!(video_timeout_secs(0), 30);
        assert_eq!(video_timeout_secs(10 * 1024 * 1024 * 1024), 130);
        assert_eq!(video_timeout_secs(100 * 1024 * 1024 * 1024), 300);
    }

    #[tokio::test]
    async fn run_rejects_embedded_shell_metacharacters() {
        let result = run("echo", &["a; b"], 5).await;
        assert!(result.is_err());
    }
}
