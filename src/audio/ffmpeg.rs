use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};

use tokio::process::Command;
use tracing::debug;

use crate::config::Config;
use crate::error::{ChunkerError, Result};

/// ffmpeg/ffprobe-backed implementation of every audio tool seam.
#[derive(Debug, Clone)]
pub struct FfmpegTools {
    pub(crate) ffmpeg: PathBuf,
    pub(crate) ffprobe: PathBuf,
    pub(crate) silence_threshold_db: f64,
    pub(crate) min_silence_duration_secs: f64,
}

impl FfmpegTools {
    pub fn new(config: &Config) -> Self {
        Self {
            ffmpeg: config.ffmpeg_path.clone(),
            ffprobe: config.ffprobe_path.clone(),
            silence_threshold_db: config.constraints.silence_threshold_db,
            min_silence_duration_secs: config.constraints.min_silence_duration_secs,
        }
    }

    /// Check that both binaries are installed and runnable.
    pub async fn check(&self) -> Result<()> {
        check_binary(&self.ffmpeg, "FFmpeg").await?;
        check_binary(&self.ffprobe, "FFprobe").await?;
        Ok(())
    }

    pub(crate) fn ffmpeg_command(&self) -> Command {
        let mut cmd = Command::new(&self.ffmpeg);
        cmd.args(["-hide_banner", "-nostdin", "-y"]);
        cmd
    }

    pub(crate) fn ffprobe_command(&self) -> Command {
        Command::new(&self.ffprobe)
    }
}

async fn check_binary(binary: &Path, label: &str) -> Result<()> {
    let output = Command::new(binary)
        .arg("-version")
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|e| {
            ChunkerError::ToolNotFound(format!(
                "{label} not found at '{}'. Install FFmpeg or set {}_PATH. Error: {e}",
                binary.display(),
                label.to_ascii_uppercase()
            ))
        })?;

    if !output.status.success() {
        return Err(ChunkerError::ToolNotFound(format!(
            "{label} check failed ({})",
            output.status
        )));
    }

    debug!("{} is available at {}", label, binary.display());
    Ok(())
}

/// Run a prepared command to completion, capturing stdout and stderr.
///
/// The child is killed if the returned future is dropped, so a cancelled
/// branch never leaves an orphaned process writing to disk.
pub(crate) async fn run_tool<F>(mut cmd: Command, into_error: F) -> Result<Output>
where
    F: Fn(String) -> ChunkerError,
{
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    debug!("Running {:?}", cmd.as_std());

    let output = cmd
        .output()
        .await
        .map_err(|e| into_error(format!("failed to spawn process: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(into_error(format!(
            "process exited with {}: {}",
            output.status,
            last_lines(&stderr, 5)
        )));
    }

    Ok(output)
}

/// Keep the tail of a tool's stderr, where ffmpeg reports the actual failure.
fn last_lines(text: &str, n: usize) -> String {
    let lines: Vec<&str> = text.trim().lines().collect();
    let start = lines.len().saturating_sub(n);
    lines[start..].join("\n")
}
