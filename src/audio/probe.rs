use std::path::Path;

use async_trait::async_trait;
use tracing::debug;

use crate::error::{ChunkerError, Result};

use super::ffmpeg::{run_tool, FfmpegTools};
use super::{FileInfo, MediaProber};

/// Parse ffprobe's `format=duration` output.
pub fn parse_duration(raw: &str) -> Result<f64> {
    let trimmed = raw.trim();
    let duration: f64 = trimmed
        .parse()
        .map_err(|e| ChunkerError::Probe(format!("Failed to parse duration '{trimmed}': {e}")))?;

    if !duration.is_finite() || duration < 0.0 {
        return Err(ChunkerError::Probe(format!(
            "Invalid duration reported: {duration}"
        )));
    }

    Ok(duration)
}

#[async_trait]
impl MediaProber for FfmpegTools {
    async fn probe(&self, path: &Path) -> Result<FileInfo> {
        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| ChunkerError::Probe(format!("{}: {e}", path.display())))?;

        let mut cmd = self.ffprobe_command();
        cmd.args([
            "-v",
            "error",
            "-show_entries",
            "format=duration",
            "-of",
            "default=noprint_wrappers=1:nokey=1",
        ])
        .arg(path);

        let output = run_tool(cmd, |msg| {
            ChunkerError::Probe(format!("{}: {msg}", path.display()))
        })
        .await?;

        let duration = parse_duration(&String::from_utf8_lossy(&output.stdout))?;
        let info = FileInfo::new(path.to_path_buf(), duration, metadata.len());

        debug!(
            "Probed {}: {:.2}s, {:.2} MB",
            info.display_name,
            info.duration_secs,
            info.size_mb()
        );

        Ok(info)
    }
}
