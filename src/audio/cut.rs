use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use crate::error::{ChunkerError, Result};

use super::ffmpeg::{run_tool, FfmpegTools};
use super::Cutter;

/// Output path for piece `index` (1-based) of `parent`, placed in `dir`.
///
/// `talk.mp3` -> `<dir>/talk_part1.mp3`. Names stay unique within a run because
/// every parent name is unique and each parent is cut exactly once.
pub fn part_path(parent: &Path, index: usize, dir: &Path) -> PathBuf {
    let stem = parent
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "audio".to_string());

    let name = match parent.extension() {
        Some(ext) => format!("{}_part{}.{}", stem, index, ext.to_string_lossy()),
        None => format!("{}_part{}", stem, index),
    };

    dir.join(name)
}

#[async_trait]
impl Cutter for FfmpegTools {
    async fn cut(&self, input: &Path, output: &Path, start: f64, duration: f64) -> Result<()> {
        if duration.is_nan() || duration <= 0.0 {
            return Err(ChunkerError::Cut(format!(
                "Segment duration must be positive, got {duration:.3}s"
            )));
        }

        let start_secs = format!("{:.3}", start);
        let duration_secs = format!("{:.3}", duration);

        debug!(
            "Cutting {}: start={}, duration={} -> {}",
            input.display(),
            start_secs,
            duration_secs,
            output.display()
        );

        let mut cmd = self.ffmpeg_command();
        cmd.args(["-v", "error", "-ss"])
            .arg(&start_secs)
            .arg("-i")
            .arg(input)
            .arg("-t")
            .arg(&duration_secs)
            .args(["-vn", "-map_metadata", "-1"])
            .arg(output);

        run_tool(cmd, |msg| {
            ChunkerError::Cut(format!("{}: {msg}", input.display()))
        })
        .await?;

        if !tokio::fs::try_exists(output).await.unwrap_or(false) {
            return Err(ChunkerError::Cut(format!(
                "Output file was not created: {}",
                output.display()
            )));
        }

        Ok(())
    }
}
