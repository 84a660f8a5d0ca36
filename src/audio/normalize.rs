use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, info};

use crate::config::{Constraints, CANONICAL_EXTENSION};
use crate::error::{ChunkerError, Result};

use super::ffmpeg::{run_tool, FfmpegTools};
use super::Transcoder;

/// Lowercased extension of `path`, or an empty string when it has none.
pub fn extension_of(path: &Path) -> String {
    path.extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default()
}

/// Reject files whose extension is not in the allow-list.
pub fn validate_extension(path: &Path, constraints: &Constraints) -> Result<String> {
    let ext = extension_of(path);
    if !constraints.allows(&ext) {
        return Err(ChunkerError::UnsupportedFormat(ext));
    }
    Ok(ext)
}

/// Make sure `path` is in the canonical container, transcoding if it is not.
///
/// Returns the input unchanged for canonical files, otherwise the path of a
/// freshly written file with the canonical extension. That file is a sibling of
/// the input unless the sibling name is already taken, in which case it goes in
/// `fallback_dir`. Existing files are never overwritten and the input is never
/// deleted here.
pub async fn ensure_compatible(
    path: &Path,
    constraints: &Constraints,
    transcoder: &dyn Transcoder,
    fallback_dir: &Path,
) -> Result<PathBuf> {
    let ext = validate_extension(path, constraints)?;
    if ext == CANONICAL_EXTENSION {
        return Ok(path.to_path_buf());
    }

    let output = conversion_target(path, fallback_dir).await?;
    info!(
        "Converting {} to {} for compatibility",
        path.display(),
        CANONICAL_EXTENSION
    );

    if let Err(e) = transcoder.transcode(path, &output).await {
        // The target did not exist before, so anything there now is partial output.
        let _ = tokio::fs::remove_file(&output).await;
        return Err(e);
    }

    if !tokio::fs::try_exists(&output).await.unwrap_or(false) {
        return Err(ChunkerError::Transcode(format!(
            "Output file was not created: {}",
            output.display()
        )));
    }

    info!("Conversion complete: {}", output.display());
    Ok(output)
}

/// Pick a conversion output path that does not exist yet.
async fn conversion_target(path: &Path, fallback_dir: &Path) -> Result<PathBuf> {
    let sibling = path.with_extension(CANONICAL_EXTENSION);
    if !tokio::fs::try_exists(&sibling).await? {
        return Ok(sibling);
    }

    let name = sibling
        .file_name()
        .map(|n| n.to_os_string())
        .ok_or_else(|| ChunkerError::Transcode(format!("No file name in {}", path.display())))?;
    let fallback = fallback_dir.join(name);
    if tokio::fs::try_exists(&fallback).await? {
        return Err(ChunkerError::Transcode(format!(
            "Refusing to overwrite existing {} and {}",
            sibling.display(),
            fallback.display()
        )));
    }

    debug!(
        "{} already exists, converting into {}",
        sibling.display(),
        fallback_dir.display()
    );
    tokio::fs::create_dir_all(fallback_dir).await?;
    Ok(fallback)
}

#[async_trait]
impl Transcoder for FfmpegTools {
    async fn transcode(&self, input: &Path, output: &Path) -> Result<()> {
        let mut cmd = self.ffmpeg_command();
        cmd.args(["-v", "error", "-i"])
            .arg(input)
            .args(["-vn", "-f", CANONICAL_EXTENSION])
            .arg(output);

        debug!("Transcoding {} -> {}", input.display(), output.display());

        run_tool(cmd, |msg| {
            ChunkerError::Transcode(format!("{}: {msg}", input.display()))
        })
        .await?;

        Ok(())
    }
}
