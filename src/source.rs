use std::path::{Path, PathBuf};
use std::time::Duration;

use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::Url;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::audio::extension_of;
use crate::error::{ChunkerError, Result};

/// Where the original audio comes from. Immutable once a run accepts it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "location", rename_all = "lowercase")]
pub enum SourceReference {
    Local(PathBuf),
    Remote(String),
}

impl SourceReference {
    /// `http://` and `https://` inputs are remote; everything else is a path.
    pub fn parse(input: &str) -> Self {
        let lower = input.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            SourceReference::Remote(input.to_string())
        } else {
            SourceReference::Local(PathBuf::from(input))
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, SourceReference::Remote(_))
    }

    /// Lowercased extension of the file this reference points at.
    ///
    /// For URLs the query string and fragment are ignored.
    pub fn extension(&self) -> String {
        match self {
            SourceReference::Local(path) => extension_of(path),
            SourceReference::Remote(url) => match Url::parse(url) {
                Ok(parsed) => extension_of(Path::new(parsed.path())),
                Err(_) => String::new(),
            },
        }
    }
}

impl std::fmt::Display for SourceReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceReference::Local(path) => write!(f, "{}", path.display()),
            SourceReference::Remote(url) => write!(f, "{}", url),
        }
    }
}

/// Build the HTTP client used for remote sources.
pub fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .timeout(timeout)
        .build()?;
    Ok(client)
}

/// Download `url` into a uniquely-named file in `dest_dir`.
///
/// The body is streamed to disk; the returned path keeps the URL's extension.
/// Failures are not retried.
pub async fn download(
    client: &reqwest::Client,
    url: &str,
    dest_dir: &Path,
    show_progress: bool,
) -> Result<PathBuf> {
    let parsed = Url::parse(url)
        .map_err(|e| ChunkerError::Download(format!("Invalid URL '{url}': {e}")))?;
    let ext = extension_of(Path::new(parsed.path()));

    info!("Downloading audio from URL: {}", url);

    let response = client
        .get(parsed)
        .send()
        .await
        .map_err(|e| ChunkerError::Download(format!("{url}: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        return Err(ChunkerError::Download(format!(
            "Failed to download audio from {url}: HTTP {status}"
        )));
    }

    tokio::fs::create_dir_all(dest_dir).await?;
    let suffix = if ext.is_empty() {
        String::new()
    } else {
        format!(".{ext}")
    };
    let (file, dest) = tempfile::Builder::new()
        .prefix("audio_")
        .suffix(&suffix)
        .tempfile_in(dest_dir)?
        .keep()
        .map_err(|e| ChunkerError::Io(e.error))?;

    let progress = match (show_progress, response.content_length()) {
        (true, Some(total)) => {
            let pb = ProgressBar::new(total);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})")
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("#>-"),
            );
            Some(pb)
        }
        _ => None,
    };

    let mut out = tokio::fs::File::from_std(file);
    let mut stream = response.bytes_stream();
    let mut downloaded: u64 = 0;

    let written: Result<()> = async {
        while let Some(chunk) = stream.next().await {
            let bytes = chunk.map_err(|e| ChunkerError::Download(format!("{url}: {e}")))?;
            out.write_all(&bytes).await?;
            downloaded += bytes.len() as u64;
            if let Some(ref pb) = progress {
                pb.set_position(downloaded);
            }
        }
        out.flush().await?;
        Ok::<(), ChunkerError>(())
    }
    .await;

    if let Some(pb) = progress {
        pb.finish_and_clear();
    }

    if let Err(e) = written {
        let _ = tokio::fs::remove_file(&dest).await;
        return Err(e);
    }

    debug!("Downloaded {} bytes", downloaded);
    info!("Downloaded audio to temporary file: {}", dest.display());
    Ok(dest)
}

/// Stage raw upload bytes as a local file in `dir`.
///
/// Only the final component of `file_name` is used, so a client-supplied name
/// cannot escape `dir`.
pub async fn stage_upload(bytes: &[u8], file_name: &str, dir: &Path) -> Result<PathBuf> {
    let name = Path::new(file_name)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .filter(|n| !n.is_empty())
        .ok_or_else(|| ChunkerError::Config(format!("Invalid upload file name '{file_name}'")))?;

    tokio::fs::create_dir_all(dir).await?;
    let (file, path) = tempfile::Builder::new()
        .prefix("upload_")
        .suffix(&format!("_{name}"))
        .tempfile_in(dir)?
        .keep()
        .map_err(|e| ChunkerError::Io(e.error))?;

    let mut out = tokio::fs::File::from_std(file);
    out.write_all(bytes).await?;
    out.flush().await?;

    info!("Staged upload {} ({} bytes)", path.display(), bytes.len());
    Ok(path)
}
