pub mod cut;
pub mod ffmpeg;
pub mod normalize;
pub mod probe;
pub mod silence;

pub use cut::part_path;
pub use ffmpeg::FfmpegTools;
pub use normalize::{ensure_compatible, extension_of, validate_extension};
pub use probe::parse_duration;
pub use silence::{filter_window, parse_silence_starts};

use crate::error::Result;
use async_trait::async_trait;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Measured properties of one physical audio file.
///
/// Produced by a [`MediaProber`] right after a file materializes. Never mutated:
/// every cut yields fresh `FileInfo` values for its pieces.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileInfo {
    pub path: PathBuf,
    pub display_name: String,
    pub duration_secs: f64,
    pub size_bytes: u64,
    /// Name of the source this file descends from (`talk_part1_part2.mp3` -> `talk.mp3`).
    pub original_file_name: String,
}

impl FileInfo {
    pub fn new(path: PathBuf, duration_secs: f64, size_bytes: u64) -> Self {
        let display_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let original_file_name = original_file_name(&path);

        Self {
            path,
            display_name,
            duration_secs,
            size_bytes,
            original_file_name,
        }
    }

    pub fn size_mb(&self) -> f64 {
        self.size_bytes as f64 / (1024.0 * 1024.0)
    }

    /// Observed byte rate, used to turn a size budget into a duration budget.
    pub fn bytes_per_second(&self) -> f64 {
        if self.duration_secs > 0.0 {
            self.size_bytes as f64 / self.duration_secs
        } else {
            0.0
        }
    }
}

fn original_file_name(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let base = stem.split("_part").next().unwrap_or_default();

    match path.extension() {
        Some(ext) => format!("{}.{}", base, ext.to_string_lossy()),
        None => base.to_string(),
    }
}

/// Measures duration (container metadata) and size (filesystem) of a file.
#[async_trait]
pub trait MediaProber: Send + Sync {
    async fn probe(&self, path: &Path) -> Result<FileInfo>;
}

/// Re-encodes `input` into the container implied by `output`'s extension.
#[async_trait]
pub trait Transcoder: Send + Sync {
    async fn transcode(&self, input: &Path, output: &Path) -> Result<()>;
}

/// Finds silence runs that start inside `[window_start, window_end]`.
///
/// Returns start timestamps in ascending order. An empty result means no usable
/// cut point exists in the window.
#[async_trait]
pub trait SilenceDetector: Send + Sync {
    async fn detect_silence(
        &self,
        path: &Path,
        window_start: f64,
        window_end: f64,
    ) -> Result<Vec<f64>>;
}

/// Writes `[start, start + duration)` of `input` to `output`.
#[async_trait]
pub trait Cutter: Send + Sync {
    async fn cut(&self, input: &Path, output: &Path, start: f64, duration: f64) -> Result<()>;
}

/// The set of audio tools a segmentation run works against.
#[derive(Clone)]
pub struct Toolkit {
    pub prober: Arc<dyn MediaProber>,
    pub transcoder: Arc<dyn Transcoder>,
    pub detector: Arc<dyn SilenceDetector>,
    pub cutter: Arc<dyn Cutter>,
}

impl Toolkit {
    /// Build a toolkit where one value serves every role.
    pub fn uniform<T>(tools: Arc<T>) -> Self
    where
        T: MediaProber + Transcoder + SilenceDetector + Cutter + 'static,
    {
        Self {
            prober: tools.clone(),
            transcoder: tools.clone(),
            detector: tools.clone(),
            cutter: tools,
        }
    }

    pub fn ffmpeg(tools: FfmpegTools) -> Self {
        Self::uniform(Arc::new(tools))
    }
}

impl std::fmt::Debug for Toolkit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Toolkit").finish_non_exhaustive()
    }
}
