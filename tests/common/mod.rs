//! In-memory audio tools for exercising the segmenter without ffmpeg.
//!
//! Every "audio" file is a real file on disk filled with zero bytes, so sizes
//! come from the filesystem exactly as in production. Durations and silence
//! points live in a registry keyed by path.

#![allow(dead_code)]

use async_trait::async_trait;
use audio_chunker::audio::{filter_window, Cutter, MediaProber, SilenceDetector, Transcoder};
use audio_chunker::{ChunkerError, Constraints, FileInfo, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const MB: f64 = 1024.0 * 1024.0;

#[derive(Debug, Clone)]
struct Clip {
    duration: f64,
    silences: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CutCall {
    pub input: PathBuf,
    pub output: PathBuf,
    pub start: f64,
    pub duration: f64,
}

pub struct FakeAudio {
    bytes_per_sec: f64,
    clips: Mutex<HashMap<PathBuf, Clip>>,
    cuts: Mutex<Vec<CutCall>>,
    transcodes: Mutex<Vec<(PathBuf, PathBuf)>>,
    scans: Mutex<Vec<(PathBuf, f64, f64)>>,
    cut_calls: AtomicUsize,
    fail_on_cut: Option<usize>,
}

impl FakeAudio {
    /// Every file produced is `bytes_per_sec * duration` bytes long.
    pub fn new(bytes_per_sec: f64) -> Arc<Self> {
        Arc::new(Self::build(bytes_per_sec, None))
    }

    /// Like [`FakeAudio::new`], but the `nth` cut call (1-based) fails.
    pub fn failing_on_cut(bytes_per_sec: f64, nth: usize) -> Arc<Self> {
        Arc::new(Self::build(bytes_per_sec, Some(nth)))
    }

    fn build(bytes_per_sec: f64, fail_on_cut: Option<usize>) -> Self {
        Self {
            bytes_per_sec,
            clips: Mutex::new(HashMap::new()),
            cuts: Mutex::new(Vec::new()),
            transcodes: Mutex::new(Vec::new()),
            scans: Mutex::new(Vec::new()),
            cut_calls: AtomicUsize::new(0),
            fail_on_cut,
        }
    }

    fn bytes_for(&self, duration: f64) -> usize {
        (duration * self.bytes_per_sec).round() as usize
    }

    /// Create a source file with the given duration and silence starts.
    pub fn add_source(&self, path: &Path, duration: f64, silences: &[f64]) {
        std::fs::write(path, vec![0u8; self.bytes_for(duration)]).unwrap();
        self.clips.lock().unwrap().insert(
            path.to_path_buf(),
            Clip {
                duration,
                silences: silences.to_vec(),
            },
        );
    }

    pub fn cuts(&self) -> Vec<CutCall> {
        self.cuts.lock().unwrap().clone()
    }

    /// Cut points relative to each cut's parent file, in call order.
    pub fn cut_points(&self) -> Vec<f64> {
        self.cuts()
            .iter()
            .filter(|c| c.start > 0.0)
            .map(|c| c.start)
            .collect()
    }

    pub fn transcodes(&self) -> Vec<(PathBuf, PathBuf)> {
        self.transcodes.lock().unwrap().clone()
    }

    pub fn scans(&self) -> Vec<(PathBuf, f64, f64)> {
        self.scans.lock().unwrap().clone()
    }

    pub fn duration_of(&self, path: &Path) -> Option<f64> {
        self.clips.lock().unwrap().get(path).map(|c| c.duration)
    }

    fn clip(&self, path: &Path) -> Option<Clip> {
        self.clips.lock().unwrap().get(path).cloned()
    }
}

#[async_trait]
impl MediaProber for FakeAudio {
    async fn probe(&self, path: &Path) -> Result<FileInfo> {
        let size = tokio::fs::metadata(path)
            .await
            .map_err(|e| ChunkerError::Probe(format!("{}: {e}", path.display())))?
            .len();

        // Files this fake never produced (downloads) are assumed to be
        // continuous audio at the configured byte rate.
        let duration = match self.clip(path) {
            Some(clip) => clip.duration,
            None => size as f64 / self.bytes_per_sec,
        };

        Ok(FileInfo::new(path.to_path_buf(), duration, size))
    }
}

#[async_trait]
impl Transcoder for FakeAudio {
    async fn transcode(&self, input: &Path, output: &Path) -> Result<()> {
        let clip = self
            .clip(input)
            .ok_or_else(|| ChunkerError::Transcode(format!("unknown {}", input.display())))?;

        tokio::fs::write(output, vec![0u8; self.bytes_for(clip.duration)]).await?;
        self.clips
            .lock()
            .unwrap()
            .insert(output.to_path_buf(), clip);
        self.transcodes
            .lock()
            .unwrap()
            .push((input.to_path_buf(), output.to_path_buf()));
        Ok(())
    }
}

#[async_trait]
impl SilenceDetector for FakeAudio {
    async fn detect_silence(
        &self,
        path: &Path,
        window_start: f64,
        window_end: f64,
    ) -> Result<Vec<f64>> {
        self.scans
            .lock()
            .unwrap()
            .push((path.to_path_buf(), window_start, window_end));

        let silences = self.clip(path).map(|c| c.silences).unwrap_or_default();
        Ok(filter_window(&silences, window_start, window_end))
    }
}

#[async_trait]
impl Cutter for FakeAudio {
    async fn cut(&self, input: &Path, output: &Path, start: f64, duration: f64) -> Result<()> {
        let call = self.cut_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_on_cut == Some(call) {
            return Err(ChunkerError::Cut("simulated encoder failure".to_string()));
        }

        let parent = match self.clip(input) {
            Some(clip) => clip,
            None => {
                let size = tokio::fs::metadata(input).await?.len();
                Clip {
                    duration: size as f64 / self.bytes_per_sec,
                    silences: Vec::new(),
                }
            }
        };

        let end = (start + duration).min(parent.duration);
        let piece = Clip {
            duration: end - start,
            silences: parent
                .silences
                .iter()
                .filter(|&&s| s >= start && s < end)
                .map(|s| s - start)
                .collect(),
        };

        tokio::fs::write(output, vec![0u8; self.bytes_for(piece.duration)]).await?;
        self.clips
            .lock()
            .unwrap()
            .insert(output.to_path_buf(), piece);
        self.cuts.lock().unwrap().push(CutCall {
            input: input.to_path_buf(),
            output: output.to_path_buf(),
            start,
            duration,
        });
        Ok(())
    }
}

/// Default limits scaled down 1024x in size, so "25 MB" is 25 KB on disk.
pub fn scaled_constraints() -> Constraints {
    Constraints {
        max_size_mb: 25.0 / 1024.0,
        ..Constraints::default()
    }
}

/// Byte rate at which `duration_secs` of audio weighs `mb` MB under
/// [`scaled_constraints`] (one MB there is 1024 bytes on disk).
pub fn rate_for(mb: f64, duration_secs: f64) -> f64 {
    mb * 1024.0 / duration_secs
}

/// All regular files directly inside `dir`, sorted.
pub fn files_in(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = match std::fs::read_dir(dir) {
        Ok(entries) => entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_file())
            .collect(),
        Err(_) => Vec::new(),
    };
    files.sort();
    files
}

pub fn sorted(paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut paths = paths.to_vec();
    paths.sort();
    paths
}
