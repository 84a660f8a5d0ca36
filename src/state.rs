//! Bookkeeping for one segmentation run.
//!
//! A [`RunState`] is created fresh for every run and shared by reference with
//! every concurrent branch of the segmenter. All mutation goes through a mutex
//! that is never held across an `.await`.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, warn};

use crate::audio::FileInfo;

static RUN_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// How a cut point was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CutKind {
    Silence,
    Forced,
}

/// Counters collected over a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunCounters {
    pub silence_cuts: usize,
    pub forced_cuts: usize,
    pub transcodes: usize,
    pub intermediates_removed: usize,
}

impl RunCounters {
    pub fn total_cuts(&self) -> usize {
        self.silence_cuts + self.forced_cuts
    }
}

#[derive(Debug, Default)]
struct Inner {
    processed: HashSet<PathBuf>,
    final_chunks: BTreeMap<PathBuf, FileInfo>,
    created: HashSet<PathBuf>,
    counters: RunCounters,
}

#[derive(Debug)]
pub struct RunState {
    run_id: String,
    run_dir: PathBuf,
    inner: Mutex<Inner>,
}

impl RunState {
    /// Start a run whose pieces are written under `<work_root>/<run_id>/`.
    pub fn new(work_root: &Path) -> Self {
        let run_id = next_run_id();
        let run_dir = work_root.join(&run_id);
        Self {
            run_id,
            run_dir,
            inner: Mutex::new(Inner::default()),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Directory holding every piece this run produces.
    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A panicking branch cannot leave the sets half-updated, so a poisoned
        // lock still holds consistent data.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Record that splitting of `path` has begun. Returns false if it already had.
    pub fn mark_processed(&self, path: &Path) -> bool {
        self.lock().processed.insert(path.to_path_buf())
    }

    pub fn is_processed(&self, path: &Path) -> bool {
        self.lock().processed.contains(path)
    }

    /// Accept a within-limits file as a final chunk. Replaces any entry for the same path.
    pub fn register_final(&self, info: FileInfo) {
        debug!("Registered final chunk {}", info.display_name);
        self.lock().final_chunks.insert(info.path.clone(), info);
    }

    pub fn final_chunks(&self) -> Vec<FileInfo> {
        self.lock().final_chunks.values().cloned().collect()
    }

    /// Note a file this run materialized (download, transcode or cut output).
    pub fn track_created(&self, path: &Path) {
        self.lock().created.insert(path.to_path_buf());
    }

    /// Whether this run created `path` and may therefore delete it.
    pub fn owns(&self, path: &Path) -> bool {
        self.lock().created.contains(path)
    }

    pub fn created_files(&self) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = self.lock().created.iter().cloned().collect();
        files.sort();
        files
    }

    pub fn record_cut(&self, kind: CutKind) {
        let mut inner = self.lock();
        match kind {
            CutKind::Silence => inner.counters.silence_cuts += 1,
            CutKind::Forced => inner.counters.forced_cuts += 1,
        }
    }

    pub fn record_transcode(&self) {
        self.lock().counters.transcodes += 1;
    }

    pub fn counters(&self) -> RunCounters {
        self.lock().counters.clone()
    }

    /// Retire a file that has been superseded by its pieces.
    ///
    /// It leaves the final chunks and, if this run created it, is deleted from
    /// disk. Files supplied by the caller are never removed.
    pub async fn discard_intermediate(&self, path: &Path) {
        let owned = {
            let mut inner = self.lock();
            inner.final_chunks.remove(path);
            inner.created.contains(path)
        };

        if !owned {
            return;
        }

        match tokio::fs::remove_file(path).await {
            Ok(()) => {
                debug!("Removed intermediate file {}", path.display());
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                warn!("Failed to remove intermediate {}: {}", path.display(), e);
                return;
            }
        }

        let mut inner = self.lock();
        inner.created.remove(path);
        inner.counters.intermediates_removed += 1;
    }

    /// Delete every file this run created, then the run directory.
    ///
    /// Synchronous so it can run from a `Drop` guard on the failure path.
    pub fn remove_created_files(&self) {
        let created: Vec<PathBuf> = self.lock().created.drain().collect();
        for path in created {
            if let Err(e) = std::fs::remove_file(&path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!("Failed to remove {}: {}", path.display(), e);
                }
            }
        }

        if self.run_dir.exists() {
            if let Err(e) = std::fs::remove_dir_all(&self.run_dir) {
                warn!("Failed to remove {}: {}", self.run_dir.display(), e);
            }
        }

        self.lock().final_chunks.clear();
    }
}

fn next_run_id() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    let seq = RUN_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    format!("run-{}-{:x}-{}", std::process::id(), nanos, seq)
}
