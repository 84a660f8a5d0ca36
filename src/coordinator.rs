use crate::audio::{FfmpegTools, FileInfo, Toolkit};
use crate::config::{Config, Constraints};
use crate::error::{ChunkerError, Result};
use crate::segmenter::Segmenter;
use crate::source::{download, http_client, SourceReference};
use crate::state::{RunCounters, RunState};
use console::style;
use futures::stream::{FuturesUnordered, StreamExt};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

/// Statistics from one segmentation run.
#[derive(Debug, Clone, Serialize)]
pub struct RunStats {
    /// Wall-clock time of the whole run.
    pub total_time: Duration,
    /// Sum of the durations of all returned chunks.
    pub total_audio_secs: f64,
    /// Number of cuts placed on a silence point.
    pub silence_cuts: usize,
    /// Number of cuts forced at the duration ceiling.
    pub forced_cuts: usize,
    /// Number of format conversions.
    pub transcodes: usize,
    /// Number of superseded intermediate files deleted.
    pub intermediates_removed: usize,
}

impl RunStats {
    fn new(total_time: Duration, chunks: &[FileInfo], counters: RunCounters) -> Self {
        Self {
            total_time,
            total_audio_secs: chunks.iter().map(|c| c.duration_secs).sum(),
            silence_cuts: counters.silence_cuts,
            forced_cuts: counters.forced_cuts,
            transcodes: counters.transcodes,
            intermediates_removed: counters.intermediates_removed,
        }
    }
}

/// Result of one segmentation run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub source: SourceReference,
    pub run_id: String,
    /// Final chunks in timeline order.
    pub chunks: Vec<FileInfo>,
    pub stats: RunStats,
}

impl RunReport {
    pub fn chunk_paths(&self) -> Vec<PathBuf> {
        self.chunks.iter().map(|c| c.path.clone()).collect()
    }
}

/// Chunks descending from one original file, for the summary.
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryGroup {
    pub original_file: String,
    pub chunks: Vec<FileInfo>,
}

/// Removes everything a run created unless the run completes.
///
/// Covers both error returns and the run future being dropped mid-flight.
struct CleanupGuard<'a> {
    state: &'a RunState,
    armed: bool,
}

impl<'a> CleanupGuard<'a> {
    fn new(state: &'a RunState) -> Self {
        Self { state, armed: true }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for CleanupGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            warn!(
                "Run {} did not complete, cleaning up {} created files",
                self.state.run_id(),
                self.state.created_files().len()
            );
            self.state.remove_created_files();
        }
    }
}

/// Owns the per-run lifecycle: staging the source, segmenting it, reporting.
pub struct RunCoordinator {
    config: Config,
    segmenter: Segmenter,
    client: reqwest::Client,
    show_progress: bool,
}

impl RunCoordinator {
    /// Create a coordinator over the given audio tools.
    pub fn new(config: Config, tools: Toolkit) -> Result<Self> {
        config.validate()?;
        let client = http_client(Duration::from_secs(config.download_timeout_secs))?;
        let segmenter = Segmenter::new(config.constraints.clone(), tools);

        Ok(Self {
            config,
            segmenter,
            client,
            show_progress: false,
        })
    }

    /// Create a coordinator backed by the configured ffmpeg/ffprobe binaries.
    pub fn with_ffmpeg(config: Config) -> Result<Self> {
        let tools = Toolkit::ffmpeg(FfmpegTools::new(&config));
        Self::new(config, tools)
    }

    /// Enable or disable the download progress bar.
    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn constraints(&self) -> &Constraints {
        self.segmenter.constraints()
    }

    /// Segment one source and return its chunk paths in timeline order.
    pub async fn process_all(&self, source: &SourceReference) -> Result<Vec<PathBuf>> {
        Ok(self.process_report(source).await?.chunk_paths())
    }

    /// Segment one source, returning the chunks with their measurements.
    ///
    /// Every call starts from empty bookkeeping. On failure, every file the
    /// run created is removed before the error is returned.
    pub async fn process_report(&self, source: &SourceReference) -> Result<RunReport> {
        let start_time = Instant::now();
        let state = RunState::new(&self.config.work_dir);
        let mut guard = CleanupGuard::new(&state);

        let constraints = self.constraints();
        info!("Starting to process: {}", source);
        info!(
            "Max duration: {:.1} minutes, max file size: {:.1} MB",
            constraints.max_duration_secs / 60.0,
            constraints.max_size_mb
        );
        debug!("Run {} writes to {}", state.run_id(), state.run_dir().display());

        let local_path = match source {
            SourceReference::Local(path) => path.clone(),
            SourceReference::Remote(url) => {
                let ext = source.extension();
                if !constraints.allows(&ext) {
                    return Err(ChunkerError::UnsupportedFormat(ext));
                }
                let path = download(&self.client, url, state.run_dir(), self.show_progress).await?;
                state.track_created(&path);
                path
            }
        };

        let paths = self.segmenter.segment(&local_path, &state).await?;

        let mut finals: HashMap<PathBuf, FileInfo> = state
            .final_chunks()
            .into_iter()
            .map(|info| (info.path.clone(), info))
            .collect();
        let mut chunks = Vec::with_capacity(paths.len());
        for path in &paths {
            let info = finals.remove(path).ok_or_else(|| {
                ChunkerError::Cut(format!(
                    "{} was returned but never accepted as a chunk",
                    path.display()
                ))
            })?;
            chunks.push(info);
        }
        if !finals.is_empty() {
            warn!(
                "{} accepted chunks were not part of the result",
                finals.len()
            );
        }

        guard.disarm();

        let stats = RunStats::new(start_time.elapsed(), &chunks, state.counters());
        let report = RunReport {
            source: source.clone(),
            run_id: state.run_id().to_string(),
            chunks,
            stats,
        };

        log_summary(&report);
        info!(
            "All processing complete. No chunks exceed {:.1} minutes or {:.1} MB.",
            constraints.max_duration_secs / 60.0,
            constraints.max_size_mb
        );

        Ok(report)
    }

    /// Segment many sources concurrently, each in its own run.
    ///
    /// At most `concurrency` runs are in flight. Results come back in input order.
    pub async fn process_batch(&self, sources: &[SourceReference]) -> Vec<Result<RunReport>> {
        let semaphore = Arc::new(Semaphore::new(self.config.concurrency));
        let mut futures = FuturesUnordered::new();

        for (index, source) in sources.iter().enumerate() {
            let sem = semaphore.clone();
            futures.push(async move {
                let result = match sem.acquire().await {
                    Ok(_permit) => self.process_report(source).await,
                    Err(e) => Err(ChunkerError::Config(format!("Run queue closed: {e}"))),
                };
                if let Err(ref e) = result {
                    warn!("Processing {} failed: {}", source, e);
                }
                (index, result)
            });
        }

        let mut results = Vec::with_capacity(sources.len());
        while let Some(result) = futures.next().await {
            results.push(result);
        }

        results.sort_by_key(|(index, _)| *index);
        results.into_iter().map(|(_, result)| result).collect()
    }
}

/// Group chunks by the original file they came from, sorted by name then path.
pub fn summarize(chunks: &[FileInfo]) -> Vec<SummaryGroup> {
    let mut groups: BTreeMap<String, Vec<FileInfo>> = BTreeMap::new();
    for chunk in chunks {
        groups
            .entry(chunk.original_file_name.clone())
            .or_default()
            .push(chunk.clone());
    }

    groups
        .into_iter()
        .map(|(original_file, mut chunks)| {
            chunks.sort_by(|a, b| a.path.cmp(&b.path));
            SummaryGroup {
                original_file,
                chunks,
            }
        })
        .collect()
}

/// Format seconds as `m:ss`.
pub fn format_duration(secs: f64) -> String {
    let total = secs.max(0.0).floor() as u64;
    format!("{}:{:02}", total / 60, total % 60)
}

fn log_summary(report: &RunReport) {
    let groups = summarize(&report.chunks);
    for group in &groups {
        info!("Original file: {}", group.original_file);
        for chunk in &group.chunks {
            info!(
                "  - {} ({:.2} MB, {})",
                chunk.display_name,
                chunk.size_mb(),
                format_duration(chunk.duration_secs)
            );
        }
        info!("  Total chunks: {}", group.chunks.len());
    }
    info!(
        "Total original files processed: {}, total final chunks generated: {}",
        groups.len(),
        report.chunks.len()
    );
}

/// Print a summary of the final audio chunks.
pub fn print_summary(report: &RunReport) {
    let rule = "═══════════════════════════════════════════════════════════════";
    let groups = summarize(&report.chunks);

    println!();
    println!("{}", rule);
    println!("{}", style("                    FINAL AUDIO CHUNKS SUMMARY").bold());
    println!("{}", rule);

    for group in &groups {
        println!();
        println!("  Original file: {}", style(&group.original_file).cyan());
        println!("  Resulting chunks:");
        for chunk in &group.chunks {
            println!(
                "    - {} ({:.2} MB, {})",
                chunk.display_name,
                chunk.size_mb(),
                format_duration(chunk.duration_secs)
            );
        }
        println!("  Total chunks: {}", group.chunks.len());
    }

    println!();
    println!(
        "  Cuts:        {} at silence, {} forced",
        report.stats.silence_cuts, report.stats.forced_cuts
    );
    println!(
        "  Audio:       {} in {} chunks",
        format_duration(report.stats.total_audio_secs),
        report.chunks.len()
    );
    println!(
        "  Time:        {:.2}s",
        report.stats.total_time.as_secs_f64()
    );
    println!("{}", rule);
}
