use std::path::{Path, PathBuf};

use futures::future::{BoxFuture, FutureExt};
use futures::try_join;
use tracing::{debug, info};

use crate::audio::{ensure_compatible, part_path, validate_extension, FileInfo, Toolkit};
use crate::config::Constraints;
use crate::error::{ChunkerError, Result};
use crate::state::{CutKind, RunState};

/// Fraction of the size limit targeted when size is the binding constraint.
pub const SIZE_HEADROOM: f64 = 0.95;

/// Duration ceiling for the next cut of `info`.
///
/// When the file is over the size limit, the observed byte rate turns the size
/// budget (with headroom) into a duration budget. That budget can only lower
/// the ceiling below `max_duration_secs`, never raise it.
pub fn effective_max_duration(info: &FileInfo, constraints: &Constraints) -> f64 {
    if info.size_mb() > constraints.max_size_mb {
        let bytes_per_second = info.bytes_per_second();
        if bytes_per_second > 0.0 {
            let for_size = constraints.max_size_bytes() * SIZE_HEADROOM / bytes_per_second;
            info!(
                "File size limit reached. Recommended duration cut: {:.2}s",
                for_size
            );
            return for_size.min(constraints.max_duration_secs);
        }
    }
    constraints.max_duration_secs
}

/// Range searched for silence: the last stretch before the effective ceiling.
pub fn silence_window(effective_max: f64, search_ratio: f64) -> (f64, f64) {
    (search_ratio * effective_max, effective_max)
}

/// Earliest silence point wins; with none, cut exactly at the ceiling.
pub fn choose_cut_point(silence_points: &[f64], effective_max: f64) -> (f64, CutKind) {
    silence_points
        .iter()
        .copied()
        .filter(|p| p.is_finite())
        .min_by(f64::total_cmp)
        .map(|p| (p, CutKind::Silence))
        .unwrap_or((effective_max, CutKind::Forced))
}

/// Recursively splits audio files until every piece fits the constraints.
#[derive(Debug, Clone)]
pub struct Segmenter {
    constraints: Constraints,
    tools: Toolkit,
}

impl Segmenter {
    pub fn new(constraints: Constraints, tools: Toolkit) -> Self {
        Self { constraints, tools }
    }

    pub fn constraints(&self) -> &Constraints {
        &self.constraints
    }

    /// Split `path` into constraint-satisfying chunks, returned in timeline order.
    ///
    /// A compliant file comes back as `[path]` untouched (or `[converted]` when
    /// it had to be normalized first). A path already split in this run yields
    /// an empty list.
    pub fn segment<'a>(
        &'a self,
        path: &'a Path,
        state: &'a RunState,
    ) -> BoxFuture<'a, Result<Vec<PathBuf>>> {
        async move { self.segment_file(path, state).await }.boxed()
    }

    async fn segment_file(&self, path: &Path, state: &RunState) -> Result<Vec<PathBuf>> {
        if state.is_processed(path) {
            info!("Skipping already processed file: {}", path.display());
            return Ok(Vec::new());
        }

        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            return Err(ChunkerError::MissingFile(path.display().to_string()));
        }
        validate_extension(path, &self.constraints)?;

        let working = ensure_compatible(
            path,
            &self.constraints,
            self.tools.transcoder.as_ref(),
            state.run_dir(),
        )
        .await?;
        if working != path {
            state.track_created(&working);
            state.record_transcode();
            state.discard_intermediate(path).await;
        }

        let info = self.tools.prober.probe(&working).await?;
        debug!("Processing file: {}", working.display());

        if self.constraints.is_within(&info) {
            info!(
                "{} is already under limits ({:.2} MB, {:.2}s). No chunking needed.",
                info.display_name,
                info.size_mb(),
                info.duration_secs
            );
            state.register_final(info);
            return Ok(vec![working]);
        }

        state.mark_processed(path);
        state.mark_processed(&working);

        self.split(info, state).await
    }

    async fn split(&self, info: FileInfo, state: &RunState) -> Result<Vec<PathBuf>> {
        let effective_max = effective_max_duration(&info, &self.constraints);
        if !(effective_max.is_finite() && effective_max > 0.0) {
            return Err(ChunkerError::Cut(format!(
                "No usable duration budget for {} ({effective_max})",
                info.display_name
            )));
        }

        let (window_start, window_end) =
            silence_window(effective_max, self.constraints.target_silence_search_ratio);
        let silence_points = self
            .tools
            .detector
            .detect_silence(&info.path, window_start, window_end)
            .await?;

        debug!(
            "Silence points in [{:.2}, {:.2}]: {:?}",
            window_start, window_end, silence_points
        );

        let (cut_point, kind) = choose_cut_point(&silence_points, effective_max);
        match kind {
            CutKind::Silence => info!("Found silence point at {:.2}s", cut_point),
            CutKind::Forced => info!(
                "No silence points found, forcing cut at {:.2}s",
                cut_point
            ),
        }

        if cut_point <= 0.0 || cut_point >= info.duration_secs {
            return Err(ChunkerError::Cut(format!(
                "Cut point {:.2}s is outside {} ({:.2}s)",
                cut_point, info.display_name, info.duration_secs
            )));
        }

        tokio::fs::create_dir_all(state.run_dir()).await?;
        let first = part_path(&info.path, 1, state.run_dir());
        let second = part_path(&info.path, 2, state.run_dir());
        state.track_created(&first);
        state.track_created(&second);

        info!("Cutting {} at {:.2}s", info.display_name, cut_point);
        let cutter = self.tools.cutter.as_ref();
        try_join!(
            cutter.cut(&info.path, &first, 0.0, cut_point),
            cutter.cut(&info.path, &second, cut_point, info.duration_secs - cut_point)
        )?;
        state.record_cut(kind);

        // Both cuts are done reading the parent; it is now an intermediate.
        state.discard_intermediate(&info.path).await;

        let prober = self.tools.prober.as_ref();
        let (first_info, second_info) = try_join!(prober.probe(&first), prober.probe(&second))?;

        info!(
            "Audio chunked into {} ({:.2} MB, {:.2}s) and {} ({:.2} MB, {:.2}s)",
            first_info.display_name,
            first_info.size_mb(),
            first_info.duration_secs,
            second_info.display_name,
            second_info.size_mb(),
            second_info.duration_secs
        );

        for piece in [&first_info, &second_info] {
            if piece.duration_secs >= info.duration_secs {
                return Err(ChunkerError::Cut(format!(
                    "Cutting {} did not shorten it ({} is {:.2}s)",
                    info.display_name, piece.display_name, piece.duration_secs
                )));
            }
        }

        let (mut left, right) = try_join!(
            self.settle(first_info, state),
            self.settle(second_info, state)
        )?;
        left.extend(right);
        Ok(left)
    }

    /// Accept a freshly cut piece or send it back through segmentation.
    async fn settle(&self, info: FileInfo, state: &RunState) -> Result<Vec<PathBuf>> {
        if self.constraints.is_within(&info) {
            let path = info.path.clone();
            state.register_final(info);
            return Ok(vec![path]);
        }

        info!("Recursively processing chunk: {}", info.path.display());
        self.segment(&info.path, state).await
    }
}
