use std::path::Path;
use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;
use tracing::debug;

use crate::error::{ChunkerError, Result};

use super::ffmpeg::{run_tool, FfmpegTools};
use super::SilenceDetector;

fn silence_start_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"silence_start:\s*(-?[0-9]+(?:\.[0-9]+)?)").expect("Invalid regex"))
}

/// Extract every `silence_start` timestamp from ffmpeg `silencedetect` logs.
pub fn parse_silence_starts(log: &str) -> Vec<f64> {
    silence_start_regex()
        .captures_iter(log)
        .filter_map(|caps| caps.get(1))
        .filter_map(|m| m.as_str().parse::<f64>().ok())
        .collect()
}

/// Keep points inside `[start, end]` (inclusive), sorted ascending.
pub fn filter_window(points: &[f64], start: f64, end: f64) -> Vec<f64> {
    let mut inside: Vec<f64> = points
        .iter()
        .copied()
        .filter(|&p| p >= start && p <= end)
        .collect();
    inside.sort_by(f64::total_cmp);
    inside
}

#[async_trait]
impl SilenceDetector for FfmpegTools {
    async fn detect_silence(
        &self,
        path: &Path,
        window_start: f64,
        window_end: f64,
    ) -> Result<Vec<f64>> {
        // A silence starting at window_end is only reported once it has lasted
        // the minimum duration, so read that much past the window.
        let read_limit = window_end + self.min_silence_duration_secs + 1.0;
        let filter = format!(
            "silencedetect=n={}dB:d={}",
            self.silence_threshold_db, self.min_silence_duration_secs
        );

        let mut cmd = self.ffmpeg_command();
        cmd.arg("-t")
            .arg(format!("{read_limit:.3}"))
            .arg("-i")
            .arg(path)
            .args(["-vn", "-af"])
            .arg(&filter)
            .args(["-f", "null", "-"]);

        let output = run_tool(cmd, |msg| {
            ChunkerError::SilenceScan(format!("{}: {msg}", path.display()))
        })
        .await?;

        let log = String::from_utf8_lossy(&output.stderr);
        let all = parse_silence_starts(&log);
        let points = filter_window(&all, window_start, window_end);

        debug!(
            "Silence scan of {}: {} points total, {} in [{:.2}, {:.2}]",
            path.display(),
            all.len(),
            points.len(),
            window_start,
            window_end
        );

        Ok(points)
    }
}
