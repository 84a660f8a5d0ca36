use crate::audio::FileInfo;
use crate::error::{ChunkerError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;

/// Formats the transcription service accepts.
pub const DEFAULT_ALLOWED_FORMATS: [&str; 10] = [
    "flac", "m4a", "mp3", "mp4", "mpeg", "mpga", "oga", "ogg", "wav", "webm",
];

/// Container every file is normalized to before probing and cutting.
pub const CANONICAL_EXTENSION: &str = "mp3";

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Limits imposed by the downstream transcription service, fixed for a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Constraints {
    /// Longest chunk the service accepts, in seconds.
    pub max_duration_secs: f64,

    /// Largest chunk the service accepts, in MB (1 MB = 1024 * 1024 bytes).
    pub max_size_mb: f64,

    /// Lowercase extensions accepted as input.
    pub allowed_extensions: BTreeSet<String>,

    /// Level below which audio counts as silence, in dB.
    pub silence_threshold_db: f64,

    /// Shortest silence run usable as a cut point, in seconds.
    pub min_silence_duration_secs: f64,

    /// Fraction of the effective max duration where the silence search begins.
    pub target_silence_search_ratio: f64,
}

impl Default for Constraints {
    fn default() -> Self {
        Self {
            max_duration_secs: 20.0 * 60.0,
            max_size_mb: 25.0,
            allowed_extensions: DEFAULT_ALLOWED_FORMATS
                .iter()
                .map(|ext| ext.to_string())
                .collect(),
            silence_threshold_db: -30.0,
            min_silence_duration_secs: 0.5,
            target_silence_search_ratio: 0.95,
        }
    }
}

impl Constraints {
    pub fn max_size_bytes(&self) -> f64 {
        self.max_size_mb * BYTES_PER_MB
    }

    /// Whether a probed file satisfies both the duration and the size limit.
    pub fn is_within(&self, info: &FileInfo) -> bool {
        info.duration_secs <= self.max_duration_secs && info.size_mb() <= self.max_size_mb
    }

    /// Case-insensitive allow-list check.
    pub fn allows(&self, extension: &str) -> bool {
        self.allowed_extensions
            .contains(&extension.to_ascii_lowercase())
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.max_duration_secs.is_finite() && self.max_duration_secs > 0.0) {
            return Err(ChunkerError::Config(
                "max_duration_secs must be greater than 0".to_string(),
            ));
        }
        if !(self.max_size_mb.is_finite() && self.max_size_mb > 0.0) {
            return Err(ChunkerError::Config(
                "max_size_mb must be greater than 0".to_string(),
            ));
        }
        if !(self.target_silence_search_ratio > 0.0 && self.target_silence_search_ratio <= 1.0) {
            return Err(ChunkerError::Config(format!(
                "target_silence_search_ratio must be in (0, 1], got {}",
                self.target_silence_search_ratio
            )));
        }
        if self.silence_threshold_db > 0.0 {
            return Err(ChunkerError::Config(format!(
                "silence_threshold_db must not be positive, got {}",
                self.silence_threshold_db
            )));
        }
        if self.min_silence_duration_secs <= 0.0 {
            return Err(ChunkerError::Config(
                "min_silence_duration_secs must be greater than 0".to_string(),
            ));
        }
        if self.allowed_extensions.is_empty() {
            return Err(ChunkerError::Config(
                "allowed_extensions must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub constraints: Constraints,
    pub ffmpeg_path: PathBuf,
    pub ffprobe_path: PathBuf,
    /// Root under which each run gets its own directory.
    pub work_dir: PathBuf,
    /// Number of sources processed at once in batch mode.
    pub concurrency: usize,
    pub download_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            constraints: Constraints::default(),
            ffmpeg_path: PathBuf::from("ffmpeg"),
            ffprobe_path: PathBuf::from("ffprobe"),
            work_dir: std::env::temp_dir().join("audio-chunker"),
            concurrency: 4,
            download_timeout_secs: 600,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let mut config = Self::default();

        // Load from config file if it exists
        if let Some(config_path) = Self::config_file_path() {
            if config_path.exists() {
                let contents = std::fs::read_to_string(&config_path)?;
                config = toml::from_str::<Config>(&contents).map_err(|e| {
                    ChunkerError::Config(format!("{}: {e}", config_path.display()))
                })?;
            }
        }

        config.apply_env();
        Ok(config)
    }

    /// Override fields from environment variables.
    pub fn apply_env(&mut self) {
        if let Ok(path) = std::env::var("FFMPEG_PATH") {
            self.ffmpeg_path = PathBuf::from(path);
        }
        if let Ok(path) = std::env::var("FFPROBE_PATH") {
            self.ffprobe_path = PathBuf::from(path);
        }
        if let Ok(dir) = std::env::var("AUDIO_CHUNKER_WORK_DIR") {
            self.work_dir = PathBuf::from(dir);
        }
        if let Some(v) = env_parse("AUDIO_CHUNKER_MAX_DURATION") {
            self.constraints.max_duration_secs = v;
        }
        if let Some(v) = env_parse("AUDIO_CHUNKER_MAX_SIZE_MB") {
            self.constraints.max_size_mb = v;
        }
        if let Some(v) = env_parse("AUDIO_CHUNKER_SILENCE_DB") {
            self.constraints.silence_threshold_db = v;
        }
        if let Some(v) = env_parse("AUDIO_CHUNKER_MIN_SILENCE") {
            self.constraints.min_silence_duration_secs = v;
        }
        if let Some(v) = env_parse("AUDIO_CHUNKER_SEARCH_RATIO") {
            self.constraints.target_silence_search_ratio = v;
        }
        if let Some(v) = env_parse("AUDIO_CHUNKER_CONCURRENCY") {
            self.concurrency = v;
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.constraints.validate()?;

        if self.concurrency == 0 {
            return Err(ChunkerError::Config(
                "Concurrency must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    fn config_file_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("audio-chunker").join("config.toml"))
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}
