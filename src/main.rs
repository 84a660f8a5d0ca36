use anyhow::{Context, Result};
use audio_chunker::config::Config;
use audio_chunker::{print_summary, FfmpegTools, RunCoordinator, SourceReference, Toolkit};
use clap::Parser;
use std::path::PathBuf;
use tracing::{error, info, Level};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "audio-chunker")]
#[command(version, about = "Split audio into chunks that fit transcription API limits")]
#[command(long_about = "Split long recordings (local files or URLs) into chunks under a maximum duration and size, cutting on silence whenever possible.")]
struct Cli {
    /// Input audio files or http(s) URLs
    #[arg(required = true)]
    inputs: Vec<String>,

    /// Maximum chunk duration in seconds
    #[arg(long)]
    max_duration: Option<f64>,

    /// Maximum chunk size in MB
    #[arg(long)]
    max_size_mb: Option<f64>,

    /// Silence threshold in dB (e.g. -30)
    #[arg(long, allow_hyphen_values = true)]
    silence_db: Option<f64>,

    /// Minimum silence length in seconds
    #[arg(long)]
    min_silence: Option<f64>,

    /// Fraction of the max duration where the silence search starts
    #[arg(long)]
    search_ratio: Option<f64>,

    /// Directory for chunk output (one sub-directory per run)
    #[arg(short, long)]
    work_dir: Option<PathBuf>,

    /// Path to the ffmpeg binary
    #[arg(long)]
    ffmpeg: Option<PathBuf>,

    /// Path to the ffprobe binary
    #[arg(long)]
    ffprobe: Option<PathBuf>,

    /// Number of inputs processed at once
    #[arg(short, long)]
    concurrency: Option<usize>,

    /// Print the run reports as JSON instead of a summary
    #[arg(long)]
    json: bool,

    /// Disable progress bars
    #[arg(long)]
    no_progress: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn apply(&self, config: &mut Config) {
        let c = &mut config.constraints;
        if let Some(v) = self.max_duration {
            c.max_duration_secs = v;
        }
        if let Some(v) = self.max_size_mb {
            c.max_size_mb = v;
        }
        if let Some(v) = self.silence_db {
            c.silence_threshold_db = v;
        }
        if let Some(v) = self.min_silence {
            c.min_silence_duration_secs = v;
        }
        if let Some(v) = self.search_ratio {
            c.target_silence_search_ratio = v;
        }
        if let Some(ref dir) = self.work_dir {
            config.work_dir = dir.clone();
        }
        if let Some(ref path) = self.ffmpeg {
            config.ffmpeg_path = path.clone();
        }
        if let Some(ref path) = self.ffprobe {
            config.ffprobe_path = path.clone();
        }
        if let Some(n) = self.concurrency {
            config.concurrency = n;
        }
    }
}

fn init_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_ascii_lowercase()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let mut config = Config::load().context("Failed to load configuration")?;
    cli.apply(&mut config);
    config
        .validate()
        .context("Configuration validation failed")?;

    let tools = FfmpegTools::new(&config);
    tools
        .check()
        .await
        .context("FFmpeg is required. Install it with: brew install ffmpeg (macOS) or apt install ffmpeg (Linux)")?;

    info!("Work dir: {}", config.work_dir.display());
    info!("Inputs:   {}", cli.inputs.len());

    let coordinator = RunCoordinator::new(config, Toolkit::ffmpeg(tools))
        .context("Failed to create run coordinator")?
        .with_progress(!cli.no_progress);

    let sources: Vec<SourceReference> = cli
        .inputs
        .iter()
        .map(|input| SourceReference::parse(input))
        .collect();

    let results = coordinator.process_batch(&sources).await;

    let mut reports = Vec::new();
    let mut failures = 0;
    for (source, result) in sources.iter().zip(results) {
        match result {
            Ok(report) => reports.push(report),
            Err(e) => {
                error!("{}: {}", source, e);
                failures += 1;
            }
        }
    }

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    } else {
        for report in &reports {
            print_summary(report);
        }
    }

    if failures > 0 {
        anyhow::bail!("{} of {} inputs failed", failures, sources.len());
    }

    Ok(())
}
