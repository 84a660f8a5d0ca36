use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChunkerError {
    #[error("Input file does not exist: {0}")]
    MissingFile(String),

    #[error("Unsupported file format: .{0}")]
    UnsupportedFormat(String),

    #[error("Format conversion failed: {0}")]
    Transcode(String),

    #[error("Failed to probe audio: {0}")]
    Probe(String),

    #[error("Silence detection failed: {0}")]
    SilenceScan(String),

    #[error("Failed to cut audio: {0}")]
    Cut(String),

    #[error("Download failed: {0}")]
    Download(String),

    #[error("Required tool not available: {0}")]
    ToolNotFound(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, ChunkerError>;
