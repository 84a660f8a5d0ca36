pub mod audio;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod segmenter;
pub mod source;
pub mod state;

pub use audio::{FfmpegTools, FileInfo, Toolkit};
pub use config::{Config, Constraints};
pub use coordinator::{print_summary, RunCoordinator, RunReport, RunStats};
pub use error::{ChunkerError, Result};
pub use segmenter::Segmenter;
pub use source::SourceReference;
pub use state::RunState;
