use std::path::PathBuf;

pub use crate::config::QpeConfig;

/// Output produced by each stage.
#[derive(Debug, Clone)]
pub struct StageOutput<T> {
    pub value: T,
    pub metadata: StageMetadata,
}

impl<T> StageOutput<T> {
    pub fn new(value: T, metadata: StageMetadata) -> Self {
        Self { value, metadata }
    }
}

/// Metadata used for chaining stages and telemetry.
#[derive(Debug, Clone, Default)]
pub struct StageMetadata {
    pub notes: Vec<String>,
}

impl StageMetadata {
    pub fn with_note(note: impl Into<String>) -> Self {
        Self {
            notes: vec![note.into()],
        }
    }

    pub fn push(&mut self, note: impl Into<String>) {
        self.notes.push(note.into());
    }
}

/// Common error type for decoding and stage execution.
#[derive(thiserror::Error, Debug)]
pub enum QpeError {
    #[error("failed to open {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("truncated scan while reading {section}")]
    Truncated { section: &'static str },
    #[error("invalid scan: {0}")]
    InvalidScan(String),
    #[error("cannot parse scan time from file name {0}")]
    FileName(String),
    #[error("no input scans")]
    NoScans,
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("grid mismatch: {0}")]
    GridMismatch(String),
    #[error("worker pool: {0}")]
    ThreadPool(String),
    #[error("internal failure: {0}")]
    Internal(String),
}

pub type QpeResult<T> = Result<T, QpeError>;

/// Trait describing the sequential processing stages of an hourly run.
pub trait ProcessingStage {
    type Input;
    type Output;

    fn initialize(&mut self, config: &QpeConfig) -> QpeResult<()>;
    fn execute(&mut self, input: Self::Input) -> QpeResult<StageOutput<Self::Output>>;
    fn cleanup(&mut self);
}
