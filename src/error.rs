use thiserror::Error;

/// Raised while loading or validating the question/weight/projection tables.
///
/// A config that fails validation never produces a [`crate::VectorTables`],
/// so no engine can run on mis-shaped data.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Expected {expected} questions, found {found}")]
    QuestionCount { expected: usize, found: usize },
    #[error("Question {question} has {found} weights, expected {expected}")]
    ChoiceCount {
        question: usize,
        expected: usize,
        found: usize,
    },
    #[error("Question {question} choice {choice} has a non-finite weight")]
    NonFiniteWeight { question: usize, choice: usize },
    #[error("Question {question} targets axis {axis}, valid range is 0..{axes}")]
    TargetAxis {
        question: usize,
        axis: usize,
        axes: usize,
    },
    #[error("Weight matrix must be {rows}x{cols}: {detail}")]
    WeightMatrixShape {
        rows: usize,
        cols: usize,
        detail: String,
    },
    #[error("Projection matrix must be {rows}x{cols}: {detail}")]
    ProjectionShape {
        rows: usize,
        cols: usize,
        detail: String,
    },
    #[error("Expected {expected} {kind} axis names, found {found}")]
    AxisNames {
        kind: &'static str,
        expected: usize,
        found: usize,
    },
    #[error("Invalid parameter `{name}`: {reason}")]
    InvalidParameter { name: &'static str, reason: String },
    #[error("Config parse error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid magic bytes")]
    InvalidMagic,
    #[error("File too small")]
    FileTooSmall,
    #[error("Unsupported record version {0}")]
    UnsupportedVersion(u32),
    #[error("Checksum mismatch")]
    ChecksumMismatch,
    #[error("Record corrupted: {0}")]
    Corrupted(String),
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}
