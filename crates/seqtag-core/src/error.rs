use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur during seqtag core operations.
#[derive(Debug, Error)]
pub enum SeqtagError {
    /// A batch or corpus contained no sentences.
    #[error("input contains no sentences")]
    EmptyInput,

    /// A corpus line did not have the expected `token pos [tag]` columns.
    #[error("line {line}: expected 2 or 3 columns (token pos [tag]), got {columns}")]
    MalformedLine {
        /// 1-based line number in the source.
        line: usize,
        /// Number of whitespace-separated columns found.
        columns: usize,
    },

    /// Labeled and unlabeled tokens were mixed in one corpus or batch.
    #[error("inconsistent columns: expected every token to be {expected}")]
    InconsistentColumns {
        /// Either "labeled" or "unlabeled".
        expected: &'static str,
    },

    /// A label is not part of the vocabulary.
    #[error("unknown label {0:?}")]
    UnknownLabel(String),

    /// A pretrained resource (embedding file, tokenizer, weights) is missing.
    #[error("missing resource {path:?}: {hint}")]
    MissingResource {
        /// Location that was looked up.
        path: PathBuf,
        /// What to do about it.
        hint: String,
    },

    /// An embedding file line could not be parsed.
    #[error("embedding line {line}: {reason}")]
    MalformedEmbedding {
        /// 1-based line number.
        line: usize,
        /// What was wrong with it.
        reason: String,
    },

    /// Unsupported configuration value.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Tensor dimensions did not line up.
    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    /// Word-piece tokenizer failure.
    #[error("tokenizer error: {0}")]
    Tokenizer(String),

    /// Candle ML framework error.
    #[error("tensor error: {0}")]
    Candle(#[from] candle_core::Error),

    /// Filesystem error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error.
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for seqtag operations.
pub type Result<T> = std::result::Result<T, SeqtagError>;
