//! Error types for batching, gradient clipping and run setup.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while replicating or regrouping batch-bearing values.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BatchError {
    /// A repeat factor was negative. Zero is a valid no-op.
    #[error("invalid repeat factor {factor}: factors must be >= 0")]
    InvalidSpec { factor: i64 },

    /// The leading dimension cannot be split by the repeat factor.
    #[error("leading dimension {dim} is not divisible by repeat factor {repeats}")]
    ShapeMismatch { dim: usize, repeats: usize },

    /// The requested output rank does not match input rank plus regrouped levels.
    #[error("regrouped tensor must have rank {expected}, got {actual}")]
    RankMismatch { expected: usize, actual: usize },

    /// A structured field would exceed the highest supported rank.
    #[error("field `{field}` of rank {rank} cannot gain {levels} more axes")]
    RankOverflow {
        field: String,
        rank: usize,
        levels: usize,
    },

    /// A structured field does not share the collection's batch size.
    #[error("field `{field}` has batch size {actual}, expected {expected}")]
    BatchSizeMismatch {
        field: String,
        expected: usize,
        actual: usize,
    },
}

/// Errors raised by gradient clipping.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClipError {
    #[error("gradient norm of group `{group}` is non-finite ({norm})")]
    NonFiniteNorm { group: String, norm: f64 },

    /// A module parameter has more axes than a [`DynTensor`](crate::tensor::DynTensor) holds.
    #[error("parameter {param} has rank {rank}, above the supported maximum")]
    UnsupportedRank { param: String, rank: usize },
}

/// Errors raised while preparing a run: configuration, result directory, logging.
#[derive(Error, Debug)]
pub enum RunError {
    #[error("failed to access {}: {source}", path.display())]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse YAML config {}: {source}", path.display())]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("YAML config {} must be a mapping at the top level", path.display())]
    NotAMapping { path: PathBuf },

    /// The YAML file sets a value that is only given on the command line or
    /// derived at startup.
    #[error("YAML config {} may not set `{key}`", path.display())]
    ReservedKey { path: PathBuf, key: String },

    #[error("failed to serialize run config: {0}")]
    Json(#[from] serde_json::Error),
}
