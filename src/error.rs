use std::path::PathBuf;

use thiserror::Error;

/// Structural problems that abort a run.
///
/// Recoverable per-file conditions (unknown position, duplicate column) are
/// not errors; they are reported through [`crate::aggregator::IngestReport`].
#[derive(Debug, Error, PartialEq)]
pub enum BinError {
    #[error("bin edges need at least two values, got {0}")]
    TooFewEdges(usize),

    #[error("bin edges must be strictly increasing: edge {index} ({next}) is not above {prev}")]
    NonIncreasingEdges { index: usize, prev: f64, next: f64 },

    #[error("bin edge {index} is not a finite number")]
    NonFiniteEdge { index: usize },

    #[error("bin width must be positive and finite, got {0}")]
    InvalidBinWidth(f64),

    #[error("bin range expands to {0} bins, more than the {max} allowed", max = crate::data::model::MAX_BINS)]
    TooManyBins(f64),

    #[error("timeframe must be a positive number of seconds, got {0}")]
    InvalidTimeframe(f64),

    #[error("position {position} is assigned to both '{first}' and '{second}'")]
    OverlappingPosition {
        position: u32,
        first: String,
        second: String,
    },

    #[error("'{0}' has no 'Pos' marker")]
    MissingPosMarker(PathBuf),

    #[error("'{path}': position token '{token}' is not a 3-digit number")]
    BadPositionToken { path: PathBuf, token: String },

    #[error("'{0}': file name has no date token before the first '_'")]
    MissingDateToken(PathBuf),

    #[error("table has no '{0}' column")]
    MissingTimeColumn(String),

    #[error("column '{name}' has {len} rows, expected {expected}")]
    RaggedColumn {
        name: String,
        len: usize,
        expected: usize,
    },

    #[error("'{path}' has no '{channel}' column")]
    MissingChannel { path: PathBuf, channel: String },
}
