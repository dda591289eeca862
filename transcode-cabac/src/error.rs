//! CABAC error types.
//!
//! Errors fall into four classes (see [`ErrorKind`]): caller input errors,
//! configuration errors, session state errors and internal invariant
//! violations. Arithmetic coding state is cumulative, so a state or internal
//! error invalidates the rest of the session; the only recovery is to start a
//! new one.

use std::fmt;
use thiserror::Error;

use crate::selector::{CodingMode, SliceType, SyntaxElement};

/// Error class of a [`CabacError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Caller supplied a value the operation cannot represent.
    Value,
    /// Missing or inconsistent configuration data.
    Configuration,
    /// The session is in a state where the operation is not allowed.
    State,
    /// The engine broke one of its own invariants.
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value => write!(f, "value"),
            Self::Configuration => write!(f, "configuration"),
            Self::State => write!(f, "state"),
            Self::Internal => write!(f, "internal"),
        }
    }
}

/// CABAC error type.
#[derive(Error, Debug)]
pub enum CabacError {
    /// Bin value outside {0, 1}.
    #[error("Invalid bin value: {0} (expected 0 or 1)")]
    InvalidBin(u8),

    /// Negative value given to an unsigned binarization.
    #[error("Negative value {value} cannot be binarized with {scheme}")]
    NegativeValue { value: i64, scheme: &'static str },

    /// Value not representable by the binarization.
    #[error("Value {value} out of range for {scheme}: {reason}")]
    ValueOutOfRange {
        value: i64,
        scheme: &'static str,
        reason: String,
    },

    /// Scheme parameters are unusable.
    #[error("Invalid binarization scheme: {0}")]
    InvalidScheme(String),

    /// Syntax element has no context range for the coding mode.
    #[error("No context range for {element} in {mode}")]
    MissingContextRange {
        element: SyntaxElement,
        mode: CodingMode,
    },

    /// A category was supplied for an element without category offsets.
    #[error("{0} has no category offsets")]
    NoCategoryOffsets(SyntaxElement),

    /// Category index beyond the element's offset table.
    #[error("Unknown category {category} for {element} ({available} available)")]
    UnknownCategory {
        element: SyntaxElement,
        category: usize,
        available: usize,
    },

    /// Context index outside the context table.
    #[error("Context index {index} out of range (table has {len} contexts)")]
    ContextIndexOutOfRange { index: usize, len: usize },

    /// No seed table for the slice type.
    #[error("No context seeds for {0} slices")]
    MissingSeeds(SliceType),

    /// Seed table shorter than the context layout requires.
    #[error("Seed table has {got} entries, context layout needs {needed}")]
    SeedTableTooSmall { got: usize, needed: usize },

    /// Seed entry outside the valid probability state range.
    #[error("Invalid context seed: {0}")]
    InvalidSeed(String),

    /// Probability tables failed validation.
    #[error("Invalid probability tables: {0}")]
    InvalidTables(String),

    /// Context layout of a syntax element is inconsistent.
    #[error("Invalid context layout for {element}: {reason}")]
    InvalidLayout {
        element: SyntaxElement,
        reason: String,
    },

    /// Binding of a syntax element is inconsistent.
    #[error("Invalid binding for {element}: {reason}")]
    InvalidBinding {
        element: SyntaxElement,
        reason: String,
    },

    /// JSON configuration error.
    #[error("Config parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error while loading configuration.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Worker pool for parallel sessions could not be created.
    #[error("Thread pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    /// Bit sink used after finalization.
    #[error("Bit sink already finalized")]
    Finalized,

    /// Decode attempted past the declared bin count.
    #[error("Bin limit of {limit} exceeded")]
    BinLimitExceeded { limit: u64 },

    /// Decode attempted after the termination marker.
    #[error("Session already terminated")]
    SessionTerminated,

    /// Input bitstream exhausted.
    #[error("Unexpected end of bitstream at bit {position}")]
    UnexpectedEnd { position: usize },

    /// Coded data cannot come from a conforming encoder.
    #[error("Corrupt bitstream: {0}")]
    CorruptStream(String),

    /// Bin string does not match the scheme.
    #[error("Malformed bin string for {scheme}: {reason}")]
    MalformedBins {
        scheme: &'static str,
        reason: String,
    },

    /// Interval left its valid window; this is an engine bug.
    #[error("Interval invariant violated: low={low}, range={range}")]
    InvariantViolation { low: u32, range: u32 },

    /// Decoder offset left its interval; this is an engine bug.
    #[error("Decoder invariant violated: offset={offset}, range={range}")]
    DecoderInvariantViolation { offset: u32, range: u32 },
}

impl CabacError {
    /// Error class.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidBin(_)
            | Self::NegativeValue { .. }
            | Self::ValueOutOfRange { .. }
            | Self::InvalidScheme(_) => ErrorKind::Value,
            Self::MissingContextRange { .. }
            | Self::NoCategoryOffsets(_)
            | Self::UnknownCategory { .. }
            | Self::ContextIndexOutOfRange { .. }
            | Self::MissingSeeds(_)
            | Self::SeedTableTooSmall { .. }
            | Self::InvalidSeed(_)
            | Self::InvalidTables(_)
            | Self::InvalidLayout { .. }
            | Self::InvalidBinding { .. }
            | Self::Json(_)
            | Self::Io(_)
            | Self::ThreadPool(_) => ErrorKind::Configuration,
            Self::Finalized
            | Self::BinLimitExceeded { .. }
            | Self::SessionTerminated
            | Self::UnexpectedEnd { .. }
            | Self::CorruptStream(_)
            | Self::MalformedBins { .. } => ErrorKind::State,
            Self::InvariantViolation { .. } | Self::DecoderInvariantViolation { .. } => {
                ErrorKind::Internal
            }
        }
    }

    /// Whether the session that produced this error must be discarded.
    pub fn is_fatal(&self) -> bool {
        matches!(self.kind(), ErrorKind::State | ErrorKind::Internal)
    }
}

/// Result type for CABAC operations.
pub type Result<T> = std::result::Result<T, CabacError>;
