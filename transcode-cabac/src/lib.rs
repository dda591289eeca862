//! Context-adaptive binary arithmetic coding for the transcode library.
//!
//! This crate provides a CABAC entropy coder in the style of H.264/AVC: an
//! encoder that turns syntax-element values into a byte stream, and the
//! symmetric decoder used to validate it.
//!
//! # Features
//!
//! - **Binarization**: unary, truncated unary, k-th order Exp-Golomb (with
//!   signed folding) and fixed-length bin strings
//! - **Context Modeling**: 64-state adaptive probability contexts, seeded
//!   from explicit states or from init values and slice QP
//! - **Context Selection**: per-element context ranges for each slice type,
//!   frame and field ranges, residual block categories
//! - **Arithmetic Engine**: regular, bypass and terminate coding paths sharing
//!   one renormalizing interval, with carry propagation into the output
//! - **Sessions**: slice-level encoders and decoders driven by a JSON
//!   configuration, plus parallel coding of independent slices
//!
//! # Example
//!
//! ```rust
//! use transcode_cabac::{
//!     CabacConfig, CodingMode, ContextSite, SliceDecoder, SliceEncoder, SliceType, SyntaxElement,
//! };
//!
//! # fn main() -> transcode_cabac::Result<()> {
//! let config = CabacConfig::default();
//! let mode = CodingMode::frame(SliceType::P);
//!
//! let mut encoder = SliceEncoder::new(&config, mode)?;
//! encoder.encode(SyntaxElement::MbType, 2, ContextSite::default())?;
//! encoder.encode(SyntaxElement::MvdX, -5, ContextSite::default())?;
//! let data = encoder.finish()?;
//!
//! let mut decoder = SliceDecoder::new(&config, mode, &data)?;
//! assert_eq!(decoder.decode(SyntaxElement::MbType, ContextSite::default())?, 2);
//! assert_eq!(decoder.decode(SyntaxElement::MvdX, ContextSite::default())?, -5);
//! assert!(decoder.decode_end_of_slice()?);
//! # Ok(())
//! # }
//! ```

pub mod binarization;
pub mod bitstream;
pub mod config;
pub mod context;
pub mod decoder;
pub mod encoder;
pub mod error;
pub mod parallel;
pub mod selector;
pub mod session;
pub mod sink;
pub mod tables;

// Re-export error types
pub use error::{CabacError, ErrorKind, Result};

// Re-export engine types
pub use decoder::CabacDecoder;
pub use encoder::{BinCounts, CabacEncoder, IntervalState};
pub use sink::{BitSink, CarryState};

// Re-export modeling types
pub use binarization::Scheme;
pub use context::{ContextSeeds, ContextState, ContextTable};
pub use selector::{BlockType, CodingMode, ContextSelector, SelectorConfig, SliceType, SyntaxElement};
pub use tables::{ProbabilityTables, ProbabilityTablesConfig};

// Re-export session types
pub use config::{BinRouting, CabacConfig, CodingSetup, ElementBinding, SeedSource};
pub use parallel::{decode_slices, encode_slices, DecodeJob, ParallelConfig, SliceJob};
pub use session::{ContextSite, SessionStats, SliceDecoder, SliceEncoder, SyntaxValue};
