//! Binary arithmetic encoder.
//!
//! Regular bins subdivide the interval according to the probability state of
//! their context; bypass bins split it in half and never touch a context;
//! terminate bins reserve a fixed two-unit sub-interval used to mark the end
//! of a session.

use std::sync::Arc;

use tracing::trace;

use crate::context::{ContextState, ContextTable};
use crate::error::{CabacError, Result};
use crate::sink::{BitSink, CarryState};
use crate::tables::ProbabilityTables;

/// Smallest range after renormalization.
pub const RANGE_MIN: u32 = 256;

/// Exclusive upper bound of the range.
pub const RANGE_MAX: u32 = 512;

/// Range at the start of a session.
pub const INITIAL_RANGE: u32 = 510;

/// Upper bound of `low + range`; `low` is kept 10 bits wide.
pub const LOW_LIMIT: u32 = 1 << 10;

const HALF: u32 = 512;
const QUARTER: u32 = 256;

/// The coding interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntervalState {
    /// Lower bound.
    pub low: u32,
    /// Width.
    pub range: u32,
}

impl IntervalState {
    /// Whether the interval is inside its renormalized window.
    pub fn is_valid(&self) -> bool {
        (RANGE_MIN..RANGE_MAX).contains(&self.range) && self.low + self.range <= LOW_LIMIT
    }
}

impl Default for IntervalState {
    fn default() -> Self {
        Self {
            low: 0,
            range: INITIAL_RANGE,
        }
    }
}

/// Bins coded per path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BinCounts {
    /// Context-coded bins.
    pub regular: u64,
    /// Equiprobable bins.
    pub bypass: u64,
    /// Terminate bins.
    pub terminate: u64,
}

impl BinCounts {
    /// Bins over all paths.
    pub fn total(&self) -> u64 {
        self.regular + self.bypass + self.terminate
    }
}

/// Bins that fit the `u64` of the multi-bin bypass calls.
pub const MAX_BYPASS_BINS: u8 = 64;

pub(crate) fn check_bypass_count(count: u8) -> Result<()> {
    if count > MAX_BYPASS_BINS {
        return Err(CabacError::ValueOutOfRange {
            value: count as i64,
            scheme: "bypass",
            reason: format!("at most {MAX_BYPASS_BINS} bins fit in a u64"),
        });
    }
    Ok(())
}

/// CABAC encoder.
#[derive(Debug, Clone)]
pub struct CabacEncoder {
    low: u32,
    range: u32,
    contexts: ContextTable,
    sink: BitSink,
    counts: BinCounts,
    terminated: bool,
}

impl CabacEncoder {
    /// Create an encoder with freshly seeded contexts.
    pub fn new(seeds: &[ContextState], tables: Arc<ProbabilityTables>) -> Result<Self> {
        Ok(Self::with_contexts(ContextTable::from_seeds(seeds, tables)?))
    }

    /// Create an encoder around an already seeded context table.
    pub fn with_contexts(contexts: ContextTable) -> Self {
        Self {
            low: 0,
            range: INITIAL_RANGE,
            contexts,
            sink: BitSink::new(),
            counts: BinCounts::default(),
            terminated: false,
        }
    }

    fn ensure_active(&self) -> Result<()> {
        if self.sink.is_finalized() {
            return Err(CabacError::Finalized);
        }
        if self.terminated {
            return Err(CabacError::SessionTerminated);
        }
        Ok(())
    }

    /// Check the interval invariant.
    pub fn check_interval(&self) -> Result<()> {
        if self.interval().is_valid() {
            Ok(())
        } else {
            Err(CabacError::InvariantViolation {
                low: self.low,
                range: self.range,
            })
        }
    }

    fn renormalize(&mut self) -> Result<()> {
        while self.range < RANGE_MIN {
            if self.low < QUARTER {
                self.sink.emit(false)?;
            } else if self.low >= HALF {
                self.sink.emit(true)?;
                self.low -= HALF;
            } else {
                self.sink.defer()?;
                self.low -= QUARTER;
            }
            self.range <<= 1;
            self.low <<= 1;
        }
        Ok(())
    }

    /// Encode a bin with the context at `ctx_idx`.
    pub fn encode_regular(&mut self, bin: bool, ctx_idx: usize) -> Result<()> {
        self.ensure_active()?;
        let ctx = self.contexts.get_state(ctx_idx)?;
        let lps_range = self
            .contexts
            .tables()
            .lps_range(ctx.probability_index, self.range);

        self.range -= lps_range;
        if bin != ctx.most_probable_symbol {
            self.low += self.range;
            self.range = lps_range;
        }

        self.contexts.update(ctx_idx, bin)?;
        self.renormalize()?;
        self.counts.regular += 1;

        trace!(
            ctx = ctx_idx,
            bin,
            state = ctx.probability_index,
            low = self.low,
            range = self.range,
            "regular bin"
        );
        self.check_interval()
    }

    /// Encode an equiprobable bin.
    pub fn encode_bypass(&mut self, bin: bool) -> Result<()> {
        self.ensure_active()?;
        self.low <<= 1;
        if bin {
            self.low += self.range;
        }

        if self.low >= LOW_LIMIT {
            self.sink.emit(true)?;
            self.low -= LOW_LIMIT;
        } else if self.low < HALF {
            self.sink.emit(false)?;
        } else {
            self.sink.defer()?;
            self.low -= HALF;
        }
        self.counts.bypass += 1;

        trace!(bin, low = self.low, range = self.range, "bypass bin");
        self.check_interval()
    }

    /// Encode the low `count` bits of `value` as bypass bins, MSB first.
    pub fn encode_bypass_bins(&mut self, value: u64, count: u8) -> Result<()> {
        check_bypass_count(count)?;
        for i in (0..count).rev() {
            self.encode_bypass((value >> i) & 1 != 0)?;
        }
        Ok(())
    }

    /// Encode a terminate bin.
    ///
    /// A 1 ends the session: the interval is flushed and no further bins may
    /// be coded. The bytes are obtained with [`finalize`](Self::finalize).
    pub fn encode_terminate(&mut self, bin: bool) -> Result<()> {
        self.ensure_active()?;
        self.range -= 2;
        self.counts.terminate += 1;

        if bin {
            self.low += self.range;
            self.flush()?;
            self.terminated = true;
            trace!(low = self.low, "terminate bin, interval flushed");
            Ok(())
        } else {
            self.renormalize()?;
            trace!(low = self.low, range = self.range, "terminate bin");
            self.check_interval()
        }
    }

    fn flush(&mut self) -> Result<()> {
        self.range = 2;
        self.renormalize()?;
        self.sink.emit((self.low >> 9) & 1 != 0)?;
        // The final bit of the codeword doubles as a stop bit.
        self.sink.write_raw(((self.low >> 7) & 3) | 1, 2)
    }

    /// Terminate the session if needed and return the coded bytes.
    pub fn finalize(&mut self) -> Result<Vec<u8>> {
        if !self.terminated {
            self.encode_terminate(true)?;
        }
        self.sink.finalize()
    }

    /// Current interval.
    pub fn interval(&self) -> IntervalState {
        IntervalState {
            low: self.low,
            range: self.range,
        }
    }

    /// Context table.
    pub fn contexts(&self) -> &ContextTable {
        &self.contexts
    }

    /// Carry bookkeeping of the output sink.
    pub fn carry_state(&self) -> CarryState {
        self.sink.carry_state()
    }

    /// Longest run of deferred bits so far.
    pub fn max_pending_run(&self) -> u32 {
        self.sink.max_pending_run()
    }

    /// Bins coded so far.
    pub fn bin_counts(&self) -> BinCounts {
        self.counts
    }

    /// Whether a terminate bin of 1 has been coded.
    pub fn is_terminated(&self) -> bool {
        self.terminated
    }
}
