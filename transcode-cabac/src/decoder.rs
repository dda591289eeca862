//! Binary arithmetic decoder.
//!
//! Mirrors [`CabacEncoder`](crate::encoder::CabacEncoder) bin for bin. Context
//! updates are driven by the decoded bins, so after the same prefix of bins
//! both sides hold identical context tables.

use std::sync::Arc;

use tracing::trace;

use crate::bitstream::BitReader;
use crate::context::{ContextState, ContextTable};
use crate::encoder::{check_bypass_count, BinCounts, INITIAL_RANGE, RANGE_MAX, RANGE_MIN};
use crate::error::{CabacError, Result};
use crate::tables::ProbabilityTables;

/// Width of the offset register loaded at session start.
const OFFSET_BITS: u8 = 9;

/// CABAC decoder.
#[derive(Debug, Clone)]
pub struct CabacDecoder<'a> {
    reader: BitReader<'a>,
    range: u32,
    offset: u32,
    contexts: ContextTable,
    counts: BinCounts,
    bin_limit: Option<u64>,
    terminated: bool,
}

impl<'a> CabacDecoder<'a> {
    /// Start decoding `data` with freshly seeded contexts.
    pub fn new(
        data: &'a [u8],
        seeds: &[ContextState],
        tables: Arc<ProbabilityTables>,
    ) -> Result<Self> {
        Self::with_contexts(data, ContextTable::from_seeds(seeds, tables)?)
    }

    /// Start decoding `data` with an already seeded context table.
    pub fn with_contexts(data: &'a [u8], contexts: ContextTable) -> Result<Self> {
        let mut reader = BitReader::new(data);
        let offset = reader.read_bits(OFFSET_BITS)?;
        if offset >= INITIAL_RANGE {
            return Err(CabacError::CorruptStream(format!(
                "initial offset {offset} outside the coding interval"
            )));
        }
        Ok(Self {
            reader,
            range: INITIAL_RANGE,
            offset,
            contexts,
            counts: BinCounts::default(),
            bin_limit: None,
            terminated: false,
        })
    }

    /// End the session after `limit` bins.
    pub fn with_bin_limit(mut self, limit: u64) -> Self {
        self.bin_limit = Some(limit);
        self
    }

    fn ensure_active(&self) -> Result<()> {
        if self.terminated {
            return Err(CabacError::SessionTerminated);
        }
        if let Some(limit) = self.bin_limit {
            if self.counts.total() >= limit {
                return Err(CabacError::BinLimitExceeded { limit });
            }
        }
        Ok(())
    }

    /// Check that the offset lies inside a renormalized interval.
    pub fn check_interval(&self) -> Result<()> {
        if (RANGE_MIN..RANGE_MAX).contains(&self.range) && self.offset < self.range {
            Ok(())
        } else {
            Err(CabacError::DecoderInvariantViolation {
                offset: self.offset,
                range: self.range,
            })
        }
    }

    fn renormalize(&mut self) -> Result<()> {
        while self.range < RANGE_MIN {
            self.range <<= 1;
            self.offset = (self.offset << 1) | self.reader.read_bit()? as u32;
        }
        Ok(())
    }

    /// Decode a bin with the context at `ctx_idx`.
    pub fn decode_regular(&mut self, ctx_idx: usize) -> Result<bool> {
        self.ensure_active()?;
        let ctx = self.contexts.get_state(ctx_idx)?;
        let lps_range = self
            .contexts
            .tables()
            .lps_range(ctx.probability_index, self.range);

        self.range -= lps_range;
        let bin = if self.offset >= self.range {
            self.offset -= self.range;
            self.range = lps_range;
            ctx.lps()
        } else {
            ctx.most_probable_symbol
        };

        self.contexts.update(ctx_idx, bin)?;
        self.renormalize()?;
        self.counts.regular += 1;

        trace!(ctx = ctx_idx, bin, state = ctx.probability_index, "regular bin");
        self.check_interval()?;
        Ok(bin)
    }

    /// Decode an equiprobable bin.
    pub fn decode_bypass(&mut self) -> Result<bool> {
        self.ensure_active()?;
        self.offset = (self.offset << 1) | self.reader.read_bit()? as u32;
        self.counts.bypass += 1;

        let bin = self.offset >= self.range;
        if bin {
            self.offset -= self.range;
        }
        trace!(bin, "bypass bin");
        self.check_interval()?;
        Ok(bin)
    }

    /// Decode `count` bypass bins into an integer, MSB first.
    pub fn decode_bypass_bins(&mut self, count: u8) -> Result<u64> {
        check_bypass_count(count)?;
        let mut value = 0u64;
        for _ in 0..count {
            value = (value << 1) | self.decode_bypass()? as u64;
        }
        Ok(value)
    }

    /// Decode a terminate bin; a 1 ends the session.
    pub fn decode_terminate(&mut self) -> Result<bool> {
        self.ensure_active()?;
        self.range -= 2;
        self.counts.terminate += 1;

        if self.offset >= self.range {
            self.terminated = true;
            trace!("terminate bin, session ended");
            Ok(true)
        } else {
            self.renormalize()?;
            trace!("terminate bin");
            self.check_interval()?;
            Ok(false)
        }
    }

    /// Context table.
    pub fn contexts(&self) -> &ContextTable {
        &self.contexts
    }

    /// Current `(offset, range)` pair.
    pub fn interval(&self) -> (u32, u32) {
        (self.offset, self.range)
    }

    /// Bins decoded so far.
    pub fn bin_counts(&self) -> BinCounts {
        self.counts
    }

    /// Input bits consumed so far.
    pub fn bits_consumed(&self) -> usize {
        self.reader.position()
    }

    /// Whether the terminate marker has been decoded.
    pub fn is_terminated(&self) -> bool {
        self.terminated
    }
}
