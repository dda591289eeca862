//! Carry-propagating bit sink.
//!
//! The encoder's `low` register can still receive a carry after a bit has been
//! decided to be "almost" 0 or 1. Such ambiguous bits are not written; the
//! sink counts them and writes them once the next resolved bit settles which
//! way they went.

use crate::bitstream::BitWriter;
use crate::error::{CabacError, Result};

/// Snapshot of the sink's carry bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CarryState {
    /// Ambiguous bits waiting for resolution.
    pub pending_run_length: u32,
    /// Last bit that resolved a run (including the dropped first bit).
    pub last_emitted_bit: Option<bool>,
}

/// Output side of the arithmetic encoder.
#[derive(Debug, Clone)]
pub struct BitSink {
    writer: BitWriter,
    pending: u32,
    max_pending: u32,
    first_bit: bool,
    last_emitted: Option<bool>,
    finalized: bool,
}

impl BitSink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::with_capacity(4096)
    }

    /// Create an empty sink with an output capacity hint in bytes.
    pub fn with_capacity(bytes: usize) -> Self {
        Self {
            writer: BitWriter::with_capacity(bytes),
            pending: 0,
            max_pending: 0,
            first_bit: true,
            last_emitted: None,
            finalized: false,
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.finalized {
            return Err(CabacError::Finalized);
        }
        Ok(())
    }

    /// Write a resolved bit and flush the pending run behind it.
    ///
    /// The first resolved bit of a session is the carry slot above the
    /// initial interval and is never written.
    pub fn emit(&mut self, bit: bool) -> Result<()> {
        self.ensure_open()?;
        if self.first_bit {
            self.first_bit = false;
        } else {
            self.writer.write_bit(bit);
        }
        self.resolve_carry(bit)
    }

    /// Record one more ambiguous bit.
    pub fn defer(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.pending += 1;
        self.max_pending = self.max_pending.max(self.pending);
        Ok(())
    }

    /// Write the pending run as copies of `!bit`.
    pub fn resolve_carry(&mut self, bit: bool) -> Result<()> {
        self.ensure_open()?;
        for _ in 0..self.pending {
            self.writer.write_bit(!bit);
        }
        self.pending = 0;
        self.last_emitted = Some(bit);
        Ok(())
    }

    /// Write bits that bypass carry handling, MSB first.
    pub fn write_raw(&mut self, value: u32, count: u8) -> Result<()> {
        self.ensure_open()?;
        self.writer.write_bits(value, count);
        Ok(())
    }

    /// Current carry bookkeeping.
    pub fn carry_state(&self) -> CarryState {
        CarryState {
            pending_run_length: self.pending,
            last_emitted_bit: self.last_emitted,
        }
    }

    /// Longest pending run seen so far.
    pub fn max_pending_run(&self) -> u32 {
        self.max_pending
    }

    /// Bits written so far, excluding pending ones.
    pub fn bits_written(&self) -> usize {
        self.writer.position()
    }

    /// Whether [`finalize`](Self::finalize) has run.
    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Pad to a byte boundary and hand out the bytes.
    ///
    /// Pending bits that were never resolved are dropped; the encoder always
    /// resolves them during its flush.
    pub fn finalize(&mut self) -> Result<Vec<u8>> {
        self.ensure_open()?;
        self.writer.align_to_byte();
        self.finalized = true;
        Ok(self.writer.take_data())
    }
}

impl Default for BitSink {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_bit_is_dropped() {
        let mut sink = BitSink::new();
        sink.emit(true).unwrap();
        sink.emit(true).unwrap();
        sink.emit(false).unwrap();
        assert_eq!(sink.bits_written(), 2);
        assert_eq!(sink.finalize().unwrap(), vec![0b1000_0000]);
    }

    #[test]
    fn test_carry_resolves_pending_run() {
        let mut sink = BitSink::new();
        sink.emit(false).unwrap();
        sink.emit(false).unwrap();
        for _ in 0..3 {
            sink.defer().unwrap();
        }
        assert_eq!(sink.carry_state().pending_run_length, 3);

        // A carry writes 1000 where a 0 would have written 0111.
        sink.emit(true).unwrap();
        let state = sink.carry_state();
        assert_eq!(state.pending_run_length, 0);
        assert_eq!(state.last_emitted_bit, Some(true));
        assert_eq!(sink.max_pending_run(), 3);
        assert_eq!(sink.finalize().unwrap(), vec![0b0100_0000]);
    }

    #[test]
    fn test_zero_resolves_run_to_ones() {
        let mut sink = BitSink::new();
        sink.emit(false).unwrap();
        sink.defer().unwrap();
        sink.defer().unwrap();
        sink.emit(false).unwrap();
        assert_eq!(sink.finalize().unwrap(), vec![0b0110_0000]);
    }

    #[test]
    fn test_raw_bits_and_padding() {
        let mut sink = BitSink::new();
        sink.emit(false).unwrap();
        sink.write_raw(0b1011, 4).unwrap();
        assert_eq!(sink.bits_written(), 4);
        assert_eq!(sink.finalize().unwrap(), vec![0b1011_0000]);
    }

    #[test]
    fn test_operations_after_finalize_fail() {
        let mut sink = BitSink::new();
        sink.emit(true).unwrap();
        assert!(sink.finalize().unwrap().is_empty());
        assert!(sink.is_finalized());

        assert!(matches!(sink.emit(true), Err(CabacError::Finalized)));
        assert!(matches!(sink.defer(), Err(CabacError::Finalized)));
        assert!(matches!(sink.resolve_carry(false), Err(CabacError::Finalized)));
        assert!(matches!(sink.write_raw(1, 1), Err(CabacError::Finalized)));
        assert!(matches!(sink.finalize(), Err(CabacError::Finalized)));
    }
}
