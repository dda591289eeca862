//! Context store: per-context probability state and its adaptive update.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{CabacError, Result};
use crate::selector::SliceType;
use crate::tables::{ProbabilityTables, MAX_STATE};

/// Probability state of one context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ContextState {
    /// Probability state index (0-63); higher means more confident.
    pub probability_index: u8,
    /// Most probable symbol.
    pub most_probable_symbol: bool,
}

impl ContextState {
    /// Create a state, checking the index range.
    pub fn new(probability_index: u8, most_probable_symbol: bool) -> Result<Self> {
        if probability_index > MAX_STATE {
            return Err(CabacError::InvalidSeed(format!(
                "probability index {probability_index} exceeds {MAX_STATE}"
            )));
        }
        Ok(Self {
            probability_index,
            most_probable_symbol,
        })
    }

    /// Lowest-confidence state with MPS 0.
    pub const fn equiprobable() -> Self {
        Self {
            probability_index: 0,
            most_probable_symbol: false,
        }
    }

    /// Derive a state from an 8-bit init value and the slice QP.
    ///
    /// The high nibble selects the slope and the low nibble the offset of a
    /// linear function of QP, clipped to the 1..=126 pre-state range.
    pub fn from_init_value(init_value: u8, slice_qp: i32) -> Self {
        let slope_idx = (init_value >> 4) as i32;
        let offset_idx = (init_value & 0x0F) as i32;
        let m = slope_idx * 5 - 45;
        let n = (offset_idx << 3) - 16;

        let qp = slice_qp.clamp(0, 51);
        let pre_ctx_state = (((m * qp) >> 4) + n).clamp(1, 126);

        if pre_ctx_state <= 63 {
            Self {
                probability_index: (63 - pre_ctx_state) as u8,
                most_probable_symbol: false,
            }
        } else {
            Self {
                probability_index: (pre_ctx_state - 64) as u8,
                most_probable_symbol: true,
            }
        }
    }

    /// Least probable symbol.
    pub fn lps(&self) -> bool {
        !self.most_probable_symbol
    }
}

/// Per-session context table.
///
/// Owned exclusively by one encoder or decoder. The probability tables are
/// immutable and may be shared between sessions.
#[derive(Debug, Clone)]
pub struct ContextTable {
    states: Vec<ContextState>,
    tables: Arc<ProbabilityTables>,
}

impl ContextTable {
    /// Seed a table, rejecting states outside the probability tables.
    pub fn from_seeds(seeds: &[ContextState], tables: Arc<ProbabilityTables>) -> Result<Self> {
        validate_states(seeds)?;
        Ok(Self {
            states: seeds.to_vec(),
            tables,
        })
    }

    /// Seed a table using the built-in probability tables.
    pub fn with_standard_tables(seeds: &[ContextState]) -> Result<Self> {
        Self::from_seeds(seeds, Arc::new(ProbabilityTables::standard()))
    }

    /// Reseed for a new independent session.
    ///
    /// On error the table keeps its current states.
    pub fn reset(&mut self, seeds: &[ContextState]) -> Result<()> {
        validate_states(seeds)?;
        self.states.clear();
        self.states.extend_from_slice(seeds);
        Ok(())
    }

    /// Number of contexts.
    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// Whether the table has no contexts.
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Current state of a context.
    pub fn get_state(&self, index: usize) -> Result<ContextState> {
        self.states
            .get(index)
            .copied()
            .ok_or(CabacError::ContextIndexOutOfRange {
                index,
                len: self.states.len(),
            })
    }

    /// Apply the adaptive update after a regular bin.
    ///
    /// An MPS moves toward certainty. An LPS moves toward uncertainty and, at
    /// probability index 0, swaps the MPS.
    pub fn update(&mut self, index: usize, bin: bool) -> Result<()> {
        let len = self.states.len();
        let ctx = self
            .states
            .get_mut(index)
            .ok_or(CabacError::ContextIndexOutOfRange { index, len })?;

        if bin == ctx.most_probable_symbol {
            ctx.probability_index = self.tables.next_state_mps(ctx.probability_index);
        } else {
            if ctx.probability_index == 0 {
                ctx.most_probable_symbol = !ctx.most_probable_symbol;
            }
            ctx.probability_index = self.tables.next_state_lps(ctx.probability_index);
        }
        Ok(())
    }

    /// All context states.
    pub fn states(&self) -> &[ContextState] {
        &self.states
    }

    /// Probability tables used by this table.
    pub fn tables(&self) -> &ProbabilityTables {
        &self.tables
    }
}

impl PartialEq for ContextTable {
    fn eq(&self, other: &Self) -> bool {
        self.states == other.states
    }
}

impl Eq for ContextTable {}

/// Seed tables keyed by slice type.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ContextSeeds {
    tables: BTreeMap<SliceType, Vec<ContextState>>,
}

impl ContextSeeds {
    /// No seed tables.
    pub fn new() -> Self {
        Self::default()
    }

    /// Equiprobable seeds for every slice type.
    pub fn equiprobable(num_contexts: usize) -> Self {
        let seeds = vec![ContextState::equiprobable(); num_contexts];
        Self {
            tables: SliceType::ALL
                .iter()
                .map(|&slice_type| (slice_type, seeds.clone()))
                .collect(),
        }
    }

    /// Set explicit states for a slice type.
    pub fn with_states(mut self, slice_type: SliceType, states: Vec<ContextState>) -> Result<Self> {
        validate_states(&states)?;
        self.tables.insert(slice_type, states);
        Ok(self)
    }

    /// Derive the states of a slice type from init values and slice QP.
    pub fn with_init_values(mut self, slice_type: SliceType, init_values: &[u8], slice_qp: i32) -> Self {
        let states = init_values
            .iter()
            .map(|&v| ContextState::from_init_value(v, slice_qp))
            .collect();
        self.tables.insert(slice_type, states);
        self
    }

    /// Seed table for a slice type.
    pub fn seeds_for(&self, slice_type: SliceType) -> Result<&[ContextState]> {
        self.tables
            .get(&slice_type)
            .map(Vec::as_slice)
            .ok_or(CabacError::MissingSeeds(slice_type))
    }

    /// Seed table for a slice type, checked against a required size.
    pub fn seeds_for_layout(&self, slice_type: SliceType, needed: usize) -> Result<&[ContextState]> {
        let seeds = self.seeds_for(slice_type)?;
        if seeds.len() < needed {
            return Err(CabacError::SeedTableTooSmall {
                got: seeds.len(),
                needed,
            });
        }
        Ok(seeds)
    }

    /// Check every stored state.
    pub fn validate(&self) -> Result<()> {
        self.tables.values().try_for_each(|states| validate_states(states))
    }
}

fn validate_states(states: &[ContextState]) -> Result<()> {
    match states.iter().position(|s| s.probability_index > MAX_STATE) {
        Some(i) => Err(CabacError::InvalidSeed(format!(
            "context {i} has probability index {} > {MAX_STATE}",
            states[i].probability_index
        ))),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single(state: u8, mps: bool) -> ContextTable {
        ContextTable::with_standard_tables(&[ContextState::new(state, mps).unwrap()]).unwrap()
    }

    #[test]
    fn test_mps_update_moves_up() {
        let mut table = single(5, true);
        table.update(0, true).unwrap();
        let s = table.get_state(0).unwrap();
        assert_eq!(s.probability_index, 6);
        assert!(s.most_probable_symbol);
    }

    #[test]
    fn test_mps_saturates() {
        let mut table = single(62, false);
        for _ in 0..5 {
            table.update(0, false).unwrap();
        }
        assert_eq!(table.get_state(0).unwrap().probability_index, 62);
    }

    #[test]
    fn test_lps_update_moves_down() {
        let mut table = single(20, false);
        table.update(0, true).unwrap();
        let s = table.get_state(0).unwrap();
        assert_eq!(s.probability_index, 16);
        assert!(!s.most_probable_symbol);
    }

    #[test]
    fn test_lps_at_zero_flips_mps() {
        let mut table = single(0, false);
        table.update(0, true).unwrap();
        let s = table.get_state(0).unwrap();
        assert_eq!(s.probability_index, 0);
        assert!(s.most_probable_symbol);
    }

    #[test]
    fn test_index_out_of_range() {
        let mut table = single(0, false);
        assert!(matches!(
            table.get_state(1),
            Err(CabacError::ContextIndexOutOfRange { index: 1, len: 1 })
        ));
        assert!(table.update(3, true).is_err());
    }

    #[test]
    fn test_reset_restores_seeds() {
        let seeds = [ContextState::equiprobable(); 4];
        let mut table = ContextTable::with_standard_tables(&seeds).unwrap();
        table.update(2, false).unwrap();
        assert_ne!(table.states(), &seeds);
        table.reset(&seeds).unwrap();
        assert_eq!(table.states(), &seeds);
    }

    #[test]
    fn test_out_of_table_seed_rejected() {
        let bad = ContextState {
            probability_index: 64,
            most_probable_symbol: false,
        };
        let err = ContextTable::with_standard_tables(&[ContextState::equiprobable(), bad])
            .unwrap_err();
        assert!(matches!(err, CabacError::InvalidSeed(_)));
        assert_eq!(err.kind(), crate::error::ErrorKind::Configuration);

        let seeds = [ContextState::equiprobable(); 2];
        let mut table = ContextTable::with_standard_tables(&seeds).unwrap();
        table.update(0, true).unwrap();
        let before = table.states().to_vec();
        assert!(matches!(table.reset(&[bad]), Err(CabacError::InvalidSeed(_))));
        assert_eq!(table.states(), &before[..]);
    }

    #[test]
    fn test_init_value_derivation() {
        // 154 is the equiprobable init value at every QP.
        for qp in [0, 26, 51] {
            let s = ContextState::from_init_value(154, qp);
            assert_eq!(s.probability_index, 0);
            assert!(s.most_probable_symbol);
        }
        let s = ContextState::from_init_value(0, 51);
        assert!(!s.most_probable_symbol);
        assert!(s.probability_index <= MAX_STATE);
        let s = ContextState::from_init_value(255, 51);
        assert!(s.most_probable_symbol);
        assert!(s.probability_index <= MAX_STATE);
    }

    #[test]
    fn test_seeds() {
        let seeds = ContextSeeds::equiprobable(10);
        assert_eq!(seeds.seeds_for(SliceType::P).unwrap().len(), 10);
        assert!(seeds.seeds_for_layout(SliceType::B, 11).is_err());

        let seeds = ContextSeeds::new().with_init_values(SliceType::I, &[154, 200], 30);
        assert!(matches!(
            seeds.seeds_for(SliceType::B),
            Err(CabacError::MissingSeeds(SliceType::B))
        ));
        assert_eq!(seeds.seeds_for(SliceType::I).unwrap().len(), 2);
    }

    #[test]
    fn test_seed_validation() {
        assert!(ContextState::new(64, false).is_err());
        let bad = vec![ContextState {
            probability_index: 70,
            most_probable_symbol: false,
        }];
        assert!(ContextSeeds::new().with_states(SliceType::I, bad).is_err());
    }
}
