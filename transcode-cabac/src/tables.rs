//! Probability state transition and LPS range tables.
//!
//! The tables define the coder's compression efficiency, so they are never
//! generated at runtime. [`ProbabilityTables::standard`] carries the published
//! 64-state tables tagged with [`TABLE_VERSION`]; other table sets can be
//! supplied as versioned configuration through [`ProbabilityTablesConfig`].

use serde::{Deserialize, Serialize};

use crate::error::{CabacError, Result};

/// Number of probability states.
pub const NUM_STATES: usize = 64;

/// Highest probability state index.
pub const MAX_STATE: u8 = 63;

/// Version tag of the built-in tables.
pub const TABLE_VERSION: &str = "h264-2003/9.3.3.2";

const NEXT_STATE_MPS: [u8; NUM_STATES] = [
    1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16,
    17, 18, 19, 20, 21, 22, 23, 24, 25, 26, 27, 28, 29, 30, 31, 32,
    33, 34, 35, 36, 37, 38, 39, 40, 41, 42, 43, 44, 45, 46, 47, 48,
    49, 50, 51, 52, 53, 54, 55, 56, 57, 58, 59, 60, 61, 62, 62, 63,
];

const NEXT_STATE_LPS: [u8; NUM_STATES] = [
    0, 0, 1, 2, 2, 4, 4, 5, 6, 7, 8, 9, 9, 11, 11, 12,
    13, 13, 15, 15, 16, 16, 18, 18, 19, 19, 21, 21, 22, 22, 23, 24,
    24, 25, 26, 26, 27, 27, 28, 29, 29, 30, 30, 30, 31, 32, 32, 33,
    33, 33, 34, 34, 35, 35, 35, 36, 36, 36, 37, 37, 37, 38, 38, 63,
];

// Indexed by probability state and the two bits below the range MSB.
const RANGE_TAB_LPS: [[u8; 4]; NUM_STATES] = [
    [128, 176, 208, 240], [128, 167, 197, 227], [128, 158, 187, 216], [123, 150, 178, 205],
    [116, 142, 169, 195], [111, 135, 160, 185], [105, 128, 152, 175], [100, 122, 144, 166],
    [95, 116, 137, 158], [90, 110, 130, 150], [85, 104, 123, 142], [81, 99, 117, 135],
    [77, 94, 111, 128], [73, 89, 105, 122], [69, 85, 100, 116], [66, 80, 95, 110],
    [62, 76, 90, 104], [59, 72, 86, 99], [56, 69, 81, 94], [53, 65, 77, 89],
    [51, 62, 73, 85], [48, 59, 69, 80], [46, 56, 66, 76], [43, 53, 63, 72],
    [41, 50, 59, 69], [39, 48, 56, 65], [37, 45, 54, 62], [35, 43, 51, 59],
    [33, 41, 48, 56], [32, 39, 46, 53], [30, 37, 43, 50], [29, 35, 41, 48],
    [27, 33, 39, 45], [26, 31, 37, 43], [24, 30, 35, 41], [23, 28, 33, 39],
    [22, 27, 32, 37], [21, 26, 30, 35], [20, 24, 29, 33], [19, 23, 27, 31],
    [18, 22, 26, 30], [17, 21, 25, 28], [16, 20, 23, 27], [15, 19, 22, 25],
    [14, 18, 21, 24], [14, 17, 20, 23], [13, 16, 19, 22], [12, 15, 18, 21],
    [12, 14, 17, 20], [11, 14, 16, 19], [11, 13, 15, 18], [10, 12, 15, 17],
    [10, 12, 14, 16], [9, 11, 13, 15], [9, 11, 12, 14], [8, 10, 12, 14],
    [8, 9, 11, 13], [7, 9, 11, 12], [7, 9, 10, 12], [7, 8, 10, 11],
    [6, 8, 9, 11], [6, 7, 9, 10], [6, 7, 8, 9], [2, 2, 2, 2],
];

/// Validated probability tables shared read-only by every session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbabilityTables {
    version: String,
    next_state_mps: [u8; NUM_STATES],
    next_state_lps: [u8; NUM_STATES],
    range_lps: [[u8; 4]; NUM_STATES],
}

impl ProbabilityTables {
    /// The built-in table set.
    pub fn standard() -> Self {
        Self {
            version: TABLE_VERSION.to_string(),
            next_state_mps: NEXT_STATE_MPS,
            next_state_lps: NEXT_STATE_LPS,
            range_lps: RANGE_TAB_LPS,
        }
    }

    /// Build tables from external configuration, validating every entry.
    pub fn from_config(config: &ProbabilityTablesConfig) -> Result<Self> {
        if config.version.trim().is_empty() {
            return Err(CabacError::InvalidTables("missing version tag".into()));
        }
        let next_state_mps = to_state_array("next_state_mps", &config.next_state_mps)?;
        let next_state_lps = to_state_array("next_state_lps", &config.next_state_lps)?;
        if config.range_lps.len() != NUM_STATES {
            return Err(CabacError::InvalidTables(format!(
                "range_lps has {} rows, expected {}",
                config.range_lps.len(),
                NUM_STATES
            )));
        }
        let mut range_lps = [[0u8; 4]; NUM_STATES];
        range_lps.copy_from_slice(&config.range_lps);

        let tables = Self {
            version: config.version.clone(),
            next_state_mps,
            next_state_lps,
            range_lps,
        };
        tables.validate()?;
        Ok(tables)
    }

    /// Export the tables as configuration.
    pub fn to_config(&self) -> ProbabilityTablesConfig {
        ProbabilityTablesConfig {
            version: self.version.clone(),
            next_state_mps: self.next_state_mps.to_vec(),
            next_state_lps: self.next_state_lps.to_vec(),
            range_lps: self.range_lps.to_vec(),
        }
    }

    fn validate(&self) -> Result<()> {
        let mut prev_mps = 0u8;
        for state in 0..NUM_STATES {
            let mps = self.next_state_mps[state];
            if (mps as usize) < state || mps < prev_mps {
                return Err(CabacError::InvalidTables(format!(
                    "next_state_mps[{state}] = {mps} is not monotone"
                )));
            }
            prev_mps = mps;

            // State 63 is the non-adapting terminate state.
            let lps = self.next_state_lps[state];
            if state != MAX_STATE as usize && lps as usize > state {
                return Err(CabacError::InvalidTables(format!(
                    "next_state_lps[{state}] = {lps} moves toward certainty"
                )));
            }

            for q in 0..4 {
                let r = self.range_lps[state][q];
                if r == 0 {
                    return Err(CabacError::InvalidTables(format!(
                        "range_lps[{state}][{q}] is zero"
                    )));
                }
                if state > 0 && r > self.range_lps[state - 1][q] {
                    return Err(CabacError::InvalidTables(format!(
                        "range_lps[{state}][{q}] = {r} increases with confidence"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Version tag of this table set.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Next state after coding the MPS.
    #[inline]
    pub fn next_state_mps(&self, state: u8) -> u8 {
        self.next_state_mps[state as usize]
    }

    /// Next state after coding the LPS.
    #[inline]
    pub fn next_state_lps(&self, state: u8) -> u8 {
        self.next_state_lps[state as usize]
    }

    /// LPS sub-range for a probability state and the current range.
    #[inline]
    pub fn lps_range(&self, state: u8, range: u32) -> u32 {
        let q_range_idx = ((range >> 6) & 3) as usize;
        self.range_lps[state as usize][q_range_idx] as u32
    }
}

impl Default for ProbabilityTables {
    fn default() -> Self {
        Self::standard()
    }
}

fn to_state_array(name: &str, values: &[u8]) -> Result<[u8; NUM_STATES]> {
    if values.len() != NUM_STATES {
        return Err(CabacError::InvalidTables(format!(
            "{name} has {} entries, expected {NUM_STATES}",
            values.len()
        )));
    }
    if let Some(bad) = values.iter().find(|&&v| v > MAX_STATE) {
        return Err(CabacError::InvalidTables(format!(
            "{name} contains state {bad} > {MAX_STATE}"
        )));
    }
    let mut out = [0u8; NUM_STATES];
    out.copy_from_slice(values);
    Ok(out)
}

/// Serializable form of [`ProbabilityTables`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbabilityTablesConfig {
    /// Version tag identifying the table set.
    pub version: String,
    /// Transition on MPS, 64 entries.
    pub next_state_mps: Vec<u8>,
    /// Transition on LPS, 64 entries.
    pub next_state_lps: Vec<u8>,
    /// LPS range per state, 64 rows of 4.
    pub range_lps: Vec<[u8; 4]>,
}
