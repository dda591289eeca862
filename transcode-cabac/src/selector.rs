//! Context selection.
//!
//! Maps `(syntax element, bin index, category)` to a context index using
//! static range and offset tables. The tables are configuration data
//! ([`SelectorConfig`]) and can be versioned independently of the engine; the
//! default layout follows the residual/macroblock context allocation of the
//! reference design.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{CabacError, Result};

/// Syntax elements with a context allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyntaxElement {
    MbType,
    MbSkipFlag,
    SubMbType,
    /// Horizontal motion vector difference.
    MvdX,
    /// Vertical motion vector difference.
    MvdY,
    RefIdx,
    MbQpDelta,
    IntraChromaPredMode,
    PrevIntra4x4PredModeFlag,
    RemIntra4x4PredMode,
    MbFieldDecodingFlag,
    CodedBlockPattern,
    CodedBlockFlag,
    SignificantCoeffFlag,
    LastSignificantCoeffFlag,
    CoeffAbsLevelMinus1,
    EndOfSliceFlag,
}

impl SyntaxElement {
    /// Every syntax element.
    pub const ALL: [SyntaxElement; 17] = [
        Self::MbType,
        Self::MbSkipFlag,
        Self::SubMbType,
        Self::MvdX,
        Self::MvdY,
        Self::RefIdx,
        Self::MbQpDelta,
        Self::IntraChromaPredMode,
        Self::PrevIntra4x4PredModeFlag,
        Self::RemIntra4x4PredMode,
        Self::MbFieldDecodingFlag,
        Self::CodedBlockPattern,
        Self::CodedBlockFlag,
        Self::SignificantCoeffFlag,
        Self::LastSignificantCoeffFlag,
        Self::CoeffAbsLevelMinus1,
        Self::EndOfSliceFlag,
    ];

    /// Syntax element name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MbType => "mb_type",
            Self::MbSkipFlag => "mb_skip_flag",
            Self::SubMbType => "sub_mb_type",
            Self::MvdX => "mvd_x",
            Self::MvdY => "mvd_y",
            Self::RefIdx => "ref_idx",
            Self::MbQpDelta => "mb_qp_delta",
            Self::IntraChromaPredMode => "intra_chroma_pred_mode",
            Self::PrevIntra4x4PredModeFlag => "prev_intra4x4_pred_mode_flag",
            Self::RemIntra4x4PredMode => "rem_intra4x4_pred_mode",
            Self::MbFieldDecodingFlag => "mb_field_decoding_flag",
            Self::CodedBlockPattern => "coded_block_pattern",
            Self::CodedBlockFlag => "coded_block_flag",
            Self::SignificantCoeffFlag => "significant_coeff_flag",
            Self::LastSignificantCoeffFlag => "last_significant_coeff_flag",
            Self::CoeffAbsLevelMinus1 => "coeff_abs_level_minus1",
            Self::EndOfSliceFlag => "end_of_slice_flag",
        }
    }
}

impl fmt::Display for SyntaxElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Slice type; selects both the context ranges and the seed table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub enum SliceType {
    /// Intra-only.
    #[default]
    I,
    /// Predicted.
    P,
    /// Bi-predicted.
    B,
}

impl SliceType {
    /// All slice types.
    pub const ALL: [SliceType; 3] = [Self::I, Self::P, Self::B];
}

impl fmt::Display for SliceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::I => write!(f, "I"),
            Self::P => write!(f, "P"),
            Self::B => write!(f, "B"),
        }
    }
}

/// Coding mode of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct CodingMode {
    /// Slice type.
    pub slice_type: SliceType,
    /// Field (interlaced) coding.
    #[serde(default)]
    pub field_coded: bool,
}

impl CodingMode {
    /// Frame-coded mode.
    pub fn frame(slice_type: SliceType) -> Self {
        Self {
            slice_type,
            field_coded: false,
        }
    }

    /// Field-coded mode.
    pub fn field(slice_type: SliceType) -> Self {
        Self {
            slice_type,
            field_coded: true,
        }
    }
}

impl fmt::Display for CodingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let structure = if self.field_coded { "field" } else { "frame" };
        write!(f, "{} slice ({})", self.slice_type, structure)
    }
}

/// Largest number of contexts a layout may address.
pub const MAX_CONTEXTS: usize = 1 << 12;

/// Inclusive range of context indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContextRange {
    /// First context index.
    pub start: usize,
    /// Last context index (inclusive).
    pub end: usize,
}

impl ContextRange {
    /// Create a range.
    pub const fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Number of contexts in the range.
    pub fn len(&self) -> usize {
        self.end.saturating_add(1).saturating_sub(self.start)
    }

    /// Whether the range holds no contexts (`end < start`).
    pub fn is_empty(&self) -> bool {
        self.end < self.start
    }
}

/// Context ranges of one element under one slice type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModeRange {
    /// Range used by frame-coded sessions.
    pub frame: ContextRange,
    /// Range used by field-coded sessions; falls back to `frame`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<ContextRange>,
}

impl ModeRange {
    fn for_mode(&self, mode: CodingMode) -> ContextRange {
        match (mode.field_coded, self.field) {
            (true, Some(field)) => field,
            _ => self.frame,
        }
    }
}

/// Static context layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectorConfig {
    /// Context ranges per element and slice type. A missing slice type
    /// means the element is not allowed in that slice type.
    pub ranges: BTreeMap<SyntaxElement, BTreeMap<SliceType, ModeRange>>,
    /// Category offsets, relative to the start of the element's range.
    #[serde(default)]
    pub category_offsets: BTreeMap<SyntaxElement, Vec<usize>>,
}

impl SelectorConfig {
    /// Empty layout.
    pub fn empty() -> Self {
        Self {
            ranges: BTreeMap::new(),
            category_offsets: BTreeMap::new(),
        }
    }

    /// Set the ranges of an element for the given slice types.
    pub fn with_range(
        mut self,
        element: SyntaxElement,
        slice_types: &[SliceType],
        frame: ContextRange,
        field: Option<ContextRange>,
    ) -> Self {
        let entry = self.ranges.entry(element).or_default();
        for &slice_type in slice_types {
            entry.insert(slice_type, ModeRange { frame, field });
        }
        self
    }

    /// Set the category offsets of an element.
    pub fn with_category_offsets(mut self, element: SyntaxElement, offsets: Vec<usize>) -> Self {
        self.category_offsets.insert(element, offsets);
        self
    }

    /// Number of contexts the layout addresses.
    pub fn num_contexts(&self) -> usize {
        self.ranges
            .values()
            .flat_map(|by_slice| by_slice.values())
            .flat_map(|r| std::iter::once(r.frame).chain(r.field))
            .map(|r| r.end.saturating_add(1))
            .max()
            .unwrap_or(0)
    }

    /// Check ranges and offsets for consistency.
    pub fn validate(&self) -> Result<()> {
        for (&element, by_slice) in &self.ranges {
            let offsets = self.category_offsets.get(&element);
            for range in by_slice
                .values()
                .flat_map(|r| std::iter::once(r.frame).chain(r.field))
            {
                if range.is_empty() {
                    return Err(CabacError::InvalidLayout {
                        element,
                        reason: format!("range {}..={} is empty", range.start, range.end),
                    });
                }
                if range.end >= MAX_CONTEXTS {
                    return Err(CabacError::InvalidLayout {
                        element,
                        reason: format!(
                            "range end {} exceeds the {MAX_CONTEXTS} context limit",
                            range.end
                        ),
                    });
                }
                if let Some(last) = offsets.and_then(|o| o.last()) {
                    if *last >= range.len() {
                        return Err(CabacError::InvalidLayout {
                            element,
                            reason: format!(
                                "category offset {last} outside range of {} contexts",
                                range.len()
                            ),
                        });
                    }
                }
            }
        }

        for (&element, offsets) in &self.category_offsets {
            if !self.ranges.contains_key(&element) {
                return Err(CabacError::InvalidLayout {
                    element,
                    reason: "category offsets without a context range".into(),
                });
            }
            if offsets.is_empty() || offsets.windows(2).any(|w| w[0] >= w[1]) {
                return Err(CabacError::InvalidLayout {
                    element,
                    reason: "category offsets must be non-empty and strictly increasing".into(),
                });
            }
        }
        Ok(())
    }
}

impl Default for SelectorConfig {
    fn default() -> Self {
        use SliceType::{B, I, P};
        use SyntaxElement::*;

        let all = [I, P, B];
        let inter = [P, B];
        let r = ContextRange::new;

        Self::empty()
            .with_range(MbType, &[I], r(0, 10), None)
            .with_range(MbType, &[P], r(14, 20), None)
            .with_range(MbType, &[B], r(27, 35), None)
            .with_range(MbSkipFlag, &[P], r(11, 13), None)
            .with_range(MbSkipFlag, &[B], r(24, 26), None)
            .with_range(SubMbType, &[P], r(21, 23), None)
            .with_range(SubMbType, &[B], r(36, 39), None)
            .with_range(MvdX, &inter, r(40, 46), None)
            .with_range(MvdY, &inter, r(47, 53), None)
            .with_range(RefIdx, &inter, r(54, 59), None)
            .with_range(MbQpDelta, &all, r(60, 63), None)
            .with_range(IntraChromaPredMode, &all, r(64, 67), None)
            .with_range(PrevIntra4x4PredModeFlag, &all, r(68, 68), None)
            .with_range(RemIntra4x4PredMode, &all, r(69, 69), None)
            .with_range(MbFieldDecodingFlag, &all, r(70, 72), None)
            .with_range(CodedBlockPattern, &all, r(73, 84), None)
            .with_range(CodedBlockFlag, &all, r(85, 104), None)
            .with_range(SignificantCoeffFlag, &all, r(105, 165), Some(r(277, 337)))
            .with_range(LastSignificantCoeffFlag, &all, r(166, 226), Some(r(338, 398)))
            .with_range(CoeffAbsLevelMinus1, &all, r(227, 275), None)
            .with_range(EndOfSliceFlag, &all, r(276, 276), None)
            .with_category_offsets(CodedBlockFlag, vec![0, 4, 8, 12, 16])
            .with_category_offsets(SignificantCoeffFlag, vec![0, 15, 29, 44, 47])
            .with_category_offsets(LastSignificantCoeffFlag, vec![0, 15, 29, 44, 47])
            .with_category_offsets(CoeffAbsLevelMinus1, vec![0, 10, 20, 30, 39])
    }
}

/// Context selector bound to one session's coding mode.
#[derive(Debug, Clone)]
pub struct ContextSelector {
    config: Arc<SelectorConfig>,
    mode: CodingMode,
}

impl ContextSelector {
    /// Create a selector for a coding mode.
    pub fn new(config: Arc<SelectorConfig>, mode: CodingMode) -> Self {
        Self { config, mode }
    }

    /// Coding mode of the selector.
    pub fn mode(&self) -> CodingMode {
        self.mode
    }

    /// Context range of an element under the selector's coding mode.
    pub fn range(&self, element: SyntaxElement) -> Result<ContextRange> {
        self.config
            .ranges
            .get(&element)
            .and_then(|by_slice| by_slice.get(&self.mode.slice_type))
            .map(|r| r.for_mode(self.mode))
            .ok_or(CabacError::MissingContextRange {
                element,
                mode: self.mode,
            })
    }

    /// Context index for a bin.
    ///
    /// A category selects a slot inside the element's range; without one the
    /// first slot (or the whole range for elements without categories) is
    /// used. Bin indices past the end of the slot share its last context.
    pub fn select_context(
        &self,
        element: SyntaxElement,
        bin_index: usize,
        category: Option<usize>,
    ) -> Result<usize> {
        let range = self.range(element)?;
        let offsets = self.config.category_offsets.get(&element);

        let (offset, slot_end) = match (category, offsets) {
            (None, None) => (0, range.len()),
            (Some(_), None) => return Err(CabacError::NoCategoryOffsets(element)),
            (category, Some(offsets)) => {
                let category = category.unwrap_or(0);
                let offset = *offsets.get(category).ok_or(CabacError::UnknownCategory {
                    element,
                    category,
                    available: offsets.len(),
                })?;
                let slot_end = offsets.get(category + 1).copied().unwrap_or(range.len());
                (offset, slot_end)
            }
        };

        let slot_len = slot_end.saturating_sub(offset).max(1);
        Ok(range.start + offset + bin_index.min(slot_len - 1))
    }
}

/// Residual block kinds and their context categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockType {
    LumaDcIntra16x16,
    LumaAcIntra16x16,
    LumaIntra4x4,
    LumaInter,
    CbDcIntra,
    CrDcIntra,
    CbDcInter,
    CrDcInter,
    CbAcIntra,
    CrAcIntra,
    CbAcInter,
    CrAcInter,
}

impl BlockType {
    /// Maximum number of coefficients in the block.
    pub fn max_num_coeff(self) -> usize {
        match self {
            Self::LumaDcIntra16x16 | Self::LumaIntra4x4 | Self::LumaInter => 16,
            Self::LumaAcIntra16x16
            | Self::CbAcIntra
            | Self::CrAcIntra
            | Self::CbAcInter
            | Self::CrAcInter => 15,
            Self::CbDcIntra | Self::CrDcIntra | Self::CbDcInter | Self::CrDcInter => 4,
        }
    }

    /// Context category (ctx_cat) of the block.
    pub fn category(self) -> usize {
        match self {
            Self::LumaDcIntra16x16 => 0,
            Self::LumaAcIntra16x16 => 1,
            Self::LumaIntra4x4 | Self::LumaInter => 2,
            Self::CbDcIntra | Self::CrDcIntra | Self::CbDcInter | Self::CrDcInter => 3,
            Self::CbAcIntra | Self::CrAcIntra | Self::CbAcInter | Self::CrAcInter => 4,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn selector(mode: CodingMode) -> ContextSelector {
        ContextSelector::new(Arc::new(SelectorConfig::default()), mode)
    }

    #[test]
    fn test_default_layout_is_valid() {
        let config = SelectorConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.num_contexts(), 399);
    }

    #[test]
    fn test_select_mb_type_per_slice() {
        let i = selector(CodingMode::frame(SliceType::I));
        let p = selector(CodingMode::frame(SliceType::P));
        assert_eq!(i.select_context(SyntaxElement::MbType, 0, None).unwrap(), 0);
        assert_eq!(i.select_context(SyntaxElement::MbType, 3, None).unwrap(), 3);
        assert_eq!(p.select_context(SyntaxElement::MbType, 0, None).unwrap(), 14);
    }

    #[test]
    fn test_bin_index_clamps_to_slot() {
        let sel = selector(CodingMode::frame(SliceType::I));
        // mb_type I range is 0..=10.
        assert_eq!(sel.select_context(SyntaxElement::MbType, 50, None).unwrap(), 10);
        // Category 1 of coeff_abs_level_minus1 covers offsets 10..20.
        assert_eq!(
            sel.select_context(SyntaxElement::CoeffAbsLevelMinus1, 25, Some(1))
                .unwrap(),
            227 + 19
        );
        // The last category runs to the end of the range.
        assert_eq!(
            sel.select_context(SyntaxElement::CoeffAbsLevelMinus1, 100, Some(4))
                .unwrap(),
            275
        );
    }

    #[test]
    fn test_category_offsets() {
        let sel = selector(CodingMode::frame(SliceType::P));
        assert_eq!(
            sel.select_context(SyntaxElement::CodedBlockFlag, 1, Some(3))
                .unwrap(),
            85 + 12 + 1
        );
        assert_eq!(
            sel.select_context(SyntaxElement::SignificantCoeffFlag, 0, Some(2))
                .unwrap(),
            105 + 29
        );
    }

    #[test]
    fn test_field_ranges() {
        let sel = selector(CodingMode::field(SliceType::I));
        assert_eq!(
            sel.select_context(SyntaxElement::SignificantCoeffFlag, 0, Some(0))
                .unwrap(),
            277
        );
        // No field range: frame range is used.
        assert_eq!(
            sel.select_context(SyntaxElement::CodedBlockFlag, 0, Some(0))
                .unwrap(),
            85
        );
    }

    #[test]
    fn test_inter_element_in_intra_slice() {
        let sel = selector(CodingMode::frame(SliceType::I));
        let err = sel
            .select_context(SyntaxElement::MbSkipFlag, 0, None)
            .unwrap_err();
        assert!(matches!(
            err,
            CabacError::MissingContextRange {
                element: SyntaxElement::MbSkipFlag,
                ..
            }
        ));
        assert_eq!(err.kind(), crate::error::ErrorKind::Configuration);
    }

    #[test]
    fn test_category_errors() {
        let sel = selector(CodingMode::frame(SliceType::I));
        assert!(matches!(
            sel.select_context(SyntaxElement::MbType, 0, Some(1)),
            Err(CabacError::NoCategoryOffsets(SyntaxElement::MbType))
        ));
        assert!(matches!(
            sel.select_context(SyntaxElement::CodedBlockFlag, 0, Some(5)),
            Err(CabacError::UnknownCategory { category: 5, .. })
        ));
    }

    #[test]
    fn test_validate_rejects_bad_offsets() {
        let config = SelectorConfig::default()
            .with_category_offsets(SyntaxElement::CodedBlockFlag, vec![0, 8, 4]);
        assert!(config.validate().is_err());

        let config = SelectorConfig::default()
            .with_category_offsets(SyntaxElement::MbQpDelta, vec![0, 9]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_oversized_ranges() {
        let r = ContextRange::new;
        let config = SelectorConfig::empty().with_range(
            SyntaxElement::MbType,
            &[SliceType::I],
            r(0, usize::MAX),
            None,
        );
        assert_eq!(config.num_contexts(), usize::MAX);
        assert!(matches!(
            config.validate(),
            Err(CabacError::InvalidLayout {
                element: SyntaxElement::MbType,
                ..
            })
        ));

        let config = SelectorConfig::empty().with_range(
            SyntaxElement::MbType,
            &[SliceType::I],
            r(0, 10),
            Some(r(MAX_CONTEXTS, MAX_CONTEXTS + 4)),
        );
        assert!(config.validate().is_err());

        let config = SelectorConfig::empty().with_range(
            SyntaxElement::MbType,
            &[SliceType::I],
            r(0, MAX_CONTEXTS - 1),
            None,
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_selector_config_json() {
        let config = SelectorConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"mb_skip_flag\""));
        let parsed: SelectorConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_block_types() {
        assert_eq!(BlockType::LumaDcIntra16x16.max_num_coeff(), 16);
        assert_eq!(BlockType::LumaAcIntra16x16.category(), 1);
        assert_eq!(BlockType::CrDcInter.max_num_coeff(), 4);
        assert_eq!(BlockType::CbAcIntra.category(), 4);
    }
}
