//! Coding configuration.
//!
//! A [`CabacConfig`] bundles everything a session needs besides its coding
//! mode: the context layout, how each syntax element is binarized and routed
//! onto the three coding paths, where context seeds come from and which
//! probability tables to use. It round-trips through JSON.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::binarization::Scheme;
use crate::context::ContextSeeds;
use crate::error::{CabacError, Result};
use crate::selector::{SelectorConfig, SliceType, SyntaxElement};
use crate::tables::{ProbabilityTables, ProbabilityTablesConfig};

/// Coding path of a single bin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinPath {
    /// Context-coded.
    Regular,
    /// Equiprobable, no context.
    Bypass,
    /// Terminate path.
    Terminate,
}

/// How the bins of an element's bin string are assigned to coding paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinRouting {
    /// Every bin is context-coded.
    #[default]
    Regular,
    /// Every bin is bypass-coded.
    Bypass,
    /// The first `n` bins are context-coded, the rest bypass-coded.
    RegularPrefix(usize),
    /// The single bin is coded on the terminate path.
    Terminate,
}

impl BinRouting {
    /// Path of the bin at `bin_index`.
    pub fn path(&self, bin_index: usize) -> BinPath {
        match *self {
            Self::Regular => BinPath::Regular,
            Self::Bypass => BinPath::Bypass,
            Self::RegularPrefix(n) if bin_index < n => BinPath::Regular,
            Self::RegularPrefix(_) => BinPath::Bypass,
            Self::Terminate => BinPath::Terminate,
        }
    }
}

/// Binarization and routing of one syntax element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementBinding {
    /// Binarization scheme.
    pub scheme: Scheme,
    /// Bin routing.
    #[serde(default)]
    pub routing: BinRouting,
}

impl ElementBinding {
    /// Create a binding.
    pub fn new(scheme: Scheme, routing: BinRouting) -> Self {
        Self { scheme, routing }
    }

    /// Binding with every bin context-coded.
    pub fn regular(scheme: Scheme) -> Self {
        Self::new(scheme, BinRouting::Regular)
    }

    /// Binding with every bin bypass-coded.
    pub fn bypass(scheme: Scheme) -> Self {
        Self::new(scheme, BinRouting::Bypass)
    }

    /// Check the binding of `element`.
    pub fn validate(&self, element: SyntaxElement) -> Result<()> {
        self.scheme.validate()?;
        if self.routing == BinRouting::Terminate
            && self.scheme != (Scheme::FixedLength { length: 1 })
        {
            return Err(CabacError::InvalidBinding {
                element,
                reason: format!(
                    "terminate routing needs a single fixed-length bin, got {}",
                    self.scheme.name()
                ),
            });
        }
        Ok(())
    }
}

/// Where context seeds come from.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SeedSource {
    /// Every context starts at probability index 0 with MPS 0.
    #[default]
    Equiprobable,
    /// Explicit states per slice type.
    Explicit {
        /// Seed tables.
        seeds: ContextSeeds,
    },
    /// 8-bit init values per slice type, combined with the slice QP.
    InitValues {
        /// Slice quantization parameter.
        slice_qp: i32,
        /// Init values per slice type.
        values: BTreeMap<SliceType, Vec<u8>>,
    },
}

impl SeedSource {
    /// Build the seed tables for a layout of `num_contexts` contexts.
    pub fn resolve(&self, num_contexts: usize) -> Result<ContextSeeds> {
        match self {
            Self::Equiprobable => Ok(ContextSeeds::equiprobable(num_contexts)),
            Self::Explicit { seeds } => {
                seeds.validate()?;
                Ok(seeds.clone())
            }
            Self::InitValues { slice_qp, values } => Ok(values
                .iter()
                .fold(ContextSeeds::new(), |seeds, (&slice_type, init)| {
                    seeds.with_init_values(slice_type, init, *slice_qp)
                })),
        }
    }
}

/// Complete coding configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CabacConfig {
    /// Context layout.
    #[serde(default)]
    pub selector: SelectorConfig,
    /// Binarization and routing per syntax element.
    #[serde(default = "default_bindings")]
    pub bindings: BTreeMap<SyntaxElement, ElementBinding>,
    /// Context seed source.
    #[serde(default)]
    pub seeds: SeedSource,
    /// Probability tables; the built-in tables when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tables: Option<ProbabilityTablesConfig>,
}

impl Default for CabacConfig {
    fn default() -> Self {
        Self {
            selector: SelectorConfig::default(),
            bindings: default_bindings(),
            seeds: SeedSource::default(),
            tables: None,
        }
    }
}

impl CabacConfig {
    /// Parse a configuration from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serialize the configuration to pretty-printed JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Load and validate a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)?;
        let config = Self::from_json(&json)?;
        config.validate()?;
        debug!(
            path = %path.display(),
            bindings = config.bindings.len(),
            contexts = config.selector.num_contexts(),
            "Loaded CABAC configuration"
        );
        Ok(config)
    }

    /// Replace the context layout.
    pub fn with_selector(mut self, selector: SelectorConfig) -> Self {
        self.selector = selector;
        self
    }

    /// Set the binding of one element.
    pub fn with_binding(mut self, element: SyntaxElement, binding: ElementBinding) -> Self {
        self.bindings.insert(element, binding);
        self
    }

    /// Replace the seed source.
    pub fn with_seeds(mut self, seeds: SeedSource) -> Self {
        self.seeds = seeds;
        self
    }

    /// Use external probability tables.
    pub fn with_tables(mut self, tables: ProbabilityTablesConfig) -> Self {
        self.tables = Some(tables);
        self
    }

    /// Binding of an element.
    pub fn binding(&self, element: SyntaxElement) -> Result<&ElementBinding> {
        self.bindings
            .get(&element)
            .ok_or_else(|| CabacError::InvalidBinding {
                element,
                reason: "no binding configured".into(),
            })
    }

    /// Check the whole configuration.
    pub fn validate(&self) -> Result<()> {
        self.prepare().map(|_| ())
    }

    /// Validate the configuration and build the shared, read-only state
    /// sessions are created from.
    pub fn prepare(&self) -> Result<CodingSetup> {
        self.selector.validate()?;
        for (&element, binding) in &self.bindings {
            binding.validate(element)?;
        }

        let tables = match &self.tables {
            Some(config) => ProbabilityTables::from_config(config)?,
            None => ProbabilityTables::standard(),
        };

        let num_contexts = self.selector.num_contexts();
        let seeds = self.seeds.resolve(num_contexts)?;
        for slice_type in SliceType::ALL {
            if let Ok(states) = seeds.seeds_for(slice_type) {
                if states.len() < num_contexts {
                    return Err(CabacError::SeedTableTooSmall {
                        got: states.len(),
                        needed: num_contexts,
                    });
                }
            }
        }

        Ok(CodingSetup {
            selector: Arc::new(self.selector.clone()),
            bindings: Arc::new(self.bindings.clone()),
            seeds: Arc::new(seeds),
            tables: Arc::new(tables),
        })
    }
}

/// Validated configuration, cheap to clone and share across threads.
#[derive(Debug, Clone)]
pub struct CodingSetup {
    pub(crate) selector: Arc<SelectorConfig>,
    pub(crate) bindings: Arc<BTreeMap<SyntaxElement, ElementBinding>>,
    pub(crate) seeds: Arc<ContextSeeds>,
    pub(crate) tables: Arc<ProbabilityTables>,
}

impl CodingSetup {
    /// Number of contexts every session allocates.
    pub fn num_contexts(&self) -> usize {
        self.selector.num_contexts()
    }

    /// Probability tables.
    pub fn tables(&self) -> &ProbabilityTables {
        &self.tables
    }

    /// Context seeds.
    pub fn seeds(&self) -> &ContextSeeds {
        &self.seeds
    }

    pub(crate) fn binding(&self, element: SyntaxElement) -> Result<ElementBinding> {
        self.bindings
            .get(&element)
            .copied()
            .ok_or_else(|| CabacError::InvalidBinding {
                element,
                reason: "no binding configured".into(),
            })
    }
}

/// Bindings of the default layout.
pub fn default_bindings() -> BTreeMap<SyntaxElement, ElementBinding> {
    use SyntaxElement::*;

    let flag = ElementBinding::regular(Scheme::FixedLength { length: 1 });
    let signed_eg = |order, prefix| {
        ElementBinding::new(
            Scheme::ExpGolomb {
                order,
                signed: true,
            },
            BinRouting::RegularPrefix(prefix),
        )
    };

    BTreeMap::from([
        (MbType, ElementBinding::regular(Scheme::Unary)),
        (MbSkipFlag, flag),
        (SubMbType, ElementBinding::regular(Scheme::TruncatedUnary { cutoff: 3 })),
        (MvdX, signed_eg(3, 7)),
        (MvdY, signed_eg(3, 7)),
        (RefIdx, ElementBinding::regular(Scheme::Unary)),
        (MbQpDelta, signed_eg(0, 4)),
        (
            IntraChromaPredMode,
            ElementBinding::regular(Scheme::TruncatedUnary { cutoff: 3 }),
        ),
        (PrevIntra4x4PredModeFlag, flag),
        (
            RemIntra4x4PredMode,
            ElementBinding::regular(Scheme::FixedLength { length: 3 }),
        ),
        (MbFieldDecodingFlag, flag),
        (
            CodedBlockPattern,
            ElementBinding::regular(Scheme::FixedLength { length: 6 }),
        ),
        (CodedBlockFlag, flag),
        (SignificantCoeffFlag, flag),
        (LastSignificantCoeffFlag, flag),
        (
            CoeffAbsLevelMinus1,
            ElementBinding::new(
                Scheme::ExpGolomb {
                    order: 0,
                    signed: false,
                },
                BinRouting::RegularPrefix(14),
            ),
        ),
        (
            EndOfSliceFlag,
            ElementBinding::new(Scheme::FixedLength { length: 1 }, BinRouting::Terminate),
        ),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ContextState;

    #[test]
    fn test_default_config_is_valid() {
        let config = CabacConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.bindings.len(), SyntaxElement::ALL.len());
        let setup = config.prepare().unwrap();
        assert_eq!(setup.num_contexts(), 399);
        assert_eq!(setup.seeds().seeds_for(SliceType::B).unwrap().len(), 399);
    }

    #[test]
    fn test_routing_paths() {
        let routing = BinRouting::RegularPrefix(2);
        assert_eq!(routing.path(0), BinPath::Regular);
        assert_eq!(routing.path(1), BinPath::Regular);
        assert_eq!(routing.path(2), BinPath::Bypass);
        assert_eq!(BinRouting::Bypass.path(0), BinPath::Bypass);
        assert_eq!(BinRouting::Terminate.path(0), BinPath::Terminate);
    }

    #[test]
    fn test_terminate_binding_needs_single_bin() {
        let binding = ElementBinding::new(Scheme::Unary, BinRouting::Terminate);
        let err = binding.validate(SyntaxElement::EndOfSliceFlag).unwrap_err();
        assert!(matches!(err, CabacError::InvalidBinding { .. }));

        let config = CabacConfig::default().with_binding(SyntaxElement::EndOfSliceFlag, binding);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_json_roundtrip() {
        let config = CabacConfig::default().with_seeds(SeedSource::InitValues {
            slice_qp: 26,
            values: BTreeMap::from([(SliceType::I, vec![154; 399])]),
        });
        let json = config.to_json().unwrap();
        assert!(json.contains("\"regular_prefix\""));
        let parsed = CabacConfig::from_json(&json).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = CabacConfig::from_json(
            r#"{
                "bindings": {
                    "mb_type": { "scheme": { "kind": "truncated_unary", "cutoff": 5 } }
                },
                "seeds": { "kind": "equiprobable" }
            }"#,
        )
        .unwrap();
        assert_eq!(config.bindings.len(), 1);
        assert_eq!(config.bindings[&SyntaxElement::MbType].routing, BinRouting::Regular);
        assert_eq!(config.selector, SelectorConfig::default());
        assert!(config.binding(SyntaxElement::MvdX).is_err());
    }

    #[test]
    fn test_invalid_json() {
        let err = CabacConfig::from_json("{ not json").unwrap_err();
        assert!(matches!(err, CabacError::Json(_)));
        assert_eq!(err.kind(), crate::error::ErrorKind::Configuration);
    }

    #[test]
    fn test_oversized_layout_rejected() {
        let json = r#"{"selector":{"ranges":{"mb_type":{"I":{"frame":{"start":0,"end":18446744073709551615}}}}}}"#;
        let err = CabacConfig::from_json(json)
            .and_then(|c| c.validate())
            .unwrap_err();
        assert!(matches!(
            err,
            CabacError::InvalidLayout {
                element: SyntaxElement::MbType,
                ..
            }
        ));
        assert_eq!(err.kind(), crate::error::ErrorKind::Configuration);

        let json = r#"{"selector":{"ranges":{"mb_type":{"I":{"frame":{"start":0,"end":1000000000000}}}}}}"#;
        assert!(matches!(
            CabacConfig::from_json(json).and_then(|c| c.prepare()),
            Err(CabacError::InvalidLayout { .. })
        ));
    }

    #[test]
    fn test_seed_table_too_small() {
        let config = CabacConfig::default().with_seeds(SeedSource::Explicit {
            seeds: ContextSeeds::new()
                .with_states(SliceType::I, vec![ContextState::equiprobable(); 10])
                .unwrap(),
        });
        assert!(matches!(
            config.validate(),
            Err(CabacError::SeedTableTooSmall {
                got: 10,
                needed: 399
            })
        ));
    }

    #[test]
    fn test_invalid_tables_rejected() {
        let mut tables = ProbabilityTables::standard().to_config();
        tables.range_lps[5] = [0, 0, 0, 0];
        let config = CabacConfig::default().with_tables(tables);
        assert!(matches!(config.validate(), Err(CabacError::InvalidTables(_))));
    }

    #[test]
    fn test_load_missing_file() {
        let err = CabacConfig::load("/nonexistent/cabac.json").unwrap_err();
        assert!(matches!(err, CabacError::Io(_)));
    }
}
