//! Slice-level coding sessions.
//!
//! A session codes `(syntax element, value, context site)` triples: the value
//! is binarized with the element's binding, and every bin is routed to the
//! regular, bypass or terminate path. Regular bins get their context from the
//! selector. [`SliceDecoder`] routes bins the same way, so the two sides only
//! need to agree on the configuration and the sequence of elements.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::binarization::{binarize, read_value};
use crate::config::{BinPath, CabacConfig, CodingSetup};
use crate::context::ContextTable;
use crate::decoder::CabacDecoder;
use crate::encoder::{BinCounts, CabacEncoder};
use crate::error::{CabacError, Result};
use crate::selector::{CodingMode, ContextSelector, SyntaxElement};

/// Where a value's contexts come from.
///
/// The context of bin `i` is slot bin index `increment + i` of the
/// category's slot; `increment` carries neighbour-dependent context choices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ContextSite {
    /// Context category, for elements with category offsets.
    #[serde(default)]
    pub category: Option<usize>,
    /// Added to each bin index before context selection.
    #[serde(default)]
    pub increment: usize,
}

impl ContextSite {
    /// Site in the given category.
    pub fn category(category: usize) -> Self {
        Self {
            category: Some(category),
            increment: 0,
        }
    }

    /// Set the context increment.
    pub fn with_increment(mut self, increment: usize) -> Self {
        self.increment = increment;
        self
    }
}

/// One value to code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyntaxValue {
    /// Syntax element.
    pub element: SyntaxElement,
    /// Value.
    pub value: i64,
    /// Context site.
    #[serde(default)]
    pub site: ContextSite,
}

impl SyntaxValue {
    /// Value at the default context site.
    pub fn new(element: SyntaxElement, value: i64) -> Self {
        Self {
            element,
            value,
            site: ContextSite::default(),
        }
    }

    /// Set the context site.
    pub fn at(mut self, site: ContextSite) -> Self {
        self.site = site;
        self
    }
}

/// Statistics of one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SessionStats {
    /// Context-coded bins.
    pub regular: u64,
    /// Bypass bins.
    pub bypass: u64,
    /// Terminate bins.
    pub terminate: u64,
    /// Syntax values coded.
    pub values: u64,
}

impl SessionStats {
    fn from_counts(counts: BinCounts, values: u64) -> Self {
        Self {
            regular: counts.regular,
            bypass: counts.bypass,
            terminate: counts.terminate,
            values,
        }
    }

    /// Bins over all paths.
    pub fn total_bins(&self) -> u64 {
        self.regular + self.bypass + self.terminate
    }
}

#[derive(Debug, Clone, Copy)]
enum CodedBin {
    Regular(bool, usize),
    Bypass(bool),
    Terminate(bool),
}

fn new_contexts(setup: &CodingSetup, mode: CodingMode) -> Result<ContextTable> {
    let seeds = setup
        .seeds
        .seeds_for_layout(mode.slice_type, setup.num_contexts())?;
    ContextTable::from_seeds(seeds, setup.tables.clone())
}

/// Encoding session for one slice.
#[derive(Debug)]
pub struct SliceEncoder {
    setup: CodingSetup,
    selector: ContextSelector,
    encoder: CabacEncoder,
    values: u64,
}

impl SliceEncoder {
    /// Validate `config` and start a session.
    pub fn new(config: &CabacConfig, mode: CodingMode) -> Result<Self> {
        Self::with_setup(&config.prepare()?, mode)
    }

    /// Start a session from a prepared configuration.
    pub fn with_setup(setup: &CodingSetup, mode: CodingMode) -> Result<Self> {
        let contexts = new_contexts(setup, mode)?;
        debug!(
            mode = %mode,
            contexts = contexts.len(),
            tables = setup.tables().version(),
            "Starting CABAC slice encoder"
        );
        Ok(Self {
            setup: setup.clone(),
            selector: ContextSelector::new(setup.selector.clone(), mode),
            encoder: CabacEncoder::with_contexts(contexts),
            values: 0,
        })
    }

    /// Coding mode of the session.
    pub fn mode(&self) -> CodingMode {
        self.selector.mode()
    }

    // Everything that can fail without touching the interval is resolved
    // here, so value and configuration errors leave the session usable.
    fn plan(&self, element: SyntaxElement, value: i64, site: ContextSite) -> Result<Vec<CodedBin>> {
        let binding = self.setup.binding(element)?;
        let bins = binarize(value, &binding.scheme)?;

        bins.into_iter()
            .enumerate()
            .map(|(i, bin)| -> Result<CodedBin> {
                Ok(match binding.routing.path(i) {
                    BinPath::Regular => CodedBin::Regular(
                        bin,
                        self.selector
                            .select_context(element, site.increment + i, site.category)?,
                    ),
                    BinPath::Bypass => CodedBin::Bypass(bin),
                    BinPath::Terminate => CodedBin::Terminate(bin),
                })
            })
            .collect()
    }

    fn code(&mut self, plan: Vec<CodedBin>) -> Result<()> {
        for bin in plan {
            match bin {
                CodedBin::Regular(bin, ctx) => self.encoder.encode_regular(bin, ctx)?,
                CodedBin::Bypass(bin) => self.encoder.encode_bypass(bin)?,
                CodedBin::Terminate(bin) => self.encoder.encode_terminate(bin)?,
            }
        }
        self.values += 1;
        Ok(())
    }

    /// Code one value.
    pub fn encode(&mut self, element: SyntaxElement, value: i64, site: ContextSite) -> Result<()> {
        let plan = self.plan(element, value, site)?;
        self.code(plan)
    }

    /// Code a [`SyntaxValue`].
    pub fn encode_value(&mut self, value: &SyntaxValue) -> Result<()> {
        self.encode(value.element, value.value, value.site)
    }

    /// Code a run of values differentially: the first value as is, then the
    /// difference to its predecessor.
    ///
    /// The whole block is checked before any bin is coded.
    pub fn encode_block(
        &mut self,
        element: SyntaxElement,
        values: &[i64],
        site: ContextSite,
    ) -> Result<()> {
        let mut plans = Vec::with_capacity(values.len());
        let mut prev = 0i64;
        for (i, &value) in values.iter().enumerate() {
            let delta = if i == 0 {
                value
            } else {
                value
                    .checked_sub(prev)
                    .ok_or_else(|| CabacError::ValueOutOfRange {
                        value,
                        scheme: "differential",
                        reason: format!("difference to {prev} overflows"),
                    })?
            };
            plans.push(self.plan(element, delta, site)?);
            prev = value;
        }
        plans.into_iter().try_for_each(|plan| self.code(plan))
    }

    /// Code the end-of-slice marker, ending the session.
    pub fn encode_end_of_slice(&mut self) -> Result<()> {
        self.encoder.encode_terminate(true)
    }

    /// Context table of the session.
    pub fn contexts(&self) -> &ContextTable {
        self.encoder.contexts()
    }

    /// Statistics so far.
    pub fn stats(&self) -> SessionStats {
        SessionStats::from_counts(self.encoder.bin_counts(), self.values)
    }

    /// Terminate the slice and return its bytes.
    #[tracing::instrument(level = "debug", skip(self), fields(mode = %self.mode()))]
    pub fn finish(mut self) -> Result<Vec<u8>> {
        let data = self.encoder.finalize()?;
        let stats = self.stats();
        debug!(
            bytes = data.len(),
            values = stats.values,
            regular = stats.regular,
            bypass = stats.bypass,
            terminate = stats.terminate,
            "Finished CABAC slice"
        );
        Ok(data)
    }
}

/// Decoding session for one slice.
#[derive(Debug)]
pub struct SliceDecoder<'a> {
    setup: CodingSetup,
    selector: ContextSelector,
    decoder: CabacDecoder<'a>,
    values: u64,
}

impl<'a> SliceDecoder<'a> {
    /// Validate `config` and start decoding `data`.
    pub fn new(config: &CabacConfig, mode: CodingMode, data: &'a [u8]) -> Result<Self> {
        Self::with_setup(&config.prepare()?, mode, data)
    }

    /// Start decoding `data` from a prepared configuration.
    pub fn with_setup(setup: &CodingSetup, mode: CodingMode, data: &'a [u8]) -> Result<Self> {
        let contexts = new_contexts(setup, mode)?;
        debug!(
            mode = %mode,
            contexts = contexts.len(),
            bytes = data.len(),
            "Starting CABAC slice decoder"
        );
        Ok(Self {
            setup: setup.clone(),
            selector: ContextSelector::new(setup.selector.clone(), mode),
            decoder: CabacDecoder::with_contexts(data, contexts)?,
            values: 0,
        })
    }

    /// End the session after `limit` bins.
    pub fn with_bin_limit(mut self, limit: u64) -> Self {
        self.decoder = self.decoder.with_bin_limit(limit);
        self
    }

    /// Coding mode of the session.
    pub fn mode(&self) -> CodingMode {
        self.selector.mode()
    }

    /// Decode one value.
    pub fn decode(&mut self, element: SyntaxElement, site: ContextSite) -> Result<i64> {
        let binding = self.setup.binding(element)?;
        let selector = &self.selector;
        let decoder = &mut self.decoder;

        let value = read_value(&binding.scheme, |i| match binding.routing.path(i) {
            BinPath::Regular => {
                let ctx = selector.select_context(element, site.increment + i, site.category)?;
                decoder.decode_regular(ctx)
            }
            BinPath::Bypass => decoder.decode_bypass(),
            BinPath::Terminate => decoder.decode_terminate(),
        })?;
        self.values += 1;
        Ok(value)
    }

    /// Decode a run of `len` values coded with
    /// [`SliceEncoder::encode_block`].
    pub fn decode_block(
        &mut self,
        element: SyntaxElement,
        len: usize,
        site: ContextSite,
    ) -> Result<Vec<i64>> {
        let mut values = Vec::with_capacity(len);
        let mut prev = 0i64;
        for i in 0..len {
            let delta = self.decode(element, site)?;
            let value = if i == 0 {
                delta
            } else {
                prev.checked_add(delta)
                    .ok_or_else(|| CabacError::MalformedBins {
                        scheme: "differential",
                        reason: format!("{prev} + {delta} overflows"),
                    })?
            };
            values.push(value);
            prev = value;
        }
        Ok(values)
    }

    /// Decode a terminate bin; `true` marks the end of the slice.
    pub fn decode_end_of_slice(&mut self) -> Result<bool> {
        self.decoder.decode_terminate()
    }

    /// Context table of the session.
    pub fn contexts(&self) -> &ContextTable {
        self.decoder.contexts()
    }

    /// Statistics so far.
    pub fn stats(&self) -> SessionStats {
        SessionStats::from_counts(self.decoder.bin_counts(), self.values)
    }

    /// Whether the end-of-slice marker has been decoded.
    pub fn is_finished(&self) -> bool {
        self.decoder.is_terminated()
    }
}
