//! Parallel coding of independent slices.
//!
//! Slices share nothing but the read-only [`CodingSetup`], so each one runs
//! as its own session on a rayon worker.

use rayon::prelude::*;
use rayon::ThreadPool;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{CabacConfig, CodingSetup};
use crate::error::Result;
use crate::selector::{CodingMode, SyntaxElement};
use crate::session::{ContextSite, SliceDecoder, SliceEncoder, SyntaxValue};

/// Thread pool configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParallelConfig {
    /// Number of worker threads (0 = one per available core).
    pub num_threads: usize,
}

impl ParallelConfig {
    /// Configuration with a fixed thread count.
    pub fn with_threads(num_threads: usize) -> Self {
        Self { num_threads }
    }

    /// Thread count that will actually be used.
    pub fn effective_threads(&self) -> usize {
        if self.num_threads == 0 {
            std::thread::available_parallelism()
                .map(|p| p.get())
                .unwrap_or(4)
        } else {
            self.num_threads
        }
    }

    fn build_pool(&self) -> Result<ThreadPool> {
        Ok(rayon::ThreadPoolBuilder::new()
            .num_threads(self.effective_threads())
            .thread_name(|idx| format!("cabac-slice-{}", idx))
            .build()?)
    }
}

/// One slice to encode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SliceJob {
    /// Coding mode of the slice.
    pub mode: CodingMode,
    /// Values in coding order.
    pub values: Vec<SyntaxValue>,
}

impl SliceJob {
    /// Create a job.
    pub fn new(mode: CodingMode, values: Vec<SyntaxValue>) -> Self {
        Self { mode, values }
    }

    /// Element and site of each value, as needed to decode the slice.
    pub fn layout(&self) -> Vec<(SyntaxElement, ContextSite)> {
        self.values.iter().map(|v| (v.element, v.site)).collect()
    }
}

/// Coded slice plus what the decoder needs to parse it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeJob<'a> {
    /// Coding mode of the slice.
    pub mode: CodingMode,
    /// Coded bytes.
    pub data: &'a [u8],
    /// Element and site of each value, in coding order.
    pub layout: Vec<(SyntaxElement, ContextSite)>,
}

fn encode_slice(setup: &CodingSetup, job: &SliceJob) -> Result<Vec<u8>> {
    let mut encoder = SliceEncoder::with_setup(setup, job.mode)?;
    for value in &job.values {
        encoder.encode_value(value)?;
    }
    encoder.finish()
}

fn decode_slice(setup: &CodingSetup, job: &DecodeJob<'_>) -> Result<Vec<i64>> {
    let mut decoder = SliceDecoder::with_setup(setup, job.mode, job.data)?;
    job.layout
        .iter()
        .map(|&(element, site)| decoder.decode(element, site))
        .collect()
}

/// Encode independent slices in parallel.
///
/// The outer error covers configuration and pool setup; each slice reports
/// its own result, in input order.
#[tracing::instrument(level = "debug", skip_all, fields(slices = jobs.len()))]
pub fn encode_slices(
    config: &CabacConfig,
    jobs: &[SliceJob],
    parallel: &ParallelConfig,
) -> Result<Vec<Result<Vec<u8>>>> {
    let setup = config.prepare()?;
    let pool = parallel.build_pool()?;
    debug!(threads = pool.current_num_threads(), "Encoding slices in parallel");

    Ok(pool.install(|| {
        jobs.par_iter()
            .map(|job| encode_slice(&setup, job))
            .collect()
    }))
}

/// Decode independent slices in parallel.
#[tracing::instrument(level = "debug", skip_all, fields(slices = jobs.len()))]
pub fn decode_slices(
    config: &CabacConfig,
    jobs: &[DecodeJob<'_>],
    parallel: &ParallelConfig,
) -> Result<Vec<Result<Vec<i64>>>> {
    let setup = config.prepare()?;
    let pool = parallel.build_pool()?;
    debug!(threads = pool.current_num_threads(), "Decoding slices in parallel");

    Ok(pool.install(|| {
        jobs.par_iter()
            .map(|job| decode_slice(&setup, job))
            .collect()
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CabacError;
    use crate::selector::SliceType;

    fn jobs() -> Vec<SliceJob> {
        (0..6)
            .map(|i| {
                let slice_type = SliceType::ALL[i % 3];
                let values = (0..20)
                    .flat_map(|k| {
                        [
                            SyntaxValue::new(SyntaxElement::MbType, (k + i as i64) % 4),
                            SyntaxValue::new(SyntaxElement::MbQpDelta, k - 10),
                            SyntaxValue::new(SyntaxElement::CodedBlockFlag, k % 2)
                                .at(ContextSite::category(1)),
                        ]
                    })
                    .collect();
                SliceJob::new(CodingMode::frame(slice_type), values)
            })
            .collect()
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let config = CabacConfig::default();
        let jobs = jobs();
        let parallel = encode_slices(&config, &jobs, &ParallelConfig::with_threads(3)).unwrap();

        let setup = config.prepare().unwrap();
        for (job, coded) in jobs.iter().zip(&parallel) {
            let sequential = encode_slice(&setup, job).unwrap();
            assert_eq!(coded.as_ref().unwrap(), &sequential);
        }
    }

    #[test]
    fn test_parallel_roundtrip() {
        let config = CabacConfig::default();
        let jobs = jobs();
        let coded: Vec<Vec<u8>> = encode_slices(&config, &jobs, &ParallelConfig::default())
            .unwrap()
            .into_iter()
            .collect::<Result<_>>()
            .unwrap();

        let decode_jobs: Vec<DecodeJob<'_>> = jobs
            .iter()
            .zip(&coded)
            .map(|(job, data)| DecodeJob {
                mode: job.mode,
                data,
                layout: job.layout(),
            })
            .collect();
        let decoded = decode_slices(&config, &decode_jobs, &ParallelConfig::with_threads(2)).unwrap();

        for (job, values) in jobs.iter().zip(decoded) {
            let expected: Vec<i64> = job.values.iter().map(|v| v.value).collect();
            assert_eq!(values.unwrap(), expected);
        }
    }

    #[test]
    fn test_failures_are_per_slice() {
        let config = CabacConfig::default();
        let mut jobs = jobs();
        // mb_skip_flag has no context range in I slices.
        jobs[0]
            .values
            .push(SyntaxValue::new(SyntaxElement::MbSkipFlag, 1));
        let results = encode_slices(&config, &jobs, &ParallelConfig::with_threads(2)).unwrap();
        assert!(matches!(
            results[0],
            Err(CabacError::MissingContextRange { .. })
        ));
        assert!(results[1..].iter().all(|r| r.is_ok()));
    }
}
