//! CABAC engine benchmarks.
//!
//! Covers raw bin throughput on each coding path and slice-level sessions,
//! sequential and parallel.

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use transcode_cabac::{
    encode_slices, CabacConfig, CabacDecoder, CabacEncoder, CodingMode, ContextSite, ContextState,
    ParallelConfig, ProbabilityTables, SliceEncoder, SliceJob, SliceType, SyntaxElement,
    SyntaxValue,
};

const NUM_BINS: usize = 100_000;

/// Skewed pseudo-random bins, roughly 1 in 8 set.
fn test_bins(count: usize) -> Vec<bool> {
    let mut state: u32 = 0x1234_5678;
    (0..count)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            state & 7 == 0
        })
        .collect()
}

fn macroblocks(count: i64) -> Vec<SyntaxValue> {
    use SyntaxElement::*;
    (0..count)
        .flat_map(|mb| {
            [
                SyntaxValue::new(MbSkipFlag, (mb % 3 == 0) as i64),
                SyntaxValue::new(MbType, mb % 6),
                SyntaxValue::new(RefIdx, mb % 2),
                SyntaxValue::new(MvdX, (mb * 13) % 64 - 32),
                SyntaxValue::new(MvdY, (mb * 7) % 32 - 16),
                SyntaxValue::new(CodedBlockPattern, mb % 48),
                SyntaxValue::new(CoeffAbsLevelMinus1, mb % 20).at(ContextSite::category(2)),
                SyntaxValue::new(EndOfSliceFlag, 0),
            ]
        })
        .collect()
}

// ============================================================================
// Engine Benchmarks
// ============================================================================

fn bench_engine(c: &mut Criterion) {
    let mut group = c.benchmark_group("cabac_engine");
    group.throughput(Throughput::Elements(NUM_BINS as u64));

    let bins = test_bins(NUM_BINS);
    let seeds = vec![ContextState::equiprobable(); 16];
    let tables = Arc::new(ProbabilityTables::standard());

    group.bench_function("encode_regular", |b| {
        b.iter(|| {
            let mut enc = CabacEncoder::new(&seeds, tables.clone()).unwrap();
            for (i, &bin) in bins.iter().enumerate() {
                enc.encode_regular(bin, i & 15).unwrap();
            }
            black_box(enc.finalize().unwrap())
        })
    });

    group.bench_function("encode_bypass", |b| {
        b.iter(|| {
            let mut enc = CabacEncoder::new(&seeds, tables.clone()).unwrap();
            for &bin in &bins {
                enc.encode_bypass(bin).unwrap();
            }
            black_box(enc.finalize().unwrap())
        })
    });

    let mut enc = CabacEncoder::new(&seeds, tables.clone()).unwrap();
    for (i, &bin) in bins.iter().enumerate() {
        enc.encode_regular(bin, i & 15).unwrap();
    }
    let data = enc.finalize().unwrap();

    group.bench_function("decode_regular", |b| {
        b.iter(|| {
            let mut dec = CabacDecoder::new(&data, &seeds, tables.clone()).unwrap();
            for i in 0..NUM_BINS {
                black_box(dec.decode_regular(i & 15).unwrap());
            }
        })
    });

    group.finish();
}

// ============================================================================
// Session Benchmarks
// ============================================================================

fn bench_sessions(c: &mut Criterion) {
    let mut group = c.benchmark_group("cabac_session");
    let config = CabacConfig::default();
    let values = macroblocks(1000);

    group.throughput(Throughput::Elements(values.len() as u64));
    group.bench_function("slice_encode", |b| {
        b.iter(|| {
            let mut enc = SliceEncoder::new(&config, CodingMode::frame(SliceType::P)).unwrap();
            for value in &values {
                enc.encode_value(value).unwrap();
            }
            black_box(enc.finish().unwrap())
        })
    });

    for threads in [1, 2, 4] {
        let jobs: Vec<SliceJob> = (0..8)
            .map(|_| SliceJob::new(CodingMode::frame(SliceType::P), values.clone()))
            .collect();
        group.throughput(Throughput::Elements((values.len() * jobs.len()) as u64));
        group.bench_with_input(
            BenchmarkId::new("parallel_slices", threads),
            &jobs,
            |b, jobs| {
                let parallel = ParallelConfig::with_threads(threads);
                b.iter(|| black_box(encode_slices(&config, jobs, &parallel).unwrap()))
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_engine, bench_sessions);
criterion_main!(benches);
