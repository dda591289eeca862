#![no_main]

//! Fuzz target for CABAC encode/decode round trips.
//!
//! Encodes an arbitrary mix of regular, bypass and terminate bins and checks
//! that the decoder reproduces the bins and the context states.

use std::sync::Arc;

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use transcode_cabac::{CabacDecoder, CabacEncoder, ContextState, ProbabilityTables};

const NUM_CONTEXTS: usize = 8;

#[derive(Arbitrary, Debug, Clone, Copy)]
enum Bin {
    Regular { bin: bool, ctx: u8 },
    Bypass(bool),
    Terminate,
}

#[derive(Arbitrary, Debug)]
struct RoundtripInput {
    seeds: [(u8, bool); NUM_CONTEXTS],
    bins: Vec<Bin>,
}

fuzz_target!(|input: RoundtripInput| {
    // Limit input size
    if input.bins.len() > 64 * 1024 {
        return;
    }

    let seeds: Vec<ContextState> = input
        .seeds
        .iter()
        .map(|&(index, mps)| ContextState {
            probability_index: index % 63,
            most_probable_symbol: mps,
        })
        .collect();
    let tables = Arc::new(ProbabilityTables::standard());

    let mut enc = CabacEncoder::new(&seeds, tables.clone()).unwrap();
    for &bin in &input.bins {
        match bin {
            Bin::Regular { bin, ctx } => enc
                .encode_regular(bin, ctx as usize % NUM_CONTEXTS)
                .unwrap(),
            Bin::Bypass(bin) => enc.encode_bypass(bin).unwrap(),
            Bin::Terminate => enc.encode_terminate(false).unwrap(),
        }
    }
    let data = enc.finalize().unwrap();

    let mut dec = CabacDecoder::new(&data, &seeds, tables).unwrap();
    for &bin in &input.bins {
        match bin {
            Bin::Regular { bin, ctx } => {
                assert_eq!(dec.decode_regular(ctx as usize % NUM_CONTEXTS).unwrap(), bin)
            }
            Bin::Bypass(bin) => assert_eq!(dec.decode_bypass().unwrap(), bin),
            Bin::Terminate => assert!(!dec.decode_terminate().unwrap()),
        }
    }
    assert!(dec.decode_terminate().unwrap());
    assert_eq!(dec.contexts(), enc.contexts());
});
