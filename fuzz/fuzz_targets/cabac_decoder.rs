#![no_main]

//! Fuzz target for decoding arbitrary bytes.
//!
//! Garbage input must surface as errors, never as panics or hangs.

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use transcode_cabac::{CabacConfig, CodingMode, ContextSite, SliceDecoder, SliceType, SyntaxElement};

#[derive(Arbitrary, Debug)]
struct DecoderInput {
    data: Vec<u8>,
    slice_type: u8,
    field_coded: bool,
    elements: Vec<(u8, Option<u8>, u8)>,
}

fuzz_target!(|input: DecoderInput| {
    // Limit input size
    if input.data.len() > 64 * 1024 || input.elements.len() > 4096 {
        return;
    }

    let config = CabacConfig::default();
    let slice_type = SliceType::ALL[input.slice_type as usize % SliceType::ALL.len()];
    let mode = CodingMode {
        slice_type,
        field_coded: input.field_coded,
    };

    let Ok(decoder) = SliceDecoder::new(&config, mode, &input.data) else {
        return;
    };
    let mut decoder = decoder.with_bin_limit(1 << 20);

    for &(element, category, increment) in &input.elements {
        let element = SyntaxElement::ALL[element as usize % SyntaxElement::ALL.len()];
        let site = ContextSite {
            category: category.map(|c| c as usize % 8),
            increment: increment as usize,
        };
        match decoder.decode(element, site) {
            Ok(_) => {}
            Err(e) if e.is_fatal() => break,
            Err(_) => {}
        }
    }
});
