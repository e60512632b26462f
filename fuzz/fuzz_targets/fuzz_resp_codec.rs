//! Fuzz target for the RESP reply codec.
//!
//! Feeds arbitrary bytes through the codec, whole and split, to find
//! panics and state leaks between parse attempts.

#![no_main]

use filum::{Codec, RespCodec};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let mut codec = RespCodec::new();

    // Whole input: must never panic.
    let _ = codec.parse(data);

    // Split input: a failed partial parse must not poison the next call.
    let mid = data.len() / 2;
    let _ = codec.parse(&data[..mid]);
    let _ = codec.parse(&data[mid..]);
});
