//! Fuzz target: `FrameDecoder::push`
//!
//! Drives arbitrary byte sequences into the byte-stuffed frame decoder and
//! asserts that it never panics, never yields an over-long payload, and
//! that every message it accepts re-encodes to a frame it accepts again.
//!
//! cargo fuzz run fuzz_frame_decoder

#![no_main]

use doorctl::rpc::codec::{FrameDecoder, MAX_FRAME_SIZE, MAX_PAYLOAD, encode_frame};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let mut decoder = FrameDecoder::new();

    for &byte in data {
        let Some(Ok(msg)) = decoder.push(byte) else {
            continue;
        };
        assert!(msg.payload.len() <= MAX_PAYLOAD, "payload exceeds MAX_PAYLOAD");

        let mut frame = [0u8; MAX_FRAME_SIZE];
        let len = encode_frame(&msg, &mut frame).expect("any message fits MAX_FRAME_SIZE");
        let mut again = FrameDecoder::new();
        let decoded = frame[..len].iter().find_map(|&b| again.push(b));
        assert_eq!(decoded, Some(Ok(msg)));
    }

    // After a reset the decoder must accept bytes cleanly again.
    decoder.reset();
    assert!(decoder.is_idle());
});
