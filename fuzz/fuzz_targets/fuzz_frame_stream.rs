// SPDX-License-Identifier: MIT OR Apache-2.0
//! Feed arbitrary bytes to the decoder in arbitrary chunks, the way a socket
//! delivers them, and check the decoder never loops or panics.
#![no_main]
use arbitrary::Arbitrary;
use bridge_protocol::{ByteBuffer, FrameDecode, decode_frame};
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
struct Input {
    chunks: Vec<Vec<u8>>,
}

fuzz_target!(|input: Input| {
    let mut buf = ByteBuffer::new();
    'outer: for chunk in input.chunks.iter().take(64) {
        buf.append(chunk);
        loop {
            let before = buf.len();
            match decode_frame(&mut buf, 1 << 20) {
                Ok(FrameDecode::Frame(_)) => assert!(buf.len() < before),
                Ok(FrameDecode::Incomplete) => break,
                // The server drops the connection here.
                Err(_) => break 'outer,
            }
        }
    }
});
