// SPDX-License-Identifier: MIT OR Apache-2.0
//! Fuzz the frame decoder with arbitrary bytes.
//!
//! Every input must either decode, report `Incomplete`, or fail with a
//! `ProtocolError`. Anything that decodes must re-encode to a frame that
//! decodes to the same envelope.
#![no_main]
use bridge_protocol::{ByteBuffer, FrameDecode, decode_frame, encode_frame};
use libfuzzer_sys::fuzz_target;

const MAX: usize = 64 * 1024;

fuzz_target!(|data: &[u8]| {
    let mut buf = ByteBuffer::new();
    buf.append(data);
    let before = buf.len();

    match decode_frame(&mut buf, MAX) {
        Ok(FrameDecode::Incomplete) => assert_eq!(buf.len(), before),
        Ok(FrameDecode::Frame(envelope)) => {
            assert!(buf.len() < before);
            let mut out = ByteBuffer::new();
            if encode_frame(&envelope, &mut out).is_ok() {
                match decode_frame(&mut out, usize::MAX >> 1) {
                    Ok(FrameDecode::Frame(again)) => assert_eq!(again, envelope),
                    other => panic!("re-encoded frame did not decode: {other:?}"),
                }
            }
        }
        Err(_) => {}
    }
});
