// SPDX-License-Identifier: MIT OR Apache-2.0
//! Length-prefixed framing.
//!
//! ```text
//! i32 totalLength   bytes after this field (tag + payload)
//! i32 messageType   catalogue tag
//! ...               plan-encoded payload
//! ```

use bridge_buffer::{BufferError, ByteBuffer};
use bridge_wire::{Decoder, WireError};
use tracing::trace;

use crate::{Envelope, Message, MessageType, ProtocolError, lookup};

/// Bytes taken by the length prefix.
pub const LENGTH_PREFIX: usize = 4;

/// Bytes taken by the type tag.
pub const TAG_LEN: usize = 4;

/// Largest `totalLength` accepted unless configured otherwise.
pub const DEFAULT_MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;

/// Outcome of [`decode_frame`].
#[derive(Debug, Clone, PartialEq)]
pub enum FrameDecode {
    /// Not enough bytes buffered yet; nothing was consumed.
    Incomplete,
    /// One complete frame, consumed from the buffer.
    Frame(Envelope),
}

fn write_frame(
    buf: &mut ByteBuffer,
    message_type: MessageType,
    max_frame_bytes: usize,
    payload: impl FnOnce(&mut ByteBuffer) -> Result<(), WireError>,
) -> Result<usize, ProtocolError> {
    let start = buf.len();
    buf.append_i32(0);
    buf.append_i32(message_type.tag());
    if let Err(source) = payload(buf) {
        buf.truncate(start);
        return Err(ProtocolError::Encode {
            message_type,
            source,
        });
    }
    let total = buf.len() - start - LENGTH_PREFIX;
    let length = match i32::try_from(total) {
        Ok(length) if total <= max_frame_bytes => length,
        _ => {
            buf.truncate(start);
            return Err(ProtocolError::InvalidLength {
                length: total as i64,
                max: max_frame_bytes,
            });
        }
    };
    buf.set_i32_at(start, length);
    Ok(total + LENGTH_PREFIX)
}

/// Append one framed message to `buf`. Returns the frame size in bytes.
///
/// The length prefix is back-patched after the payload is written. On error
/// nothing is left behind in `buf`.
pub fn encode_message<M: Message>(message: &M, buf: &mut ByteBuffer) -> Result<usize, ProtocolError> {
    write_frame(buf, M::MESSAGE_TYPE, DEFAULT_MAX_FRAME_BYTES, |buf| {
        message.encode_fields(buf)
    })
}

/// Append one framed [`Envelope`] to `buf`. Returns the frame size in bytes.
pub fn encode_frame(envelope: &Envelope, buf: &mut ByteBuffer) -> Result<usize, ProtocolError> {
    encode_frame_limited(envelope, buf, DEFAULT_MAX_FRAME_BYTES)
}

/// [`encode_frame`] with an explicit frame size limit.
pub fn encode_frame_limited(
    envelope: &Envelope,
    buf: &mut ByteBuffer,
    max_frame_bytes: usize,
) -> Result<usize, ProtocolError> {
    write_frame(buf, envelope.message_type(), max_frame_bytes, |buf| {
        envelope.encode_payload(buf)
    })
}

/// Peek at the buffered length prefix and, if a whole frame is present,
/// consume and decode it.
///
/// Bytes the payload decoder leaves unread are skipped. Reading past the
/// frame end is [`ProtocolError::Overrun`].
pub fn decode_frame(
    buf: &mut ByteBuffer,
    max_frame_bytes: usize,
) -> Result<FrameDecode, ProtocolError> {
    let Some(total) = buf.peek_i32() else {
        return Ok(FrameDecode::Incomplete);
    };
    let total_len = usize::try_from(total).ok().filter(|&n| n >= TAG_LEN && n <= max_frame_bytes);
    let Some(total_len) = total_len else {
        return Err(ProtocolError::InvalidLength {
            length: i64::from(total),
            max: max_frame_bytes,
        });
    };
    if buf.len() < LENGTH_PREFIX + total_len {
        return Ok(FrameDecode::Incomplete);
    }

    buf.consume(LENGTH_PREFIX);
    let mut frame = buf.take(total_len)?;
    let registration = lookup(frame.read_i32()?)?;
    let payload = frame.len();

    let mut dec = Decoder::new(&mut frame);
    let envelope = registration.decode(&mut dec).map_err(|source| match source {
        WireError::Buffer(BufferError::Underflow { .. }) => ProtocolError::Overrun {
            message_type: registration.message_type,
            payload,
        },
        source => ProtocolError::Decode {
            message_type: registration.message_type,
            source,
        },
    })?;

    if !frame.is_empty() {
        trace!(
            target: "bridge.wire",
            message_type = registration.name,
            skipped = frame.len(),
            "skipping trailing frame bytes"
        );
    }
    Ok(FrameDecode::Frame(envelope))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CheckPath, GetStatistics, Ping};

    #[test]
    fn length_is_back_patched() {
        let mut buf = ByteBuffer::new();
        let size = encode_message(&GetStatistics {}, &mut buf).unwrap();
        assert_eq!(size, 8);
        assert_eq!(buf.as_slice(), &[4, 0, 0, 0, 9, 0, 0, 0]);
    }

    #[test]
    fn appends_after_existing_bytes() {
        let mut buf = ByteBuffer::new();
        buf.append(&[0xEE]);
        encode_message(&GetStatistics {}, &mut buf).unwrap();
        buf.consume(1);
        assert_eq!(buf.peek_i32(), Some(4));
    }

    #[test]
    fn short_length_prefix_is_rejected() {
        let mut buf = ByteBuffer::new();
        buf.append_i32(3);
        buf.append(&[0, 0, 0]);
        assert!(matches!(
            decode_frame(&mut buf, DEFAULT_MAX_FRAME_BYTES),
            Err(ProtocolError::InvalidLength { length: 3, .. })
        ));
    }

    #[test]
    fn oversized_length_is_rejected_before_buffering() {
        let mut buf = ByteBuffer::new();
        buf.append_i32(1 << 20);
        assert!(matches!(
            decode_frame(&mut buf, 1024),
            Err(ProtocolError::InvalidLength { .. })
        ));
        let mut buf = ByteBuffer::new();
        buf.append_i32(-8);
        assert!(decode_frame(&mut buf, 1024).is_err());
    }

    #[test]
    fn encode_respects_limit() {
        let mut buf = ByteBuffer::new();
        let env: Envelope = Ping {
            payload: Some("x".repeat(100)),
        }
        .into();
        assert!(encode_frame_limited(&env, &mut buf, 32).is_err());
        assert!(buf.is_empty());
    }

    #[test]
    fn frame_round_trip() {
        let mut buf = ByteBuffer::new();
        let env: Envelope = CheckPath {
            path: Some("/srv".into()),
        }
        .into();
        encode_frame(&env, &mut buf).unwrap();
        match decode_frame(&mut buf, DEFAULT_MAX_FRAME_BYTES).unwrap() {
            FrameDecode::Frame(got) => assert_eq!(got, env),
            FrameDecode::Incomplete => panic!("expected frame"),
        }
        assert!(buf.is_empty());
    }
}
