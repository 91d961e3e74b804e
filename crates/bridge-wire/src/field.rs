// SPDX-License-Identifier: MIT OR Apache-2.0
//! Per-value encodings.
//!
//! Fixed-width kinds (`bool`, `i32`, `i64`, timestamps, durations, schema
//! enums) are written bare. Reference kinds (`String`, `Vec<T>`, `Box<T>`,
//! nested messages) always carry a presence byte: the plain Rust type writes
//! `0x01` and decodes `0x00` as its default value, while `Option<T>` maps
//! `None` to `0x00`.

use bridge_buffer::ByteBuffer;
use chrono::{DateTime, TimeDelta, Utc};

use crate::WireError;

/// Deepest nesting a [`Decoder`] accepts unless told otherwise.
pub const DEFAULT_MAX_DEPTH: usize = 64;

/// Number of 100 ns ticks per second.
pub const TICKS_PER_SECOND: i64 = 10_000_000;

/// Ticks between 0001-01-01T00:00:00Z and the Unix epoch.
pub const UNIX_EPOCH_TICKS: i64 = 621_355_968_000_000_000;

const ABSENT: u8 = 0;
const PRESENT: u8 = 1;

// ---------------------------------------------------------------------------
// Decoder
// ---------------------------------------------------------------------------

/// Read cursor over a payload plus the current nesting depth.
#[derive(Debug)]
pub struct Decoder<'a> {
    buf: &'a mut ByteBuffer,
    depth: usize,
    max_depth: usize,
}

impl<'a> Decoder<'a> {
    /// Decode from `buf` with [`DEFAULT_MAX_DEPTH`].
    pub fn new(buf: &'a mut ByteBuffer) -> Self {
        Self::with_max_depth(buf, DEFAULT_MAX_DEPTH)
    }

    /// Decode from `buf`, rejecting values nested deeper than `max_depth`.
    pub fn with_max_depth(buf: &'a mut ByteBuffer, max_depth: usize) -> Self {
        Self {
            buf,
            depth: 0,
            max_depth,
        }
    }

    /// Current nesting depth (0 at the top-level message).
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.buf.len()
    }

    /// Run `f` one nesting level deeper.
    pub fn nested<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, WireError>,
    ) -> Result<T, WireError> {
        if self.depth >= self.max_depth {
            return Err(WireError::TooDeep {
                limit: self.max_depth,
            });
        }
        self.depth += 1;
        let out = f(self);
        self.depth -= 1;
        out
    }

    /// Read a presence byte.
    pub fn presence(&mut self) -> Result<bool, WireError> {
        match self.buf.read_u8()? {
            ABSENT => Ok(false),
            PRESENT => Ok(true),
            other => Err(WireError::InvalidPresence(other)),
        }
    }

    /// Read one raw byte.
    pub fn read_u8(&mut self) -> Result<u8, WireError> {
        Ok(self.buf.read_u8()?)
    }

    /// Read a little-endian `i32`.
    pub fn read_i32(&mut self) -> Result<i32, WireError> {
        Ok(self.buf.read_i32()?)
    }

    /// Read a little-endian `i64`.
    pub fn read_i64(&mut self) -> Result<i64, WireError> {
        Ok(self.buf.read_i64()?)
    }

    /// Read an `i32`-prefixed UTF-8 string.
    pub fn read_string(&mut self) -> Result<String, WireError> {
        Ok(self.buf.read_string()?)
    }
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// A value that can appear as a message field.
///
/// Only types implementing this trait can be listed in a schema, so an
/// unsupported field type is a compile error rather than a runtime one.
pub trait WireField: Sized {
    /// Append the field's wire form.
    fn encode(&self, buf: &mut ByteBuffer) -> Result<(), WireError>;

    /// Consume the field's wire form.
    fn decode(dec: &mut Decoder<'_>) -> Result<Self, WireError>;
}

/// A reference kind: its wire form is preceded by a presence byte.
///
/// `encode_value`/`decode_value` handle only the bytes after the presence
/// byte; [`encode_present`] and [`decode_present`] add it.
pub trait Nullable: Sized + Default {
    /// Append the value without its presence byte.
    fn encode_value(&self, buf: &mut ByteBuffer) -> Result<(), WireError>;

    /// Consume the value, the presence byte having been read already.
    fn decode_value(dec: &mut Decoder<'_>) -> Result<Self, WireError>;
}

/// Write `0x01` followed by `value`.
pub fn encode_present<T: Nullable>(value: &T, buf: &mut ByteBuffer) -> Result<(), WireError> {
    buf.append_u8(PRESENT);
    value.encode_value(buf)
}

/// Read a presence byte and the value behind it; absent yields `T::default()`.
pub fn decode_present<T: Nullable>(dec: &mut Decoder<'_>) -> Result<T, WireError> {
    if dec.presence()? {
        T::decode_value(dec)
    } else {
        Ok(T::default())
    }
}

// ---------------------------------------------------------------------------
// Fixed-width kinds
// ---------------------------------------------------------------------------

impl WireField for bool {
    fn encode(&self, buf: &mut ByteBuffer) -> Result<(), WireError> {
        buf.append_bool(*self);
        Ok(())
    }

    fn decode(dec: &mut Decoder<'_>) -> Result<Self, WireError> {
        match dec.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(WireError::InvalidBool(other)),
        }
    }
}

impl WireField for i32 {
    fn encode(&self, buf: &mut ByteBuffer) -> Result<(), WireError> {
        buf.append_i32(*self);
        Ok(())
    }

    fn decode(dec: &mut Decoder<'_>) -> Result<Self, WireError> {
        dec.read_i32()
    }
}

impl WireField for i64 {
    fn encode(&self, buf: &mut ByteBuffer) -> Result<(), WireError> {
        buf.append_i64(*self);
        Ok(())
    }

    fn decode(dec: &mut Decoder<'_>) -> Result<Self, WireError> {
        dec.read_i64()
    }
}

/// Convert a UTC timestamp to 100 ns ticks since 0001-01-01T00:00:00Z.
///
/// Sub-tick precision is truncated.
pub fn datetime_to_ticks(value: &DateTime<Utc>) -> Result<i64, WireError> {
    let range = || WireError::OutOfRange { what: "timestamp" };
    value
        .timestamp()
        .checked_mul(TICKS_PER_SECOND)
        .and_then(|t| t.checked_add(i64::from(value.timestamp_subsec_nanos() / 100)))
        .and_then(|t| t.checked_add(UNIX_EPOCH_TICKS))
        .ok_or_else(range)
}

/// Inverse of [`datetime_to_ticks`].
pub fn ticks_to_datetime(ticks: i64) -> Result<DateTime<Utc>, WireError> {
    let since_epoch = ticks
        .checked_sub(UNIX_EPOCH_TICKS)
        .ok_or(WireError::OutOfRange { what: "timestamp" })?;
    let secs = since_epoch.div_euclid(TICKS_PER_SECOND);
    let nanos = (since_epoch.rem_euclid(TICKS_PER_SECOND) * 100) as u32;
    DateTime::from_timestamp(secs, nanos).ok_or(WireError::OutOfRange { what: "timestamp" })
}

/// Convert a duration to 100 ns ticks, truncating toward zero.
pub fn duration_to_ticks(value: &TimeDelta) -> Result<i64, WireError> {
    value
        .num_seconds()
        .checked_mul(TICKS_PER_SECOND)
        .and_then(|t| t.checked_add(i64::from(value.subsec_nanos() / 100)))
        .ok_or(WireError::OutOfRange { what: "duration" })
}

/// Inverse of [`duration_to_ticks`].
pub fn ticks_to_duration(ticks: i64) -> Result<TimeDelta, WireError> {
    let secs = ticks.div_euclid(TICKS_PER_SECOND);
    let nanos = (ticks.rem_euclid(TICKS_PER_SECOND) * 100) as u32;
    TimeDelta::new(secs, nanos).ok_or(WireError::OutOfRange { what: "duration" })
}

impl WireField for DateTime<Utc> {
    fn encode(&self, buf: &mut ByteBuffer) -> Result<(), WireError> {
        buf.append_i64(datetime_to_ticks(self)?);
        Ok(())
    }

    fn decode(dec: &mut Decoder<'_>) -> Result<Self, WireError> {
        ticks_to_datetime(dec.read_i64()?)
    }
}

impl WireField for TimeDelta {
    fn encode(&self, buf: &mut ByteBuffer) -> Result<(), WireError> {
        buf.append_i64(duration_to_ticks(self)?);
        Ok(())
    }

    fn decode(dec: &mut Decoder<'_>) -> Result<Self, WireError> {
        ticks_to_duration(dec.read_i64()?)
    }
}

// ---------------------------------------------------------------------------
// Reference kinds
// ---------------------------------------------------------------------------

impl Nullable for String {
    fn encode_value(&self, buf: &mut ByteBuffer) -> Result<(), WireError> {
        Ok(buf.append_string(self)?)
    }

    fn decode_value(dec: &mut Decoder<'_>) -> Result<Self, WireError> {
        dec.read_string()
    }
}

impl WireField for String {
    fn encode(&self, buf: &mut ByteBuffer) -> Result<(), WireError> {
        encode_present(self, buf)
    }

    fn decode(dec: &mut Decoder<'_>) -> Result<Self, WireError> {
        decode_present(dec)
    }
}

impl<T: WireField> Nullable for Vec<T> {
    fn encode_value(&self, buf: &mut ByteBuffer) -> Result<(), WireError> {
        let count = i32::try_from(self.len()).map_err(|_| WireError::CountOverflow(self.len()))?;
        buf.append_i32(count);
        for item in self {
            item.encode(buf)?;
        }
        Ok(())
    }

    fn decode_value(dec: &mut Decoder<'_>) -> Result<Self, WireError> {
        let count = dec.read_i32()?;
        let count = usize::try_from(count).map_err(|_| WireError::NegativeCount(count))?;
        // Every element takes at least one byte, so the payload bounds the allocation.
        let mut items = Vec::with_capacity(count.min(dec.remaining()));
        dec.nested(|dec| {
            for _ in 0..count {
                items.push(T::decode(dec)?);
            }
            Ok(())
        })?;
        Ok(items)
    }
}

impl<T: WireField> WireField for Vec<T> {
    fn encode(&self, buf: &mut ByteBuffer) -> Result<(), WireError> {
        encode_present(self, buf)
    }

    fn decode(dec: &mut Decoder<'_>) -> Result<Self, WireError> {
        decode_present(dec)
    }
}

impl<T: Nullable> Nullable for Box<T> {
    fn encode_value(&self, buf: &mut ByteBuffer) -> Result<(), WireError> {
        (**self).encode_value(buf)
    }

    fn decode_value(dec: &mut Decoder<'_>) -> Result<Self, WireError> {
        T::decode_value(dec).map(Box::new)
    }
}

impl<T: Nullable> WireField for Box<T> {
    fn encode(&self, buf: &mut ByteBuffer) -> Result<(), WireError> {
        encode_present(self, buf)
    }

    fn decode(dec: &mut Decoder<'_>) -> Result<Self, WireError> {
        decode_present(dec)
    }
}

impl<T: Nullable> WireField for Option<T> {
    fn encode(&self, buf: &mut ByteBuffer) -> Result<(), WireError> {
        match self {
            Some(value) => encode_present(value, buf),
            None => {
                buf.append_u8(ABSENT);
                Ok(())
            }
        }
    }

    fn decode(dec: &mut Decoder<'_>) -> Result<Self, WireError> {
        if dec.presence()? {
            T::decode_value(dec).map(Some)
        } else {
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn encode<T: WireField>(value: &T) -> Vec<u8> {
        let mut buf = ByteBuffer::new();
        value.encode(&mut buf).unwrap();
        buf.to_vec()
    }

    fn decode<T: WireField>(bytes: &[u8]) -> Result<T, WireError> {
        let mut buf = ByteBuffer::from(bytes);
        T::decode(&mut Decoder::new(&mut buf))
    }

    #[test]
    fn primitives_have_no_presence_byte() {
        assert_eq!(encode(&true), vec![1]);
        assert_eq!(encode(&5i32), vec![5, 0, 0, 0]);
        assert_eq!(encode(&-1i64), vec![0xff; 8]);
    }

    #[test]
    fn bool_rejects_other_bytes() {
        assert_eq!(decode::<bool>(&[2]), Err(WireError::InvalidBool(2)));
    }

    #[test]
    fn string_is_presence_length_bytes() {
        assert_eq!(encode(&"hi".to_string()), vec![1, 2, 0, 0, 0, b'h', b'i']);
        assert_eq!(encode(&None::<String>), vec![0]);
        assert_eq!(encode(&Some(String::new())), vec![1, 0, 0, 0, 0]);
    }

    #[test]
    fn absent_plain_string_decodes_to_default() {
        assert_eq!(decode::<String>(&[0]).unwrap(), "");
        assert_eq!(decode::<Option<String>>(&[0]).unwrap(), None);
    }

    #[test]
    fn bad_presence_byte_is_rejected() {
        assert_eq!(
            decode::<Option<String>>(&[7]),
            Err(WireError::InvalidPresence(7))
        );
    }

    #[test]
    fn sequence_elements_carry_their_own_presence() {
        let value = Some(vec!["a".to_string()]);
        assert_eq!(encode(&value), vec![1, 1, 0, 0, 0, 1, 1, 0, 0, 0, b'a']);
        let ints = vec![3i32, 4];
        assert_eq!(encode(&ints), vec![1, 2, 0, 0, 0, 3, 0, 0, 0, 4, 0, 0, 0]);
    }

    #[test]
    fn negative_count_is_rejected() {
        let mut bytes = vec![1];
        bytes.extend((-1i32).to_le_bytes());
        assert_eq!(decode::<Vec<i32>>(&bytes), Err(WireError::NegativeCount(-1)));
    }

    #[test]
    fn huge_count_with_short_payload_underflows() {
        let mut bytes = vec![1];
        bytes.extend(i32::MAX.to_le_bytes());
        assert!(matches!(
            decode::<Vec<i64>>(&bytes),
            Err(WireError::Buffer(_))
        ));
    }

    #[test]
    fn unix_epoch_tick_constant() {
        let epoch = Utc.timestamp_opt(0, 0).unwrap();
        assert_eq!(datetime_to_ticks(&epoch).unwrap(), UNIX_EPOCH_TICKS);
        let year_one = Utc.with_ymd_and_hms(1, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(datetime_to_ticks(&year_one).unwrap(), 0);
    }

    #[test]
    fn timestamps_round_trip_at_tick_precision() {
        let t = Utc.timestamp_opt(1_700_000_000, 123_456_700).unwrap();
        assert_eq!(decode::<DateTime<Utc>>(&encode(&t)).unwrap(), t);
    }

    #[test]
    fn negative_durations_round_trip() {
        let d = TimeDelta::milliseconds(-1500);
        assert_eq!(duration_to_ticks(&d).unwrap(), -15_000_000);
        assert_eq!(decode::<TimeDelta>(&encode(&d)).unwrap(), d);
    }

    #[test]
    fn depth_limit_is_enforced() {
        let mut buf = ByteBuffer::new();
        let mut dec = Decoder::with_max_depth(&mut buf, 2);
        let err = dec
            .nested(|d| d.nested(|d| d.nested(|_| Ok(()))))
            .unwrap_err();
        assert_eq!(err, WireError::TooDeep { limit: 2 });
        assert_eq!(dec.depth(), 0);
    }
}
