// SPDX-License-Identifier: MIT OR Apache-2.0
//! [`ByteBuffer`]: append at the tail, consume at the head.
//!
//! The buffer owns one backing array and tracks the live window with an
//! `offset` (head of valid data) and a `length` (count of valid bytes).
//! Consuming only moves the head, so a parse cursor costs nothing; appending
//! writes into trailing free space, compacting or reallocating when needed.

use std::fmt;
use std::io;
use std::ops::{Index, IndexMut};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::stream::BridgeStream;

/// Initial backing capacity for [`ByteBuffer::new`].
pub const DEFAULT_CAPACITY: usize = 256;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors raised when reading untrusted bytes out of a [`ByteBuffer`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BufferError {
    /// A read asked for more bytes than are buffered.
    #[error("buffer underflow: needed {needed} bytes, {available} available")]
    Underflow {
        /// Bytes the read required.
        needed: usize,
        /// Bytes actually buffered.
        available: usize,
    },

    /// A length prefix was negative.
    #[error("negative length prefix {0}")]
    NegativeLength(i32),

    /// A string payload was not valid UTF-8.
    #[error("string payload is not valid UTF-8")]
    InvalidUtf8,

    /// A length does not fit the 32-bit wire prefix.
    #[error("length {0} does not fit an int32 prefix")]
    LengthOverflow(usize),
}

// ---------------------------------------------------------------------------
// ByteBuffer
// ---------------------------------------------------------------------------

/// Growable byte sequence used both as a parse cursor and an I/O accumulator.
///
/// Invariant: `offset + length <= capacity`. Indexing (`buf[i]`) is relative
/// to the head of the live window.
#[derive(Clone, Default)]
pub struct ByteBuffer {
    data: Vec<u8>,
    offset: usize,
    length: usize,
}

impl ByteBuffer {
    /// Create an empty buffer with [`DEFAULT_CAPACITY`] bytes of backing storage.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create an empty buffer with `capacity` bytes of backing storage.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: vec![0; capacity],
            offset: 0,
            length: 0,
        }
    }

    /// Number of buffered (unconsumed) bytes.
    pub fn len(&self) -> usize {
        self.length
    }

    /// `true` when no bytes are buffered.
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Size of the backing array.
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// The live window as a slice.
    pub fn as_slice(&self) -> &[u8] {
        &self.data[self.offset..self.offset + self.length]
    }

    /// Copy the live window into a fresh `Vec`.
    pub fn to_vec(&self) -> Vec<u8> {
        self.as_slice().to_vec()
    }

    /// Drop every buffered byte, keeping the backing storage.
    pub fn clear(&mut self) {
        self.offset = 0;
        self.length = 0;
    }

    /// Shorten the live window to its first `len` bytes. No-op if already
    /// shorter. Used to roll back a partially written frame.
    pub fn truncate(&mut self, len: usize) {
        if len < self.length {
            self.length = len;
        }
        if self.length == 0 {
            self.offset = 0;
        }
    }

    fn free_tail(&self) -> usize {
        self.data.len() - self.offset - self.length
    }

    /// Make sure at least `additional` bytes can be appended without another
    /// reallocation.
    ///
    /// Compacts in place when shifting the live bytes to offset 0 frees
    /// enough room; otherwise reallocates with `max(additional, capacity / 2)`
    /// bytes of headroom so steady append/consume cycles amortise.
    pub fn reserve(&mut self, additional: usize) {
        if self.free_tail() >= additional {
            return;
        }
        let capacity = self.data.len();
        if capacity - self.length >= additional {
            self.data
                .copy_within(self.offset..self.offset + self.length, 0);
            self.offset = 0;
            return;
        }
        let headroom = additional.max(capacity / 2);
        let mut grown = vec![0; self.length + headroom];
        grown[..self.length].copy_from_slice(self.as_slice());
        self.data = grown;
        self.offset = 0;
    }

    fn tail_start(&self) -> usize {
        self.offset + self.length
    }

    // -- Appending ----------------------------------------------------------

    /// Append raw bytes at the tail.
    pub fn append(&mut self, bytes: &[u8]) {
        self.reserve(bytes.len());
        let start = self.tail_start();
        self.data[start..start + bytes.len()].copy_from_slice(bytes);
        self.length += bytes.len();
    }

    /// Append a single byte.
    pub fn append_u8(&mut self, value: u8) {
        self.append(&[value]);
    }

    /// Append a boolean as a single `0`/`1` byte.
    pub fn append_bool(&mut self, value: bool) {
        self.append_u8(u8::from(value));
    }

    /// Append a little-endian `i32`.
    pub fn append_i32(&mut self, value: i32) {
        self.append(&value.to_le_bytes());
    }

    /// Append a little-endian `i64`.
    pub fn append_i64(&mut self, value: i64) {
        self.append(&value.to_le_bytes());
    }

    /// Append a UTF-8 string behind an `i32` byte-length prefix (no terminator).
    pub fn append_string(&mut self, value: &str) -> Result<(), BufferError> {
        let len =
            i32::try_from(value.len()).map_err(|_| BufferError::LengthOverflow(value.len()))?;
        self.append_i32(len);
        self.append(value.as_bytes());
        Ok(())
    }

    /// Overwrite four already-buffered bytes at `index` (relative to the head)
    /// with a little-endian `i32`. Used to back-patch frame lengths.
    ///
    /// # Panics
    ///
    /// Panics if `index + 4` exceeds [`len`](Self::len).
    pub fn set_i32_at(&mut self, index: usize, value: i32) {
        assert!(
            index + 4 <= self.length,
            "set_i32_at({index}) outside buffered length {}",
            self.length
        );
        let start = self.offset + index;
        self.data[start..start + 4].copy_from_slice(&value.to_le_bytes());
    }

    // -- Consuming ----------------------------------------------------------

    /// Advance the head by `n` bytes.
    ///
    /// # Panics
    ///
    /// Consuming past the buffered length is a programming error and panics.
    pub fn consume(&mut self, n: usize) {
        assert!(
            n <= self.length,
            "consume({n}) past buffered length {}",
            self.length
        );
        self.offset += n;
        self.length -= n;
        if self.length == 0 {
            self.offset = 0;
        }
    }

    fn ensure(&self, needed: usize) -> Result<(), BufferError> {
        if needed > self.length {
            return Err(BufferError::Underflow {
                needed,
                available: self.length,
            });
        }
        Ok(())
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N], BufferError> {
        self.ensure(N)?;
        let mut out = [0; N];
        out.copy_from_slice(&self.data[self.offset..self.offset + N]);
        self.consume(N);
        Ok(out)
    }

    /// Consume and return one byte.
    pub fn read_u8(&mut self) -> Result<u8, BufferError> {
        Ok(self.read_array::<1>()?[0])
    }

    /// Consume and return a little-endian `i32`.
    pub fn read_i32(&mut self) -> Result<i32, BufferError> {
        Ok(i32::from_le_bytes(self.read_array()?))
    }

    /// Consume and return a little-endian `i64`.
    pub fn read_i64(&mut self) -> Result<i64, BufferError> {
        Ok(i64::from_le_bytes(self.read_array()?))
    }

    /// Consume `n` raw bytes.
    pub fn read_bytes(&mut self, n: usize) -> Result<Vec<u8>, BufferError> {
        self.ensure(n)?;
        let out = self.data[self.offset..self.offset + n].to_vec();
        self.consume(n);
        Ok(out)
    }

    /// Consume an `i32`-prefixed UTF-8 string.
    pub fn read_string(&mut self) -> Result<String, BufferError> {
        let len = self.read_i32()?;
        let len = usize::try_from(len).map_err(|_| BufferError::NegativeLength(len))?;
        let bytes = self.read_bytes(len)?;
        String::from_utf8(bytes).map_err(|_| BufferError::InvalidUtf8)
    }

    /// Read an `i32` at the head without consuming it.
    ///
    /// Returns `None` when fewer than four bytes are buffered.
    pub fn peek_i32(&self) -> Option<i32> {
        let head = self.as_slice().get(..4)?;
        let mut raw = [0; 4];
        raw.copy_from_slice(head);
        Some(i32::from_le_bytes(raw))
    }

    /// Split the first `n` buffered bytes off into a new buffer.
    pub fn take(&mut self, n: usize) -> Result<ByteBuffer, BufferError> {
        self.ensure(n)?;
        let mut out = ByteBuffer::with_capacity(n);
        out.append(&self.data[self.offset..self.offset + n]);
        self.consume(n);
        Ok(out)
    }

    // -- Socket I/O ---------------------------------------------------------

    /// Attempt one non-blocking send of the buffered bytes.
    ///
    /// Returns how many bytes the socket accepted; those bytes are consumed
    /// and the remainder stays buffered for the next attempt. A socket that is
    /// not ready yields `Ok(0)`.
    pub fn send_once(&mut self, stream: &BridgeStream) -> io::Result<usize> {
        if self.is_empty() {
            return Ok(0);
        }
        match stream.try_write(self.as_slice()) {
            Ok(sent) => {
                self.consume(sent);
                Ok(sent)
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(0),
            Err(e) => Err(e),
        }
    }

    /// Write until the buffer is empty, waiting on the writer as needed.
    pub async fn send_fully<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        while !self.is_empty() {
            let sent = writer.write(self.as_slice()).await?;
            if sent == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::WriteZero,
                    "peer stopped accepting bytes",
                ));
            }
            self.consume(sent);
        }
        writer.flush().await
    }

    /// Receive exactly `count` more bytes, appending them at the tail.
    ///
    /// End of stream before `count` bytes arrive is `UnexpectedEof`.
    pub async fn receive_from<R>(&mut self, reader: &mut R, count: usize) -> io::Result<()>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        self.reserve(count);
        let mut received = 0;
        while received < count {
            let start = self.tail_start();
            let n = reader
                .read(&mut self.data[start..start + (count - received)])
                .await?;
            if n == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("stream closed after {received} of {count} bytes"),
                ));
            }
            self.length += n;
            received += n;
        }
        Ok(())
    }

    /// Attempt one non-blocking receive of up to `max` bytes.
    ///
    /// `Ok(None)` means the socket had nothing to read; `Ok(Some(0))` is an
    /// orderly close by the peer.
    pub fn try_receive(&mut self, stream: &BridgeStream, max: usize) -> io::Result<Option<usize>> {
        self.reserve(max);
        let start = self.tail_start();
        match stream.try_read(&mut self.data[start..start + max]) {
            Ok(n) => {
                self.length += n;
                Ok(Some(n))
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e),
        }
    }
}

impl Index<usize> for ByteBuffer {
    type Output = u8;

    fn index(&self, index: usize) -> &u8 {
        &self.as_slice()[index]
    }
}

impl IndexMut<usize> for ByteBuffer {
    fn index_mut(&mut self, index: usize) -> &mut u8 {
        assert!(index < self.length, "index {index} outside buffered length");
        &mut self.data[self.offset + index]
    }
}

impl From<&[u8]> for ByteBuffer {
    fn from(bytes: &[u8]) -> Self {
        let mut buf = ByteBuffer::with_capacity(bytes.len());
        buf.append(bytes);
        buf
    }
}

impl From<Vec<u8>> for ByteBuffer {
    fn from(bytes: Vec<u8>) -> Self {
        let length = bytes.len();
        Self {
            data: bytes,
            offset: 0,
            length,
        }
    }
}

impl PartialEq for ByteBuffer {
    fn eq(&self, other: &Self) -> bool {
        self.as_slice() == other.as_slice()
    }
}

impl Eq for ByteBuffer {}

impl fmt::Debug for ByteBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ByteBuffer")
            .field("len", &self.length)
            .field("capacity", &self.data.len())
            .field("bytes", &self.as_slice())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_then_read_primitives() {
        let mut buf = ByteBuffer::new();
        buf.append_u8(7);
        buf.append_i32(-2);
        buf.append_i64(1 << 40);
        buf.append_string("héllo").unwrap();

        assert_eq!(buf.read_u8().unwrap(), 7);
        assert_eq!(buf.read_i32().unwrap(), -2);
        assert_eq!(buf.read_i64().unwrap(), 1 << 40);
        assert_eq!(buf.read_string().unwrap(), "héllo");
        assert!(buf.is_empty());
    }

    #[test]
    fn integers_are_little_endian() {
        let mut buf = ByteBuffer::new();
        buf.append_i32(0x0102_0304);
        assert_eq!(buf.as_slice(), &[0x04, 0x03, 0x02, 0x01]);
    }

    #[test]
    fn string_has_int32_prefix_and_no_terminator() {
        let mut buf = ByteBuffer::new();
        buf.append_string("ab").unwrap();
        assert_eq!(buf.as_slice(), &[2, 0, 0, 0, b'a', b'b']);
    }

    #[test]
    fn peek_does_not_consume() {
        let mut buf = ByteBuffer::new();
        buf.append_i32(42);
        assert_eq!(buf.peek_i32(), Some(42));
        assert_eq!(buf.len(), 4);
        assert_eq!(buf.read_i32().unwrap(), 42);
    }

    #[test]
    fn peek_with_short_buffer_is_none() {
        let buf = ByteBuffer::from(&[1u8, 2, 3][..]);
        assert_eq!(buf.peek_i32(), None);
    }

    #[test]
    fn read_past_end_is_underflow_and_keeps_bytes() {
        let mut buf = ByteBuffer::from(&[1u8, 2][..]);
        let err = buf.read_i32().unwrap_err();
        assert_eq!(
            err,
            BufferError::Underflow {
                needed: 4,
                available: 2
            }
        );
        assert_eq!(buf.len(), 2);
    }

    #[test]
    fn negative_string_length_is_rejected() {
        let mut buf = ByteBuffer::new();
        buf.append_i32(-5);
        assert_eq!(buf.read_string().unwrap_err(), BufferError::NegativeLength(-5));
    }

    #[test]
    fn invalid_utf8_is_rejected() {
        let mut buf = ByteBuffer::new();
        buf.append_i32(2);
        buf.append(&[0xff, 0xfe]);
        assert_eq!(buf.read_string().unwrap_err(), BufferError::InvalidUtf8);
    }

    #[test]
    #[should_panic(expected = "past buffered length")]
    fn consume_past_end_panics() {
        let mut buf = ByteBuffer::from(&[1u8][..]);
        buf.consume(2);
    }

    #[test]
    fn indexer_is_relative_to_head() {
        let mut buf = ByteBuffer::from(&[10u8, 20, 30][..]);
        buf.consume(1);
        assert_eq!(buf[0], 20);
        buf[1] = 99;
        assert_eq!(buf.as_slice(), &[20, 99]);
    }

    #[test]
    fn set_i32_at_back_patches() {
        let mut buf = ByteBuffer::new();
        buf.append_i32(0);
        buf.append_u8(5);
        buf.set_i32_at(0, 1);
        assert_eq!(buf.as_slice(), &[1, 0, 0, 0, 5]);
    }

    #[test]
    fn compacts_instead_of_growing_when_possible() {
        let mut buf = ByteBuffer::with_capacity(8);
        buf.append(&[1, 2, 3, 4, 5, 6]);
        buf.consume(5);
        buf.append(&[7, 8, 9, 10]);
        assert_eq!(buf.capacity(), 8);
        assert_eq!(buf.as_slice(), &[6, 7, 8, 9, 10]);
    }

    #[test]
    fn grows_with_half_capacity_headroom() {
        let mut buf = ByteBuffer::with_capacity(100);
        buf.append(&[0; 100]);
        buf.append(&[1]);
        assert_eq!(buf.capacity(), 150);
        assert_eq!(buf.len(), 101);
    }

    #[test]
    fn growth_preserves_unconsumed_bytes() {
        let mut buf = ByteBuffer::with_capacity(4);
        buf.append(&[1, 2, 3, 4]);
        buf.consume(2);
        buf.append(&[5, 6, 7, 8, 9]);
        assert_eq!(buf.as_slice(), &[3, 4, 5, 6, 7, 8, 9]);
    }

    #[test]
    fn take_splits_head() {
        let mut buf = ByteBuffer::from(&[1u8, 2, 3, 4][..]);
        let head = buf.take(3).unwrap();
        assert_eq!(head.as_slice(), &[1, 2, 3]);
        assert_eq!(buf.as_slice(), &[4]);
        assert!(buf.take(2).is_err());
    }

    #[test]
    fn consuming_everything_resets_offset() {
        let mut buf = ByteBuffer::with_capacity(4);
        buf.append(&[1, 2, 3, 4]);
        buf.consume(4);
        buf.append(&[5, 6, 7, 8]);
        assert_eq!(buf.capacity(), 4);
    }
}
