// SPDX-License-Identifier: MIT OR Apache-2.0
//! bridge-wire
//!
//! Binary value codec for the backup bridge protocol.
//!
//! Each message type declares its fields once, with explicit order values,
//! through [`wire_message!`]. The first time a type is encoded or decoded its
//! schema is compiled into a [`Plan`] and cached for the rest of the process;
//! the plan drives both directions so encode and decode order can never
//! disagree.
//!
//! Value encodings (all integers little-endian):
//!
//! | Kind | Bytes |
//! |---|---|
//! | `bool` | 1 byte, `0`/`1` |
//! | `i32` / `i64` | 4 / 8 bytes |
//! | `DateTime<Utc>` / `TimeDelta` | `i64` count of 100 ns ticks |
//! | schema enum | `i32` discriminant |
//! | `String` | presence byte, `i32` byte length, UTF-8 |
//! | `Vec<T>` | presence byte, `i32` count, elements |
//! | nested message | presence byte, nested fields |
#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod field;
mod macros;
mod plan;

pub use bridge_buffer::ByteBuffer;
pub use error::{PlanError, WireError};
pub use field::{
    DEFAULT_MAX_DEPTH, Decoder, Nullable, TICKS_PER_SECOND, UNIX_EPOCH_TICKS, WireField,
    datetime_to_ticks, decode_present, duration_to_ticks, encode_present, ticks_to_datetime,
    ticks_to_duration,
};
pub use plan::{DecodeFn, EncodeFn, Plan, PlanBuilder, WireMessage, build_plan, plan_for};
