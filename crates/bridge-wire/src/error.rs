// SPDX-License-Identifier: MIT OR Apache-2.0
//! Codec and plan-construction errors.

use bridge_buffer::BufferError;

/// A message type's schema cannot be turned into a serialization plan.
///
/// This is a defect in a message definition, not a runtime condition. The
/// failure is cached, so every later use of the type reports the same error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlanError {
    /// Two fields declare the same order value.
    #[error("{type_name}: fields '{first}' and '{second}' both declare order {order}")]
    DuplicateOrder {
        /// Message type name.
        type_name: &'static str,
        /// The clashing order value.
        order: i32,
        /// First field carrying it.
        first: &'static str,
        /// Second field carrying it.
        second: &'static str,
    },

    /// The same field name was registered twice.
    #[error("{type_name}: field '{field}' registered twice")]
    DuplicateField {
        /// Message type name.
        type_name: &'static str,
        /// Field name.
        field: &'static str,
    },
}

/// Errors raised while encoding or decoding wire values.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    /// Not enough bytes, bad length prefix or bad UTF-8.
    #[error(transparent)]
    Buffer(#[from] BufferError),

    /// The type has no usable plan.
    #[error(transparent)]
    Plan(#[from] PlanError),

    /// A presence byte was neither 0 nor 1.
    #[error("invalid presence byte {0:#04x}")]
    InvalidPresence(u8),

    /// A boolean byte was neither 0 nor 1.
    #[error("invalid boolean byte {0:#04x}")]
    InvalidBool(u8),

    /// An enum discriminant is not one the schema declares.
    #[error("unknown {type_name} value {value}")]
    UnknownEnumValue {
        /// Enum type name.
        type_name: &'static str,
        /// Received discriminant.
        value: i32,
    },

    /// A sequence count prefix was negative.
    #[error("negative sequence count {0}")]
    NegativeCount(i32),

    /// A sequence is too long for an int32 count prefix.
    #[error("sequence of {0} elements does not fit an int32 count")]
    CountOverflow(usize),

    /// Nested values exceeded the decoder's depth limit.
    #[error("nesting deeper than {limit} levels")]
    TooDeep {
        /// Configured limit.
        limit: usize,
    },

    /// A timestamp or duration does not fit the 100 ns tick representation.
    #[error("{what} out of representable range")]
    OutOfRange {
        /// What was being converted.
        what: &'static str,
    },
}
