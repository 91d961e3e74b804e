// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Request commands shared by the binary and its tests.
pub mod commands;
/// Text and JSON rendering of replies.
pub mod format;
