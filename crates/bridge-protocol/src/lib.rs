// SPDX-License-Identifier: MIT OR Apache-2.0
//! bridge-protocol
//!
//! Messages and framing for the backup bridge.
//!
//! Every message is a concrete struct with a fixed type tag. Requests are
//! answered by exactly one response type; responses end with an optional
//! [`ErrorInfo`] that reports an application failure without failing the
//! transport. Frames are `i32 totalLength`, `i32 messageType`, payload.
//!
//! ```
//! use bridge_protocol::{ByteBuffer, CheckPath, Envelope, FrameDecode, decode_frame, encode_message};
//!
//! let mut buf = ByteBuffer::new();
//! encode_message(&CheckPath { path: Some("/home/u".into()) }, &mut buf).unwrap();
//! let FrameDecode::Frame(Envelope::CheckPath(req)) = decode_frame(&mut buf, 1 << 20).unwrap() else {
//!     panic!("expected a CheckPath frame");
//! };
//! assert_eq!(req.path.as_deref(), Some("/home/u"));
//! ```
#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod error_info;
mod frame;
mod messages;
mod notification;

pub use bridge_buffer::ByteBuffer;
pub use error::ProtocolError;
pub use error_info::ErrorInfo;
pub use frame::{
    DEFAULT_MAX_FRAME_BYTES, FrameDecode, LENGTH_PREFIX, TAG_LEN, decode_frame, encode_frame,
    encode_frame_limited, encode_message,
};
pub use messages::{
    Acknowledge, CheckPath, CheckPathResponse, Envelope, GetStatistics, GetStatisticsResponse,
    Message, MessageKind, MessageType, Ping, PingResponse, PostNotification, ReceiveNotifications,
    ReceiveNotificationsResponse, Registration, Request, Response, SetMonitoring,
    SetMonitoringResponse, StartRescan, StartRescanResponse, lookup, registry,
};
pub use notification::{Notification, NotificationKind};
