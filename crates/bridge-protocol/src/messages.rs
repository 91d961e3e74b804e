// SPDX-License-Identifier: MIT OR Apache-2.0
//! The message catalogue: every request and response the bridge speaks,
//! their type tags, and the static registry used to decode incoming frames.

use std::fmt;

use bridge_wire::{ByteBuffer, Decoder, WireError, WireMessage, wire_message};
use chrono::{DateTime, TimeDelta, Utc};

use crate::{ErrorInfo, Notification, NotificationKind, ProtocolError};

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Whether a message travels client→server or server→client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// Sent by clients; served by a handler.
    Request,
    /// Sent by the server; always ends with an optional [`ErrorInfo`].
    Response,
}

/// A concrete message type with a fixed wire tag.
pub trait Message:
    WireMessage + Clone + fmt::Debug + Into<Envelope> + TryFrom<Envelope, Error = Envelope>
{
    /// Wire tag.
    const MESSAGE_TYPE: MessageType;
}

/// A request and the response type it is answered with.
pub trait Request: Message {
    /// Response type the server replies with.
    type Response: Response;

    /// One-way requests never receive a reply.
    const ONE_WAY: bool = false;
}

/// A response, whose last wire field is the optional error slot.
pub trait Response: Message {
    /// The failure carried by this response, if any.
    fn error(&self) -> Option<&ErrorInfo>;

    /// Replace the error slot.
    fn set_error(&mut self, error: Option<ErrorInfo>);

    /// A default-valued response carrying `error`.
    fn failed(error: ErrorInfo) -> Self {
        let mut response = Self::default();
        response.set_error(Some(error));
        response
    }
}

// ---------------------------------------------------------------------------
// Response schema helper
// ---------------------------------------------------------------------------

macro_rules! response {
    (
        $(#[$meta:meta])*
        pub struct $name:ident {
            $(
                $(#[$fmeta:meta])*
                pub $field:ident : $fty:ty = $order:literal
            ),* $(,)?
        }
    ) => {
        wire_message! {
            $(#[$meta])*
            #[derive(Debug, Clone, Default, PartialEq)]
            pub struct $name {
                $(
                    $(#[$fmeta])*
                    pub $field: $fty = $order,
                )*
            }
            trailing {
                /// Set when the request failed on the server.
                pub error: Option<ErrorInfo>,
            }
        }

        impl Response for $name {
            fn error(&self) -> Option<&ErrorInfo> {
                self.error.as_ref()
            }

            fn set_error(&mut self, error: Option<ErrorInfo>) {
                self.error = error;
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Requests and responses
// ---------------------------------------------------------------------------

wire_message! {
    /// Liveness check; echoed back.
    #[derive(Debug, Clone, Default, PartialEq)]
    pub struct Ping {
        /// Arbitrary text returned verbatim.
        pub payload: Option<String> = 1,
    }
}

response! {
    /// Reply to [`Ping`].
    pub struct PingResponse {
        /// The request payload.
        pub payload: Option<String> = 1,
        /// Server clock at reply time.
        pub server_time: DateTime<Utc> = 2,
        /// Time since the server started.
        pub uptime: TimeDelta = 3,
    }
}

wire_message! {
    /// Ask whether a path is covered by monitoring.
    #[derive(Debug, Clone, Default, PartialEq)]
    pub struct CheckPath {
        /// Absolute path to check.
        pub path: Option<String> = 1,
    }
}

response! {
    /// Reply to [`CheckPath`].
    pub struct CheckPathResponse {
        /// The path that was checked.
        pub path: Option<String> = 1,
        /// `true` when the path lies under a watched root.
        pub monitored: bool = 2,
        /// The watched root containing the path.
        pub root: Option<String> = 3,
    }
}

wire_message! {
    /// Walk a watched root and re-index it. Long-running.
    #[derive(Debug, Clone, Default, PartialEq)]
    pub struct StartRescan {
        /// Root to rescan.
        pub root: Option<String> = 1,
        /// Re-read every file rather than only changed ones.
        pub full: bool = 2,
    }
}

response! {
    /// Reply to [`StartRescan`], sent when the scan finishes.
    pub struct StartRescanResponse {
        /// Root that was scanned.
        pub root: Option<String> = 1,
        /// Regular files visited.
        pub files_scanned: i64 = 2,
        /// Sum of their sizes.
        pub bytes_scanned: i64 = 3,
        /// Wall-clock duration of the scan.
        pub elapsed: TimeDelta = 4,
    }
}

wire_message! {
    /// Switch filesystem monitoring on or off.
    #[derive(Debug, Clone, Default, PartialEq)]
    pub struct SetMonitoring {
        /// Desired state.
        pub enabled: bool = 1,
    }
}

response! {
    /// Reply to [`SetMonitoring`].
    pub struct SetMonitoringResponse {
        /// State after the call.
        pub enabled: bool = 1,
        /// State before the call.
        pub previous: bool = 2,
    }
}

wire_message! {
    /// Ask for live server counters.
    #[derive(Debug, Clone, Default, PartialEq)]
    pub struct GetStatistics {}
}

response! {
    /// Reply to [`GetStatistics`].
    pub struct GetStatisticsResponse {
        /// Connections currently open.
        pub connections_open: i32 = 1,
        /// Connections accepted since start.
        pub connections_accepted: i64 = 2,
        /// Requests dispatched to handlers.
        pub requests_handled: i64 = 3,
        /// Requests whose handler failed.
        pub requests_failed: i64 = 4,
        /// Connections dropped for protocol violations.
        pub protocol_errors: i64 = 5,
        /// Notifications posted to the bus.
        pub notifications_posted: i64 = 6,
        /// Current monitoring state.
        pub monitoring_enabled: bool = 7,
        /// When the server started.
        pub started_at: DateTime<Utc> = 8,
    }
}

wire_message! {
    /// Long-poll for notifications newer than `last_seen_id`. Long-running.
    #[derive(Debug, Clone, Default, PartialEq)]
    pub struct ReceiveNotifications {
        /// Highest id the caller has already seen (0 for none).
        pub last_seen_id: i64 = 1,
        /// How long to wait for something new.
        pub timeout: TimeDelta = 2,
    }
}

response! {
    /// Reply to [`ReceiveNotifications`].
    pub struct ReceiveNotificationsResponse {
        /// New notifications in ascending id order; absent on timeout.
        pub notifications: Option<Vec<Notification>> = 1,
    }
}

wire_message! {
    /// Publish a notification to the bus. One-way: never answered.
    #[derive(Debug, Clone, Default, PartialEq)]
    pub struct PostNotification {
        /// Event category.
        pub kind: NotificationKind = 1,
        /// Summary text.
        pub message: Option<String> = 2,
        /// Attached failure.
        pub error: Option<ErrorInfo> = 3,
    }
}

response! {
    /// Declared response of one-way requests; never actually sent.
    pub struct Acknowledge {}
}

// ---------------------------------------------------------------------------
// Catalogue
// ---------------------------------------------------------------------------

macro_rules! kind_of {
    (Request) => {
        MessageKind::Request
    };
    (OneWay) => {
        MessageKind::Request
    };
    (Response) => {
        MessageKind::Response
    };
}

macro_rules! request_impl {
    (Request, $name:ident, $resp:ident) => {
        impl Request for $name {
            type Response = $resp;
        }
    };
    (OneWay, $name:ident, $resp:ident) => {
        impl Request for $name {
            type Response = $resp;
            const ONE_WAY: bool = true;
        }
    };
    (Response, $name:ident) => {};
}

macro_rules! response_type_of {
    (Request, $resp:ident) => {
        Some(MessageType::$resp)
    };
    (OneWay, $resp:ident) => {
        Some(MessageType::$resp)
    };
    (Response) => {
        None
    };
}

macro_rules! one_way_of {
    (OneWay) => {
        true
    };
    ($other:ident) => {
        false
    };
}

macro_rules! error_slot {
    (Response, $m:ident) => {
        $m.error.as_ref()
    };
    ($other:ident, $m:ident) => {{
        let _ = $m;
        None
    }};
}

macro_rules! catalogue {
    (
        $( $tag:literal => $name:ident : $kind:ident $( ( $resp:ident ) )? ),* $(,)?
    ) => {
        /// Wire tag of every message in the catalogue.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[repr(i32)]
        pub enum MessageType {
            $(
                #[allow(missing_docs)]
                $name = $tag,
            )*
        }

        impl MessageType {
            /// Every message type, in tag order.
            pub const ALL: &'static [MessageType] = &[$(MessageType::$name),*];

            /// Wire tag.
            pub fn tag(self) -> i32 {
                self as i32
            }

            /// Type name.
            pub fn name(self) -> &'static str {
                match self {
                    $(MessageType::$name => stringify!($name),)*
                }
            }

            /// Request or response.
            pub fn kind(self) -> MessageKind {
                match self {
                    $(MessageType::$name => kind_of!($kind),)*
                }
            }

            /// For requests, the response type they are answered with.
            pub fn response_type(self) -> Option<MessageType> {
                match self {
                    $(MessageType::$name => response_type_of!($kind $(, $resp)?),)*
                }
            }

            /// `true` for requests that are never answered.
            pub fn is_one_way(self) -> bool {
                match self {
                    $(MessageType::$name => one_way_of!($kind),)*
                }
            }
        }

        impl TryFrom<i32> for MessageType {
            type Error = ProtocolError;

            fn try_from(tag: i32) -> Result<Self, Self::Error> {
                match tag {
                    $($tag => Ok(MessageType::$name),)*
                    other => Err(ProtocolError::UnknownMessageType(other)),
                }
            }
        }

        /// Any catalogue message, tagged by its concrete type.
        #[derive(Debug, Clone, PartialEq)]
        pub enum Envelope {
            $(
                #[allow(missing_docs)]
                $name($name),
            )*
        }

        impl Envelope {
            /// Wire tag of the contained message.
            pub fn message_type(&self) -> MessageType {
                match self {
                    $(Envelope::$name(_) => MessageType::$name,)*
                }
            }

            /// The error slot, for responses that carry one.
            pub fn error(&self) -> Option<&ErrorInfo> {
                match self {
                    $(Envelope::$name(m) => error_slot!($kind, m),)*
                }
            }

            /// Append the payload (no length prefix, no tag).
            pub fn encode_payload(&self, buf: &mut ByteBuffer) -> Result<(), WireError> {
                match self {
                    $(Envelope::$name(m) => m.encode_fields(buf),)*
                }
            }

            /// Decode a payload known to be of `message_type`.
            pub fn decode_payload(
                message_type: MessageType,
                dec: &mut Decoder<'_>,
            ) -> Result<Envelope, WireError> {
                match message_type {
                    $(MessageType::$name => $name::decode_fields(dec).map(Envelope::$name),)*
                }
            }
        }

        $(
            impl Message for $name {
                const MESSAGE_TYPE: MessageType = MessageType::$name;
            }

            impl From<$name> for Envelope {
                fn from(m: $name) -> Self {
                    Envelope::$name(m)
                }
            }

            impl TryFrom<Envelope> for $name {
                type Error = Envelope;

                fn try_from(envelope: Envelope) -> Result<Self, Envelope> {
                    match envelope {
                        Envelope::$name(m) => Ok(m),
                        #[allow(unreachable_patterns)]
                        other => Err(other),
                    }
                }
            }

            request_impl!($kind, $name $(, $resp)?);
        )*
    };
}

catalogue! {
    1 => Ping: Request(PingResponse),
    2 => PingResponse: Response,
    3 => CheckPath: Request(CheckPathResponse),
    4 => CheckPathResponse: Response,
    5 => StartRescan: Request(StartRescanResponse),
    6 => StartRescanResponse: Response,
    7 => SetMonitoring: Request(SetMonitoringResponse),
    8 => SetMonitoringResponse: Response,
    9 => GetStatistics: Request(GetStatisticsResponse),
    10 => GetStatisticsResponse: Response,
    11 => ReceiveNotifications: Request(ReceiveNotificationsResponse),
    12 => ReceiveNotificationsResponse: Response,
    13 => PostNotification: OneWay(Acknowledge),
    14 => Acknowledge: Response,
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name(), self.tag())
    }
}

impl Envelope {
    /// Request or response.
    pub fn kind(&self) -> MessageKind {
        self.message_type().kind()
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// One entry of the static type registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Registration {
    /// Tag and identity.
    pub message_type: MessageType,
    /// Request or response.
    pub kind: MessageKind,
    /// Type name.
    pub name: &'static str,
}

impl Registration {
    /// Decode a payload of this type.
    pub fn decode(&self, dec: &mut Decoder<'_>) -> Result<Envelope, WireError> {
        Envelope::decode_payload(self.message_type, dec)
    }
}

/// Look up the registration for a wire tag.
pub fn lookup(tag: i32) -> Result<Registration, ProtocolError> {
    let message_type = MessageType::try_from(tag)?;
    Ok(Registration {
        message_type,
        kind: message_type.kind(),
        name: message_type.name(),
    })
}

/// Every registered message type.
pub fn registry() -> impl Iterator<Item = Registration> {
    MessageType::ALL.iter().map(|&message_type| Registration {
        message_type,
        kind: message_type.kind(),
        name: message_type.name(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_are_unique_and_round_trip() {
        for &t in MessageType::ALL {
            assert_eq!(MessageType::try_from(t.tag()).unwrap(), t);
        }
        assert_eq!(MessageType::ALL.len(), 14);
    }

    #[test]
    fn every_request_names_a_response() {
        for reg in registry() {
            match reg.kind {
                MessageKind::Request => {
                    let resp = reg.message_type.response_type().unwrap();
                    assert_eq!(resp.kind(), MessageKind::Response);
                }
                MessageKind::Response => assert!(reg.message_type.response_type().is_none()),
            }
        }
    }

    #[test]
    fn one_way_flag() {
        assert!(MessageType::PostNotification.is_one_way());
        assert!(PostNotification::ONE_WAY);
        assert!(!Ping::ONE_WAY);
        assert!(!MessageType::Ping.is_one_way());
    }

    #[test]
    fn unknown_tag_is_rejected() {
        assert!(matches!(
            lookup(99),
            Err(ProtocolError::UnknownMessageType(99))
        ));
    }

    #[test]
    fn envelope_conversions() {
        let env: Envelope = CheckPath {
            path: Some("/x".into()),
        }
        .into();
        assert_eq!(env.message_type(), MessageType::CheckPath);
        assert!(Ping::try_from(env.clone()).is_err());
        assert_eq!(CheckPath::try_from(env).unwrap().path.as_deref(), Some("/x"));
    }

    #[test]
    fn failed_response_carries_error() {
        let resp = PingResponse::failed(ErrorInfo::new("nope"));
        let env: Envelope = resp.into();
        assert_eq!(env.error().unwrap().message.as_deref(), Some("nope"));
        assert!(Envelope::from(Ping::default()).error().is_none());
    }

    #[test]
    fn display_shows_name_and_tag() {
        assert_eq!(MessageType::StartRescan.to_string(), "StartRescan(5)");
    }
}
