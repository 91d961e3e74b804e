// SPDX-License-Identifier: MIT OR Apache-2.0
//! Build structured notifications from fuzz input and round-trip them through
//! a `ReceiveNotificationsResponse` frame.
#![no_main]
use arbitrary::Arbitrary;
use bridge_protocol::{
    ByteBuffer, Envelope, ErrorInfo, FrameDecode, Notification, NotificationKind,
    ReceiveNotificationsResponse, decode_frame, encode_message,
};
use chrono::{DateTime, Utc};
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
struct FuzzNotification {
    id: i64,
    ticks: i64,
    kind: u8,
    message: Option<String>,
    errors: Vec<String>,
}

fn kind(n: u8) -> NotificationKind {
    let all = NotificationKind::ALL;
    all[usize::from(n) % all.len()]
}

fn error_chain(messages: &[String]) -> Option<ErrorInfo> {
    messages.iter().rev().fold(None, |inner, m| {
        let info = ErrorInfo::new(m.clone());
        Some(match inner {
            Some(inner) => info.with_inner(inner),
            None => info,
        })
    })
}

fuzz_target!(|input: Vec<FuzzNotification>| {
    let notifications: Vec<Notification> = input
        .iter()
        .take(32)
        .map(|f| Notification {
            id: f.id,
            // Whole 100 ns ticks survive the round trip.
            timestamp: DateTime::<Utc>::from_timestamp_micros(f.ticks / 10).unwrap_or_default(),
            kind: kind(f.kind),
            message: f.message.clone(),
            error: error_chain(&f.errors[..f.errors.len().min(16)]),
        })
        .collect();
    let response = ReceiveNotificationsResponse {
        notifications: Some(notifications),
        error: None,
    };

    let mut buf = ByteBuffer::new();
    if encode_message(&response, &mut buf).is_err() {
        return;
    }
    match decode_frame(&mut buf, usize::MAX >> 1) {
        Ok(FrameDecode::Frame(Envelope::ReceiveNotificationsResponse(back))) => {
            assert_eq!(back, response)
        }
        other => panic!("round trip failed: {other:?}"),
    }
});
