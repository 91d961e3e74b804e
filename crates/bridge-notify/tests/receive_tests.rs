// SPDX-License-Identifier: MIT OR Apache-2.0
//! Long-poll behaviour of `NotificationBus::receive`.

use std::sync::Arc;
use std::time::Duration;

use bridge_notify::NotificationBus;
use bridge_protocol::{Notification, NotificationKind};
use tokio::time::Instant;

fn note(msg: &str) -> Notification {
    Notification::new(NotificationKind::Info, msg)
}

// -- 1. Everything already posted comes back at once, in id order --
#[tokio::test]
async fn returns_backlog_immediately() {
    let bus = NotificationBus::new(100);
    for i in 0..7 {
        bus.post(note(&format!("n{i}")));
    }
    let got = bus.receive(0, Duration::from_secs(30)).await;
    let ids: Vec<i64> = got.iter().map(|n| n.id).collect();
    assert_eq!(ids, (1..=7).collect::<Vec<_>>());
    assert_eq!(got[3].message.as_deref(), Some("n3"));
}

// -- 2. Nothing new: empty after the full timeout, not before --
#[tokio::test(start_paused = true)]
async fn times_out_empty_after_deadline() {
    let bus = NotificationBus::new(10);
    bus.post(note("old"));
    let start = Instant::now();
    let got = bus.receive(1, Duration::from_millis(750)).await;
    assert!(got.is_empty());
    assert!(start.elapsed() >= Duration::from_millis(750));
}

// -- 3. A post wakes a waiting reader before the deadline --
#[tokio::test(start_paused = true)]
async fn post_wakes_waiter() {
    let bus = Arc::new(NotificationBus::new(10));
    let reader = {
        let bus = Arc::clone(&bus);
        tokio::spawn(async move {
            let start = Instant::now();
            let got = bus.receive(0, Duration::from_secs(60)).await;
            (got, start.elapsed())
        })
    };
    tokio::time::sleep(Duration::from_secs(2)).await;
    bus.post(note("wake"));
    let (got, waited) = reader.await.unwrap();
    assert_eq!(got.len(), 1);
    assert_eq!(got[0].message.as_deref(), Some("wake"));
    assert!(waited < Duration::from_secs(60));
}

// -- 4. Several waiters all wake on one post --
#[tokio::test]
async fn all_waiters_wake() {
    let bus = Arc::new(NotificationBus::new(10));
    let mut readers = Vec::new();
    for _ in 0..4 {
        let bus = Arc::clone(&bus);
        readers.push(tokio::spawn(async move {
            bus.receive(0, Duration::from_secs(10)).await
        }));
    }
    tokio::time::sleep(Duration::from_millis(50)).await;
    bus.post(note("broadcast"));
    for r in readers {
        assert_eq!(r.await.unwrap().len(), 1);
    }
}

// -- 5. A consumer that fell behind sees a gap, not an error --
#[tokio::test]
async fn lagging_consumer_sees_gap() {
    let bus = NotificationBus::new(5);
    for i in 0..20 {
        bus.post(note(&i.to_string()));
    }
    let got = bus.receive(2, Duration::from_millis(10)).await;
    let ids: Vec<i64> = got.iter().map(|n| n.id).collect();
    assert_eq!(ids, vec![16, 17, 18, 19, 20]);
}

// -- 6. Zero timeout still returns existing entries --
#[tokio::test]
async fn zero_timeout_scans_once() {
    let bus = NotificationBus::new(5);
    assert!(bus.receive(0, Duration::ZERO).await.is_empty());
    bus.post(note("x"));
    assert_eq!(bus.receive(0, Duration::ZERO).await.len(), 1);
}
