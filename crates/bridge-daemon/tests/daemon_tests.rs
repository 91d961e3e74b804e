// SPDX-License-Identifier: MIT OR Apache-2.0
//! The daemon's handler set exercised through a real client.

use std::time::Duration;

use bridge_client::{BridgeClient, ClientError, Endpoint};
use bridge_config::BridgeConfig;
use bridge_daemon::Daemon;
use bridge_protocol::{
    CheckPath, GetStatistics, NotificationKind, Ping, PostNotification, ReceiveNotifications,
    SetMonitoring, StartRescan,
};
use chrono::TimeDelta;

struct Fixture {
    daemon: Daemon,
    endpoint: Endpoint,
    root: tempfile::TempDir,
    _run: tempfile::TempDir,
}

async fn start() -> Fixture {
    let run = tempfile::tempdir().unwrap();
    let root = tempfile::tempdir().unwrap();
    std::fs::write(root.path().join("one.txt"), b"12345678").unwrap();
    std::fs::create_dir(root.path().join("nested")).unwrap();
    std::fs::write(root.path().join("nested").join("two.txt"), b"12").unwrap();

    let socket = run.path().join("bridge.sock");
    let config = BridgeConfig {
        unix_socket: Some(socket.display().to_string()),
        poll_interval_ms: Some(20),
        notification_poll_timeout_ms: Some(2_000),
        watch_roots: vec![root.path().display().to_string()],
        ..BridgeConfig::default()
    };
    let daemon = Daemon::start(&config).await.unwrap();
    Fixture {
        daemon,
        endpoint: Endpoint::Unix(socket),
        root,
        _run: run,
    }
}

// -- 1. ping reports uptime --
#[tokio::test]
async fn ping_reports_clock_and_uptime() {
    let fx = start().await;
    let client = BridgeClient::connect(&fx.endpoint).await.unwrap();
    let reply = client
        .call(Ping {
            payload: Some("hi".into()),
        })
        .await
        .unwrap();
    assert_eq!(reply.payload.as_deref(), Some("hi"));
    assert!(reply.uptime >= TimeDelta::zero());
    fx.daemon.shutdown().await.unwrap();
}

// -- 2. check-path against the watch roots --
#[tokio::test]
async fn check_path_finds_root() {
    let fx = start().await;
    let client = BridgeClient::connect(&fx.endpoint).await.unwrap();
    let inside = fx.root.path().join("one.txt").display().to_string();
    let reply = client
        .call(CheckPath {
            path: Some(inside.clone()),
        })
        .await
        .unwrap();
    assert!(reply.monitored);
    assert_eq!(reply.path, Some(inside));
    assert_eq!(reply.root, Some(fx.root.path().display().to_string()));

    let outside = client
        .call(CheckPath {
            path: Some("/definitely/elsewhere".into()),
        })
        .await
        .unwrap();
    assert!(!outside.monitored);
    assert!(outside.root.is_none());
    fx.daemon.shutdown().await.unwrap();
}

// -- 3. rescan runs on a worker and reports totals --
#[tokio::test]
async fn rescan_reports_totals() {
    let fx = start().await;
    let client = BridgeClient::connect(&fx.endpoint).await.unwrap();
    let reply = client
        .call(StartRescan {
            root: Some(fx.root.path().display().to_string()),
            full: false,
        })
        .await
        .unwrap();
    assert_eq!(reply.files_scanned, 2);
    assert_eq!(reply.bytes_scanned, 10);
    fx.daemon.shutdown().await.unwrap();
}

// -- 4. unknown rescan root comes back as a remote error --
#[tokio::test]
async fn rescan_of_unknown_root_is_remote_error() {
    let fx = start().await;
    let client = BridgeClient::connect(&fx.endpoint).await.unwrap();
    let err = client
        .call(StartRescan {
            root: Some("/not/watched".into()),
            full: true,
        })
        .await
        .unwrap_err();
    let ClientError::Remote(info) = err else {
        panic!("expected remote error, got {err:?}");
    };
    assert!(info.message_or_default().contains("not under a configured watch root"));
    assert_eq!(info.source.as_deref(), Some("StartRescan"));
    fx.daemon.shutdown().await.unwrap();
}

// -- 5. a long-poll wakes when another client changes state --
#[tokio::test]
async fn long_poll_sees_monitoring_change() {
    let fx = start().await;
    let poller = BridgeClient::connect(&fx.endpoint).await.unwrap();
    let actor = BridgeClient::connect(&fx.endpoint).await.unwrap();

    let poll = tokio::spawn(async move {
        poller
            .call(ReceiveNotifications {
                last_seen_id: 0,
                timeout: TimeDelta::seconds(10),
            })
            .await
            .unwrap()
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    let changed = actor.call(SetMonitoring { enabled: false }).await.unwrap();
    assert!(changed.previous);
    assert!(!changed.enabled);

    let received = tokio::time::timeout(Duration::from_secs(5), poll)
        .await
        .unwrap()
        .unwrap();
    let notes = received.notifications.expect("notifications");
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].kind, NotificationKind::MonitoringChanged);
    assert_eq!(notes[0].id, 1);
    fx.daemon.shutdown().await.unwrap();
}

// -- 6. one-way post then read back in order --
#[tokio::test]
async fn posted_notifications_come_back_in_order() {
    let fx = start().await;
    let client = BridgeClient::connect(&fx.endpoint).await.unwrap();
    for text in ["first", "second", "third"] {
        client
            .send_one_way(PostNotification {
                kind: NotificationKind::Warning,
                message: Some(text.into()),
                error: None,
            })
            .await
            .unwrap();
    }
    let reply = client
        .call(ReceiveNotifications {
            last_seen_id: 0,
            timeout: TimeDelta::seconds(1),
        })
        .await
        .unwrap();
    let messages: Vec<_> = reply
        .notifications
        .unwrap_or_default()
        .into_iter()
        .map(|n| (n.id, n.message.unwrap_or_default()))
        .collect();
    assert_eq!(
        messages,
        vec![
            (1, "first".to_string()),
            (2, "second".to_string()),
            (3, "third".to_string())
        ]
    );

    let nothing_new = client
        .call(ReceiveNotifications {
            last_seen_id: 3,
            timeout: TimeDelta::milliseconds(50),
        })
        .await
        .unwrap();
    assert!(nothing_new.notifications.is_none());
    fx.daemon.shutdown().await.unwrap();
}

// -- 7. statistics reflect the traffic so far --
#[tokio::test]
async fn statistics_reflect_traffic() {
    let fx = start().await;
    let client = BridgeClient::connect(&fx.endpoint).await.unwrap();
    client.call(Ping::default()).await.unwrap();
    let _ = client.call(CheckPath { path: None }).await;

    let stats = client.call(GetStatistics {}).await.unwrap();
    assert_eq!(stats.connections_open, 1);
    assert_eq!(stats.connections_accepted, 1);
    assert_eq!(stats.requests_handled, 3);
    assert_eq!(stats.requests_failed, 1);
    assert!(stats.monitoring_enabled);
    fx.daemon.shutdown().await.unwrap();
}
