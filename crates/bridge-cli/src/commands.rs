// SPDX-License-Identifier: MIT OR Apache-2.0
//! Command implementations for the bridge CLI.
//!
//! Each command performs one call over an open [`BridgeClient`] and returns
//! the formatted reply, so they can be tested against an in-process daemon
//! without spawning the binary.

use std::path::Path;

use anyhow::{Context, Result, bail};
use bridge_client::{BridgeClient, ClientError, Endpoint};
use bridge_protocol::{
    CheckPath, GetStatistics, Notification, NotificationKind, Ping, PostNotification,
    ReceiveNotifications, SetMonitoring, StartRescan,
};
use chrono::TimeDelta;

use crate::format::Formatter;

/// Pick the endpoint from an explicit address or a TCP port file.
pub fn resolve_endpoint(endpoint: Option<Endpoint>, port_file: Option<&Path>) -> Result<Endpoint> {
    match (endpoint, port_file) {
        (Some(endpoint), _) => Ok(endpoint),
        (None, Some(path)) => Endpoint::from_port_file(path)
            .with_context(|| format!("read port file '{}'", path.display())),
        (None, None) => bail!("no endpoint given; pass --endpoint or --port-file"),
    }
}

/// `ping`
pub async fn ping(
    client: &BridgeClient,
    fmt: &Formatter,
    payload: Option<String>,
) -> Result<String, ClientError> {
    let reply = client.call(Ping { payload }).await?;
    Ok(fmt.ping(&reply))
}

/// `check-path`
pub async fn check_path(
    client: &BridgeClient,
    fmt: &Formatter,
    path: &str,
) -> Result<String, ClientError> {
    let reply = client
        .call(CheckPath {
            path: Some(path.to_string()),
        })
        .await?;
    Ok(fmt.check_path(&reply))
}

/// `rescan`
pub async fn rescan(
    client: &BridgeClient,
    fmt: &Formatter,
    root: &str,
    full: bool,
) -> Result<String, ClientError> {
    let reply = client
        .call(StartRescan {
            root: Some(root.to_string()),
            full,
        })
        .await?;
    Ok(fmt.rescan(&reply))
}

/// `monitor on|off`
pub async fn set_monitoring(
    client: &BridgeClient,
    fmt: &Formatter,
    enabled: bool,
) -> Result<String, ClientError> {
    let reply = client.call(SetMonitoring { enabled }).await?;
    Ok(fmt.monitoring(&reply))
}

/// `stats`
pub async fn statistics(client: &BridgeClient, fmt: &Formatter) -> Result<String, ClientError> {
    let reply = client.call(GetStatistics {}).await?;
    Ok(fmt.statistics(&reply))
}

/// One long-poll for notifications newer than `since`.
///
/// Returns the notifications received, oldest first; empty on timeout.
pub async fn poll_notifications(
    client: &BridgeClient,
    since: i64,
    timeout: TimeDelta,
) -> Result<Vec<Notification>, ClientError> {
    let reply = client
        .call(ReceiveNotifications {
            last_seen_id: since,
            timeout,
        })
        .await?;
    Ok(reply.notifications.unwrap_or_default())
}

/// `notifications` without `--follow`: one poll, one line per notification.
pub async fn notifications(
    client: &BridgeClient,
    fmt: &Formatter,
    since: i64,
    timeout: TimeDelta,
) -> Result<String, ClientError> {
    let received = poll_notifications(client, since, timeout).await?;
    Ok(received
        .iter()
        .map(|n| fmt.notification(n))
        .collect::<Vec<_>>()
        .join("\n"))
}

/// `post`
pub async fn post(
    client: &BridgeClient,
    kind: NotificationKind,
    message: &str,
) -> Result<String, ClientError> {
    client
        .send_one_way(PostNotification {
            kind,
            message: Some(message.to_string()),
            error: None,
        })
        .await?;
    Ok(format!("posted {kind} notification"))
}
