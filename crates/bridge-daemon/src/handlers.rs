// SPDX-License-Identifier: MIT OR Apache-2.0
//! Built-in request handlers.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, bail};
use async_trait::async_trait;
use bridge_protocol::{
    Acknowledge, CheckPath, CheckPathResponse, ErrorInfo, GetStatistics, GetStatisticsResponse,
    Notification, NotificationKind, Ping, PingResponse, PostNotification, ReceiveNotifications,
    ReceiveNotificationsResponse, SetMonitoring, SetMonitoringResponse, StartRescan,
    StartRescanResponse,
};
use bridge_server::RequestHandler;
use chrono::{TimeDelta, Utc};
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::DaemonState;

// ---------------------------------------------------------------------------
// Ping
// ---------------------------------------------------------------------------

/// Echoes the payload with the server clock and uptime.
#[derive(Debug)]
pub struct PingHandler(pub Arc<DaemonState>);

#[async_trait]
impl RequestHandler for PingHandler {
    type Request = Ping;

    async fn handle(&self, request: Ping) -> anyhow::Result<Option<PingResponse>> {
        let now = Utc::now();
        Ok(Some(PingResponse {
            payload: request.payload,
            server_time: now,
            uptime: now - self.0.stats().started_at(),
            error: None,
        }))
    }
}

// ---------------------------------------------------------------------------
// CheckPath
// ---------------------------------------------------------------------------

/// Reports whether a path lies under a watch root.
#[derive(Debug)]
pub struct CheckPathHandler(pub Arc<DaemonState>);

#[async_trait]
impl RequestHandler for CheckPathHandler {
    type Request = CheckPath;

    async fn handle(&self, request: CheckPath) -> anyhow::Result<Option<CheckPathResponse>> {
        let Some(path) = request.path else {
            bail!("path is required");
        };
        if !Path::new(&path).is_absolute() {
            bail!("path must be absolute: {path}");
        }
        let root = self
            .0
            .root_for(Path::new(&path))
            .map(|r| r.display().to_string());
        Ok(Some(CheckPathResponse {
            monitored: root.is_some(),
            root,
            path: Some(path),
            error: None,
        }))
    }
}

// ---------------------------------------------------------------------------
// StartRescan
// ---------------------------------------------------------------------------

/// Walks a watch root and reports what it found. Long-running.
#[derive(Debug)]
pub struct StartRescanHandler(pub Arc<DaemonState>);

#[derive(Debug, Default)]
struct ScanTotals {
    files: u64,
    bytes: u64,
    skipped: u64,
}

fn scan(root: &Path) -> ScanTotals {
    let mut totals = ScanTotals::default();
    for entry in WalkDir::new(root).follow_links(false) {
        match entry {
            Ok(entry) if entry.file_type().is_file() => {
                totals.files += 1;
                totals.bytes += entry.metadata().map(|m| m.len()).unwrap_or(0);
            }
            Ok(_) => {}
            Err(e) => {
                debug!(target: "bridge.daemon", error = %e, "skipping unreadable entry");
                totals.skipped += 1;
            }
        }
    }
    totals
}

impl StartRescanHandler {
    async fn rescan(&self, request: StartRescan) -> anyhow::Result<StartRescanResponse> {
        let Some(root) = request.root else {
            bail!("root is required");
        };
        let root_path = PathBuf::from(&root);
        if self.0.root_for(&root_path).is_none() {
            bail!("{root} is not under a configured watch root");
        }
        let meta = tokio::fs::metadata(&root_path)
            .await
            .with_context(|| format!("cannot rescan {root}"))?;
        if !meta.is_dir() {
            bail!("{root} is not a directory");
        }

        let label = if request.full { "full rescan" } else { "rescan" };
        self.0.bus().post(Notification::new(
            NotificationKind::RescanStarted,
            format!("{label} of {root} started"),
        ));
        info!(target: "bridge.daemon", root = %root, full = request.full, "rescan started");

        let started = Instant::now();
        let walk_root = root_path.clone();
        let totals = tokio::task::spawn_blocking(move || scan(&walk_root))
            .await
            .context("rescan worker failed")?;
        let elapsed = started.elapsed();

        self.0.bus().post(Notification::new(
            NotificationKind::RescanCompleted,
            format!(
                "{label} of {root} completed: {} files, {} bytes",
                totals.files, totals.bytes
            ),
        ));
        info!(
            target: "bridge.daemon",
            root = %root,
            files = totals.files,
            bytes = totals.bytes,
            skipped = totals.skipped,
            "rescan completed"
        );

        Ok(StartRescanResponse {
            root: Some(root),
            files_scanned: i64::try_from(totals.files).unwrap_or(i64::MAX),
            bytes_scanned: i64::try_from(totals.bytes).unwrap_or(i64::MAX),
            elapsed: TimeDelta::from_std(elapsed).unwrap_or(TimeDelta::MAX),
            error: None,
        })
    }
}

#[async_trait]
impl RequestHandler for StartRescanHandler {
    type Request = StartRescan;

    fn is_long_running(&self) -> bool {
        true
    }

    async fn handle(&self, request: StartRescan) -> anyhow::Result<Option<StartRescanResponse>> {
        match self.rescan(request).await {
            Ok(response) => Ok(Some(response)),
            Err(e) => {
                self.0.bus().post(
                    Notification::new(NotificationKind::Error, "rescan failed")
                        .with_error(ErrorInfo::from_anyhow(&e)),
                );
                Err(e)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// SetMonitoring
// ---------------------------------------------------------------------------

/// Flips the monitoring switch.
#[derive(Debug)]
pub struct SetMonitoringHandler(pub Arc<DaemonState>);

#[async_trait]
impl RequestHandler for SetMonitoringHandler {
    type Request = SetMonitoring;

    async fn handle(&self, request: SetMonitoring) -> anyhow::Result<Option<SetMonitoringResponse>> {
        let previous = self.0.set_monitoring(request.enabled);
        if previous != request.enabled {
            let state = if request.enabled { "enabled" } else { "disabled" };
            self.0.bus().post(Notification::new(
                NotificationKind::MonitoringChanged,
                format!("monitoring {state}"),
            ));
            info!(target: "bridge.daemon", enabled = request.enabled, "monitoring changed");
        }
        Ok(Some(SetMonitoringResponse {
            enabled: request.enabled,
            previous,
            error: None,
        }))
    }
}

// ---------------------------------------------------------------------------
// GetStatistics
// ---------------------------------------------------------------------------

/// Reports server counters and daemon state.
#[derive(Debug)]
pub struct GetStatisticsHandler(pub Arc<DaemonState>);

#[async_trait]
impl RequestHandler for GetStatisticsHandler {
    type Request = GetStatistics;

    async fn handle(&self, _request: GetStatistics) -> anyhow::Result<Option<GetStatisticsResponse>> {
        let snap = self.0.stats().snapshot();
        Ok(Some(GetStatisticsResponse {
            connections_open: i32::try_from(snap.connections_open).unwrap_or(i32::MAX),
            connections_accepted: i64::try_from(snap.connections_accepted).unwrap_or(i64::MAX),
            requests_handled: i64::try_from(snap.requests_handled).unwrap_or(i64::MAX),
            requests_failed: i64::try_from(snap.requests_failed).unwrap_or(i64::MAX),
            protocol_errors: i64::try_from(snap.protocol_errors).unwrap_or(i64::MAX),
            notifications_posted: i64::try_from(self.0.bus().posted()).unwrap_or(i64::MAX),
            monitoring_enabled: self.0.monitoring_enabled(),
            started_at: snap.started_at,
            error: None,
        }))
    }
}

// ---------------------------------------------------------------------------
// Notifications
// ---------------------------------------------------------------------------

/// Long-polls the bus. Long-running.
#[derive(Debug)]
pub struct ReceiveNotificationsHandler(pub Arc<DaemonState>);

#[async_trait]
impl RequestHandler for ReceiveNotificationsHandler {
    type Request = ReceiveNotifications;

    fn is_long_running(&self) -> bool {
        true
    }

    async fn handle(
        &self,
        request: ReceiveNotifications,
    ) -> anyhow::Result<Option<ReceiveNotificationsResponse>> {
        // Negative timeouts mean "don't wait".
        let timeout = request
            .timeout
            .to_std()
            .unwrap_or_default()
            .min(self.0.max_poll());
        let found = self.0.bus().receive(request.last_seen_id, timeout).await;
        debug!(target: "bridge.daemon", last_seen_id = request.last_seen_id, found = found.len(), "notification poll");
        Ok(Some(ReceiveNotificationsResponse {
            notifications: (!found.is_empty()).then_some(found),
            error: None,
        }))
    }
}

/// Posts a notification to the bus. One-way.
#[derive(Debug)]
pub struct PostNotificationHandler(pub Arc<DaemonState>);

#[async_trait]
impl RequestHandler for PostNotificationHandler {
    type Request = PostNotification;

    async fn handle(&self, request: PostNotification) -> anyhow::Result<Option<Acknowledge>> {
        let id = self.0.bus().post(Notification {
            kind: request.kind,
            message: request.message,
            error: request.error,
            ..Notification::default()
        });
        debug!(target: "bridge.daemon", id, "notification accepted");
        Ok(None)
    }
}
