// SPDX-License-Identifier: MIT OR Apache-2.0
//! Shared state behind the built-in handlers.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use bridge_config::BridgeConfig;
use bridge_notify::NotificationBus;
use bridge_server::ServerStats;

/// State shared by every built-in handler.
#[derive(Debug)]
pub struct DaemonState {
    watch_roots: Vec<PathBuf>,
    monitoring: AtomicBool,
    bus: Arc<NotificationBus>,
    stats: Arc<ServerStats>,
    max_poll: Duration,
}

impl DaemonState {
    /// State with monitoring enabled.
    pub fn new(
        watch_roots: Vec<PathBuf>,
        bus: Arc<NotificationBus>,
        stats: Arc<ServerStats>,
        max_poll: Duration,
    ) -> Self {
        Self {
            watch_roots,
            monitoring: AtomicBool::new(true),
            bus,
            stats,
            max_poll,
        }
    }

    /// State sized and rooted from `config`, with fresh counters.
    pub fn from_config(config: &BridgeConfig) -> Self {
        Self::new(
            config.watch_root_paths(),
            Arc::new(NotificationBus::new(config.notification_capacity())),
            Arc::new(ServerStats::new()),
            config.notification_poll_timeout(),
        )
    }

    /// Configured watch roots.
    pub fn watch_roots(&self) -> &[PathBuf] {
        &self.watch_roots
    }

    /// The most specific watch root containing `path`.
    ///
    /// Matching is lexical, so a path with a `..` component is never inside
    /// a root.
    pub fn root_for(&self, path: &Path) -> Option<&Path> {
        if path.components().any(|c| matches!(c, Component::ParentDir)) {
            return None;
        }
        self.watch_roots
            .iter()
            .filter(|root| path.starts_with(root))
            .max_by_key(|root| root.components().count())
            .map(PathBuf::as_path)
    }

    /// Current monitoring switch.
    pub fn monitoring_enabled(&self) -> bool {
        self.monitoring.load(Ordering::SeqCst)
    }

    /// Set the monitoring switch, returning its previous value.
    pub fn set_monitoring(&self, enabled: bool) -> bool {
        self.monitoring.swap(enabled, Ordering::SeqCst)
    }

    /// The notification bus.
    pub fn bus(&self) -> &Arc<NotificationBus> {
        &self.bus
    }

    /// Server counters.
    pub fn stats(&self) -> &Arc<ServerStats> {
        &self.stats
    }

    /// Upper bound on one notification long-poll.
    pub fn max_poll(&self) -> Duration {
        self.max_poll
    }
}
