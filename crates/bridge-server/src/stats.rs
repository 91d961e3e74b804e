// SPDX-License-Identifier: MIT OR Apache-2.0
//! Live counters shared between the server loops and handlers.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use chrono::{DateTime, Utc};

/// Server-wide counters. Cheap to update from any task.
#[derive(Debug)]
pub struct ServerStats {
    started_at: DateTime<Utc>,
    connections_accepted: AtomicU64,
    connections_open: AtomicUsize,
    requests_handled: AtomicU64,
    requests_failed: AtomicU64,
    protocol_errors: AtomicU64,
}

/// Point-in-time copy of [`ServerStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// When the counters were created.
    pub started_at: DateTime<Utc>,
    /// Connections accepted since start.
    pub connections_accepted: u64,
    /// Connections currently live.
    pub connections_open: usize,
    /// Requests dispatched to a handler.
    pub requests_handled: u64,
    /// Requests whose handler returned an error or panicked.
    pub requests_failed: u64,
    /// Connections dropped for a transport or protocol error.
    pub protocol_errors: u64,
}

impl Default for ServerStats {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerStats {
    /// Fresh counters, started now.
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            connections_accepted: AtomicU64::new(0),
            connections_open: AtomicUsize::new(0),
            requests_handled: AtomicU64::new(0),
            requests_failed: AtomicU64::new(0),
            protocol_errors: AtomicU64::new(0),
        }
    }

    /// Start time.
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub(crate) fn connection_opened(&self) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
        self.connections_open.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn connections_closed(&self, n: usize) {
        self.connections_open.fetch_sub(n, Ordering::Relaxed);
    }

    pub(crate) fn request_handled(&self) {
        self.requests_handled.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn request_failed(&self) {
        self.requests_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn protocol_error(&self) {
        self.protocol_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Read every counter.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            started_at: self.started_at,
            connections_accepted: self.connections_accepted.load(Ordering::Relaxed),
            connections_open: self.connections_open.load(Ordering::Relaxed),
            requests_handled: self.requests_handled.load(Ordering::Relaxed),
            requests_failed: self.requests_failed.load(Ordering::Relaxed),
            protocol_errors: self.protocol_errors.load(Ordering::Relaxed),
        }
    }
}
