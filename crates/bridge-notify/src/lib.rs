// SPDX-License-Identifier: MIT OR Apache-2.0
//! bridge-notify
//!
//! A capped, ordered log of [`Notification`]s with a long-poll reader.
//!
//! Producers call [`NotificationBus::post`]; consumers ask for "everything
//! after id N, waiting at most T" with [`NotificationBus::receive`]. Ids are
//! strictly increasing and never reused. Once the log exceeds its capacity
//! the oldest entries are evicted, so a slow consumer sees a gap in ids
//! rather than an error.
#![deny(unsafe_code)]
#![warn(missing_docs)]

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use bridge_protocol::Notification;
use chrono::Utc;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::debug;

/// Capacity used by [`NotificationBus::default`].
pub const DEFAULT_CAPACITY: usize = 1000;

#[derive(Debug)]
struct Log {
    last_id: i64,
    posted: u64,
    entries: VecDeque<Notification>,
}

/// Capped FIFO of notifications plus the id counter.
#[derive(Debug)]
pub struct NotificationBus {
    capacity: usize,
    log: Mutex<Log>,
    wake: Notify,
}

impl Default for NotificationBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl NotificationBus {
    /// A bus keeping at most `capacity` entries (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            log: Mutex::new(Log {
                last_id: 0,
                posted: 0,
                entries: VecDeque::with_capacity(capacity.min(1024)),
            }),
            wake: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Log> {
        self.log.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Configured capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Entries currently retained.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    /// `true` when nothing is retained.
    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    /// Highest id assigned so far (0 before the first post).
    pub fn last_id(&self) -> i64 {
        self.lock().last_id
    }

    /// Total notifications ever posted.
    pub fn posted(&self) -> u64 {
        self.lock().posted
    }

    /// Assign the next id and the current time, append, evict the oldest
    /// entries beyond capacity, and wake every waiting reader.
    ///
    /// Returns the assigned id.
    pub fn post(&self, mut notification: Notification) -> i64 {
        let id = {
            let mut log = self.lock();
            log.last_id += 1;
            log.posted += 1;
            notification.id = log.last_id;
            notification.timestamp = Utc::now();
            log.entries.push_back(notification);
            while log.entries.len() > self.capacity {
                log.entries.pop_front();
            }
            log.last_id
        };
        debug!(target: "bridge.notify", id, "notification posted");
        self.wake.notify_waiters();
        id
    }

    /// Entries with `id > last_seen_id`, in ascending id order, without
    /// waiting.
    pub fn since(&self, last_seen_id: i64) -> Vec<Notification> {
        let log = self.lock();
        // Ids ascend along the queue, so the newer entries form a suffix.
        let start = log.entries.partition_point(|n| n.id <= last_seen_id);
        log.entries.range(start..).cloned().collect()
    }

    /// Wait up to `timeout` for entries newer than `last_seen_id`.
    ///
    /// Returns as soon as at least one exists; returns an empty list when
    /// the deadline passes first.
    pub async fn receive(&self, last_seen_id: i64, timeout: Duration) -> Vec<Notification> {
        let deadline = Instant::now() + timeout;
        loop {
            let notified = self.wake.notified();
            tokio::pin!(notified);
            // Register before scanning so a post between the scan and the
            // wait is not missed.
            notified.as_mut().enable();

            let found = self.since(last_seen_id);
            if !found.is_empty() {
                return found;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Vec::new();
            }
        }
    }
}
