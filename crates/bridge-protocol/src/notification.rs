// SPDX-License-Identifier: MIT OR Apache-2.0
//! Asynchronous notices delivered over the long-poll notification request.

use std::fmt;
use std::str::FromStr;

use bridge_wire::{wire_enum, wire_message};
use chrono::{DateTime, Utc};

use crate::ErrorInfo;

wire_enum! {
    /// What a [`Notification`] is about.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
    pub enum NotificationKind {
        /// General information.
        #[default]
        Info = 0,
        /// Something degraded but kept working.
        Warning = 1,
        /// Something failed.
        Error = 2,
        /// A rescan began.
        RescanStarted = 3,
        /// A rescan finished.
        RescanCompleted = 4,
        /// Filesystem monitoring was switched on or off.
        MonitoringChanged = 5,
    }
}

impl NotificationKind {
    /// Lower-case label used by the CLI.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::RescanStarted => "rescan-started",
            Self::RescanCompleted => "rescan-completed",
            Self::MonitoringChanged => "monitoring-changed",
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|k| k.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown notification kind '{s}'"))
    }
}

wire_message! {
    /// One entry of the notification log.
    ///
    /// `id` and `timestamp` are assigned by the bus when the notification is
    /// posted; ids are strictly increasing and never reused.
    #[derive(Debug, Clone, Default, PartialEq)]
    pub struct Notification {
        /// Bus-assigned sequence number.
        pub id: i64 = 1,
        /// When the bus accepted it.
        pub timestamp: DateTime<Utc> = 2,
        /// Event category.
        pub kind: NotificationKind = 3,
        /// Free-text summary.
        pub message: Option<String> = 4,
        /// Attached failure, for error notices.
        pub error: Option<ErrorInfo> = 5,
    }
}

impl Notification {
    /// A notification ready to post; the bus fills in `id` and `timestamp`.
    pub fn new(kind: NotificationKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: Some(message.into()),
            ..Self::default()
        }
    }

    /// Attach a failure.
    #[must_use]
    pub fn with_error(mut self, error: ErrorInfo) -> Self {
        self.error = Some(error);
        self
    }
}
