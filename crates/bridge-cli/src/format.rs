// SPDX-License-Identifier: MIT OR Apache-2.0
//! Output formatting for CLI replies.

use bridge_protocol::{
    CheckPathResponse, ErrorInfo, GetStatisticsResponse, Notification, PingResponse,
    SetMonitoringResponse, StartRescanResponse,
};
use chrono::{SecondsFormat, TimeDelta};
use serde_json::{Value as JsonValue, json};

/// Supported output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable text.
    Text,
    /// One JSON object per line.
    Json,
}

/// Renders replies in the configured format.
#[derive(Debug, Clone, Copy)]
pub struct Formatter {
    format: OutputFormat,
}

fn seconds(delta: TimeDelta) -> f64 {
    delta.num_milliseconds() as f64 / 1000.0
}

impl Formatter {
    /// Create a formatter.
    #[must_use]
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// JSON when `json` is set, text otherwise.
    #[must_use]
    pub fn from_flag(json: bool) -> Self {
        Self::new(if json {
            OutputFormat::Json
        } else {
            OutputFormat::Text
        })
    }

    fn pick(&self, text: impl FnOnce() -> String, value: impl FnOnce() -> JsonValue) -> String {
        match self.format {
            OutputFormat::Text => text(),
            OutputFormat::Json => value().to_string(),
        }
    }

    /// Format a [`PingResponse`].
    #[must_use]
    pub fn ping(&self, resp: &PingResponse) -> String {
        self.pick(
            || {
                format!(
                    "pong{} (server time {}, up {:.3}s)",
                    resp.payload
                        .as_deref()
                        .map(|p| format!(": {p}"))
                        .unwrap_or_default(),
                    resp.server_time.to_rfc3339_opts(SecondsFormat::Secs, true),
                    seconds(resp.uptime)
                )
            },
            || {
                json!({
                    "payload": resp.payload,
                    "server_time": resp.server_time.to_rfc3339(),
                    "uptime_secs": seconds(resp.uptime),
                })
            },
        )
    }

    /// Format a [`CheckPathResponse`].
    #[must_use]
    pub fn check_path(&self, resp: &CheckPathResponse) -> String {
        let path = resp.path.as_deref().unwrap_or("");
        self.pick(
            || match &resp.root {
                Some(root) => format!("{path}: monitored (root {root})"),
                None => format!("{path}: not monitored"),
            },
            || {
                json!({
                    "path": resp.path,
                    "monitored": resp.monitored,
                    "root": resp.root,
                })
            },
        )
    }

    /// Format a [`StartRescanResponse`].
    #[must_use]
    pub fn rescan(&self, resp: &StartRescanResponse) -> String {
        self.pick(
            || {
                format!(
                    "rescanned {}: {} files, {} bytes in {:.3}s",
                    resp.root.as_deref().unwrap_or(""),
                    resp.files_scanned,
                    resp.bytes_scanned,
                    seconds(resp.elapsed)
                )
            },
            || {
                json!({
                    "root": resp.root,
                    "files_scanned": resp.files_scanned,
                    "bytes_scanned": resp.bytes_scanned,
                    "elapsed_secs": seconds(resp.elapsed),
                })
            },
        )
    }

    /// Format a [`SetMonitoringResponse`].
    #[must_use]
    pub fn monitoring(&self, resp: &SetMonitoringResponse) -> String {
        let word = |on: bool| if on { "on" } else { "off" };
        self.pick(
            || {
                if resp.enabled == resp.previous {
                    format!("monitoring already {}", word(resp.enabled))
                } else {
                    format!("monitoring {} (was {})", word(resp.enabled), word(resp.previous))
                }
            },
            || json!({ "enabled": resp.enabled, "previous": resp.previous }),
        )
    }

    /// Format a [`GetStatisticsResponse`] as aligned key/value lines.
    #[must_use]
    pub fn statistics(&self, resp: &GetStatisticsResponse) -> String {
        let started = resp.started_at.to_rfc3339_opts(SecondsFormat::Secs, true);
        self.pick(
            || {
                let rows = [
                    ("started_at", started.clone()),
                    ("monitoring", resp.monitoring_enabled.to_string()),
                    ("connections_open", resp.connections_open.to_string()),
                    ("connections_accepted", resp.connections_accepted.to_string()),
                    ("requests_handled", resp.requests_handled.to_string()),
                    ("requests_failed", resp.requests_failed.to_string()),
                    ("protocol_errors", resp.protocol_errors.to_string()),
                    ("notifications_posted", resp.notifications_posted.to_string()),
                ];
                rows.iter()
                    .map(|(k, v)| format!("{k:<22}{v}"))
                    .collect::<Vec<_>>()
                    .join("\n")
            },
            || {
                json!({
                    "started_at": started,
                    "monitoring_enabled": resp.monitoring_enabled,
                    "connections_open": resp.connections_open,
                    "connections_accepted": resp.connections_accepted,
                    "requests_handled": resp.requests_handled,
                    "requests_failed": resp.requests_failed,
                    "protocol_errors": resp.protocol_errors,
                    "notifications_posted": resp.notifications_posted,
                })
            },
        )
    }

    /// Format one [`Notification`].
    #[must_use]
    pub fn notification(&self, n: &Notification) -> String {
        self.pick(
            || {
                let mut line = format!(
                    "#{} {} [{}] {}",
                    n.id,
                    n.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
                    n.kind,
                    n.message.as_deref().unwrap_or("")
                );
                if let Some(error) = &n.error {
                    for row in error.render().lines() {
                        line.push_str("\n    ");
                        line.push_str(row);
                    }
                }
                line
            },
            || {
                json!({
                    "id": n.id,
                    "timestamp": n.timestamp.to_rfc3339(),
                    "kind": n.kind.as_str(),
                    "message": n.message,
                    "error": n.error.as_ref().map(error_json),
                })
            },
        )
    }

    /// Format a remote failure for stderr.
    #[must_use]
    pub fn remote_error(&self, error: &ErrorInfo) -> String {
        self.pick(
            || format!("remote call failed:\n{}", error.render().trim_end()),
            || json!({ "error": error_json(error) }),
        )
    }
}

/// An [`ErrorInfo`] tree as JSON.
pub fn error_json(error: &ErrorInfo) -> JsonValue {
    json!({
        "message": error.message,
        "source": error.source,
        "stack": error.stack,
        "inner": error.inner.as_deref().map(error_json),
        "inner_errors": error
            .inner_errors
            .as_ref()
            .map(|list| list.iter().map(error_json).collect::<Vec<_>>()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_protocol::NotificationKind;
    use chrono::{TimeZone, Utc};

    fn text() -> Formatter {
        Formatter::new(OutputFormat::Text)
    }

    fn json_fmt() -> Formatter {
        Formatter::new(OutputFormat::Json)
    }

    #[test]
    fn check_path_text_and_json() {
        let resp = CheckPathResponse {
            path: Some("/home/u/a".into()),
            monitored: true,
            root: Some("/home".into()),
            error: None,
        };
        assert_eq!(text().check_path(&resp), "/home/u/a: monitored (root /home)");
        let v: JsonValue = serde_json::from_str(&json_fmt().check_path(&resp)).unwrap();
        assert_eq!(v["monitored"], true);
        assert_eq!(v["root"], "/home");
    }

    #[test]
    fn rescan_elapsed_in_seconds() {
        let resp = StartRescanResponse {
            root: Some("/srv".into()),
            files_scanned: 4,
            bytes_scanned: 2048,
            elapsed: TimeDelta::milliseconds(1500),
            error: None,
        };
        assert_eq!(text().rescan(&resp), "rescanned /srv: 4 files, 2048 bytes in 1.500s");
    }

    #[test]
    fn monitoring_wording() {
        let unchanged = SetMonitoringResponse {
            enabled: true,
            previous: true,
            error: None,
        };
        assert_eq!(text().monitoring(&unchanged), "monitoring already on");
        let changed = SetMonitoringResponse {
            enabled: false,
            previous: true,
            error: None,
        };
        assert_eq!(text().monitoring(&changed), "monitoring off (was on)");
    }

    #[test]
    fn notification_with_error_is_indented() {
        let n = Notification {
            id: 7,
            timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
            kind: NotificationKind::Error,
            message: Some("rescan failed".into()),
            error: Some(ErrorInfo::new("disk gone").with_inner(ErrorInfo::new("EIO"))),
        };
        let out = text().notification(&n);
        let lines: Vec<_> = out.lines().collect();
        assert_eq!(lines[0], "#7 2024-05-01T12:00:00Z [error] rescan failed");
        assert_eq!(lines[1], "    disk gone");
        assert_eq!(lines[2], "    caused by:");
        assert_eq!(lines[3], "      EIO");

        let v: JsonValue = serde_json::from_str(&json_fmt().notification(&n)).unwrap();
        assert_eq!(v["kind"], "error");
        assert_eq!(v["error"]["inner"]["message"], "EIO");
    }

    #[test]
    fn statistics_rows_align() {
        let out = text().statistics(&GetStatisticsResponse::default());
        assert!(out.lines().all(|l| l.len() > 22));
        assert!(out.contains("requests_handled      0"));
    }
}
