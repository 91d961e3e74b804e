// SPDX-License-Identifier: MIT OR Apache-2.0
//! Configuration loading, validation, and merging for the backup bridge.
//!
//! This crate provides [`BridgeConfig`], the daemon's listener and resource
//! settings, together with helpers for loading from TOML files, applying
//! environment overrides, merging overlays, and producing advisory
//! [`ConfigWarning`]s.
#![deny(unsafe_code)]
#![warn(missing_docs)]

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur during configuration loading or validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The requested configuration file could not be read.
    #[error("config file not found: {path}")]
    FileNotFound {
        /// Path that was requested.
        path: String,
    },

    /// The file could not be parsed as valid TOML.
    #[error("failed to parse config: {reason}")]
    ParseError {
        /// Human-readable parse error detail.
        reason: String,
    },

    /// Semantic validation failed (one or more problems).
    #[error("config validation failed: {}", reasons.join("; "))]
    ValidationError {
        /// Individual validation failure messages.
        reasons: Vec<String>,
    },
}

// ---------------------------------------------------------------------------
// Warnings
// ---------------------------------------------------------------------------

/// Advisory-level issues that do not prevent operation but deserve attention.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigWarning {
    /// A recommended optional field is missing.
    MissingOptionalField {
        /// Name of the missing field.
        field: String,
        /// Why it matters.
        hint: String,
    },
    /// TCP is bound to an address reachable from other hosts.
    NonLoopbackTcp {
        /// The configured address.
        addr: String,
    },
    /// A timeout is unusually large.
    LargeTimeout {
        /// Field name.
        field: String,
        /// Value in milliseconds.
        millis: u64,
    },
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigWarning::MissingOptionalField { field, hint } => {
                write!(f, "missing optional field '{field}': {hint}")
            }
            ConfigWarning::NonLoopbackTcp { addr } => {
                write!(f, "tcp_bind '{addr}' is not a loopback address")
            }
            ConfigWarning::LargeTimeout { field, millis } => {
                write!(f, "'{field}' is unusually large ({millis}ms)")
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Default readiness wait bound for the server loops.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 250;

/// Default frame size limit (16 MiB), matching the protocol default.
pub const DEFAULT_MAX_FRAME_BYTES: u64 = 16 * 1024 * 1024;

/// Default number of notifications retained by the bus.
pub const DEFAULT_NOTIFICATION_CAPACITY: u64 = 1000;

/// Default cap on a single notification long-poll.
pub const DEFAULT_NOTIFICATION_POLL_TIMEOUT_MS: u64 = 30_000;

/// Largest frame limit accepted (256 MiB).
const MAX_FRAME_LIMIT: u64 = 256 * 1024 * 1024;

/// Largest notification capacity accepted.
const MAX_NOTIFICATION_CAPACITY: u64 = 1_000_000;

/// Long-poll caps above this generate a warning (10 minutes).
const LARGE_POLL_TIMEOUT_MS: u64 = 600_000;

/// Recognised log levels.
const VALID_LOG_LEVELS: &[&str] = &["error", "warn", "info", "debug", "trace"];

/// Environment variables consulted by [`apply_env_overrides`].
pub const ENV_SOCKET: &str = "BACKUP_BRIDGE_SOCKET";
/// See [`ENV_SOCKET`].
pub const ENV_TCP: &str = "BACKUP_BRIDGE_TCP";
/// See [`ENV_SOCKET`].
pub const ENV_PORT_FILE: &str = "BACKUP_BRIDGE_PORT_FILE";
/// See [`ENV_SOCKET`].
pub const ENV_LOG_LEVEL: &str = "BACKUP_BRIDGE_LOG_LEVEL";

// ---------------------------------------------------------------------------
// Config type
// ---------------------------------------------------------------------------

/// Top-level configuration for the bridge daemon.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct BridgeConfig {
    /// Unix-domain socket path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unix_socket: Option<String>,

    /// TCP bind address, e.g. `"127.0.0.1:0"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tcp_bind: Option<String>,

    /// File receiving the bound TCP port.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port_file: Option<String>,

    /// Log level (e.g. `"debug"`, `"info"`, `"warn"`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,

    /// Readiness wait bound in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poll_interval_ms: Option<u64>,

    /// Largest accepted frame in bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_frame_bytes: Option<u64>,

    /// Notifications retained by the bus.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notification_capacity: Option<u64>,

    /// Upper bound on one notification long-poll, in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notification_poll_timeout_ms: Option<u64>,

    /// Directories covered by monitoring and rescans.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub watch_roots: Vec<String>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            unix_socket: None,
            tcp_bind: None,
            port_file: None,
            log_level: Some("info".into()),
            poll_interval_ms: None,
            max_frame_bytes: None,
            notification_capacity: None,
            notification_poll_timeout_ms: None,
            watch_roots: Vec::new(),
        }
    }
}

impl BridgeConfig {
    /// Effective log level.
    pub fn log_level(&self) -> &str {
        self.log_level.as_deref().unwrap_or("info")
    }

    /// Unix socket path, if configured.
    pub fn unix_socket_path(&self) -> Option<PathBuf> {
        self.unix_socket.as_ref().map(PathBuf::from)
    }

    /// Port file path, if configured.
    pub fn port_file_path(&self) -> Option<PathBuf> {
        self.port_file.as_ref().map(PathBuf::from)
    }

    /// Parsed TCP bind address.
    pub fn tcp_addr(&self) -> Result<Option<SocketAddr>, ConfigError> {
        self.tcp_bind
            .as_deref()
            .map(|raw| {
                raw.parse().map_err(|_| ConfigError::ValidationError {
                    reasons: vec![format!("invalid tcp_bind '{raw}'")],
                })
            })
            .transpose()
    }

    /// Effective readiness wait bound.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.unwrap_or(DEFAULT_POLL_INTERVAL_MS))
    }

    /// Effective frame size limit.
    pub fn max_frame_bytes(&self) -> usize {
        to_usize(self.max_frame_bytes.unwrap_or(DEFAULT_MAX_FRAME_BYTES))
    }

    /// Effective notification capacity.
    pub fn notification_capacity(&self) -> usize {
        to_usize(
            self.notification_capacity
                .unwrap_or(DEFAULT_NOTIFICATION_CAPACITY),
        )
    }

    /// Effective long-poll cap.
    pub fn notification_poll_timeout(&self) -> Duration {
        Duration::from_millis(
            self.notification_poll_timeout_ms
                .unwrap_or(DEFAULT_NOTIFICATION_POLL_TIMEOUT_MS),
        )
    }

    /// Watch roots as paths.
    pub fn watch_root_paths(&self) -> Vec<PathBuf> {
        self.watch_roots.iter().map(PathBuf::from).collect()
    }
}

fn to_usize(value: u64) -> usize {
    usize::try_from(value).unwrap_or(usize::MAX)
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Load a [`BridgeConfig`] from an optional TOML file path.
///
/// * If `path` is `Some`, reads and parses the file.
/// * If `path` is `None`, returns [`BridgeConfig::default()`].
///
/// Environment variable overrides are applied on top in both cases.
pub fn load_config(path: Option<&Path>) -> Result<BridgeConfig, ConfigError> {
    let mut config = match path {
        Some(p) => {
            let content = std::fs::read_to_string(p).map_err(|_| ConfigError::FileNotFound {
                path: p.display().to_string(),
            })?;
            parse_toml(&content)?
        }
        None => BridgeConfig::default(),
    };
    apply_env_overrides(&mut config);
    Ok(config)
}

/// Parse a TOML string into a [`BridgeConfig`].
pub fn parse_toml(content: &str) -> Result<BridgeConfig, ConfigError> {
    toml::from_str::<BridgeConfig>(content).map_err(|e| ConfigError::ParseError {
        reason: e.to_string(),
    })
}

// ---------------------------------------------------------------------------
// Env overrides
// ---------------------------------------------------------------------------

/// Apply environment variable overrides.
///
/// Recognised variables:
/// - `BACKUP_BRIDGE_SOCKET`
/// - `BACKUP_BRIDGE_TCP`
/// - `BACKUP_BRIDGE_PORT_FILE`
/// - `BACKUP_BRIDGE_LOG_LEVEL`
pub fn apply_env_overrides(config: &mut BridgeConfig) {
    apply_overrides_from(config, |key| std::env::var(key).ok());
}

/// [`apply_env_overrides`] with an explicit variable source.
pub fn apply_overrides_from(config: &mut BridgeConfig, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(val) = lookup(ENV_SOCKET) {
        config.unix_socket = Some(val);
    }
    if let Some(val) = lookup(ENV_TCP) {
        config.tcp_bind = Some(val);
    }
    if let Some(val) = lookup(ENV_PORT_FILE) {
        config.port_file = Some(val);
    }
    if let Some(val) = lookup(ENV_LOG_LEVEL) {
        config.log_level = Some(val);
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validate a configuration, returning advisory warnings.
///
/// Hard errors (no listener, unparsable address, out-of-range limits) are
/// returned as a [`ConfigError::ValidationError`]; soft issues come back as
/// warnings.
pub fn validate_config(config: &BridgeConfig) -> Result<Vec<ConfigWarning>, ConfigError> {
    let mut errors: Vec<String> = Vec::new();
    let mut warnings: Vec<ConfigWarning> = Vec::new();

    if let Some(level) = &config.log_level {
        if !VALID_LOG_LEVELS.contains(&level.as_str()) {
            errors.push(format!("invalid log_level '{level}'"));
        }
    }

    if config.unix_socket.is_none() && config.tcp_bind.is_none() {
        errors.push("no listener configured: set unix_socket and/or tcp_bind".into());
    }
    if let Some(path) = &config.unix_socket {
        if path.trim().is_empty() {
            errors.push("unix_socket must not be empty".into());
        }
    }

    if let Some(raw) = &config.tcp_bind {
        match raw.parse::<SocketAddr>() {
            Ok(addr) => {
                if !addr.ip().is_loopback() {
                    warnings.push(ConfigWarning::NonLoopbackTcp { addr: raw.clone() });
                }
                if addr.port() == 0 && config.port_file.is_none() {
                    warnings.push(ConfigWarning::MissingOptionalField {
                        field: "port_file".into(),
                        hint: "tcp port 0 is chosen at startup and will not be discoverable".into(),
                    });
                }
            }
            Err(_) => errors.push(format!("invalid tcp_bind '{raw}'")),
        }
    }

    if config.poll_interval_ms == Some(0) {
        errors.push("poll_interval_ms must be greater than zero".into());
    }
    if let Some(max) = config.max_frame_bytes {
        if max == 0 || max > MAX_FRAME_LIMIT {
            errors.push(format!(
                "max_frame_bytes {max} out of range (1..={MAX_FRAME_LIMIT})"
            ));
        }
    }
    if let Some(cap) = config.notification_capacity {
        if cap == 0 || cap > MAX_NOTIFICATION_CAPACITY {
            errors.push(format!(
                "notification_capacity {cap} out of range (1..={MAX_NOTIFICATION_CAPACITY})"
            ));
        }
    }
    if let Some(ms) = config.notification_poll_timeout_ms {
        if ms > LARGE_POLL_TIMEOUT_MS {
            warnings.push(ConfigWarning::LargeTimeout {
                field: "notification_poll_timeout_ms".into(),
                millis: ms,
            });
        }
    }

    if config.watch_roots.is_empty() {
        warnings.push(ConfigWarning::MissingOptionalField {
            field: "watch_roots".into(),
            hint: "no path will be reported as monitored and rescans will fail".into(),
        });
    }
    if config.watch_roots.iter().any(|r| r.trim().is_empty()) {
        errors.push("watch_roots entries must not be empty".into());
    }

    if errors.is_empty() {
        Ok(warnings)
    } else {
        Err(ConfigError::ValidationError { reasons: errors })
    }
}

// ---------------------------------------------------------------------------
// Merging
// ---------------------------------------------------------------------------

/// Merge two configurations. Values in `overlay` take precedence over `base`.
///
/// Watch roots are concatenated, base first, with duplicates removed.
pub fn merge_configs(base: BridgeConfig, overlay: BridgeConfig) -> BridgeConfig {
    let mut watch_roots = base.watch_roots;
    for root in overlay.watch_roots {
        if !watch_roots.contains(&root) {
            watch_roots.push(root);
        }
    }
    BridgeConfig {
        unix_socket: overlay.unix_socket.or(base.unix_socket),
        tcp_bind: overlay.tcp_bind.or(base.tcp_bind),
        port_file: overlay.port_file.or(base.port_file),
        log_level: overlay.log_level.or(base.log_level),
        poll_interval_ms: overlay.poll_interval_ms.or(base.poll_interval_ms),
        max_frame_bytes: overlay.max_frame_bytes.or(base.max_frame_bytes),
        notification_capacity: overlay.notification_capacity.or(base.notification_capacity),
        notification_poll_timeout_ms: overlay
            .notification_poll_timeout_ms
            .or(base.notification_poll_timeout_ms),
        watch_roots,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn listening() -> BridgeConfig {
        BridgeConfig {
            unix_socket: Some("/run/backup/bridge.sock".into()),
            watch_roots: vec!["/home".into()],
            ..Default::default()
        }
    }

    // -- 1. Default config needs a listener ----------------------------------

    #[test]
    fn default_config_has_no_listener() {
        let err = validate_config(&BridgeConfig::default()).unwrap_err();
        match err {
            ConfigError::ValidationError { reasons } => {
                assert!(reasons.iter().any(|r| r.contains("no listener")));
            }
            other => panic!("expected ValidationError, got {other:?}"),
        }
    }

    // -- 2. Defaults for unset fields ----------------------------------------

    #[test]
    fn effective_defaults() {
        let cfg = BridgeConfig::default();
        assert_eq!(cfg.log_level(), "info");
        assert_eq!(cfg.poll_interval(), Duration::from_millis(250));
        assert_eq!(cfg.max_frame_bytes(), 16 * 1024 * 1024);
        assert_eq!(cfg.notification_capacity(), 1000);
        assert_eq!(cfg.notification_poll_timeout(), Duration::from_secs(30));
        assert_eq!(cfg.tcp_addr().unwrap(), None);
    }

    // -- 3. Parse a full TOML document ---------------------------------------

    #[test]
    fn parse_valid_toml_string() {
        let toml = r#"
            unix_socket = "/run/backup/bridge.sock"
            tcp_bind = "127.0.0.1:0"
            port_file = "/run/backup/bridge.port"
            log_level = "debug"
            poll_interval_ms = 100
            watch_roots = ["/home", "/srv"]
        "#;
        let cfg = parse_toml(toml).unwrap();
        assert_eq!(cfg.unix_socket.as_deref(), Some("/run/backup/bridge.sock"));
        assert_eq!(cfg.tcp_addr().unwrap().unwrap().port(), 0);
        assert_eq!(cfg.poll_interval(), Duration::from_millis(100));
        assert_eq!(cfg.watch_roots.len(), 2);
        assert!(validate_config(&cfg).unwrap().is_empty());
    }

    // -- 4. Invalid TOML and wrong types -------------------------------------

    #[test]
    fn parse_errors() {
        assert!(matches!(
            parse_toml("this is [not valid toml ="),
            Err(ConfigError::ParseError { .. })
        ));
        assert!(matches!(
            parse_toml("poll_interval_ms = \"fast\""),
            Err(ConfigError::ParseError { .. })
        ));
        assert!(matches!(
            parse_toml("unknown_key = 1"),
            Err(ConfigError::ParseError { .. })
        ));
    }

    // -- 5. Hard validation errors are collected together --------------------

    #[test]
    fn validation_collects_every_reason() {
        let cfg = BridgeConfig {
            tcp_bind: Some("localhost".into()),
            log_level: Some("verbose".into()),
            poll_interval_ms: Some(0),
            max_frame_bytes: Some(0),
            notification_capacity: Some(0),
            ..Default::default()
        };
        let ConfigError::ValidationError { reasons } = validate_config(&cfg).unwrap_err() else {
            panic!("expected ValidationError");
        };
        assert_eq!(reasons.len(), 5, "{reasons:?}");
    }

    // -- 6. Non-loopback TCP and port 0 without port file warn ----------------

    #[test]
    fn tcp_warnings() {
        let cfg = BridgeConfig {
            tcp_bind: Some("0.0.0.0:0".into()),
            ..listening()
        };
        let warnings = validate_config(&cfg).unwrap();
        assert!(warnings.contains(&ConfigWarning::NonLoopbackTcp {
            addr: "0.0.0.0:0".into()
        }));
        assert!(warnings.iter().any(|w| matches!(
            w,
            ConfigWarning::MissingOptionalField { field, .. } if field == "port_file"
        )));
    }

    // -- 7. Env overrides win over the file -----------------------------------

    #[test]
    fn overrides_from_lookup() {
        let vars: HashMap<&str, &str> = HashMap::from([
            (ENV_SOCKET, "/tmp/override.sock"),
            (ENV_LOG_LEVEL, "trace"),
        ]);
        let mut cfg = listening();
        apply_overrides_from(&mut cfg, |k| vars.get(k).map(|v| (*v).to_string()));
        assert_eq!(cfg.unix_socket.as_deref(), Some("/tmp/override.sock"));
        assert_eq!(cfg.log_level(), "trace");
        assert_eq!(cfg.tcp_bind, None);
    }

    // -- 8. Merge: overlay wins, roots concatenate without duplicates ----------

    #[test]
    fn merge_overlay_and_roots() {
        let base = BridgeConfig {
            tcp_bind: Some("127.0.0.1:7000".into()),
            watch_roots: vec!["/home".into(), "/srv".into()],
            ..listening()
        };
        let overlay = BridgeConfig {
            unix_socket: Some("/tmp/other.sock".into()),
            log_level: None,
            watch_roots: vec!["/srv".into(), "/opt".into()],
            ..Default::default()
        };
        let merged = merge_configs(base, overlay);
        assert_eq!(merged.unix_socket.as_deref(), Some("/tmp/other.sock"));
        assert_eq!(merged.tcp_bind.as_deref(), Some("127.0.0.1:7000"));
        assert_eq!(merged.log_level(), "info");
        assert_eq!(merged.watch_roots, vec!["/home", "/srv", "/opt"]);
    }

    // -- 9. TOML round trip ---------------------------------------------------

    #[test]
    fn toml_roundtrip() {
        let cfg = BridgeConfig {
            tcp_bind: Some("127.0.0.1:0".into()),
            port_file: Some("/tmp/port".into()),
            max_frame_bytes: Some(1 << 20),
            notification_poll_timeout_ms: Some(5_000),
            ..listening()
        };
        let serialized = toml::to_string(&cfg).unwrap();
        assert_eq!(parse_toml(&serialized).unwrap(), cfg);
    }

    // -- 10. Load from disk and missing file ------------------------------------

    #[test]
    fn load_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bridge.toml");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "unix_socket = \"/tmp/b.sock\"\nnotification_capacity = 10").unwrap();
        let cfg = load_config(Some(&path)).unwrap();
        assert_eq!(cfg.notification_capacity(), 10);

        let err = load_config(Some(Path::new("/nonexistent/bridge.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound { .. }));
    }

    // -- 11. Display ---------------------------------------------------------------

    #[test]
    fn display() {
        let e = ConfigError::ValidationError {
            reasons: vec!["a".into(), "b".into()],
        };
        assert_eq!(e.to_string(), "config validation failed: a; b");
        let w = ConfigWarning::LargeTimeout {
            field: "notification_poll_timeout_ms".into(),
            millis: 900_000,
        };
        assert!(w.to_string().contains("900000ms"));
    }
}
