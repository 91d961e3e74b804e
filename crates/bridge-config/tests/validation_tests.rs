// SPDX-License-Identifier: MIT OR Apache-2.0
//! Boundary validation tests for `bridge-config`.

use bridge_config::{
    BridgeConfig, ConfigError, ConfigWarning, DEFAULT_MAX_FRAME_BYTES, merge_configs, parse_toml,
    validate_config,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Fully-specified config with no validation warnings.
fn fully_valid_config() -> BridgeConfig {
    BridgeConfig {
        unix_socket: Some("/run/backup/bridge.sock".into()),
        tcp_bind: Some("127.0.0.1:0".into()),
        port_file: Some("/run/backup/bridge.port".into()),
        log_level: Some("info".into()),
        poll_interval_ms: Some(250),
        max_frame_bytes: Some(DEFAULT_MAX_FRAME_BYTES),
        notification_capacity: Some(1000),
        notification_poll_timeout_ms: Some(30_000),
        watch_roots: vec!["/home".into()],
    }
}

fn validation_reasons(err: ConfigError) -> Vec<String> {
    match err {
        ConfigError::ValidationError { reasons } => reasons,
        other => panic!("expected ValidationError, got {other:?}"),
    }
}

// ===========================================================================
// 1. Valid configs
// ===========================================================================

#[test]
fn fully_specified_config_has_no_warnings() {
    let warnings = validate_config(&fully_valid_config()).unwrap();
    assert!(warnings.is_empty(), "expected zero warnings: {warnings:?}");
}

#[test]
fn every_log_level_is_accepted() {
    for level in ["error", "warn", "info", "debug", "trace"] {
        let cfg = BridgeConfig {
            log_level: Some(level.into()),
            ..fully_valid_config()
        };
        validate_config(&cfg).unwrap_or_else(|e| panic!("log_level '{level}': {e}"));
    }
}

#[test]
fn unix_only_and_tcp_only_are_both_listeners() {
    let unix_only = BridgeConfig {
        tcp_bind: None,
        port_file: None,
        ..fully_valid_config()
    };
    validate_config(&unix_only).unwrap();

    let tcp_only = BridgeConfig {
        unix_socket: None,
        ..fully_valid_config()
    };
    validate_config(&tcp_only).unwrap();
}

#[test]
fn ipv6_loopback_is_loopback() {
    let cfg = BridgeConfig {
        tcp_bind: Some("[::1]:7400".into()),
        ..fully_valid_config()
    };
    assert!(validate_config(&cfg).unwrap().is_empty());
}

// ===========================================================================
// 2. Boundaries
// ===========================================================================

#[test]
fn frame_limit_boundaries() {
    let at_max = BridgeConfig {
        max_frame_bytes: Some(256 * 1024 * 1024),
        ..fully_valid_config()
    };
    validate_config(&at_max).unwrap();

    let over = BridgeConfig {
        max_frame_bytes: Some(256 * 1024 * 1024 + 1),
        ..fully_valid_config()
    };
    let reasons = validation_reasons(validate_config(&over).unwrap_err());
    assert!(reasons[0].contains("max_frame_bytes"));
}

#[test]
fn capacity_boundaries() {
    let one = BridgeConfig {
        notification_capacity: Some(1),
        ..fully_valid_config()
    };
    validate_config(&one).unwrap();

    let huge = BridgeConfig {
        notification_capacity: Some(1_000_001),
        ..fully_valid_config()
    };
    assert!(validate_config(&huge).is_err());
}

#[test]
fn long_poll_cap_warns_when_large() {
    let cfg = BridgeConfig {
        notification_poll_timeout_ms: Some(3_600_000),
        ..fully_valid_config()
    };
    let warnings = validate_config(&cfg).unwrap();
    assert!(matches!(
        warnings.as_slice(),
        [ConfigWarning::LargeTimeout { millis: 3_600_000, .. }]
    ));
}

#[test]
fn blank_paths_are_errors() {
    let cfg = BridgeConfig {
        unix_socket: Some("  ".into()),
        watch_roots: vec![String::new()],
        ..fully_valid_config()
    };
    assert_eq!(validation_reasons(validate_config(&cfg).unwrap_err()).len(), 2);
}

// ===========================================================================
// 3. Merge then validate
// ===========================================================================

#[test]
fn overlay_can_repair_a_base() {
    let broken = BridgeConfig {
        log_level: Some("loud".into()),
        ..fully_valid_config()
    };
    assert!(validate_config(&broken).is_err());

    let fix = BridgeConfig {
        log_level: Some("warn".into()),
        ..parse_toml("").unwrap()
    };
    let merged = merge_configs(broken, fix);
    validate_config(&merged).unwrap();
    assert_eq!(merged.log_level(), "warn");
}
