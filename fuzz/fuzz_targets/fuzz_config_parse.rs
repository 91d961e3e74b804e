// SPDX-License-Identifier: MIT OR Apache-2.0
//! Fuzz configuration parsing and validation with arbitrary TOML text.
#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    if let Ok(config) = bridge_config::parse_toml(text) {
        let _ = bridge_config::validate_config(&config);
        let _ = config.tcp_addr();
        let merged = bridge_config::merge_configs(config.clone(), config);
        let _ = bridge_config::validate_config(&merged);
    }
});
