// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the smart-socket project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Configuration utilities
//!
//! This module provides utility functions for working with configuration
//! settings, including validation and schema management.

use anyhow::{Context, Result};
use log::{debug, warn};

use super::device::MIN_UPDATE_INTERVAL_MS;
use super::Config;

/// Output the embedded JSON schema to the console.
///
/// This function is called when the `--show-config-schema` flag is provided
/// on the command line.
///
/// # Example
///
/// ```bash
/// ./smart_socket --show-config-schema > config_schema.json
/// ```
pub fn output_config_schema() -> Result<()> {
    let schema_str = include_str!("../../resources/config.schema.json");

    // Parse the schema to a JSON Value to pretty-format it
    let schema: serde_json::Value =
        serde_json::from_str(schema_str).context("Failed to parse JSON schema")?;

    let formatted_schema =
        serde_json::to_string_pretty(&schema).context("Failed to format JSON schema")?;

    println!("{}", formatted_schema);

    Ok(())
}

/// Check if a string is a valid IP address
///
/// Validates that a string represents a valid IPv4 or IPv6 address,
/// or is one of the special values like "localhost" or "0.0.0.0".
pub fn is_valid_ip_address(addr: &str) -> bool {
    if addr.parse::<std::net::IpAddr>().is_ok() {
        return true;
    }

    // Special cases
    matches!(addr, "localhost" | "::" | "::0" | "0.0.0.0")
}

/// Validates the configuration against additional rules that aren't covered by the JSON schema.
///
/// # Validation Rules
///
/// - **Port Range**: the Modbus port is within 1-65534
/// - **IP Address Format**: the Modbus address is an IP address or special value
/// - **Tick periods**: the timer check runs more than once a minute, so no
///   timer minute is skipped; a sampling period below the 2000 ms floor is
///   only reported since it gets clamped
/// - **Sampling window**: the pulse window fits in one sampling period
pub fn validate_specific_rules(config: &Config) -> Result<()> {
    debug!("Performing additional validation checks");

    if config.modbus.port < 1 || config.modbus.port > 65534 {
        anyhow::bail!("Invalid Modbus port number: {}", config.modbus.port);
    }

    if !is_valid_ip_address(&config.modbus.address) {
        anyhow::bail!("Invalid Modbus address: {}", config.modbus.address);
    }

    let timer_interval = config.device.timer_check_interval_ms;
    if timer_interval == 0 || timer_interval >= 60_000 {
        anyhow::bail!(
            "Timer check interval must be between 1 and 59999 ms, got {}",
            timer_interval
        );
    }

    if config.device.update_interval_ms < MIN_UPDATE_INTERVAL_MS {
        warn!(
            "Update interval {} ms is below {} ms and will be raised",
            config.device.update_interval_ms, MIN_UPDATE_INTERVAL_MS
        );
    }

    if config.device.capabilities.power_meter {
        let window = config.power_meter.sample_window_ms;
        if window == 0 || window >= config.device.effective_update_interval_ms() {
            anyhow::bail!(
                "Sample window of {} ms must be shorter than the update interval",
                window
            );
        }
    }

    Ok(())
}
