// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the smart-socket project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Device model configuration
//!
//! Describes which optional features the emulated socket has and how often
//! its periodic work runs.

use chrono::{FixedOffset, Local, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lowest accepted sampling period.
pub const MIN_UPDATE_INTERVAL_MS: u32 = 2000;

/// Optional features of the socket model.
///
/// Capabilities decide which register regions and function codes are live.
/// Regions of absent features stay in the address map and read as zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    /// BL0937 power meter (energy, calibration, auto-off).
    #[serde(default = "default_true")]
    pub power_meter: bool,

    /// Weekly switching timers.
    #[serde(default = "default_true")]
    pub timers: bool,

    /// Event ring buffer.
    #[serde(default = "default_true")]
    pub event_tracking: bool,
}

fn default_true() -> bool {
    true
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            power_meter: true,
            timers: true,
            event_tracking: true,
        }
    }
}

/// Configuration of the emulated device.
///
/// # Example
///
/// ```
/// use smart_socket::config::DeviceConfig;
///
/// let device = DeviceConfig::default();
/// assert_eq!(device.update_interval_ms, 5000);
/// assert!(device.capabilities.power_meter);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Name reported in logs and formatted into a blank settings store.
    pub name: String,

    /// Period of the sampling tick in milliseconds (at least 2000).
    pub update_interval_ms: u32,

    /// Period of the timer evaluation in milliseconds (below one minute, so
    /// no timer minute is skipped).
    pub timer_check_interval_ms: u32,

    /// Fixed offset from UTC in minutes used for timers and event stamps.
    /// The host's local time zone is used when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub utc_offset_minutes: Option<i32>,

    #[serde(default)]
    pub capabilities: Capabilities,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            name: "SmartSocket".to_string(),
            update_interval_ms: 5000,
            timer_check_interval_ms: 40000,
            utc_offset_minutes: None,
            capabilities: Capabilities::default(),
        }
    }
}

impl DeviceConfig {
    /// Sampling period with the lower bound applied.
    pub fn effective_update_interval_ms(&self) -> u32 {
        self.update_interval_ms.max(MIN_UPDATE_INTERVAL_MS)
    }

    /// Wall clock time in the configured zone.
    pub fn clock(&self) -> Clock {
        Clock {
            offset: self
                .utc_offset_minutes
                .and_then(|minutes| FixedOffset::east_opt(minutes * 60)),
        }
    }
}

/// Wall clock of the device.
#[derive(Debug, Clone, Copy, Default)]
pub struct Clock {
    offset: Option<FixedOffset>,
}

impl Clock {
    pub fn now(&self) -> NaiveDateTime {
        match self.offset {
            Some(offset) => Utc::now().with_timezone(&offset).naive_local(),
            None => Local::now().naive_local(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_interval_lower_bound() {
        let device = DeviceConfig {
            update_interval_ms: 500,
            ..Default::default()
        };
        assert_eq!(device.effective_update_interval_ms(), MIN_UPDATE_INTERVAL_MS);
    }

    #[test]
    fn test_fixed_offset_clock() {
        let device = DeviceConfig {
            utc_offset_minutes: Some(0),
            ..Default::default()
        };
        let now = device.clock().now();
        let utc = Utc::now().naive_utc();
        assert!((utc - now).num_seconds().abs() < 5);
    }

    #[test]
    fn test_capabilities_default_to_enabled() {
        let capabilities: Capabilities = serde_yml::from_str("timers: false").unwrap();
        assert!(capabilities.power_meter);
        assert!(!capabilities.timers);
        assert!(capabilities.event_tracking);
    }
}
