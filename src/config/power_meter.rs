// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the smart-socket project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Power meter sampling configuration

use serde::{Deserialize, Serialize};

/// Load seen by the simulated pulse counter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatedLoadConfig {
    /// Line voltage in V.
    pub voltage: f64,
    /// Load current in A while the relay is closed.
    pub current: f64,
    /// Power factor of the load, 0 to 1.
    pub power_factor: f64,
}

impl Default for SimulatedLoadConfig {
    fn default() -> Self {
        Self {
            voltage: 230.0,
            current: 0.25,
            power_factor: 1.0,
        }
    }
}

/// Configuration of the power meter sampler.
///
/// Only used when the device has the `power_meter` capability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PowerMeterConfig {
    /// Pulse counting window in milliseconds.
    pub sample_window_ms: u32,

    #[serde(default)]
    pub simulation: SimulatedLoadConfig,
}

impl Default for PowerMeterConfig {
    fn default() -> Self {
        Self {
            sample_window_ms: 1000,
            simulation: SimulatedLoadConfig::default(),
        }
    }
}
