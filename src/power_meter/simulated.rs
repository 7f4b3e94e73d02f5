// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the smart-socket project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Simulated BL0937 pulse counter
//!
//! Models a resistive or inductive load behind the relay: the line voltage is
//! always present, current and active power only while the relay is closed.
//! Pulse counts are derived by inverting the BL0937 transfer functions, so a
//! sampler fed by this counter reads back the configured load (modulo pulse
//! quantisation over the window).

use std::time::Duration;

use anyhow::Result;
use log::debug;

use super::{Cf1Channel, PulseCounter, PulseCounts, CURRENT_SCALE, POWER_SCALE, VOLTAGE_SCALE};

/// Pulse counter emulating a fixed load.
#[derive(Debug, Clone)]
pub struct SimulatedPulseCounter {
    voltage: f64,
    current: f64,
    power_factor: f64,
}

impl SimulatedPulseCounter {
    /// Line `voltage` (V), load `current` (A) when switched on and the load's
    /// `power_factor` (0..=1).
    pub fn new(voltage: f64, current: f64, power_factor: f64) -> Self {
        Self {
            voltage: voltage.max(0.0),
            current: current.max(0.0),
            power_factor: power_factor.clamp(0.0, 1.0),
        }
    }

    /// Counts expected for one window, without waiting for it.
    pub fn counts_for(&self, window: Duration, channel: Cf1Channel, relay_on: bool) -> PulseCounts {
        let seconds = window.as_secs_f64();
        let current = if relay_on { self.current } else { 0.0 };
        let power = self.voltage * current * self.power_factor;
        let cf1_hz = match channel {
            Cf1Channel::Voltage => self.voltage / VOLTAGE_SCALE,
            Cf1Channel::Current => current / CURRENT_SCALE,
        };
        PulseCounts {
            cf: (power / POWER_SCALE * seconds).round() as u64,
            cf1: (cf1_hz * seconds).round() as u64,
        }
    }
}

#[async_trait::async_trait]
impl PulseCounter for SimulatedPulseCounter {
    async fn count(
        &mut self,
        window: Duration,
        channel: Cf1Channel,
        relay_on: bool,
    ) -> Result<PulseCounts> {
        tokio::time::sleep(window).await;
        let counts = self.counts_for(window, channel, relay_on);
        debug!(
            "Simulated load {:.1} V / {:.3} A (relay {}): {:?}",
            self.voltage,
            self.current,
            if relay_on { "closed" } else { "open" },
            counts
        );
        Ok(counts)
    }

    fn name(&self) -> &str {
        "simulated BL0937"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::power_meter::PulseSample;
    use approx::assert_relative_eq;

    fn read_back(counter: &SimulatedPulseCounter, channel: Cf1Channel, relay_on: bool) -> PulseSample {
        let window = Duration::from_secs(10);
        PulseSample {
            counts: counter.counts_for(window, channel, relay_on),
            channel,
            window,
        }
    }

    #[test]
    fn test_inverts_transfer_functions() {
        let counter = SimulatedPulseCounter::new(230.0, 2.0, 1.0);
        let voltage = read_back(&counter, Cf1Channel::Voltage, true);
        assert_relative_eq!(voltage.raw_cf1(), 230.0, max_relative = 0.01);
        assert_relative_eq!(voltage.raw_power(), 460.0, max_relative = 0.01);
        let current = read_back(&counter, Cf1Channel::Current, true);
        assert_relative_eq!(current.raw_cf1(), 2.0, max_relative = 0.01);
    }

    #[test]
    fn test_open_relay_draws_nothing() {
        let counter = SimulatedPulseCounter::new(230.0, 2.0, 0.8);
        let current = read_back(&counter, Cf1Channel::Current, false);
        assert_eq!(current.counts, PulseCounts { cf: 0, cf1: 0 });
        let voltage = read_back(&counter, Cf1Channel::Voltage, false);
        assert!(voltage.counts.cf1 > 0);
        assert_eq!(voltage.counts.cf, 0);
    }

    #[tokio::test]
    async fn test_count_waits_for_window() {
        let mut counter = SimulatedPulseCounter::new(230.0, 1.0, 1.0);
        let window = Duration::from_millis(20);
        let started = std::time::Instant::now();
        counter.count(window, Cf1Channel::Voltage, true).await.unwrap();
        assert!(started.elapsed() >= window);
    }
}
