// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the smart-socket project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! BL0937 power meter sampling
//!
//! The metering chip outputs two pulse trains: `CF`, whose frequency is
//! proportional to active power, and `CF1`, proportional to either RMS current
//! or RMS voltage depending on the `SEL` line. [`PowerMeterSampler`] counts
//! both trains over a fixed window and flips `SEL` after every sample, so
//! voltage and current are refreshed on alternating ticks.
//!
//! Counting is delegated to a [`PulseCounter`] so the same sampler runs on
//! real GPIO interrupts or on the [`simulated::SimulatedPulseCounter`].

pub mod simulated;

use std::time::Duration;

use anyhow::Result;
use log::debug;

use crate::device::measure::{Measures, Quantity};

pub use simulated::SimulatedPulseCounter;

/// Reference voltage of the BL0937.
pub const V_REF: f64 = 1.218;
/// Watts per CF hertz.
pub const POWER_SCALE: f64 = V_REF * V_REF * 2.0 / 1.721506;
/// Amps per CF1 hertz (current channel).
pub const CURRENT_SCALE: f64 = V_REF / 94638.0 * 1000.0;
/// Volts per CF1 hertz (voltage channel).
pub const VOLTAGE_SCALE: f64 = V_REF / 15397.0 * 2001.0;

/// What the CF1 pulse train measures during a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cf1Channel {
    Voltage,
    Current,
}

impl Cf1Channel {
    pub fn toggled(self) -> Self {
        match self {
            Cf1Channel::Voltage => Cf1Channel::Current,
            Cf1Channel::Current => Cf1Channel::Voltage,
        }
    }

    pub fn quantity(self) -> Quantity {
        match self {
            Cf1Channel::Voltage => Quantity::Voltage,
            Cf1Channel::Current => Quantity::Current,
        }
    }
}

/// Raw pulse counts of both trains.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PulseCounts {
    pub cf: u64,
    pub cf1: u64,
}

/// Source of pulse counts.
#[async_trait::async_trait]
pub trait PulseCounter {
    /// Count pulses on both trains for `window`, with `SEL` set to `channel`.
    ///
    /// The call returns once the window elapsed. `relay_on` is the relay
    /// state during the window; hardware counters ignore it.
    async fn count(
        &mut self,
        window: Duration,
        channel: Cf1Channel,
        relay_on: bool,
    ) -> Result<PulseCounts>;

    fn name(&self) -> &str;
}

/// One completed sampling window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PulseSample {
    pub counts: PulseCounts,
    pub channel: Cf1Channel,
    pub window: Duration,
}

impl PulseSample {
    fn frequency(&self, pulses: u64) -> f64 {
        let seconds = self.window.as_secs_f64();
        if pulses == 0 || seconds <= 0.0 {
            0.0
        } else {
            pulses as f64 / seconds
        }
    }

    /// Uncalibrated active power in W.
    pub fn raw_power(&self) -> f64 {
        self.frequency(self.counts.cf) * POWER_SCALE
    }

    /// Uncalibrated voltage or current, depending on [`Self::channel`].
    pub fn raw_cf1(&self) -> f64 {
        let scale = match self.channel {
            Cf1Channel::Voltage => VOLTAGE_SCALE,
            Cf1Channel::Current => CURRENT_SCALE,
        };
        self.frequency(self.counts.cf1) * scale
    }

    /// Update power and the sampled CF1 quantity; the other one keeps its
    /// previous value.
    pub fn apply_to(&self, measures: &mut Measures) {
        measures.set_raw(Quantity::Power, self.raw_power());
        measures.set_raw(self.channel.quantity(), self.raw_cf1());
    }
}

/// Windowed pulse sampler.
///
/// Each [`sample`](Self::sample) call takes the whole window (about one
/// second) to complete and cannot be cut short.
pub struct PowerMeterSampler {
    counter: Box<dyn PulseCounter + Send + Sync>,
    window: Duration,
    channel: Cf1Channel,
}

impl PowerMeterSampler {
    pub fn new(counter: Box<dyn PulseCounter + Send + Sync>, window: Duration) -> Self {
        Self {
            counter,
            window,
            channel: Cf1Channel::Voltage,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Channel the next sample will measure on CF1.
    pub fn next_channel(&self) -> Cf1Channel {
        self.channel
    }

    /// Count one window and toggle `SEL` for the next one.
    pub async fn sample(&mut self, relay_on: bool) -> Result<PulseSample> {
        let channel = self.channel;
        let counts = self.counter.count(self.window, channel, relay_on).await?;
        self.channel = channel.toggled();
        debug!(
            "{}: cf={} cf1={} ({:?}) over {:?}",
            self.counter.name(),
            counts.cf,
            counts.cf1,
            channel,
            self.window
        );
        Ok(PulseSample {
            counts,
            channel,
            window: self.window,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn sample(cf: u64, cf1: u64, channel: Cf1Channel) -> PulseSample {
        PulseSample {
            counts: PulseCounts { cf, cf1 },
            channel,
            window: Duration::from_secs(1),
        }
    }

    #[test]
    fn test_bl0937_conversion() {
        let s = sample(100, 1000, Cf1Channel::Voltage);
        assert_relative_eq!(s.raw_power(), 100.0 * 1.218 * 1.218 * 2.0 / 1.721506, epsilon = 1e-9);
        assert_relative_eq!(s.raw_cf1(), 1000.0 * 1.218 / 15397.0 * 2001.0, epsilon = 1e-9);
        let s = sample(0, 1000, Cf1Channel::Current);
        assert_eq!(s.raw_power(), 0.0);
        assert_relative_eq!(s.raw_cf1(), 1000.0 * 1.218 / 94638.0 * 1000.0, epsilon = 1e-9);
    }

    #[test]
    fn test_window_normalisation() {
        let mut s = sample(200, 0, Cf1Channel::Voltage);
        s.window = Duration::from_secs(2);
        assert_relative_eq!(s.raw_power(), 100.0 * POWER_SCALE, epsilon = 1e-9);
    }

    #[test]
    fn test_apply_keeps_other_channel() {
        let mut measures = Measures::with_factors([1.0, 1.0, 2.0]);
        sample(10, 1400, Cf1Channel::Voltage).apply_to(&mut measures);
        let volts = measures.measured(Quantity::Voltage);
        assert!(volts > 0.0);
        assert_relative_eq!(measures.measured(Quantity::Power), 20.0 * POWER_SCALE, epsilon = 1e-9);
        sample(10, 20, Cf1Channel::Current).apply_to(&mut measures);
        assert_eq!(measures.measured(Quantity::Voltage), volts);
        assert_relative_eq!(measures.measured(Quantity::Current), 20.0 * CURRENT_SCALE, epsilon = 1e-9);
    }

    #[tokio::test]
    async fn test_sampler_alternates_channels() {
        let counter = SimulatedPulseCounter::new(230.0, 1.0, 1.0);
        let mut sampler = PowerMeterSampler::new(Box::new(counter), Duration::from_millis(5));
        assert_eq!(sampler.next_channel(), Cf1Channel::Voltage);
        let first = sampler.sample(true).await.unwrap();
        let second = sampler.sample(true).await.unwrap();
        let third = sampler.sample(true).await.unwrap();
        assert_eq!(first.channel, Cf1Channel::Voltage);
        assert_eq!(second.channel, Cf1Channel::Current);
        assert_eq!(third.channel, Cf1Channel::Voltage);
    }
}
