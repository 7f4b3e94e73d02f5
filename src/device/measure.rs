// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the smart-socket project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Calibrated electrical measures

use std::fmt;

/// Measured quantity, numbered like the calibration selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Quantity {
    Voltage = 0,
    Current = 1,
    Power = 2,
}

impl Quantity {
    pub const ALL: [Quantity; 3] = [Quantity::Voltage, Quantity::Current, Quantity::Power];

    pub fn from_selector(selector: u8) -> Option<Self> {
        Self::ALL.get(usize::from(selector)).copied()
    }

    pub fn selector(self) -> u8 {
        self as u8
    }

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn unit(self) -> &'static str {
        match self {
            Quantity::Voltage => "V",
            Quantity::Current => "A",
            Quantity::Power => "W",
        }
    }

    /// Parse the `V`, `A` or `W` unit letter.
    pub fn from_unit(unit: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|quantity| quantity.unit().eq_ignore_ascii_case(unit))
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Quantity::Voltage => "voltage",
            Quantity::Current => "current",
            Quantity::Power => "power",
        };
        f.write_str(name)
    }
}

/// A measured value and its calibration factor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Measure {
    pub measured: f64,
    pub factor: f32,
}

impl Default for Measure {
    fn default() -> Self {
        Self {
            measured: 0.0,
            factor: 1.0,
        }
    }
}

/// Voltage, current and power measures indexed by [`Quantity`].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Measures([Measure; 3]);

impl Measures {
    pub fn with_factors(factors: [f32; 3]) -> Self {
        let mut measures = Self::default();
        for quantity in Quantity::ALL {
            measures.0[quantity.index()].factor = factors[quantity.index()];
        }
        measures
    }

    pub fn get(&self, quantity: Quantity) -> &Measure {
        &self.0[quantity.index()]
    }

    pub fn factor(&self, quantity: Quantity) -> f32 {
        self.0[quantity.index()].factor
    }

    pub fn measured(&self, quantity: Quantity) -> f64 {
        self.0[quantity.index()].measured
    }

    pub fn factors(&self) -> [f32; 3] {
        [
            self.factor(Quantity::Voltage),
            self.factor(Quantity::Current),
            self.factor(Quantity::Power),
        ]
    }

    pub fn set_factor(&mut self, quantity: Quantity, factor: f32) {
        self.0[quantity.index()].factor = factor;
    }

    /// Store an uncalibrated reading, applying the quantity's factor.
    pub fn set_raw(&mut self, quantity: Quantity, raw: f64) {
        let measure = &mut self.0[quantity.index()];
        measure.measured = raw * f64::from(measure.factor);
    }
}
