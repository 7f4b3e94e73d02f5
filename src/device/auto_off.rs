// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the smart-socket project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Low-current auto-off
//!
//! Switches the socket off once the measured current stayed below a threshold
//! for a number of consecutive sampling ticks, e.g. a charger that finished.

/// Auto-off thresholds and the running low-current count.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AutoOffController {
    threshold_ma: u16,
    required_cycles: u16,
    low_count: u16,
}

impl AutoOffController {
    pub fn new(threshold_ma: u16, required_cycles: u16) -> Self {
        Self {
            threshold_ma,
            required_cycles,
            low_count: 0,
        }
    }

    pub fn threshold_ma(&self) -> u16 {
        self.threshold_ma
    }

    pub fn required_cycles(&self) -> u16 {
        self.required_cycles
    }

    pub fn low_count(&self) -> u16 {
        self.low_count
    }

    /// Both control values set.
    pub fn is_armed(&self) -> bool {
        self.threshold_ma != 0 && self.required_cycles != 0
    }

    pub fn set_threshold(&mut self, threshold_ma: u16) {
        self.threshold_ma = threshold_ma;
        self.low_count = 0;
    }

    pub fn set_cycles(&mut self, required_cycles: u16) {
        self.required_cycles = required_cycles;
        self.low_count = 0;
    }

    /// Feed one sample. Returns `true` when the socket must be switched off.
    pub fn update(&mut self, switched_on: bool, current_ma: f64) -> bool {
        if !switched_on || !self.is_armed() || current_ma >= f64::from(self.threshold_ma) {
            self.low_count = 0;
            return false;
        }
        self.low_count = self.low_count.saturating_add(1).min(self.required_cycles);
        if self.low_count >= self.required_cycles {
            self.low_count = 0;
            return true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fires_after_required_cycles() {
        let mut auto_off = AutoOffController::new(100, 3);
        assert!(!auto_off.update(true, 50.0));
        assert!(!auto_off.update(true, 50.0));
        assert_eq!(auto_off.low_count(), 2);
        assert!(auto_off.update(true, 50.0));
        assert_eq!(auto_off.low_count(), 0);
    }

    #[test]
    fn test_high_sample_resets_count() {
        let mut auto_off = AutoOffController::new(100, 3);
        auto_off.update(true, 10.0);
        auto_off.update(true, 10.0);
        assert!(!auto_off.update(true, 100.0));
        assert_eq!(auto_off.low_count(), 0);
        assert!(!auto_off.update(true, 10.0));
        assert!(!auto_off.update(true, 10.0));
        assert!(auto_off.update(true, 10.0));
    }

    #[test]
    fn test_switched_off_resets_count() {
        let mut auto_off = AutoOffController::new(100, 2);
        auto_off.update(true, 10.0);
        assert!(!auto_off.update(false, 10.0));
        assert_eq!(auto_off.low_count(), 0);
    }

    #[test]
    fn test_disarmed_never_fires() {
        let mut auto_off = AutoOffController::new(0, 2);
        for _ in 0..10 {
            assert!(!auto_off.update(true, 0.0));
        }
        let mut auto_off = AutoOffController::new(100, 0);
        for _ in 0..10 {
            assert!(!auto_off.update(true, 0.0));
        }
        assert_eq!(auto_off.low_count(), 0);
    }

    #[test]
    fn test_changing_controls_resets_count() {
        let mut auto_off = AutoOffController::new(100, 5);
        auto_off.update(true, 10.0);
        auto_off.set_cycles(2);
        assert_eq!(auto_off.low_count(), 0);
        assert!(!auto_off.update(true, 10.0));
        assert!(auto_off.update(true, 10.0));
    }
}
