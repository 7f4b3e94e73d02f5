// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the smart-socket project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Tick based duration counter
//!
//! A [`TimeCounter`] counts sampling ticks of a fixed interval and converts
//! them into hours, minutes and seconds since its epoch (boot, last switch
//! transition, accumulated on-time). The register map exposes each counter as
//! two words: hours, then `minutes << 8 | seconds`.

/// Counts ticks of a fixed interval since an epoch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeCounter {
    interval_ms: u32,
    ticks_per_hour: u64,
    ticks_per_minute: u64,
    counter: u64,
}

impl TimeCounter {
    /// Create a counter already started with `interval_ms`.
    pub fn new(interval_ms: u32) -> Self {
        let mut counter = Self::default();
        counter.start(interval_ms);
        counter
    }

    /// (Re)start counting with a new tick interval.
    ///
    /// The elapsed tick count is reset. An interval of 0 leaves the counter
    /// stopped: every accessor then reports zero.
    pub fn start(&mut self, interval_ms: u32) {
        self.interval_ms = interval_ms;
        self.counter = 0;
        if interval_ms == 0 {
            self.ticks_per_hour = 0;
            self.ticks_per_minute = 0;
        } else {
            self.ticks_per_hour = 3_600_000 / u64::from(interval_ms);
            self.ticks_per_minute = 60_000 / u64::from(interval_ms);
        }
    }

    /// Register one elapsed tick.
    pub fn count(&mut self) {
        if self.interval_ms > 0 {
            self.counter = self.counter.saturating_add(1);
        }
    }

    /// Go back to the epoch, keeping the interval.
    pub fn reset(&mut self) {
        self.counter = 0;
    }

    pub fn interval_ms(&self) -> u32 {
        self.interval_ms
    }

    pub fn ticks(&self) -> u64 {
        self.counter
    }

    /// Whole hours elapsed, saturating at `u16::MAX`.
    pub fn hours(&self) -> u16 {
        if self.ticks_per_hour == 0 {
            return 0;
        }
        u16::try_from(self.counter / self.ticks_per_hour).unwrap_or(u16::MAX)
    }

    /// Minutes within the current hour.
    pub fn minutes(&self) -> u8 {
        if self.ticks_per_minute == 0 {
            return 0;
        }
        ((self.counter / self.ticks_per_minute) % 60) as u8
    }

    /// Seconds within the current minute.
    pub fn seconds(&self) -> u8 {
        if self.interval_ms == 0 {
            return 0;
        }
        ((self.counter * u64::from(self.interval_ms) / 1000) % 60) as u8
    }

    /// Packed `minutes << 8 | seconds` register word.
    pub fn minutes_seconds_word(&self) -> u16 {
        (u16::from(self.minutes()) << 8) | u16::from(self.seconds())
    }

    /// The two register words: hours, then minutes/seconds.
    pub fn register_words(&self) -> [u16; 2] {
        [self.hours(), self.minutes_seconds_word()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_counter_reads_zero() {
        let counter = TimeCounter::new(5000);
        assert_eq!(counter.register_words(), [0, 0]);
    }

    #[test]
    fn test_counts_hours_minutes_seconds() {
        let mut counter = TimeCounter::new(5000);
        // 1h 2m 35s = 3755 s = 751 ticks of 5 s
        for _ in 0..751 {
            counter.count();
        }
        assert_eq!(counter.hours(), 1);
        assert_eq!(counter.minutes(), 2);
        assert_eq!(counter.seconds(), 35);
        assert_eq!(counter.minutes_seconds_word(), (2 << 8) | 35);
    }

    #[test]
    fn test_zero_interval_is_stopped() {
        let mut counter = TimeCounter::new(0);
        counter.count();
        counter.count();
        assert_eq!(counter.ticks(), 0);
        assert_eq!(counter.register_words(), [0, 0]);
    }

    #[test]
    fn test_restart_resets_ticks() {
        let mut counter = TimeCounter::new(1000);
        for _ in 0..61 {
            counter.count();
        }
        assert_eq!(counter.minutes(), 1);
        assert_eq!(counter.seconds(), 1);
        counter.start(2000);
        assert_eq!(counter.ticks(), 0);
        assert_eq!(counter.interval_ms(), 2000);
        counter.count();
        assert_eq!(counter.seconds(), 2);
    }

    #[test]
    fn test_reset_keeps_interval() {
        let mut counter = TimeCounter::new(1000);
        counter.count();
        counter.reset();
        assert_eq!(counter.ticks(), 0);
        assert_eq!(counter.interval_ms(), 1000);
    }
}
