// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the smart-socket project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Weekly switching timers
//!
//! Sixteen slots, each switching the socket on or off at a given hour and
//! minute on selected weekdays. A slot is two register words:
//!
//! - `active_days << 8 | on_off`: bits 0..6 of `active_days` select Sunday to
//!   Saturday, bit 7 enables the slot; bit 0 of `on_off` is the action.
//! - `hour << 8 | minute`.

use chrono::{Datelike, NaiveDateTime, Timelike};

/// Number of timer slots.
pub const TIMER_SLOTS: usize = 16;
/// Register words per slot.
pub const WORDS_PER_TIMER: usize = 2;

pub const TIMER_ACTIVE: u8 = 0x80;
pub const TIMER_DAYS: u8 = 0x7F;
pub const TIMER_ON: u8 = 0x01;

/// Days with bit 0 = Sunday.
pub const WORKDAYS: u8 = 0x3E;
pub const WEEKEND: u8 = 0x41;

/// One timer slot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimerSlot {
    pub active_days: u8,
    pub on_off: u8,
    pub hour: u8,
    pub minute: u8,
}

impl TimerSlot {
    /// Decode the two register words, normalising the time of day.
    pub fn from_words(words: [u16; 2]) -> Self {
        let mut slot = Self::default();
        slot.set_word(0, words[0]);
        slot.set_word(1, words[1]);
        slot
    }

    pub fn to_words(&self) -> [u16; 2] {
        [
            (u16::from(self.active_days) << 8) | u16::from(self.on_off),
            (u16::from(self.hour) << 8) | u16::from(self.minute),
        ]
    }

    /// Overwrite one of the two slot words.
    ///
    /// Word 0 is stored raw. Word 1 is reduced to hour mod 24 and minute
    /// mod 60.
    pub fn set_word(&mut self, word: usize, value: u16) {
        let hi = (value >> 8) as u8;
        let lo = (value & 0xFF) as u8;
        if word == 0 {
            self.active_days = hi;
            self.on_off = lo;
        } else {
            self.hour = hi % 24;
            self.minute = lo % 60;
        }
    }

    /// The four persisted bytes: days, action, hour, minute.
    pub fn to_bytes(&self) -> [u8; 4] {
        [self.active_days, self.on_off, self.hour, self.minute]
    }

    pub fn from_bytes(bytes: [u8; 4]) -> Self {
        Self {
            active_days: bytes[0],
            on_off: bytes[1],
            hour: bytes[2] % 24,
            minute: bytes[3] % 60,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active_days & TIMER_ACTIVE != 0
    }

    pub fn switches_on(&self) -> bool {
        self.on_off & TIMER_ON != 0
    }

    /// `weekday` counts from Sunday = 0.
    pub fn runs_on(&self, weekday: u32) -> bool {
        weekday < 7 && self.active_days & (1 << weekday) & TIMER_DAYS != 0
    }

    pub fn matches(&self, weekday: u32, hour: u32, minute: u32) -> bool {
        self.is_active()
            && self.runs_on(weekday)
            && u32::from(self.hour) == hour
            && u32::from(self.minute) == minute
    }
}

/// A timer that decided to switch the socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerFiring {
    pub slot: usize,
    pub switch_on: bool,
}

/// The sixteen timer slots.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TimerTable {
    slots: [TimerSlot; TIMER_SLOTS],
}

impl TimerTable {
    #[cfg(test)]
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub fn from_slots(slots: [TimerSlot; TIMER_SLOTS]) -> Self {
        Self { slots }
    }

    pub fn slot(&self, index: usize) -> Option<&TimerSlot> {
        self.slots.get(index)
    }

    pub fn slots(&self) -> &[TimerSlot; TIMER_SLOTS] {
        &self.slots
    }

    /// Replace a slot; out of range indices are ignored.
    #[cfg(test)]
    pub(crate) fn set_slot(&mut self, index: usize, slot: TimerSlot) {
        if let Some(target) = self.slots.get_mut(index) {
            *target = slot;
        }
    }

    /// Register word at `offset` within the timer block (0..32).
    pub fn read_word(&self, offset: usize) -> u16 {
        self.slots
            .get(offset / WORDS_PER_TIMER)
            .map_or(0, |slot| slot.to_words()[offset % WORDS_PER_TIMER])
    }

    /// Write the register word at `offset` and return the touched slot index.
    pub fn write_word(&mut self, offset: usize, value: u16) -> Option<usize> {
        let index = offset / WORDS_PER_TIMER;
        let slot = self.slots.get_mut(index)?;
        slot.set_word(offset % WORDS_PER_TIMER, value);
        Some(index)
    }

    /// The first slot matching `weekday`/`hour`/`minute`, if any.
    pub fn first_match(&self, weekday: u32, hour: u32, minute: u32) -> Option<usize> {
        self.slots
            .iter()
            .position(|slot| slot.matches(weekday, hour, minute))
    }

    /// Evaluate the table at `now` against the current switch state.
    ///
    /// Only the lowest numbered matching slot is considered, and it only fires
    /// when its action differs from `switched_on`.
    pub fn evaluate(&self, now: NaiveDateTime, switched_on: bool) -> Option<TimerFiring> {
        let weekday = now.weekday().num_days_from_sunday();
        let index = self.first_match(weekday, now.hour(), now.minute())?;
        let switch_on = self.slots[index].switches_on();
        (switch_on != switched_on).then_some(TimerFiring {
            slot: index,
            switch_on,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    // 2024-03-17 is a Sunday
    fn sunday_at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 17)
            .and_then(|d| d.and_hms_opt(h, m, 0))
            .unwrap()
    }

    fn slot(days: u8, on: bool, hour: u8, minute: u8) -> TimerSlot {
        TimerSlot {
            active_days: TIMER_ACTIVE | days,
            on_off: u8::from(on),
            hour,
            minute,
        }
    }

    #[test]
    fn test_word_round_trip() {
        let slot = TimerSlot::from_words([0x8301, 0x0C1E]);
        assert_eq!(slot.active_days, 0x83);
        assert_eq!(slot.on_off, 0x01);
        assert_eq!(slot.hour, 12);
        assert_eq!(slot.minute, 30);
        assert_eq!(slot.to_words(), [0x8301, 0x0C1E]);
    }

    #[test]
    fn test_time_is_normalised() {
        let slot = TimerSlot::from_words([0, (25 << 8) | 61]);
        assert_eq!(slot.hour, 1);
        assert_eq!(slot.minute, 1);
        assert_eq!(slot.to_words()[1], 0x0101);
    }

    #[test]
    fn test_write_word_targets_slot() {
        let mut table = TimerTable::new();
        assert_eq!(table.write_word(5, 0x0817), Some(2));
        assert_eq!(table.slot(2).unwrap().hour, 8);
        assert_eq!(table.slot(2).unwrap().minute, 23);
        assert_eq!(table.read_word(5), 0x0817);
        assert_eq!(table.write_word(32, 1), None);
    }

    #[test]
    fn test_inactive_or_wrong_day_never_matches() {
        let mut table = TimerTable::new();
        let mut inactive = slot(0x01, true, 10, 0);
        inactive.active_days &= !TIMER_ACTIVE;
        table.set_slot(0, inactive);
        table.set_slot(1, slot(WORKDAYS, true, 10, 0));
        assert_eq!(table.evaluate(sunday_at(10, 0), false), None);
    }

    #[test]
    fn test_lowest_index_wins() {
        let mut table = TimerTable::new();
        table.set_slot(3, slot(0x01, false, 7, 15));
        table.set_slot(9, slot(0x01, true, 7, 15));
        // Slot 3 decides: it says off and the socket is on
        assert_eq!(
            table.evaluate(sunday_at(7, 15), true),
            Some(TimerFiring {
                slot: 3,
                switch_on: false
            })
        );
        // Slot 3 says off and the socket is already off: nothing happens even
        // though slot 9 would switch on
        assert_eq!(table.evaluate(sunday_at(7, 15), false), None);
    }

    #[test]
    fn test_fires_only_on_state_change() {
        let mut table = TimerTable::new();
        table.set_slot(0, slot(WEEKEND, true, 6, 0));
        assert!(table.evaluate(sunday_at(6, 0), false).is_some());
        assert!(table.evaluate(sunday_at(6, 0), true).is_none());
        assert!(table.evaluate(sunday_at(6, 1), false).is_none());
    }

    #[test]
    fn test_byte_round_trip() {
        let slot = slot(WORKDAYS, true, 23, 59);
        assert_eq!(TimerSlot::from_bytes(slot.to_bytes()), slot);
    }
}
