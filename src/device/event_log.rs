// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the smart-socket project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Event ring buffer
//!
//! State transitions are recorded as packed 16-bit words:
//!
//! ```text
//!  15      11 10      6 5        0
//! +----------+---------+----------+
//! |   type   |   hi    |    lo    |
//! +----------+---------+----------+
//! ```
//!
//! Date events carry the day of month in `hi` and the month in `lo`, every
//! other event carries the hour and minute of the transition. The buffer holds
//! at most [`MAX_EVENTS`] records, drops the oldest one on overflow and never
//! stores the same record twice in a row.

use std::collections::VecDeque;
use std::fmt;

use chrono::{Datelike, NaiveDateTime, Timelike};

/// Number of records kept by the log.
pub const MAX_EVENTS: usize = 40;

const TYPE_SHIFT: u16 = 11;
const TYPE_MASK: u16 = 0x1F;
const HI_SHIFT: u16 = 6;
const HI_MASK: u16 = 0x1F;
const LO_MASK: u16 = 0x3F;

/// Kinds of recorded events, with their wire codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum EventKind {
    NoEvent = 0,
    DateChange = 1,
    BootDate = 2,
    BootTime = 3,
    DefaultOn = 4,
    ButtonOn = 5,
    ButtonOff = 6,
    ModbusOn = 7,
    ModbusOff = 8,
    TimerOn = 9,
    TimerOff = 10,
    FauxmoOn = 11,
    FauxmoOff = 12,
    WifiDisconnected = 13,
    WifiConnected = 14,
    WifiLost = 15,
    AutoOff = 16,
}

impl EventKind {
    const ALL: [EventKind; 17] = [
        EventKind::NoEvent,
        EventKind::DateChange,
        EventKind::BootDate,
        EventKind::BootTime,
        EventKind::DefaultOn,
        EventKind::ButtonOn,
        EventKind::ButtonOff,
        EventKind::ModbusOn,
        EventKind::ModbusOff,
        EventKind::TimerOn,
        EventKind::TimerOff,
        EventKind::FauxmoOn,
        EventKind::FauxmoOff,
        EventKind::WifiDisconnected,
        EventKind::WifiConnected,
        EventKind::WifiLost,
        EventKind::AutoOff,
    ];

    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.get(usize::from(code)).copied()
    }

    /// Display name used by logs and the companion client.
    pub fn name(self) -> &'static str {
        match self {
            EventKind::NoEvent => "no event",
            EventKind::DateChange => "date change",
            EventKind::BootDate => "boot date",
            EventKind::BootTime => "boot time",
            EventKind::DefaultOn => "default on",
            EventKind::ButtonOn => "button on",
            EventKind::ButtonOff => "button off",
            EventKind::ModbusOn => "Modbus on",
            EventKind::ModbusOff => "Modbus off",
            EventKind::TimerOn => "timer on",
            EventKind::TimerOff => "timer off",
            EventKind::FauxmoOn => "Fauxmo on",
            EventKind::FauxmoOff => "Fauxmo off",
            EventKind::WifiDisconnected => "WiFi disconnected",
            EventKind::WifiConnected => "WiFi connected",
            EventKind::WifiLost => "WiFi lost",
            EventKind::AutoOff => "auto off",
        }
    }

    /// Date events store day/month instead of hour/minute.
    pub fn is_date(self) -> bool {
        matches!(self, EventKind::DateChange | EventKind::BootDate)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One packed event word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventRecord(u16);

impl EventRecord {
    pub fn new(kind: EventKind, hi: u8, lo: u8) -> Self {
        Self(
            ((u16::from(kind.code()) & TYPE_MASK) << TYPE_SHIFT)
                | ((u16::from(hi) & HI_MASK) << HI_SHIFT)
                | (u16::from(lo) & LO_MASK),
        )
    }

    /// Build the record for `kind` happening at `at`.
    pub fn at(kind: EventKind, at: NaiveDateTime) -> Self {
        if kind.is_date() {
            Self::new(kind, at.day() as u8, at.month() as u8)
        } else {
            Self::new(kind, at.hour() as u8, at.minute() as u8)
        }
    }

    pub fn from_word(word: u16) -> Self {
        Self(word)
    }

    pub fn word(self) -> u16 {
        self.0
    }

    pub fn type_code(self) -> u8 {
        ((self.0 >> TYPE_SHIFT) & TYPE_MASK) as u8
    }

    pub fn kind(self) -> Option<EventKind> {
        EventKind::from_code(self.type_code())
    }

    pub fn hi(self) -> u8 {
        ((self.0 >> HI_SHIFT) & HI_MASK) as u8
    }

    pub fn lo(self) -> u8 {
        (self.0 & LO_MASK) as u8
    }
}

impl fmt::Display for EventRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind() {
            Some(kind) if kind.is_date() => {
                write!(f, "{:02}.{:02}. {}", self.hi(), self.lo(), kind)
            }
            Some(kind) => write!(f, "{:02}:{:02}  {}", self.hi(), self.lo(), kind),
            None => write!(f, "{:02}:{:02}  unknown event {}", self.hi(), self.lo(), self.type_code()),
        }
    }
}

/// Fixed capacity ring of event records, oldest first.
#[derive(Debug, Clone)]
pub struct EventLog {
    records: VecDeque<EventRecord>,
    capacity: usize,
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}

impl EventLog {
    pub fn new() -> Self {
        Self::with_capacity(MAX_EVENTS)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            records: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a record.
    ///
    /// Returns `false` when the record equals the newest stored one and was
    /// therefore dropped.
    pub fn append(&mut self, record: EventRecord) -> bool {
        if self.capacity == 0 || self.records.back() == Some(&record) {
            return false;
        }
        if self.records.len() == self.capacity {
            self.records.pop_front();
        }
        self.records.push_back(record);
        true
    }

    /// Record `kind` as happening at `at`.
    pub fn record(&mut self, kind: EventKind, at: NaiveDateTime) -> bool {
        self.append(EventRecord::at(kind, at))
    }

    /// Packed word at `index` (0 = oldest), 0 for unused slots.
    pub fn read_slot(&self, index: usize) -> u16 {
        self.records.get(index).map_or(0, |record| record.word())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = &EventRecord> {
        self.records.iter()
    }

    pub fn newest(&self) -> Option<EventRecord> {
        self.records.back().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 17)
            .and_then(|d| d.and_hms_opt(h, m, 0))
            .unwrap()
    }

    #[test]
    fn test_record_packing() {
        let record = EventRecord::new(EventKind::ModbusOn, 13, 42);
        assert_eq!(record.word(), (7 << 11) | (13 << 6) | 42);
        assert_eq!(record.kind(), Some(EventKind::ModbusOn));
        assert_eq!(record.hi(), 13);
        assert_eq!(record.lo(), 42);
    }

    #[test]
    fn test_fields_are_masked() {
        let record = EventRecord::new(EventKind::AutoOff, 0xFF, 0xFF);
        assert_eq!(record.hi(), 0x1F);
        assert_eq!(record.lo(), 0x3F);
        assert_eq!(record.kind(), Some(EventKind::AutoOff));
    }

    #[test]
    fn test_date_events_use_day_and_month() {
        let record = EventRecord::at(EventKind::BootDate, at(8, 30));
        assert_eq!(record.hi(), 17);
        assert_eq!(record.lo(), 3);
        let record = EventRecord::at(EventKind::BootTime, at(8, 30));
        assert_eq!(record.hi(), 8);
        assert_eq!(record.lo(), 30);
    }

    #[test]
    fn test_duplicate_suppression() {
        let mut log = EventLog::new();
        assert!(log.record(EventKind::ModbusOn, at(10, 5)));
        assert!(!log.record(EventKind::ModbusOn, at(10, 5)));
        assert_eq!(log.len(), 1);
        // Same record again after another one is stored
        assert!(log.record(EventKind::ModbusOff, at(10, 5)));
        assert!(log.record(EventKind::ModbusOn, at(10, 5)));
        assert_eq!(log.len(), 3);
    }

    #[test]
    fn test_overflow_evicts_oldest() {
        let mut log = EventLog::new();
        for i in 0..(MAX_EVENTS + 1) {
            let kind = if i % 2 == 0 {
                EventKind::ButtonOn
            } else {
                EventKind::ButtonOff
            };
            log.record(kind, at((i / 60) as u32, (i % 60) as u32));
        }
        assert_eq!(log.len(), MAX_EVENTS);
        // The first record (00:00) is gone, the second (00:01) is now the oldest
        let oldest = EventRecord::from_word(log.read_slot(0));
        assert_eq!(oldest.kind(), Some(EventKind::ButtonOff));
        assert_eq!((oldest.hi(), oldest.lo()), (0, 1));
        let newest = EventRecord::from_word(log.read_slot(MAX_EVENTS - 1));
        assert_eq!((newest.hi(), newest.lo()), (0, 40));
    }

    #[test]
    fn test_unused_slots_read_zero() {
        let mut log = EventLog::new();
        log.record(EventKind::BootTime, at(1, 2));
        assert_ne!(log.read_slot(0), 0);
        assert_eq!(log.read_slot(1), 0);
        assert_eq!(log.read_slot(MAX_EVENTS + 10), 0);
    }

    #[test]
    fn test_kind_codes_round_trip() {
        for code in 0..=16u8 {
            let kind = EventKind::from_code(code).unwrap();
            assert_eq!(kind.code(), code);
        }
        assert_eq!(EventKind::from_code(17), None);
    }

    #[test]
    fn test_display() {
        let record = EventRecord::new(EventKind::TimerOn, 7, 5);
        assert_eq!(record.to_string(), "07:05  timer on");
        let record = EventRecord::new(EventKind::DateChange, 24, 12);
        assert_eq!(record.to_string(), "24.12. date change");
    }
}
