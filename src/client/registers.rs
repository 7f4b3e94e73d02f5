// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the smart-socket project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Decoding and formatting of the register blocks the client reads.

use std::fmt;

use crate::device::event_log::EventRecord;
use crate::device::measure::Quantity;
use crate::device::timer_table::{TimerSlot, TIMER_ACTIVE, TIMER_ON};
use crate::device::{
    CONF_DEFAULT_ON, CONF_HAS_FAUXMO, CONF_HAS_MODBUS, CONF_HAS_POWER, CONF_HAS_TELNET,
    CONF_TIMERS,
};
use crate::modbus::register_map::{
    ENERGY, FACTOR_VOLTAGE, FLAGS, MEASURED_VOLTAGE, ON_TIME, STATE_TIME, SWITCH, UP_TIME,
};

use super::command::DAY_NAMES;
use super::ClientError;

/// Words of the basic block starting at the switch register.
pub const BASIC_WORDS: u16 = ENERGY - SWITCH;
/// Words of the power block starting at the energy register.
pub const POWER_WORDS: u16 = 14;

/// Float stored high word first.
pub fn words_to_f32(hi: u16, lo: u16) -> f32 {
    f32::from_bits((u32::from(hi) << 16) | u32::from(lo))
}

fn check_len(words: &[u16], expected: u16, block: &str) -> Result<(), ClientError> {
    if words.len() != usize::from(expected) {
        return Err(ClientError::UnexpectedResponse {
            reason: format!(
                "{} block has {} words, expected {}",
                block,
                words.len(),
                expected
            ),
        });
    }
    Ok(())
}

/// A duration counter as the device reports it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Elapsed {
    pub hours: u16,
    pub minutes: u8,
    pub seconds: u8,
}

impl Elapsed {
    pub fn from_words(hours: u16, minutes_seconds: u16) -> Self {
        Self {
            hours,
            minutes: (minutes_seconds >> 8) as u8,
            seconds: (minutes_seconds & 0xFF) as u8,
        }
    }
}

impl fmt::Display for Elapsed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:4}:{:02}:{:02}", self.hours, self.minutes, self.seconds)
    }
}

/// Registers 1..8: switch, flags and the three duration counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BasicInfo {
    pub on_state: u16,
    pub flags: u16,
    pub up_time: Elapsed,
    pub state_time: Elapsed,
    pub on_time: Elapsed,
}

impl BasicInfo {
    pub fn from_words(words: &[u16]) -> Result<Self, ClientError> {
        check_len(words, BASIC_WORDS, "Basic")?;
        let at = |address: u16| usize::from(address - SWITCH);
        let elapsed = |address: u16| Elapsed::from_words(words[at(address)], words[at(address) + 1]);
        Ok(Self {
            on_state: words[at(SWITCH)],
            flags: words[at(FLAGS)],
            up_time: elapsed(UP_TIME),
            state_time: elapsed(STATE_TIME),
            on_time: elapsed(ON_TIME),
        })
    }

    pub fn has_power_meter(&self) -> bool {
        self.flags & CONF_HAS_POWER != 0
    }

    pub fn has_timers(&self) -> bool {
        self.flags & CONF_TIMERS != 0
    }

    pub fn default_on(&self) -> bool {
        self.flags & CONF_DEFAULT_ON != 0
    }

    pub fn state_name(&self) -> &'static str {
        if self.on_state != 0 {
            "ON"
        } else {
            "OFF"
        }
    }

    /// Feature line followed by the durations, as printed by INFO.
    pub fn describe(&self) -> Vec<String> {
        let mut features = String::new();
        for (bit, name) in [
            (CONF_HAS_POWER, "Power meter| "),
            (CONF_HAS_TELNET, "Telnet server| "),
            (CONF_HAS_MODBUS, "Modbus server| "),
            (CONF_HAS_FAUXMO, "Fauxmo server (Alexa)| "),
            (CONF_TIMERS, "Timers| "),
        ] {
            if self.flags & bit != 0 {
                features.push_str(name);
            }
        }
        features.push_str(if self.default_on() {
            "Default: ON"
        } else {
            "Default: OFF"
        });

        vec![
            features,
            format!("Running since {}", self.up_time),
            format!("ON time       {}", self.on_time),
            format!(
                "{:<3} ({:3}) for {}",
                self.state_name(),
                self.on_state,
                self.state_time
            ),
        ]
    }

    /// One EVERY table row, without the power columns.
    pub fn row(&self, loop_count: u64) -> String {
        format!(
            "{:4}: {}  {}  {:<3} {} ",
            loop_count,
            self.up_time,
            self.on_time,
            self.state_name(),
            self.state_time
        )
    }
}

/// Registers 9..22: energy, calibration factors and measures.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PowerInfo {
    pub energy_wh: f32,
    pub factors: [f32; 3],
    pub measured: [f32; 3],
}

impl PowerInfo {
    pub fn from_words(words: &[u16]) -> Result<Self, ClientError> {
        check_len(words, POWER_WORDS, "Power")?;
        let float = |address: u16| {
            let i = usize::from(address - ENERGY);
            words_to_f32(words[i], words[i + 1])
        };
        let quantity_at = |base: u16, quantity: Quantity| float(base + 2 * u16::from(quantity.selector()));
        Ok(Self {
            energy_wh: float(ENERGY),
            factors: Quantity::ALL.map(|q| quantity_at(FACTOR_VOLTAGE, q)),
            measured: Quantity::ALL.map(|q| quantity_at(MEASURED_VOLTAGE, q)),
        })
    }

    pub fn factor(&self, quantity: Quantity) -> f32 {
        self.factors[quantity.index()]
    }

    pub fn measured(&self, quantity: Quantity) -> f32 {
        self.measured[quantity.index()]
    }

    pub fn describe(&self) -> Vec<String> {
        vec![
            format!("accumulated   {:10.2} kWh", self.energy_wh / 1000.0),
            format!("Power         {:10.2} W", self.measured(Quantity::Power)),
            format!("Voltage       {:10.2} V", self.measured(Quantity::Voltage)),
            format!("Current       {:10.2} A", self.measured(Quantity::Current)),
        ]
    }

    pub fn describe_factors(&self) -> Vec<String> {
        let mut lines = vec!["Correction factors:".to_string()];
        lines.extend(
            Quantity::ALL
                .iter()
                .map(|q| format!("{}: {:10.5}", q.unit(), self.factor(*q))),
        );
        lines
    }

    /// Power columns of an EVERY table row.
    pub fn row(&self) -> String {
        format!(
            "{:10.2}  {:10.2}  {:10.2}  {:10.2}",
            self.energy_wh / 1000.0,
            self.measured(Quantity::Power),
            self.measured(Quantity::Voltage),
            self.measured(Quantity::Current)
        )
    }
}

/// Header printed every 24 EVERY rows.
pub const TABLE_HEADER: &str =
    "Loop:   Run time     ON time  now      since        kWh           W           V           A";

/// Timer line, `number` counting from 1.
pub fn format_timer(number: usize, slot: &TimerSlot) -> String {
    let mut line = format!(
        "Timer {:2}: {:>3} {:>3} {:02}:{:02}",
        number,
        if slot.active_days & TIMER_ACTIVE != 0 {
            "ACT"
        } else {
            ""
        },
        if slot.on_off & TIMER_ON != 0 { "ON" } else { "OFF" },
        slot.hour,
        slot.minute
    );
    for (bit, day) in DAY_NAMES.iter().enumerate() {
        if slot.active_days & (1 << bit) != 0 {
            line.push(' ');
            line.push_str(day);
        }
    }
    line
}

/// Decode the timer block into slots.
pub fn decode_timers(words: &[u16]) -> Vec<TimerSlot> {
    words
        .chunks_exact(2)
        .map(|pair| TimerSlot::from_words([pair[0], pair[1]]))
        .collect()
}

/// Decode the event region, skipping unused slots.
pub fn decode_events(words: &[u16]) -> Vec<EventRecord> {
    words
        .iter()
        .copied()
        .filter(|word| *word != 0)
        .map(EventRecord::from_word)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::event_log::EventKind;
    use crate::device::timer_table::WORKDAYS;

    fn f32_words(value: f32) -> [u16; 2] {
        let bits = value.to_bits();
        [(bits >> 16) as u16, bits as u16]
    }

    #[test]
    fn test_basic_info() {
        let words = [255, CONF_HAS_MODBUS | CONF_DEFAULT_ON, 12, 0x0304, 0, 0x0010, 1, 0x3B3B];
        let info = BasicInfo::from_words(&words).unwrap();
        assert_eq!(info.state_name(), "ON");
        assert!(info.default_on());
        assert!(!info.has_power_meter());
        assert_eq!(
            info.up_time,
            Elapsed {
                hours: 12,
                minutes: 3,
                seconds: 4
            }
        );
        let lines = info.describe();
        assert_eq!(lines[0], "Modbus server| Default: ON");
        assert_eq!(lines[1], "Running since   12:03:04");
        assert_eq!(lines[2], "ON time          1:59:59");
        assert_eq!(lines[3], "ON  (255) for    0:00:16");
        assert!(BasicInfo::from_words(&words[..7]).is_err());
    }

    #[test]
    fn test_power_info() {
        let mut words = Vec::new();
        for value in [1500.0f32, 1.0, 1.5, 2.0, 230.0, 0.5, 115.0] {
            words.extend(f32_words(value));
        }
        let info = PowerInfo::from_words(&words).unwrap();
        assert_eq!(info.energy_wh, 1500.0);
        assert_eq!(info.factor(Quantity::Current), 1.5);
        assert_eq!(info.measured(Quantity::Voltage), 230.0);
        assert_eq!(info.measured(Quantity::Power), 115.0);
        assert_eq!(info.describe()[0], "accumulated         1.50 kWh");
        assert_eq!(info.describe_factors()[3], "W:    2.00000");
    }

    #[test]
    fn test_format_timer() {
        let slot = TimerSlot {
            active_days: TIMER_ACTIVE | WORKDAYS,
            on_off: TIMER_ON,
            hour: 6,
            minute: 45,
        };
        assert_eq!(
            format_timer(1, &slot),
            "Timer  1: ACT  ON 06:45 MON TUE WED THU FRI"
        );
        assert_eq!(format_timer(16, &TimerSlot::default()), "Timer 16:     OFF 00:00");
    }

    #[test]
    fn test_decode_events() {
        let boot = EventRecord::new(EventKind::BootTime, 7, 30).word();
        let events = decode_events(&[boot, 0, 0]);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].to_string(), "07:30  boot time");
    }
}
