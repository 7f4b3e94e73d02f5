// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the smart-socket project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Command words of the `smartdose` client and their arguments.
//!
//! Command and argument words are case-insensitive.

use crate::device::measure::Quantity;
use crate::device::timer_table::{
    TimerSlot, TIMER_ACTIVE, TIMER_DAYS, TIMER_ON, TIMER_SLOTS, WEEKEND, WORKDAYS,
};

use super::ClientError;

/// Day names in weekday bit order, Sunday being bit 0.
pub const DAY_NAMES: [&str; 7] = ["SUN", "MON", "TUE", "WED", "THU", "FRI", "SAT"];

/// One client command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Print the basic, power and timer blocks the device has.
    Info,
    /// Repeat the state as a table every n seconds.
    Every(u64),
    On,
    Off,
    /// Set or clear the default-on flag.
    Default(bool),
    /// Reset the energy counter.
    Reset,
    /// Show the calibration factors (`None`) or set one; a missing factor
    /// resets it to 1.0.
    Adjust(Option<(Quantity, Option<f32>)>),
    /// Show or edit timer `index` (0 based).
    Timer { index: usize, edits: Vec<TimerEdit> },
    Events,
    /// Show the auto-off settings or set threshold (mA) and cycles.
    AutoOff(Option<(u16, u16)>),
}

/// One edit applied to a timer slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerEdit {
    SwitchOn(bool),
    Active(bool),
    /// Add weekday bits.
    Days(u8),
    Time { hour: u8, minute: u8 },
    Clear,
}

impl TimerEdit {
    /// Parse one timer argument.
    pub fn parse(arg: &str) -> Result<Self, ClientError> {
        let word = arg.to_ascii_uppercase();
        let edit = match word.as_str() {
            "ON" => TimerEdit::SwitchOn(true),
            "OFF" => TimerEdit::SwitchOn(false),
            "ACTIVE" => TimerEdit::Active(true),
            "INACTIVE" => TimerEdit::Active(false),
            "WORK" | "WORKDAYS" => TimerEdit::Days(WORKDAYS),
            "WEEKEND" => TimerEdit::Days(WEEKEND),
            "DAILY" => TimerEdit::Days(TIMER_DAYS),
            "CLEAR" => TimerEdit::Clear,
            _ if word.starts_with(|c: char| c.is_ascii_digit()) => parse_time(&word)?,
            _ => {
                let day = DAY_NAMES
                    .iter()
                    .position(|day| word.starts_with(day))
                    .ok_or_else(|| {
                        ClientError::usage(format!("Invalid TIMER parameter '{}'!", arg))
                    })?;
                TimerEdit::Days(1 << day)
            }
        };
        Ok(edit)
    }

    pub fn apply(self, slot: &mut TimerSlot) {
        match self {
            TimerEdit::SwitchOn(true) => slot.on_off |= TIMER_ON,
            TimerEdit::SwitchOn(false) => slot.on_off &= !TIMER_ON,
            TimerEdit::Active(true) => slot.active_days |= TIMER_ACTIVE,
            TimerEdit::Active(false) => slot.active_days &= !TIMER_ACTIVE,
            TimerEdit::Days(days) => slot.active_days |= days,
            TimerEdit::Time { hour, minute } => {
                slot.hour = hour;
                slot.minute = minute;
            }
            TimerEdit::Clear => *slot = TimerSlot::default(),
        }
    }
}

fn parse_time(word: &str) -> Result<TimerEdit, ClientError> {
    let (hour, minute) = word
        .split_once(':')
        .ok_or_else(|| ClientError::usage("Time must be given as HH:MM!"))?;
    let hour = hour
        .parse::<u8>()
        .ok()
        .filter(|h| *h < 24)
        .ok_or_else(|| ClientError::usage("Hour must be 0..23!"))?;
    let minute = minute
        .parse::<u8>()
        .ok()
        .filter(|m| *m < 60)
        .ok_or_else(|| ClientError::usage("Minute must be 0..59!"))?;
    Ok(TimerEdit::Time { hour, minute })
}

impl Command {
    /// Parse the words following the target. No word at all means INFO.
    pub fn parse<S: AsRef<str>>(words: &[S]) -> Result<Self, ClientError> {
        let Some((first, args)) = words.split_first() else {
            return Ok(Command::Info);
        };
        let arg = |i: usize| args.get(i).map(|a| a.as_ref());

        let command = match first.as_ref().to_ascii_uppercase().as_str() {
            "INFO" => Command::Info,
            "ON" => Command::On,
            "OFF" => Command::Off,
            "EVENTS" => Command::Events,
            "RESET" => Command::Reset,
            "EVERY" => {
                let seconds = arg(0)
                    .and_then(|s| s.parse::<u64>().ok())
                    .filter(|s| *s > 0)
                    .ok_or_else(|| ClientError::usage("EVERY needs an interval > 0s"))?;
                Command::Every(seconds)
            }
            "DEFAULT" => match arg(0).map(str::to_ascii_uppercase).as_deref() {
                Some("ON") => Command::Default(true),
                Some("OFF") => Command::Default(false),
                _ => return Err(ClientError::usage("DEFAULT requires ON or OFF!")),
            },
            "ADJUST" | "FACTOR" => match arg(0) {
                None => Command::Adjust(None),
                Some(unit) => {
                    let quantity = Quantity::from_unit(unit)
                        .ok_or_else(|| ClientError::usage("ADJUST needs a unit (V/A/W)!"))?;
                    let factor = arg(1)
                        .map(|f| {
                            f.parse::<f32>()
                                .ok()
                                .filter(|f| f.is_finite())
                                .ok_or_else(|| ClientError::usage("Factor must be a number!"))
                        })
                        .transpose()?;
                    Command::Adjust(Some((quantity, factor)))
                }
            },
            "TIMER" => {
                let index = arg(0)
                    .ok_or_else(|| ClientError::usage("TIMER requires a timer number at least!"))?
                    .parse::<usize>()
                    .ok()
                    .filter(|n| (1..=TIMER_SLOTS).contains(n))
                    .ok_or_else(|| ClientError::usage("TIMER number must be 1..16!"))?;
                let edits = args
                    .iter()
                    .skip(1)
                    .map(|a| TimerEdit::parse(a.as_ref()))
                    .collect::<Result<Vec<_>, _>>()?;
                Command::Timer {
                    index: index - 1,
                    edits,
                }
            }
            "AUTOOFF" => match (arg(0), arg(1)) {
                (None, _) => Command::AutoOff(None),
                (Some(threshold), Some(cycles)) => {
                    let threshold = threshold
                        .parse::<u16>()
                        .map_err(|_| ClientError::usage("Threshold must be 0..65535 mA!"))?;
                    let cycles = cycles
                        .parse::<u16>()
                        .map_err(|_| ClientError::usage("Cycles must be 0..65535!"))?;
                    Command::AutoOff(Some((threshold, cycles)))
                }
                (Some(_), None) => {
                    return Err(ClientError::usage(
                        "AUTOOFF needs both a threshold and a cycle count!",
                    ))
                }
            },
            other => return Err(ClientError::usage(format!("Invalid command '{}'!", other))),
        };
        Ok(command)
    }
}

/// Usage text printed with every usage error.
pub fn usage() -> String {
    [
        "Usage: smartdose host[:port[:serverID]] [cmd [cmd_parms]]",
        "  cmd: INFO | ON | OFF | DEFAULT | EVERY | RESET | ADJUST | TIMER | EVENTS | AUTOOFF",
        "  DEFAULT ON|OFF",
        "  EVERY <seconds>",
        "  ADJUST [V|A|W [<factor>]]",
        "  TIMER <n> [<arg> [<arg> [...]]]",
        "    n: 1..16",
        "    arg: ACTIVE|INACTIVE|ON|OFF|DAILY|WORKDAYS|WEEKEND|<day>|<hh24>:<mm>|CLEAR",
        "    day: SUN|MON|TUE|WED|THU|FRI|SAT",
        "  AUTOOFF [<threshold mA> <cycles>]",
    ]
    .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(line: &str) -> Result<Command, ClientError> {
        let words: Vec<&str> = line.split_whitespace().collect();
        Command::parse(&words)
    }

    #[test]
    fn test_no_command_is_info() {
        assert_eq!(parse("").unwrap(), Command::Info);
        assert_eq!(parse("info").unwrap(), Command::Info);
    }

    #[test]
    fn test_simple_commands() {
        assert_eq!(parse("On").unwrap(), Command::On);
        assert_eq!(parse("OFF").unwrap(), Command::Off);
        assert_eq!(parse("default on").unwrap(), Command::Default(true));
        assert_eq!(parse("every 10").unwrap(), Command::Every(10));
        assert!(parse("every 0").is_err());
        assert!(parse("default maybe").is_err());
        assert!(parse("toggle").is_err());
    }

    #[test]
    fn test_adjust() {
        assert_eq!(parse("ADJUST").unwrap(), Command::Adjust(None));
        assert_eq!(
            parse("adjust w").unwrap(),
            Command::Adjust(Some((Quantity::Power, None)))
        );
        assert_eq!(
            parse("FACTOR V 1.05").unwrap(),
            Command::Adjust(Some((Quantity::Voltage, Some(1.05))))
        );
        assert!(parse("ADJUST X").is_err());
        assert!(parse("ADJUST A two").is_err());
        assert_eq!(
            parse("ADJUST A -2").unwrap(),
            Command::Adjust(Some((Quantity::Current, Some(-2.0))))
        );
    }

    #[test]
    fn test_timer_command() {
        assert_eq!(
            parse("TIMER 3").unwrap(),
            Command::Timer {
                index: 2,
                edits: vec![]
            }
        );
        let Command::Timer { index, edits } = parse("timer 16 active on work 7:30").unwrap() else {
            panic!("not a timer command");
        };
        assert_eq!(index, 15);
        assert_eq!(
            edits,
            vec![
                TimerEdit::Active(true),
                TimerEdit::SwitchOn(true),
                TimerEdit::Days(WORKDAYS),
                TimerEdit::Time { hour: 7, minute: 30 },
            ]
        );
        assert!(parse("TIMER").is_err());
        assert!(parse("TIMER 17").is_err());
        assert!(parse("TIMER 1 24:00").is_err());
        assert!(parse("TIMER 1 12:60").is_err());
        assert!(parse("TIMER 1 1230").is_err());
        assert!(parse("TIMER 1 NOON").is_err());
    }

    #[test]
    fn test_timer_edits_apply() {
        let mut slot = TimerSlot::default();
        for arg in ["ACTIVE", "ON", "SUN", "saturday", "22:15"] {
            TimerEdit::parse(arg).unwrap().apply(&mut slot);
        }
        assert_eq!(slot.active_days, TIMER_ACTIVE | WEEKEND);
        assert!(slot.switches_on());
        assert_eq!((slot.hour, slot.minute), (22, 15));

        TimerEdit::parse("inactive").unwrap().apply(&mut slot);
        assert!(!slot.is_active());
        TimerEdit::parse("clear").unwrap().apply(&mut slot);
        assert_eq!(slot, TimerSlot::default());
    }

    #[test]
    fn test_auto_off() {
        assert_eq!(parse("AUTOOFF").unwrap(), Command::AutoOff(None));
        assert_eq!(
            parse("autooff 50 12").unwrap(),
            Command::AutoOff(Some((50, 12)))
        );
        assert!(parse("AUTOOFF 50").is_err());
        assert!(parse("AUTOOFF -1 3").is_err());
    }
}
