// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the smart-socket project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Holding register map of the socket
//!
//! Addresses are 1-based, exactly as they travel in the request PDU; there is
//! no register 0.
//!
//! | Address | Content |
//! |---|---|
//! | 1 | relay: dim value when on, 0 when off |
//! | 2 | flags (bit 0 default-on, 11 timers, 12 Fauxmo, 13 Modbus, 14 telnet, 15 power meter) |
//! | 3, 4 | uptime hours, minutes << 8 \| seconds |
//! | 5, 6 | time in current relay state |
//! | 7, 8 | accumulated on-time |
//! | 9..22 | energy Wh, factors V/A/W, measured V/A/W as f32, high word first |
//! | 23..54 | 16 timers × {days << 8 \| action, hour << 8 \| minute} |
//! | 55 | event slot count, 0 without event tracking |
//! | 56..95 | events, oldest first |
//! | 96, 97 | auto-off threshold (mA), auto-off cycles |
//!
//! Regions of features the device lacks stay in place and read as zero.

use chrono::NaiveDateTime;
use log::debug;
use thiserror::Error;
use tokio_modbus::prelude::ExceptionCode;

use crate::device::event_log::{EventKind, MAX_EVENTS};
use crate::device::measure::Quantity;
use crate::device::{DeviceState, TIMER_WORDS};
use crate::store::StoreError;

pub const SWITCH: u16 = 1;
pub const FLAGS: u16 = 2;
pub const UP_TIME: u16 = 3;
pub const STATE_TIME: u16 = 5;
pub const ON_TIME: u16 = 7;
pub const ENERGY: u16 = 9;
pub const FACTOR_VOLTAGE: u16 = 11;
pub const MEASURED_VOLTAGE: u16 = 17;
pub const TIMERS: u16 = 23;
pub const TIMERS_END: u16 = TIMERS + TIMER_WORDS as u16 - 1;
pub const EVENT_COUNT: u16 = TIMERS_END + 1;
pub const EVENTS: u16 = EVENT_COUNT + 1;
pub const AUTO_OFF_THRESHOLD: u16 = EVENTS + MAX_EVENTS as u16;
pub const AUTO_OFF_CYCLES: u16 = AUTO_OFF_THRESHOLD + 1;
/// Highest valid address.
pub const MAX_WORD: u16 = AUTO_OFF_CYCLES;

/// Reads of this many words or more are refused.
pub const READ_LIMIT: u16 = 126;

/// Vendor function code: set or reset a calibration factor.
pub const FC_CALIBRATE: u8 = 0x43;
/// Vendor function code: commit staged settings.
pub const FC_COMMIT: u8 = 0x42;

/// Exception code answered when settings could not be persisted.
pub const NEGATIVE_ACKNOWLEDGE: u8 = 0x07;

/// Why a register request was refused.
#[derive(Error, Debug)]
pub enum RegisterError {
    #[error("Illegal data address {address} ({words} words)")]
    IllegalDataAddress { address: u16, words: u16 },

    #[error("Illegal value {value:#06x} for register {address}")]
    IllegalDataValue { address: u16, value: u32 },

    #[error("Function code {code:#04x} not supported")]
    IllegalFunction { code: u8 },

    #[error("Nothing to commit")]
    NothingToCommit,

    #[error("Settings could not be persisted: {0}")]
    Persistence(#[from] StoreError),
}

impl From<RegisterError> for ExceptionCode {
    fn from(err: RegisterError) -> Self {
        match err {
            RegisterError::IllegalDataAddress { .. } => ExceptionCode::IllegalDataAddress,
            RegisterError::IllegalDataValue { .. } => ExceptionCode::IllegalDataValue,
            RegisterError::IllegalFunction { .. } => ExceptionCode::IllegalFunction,
            RegisterError::NothingToCommit | RegisterError::Persistence(_) => {
                ExceptionCode::Custom(NEGATIVE_ACKNOWLEDGE)
            }
        }
    }
}

fn push_f32(words: &mut Vec<u16>, value: f32) {
    let bits = value.to_bits();
    words.push((bits >> 16) as u16);
    words.push((bits & 0xFFFF) as u16);
}

/// All registers, index 0 holding address 1.
pub fn snapshot(device: &DeviceState) -> Vec<u16> {
    let capabilities = device.capabilities();
    let mut words = Vec::with_capacity(usize::from(MAX_WORD));

    words.push(device.switch_state().word());
    words.push(device.flags_word());
    words.extend(device.up_time().register_words());
    words.extend(device.state_time().register_words());
    words.extend(device.on_time().register_words());

    if capabilities.power_meter {
        let measures = device.measures();
        push_f32(&mut words, device.energy_wh() as f32);
        for quantity in Quantity::ALL {
            push_f32(&mut words, measures.factor(quantity));
        }
        for quantity in Quantity::ALL {
            push_f32(&mut words, measures.measured(quantity) as f32);
        }
    } else {
        words.extend([0u16; 14]);
    }

    words.extend((0..TIMER_WORDS).map(|offset| device.timers().read_word(offset)));

    if capabilities.event_tracking {
        let events = device.events();
        words.push(events.capacity() as u16);
        words.extend((0..MAX_EVENTS).map(|slot| events.read_slot(slot)));
    } else {
        words.push(0);
        words.extend([0u16; MAX_EVENTS]);
    }

    if capabilities.power_meter {
        words.push(device.auto_off().threshold_ma());
        words.push(device.auto_off().required_cycles());
    } else {
        words.extend([0, 0]);
    }

    debug_assert_eq!(words.len(), usize::from(MAX_WORD));
    words
}

/// Function code 0x03: read `words` registers starting at `address`.
pub fn read_holding_registers(
    device: &DeviceState,
    address: u16,
    words: u16,
) -> Result<Vec<u16>, RegisterError> {
    let last = u32::from(address) + u32::from(words);
    if address == 0 || words == 0 || words >= READ_LIMIT || last - 1 > u32::from(MAX_WORD) {
        return Err(RegisterError::IllegalDataAddress { address, words });
    }
    let start = usize::from(address) - 1;
    let values = snapshot(device)[start..start + usize::from(words)].to_vec();
    debug!("Read {} words at {}: {:?}", words, address, values);
    Ok(values)
}

/// Function code 0x06: write one register.
pub fn write_single_register(
    device: &mut DeviceState,
    address: u16,
    value: u16,
    now: NaiveDateTime,
) -> Result<(), RegisterError> {
    let power_meter = device.capabilities().power_meter;
    match address {
        SWITCH => {
            let dim = u8::try_from(value).map_err(|_| RegisterError::IllegalDataValue {
                address,
                value: u32::from(value),
            })?;
            let event = if dim == 0 {
                EventKind::ModbusOff
            } else {
                EventKind::ModbusOn
            };
            device.switch_to(dim, event, now);
        }
        FLAGS => device.set_config_flags(value)?,
        ENERGY if power_meter => {
            if value != 0 {
                return Err(RegisterError::IllegalDataValue {
                    address,
                    value: u32::from(value),
                });
            }
            device.reset_energy();
        }
        AUTO_OFF_THRESHOLD if power_meter => device.set_auto_off_threshold(value)?,
        AUTO_OFF_CYCLES if power_meter => device.set_auto_off_cycles(value)?,
        _ => return Err(RegisterError::IllegalDataAddress { address, words: 1 }),
    }
    debug!("Wrote {:#06x} to register {}", value, address);
    Ok(())
}

/// Function code 0x10: write consecutive timer registers.
pub fn write_multiple_registers(
    device: &mut DeviceState,
    address: u16,
    values: &[u16],
) -> Result<(), RegisterError> {
    if !device.capabilities().timers {
        return Err(RegisterError::IllegalFunction { code: 0x10 });
    }
    let words = u16::try_from(values.len()).unwrap_or(u16::MAX);
    let last = u32::from(address) + u32::from(words);
    if address < TIMERS || words == 0 || last - 1 > u32::from(TIMERS_END) {
        return Err(RegisterError::IllegalDataAddress { address, words });
    }
    device.write_timer_words(usize::from(address - TIMERS), values)?;
    debug!("Wrote {} timer words at {}", words, address);
    Ok(())
}

/// Function code 0x43: set (payload `selector, f32`) or reset (payload
/// `selector`) a calibration factor. The reply carries the selector and the
/// factor now in effect.
pub fn calibrate(device: &mut DeviceState, payload: &[u8]) -> Result<Vec<u8>, RegisterError> {
    if !device.capabilities().power_meter {
        return Err(RegisterError::IllegalFunction { code: FC_CALIBRATE });
    }
    let invalid = |value: u32| RegisterError::IllegalDataValue { address: 0, value };
    let (&selector, rest) = payload.split_first().ok_or_else(|| invalid(0))?;
    let quantity = Quantity::from_selector(selector).ok_or_else(|| invalid(u32::from(selector)))?;
    let factor = match rest.len() {
        0 => None,
        4 => Some(f32::from_be_bytes([rest[0], rest[1], rest[2], rest[3]])),
        len => return Err(invalid(len as u32)),
    };
    let factor = device.calibrate(quantity, factor)?;
    let mut reply = Vec::with_capacity(5);
    reply.push(selector);
    reply.extend_from_slice(&factor.to_be_bytes());
    Ok(reply)
}

/// Function code 0x42: commit staged settings.
pub fn commit(device: &mut DeviceState) -> Result<(), RegisterError> {
    if device.commit_settings()? {
        Ok(())
    } else {
        Err(RegisterError::NothingToCommit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Capabilities, CommitPolicy};
    use crate::device::event_log::EventRecord;
    use crate::device::tests::{at, boot, boot_with, BrokenStore};
    use crate::store::EepromImage;

    fn no_power_meter() -> DeviceState {
        boot_with(
            Box::new(EepromImage::in_memory()),
            Capabilities {
                power_meter: false,
                timers: true,
                event_tracking: false,
            },
        )
    }

    fn word_pair_to_f32(words: &[u16]) -> f32 {
        f32::from_bits((u32::from(words[0]) << 16) | u32::from(words[1]))
    }

    #[test]
    fn test_layout_constants() {
        assert_eq!(TIMERS_END, 54);
        assert_eq!(EVENT_COUNT, 55);
        assert_eq!(EVENTS, 56);
        assert_eq!(AUTO_OFF_THRESHOLD, 96);
        assert_eq!(MAX_WORD, 97);
    }

    #[test]
    fn test_read_lengths() {
        let device = boot();
        assert_eq!(read_holding_registers(&device, 1, 1).unwrap().len(), 1);
        assert_eq!(read_holding_registers(&device, 1, 97).unwrap().len(), 97);
        assert_eq!(read_holding_registers(&device, 97, 1).unwrap().len(), 1);
        assert_eq!(read_holding_registers(&device, 50, 10).unwrap().len(), 10);
    }

    #[test]
    fn test_every_valid_read_returns_requested_words() {
        let device = boot();
        for address in 1..=MAX_WORD {
            for words in 1..=(MAX_WORD - address + 1) {
                let data = read_holding_registers(&device, address, words).unwrap();
                assert_eq!(data.len(), usize::from(words), "read {} at {}", words, address);
            }
            assert!(matches!(
                read_holding_registers(&device, address, MAX_WORD - address + 2),
                Err(RegisterError::IllegalDataAddress { .. })
            ));
        }
    }

    #[test]
    fn test_first_timer_round_trip() {
        let mut device = boot();
        write_multiple_registers(&mut device, TIMERS, &[0x8101, 0x071E]).unwrap();
        assert_eq!(
            read_holding_registers(&device, TIMERS, 2).unwrap(),
            vec![0x8101, 0x071E]
        );
        let slot = device.timers().slot(0).copied().unwrap();
        assert_eq!((slot.hour, slot.minute, slot.on_off), (7, 30, 1));
    }

    #[test]
    fn test_read_rejections() {
        let device = boot();
        for (address, words) in [(0, 1), (1, 0), (97, 2), (98, 1), (1, 126), (u16::MAX, u16::MAX)] {
            assert!(
                matches!(
                    read_holding_registers(&device, address, words),
                    Err(RegisterError::IllegalDataAddress { .. })
                ),
                "{address}/{words} accepted"
            );
        }
    }

    #[test]
    fn test_read_has_no_side_effects() {
        let device = boot();
        let first = read_holding_registers(&device, 1, 97).unwrap();
        let second = read_holding_registers(&device, 1, 97).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_switch_round_trip() {
        let mut device = boot();
        write_single_register(&mut device, SWITCH, 128, at(9, 15)).unwrap();
        assert_eq!(read_holding_registers(&device, SWITCH, 1).unwrap(), vec![128]);
        assert_eq!(
            device.events().newest().and_then(EventRecord::kind),
            Some(EventKind::ModbusOn)
        );
        write_single_register(&mut device, SWITCH, 0, at(9, 16)).unwrap();
        assert_eq!(read_holding_registers(&device, SWITCH, 1).unwrap(), vec![0]);
        assert_eq!(
            device.events().newest().and_then(EventRecord::kind),
            Some(EventKind::ModbusOff)
        );
        assert!(matches!(
            write_single_register(&mut device, SWITCH, 256, at(9, 17)),
            Err(RegisterError::IllegalDataValue { .. })
        ));
        assert!(!device.is_on());
    }

    #[test]
    fn test_flags_write_keeps_default_on_bit() {
        let mut device = boot();
        write_single_register(&mut device, FLAGS, 0xFFFF, at(9, 0)).unwrap();
        let flags = read_holding_registers(&device, FLAGS, 1).unwrap()[0];
        assert_eq!(flags & 0x0001, 1);
        assert_eq!(flags & 0x07FE, 0);
        assert_eq!(flags & 0x2000, 0x2000);
    }

    #[test]
    fn test_energy_reset() {
        let mut device = boot();
        assert!(matches!(
            write_single_register(&mut device, ENERGY, 5, at(9, 0)),
            Err(RegisterError::IllegalDataValue { .. })
        ));
        write_single_register(&mut device, ENERGY, 0, at(9, 0)).unwrap();
        let words = read_holding_registers(&device, ENERGY, 2).unwrap();
        assert_eq!(word_pair_to_f32(&words), 0.0);
    }

    #[test]
    fn test_factors_read_as_floats() {
        let device = boot();
        let words = read_holding_registers(&device, FACTOR_VOLTAGE, 6).unwrap();
        assert_eq!(words[0..2], [0x3F80, 0x0000]);
        for pair in words.chunks(2) {
            assert_eq!(word_pair_to_f32(pair), 1.0);
        }
    }

    #[test]
    fn test_unknown_write_address() {
        let mut device = boot();
        for address in [0, 3, 17, 23, 55, 98] {
            assert!(matches!(
                write_single_register(&mut device, address, 0, at(9, 0)),
                Err(RegisterError::IllegalDataAddress { .. })
            ));
        }
    }

    #[test]
    fn test_auto_off_registers() {
        let mut device = boot();
        write_single_register(&mut device, AUTO_OFF_THRESHOLD, 150, at(9, 0)).unwrap();
        write_single_register(&mut device, AUTO_OFF_CYCLES, 4, at(9, 0)).unwrap();
        assert_eq!(
            read_holding_registers(&device, AUTO_OFF_THRESHOLD, 2).unwrap(),
            vec![150, 4]
        );
    }

    #[test]
    fn test_timer_round_trip() {
        let mut device = boot();
        write_multiple_registers(&mut device, 25, &[0x8301, 0x0C1E]).unwrap();
        assert_eq!(
            read_holding_registers(&device, 25, 2).unwrap(),
            vec![0x8301, 0x0C1E]
        );
        // Other slots untouched
        assert_eq!(read_holding_registers(&device, 23, 2).unwrap(), vec![0, 0]);
    }

    #[test]
    fn test_timer_normalisation() {
        let mut device = boot();
        write_multiple_registers(&mut device, 24, &[(25 << 8) | 61]).unwrap();
        assert_eq!(read_holding_registers(&device, 24, 1).unwrap(), vec![0x0101]);
    }

    #[test]
    fn test_timer_range_checks() {
        let mut device = boot();
        for (address, len) in [(22, 2), (55, 1), (54, 2), (23, 0), (1, 1)] {
            let values = vec![0u16; len];
            assert!(
                matches!(
                    write_multiple_registers(&mut device, address, &values),
                    Err(RegisterError::IllegalDataAddress { .. })
                ),
                "{address}/{len} accepted"
            );
        }
        write_multiple_registers(&mut device, 23, &[0u16; 32]).unwrap();
        write_multiple_registers(&mut device, 54, &[0x1700]).unwrap();
    }

    #[test]
    fn test_timers_need_capability() {
        let mut device = boot_with(
            Box::new(EepromImage::in_memory()),
            Capabilities {
                power_meter: true,
                timers: false,
                event_tracking: true,
            },
        );
        assert!(matches!(
            write_multiple_registers(&mut device, 23, &[1]),
            Err(RegisterError::IllegalFunction { code: 0x10 })
        ));
    }

    #[test]
    fn test_events_region() {
        let mut device = boot();
        assert_eq!(read_holding_registers(&device, EVENT_COUNT, 1).unwrap(), vec![40]);
        write_single_register(&mut device, SWITCH, 1, at(14, 7)).unwrap();
        let events = read_holding_registers(&device, EVENTS, 4).unwrap();
        let kinds: Vec<_> = events
            .iter()
            .map(|&word| EventRecord::from_word(word).kind())
            .collect();
        assert_eq!(
            kinds,
            vec![
                Some(EventKind::BootDate),
                Some(EventKind::BootTime),
                Some(EventKind::ModbusOn),
                Some(EventKind::NoEvent)
            ]
        );
        assert_eq!(events[3], 0);
        assert_eq!(EventRecord::from_word(events[2]).hi(), 14);
    }

    #[test]
    fn test_missing_features_read_zero() {
        let mut device = no_power_meter();
        let words = read_holding_registers(&device, 1, MAX_WORD).unwrap();
        assert!(words[usize::from(ENERGY) - 1..22].iter().all(|&w| w == 0));
        assert_eq!(words[usize::from(EVENT_COUNT) - 1], 0);
        assert!(words[usize::from(EVENTS) - 1..].iter().all(|&w| w == 0));
        assert_eq!(words[1] & 0x8000, 0);

        for address in [ENERGY, AUTO_OFF_THRESHOLD, AUTO_OFF_CYCLES] {
            assert!(matches!(
                write_single_register(&mut device, address, 0, at(9, 0)),
                Err(RegisterError::IllegalDataAddress { .. })
            ));
        }
        assert!(matches!(
            calibrate(&mut device, &[0]),
            Err(RegisterError::IllegalFunction { .. })
        ));
    }

    #[test]
    fn test_calibration() {
        let mut device = boot();
        let mut payload = vec![1];
        payload.extend_from_slice(&0.95f32.to_be_bytes());
        let reply = calibrate(&mut device, &payload).unwrap();
        assert_eq!(reply, payload);
        assert_eq!(device.measures().factor(Quantity::Current), 0.95);

        let reply = calibrate(&mut device, &[1]).unwrap();
        assert_eq!(reply[1..], 1.0f32.to_be_bytes());
        assert_eq!(device.measures().factor(Quantity::Current), 1.0);

        assert!(matches!(
            calibrate(&mut device, &[3]),
            Err(RegisterError::IllegalDataValue { .. })
        ));
        assert!(matches!(
            calibrate(&mut device, &[0, 1, 2]),
            Err(RegisterError::IllegalDataValue { .. })
        ));
        assert!(calibrate(&mut device, &[]).is_err());

        // Any received value replaces the factor
        let mut payload = vec![2];
        payload.extend_from_slice(&(-0.5f32).to_be_bytes());
        assert_eq!(calibrate(&mut device, &payload).unwrap(), payload);
        assert_eq!(device.measures().factor(Quantity::Power), -0.5);
        let mut payload = vec![0];
        payload.extend_from_slice(&0.0f32.to_be_bytes());
        calibrate(&mut device, &payload).unwrap();
        assert_eq!(device.measures().factor(Quantity::Voltage), 0.0);
    }

    #[test]
    fn test_persistence_failure_is_negative_acknowledge() {
        let mut device = boot_with(Box::new(BrokenStore), Capabilities::default());
        let err = write_single_register(&mut device, FLAGS, 1, at(9, 0)).unwrap_err();
        assert!(matches!(err, RegisterError::Persistence(_)));
        assert_eq!(
            ExceptionCode::from(err),
            ExceptionCode::Custom(NEGATIVE_ACKNOWLEDGE)
        );
        assert_eq!(read_holding_registers(&device, FLAGS, 1).unwrap()[0] & 1, 0);
    }

    #[test]
    fn test_commit() {
        let mut device = DeviceState::boot(
            "test",
            Capabilities::default(),
            5000,
            CommitPolicy::Deferred,
            Box::new(EepromImage::in_memory()),
            at(8, 0),
        )
        .unwrap();
        assert!(matches!(commit(&mut device), Err(RegisterError::NothingToCommit)));
        write_single_register(&mut device, AUTO_OFF_CYCLES, 3, at(9, 0)).unwrap();
        commit(&mut device).unwrap();
        assert!(matches!(commit(&mut device), Err(RegisterError::NothingToCommit)));
    }
}
