// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the smart-socket project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! EEPROM compatible settings image
//!
//! Layout (little endian):
//!
//! | Offset | Size | Content |
//! |---|---|---|
//! | 0 | 2 | magic `0x4711` |
//! | 2 | 2 | configuration flags |
//! | 4 | 4 | voltage factor (f32) |
//! | 8 | 4 | current factor (f32) |
//! | 12 | 4 | power factor (f32) |
//! | 16 | 64 | SSID |
//! | 80 | 64 | WiFi password |
//! | 144 | 64 | device name |
//! | 208 | 64 | OTA password |
//! | 272 | 64 | 16 timers × {days, action, hour, minute} |
//! | 336 | 2 | auto-off threshold (mA) |
//! | 338 | 2 | auto-off cycles |
//!
//! Strings are NUL terminated and at most 63 bytes long.

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info};

use super::{
    ConfigStore, NetworkSettings, PersistedSettings, Savepoint, StoreEntry, StoreError,
    MAX_STRING_LEN,
};
use crate::device::measure::Quantity;
use crate::device::timer_table::{TimerSlot, TIMER_SLOTS};

pub const IMAGE_SIZE: usize = 512;
pub const MAGIC: u16 = 0x4711;

const MAGIC_OFFSET: usize = 0;
const FLAGS_OFFSET: usize = 2;
const FACTORS_OFFSET: usize = 4;
const STRINGS_OFFSET: usize = 16;
const STRING_LEN: usize = MAX_STRING_LEN + 1;
const TIMERS_OFFSET: usize = STRINGS_OFFSET + 4 * STRING_LEN;
const AUTO_OFF_THRESHOLD_OFFSET: usize = TIMERS_OFFSET + 4 * TIMER_SLOTS;
const AUTO_OFF_CYCLES_OFFSET: usize = AUTO_OFF_THRESHOLD_OFFSET + 2;

const STRING_FIELDS: [&str; 4] = ["ssid", "password", "device_name", "ota_password"];

/// 512 byte settings image, kept in memory and optionally mirrored to a file.
#[derive(Debug, Clone)]
pub struct EepromImage {
    bytes: Vec<u8>,
    path: Option<PathBuf>,
    pending: bool,
}

impl EepromImage {
    /// Blank image living in memory only.
    pub fn in_memory() -> Self {
        Self {
            bytes: vec![0; IMAGE_SIZE],
            path: None,
            pending: false,
        }
    }

    /// Image backed by `path`. A missing file yields a blank image that is
    /// created on the first commit.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let bytes = if path.exists() {
            let bytes = fs::read(&path).map_err(|source| StoreError::Io {
                path: path.clone(),
                source,
            })?;
            if bytes.len() != IMAGE_SIZE {
                return Err(StoreError::InvalidSize {
                    expected: IMAGE_SIZE,
                    actual: bytes.len(),
                });
            }
            debug!("Loaded settings image from {:?}", path);
            bytes
        } else {
            info!("No settings image at {:?}, starting blank", path);
            vec![0; IMAGE_SIZE]
        };
        Ok(Self {
            bytes,
            path: Some(path),
            pending: false,
        })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    fn read_u16(&self, offset: usize) -> u16 {
        u16::from_le_bytes([self.bytes[offset], self.bytes[offset + 1]])
    }

    fn write_u16(&mut self, offset: usize, value: u16) {
        self.bytes[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
    }

    fn read_f32(&self, offset: usize) -> f32 {
        let mut raw = [0u8; 4];
        raw.copy_from_slice(&self.bytes[offset..offset + 4]);
        f32::from_le_bytes(raw)
    }

    fn write_f32(&mut self, offset: usize, value: f32) {
        self.bytes[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    }

    fn read_string(&self, field: usize) -> String {
        let start = STRINGS_OFFSET + field * STRING_LEN;
        let raw = &self.bytes[start..start + STRING_LEN];
        let end = raw.iter().position(|&b| b == 0).unwrap_or(MAX_STRING_LEN);
        String::from_utf8_lossy(&raw[..end]).into_owned()
    }

    fn check_string(field: usize, value: &str) -> Result<(), StoreError> {
        if value.len() > MAX_STRING_LEN {
            return Err(StoreError::StringTooLong {
                field: STRING_FIELDS[field],
                max: MAX_STRING_LEN,
            });
        }
        Ok(())
    }

    fn write_string(&mut self, field: usize, value: &str) {
        let start = STRINGS_OFFSET + field * STRING_LEN;
        let slot = &mut self.bytes[start..start + STRING_LEN];
        slot.fill(0);
        slot[..value.len()].copy_from_slice(value.as_bytes());
    }

    fn write_network(&mut self, network: &NetworkSettings) -> Result<(), StoreError> {
        let values = [
            network.ssid.as_str(),
            network.password.as_str(),
            network.device_name.as_str(),
            network.ota_password.as_str(),
        ];
        for (field, value) in values.iter().enumerate() {
            Self::check_string(field, value)?;
        }
        for (field, value) in values.iter().enumerate() {
            self.write_string(field, value);
        }
        Ok(())
    }

    fn write_timer(&mut self, index: usize, slot: &TimerSlot) -> Result<(), StoreError> {
        if index >= TIMER_SLOTS {
            return Err(StoreError::InvalidTimerSlot { index });
        }
        let start = TIMERS_OFFSET + 4 * index;
        self.bytes[start..start + 4].copy_from_slice(&slot.to_bytes());
        Ok(())
    }

    fn read_timer(&self, index: usize) -> TimerSlot {
        let start = TIMERS_OFFSET + 4 * index;
        let mut raw = [0u8; 4];
        raw.copy_from_slice(&self.bytes[start..start + 4]);
        TimerSlot::from_bytes(raw)
    }
}

impl ConfigStore for EepromImage {
    fn load(&mut self) -> Result<Option<PersistedSettings>, StoreError> {
        if self.read_u16(MAGIC_OFFSET) != MAGIC {
            return Ok(None);
        }
        let mut timers = [TimerSlot::default(); TIMER_SLOTS];
        for (index, timer) in timers.iter_mut().enumerate() {
            *timer = self.read_timer(index);
        }
        Ok(Some(PersistedSettings {
            flags: self.read_u16(FLAGS_OFFSET),
            factors: [
                self.read_f32(FACTORS_OFFSET),
                self.read_f32(FACTORS_OFFSET + 4),
                self.read_f32(FACTORS_OFFSET + 8),
            ],
            network: NetworkSettings {
                ssid: self.read_string(0),
                password: self.read_string(1),
                device_name: self.read_string(2),
                ota_password: self.read_string(3),
            },
            timers,
            auto_off_threshold: self.read_u16(AUTO_OFF_THRESHOLD_OFFSET),
            auto_off_cycles: self.read_u16(AUTO_OFF_CYCLES_OFFSET),
        }))
    }

    fn format(&mut self, settings: &PersistedSettings) -> Result<(), StoreError> {
        let mut image = Self::in_memory();
        image.write_u16(MAGIC_OFFSET, MAGIC);
        image.write_u16(FLAGS_OFFSET, settings.flags);
        for quantity in Quantity::ALL {
            image.write_f32(
                FACTORS_OFFSET + 4 * quantity.index(),
                settings.factors[quantity.index()],
            );
        }
        image.write_network(&settings.network)?;
        for (index, slot) in settings.timers.iter().enumerate() {
            image.write_timer(index, slot)?;
        }
        image.write_u16(AUTO_OFF_THRESHOLD_OFFSET, settings.auto_off_threshold);
        image.write_u16(AUTO_OFF_CYCLES_OFFSET, settings.auto_off_cycles);
        self.bytes = image.bytes;
        self.pending = true;
        Ok(())
    }

    fn put(&mut self, entry: StoreEntry) -> Result<(), StoreError> {
        match &entry {
            StoreEntry::Flags(flags) => self.write_u16(FLAGS_OFFSET, *flags),
            StoreEntry::Factor(quantity, factor) => {
                self.write_f32(FACTORS_OFFSET + 4 * quantity.index(), *factor)
            }
            StoreEntry::Timer(index, slot) => self.write_timer(*index, slot)?,
            StoreEntry::AutoOffThreshold(value) => {
                self.write_u16(AUTO_OFF_THRESHOLD_OFFSET, *value)
            }
            StoreEntry::AutoOffCycles(value) => self.write_u16(AUTO_OFF_CYCLES_OFFSET, *value),
        }
        debug!("Staged settings change {:?}", entry);
        self.pending = true;
        Ok(())
    }

    fn commit(&mut self) -> Result<bool, StoreError> {
        if !self.pending {
            return Ok(false);
        }
        if let Some(path) = &self.path {
            fs::write(path, &self.bytes).map_err(|source| StoreError::Io {
                path: path.clone(),
                source,
            })?;
            debug!("Committed settings image to {:?}", path);
        }
        self.pending = false;
        Ok(true)
    }

    fn has_pending(&self) -> bool {
        self.pending
    }

    fn savepoint(&self) -> Savepoint {
        Savepoint {
            image: self.bytes.clone(),
            pending: self.pending,
        }
    }

    fn restore(&mut self, savepoint: Savepoint) {
        if savepoint.image.len() == IMAGE_SIZE {
            self.bytes = savepoint.image;
            self.pending = savepoint.pending;
            debug!("Dropped staged settings changes");
        }
    }
}
