// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the smart-socket project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Durable settings storage
//!
//! Everything the socket must remember across reboots goes through a
//! [`ConfigStore`]: configuration flags, calibration factors, network
//! credentials, timer slots and auto-off settings. Writes are staged with
//! [`ConfigStore::put`] and made durable by [`ConfigStore::commit`].
//!
//! [`EepromImage`] is the default implementation. It keeps the byte layout
//! of the socket's 512 byte EEPROM, optionally backed by a file.

pub mod eeprom;

use std::path::PathBuf;

use thiserror::Error;

use crate::device::measure::Quantity;
use crate::device::timer_table::{TimerSlot, TIMER_SLOTS};

pub use eeprom::EepromImage;

/// Maximum length of a stored string, terminator excluded.
pub const MAX_STRING_LEN: usize = 63;

/// Errors raised by a [`ConfigStore`].
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Failed to access settings image at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Settings image has {actual} bytes, expected {expected}")]
    InvalidSize { expected: usize, actual: usize },

    #[error("Timer slot {index} does not exist")]
    InvalidTimerSlot { index: usize },

    #[error("Value for '{field}' exceeds {max} bytes")]
    StringTooLong { field: &'static str, max: usize },

    #[error("Settings store unavailable: {reason}")]
    Unavailable { reason: String },
}

/// WiFi and device identity strings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetworkSettings {
    pub ssid: String,
    pub password: String,
    pub device_name: String,
    pub ota_password: String,
}

/// The full persisted settings set.
#[derive(Debug, Clone, PartialEq)]
pub struct PersistedSettings {
    pub flags: u16,
    /// Calibration factors indexed by [`Quantity`].
    pub factors: [f32; 3],
    pub network: NetworkSettings,
    pub timers: [TimerSlot; TIMER_SLOTS],
    pub auto_off_threshold: u16,
    pub auto_off_cycles: u16,
}

impl Default for PersistedSettings {
    fn default() -> Self {
        Self {
            flags: 0,
            factors: [1.0; 3],
            network: NetworkSettings::default(),
            timers: [TimerSlot::default(); TIMER_SLOTS],
            auto_off_threshold: 0,
            auto_off_cycles: 0,
        }
    }
}

/// A single staged change.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreEntry {
    Flags(u16),
    Factor(Quantity, f32),
    Timer(usize, TimerSlot),
    AutoOffThreshold(u16),
    AutoOffCycles(u16),
}

/// Staged content of a store, captured before a batch of writes so a
/// rejected batch leaves nothing behind.
#[derive(Debug, Clone, Default)]
pub struct Savepoint {
    pub image: Vec<u8>,
    pub pending: bool,
}

/// Durable key/value store for [`PersistedSettings`].
pub trait ConfigStore: Send {
    /// Read back the settings, `None` when the store was never formatted.
    fn load(&mut self) -> Result<Option<PersistedSettings>, StoreError>;

    /// Overwrite the whole store with `settings` and mark it formatted.
    ///
    /// The change is staged like any other and needs a [`commit`](Self::commit).
    fn format(&mut self, settings: &PersistedSettings) -> Result<(), StoreError>;

    /// Stage one change.
    fn put(&mut self, entry: StoreEntry) -> Result<(), StoreError>;

    /// Make staged changes durable. Returns `false` when nothing was pending.
    fn commit(&mut self) -> Result<bool, StoreError>;

    fn has_pending(&self) -> bool;

    /// Capture the staged content.
    fn savepoint(&self) -> Savepoint;

    /// Return the staged content to `savepoint`, dropping every change
    /// staged since it was taken.
    fn restore(&mut self, savepoint: Savepoint);
}
