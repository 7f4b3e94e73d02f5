// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the smart-socket project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Socket device state
//!
//! [`DeviceState`] is the single owner of everything the socket knows: the
//! relay, its counters and measures, the timer table, the event log, the
//! auto-off controller and the settings store. It is shared between the
//! Modbus server and the periodic tasks as a [`SharedDevice`]; holding the
//! lock for a whole request gives readers a consistent snapshot and makes
//! every write atomic.
//!
//! Mutations that must survive a reboot are persisted first and only applied
//! once the store accepted them.

pub mod auto_off;
pub mod event_log;
pub mod measure;
pub mod time_counter;
pub mod timer_table;

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use chrono::{NaiveDate, NaiveDateTime};
use log::{debug, info, warn};

use crate::config::{Capabilities, CommitPolicy};
use crate::power_meter::PulseSample;
use crate::store::{ConfigStore, NetworkSettings, PersistedSettings, StoreEntry, StoreError};

use auto_off::AutoOffController;
use event_log::{EventKind, EventLog};
use measure::{Measures, Quantity};
use time_counter::TimeCounter;
use timer_table::{TimerFiring, TimerTable, TIMER_SLOTS, WORDS_PER_TIMER};

/// Device state shared between the server and the periodic tasks.
pub type SharedDevice = Arc<Mutex<DeviceState>>;

/// Persisted flag: switch on at boot.
pub const CONF_DEFAULT_ON: u16 = 0x0001;
/// Flags bits that are writable and persisted.
pub const CONF_MASK: u16 = 0x0001;
pub const CONF_TIMERS: u16 = 0x0800;
pub const CONF_HAS_FAUXMO: u16 = 0x1000;
pub const CONF_HAS_MODBUS: u16 = 0x2000;
pub const CONF_HAS_TELNET: u16 = 0x4000;
pub const CONF_HAS_POWER: u16 = 0x8000;

/// Dim value used when switching on without an explicit one.
pub const FULL_ON: u8 = 255;

/// Relay state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SwitchState {
    pub on: bool,
    pub dim: u8,
}

impl SwitchState {
    /// Register value: the dim value when on, 0 when off.
    pub fn word(&self) -> u16 {
        if self.on {
            u16::from(self.dim)
        } else {
            0
        }
    }
}

/// Everything the socket knows, behind one lock.
pub struct DeviceState {
    name: String,
    capabilities: Capabilities,
    commit_policy: CommitPolicy,
    switch: SwitchState,
    config_flags: u16,
    up_time: TimeCounter,
    state_time: TimeCounter,
    on_time: TimeCounter,
    measures: Measures,
    energy_wh: f64,
    timers: TimerTable,
    events: EventLog,
    auto_off: AutoOffController,
    network: NetworkSettings,
    last_date: NaiveDate,
    store: Box<dyn ConfigStore>,
}

impl DeviceState {
    /// Bring the socket up from its settings store.
    ///
    /// A store without valid settings is formatted with defaults first. Boot
    /// date and time are logged, and the relay is switched on when the
    /// default-on flag is set.
    pub fn boot(
        name: &str,
        capabilities: Capabilities,
        update_interval_ms: u32,
        commit_policy: CommitPolicy,
        mut store: Box<dyn ConfigStore>,
        now: NaiveDateTime,
    ) -> Result<Self, StoreError> {
        let settings = match store.load()? {
            Some(settings) => {
                debug!("Loaded persisted settings: flags={:#06x}", settings.flags);
                settings
            }
            None => {
                info!("Settings store is blank, formatting with defaults");
                let mut settings = PersistedSettings::default();
                settings.network.device_name = name.to_string();
                store.format(&settings)?;
                store.commit()?;
                settings
            }
        };

        let mut device = Self {
            name: name.to_string(),
            capabilities,
            commit_policy,
            switch: SwitchState::default(),
            config_flags: settings.flags & CONF_MASK,
            up_time: TimeCounter::new(update_interval_ms),
            state_time: TimeCounter::new(update_interval_ms),
            on_time: TimeCounter::new(update_interval_ms),
            measures: Measures::with_factors(settings.factors),
            energy_wh: 0.0,
            timers: TimerTable::from_slots(settings.timers),
            events: EventLog::new(),
            auto_off: AutoOffController::new(
                settings.auto_off_threshold,
                settings.auto_off_cycles,
            ),
            network: settings.network,
            last_date: now.date(),
            store,
        };

        device.record_event(EventKind::BootDate, now);
        device.record_event(EventKind::BootTime, now);
        if device.config_flags & CONF_DEFAULT_ON != 0 {
            device.switch_to(FULL_ON, EventKind::DefaultOn, now);
        }
        info!(
            "{} booted, relay {}",
            device.name,
            if device.switch.on { "ON" } else { "OFF" }
        );
        Ok(device)
    }

    pub fn into_shared(self) -> SharedDevice {
        Arc::new(Mutex::new(self))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    pub fn switch_state(&self) -> SwitchState {
        self.switch
    }

    pub fn is_on(&self) -> bool {
        self.switch.on
    }

    /// Persisted flag bits (default-on only).
    pub fn config_flags(&self) -> u16 {
        self.config_flags
    }

    /// Flags register: persisted bits plus the capability bits.
    pub fn flags_word(&self) -> u16 {
        let mut flags = self.config_flags | CONF_HAS_MODBUS;
        if self.capabilities.power_meter {
            flags |= CONF_HAS_POWER;
        }
        if self.capabilities.timers {
            flags |= CONF_TIMERS;
        }
        flags
    }

    pub fn up_time(&self) -> &TimeCounter {
        &self.up_time
    }

    pub fn state_time(&self) -> &TimeCounter {
        &self.state_time
    }

    pub fn on_time(&self) -> &TimeCounter {
        &self.on_time
    }

    pub fn measures(&self) -> &Measures {
        &self.measures
    }

    pub fn energy_wh(&self) -> f64 {
        self.energy_wh
    }

    pub fn timers(&self) -> &TimerTable {
        &self.timers
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    pub fn auto_off(&self) -> &AutoOffController {
        &self.auto_off
    }

    pub fn network(&self) -> &NetworkSettings {
        &self.network
    }

    pub fn has_pending_settings(&self) -> bool {
        self.store.has_pending()
    }

    fn record_event(&mut self, kind: EventKind, now: NaiveDateTime) {
        if self.capabilities.event_tracking && self.events.record(kind, now) {
            debug!("Event recorded: {}", kind);
        }
    }

    /// Set the relay: `value` 0 switches off, anything else switches on with
    /// that dim value. The state duration restarts and `event` is recorded.
    pub fn switch_to(&mut self, value: u8, event: EventKind, now: NaiveDateTime) {
        self.switch = SwitchState {
            on: value != 0,
            dim: value,
        };
        self.state_time.reset();
        self.record_event(event, now);
        info!(
            "Relay {} ({})",
            if self.switch.on { "ON" } else { "OFF" },
            event
        );
    }

    /// Toggle the relay from the push button.
    pub fn press_button(&mut self, now: NaiveDateTime) {
        if self.switch.on {
            self.switch_to(0, EventKind::ButtonOff, now);
        } else {
            self.switch_to(FULL_ON, EventKind::ButtonOn, now);
        }
    }

    fn stage(&mut self, entries: impl IntoIterator<Item = StoreEntry>) -> Result<(), StoreError> {
        for entry in entries {
            self.store.put(entry)?;
        }
        if self.commit_policy == CommitPolicy::Immediate {
            self.store.commit()?;
        }
        Ok(())
    }

    /// Stage `entries` (and commit them under the immediate policy) as one
    /// batch. A failure restores the store so no part of the batch is left
    /// behind for a later commit.
    fn persist(&mut self, entries: impl IntoIterator<Item = StoreEntry>) -> Result<(), StoreError> {
        let savepoint = self.store.savepoint();
        if let Err(err) = self.stage(entries) {
            warn!("Settings write rejected: {}", err);
            self.store.restore(savepoint);
            return Err(err);
        }
        Ok(())
    }

    /// Persist and apply the writable flag bits; other bits are dropped.
    pub fn set_config_flags(&mut self, value: u16) -> Result<(), StoreError> {
        let flags = value & CONF_MASK;
        self.persist([StoreEntry::Flags(flags)])?;
        self.config_flags = flags;
        Ok(())
    }

    pub fn reset_energy(&mut self) {
        self.energy_wh = 0.0;
    }

    pub fn set_auto_off_threshold(&mut self, threshold_ma: u16) -> Result<(), StoreError> {
        self.persist([StoreEntry::AutoOffThreshold(threshold_ma)])?;
        self.auto_off.set_threshold(threshold_ma);
        Ok(())
    }

    pub fn set_auto_off_cycles(&mut self, cycles: u16) -> Result<(), StoreError> {
        self.persist([StoreEntry::AutoOffCycles(cycles)])?;
        self.auto_off.set_cycles(cycles);
        Ok(())
    }

    /// Write consecutive timer register words starting at word `offset` of
    /// the timer block, persisting every touched slot.
    pub fn write_timer_words(&mut self, offset: usize, values: &[u16]) -> Result<(), StoreError> {
        let mut timers = self.timers.clone();
        let mut touched = BTreeSet::new();
        for (i, value) in values.iter().enumerate() {
            let index = timers
                .write_word(offset + i, *value)
                .ok_or(StoreError::InvalidTimerSlot {
                    index: (offset + i) / WORDS_PER_TIMER,
                })?;
            touched.insert(index);
        }
        let entries = touched
            .iter()
            .filter_map(|&index| timers.slot(index).map(|slot| StoreEntry::Timer(index, *slot)))
            .collect::<Vec<_>>();
        self.persist(entries)?;
        debug!("Timer slots {:?} updated", touched);
        self.timers = timers;
        Ok(())
    }

    /// Overwrite a calibration factor, `None` resets it to 1.0. Returns the
    /// factor now in effect.
    pub fn calibrate(&mut self, quantity: Quantity, factor: Option<f32>) -> Result<f32, StoreError> {
        let factor = factor.unwrap_or(1.0);
        self.persist([StoreEntry::Factor(quantity, factor)])?;
        self.measures.set_factor(quantity, factor);
        info!("{} calibration factor set to {}", quantity, factor);
        Ok(factor)
    }

    /// Commit staged settings. Returns `false` when nothing was pending.
    pub fn commit_settings(&mut self) -> Result<bool, StoreError> {
        self.store.commit()
    }

    /// One sampling tick.
    ///
    /// Advances the duration counters. On a device with a power meter a fresh
    /// `sample` is applied, energy accumulates over `elapsed_ms` and the
    /// auto-off check runs; without a sample (failed window) measures keep
    /// their last values and neither energy nor auto-off moves. Returns
    /// `true` when auto-off switched the relay off.
    pub fn tick(&mut self, now: NaiveDateTime, elapsed_ms: u64, sample: Option<&PulseSample>) -> bool {
        let power_meter = self.capabilities.power_meter;
        let sampled = power_meter && sample.is_some();
        if let (true, Some(sample)) = (power_meter, sample) {
            sample.apply_to(&mut self.measures);
            self.energy_wh += self.measures.measured(Quantity::Power) * elapsed_ms as f64 / 3_600_000.0;
        }

        self.up_time.count();
        self.state_time.count();
        let current = self.measures.measured(Quantity::Current);
        if self.switch.on && (!power_meter || current > 0.0) {
            self.on_time.count();
        }

        if sampled && self.auto_off.update(self.switch.on, current * 1000.0) {
            info!(
                "Current below {} mA for {} cycles, switching off",
                self.auto_off.threshold_ma(),
                self.auto_off.required_cycles()
            );
            self.switch_to(0, EventKind::AutoOff, now);
            return true;
        }
        false
    }

    /// Timer tick: records date changes and lets the timer table switch the
    /// relay.
    pub fn check_timers(&mut self, now: NaiveDateTime) -> Option<TimerFiring> {
        if now.date() != self.last_date {
            self.last_date = now.date();
            self.record_event(EventKind::DateChange, now);
        }
        if !self.capabilities.timers {
            return None;
        }
        let firing = self.timers.evaluate(now, self.switch.on)?;
        debug!("Timer {} fires", firing.slot + 1);
        if firing.switch_on {
            self.switch_to(FULL_ON, EventKind::TimerOn, now);
        } else {
            self.switch_to(0, EventKind::TimerOff, now);
        }
        Some(firing)
    }

    /// One line status report.
    pub fn status_line(&self) -> String {
        let [sh, sms] = self.state_time.register_words();
        let mut line = format!(
            "{:>3} for {:5}:{:02}:{:02}   Run time {:5}:{:02}:{:02}    ON time {:5}:{:02}:{:02}",
            if self.switch.on { "ON" } else { "OFF" },
            sh,
            sms >> 8,
            sms & 0xFF,
            self.up_time.hours(),
            self.up_time.minutes(),
            self.up_time.seconds(),
            self.on_time.hours(),
            self.on_time.minutes(),
            self.on_time.seconds(),
        );
        if self.capabilities.power_meter {
            line.push_str(&format!(
                "   | {:6.2} V| {:8.2} W| {:5.2} A| {:8.2} Wh|",
                self.measures.measured(Quantity::Voltage),
                self.measures.measured(Quantity::Power),
                self.measures.measured(Quantity::Current),
                self.energy_wh
            ));
        }
        line
    }
}

/// Number of timer register words.
pub const TIMER_WORDS: usize = TIMER_SLOTS * WORDS_PER_TIMER;
