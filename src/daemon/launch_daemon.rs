// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the smart-socket project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! # Daemon Management Module
//!
//! Runs the emulated socket: boots the device state from its settings store
//! and starts the background services sharing it:
//!
//! - Modbus TCP server exposing the register map
//! - Sampling tick (power meter, energy, duration counters, auto-off)
//! - Timer tick (weekly timers, date change events)
//!
//! ## Usage
//!
//! ```no_run
//! use smart_socket::{config::Config, daemon::launch_daemon::Daemon};
//!
//! async fn example() -> anyhow::Result<()> {
//!     let config = Config::from_file("config.yaml")?;
//!
//!     let mut daemon = Daemon::new();
//!     daemon.launch(&config).await?;
//!
//!     // Later, trigger a graceful shutdown
//!     daemon.shutdown();
//!     daemon.join().await?;
//!     Ok(())
//! }
//! ```

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, MutexGuard};
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use log::{debug, error, info, warn};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio::time;
use tokio_modbus::server::tcp::{accept_tcp_connection, Server};

use crate::config::{Config, PersistenceConfig};
use crate::device::{DeviceState, SharedDevice};
use crate::modbus::SmartSocketModbusServer;
use crate::power_meter::{PowerMeterSampler, SimulatedPulseCounter};
use crate::store::{ConfigStore, EepromImage};

/// Lock the shared device, turning a poisoned lock into an error.
pub fn lock_device(device: &SharedDevice) -> Result<MutexGuard<'_, DeviceState>> {
    device
        .lock()
        .map_err(|_| anyhow!("Device state lock poisoned"))
}

/// Open the settings store described by `config`.
pub fn open_store(config: &PersistenceConfig) -> Result<Box<dyn ConfigStore>> {
    match &config.path {
        Some(path) => {
            let image = EepromImage::open(path)
                .with_context(|| format!("Failed to open settings image {:?}", path))?;
            Ok(Box::new(image))
        }
        None => {
            info!("No settings image configured, settings will not survive a restart");
            Ok(Box::new(EepromImage::in_memory()))
        }
    }
}

/// Task manager coordinating the socket's background services.
///
/// # Fields
///
/// * `tasks` - Collection of handles to running tasks for management and cleanup
/// * `running` - Atomic flag shared between tasks to coordinate shutdown
/// * `device` - The device state, once booted
/// * `modbus_address` - Address the Modbus server is bound to, once started
pub struct Daemon {
    tasks: Vec<JoinHandle<Result<()>>>,
    running: Arc<AtomicBool>,
    device: Option<SharedDevice>,
    modbus_address: Option<SocketAddr>,
}

impl Default for Daemon {
    fn default() -> Self {
        Self::new()
    }
}

impl Daemon {
    /// Create a new daemon instance with no task running.
    pub fn new() -> Self {
        Daemon {
            tasks: Vec::new(),
            running: Arc::new(AtomicBool::new(true)),
            device: None,
            modbus_address: None,
        }
    }

    /// Boot the device and start all configured services.
    ///
    /// # Errors
    ///
    /// Fails when the settings store cannot be opened or read, or when the
    /// Modbus server cannot bind its address.
    pub async fn launch(&mut self, config: &Config) -> Result<()> {
        let store = open_store(&config.persistence)?;
        let device = DeviceState::boot(
            &config.device.name,
            config.device.capabilities,
            config.device.effective_update_interval_ms(),
            config.persistence.commit,
            store,
            config.device.clock().now(),
        )
        .context("Failed to boot device state")?;
        self.launch_with_device(config, device.into_shared()).await
    }

    /// Start all configured services around an already booted device.
    pub async fn launch_with_device(&mut self, config: &Config, device: SharedDevice) -> Result<()> {
        self.device = Some(device.clone());

        if config.modbus.enabled {
            self.start_modbus_server(config, device.clone()).await?;
        }
        self.start_sampling(config, device.clone())?;
        self.start_timer_evaluation(config, device)?;
        Ok(())
    }

    /// Shared device state, once launched.
    pub fn device(&self) -> Option<SharedDevice> {
        self.device.clone()
    }

    /// Bound Modbus server address, when the server runs.
    pub fn modbus_address(&self) -> Option<SocketAddr> {
        self.modbus_address
    }

    /// Launch the Modbus TCP server.
    ///
    /// The listener is bound before this returns, so a configured port of 0
    /// is resolved in [`modbus_address`](Self::modbus_address).
    async fn start_modbus_server(&mut self, config: &Config, device: SharedDevice) -> Result<()> {
        let socket_addr: SocketAddr = format!("{}:{}", config.modbus.address, config.modbus.port)
            .parse()
            .with_context(|| {
                format!(
                    "Invalid Modbus socket address {}:{}",
                    config.modbus.address, config.modbus.port
                )
            })?;
        let listener = TcpListener::bind(socket_addr)
            .await
            .with_context(|| format!("Failed to bind Modbus server to {}", socket_addr))?;
        let local_addr = listener.local_addr()?;
        self.modbus_address = Some(local_addr);
        info!(
            "Starting modbus server on {} (unit {})",
            local_addr, config.modbus.server_id
        );

        let service =
            SmartSocketModbusServer::new(device, config.modbus.server_id, config.device.clock());
        let running = self.running.clone();

        let task = tokio::spawn(async move {
            let server = Server::new(listener);

            let on_connected = move |stream, socket_addr| {
                debug!("Modbus client connected from {}", socket_addr);
                let service = service.clone();
                async move {
                    accept_tcp_connection(stream, socket_addr, move |_socket_addr| {
                        Ok(Some(service.clone()))
                    })
                }
            };

            let on_process_error = |err| {
                error!("Modbus server error: {err}");
            };

            let server_handle = tokio::spawn(async move {
                if let Err(e) = server.serve(&on_connected, on_process_error).await {
                    error!("Modbus server error: {}", e);
                }
            });

            while running.load(Ordering::SeqCst) {
                time::sleep(Duration::from_millis(250)).await;
            }

            info!("Shutting down Modbus server...");
            server_handle.abort();
            match time::timeout(Duration::from_secs(5), server_handle).await {
                Ok(_) => info!("Modbus server shut down successfully"),
                Err(_) => warn!("Modbus server shutdown timed out, forcing termination"),
            }
            Ok(())
        });

        self.tasks.push(task);
        Ok(())
    }

    /// Start the sampling tick.
    ///
    /// Every update interval the power meter (if any) counts one window, then
    /// the device accumulates energy, advances its counters and checks
    /// auto-off. A failed window only advances the counters. The device lock
    /// is not held while pulses are counted.
    fn start_sampling(&mut self, config: &Config, device: SharedDevice) -> Result<()> {
        let interval = Duration::from_millis(u64::from(config.device.effective_update_interval_ms()));
        let mut sampler = config.device.capabilities.power_meter.then(|| {
            let load = &config.power_meter.simulation;
            PowerMeterSampler::new(
                Box::new(SimulatedPulseCounter::new(
                    load.voltage,
                    load.current,
                    load.power_factor,
                )),
                Duration::from_millis(u64::from(config.power_meter.sample_window_ms)),
            )
        });
        let clock = config.device.clock();
        let running = self.running.clone();
        info!("Starting sampling tick every {:?}", interval);

        let task = tokio::spawn(async move {
            let mut ticker = time::interval(interval);
            ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
            ticker.tick().await;
            let mut last = Instant::now();

            while running.load(Ordering::SeqCst) {
                ticker.tick().await;
                if !running.load(Ordering::SeqCst) {
                    break;
                }

                let relay_on = lock_device(&device)?.is_on();
                let sample = match sampler.as_mut() {
                    Some(sampler) => match sampler.sample(relay_on).await {
                        Ok(sample) => Some(sample),
                        Err(err) => {
                            warn!("Power meter sampling failed: {err:#}");
                            None
                        }
                    },
                    None => None,
                };

                let elapsed_ms = last.elapsed().as_millis() as u64;
                last = Instant::now();
                {
                    let mut state = lock_device(&device)?;
                    state.tick(clock.now(), elapsed_ms, sample.as_ref());
                    debug!("{}", state.status_line());
                }
            }
            Ok(())
        });

        self.tasks.push(task);
        Ok(())
    }

    /// Start the timer tick: date change events and the weekly timers.
    fn start_timer_evaluation(&mut self, config: &Config, device: SharedDevice) -> Result<()> {
        let interval = Duration::from_millis(u64::from(config.device.timer_check_interval_ms));
        let clock = config.device.clock();
        let running = self.running.clone();
        info!("Starting timer evaluation every {:?}", interval);

        let task = tokio::spawn(async move {
            let mut ticker = time::interval(interval);
            while running.load(Ordering::SeqCst) {
                ticker.tick().await;
                if !running.load(Ordering::SeqCst) {
                    break;
                }
                let firing = lock_device(&device)?.check_timers(clock.now());
                if let Some(firing) = firing {
                    info!(
                        "Timer {} switched the relay {}",
                        firing.slot + 1,
                        if firing.switch_on { "ON" } else { "OFF" }
                    );
                }
            }
            Ok(())
        });

        self.tasks.push(task);
        Ok(())
    }

    /// Signal all tasks to stop; call [`join`](Self::join) to wait for them.
    pub fn shutdown(&self) {
        info!("Shutting down daemon tasks");
        self.running.store(false, Ordering::SeqCst);
    }

    /// Wait for all tasks to complete
    ///
    /// Consumes the daemon. Tasks still busy after five seconds (e.g. waiting
    /// for their next tick) are aborted.
    pub async fn join(self) -> Result<()> {
        for task in self.tasks {
            let abort = task.abort_handle();
            match time::timeout(Duration::from_secs(5), task).await {
                Ok(Ok(Ok(()))) => {}
                Ok(Ok(Err(e))) => error!("Task failed: {e:#}"),
                Ok(Err(e)) => {
                    if !e.is_cancelled() {
                        error!("Task panicked: {}", e);
                    }
                }
                Err(_) => {
                    warn!("Task did not complete within timeout period, aborting");
                    abort.abort();
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Capabilities;

    fn test_config() -> Config {
        let mut config = Config::default();
        config.modbus.port = 0;
        config.persistence.path = None;
        config.device.update_interval_ms = 2000;
        config.power_meter.sample_window_ms = 10;
        config
    }

    #[tokio::test]
    async fn test_launch_and_shutdown() {
        let mut daemon = Daemon::new();
        daemon.launch(&test_config()).await.unwrap();
        let addr = daemon.modbus_address().unwrap();
        assert_ne!(addr.port(), 0);
        let device = daemon.device().unwrap();
        assert!(!lock_device(&device).unwrap().is_on());
        daemon.shutdown();
        daemon.join().await.unwrap();
    }

    #[tokio::test]
    async fn test_modbus_disabled() {
        let mut config = test_config();
        config.modbus.enabled = false;
        config.device.capabilities = Capabilities {
            power_meter: false,
            timers: true,
            event_tracking: true,
        };
        let mut daemon = Daemon::new();
        daemon.launch(&config).await.unwrap();
        assert!(daemon.modbus_address().is_none());
        daemon.shutdown();
        daemon.join().await.unwrap();
    }

    #[test]
    fn test_open_store_reports_bad_image() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.eeprom");
        std::fs::write(&path, b"short").unwrap();
        let config = PersistenceConfig {
            path: Some(path),
            ..Default::default()
        };
        assert!(open_store(&config).is_err());
    }
}
