// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the smart-socket project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! # Smart Socket
//!
//! Emulator of a Modbus controlled smart socket and the library behind its
//! `smartdose` client.
//!
//! The socket exposes one register map over Modbus TCP:
//!
//! | Address | Words | Content |
//! |---------|-------|---------|
//! | 1 | 1 | Relay state (0 = off, otherwise dim value) |
//! | 2 | 1 | Flags (default-on plus capability bits) |
//! | 3, 5, 7 | 2 each | Up time, state time, on time (hours, minutes:seconds) |
//! | 9 | 2 | Energy in Wh (f32) |
//! | 11 | 6 | Calibration factors V, A, W (f32) |
//! | 17 | 6 | Measured V, A, W (f32) |
//! | 23 | 32 | 16 weekly timers |
//! | 55 | 1 | Number of logged events |
//! | 56 | 40 | Event log, oldest first |
//! | 96, 97 | 1 each | Auto-off threshold (mA) and cycle count |
//!
//! ## Modules
//!
//! - [`config`]: YAML configuration with schema validation
//! - [`device`]: device state and its building blocks
//! - [`store`]: durable settings storage
//! - [`power_meter`]: pulse based power meter sampling
//! - [`modbus`]: register map and Modbus TCP service
//! - [`daemon`]: background services
//! - [`client`]: helpers for the `smartdose` command line client

pub mod client;
pub mod config;
pub mod daemon;
pub mod device;
pub mod modbus;
pub mod power_meter;
pub mod store;
