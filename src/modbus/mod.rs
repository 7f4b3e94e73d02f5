// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the smart-socket project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Modbus communication module
//!
//! This module exposes the socket over Modbus TCP: the register map (what the
//! addresses mean and how requests are validated) and the tokio-modbus
//! service answering requests from the shared device state.
//!
//! ## Supported function codes
//!
//! - `0x03` read holding registers
//! - `0x06` write single register (relay, flags, energy reset, auto-off)
//! - `0x10` write multiple registers (timer table)
//! - `0x42` commit staged settings (vendor)
//! - `0x43` set or reset a calibration factor (vendor)
//!
//! See [`register_map`] for the address map.

pub mod modbus_server;
pub mod register_map;

pub use modbus_server::SmartSocketModbusServer;
pub use register_map::RegisterError;
