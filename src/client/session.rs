// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the smart-socket project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Typed register access to one socket over Modbus TCP.

use std::borrow::Cow;
use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use log::debug;
use tokio::time;
use tokio_modbus::client::{tcp, Client, Context, Reader, Writer};
use tokio_modbus::prelude::{Request, Response, Slave};

use crate::device::event_log::{EventRecord, MAX_EVENTS};
use crate::device::measure::Quantity;
use crate::device::timer_table::{TimerSlot, TIMER_SLOTS, WORDS_PER_TIMER};
use crate::device::CONF_DEFAULT_ON;
use crate::modbus::register_map::{
    AUTO_OFF_CYCLES, AUTO_OFF_THRESHOLD, ENERGY, EVENTS, EVENT_COUNT, FC_CALIBRATE, FC_COMMIT,
    FLAGS, SWITCH, TIMERS,
};

use super::registers::{
    decode_events, decode_timers, BasicInfo, PowerInfo, BASIC_WORDS, POWER_WORDS,
};
use super::ClientError;

/// Default time to wait for each response.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

/// Modbus client bound to one socket and unit id.
pub struct SocketClient {
    ctx: Context,
    timeout: Duration,
}

impl SocketClient {
    /// Connect to `address` and address requests to unit `server_id`.
    pub async fn connect(address: SocketAddr, server_id: u8) -> Result<Self, ClientError> {
        debug!("Connecting to {} unit {}", address, server_id);
        let ctx = time::timeout(DEFAULT_TIMEOUT, tcp::connect_slave(address, Slave(server_id)))
            .await
            .map_err(|_| ClientError::Timeout {
                millis: DEFAULT_TIMEOUT.as_millis(),
            })??;
        Ok(Self {
            ctx,
            timeout: DEFAULT_TIMEOUT,
        })
    }

    /// Await one request, flattening timeout, transport and exception
    /// failures into [`ClientError`].
    async fn exchange<T>(
        timeout: Duration,
        request: impl Future<Output = tokio_modbus::Result<T>>,
    ) -> Result<T, ClientError> {
        time::timeout(timeout, request)
            .await
            .map_err(|_| ClientError::Timeout {
                millis: timeout.as_millis(),
            })??
            .map_err(|code| ClientError::Exception { code })
    }

    pub async fn read(&mut self, address: u16, words: u16) -> Result<Vec<u16>, ClientError> {
        Self::exchange(self.timeout, self.ctx.read_holding_registers(address, words)).await
    }

    pub async fn write(&mut self, address: u16, value: u16) -> Result<(), ClientError> {
        Self::exchange(self.timeout, self.ctx.write_single_register(address, value)).await
    }

    pub async fn write_many(&mut self, address: u16, values: &[u16]) -> Result<(), ClientError> {
        Self::exchange(self.timeout, self.ctx.write_multiple_registers(address, values)).await
    }

    async fn custom(&mut self, function: u8, payload: Vec<u8>) -> Result<Vec<u8>, ClientError> {
        let request = Request::Custom(function, Cow::Owned(payload));
        match Self::exchange(self.timeout, self.ctx.call(request)).await? {
            Response::Custom(code, data) if code == function => Ok(data.to_vec()),
            other => Err(ClientError::UnexpectedResponse {
                reason: format!("{:?}", other),
            }),
        }
    }

    pub async fn basic_info(&mut self) -> Result<BasicInfo, ClientError> {
        let words = self.read(SWITCH, BASIC_WORDS).await?;
        BasicInfo::from_words(&words)
    }

    pub async fn power_info(&mut self) -> Result<PowerInfo, ClientError> {
        let words = self.read(ENERGY, POWER_WORDS).await?;
        PowerInfo::from_words(&words)
    }

    pub async fn flags(&mut self) -> Result<u16, ClientError> {
        let words = self.read(FLAGS, 1).await?;
        words.first().copied().ok_or_else(|| ClientError::UnexpectedResponse {
            reason: "empty flags read".to_string(),
        })
    }

    /// Switch the relay: 0 is off, any other value on.
    pub async fn switch(&mut self, value: u8) -> Result<(), ClientError> {
        self.write(SWITCH, u16::from(value)).await
    }

    /// Set the default-on flag. Returns `false` when it already had that
    /// value and nothing was written.
    pub async fn set_default_on(&mut self, on: bool) -> Result<bool, ClientError> {
        let flags = self.flags().await?;
        if (flags & CONF_DEFAULT_ON != 0) == on {
            return Ok(false);
        }
        let flags = if on {
            flags | CONF_DEFAULT_ON
        } else {
            flags & !CONF_DEFAULT_ON
        };
        self.write(FLAGS, flags).await?;
        Ok(true)
    }

    pub async fn reset_energy(&mut self) -> Result<(), ClientError> {
        self.write(ENERGY, 0).await
    }

    /// Set one calibration factor, `None` resetting it to 1.0. Returns the
    /// factor the device reports back.
    pub async fn calibrate(
        &mut self,
        quantity: Quantity,
        factor: Option<f32>,
    ) -> Result<f32, ClientError> {
        let mut payload = vec![quantity.selector()];
        if let Some(factor) = factor {
            payload.extend_from_slice(&factor.to_be_bytes());
        }
        let reply = self.custom(FC_CALIBRATE, payload).await?;
        match reply.as_slice() {
            [selector, a, b, c, d] if *selector == quantity.selector() => {
                Ok(f32::from_be_bytes([*a, *b, *c, *d]))
            }
            _ => Err(ClientError::UnexpectedResponse {
                reason: format!("calibration reply {:02X?}", reply),
            }),
        }
    }

    /// Commit staged settings on a device using deferred commits.
    pub async fn commit(&mut self) -> Result<(), ClientError> {
        self.custom(FC_COMMIT, Vec::new()).await.map(|_| ())
    }

    pub async fn timers(&mut self) -> Result<Vec<TimerSlot>, ClientError> {
        let words = self
            .read(TIMERS, (TIMER_SLOTS * WORDS_PER_TIMER) as u16)
            .await?;
        Ok(decode_timers(&words))
    }

    fn timer_address(index: usize) -> u16 {
        TIMERS + (index * WORDS_PER_TIMER) as u16
    }

    pub async fn timer(&mut self, index: usize) -> Result<TimerSlot, ClientError> {
        let words = self
            .read(Self::timer_address(index), WORDS_PER_TIMER as u16)
            .await?;
        decode_timers(&words)
            .first()
            .copied()
            .ok_or_else(|| ClientError::UnexpectedResponse {
                reason: format!("timer {} read returned {} words", index + 1, words.len()),
            })
    }

    /// Write a timer slot and read it back as the device stored it.
    pub async fn set_timer(
        &mut self,
        index: usize,
        slot: &TimerSlot,
    ) -> Result<TimerSlot, ClientError> {
        self.write_many(Self::timer_address(index), &slot.to_words())
            .await?;
        self.timer(index).await
    }

    /// Logged events, oldest first.
    pub async fn events(&mut self) -> Result<Vec<EventRecord>, ClientError> {
        let words = self.read(EVENT_COUNT, 1 + MAX_EVENTS as u16).await?;
        debug!("Event region reports {} slots", words.first().copied().unwrap_or(0));
        Ok(words
            .get(usize::from(EVENTS - EVENT_COUNT)..)
            .map(decode_events)
            .unwrap_or_default())
    }

    /// Auto-off threshold (mA) and cycle count.
    pub async fn auto_off(&mut self) -> Result<(u16, u16), ClientError> {
        let words = self.read(AUTO_OFF_THRESHOLD, 2).await?;
        match words.as_slice() {
            [threshold, cycles] => Ok((*threshold, *cycles)),
            _ => Err(ClientError::UnexpectedResponse {
                reason: format!("auto-off read returned {} words", words.len()),
            }),
        }
    }

    pub async fn set_auto_off(&mut self, threshold_ma: u16, cycles: u16) -> Result<(), ClientError> {
        self.write(AUTO_OFF_THRESHOLD, threshold_ma).await?;
        self.write(AUTO_OFF_CYCLES, cycles).await
    }
}
