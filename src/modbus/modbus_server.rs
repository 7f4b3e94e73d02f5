// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the smart-socket project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Modbus server implementation for the smart socket
//!
//! For avoiding confusion with the Modbus master/slave terminology, this module uses
//! the terms "server" and "client" instead. The server is the socket that provides data,
//! while the client is the device that requests data.

use std::future;

use bytes::Bytes;
use log::{debug, error, warn};
use tokio_modbus::prelude::*;

use super::register_map::{self, FC_CALIBRATE, FC_COMMIT};
use crate::config::Clock;
use crate::device::SharedDevice;

/// Modbus service answering from the shared device state.
///
/// Every request locks the device once, so reads see a consistent snapshot
/// and writes are applied atomically.
#[derive(Clone)]
pub struct SmartSocketModbusServer {
    device: SharedDevice,
    server_id: u8,
    clock: Clock,
}

impl SmartSocketModbusServer {
    pub fn new(device: SharedDevice, server_id: u8, clock: Clock) -> Self {
        Self {
            device,
            server_id,
            clock,
        }
    }

    fn handle(&self, request: Request<'static>) -> Result<Response, ExceptionCode> {
        let mut device = self.device.lock().map_err(|_| {
            error!("SERVER: device state lock poisoned");
            ExceptionCode::ServerDeviceFailure
        })?;
        let result = match request {
            Request::ReadHoldingRegisters(addr, cnt) => {
                register_map::read_holding_registers(&device, addr, cnt)
                    .map(Response::ReadHoldingRegisters)
            }
            Request::WriteSingleRegister(addr, value) => {
                register_map::write_single_register(&mut device, addr, value, self.clock.now())
                    .map(|_| Response::WriteSingleRegister(addr, value))
            }
            Request::WriteMultipleRegisters(addr, values) => {
                register_map::write_multiple_registers(&mut device, addr, &values)
                    .map(|_| Response::WriteMultipleRegisters(addr, values.len() as u16))
            }
            Request::Custom(FC_CALIBRATE, data) => register_map::calibrate(&mut device, &data)
                .map(|reply| Response::Custom(FC_CALIBRATE, Bytes::from(reply))),
            Request::Custom(FC_COMMIT, _) => register_map::commit(&mut device)
                .map(|_| Response::Custom(FC_COMMIT, Bytes::new())),
            other => {
                warn!("SERVER: Exception::IllegalFunction - Unimplemented function code in request: {other:?}");
                return Err(ExceptionCode::IllegalFunction);
            }
        };
        result.map_err(|err| {
            debug!("SERVER: request refused: {err}");
            ExceptionCode::from(err)
        })
    }
}

impl tokio_modbus::server::Service for SmartSocketModbusServer {
    type Request = SlaveRequest<'static>;
    type Response = Response;
    type Exception = ExceptionCode;
    type Future = future::Ready<Result<Self::Response, Self::Exception>>;

    fn call(&self, req: Self::Request) -> Self::Future {
        let SlaveRequest { slave, request } = req;
        if slave != self.server_id {
            warn!("SERVER: request for unit {slave} ignored, serving unit {}", self.server_id);
            return future::ready(Err(ExceptionCode::GatewayTargetDevice));
        }
        future::ready(self.handle(request))
    }
}
