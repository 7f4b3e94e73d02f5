// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the smart-socket project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Companion client library
//!
//! Everything the `smartdose` command line client needs: target and command
//! parsing, typed access to the socket's registers over Modbus TCP, and the
//! decoding/formatting of register blocks.

pub mod command;
pub mod registers;
pub mod session;

use std::fmt;
use std::str::FromStr;

use thiserror::Error;
use tokio_modbus::prelude::ExceptionCode;

pub use command::{Command, TimerEdit};
pub use session::SocketClient;

/// Default Modbus TCP port.
pub const DEFAULT_PORT: u16 = 502;
/// Default Modbus unit id.
pub const DEFAULT_SERVER_ID: u8 = 1;

/// Errors reported by the companion client.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("{message}")]
    Usage { message: String },

    #[error("Target descriptor invalid: '{target}'")]
    InvalidTarget { target: String },

    #[error("Could not resolve '{host}': {reason}")]
    Resolve { host: String, reason: String },

    #[error("Connection failed: {source}")]
    Connection {
        #[from]
        source: std::io::Error,
    },

    #[error("Modbus transport error: {source}")]
    Transport {
        #[from]
        source: tokio_modbus::Error,
    },

    #[error("Error response: {code:?}")]
    Exception { code: ExceptionCode },

    #[error("No response within {millis} ms")]
    Timeout { millis: u128 },

    #[error("Unexpected response: {reason}")]
    UnexpectedResponse { reason: String },

    #[error("{command} is only for devices with {capability}")]
    Unsupported {
        command: &'static str,
        capability: &'static str,
    },
}

impl ClientError {
    pub fn usage(message: impl Into<String>) -> Self {
        ClientError::Usage {
            message: message.into(),
        }
    }

    /// Process exit code: -1 for usage errors, -2 for device or protocol
    /// errors.
    pub fn exit_code(&self) -> i32 {
        match self {
            ClientError::Usage { .. }
            | ClientError::InvalidTarget { .. }
            | ClientError::Unsupported { .. } => -1,
            ClientError::Resolve { .. }
            | ClientError::Connection { .. }
            | ClientError::Transport { .. }
            | ClientError::Exception { .. }
            | ClientError::Timeout { .. }
            | ClientError::UnexpectedResponse { .. } => -2,
        }
    }
}

/// Socket to talk to, parsed from `host[:port[:serverID]]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub host: String,
    pub port: u16,
    pub server_id: u8,
}

impl FromStr for Target {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ClientError::InvalidTarget {
            target: s.to_string(),
        };
        let mut parts = s.split(':');
        let host = parts.next().filter(|h| !h.is_empty()).ok_or_else(invalid)?;
        let port = match parts.next() {
            Some(port) => port
                .parse::<u16>()
                .ok()
                .filter(|p| *p != 0)
                .ok_or_else(invalid)?,
            None => DEFAULT_PORT,
        };
        let server_id = match parts.next() {
            Some(id) => id.parse::<u8>().map_err(|_| invalid())?,
            None => DEFAULT_SERVER_ID,
        };
        if parts.next().is_some() {
            return Err(invalid());
        }
        Ok(Target {
            host: host.to_string(),
            port,
            server_id,
        })
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.host, self.port, self.server_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_defaults() {
        let target: Target = "192.168.2.17".parse().unwrap();
        assert_eq!(target.host, "192.168.2.17");
        assert_eq!(target.port, DEFAULT_PORT);
        assert_eq!(target.server_id, DEFAULT_SERVER_ID);
    }

    #[test]
    fn test_target_full() {
        let target: Target = "socket.local:1502:4".parse().unwrap();
        assert_eq!(
            target,
            Target {
                host: "socket.local".to_string(),
                port: 1502,
                server_id: 4
            }
        );
        assert_eq!(target.to_string(), "socket.local:1502:4");
    }

    #[test]
    fn test_target_rejections() {
        for bad in ["", ":502", "host:0", "host:port", "host:502:300", "host:502:1:2"] {
            assert!(bad.parse::<Target>().is_err(), "{bad} accepted");
        }
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(ClientError::usage("x").exit_code(), -1);
        let err = ClientError::Exception {
            code: ExceptionCode::IllegalDataAddress,
        };
        assert_eq!(err.exit_code(), -2);
    }
}
