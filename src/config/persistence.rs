// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the smart-socket project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Settings persistence configuration

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// When register writes reach durable storage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommitPolicy {
    /// Every accepted write is committed at once.
    #[default]
    Immediate,
    /// Writes are staged until a commit request (function code 0x42).
    Deferred,
}

/// Where and how the settings image is stored.
///
/// # Example
///
/// ```
/// use smart_socket::config::{CommitPolicy, PersistenceConfig};
///
/// let persistence = PersistenceConfig::default();
/// assert_eq!(persistence.commit, CommitPolicy::Immediate);
/// assert!(persistence.path.is_some());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Settings image file; settings only live in memory when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    #[serde(default)]
    pub commit: CommitPolicy,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            path: Some(PathBuf::from("smart_socket.eeprom")),
            commit: CommitPolicy::Immediate,
        }
    }
}
