// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Errors returned as `Result`s.
//!
//! Programmer errors go to the diagnostic sink instead; see [`crate::diagnostics`].

use crate::config::QueueType;
use std::time::Duration;

/// A native API call failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{operation} failed: {message}")]
pub struct BackendError {
    pub operation: &'static str,
    pub message: String,
}

impl BackendError {
    pub fn new(operation: &'static str, message: impl Into<String>) -> Self {
        BackendError {
            operation,
            message: message.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),
    #[error("Out of memory: requested {requested} bytes with a limit of {limit} bytes")]
    OutOfMemory { requested: u64, limit: u64 },
    #[error("Descriptor heap can't hold {requested} more descriptors")]
    DescriptorHeapFull { requested: u32 },
    #[error("Timed out after {waited:?} waiting for {queue:?} queue to reach instance {value}")]
    WaitTimeout {
        queue: QueueType,
        value: u64,
        waited: Duration,
    },
    #[error("Can't {operation} a command list that is {state}")]
    InvalidState {
        operation: &'static str,
        state: &'static str,
    },
    #[error("{0}")]
    Usage(String),
}
