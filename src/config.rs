// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Device and command list configuration.

use crate::diagnostics::{LogSink, MessageSink};
use std::sync::Arc;
use std::time::Duration;

/// Hardware queue a command list records for.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum QueueType {
    #[default]
    Graphics,
    Compute,
    Copy,
}

impl QueueType {
    pub const COUNT: usize = 3;
    pub const ALL: [QueueType; QueueType::COUNT] =
        [QueueType::Graphics, QueueType::Compute, QueueType::Copy];

    pub fn index(self) -> usize {
        self as usize
    }

    pub(crate) fn from_index(index: u64) -> Option<QueueType> {
        QueueType::ALL.get(index as usize).copied()
    }
}

#[derive(Debug, Clone)]
pub struct DeviceConfig {
    pub message_sink: Arc<dyn MessageSink>,
    pub descriptor_heap_size: u32,
    pub sampler_heap_size: u32,
    /// Upper bound for [`crate::Device::wait_for_idle`].
    pub idle_wait_timeout: Duration,
    pub idle_poll_interval: Duration,
    /// Report use of a resource whose prior state is unknown as `Fatal` rather than `Error`.
    pub unknown_state_is_fatal: bool,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        DeviceConfig {
            message_sink: Arc::new(LogSink),
            descriptor_heap_size: 1024,
            sampler_heap_size: 128,
            idle_wait_timeout: Duration::from_secs(10),
            idle_poll_interval: Duration::from_micros(100),
            unknown_state_is_fatal: false,
        }
    }
}

impl DeviceConfig {
    pub fn with_message_sink(mut self, sink: Arc<dyn MessageSink>) -> Self {
        self.message_sink = sink;
        self
    }

    pub fn with_descriptor_heap_size(mut self, size: u32) -> Self {
        self.descriptor_heap_size = size;
        self
    }

    pub fn with_idle_wait_timeout(mut self, timeout: Duration) -> Self {
        self.idle_wait_timeout = timeout;
        self
    }

    pub fn with_unknown_state_is_fatal(mut self, fatal: bool) -> Self {
        self.unknown_state_is_fatal = fatal;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandListParameters {
    pub queue_type: QueueType,
    /// Only one immediate command list may be open at a time.
    pub enable_immediate_execution: bool,
    pub upload_chunk_size: u64,
    pub scratch_chunk_size: u64,
    pub scratch_max_memory: u64,
    pub enable_automatic_barriers: bool,
}

impl Default for CommandListParameters {
    fn default() -> Self {
        CommandListParameters {
            queue_type: QueueType::Graphics,
            enable_immediate_execution: true,
            upload_chunk_size: 64 * 1024,
            scratch_chunk_size: 64 * 1024,
            scratch_max_memory: 1024 * 1024 * 1024,
            enable_automatic_barriers: true,
        }
    }
}

impl CommandListParameters {
    pub fn with_queue_type(mut self, queue_type: QueueType) -> Self {
        self.queue_type = queue_type;
        self
    }

    pub fn with_upload_chunk_size(mut self, size: u64) -> Self {
        self.upload_chunk_size = size;
        self
    }

    pub fn with_scratch(mut self, chunk_size: u64, max_memory: u64) -> Self {
        self.scratch_chunk_size = chunk_size;
        self.scratch_max_memory = max_memory;
        self
    }

    pub fn with_immediate_execution(mut self, immediate: bool) -> Self {
        self.enable_immediate_execution = immediate;
        self
    }
}
