// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Native command buffer pool.
//!
//! Command buffers are expensive to create and can't be reset while the GPU may still be
//! executing them.  The pool is a FIFO of buffers stamped with the fence value that retires
//! them; since fence values on one queue complete in order, only the front ever needs checking.

use crate::error::BackendError;
use crate::imp::NativeCommandBuffer;
use std::collections::VecDeque;

#[derive(Debug)]
struct PooledCommandBuffer<C> {
    command_buffer: C,
    last_submitted_instance: u64,
}

#[derive(Debug)]
pub struct CommandBufferPool<C> {
    pool: VecDeque<PooledCommandBuffer<C>>,
}

impl<C> Default for CommandBufferPool<C> {
    fn default() -> Self {
        CommandBufferPool { pool: VecDeque::new() }
    }
}

impl<C: NativeCommandBuffer> CommandBufferPool<C> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.pool.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pool.is_empty()
    }

    /// Pops the front buffer if the GPU has finished with it (its stamp is at most
    /// `completed_instance`), resetting it for recording.  Otherwise calls `create`.
    pub fn acquire(
        &mut self,
        completed_instance: u64,
        create: impl FnOnce() -> Result<C, BackendError>,
    ) -> Result<C, BackendError> {
        let retired = self
            .pool
            .front()
            .is_some_and(|front| front.last_submitted_instance <= completed_instance);
        if retired {
            if let Some(pooled) = self.pool.pop_front() {
                let mut command_buffer = pooled.command_buffer;
                command_buffer.reset()?;
                logwise::trace_sync!(
                    "reusing command buffer retired at instance {instance}",
                    instance = pooled.last_submitted_instance
                );
                return Ok(command_buffer);
            }
        }
        logwise::trace_sync!(
            "creating a command buffer, {pooled} pooled",
            pooled = self.pool.len()
        );
        create()
    }

    /// Returns a buffer that is safe to reuse once `last_submitted_instance` completes.
    pub fn release(&mut self, command_buffer: C, last_submitted_instance: u64) {
        self.pool.push_back(PooledCommandBuffer {
            command_buffer,
            last_submitted_instance,
        });
    }
}
