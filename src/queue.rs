// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Per-queue fence bookkeeping.
//!
//! # Overview
//!
//! Every hardware queue has one fence.  Each submission signals it with the next
//! *submitted instance* (1, 2, 3, ...), so "the GPU finished submission N" is simply
//! `completed_value >= N`.
//!
//! A queue also hands out *recording instances*, which identify recording sessions before they
//! are submitted.  Sub-allocator chunks are stamped with the recording instance while a session
//! records and restamped with the submitted instance when it executes.
//!
//! Submissions that are still in flight keep their referenced resources alive in a
//! [`CommandListInstance`] until garbage collection finds their fence value completed.

use crate::config::QueueType;
use crate::error::BackendError;
use crate::imp::{Backend, NativeCommandBuffer};
use crate::pool::CommandBufferPool;
use crate::resources::ResourceRef;
use std::collections::VecDeque;

/// One executed recording, kept until the GPU is done with it.
#[derive(Debug)]
pub struct CommandListInstance {
    queue_type: QueueType,
    submitted_instance: u64,
    referenced_resources: Vec<ResourceRef>,
}

impl CommandListInstance {
    pub(crate) fn new(queue_type: QueueType) -> Self {
        CommandListInstance {
            queue_type,
            submitted_instance: 0,
            referenced_resources: Vec::new(),
        }
    }

    pub fn queue_type(&self) -> QueueType {
        self.queue_type
    }

    /// The fence value that retires this instance.  0 until executed.
    pub fn submitted_instance(&self) -> u64 {
        self.submitted_instance
    }

    pub fn referenced_resources(&self) -> &[ResourceRef] {
        &self.referenced_resources
    }

    pub(crate) fn set_submitted_instance(&mut self, instance: u64) {
        self.submitted_instance = instance;
    }

    pub(crate) fn reference(&mut self, resource: ResourceRef) {
        self.referenced_resources.push(resource);
    }
}

#[derive(Debug)]
pub(crate) struct Queue<C> {
    queue_type: QueueType,
    recording_instance: u64,
    last_submitted_instance: u64,
    last_completed_instance: u64,
    in_flight: VecDeque<CommandListInstance>,
    pool: CommandBufferPool<C>,
}

impl<C: NativeCommandBuffer> Queue<C> {
    pub(crate) fn new(queue_type: QueueType) -> Self {
        Queue {
            queue_type,
            recording_instance: 1,
            last_submitted_instance: 0,
            last_completed_instance: 0,
            in_flight: VecDeque::new(),
            pool: CommandBufferPool::new(),
        }
    }

    pub(crate) fn queue_type(&self) -> QueueType {
        self.queue_type
    }

    pub(crate) fn last_submitted_instance(&self) -> u64 {
        self.last_submitted_instance
    }

    pub(crate) fn last_completed_instance(&self) -> u64 {
        self.last_completed_instance
    }

    pub(crate) fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    pub(crate) fn pooled_command_buffers(&self) -> usize {
        self.pool.len()
    }

    /// Hands out the id of a new recording session.
    pub(crate) fn next_recording_instance(&mut self) -> u64 {
        let instance = self.recording_instance;
        self.recording_instance += 1;
        instance
    }

    /// Refreshes the completed instance from the fence.  The fence is only queried while
    /// something is outstanding.
    pub(crate) fn update_last_completed_instance<B>(&mut self, backend: &B) -> u64
    where
        B: Backend<CommandBuffer = C>,
    {
        if self.last_completed_instance < self.last_submitted_instance {
            let completed = backend.completed_value(self.queue_type);
            //a fence never goes backwards, but a misbehaving backend shouldn't make us think so
            self.last_completed_instance = completed.max(self.last_completed_instance);
        }
        self.last_completed_instance
    }

    /// A native command buffer ready for recording, recycled if possible.
    pub(crate) fn acquire_command_buffer<B>(&mut self, backend: &B) -> Result<C, BackendError>
    where
        B: Backend<CommandBuffer = C>,
    {
        let completed = self.update_last_completed_instance(backend);
        let queue_type = self.queue_type;
        self.pool
            .acquire(completed, || backend.create_command_buffer(queue_type))
    }

    pub(crate) fn release_command_buffer(
        &mut self,
        command_buffer: C,
        last_submitted_instance: u64,
    ) {
        self.pool.release(command_buffer, last_submitted_instance);
    }

    /// Submits `command_buffers` and signals the fence with the next submitted instance,
    /// which is returned.
    pub(crate) fn submit<B>(
        &mut self,
        backend: &B,
        command_buffers: &[&C],
    ) -> Result<u64, BackendError>
    where
        B: Backend<CommandBuffer = C>,
    {
        let instance = self.last_submitted_instance + 1;
        backend.submit(self.queue_type, command_buffers, instance)?;
        self.last_submitted_instance = instance;
        logwise::debuginternal_sync!(
            "{queue} queue: submitted {count} command buffers as instance {instance}",
            queue = logwise::privacy::LogIt(self.queue_type),
            count = command_buffers.len(),
            instance = instance
        );
        Ok(instance)
    }

    pub(crate) fn push_in_flight(&mut self, instance: CommandListInstance) {
        self.in_flight.push_back(instance);
    }

    /// Removes every in-flight instance whose fence value has completed.
    pub(crate) fn retire_completed<B>(&mut self, backend: &B) -> Vec<CommandListInstance>
    where
        B: Backend<CommandBuffer = C>,
    {
        let completed = self.update_last_completed_instance(backend);
        let mut retired = Vec::new();
        while self
            .in_flight
            .front()
            .is_some_and(|instance| instance.submitted_instance <= completed)
        {
            if let Some(instance) = self.in_flight.pop_front() {
                retired.push(instance);
            }
        }
        retired
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imp::recording::{RecordingBackend, RecordingCommandBuffer};

    fn closed_buffer(
        queue: &mut Queue<RecordingCommandBuffer>,
        backend: &RecordingBackend,
    ) -> RecordingCommandBuffer {
        let mut cb = queue.acquire_command_buffer(backend).expect("acquire");
        cb.close().expect("close");
        cb
    }

    #[test]
    fn submissions_count_up_from_one() {
        let backend = RecordingBackend::new();
        let mut queue = Queue::new(QueueType::Compute);
        let cb = closed_buffer(&mut queue, &backend);
        assert_eq!(queue.submit(&backend, &[&cb]).expect("first"), 1);
        assert_eq!(queue.submit(&backend, &[&cb]).expect("second"), 2);
        assert_eq!(queue.last_submitted_instance(), 2);
        assert_eq!(backend.submissions()[1].signal_value, 2);
    }

    #[test]
    fn in_flight_instances_retire_in_order() {
        let backend = RecordingBackend::new();
        let mut queue = Queue::new(QueueType::Graphics);
        let cb = closed_buffer(&mut queue, &backend);
        for _ in 0..3 {
            let submitted = queue.submit(&backend, &[&cb]).expect("submit");
            let mut instance = CommandListInstance::new(QueueType::Graphics);
            instance.set_submitted_instance(submitted);
            queue.push_in_flight(instance);
        }

        assert!(queue.retire_completed(&backend).is_empty());
        backend.complete(QueueType::Graphics, 2);
        let retired = queue.retire_completed(&backend);
        assert_eq!(
            retired.iter().map(|i| i.submitted_instance()).collect::<Vec<_>>(),
            vec![1, 2]
        );
        assert_eq!(queue.in_flight_count(), 1);
        assert_eq!(queue.last_completed_instance(), 2);
    }

    #[test]
    fn completed_value_is_only_read_while_work_is_outstanding() {
        let backend = RecordingBackend::new();
        let mut queue: Queue<RecordingCommandBuffer> = Queue::new(QueueType::Copy);
        //nothing submitted: the fence value is ignored
        backend.complete(QueueType::Copy, 7);
        assert_eq!(queue.update_last_completed_instance(&backend), 0);
    }

    #[test]
    fn recording_instances_are_independent_of_submissions() {
        let mut queue: Queue<RecordingCommandBuffer> = Queue::new(QueueType::Graphics);
        assert_eq!(queue.next_recording_instance(), 1);
        assert_eq!(queue.next_recording_instance(), 2);
        assert_eq!(queue.last_submitted_instance(), 0);
    }
}
