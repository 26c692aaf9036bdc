// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
A software backend that records instead of executing.

Command buffers keep everything recorded into them, submissions are logged, and fences only
advance when told to ([`RecordingBackend::complete`], [`RecordingBackend::complete_all`]) or,
with [`RecordingBackend::with_auto_complete`], as soon as work is submitted.  This makes the
backend a controllable stand-in for a GPU: retirement, pooling and idle waits can be driven
step by step.
*/

use crate::barriers::Barrier;
use crate::config::QueueType;
use crate::error::BackendError;
use crate::imp::{Backend, ChunkKind, Command, MappedChunk, NativeCommandBuffer, NativeResource};
use crate::resources::{BufferDesc, TextureDesc};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

const ADDRESS_GRANULARITY: u64 = 64 * 1024;

/// One entry in a recorded command buffer.
#[derive(Clone, Debug, PartialEq)]
pub enum Recorded {
    Barriers(Vec<Barrier>),
    Command(Command),
}

#[derive(Debug, Default)]
pub struct RecordingCommandBuffer {
    serial: u64,
    queue: QueueType,
    recorded: Vec<Recorded>,
    closed: bool,
    resets: u32,
}

impl RecordingCommandBuffer {
    /// Distinguishes native buffers created by the same backend.
    pub fn serial(&self) -> u64 {
        self.serial
    }

    pub fn queue(&self) -> QueueType {
        self.queue
    }

    pub fn recorded(&self) -> &[Recorded] {
        &self.recorded
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// How many times the allocator was reset for reuse.
    pub fn resets(&self) -> u32 {
        self.resets
    }

    pub fn barrier_batches(&self) -> Vec<&[Barrier]> {
        self.recorded
            .iter()
            .filter_map(|r| match r {
                Recorded::Barriers(b) => Some(b.as_slice()),
                Recorded::Command(_) => None,
            })
            .collect()
    }

    /// All committed barriers, flattened in recording order.
    pub fn barriers(&self) -> Vec<&Barrier> {
        self.barrier_batches().into_iter().flatten().collect()
    }

    pub fn commands(&self) -> Vec<&Command> {
        self.recorded
            .iter()
            .filter_map(|r| match r {
                Recorded::Command(c) => Some(c),
                Recorded::Barriers(_) => None,
            })
            .collect()
    }
}

impl NativeCommandBuffer for RecordingCommandBuffer {
    fn reset(&mut self) -> Result<(), BackendError> {
        self.recorded.clear();
        self.closed = false;
        self.resets += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<(), BackendError> {
        if self.closed {
            return Err(BackendError::new("close", "command buffer is already closed"));
        }
        self.closed = true;
        Ok(())
    }

    fn resource_barriers(&mut self, barriers: &[Barrier]) {
        self.recorded.push(Recorded::Barriers(barriers.to_vec()));
    }

    fn record(&mut self, command: Command) {
        self.recorded.push(Recorded::Command(command));
    }
}

#[derive(Debug)]
pub struct RecordingChunk {
    address: u64,
    size: u64,
    kind: ChunkKind,
    data: Vec<u8>,
}

impl RecordingChunk {
    pub fn kind(&self) -> ChunkKind {
        self.kind
    }

    /// Bytes previously written at `offset`.
    pub fn read(&self, offset: u64, len: usize) -> &[u8] {
        let start = offset as usize;
        &self.data[start..start + len]
    }
}

impl MappedChunk for RecordingChunk {
    fn gpu_address(&self) -> u64 {
        self.address
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn write(&mut self, offset: u64, data: &[u8]) {
        if self.kind == ChunkKind::Scratch {
            return;
        }
        let start = offset as usize;
        self.data[start..start + data.len()].copy_from_slice(data);
    }
}

/// A logged queue submission.
#[derive(Clone, Debug)]
pub struct Submission {
    pub queue: QueueType,
    pub signal_value: u64,
    /// `(serial, contents)` of each submitted command buffer.
    pub command_buffers: Vec<(u64, Vec<Recorded>)>,
}

#[derive(Debug)]
pub struct RecordingBackend {
    next_serial: AtomicU64,
    next_handle: AtomicU64,
    next_address: AtomicU64,
    chunks_allocated: AtomicU64,
    completed: [AtomicU64; QueueType::COUNT],
    auto_complete: AtomicBool,
    textures_start_in_initial_state: bool,
    submissions: Mutex<Vec<Submission>>,
}

impl Default for RecordingBackend {
    fn default() -> Self {
        RecordingBackend::new()
    }
}

impl RecordingBackend {
    pub fn new() -> Self {
        RecordingBackend {
            next_serial: AtomicU64::new(1),
            next_handle: AtomicU64::new(1),
            next_address: AtomicU64::new(ADDRESS_GRANULARITY),
            chunks_allocated: AtomicU64::new(0),
            completed: Default::default(),
            auto_complete: AtomicBool::new(false),
            textures_start_in_initial_state: true,
            submissions: Mutex::new(Vec::new()),
        }
    }

    /// Fences complete as soon as work is submitted.
    pub fn with_auto_complete(self, auto_complete: bool) -> Self {
        self.auto_complete.store(auto_complete, Ordering::Relaxed);
        self
    }

    /// Behave like an API whose images start out undefined.
    pub fn with_undefined_initial_textures(mut self) -> Self {
        self.textures_start_in_initial_state = false;
        self
    }

    /// Advances the completed fence value of `queue` to `value` (never backwards).
    pub fn complete(&self, queue: QueueType, value: u64) {
        self.completed[queue.index()].fetch_max(value, Ordering::AcqRel);
    }

    /// Completes everything submitted so far on every queue.
    pub fn complete_all(&self) {
        let submissions = self.lock_submissions();
        for submission in submissions.iter() {
            self.complete(submission.queue, submission.signal_value);
        }
    }

    pub fn submissions(&self) -> Vec<Submission> {
        self.lock_submissions().clone()
    }

    pub fn command_buffers_created(&self) -> u64 {
        self.next_serial.load(Ordering::Relaxed) - 1
    }

    pub fn chunks_allocated(&self) -> u64 {
        self.chunks_allocated.load(Ordering::Relaxed)
    }

    fn lock_submissions(&self) -> MutexGuard<'_, Vec<Submission>> {
        self.submissions.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn reserve_addresses(&self, size: u64) -> u64 {
        let span = crate::bittricks::align_up(size.max(1), ADDRESS_GRANULARITY);
        self.next_address.fetch_add(span, Ordering::Relaxed)
    }

    fn next_resource(&self, size: u64) -> NativeResource {
        NativeResource {
            handle: self.next_handle.fetch_add(1, Ordering::Relaxed),
            gpu_address: self.reserve_addresses(size),
        }
    }
}

impl Backend for RecordingBackend {
    type CommandBuffer = RecordingCommandBuffer;
    type Chunk = RecordingChunk;

    fn name(&self) -> &'static str {
        "recording"
    }

    fn create_command_buffer(&self, queue: QueueType) -> Result<Self::CommandBuffer, BackendError> {
        Ok(RecordingCommandBuffer {
            serial: self.next_serial.fetch_add(1, Ordering::Relaxed),
            queue,
            ..Default::default()
        })
    }

    fn create_texture(&self, desc: &TextureDesc) -> Result<NativeResource, BackendError> {
        if desc.width == 0 || desc.height == 0 || desc.mip_levels == 0 || desc.array_size == 0 {
            return Err(BackendError::new(
                "create_texture",
                format!("texture {} has a zero dimension", desc.name()),
            ));
        }
        let bytes = u64::from(desc.width)
            * u64::from(desc.height)
            * u64::from(desc.format.info().bytes_per_block);
        Ok(self.next_resource(bytes))
    }

    fn create_buffer(&self, desc: &BufferDesc) -> Result<NativeResource, BackendError> {
        if desc.byte_size == 0 {
            return Err(BackendError::new(
                "create_buffer",
                format!("buffer {} has zero size", desc.name()),
            ));
        }
        if desc.is_volatile {
            //volatile buffers live in the upload ring
            return Ok(NativeResource {
                handle: self.next_handle.fetch_add(1, Ordering::Relaxed),
                gpu_address: 0,
            });
        }
        Ok(self.next_resource(desc.byte_size))
    }

    fn textures_start_in_initial_state(&self) -> bool {
        self.textures_start_in_initial_state
    }

    fn allocate_chunk(&self, size: u64, kind: ChunkKind) -> Result<Self::Chunk, BackendError> {
        self.chunks_allocated.fetch_add(1, Ordering::Relaxed);
        let data = match kind {
            ChunkKind::Upload => vec![0; size as usize],
            ChunkKind::Scratch => Vec::new(),
        };
        Ok(RecordingChunk {
            address: self.reserve_addresses(size),
            size,
            kind,
            data,
        })
    }

    fn submit(
        &self,
        queue: QueueType,
        command_buffers: &[&Self::CommandBuffer],
        signal_value: u64,
    ) -> Result<(), BackendError> {
        if let Some(open) = command_buffers.iter().find(|cb| !cb.closed) {
            return Err(BackendError::new(
                "submit",
                format!("command buffer {} is still open", open.serial),
            ));
        }
        self.lock_submissions().push(Submission {
            queue,
            signal_value,
            command_buffers: command_buffers
                .iter()
                .map(|cb| (cb.serial, cb.recorded.clone()))
                .collect(),
        });
        if self.auto_complete.load(Ordering::Relaxed) {
            self.complete(queue, signal_value);
        }
        Ok(())
    }

    fn completed_value(&self, queue: QueueType) -> u64 {
        self.completed[queue.index()].load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fences_advance_only_when_told() {
        let backend = RecordingBackend::new();
        let mut cb = backend.create_command_buffer(QueueType::Graphics).expect("cb");
        cb.close().expect("close");
        backend.submit(QueueType::Graphics, &[&cb], 1).expect("submit");
        assert_eq!(backend.completed_value(QueueType::Graphics), 0);
        backend.complete_all();
        assert_eq!(backend.completed_value(QueueType::Graphics), 1);
        backend.complete(QueueType::Graphics, 0);
        assert_eq!(backend.completed_value(QueueType::Graphics), 1);
        assert_eq!(backend.completed_value(QueueType::Copy), 0);
    }

    #[test]
    fn open_buffers_are_not_submittable() {
        let backend = RecordingBackend::new();
        let cb = backend.create_command_buffer(QueueType::Graphics).expect("cb");
        assert!(backend.submit(QueueType::Graphics, &[&cb], 1).is_err());
    }

    #[test]
    fn chunk_addresses_are_disjoint() {
        let backend = RecordingBackend::new();
        let a = backend.allocate_chunk(100_000, ChunkKind::Upload).expect("a");
        let b = backend.allocate_chunk(10, ChunkKind::Upload).expect("b");
        assert!(b.gpu_address() >= a.gpu_address() + a.size());
        assert_eq!(backend.chunks_allocated(), 2);
    }

    #[test]
    fn wait_times_out() {
        let backend = RecordingBackend::new();
        let reached = backend
            .wait_for_value(
                QueueType::Compute,
                1,
                std::time::Duration::from_millis(5),
                std::time::Duration::from_millis(1),
            )
            .expect("wait");
        assert!(!reached);
    }
}
