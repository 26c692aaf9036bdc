// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Chunked upload and scratch memory.
//!
//! # Overview
//!
//! An [`UploadManager`] hands out small pieces of large chunks.  Allocation bumps a write
//! pointer in the current chunk; when a request doesn't fit, the current chunk is retired to the
//! pool and another chunk takes its place, either a pooled one the GPU is done with or a fresh
//! one from the backend.
//!
//! Chunks are stamped with version words (see [`crate::versioning`]):
//!
//! - `0`: free;
//! - an unsubmitted version: in use by the recording with that instance id;
//! - a submitted version: in flight, free again once the queue completes that instance.
//!
//! The scratch variant backs acceleration-structure builds.  It has a memory budget; over
//! budget it recycles the least recently used chunk that is large enough, which requires a UAV
//! barrier so that the previous user of the memory has finished with it.  The upload variant
//! has no such fallback and fails instead.

use crate::bittricks::align_up;
use crate::error::Error;
use crate::imp::{Backend, ChunkKind, MappedChunk};
use crate::versioning::{version_get_instance, version_is_submitted};
use std::sync::Arc;

/// Chunk sizes are rounded up to this.
pub const CHUNK_SIZE_ALIGNMENT: u64 = 4096;

/// Index of a chunk within its manager.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ChunkId(usize);

/// A piece of a chunk.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Suballocation {
    pub chunk: ChunkId,
    pub offset: u64,
    pub size: u64,
    pub gpu_address: u64,
    /// The memory was recycled from in-flight work and needs a UAV barrier before use.
    pub needs_uav_barrier: bool,
}

#[derive(Debug)]
struct BufferChunk<C> {
    memory: C,
    version: u64,
    write_pointer: u64,
}

impl<C: MappedChunk> BufferChunk<C> {
    fn size(&self) -> u64 {
        self.memory.size()
    }
}

#[derive(Debug)]
pub struct UploadManager<B: Backend> {
    backend: Arc<B>,
    kind: ChunkKind,
    default_chunk_size: u64,
    memory_limit: u64,
    allocated_memory: u64,
    chunks: Vec<BufferChunk<B::Chunk>>,
    /// Retired and free chunks, oldest first.
    pool: Vec<usize>,
    current: Option<usize>,
}

impl<B: Backend> UploadManager<B> {
    /// An upload manager.  A `memory_limit` of 0 means unlimited.
    pub fn new(backend: Arc<B>, default_chunk_size: u64, memory_limit: u64) -> Self {
        Self::with_kind(backend, ChunkKind::Upload, default_chunk_size, memory_limit)
    }

    /// A scratch manager for acceleration-structure builds.
    pub fn new_scratch(backend: Arc<B>, default_chunk_size: u64, memory_limit: u64) -> Self {
        Self::with_kind(backend, ChunkKind::Scratch, default_chunk_size, memory_limit)
    }

    fn with_kind(
        backend: Arc<B>,
        kind: ChunkKind,
        default_chunk_size: u64,
        memory_limit: u64,
    ) -> Self {
        UploadManager {
            backend,
            kind,
            default_chunk_size,
            memory_limit,
            allocated_memory: 0,
            chunks: Vec::new(),
            pool: Vec::new(),
            current: None,
        }
    }

    pub fn allocated_memory(&self) -> u64 {
        self.allocated_memory
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Allocates `size` bytes aligned to `alignment` for the recording identified by
    /// `current_version`.  `completed_instance` is the last instance the queue has finished.
    pub fn suballocate(
        &mut self,
        size: u64,
        alignment: u64,
        current_version: u64,
        completed_instance: u64,
    ) -> Result<Suballocation, Error> {
        let mut chunk_to_retire = None;

        if let Some(index) = self.current {
            let chunk = &mut self.chunks[index];
            let aligned_offset = align_up(chunk.write_pointer, alignment);
            let end = aligned_offset + size;
            if end <= chunk.size() {
                chunk.write_pointer = end;
                return Ok(Suballocation {
                    chunk: ChunkId(index),
                    offset: aligned_offset,
                    size,
                    gpu_address: chunk.memory.gpu_address() + aligned_offset,
                    needs_uav_barrier: false,
                });
            }
            chunk_to_retire = Some(index);
            self.current = None;
        }

        let reusable = self.pool.iter().position(|&index| {
            let chunk = &mut self.chunks[index];
            if version_is_submitted(chunk.version)
                && version_get_instance(chunk.version) <= completed_instance
            {
                chunk.version = 0;
            }
            chunk.version == 0 && chunk.size() >= size
        });
        if let Some(position) = reusable {
            let index = self.pool.remove(position);
            logwise::trace_sync!(
                "reusing {kind} chunk {index}",
                kind = logwise::privacy::LogIt(&self.kind),
                index = index
            );
            self.current = Some(index);
        }

        if let Some(index) = chunk_to_retire {
            self.pool.push(index);
        }

        let mut needs_uav_barrier = false;
        if self.current.is_none() {
            let size_to_allocate =
                align_up(size.max(self.default_chunk_size), CHUNK_SIZE_ALIGNMENT);
            let over_limit = self.memory_limit > 0
                && self.allocated_memory + size_to_allocate > self.memory_limit;

            if over_limit {
                if self.kind != ChunkKind::Scratch {
                    return Err(Error::OutOfMemory {
                        requested: size_to_allocate,
                        limit: self.memory_limit,
                    });
                }
                let position = self.least_recently_used(size).ok_or(Error::OutOfMemory {
                    requested: size,
                    limit: self.memory_limit,
                })?;
                let index = self.pool.remove(position);
                logwise::warn_sync!(
                    "scratch limit of {limit} bytes reached, recycling chunk {index}",
                    limit = self.memory_limit,
                    index = index
                );
                self.current = Some(index);
                needs_uav_barrier = true;
            } else {
                let memory = self.backend.allocate_chunk(size_to_allocate, self.kind)?;
                logwise::trace_sync!(
                    "allocated {kind} chunk of {size} bytes",
                    kind = logwise::privacy::LogIt(&self.kind),
                    size = size_to_allocate
                );
                self.allocated_memory += size_to_allocate;
                self.chunks.push(BufferChunk {
                    memory,
                    version: 0,
                    write_pointer: 0,
                });
                self.current = Some(self.chunks.len() - 1);
            }
        }

        let index = self.current.ok_or(Error::OutOfMemory {
            requested: size,
            limit: self.memory_limit,
        })?;
        let chunk = &mut self.chunks[index];
        chunk.version = current_version;
        chunk.write_pointer = size;
        Ok(Suballocation {
            chunk: ChunkId(index),
            offset: 0,
            size,
            gpu_address: chunk.memory.gpu_address(),
            needs_uav_barrier,
        })
    }

    /// Pool position of the best chunk to recycle: submitted beats still recording, then the
    /// oldest instance wins.
    fn least_recently_used(&self, size: u64) -> Option<usize> {
        let mut best: Option<usize> = None;
        for (position, &index) in self.pool.iter().enumerate() {
            let candidate = &self.chunks[index];
            if candidate.size() < size {
                continue;
            }
            let Some(best_position) = best else {
                best = Some(position);
                continue;
            };
            let current_best = &self.chunks[self.pool[best_position]];
            let candidate_submitted = version_is_submitted(candidate.version);
            let best_submitted = version_is_submitted(current_best.version);
            let candidate_instance = version_get_instance(candidate.version);
            let best_instance = version_get_instance(current_best.version);
            if (candidate_submitted && !best_submitted)
                || (candidate_submitted == best_submitted && candidate_instance < best_instance)
            {
                best = Some(position);
            }
        }
        best
    }

    /// Copies `data` into previously allocated memory.
    pub fn write(&mut self, allocation: &Suballocation, data: &[u8]) {
        debug_assert!(data.len() as u64 <= allocation.size);
        if let Some(chunk) = self.chunks.get_mut(allocation.chunk.0) {
            chunk.memory.write(allocation.offset, data);
        }
    }

    /// Backend memory of a chunk, for inspecting uploads.
    pub fn chunk_memory(&self, chunk: ChunkId) -> Option<&B::Chunk> {
        self.chunks.get(chunk.0).map(|c| &c.memory)
    }

    /// Retires the current chunk and restamps every chunk of the recording `current_version`
    /// with `submitted_version`.
    pub fn submit_chunks(&mut self, current_version: u64, submitted_version: u64) {
        if let Some(index) = self.current.take() {
            self.pool.push(index);
        }
        for chunk in &mut self.chunks {
            if chunk.version == current_version {
                chunk.version = submitted_version;
            }
        }
    }

    /// Frees every chunk of a recording that will never be submitted.
    pub fn discard_chunks(&mut self, current_version: u64) {
        if let Some(index) = self.current.take() {
            self.pool.push(index);
        }
        for chunk in &mut self.chunks {
            if chunk.version == current_version {
                chunk.version = 0;
            }
        }
    }
}
