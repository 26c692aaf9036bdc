// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Pending barriers.
//!
//! # Overview
//!
//! The state tracker discovers transitions one resource at a time, but native APIs want all
//! barriers for a GPU command in one call.  [`BarrierBatch`] sits in between: the tracker
//! appends to it while a command's resources are being prepared, and the command list commits
//! it once, right before recording the command itself.
//!
//! A barrier whose before and after states are equal and include `UNORDERED_ACCESS` is a UAV
//! barrier: no transition, just an ordering point between two unordered-access operations.

use crate::imp::NativeCommandBuffer;
use crate::resources::{Buffer, ResourceId, Texture};
use crate::states::ResourceStates;

/// Which part of a texture a barrier covers.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum BarrierSubresource {
    Entire,
    Single { mip_level: u32, array_slice: u32 },
}

#[derive(Clone, Debug, PartialEq)]
pub struct TextureBarrier {
    pub texture: Texture,
    pub subresource: BarrierSubresource,
    pub state_before: ResourceStates,
    pub state_after: ResourceStates,
}

#[derive(Clone, Debug, PartialEq)]
pub struct BufferBarrier {
    pub buffer: Buffer,
    pub state_before: ResourceStates,
    pub state_after: ResourceStates,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Barrier {
    Texture(TextureBarrier),
    Buffer(BufferBarrier),
}

impl Barrier {
    pub fn state_before(&self) -> ResourceStates {
        match self {
            Barrier::Texture(t) => t.state_before,
            Barrier::Buffer(b) => b.state_before,
        }
    }

    pub fn state_after(&self) -> ResourceStates {
        match self {
            Barrier::Texture(t) => t.state_after,
            Barrier::Buffer(b) => b.state_after,
        }
    }

    pub fn resource_id(&self) -> ResourceId {
        match self {
            Barrier::Texture(t) => t.texture.id(),
            Barrier::Buffer(b) => b.buffer.id(),
        }
    }

    pub fn is_transition(&self) -> bool {
        self.state_before() != self.state_after()
    }

    pub fn is_uav_barrier(&self) -> bool {
        !self.is_transition() && self.state_after().has_uav()
    }
}

/// Ordered queue of barriers waiting to be committed.
#[derive(Debug, Default)]
pub struct BarrierBatch {
    barriers: Vec<Barrier>,
}

impl BarrierBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, barrier: Barrier) {
        self.barriers.push(barrier);
    }

    pub fn len(&self) -> usize {
        self.barriers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.barriers.is_empty()
    }

    pub fn barriers(&self) -> &[Barrier] {
        &self.barriers
    }

    /// The uncommitted barrier for `buffer`, if any.
    pub(crate) fn pending_buffer_barrier_mut(
        &mut self,
        buffer: ResourceId,
    ) -> Option<&mut BufferBarrier> {
        self.barriers.iter_mut().find_map(|b| match b {
            Barrier::Buffer(bb) if bb.buffer.id() == buffer => Some(bb),
            _ => None,
        })
    }

    /// Records every pending barrier into `command_buffer` as one batch and empties the queue.
    ///
    /// Returns the number of barriers committed.  An empty batch records nothing.
    pub fn commit<C: NativeCommandBuffer + ?Sized>(&mut self, command_buffer: &mut C) -> usize {
        if self.barriers.is_empty() {
            return 0;
        }
        let count = self.barriers.len();
        command_buffer.resource_barriers(&self.barriers);
        self.barriers.clear();
        logwise::trace_sync!("committed {count} barriers", count = count);
        count
    }

    pub fn clear(&mut self) {
        self.barriers.clear();
    }
}
