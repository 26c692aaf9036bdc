// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! GPU resources as seen by the state tracker.
//!
//! # Overview
//!
//! Resources are shared handles ([`Texture`], [`Buffer`], [`AccelStruct`]) around an immutable
//! descriptor plus the small amount of device-scope mutable state that outlives a recording
//! session: the permanent state and, for textures, whether the GPU copy has been initialised.
//!
//! Every resource carries a [`ResourceId`].  Per-session tracking maps are keyed by that id rather
//! than by address, so a handle can be cloned, dropped and re-created freely without confusing
//! the tracker.

mod accel_struct;
mod buffer;
mod format;
mod subresources;
mod texture;

pub use accel_struct::{AccelStruct, AccelStructDesc};
pub use buffer::{Buffer, BufferDesc, CpuAccessMode};
pub use format::{Format, FormatInfo};
pub use subresources::TextureSubresourceSet;
pub use texture::{Texture, TextureDesc, TextureDimension};

use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_RESOURCE_ID: AtomicU64 = AtomicU64::new(1);

/// Stable identity of a resource for the lifetime of the process.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(u64);

impl ResourceId {
    pub(crate) fn next() -> Self {
        ResourceId(NEXT_RESOURCE_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl Display for ResourceId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A strong reference held by an in-flight submission so the resource outlives the GPU work.
#[derive(Debug, Clone)]
pub enum ResourceRef {
    Texture(Texture),
    Buffer(Buffer),
    AccelStruct(AccelStruct),
    BindingSet(crate::pipeline::BindingSet),
    Framebuffer(crate::pipeline::Framebuffer),
    GraphicsPipeline(crate::pipeline::GraphicsPipeline),
    ComputePipeline(crate::pipeline::ComputePipeline),
    RayTracingPipeline(crate::pipeline::RayTracingPipeline),
}

impl ResourceRef {
    pub fn id(&self) -> ResourceId {
        match self {
            ResourceRef::Texture(t) => t.id(),
            ResourceRef::Buffer(b) => b.id(),
            ResourceRef::AccelStruct(a) => a.id(),
            ResourceRef::BindingSet(b) => b.id(),
            ResourceRef::Framebuffer(f) => f.id(),
            ResourceRef::GraphicsPipeline(p) => p.id(),
            ResourceRef::ComputePipeline(p) => p.id(),
            ResourceRef::RayTracingPipeline(p) => p.id(),
        }
    }
}

pub(crate) fn debug_name(name: &str) -> &str {
    if name.is_empty() { "<UNNAMED>" } else { name }
}
