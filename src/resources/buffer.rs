// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
use crate::imp::NativeResource;
use crate::resources::{Format, ResourceId, debug_name};
use crate::states::ResourceStates;
use std::fmt::{Debug, Formatter};
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

/// How the CPU may access a buffer.  Buffers with CPU access live in memory whose state can't
/// change, so they are never transitioned.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Default)]
pub enum CpuAccessMode {
    #[default]
    None,
    Read,
    Write,
}

#[derive(Clone, Debug, PartialEq)]
pub struct BufferDesc {
    pub byte_size: u64,
    pub struct_stride: u32,
    pub format: Format,
    pub debug_name: String,
    pub can_have_uavs: bool,
    pub is_vertex_buffer: bool,
    pub is_index_buffer: bool,
    pub is_constant_buffer: bool,
    pub is_draw_indirect_args: bool,
    pub is_accel_struct_storage: bool,
    /// Contents are re-uploaded through the upload ring on every write; never tracked.
    pub is_volatile: bool,
    pub cpu_access: CpuAccessMode,
    pub initial_state: ResourceStates,
    pub keep_initial_state: bool,
}

impl BufferDesc {
    pub fn new(byte_size: u64) -> Self {
        BufferDesc {
            byte_size,
            struct_stride: 0,
            format: Format::Unknown,
            debug_name: String::new(),
            can_have_uavs: false,
            is_vertex_buffer: false,
            is_index_buffer: false,
            is_constant_buffer: false,
            is_draw_indirect_args: false,
            is_accel_struct_storage: false,
            is_volatile: false,
            cpu_access: CpuAccessMode::None,
            initial_state: ResourceStates::UNKNOWN,
            keep_initial_state: false,
        }
    }

    /// A small constant buffer whose memory comes from the upload ring.
    pub fn volatile_constant_buffer(byte_size: u64) -> Self {
        BufferDesc {
            is_constant_buffer: true,
            is_volatile: true,
            ..BufferDesc::new(byte_size)
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.debug_name = name.into();
        self
    }

    pub fn with_uavs(mut self, can_have_uavs: bool) -> Self {
        self.can_have_uavs = can_have_uavs;
        self
    }

    pub fn with_vertex_buffer(mut self) -> Self {
        self.is_vertex_buffer = true;
        self
    }

    pub fn with_index_buffer(mut self, format: Format) -> Self {
        self.is_index_buffer = true;
        self.format = format;
        self
    }

    pub fn with_constant_buffer(mut self) -> Self {
        self.is_constant_buffer = true;
        self
    }

    pub fn with_draw_indirect_args(mut self) -> Self {
        self.is_draw_indirect_args = true;
        self
    }

    pub fn with_cpu_access(mut self, cpu_access: CpuAccessMode) -> Self {
        self.cpu_access = cpu_access;
        self
    }

    pub fn with_initial_state(mut self, state: ResourceStates, keep: bool) -> Self {
        self.initial_state = state;
        self.keep_initial_state = keep;
        self
    }

    pub(crate) fn name(&self) -> &str {
        debug_name(&self.debug_name)
    }
}

struct BufferShared {
    id: ResourceId,
    desc: BufferDesc,
    native: NativeResource,
    permanent_state: AtomicU32,
}

/// Shared handle to a buffer.
#[derive(Clone)]
pub struct Buffer(Arc<BufferShared>);

impl Buffer {
    pub(crate) fn new(desc: BufferDesc, native: NativeResource) -> Self {
        Buffer(Arc::new(BufferShared {
            id: ResourceId::next(),
            desc,
            native,
            permanent_state: AtomicU32::new(0),
        }))
    }

    pub fn id(&self) -> ResourceId {
        self.0.id
    }

    pub fn desc(&self) -> &BufferDesc {
        &self.0.desc
    }

    pub fn native(&self) -> NativeResource {
        self.0.native
    }

    /// GPU address of the buffer's own storage.  Volatile buffers have none; their address
    /// changes with every write and is known only to the recording command list.
    pub fn gpu_address(&self) -> u64 {
        self.0.native.gpu_address
    }

    pub fn permanent_state(&self) -> ResourceStates {
        ResourceStates::from_bits_retain(self.0.permanent_state.load(Ordering::Acquire))
    }

    pub(crate) fn set_permanent_state(&self, state: ResourceStates) {
        self.0.permanent_state.store(state.bits(), Ordering::Release);
    }
}

// Boilerplate implementations

impl Debug for Buffer {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Buffer")
            .field("id", &self.0.id)
            .field("name", &self.0.desc.name())
            .field("byte_size", &self.0.desc.byte_size)
            .finish()
    }
}

impl PartialEq for Buffer {
    fn eq(&self, other: &Self) -> bool {
        self.0.id == other.0.id
    }
}

impl Eq for Buffer {}

impl Hash for Buffer {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.id.hash(state);
    }
}
