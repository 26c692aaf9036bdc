// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Backend seam.
//!
//! The portable core talks to a native API only through [`Backend`] and [`NativeCommandBuffer`].
//! A backend creates native objects, submits command buffers and reports fence progress; a native
//! command buffer receives committed barriers and [`Command`]s in recording order.
//!
//! The crate ships a recording software backend (always available, used by the tests and by
//! applications that want to inspect what would be sent to the GPU) and two pure barrier
//! translators, one per explicit API, selected by feature.

pub mod recording;

#[cfg(feature = "backend_d3d12")]
pub mod d3d12;

#[cfg(feature = "backend_vulkan")]
pub mod vulkan;

use crate::barriers::Barrier;
use crate::config::QueueType;
use crate::error::BackendError;
use crate::pipeline::{PipelineBindPoint, Viewport};
use crate::resources::{BufferDesc, Format, ResourceId, TextureDesc, TextureSubresourceSet};
use std::fmt::Debug;
use std::time::{Duration, Instant};

/// Native handle and GPU address of a created resource.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Default)]
pub struct NativeResource {
    pub handle: u64,
    pub gpu_address: u64,
}

/// What a pooled memory chunk is used for.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ChunkKind {
    /// CPU-writable memory for uploads and volatile buffers.
    Upload,
    /// GPU-only memory for acceleration-structure build scratch.
    Scratch,
}

/// A chunk of memory handed out by the backend to the sub-allocators.
pub trait MappedChunk: Debug + Send {
    fn gpu_address(&self) -> u64;
    fn size(&self) -> u64;
    /// Copies `data` to `offset`.  Scratch chunks are not CPU-visible and ignore writes.
    fn write(&mut self, offset: u64, data: &[u8]);
}

/// Arguments of a non-indirect draw.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct DrawArguments {
    pub vertex_count: u32,
    pub instance_count: u32,
    pub start_vertex_location: u32,
    pub start_index_location: u32,
    pub start_instance_location: u32,
}

impl DrawArguments {
    pub fn vertices(vertex_count: u32) -> Self {
        DrawArguments {
            vertex_count,
            ..Default::default()
        }
    }

    pub fn with_instances(mut self, instance_count: u32) -> Self {
        self.instance_count = instance_count;
        self
    }
}

impl Default for DrawArguments {
    fn default() -> Self {
        DrawArguments {
            vertex_count: 0,
            instance_count: 1,
            start_vertex_location: 0,
            start_index_location: 0,
            start_instance_location: 0,
        }
    }
}

/// A GPU command, already resolved to resource ids and addresses.
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    SetDescriptorHeaps {
        generation: u64,
    },
    BindPipeline {
        bind_point: PipelineBindPoint,
        pipeline: ResourceId,
    },
    BeginRenderPass {
        framebuffer: ResourceId,
    },
    EndRenderPass,
    SetViewports(Vec<Viewport>),
    BindBindingSet {
        bind_point: PipelineBindPoint,
        index: u32,
        binding_set: ResourceId,
        descriptor_table: Option<u32>,
    },
    SetConstantBufferAddress {
        bind_point: PipelineBindPoint,
        set_index: u32,
        slot: u32,
        address: u64,
    },
    SetVertexBuffer {
        slot: u32,
        buffer: ResourceId,
        address: u64,
    },
    SetIndexBuffer {
        buffer: ResourceId,
        address: u64,
        format: Format,
    },
    Draw(DrawArguments),
    DrawIndexed(DrawArguments),
    DrawIndirect {
        buffer: ResourceId,
        offset: u64,
        draw_count: u32,
    },
    Dispatch {
        x: u32,
        y: u32,
        z: u32,
    },
    DispatchIndirect {
        buffer: ResourceId,
        offset: u64,
    },
    DispatchRays {
        width: u32,
        height: u32,
        depth: u32,
    },
    CopyBufferRegion {
        dest: ResourceId,
        dest_offset: u64,
        src: ResourceId,
        src_offset: u64,
        size: u64,
    },
    UploadBuffer {
        dest: ResourceId,
        dest_offset: u64,
        src_address: u64,
        size: u64,
    },
    UploadTexture {
        dest: ResourceId,
        mip_level: u32,
        array_slice: u32,
        src_address: u64,
        row_pitch: u64,
    },
    CopyTextureRegion {
        dest: ResourceId,
        dest_mip_level: u32,
        dest_array_slice: u32,
        src: ResourceId,
        src_mip_level: u32,
        src_array_slice: u32,
    },
    ClearTextureFloat {
        texture: ResourceId,
        subresources: TextureSubresourceSet,
        color: [f32; 4],
    },
    ClearTextureUInt {
        texture: ResourceId,
        subresources: TextureSubresourceSet,
        value: u32,
    },
    ClearDepthStencil {
        texture: ResourceId,
        subresources: TextureSubresourceSet,
        depth: Option<f32>,
        stencil: Option<u8>,
    },
    ClearBufferUInt {
        buffer: ResourceId,
        value: u32,
    },
    ResolveSubresource {
        dest: ResourceId,
        dest_mip_level: u32,
        dest_array_slice: u32,
        src: ResourceId,
        src_mip_level: u32,
        src_array_slice: u32,
    },
    BuildAccelStruct {
        dest: ResourceId,
        inputs: Vec<ResourceId>,
        scratch_address: u64,
    },
    /// Orders two uses of a recycled scratch chunk.
    ScratchUavBarrier {
        address: u64,
    },
}

/// A native command buffer with its own allocator.
pub trait NativeCommandBuffer: Debug + Send + 'static {
    /// Resets the allocator and reopens the buffer for recording.
    fn reset(&mut self) -> Result<(), BackendError>;
    /// Finalizes recording.
    fn close(&mut self) -> Result<(), BackendError>;
    /// Records one batch of barriers with a single native call.
    fn resource_barriers(&mut self, barriers: &[Barrier]);
    fn record(&mut self, command: Command);
}

/// The device services the portable core consumes.
pub trait Backend: Debug + Send + Sync + 'static {
    type CommandBuffer: NativeCommandBuffer;
    type Chunk: MappedChunk;

    fn name(&self) -> &'static str;

    fn create_command_buffer(&self, queue: QueueType) -> Result<Self::CommandBuffer, BackendError>;

    fn create_texture(&self, desc: &TextureDesc) -> Result<NativeResource, BackendError>;

    fn create_buffer(&self, desc: &BufferDesc) -> Result<NativeResource, BackendError>;

    /// Whether new textures are already in their declared initial state.  When false (Vulkan
    /// images start out undefined) a `keep_initial_state` texture is treated as `COMMON` until
    /// the first submission that uses it.
    fn textures_start_in_initial_state(&self) -> bool;

    fn allocate_chunk(&self, size: u64, kind: ChunkKind) -> Result<Self::Chunk, BackendError>;

    /// Submits `command_buffers` in order, then signals the queue fence with `signal_value`.
    fn submit(
        &self,
        queue: QueueType,
        command_buffers: &[&Self::CommandBuffer],
        signal_value: u64,
    ) -> Result<(), BackendError>;

    /// The last fence value the GPU has reached on `queue`.
    fn completed_value(&self, queue: QueueType) -> u64;

    /// Blocks until the fence reaches `value` or `timeout` elapses.  Returns whether it was
    /// reached.
    fn wait_for_value(
        &self,
        queue: QueueType,
        value: u64,
        timeout: Duration,
        poll_interval: Duration,
    ) -> Result<bool, BackendError> {
        let start = Instant::now();
        loop {
            if self.completed_value(queue) >= value {
                return Ok(true);
            }
            if start.elapsed() >= timeout {
                return Ok(false);
            }
            std::thread::sleep(poll_interval);
        }
    }
}
