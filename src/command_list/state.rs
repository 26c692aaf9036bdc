// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Bound state passed to `set_*_state`, and the per-session cache of what is currently bound.

use crate::pipeline::{
    BindingSet, ComputePipeline, Framebuffer, GraphicsPipeline, PipelineBindPoint,
    RayTracingPipeline, Viewport,
};
use crate::resources::{Buffer, Format, ResourceId};
use fnv::FnvHashMap;

#[derive(Clone, Debug, PartialEq)]
pub struct VertexBufferBinding {
    pub buffer: Buffer,
    pub slot: u32,
    pub offset: u64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct IndexBufferBinding {
    pub buffer: Buffer,
    pub format: Format,
    pub offset: u64,
}

/// Everything a draw needs.  `bindings[i]` goes to the pipeline's binding layout `i`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GraphicsState {
    pub pipeline: Option<GraphicsPipeline>,
    pub framebuffer: Option<Framebuffer>,
    pub viewports: Vec<Viewport>,
    pub bindings: Vec<BindingSet>,
    pub vertex_buffers: Vec<VertexBufferBinding>,
    pub index_buffer: Option<IndexBufferBinding>,
    pub indirect_params: Option<Buffer>,
}

impl GraphicsState {
    pub fn new(pipeline: GraphicsPipeline, framebuffer: Framebuffer) -> Self {
        GraphicsState {
            pipeline: Some(pipeline),
            framebuffer: Some(framebuffer),
            ..Default::default()
        }
    }

    pub fn with_viewport(mut self, viewport: Viewport) -> Self {
        self.viewports.push(viewport);
        self
    }

    pub fn with_binding(mut self, binding_set: BindingSet) -> Self {
        self.bindings.push(binding_set);
        self
    }

    pub fn with_vertex_buffer(mut self, slot: u32, buffer: Buffer) -> Self {
        self.vertex_buffers.push(VertexBufferBinding { buffer, slot, offset: 0 });
        self
    }

    pub fn with_index_buffer(mut self, buffer: Buffer, format: Format) -> Self {
        self.index_buffer = Some(IndexBufferBinding { buffer, format, offset: 0 });
        self
    }

    pub fn with_indirect_params(mut self, buffer: Buffer) -> Self {
        self.indirect_params = Some(buffer);
        self
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ComputeState {
    pub pipeline: Option<ComputePipeline>,
    pub bindings: Vec<BindingSet>,
    pub indirect_params: Option<Buffer>,
}

impl ComputeState {
    pub fn new(pipeline: ComputePipeline) -> Self {
        ComputeState {
            pipeline: Some(pipeline),
            ..Default::default()
        }
    }

    pub fn with_binding(mut self, binding_set: BindingSet) -> Self {
        self.bindings.push(binding_set);
        self
    }

    pub fn with_indirect_params(mut self, buffer: Buffer) -> Self {
        self.indirect_params = Some(buffer);
        self
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct RayTracingState {
    pub pipeline: Option<RayTracingPipeline>,
    pub bindings: Vec<BindingSet>,
}

impl RayTracingState {
    pub fn new(pipeline: RayTracingPipeline) -> Self {
        RayTracingState {
            pipeline: Some(pipeline),
            bindings: Vec::new(),
        }
    }

    pub fn with_binding(mut self, binding_set: BindingSet) -> Self {
        self.bindings.push(binding_set);
        self
    }
}

/// A volatile constant buffer bound through a binding set.  Its address is patched before every
/// draw or dispatch if the buffer has been written since.
#[derive(Clone, Debug)]
pub(crate) struct VolatileBinding {
    pub(crate) bind_point: PipelineBindPoint,
    pub(crate) set_index: u32,
    pub(crate) slot: u32,
    pub(crate) buffer: Buffer,
    /// Last address recorded into the command buffer, 0 if none yet.
    pub(crate) address: u64,
}

/// What the current session has bound.  At most one of the three pipeline states is valid.
#[derive(Debug, Default)]
pub(crate) struct BoundState {
    pub(crate) graphics: Option<GraphicsState>,
    pub(crate) compute: Option<ComputeState>,
    pub(crate) ray_tracing: Option<RayTracingState>,
    pub(crate) render_pass_active: bool,
    pub(crate) heap_generation: Option<u64>,
    pub(crate) volatile_bindings: Vec<VolatileBinding>,
    /// Where each volatile buffer's latest contents live in the upload ring.
    pub(crate) volatile_addresses: FnvHashMap<ResourceId, u64>,
    pub(crate) any_volatile_buffer_writes: bool,
}

impl BoundState {
    pub(crate) fn clear(&mut self) {
        *self = BoundState::default();
    }

    /// Forgets the pipeline states.  Volatile buffer contents stay valid for the rest of the
    /// session; volatile bindings are replaced by the next `set_*_state`.
    pub(crate) fn invalidate_pipelines(&mut self) {
        self.graphics = None;
        self.compute = None;
        self.ray_tracing = None;
    }
}

/// Bit `i` is set when binding set `i` must be rebound.
pub(crate) fn binding_update_mask(current: Option<&[BindingSet]>, requested: &[BindingSet]) -> u64 {
    let Some(current) = current else {
        return u64::MAX;
    };
    let mut mask = 0;
    for (index, set) in requested.iter().enumerate() {
        if current.get(index).map(BindingSet::id) != Some(set.id()) {
            mask |= 1 << index;
        }
    }
    mask
}

pub(crate) fn same_id<T>(a: Option<&T>, b: Option<&T>, id: impl Fn(&T) -> ResourceId) -> bool {
    a.map(&id) == b.map(&id)
}
