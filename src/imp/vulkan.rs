// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Vulkan barrier translation.
//!
//! Vulkan barriers carry pipeline stages and access masks on both sides, and images also carry
//! layouts.  Every neutral state bit maps to a (stage, access, layout) triple; a combined state
//! ORs the stages and accesses of its bits.  `vkCmdPipelineBarrier` takes a single stage pair,
//! so a committed batch becomes a sequence of [`PipelineBarrierBatch`]es, one per run of
//! consecutive barriers that share their stage pair.

use crate::barriers::{Barrier, BarrierSubresource, BufferBarrier, TextureBarrier};
use crate::states::ResourceStates;
use ash::vk::{self, Handle};

/// Native synchronisation scope of a (possibly combined) neutral state.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ResourceStateMapping {
    pub stage_flags: vk::PipelineStageFlags,
    pub access_mask: vk::AccessFlags,
    /// `UNDEFINED` for states that don't imply a layout.
    pub image_layout: vk::ImageLayout,
}

impl ResourceStateMapping {
    const fn new(
        stage_flags: vk::PipelineStageFlags,
        access_mask: vk::AccessFlags,
        image_layout: vk::ImageLayout,
    ) -> Self {
        ResourceStateMapping {
            stage_flags,
            access_mask,
            image_layout,
        }
    }
}

/// Indexed by state bit.
const STATE_TABLE: [ResourceStateMapping; 21] = {
    use ash::vk::AccessFlags as A;
    use ash::vk::ImageLayout as L;
    use ash::vk::PipelineStageFlags as S;
    [
        //COMMON
        ResourceStateMapping::new(S::TOP_OF_PIPE, A::empty(), L::UNDEFINED),
        //CONSTANT_BUFFER
        ResourceStateMapping::new(S::ALL_COMMANDS, A::UNIFORM_READ, L::UNDEFINED),
        //VERTEX_BUFFER
        ResourceStateMapping::new(S::VERTEX_INPUT, A::VERTEX_ATTRIBUTE_READ, L::UNDEFINED),
        //INDEX_BUFFER
        ResourceStateMapping::new(S::VERTEX_INPUT, A::INDEX_READ, L::UNDEFINED),
        //INDIRECT_ARGUMENT
        ResourceStateMapping::new(S::DRAW_INDIRECT, A::INDIRECT_COMMAND_READ, L::UNDEFINED),
        //SHADER_RESOURCE
        ResourceStateMapping::new(S::ALL_COMMANDS, A::SHADER_READ, L::SHADER_READ_ONLY_OPTIMAL),
        //UNORDERED_ACCESS
        ResourceStateMapping::new(
            S::ALL_COMMANDS,
            A::from_raw(A::SHADER_READ.as_raw() | A::SHADER_WRITE.as_raw()),
            L::GENERAL,
        ),
        //RENDER_TARGET
        ResourceStateMapping::new(
            S::COLOR_ATTACHMENT_OUTPUT,
            A::from_raw(A::COLOR_ATTACHMENT_READ.as_raw() | A::COLOR_ATTACHMENT_WRITE.as_raw()),
            L::COLOR_ATTACHMENT_OPTIMAL,
        ),
        //DEPTH_WRITE
        ResourceStateMapping::new(
            S::from_raw(S::EARLY_FRAGMENT_TESTS.as_raw() | S::LATE_FRAGMENT_TESTS.as_raw()),
            A::from_raw(
                A::DEPTH_STENCIL_ATTACHMENT_READ.as_raw()
                    | A::DEPTH_STENCIL_ATTACHMENT_WRITE.as_raw(),
            ),
            L::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        ),
        //DEPTH_READ
        ResourceStateMapping::new(
            S::from_raw(S::EARLY_FRAGMENT_TESTS.as_raw() | S::LATE_FRAGMENT_TESTS.as_raw()),
            A::DEPTH_STENCIL_ATTACHMENT_READ,
            L::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        ),
        //STREAM_OUT
        ResourceStateMapping::new(
            S::TRANSFORM_FEEDBACK_EXT,
            A::TRANSFORM_FEEDBACK_WRITE_EXT,
            L::UNDEFINED,
        ),
        //COPY_DEST
        ResourceStateMapping::new(S::TRANSFER, A::TRANSFER_WRITE, L::TRANSFER_DST_OPTIMAL),
        //COPY_SOURCE
        ResourceStateMapping::new(S::TRANSFER, A::TRANSFER_READ, L::TRANSFER_SRC_OPTIMAL),
        //RESOLVE_DEST
        ResourceStateMapping::new(S::TRANSFER, A::TRANSFER_WRITE, L::TRANSFER_DST_OPTIMAL),
        //RESOLVE_SOURCE
        ResourceStateMapping::new(S::TRANSFER, A::TRANSFER_READ, L::TRANSFER_SRC_OPTIMAL),
        //PRESENT
        ResourceStateMapping::new(S::ALL_COMMANDS, A::MEMORY_READ, L::PRESENT_SRC_KHR),
        //ACCEL_STRUCT_READ
        ResourceStateMapping::new(
            S::from_raw(S::RAY_TRACING_SHADER_KHR.as_raw() | S::COMPUTE_SHADER.as_raw()),
            A::ACCELERATION_STRUCTURE_READ_KHR,
            L::UNDEFINED,
        ),
        //ACCEL_STRUCT_WRITE
        ResourceStateMapping::new(
            S::ACCELERATION_STRUCTURE_BUILD_KHR,
            A::ACCELERATION_STRUCTURE_WRITE_KHR,
            L::UNDEFINED,
        ),
        //ACCEL_STRUCT_BUILD_INPUT
        ResourceStateMapping::new(
            S::ACCELERATION_STRUCTURE_BUILD_KHR,
            A::ACCELERATION_STRUCTURE_READ_KHR,
            L::UNDEFINED,
        ),
        //ACCEL_STRUCT_BUILD_BLAS
        ResourceStateMapping::new(
            S::ACCELERATION_STRUCTURE_BUILD_KHR,
            A::ACCELERATION_STRUCTURE_READ_KHR,
            L::UNDEFINED,
        ),
        //SHADING_RATE_SURFACE
        ResourceStateMapping::new(
            S::FRAGMENT_SHADING_RATE_ATTACHMENT_KHR,
            A::FRAGMENT_SHADING_RATE_ATTACHMENT_READ_KHR,
            L::FRAGMENT_SHADING_RATE_ATTACHMENT_OPTIMAL_KHR,
        ),
    ]
};

/// ORs the mappings of every bit of `state`.  The layout is taken from the highest bit that
/// implies one; combined states never imply two different layouts.
pub fn convert_resource_state(state: ResourceStates) -> ResourceStateMapping {
    let mut result = ResourceStateMapping::new(
        vk::PipelineStageFlags::empty(),
        vk::AccessFlags::empty(),
        vk::ImageLayout::UNDEFINED,
    );
    for (bit, mapping) in STATE_TABLE.iter().enumerate() {
        if state.bits() & (1 << bit) == 0 {
            continue;
        }
        result.stage_flags |= mapping.stage_flags;
        result.access_mask |= mapping.access_mask;
        if mapping.image_layout != vk::ImageLayout::UNDEFINED {
            result.image_layout = mapping.image_layout;
        }
    }
    result
}

/// The arguments of one `vkCmdPipelineBarrier` call.
#[derive(Clone, Debug, Default)]
pub struct PipelineBarrierBatch {
    pub src_stage_mask: vk::PipelineStageFlags,
    pub dst_stage_mask: vk::PipelineStageFlags,
    pub image_barriers: Vec<vk::ImageMemoryBarrier<'static>>,
    pub buffer_barriers: Vec<vk::BufferMemoryBarrier<'static>>,
}

impl PipelineBarrierBatch {
    fn new(src_stage_mask: vk::PipelineStageFlags, dst_stage_mask: vk::PipelineStageFlags) -> Self {
        PipelineBarrierBatch {
            src_stage_mask,
            dst_stage_mask,
            ..Default::default()
        }
    }
}

/// Translates a committed batch.  Texture barriers come first, then buffer barriers, each kind
/// split into runs of equal stage pairs.
pub fn translate_barriers<'a>(
    barriers: impl IntoIterator<Item = &'a Barrier> + Clone,
) -> Vec<PipelineBarrierBatch> {
    let mut batches = Vec::new();

    let mut current: Option<PipelineBarrierBatch> = None;
    for barrier in barriers.clone() {
        let Barrier::Texture(texture) = barrier else {
            continue;
        };
        let (before, after) = (
            convert_resource_state(texture.state_before),
            convert_resource_state(texture.state_after),
        );
        let batch = next_batch(&mut current, &mut batches, before.stage_flags, after.stage_flags);
        batch.image_barriers.push(image_barrier(texture, before, after));
    }
    batches.extend(current.take());

    for barrier in barriers {
        let Barrier::Buffer(buffer) = barrier else {
            continue;
        };
        let (before, after) = (
            convert_resource_state(buffer.state_before),
            convert_resource_state(buffer.state_after),
        );
        let batch = next_batch(&mut current, &mut batches, before.stage_flags, after.stage_flags);
        batch.buffer_barriers.push(buffer_barrier(buffer, before, after));
    }
    batches.extend(current.take());
    batches
}

/// The batch to append to: `current` if its stage pair matches, else a new one after flushing
/// `current` into `batches`.
fn next_batch<'b>(
    current: &'b mut Option<PipelineBarrierBatch>,
    batches: &mut Vec<PipelineBarrierBatch>,
    src: vk::PipelineStageFlags,
    dst: vk::PipelineStageFlags,
) -> &'b mut PipelineBarrierBatch {
    let matches = current
        .as_ref()
        .is_some_and(|b| b.src_stage_mask == src && b.dst_stage_mask == dst);
    if !matches {
        batches.extend(current.take());
    }
    current.get_or_insert_with(|| PipelineBarrierBatch::new(src, dst))
}

fn image_barrier(
    barrier: &TextureBarrier,
    before: ResourceStateMapping,
    after: ResourceStateMapping,
) -> vk::ImageMemoryBarrier<'static> {
    let desc = barrier.texture.desc();
    let info = desc.format.info();
    let mut aspect_mask = vk::ImageAspectFlags::empty();
    if info.has_depth {
        aspect_mask |= vk::ImageAspectFlags::DEPTH;
    }
    if info.has_stencil {
        aspect_mask |= vk::ImageAspectFlags::STENCIL;
    }
    if aspect_mask.is_empty() {
        aspect_mask = vk::ImageAspectFlags::COLOR;
    }
    let subresource_range = match barrier.subresource {
        BarrierSubresource::Entire => vk::ImageSubresourceRange {
            aspect_mask,
            base_mip_level: 0,
            level_count: desc.mip_levels,
            base_array_layer: 0,
            layer_count: desc.array_size,
        },
        BarrierSubresource::Single {
            mip_level,
            array_slice,
        } => vk::ImageSubresourceRange {
            aspect_mask,
            base_mip_level: mip_level,
            level_count: 1,
            base_array_layer: array_slice,
            layer_count: 1,
        },
    };
    vk::ImageMemoryBarrier {
        src_access_mask: before.access_mask,
        dst_access_mask: after.access_mask,
        old_layout: before.image_layout,
        new_layout: after.image_layout,
        src_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
        dst_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
        image: vk::Image::from_raw(barrier.texture.native().handle),
        subresource_range,
        ..Default::default()
    }
}

fn buffer_barrier(
    barrier: &BufferBarrier,
    before: ResourceStateMapping,
    after: ResourceStateMapping,
) -> vk::BufferMemoryBarrier<'static> {
    vk::BufferMemoryBarrier {
        src_access_mask: before.access_mask,
        dst_access_mask: after.access_mask,
        src_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
        dst_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
        buffer: vk::Buffer::from_raw(barrier.buffer.native().handle),
        offset: 0,
        size: barrier.buffer.desc().byte_size,
        ..Default::default()
    }
}
