// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Direct3D 12 barrier translation.
//!
//! D3D12 has no stage masks: a barrier is either a state transition of one subresource (or of
//! all of them) or a UAV barrier that orders two unordered-access operations on one resource.
//! [`translate_barriers`] turns a committed [`Barrier`] batch into the values a backend passes
//! to `ID3D12GraphicsCommandList::ResourceBarrier` in one call.

use crate::barriers::{Barrier, BarrierSubresource, BufferBarrier, TextureBarrier};
use crate::states::ResourceStates;

/// `D3D12_RESOURCE_STATES` values.
#[allow(missing_docs)]
pub mod resource_states {
    pub const COMMON: u32 = 0;
    pub const VERTEX_AND_CONSTANT_BUFFER: u32 = 0x1;
    pub const INDEX_BUFFER: u32 = 0x2;
    pub const RENDER_TARGET: u32 = 0x4;
    pub const UNORDERED_ACCESS: u32 = 0x8;
    pub const DEPTH_WRITE: u32 = 0x10;
    pub const DEPTH_READ: u32 = 0x20;
    pub const NON_PIXEL_SHADER_RESOURCE: u32 = 0x40;
    pub const PIXEL_SHADER_RESOURCE: u32 = 0x80;
    pub const STREAM_OUT: u32 = 0x100;
    pub const INDIRECT_ARGUMENT: u32 = 0x200;
    pub const COPY_DEST: u32 = 0x400;
    pub const COPY_SOURCE: u32 = 0x800;
    pub const RESOLVE_DEST: u32 = 0x1000;
    pub const RESOLVE_SOURCE: u32 = 0x2000;
    pub const RAYTRACING_ACCELERATION_STRUCTURE: u32 = 0x400000;
    pub const SHADING_RATE_SOURCE: u32 = 0x1000000;
    pub const PRESENT: u32 = 0;
}

/// `D3D12_RESOURCE_BARRIER_ALL_SUBRESOURCES`
pub const ALL_SUBRESOURCES: u32 = 0xffff_ffff;

/// Neutral bit to native bits.  Several neutral states share a native state.
const STATE_TABLE: [(ResourceStates, u32); 21] = {
    use self::resource_states as d3d;
    [
        (ResourceStates::COMMON, d3d::COMMON),
        (ResourceStates::CONSTANT_BUFFER, d3d::VERTEX_AND_CONSTANT_BUFFER),
        (ResourceStates::VERTEX_BUFFER, d3d::VERTEX_AND_CONSTANT_BUFFER),
        (ResourceStates::INDEX_BUFFER, d3d::INDEX_BUFFER),
        (ResourceStates::INDIRECT_ARGUMENT, d3d::INDIRECT_ARGUMENT),
        (
            ResourceStates::SHADER_RESOURCE,
            d3d::NON_PIXEL_SHADER_RESOURCE | d3d::PIXEL_SHADER_RESOURCE,
        ),
        (ResourceStates::UNORDERED_ACCESS, d3d::UNORDERED_ACCESS),
        (ResourceStates::RENDER_TARGET, d3d::RENDER_TARGET),
        (ResourceStates::DEPTH_WRITE, d3d::DEPTH_WRITE),
        (ResourceStates::DEPTH_READ, d3d::DEPTH_READ),
        (ResourceStates::STREAM_OUT, d3d::STREAM_OUT),
        (ResourceStates::COPY_DEST, d3d::COPY_DEST),
        (ResourceStates::COPY_SOURCE, d3d::COPY_SOURCE),
        (ResourceStates::RESOLVE_DEST, d3d::RESOLVE_DEST),
        (ResourceStates::RESOLVE_SOURCE, d3d::RESOLVE_SOURCE),
        (ResourceStates::PRESENT, d3d::PRESENT),
        (ResourceStates::ACCEL_STRUCT_READ, d3d::RAYTRACING_ACCELERATION_STRUCTURE),
        (ResourceStates::ACCEL_STRUCT_WRITE, d3d::RAYTRACING_ACCELERATION_STRUCTURE),
        (ResourceStates::ACCEL_STRUCT_BUILD_INPUT, d3d::NON_PIXEL_SHADER_RESOURCE),
        (ResourceStates::ACCEL_STRUCT_BUILD_BLAS, d3d::RAYTRACING_ACCELERATION_STRUCTURE),
        (ResourceStates::SHADING_RATE_SURFACE, d3d::SHADING_RATE_SOURCE),
    ]
};

pub fn convert_resource_states(states: ResourceStates) -> u32 {
    STATE_TABLE
        .iter()
        .filter(|(neutral, _)| states.contains(*neutral))
        .fold(resource_states::COMMON, |acc, (_, native)| acc | native)
}

/// `D3D12CalcSubresource`
pub fn calc_subresource(
    mip_level: u32,
    array_slice: u32,
    plane: u32,
    mip_levels: u32,
    array_size: u32,
) -> u32 {
    mip_level + array_slice * mip_levels + plane * mip_levels * array_size
}

/// One `D3D12_RESOURCE_BARRIER`.  `resource` is the native handle of the resource.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum D3d12Barrier {
    Transition {
        resource: u64,
        subresource: u32,
        state_before: u32,
        state_after: u32,
    },
    Uav {
        resource: u64,
    },
}

/// Translates a committed batch in order.  Partial transitions of multi-plane textures expand
/// to one barrier per plane; barriers with nothing to do natively are dropped.
pub fn translate_barriers<'a>(
    barriers: impl IntoIterator<Item = &'a Barrier>,
) -> Vec<D3d12Barrier> {
    let barriers = barriers.into_iter();
    let mut native = Vec::with_capacity(barriers.size_hint().0);
    for barrier in barriers {
        match barrier {
            Barrier::Texture(texture) => translate_texture_barrier(texture, &mut native),
            Barrier::Buffer(buffer) => translate_buffer_barrier(buffer, &mut native),
        }
    }
    native
}

fn translate_texture_barrier(barrier: &TextureBarrier, out: &mut Vec<D3d12Barrier>) {
    let resource = barrier.texture.native().handle;
    let state_before = convert_resource_states(barrier.state_before);
    let state_after = convert_resource_states(barrier.state_after);
    if state_before != state_after {
        match barrier.subresource {
            BarrierSubresource::Entire => out.push(D3d12Barrier::Transition {
                resource,
                subresource: ALL_SUBRESOURCES,
                state_before,
                state_after,
            }),
            BarrierSubresource::Single {
                mip_level,
                array_slice,
            } => {
                let desc = barrier.texture.desc();
                for plane in 0..desc.format.plane_count() {
                    out.push(D3d12Barrier::Transition {
                        resource,
                        subresource: calc_subresource(
                            mip_level,
                            array_slice,
                            plane,
                            desc.mip_levels,
                            desc.array_size,
                        ),
                        state_before,
                        state_after,
                    });
                }
            }
        }
    } else if state_after & resource_states::UNORDERED_ACCESS != 0 {
        out.push(D3d12Barrier::Uav { resource });
    }
}

fn translate_buffer_barrier(barrier: &BufferBarrier, out: &mut Vec<D3d12Barrier>) {
    use self::resource_states::RAYTRACING_ACCELERATION_STRUCTURE as ACCEL;
    let resource = barrier.buffer.native().handle;
    let state_before = convert_resource_states(barrier.state_before);
    let state_after = convert_resource_states(barrier.state_after);

    //acceleration structure buffers never leave their state, builds are ordered with UAV barriers
    if state_before != state_after && state_before & ACCEL == 0 && state_after & ACCEL == 0 {
        out.push(D3d12Barrier::Transition {
            resource,
            subresource: ALL_SUBRESOURCES,
            state_before,
            state_after,
        });
        return;
    }
    let as_readers = ResourceStates::ACCEL_STRUCT_READ | ResourceStates::ACCEL_STRUCT_BUILD_BLAS;
    let write_then_read = barrier.state_before == ResourceStates::ACCEL_STRUCT_WRITE
        && barrier.state_after.intersects(as_readers);
    let read_then_write = barrier.state_after == ResourceStates::ACCEL_STRUCT_WRITE
        && barrier.state_before.intersects(as_readers);
    if write_then_read || read_then_write || state_after & resource_states::UNORDERED_ACCESS != 0 {
        out.push(D3d12Barrier::Uav { resource });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imp::NativeResource;
    use crate::resources::{Buffer, BufferDesc, Format, Texture, TextureDesc, TextureDimension};

    fn texture(desc: TextureDesc) -> Texture {
        Texture::new(desc, NativeResource { handle: 7, gpu_address: 0 }, true)
    }

    fn buffer() -> Buffer {
        Buffer::new(BufferDesc::new(256), NativeResource { handle: 9, gpu_address: 0x1000 })
    }

    #[test]
    fn state_conversion() {
        use super::resource_states as d3d;
        assert_eq!(convert_resource_states(ResourceStates::UNKNOWN), d3d::COMMON);
        assert_eq!(
            convert_resource_states(ResourceStates::SHADER_RESOURCE),
            d3d::NON_PIXEL_SHADER_RESOURCE | d3d::PIXEL_SHADER_RESOURCE
        );
        assert_eq!(
            convert_resource_states(
                ResourceStates::VERTEX_BUFFER | ResourceStates::CONSTANT_BUFFER
            ),
            d3d::VERTEX_AND_CONSTANT_BUFFER
        );
        assert_eq!(
            convert_resource_states(ResourceStates::ACCEL_STRUCT_BUILD_INPUT),
            d3d::NON_PIXEL_SHADER_RESOURCE
        );
        assert_eq!(convert_resource_states(ResourceStates::PRESENT), d3d::COMMON);
    }

    #[test]
    fn partial_depth_stencil_transition_covers_both_planes() {
        let tex = texture(
            TextureDesc::new_2d(4, 4, Format::D24S8)
                .with_mip_levels(3)
                .with_array_size(2)
                .with_dimension(TextureDimension::Texture2DArray),
        );
        let barrier = Barrier::Texture(TextureBarrier {
            texture: tex,
            subresource: BarrierSubresource::Single {
                mip_level: 1,
                array_slice: 1,
            },
            state_before: ResourceStates::DEPTH_WRITE,
            state_after: ResourceStates::SHADER_RESOURCE,
        });
        let native = translate_barriers([&barrier]);
        let subresources: Vec<u32> = native
            .iter()
            .map(|b| match b {
                D3d12Barrier::Transition { subresource, .. } => *subresource,
                D3d12Barrier::Uav { .. } => panic!("unexpected UAV barrier"),
            })
            .collect();
        //mip 1 + slice 1 * 3 mips, then + one plane of 6 subresources
        assert_eq!(subresources, vec![4, 10]);
    }

    #[test]
    fn same_native_state_becomes_uav_barrier_or_nothing() {
        let tex = texture(TextureDesc::new_2d(4, 4, Format::Rgba8Unorm).with_uav(true));
        let uav = Barrier::Texture(TextureBarrier {
            texture: tex.clone(),
            subresource: BarrierSubresource::Entire,
            state_before: ResourceStates::UNORDERED_ACCESS,
            state_after: ResourceStates::UNORDERED_ACCESS,
        });
        //vertex and constant buffer share a native state
        let aliased = Barrier::Buffer(BufferBarrier {
            buffer: buffer(),
            state_before: ResourceStates::VERTEX_BUFFER,
            state_after: ResourceStates::CONSTANT_BUFFER,
        });
        assert_eq!(translate_barriers([&uav, &aliased]), vec![D3d12Barrier::Uav { resource: 7 }]);
    }

    #[test]
    fn acceleration_structure_ordering() {
        let write_to_read = Barrier::Buffer(BufferBarrier {
            buffer: buffer(),
            state_before: ResourceStates::ACCEL_STRUCT_WRITE,
            state_after: ResourceStates::ACCEL_STRUCT_READ,
        });
        let into_build = Barrier::Buffer(BufferBarrier {
            buffer: buffer(),
            state_before: ResourceStates::COPY_DEST,
            state_after: ResourceStates::ACCEL_STRUCT_WRITE,
        });
        let native = translate_barriers([&write_to_read, &into_build]);
        assert_eq!(native, vec![D3d12Barrier::Uav { resource: 9 }]);
    }

    #[test]
    fn entire_buffer_transition() {
        let barrier = Barrier::Buffer(BufferBarrier {
            buffer: buffer(),
            state_before: ResourceStates::COPY_DEST,
            state_after: ResourceStates::INDEX_BUFFER,
        });
        assert_eq!(
            translate_barriers([&barrier]),
            vec![D3d12Barrier::Transition {
                resource: 9,
                subresource: ALL_SUBRESOURCES,
                state_before: resource_states::COPY_DEST,
                state_after: resource_states::INDEX_BUFFER,
            }]
        );
    }
}
