// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Backend-neutral resource states.
//!
//! # Overview
//!
//! Every texture subresource and every buffer is, at any point in a recording, in some
//! GPU-visible usage state.  [`ResourceStates`] describes that state independently of the
//! native API; the backend adapters in `imp` translate it into D3D12 resource states or
//! Vulkan stage/access/layout triples when barriers are committed.
//!
//! A state is a bitmask.  Most transitions move to a single bit, but read-only states may be
//! combined (for example `SHADER_RESOURCE | COPY_SOURCE`), and permanent resources are usually
//! declared with such a union so that every read they will ever see is a subset of it.

use std::fmt::{Display, Formatter};

bitflags::bitflags! {
    /// GPU-visible usage state of a resource or subresource.
    ///
    /// The empty set is [`ResourceStates::UNKNOWN`]: the tracker has no idea what the GPU last
    /// did with the resource.
    #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Default)]
    pub struct ResourceStates: u32 {
        const COMMON = 1 << 0;
        const CONSTANT_BUFFER = 1 << 1;
        const VERTEX_BUFFER = 1 << 2;
        const INDEX_BUFFER = 1 << 3;
        const INDIRECT_ARGUMENT = 1 << 4;
        const SHADER_RESOURCE = 1 << 5;
        const UNORDERED_ACCESS = 1 << 6;
        const RENDER_TARGET = 1 << 7;
        const DEPTH_WRITE = 1 << 8;
        const DEPTH_READ = 1 << 9;
        const STREAM_OUT = 1 << 10;
        const COPY_DEST = 1 << 11;
        const COPY_SOURCE = 1 << 12;
        const RESOLVE_DEST = 1 << 13;
        const RESOLVE_SOURCE = 1 << 14;
        const PRESENT = 1 << 15;
        const ACCEL_STRUCT_READ = 1 << 16;
        const ACCEL_STRUCT_WRITE = 1 << 17;
        const ACCEL_STRUCT_BUILD_INPUT = 1 << 18;
        const ACCEL_STRUCT_BUILD_BLAS = 1 << 19;
        const SHADING_RATE_SURFACE = 1 << 20;
    }
}

impl ResourceStates {
    /// No tracked state.
    pub const UNKNOWN: ResourceStates = ResourceStates::empty();

    /// True when nothing is known about the state.
    pub fn is_unknown(self) -> bool {
        self.is_empty()
    }

    /// True when the state includes unordered access, i.e. a UAV hazard may exist.
    pub fn has_uav(self) -> bool {
        self.contains(ResourceStates::UNORDERED_ACCESS)
    }
}

impl Display for ResourceStates {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.is_unknown() {
            return f.write_str("UNKNOWN");
        }
        bitflags::parser::to_writer(self, f)
    }
}
