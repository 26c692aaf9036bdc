// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Transfer operations: uploads, copies, clears and resolves.  None of them may run inside a
//! render pass, so each one ends the active pass first.

use crate::command_list::CommandList;
use crate::error::Error;
use crate::imp::{Backend, Command};
use crate::resources::{Buffer, ResourceRef, Texture, TextureSubresourceSet, debug_name};
use crate::states::ResourceStates;

/// Placement alignment of buffer uploads in the upload ring.
const BUFFER_UPLOAD_ALIGNMENT: u64 = 256;
/// Placement alignment of texture uploads in the upload ring.
const TEXTURE_UPLOAD_ALIGNMENT: u64 = 512;

/// One mip level of one array slice.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct TextureSlice {
    pub mip_level: u32,
    pub array_slice: u32,
}

impl TextureSlice {
    pub fn new(mip_level: u32, array_slice: u32) -> Self {
        TextureSlice { mip_level, array_slice }
    }

    fn as_subresources(self) -> TextureSubresourceSet {
        TextureSubresourceSet::single(self.mip_level, self.array_slice)
    }

    fn is_within(self, texture: &Texture) -> bool {
        let desc = texture.desc();
        self.mip_level < desc.mip_levels && self.array_slice < desc.array_size
    }
}

impl<B: Backend> CommandList<B> {
    /// Copies `data` into `buffer` at `dest_offset` through the upload ring.
    ///
    /// Volatile buffers get a fresh copy of their contents on every write; bindings pick up the
    /// new address at the next draw or dispatch.
    pub fn write_buffer(
        &mut self,
        buffer: &Buffer,
        data: &[u8],
        dest_offset: u64,
    ) -> Result<(), Error> {
        if !self.check_open("write buffer") {
            return Ok(());
        }
        let desc = buffer.desc();
        let size = data.len() as u64;
        if dest_offset.checked_add(size).is_none_or(|end| end > desc.byte_size) {
            self.diagnostics.error(format_args!(
                "Buffer {} is {} bytes, can't write {size} bytes at offset {dest_offset}",
                desc.name(),
                desc.byte_size
            ));
            return Ok(());
        }
        let completed = self.device.queue_last_completed(self.params.queue_type);

        if desc.is_volatile {
            if dest_offset != 0 {
                self.diagnostics.error(format_args!(
                    "Volatile buffer {} must be written from offset 0",
                    desc.name()
                ));
                return Ok(());
            }
            let allocation = self.upload.suballocate(
                size.max(1),
                BUFFER_UPLOAD_ALIGNMENT,
                self.recording_version,
                completed,
            )?;
            self.upload.write(&allocation, data);
            self.bound.volatile_addresses.insert(buffer.id(), allocation.gpu_address);
            self.bound.any_volatile_buffer_writes = true;
            self.reference(ResourceRef::Buffer(buffer.clone()));
            return Ok(());
        }

        let allocation = self
            .upload
            .suballocate(size.max(1), BUFFER_UPLOAD_ALIGNMENT, self.recording_version, completed)?;
        self.upload.write(&allocation, data);

        self.end_render_pass();
        self.require_buffer(buffer, ResourceStates::COPY_DEST);
        self.commit_barriers();
        self.record(Command::UploadBuffer {
            dest: buffer.id(),
            dest_offset,
            src_address: allocation.gpu_address,
            size,
        });
        self.reference(ResourceRef::Buffer(buffer.clone()));
        Ok(())
    }

    /// Uploads one subresource.  `data` holds rows of `row_pitch` bytes.
    pub fn write_texture(
        &mut self,
        texture: &Texture,
        array_slice: u32,
        mip_level: u32,
        data: &[u8],
        row_pitch: u64,
    ) -> Result<(), Error> {
        if !self.check_open("write texture") {
            return Ok(());
        }
        let slice = TextureSlice::new(mip_level, array_slice);
        if !slice.is_within(texture) {
            self.diagnostics.error(format_args!(
                "Texture {} has no mip {mip_level} of slice {array_slice}",
                texture.desc().name()
            ));
            return Ok(());
        }
        let completed = self.device.queue_last_completed(self.params.queue_type);
        let allocation = self.upload.suballocate(
            (data.len() as u64).max(1),
            TEXTURE_UPLOAD_ALIGNMENT,
            self.recording_version,
            completed,
        )?;
        self.upload.write(&allocation, data);

        self.end_render_pass();
        self.require_texture(texture, slice.as_subresources(), ResourceStates::COPY_DEST);
        self.commit_barriers();
        self.record(Command::UploadTexture {
            dest: texture.id(),
            mip_level,
            array_slice,
            src_address: allocation.gpu_address,
            row_pitch,
        });
        self.reference(ResourceRef::Texture(texture.clone()));
        Ok(())
    }

    pub fn copy_buffer(
        &mut self,
        dest: &Buffer,
        dest_offset: u64,
        src: &Buffer,
        src_offset: u64,
        size: u64,
    ) {
        if !self.check_open("copy buffer") {
            return;
        }
        let fits = |buffer: &Buffer, offset: u64| {
            offset
                .checked_add(size)
                .is_some_and(|end| end <= buffer.desc().byte_size)
        };
        if !fits(dest, dest_offset) || !fits(src, src_offset) {
            self.diagnostics.error(format_args!(
                "Copy of {size} bytes from {} at {src_offset} to {} at {dest_offset} \
                 is out of bounds",
                src.desc().name(),
                dest.desc().name()
            ));
            return;
        }
        if dest.desc().is_volatile || src.desc().is_volatile {
            self.diagnostics
                .error("Volatile buffers can't take part in buffer copies");
            return;
        }

        self.end_render_pass();
        self.require_buffer(dest, ResourceStates::COPY_DEST);
        self.require_buffer(src, ResourceStates::COPY_SOURCE);
        self.commit_barriers();
        self.record(Command::CopyBufferRegion {
            dest: dest.id(),
            dest_offset,
            src: src.id(),
            src_offset,
            size,
        });
        self.reference(ResourceRef::Buffer(dest.clone()));
        self.reference(ResourceRef::Buffer(src.clone()));
    }

    pub fn copy_texture(
        &mut self,
        dest: &Texture,
        dest_slice: TextureSlice,
        src: &Texture,
        src_slice: TextureSlice,
    ) {
        if !self.check_open("copy texture") {
            return;
        }
        if !dest_slice.is_within(dest) || !src_slice.is_within(src) {
            self.diagnostics.error(format_args!(
                "Copy from {} {src_slice:?} to {} {dest_slice:?} is out of bounds",
                src.desc().name(),
                dest.desc().name()
            ));
            return;
        }

        self.end_render_pass();
        self.require_texture(dest, dest_slice.as_subresources(), ResourceStates::COPY_DEST);
        self.require_texture(src, src_slice.as_subresources(), ResourceStates::COPY_SOURCE);
        self.commit_barriers();
        self.record(Command::CopyTextureRegion {
            dest: dest.id(),
            dest_mip_level: dest_slice.mip_level,
            dest_array_slice: dest_slice.array_slice,
            src: src.id(),
            src_mip_level: src_slice.mip_level,
            src_array_slice: src_slice.array_slice,
        });
        self.reference(ResourceRef::Texture(dest.clone()));
        self.reference(ResourceRef::Texture(src.clone()));
    }

    /// Clears color subresources.  Render targets are cleared as attachments, everything else
    /// needs UAV support.
    pub fn clear_texture_float(
        &mut self,
        texture: &Texture,
        subresources: TextureSubresourceSet,
        color: [f32; 4],
    ) {
        if !self.check_open("clear texture") {
            return;
        }
        let desc = texture.desc();
        if desc.format.is_depth_stencil() {
            self.diagnostics.error(format_args!(
                "Texture {} has a depth format, use clear_depth_stencil_texture",
                desc.name()
            ));
            return;
        }
        let state = if desc.is_render_target {
            ResourceStates::RENDER_TARGET
        } else if desc.is_uav {
            ResourceStates::UNORDERED_ACCESS
        } else {
            self.diagnostics.error(format_args!(
                "Texture {} can't be cleared: it is neither a render target nor a UAV",
                desc.name()
            ));
            return;
        };
        let Some(subresources) = self.resolve_subresources(texture, subresources) else {
            return;
        };

        self.end_render_pass();
        self.require_texture(texture, subresources, state);
        self.commit_barriers();
        self.record(Command::ClearTextureFloat {
            texture: texture.id(),
            subresources,
            color,
        });
        self.reference(ResourceRef::Texture(texture.clone()));
    }

    /// Clears integer color subresources.  UAV clears are preferred when both paths exist.
    pub fn clear_texture_uint(
        &mut self,
        texture: &Texture,
        subresources: TextureSubresourceSet,
        value: u32,
    ) {
        if !self.check_open("clear texture") {
            return;
        }
        let desc = texture.desc();
        if desc.format.is_depth_stencil() {
            self.diagnostics.error(format_args!(
                "Texture {} has a depth format, use clear_depth_stencil_texture",
                desc.name()
            ));
            return;
        }
        let state = if desc.is_uav {
            ResourceStates::UNORDERED_ACCESS
        } else if desc.is_render_target {
            ResourceStates::RENDER_TARGET
        } else {
            self.diagnostics.error(format_args!(
                "Texture {} can't be cleared: it is neither a render target nor a UAV",
                desc.name()
            ));
            return;
        };
        let Some(subresources) = self.resolve_subresources(texture, subresources) else {
            return;
        };

        self.end_render_pass();
        self.require_texture(texture, subresources, state);
        self.commit_barriers();
        self.record(Command::ClearTextureUInt {
            texture: texture.id(),
            subresources,
            value,
        });
        self.reference(ResourceRef::Texture(texture.clone()));
    }

    /// Clears the depth and/or stencil planes.  `None` leaves that plane alone.
    pub fn clear_depth_stencil_texture(
        &mut self,
        texture: &Texture,
        subresources: TextureSubresourceSet,
        depth: Option<f32>,
        stencil: Option<u8>,
    ) {
        if !self.check_open("clear depth stencil") {
            return;
        }
        let desc = texture.desc();
        if !desc.format.is_depth_stencil() {
            self.diagnostics
                .error(format_args!("Texture {} doesn't have a depth format", desc.name()));
            return;
        }
        if !desc.is_render_target {
            self.diagnostics
                .error(format_args!("Texture {} isn't a depth attachment", desc.name()));
            return;
        }
        if depth.is_none() && stencil.is_none() {
            return;
        }
        let Some(subresources) = self.resolve_subresources(texture, subresources) else {
            return;
        };

        self.end_render_pass();
        self.require_texture(texture, subresources, ResourceStates::DEPTH_WRITE);
        self.commit_barriers();
        self.record(Command::ClearDepthStencil {
            texture: texture.id(),
            subresources,
            depth,
            stencil,
        });
        self.reference(ResourceRef::Texture(texture.clone()));
    }

    pub fn clear_buffer_uint(&mut self, buffer: &Buffer, value: u32) {
        if !self.check_open("clear buffer") {
            return;
        }
        if !buffer.desc().can_have_uavs {
            self.diagnostics.error(format_args!(
                "Buffer {} can't be cleared: it was created without UAV support",
                buffer.desc().name()
            ));
            return;
        }

        self.end_render_pass();
        self.require_buffer(buffer, ResourceStates::UNORDERED_ACCESS);
        self.commit_barriers();
        self.record(Command::ClearBufferUInt {
            buffer: buffer.id(),
            value,
        });
        self.reference(ResourceRef::Buffer(buffer.clone()));
    }

    /// Resolves each multisampled subresource of `src_subresources` into the matching one of
    /// `dest_subresources`.
    pub fn resolve_texture(
        &mut self,
        dest: &Texture,
        dest_subresources: TextureSubresourceSet,
        src: &Texture,
        src_subresources: TextureSubresourceSet,
    ) {
        if !self.check_open("resolve texture") {
            return;
        }
        let (dest_desc, src_desc) = (dest.desc(), src.desc());
        if src_desc.sample_count <= 1 || dest_desc.sample_count != 1 {
            self.diagnostics.error(format_args!(
                "Can't resolve {} ({} samples) into {} ({} samples)",
                src_desc.name(),
                src_desc.sample_count,
                dest_desc.name(),
                dest_desc.sample_count
            ));
            return;
        }
        if src_desc.format != dest_desc.format {
            self.diagnostics.error(format_args!(
                "Can't resolve {:?} texture {} into {:?} texture {}",
                src_desc.format,
                src_desc.name(),
                dest_desc.format,
                dest_desc.name()
            ));
            return;
        }
        let dest_subresources = dest_subresources.resolve(dest_desc, false);
        let src_subresources = src_subresources.resolve(src_desc, false);
        if dest_subresources.num_mip_levels != src_subresources.num_mip_levels
            || dest_subresources.num_array_slices != src_subresources.num_array_slices
        {
            self.diagnostics.error(format_args!(
                "Resolve of {} into {} selects different subresource counts",
                src_desc.name(),
                dest_desc.name()
            ));
            return;
        }
        if dest_subresources.is_empty() {
            return;
        }

        self.end_render_pass();
        self.require_texture(dest, dest_subresources, ResourceStates::RESOLVE_DEST);
        self.require_texture(src, src_subresources, ResourceStates::RESOLVE_SOURCE);
        self.commit_barriers();
        let pairs = dest_subresources.iter().zip(src_subresources.iter());
        for ((dest_mip, dest_slice), (src_mip, src_slice)) in pairs {
            self.record(Command::ResolveSubresource {
                dest: dest.id(),
                dest_mip_level: dest_mip,
                dest_array_slice: dest_slice,
                src: src.id(),
                src_mip_level: src_mip,
                src_array_slice: src_slice,
            });
        }
        self.reference(ResourceRef::Texture(dest.clone()));
        self.reference(ResourceRef::Texture(src.clone()));
    }

    /// Clamps `subresources` to `texture`.  An empty selection is reported and yields `None`.
    fn resolve_subresources(
        &self,
        texture: &Texture,
        subresources: TextureSubresourceSet,
    ) -> Option<TextureSubresourceSet> {
        let resolved = subresources.resolve(texture.desc(), false);
        if resolved.is_empty() {
            self.diagnostics.warning(format_args!(
                "Subresource selection {subresources:?} of {} is empty",
                debug_name(&texture.desc().debug_name)
            ));
            return None;
        }
        Some(resolved)
    }
}
