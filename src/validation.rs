// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
A checking decorator around [`CommandList`].

[`CommandList`] assumes well-formed call sequences: it reports calls outside a session but
otherwise trusts the caller.  [`ValidationCommandList`] enforces the public contract on top of
it:

* `open` / `close` / `execute` happen in that order;
* at most one immediate command list per device is open at a time;
* every recording call happens inside a session;
* bound state is complete and its binding sets match the pipeline's binding layouts.

Violations are reported to the device's diagnostic sink and the call is dropped.  Calls that
pass are forwarded unchanged.
*/

use crate::command_list::{
    CommandList, ComputeState, GraphicsState, Lifecycle, RayTracingState, TextureSlice,
};
use crate::config::{CommandListParameters, QueueType};
use crate::device::Device;
use crate::diagnostics::Diagnostics;
use crate::error::Error;
use crate::imp::{Backend, DrawArguments};
use crate::pipeline::{BindingLayout, BindingSet};
use crate::resources::{AccelStruct, Buffer, Texture, TextureSubresourceSet};
use crate::states::ResourceStates;
use std::fmt::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

/// Which kind of pipeline state the session last set.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum BoundPipeline {
    None,
    Graphics,
    Compute,
    RayTracing,
}

#[derive(Debug)]
pub struct ValidationCommandList<B: Backend> {
    inner: CommandList<B>,
    diagnostics: Diagnostics,
    open_immediate_lists: Arc<AtomicU32>,
    immediate: bool,
    state: Lifecycle,
    bound: BoundPipeline,
}

impl<B: Backend> ValidationCommandList<B> {
    pub fn new(device: &Device<B>, params: CommandListParameters) -> Self {
        Self::wrap(device.create_command_list(params))
    }

    /// Wraps a command list that is not in a recording session.
    pub fn wrap(inner: CommandList<B>) -> Self {
        let diagnostics = inner.device().diagnostics().clone();
        if inner.lifecycle() != Lifecycle::Initial {
            diagnostics.warning(
                "Wrapping a command list that is already recording, its session is not validated",
            );
        }
        ValidationCommandList {
            open_immediate_lists: inner.device().open_immediate_lists().clone(),
            immediate: inner.parameters().enable_immediate_execution,
            state: inner.lifecycle(),
            bound: BoundPipeline::None,
            diagnostics,
            inner,
        }
    }

    pub fn inner(&self) -> &CommandList<B> {
        &self.inner
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.state
    }

    pub fn open(&mut self) -> Result<(), Error> {
        match self.state {
            Lifecycle::Open => {
                self.diagnostics.error("Cannot open a command list that is already open");
                return Ok(());
            }
            Lifecycle::Closed if self.immediate => {
                self.diagnostics.error(
                    "An immediate command list cannot be abandoned and must be executed before it \
                     is re-opened",
                );
                return Ok(());
            }
            Lifecycle::Closed => {
                self.diagnostics
                    .warning("A command list should be executed before it is reopened");
            }
            Lifecycle::Initial => {}
        }

        if self.immediate {
            let previously_open = self.open_immediate_lists.fetch_add(1, Ordering::AcqRel);
            if previously_open > 0 {
                self.open_immediate_lists.fetch_sub(1, Ordering::AcqRel);
                self.diagnostics
                    .error("Two or more immediate command lists cannot be open at the same time");
                return Ok(());
            }
        }

        if let Err(e) = self.inner.open() {
            if self.immediate {
                self.open_immediate_lists.fetch_sub(1, Ordering::AcqRel);
            }
            return Err(e);
        }
        self.state = Lifecycle::Open;
        self.bound = BoundPipeline::None;
        Ok(())
    }

    pub fn close(&mut self) -> Result<(), Error> {
        match self.state {
            Lifecycle::Initial => {
                self.diagnostics.error("Cannot close a command list before it is opened");
                return Ok(());
            }
            Lifecycle::Closed => {
                self.diagnostics
                    .error("Cannot close a command list that is already closed");
                return Ok(());
            }
            Lifecycle::Open => {}
        }
        if self.immediate {
            self.open_immediate_lists.fetch_sub(1, Ordering::AcqRel);
        }
        self.state = Lifecycle::Closed;
        self.bound = BoundPipeline::None;
        self.inner.close()
    }

    /// Submits the closed recording.  Returns the submitted instance, or 0 when the list was
    /// refused.
    pub fn execute(&mut self) -> Result<u64, Error> {
        match self.state {
            Lifecycle::Initial => {
                self.diagnostics
                    .error("Cannot execute a command list before it is opened and then closed");
                return Ok(0);
            }
            Lifecycle::Open => {
                self.diagnostics
                    .error("Cannot execute a command list before it is closed");
                return Ok(0);
            }
            Lifecycle::Closed => {}
        }
        let device = self.inner.device().clone();
        let instance = device.execute_command_lists(&mut [&mut self.inner])?;
        self.state = Lifecycle::Initial;
        Ok(instance)
    }

    fn require_open(&self) -> bool {
        if self.state == Lifecycle::Open {
            return true;
        }
        self.diagnostics.error(format_args!(
            "A command list must be opened before any rendering commands can be executed. \
             Actual state: {:?}",
            self.state
        ));
        false
    }

    /// Queues are ordered by capability: graphics lists can do everything, copy lists only
    /// transfers.
    fn require_queue(&self, queue_type: QueueType, operation: &str) -> bool {
        let actual = self.inner.queue_type();
        if actual > queue_type {
            self.diagnostics.error(format_args!(
                "This command list has type {actual:?}, but the '{operation}' operation requires \
                 at least {queue_type:?}"
            ));
            return false;
        }
        true
    }

    /// Appends a line to `errors` for every mismatch between `bindings` and `layouts`.
    fn check_bindings(layouts: &[BindingLayout], bindings: &[BindingSet], errors: &mut String) {
        if layouts.len() != bindings.len() {
            let _ = writeln!(
                errors,
                "Number of binding sets provided ({}) does not match the number of binding \
                 layouts in the pipeline ({})",
                bindings.len(),
                layouts.len()
            );
            return;
        }
        for (index, (layout, binding_set)) in layouts.iter().zip(bindings).enumerate() {
            if binding_set.layout() != layout {
                let _ = writeln!(
                    errors,
                    "Binding set in slot {index} does not match the layout in pipeline slot {index}"
                );
            }
        }
    }

    fn report(&self, operation: &str, errors: String) -> bool {
        if errors.is_empty() {
            return true;
        }
        self.diagnostics.error(format_args!("{operation}:\n{errors}"));
        false
    }

    pub fn set_graphics_state(&mut self, state: &GraphicsState) {
        if !self.require_open() || !self.require_queue(QueueType::Graphics, "set_graphics_state") {
            return;
        }
        let mut errors = String::new();
        if state.framebuffer.is_none() {
            errors.push_str("framebuffer is missing\n");
        }
        match &state.pipeline {
            None => errors.push_str("pipeline is missing\n"),
            Some(pipeline) => {
                Self::check_bindings(pipeline.binding_layouts(), &state.bindings, &mut errors)
            }
        }
        if let Some(index_buffer) = &state.index_buffer
            && !index_buffer.buffer.desc().is_index_buffer
        {
            let _ = writeln!(
                errors,
                "Cannot use buffer '{}' as an index buffer because it is not an index buffer",
                index_buffer.buffer.desc().name()
            );
        }
        for vertex_buffer in &state.vertex_buffers {
            if !vertex_buffer.buffer.desc().is_vertex_buffer {
                let _ = writeln!(
                    errors,
                    "Buffer '{}' bound to vertex buffer slot {} is not a vertex buffer",
                    vertex_buffer.buffer.desc().name(),
                    vertex_buffer.slot
                );
            }
        }
        if let Some(indirect) = &state.indirect_params
            && !indirect.desc().is_draw_indirect_args
        {
            let _ = writeln!(
                errors,
                "Cannot use buffer '{}' as an indirect argument buffer",
                indirect.desc().name()
            );
        }
        if self.report("set_graphics_state", errors) {
            self.inner.set_graphics_state(state);
            self.bound = BoundPipeline::Graphics;
        }
    }

    pub fn set_compute_state(&mut self, state: &ComputeState) {
        if !self.require_open() || !self.require_queue(QueueType::Compute, "set_compute_state") {
            return;
        }
        let mut errors = String::new();
        match &state.pipeline {
            None => errors.push_str("pipeline is missing\n"),
            Some(pipeline) => {
                Self::check_bindings(pipeline.binding_layouts(), &state.bindings, &mut errors)
            }
        }
        if let Some(indirect) = &state.indirect_params
            && !indirect.desc().is_draw_indirect_args
        {
            let _ = writeln!(
                errors,
                "Cannot use buffer '{}' as an indirect argument buffer",
                indirect.desc().name()
            );
        }
        if self.report("set_compute_state", errors) {
            self.inner.set_compute_state(state);
            self.bound = BoundPipeline::Compute;
        }
    }

    pub fn set_ray_tracing_state(&mut self, state: &RayTracingState) {
        if !self.require_open()
            || !self.require_queue(QueueType::Compute, "set_ray_tracing_state")
        {
            return;
        }
        let mut errors = String::new();
        match &state.pipeline {
            None => errors.push_str("pipeline is missing\n"),
            Some(pipeline) => {
                Self::check_bindings(pipeline.binding_layouts(), &state.bindings, &mut errors)
            }
        }
        if self.report("set_ray_tracing_state", errors) {
            self.inner.set_ray_tracing_state(state);
            self.bound = BoundPipeline::RayTracing;
        }
    }

    fn require_bound(&self, bound: BoundPipeline, operation: &str) -> bool {
        if self.bound != bound {
            self.diagnostics.error(format_args!(
                "{operation} requires a {bound:?} state to be set, the current state is {:?}",
                self.bound
            ));
            return false;
        }
        true
    }

    pub fn draw(&mut self, args: DrawArguments) {
        if self.require_open() && self.require_bound(BoundPipeline::Graphics, "draw") {
            self.inner.draw(args);
        }
    }

    pub fn draw_indexed(&mut self, args: DrawArguments) {
        if self.require_open() && self.require_bound(BoundPipeline::Graphics, "draw_indexed") {
            self.inner.draw_indexed(args);
        }
    }

    pub fn draw_indirect(&mut self, offset: u64, draw_count: u32) {
        if self.require_open() && self.require_bound(BoundPipeline::Graphics, "draw_indirect") {
            self.inner.draw_indirect(offset, draw_count);
        }
    }

    pub fn dispatch(&mut self, groups_x: u32, groups_y: u32, groups_z: u32) {
        if self.require_open() && self.require_bound(BoundPipeline::Compute, "dispatch") {
            self.inner.dispatch(groups_x, groups_y, groups_z);
        }
    }

    pub fn dispatch_indirect(&mut self, offset: u64) {
        if self.require_open() && self.require_bound(BoundPipeline::Compute, "dispatch_indirect") {
            self.inner.dispatch_indirect(offset);
        }
    }

    pub fn dispatch_rays(&mut self, width: u32, height: u32, depth: u32) {
        if self.require_open() && self.require_bound(BoundPipeline::RayTracing, "dispatch_rays") {
            self.inner.dispatch_rays(width, height, depth);
        }
    }

    pub fn write_buffer(
        &mut self,
        buffer: &Buffer,
        data: &[u8],
        dest_offset: u64,
    ) -> Result<(), Error> {
        if !self.require_open() {
            return Ok(());
        }
        let desc = buffer.desc();
        if (data.len() as u64).saturating_add(dest_offset) > desc.byte_size {
            self.diagnostics
                .error("write_buffer: data size + dest offset is greater than the buffer size");
            return Ok(());
        }
        if desc.is_volatile && dest_offset != 0 {
            self.diagnostics
                .error("write_buffer: cannot write into volatile buffers with an offset");
            return Ok(());
        }
        self.inner.write_buffer(buffer, data, dest_offset)
    }

    pub fn write_texture(
        &mut self,
        texture: &Texture,
        array_slice: u32,
        mip_level: u32,
        data: &[u8],
        row_pitch: u64,
    ) -> Result<(), Error> {
        if !self.require_open() {
            return Ok(());
        }
        if row_pitch == 0 && texture.desc().height > 1 {
            self.diagnostics
                .error("write_texture: row pitch is 0 but dest has multiple rows");
            return Ok(());
        }
        self.inner.write_texture(texture, array_slice, mip_level, data, row_pitch)
    }

    pub fn copy_buffer(
        &mut self,
        dest: &Buffer,
        dest_offset: u64,
        src: &Buffer,
        src_offset: u64,
        size: u64,
    ) {
        if self.require_open() {
            self.inner.copy_buffer(dest, dest_offset, src, src_offset, size);
        }
    }

    pub fn copy_texture(
        &mut self,
        dest: &Texture,
        dest_slice: TextureSlice,
        src: &Texture,
        src_slice: TextureSlice,
    ) {
        if self.require_open() {
            self.inner.copy_texture(dest, dest_slice, src, src_slice);
        }
    }

    pub fn clear_texture_float(
        &mut self,
        texture: &Texture,
        subresources: TextureSubresourceSet,
        color: [f32; 4],
    ) {
        if self.require_open() && self.require_queue(QueueType::Compute, "clear_texture_float") {
            self.inner.clear_texture_float(texture, subresources, color);
        }
    }

    pub fn clear_texture_uint(
        &mut self,
        texture: &Texture,
        subresources: TextureSubresourceSet,
        value: u32,
    ) {
        if self.require_open() && self.require_queue(QueueType::Compute, "clear_texture_uint") {
            self.inner.clear_texture_uint(texture, subresources, value);
        }
    }

    pub fn clear_depth_stencil_texture(
        &mut self,
        texture: &Texture,
        subresources: TextureSubresourceSet,
        depth: Option<f32>,
        stencil: Option<u8>,
    ) {
        if self.require_open()
            && self.require_queue(QueueType::Graphics, "clear_depth_stencil_texture")
        {
            self.inner.clear_depth_stencil_texture(texture, subresources, depth, stencil);
        }
    }

    pub fn clear_buffer_uint(&mut self, buffer: &Buffer, value: u32) {
        if self.require_open() && self.require_queue(QueueType::Compute, "clear_buffer_uint") {
            self.inner.clear_buffer_uint(buffer, value);
        }
    }

    pub fn resolve_texture(
        &mut self,
        dest: &Texture,
        dest_subresources: TextureSubresourceSet,
        src: &Texture,
        src_subresources: TextureSubresourceSet,
    ) {
        if self.require_open() && self.require_queue(QueueType::Graphics, "resolve_texture") {
            self.inner.resolve_texture(dest, dest_subresources, src, src_subresources);
        }
    }

    pub fn build_acceleration_structure(
        &mut self,
        accel_struct: &AccelStruct,
        inputs: &[Buffer],
    ) -> Result<(), Error> {
        if !self.require_open()
            || !self.require_queue(QueueType::Compute, "build_acceleration_structure")
        {
            return Ok(());
        }
        self.inner.build_acceleration_structure(accel_struct, inputs)
    }

    pub fn begin_tracking_texture_state(
        &mut self,
        texture: &Texture,
        subresources: TextureSubresourceSet,
        state: ResourceStates,
    ) {
        if self.require_open() {
            self.inner.begin_tracking_texture_state(texture, subresources, state);
        }
    }

    pub fn begin_tracking_buffer_state(&mut self, buffer: &Buffer, state: ResourceStates) {
        if self.require_open() {
            self.inner.begin_tracking_buffer_state(buffer, state);
        }
    }

    pub fn set_texture_state(
        &mut self,
        texture: &Texture,
        subresources: TextureSubresourceSet,
        state: ResourceStates,
    ) {
        if self.require_open() {
            self.inner.set_texture_state(texture, subresources, state);
        }
    }

    pub fn set_buffer_state(&mut self, buffer: &Buffer, state: ResourceStates) {
        if self.require_open() {
            self.inner.set_buffer_state(buffer, state);
        }
    }

    pub fn set_permanent_texture_state(&mut self, texture: &Texture, state: ResourceStates) {
        if self.require_open() {
            self.inner.set_permanent_texture_state(texture, state);
        }
    }

    pub fn set_permanent_buffer_state(&mut self, buffer: &Buffer, state: ResourceStates) {
        if self.require_open() {
            self.inner.set_permanent_buffer_state(buffer, state);
        }
    }

    pub fn commit_barriers(&mut self) -> usize {
        if self.require_open() {
            self.inner.commit_barriers()
        } else {
            0
        }
    }

    pub fn clear_state(&mut self) {
        if self.require_open() {
            self.inner.clear_state();
            self.bound = BoundPipeline::None;
        }
    }

    pub fn get_texture_subresource_state(
        &self,
        texture: &Texture,
        array_slice: u32,
        mip_level: u32,
    ) -> ResourceStates {
        self.inner.get_texture_subresource_state(texture, array_slice, mip_level)
    }

    pub fn get_buffer_state(&self, buffer: &Buffer) -> ResourceStates {
        self.inner.get_buffer_state(buffer)
    }
}

impl<B: Backend> Drop for ValidationCommandList<B> {
    fn drop(&mut self) {
        if self.immediate && self.state == Lifecycle::Open {
            self.open_immediate_lists.fetch_sub(1, Ordering::AcqRel);
        }
    }
}
