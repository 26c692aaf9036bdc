// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
The command recorder.

# Overview

A [`CommandList`] records GPU work for one queue.  Its life is a loop:

```text
Initial --open--> Open --close--> Closed --execute--> Initial
```

[`CommandList::open`] acquires a native command buffer from the queue's pool (recycling one the
GPU has finished with when possible) and starts a *recording session*.  Everything a session
knows about resource states, bound pipelines and uploaded data is scoped to it: the next
`open` starts from scratch.

Every recording operation follows the same pattern:

1. resolve and validate its subresource selectors;
2. require each touched resource in the state the operation needs, which appends barriers;
3. commit the pending barriers in one native call;
4. record the native command;
5. keep the touched resources alive until the submission retires.

Steps 2 and 3 are skipped for resources the application tracks itself: see
[`CommandList::set_enable_automatic_barriers`].

Usage errors are reported to the device's diagnostic sink and the offending call does
nothing.  Only resource exhaustion and native failures come back as `Err`.

# Discarding a recording

A closed list that is opened again without being executed discards its recording: the native
command buffer goes back to the pool, its upload memory is freed and its pending permanent
transitions are dropped.
*/

mod compute;
mod copy;
mod graphics;
mod raytracing;
pub mod state;

pub use copy::TextureSlice;
pub use state::{
    ComputeState, GraphicsState, IndexBufferBinding, RayTracingState, VertexBufferBinding,
};

use crate::command_list::state::{BoundState, VolatileBinding};
use crate::config::{CommandListParameters, QueueType};
use crate::device::Device;
use crate::diagnostics::Diagnostics;
use crate::error::Error;
use crate::imp::{Backend, Command, NativeCommandBuffer};
use crate::pipeline::{BindingSet, BindingSetItem, MAX_BINDING_LAYOUTS, PipelineBindPoint};
use crate::queue::CommandListInstance;
use crate::resources::{Buffer, ResourceRef, Texture, TextureSubresourceSet};
use crate::states::ResourceStates;
use crate::tracking::StateTracker;
use crate::upload::UploadManager;
use crate::versioning::make_version;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Lifecycle {
    Initial,
    Open,
    Closed,
}

impl Lifecycle {
    fn name(self) -> &'static str {
        match self {
            Lifecycle::Initial => "not open",
            Lifecycle::Open => "open",
            Lifecycle::Closed => "closed",
        }
    }
}

#[derive(Debug)]
pub struct CommandList<B: Backend> {
    device: Device<B>,
    params: CommandListParameters,
    diagnostics: Diagnostics,
    lifecycle: Lifecycle,
    command_buffer: Option<B::CommandBuffer>,
    instance: Option<CommandListInstance>,
    recording_version: u64,
    tracker: StateTracker,
    enable_automatic_barriers: bool,
    bound: BoundState,
    upload: UploadManager<B>,
    scratch: UploadManager<B>,
}

impl<B: Backend> CommandList<B> {
    pub(crate) fn new(device: Device<B>, params: CommandListParameters) -> Self {
        let diagnostics = device.diagnostics().clone();
        let backend = device.backend().clone();
        CommandList {
            tracker: StateTracker::new(diagnostics.clone(), device.config().unknown_state_is_fatal),
            upload: UploadManager::new(backend.clone(), params.upload_chunk_size, 0),
            scratch: UploadManager::new_scratch(
                backend,
                params.scratch_chunk_size,
                params.scratch_max_memory,
            ),
            enable_automatic_barriers: params.enable_automatic_barriers,
            device,
            params,
            diagnostics,
            lifecycle: Lifecycle::Initial,
            command_buffer: None,
            instance: None,
            recording_version: 0,
            bound: BoundState::default(),
        }
    }

    pub fn device(&self) -> &Device<B> {
        &self.device
    }

    pub fn parameters(&self) -> &CommandListParameters {
        &self.params
    }

    pub fn queue_type(&self) -> QueueType {
        self.params.queue_type
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    pub(crate) fn lifecycle_name(&self) -> &'static str {
        self.lifecycle.name()
    }

    pub fn is_open(&self) -> bool {
        self.lifecycle == Lifecycle::Open
    }

    pub fn is_closed(&self) -> bool {
        self.lifecycle == Lifecycle::Closed
    }

    /// Version word of the current session, 0 outside of one.
    pub fn recording_version(&self) -> u64 {
        self.recording_version
    }

    /// The native command buffer of the current or just-closed session.
    pub fn native(&self) -> Option<&B::CommandBuffer> {
        self.command_buffer.as_ref()
    }

    pub fn upload_manager(&self) -> &UploadManager<B> {
        &self.upload
    }

    pub fn scratch_manager(&self) -> &UploadManager<B> {
        &self.scratch
    }

    /// Starts a recording session.
    pub fn open(&mut self) -> Result<(), Error> {
        let queue_type = self.params.queue_type;
        let backend = self.device.backend().clone();
        let (command_buffer, recording_instance) = {
            let mut queue = self.device.lock_queue(queue_type);
            if let Some(unexecuted) = self.command_buffer.take() {
                logwise::debuginternal_sync!(
                    "discarding unexecuted recording {version} on the {queue} queue",
                    version = self.recording_version,
                    queue = logwise::privacy::LogIt(queue_type)
                );
                let last_submitted = queue.last_submitted_instance();
                queue.release_command_buffer(unexecuted, last_submitted);
                self.upload.discard_chunks(self.recording_version);
                self.scratch.discard_chunks(self.recording_version);
            }
            let command_buffer = queue.acquire_command_buffer(&*backend)?;
            (command_buffer, queue.next_recording_instance())
        };

        self.recording_version = make_version(recording_instance, queue_type, false);
        self.command_buffer = Some(command_buffer);
        self.instance = Some(CommandListInstance::new(queue_type));
        self.tracker.reset();
        self.bound.clear();
        self.lifecycle = Lifecycle::Open;
        logwise::debuginternal_sync!(
            "opened recording {version} on the {queue} queue",
            version = self.recording_version,
            queue = logwise::privacy::LogIt(queue_type)
        );
        Ok(())
    }

    /// Returns `keep_initial_state` resources to their initial states, flushes barriers and
    /// finalizes the native command buffer.
    pub fn close(&mut self) -> Result<(), Error> {
        if self.lifecycle != Lifecycle::Open {
            return Err(Error::InvalidState {
                operation: "close",
                state: self.lifecycle.name(),
            });
        }
        self.end_render_pass();
        self.tracker.keep_buffer_initial_states();
        self.tracker.keep_texture_initial_states();
        self.commit_barriers();
        if let Some(command_buffer) = self.command_buffer.as_mut() {
            command_buffer.close()?;
        }
        self.bound.clear();
        self.lifecycle = Lifecycle::Closed;
        logwise::debuginternal_sync!(
            "closed recording {version}",
            version = self.recording_version
        );
        Ok(())
    }

    /// Called by the device once the recording has been submitted as `submitted_instance`.
    /// Hands back the native command buffer for the pool and the instance for the in-flight
    /// queue.
    pub(crate) fn executed(
        &mut self,
        submitted_instance: u64,
    ) -> Option<(B::CommandBuffer, CommandListInstance)> {
        let command_buffer = self.command_buffer.take()?;
        let queue_type = self.params.queue_type;
        let mut instance = self
            .instance
            .take()
            .unwrap_or_else(|| CommandListInstance::new(queue_type));
        instance.set_submitted_instance(submitted_instance);

        let submitted_version = make_version(submitted_instance, queue_type, true);
        self.upload.submit_chunks(self.recording_version, submitted_version);
        self.scratch.submit_chunks(self.recording_version, submitted_version);
        self.recording_version = 0;

        self.tracker.command_list_submitted();
        self.lifecycle = Lifecycle::Initial;
        Some((command_buffer, instance))
    }

    /// Forgets everything bound, so the next `set_*_state` rebinds from scratch.
    pub fn clear_state(&mut self) {
        self.end_render_pass();
        let addresses = std::mem::take(&mut self.bound.volatile_addresses);
        let any_writes = self.bound.any_volatile_buffer_writes;
        self.bound.clear();
        self.bound.volatile_addresses = addresses;
        self.bound.any_volatile_buffer_writes = any_writes;
    }

    // State tracking

    pub fn set_enable_automatic_barriers(&mut self, enable: bool) {
        self.enable_automatic_barriers = enable;
    }

    pub fn set_enable_uav_barriers_for_texture(&mut self, texture: &Texture, enable: bool) {
        self.tracker.set_enable_uav_barriers_for_texture(texture, enable);
    }

    pub fn set_enable_uav_barriers_for_buffer(&mut self, buffer: &Buffer, enable: bool) {
        self.tracker.set_enable_uav_barriers_for_buffer(buffer, enable);
    }

    pub fn begin_tracking_texture_state(
        &mut self,
        texture: &Texture,
        subresources: TextureSubresourceSet,
        state: ResourceStates,
    ) {
        self.tracker.begin_tracking_texture_state(texture, subresources, state);
    }

    pub fn begin_tracking_buffer_state(&mut self, buffer: &Buffer, state: ResourceStates) {
        self.tracker.begin_tracking_buffer_state(buffer, state);
    }

    /// Transitions `subresources` of `texture` to `state`.  Barriers stay pending until the next
    /// operation or [`CommandList::commit_barriers`].
    pub fn set_texture_state(
        &mut self,
        texture: &Texture,
        subresources: TextureSubresourceSet,
        state: ResourceStates,
    ) {
        self.tracker.end_tracking_texture_state(texture, subresources, state, false);
        self.reference(ResourceRef::Texture(texture.clone()));
    }

    pub fn set_buffer_state(&mut self, buffer: &Buffer, state: ResourceStates) {
        self.tracker.end_tracking_buffer_state(buffer, state, false);
        self.reference(ResourceRef::Buffer(buffer.clone()));
    }

    /// Transitions the whole texture to `state` and freezes it there once this recording is
    /// submitted.
    pub fn set_permanent_texture_state(&mut self, texture: &Texture, state: ResourceStates) {
        self.tracker
            .end_tracking_texture_state(texture, TextureSubresourceSet::ALL, state, true);
        self.reference(ResourceRef::Texture(texture.clone()));
    }

    pub fn set_permanent_buffer_state(&mut self, buffer: &Buffer, state: ResourceStates) {
        self.tracker.end_tracking_buffer_state(buffer, state, true);
        self.reference(ResourceRef::Buffer(buffer.clone()));
    }

    pub fn get_texture_subresource_state(
        &self,
        texture: &Texture,
        array_slice: u32,
        mip_level: u32,
    ) -> ResourceStates {
        self.tracker.texture_subresource_state(texture, array_slice, mip_level)
    }

    pub fn get_buffer_state(&self, buffer: &Buffer) -> ResourceStates {
        self.tracker.buffer_state(buffer)
    }

    /// Requires every resource of `binding_set` in the state its binding implies.
    pub fn set_resource_states_for_binding_set(&mut self, binding_set: &BindingSet) {
        for item in binding_set.items() {
            let Some(state) = item.required_state() else {
                continue;
            };
            match item {
                BindingSetItem::TextureSrv {
                    texture, subresources, ..
                }
                | BindingSetItem::TextureUav {
                    texture, subresources, ..
                } => {
                    self.tracker.require_texture_state(texture, *subresources, state);
                }
                BindingSetItem::BufferSrv { buffer, .. }
                | BindingSetItem::BufferUav { buffer, .. }
                | BindingSetItem::ConstantBuffer { buffer, .. } => {
                    self.tracker.require_buffer_state(buffer, state);
                }
                BindingSetItem::AccelStruct { accel_struct, .. } => {
                    self.tracker.require_buffer_state(accel_struct.data_buffer(), state);
                }
                BindingSetItem::Sampler { .. } => {}
            }
        }
    }

    /// Flushes pending barriers in one native call.  Returns how many were flushed.
    pub fn commit_barriers(&mut self) -> usize {
        match self.command_buffer.as_mut() {
            Some(command_buffer) => self.tracker.barriers_mut().commit(command_buffer),
            None => 0,
        }
    }

    /// Barriers appended since the last commit.
    pub fn pending_barrier_count(&self) -> usize {
        self.tracker.barriers().len()
    }

    // Shared recording helpers

    /// Reports an error and returns false outside of a recording session.
    fn check_open(&self, operation: &str) -> bool {
        if self.lifecycle != Lifecycle::Open {
            self.diagnostics.error(format_args!(
                "Can't {operation}: the command list is {}",
                self.lifecycle.name()
            ));
            return false;
        }
        true
    }

    /// Binding sets past the pipeline limit have no slot to go to.
    fn check_binding_count(&self, bindings: &[BindingSet]) -> bool {
        if bindings.len() > MAX_BINDING_LAYOUTS {
            self.diagnostics.error(format_args!(
                "{} binding sets were provided, the limit is {MAX_BINDING_LAYOUTS}",
                bindings.len()
            ));
            return false;
        }
        true
    }

    fn require_texture(
        &mut self,
        texture: &Texture,
        subresources: TextureSubresourceSet,
        state: ResourceStates,
    ) {
        if self.enable_automatic_barriers {
            self.tracker.require_texture_state(texture, subresources, state);
        }
    }

    fn require_buffer(&mut self, buffer: &Buffer, state: ResourceStates) {
        if self.enable_automatic_barriers {
            self.tracker.require_buffer_state(buffer, state);
        }
    }

    fn record(&mut self, command: Command) {
        if let Some(command_buffer) = self.command_buffer.as_mut() {
            command_buffer.record(command);
        }
    }

    fn reference(&mut self, resource: ResourceRef) {
        if let Some(instance) = self.instance.as_mut() {
            instance.reference(resource);
        }
    }

    fn end_render_pass(&mut self) {
        if self.bound.render_pass_active {
            self.record(Command::EndRenderPass);
            self.bound.render_pass_active = false;
            if let Some(graphics) = self.bound.graphics.as_mut() {
                //the next set_graphics_state must begin a pass again
                graphics.framebuffer = None;
            }
        }
    }

    /// Binds the device's descriptor heaps if they changed since this session last bound them.
    /// Returns whether they were rebound, in which case every binding set must be rebound too.
    fn commit_descriptor_heaps(&mut self) -> bool {
        let generation = self.device.descriptor_heap_generation();
        if self.bound.heap_generation == Some(generation) {
            return false;
        }
        self.record(Command::SetDescriptorHeaps { generation });
        self.bound.heap_generation = Some(generation);
        true
    }

    /// Records `bindings` whose bit is set in `update_mask`, and rebuilds the volatile binding
    /// list for `bind_point`.
    fn bind_binding_sets(
        &mut self,
        bind_point: PipelineBindPoint,
        bindings: &[BindingSet],
        update_mask: u64,
    ) {
        let previous = std::mem::take(&mut self.bound.volatile_bindings);
        for (index, binding_set) in bindings.iter().enumerate() {
            let set_index = index as u32;
            let update_this_set = update_mask & (1 << index) != 0;
            if update_this_set {
                self.record(Command::BindBindingSet {
                    bind_point,
                    index: set_index,
                    binding_set: binding_set.id(),
                    descriptor_table: binding_set.descriptor_table(),
                });
                self.reference(ResourceRef::BindingSet(binding_set.clone()));
            }

            for item in binding_set.items() {
                let Some(buffer) = item.volatile_buffer() else {
                    continue;
                };
                let slot = item.slot();
                let address = self.bound.volatile_addresses.get(&buffer.id()).copied().unwrap_or(0);
                let previous_address = previous
                    .iter()
                    .find(|v| {
                        v.bind_point == bind_point && v.set_index == set_index && v.slot == slot
                    })
                    .map(|v| v.address);
                if address != 0 && (update_this_set || previous_address != Some(address)) {
                    self.record(Command::SetConstantBufferAddress {
                        bind_point,
                        set_index,
                        slot,
                        address,
                    });
                }
                self.bound.volatile_bindings.push(VolatileBinding {
                    bind_point,
                    set_index,
                    slot,
                    buffer: buffer.clone(),
                    address,
                });
            }
        }
    }

    /// Re-records the addresses of volatile buffers written since they were bound.  Returns
    /// false, after reporting, if a bound volatile buffer has never been written.
    fn update_volatile_buffers(&mut self) -> bool {
        let unwritten = self.bound.volatile_bindings.iter().any(|v| v.address == 0);
        if !self.bound.any_volatile_buffer_writes && !unwritten {
            return true;
        }
        let mut bindings = std::mem::take(&mut self.bound.volatile_bindings);
        let mut ok = true;
        for binding in &mut bindings {
            match self.bound.volatile_addresses.get(&binding.buffer.id()).copied() {
                None => {
                    self.diagnostics.error(format_args!(
                        "Attempted use of a volatile constant buffer {} before it was written into",
                        binding.buffer.desc().name()
                    ));
                    ok = false;
                }
                Some(address) if address != binding.address => {
                    if let Some(command_buffer) = self.command_buffer.as_mut() {
                        command_buffer.record(Command::SetConstantBufferAddress {
                            bind_point: binding.bind_point,
                            set_index: binding.set_index,
                            slot: binding.slot,
                            address,
                        });
                    }
                    binding.address = address;
                }
                Some(_) => {}
            }
        }
        self.bound.volatile_bindings = bindings;
        if ok {
            self.bound.any_volatile_buffer_writes = false;
        }
        ok
    }
}

impl<B: Backend> Drop for CommandList<B> {
    fn drop(&mut self) {
        //an unexecuted native buffer can be reused right away
        if let Some(command_buffer) = self.command_buffer.take() {
            let mut queue = self.device.lock_queue(self.params.queue_type);
            let last_submitted = queue.last_submitted_instance();
            queue.release_command_buffer(command_buffer, last_submitted);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DeviceConfig;
    use crate::diagnostics::RecordingSink;
    use crate::imp::recording::RecordingBackend;
    use crate::resources::{BufferDesc, Format, TextureDesc};
    use std::sync::Arc;

    fn device() -> (Device<RecordingBackend>, Arc<RecordingSink>) {
        let sink = RecordingSink::new();
        let config = DeviceConfig::default().with_message_sink(sink.clone());
        (Device::new(RecordingBackend::new(), config), sink)
    }

    #[test]
    fn lifecycle() {
        let (device, _sink) = device();
        let mut list = device.create_command_list(CommandListParameters::default());
        assert!(matches!(list.close(), Err(Error::InvalidState { .. })));
        list.open().expect("open");
        assert!(list.is_open());
        assert_ne!(list.recording_version(), 0);
        list.close().expect("close");
        assert!(list.is_closed());
        device.execute_command_lists(&mut [&mut list]).expect("execute");
        assert_eq!(list.lifecycle(), Lifecycle::Initial);
        assert_eq!(list.recording_version(), 0);
        assert!(list.native().is_none());
    }

    #[test]
    fn recording_outside_a_session_is_reported() {
        let (device, sink) = device();
        let mut list = device.create_command_list(CommandListParameters::default());
        let buffer = device.create_buffer(BufferDesc::new(16)).expect("buffer");
        list.clear_buffer_uint(&buffer, 0);
        assert_eq!(sink.error_count(), 1);
    }

    #[test]
    fn reopening_discards_the_recording() {
        let (device, _sink) = device();
        let mut list = device.create_command_list(CommandListParameters::default());
        let buffer = device.create_buffer(BufferDesc::new(16)).expect("buffer");
        list.open().expect("open");
        list.begin_tracking_buffer_state(&buffer, ResourceStates::COPY_DEST);
        list.set_permanent_buffer_state(&buffer, ResourceStates::SHADER_RESOURCE);
        list.close().expect("close");
        let first_version = list.recording_version();

        list.open().expect("reopen");
        assert_ne!(list.recording_version(), first_version);
        //the unexecuted buffer went back to the pool, the permanent state never took effect
        assert_eq!(buffer.permanent_state(), ResourceStates::UNKNOWN);
        assert_eq!(list.get_buffer_state(&buffer), ResourceStates::UNKNOWN);
        //and came straight back out of it
        assert_eq!(device.backend().command_buffers_created(), 1);
        assert_eq!(device.queue_pooled_command_buffers(QueueType::Graphics), 0);
    }

    #[test]
    fn automatic_barriers_can_be_disabled() {
        let (device, sink) = device();
        let mut list = device.create_command_list(CommandListParameters::default());
        let texture = device
            .create_texture(TextureDesc::new_2d(8, 8, Format::Rgba8Unorm).with_render_target(true))
            .expect("texture");
        list.open().expect("open");
        list.set_enable_automatic_barriers(false);
        list.clear_texture_float(&texture, TextureSubresourceSet::ALL, [0.0; 4]);
        assert_eq!(list.get_texture_subresource_state(&texture, 0, 0), ResourceStates::UNKNOWN);
        assert_eq!(sink.error_count(), 0);
        let native = list.native().expect("native");
        assert!(native.barriers().is_empty());
        assert_eq!(native.commands().len(), 1);
    }
}
