// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
The device: resource creation, submission and retirement.

# Overview

A [`Device`] wraps a [`Backend`] together with the state that command lists share:

* one [`Queue`] per [`QueueType`], holding the fence bookkeeping, the in-flight submissions and
  the pool of native command buffers for that queue;
* the descriptor heaps that binding sets allocate from;
* the diagnostic sink.

Each of these sits behind its own lock, so command lists may record on different threads.
Recording itself never takes the queue lock except in [`crate::CommandList::open`].

`Device` is a cheap handle; clones share the same device.

# Retirement

Nothing here runs in the background.  Completed work is noticed when a command list is opened
(command buffer reuse), when sub-allocators look for a free chunk, or when the application calls
[`Device::run_garbage_collection`].  [`Device::wait_for_idle`] is the only blocking call, and it
gives up after [`DeviceConfig::idle_wait_timeout`].
*/

use crate::command_list::CommandList;
use crate::config::{CommandListParameters, DeviceConfig, QueueType};
use crate::descriptor_heap::{Descriptor, DescriptorHeaps};
use crate::diagnostics::Diagnostics;
use crate::error::Error;
use crate::imp::Backend;
use crate::pipeline::{
    BindingLayout, BindingSet, BindingSetItem, ComputePipeline, ComputePipelineDesc, Framebuffer,
    FramebufferDesc, GraphicsPipeline, GraphicsPipelineDesc, MAX_BINDING_LAYOUTS,
    RayTracingPipeline, RayTracingPipelineDesc, ShaderStage,
};
use crate::query::{EventQuery, EventQueryState};
use crate::queue::Queue;
use crate::resources::{AccelStruct, AccelStructDesc, Buffer, BufferDesc, Texture, TextureDesc};
use crate::states::ResourceStates;
use std::sync::atomic::AtomicU32;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

#[derive(Debug)]
struct DeviceShared<B: Backend> {
    backend: Arc<B>,
    config: DeviceConfig,
    diagnostics: Diagnostics,
    queues: [Mutex<Queue<B::CommandBuffer>>; QueueType::COUNT],
    descriptor_heaps: Arc<Mutex<DescriptorHeaps>>,
    open_immediate_lists: Arc<AtomicU32>,
}

#[derive(Debug)]
pub struct Device<B: Backend> {
    shared: Arc<DeviceShared<B>>,
}

impl<B: Backend> Clone for Device<B> {
    fn clone(&self) -> Self {
        Device {
            shared: self.shared.clone(),
        }
    }
}

impl<B: Backend> Device<B> {
    pub fn new(backend: B, config: DeviceConfig) -> Self {
        Self::with_shared_backend(Arc::new(backend), config)
    }

    /// A device over a backend the caller keeps a handle to, e.g. to drive a recording backend's
    /// fences.
    pub fn with_shared_backend(backend: Arc<B>, config: DeviceConfig) -> Self {
        logwise::info_sync!(
            "creating device on the {backend} backend",
            backend = logwise::privacy::LogIt(backend.name())
        );
        let descriptor_heaps =
            DescriptorHeaps::new(config.descriptor_heap_size, config.sampler_heap_size);
        Device {
            shared: Arc::new(DeviceShared {
                diagnostics: Diagnostics::new(config.message_sink.clone()),
                backend,
                queues: QueueType::ALL.map(|queue_type| Mutex::new(Queue::new(queue_type))),
                descriptor_heaps: Arc::new(Mutex::new(descriptor_heaps)),
                open_immediate_lists: Arc::new(AtomicU32::new(0)),
                config,
            }),
        }
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.shared.backend
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.shared.config
    }

    pub(crate) fn diagnostics(&self) -> &Diagnostics {
        &self.shared.diagnostics
    }

    pub(crate) fn lock_queue(
        &self,
        queue_type: QueueType,
    ) -> MutexGuard<'_, Queue<B::CommandBuffer>> {
        //queue state stays consistent across a panic in a caller's sink
        self.shared.queues[queue_type.index()]
            .lock()
            .unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn lock_descriptor_heaps(&self) -> MutexGuard<'_, DescriptorHeaps> {
        self.shared.descriptor_heaps.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn open_immediate_lists(&self) -> &Arc<AtomicU32> {
        &self.shared.open_immediate_lists
    }

    pub fn create_texture(&self, desc: TextureDesc) -> Result<Texture, Error> {
        let native = self.shared.backend.create_texture(&desc)?;
        logwise::debuginternal_sync!(
            "created texture {name} ({width}x{height})",
            name = logwise::privacy::LogIt(desc.name()),
            width = desc.width,
            height = desc.height
        );
        Ok(Texture::new(
            desc,
            native,
            self.shared.backend.textures_start_in_initial_state(),
        ))
    }

    pub fn create_buffer(&self, desc: BufferDesc) -> Result<Buffer, Error> {
        if desc.is_volatile
            && (desc.cpu_access != crate::resources::CpuAccessMode::None || desc.can_have_uavs)
        {
            let message = format!(
                "Volatile buffer {} can't have CPU access or unordered access",
                desc.name()
            );
            self.shared.diagnostics.error(&message);
            return Err(Error::Usage(message));
        }
        let native = self.shared.backend.create_buffer(&desc)?;
        logwise::debuginternal_sync!(
            "created buffer {name} ({size} bytes)",
            name = logwise::privacy::LogIt(desc.name()),
            size = desc.byte_size
        );
        Ok(Buffer::new(desc, native))
    }

    /// Acceleration structures are stored in a buffer that is always returned to
    /// `ACCEL_STRUCT_READ` between sessions.
    pub fn create_accel_struct(&self, desc: AccelStructDesc) -> Result<AccelStruct, Error> {
        let mut buffer_desc = BufferDesc::new(desc.data_size)
            .with_uavs(true)
            .with_initial_state(ResourceStates::ACCEL_STRUCT_READ, true)
            .with_name(desc.debug_name.clone());
        buffer_desc.is_accel_struct_storage = true;
        let data_buffer = self.create_buffer(buffer_desc)?;
        Ok(AccelStruct::new(desc, data_buffer))
    }

    pub fn create_graphics_pipeline(
        &self,
        desc: GraphicsPipelineDesc,
    ) -> Result<GraphicsPipeline, Error> {
        if desc.shaders.contains(ShaderStage::Compute) {
            return Err(self.usage(format!(
                "Graphics pipeline {} has a compute shader",
                crate::resources::debug_name(&desc.debug_name)
            )));
        }
        if !desc.shaders.contains(ShaderStage::Vertex) {
            return Err(self.usage(format!(
                "Graphics pipeline {} has no vertex shader",
                crate::resources::debug_name(&desc.debug_name)
            )));
        }
        self.check_binding_layouts("Graphics", &desc.debug_name, &desc.binding_layouts)?;
        Ok(GraphicsPipeline::new(desc))
    }

    pub fn create_compute_pipeline(
        &self,
        desc: ComputePipelineDesc,
    ) -> Result<ComputePipeline, Error> {
        if desc.shader.is_empty() {
            return Err(self.usage(format!(
                "Compute pipeline {} has no shader",
                crate::resources::debug_name(&desc.debug_name)
            )));
        }
        self.check_binding_layouts("Compute", &desc.debug_name, &desc.binding_layouts)?;
        Ok(ComputePipeline::new(desc))
    }

    pub fn create_ray_tracing_pipeline(
        &self,
        desc: RayTracingPipelineDesc,
    ) -> Result<RayTracingPipeline, Error> {
        if desc.ray_generation_shader.is_empty() {
            return Err(self.usage(format!(
                "Ray tracing pipeline {} has no ray generation shader",
                crate::resources::debug_name(&desc.debug_name)
            )));
        }
        self.check_binding_layouts("Ray tracing", &desc.debug_name, &desc.binding_layouts)?;
        Ok(RayTracingPipeline::new(desc))
    }

    /// All attachments must have the same size at the selected mip level.
    pub fn create_framebuffer(&self, desc: FramebufferDesc) -> Result<Framebuffer, Error> {
        let mut size = None;
        for attachment in desc.color_attachments.iter().chain(desc.depth_attachment.iter()) {
            let texture_desc = attachment.texture.desc();
            let mip = attachment.subresources.base_mip_level;
            if mip >= texture_desc.mip_levels {
                return Err(self.usage(format!(
                    "Framebuffer attachment {} has no mip level {mip}",
                    texture_desc.name()
                )));
            }
            if !texture_desc.is_render_target {
                return Err(self.usage(format!(
                    "Framebuffer attachment {} was not created as a render target",
                    texture_desc.name()
                )));
            }
            let attachment_size = (
                (texture_desc.width >> mip).max(1),
                (texture_desc.height >> mip).max(1),
            );
            match size {
                None => size = Some(attachment_size),
                Some(s) if s != attachment_size => {
                    return Err(self.usage(format!(
                        "Framebuffer attachment {} is {attachment_size:?}, \
                         other attachments are {s:?}",
                        texture_desc.name()
                    )));
                }
                Some(_) => {}
            }
        }
        for attachment in &desc.color_attachments {
            if attachment.texture.desc().format.is_depth_stencil() {
                return Err(self.usage(format!(
                    "Color attachment {} has a depth format",
                    attachment.texture.desc().name()
                )));
            }
        }
        let Some((width, height)) = size else {
            return Err(self.usage("Framebuffer has no attachments".to_owned()));
        };
        Ok(Framebuffer::new(desc, width, height))
    }

    /// Writes the set's descriptors into the shader-resource heap and makes them shader visible.
    /// Volatile constant buffers and samplers don't take heap slots.
    pub fn create_binding_set(
        &self,
        layout: BindingLayout,
        items: Vec<BindingSetItem>,
    ) -> Result<BindingSet, Error> {
        for item in &items {
            let declared = layout
                .items
                .iter()
                .any(|l| l.slot == item.slot() && l.kind == item.kind());
            if !declared {
                return Err(self.usage(format!(
                    "Binding set item {:?} at slot {} is not declared in the layout",
                    item.kind(),
                    item.slot()
                )));
            }
            match item {
                BindingSetItem::TextureUav { texture, .. } if !texture.desc().is_uav => {
                    return Err(self.usage(format!(
                        "Texture {} is bound as a UAV but was created without is_uav",
                        texture.desc().name()
                    )));
                }
                BindingSetItem::BufferUav { buffer, .. } if !buffer.desc().can_have_uavs => {
                    return Err(self.usage(format!(
                        "Buffer {} is bound as a UAV but was created without can_have_uavs",
                        buffer.desc().name()
                    )));
                }
                _ => {}
            }
        }

        let descriptors: Vec<Descriptor> = items.iter().filter_map(descriptor_for).collect();
        if descriptors.is_empty() {
            return Ok(BindingSet::new(layout, items, None));
        }

        let count = descriptors.len() as u32;
        let base = {
            let mut heaps = self.lock_descriptor_heaps();
            let heap = &mut heaps.shader_resource;
            let base = heap.allocate_descriptors(count)?;
            for (offset, descriptor) in descriptors.into_iter().enumerate() {
                heap.write(base + offset as u32, descriptor);
            }
            heap.copy_to_shader_visible_heap(base, count);
            base
        };
        Ok(BindingSet::new(
            layout,
            items,
            Some((self.shared.descriptor_heaps.clone(), base, count)),
        ))
    }

    pub fn create_command_list(&self, params: CommandListParameters) -> CommandList<B> {
        CommandList::new(self.clone(), params)
    }

    /// Submits closed command lists, in order, to their queue.  All lists must target the same
    /// queue.  Returns the fence value that retires them.
    pub fn execute_command_lists(
        &self,
        command_lists: &mut [&mut CommandList<B>],
    ) -> Result<u64, Error> {
        let Some(first) = command_lists.first() else {
            return Ok(0);
        };
        let queue_type = first.queue_type();
        for list in command_lists.iter() {
            if list.queue_type() != queue_type {
                return Err(self.usage(format!(
                    "Can't execute {:?} and {queue_type:?} command lists in one submission",
                    list.queue_type()
                )));
            }
            if !list.is_closed() {
                return Err(Error::InvalidState {
                    operation: "execute",
                    state: list.lifecycle_name(),
                });
            }
        }

        let mut queue = self.lock_queue(queue_type);
        let submitted = {
            let command_buffers: Vec<&B::CommandBuffer> =
                command_lists.iter().filter_map(|list| list.native()).collect();
            queue.submit(&*self.shared.backend, &command_buffers)?
        };
        for list in command_lists.iter_mut() {
            if let Some((command_buffer, instance)) = list.executed(submitted) {
                queue.release_command_buffer(command_buffer, submitted);
                queue.push_in_flight(instance);
            }
        }
        Ok(submitted)
    }

    /// Drops the references held by submissions the GPU has finished.  Returns how many were
    /// retired.
    pub fn run_garbage_collection(&self) -> usize {
        let mut retired = 0;
        for queue_type in QueueType::ALL {
            let instances = self.lock_queue(queue_type).retire_completed(&*self.shared.backend);
            if !instances.is_empty() {
                logwise::trace_sync!(
                    "{queue} queue: retired {count} submissions up to instance {instance}",
                    queue = logwise::privacy::LogIt(queue_type),
                    count = instances.len(),
                    instance = instances.last().map(|i| i.submitted_instance()).unwrap_or_default()
                );
            }
            retired += instances.len();
        }
        retired
    }

    /// Blocks until `queue` has completed `instance`, or the idle timeout elapses.
    pub fn wait_for_instance(&self, queue_type: QueueType, instance: u64) -> Result<(), Error> {
        if self.queue_last_completed(queue_type) >= instance {
            return Ok(());
        }
        let start = Instant::now();
        let reached = self.shared.backend.wait_for_value(
            queue_type,
            instance,
            self.shared.config.idle_wait_timeout,
            self.shared.config.idle_poll_interval,
        )?;
        if !reached {
            return Err(Error::WaitTimeout {
                queue: queue_type,
                value: instance,
                waited: start.elapsed(),
            });
        }
        self.lock_queue(queue_type)
            .update_last_completed_instance(&*self.shared.backend);
        Ok(())
    }

    /// Waits for everything submitted on every queue, then collects garbage.
    pub fn wait_for_idle(&self) -> Result<(), Error> {
        for queue_type in QueueType::ALL {
            let last_submitted = self.lock_queue(queue_type).last_submitted_instance();
            if last_submitted > 0 {
                self.wait_for_instance(queue_type, last_submitted)?;
            }
        }
        self.run_garbage_collection();
        Ok(())
    }

    pub fn create_event_query(&self) -> EventQuery {
        EventQuery::new()
    }

    /// Points `query` at everything submitted to `queue` so far.  Setting it again moves it
    /// forward.
    pub fn set_event_query(&self, query: &EventQuery, queue_type: QueueType) {
        let instance = self.queue_last_submitted(queue_type);
        query.set_state(EventQueryState::Pending {
            queue: queue_type,
            instance,
        });
    }

    /// False for a query that was never set.
    pub fn poll_event_query(&self, query: &EventQuery) -> bool {
        let observed = query.state();
        match observed {
            EventQueryState::NotStarted => false,
            EventQueryState::Resolved => true,
            EventQueryState::Pending { queue, instance } => {
                if self.queue_last_completed(queue) < instance {
                    return false;
                }
                query.resolve(observed);
                true
            }
        }
    }

    /// Blocks until `query` resolves, like [`Device::wait_for_instance`].  Returns at once for a
    /// query that was never set.
    pub fn wait_event_query(&self, query: &EventQuery) -> Result<(), Error> {
        let observed = query.state();
        let EventQueryState::Pending { queue, instance } = observed else {
            return Ok(());
        };
        self.wait_for_instance(queue, instance)?;
        query.resolve(observed);
        Ok(())
    }

    pub fn reset_event_query(&self, query: &EventQuery) {
        query.set_state(EventQueryState::NotStarted);
    }

    /// The last fence value `queue` is known to have completed.
    pub fn queue_last_completed(&self, queue_type: QueueType) -> u64 {
        self.lock_queue(queue_type)
            .update_last_completed_instance(&*self.shared.backend)
    }

    pub fn queue_last_submitted(&self, queue_type: QueueType) -> u64 {
        self.lock_queue(queue_type).last_submitted_instance()
    }

    /// Submissions on `queue` still holding their resources.
    pub fn queue_in_flight(&self, queue_type: QueueType) -> usize {
        self.lock_queue(queue_type).in_flight_count()
    }

    /// Native command buffers waiting in `queue`'s pool.
    pub fn queue_pooled_command_buffers(&self, queue_type: QueueType) -> usize {
        self.lock_queue(queue_type).pooled_command_buffers()
    }

    /// Current generation of the shader-visible descriptor heaps.
    pub fn descriptor_heap_generation(&self) -> u64 {
        self.lock_descriptor_heaps().generation()
    }

    fn check_binding_layouts(
        &self,
        kind: &str,
        name: &str,
        layouts: &[BindingLayout],
    ) -> Result<(), Error> {
        if layouts.len() > MAX_BINDING_LAYOUTS {
            return Err(self.usage(format!(
                "{kind} pipeline {} has {} binding layouts, the limit is {MAX_BINDING_LAYOUTS}",
                crate::resources::debug_name(name),
                layouts.len()
            )));
        }
        Ok(())
    }

    fn usage(&self, message: String) -> Error {
        self.shared.diagnostics.error(&message);
        Error::Usage(message)
    }
}

fn descriptor_for(item: &BindingSetItem) -> Option<Descriptor> {
    match item {
        BindingSetItem::TextureSrv {
            texture, subresources, ..
        } => Some(Descriptor::TextureSrv {
            texture: texture.id(),
            subresources: subresources.resolve(texture.desc(), false),
        }),
        BindingSetItem::TextureUav {
            texture, subresources, ..
        } => Some(Descriptor::TextureUav {
            texture: texture.id(),
            subresources: subresources.resolve(texture.desc(), true),
        }),
        BindingSetItem::BufferSrv { buffer, .. } => {
            Some(Descriptor::BufferSrv { buffer: buffer.id() })
        }
        BindingSetItem::BufferUav { buffer, .. } => {
            Some(Descriptor::BufferUav { buffer: buffer.id() })
        }
        BindingSetItem::ConstantBuffer { buffer, .. } if !buffer.desc().is_volatile => {
            Some(Descriptor::ConstantBuffer {
                buffer: buffer.id(),
                address: buffer.gpu_address(),
            })
        }
        BindingSetItem::ConstantBuffer { .. } | BindingSetItem::Sampler { .. } => None,
        BindingSetItem::AccelStruct { accel_struct, .. } => Some(Descriptor::AccelStruct {
            address: accel_struct.data_buffer().gpu_address(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::RecordingSink;
    use crate::imp::recording::RecordingBackend;
    use crate::pipeline::{BindingKind, FramebufferAttachment};
    use crate::resources::{Format, TextureSubresourceSet};

    fn device() -> (Device<RecordingBackend>, Arc<RecordingSink>) {
        let sink = RecordingSink::new();
        let config = DeviceConfig::default()
            .with_message_sink(sink.clone())
            .with_descriptor_heap_size(4);
        (Device::new(RecordingBackend::new(), config), sink)
    }

    #[test]
    fn binding_sets_return_their_descriptors() {
        let (device, _sink) = device();
        let buffer = device
            .create_buffer(BufferDesc::new(256).with_constant_buffer())
            .expect("buffer");
        let layout =
            BindingLayout::new([ShaderStage::Pixel]).with_item(0, BindingKind::ConstantBuffer);
        let set = device
            .create_binding_set(
                layout,
                vec![BindingSetItem::ConstantBuffer {
                    slot: 0,
                    buffer: buffer.clone(),
                }],
            )
            .expect("set");
        let table = set.descriptor_table().expect("table");
        {
            let heaps = device.lock_descriptor_heaps();
            assert_eq!(heaps.shader_resource.num_allocated(), 1);
            assert_eq!(
                heaps.shader_resource.shader_visible_descriptor(table),
                Some(&Descriptor::ConstantBuffer {
                    buffer: buffer.id(),
                    address: buffer.gpu_address()
                })
            );
        }
        drop(set);
        assert_eq!(device.lock_descriptor_heaps().shader_resource.num_allocated(), 0);
    }

    #[test]
    fn undeclared_binding_is_rejected() {
        let (device, sink) = device();
        let buffer = device.create_buffer(BufferDesc::new(256)).expect("buffer");
        let layout =
            BindingLayout::new([ShaderStage::Compute]).with_item(0, BindingKind::BufferSrv);
        let items = vec![BindingSetItem::BufferUav { slot: 0, buffer }];
        let result = device.create_binding_set(layout, items);
        assert!(matches!(result, Err(Error::Usage(_))));
        assert_eq!(sink.error_count(), 1);
    }

    #[test]
    fn heap_growth_changes_generation() {
        let (device, _sink) = device();
        let before = device.descriptor_heap_generation();
        let layout =
            BindingLayout::new([ShaderStage::Compute]).with_item(0, BindingKind::BufferSrv);
        let mut sets = Vec::new();
        for _ in 0..5 {
            let buffer = device.create_buffer(BufferDesc::new(16)).expect("buffer");
            let items = vec![BindingSetItem::BufferSrv { slot: 0, buffer }];
            sets.push(device.create_binding_set(layout.clone(), items).expect("set"));
        }
        assert!(device.descriptor_heap_generation() > before);
    }

    #[test]
    fn framebuffer_attachments_must_agree() {
        let (device, sink) = device();
        let big = device
            .create_texture(
                TextureDesc::new_2d(64, 64, Format::Rgba8Unorm).with_render_target(true),
            )
            .expect("big");
        let small = device
            .create_texture(TextureDesc::new_2d(32, 32, Format::D32).with_render_target(true))
            .expect("small");
        let ok = device.create_framebuffer(FramebufferDesc {
            color_attachments: vec![FramebufferAttachment::new(big.clone())],
            depth_attachment: None,
        });
        assert_eq!(ok.expect("framebuffer").size(), (64, 64));

        let mismatched = device.create_framebuffer(FramebufferDesc {
            color_attachments: vec![FramebufferAttachment::new(big)],
            depth_attachment: Some(FramebufferAttachment::new(small.clone())),
        });
        assert!(mismatched.is_err());
        assert_eq!(sink.error_count(), 1);

        let mip = device
            .create_texture(
                TextureDesc::new_2d(64, 64, Format::Rgba8Unorm)
                    .with_render_target(true)
                    .with_mip_levels(2),
            )
            .expect("mip");
        let matched = device.create_framebuffer(FramebufferDesc {
            color_attachments: vec![
                FramebufferAttachment::new(mip)
                    .with_subresources(TextureSubresourceSet::single(1, 0)),
            ],
            depth_attachment: Some(FramebufferAttachment::new(small)),
        });
        assert!(matched.is_ok());
    }

    #[test]
    fn volatile_buffers_are_gpu_only() {
        let (device, sink) = device();
        let result = device.create_buffer(BufferDesc::volatile_constant_buffer(64).with_uavs(true));
        assert!(result.is_err());
        assert_eq!(sink.error_count(), 1);
    }
}
