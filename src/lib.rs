// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*! states_and_fences is the synchronisation core of an explicit-API renderer: resource state
tracking, barrier batching and fence-gated reuse of command buffers and transient memory.

Explicit GPU APIs (Direct3D 12, Vulkan) leave two jobs to the application:

1. before a resource is used in a new way (written by a copy, then sampled by a shader, then
   presented) the command stream needs a *barrier* that transitions it;
2. memory and command buffers the GPU may still be reading can't be reused until a fence says
   the GPU is done with them.

Both are easy to get subtly wrong.  This crate does them for you.

# Overview

| Type                      | Job                                                               |
|---------------------------|-------------------------------------------------------------------|
| [`Device`]                | creates resources, pipelines and command lists; submits; retires  |
| [`CommandList`]           | records one session of GPU work, inserting barriers automatically |
| [`ResourceStates`]        | API-neutral usage bits a resource can be in                       |
| [`ValidationCommandList`] | a checking decorator for the open → close → execute contract      |
| [`EventQuery`]            | a CPU-visible marker in a queue's submissions                     |
| [`MessageSink`]           | where usage errors go                                             |

A typical frame:

```
use states_and_fences::{
    BufferDesc, CommandListParameters, Device, DeviceConfig, RecordingSink, ResourceStates,
};
use states_and_fences::imp::recording::RecordingBackend;

let sink = RecordingSink::new();
let config = DeviceConfig::default().with_message_sink(sink.clone());
let device = Device::new(RecordingBackend::new(), config);
let buffer = device
    .create_buffer(BufferDesc::new(256).with_initial_state(ResourceStates::COMMON, true))
    .expect("buffer");

let mut list = device.create_command_list(CommandListParameters::default());
list.open().expect("open");
list.write_buffer(&buffer, &[1, 2, 3, 4], 0).expect("write");
list.close().expect("close");
let instance = device.execute_command_lists(&mut [&mut list]).expect("execute");
assert_eq!(instance, 1);
assert_eq!(sink.error_count(), 0);
```

# State tracking

Within a recording session every resource has a tracked state, per subresource for textures
that are used partially.  Each operation *requires* its resources in some state; when the
tracked state differs, a barrier is appended to a pending batch, which is committed in a single
native call right before the operation's command.  Repeating a requirement is free.

Sessions start from scratch.  A resource enters a session in one of three ways:

* it has a *permanent* state, fixed forever once a recording that set it was submitted;
* its description asks to `keep_initial_state`: every session starts there and goes back there
  at `close`;
* the application declares it with `begin_tracking_*_state`.

Anything else has an unknown prior state, which is reported.

# Retirement

Every submission gets an instance number on its queue, which is also the value its fence is
signalled to.  Native command buffers, upload and scratch memory, and the resources a recording
referenced are all stamped with that number and reused (or released) only once the queue's
completed value reaches it.  See [`Device::run_garbage_collection`].
An [`EventQuery`] marks a point in a queue's submissions for the CPU to poll or wait on.

# Backends

The core talks to native APIs through the [`imp::Backend`] and [`imp::NativeCommandBuffer`]
traits.  The crate ships [`imp::recording::RecordingBackend`], a software backend that records
everything and completes fences only when told to, and barrier translators for Direct3D 12
(`backend_d3d12`) and Vulkan (`backend_vulkan`, via `ash`).
*/

logwise::declare_logging_domain!();

mod bittricks;
pub mod barriers;
pub mod command_list;
mod config;
pub mod descriptor_heap;
mod device;
mod diagnostics;
mod error;
pub mod imp;
pub mod pipeline;
pub mod pool;
mod query;
mod queue;
pub mod resources;
mod states;
pub mod tracking;
pub mod upload;
pub mod validation;
pub mod versioning;

pub use command_list::{
    CommandList, ComputeState, GraphicsState, IndexBufferBinding, Lifecycle, RayTracingState,
    TextureSlice, VertexBufferBinding,
};
pub use config::{CommandListParameters, DeviceConfig, QueueType};
pub use descriptor_heap::{Descriptor, DescriptorIndex};
pub use device::Device;
pub use diagnostics::{LogSink, MessageSeverity, MessageSink, RecordingSink};
pub use error::{BackendError, Error};
pub use imp::DrawArguments;
pub use pipeline::{
    BindingKind, BindingLayout, BindingSet, BindingSetItem, ComputePipeline, ComputePipelineDesc,
    Framebuffer, FramebufferAttachment, FramebufferDesc, GraphicsPipeline, GraphicsPipelineDesc,
    MAX_BINDING_LAYOUTS, PipelineBindPoint, RayTracingPipeline, RayTracingPipelineDesc, ShaderStage,
    Viewport,
};
pub use query::EventQuery;
pub use queue::CommandListInstance;
pub use resources::{
    AccelStruct, AccelStructDesc, Buffer, BufferDesc, CpuAccessMode, Format, ResourceId, Texture,
    TextureDesc, TextureDimension, TextureSubresourceSet,
};
pub use states::ResourceStates;
pub use validation::ValidationCommandList;
