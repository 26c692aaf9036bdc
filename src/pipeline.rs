// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Objects bound by command lists: pipelines, binding sets and framebuffers.
//!
//! # Overview
//!
//! These are shared handles.  A command list keeps strong references to whatever is currently
//! bound, and every submission keeps strong references to what it used, so nothing a GPU
//! command refers to can disappear while the command is in flight.
//!
//! Shader stages are keys into a [`StageMap`] rather than one field per stage; code that must
//! visit each stage iterates the map.

use crate::descriptor_heap::{DescriptorHeaps, DescriptorIndex};
use crate::resources::{AccelStruct, Buffer, ResourceId, Texture, TextureSubresourceSet};
use crate::states::ResourceStates;
use std::sync::{Arc, Mutex};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ShaderStage {
    Vertex,
    Hull,
    Domain,
    Geometry,
    Pixel,
    Compute,
}

impl ShaderStage {
    pub const COUNT: usize = 6;
    pub const ALL: [ShaderStage; ShaderStage::COUNT] = [
        ShaderStage::Vertex,
        ShaderStage::Hull,
        ShaderStage::Domain,
        ShaderStage::Geometry,
        ShaderStage::Pixel,
        ShaderStage::Compute,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn is_graphics(self) -> bool {
        self != ShaderStage::Compute
    }
}

/// One optional value per shader stage.
#[derive(Clone, Debug, PartialEq)]
pub struct StageMap<T> {
    slots: [Option<T>; ShaderStage::COUNT],
}

impl<T> Default for StageMap<T> {
    fn default() -> Self {
        StageMap {
            slots: std::array::from_fn(|_| None),
        }
    }
}

impl<T> StageMap<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, stage: ShaderStage, value: T) -> Self {
        self.set(stage, value);
        self
    }

    pub fn set(&mut self, stage: ShaderStage, value: T) {
        self.slots[stage.index()] = Some(value);
    }

    pub fn get(&self, stage: ShaderStage) -> Option<&T> {
        self.slots[stage.index()].as_ref()
    }

    pub fn contains(&self, stage: ShaderStage) -> bool {
        self.get(stage).is_some()
    }

    /// Present entries in stage order.
    pub fn iter(&self) -> impl Iterator<Item = (ShaderStage, &T)> {
        ShaderStage::ALL
            .into_iter()
            .filter_map(move |stage| self.get(stage).map(|v| (stage, v)))
    }

    pub fn stages(&self) -> impl Iterator<Item = ShaderStage> + '_ {
        self.iter().map(|(stage, _)| stage)
    }
}

/// Which pipeline a binding belongs to.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum PipelineBindPoint {
    Graphics,
    Compute,
    RayTracing,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum BindingKind {
    TextureSrv,
    TextureUav,
    BufferSrv,
    BufferUav,
    ConstantBuffer,
    Sampler,
    AccelStruct,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct BindingLayoutItem {
    pub slot: u32,
    pub kind: BindingKind,
}

/// Shape of one binding set slot of a pipeline.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct BindingLayout {
    pub visibility: Vec<ShaderStage>,
    pub items: Vec<BindingLayoutItem>,
}

impl BindingLayout {
    pub fn new(visibility: impl IntoIterator<Item = ShaderStage>) -> Self {
        BindingLayout {
            visibility: visibility.into_iter().collect(),
            items: Vec::new(),
        }
    }

    pub fn with_item(mut self, slot: u32, kind: BindingKind) -> Self {
        self.items.push(BindingLayoutItem { slot, kind });
        self
    }
}

#[derive(Clone, Debug)]
pub enum BindingSetItem {
    TextureSrv {
        slot: u32,
        texture: Texture,
        subresources: TextureSubresourceSet,
    },
    TextureUav {
        slot: u32,
        texture: Texture,
        subresources: TextureSubresourceSet,
    },
    BufferSrv {
        slot: u32,
        buffer: Buffer,
    },
    BufferUav {
        slot: u32,
        buffer: Buffer,
    },
    ConstantBuffer {
        slot: u32,
        buffer: Buffer,
    },
    Sampler {
        slot: u32,
    },
    AccelStruct {
        slot: u32,
        accel_struct: AccelStruct,
    },
}

impl BindingSetItem {
    pub fn slot(&self) -> u32 {
        match self {
            BindingSetItem::TextureSrv { slot, .. }
            | BindingSetItem::TextureUav { slot, .. }
            | BindingSetItem::BufferSrv { slot, .. }
            | BindingSetItem::BufferUav { slot, .. }
            | BindingSetItem::ConstantBuffer { slot, .. }
            | BindingSetItem::Sampler { slot }
            | BindingSetItem::AccelStruct { slot, .. } => *slot,
        }
    }

    pub fn kind(&self) -> BindingKind {
        match self {
            BindingSetItem::TextureSrv { .. } => BindingKind::TextureSrv,
            BindingSetItem::TextureUav { .. } => BindingKind::TextureUav,
            BindingSetItem::BufferSrv { .. } => BindingKind::BufferSrv,
            BindingSetItem::BufferUav { .. } => BindingKind::BufferUav,
            BindingSetItem::ConstantBuffer { .. } => BindingKind::ConstantBuffer,
            BindingSetItem::Sampler { .. } => BindingKind::Sampler,
            BindingSetItem::AccelStruct { .. } => BindingKind::AccelStruct,
        }
    }

    /// The state the bound resource must be in, if it is tracked at all.
    pub fn required_state(&self) -> Option<ResourceStates> {
        match self {
            BindingSetItem::TextureSrv { .. } | BindingSetItem::BufferSrv { .. } => {
                Some(ResourceStates::SHADER_RESOURCE)
            }
            BindingSetItem::TextureUav { .. } | BindingSetItem::BufferUav { .. } => {
                Some(ResourceStates::UNORDERED_ACCESS)
            }
            BindingSetItem::ConstantBuffer { .. } => Some(ResourceStates::CONSTANT_BUFFER),
            BindingSetItem::AccelStruct { .. } => Some(ResourceStates::ACCEL_STRUCT_READ),
            BindingSetItem::Sampler { .. } => None,
        }
    }

    /// Volatile constant buffers get their address patched at draw time instead of a descriptor.
    pub fn volatile_buffer(&self) -> Option<&Buffer> {
        match self {
            BindingSetItem::ConstantBuffer { buffer, .. } if buffer.desc().is_volatile => {
                Some(buffer)
            }
            _ => None,
        }
    }
}

#[derive(Debug)]
struct DescriptorTable {
    heaps: Arc<Mutex<DescriptorHeaps>>,
    base: DescriptorIndex,
    count: u32,
}

#[derive(Debug)]
struct BindingSetShared {
    id: ResourceId,
    layout: BindingLayout,
    items: Vec<BindingSetItem>,
    descriptor_table: Option<DescriptorTable>,
    has_uav_bindings: bool,
}

impl Drop for BindingSetShared {
    fn drop(&mut self) {
        if let Some(table) = self.descriptor_table.take() {
            let mut heaps = table.heaps.lock().unwrap_or_else(|e| e.into_inner());
            if let Err(e) = heaps.shader_resource.release_descriptors(table.base, table.count) {
                logwise::error_sync!(
                    "binding set {id}: {err}",
                    id = logwise::privacy::LogIt(self.id),
                    err = logwise::privacy::LogIt(&e)
                );
            }
        }
    }
}

/// A set of resources bound together.  Its non-volatile descriptors live in the device's
/// shader-visible heap until the set is dropped.
#[derive(Debug, Clone)]
pub struct BindingSet(Arc<BindingSetShared>);

impl BindingSet {
    pub(crate) fn new(
        layout: BindingLayout,
        items: Vec<BindingSetItem>,
        descriptor_table: Option<(Arc<Mutex<DescriptorHeaps>>, DescriptorIndex, u32)>,
    ) -> Self {
        let has_uav_bindings = items
            .iter()
            .any(|i| matches!(i.kind(), BindingKind::TextureUav | BindingKind::BufferUav));
        BindingSet(Arc::new(BindingSetShared {
            id: ResourceId::next(),
            layout,
            items,
            descriptor_table: descriptor_table
                .map(|(heaps, base, count)| DescriptorTable { heaps, base, count }),
            has_uav_bindings,
        }))
    }

    pub fn id(&self) -> ResourceId {
        self.0.id
    }

    pub fn layout(&self) -> &BindingLayout {
        &self.0.layout
    }

    pub fn items(&self) -> &[BindingSetItem] {
        &self.0.items
    }

    pub fn descriptor_table(&self) -> Option<DescriptorIndex> {
        self.0.descriptor_table.as_ref().map(|t| t.base)
    }

    pub fn has_uav_bindings(&self) -> bool {
        self.0.has_uav_bindings
    }
}

impl PartialEq for BindingSet {
    fn eq(&self, other: &Self) -> bool {
        self.0.id == other.0.id
    }
}

/// Most binding layouts a pipeline may have, and so the most binding sets a state may bind.
pub const MAX_BINDING_LAYOUTS: usize = 5;

#[derive(Clone, Debug, PartialEq)]
pub struct GraphicsPipelineDesc {
    /// Shader entry point per stage.
    pub shaders: StageMap<String>,
    pub binding_layouts: Vec<BindingLayout>,
    pub debug_name: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ComputePipelineDesc {
    pub shader: String,
    pub binding_layouts: Vec<BindingLayout>,
    pub debug_name: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RayTracingPipelineDesc {
    pub ray_generation_shader: String,
    pub binding_layouts: Vec<BindingLayout>,
    pub debug_name: String,
}

macro_rules! pipeline_handle {
    ($name:ident, $desc:ty) => {
        #[derive(Debug, Clone)]
        pub struct $name(Arc<(ResourceId, $desc)>);

        impl $name {
            pub(crate) fn new(desc: $desc) -> Self {
                $name(Arc::new((ResourceId::next(), desc)))
            }

            pub fn id(&self) -> ResourceId {
                self.0.0
            }

            pub fn desc(&self) -> &$desc {
                &self.0.1
            }

            pub fn binding_layouts(&self) -> &[BindingLayout] {
                &self.0.1.binding_layouts
            }
        }

        impl PartialEq for $name {
            fn eq(&self, other: &Self) -> bool {
                self.id() == other.id()
            }
        }
    };
}

pipeline_handle!(GraphicsPipeline, GraphicsPipelineDesc);
pipeline_handle!(ComputePipeline, ComputePipelineDesc);
pipeline_handle!(RayTracingPipeline, RayTracingPipelineDesc);

#[derive(Clone, Debug)]
pub struct FramebufferAttachment {
    pub texture: Texture,
    pub subresources: TextureSubresourceSet,
    /// Depth attachments only: bound for depth testing without writes.
    pub is_read_only: bool,
}

impl FramebufferAttachment {
    pub fn new(texture: Texture) -> Self {
        FramebufferAttachment {
            texture,
            subresources: TextureSubresourceSet::single(0, 0),
            is_read_only: false,
        }
    }

    pub fn with_subresources(mut self, subresources: TextureSubresourceSet) -> Self {
        self.subresources = subresources;
        self
    }

    pub fn read_only(mut self) -> Self {
        self.is_read_only = true;
        self
    }
}

#[derive(Clone, Debug, Default)]
pub struct FramebufferDesc {
    pub color_attachments: Vec<FramebufferAttachment>,
    pub depth_attachment: Option<FramebufferAttachment>,
}

#[derive(Debug)]
struct FramebufferShared {
    id: ResourceId,
    desc: FramebufferDesc,
    width: u32,
    height: u32,
}

#[derive(Debug, Clone)]
pub struct Framebuffer(Arc<FramebufferShared>);

impl Framebuffer {
    pub(crate) fn new(desc: FramebufferDesc, width: u32, height: u32) -> Self {
        Framebuffer(Arc::new(FramebufferShared {
            id: ResourceId::next(),
            desc,
            width,
            height,
        }))
    }

    pub fn id(&self) -> ResourceId {
        self.0.id
    }

    pub fn desc(&self) -> &FramebufferDesc {
        &self.0.desc
    }

    pub fn size(&self) -> (u32, u32) {
        (self.0.width, self.0.height)
    }
}

impl PartialEq for Framebuffer {
    fn eq(&self, other: &Self) -> bool {
        self.0.id == other.0.id
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Default)]
pub struct Viewport {
    pub min_x: f32,
    pub max_x: f32,
    pub min_y: f32,
    pub max_y: f32,
    pub min_z: f32,
    pub max_z: f32,
}

impl Viewport {
    pub fn new(width: f32, height: f32) -> Self {
        Viewport {
            min_x: 0.0,
            max_x: width,
            min_y: 0.0,
            max_y: height,
            min_z: 0.0,
            max_z: 1.0,
        }
    }
}
