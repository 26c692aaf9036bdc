// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
use crate::imp::NativeResource;
use crate::resources::{Format, ResourceId, debug_name};
use crate::states::ResourceStates;
use std::fmt::{Debug, Formatter};
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Default)]
pub enum TextureDimension {
    Texture1D,
    Texture1DArray,
    #[default]
    Texture2D,
    Texture2DArray,
    TextureCube,
    TextureCubeArray,
    Texture2DMS,
    Texture2DMSArray,
    Texture3D,
}

impl TextureDimension {
    /// Whether array slices are individually addressable.
    pub fn is_array(self) -> bool {
        matches!(
            self,
            TextureDimension::Texture1DArray
                | TextureDimension::Texture2DArray
                | TextureDimension::TextureCube
                | TextureDimension::TextureCubeArray
                | TextureDimension::Texture2DMSArray
        )
    }
}

/// Describes a texture at creation time.
///
/// `keep_initial_state` asks every recording session to start from `initial_state` and to
/// transition the texture back to it when the session is closed.
#[derive(Clone, Debug, PartialEq)]
pub struct TextureDesc {
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    pub array_size: u32,
    pub mip_levels: u32,
    pub sample_count: u32,
    pub format: Format,
    pub dimension: TextureDimension,
    pub debug_name: String,
    pub is_render_target: bool,
    pub is_uav: bool,
    pub initial_state: ResourceStates,
    pub keep_initial_state: bool,
}

impl TextureDesc {
    pub fn new_2d(width: u32, height: u32, format: Format) -> Self {
        TextureDesc {
            width,
            height,
            depth: 1,
            array_size: 1,
            mip_levels: 1,
            sample_count: 1,
            format,
            dimension: TextureDimension::Texture2D,
            debug_name: String::new(),
            is_render_target: false,
            is_uav: false,
            initial_state: ResourceStates::UNKNOWN,
            keep_initial_state: false,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.debug_name = name.into();
        self
    }

    pub fn with_mip_levels(mut self, mip_levels: u32) -> Self {
        self.mip_levels = mip_levels;
        self
    }

    /// Turns the texture into an array of `array_size` slices.
    pub fn with_array_size(mut self, array_size: u32) -> Self {
        self.array_size = array_size;
        if array_size > 1 && self.dimension == TextureDimension::Texture2D {
            self.dimension = TextureDimension::Texture2DArray;
        }
        self
    }

    pub fn with_dimension(mut self, dimension: TextureDimension) -> Self {
        self.dimension = dimension;
        self
    }

    pub fn with_render_target(mut self, is_render_target: bool) -> Self {
        self.is_render_target = is_render_target;
        self
    }

    pub fn with_uav(mut self, is_uav: bool) -> Self {
        self.is_uav = is_uav;
        self
    }

    pub fn with_sample_count(mut self, sample_count: u32) -> Self {
        self.sample_count = sample_count;
        self
    }

    pub fn with_initial_state(mut self, state: ResourceStates, keep: bool) -> Self {
        self.initial_state = state;
        self.keep_initial_state = keep;
        self
    }

    /// Number of separately tracked subresources (mips times slices).
    pub fn subresource_count(&self) -> u32 {
        self.mip_levels * self.array_size
    }

    /// Flat tracking index of one subresource.
    pub fn subresource_index(&self, mip_level: u32, array_slice: u32) -> usize {
        (mip_level + array_slice * self.mip_levels) as usize
    }

    pub(crate) fn name(&self) -> &str {
        debug_name(&self.debug_name)
    }
}

struct TextureShared {
    id: ResourceId,
    desc: TextureDesc,
    native: NativeResource,
    permanent_state: AtomicU32,
    state_initialized: AtomicBool,
}

/// Shared handle to a texture.
///
/// Clones refer to the same texture.  The permanent state and the "initialised" flag live here
/// because they are the only tracking data that survives across recording sessions.
#[derive(Clone)]
pub struct Texture(Arc<TextureShared>);

impl Texture {
    pub(crate) fn new(desc: TextureDesc, native: NativeResource, state_initialized: bool) -> Self {
        Texture(Arc::new(TextureShared {
            id: ResourceId::next(),
            desc,
            native,
            permanent_state: AtomicU32::new(0),
            state_initialized: AtomicBool::new(state_initialized),
        }))
    }

    pub fn id(&self) -> ResourceId {
        self.0.id
    }

    pub fn desc(&self) -> &TextureDesc {
        &self.0.desc
    }

    pub fn native(&self) -> NativeResource {
        self.0.native
    }

    /// The committed permanent state, or `UNKNOWN` when the texture is not permanent.
    pub fn permanent_state(&self) -> ResourceStates {
        ResourceStates::from_bits_retain(self.0.permanent_state.load(Ordering::Acquire))
    }

    pub(crate) fn set_permanent_state(&self, state: ResourceStates) {
        self.0.permanent_state.store(state.bits(), Ordering::Release);
    }

    pub fn state_initialized(&self) -> bool {
        self.0.state_initialized.load(Ordering::Acquire)
    }

    pub(crate) fn mark_state_initialized(&self) {
        self.0.state_initialized.store(true, Ordering::Release);
    }
}

// Boilerplate implementations

impl Debug for Texture {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Texture")
            .field("id", &self.0.id)
            .field("name", &self.0.desc.name())
            .field("permanent_state", &self.permanent_state())
            .finish()
    }
}

impl PartialEq for Texture {
    fn eq(&self, other: &Self) -> bool {
        self.0.id == other.0.id
    }
}

impl Eq for Texture {}

impl Hash for Texture {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.id.hash(state);
    }
}
