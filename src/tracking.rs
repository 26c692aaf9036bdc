// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Per-session resource state tracking.
//!
//! # Overview
//!
//! A [`StateTracker`] belongs to one command list and lives for one recording session.  It
//! remembers, for every texture subresource and buffer the session has touched, the state the
//! GPU will be in at the current point of the recording.  When an operation needs a resource
//! in some state, [`StateTracker::require_texture_state`] or
//! [`StateTracker::require_buffer_state`] compares the need with the tracked state and appends
//! the barriers that bridge the gap to the session's [`BarrierBatch`].
//!
//! # Where sessions start
//!
//! Nothing is carried over from a previous session except for two kinds of resources:
//!
//! - *keep initial state* resources start every session in their declared initial state, and
//!   [`StateTracker::keep_texture_initial_states`] / [`StateTracker::keep_buffer_initial_states`]
//!   put them back there before the session is closed;
//! - *permanent* resources never change state; requests are only checked against it.
//!
//! Every other resource starts out `UNKNOWN`.  Using it without first declaring its state with
//! `begin_tracking_*` is reported, and the barrier is still emitted with an `UNKNOWN` before
//! state.
//!
//! # Textures
//!
//! A texture is tracked as a whole until some request covers only part of it; from then on it is
//! tracked per subresource (`mip + slice * mip_levels`) for the rest of the session.
//!
//! # UAV barriers
//!
//! Two back-to-back unordered-access uses of the same resource need a UAV barrier between them.
//! Applications that know their dispatches don't overlap can disable these per resource with
//! `set_enable_uav_barriers_for_*`; one UAV barrier is still placed after the change so that
//! work recorded before it is ordered.

use crate::barriers::{Barrier, BarrierBatch, BarrierSubresource, BufferBarrier, TextureBarrier};
use crate::diagnostics::{Diagnostics, MessageSeverity};
use crate::resources::{Buffer, CpuAccessMode, ResourceId, Texture, TextureSubresourceSet};
use crate::states::ResourceStates;
use fnv::FnvHashMap;

/// Tracked state of one texture within a session.
#[derive(Debug, Clone, PartialEq)]
pub struct TextureState {
    /// Empty while the texture is tracked as a whole.
    pub subresource_states: Vec<ResourceStates>,
    /// Whole-texture state.  `UNKNOWN` once per-subresource tracking is active.
    pub state: ResourceStates,
    pub enable_uav_barriers: bool,
    pub first_uav_barrier_placed: bool,
    pub permanent_transition: bool,
}

impl Default for TextureState {
    fn default() -> Self {
        TextureState {
            subresource_states: Vec::new(),
            state: ResourceStates::UNKNOWN,
            enable_uav_barriers: true,
            first_uav_barrier_placed: false,
            permanent_transition: false,
        }
    }
}

/// Tracked state of one buffer within a session.  Buffers are never subdivided.
#[derive(Debug, Clone, PartialEq)]
pub struct BufferState {
    pub state: ResourceStates,
    pub enable_uav_barriers: bool,
    pub first_uav_barrier_placed: bool,
    pub permanent_transition: bool,
}

impl Default for BufferState {
    fn default() -> Self {
        BufferState {
            state: ResourceStates::UNKNOWN,
            enable_uav_barriers: true,
            first_uav_barrier_placed: false,
            permanent_transition: false,
        }
    }
}

#[derive(Debug)]
struct TrackedTexture {
    texture: Texture,
    state: TextureState,
}

#[derive(Debug)]
struct TrackedBuffer {
    buffer: Buffer,
    state: BufferState,
}

#[derive(Debug)]
pub struct StateTracker {
    diagnostics: Diagnostics,
    unknown_state_severity: MessageSeverity,
    textures: FnvHashMap<ResourceId, TrackedTexture>,
    buffers: FnvHashMap<ResourceId, TrackedBuffer>,
    permanent_textures: Vec<(Texture, ResourceStates)>,
    permanent_buffers: Vec<(Buffer, ResourceStates)>,
    barriers: BarrierBatch,
}

fn report_unknown_texture(diagnostics: &Diagnostics, severity: MessageSeverity, name: &str) {
    diagnostics.report(
        severity,
        format_args!(
            "Unknown prior state of texture {name}. Call begin_tracking_texture_state before \
             using the texture or use keep_initial_state and initial_state in its TextureDesc."
        ),
    );
}

fn verify_permanent_state(
    diagnostics: &Diagnostics,
    permanent: ResourceStates,
    required: ResourceStates,
    kind: &str,
    name: &str,
) {
    if !permanent.contains(required) {
        diagnostics.error(format_args!(
            "Permanent {kind} {name} doesn't have the right state bits. \
             Required: {required}, present: {permanent}"
        ));
    }
}

impl StateTracker {
    pub(crate) fn new(diagnostics: Diagnostics, unknown_state_is_fatal: bool) -> Self {
        StateTracker {
            diagnostics,
            unknown_state_severity: if unknown_state_is_fatal {
                MessageSeverity::Fatal
            } else {
                MessageSeverity::Error
            },
            textures: FnvHashMap::default(),
            buffers: FnvHashMap::default(),
            permanent_textures: Vec::new(),
            permanent_buffers: Vec::new(),
            barriers: BarrierBatch::new(),
        }
    }

    pub fn barriers(&self) -> &BarrierBatch {
        &self.barriers
    }

    pub fn barriers_mut(&mut self) -> &mut BarrierBatch {
        &mut self.barriers
    }

    pub fn tracked_texture_count(&self) -> usize {
        self.textures.len()
    }

    pub fn tracked_buffer_count(&self) -> usize {
        self.buffers.len()
    }

    fn texture_entry<'a>(
        textures: &'a mut FnvHashMap<ResourceId, TrackedTexture>,
        texture: &Texture,
    ) -> &'a mut TrackedTexture {
        textures.entry(texture.id()).or_insert_with(|| {
            let desc = texture.desc();
            let mut state = TextureState::default();
            if desc.keep_initial_state {
                state.state = if texture.state_initialized() {
                    desc.initial_state
                } else {
                    ResourceStates::COMMON
                };
            }
            TrackedTexture {
                texture: texture.clone(),
                state,
            }
        })
    }

    fn buffer_entry<'a>(
        buffers: &'a mut FnvHashMap<ResourceId, TrackedBuffer>,
        buffer: &Buffer,
    ) -> &'a mut TrackedBuffer {
        buffers.entry(buffer.id()).or_insert_with(|| {
            let desc = buffer.desc();
            let mut state = BufferState::default();
            if desc.keep_initial_state {
                state.state = desc.initial_state;
            }
            TrackedBuffer {
                buffer: buffer.clone(),
                state,
            }
        })
    }

    fn texture_tracking(&mut self, texture: &Texture) -> &mut TrackedTexture {
        Self::texture_entry(&mut self.textures, texture)
    }

    fn buffer_tracking(&mut self, buffer: &Buffer) -> &mut TrackedBuffer {
        Self::buffer_entry(&mut self.buffers, buffer)
    }

    pub fn set_enable_uav_barriers_for_texture(&mut self, texture: &Texture, enable: bool) {
        let tracking = &mut self.texture_tracking(texture).state;
        tracking.enable_uav_barriers = enable;
        tracking.first_uav_barrier_placed = false;
    }

    pub fn set_enable_uav_barriers_for_buffer(&mut self, buffer: &Buffer, enable: bool) {
        let tracking = &mut self.buffer_tracking(buffer).state;
        tracking.enable_uav_barriers = enable;
        tracking.first_uav_barrier_placed = false;
    }

    /// Declares the current state of `subresources` without emitting a barrier.
    pub fn begin_tracking_texture_state(
        &mut self,
        texture: &Texture,
        subresources: TextureSubresourceSet,
        state: ResourceStates,
    ) {
        let desc = texture.desc().clone();
        let subresources = subresources.resolve(&desc, false);
        let tracking = &mut self.texture_tracking(texture).state;
        if subresources.is_entire_texture(&desc) {
            tracking.state = state;
            tracking.subresource_states.clear();
        } else {
            if tracking.subresource_states.is_empty() {
                tracking
                    .subresource_states
                    .resize(desc.subresource_count() as usize, tracking.state);
            }
            tracking.state = ResourceStates::UNKNOWN;
            for (mip, slice) in subresources.iter() {
                tracking.subresource_states[desc.subresource_index(mip, slice)] = state;
            }
        }
    }

    pub fn begin_tracking_buffer_state(&mut self, buffer: &Buffer, state: ResourceStates) {
        self.buffer_tracking(buffer).state.state = state;
    }

    /// Transitions `subresources` to `state`.  With `permanent`, the texture is frozen in that
    /// state once the recording is submitted.
    pub fn end_tracking_texture_state(
        &mut self,
        texture: &Texture,
        subresources: TextureSubresourceSet,
        state: ResourceStates,
        permanent: bool,
    ) {
        let desc = texture.desc();
        let subresources = subresources.resolve(desc, false);
        let mut permanent = permanent;
        if permanent && !subresources.is_entire_texture(desc) {
            self.diagnostics.error(format_args!(
                "Attempted to perform a permanent state transition on a subset of subresources \
                 of texture {}",
                desc.name()
            ));
            permanent = false;
        }

        self.require_texture_state(texture, subresources, state);

        if permanent {
            self.permanent_textures.push((texture.clone(), state));
            self.texture_tracking(texture).state.permanent_transition = true;
        }
    }

    pub fn end_tracking_buffer_state(
        &mut self,
        buffer: &Buffer,
        state: ResourceStates,
        permanent: bool,
    ) {
        self.require_buffer_state(buffer, state);

        if permanent {
            self.permanent_buffers.push((buffer.clone(), state));
            self.buffer_tracking(buffer).state.permanent_transition = true;
        }
    }

    /// Tracked state of one subresource, `UNKNOWN` if the texture isn't tracked in this session.
    pub fn texture_subresource_state(
        &self,
        texture: &Texture,
        array_slice: u32,
        mip_level: u32,
    ) -> ResourceStates {
        let Some(tracked) = self.textures.get(&texture.id()) else {
            return ResourceStates::UNKNOWN;
        };
        if tracked.state.subresource_states.is_empty() {
            return tracked.state.state;
        }
        let index = texture.desc().subresource_index(mip_level, array_slice);
        tracked
            .state
            .subresource_states
            .get(index)
            .copied()
            .unwrap_or(ResourceStates::UNKNOWN)
    }

    pub fn buffer_state(&self, buffer: &Buffer) -> ResourceStates {
        self.buffers
            .get(&buffer.id())
            .map(|t| t.state.state)
            .unwrap_or(ResourceStates::UNKNOWN)
    }

    /// Makes `subresources` of `texture` ready for use in `state`.
    pub fn require_texture_state(
        &mut self,
        texture: &Texture,
        subresources: TextureSubresourceSet,
        state: ResourceStates,
    ) {
        let permanent = texture.permanent_state();
        if !permanent.is_unknown() {
            let name = texture.desc().name();
            verify_permanent_state(&self.diagnostics, permanent, state, "texture", name);
            return;
        }

        let desc = texture.desc();
        let subresources = subresources.resolve(desc, false);
        let diagnostics = &self.diagnostics;
        let unknown_severity = self.unknown_state_severity;
        let tracking = &mut Self::texture_entry(&mut self.textures, texture).state;
        let barriers = &mut self.barriers;

        if subresources.is_entire_texture(desc) && tracking.subresource_states.is_empty() {
            if tracking.state.is_unknown() {
                report_unknown_texture(diagnostics, unknown_severity, desc.name());
            }
            let transition_necessary = tracking.state != state;
            let uav_necessary = state.has_uav()
                && (tracking.enable_uav_barriers || !tracking.first_uav_barrier_placed);

            if transition_necessary || uav_necessary {
                barriers.append(Barrier::Texture(TextureBarrier {
                    texture: texture.clone(),
                    subresource: BarrierSubresource::Entire,
                    state_before: tracking.state,
                    state_after: state,
                }));
            }

            tracking.state = state;

            if uav_necessary && !transition_necessary {
                tracking.first_uav_barrier_placed = true;
            }
            return;
        }

        let mut state_expanded = false;
        if tracking.subresource_states.is_empty() {
            if tracking.state.is_unknown() {
                report_unknown_texture(diagnostics, unknown_severity, desc.name());
            }
            tracking
                .subresource_states
                .resize(desc.subresource_count() as usize, tracking.state);
            tracking.state = ResourceStates::UNKNOWN;
            state_expanded = true;
        }

        let mut any_uav_barrier = false;
        for (mip_level, array_slice) in subresources.iter() {
            let index = desc.subresource_index(mip_level, array_slice);
            let prior = tracking.subresource_states[index];

            if prior.is_unknown() && !state_expanded {
                diagnostics.report(
                    unknown_severity,
                    format_args!(
                        "Unknown prior state of texture {} subresource (mip level {mip_level}, \
                         array slice {array_slice}). Call begin_tracking_texture_state before \
                         using the texture or use keep_initial_state and initial_state in its \
                         TextureDesc.",
                        desc.name()
                    ),
                );
            }

            let transition_necessary = prior != state;
            let uav_necessary = state.has_uav()
                && !any_uav_barrier
                && (tracking.enable_uav_barriers || !tracking.first_uav_barrier_placed);

            if transition_necessary || uav_necessary {
                barriers.append(Barrier::Texture(TextureBarrier {
                    texture: texture.clone(),
                    subresource: BarrierSubresource::Single {
                        mip_level,
                        array_slice,
                    },
                    state_before: prior,
                    state_after: state,
                }));
            }

            tracking.subresource_states[index] = state;

            if uav_necessary && !transition_necessary {
                any_uav_barrier = true;
                tracking.first_uav_barrier_placed = true;
            }
        }
    }

    /// Makes `buffer` ready for use in `state`.
    pub fn require_buffer_state(&mut self, buffer: &Buffer, state: ResourceStates) {
        let desc = buffer.desc();
        if desc.is_volatile {
            return;
        }

        let permanent = buffer.permanent_state();
        if !permanent.is_unknown() {
            verify_permanent_state(&self.diagnostics, permanent, state, "buffer", desc.name());
            return;
        }

        if desc.cpu_access != CpuAccessMode::None {
            //CPU-visible memory can't change state
            return;
        }

        let tracking = &mut Self::buffer_entry(&mut self.buffers, buffer).state;

        if tracking.state.is_unknown() {
            self.diagnostics.report(
                self.unknown_state_severity,
                format_args!(
                    "Unknown prior state of buffer {}. Call begin_tracking_buffer_state before \
                     using the buffer or use keep_initial_state and initial_state in its \
                     BufferDesc.",
                    desc.name()
                ),
            );
        }

        let transition_necessary = tracking.state != state;
        let uav_necessary =
            state.has_uav() && (tracking.enable_uav_barriers || !tracking.first_uav_barrier_placed);

        if transition_necessary {
            //the same buffer used twice by one command, e.g. as index and vertex buffer
            if let Some(pending) = self.barriers.pending_buffer_barrier_mut(buffer.id()) {
                pending.state_after |= state;
                tracking.state = pending.state_after;
                return;
            }
        }

        if transition_necessary || uav_necessary {
            self.barriers.append(Barrier::Buffer(BufferBarrier {
                buffer: buffer.clone(),
                state_before: tracking.state,
                state_after: state,
            }));
        }

        if uav_necessary && !transition_necessary {
            tracking.first_uav_barrier_placed = true;
        }

        tracking.state = state;
    }

    /// Returns every `keep_initial_state` texture touched this session to its initial state.
    pub fn keep_texture_initial_states(&mut self) {
        let mut pending: Vec<Texture> = self
            .textures
            .values()
            .filter(|t| {
                t.texture.desc().keep_initial_state
                    && t.texture.permanent_state().is_unknown()
                    && !t.state.permanent_transition
            })
            .map(|t| t.texture.clone())
            .collect();
        pending.sort_by_key(Texture::id);
        for texture in pending {
            let initial = texture.desc().initial_state;
            self.require_texture_state(&texture, TextureSubresourceSet::ALL, initial);
        }
    }

    /// Returns every `keep_initial_state` buffer touched this session to its initial state.
    pub fn keep_buffer_initial_states(&mut self) {
        let mut pending: Vec<Buffer> = self
            .buffers
            .values()
            .filter(|b| {
                let desc = b.buffer.desc();
                desc.keep_initial_state
                    && b.buffer.permanent_state().is_unknown()
                    && !desc.is_volatile
                    && !b.state.permanent_transition
            })
            .map(|b| b.buffer.clone())
            .collect();
        pending.sort_by_key(Buffer::id);
        for buffer in pending {
            let initial = buffer.desc().initial_state;
            self.require_buffer_state(&buffer, initial);
        }
    }

    /// Called once the recording has been submitted: permanent transitions take effect and the
    /// session's tracking is dropped.
    pub fn command_list_submitted(&mut self) {
        for (texture, state) in self.permanent_textures.drain(..) {
            let current = texture.permanent_state();
            if !current.is_unknown() && current != state {
                self.diagnostics.error(format_args!(
                    "Attempted to switch permanent state of texture {} from {current} to {state}",
                    texture.desc().name()
                ));
                continue;
            }
            texture.set_permanent_state(state);
        }

        for (buffer, state) in self.permanent_buffers.drain(..) {
            let current = buffer.permanent_state();
            if !current.is_unknown() && current != state {
                self.diagnostics.error(format_args!(
                    "Attempted to switch permanent state of buffer {} from {current} to {state}",
                    buffer.desc().name()
                ));
                continue;
            }
            buffer.set_permanent_state(state);
        }

        for tracked in self.textures.values() {
            if tracked.texture.desc().keep_initial_state && !tracked.texture.state_initialized() {
                tracked.texture.mark_state_initialized();
            }
        }

        self.textures.clear();
        self.buffers.clear();
    }

    /// Forgets the session without applying anything, for recordings that are never submitted.
    pub fn reset(&mut self) {
        self.textures.clear();
        self.buffers.clear();
        self.permanent_textures.clear();
        self.permanent_buffers.clear();
        self.barriers.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::RecordingSink;
    use crate::imp::NativeResource;
    use crate::resources::{BufferDesc, Format, TextureDesc};
    use std::sync::Arc;

    const ALL: TextureSubresourceSet = TextureSubresourceSet::ALL;

    fn tracker() -> (StateTracker, Arc<RecordingSink>) {
        let sink = RecordingSink::new();
        (StateTracker::new(Diagnostics::new(sink.clone()), false), sink)
    }

    fn texture(desc: TextureDesc) -> Texture {
        Texture::new(desc, NativeResource::default(), true)
    }

    fn buffer(desc: BufferDesc) -> Buffer {
        Buffer::new(desc, NativeResource::default())
    }

    #[test]
    fn repeated_requirement_is_free() {
        let (mut t, sink) = tracker();
        let tex = texture(TextureDesc::new_2d(4, 4, Format::Rgba8Unorm));
        t.begin_tracking_texture_state(&tex, ALL, ResourceStates::COMMON);
        t.require_texture_state(&tex, ALL, ResourceStates::SHADER_RESOURCE);
        assert_eq!(t.barriers().len(), 1);
        t.require_texture_state(&tex, ALL, ResourceStates::SHADER_RESOURCE);
        assert_eq!(t.barriers().len(), 1);
        assert_eq!(sink.error_count(), 0);
    }

    #[test]
    fn transitions_record_prior_state() {
        let (mut t, _sink) = tracker();
        let buf = buffer(BufferDesc::new(64).with_initial_state(ResourceStates::COPY_DEST, true));
        t.require_buffer_state(&buf, ResourceStates::COPY_DEST);
        assert!(t.barriers().is_empty());
        t.require_buffer_state(&buf, ResourceStates::SHADER_RESOURCE);
        let barrier = &t.barriers().barriers()[0];
        assert_eq!(barrier.state_before(), ResourceStates::COPY_DEST);
        assert_eq!(barrier.state_after(), ResourceStates::SHADER_RESOURCE);
        assert_eq!(t.buffer_state(&buf), ResourceStates::SHADER_RESOURCE);
    }

    #[test]
    fn pending_buffer_barriers_merge() {
        let (mut t, _sink) = tracker();
        let buf = buffer(BufferDesc::new(64));
        t.begin_tracking_buffer_state(&buf, ResourceStates::COPY_DEST);
        t.require_buffer_state(&buf, ResourceStates::INDEX_BUFFER);
        t.require_buffer_state(&buf, ResourceStates::VERTEX_BUFFER);
        assert_eq!(t.barriers().len(), 1);
        let merged = ResourceStates::INDEX_BUFFER | ResourceStates::VERTEX_BUFFER;
        assert_eq!(t.barriers().barriers()[0].state_after(), merged);
        assert_eq!(t.buffer_state(&buf), merged);
    }

    #[test]
    fn unknown_state_is_reported_but_barrier_is_emitted() {
        let (mut t, sink) = tracker();
        let buf = buffer(BufferDesc::new(64).with_name("mystery"));
        t.require_buffer_state(&buf, ResourceStates::COPY_DEST);
        assert_eq!(sink.count(MessageSeverity::Error), 1);
        assert!(sink.messages()[0].1.contains("mystery"));
        let barrier = &t.barriers().barriers()[0];
        assert_eq!(barrier.state_before(), ResourceStates::UNKNOWN);
        assert_eq!(barrier.state_after(), ResourceStates::COPY_DEST);
    }

    #[test]
    fn unknown_state_can_be_fatal() {
        let sink = RecordingSink::new();
        let mut t = StateTracker::new(Diagnostics::new(sink.clone()), true);
        let buf = buffer(BufferDesc::new(64));
        t.require_buffer_state(&buf, ResourceStates::COPY_DEST);
        assert_eq!(sink.count(MessageSeverity::Fatal), 1);
    }

    #[test]
    fn whole_unknown_texture_is_reported() {
        let (mut t, sink) = tracker();
        let tex = texture(TextureDesc::new_2d(4, 4, Format::Rgba8Unorm).with_name("loose"));
        t.require_texture_state(&tex, ALL, ResourceStates::SHADER_RESOURCE);
        assert_eq!(sink.count(MessageSeverity::Error), 1);
        assert!(sink.messages()[0].1.contains("loose"));
        assert_eq!(t.barriers().barriers()[0].state_before(), ResourceStates::UNKNOWN);
        t.require_texture_state(&tex, ALL, ResourceStates::COPY_SOURCE);
        assert_eq!(sink.count(MessageSeverity::Error), 1);
    }

    #[test]
    fn volatile_and_cpu_buffers_are_untracked() {
        let (mut t, sink) = tracker();
        let volatile = buffer(BufferDesc::volatile_constant_buffer(256));
        let readback = buffer(BufferDesc::new(256).with_cpu_access(CpuAccessMode::Read));
        t.require_buffer_state(&volatile, ResourceStates::CONSTANT_BUFFER);
        t.require_buffer_state(&readback, ResourceStates::COPY_DEST);
        assert!(t.barriers().is_empty());
        assert_eq!(t.tracked_buffer_count(), 0);
        assert_eq!(sink.error_count(), 0);
    }

    #[test]
    fn partial_requirement_expands_tracking() {
        let (mut t, sink) = tracker();
        let tex = texture(TextureDesc::new_2d(4, 4, Format::Rgba8Unorm).with_mip_levels(3));
        let second_mip = TextureSubresourceSet::new(1, 1, 0, 1);
        t.begin_tracking_texture_state(&tex, ALL, ResourceStates::SHADER_RESOURCE);
        t.require_texture_state(&tex, second_mip, ResourceStates::RENDER_TARGET);
        assert_eq!(t.barriers().len(), 1);
        assert!(matches!(
            &t.barriers().barriers()[0],
            Barrier::Texture(TextureBarrier {
                subresource: BarrierSubresource::Single { mip_level: 1, array_slice: 0 },
                ..
            })
        ));
        assert_eq!(t.texture_subresource_state(&tex, 0, 0), ResourceStates::SHADER_RESOURCE);
        assert_eq!(t.texture_subresource_state(&tex, 0, 1), ResourceStates::RENDER_TARGET);
        assert_eq!(t.texture_subresource_state(&tex, 0, 2), ResourceStates::SHADER_RESOURCE);

        //a whole-texture request now goes subresource by subresource
        t.barriers_mut().clear();
        t.require_texture_state(&tex, ALL, ResourceStates::SHADER_RESOURCE);
        assert_eq!(t.barriers().len(), 1);
        assert_eq!(sink.error_count(), 0);
    }

    #[test]
    fn partial_uav_places_one_barrier() {
        let (mut t, _sink) = tracker();
        let tex = texture(
            TextureDesc::new_2d(4, 4, Format::Rgba8Unorm)
                .with_mip_levels(4)
                .with_uav(true),
        );
        t.begin_tracking_texture_state(&tex, ALL, ResourceStates::UNORDERED_ACCESS);
        let first_three_mips = TextureSubresourceSet::new(0, 3, 0, 1);
        t.require_texture_state(&tex, first_three_mips, ResourceStates::UNORDERED_ACCESS);
        assert_eq!(t.barriers().len(), 1);
        assert!(t.barriers().barriers()[0].is_uav_barrier());
    }

    #[test]
    fn permanent_state_checks() {
        let (mut t, sink) = tracker();
        let tex = texture(TextureDesc::new_2d(4, 4, Format::D32));
        tex.set_permanent_state(ResourceStates::DEPTH_READ | ResourceStates::SHADER_RESOURCE);
        t.require_texture_state(&tex, ALL, ResourceStates::SHADER_RESOURCE);
        assert!(t.barriers().is_empty());
        assert_eq!(sink.error_count(), 0);
        t.require_texture_state(&tex, ALL, ResourceStates::DEPTH_WRITE);
        assert!(t.barriers().is_empty());
        assert_eq!(sink.error_count(), 1);
        assert_eq!(t.tracked_texture_count(), 0);
    }

    #[test]
    fn permanent_transition_waits_for_submission() {
        let (mut t, sink) = tracker();
        let buf = buffer(BufferDesc::new(64));
        t.begin_tracking_buffer_state(&buf, ResourceStates::COPY_DEST);
        t.end_tracking_buffer_state(&buf, ResourceStates::SHADER_RESOURCE, true);
        assert_eq!(buf.permanent_state(), ResourceStates::UNKNOWN);
        t.command_list_submitted();
        assert_eq!(buf.permanent_state(), ResourceStates::SHADER_RESOURCE);
        assert_eq!(t.tracked_buffer_count(), 0);

        //switching to a different permanent state is refused
        t.end_tracking_buffer_state(&buf, ResourceStates::SHADER_RESOURCE, true);
        t.permanent_buffers.push((buf.clone(), ResourceStates::COPY_SOURCE));
        t.command_list_submitted();
        assert_eq!(buf.permanent_state(), ResourceStates::SHADER_RESOURCE);
        assert_eq!(sink.error_count(), 1);
    }

    #[test]
    fn partial_permanent_transition_is_downgraded() {
        let (mut t, sink) = tracker();
        let tex = texture(TextureDesc::new_2d(4, 4, Format::Rgba8Unorm).with_mip_levels(2));
        t.begin_tracking_texture_state(&tex, ALL, ResourceStates::COMMON);
        let second_mip = TextureSubresourceSet::single(1, 0);
        t.end_tracking_texture_state(&tex, second_mip, ResourceStates::SHADER_RESOURCE, true);
        assert_eq!(sink.error_count(), 1);
        t.command_list_submitted();
        assert_eq!(tex.permanent_state(), ResourceStates::UNKNOWN);
    }

    #[test]
    fn keep_initial_state_returns_home() {
        let (mut t, _sink) = tracker();
        let tex = texture(
            TextureDesc::new_2d(4, 4, Format::Rgba8Unorm)
                .with_render_target(true)
                .with_initial_state(ResourceStates::SHADER_RESOURCE, true),
        );
        t.require_texture_state(&tex, ALL, ResourceStates::RENDER_TARGET);
        t.keep_texture_initial_states();
        let barriers = t.barriers().barriers();
        assert_eq!(barriers.len(), 2);
        assert_eq!(barriers[1].state_before(), ResourceStates::RENDER_TARGET);
        assert_eq!(barriers[1].state_after(), ResourceStates::SHADER_RESOURCE);
    }

    #[test]
    fn uninitialized_keep_initial_texture_starts_common() {
        let (mut t, _sink) = tracker();
        let tex = Texture::new(
            TextureDesc::new_2d(4, 4, Format::Rgba8Unorm)
                .with_initial_state(ResourceStates::SHADER_RESOURCE, true),
            NativeResource::default(),
            false,
        );
        t.require_texture_state(&tex, ALL, ResourceStates::SHADER_RESOURCE);
        assert_eq!(t.barriers().barriers()[0].state_before(), ResourceStates::COMMON);
        t.command_list_submitted();
        assert!(tex.state_initialized());
        t.require_texture_state(&tex, ALL, ResourceStates::SHADER_RESOURCE);
        assert_eq!(t.barriers().len(), 1);
    }

    #[test]
    fn reenabling_uav_barriers_resets_first_barrier() {
        let (mut t, _sink) = tracker();
        let buf = buffer(BufferDesc::new(64).with_uavs(true));
        t.begin_tracking_buffer_state(&buf, ResourceStates::UNORDERED_ACCESS);
        t.set_enable_uav_barriers_for_buffer(&buf, false);
        t.require_buffer_state(&buf, ResourceStates::UNORDERED_ACCESS);
        t.require_buffer_state(&buf, ResourceStates::UNORDERED_ACCESS);
        assert_eq!(t.barriers().len(), 1);
        t.set_enable_uav_barriers_for_buffer(&buf, false);
        t.require_buffer_state(&buf, ResourceStates::UNORDERED_ACCESS);
        assert_eq!(t.barriers().len(), 2);
    }

    #[test]
    fn reset_forgets_everything() {
        let (mut t, _sink) = tracker();
        let buf = buffer(BufferDesc::new(64));
        t.begin_tracking_buffer_state(&buf, ResourceStates::COPY_DEST);
        t.end_tracking_buffer_state(&buf, ResourceStates::SHADER_RESOURCE, true);
        t.reset();
        assert!(t.barriers().is_empty());
        assert_eq!(t.buffer_state(&buf), ResourceStates::UNKNOWN);
        t.command_list_submitted();
        assert_eq!(buf.permanent_state(), ResourceStates::UNKNOWN);
    }
}
