// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
use crate::command_list::CommandList;
use crate::command_list::state::{RayTracingState, binding_update_mask, same_id};
use crate::error::Error;
use crate::imp::{Backend, Command};
use crate::pipeline::{PipelineBindPoint, RayTracingPipeline};
use crate::resources::{AccelStruct, Buffer, ResourceRef};
use crate::states::ResourceStates;

/// Scratch memory alignment the native APIs require for acceleration-structure builds.
const SCRATCH_ALIGNMENT: u64 = 256;

impl<B: Backend> CommandList<B> {
    /// Binds a ray tracing pipeline and its binding sets.  Graphics and compute state are
    /// forgotten.
    pub fn set_ray_tracing_state(&mut self, state: &RayTracingState) {
        if !self.check_open("set ray tracing state") {
            return;
        }
        let Some(pipeline) = state.pipeline.as_ref() else {
            self.diagnostics.error("Ray tracing state has no pipeline");
            return;
        };
        if !self.check_binding_count(&state.bindings) {
            return;
        }

        self.end_render_pass();
        let current = self.bound.ray_tracing.take();
        self.bound.invalidate_pipelines();
        let current = current.as_ref();

        let update_pipeline = !same_id(
            current.and_then(|c| c.pipeline.as_ref()),
            Some(pipeline),
            RayTracingPipeline::id,
        );
        let heaps_rebound = self.commit_descriptor_heaps();
        let update_mask = if update_pipeline || heaps_rebound {
            u64::MAX
        } else {
            binding_update_mask(current.map(|c| c.bindings.as_slice()), &state.bindings)
        };

        if self.enable_automatic_barriers {
            for (index, binding_set) in state.bindings.iter().enumerate() {
                if update_mask & (1 << index) != 0 || binding_set.has_uav_bindings() {
                    self.set_resource_states_for_binding_set(binding_set);
                }
            }
        }
        self.commit_barriers();

        if update_pipeline {
            self.record(Command::BindPipeline {
                bind_point: PipelineBindPoint::RayTracing,
                pipeline: pipeline.id(),
            });
            self.reference(ResourceRef::RayTracingPipeline(pipeline.clone()));
        }
        self.bind_binding_sets(PipelineBindPoint::RayTracing, &state.bindings, update_mask);

        self.bound.ray_tracing = Some(state.clone());
    }

    pub fn dispatch_rays(&mut self, width: u32, height: u32, depth: u32) {
        if !self.check_open("dispatch rays") {
            return;
        }
        if self.bound.ray_tracing.is_none() {
            self.diagnostics
                .error("Can't dispatch rays: no ray tracing state set");
            return;
        }
        if !self.update_volatile_buffers() {
            return;
        }
        self.record(Command::DispatchRays { width, height, depth });
    }

    /// Builds `accel_struct` from `inputs` (geometry buffers, or the instance buffer of a top
    /// level structure).  Fails if the scratch memory budget can't fit the build.
    pub fn build_acceleration_structure(
        &mut self,
        accel_struct: &AccelStruct,
        inputs: &[Buffer],
    ) -> Result<(), Error> {
        if !self.check_open("build acceleration structure") {
            return Ok(());
        }
        self.end_render_pass();

        let desc = accel_struct.desc();
        let completed = self.device.queue_last_completed(self.params.queue_type);
        let scratch = match self.scratch.suballocate(
            desc.scratch_size.max(1),
            SCRATCH_ALIGNMENT,
            self.recording_version,
            completed,
        ) {
            Ok(scratch) => scratch,
            Err(e) => {
                self.diagnostics.error(format_args!(
                    "Couldn't suballocate a scratch buffer for {} build. The build requires {} \
                     bytes of scratch space: {e}",
                    crate::resources::debug_name(&desc.debug_name),
                    desc.scratch_size
                ));
                return Err(e);
            }
        };

        for input in inputs {
            self.require_buffer(input, ResourceStates::ACCEL_STRUCT_BUILD_INPUT);
        }
        self.require_buffer(accel_struct.data_buffer(), ResourceStates::ACCEL_STRUCT_WRITE);
        self.commit_barriers();

        if scratch.needs_uav_barrier {
            self.record(Command::ScratchUavBarrier {
                address: scratch.gpu_address,
            });
        }
        self.record(Command::BuildAccelStruct {
            dest: accel_struct.id(),
            inputs: inputs.iter().map(Buffer::id).collect(),
            scratch_address: scratch.gpu_address,
        });

        self.reference(ResourceRef::AccelStruct(accel_struct.clone()));
        for input in inputs {
            self.reference(ResourceRef::Buffer(input.clone()));
        }
        Ok(())
    }
}
