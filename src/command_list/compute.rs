// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
use crate::command_list::CommandList;
use crate::command_list::state::{ComputeState, binding_update_mask, same_id};
use crate::imp::{Backend, Command};
use crate::pipeline::{ComputePipeline, PipelineBindPoint};
use crate::resources::ResourceRef;
use crate::states::ResourceStates;

impl<B: Backend> CommandList<B> {
    /// Binds a compute pipeline and its binding sets.  Graphics and ray tracing state are
    /// forgotten.
    pub fn set_compute_state(&mut self, state: &ComputeState) {
        if !self.check_open("set compute state") {
            return;
        }
        let Some(pipeline) = state.pipeline.as_ref() else {
            self.diagnostics.error("Compute state has no pipeline");
            return;
        };
        if !self.check_binding_count(&state.bindings) {
            return;
        }

        self.end_render_pass();
        let current = self.bound.compute.take();
        self.bound.invalidate_pipelines();
        let current = current.as_ref();

        let current_pipeline = current.and_then(|c| c.pipeline.as_ref());
        let update_pipeline = !same_id(current_pipeline, Some(pipeline), ComputePipeline::id);
        let update_indirect = current.is_none_or(|c| c.indirect_params != state.indirect_params);
        let heaps_rebound = self.commit_descriptor_heaps();
        let update_mask = if update_pipeline || heaps_rebound {
            u64::MAX
        } else {
            binding_update_mask(current.map(|c| c.bindings.as_slice()), &state.bindings)
        };

        if self.enable_automatic_barriers {
            for (index, binding_set) in state.bindings.iter().enumerate() {
                //UAV bindings are re-required every time to order back-to-back dispatches
                if update_mask & (1 << index) != 0 || binding_set.has_uav_bindings() {
                    self.set_resource_states_for_binding_set(binding_set);
                }
            }
            if update_indirect && let Some(indirect) = &state.indirect_params {
                self.tracker
                    .require_buffer_state(indirect, ResourceStates::INDIRECT_ARGUMENT);
            }
        }
        self.commit_barriers();

        if update_pipeline {
            self.record(Command::BindPipeline {
                bind_point: PipelineBindPoint::Compute,
                pipeline: pipeline.id(),
            });
            self.reference(ResourceRef::ComputePipeline(pipeline.clone()));
        }
        self.bind_binding_sets(PipelineBindPoint::Compute, &state.bindings, update_mask);
        if update_indirect && let Some(indirect) = &state.indirect_params {
            self.reference(ResourceRef::Buffer(indirect.clone()));
        }

        self.bound.compute = Some(state.clone());
    }

    pub fn dispatch(&mut self, groups_x: u32, groups_y: u32, groups_z: u32) {
        if self.prepare_dispatch("dispatch") {
            self.record(Command::Dispatch {
                x: groups_x,
                y: groups_y,
                z: groups_z,
            });
        }
    }

    /// Dispatches with group counts read from the bound indirect parameter buffer.
    pub fn dispatch_indirect(&mut self, offset: u64) {
        if !self.prepare_dispatch("dispatch indirect") {
            return;
        }
        let indirect = self.bound.compute.as_ref().and_then(|c| c.indirect_params.clone());
        let Some(buffer) = indirect else {
            self.diagnostics
                .error("Can't dispatch indirect: no indirect parameter buffer bound");
            return;
        };
        self.record(Command::DispatchIndirect {
            buffer: buffer.id(),
            offset,
        });
    }

    fn prepare_dispatch(&mut self, operation: &str) -> bool {
        if !self.check_open(operation) {
            return false;
        }
        if self.bound.compute.is_none() {
            self.diagnostics
                .error(format_args!("Can't {operation}: no compute state set"));
            return false;
        }
        self.update_volatile_buffers()
    }
}
