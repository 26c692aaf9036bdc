// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
use crate::command_list::CommandList;
use crate::command_list::state::{GraphicsState, binding_update_mask, same_id};
use crate::imp::{Backend, Command, DrawArguments};
use crate::pipeline::{Framebuffer, GraphicsPipeline, PipelineBindPoint};
use crate::resources::{Buffer, ResourceRef};
use crate::states::ResourceStates;

impl<B: Backend> CommandList<B> {
    /// Binds everything a draw needs.  Only what differs from the previous graphics state of this
    /// session is rebound; compute and ray tracing state are forgotten.
    pub fn set_graphics_state(&mut self, state: &GraphicsState) {
        if !self.check_open("set graphics state") {
            return;
        }
        let Some(pipeline) = state.pipeline.as_ref() else {
            self.diagnostics.error("Graphics state has no pipeline");
            return;
        };
        if !self.check_binding_count(&state.bindings) {
            return;
        }
        let Some(framebuffer) = state.framebuffer.as_ref() else {
            self.diagnostics.error("Graphics state has no framebuffer");
            return;
        };

        let current = self.bound.graphics.take();
        self.bound.invalidate_pipelines();
        let current = current.as_ref();

        let current_pipeline = current.and_then(|c| c.pipeline.as_ref());
        let update_pipeline = !same_id(current_pipeline, Some(pipeline), GraphicsPipeline::id);
        let current_framebuffer = current.and_then(|c| c.framebuffer.as_ref());
        let update_framebuffer = !self.bound.render_pass_active
            || !same_id(current_framebuffer, Some(framebuffer), Framebuffer::id);
        let update_viewports = current.is_none_or(|c| c.viewports != state.viewports);
        let update_index_buffer = current.is_none_or(|c| c.index_buffer != state.index_buffer);
        let update_vertex_buffers =
            current.is_none_or(|c| c.vertex_buffers != state.vertex_buffers);
        let update_indirect = current.is_none_or(|c| c.indirect_params != state.indirect_params);

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
            if update_framebuffer {
                self.set_resource_states_for_framebuffer(framebuffer);
            }
            if update_index_buffer && let Some(index_buffer) = &state.index_buffer {
                self.tracker
                    .require_buffer_state(&index_buffer.buffer, ResourceStates::INDEX_BUFFER);
            }
            if update_vertex_buffers {
                for vertex_buffer in &state.vertex_buffers {
                    self.tracker
                        .require_buffer_state(&vertex_buffer.buffer, ResourceStates::VERTEX_BUFFER);
                }
            }
            if update_indirect && let Some(indirect) = &state.indirect_params {
                self.tracker
                    .require_buffer_state(indirect, ResourceStates::INDIRECT_ARGUMENT);
            }
        }

        //barriers can't be recorded inside a render pass
        if update_framebuffer || self.pending_barrier_count() > 0 {
            self.end_render_pass();
        }
        self.commit_barriers();

        if update_pipeline {
            self.record(Command::BindPipeline {
                bind_point: PipelineBindPoint::Graphics,
                pipeline: pipeline.id(),
            });
            self.reference(ResourceRef::GraphicsPipeline(pipeline.clone()));
        }
        if !self.bound.render_pass_active {
            self.record(Command::BeginRenderPass {
                framebuffer: framebuffer.id(),
            });
            self.bound.render_pass_active = true;
            self.reference(ResourceRef::Framebuffer(framebuffer.clone()));
        }
        self.bind_binding_sets(PipelineBindPoint::Graphics, &state.bindings, update_mask);
        if update_viewports && !state.viewports.is_empty() {
            self.record(Command::SetViewports(state.viewports.clone()));
        }
        if update_index_buffer && let Some(index_buffer) = &state.index_buffer {
            let address = self.buffer_address(&index_buffer.buffer) + index_buffer.offset;
            self.record(Command::SetIndexBuffer {
                buffer: index_buffer.buffer.id(),
                address,
                format: index_buffer.format,
            });
            self.reference(ResourceRef::Buffer(index_buffer.buffer.clone()));
        }
        if update_vertex_buffers {
            for vertex_buffer in &state.vertex_buffers {
                let address = self.buffer_address(&vertex_buffer.buffer) + vertex_buffer.offset;
                self.record(Command::SetVertexBuffer {
                    slot: vertex_buffer.slot,
                    buffer: vertex_buffer.buffer.id(),
                    address,
                });
                self.reference(ResourceRef::Buffer(vertex_buffer.buffer.clone()));
            }
        }
        if update_indirect && let Some(indirect) = &state.indirect_params {
            self.reference(ResourceRef::Buffer(indirect.clone()));
        }

        self.bound.graphics = Some(state.clone());
    }

    /// Requires every attachment of `framebuffer` in its attachment state.
    pub fn set_resource_states_for_framebuffer(&mut self, framebuffer: &Framebuffer) {
        let desc = framebuffer.desc();
        for attachment in &desc.color_attachments {
            self.tracker.require_texture_state(
                &attachment.texture,
                attachment.subresources,
                ResourceStates::RENDER_TARGET,
            );
        }
        if let Some(depth) = &desc.depth_attachment {
            let state = if depth.is_read_only {
                ResourceStates::DEPTH_READ
            } else {
                ResourceStates::DEPTH_WRITE
            };
            self.tracker.require_texture_state(&depth.texture, depth.subresources, state);
        }
    }

    pub fn draw(&mut self, args: DrawArguments) {
        if self.prepare_draw("draw") {
            self.record(Command::Draw(args));
        }
    }

    pub fn draw_indexed(&mut self, args: DrawArguments) {
        if !self.prepare_draw("draw indexed") {
            return;
        }
        let has_index_buffer = self
            .bound
            .graphics
            .as_ref()
            .is_some_and(|g| g.index_buffer.is_some());
        if !has_index_buffer {
            self.diagnostics.error("Can't draw indexed: no index buffer bound");
            return;
        }
        self.record(Command::DrawIndexed(args));
    }

    /// Draws `draw_count` times with arguments read from the bound indirect parameter buffer.
    pub fn draw_indirect(&mut self, offset: u64, draw_count: u32) {
        if !self.prepare_draw("draw indirect") {
            return;
        }
        let indirect = self.bound.graphics.as_ref().and_then(|g| g.indirect_params.clone());
        let Some(buffer) = indirect else {
            self.diagnostics.error("Can't draw indirect: no indirect parameter buffer bound");
            return;
        };
        self.record(Command::DrawIndirect {
            buffer: buffer.id(),
            offset,
            draw_count,
        });
    }

    fn prepare_draw(&mut self, operation: &str) -> bool {
        if !self.check_open(operation) {
            return false;
        }
        if self.bound.graphics.is_none() {
            self.diagnostics
                .error(format_args!("Can't {operation}: no graphics state set"));
            return false;
        }
        if !self.bound.render_pass_active {
            self.diagnostics.error(format_args!(
                "Can't {operation}: the render pass was ended by a copy or clear, \
                 set the graphics state again"
            ));
            return false;
        }
        self.update_volatile_buffers()
    }

    /// Address a vertex or index buffer is bound at.  Volatile buffers live wherever they were
    /// last written.
    pub(crate) fn buffer_address(&self, buffer: &Buffer) -> u64 {
        if buffer.desc().is_volatile {
            self.bound
                .volatile_addresses
                .get(&buffer.id())
                .copied()
                .unwrap_or(0)
        } else {
            buffer.gpu_address()
        }
    }
}
