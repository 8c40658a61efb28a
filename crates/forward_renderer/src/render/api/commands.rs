//! Typed command buffer recording
//!
//! [`CommandRecorder`] tracks the recording state of one command buffer and
//! [`ActiveRenderPass`] scopes draw commands to a render pass, ending it when
//! dropped.

use super::device::GraphicsDevice;
use super::error::DeviceResult;
use super::handles::{
    BufferHandle, CommandBufferHandle, DescriptorSetHandle, PipelineHandle, PipelineLayoutHandle,
};
use super::types::{BufferBinding, MemoryBarrier, Rect2D, RenderPassBegin, ShaderStages, Viewport};

/// Records commands into one primary command buffer
pub struct CommandRecorder<'d, D: GraphicsDevice + ?Sized> {
    device: &'d D,
    command_buffer: CommandBufferHandle,
    recording: bool,
}

impl<'d, D: GraphicsDevice + ?Sized> CommandRecorder<'d, D> {
    /// Wrap a command buffer in the initial state
    pub fn new(device: &'d D, command_buffer: CommandBufferHandle) -> Self {
        Self {
            device,
            command_buffer,
            recording: false,
        }
    }

    /// Command buffer handle
    pub fn handle(&self) -> CommandBufferHandle {
        self.command_buffer
    }

    /// Whether `begin` has been called without a matching `end`
    pub fn is_recording(&self) -> bool {
        self.recording
    }

    /// Reset the buffer and start recording
    pub fn reset_and_begin(&mut self) -> DeviceResult<()> {
        self.device.reset_command_buffer(self.command_buffer)?;
        self.recording = false;
        self.device.begin_command_buffer(self.command_buffer)?;
        self.recording = true;
        Ok(())
    }

    /// Finish recording and hand back the executable buffer
    pub fn end(mut self) -> DeviceResult<CommandBufferHandle> {
        debug_assert!(self.recording, "ending a command buffer that is not recording");
        self.device.end_command_buffer(self.command_buffer)?;
        self.recording = false;
        Ok(self.command_buffer)
    }

    /// Set the viewport
    pub fn set_viewport(&mut self, viewport: &Viewport) {
        self.device.cmd_set_viewport(self.command_buffer, viewport);
    }

    /// Set the scissor rectangle
    pub fn set_scissor(&mut self, scissor: &Rect2D) {
        self.device.cmd_set_scissor(self.command_buffer, scissor);
    }

    /// Write `data` into `buffer` at `offset` when the buffer executes
    pub fn update_buffer(&mut self, buffer: BufferHandle, offset: u64, data: &[u8]) {
        debug_assert!(data.len() % 4 == 0 && data.len() <= 65_536);
        self.device
            .cmd_update_buffer(self.command_buffer, buffer, offset, data);
    }

    /// Record a global memory barrier
    pub fn pipeline_barrier(&mut self, barrier: &MemoryBarrier) {
        self.device.cmd_pipeline_barrier(self.command_buffer, barrier);
    }

    /// Begin a render pass; it ends when the returned guard is dropped
    pub fn begin_render_pass(&mut self, begin: &RenderPassBegin) -> ActiveRenderPass<'_, 'd, D> {
        debug_assert!(self.recording, "render pass begun outside of recording");
        self.device.cmd_begin_render_pass(self.command_buffer, begin);
        ActiveRenderPass { recorder: self }
    }
}

/// Draw scope inside a render pass
pub struct ActiveRenderPass<'r, 'd, D: GraphicsDevice + ?Sized> {
    recorder: &'r mut CommandRecorder<'d, D>,
}

impl<D: GraphicsDevice + ?Sized> ActiveRenderPass<'_, '_, D> {
    fn device(&self) -> &D {
        self.recorder.device
    }

    fn command_buffer(&self) -> CommandBufferHandle {
        self.recorder.command_buffer
    }

    /// Set the blend constants used as the destination blend factor
    pub fn set_blend_constants(&mut self, constants: &[f32; 4]) {
        self.device()
            .cmd_set_blend_constants(self.command_buffer(), constants);
    }

    /// Bind a graphics pipeline
    pub fn bind_pipeline(&mut self, pipeline: PipelineHandle) {
        self.device().cmd_bind_pipeline(self.command_buffer(), pipeline);
    }

    /// Bind a descriptor set at index `set`
    pub fn bind_descriptor_set(
        &mut self,
        layout: PipelineLayoutHandle,
        set: u32,
        descriptor_set: DescriptorSetHandle,
    ) {
        self.device()
            .cmd_bind_descriptor_set(self.command_buffer(), layout, set, descriptor_set);
    }

    /// Push constants
    pub fn push_constants(
        &mut self,
        layout: PipelineLayoutHandle,
        stages: ShaderStages,
        offset: u32,
        data: &[u8],
    ) {
        self.device()
            .cmd_push_constants(self.command_buffer(), layout, stages, offset, data);
    }

    /// Bind the vertex buffer
    pub fn bind_vertex_buffer(&mut self, binding: BufferBinding) {
        self.device()
            .cmd_bind_vertex_buffer(self.command_buffer(), binding);
    }

    /// Bind the 32-bit index buffer
    pub fn bind_index_buffer(&mut self, binding: BufferBinding) {
        self.device()
            .cmd_bind_index_buffer(self.command_buffer(), binding);
    }

    /// Single-instance indexed draw
    pub fn draw_indexed(&mut self, index_count: u32) {
        self.device()
            .cmd_draw_indexed(self.command_buffer(), index_count, 1, 0, 0, 0);
    }
}

impl<D: GraphicsDevice + ?Sized> Drop for ActiveRenderPass<'_, '_, D> {
    fn drop(&mut self) {
        self.recorder
            .device
            .cmd_end_render_pass(self.recorder.command_buffer);
    }
}
