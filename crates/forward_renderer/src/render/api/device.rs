//! The graphics device seam
//!
//! Everything the frame pipeline needs from the GPU goes through
//! [`GraphicsDevice`]. The device, its queues and the swapchain are brought up
//! elsewhere; an implementation only wraps an already-initialized device.
//!
//! Create calls return a [`DeviceResult`]. Destroy calls never fail and must
//! tolerate the null handle, which keeps teardown of partially initialized
//! state unconditional.

use super::error::DeviceResult;
use super::handles::{
    BufferHandle, CommandBufferHandle, CommandPoolHandle, DescriptorSetHandle,
    DescriptorSetLayoutHandle, FenceHandle, FramebufferHandle, ImageHandle, ImageViewHandle,
    MemoryHandle, PipelineHandle, PipelineLayoutHandle, QueueHandle, RenderPassHandle,
};
use super::types::{
    BufferBinding, BufferDesc, Extent2D, Format, GraphicsPipelineDesc, MemoryBarrier,
    MemoryLocation, PipelineLayoutDesc, QueueFamily, QueueKind, Rect2D, RenderPassBegin,
    RenderPassDesc, ShaderStages, SubmitInfo, Viewport,
};

/// GPU operations consumed by the renderer core
pub trait GraphicsDevice {
    // --- Device queries ---

    /// Family-indexed queue lookup
    fn queue_family(&self, kind: QueueKind) -> Option<QueueFamily>;

    /// Required alignment of uniform buffer descriptor offsets
    fn uniform_buffer_alignment(&self) -> u64;

    /// First candidate usable as a depth attachment
    fn select_depth_format(&self, candidates: &[Format]) -> Option<Format>;

    // --- Buffers and memory ---

    /// Create an unbound buffer
    fn create_buffer(&self, desc: &BufferDesc<'_>) -> DeviceResult<BufferHandle>;

    /// Allocate memory of a matching type for `buffer` and bind it at offset 0
    fn allocate_buffer_memory(
        &self,
        buffer: BufferHandle,
        location: MemoryLocation,
    ) -> DeviceResult<MemoryHandle>;

    /// Copy `data` into host-visible memory at `offset`
    fn write_memory(&self, memory: MemoryHandle, offset: u64, data: &[u8]) -> DeviceResult<()>;

    /// Destroy a buffer
    fn destroy_buffer(&self, buffer: BufferHandle);

    /// Free a memory allocation
    fn free_memory(&self, memory: MemoryHandle);

    // --- Images ---

    /// Create a 2D depth-stencil attachment image
    fn create_depth_image(&self, extent: Extent2D, format: Format) -> DeviceResult<ImageHandle>;

    /// One allocation backing every image in `images`, each bound at its own aligned offset
    fn allocate_image_memory(
        &self,
        images: &[ImageHandle],
        location: MemoryLocation,
    ) -> DeviceResult<MemoryHandle>;

    /// 2D view over the whole image; depth aspect for depth formats
    fn create_image_view(&self, image: ImageHandle, format: Format)
        -> DeviceResult<ImageViewHandle>;

    /// Destroy an image
    fn destroy_image(&self, image: ImageHandle);

    /// Destroy an image view
    fn destroy_image_view(&self, view: ImageViewHandle);

    // --- Descriptors ---

    /// Layout with a single uniform buffer at `binding`
    fn create_uniform_set_layout(
        &self,
        binding: u32,
        stages: ShaderStages,
    ) -> DeviceResult<DescriptorSetLayoutHandle>;

    /// Destroy a descriptor set layout
    fn destroy_descriptor_set_layout(&self, layout: DescriptorSetLayoutHandle);

    /// Allocate a set from `layout` bound to `range` bytes of `buffer` at `offset`
    fn create_uniform_descriptor_set(
        &self,
        layout: DescriptorSetLayoutHandle,
        buffer: BufferHandle,
        offset: u64,
        range: u64,
    ) -> DeviceResult<DescriptorSetHandle>;

    /// Return descriptor sets to the device's descriptor pool
    fn free_descriptor_sets(&self, sets: &[DescriptorSetHandle]);

    // --- Render passes, pipelines, framebuffers ---

    /// Create a color + depth render pass
    fn create_render_pass(&self, desc: &RenderPassDesc) -> DeviceResult<RenderPassHandle>;

    /// Destroy a render pass
    fn destroy_render_pass(&self, render_pass: RenderPassHandle);

    /// Create a pipeline layout
    fn create_pipeline_layout(&self, desc: &PipelineLayoutDesc<'_>)
        -> DeviceResult<PipelineLayoutHandle>;

    /// Destroy a pipeline layout
    fn destroy_pipeline_layout(&self, layout: PipelineLayoutHandle);

    /// Create a graphics pipeline
    fn create_graphics_pipeline(&self, desc: &GraphicsPipelineDesc<'_>)
        -> DeviceResult<PipelineHandle>;

    /// Destroy a pipeline
    fn destroy_pipeline(&self, pipeline: PipelineHandle);

    /// Create a framebuffer over `attachments`
    fn create_framebuffer(
        &self,
        render_pass: RenderPassHandle,
        attachments: &[ImageViewHandle],
        extent: Extent2D,
    ) -> DeviceResult<FramebufferHandle>;

    /// Destroy a framebuffer
    fn destroy_framebuffer(&self, framebuffer: FramebufferHandle);

    // --- Synchronization ---

    /// Create a fence, optionally already signaled
    fn create_fence(&self, signaled: bool) -> DeviceResult<FenceHandle>;

    /// Block until `fence` is signaled or `timeout_ns` elapses
    fn wait_for_fence(&self, fence: FenceHandle, timeout_ns: u64) -> DeviceResult<()>;

    /// Return `fence` to the unsignaled state
    fn reset_fence(&self, fence: FenceHandle) -> DeviceResult<()>;

    /// Destroy a fence
    fn destroy_fence(&self, fence: FenceHandle);

    // --- Command buffers ---

    /// Pool whose buffers can be reset individually
    fn create_command_pool(&self, queue_family_index: u32) -> DeviceResult<CommandPoolHandle>;

    /// Allocate primary command buffers
    fn allocate_command_buffers(
        &self,
        pool: CommandPoolHandle,
        count: u32,
    ) -> DeviceResult<Vec<CommandBufferHandle>>;

    /// Destroy a pool and every buffer allocated from it
    fn destroy_command_pool(&self, pool: CommandPoolHandle);

    /// Reset a command buffer to the initial state
    fn reset_command_buffer(&self, command_buffer: CommandBufferHandle) -> DeviceResult<()>;

    /// Begin one-time-submit recording
    fn begin_command_buffer(&self, command_buffer: CommandBufferHandle) -> DeviceResult<()>;

    /// Finish recording
    fn end_command_buffer(&self, command_buffer: CommandBufferHandle) -> DeviceResult<()>;

    /// Record a viewport change
    fn cmd_set_viewport(&self, command_buffer: CommandBufferHandle, viewport: &Viewport);

    /// Record a scissor change
    fn cmd_set_scissor(&self, command_buffer: CommandBufferHandle, scissor: &Rect2D);

    /// Record new blend constants
    fn cmd_set_blend_constants(&self, command_buffer: CommandBufferHandle, constants: &[f32; 4]);

    /// Record the start of a render pass with inline contents
    fn cmd_begin_render_pass(&self, command_buffer: CommandBufferHandle, begin: &RenderPassBegin);

    /// Record the end of the current render pass
    fn cmd_end_render_pass(&self, command_buffer: CommandBufferHandle);

    /// Bind a graphics pipeline
    fn cmd_bind_pipeline(&self, command_buffer: CommandBufferHandle, pipeline: PipelineHandle);

    /// Bind one descriptor set at index `set`
    fn cmd_bind_descriptor_set(
        &self,
        command_buffer: CommandBufferHandle,
        layout: PipelineLayoutHandle,
        set: u32,
        descriptor_set: DescriptorSetHandle,
    );

    /// Record a push constant update
    fn cmd_push_constants(
        &self,
        command_buffer: CommandBufferHandle,
        layout: PipelineLayoutHandle,
        stages: ShaderStages,
        offset: u32,
        data: &[u8],
    );

    /// Bind the vertex buffer at binding 0
    fn cmd_bind_vertex_buffer(&self, command_buffer: CommandBufferHandle, binding: BufferBinding);

    /// Bind a 32-bit index buffer
    fn cmd_bind_index_buffer(&self, command_buffer: CommandBufferHandle, binding: BufferBinding);

    /// Record an in-stream buffer update (`data.len()` must be a multiple of 4, at most 65536)
    fn cmd_update_buffer(
        &self,
        command_buffer: CommandBufferHandle,
        buffer: BufferHandle,
        offset: u64,
        data: &[u8],
    );

    /// Record a global memory barrier
    fn cmd_pipeline_barrier(&self, command_buffer: CommandBufferHandle, barrier: &MemoryBarrier);

    /// Record an indexed draw
    fn cmd_draw_indexed(
        &self,
        command_buffer: CommandBufferHandle,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    );

    // --- Queues ---

    /// Submit one command buffer
    fn queue_submit(&self, queue: QueueHandle, submit: &SubmitInfo<'_>) -> DeviceResult<()>;

    /// Block until `queue` has no pending work
    fn queue_wait_idle(&self, queue: QueueHandle) -> DeviceResult<()>;
}
