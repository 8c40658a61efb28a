//! In-memory graphics device for tests
//!
//! Tracks every live object, keeps the commands recorded into each command
//! buffer and snapshots them on submission. Fences signal on submit unless
//! the device is switched to manual fences, in which case tests signal them
//! explicitly. Failures are injected per operation name.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Mutex;

use crate::render::api::{
    BufferBinding, BufferDesc, BufferHandle, CommandBufferHandle, CommandPoolHandle,
    DescriptorSetHandle, DescriptorSetLayoutHandle, DeviceError, DeviceResult, Extent2D,
    FenceHandle, Format, FramebufferHandle, GraphicsDevice, GraphicsPipelineDesc, ImageHandle,
    ImageViewHandle, MemoryBarrier, MemoryHandle, MemoryLocation, PipelineHandle,
    PipelineLayoutDesc, PipelineLayoutHandle, PipelineStages, QueueFamily, QueueHandle, QueueKind,
    Rect2D, RenderPassBegin, RenderPassDesc, RenderPassHandle, SemaphoreHandle, ShaderStages,
    SubmitInfo, Viewport,
};

/// A command as recorded by the mock
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    SetViewport(Viewport),
    SetScissor(Rect2D),
    SetBlendConstants([f32; 4]),
    BeginRenderPass(RenderPassBegin),
    EndRenderPass,
    BindPipeline(PipelineHandle),
    BindDescriptorSet {
        layout: PipelineLayoutHandle,
        set: u32,
        descriptor_set: DescriptorSetHandle,
    },
    PushConstants {
        stages: ShaderStages,
        offset: u32,
        data: Vec<u8>,
    },
    BindVertexBuffer(BufferBinding),
    BindIndexBuffer(BufferBinding),
    UpdateBuffer {
        buffer: BufferHandle,
        offset: u64,
        data: Vec<u8>,
    },
    PipelineBarrier(MemoryBarrier),
    DrawIndexed {
        index_count: u32,
        instance_count: u32,
    },
}

/// Snapshot of one `queue_submit` call
#[derive(Debug, Clone)]
pub struct Submission {
    pub queue: QueueHandle,
    pub command_buffer: CommandBufferHandle,
    pub commands: Vec<Command>,
    pub wait_semaphores: Vec<SemaphoreHandle>,
    pub wait_stages: Vec<PipelineStages>,
    pub signal_semaphores: Vec<SemaphoreHandle>,
    pub fence: FenceHandle,
}

#[derive(Default)]
struct CommandBufferState {
    pool: u64,
    recording: bool,
    commands: Vec<Command>,
}

#[derive(Default)]
struct State {
    next_handle: u64,

    buffers: HashMap<u64, u64>,
    memory: HashMap<u64, Vec<u8>>,
    images: HashSet<u64>,
    image_views: HashSet<u64>,
    set_layouts: HashSet<u64>,
    descriptor_sets: HashMap<u64, (BufferHandle, u64, u64)>,
    render_passes: HashSet<u64>,
    pipeline_layouts: HashSet<u64>,
    pipelines: HashMap<u64, (PathBuf, PathBuf)>,
    framebuffers: HashSet<u64>,
    fences: HashMap<u64, bool>,
    pending_fences: HashSet<u64>,
    command_pools: HashSet<u64>,
    command_buffers: HashMap<u64, CommandBufferState>,

    submissions: Vec<Submission>,
    wait_idle_calls: usize,
    failures: HashMap<&'static str, u32>,
}

impl State {
    fn handle(&mut self) -> u64 {
        self.next_handle += 1;
        self.next_handle
    }

    fn check(&mut self, operation: &'static str) -> DeviceResult<()> {
        match self.failures.get_mut(operation) {
            Some(0) => {
                self.failures.remove(operation);
                Err(DeviceError::Api {
                    operation,
                    code: MockDevice::FAILURE_CODE,
                })
            }
            Some(remaining) => {
                *remaining -= 1;
                Ok(())
            }
            None => Ok(()),
        }
    }

    fn record(&mut self, command_buffer: CommandBufferHandle, command: Command) {
        let state = self
            .command_buffers
            .get_mut(&command_buffer.0)
            .expect("command recorded into an unknown command buffer");
        assert!(state.recording, "command recorded outside of begin/end");
        state.commands.push(command);
    }
}

/// Test double for [`GraphicsDevice`]
pub struct MockDevice {
    state: Mutex<State>,
    uniform_alignment: u64,
    depth_formats: Vec<Format>,
    manual_fences: bool,
    graphics_queue: bool,
}

impl MockDevice {
    /// Native code reported by injected failures (`VK_ERROR_DEVICE_LOST`)
    pub const FAILURE_CODE: i32 = -4;

    const QUEUE: QueueHandle = QueueHandle(1);

    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                next_handle: 100,
                ..State::default()
            }),
            uniform_alignment: 64,
            depth_formats: vec![
                Format::D32Sfloat,
                Format::D32SfloatS8Uint,
                Format::D24UnormS8Uint,
                Format::D16Unorm,
            ],
            manual_fences: false,
            graphics_queue: true,
        }
    }

    pub fn with_uniform_alignment(mut self, alignment: u64) -> Self {
        self.uniform_alignment = alignment;
        self
    }

    pub fn with_depth_formats(mut self, formats: Vec<Format>) -> Self {
        self.depth_formats = formats;
        self
    }

    pub fn without_graphics_queue(mut self) -> Self {
        self.graphics_queue = false;
        self
    }

    /// Submissions leave their fence unsignaled until `signal_fence`
    pub fn manual_fences(mut self) -> Self {
        self.manual_fences = true;
        self
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    /// Let `operation` succeed `successes` more times, then fail once
    pub fn fail_after(&self, operation: &'static str, successes: u32) {
        self.state().failures.insert(operation, successes);
    }

    pub fn signal_fence(&self, fence: FenceHandle) {
        let mut state = self.state();
        state.pending_fences.remove(&fence.0);
        if let Some(signaled) = state.fences.get_mut(&fence.0) {
            *signaled = true;
        }
    }

    pub fn is_fence_signaled(&self, fence: FenceHandle) -> bool {
        self.state().fences.get(&fence.0).copied().unwrap_or(false)
    }

    pub fn commands(&self, command_buffer: CommandBufferHandle) -> Vec<Command> {
        self.state()
            .command_buffers
            .get(&command_buffer.0)
            .map(|state| state.commands.clone())
            .unwrap_or_default()
    }

    pub fn submissions(&self) -> Vec<Submission> {
        self.state().submissions.clone()
    }

    pub fn wait_idle_calls(&self) -> usize {
        self.state().wait_idle_calls
    }

    pub fn buffer_contents(&self, memory: MemoryHandle) -> Vec<u8> {
        self.state()
            .memory
            .get(&memory.0)
            .cloned()
            .unwrap_or_default()
    }

    pub fn buffer_size(&self, buffer: BufferHandle) -> Option<u64> {
        self.state().buffers.get(&buffer.0).copied()
    }

    pub fn descriptor_binding(&self, set: DescriptorSetHandle) -> Option<(BufferHandle, u64, u64)> {
        self.state().descriptor_sets.get(&set.0).copied()
    }

    pub fn pipeline_shaders(&self, pipeline: PipelineHandle) -> Option<(PathBuf, PathBuf)> {
        self.state().pipelines.get(&pipeline.0).cloned()
    }

    pub fn live_buffers(&self) -> usize {
        self.state().buffers.len()
    }

    pub fn live_memory(&self) -> usize {
        self.state().memory.len()
    }

    pub fn live_images(&self) -> usize {
        self.state().images.len()
    }

    pub fn live_image_views(&self) -> usize {
        self.state().image_views.len()
    }

    pub fn live_descriptor_sets(&self) -> usize {
        self.state().descriptor_sets.len()
    }

    pub fn live_framebuffers(&self) -> usize {
        self.state().framebuffers.len()
    }

    pub fn live_fences(&self) -> usize {
        self.state().fences.len()
    }

    pub fn live_pipelines(&self) -> usize {
        self.state().pipelines.len()
    }

    /// Every object created through the device and not yet destroyed
    pub fn live_objects(&self) -> usize {
        let state = self.state();
        state.buffers.len()
            + state.memory.len()
            + state.images.len()
            + state.image_views.len()
            + state.set_layouts.len()
            + state.descriptor_sets.len()
            + state.render_passes.len()
            + state.pipeline_layouts.len()
            + state.pipelines.len()
            + state.framebuffers.len()
            + state.fences.len()
            + state.command_pools.len()
            + state.command_buffers.len()
    }
}

impl Default for MockDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphicsDevice for MockDevice {
    fn queue_family(&self, kind: QueueKind) -> Option<QueueFamily> {
        match kind {
            QueueKind::Graphics if self.graphics_queue => Some(QueueFamily {
                index: 0,
                queue: Self::QUEUE,
            }),
            QueueKind::Graphics => None,
        }
    }

    fn uniform_buffer_alignment(&self) -> u64 {
        self.uniform_alignment
    }

    fn select_depth_format(&self, candidates: &[Format]) -> Option<Format> {
        candidates
            .iter()
            .copied()
            .find(|format| format.is_depth() && self.depth_formats.contains(format))
    }

    fn create_buffer(&self, desc: &BufferDesc<'_>) -> DeviceResult<BufferHandle> {
        let mut state = self.state();
        state.check("create_buffer")?;
        let handle = state.handle();
        state.buffers.insert(handle, desc.size);
        Ok(BufferHandle(handle))
    }

    fn allocate_buffer_memory(
        &self,
        buffer: BufferHandle,
        _location: MemoryLocation,
    ) -> DeviceResult<MemoryHandle> {
        let mut state = self.state();
        state.check("allocate_buffer_memory")?;
        let size = state.buffers.get(&buffer.0).copied().unwrap_or(0);
        let handle = state.handle();
        state.memory.insert(handle, vec![0; size as usize]);
        Ok(MemoryHandle(handle))
    }

    fn write_memory(&self, memory: MemoryHandle, offset: u64, data: &[u8]) -> DeviceResult<()> {
        let mut state = self.state();
        state.check("write_memory")?;
        let contents = state
            .memory
            .get_mut(&memory.0)
            .expect("write to unknown memory");
        let start = offset as usize;
        if contents.len() < start + data.len() {
            contents.resize(start + data.len(), 0);
        }
        contents[start..start + data.len()].copy_from_slice(data);
        Ok(())
    }

    fn destroy_buffer(&self, buffer: BufferHandle) {
        self.state().buffers.remove(&buffer.0);
    }

    fn free_memory(&self, memory: MemoryHandle) {
        self.state().memory.remove(&memory.0);
    }

    fn create_depth_image(&self, _extent: Extent2D, format: Format) -> DeviceResult<ImageHandle> {
        assert!(format.is_depth());
        let mut state = self.state();
        state.check("create_depth_image")?;
        let handle = state.handle();
        state.images.insert(handle);
        Ok(ImageHandle(handle))
    }

    fn allocate_image_memory(
        &self,
        images: &[ImageHandle],
        _location: MemoryLocation,
    ) -> DeviceResult<MemoryHandle> {
        let mut state = self.state();
        state.check("allocate_image_memory")?;
        assert!(images.iter().all(|image| state.images.contains(&image.0)));
        let handle = state.handle();
        state.memory.insert(handle, Vec::new());
        Ok(MemoryHandle(handle))
    }

    fn create_image_view(
        &self,
        _image: ImageHandle,
        _format: Format,
    ) -> DeviceResult<ImageViewHandle> {
        let mut state = self.state();
        state.check("create_image_view")?;
        let handle = state.handle();
        state.image_views.insert(handle);
        Ok(ImageViewHandle(handle))
    }

    fn destroy_image(&self, image: ImageHandle) {
        self.state().images.remove(&image.0);
    }

    fn destroy_image_view(&self, view: ImageViewHandle) {
        self.state().image_views.remove(&view.0);
    }

    fn create_uniform_set_layout(
        &self,
        _binding: u32,
        _stages: ShaderStages,
    ) -> DeviceResult<DescriptorSetLayoutHandle> {
        let mut state = self.state();
        state.check("create_uniform_set_layout")?;
        let handle = state.handle();
        state.set_layouts.insert(handle);
        Ok(DescriptorSetLayoutHandle(handle))
    }

    fn destroy_descriptor_set_layout(&self, layout: DescriptorSetLayoutHandle) {
        self.state().set_layouts.remove(&layout.0);
    }

    fn create_uniform_descriptor_set(
        &self,
        layout: DescriptorSetLayoutHandle,
        buffer: BufferHandle,
        offset: u64,
        range: u64,
    ) -> DeviceResult<DescriptorSetHandle> {
        let mut state = self.state();
        state.check("create_uniform_descriptor_set")?;
        assert!(state.set_layouts.contains(&layout.0), "unknown set layout");
        let handle = state.handle();
        state.descriptor_sets.insert(handle, (buffer, offset, range));
        Ok(DescriptorSetHandle(handle))
    }

    fn free_descriptor_sets(&self, sets: &[DescriptorSetHandle]) {
        let mut state = self.state();
        for set in sets {
            state.descriptor_sets.remove(&set.0);
        }
    }

    fn create_render_pass(&self, desc: &RenderPassDesc) -> DeviceResult<RenderPassHandle> {
        assert!(desc.depth_format.is_depth());
        let mut state = self.state();
        state.check("create_render_pass")?;
        let handle = state.handle();
        state.render_passes.insert(handle);
        Ok(RenderPassHandle(handle))
    }

    fn destroy_render_pass(&self, render_pass: RenderPassHandle) {
        self.state().render_passes.remove(&render_pass.0);
    }

    fn create_pipeline_layout(
        &self,
        desc: &PipelineLayoutDesc<'_>,
    ) -> DeviceResult<PipelineLayoutHandle> {
        let mut state = self.state();
        state.check("create_pipeline_layout")?;
        assert!(desc
            .set_layouts
            .iter()
            .all(|layout| state.set_layouts.contains(&layout.0)));
        let handle = state.handle();
        state.pipeline_layouts.insert(handle);
        Ok(PipelineLayoutHandle(handle))
    }

    fn destroy_pipeline_layout(&self, layout: PipelineLayoutHandle) {
        self.state().pipeline_layouts.remove(&layout.0);
    }

    fn create_graphics_pipeline(
        &self,
        desc: &GraphicsPipelineDesc<'_>,
    ) -> DeviceResult<PipelineHandle> {
        let mut state = self.state();
        state.check("create_graphics_pipeline")?;
        let handle = state.handle();
        state.pipelines.insert(
            handle,
            (
                desc.vertex_shader.to_path_buf(),
                desc.fragment_shader.to_path_buf(),
            ),
        );
        Ok(PipelineHandle(handle))
    }

    fn destroy_pipeline(&self, pipeline: PipelineHandle) {
        self.state().pipelines.remove(&pipeline.0);
    }

    fn create_framebuffer(
        &self,
        render_pass: RenderPassHandle,
        attachments: &[ImageViewHandle],
        _extent: Extent2D,
    ) -> DeviceResult<FramebufferHandle> {
        let mut state = self.state();
        state.check("create_framebuffer")?;
        assert!(state.render_passes.contains(&render_pass.0));
        assert!(attachments.iter().all(|view| !view.is_null()));
        let handle = state.handle();
        state.framebuffers.insert(handle);
        Ok(FramebufferHandle(handle))
    }

    fn destroy_framebuffer(&self, framebuffer: FramebufferHandle) {
        self.state().framebuffers.remove(&framebuffer.0);
    }

    fn create_fence(&self, signaled: bool) -> DeviceResult<FenceHandle> {
        let mut state = self.state();
        state.check("create_fence")?;
        let handle = state.handle();
        state.fences.insert(handle, signaled);
        Ok(FenceHandle(handle))
    }

    fn wait_for_fence(&self, fence: FenceHandle, _timeout_ns: u64) -> DeviceResult<()> {
        let mut state = self.state();
        state.check("wait_for_fence")?;
        match state.fences.get(&fence.0) {
            Some(true) => Ok(()),
            Some(false) => Err(DeviceError::Timeout {
                operation: "wait_for_fence",
            }),
            None => panic!("wait on unknown fence {fence:?}"),
        }
    }

    fn reset_fence(&self, fence: FenceHandle) -> DeviceResult<()> {
        let mut state = self.state();
        state.check("reset_fence")?;
        let signaled = state
            .fences
            .get_mut(&fence.0)
            .expect("reset of unknown fence");
        *signaled = false;
        Ok(())
    }

    fn destroy_fence(&self, fence: FenceHandle) {
        let mut state = self.state();
        state.fences.remove(&fence.0);
        state.pending_fences.remove(&fence.0);
    }

    fn create_command_pool(&self, _queue_family_index: u32) -> DeviceResult<CommandPoolHandle> {
        let mut state = self.state();
        state.check("create_command_pool")?;
        let handle = state.handle();
        state.command_pools.insert(handle);
        Ok(CommandPoolHandle(handle))
    }

    fn allocate_command_buffers(
        &self,
        pool: CommandPoolHandle,
        count: u32,
    ) -> DeviceResult<Vec<CommandBufferHandle>> {
        let mut state = self.state();
        state.check("allocate_command_buffers")?;
        assert!(state.command_pools.contains(&pool.0));
        Ok((0..count)
            .map(|_| {
                let handle = state.handle();
                state.command_buffers.insert(
                    handle,
                    CommandBufferState {
                        pool: pool.0,
                        ..CommandBufferState::default()
                    },
                );
                CommandBufferHandle(handle)
            })
            .collect())
    }

    fn destroy_command_pool(&self, pool: CommandPoolHandle) {
        let mut state = self.state();
        state.command_pools.remove(&pool.0);
        state
            .command_buffers
            .retain(|_, command_buffer| command_buffer.pool != pool.0);
    }

    fn reset_command_buffer(&self, command_buffer: CommandBufferHandle) -> DeviceResult<()> {
        let mut state = self.state();
        state.check("reset_command_buffer")?;
        let buffer = state
            .command_buffers
            .get_mut(&command_buffer.0)
            .expect("reset of unknown command buffer");
        buffer.recording = false;
        buffer.commands.clear();
        Ok(())
    }

    fn begin_command_buffer(&self, command_buffer: CommandBufferHandle) -> DeviceResult<()> {
        let mut state = self.state();
        state.check("begin_command_buffer")?;
        let buffer = state
            .command_buffers
            .get_mut(&command_buffer.0)
            .expect("begin of unknown command buffer");
        assert!(!buffer.recording, "begin while already recording");
        buffer.recording = true;
        Ok(())
    }

    fn end_command_buffer(&self, command_buffer: CommandBufferHandle) -> DeviceResult<()> {
        let mut state = self.state();
        state.check("end_command_buffer")?;
        let buffer = state
            .command_buffers
            .get_mut(&command_buffer.0)
            .expect("end of unknown command buffer");
        assert!(buffer.recording, "end without begin");
        buffer.recording = false;
        Ok(())
    }

    fn cmd_set_viewport(&self, command_buffer: CommandBufferHandle, viewport: &Viewport) {
        self.state()
            .record(command_buffer, Command::SetViewport(*viewport));
    }

    fn cmd_set_scissor(&self, command_buffer: CommandBufferHandle, scissor: &Rect2D) {
        self.state()
            .record(command_buffer, Command::SetScissor(*scissor));
    }

    fn cmd_set_blend_constants(&self, command_buffer: CommandBufferHandle, constants: &[f32; 4]) {
        self.state()
            .record(command_buffer, Command::SetBlendConstants(*constants));
    }

    fn cmd_begin_render_pass(&self, command_buffer: CommandBufferHandle, begin: &RenderPassBegin) {
        self.state()
            .record(command_buffer, Command::BeginRenderPass(*begin));
    }

    fn cmd_end_render_pass(&self, command_buffer: CommandBufferHandle) {
        self.state().record(command_buffer, Command::EndRenderPass);
    }

    fn cmd_bind_pipeline(&self, command_buffer: CommandBufferHandle, pipeline: PipelineHandle) {
        self.state()
            .record(command_buffer, Command::BindPipeline(pipeline));
    }

    fn cmd_bind_descriptor_set(
        &self,
        command_buffer: CommandBufferHandle,
        layout: PipelineLayoutHandle,
        set: u32,
        descriptor_set: DescriptorSetHandle,
    ) {
        self.state().record(
            command_buffer,
            Command::BindDescriptorSet {
                layout,
                set,
                descriptor_set,
            },
        );
    }

    fn cmd_push_constants(
        &self,
        command_buffer: CommandBufferHandle,
        _layout: PipelineLayoutHandle,
        stages: ShaderStages,
        offset: u32,
        data: &[u8],
    ) {
        self.state().record(
            command_buffer,
            Command::PushConstants {
                stages,
                offset,
                data: data.to_vec(),
            },
        );
    }

    fn cmd_bind_vertex_buffer(&self, command_buffer: CommandBufferHandle, binding: BufferBinding) {
        self.state()
            .record(command_buffer, Command::BindVertexBuffer(binding));
    }

    fn cmd_bind_index_buffer(&self, command_buffer: CommandBufferHandle, binding: BufferBinding) {
        self.state()
            .record(command_buffer, Command::BindIndexBuffer(binding));
    }

    fn cmd_update_buffer(
        &self,
        command_buffer: CommandBufferHandle,
        buffer: BufferHandle,
        offset: u64,
        data: &[u8],
    ) {
        let mut state = self.state();
        let size = state.buffers.get(&buffer.0).copied().unwrap_or(0);
        assert!(offset + data.len() as u64 <= size, "update past the end of the buffer");
        state.record(
            command_buffer,
            Command::UpdateBuffer {
                buffer,
                offset,
                data: data.to_vec(),
            },
        );
    }

    fn cmd_pipeline_barrier(&self, command_buffer: CommandBufferHandle, barrier: &MemoryBarrier) {
        self.state()
            .record(command_buffer, Command::PipelineBarrier(*barrier));
    }

    fn cmd_draw_indexed(
        &self,
        command_buffer: CommandBufferHandle,
        index_count: u32,
        instance_count: u32,
        _first_index: u32,
        _vertex_offset: i32,
        _first_instance: u32,
    ) {
        self.state().record(
            command_buffer,
            Command::DrawIndexed {
                index_count,
                instance_count,
            },
        );
    }

    fn queue_submit(&self, queue: QueueHandle, submit: &SubmitInfo<'_>) -> DeviceResult<()> {
        let mut state = self.state();
        state.check("queue_submit")?;

        let commands = {
            let buffer = state
                .command_buffers
                .get(&submit.command_buffer.0)
                .expect("submit of unknown command buffer");
            assert!(!buffer.recording, "submit while still recording");
            buffer.commands.clone()
        };
        let fence = submit.fence.0;
        assert_eq!(
            state.fences.get(&fence),
            Some(&false),
            "submit with a fence that is unknown or still signaled"
        );

        if self.manual_fences {
            state.pending_fences.insert(fence);
        } else {
            state.fences.insert(fence, true);
        }

        state.submissions.push(Submission {
            queue,
            command_buffer: submit.command_buffer,
            commands,
            wait_semaphores: submit.wait_semaphores.to_vec(),
            wait_stages: submit.wait_stages.to_vec(),
            signal_semaphores: submit.signal_semaphores.to_vec(),
            fence: submit.fence,
        });
        Ok(())
    }

    fn queue_wait_idle(&self, _queue: QueueHandle) -> DeviceResult<()> {
        let mut state = self.state();
        state.wait_idle_calls += 1;
        state.check("queue_wait_idle")?;
        let pending: Vec<u64> = state.pending_fences.drain().collect();
        for fence in pending {
            state.fences.insert(fence, true);
        }
        Ok(())
    }
}
