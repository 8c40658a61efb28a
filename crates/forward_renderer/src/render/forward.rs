//! Multi-pass forward lighting
//!
//! [`ForwardTechnique`] draws every mesh instance once per light. The first
//! light pass writes over the cleared attachment; later passes are added on
//! top through constant-color blending, the blend constant switching from
//! all zeros to all ones after the first light. One pipeline exists per
//! light type, all sharing a render pass and a pipeline layout:
//!
//! - set 0: camera uniform (view and projection)
//! - set 1: light uniform
//! - push constants: the instance's world transform, vertex stage
//!
//! # Frame flow
//!
//! 1. Wait on the frame's fence
//! 2. Return the uniform slots retired by the frame's previous use to their
//!    pools, and retire the slots of cameras and lights removed from the scene
//! 3. Reset and begin the frame's command buffer
//! 4. Remount node-attached cameras, then upload the camera and every queued
//!    light that is new or dirty
//! 5. Record one pass per light over every queued mesh instance
//! 6. Reset the fence and submit
//!
//! The fence is reset right before submission, so a frame that fails earlier
//! leaves it signaled and the next wait returns. A frame that fails after
//! step 2 drops the cache entries it touched, since their uploads never
//! reached the GPU, and waits for the queue to drain so that the slots it
//! retired can be reused safely.

use std::mem::size_of;
use std::sync::Arc;

use crate::config::ForwardConfig;
use crate::foundation::logging::RenderLogger;
use crate::foundation::math::utils;
use crate::render::api::{
    ActiveRenderPass, CommandPoolHandle, CommandRecorder, DescriptorSetLayoutHandle, DeviceError,
    DeviceResult, Extent2D, Format, GraphicsDevice, GraphicsPipelineDesc, ImageHandle,
    ImageViewHandle, MemoryBarrier, MemoryHandle, MemoryLocation, PipelineHandle,
    PipelineLayoutDesc, PipelineLayoutHandle, PipelineStages, QueueFamily, QueueHandle, QueueKind,
    RenderPassBegin, RenderPassDesc, RenderPassHandle, SemaphoreHandle, ShaderStages, SubmitInfo,
};
use crate::render::buffer_pool::{BufferPool, SubBuffer};
use crate::render::frame_data::{DepthAttachment, FrameData};
use crate::render::lighting::{Light, LightData, LightId, LightType};
use crate::render::primitives::{CameraId, CameraUniform};
use crate::render::view::RenderView;
use crate::render::{RenderError, RenderResult};
use crate::scene::{Node, NodeId, RenderQueue, Scene};

const CAMERA_POOL: &str = "camera";
const LIGHT_POOL: &str = "lights";

const CAMERA_SET: u32 = 0;
const LIGHT_SET: u32 = 1;

/// One column-major 4x4 float matrix
const PUSH_CONSTANT_SIZE: u32 = 64;

const FIRST_LIGHT_BLEND: [f32; 4] = [0.0; 4];
const ADDITIVE_BLEND: [f32; 4] = [1.0; 4];

/// A swapchain image the technique renders into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapchainImage {
    /// Color view of the image
    pub view: ImageViewHandle,
    /// Image size
    pub extent: Extent2D,
}

/// Objects shared by every light pass
#[derive(Debug, Clone, Copy, Default)]
struct LightPipelines {
    layout: PipelineLayoutHandle,
    render_pass: RenderPassHandle,
    by_type: [PipelineHandle; 3],
}

/// Camera and light uniform pools
#[derive(Debug)]
struct UniformPools {
    camera: BufferPool<CameraId>,
    lights: BufferPool<LightId>,
}

impl UniformPools {
    /// Hand every retired slot back to the pool it came from
    fn reclaim(&mut self, retired: &mut Vec<SubBuffer>) {
        for sub_buffer in retired.drain(..) {
            if sub_buffer.pool_id() == self.camera.id() {
                self.camera.free(sub_buffer);
            } else {
                self.lights.free(sub_buffer);
            }
        }
    }

    /// Retire the slots of cameras and lights no longer registered in `scene`
    fn prune(&mut self, scene: &Scene, retired: &mut Vec<SubBuffer>) {
        let cameras: Vec<CameraId> = self
            .camera
            .cached_keys()
            .copied()
            .filter(|id| scene.camera(*id).is_none())
            .collect();
        let lights: Vec<LightId> = self
            .lights
            .cached_keys()
            .copied()
            .filter(|id| scene.light(*id).is_none())
            .collect();

        for id in &cameras {
            retired.extend(self.camera.evict(id));
        }
        for id in &lights {
            retired.extend(self.lights.evict(id));
        }
    }

    /// Drop the cache entries of everything a frame uploaded or referenced
    fn evict(&mut self, camera: CameraId, lights: &[LightId], retired: &mut Vec<SubBuffer>) {
        retired.extend(self.camera.evict(&camera));
        for light in lights {
            retired.extend(self.lights.evict(light));
        }
    }

    fn destroy<D: GraphicsDevice + ?Sized>(&mut self, device: &D) {
        self.camera.destroy(device);
        self.lights.destroy(device);
    }
}

/// Forward renderer with one additive pass per light
pub struct ForwardTechnique<D: GraphicsDevice + ?Sized> {
    device: Arc<D>,
    config: ForwardConfig,
    logger: RenderLogger,
    color_format: Format,
    initialized: bool,

    queue_family: Option<QueueFamily>,
    camera_set_layout: DescriptorSetLayoutHandle,
    light_set_layout: DescriptorSetLayoutHandle,
    pipelines: LightPipelines,
    depth_format: Option<Format>,

    command_pool: CommandPoolHandle,
    frames: Vec<FrameData>,
    depth_memory: MemoryHandle,

    pools: Option<UniformPools>,
}

/// Log a failed device call once, with its native code, and convert it
fn logged<T>(logger: &RenderLogger, what: &str, result: DeviceResult<T>) -> RenderResult<T> {
    result.map_err(|e| {
        logger.error(format_args!(
            "{what} failed: {e} (native code {:?})",
            e.native_code()
        ));
        RenderError::Device(e)
    })
}

fn pool_exhausted(logger: &RenderLogger, pool: &'static str) -> RenderError {
    logger.error(format_args!("Buffer pool '{pool}' has no free slot"));
    RenderError::PoolExhausted { pool }
}

impl<D: GraphicsDevice + ?Sized> ForwardTechnique<D> {
    /// Technique rendering into swapchain images of `color_format`
    ///
    /// Nothing is created on the device until [`init`](Self::init).
    pub fn new(
        device: Arc<D>,
        config: ForwardConfig,
        color_format: Format,
        logger: RenderLogger,
    ) -> Self {
        Self {
            device,
            config,
            logger,
            color_format,
            initialized: false,
            queue_family: None,
            camera_set_layout: DescriptorSetLayoutHandle::NULL,
            light_set_layout: DescriptorSetLayoutHandle::NULL,
            pipelines: LightPipelines::default(),
            depth_format: None,
            command_pool: CommandPoolHandle::NULL,
            frames: Vec::new(),
            depth_memory: MemoryHandle::NULL,
            pools: None,
        }
    }

    /// Settings the technique was built with
    pub fn config(&self) -> &ForwardConfig {
        &self.config
    }

    /// Whether `init` succeeded and `destroy` has not run since
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Per swapchain image state
    pub fn frames(&self) -> &[FrameData] {
        &self.frames
    }

    /// Pipeline drawing passes for `light_type`
    pub fn pipeline(&self, light_type: LightType) -> PipelineHandle {
        self.pipelines.by_type[light_type.index()]
    }

    /// Layout shared by every pipeline
    pub fn pipeline_layout(&self) -> PipelineLayoutHandle {
        self.pipelines.layout
    }

    /// Render pass shared by every pipeline
    pub fn render_pass(&self) -> RenderPassHandle {
        self.pipelines.render_pass
    }

    /// Depth format picked at init
    pub fn depth_format(&self) -> Option<Format> {
        self.depth_format
    }

    /// Camera uniform pool
    pub fn camera_pool(&self) -> Option<&BufferPool<CameraId>> {
        self.pools.as_ref().map(|pools| &pools.camera)
    }

    /// Light uniform pool
    pub fn light_pool(&self) -> Option<&BufferPool<LightId>> {
        self.pools.as_ref().map(|pools| &pools.lights)
    }

    /// Create every device object the technique needs for `images`
    ///
    /// A technique that is already initialized is torn down first. On
    /// failure everything created so far is destroyed again and the
    /// technique stays uninitialized.
    pub fn init(&mut self, images: &[SwapchainImage]) -> RenderResult<()> {
        if self.initialized {
            self.destroy();
        }

        if let Err(e) = self.config.validate() {
            self.logger
                .error(format_args!("Invalid forward configuration: {e}"));
            return Err(e.into());
        }
        if images.is_empty() {
            self.logger
                .error(format_args!("Forward technique needs at least one swapchain image"));
            return Err(RenderError::NoSwapchainImages);
        }

        if let Err(e) = self.create_resources(images) {
            self.destroy();
            return Err(e);
        }

        self.initialized = true;
        self.logger.info(format_args!(
            "Initialized forward technique: {} frames, depth format {:?}",
            self.frames.len(),
            self.depth_format
        ));
        Ok(())
    }

    fn create_resources(&mut self, images: &[SwapchainImage]) -> RenderResult<()> {
        let device = Arc::clone(&self.device);
        let device = &*device;
        let logger = self.logger.clone();

        let Some(family) = device.queue_family(QueueKind::Graphics) else {
            logger.error(format_args!("Can't find a graphics queue family"));
            return Err(DeviceError::QueueNotFound.into());
        };
        self.queue_family = Some(family);

        self.camera_set_layout = logged(
            &logger,
            "Creating camera set layout",
            device.create_uniform_set_layout(0, ShaderStages::VERTEX | ShaderStages::FRAGMENT),
        )?;
        self.light_set_layout = logged(
            &logger,
            "Creating light set layout",
            device.create_uniform_set_layout(0, ShaderStages::FRAGMENT),
        )?;
        self.pipelines.layout = logged(
            &logger,
            "Creating pipeline layout",
            device.create_pipeline_layout(&PipelineLayoutDesc {
                set_layouts: &[self.camera_set_layout, self.light_set_layout],
                push_constant_size: PUSH_CONSTANT_SIZE,
                push_constant_stages: ShaderStages::VERTEX,
            }),
        )?;

        let Some(depth_format) = device.select_depth_format(&self.config.depth_formats) else {
            logger.error(format_args!(
                "None of {:?} is usable as a depth attachment",
                self.config.depth_formats
            ));
            return Err(DeviceError::NoSuitableFormat.into());
        };
        self.depth_format = Some(depth_format);

        self.pipelines.render_pass = logged(
            &logger,
            "Creating render pass",
            device.create_render_pass(&RenderPassDesc {
                color_format: self.color_format,
                depth_format,
            }),
        )?;

        let vertex_shader = self.config.shaders.vertex_path();
        for light_type in LightType::ALL {
            let fragment_shader = self.config.shaders.fragment_path(light_type);
            self.pipelines.by_type[light_type.index()] = logged(
                &logger,
                "Creating light pipeline",
                device.create_graphics_pipeline(&GraphicsPipelineDesc {
                    layout: self.pipelines.layout,
                    render_pass: self.pipelines.render_pass,
                    vertex_shader: &vertex_shader,
                    fragment_shader: &fragment_shader,
                }),
            )?;
        }

        self.command_pool = logged(
            &logger,
            "Creating command pool",
            device.create_command_pool(family.index),
        )?;
        let command_buffers = logged(
            &logger,
            "Allocating command buffers",
            device.allocate_command_buffers(self.command_pool, images.len() as u32),
        )?;
        for (image, command_buffer) in images.iter().zip(command_buffers) {
            let fence = logged(&logger, "Creating frame fence", device.create_fence(true))?;
            self.frames
                .push(FrameData::new(fence, command_buffer, image.view, image.extent));
        }

        self.pools = Some(self.create_pools(device, &logger, family.index)?);
        self.create_depth_buffers(device, &logger, depth_format)?;
        self.create_framebuffers(device, &logger)
    }

    fn create_pools(
        &self,
        device: &D,
        logger: &RenderLogger,
        queue_family_index: u32,
    ) -> RenderResult<UniformPools> {
        let frames = self.frames.len();
        let pool_logger = logger.with_target("forward_renderer::buffer_pool");

        let mut camera = BufferPool::new(
            device,
            pool_logger.clone(),
            CAMERA_POOL,
            self.config.camera_pool_capacity(frames),
            size_of::<CameraUniform>() as u64,
            &[queue_family_index],
            self.camera_set_layout,
        )?;
        let lights = match BufferPool::new(
            device,
            pool_logger,
            LIGHT_POOL,
            self.config.light_pool_capacity(frames),
            LightData::MAX_SIZE as u64,
            &[queue_family_index],
            self.light_set_layout,
        ) {
            Ok(pool) => pool,
            Err(e) => {
                camera.destroy(device);
                return Err(e);
            }
        };

        Ok(UniformPools { camera, lights })
    }

    fn create_depth_buffers(
        &mut self,
        device: &D,
        logger: &RenderLogger,
        format: Format,
    ) -> RenderResult<()> {
        for frame in &mut self.frames {
            let image = logged(
                logger,
                "Creating depth image",
                device.create_depth_image(frame.extent(), format),
            )?;
            frame.set_depth(DepthAttachment {
                image,
                view: ImageViewHandle::NULL,
            });
        }

        let images: Vec<ImageHandle> = self.frames.iter().map(|f| f.depth().image).collect();
        self.depth_memory = logged(
            logger,
            "Allocating depth memory",
            device.allocate_image_memory(&images, MemoryLocation::DeviceLocal),
        )?;

        for frame in &mut self.frames {
            let image = frame.depth().image;
            let view = logged(
                logger,
                "Creating depth view",
                device.create_image_view(image, format),
            )?;
            frame.set_depth(DepthAttachment { image, view });
        }
        Ok(())
    }

    fn create_framebuffers(&mut self, device: &D, logger: &RenderLogger) -> RenderResult<()> {
        for frame in &mut self.frames {
            let framebuffer = logged(
                logger,
                "Creating framebuffer",
                device.create_framebuffer(
                    self.pipelines.render_pass,
                    &[frame.color_view(), frame.depth().view],
                    frame.extent(),
                ),
            )?;
            frame.set_framebuffer(framebuffer);
        }
        Ok(())
    }

    /// Record and submit one frame into swapchain image `image_index`
    ///
    /// Execution waits on `image_ready` at color attachment output and
    /// signals `draw_complete` plus the frame's fence. Any error aborts the
    /// frame before submission and has already been logged.
    pub fn render(
        &mut self,
        view: &RenderView,
        scene: &mut Scene,
        queue: &RenderQueue,
        image_ready: SemaphoreHandle,
        draw_complete: SemaphoreHandle,
        image_index: u32,
    ) -> RenderResult<()> {
        if !self.initialized {
            return Err(RenderError::NotInitialized);
        }
        let (Some(family), Some(pools)) = (self.queue_family, self.pools.as_mut()) else {
            return Err(RenderError::NotInitialized);
        };

        let frame_count = self.frames.len();
        let Some(frame) = self.frames.get_mut(image_index as usize) else {
            self.logger.error(format_args!(
                "Image index {image_index} out of range ({frame_count} frames)"
            ));
            return Err(RenderError::FrameIndexOutOfRange {
                index: image_index,
                frames: frame_count,
            });
        };
        let Some(camera) = view.camera().filter(|id| scene.camera(*id).is_some()) else {
            self.logger
                .error(format_args!("View has no camera registered in the scene"));
            return Err(RenderError::UnknownCamera);
        };

        let device = &*self.device;
        let logger = &self.logger;

        logged(
            logger,
            "Waiting for frame fence",
            frame.wait(device, self.config.fence_timeout()),
        )?;
        pools.reclaim(&mut frame.free_sub_buffers);
        pools.prune(scene, &mut frame.free_sub_buffers);

        let result = record_and_submit(
            device,
            logger,
            &self.config,
            &self.pipelines,
            family.queue,
            frame,
            pools,
            view,
            scene,
            queue,
            camera,
            image_ready,
            draw_complete,
        );

        if result.is_err() {
            pools.evict(camera, queue.lights(), &mut frame.free_sub_buffers);
            if let Err(e) = device.queue_wait_idle(family.queue) {
                logger.warn(format_args!(
                    "Waiting for the queue after a failed frame failed: {e}"
                ));
            }
        }
        result
    }

    /// Wait for the GPU and destroy everything `init` created
    ///
    /// Pipelines go first, then the frames, the depth memory and the pools.
    /// Safe to call on a partially initialized or already destroyed technique.
    pub fn destroy(&mut self) {
        let Some(family) = self.queue_family.take() else {
            return;
        };
        let device = Arc::clone(&self.device);
        let device = &*device;

        if let Err(e) = device.queue_wait_idle(family.queue) {
            self.logger.warn(format_args!(
                "Waiting for the queue to idle failed: {e} (native code {:?})",
                e.native_code()
            ));
        }

        for pipeline in &mut self.pipelines.by_type {
            device.destroy_pipeline(*pipeline);
            *pipeline = PipelineHandle::NULL;
        }
        device.destroy_pipeline_layout(self.pipelines.layout);
        self.pipelines.layout = PipelineLayoutHandle::NULL;

        for frame in &mut self.frames {
            frame.destroy(device);
        }
        self.frames.clear();
        device.destroy_command_pool(self.command_pool);
        self.command_pool = CommandPoolHandle::NULL;

        device.free_memory(self.depth_memory);
        self.depth_memory = MemoryHandle::NULL;

        if let Some(mut pools) = self.pools.take() {
            pools.destroy(device);
        }

        device.destroy_descriptor_set_layout(self.camera_set_layout);
        device.destroy_descriptor_set_layout(self.light_set_layout);
        self.camera_set_layout = DescriptorSetLayoutHandle::NULL;
        self.light_set_layout = DescriptorSetLayoutHandle::NULL;
        device.destroy_render_pass(self.pipelines.render_pass);
        self.pipelines.render_pass = RenderPassHandle::NULL;
        self.depth_format = None;

        self.initialized = false;
        self.logger
            .info(format_args!("Destroyed forward technique"));
    }
}

impl<D: GraphicsDevice + ?Sized> Drop for ForwardTechnique<D> {
    fn drop(&mut self) {
        self.destroy();
    }
}

/// Steps 3 to 6 of the frame flow
fn record_and_submit<D: GraphicsDevice + ?Sized>(
    device: &D,
    logger: &RenderLogger,
    config: &ForwardConfig,
    pipelines: &LightPipelines,
    submit_queue: QueueHandle,
    frame: &mut FrameData,
    pools: &mut UniformPools,
    view: &RenderView,
    scene: &mut Scene,
    queue: &RenderQueue,
    camera_id: CameraId,
    image_ready: SemaphoreHandle,
    draw_complete: SemaphoreHandle,
) -> RenderResult<()> {
    let mut recorder = CommandRecorder::new(device, frame.command_buffer());
    logged(logger, "Beginning command buffer", recorder.reset_and_begin())?;
    recorder.set_viewport(view.viewport());
    recorder.set_scissor(view.scissor());

    let mut uploaded = false;

    scene.update_camera_mounts();
    let camera_set = {
        let camera = scene
            .camera_mut(camera_id)
            .ok_or(RenderError::UnknownCamera)?;
        let (slot, fresh) = pools
            .camera
            .acquire(camera_id, camera.is_dirty(), &mut frame.free_sub_buffers)
            .ok_or_else(|| pool_exhausted(logger, CAMERA_POOL))?;
        if fresh {
            recorder.update_buffer(
                slot.buffer(),
                slot.offset(),
                bytemuck::bytes_of(&camera.uniform()),
            );
            uploaded = true;
        }
        camera.clear_dirty();
        slot.descriptor_set()
    };

    for &light_id in queue.lights() {
        let Some(light) = scene.light_mut(light_id) else {
            continue;
        };
        let (slot, fresh) = pools
            .lights
            .acquire(light_id, light.is_dirty(), &mut frame.free_sub_buffers)
            .ok_or_else(|| pool_exhausted(logger, LIGHT_POOL))?;
        if fresh {
            recorder.update_buffer(slot.buffer(), slot.offset(), light.data().as_bytes());
            uploaded = true;
        }
        light.clear_dirty();
    }

    if uploaded {
        recorder.pipeline_barrier(&MemoryBarrier::uniform_upload());
    }

    {
        let mut pass = recorder.begin_render_pass(&RenderPassBegin {
            render_pass: pipelines.render_pass,
            framebuffer: frame.framebuffer(),
            render_area: view.viewport().rect(),
            clear_color: config.clear_color,
            clear_depth: config.clear_depth,
        });
        pass.bind_descriptor_set(pipelines.layout, CAMERA_SET, camera_set);
        pass.set_blend_constants(&FIRST_LIGHT_BLEND);

        let mut passes = 0usize;
        for &light_id in queue.lights() {
            let Some(light_type) = scene.light(light_id).map(Light::light_type) else {
                continue;
            };
            let Some(light_set) = pools.lights.cached(&light_id).map(SubBuffer::descriptor_set)
            else {
                continue;
            };

            if passes == 1 {
                pass.set_blend_constants(&ADDITIVE_BLEND);
            }
            passes += 1;

            pass.bind_pipeline(pipelines.by_type[light_type.index()]);
            pass.bind_descriptor_set(pipelines.layout, LIGHT_SET, light_set);
            for &node in queue.mesh_instances() {
                draw_mesh_instance(&mut pass, scene, pipelines.layout, node);
            }
        }
    }

    let command_buffer = logged(logger, "Ending command buffer", recorder.end())?;

    let submitted = device.reset_fence(frame.fence()).and_then(|()| {
        device.queue_submit(
            submit_queue,
            &SubmitInfo {
                command_buffer,
                wait_semaphores: &[image_ready],
                wait_stages: &[PipelineStages::COLOR_ATTACHMENT_OUTPUT],
                signal_semaphores: &[draw_complete],
                fence: frame.fence(),
            },
        )
    });
    if submitted.is_err() {
        // Nothing will signal the reset fence; start over with a signaled one
        if let Err(e) = frame.replace_fence(device) {
            logger.error(format_args!("Recreating frame fence failed: {e}"));
        }
    }
    logged(logger, "Submitting frame", submitted)
}

fn draw_mesh_instance<D: GraphicsDevice + ?Sized>(
    pass: &mut ActiveRenderPass<'_, '_, D>,
    scene: &mut Scene,
    layout: PipelineLayoutHandle,
    node: NodeId,
) {
    let Some(world) = scene.world_transform(node) else {
        return;
    };
    let Some(instance) = scene.node(node).and_then(Node::mesh_instance) else {
        return;
    };
    let mesh = &instance.mesh;

    pass.push_constants(
        layout,
        ShaderStages::VERTEX,
        0,
        bytemuck::cast_slice(&utils::mat4_to_array(&world)),
    );
    pass.bind_vertex_buffer(mesh.vertex_binding());
    pass.bind_index_buffer(mesh.index_binding());
    pass.draw_indexed(mesh.index_count());
}
