//! Vulkan implementation of the device seam over `ash`
//!
//! [`VulkanDevice`] wraps a logical device created by the application. It
//! owns nothing but a descriptor pool; instance, device, queues and swapchain
//! stay with the caller and must outlive it.

mod conversions;
mod memory;
mod pipeline;
mod shader;

use std::collections::HashMap;
use std::ptr;
use std::sync::{Mutex, MutexGuard, PoisonError};

use ash::{vk, Device, Instance};

use self::conversions::{
    access_flags, api_error, aspect, buffer_usage, format, from_vk, pipeline_stages, rect,
    shader_stages, to_vk, viewport,
};
use self::memory::{find_memory_type, location_flags, pack};
use crate::foundation::logging::RenderLogger;
use crate::render::api::{
    BufferBinding, BufferDesc, BufferHandle, CommandBufferHandle, CommandPoolHandle,
    DescriptorSetHandle, DescriptorSetLayoutHandle, DeviceError, DeviceResult, Extent2D,
    FenceHandle, Format, FramebufferHandle, GraphicsDevice, GraphicsPipelineDesc, ImageHandle,
    ImageViewHandle, MemoryBarrier, MemoryHandle, MemoryLocation, PipelineHandle,
    PipelineLayoutDesc, PipelineLayoutHandle, QueueFamily, QueueHandle, QueueKind, Rect2D,
    RenderPassBegin, RenderPassDesc, RenderPassHandle, ShaderStages, SubmitInfo, Viewport,
};

/// Descriptor pool and the binding each uniform set layout was created with
struct DescriptorState {
    pool: vk::DescriptorPool,
    bindings: HashMap<u64, u32>,
}

/// [`GraphicsDevice`] backed by an `ash` logical device
pub struct VulkanDevice {
    instance: Instance,
    device: Device,
    physical_device: vk::PhysicalDevice,
    memory_properties: vk::PhysicalDeviceMemoryProperties,
    uniform_alignment: u64,
    graphics: Option<QueueFamily>,
    descriptors: Mutex<DescriptorState>,
    logger: RenderLogger,
}

impl VulkanDevice {
    /// Wrap `device`
    ///
    /// `enabled_families` lists the queue families the logical device was
    /// created with; the first graphics-capable one is used for submission.
    /// Up to `max_descriptor_sets` uniform sets can be live at once.
    pub fn new(
        instance: &Instance,
        device: Device,
        physical_device: vk::PhysicalDevice,
        enabled_families: &[u32],
        max_descriptor_sets: u32,
        logger: RenderLogger,
    ) -> DeviceResult<Self> {
        let (properties, memory_properties, families) = unsafe {
            (
                instance.get_physical_device_properties(physical_device),
                instance.get_physical_device_memory_properties(physical_device),
                instance.get_physical_device_queue_family_properties(physical_device),
            )
        };

        let graphics = enabled_families
            .iter()
            .copied()
            .find(|&index| {
                families.get(index as usize).is_some_and(|family| {
                    family.queue_flags.contains(vk::QueueFlags::GRAPHICS)
                })
            })
            .map(|index| QueueFamily {
                index,
                queue: QueueHandle(from_vk(unsafe { device.get_device_queue(index, 0) })),
            });

        let pool_sizes = [vk::DescriptorPoolSize::builder()
            .ty(vk::DescriptorType::UNIFORM_BUFFER)
            .descriptor_count(max_descriptor_sets)
            .build()];
        let pool_info = vk::DescriptorPoolCreateInfo::builder()
            .flags(vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET)
            .max_sets(max_descriptor_sets)
            .pool_sizes(&pool_sizes);
        let pool = unsafe {
            device
                .create_descriptor_pool(&pool_info, None)
                .map_err(api_error("vkCreateDescriptorPool"))?
        };

        logger.info(format_args!(
            "Vulkan device ready: graphics family {:?}, {} descriptor sets",
            graphics.map(|family| family.index),
            max_descriptor_sets
        ));

        Ok(Self {
            instance: instance.clone(),
            device,
            physical_device,
            memory_properties,
            uniform_alignment: properties.limits.min_uniform_buffer_offset_alignment,
            graphics,
            descriptors: Mutex::new(DescriptorState {
                pool,
                bindings: HashMap::new(),
            }),
            logger,
        })
    }

    /// The wrapped logical device
    pub fn raw(&self) -> &Device {
        &self.device
    }

    fn descriptors(&self) -> MutexGuard<'_, DescriptorState> {
        self.descriptors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn allocate(
        &self,
        requirements: vk::MemoryRequirements,
        location: MemoryLocation,
    ) -> DeviceResult<vk::DeviceMemory> {
        let memory_type_index = find_memory_type(
            requirements.memory_type_bits,
            location_flags(location),
            &self.memory_properties,
        )?;
        let alloc_info = vk::MemoryAllocateInfo::builder()
            .allocation_size(requirements.size)
            .memory_type_index(memory_type_index);

        unsafe {
            self.device
                .allocate_memory(&alloc_info, None)
                .map_err(api_error("vkAllocateMemory"))
        }
    }
}

impl Drop for VulkanDevice {
    fn drop(&mut self) {
        let pool = self.descriptors().pool;
        unsafe {
            self.device.destroy_descriptor_pool(pool, None);
        }
        self.logger.debug(format_args!("Destroyed descriptor pool"));
    }
}

impl GraphicsDevice for VulkanDevice {
    fn queue_family(&self, kind: QueueKind) -> Option<QueueFamily> {
        match kind {
            QueueKind::Graphics => self.graphics,
        }
    }

    fn uniform_buffer_alignment(&self) -> u64 {
        self.uniform_alignment.max(1)
    }

    fn select_depth_format(&self, candidates: &[Format]) -> Option<Format> {
        candidates.iter().copied().find(|&candidate| {
            let properties = unsafe {
                self.instance
                    .get_physical_device_format_properties(self.physical_device, format(candidate))
            };
            properties
                .optimal_tiling_features
                .contains(vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT)
        })
    }

    fn create_buffer(&self, desc: &BufferDesc<'_>) -> DeviceResult<BufferHandle> {
        let sharing_mode = if desc.queue_families.len() > 1 {
            vk::SharingMode::CONCURRENT
        } else {
            vk::SharingMode::EXCLUSIVE
        };
        let mut create_info = vk::BufferCreateInfo::builder()
            .size(desc.size)
            .usage(buffer_usage(desc.usage))
            .sharing_mode(sharing_mode);
        if sharing_mode == vk::SharingMode::CONCURRENT {
            create_info = create_info.queue_family_indices(desc.queue_families);
        }

        let buffer = unsafe {
            self.device
                .create_buffer(&create_info, None)
                .map_err(api_error("vkCreateBuffer"))?
        };
        Ok(BufferHandle(from_vk(buffer)))
    }

    fn allocate_buffer_memory(
        &self,
        buffer: BufferHandle,
        location: MemoryLocation,
    ) -> DeviceResult<MemoryHandle> {
        let buffer: vk::Buffer = to_vk(buffer.raw());
        let requirements = unsafe { self.device.get_buffer_memory_requirements(buffer) };
        let memory = self.allocate(requirements, location)?;

        if let Err(e) = unsafe { self.device.bind_buffer_memory(buffer, memory, 0) } {
            unsafe { self.device.free_memory(memory, None) };
            return Err(api_error("vkBindBufferMemory")(e));
        }
        Ok(MemoryHandle(from_vk(memory)))
    }

    fn write_memory(&self, memory: MemoryHandle, offset: u64, data: &[u8]) -> DeviceResult<()> {
        if data.is_empty() {
            return Ok(());
        }
        let memory: vk::DeviceMemory = to_vk(memory.raw());

        unsafe {
            let mapped = self
                .device
                .map_memory(memory, offset, data.len() as u64, vk::MemoryMapFlags::empty())
                .map_err(api_error("vkMapMemory"))?;
            ptr::copy_nonoverlapping(data.as_ptr(), mapped.cast::<u8>(), data.len());
            self.device.unmap_memory(memory);
        }
        Ok(())
    }

    fn destroy_buffer(&self, buffer: BufferHandle) {
        unsafe { self.device.destroy_buffer(to_vk(buffer.raw()), None) };
    }

    fn free_memory(&self, memory: MemoryHandle) {
        unsafe { self.device.free_memory(to_vk(memory.raw()), None) };
    }

    fn create_depth_image(
        &self,
        size: Extent2D,
        depth_format: Format,
    ) -> DeviceResult<ImageHandle> {
        let create_info = vk::ImageCreateInfo::builder()
            .image_type(vk::ImageType::TYPE_2D)
            .format(format(depth_format))
            .extent(vk::Extent3D {
                width: size.width,
                height: size.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let image = unsafe {
            self.device
                .create_image(&create_info, None)
                .map_err(api_error("vkCreateImage"))?
        };
        Ok(ImageHandle(from_vk(image)))
    }

    fn allocate_image_memory(
        &self,
        images: &[ImageHandle],
        location: MemoryLocation,
    ) -> DeviceResult<MemoryHandle> {
        let images: Vec<vk::Image> = images.iter().map(|image| to_vk(image.raw())).collect();
        let requirements: Vec<vk::MemoryRequirements> = images
            .iter()
            .map(|&image| unsafe { self.device.get_image_memory_requirements(image) })
            .collect();
        let layout = pack(&requirements);

        let memory = self.allocate(
            vk::MemoryRequirements {
                size: layout.size,
                alignment: 1,
                memory_type_bits: layout.type_filter,
            },
            location,
        )?;

        for (&image, &offset) in images.iter().zip(&layout.offsets) {
            if let Err(e) = unsafe { self.device.bind_image_memory(image, memory, offset) } {
                unsafe { self.device.free_memory(memory, None) };
                return Err(api_error("vkBindImageMemory")(e));
            }
        }
        Ok(MemoryHandle(from_vk(memory)))
    }

    fn create_image_view(
        &self,
        image: ImageHandle,
        view_format: Format,
    ) -> DeviceResult<ImageViewHandle> {
        let create_info = vk::ImageViewCreateInfo::builder()
            .image(to_vk(image.raw()))
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format(view_format))
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: aspect(view_format),
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            });

        let view = unsafe {
            self.device
                .create_image_view(&create_info, None)
                .map_err(api_error("vkCreateImageView"))?
        };
        Ok(ImageViewHandle(from_vk(view)))
    }

    fn destroy_image(&self, image: ImageHandle) {
        unsafe { self.device.destroy_image(to_vk(image.raw()), None) };
    }

    fn destroy_image_view(&self, view: ImageViewHandle) {
        unsafe { self.device.destroy_image_view(to_vk(view.raw()), None) };
    }

    fn create_uniform_set_layout(
        &self,
        binding: u32,
        stages: ShaderStages,
    ) -> DeviceResult<DescriptorSetLayoutHandle> {
        let bindings = [vk::DescriptorSetLayoutBinding::builder()
            .binding(binding)
            .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
            .descriptor_count(1)
            .stage_flags(shader_stages(stages))
            .build()];
        let create_info = vk::DescriptorSetLayoutCreateInfo::builder().bindings(&bindings);

        let layout = unsafe {
            self.device
                .create_descriptor_set_layout(&create_info, None)
                .map_err(api_error("vkCreateDescriptorSetLayout"))?
        };
        let raw = from_vk(layout);
        self.descriptors().bindings.insert(raw, binding);
        Ok(DescriptorSetLayoutHandle(raw))
    }

    fn destroy_descriptor_set_layout(&self, layout: DescriptorSetLayoutHandle) {
        self.descriptors().bindings.remove(&layout.raw());
        unsafe {
            self.device
                .destroy_descriptor_set_layout(to_vk(layout.raw()), None);
        }
    }

    fn create_uniform_descriptor_set(
        &self,
        layout: DescriptorSetLayoutHandle,
        buffer: BufferHandle,
        offset: u64,
        range: u64,
    ) -> DeviceResult<DescriptorSetHandle> {
        let descriptors = self.descriptors();
        let binding = descriptors.bindings.get(&layout.raw()).copied().unwrap_or(0);

        let set_layouts = [to_vk(layout.raw())];
        let alloc_info = vk::DescriptorSetAllocateInfo::builder()
            .descriptor_pool(descriptors.pool)
            .set_layouts(&set_layouts);
        let set = unsafe {
            self.device
                .allocate_descriptor_sets(&alloc_info)
                .map_err(api_error("vkAllocateDescriptorSets"))?[0]
        };

        let buffer_info = [vk::DescriptorBufferInfo::builder()
            .buffer(to_vk(buffer.raw()))
            .offset(offset)
            .range(range)
            .build()];
        let writes = [vk::WriteDescriptorSet::builder()
            .dst_set(set)
            .dst_binding(binding)
            .dst_array_element(0)
            .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
            .buffer_info(&buffer_info)
            .build()];
        unsafe { self.device.update_descriptor_sets(&writes, &[]) };

        Ok(DescriptorSetHandle(from_vk(set)))
    }

    fn free_descriptor_sets(&self, sets: &[DescriptorSetHandle]) {
        let sets: Vec<vk::DescriptorSet> = sets
            .iter()
            .filter(|set| !set.is_null())
            .map(|set| to_vk(set.raw()))
            .collect();
        if sets.is_empty() {
            return;
        }

        let descriptors = self.descriptors();
        if let Err(e) = unsafe { self.device.free_descriptor_sets(descriptors.pool, &sets) } {
            self.logger.warn(format_args!(
                "Freeing {} descriptor sets failed: {e}",
                sets.len()
            ));
        }
    }

    fn create_render_pass(&self, desc: &RenderPassDesc) -> DeviceResult<RenderPassHandle> {
        pipeline::create_render_pass(&self.device, desc)
            .map(|render_pass| RenderPassHandle(from_vk(render_pass)))
    }

    fn destroy_render_pass(&self, render_pass: RenderPassHandle) {
        unsafe { self.device.destroy_render_pass(to_vk(render_pass.raw()), None) };
    }

    fn create_pipeline_layout(
        &self,
        desc: &PipelineLayoutDesc<'_>,
    ) -> DeviceResult<PipelineLayoutHandle> {
        let set_layouts: Vec<vk::DescriptorSetLayout> = desc
            .set_layouts
            .iter()
            .map(|layout| to_vk(layout.raw()))
            .collect();
        let push_constant_ranges = [vk::PushConstantRange {
            stage_flags: shader_stages(desc.push_constant_stages),
            offset: 0,
            size: desc.push_constant_size,
        }];
        let push_constants: &[vk::PushConstantRange] = if desc.push_constant_size > 0 {
            &push_constant_ranges
        } else {
            &[]
        };

        let create_info = vk::PipelineLayoutCreateInfo::builder()
            .set_layouts(&set_layouts)
            .push_constant_ranges(push_constants);

        let layout = unsafe {
            self.device
                .create_pipeline_layout(&create_info, None)
                .map_err(api_error("vkCreatePipelineLayout"))?
        };
        Ok(PipelineLayoutHandle(from_vk(layout)))
    }

    fn destroy_pipeline_layout(&self, layout: PipelineLayoutHandle) {
        unsafe { self.device.destroy_pipeline_layout(to_vk(layout.raw()), None) };
    }

    fn create_graphics_pipeline(
        &self,
        desc: &GraphicsPipelineDesc<'_>,
    ) -> DeviceResult<PipelineHandle> {
        let pipeline = pipeline::create_graphics_pipeline(&self.device, desc)?;
        self.logger.debug(format_args!(
            "Created pipeline from {} and {}",
            desc.vertex_shader.display(),
            desc.fragment_shader.display()
        ));
        Ok(PipelineHandle(from_vk(pipeline)))
    }

    fn destroy_pipeline(&self, pipeline: PipelineHandle) {
        unsafe { self.device.destroy_pipeline(to_vk(pipeline.raw()), None) };
    }

    fn create_framebuffer(
        &self,
        render_pass: RenderPassHandle,
        attachments: &[ImageViewHandle],
        size: Extent2D,
    ) -> DeviceResult<FramebufferHandle> {
        let attachments: Vec<vk::ImageView> =
            attachments.iter().map(|view| to_vk(view.raw())).collect();
        let create_info = vk::FramebufferCreateInfo::builder()
            .render_pass(to_vk(render_pass.raw()))
            .attachments(&attachments)
            .width(size.width)
            .height(size.height)
            .layers(1);

        let framebuffer = unsafe {
            self.device
                .create_framebuffer(&create_info, None)
                .map_err(api_error("vkCreateFramebuffer"))?
        };
        Ok(FramebufferHandle(from_vk(framebuffer)))
    }

    fn destroy_framebuffer(&self, framebuffer: FramebufferHandle) {
        unsafe { self.device.destroy_framebuffer(to_vk(framebuffer.raw()), None) };
    }

    fn create_fence(&self, signaled: bool) -> DeviceResult<FenceHandle> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };
        let create_info = vk::FenceCreateInfo::builder().flags(flags);

        let fence = unsafe {
            self.device
                .create_fence(&create_info, None)
                .map_err(api_error("vkCreateFence"))?
        };
        Ok(FenceHandle(from_vk(fence)))
    }

    fn wait_for_fence(&self, fence: FenceHandle, timeout_ns: u64) -> DeviceResult<()> {
        let fences = [to_vk(fence.raw())];
        match unsafe { self.device.wait_for_fences(&fences, true, timeout_ns) } {
            Ok(()) => Ok(()),
            Err(vk::Result::TIMEOUT) => Err(DeviceError::Timeout {
                operation: "vkWaitForFences",
            }),
            Err(e) => Err(api_error("vkWaitForFences")(e)),
        }
    }

    fn reset_fence(&self, fence: FenceHandle) -> DeviceResult<()> {
        let fences = [to_vk(fence.raw())];
        unsafe {
            self.device
                .reset_fences(&fences)
                .map_err(api_error("vkResetFences"))
        }
    }

    fn destroy_fence(&self, fence: FenceHandle) {
        unsafe { self.device.destroy_fence(to_vk(fence.raw()), None) };
    }

    fn create_command_pool(&self, queue_family_index: u32) -> DeviceResult<CommandPoolHandle> {
        let create_info = vk::CommandPoolCreateInfo::builder()
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
            .queue_family_index(queue_family_index);

        let pool = unsafe {
            self.device
                .create_command_pool(&create_info, None)
                .map_err(api_error("vkCreateCommandPool"))?
        };
        Ok(CommandPoolHandle(from_vk(pool)))
    }

    fn allocate_command_buffers(
        &self,
        pool: CommandPoolHandle,
        count: u32,
    ) -> DeviceResult<Vec<CommandBufferHandle>> {
        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(to_vk(pool.raw()))
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(count);

        let buffers = unsafe {
            self.device
                .allocate_command_buffers(&alloc_info)
                .map_err(api_error("vkAllocateCommandBuffers"))?
        };
        Ok(buffers
            .into_iter()
            .map(|buffer| CommandBufferHandle(from_vk(buffer)))
            .collect())
    }

    fn destroy_command_pool(&self, pool: CommandPoolHandle) {
        unsafe { self.device.destroy_command_pool(to_vk(pool.raw()), None) };
    }

    fn reset_command_buffer(&self, command_buffer: CommandBufferHandle) -> DeviceResult<()> {
        unsafe {
            self.device
                .reset_command_buffer(
                    to_vk(command_buffer.raw()),
                    vk::CommandBufferResetFlags::empty(),
                )
                .map_err(api_error("vkResetCommandBuffer"))
        }
    }

    fn begin_command_buffer(&self, command_buffer: CommandBufferHandle) -> DeviceResult<()> {
        let begin_info = vk::CommandBufferBeginInfo::builder()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        unsafe {
            self.device
                .begin_command_buffer(to_vk(command_buffer.raw()), &begin_info)
                .map_err(api_error("vkBeginCommandBuffer"))
        }
    }

    fn end_command_buffer(&self, command_buffer: CommandBufferHandle) -> DeviceResult<()> {
        unsafe {
            self.device
                .end_command_buffer(to_vk(command_buffer.raw()))
                .map_err(api_error("vkEndCommandBuffer"))
        }
    }

    fn cmd_set_viewport(&self, command_buffer: CommandBufferHandle, value: &Viewport) {
        unsafe {
            self.device
                .cmd_set_viewport(to_vk(command_buffer.raw()), 0, &[viewport(value)]);
        }
    }

    fn cmd_set_scissor(&self, command_buffer: CommandBufferHandle, scissor: &Rect2D) {
        unsafe {
            self.device
                .cmd_set_scissor(to_vk(command_buffer.raw()), 0, &[rect(scissor)]);
        }
    }

    fn cmd_set_blend_constants(&self, command_buffer: CommandBufferHandle, constants: &[f32; 4]) {
        unsafe {
            self.device
                .cmd_set_blend_constants(to_vk(command_buffer.raw()), constants);
        }
    }

    fn cmd_begin_render_pass(&self, command_buffer: CommandBufferHandle, begin: &RenderPassBegin) {
        let clear_values = [
            vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: begin.clear_color,
                },
            },
            vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth: begin.clear_depth,
                    stencil: 0,
                },
            },
        ];
        let begin_info = vk::RenderPassBeginInfo::builder()
            .render_pass(to_vk(begin.render_pass.raw()))
            .framebuffer(to_vk(begin.framebuffer.raw()))
            .render_area(rect(&begin.render_area))
            .clear_values(&clear_values);

        unsafe {
            self.device.cmd_begin_render_pass(
                to_vk(command_buffer.raw()),
                &begin_info,
                vk::SubpassContents::INLINE,
            );
        }
    }

    fn cmd_end_render_pass(&self, command_buffer: CommandBufferHandle) {
        unsafe { self.device.cmd_end_render_pass(to_vk(command_buffer.raw())) };
    }

    fn cmd_bind_pipeline(&self, command_buffer: CommandBufferHandle, pipeline: PipelineHandle) {
        unsafe {
            self.device.cmd_bind_pipeline(
                to_vk(command_buffer.raw()),
                vk::PipelineBindPoint::GRAPHICS,
                to_vk(pipeline.raw()),
            );
        }
    }

    fn cmd_bind_descriptor_set(
        &self,
        command_buffer: CommandBufferHandle,
        layout: PipelineLayoutHandle,
        set: u32,
        descriptor_set: DescriptorSetHandle,
    ) {
        unsafe {
            self.device.cmd_bind_descriptor_sets(
                to_vk(command_buffer.raw()),
                vk::PipelineBindPoint::GRAPHICS,
                to_vk(layout.raw()),
                set,
                &[to_vk(descriptor_set.raw())],
                &[],
            );
        }
    }

    fn cmd_push_constants(
        &self,
        command_buffer: CommandBufferHandle,
        layout: PipelineLayoutHandle,
        stages: ShaderStages,
        offset: u32,
        data: &[u8],
    ) {
        unsafe {
            self.device.cmd_push_constants(
                to_vk(command_buffer.raw()),
                to_vk(layout.raw()),
                shader_stages(stages),
                offset,
                data,
            );
        }
    }

    fn cmd_bind_vertex_buffer(&self, command_buffer: CommandBufferHandle, binding: BufferBinding) {
        unsafe {
            self.device.cmd_bind_vertex_buffers(
                to_vk(command_buffer.raw()),
                0,
                &[to_vk(binding.buffer.raw())],
                &[binding.offset],
            );
        }
    }

    fn cmd_bind_index_buffer(&self, command_buffer: CommandBufferHandle, binding: BufferBinding) {
        unsafe {
            self.device.cmd_bind_index_buffer(
                to_vk(command_buffer.raw()),
                to_vk(binding.buffer.raw()),
                binding.offset,
                vk::IndexType::UINT32,
            );
        }
    }

    fn cmd_update_buffer(
        &self,
        command_buffer: CommandBufferHandle,
        buffer: BufferHandle,
        offset: u64,
        data: &[u8],
    ) {
        unsafe {
            self.device.cmd_update_buffer(
                to_vk(command_buffer.raw()),
                to_vk(buffer.raw()),
                offset,
                data,
            );
        }
    }

    fn cmd_pipeline_barrier(&self, command_buffer: CommandBufferHandle, barrier: &MemoryBarrier) {
        let memory_barriers = [vk::MemoryBarrier::builder()
            .src_access_mask(access_flags(barrier.src_access))
            .dst_access_mask(access_flags(barrier.dst_access))
            .build()];
        unsafe {
            self.device.cmd_pipeline_barrier(
                to_vk(command_buffer.raw()),
                pipeline_stages(barrier.src_stages),
                pipeline_stages(barrier.dst_stages),
                vk::DependencyFlags::empty(),
                &memory_barriers,
                &[],
                &[],
            );
        }
    }

    fn cmd_draw_indexed(
        &self,
        command_buffer: CommandBufferHandle,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    ) {
        unsafe {
            self.device.cmd_draw_indexed(
                to_vk(command_buffer.raw()),
                index_count,
                instance_count,
                first_index,
                vertex_offset,
                first_instance,
            );
        }
    }

    fn queue_submit(&self, queue: QueueHandle, submit: &SubmitInfo<'_>) -> DeviceResult<()> {
        let wait_semaphores: Vec<vk::Semaphore> = submit
            .wait_semaphores
            .iter()
            .map(|semaphore| to_vk(semaphore.raw()))
            .collect();
        let wait_stages: Vec<vk::PipelineStageFlags> =
            submit.wait_stages.iter().copied().map(pipeline_stages).collect();
        let signal_semaphores: Vec<vk::Semaphore> = submit
            .signal_semaphores
            .iter()
            .map(|semaphore| to_vk(semaphore.raw()))
            .collect();
        let command_buffers = [to_vk(submit.command_buffer.raw())];

        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores)
            .build();

        unsafe {
            self.device
                .queue_submit(to_vk(queue.raw()), &[submit_info], to_vk(submit.fence.raw()))
                .map_err(api_error("vkQueueSubmit"))
        }
    }

    fn queue_wait_idle(&self, queue: QueueHandle) -> DeviceResult<()> {
        unsafe {
            self.device
                .queue_wait_idle(to_vk(queue.raw()))
                .map_err(api_error("vkQueueWaitIdle"))
        }
    }
}
