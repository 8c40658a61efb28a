//! Plain descriptions passed across the device seam

use std::path::Path;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use super::handles::{
    BufferHandle, CommandBufferHandle, DescriptorSetLayoutHandle, FenceHandle, FramebufferHandle,
    PipelineLayoutHandle, QueueHandle, RenderPassHandle, SemaphoreHandle,
};

/// Image formats the renderer deals with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Format {
    /// 8-bit BGRA, linear
    B8G8R8A8Unorm,
    /// 8-bit BGRA, sRGB
    B8G8R8A8Srgb,
    /// 8-bit RGBA, linear
    R8G8B8A8Unorm,
    /// 8-bit RGBA, sRGB
    R8G8B8A8Srgb,
    /// 32-bit float depth
    D32Sfloat,
    /// 32-bit float depth with 8-bit stencil
    D32SfloatS8Uint,
    /// 24-bit normalized depth with 8-bit stencil
    D24UnormS8Uint,
    /// 16-bit normalized depth
    D16Unorm,
}

impl Format {
    /// Whether the format carries depth
    pub const fn is_depth(self) -> bool {
        matches!(
            self,
            Self::D32Sfloat | Self::D32SfloatS8Uint | Self::D24UnormS8Uint | Self::D16Unorm
        )
    }
}

/// Width and height in pixels
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Extent2D {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

impl Extent2D {
    /// New extent
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// Signed pixel offset
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Offset2D {
    /// Horizontal offset
    pub x: i32,
    /// Vertical offset
    pub y: i32,
}

/// Pixel rectangle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect2D {
    /// Top-left corner
    pub offset: Offset2D,
    /// Size
    pub extent: Extent2D,
}

impl Rect2D {
    /// Rectangle anchored at the origin
    pub const fn from_extent(extent: Extent2D) -> Self {
        Self {
            offset: Offset2D { x: 0, y: 0 },
            extent,
        }
    }
}

/// Viewport transform
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    /// Left edge
    pub x: f32,
    /// Top edge
    pub y: f32,
    /// Width
    pub width: f32,
    /// Height
    pub height: f32,
    /// Depth mapped to the near plane
    pub min_depth: f32,
    /// Depth mapped to the far plane
    pub max_depth: f32,
}

impl Viewport {
    /// Full-depth viewport covering `extent`
    pub fn from_extent(extent: Extent2D) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        }
    }

    /// Integer rectangle covered by the viewport
    pub fn rect(&self) -> Rect2D {
        Rect2D {
            offset: Offset2D {
                x: self.x as i32,
                y: self.y as i32,
            },
            extent: Extent2D {
                width: self.width as u32,
                height: self.height as u32,
            },
        }
    }
}

bitflags! {
    /// How a buffer will be used
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BufferUsage: u32 {
        /// Uniform buffer reads
        const UNIFORM = 1 << 0;
        /// Vertex input
        const VERTEX = 1 << 1;
        /// Index input
        const INDEX = 1 << 2;
        /// Destination of transfer commands (including in-stream updates)
        const TRANSFER_DST = 1 << 3;
    }
}

bitflags! {
    /// Shader stages a binding or push constant range is visible to
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ShaderStages: u32 {
        /// Vertex stage
        const VERTEX = 1 << 0;
        /// Fragment stage
        const FRAGMENT = 1 << 1;
    }
}

bitflags! {
    /// Pipeline stages used for barriers and semaphore waits
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PipelineStages: u32 {
        /// Transfer operations
        const TRANSFER = 1 << 0;
        /// Vertex shading
        const VERTEX_SHADER = 1 << 1;
        /// Fragment shading
        const FRAGMENT_SHADER = 1 << 2;
        /// Color attachment writes
        const COLOR_ATTACHMENT_OUTPUT = 1 << 3;
    }
}

bitflags! {
    /// Memory access kinds used by barriers
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct AccessFlags: u32 {
        /// Writes by transfer commands
        const TRANSFER_WRITE = 1 << 0;
        /// Uniform buffer reads
        const UNIFORM_READ = 1 << 1;
    }
}

/// Where an allocation lives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryLocation {
    /// GPU-only memory
    DeviceLocal,
    /// CPU-writable, coherent memory
    HostVisible,
}

/// Queue capability to look a family up by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueKind {
    /// Graphics-capable queue
    Graphics,
}

/// A queue family and the queue the renderer submits to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFamily {
    /// Family index
    pub index: u32,
    /// Queue handle within the family
    pub queue: QueueHandle,
}

/// Buffer creation parameters
#[derive(Debug, Clone, Copy)]
pub struct BufferDesc<'a> {
    /// Size in bytes
    pub size: u64,
    /// Intended usage
    pub usage: BufferUsage,
    /// Queue families sharing the buffer; one family means exclusive ownership
    pub queue_families: &'a [u32],
}

/// Render pass with one color and one depth attachment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderPassDesc {
    /// Swapchain color format
    pub color_format: Format,
    /// Depth attachment format
    pub depth_format: Format,
}

/// Pipeline layout parameters
#[derive(Debug, Clone, Copy)]
pub struct PipelineLayoutDesc<'a> {
    /// Descriptor set layouts, in set order
    pub set_layouts: &'a [DescriptorSetLayoutHandle],
    /// Size of the push constant block in bytes
    pub push_constant_size: u32,
    /// Stages the push constants are visible to
    pub push_constant_stages: ShaderStages,
}

/// Graphics pipeline parameters
///
/// Every pipeline the forward technique builds uses constant-color additive
/// blending (`src * 1 + dst * blendConstant`) with the blend constants,
/// viewport and scissor left dynamic.
#[derive(Debug, Clone, Copy)]
pub struct GraphicsPipelineDesc<'a> {
    /// Pipeline layout
    pub layout: PipelineLayoutHandle,
    /// Render pass the pipeline is compatible with
    pub render_pass: RenderPassHandle,
    /// SPIR-V vertex shader
    pub vertex_shader: &'a Path,
    /// SPIR-V fragment shader
    pub fragment_shader: &'a Path,
}

/// Parameters of `begin_render_pass`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderPassBegin {
    /// Render pass
    pub render_pass: RenderPassHandle,
    /// Target framebuffer
    pub framebuffer: FramebufferHandle,
    /// Area affected by the pass
    pub render_area: Rect2D,
    /// Color attachment clear value
    pub clear_color: [f32; 4],
    /// Depth attachment clear value
    pub clear_depth: f32,
}

/// Global memory barrier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryBarrier {
    /// Stages that must complete first
    pub src_stages: PipelineStages,
    /// Stages that wait
    pub dst_stages: PipelineStages,
    /// Accesses made available
    pub src_access: AccessFlags,
    /// Accesses made visible
    pub dst_access: AccessFlags,
}

impl MemoryBarrier {
    /// Makes in-stream buffer updates visible to shader uniform reads
    pub const fn uniform_upload() -> Self {
        Self {
            src_stages: PipelineStages::TRANSFER,
            dst_stages: PipelineStages::from_bits_retain(
                PipelineStages::VERTEX_SHADER.bits() | PipelineStages::FRAGMENT_SHADER.bits(),
            ),
            src_access: AccessFlags::TRANSFER_WRITE,
            dst_access: AccessFlags::UNIFORM_READ,
        }
    }
}

/// One queue submission
#[derive(Debug, Clone, Copy)]
pub struct SubmitInfo<'a> {
    /// Command buffer to execute
    pub command_buffer: CommandBufferHandle,
    /// Semaphores waited on before execution
    pub wait_semaphores: &'a [SemaphoreHandle],
    /// Stage at which each wait applies
    pub wait_stages: &'a [PipelineStages],
    /// Semaphores signaled on completion
    pub signal_semaphores: &'a [SemaphoreHandle],
    /// Fence signaled on completion
    pub fence: FenceHandle,
}

/// Vertex or index buffer binding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferBinding {
    /// Buffer
    pub buffer: BufferHandle,
    /// Byte offset of the first element
    pub offset: u64,
}
