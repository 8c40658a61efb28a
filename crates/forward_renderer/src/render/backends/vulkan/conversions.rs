//! Mapping between the device seam's plain types and `ash::vk`

use ash::vk::{self, Handle};

use crate::render::api::{
    AccessFlags, BufferUsage, DeviceError, Extent2D, Format, PipelineStages, Rect2D,
    ShaderStages, Viewport,
};

/// Native handle for a seam handle
pub(super) fn to_vk<T: Handle>(raw: u64) -> T {
    T::from_raw(raw)
}

/// Seam handle value for a native handle
pub(super) fn from_vk<T: Handle>(handle: T) -> u64 {
    handle.as_raw()
}

/// Wrap a failed native call
pub(super) fn api_error(operation: &'static str) -> impl Fn(vk::Result) -> DeviceError {
    move |result| DeviceError::Api {
        operation,
        code: result.as_raw(),
    }
}

pub(super) const fn format(format: Format) -> vk::Format {
    match format {
        Format::B8G8R8A8Unorm => vk::Format::B8G8R8A8_UNORM,
        Format::B8G8R8A8Srgb => vk::Format::B8G8R8A8_SRGB,
        Format::R8G8B8A8Unorm => vk::Format::R8G8B8A8_UNORM,
        Format::R8G8B8A8Srgb => vk::Format::R8G8B8A8_SRGB,
        Format::D32Sfloat => vk::Format::D32_SFLOAT,
        Format::D32SfloatS8Uint => vk::Format::D32_SFLOAT_S8_UINT,
        Format::D24UnormS8Uint => vk::Format::D24_UNORM_S8_UINT,
        Format::D16Unorm => vk::Format::D16_UNORM,
    }
}

pub(super) const fn extent(extent: Extent2D) -> vk::Extent2D {
    vk::Extent2D {
        width: extent.width,
        height: extent.height,
    }
}

pub(super) const fn rect(rect: &Rect2D) -> vk::Rect2D {
    vk::Rect2D {
        offset: vk::Offset2D {
            x: rect.offset.x,
            y: rect.offset.y,
        },
        extent: extent(rect.extent),
    }
}

pub(super) const fn viewport(viewport: &Viewport) -> vk::Viewport {
    vk::Viewport {
        x: viewport.x,
        y: viewport.y,
        width: viewport.width,
        height: viewport.height,
        min_depth: viewport.min_depth,
        max_depth: viewport.max_depth,
    }
}

pub(super) fn buffer_usage(usage: BufferUsage) -> vk::BufferUsageFlags {
    let mut flags = vk::BufferUsageFlags::empty();
    if usage.contains(BufferUsage::UNIFORM) {
        flags |= vk::BufferUsageFlags::UNIFORM_BUFFER;
    }
    if usage.contains(BufferUsage::VERTEX) {
        flags |= vk::BufferUsageFlags::VERTEX_BUFFER;
    }
    if usage.contains(BufferUsage::INDEX) {
        flags |= vk::BufferUsageFlags::INDEX_BUFFER;
    }
    if usage.contains(BufferUsage::TRANSFER_DST) {
        flags |= vk::BufferUsageFlags::TRANSFER_DST;
    }
    flags
}

pub(super) fn shader_stages(stages: ShaderStages) -> vk::ShaderStageFlags {
    let mut flags = vk::ShaderStageFlags::empty();
    if stages.contains(ShaderStages::VERTEX) {
        flags |= vk::ShaderStageFlags::VERTEX;
    }
    if stages.contains(ShaderStages::FRAGMENT) {
        flags |= vk::ShaderStageFlags::FRAGMENT;
    }
    flags
}

pub(super) fn pipeline_stages(stages: PipelineStages) -> vk::PipelineStageFlags {
    let mut flags = vk::PipelineStageFlags::empty();
    if stages.contains(PipelineStages::TRANSFER) {
        flags |= vk::PipelineStageFlags::TRANSFER;
    }
    if stages.contains(PipelineStages::VERTEX_SHADER) {
        flags |= vk::PipelineStageFlags::VERTEX_SHADER;
    }
    if stages.contains(PipelineStages::FRAGMENT_SHADER) {
        flags |= vk::PipelineStageFlags::FRAGMENT_SHADER;
    }
    if stages.contains(PipelineStages::COLOR_ATTACHMENT_OUTPUT) {
        flags |= vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT;
    }
    // An empty mask is invalid in a barrier
    if flags.is_empty() {
        vk::PipelineStageFlags::TOP_OF_PIPE
    } else {
        flags
    }
}

pub(super) fn access_flags(access: AccessFlags) -> vk::AccessFlags {
    let mut flags = vk::AccessFlags::empty();
    if access.contains(AccessFlags::TRANSFER_WRITE) {
        flags |= vk::AccessFlags::TRANSFER_WRITE;
    }
    if access.contains(AccessFlags::UNIFORM_READ) {
        flags |= vk::AccessFlags::UNIFORM_READ;
    }
    flags
}

/// Image aspect a view over `format` should cover
pub(super) fn aspect(format: Format) -> vk::ImageAspectFlags {
    if format.is_depth() {
        vk::ImageAspectFlags::DEPTH
    } else {
        vk::ImageAspectFlags::COLOR
    }
}
