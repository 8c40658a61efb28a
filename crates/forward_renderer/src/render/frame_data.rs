//! Per swapchain image state
//!
//! Each swapchain image gets its own fence, command buffer, depth attachment
//! and framebuffer, plus the list of uniform slots that went stale while the
//! image's frame was recorded. Those slots may still be read by that frame's
//! commands, so they only go back to their pools once the fence signals.

use crate::render::api::{
    CommandBufferHandle, DeviceResult, Extent2D, FenceHandle, FramebufferHandle, GraphicsDevice,
    ImageHandle, ImageViewHandle,
};
use crate::render::buffer_pool::SubBuffer;

/// Depth image and its view
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DepthAttachment {
    /// Depth image, bound into the technique's shared depth allocation
    pub image: ImageHandle,
    /// Depth aspect view
    pub view: ImageViewHandle,
}

/// Resources owned by one frame in flight
#[derive(Debug)]
pub struct FrameData {
    fence: FenceHandle,
    command_buffer: CommandBufferHandle,
    color_view: ImageViewHandle,
    extent: Extent2D,
    depth: DepthAttachment,
    framebuffer: FramebufferHandle,
    pub(crate) free_sub_buffers: Vec<SubBuffer>,
}

impl FrameData {
    /// Frame for a swapchain image, with no depth attachment or framebuffer yet
    pub fn new(
        fence: FenceHandle,
        command_buffer: CommandBufferHandle,
        color_view: ImageViewHandle,
        extent: Extent2D,
    ) -> Self {
        Self {
            fence,
            command_buffer,
            color_view,
            extent,
            depth: DepthAttachment::default(),
            framebuffer: FramebufferHandle::NULL,
            free_sub_buffers: Vec::new(),
        }
    }

    /// Fence signaled when the frame's last submission completes
    pub const fn fence(&self) -> FenceHandle {
        self.fence
    }

    /// Primary command buffer re-recorded every time the image comes around
    pub const fn command_buffer(&self) -> CommandBufferHandle {
        self.command_buffer
    }

    /// Swapchain image view rendered into
    pub const fn color_view(&self) -> ImageViewHandle {
        self.color_view
    }

    /// Attachment size
    pub const fn extent(&self) -> Extent2D {
        self.extent
    }

    /// Depth attachment
    pub const fn depth(&self) -> DepthAttachment {
        self.depth
    }

    /// Framebuffer over the color and depth views
    pub const fn framebuffer(&self) -> FramebufferHandle {
        self.framebuffer
    }

    /// Slots waiting for the fence before they can be reused
    pub fn pending_release(&self) -> &[SubBuffer] {
        &self.free_sub_buffers
    }

    pub(crate) fn set_depth(&mut self, depth: DepthAttachment) {
        self.depth = depth;
    }

    pub(crate) fn set_framebuffer(&mut self, framebuffer: FramebufferHandle) {
        self.framebuffer = framebuffer;
    }

    /// Block until the GPU is done with the previous use of this frame
    pub fn wait<D: GraphicsDevice + ?Sized>(
        &self,
        device: &D,
        timeout_ns: u64,
    ) -> DeviceResult<()> {
        device.wait_for_fence(self.fence, timeout_ns)
    }

    /// Swap the fence for a new, signaled one
    ///
    /// Used when a submission fails after the fence was reset, since nothing
    /// would ever signal it again.
    pub(crate) fn replace_fence<D: GraphicsDevice + ?Sized>(
        &mut self,
        device: &D,
    ) -> DeviceResult<()> {
        let fence = device.create_fence(true)?;
        device.destroy_fence(self.fence);
        self.fence = fence;
        Ok(())
    }

    /// Destroy the framebuffer, depth view, depth image and fence
    ///
    /// The command buffer goes with its pool and the depth memory with the
    /// technique. Pending slots are dropped; their pools are torn down right
    /// after. Calling this twice is harmless.
    pub fn destroy<D: GraphicsDevice + ?Sized>(&mut self, device: &D) {
        device.destroy_framebuffer(self.framebuffer);
        device.destroy_image_view(self.depth.view);
        device.destroy_image(self.depth.image);
        device.destroy_fence(self.fence);

        self.framebuffer = FramebufferHandle::NULL;
        self.depth = DepthAttachment::default();
        self.fence = FenceHandle::NULL;
        self.command_buffer = CommandBufferHandle::NULL;
        self.free_sub_buffers.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::api::Format;
    use crate::render::backends::mock::MockDevice;

    #[test]
    fn test_destroy_releases_owned_objects_once() {
        let device = MockDevice::new();
        let extent = Extent2D::new(64, 64);
        let fence = device.create_fence(true).unwrap();
        let mut frame = FrameData::new(fence, CommandBufferHandle(9), ImageViewHandle(5), extent);

        let image = device.create_depth_image(extent, Format::D32Sfloat).unwrap();
        let view = device.create_image_view(image, Format::D32Sfloat).unwrap();
        frame.set_depth(DepthAttachment { image, view });
        assert!(frame.wait(&device, 0).is_ok());

        frame.destroy(&device);
        frame.destroy(&device);
        assert_eq!(device.live_fences(), 0);
        assert_eq!(device.live_images(), 0);
        assert_eq!(device.live_image_views(), 0);
        assert!(frame.fence().is_null());
    }
}
