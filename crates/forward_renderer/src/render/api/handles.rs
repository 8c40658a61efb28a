//! Opaque GPU object handles
//!
//! Backends hand these out and map them back to their native objects. A
//! handle is plain data: copying one never duplicates or extends the life of
//! the object it names.

macro_rules! gpu_handle {
    ($($(#[$meta:meta])* $name:ident;)+) => {
        $(
            $(#[$meta])*
            #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
            pub struct $name(pub u64);

            impl $name {
                /// The null handle, never returned by a successful create call
                pub const NULL: Self = Self(0);

                /// Whether this is the null handle
                pub const fn is_null(self) -> bool {
                    self.0 == 0
                }

                /// Raw backend value
                pub const fn raw(self) -> u64 {
                    self.0
                }
            }
        )+
    };
}

gpu_handle! {
    /// GPU buffer
    BufferHandle;
    /// Device memory allocation
    MemoryHandle;
    /// Image (used for depth attachments)
    ImageHandle;
    /// View onto an image, usable as a framebuffer attachment
    ImageViewHandle;
    /// Framebuffer combining color and depth attachments
    FramebufferHandle;
    /// Render pass
    RenderPassHandle;
    /// Descriptor set layout
    DescriptorSetLayoutHandle;
    /// Descriptor set bound to one buffer range
    DescriptorSetHandle;
    /// Pipeline layout
    PipelineLayoutHandle;
    /// Graphics pipeline
    PipelineHandle;
    /// GPU to CPU completion signal
    FenceHandle;
    /// GPU to GPU ordering primitive
    SemaphoreHandle;
    /// Command pool
    CommandPoolHandle;
    /// Primary command buffer
    CommandBufferHandle;
    /// Device queue
    QueueHandle;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_handle() {
        assert!(BufferHandle::NULL.is_null());
        assert!(!FenceHandle(7).is_null());
        assert_eq!(FenceHandle(7).raw(), 7);
        assert_eq!(PipelineHandle::default(), PipelineHandle::NULL);
    }
}
