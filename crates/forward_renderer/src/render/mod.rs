//! # Rendering System
//!
//! The per-frame forward rendering pipeline and the GPU seam it runs on.
//!
//! ## Architecture
//!
//! - **API**: the [`GraphicsDevice`](api::GraphicsDevice) trait and typed
//!   command recording every other module goes through
//! - **Buffer pools**: fixed-capacity uniform slots with dirty tracking and
//!   fence-deferred reuse
//! - **Frame data**: one fence, command buffer, framebuffer and depth
//!   attachment per swapchain image
//! - **Forward technique**: multi-pass additive lighting, one pass per light
//! - **View renderer**: per-frame glue from scene traversal to submission
//! - **Backends**: the ash implementation of the device seam

pub mod api;
pub mod backends;
pub mod buffer_pool;
pub mod forward;
pub mod frame_data;
pub mod lighting;
pub mod primitives;
pub mod view;

pub use buffer_pool::{BufferPool, SubBuffer};
pub use forward::{ForwardTechnique, SwapchainImage};
pub use frame_data::{DepthAttachment, FrameData};
pub use lighting::{Light, LightData, LightId, LightKind, LightType};
pub use primitives::{Camera, CameraId, Material, Mesh, Model, Vertex};
pub use view::{RenderView, ViewRenderer};

use thiserror::Error;

use crate::config::ConfigError;
use api::DeviceError;

/// Errors surfaced by the rendering core
#[derive(Error, Debug)]
pub enum RenderError {
    /// A device call failed
    #[error("Device error: {0}")]
    Device(#[from] DeviceError),

    /// A buffer pool had no free slot left
    #[error("Buffer pool '{pool}' exhausted")]
    PoolExhausted {
        /// Pool name
        pool: &'static str,
    },

    /// The technique was used before `init` or after `destroy`
    #[error("Forward technique is not initialized")]
    NotInitialized,

    /// No frame data exists for a swapchain image index
    #[error("Frame index {index} out of range ({frames} frames)")]
    FrameIndexOutOfRange {
        /// Requested image index
        index: u32,
        /// Number of frames in flight
        frames: usize,
    },

    /// `init` was given no swapchain images
    #[error("No swapchain images to render into")]
    NoSwapchainImages,

    /// The camera to render from is not registered in the scene
    #[error("Camera not found in scene")]
    UnknownCamera,

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl RenderError {
    /// Native result code, when the failure came from the graphics API
    pub const fn native_code(&self) -> Option<i32> {
        match self {
            Self::Device(e) => e.native_code(),
            _ => None,
        }
    }
}

/// Result type for rendering operations
pub type RenderResult<T> = Result<T, RenderError>;
