//! # Forward Renderer
//!
//! Per-frame multi-pass forward lighting for a Vulkan renderer.
//!
//! ## Features
//!
//! - **Scene graph**: node hierarchy with cached world transforms
//! - **Render queue**: fixed-capacity list of the lights and meshes to draw
//! - **Uniform pools**: per-camera and per-light uniform slots, re-uploaded
//!   only when the source changed and reused once the GPU is done with them
//! - **Forward technique**: one additive pass per light, blended through
//!   dynamic blend constants
//! - **Device seam**: every GPU call goes through [`GraphicsDevice`], with an
//!   `ash` implementation in [`render::backends::vulkan`]
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use forward_renderer::prelude::*;
//!
//! fn draw_frames(
//!     device: Arc<VulkanDevice>,
//!     images: &[SwapchainImage],
//!     sync: (SemaphoreHandle, SemaphoreHandle),
//! ) -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ForwardConfig::load("config/forward.toml")?;
//!
//!     let mut scene = Scene::new("demo");
//!     let camera = scene.add_camera(Camera::new("main"));
//!     let sun = scene.add_light(Light::directional("sun", DirectionalLight::default()));
//!     let root = scene.root();
//!     scene.attach_light(root, sun);
//!
//!     let view = RenderView::new(images[0].extent, Format::B8G8R8A8Srgb).with_camera(camera);
//!     let mut renderer =
//!         ViewRenderer::new(device, config, view, RenderLogger::global("forward_renderer"));
//!     renderer.init(images)?;
//!
//!     for image_index in 0..images.len() as u32 {
//!         renderer.render(&mut scene, sync.0, sync.1, image_index)?;
//!     }
//!     renderer.destroy();
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

pub mod config;
pub mod foundation;
pub mod render;
pub mod scene;

pub use render::api::GraphicsDevice;
pub use render::{RenderError, RenderResult};

/// Common imports for renderer users
pub mod prelude {
    pub use crate::{
        config::{Config, ForwardConfig, ForwardShaderConfig},
        foundation::{
            logging::RenderLogger,
            math::{Mat4, Quat, Transform, Vec3},
        },
        render::{
            api::{Extent2D, Format, GraphicsDevice, SemaphoreHandle},
            backends::VulkanDevice,
            lighting::{DirectionalLight, Light, LightType, PointLight, SpotLight},
            Camera, CameraId, ForwardTechnique, Material, Mesh, Model, RenderError,
            RenderResult, RenderView, SwapchainImage, Vertex, ViewRenderer,
        },
        scene::{NodeId, RenderQueue, Scene},
    };
}
