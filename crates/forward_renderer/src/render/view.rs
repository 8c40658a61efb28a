//! Render views
//!
//! A [`RenderView`] describes where a frame lands (viewport, scissor, color
//! format) and which camera it is seen through. [`ViewRenderer`] owns the
//! render queue and the forward technique for one view and runs the per-frame
//! sequence: clear the queue, sync the camera to the viewport, traverse the
//! scene, record and submit.

use std::sync::Arc;

use crate::config::ForwardConfig;
use crate::foundation::logging::RenderLogger;
use crate::render::api::{Extent2D, Format, GraphicsDevice, Rect2D, SemaphoreHandle, Viewport};
use crate::render::forward::{ForwardTechnique, SwapchainImage};
use crate::render::primitives::CameraId;
use crate::render::RenderResult;
use crate::scene::{RenderQueue, Scene};

/// Target area and camera of a rendered frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderView {
    viewport: Viewport,
    scissor: Rect2D,
    color_format: Format,
    camera: Option<CameraId>,
}

impl RenderView {
    /// View covering `extent` entirely, with no camera yet
    pub fn new(extent: Extent2D, color_format: Format) -> Self {
        Self {
            viewport: Viewport::from_extent(extent),
            scissor: Rect2D::from_extent(extent),
            color_format,
            camera: None,
        }
    }

    /// Builder-style camera
    #[must_use]
    pub fn with_camera(mut self, camera: CameraId) -> Self {
        self.camera = Some(camera);
        self
    }

    /// Viewport transform
    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    /// Scissor rectangle
    pub fn scissor(&self) -> &Rect2D {
        &self.scissor
    }

    /// Swapchain color format
    pub fn color_format(&self) -> Format {
        self.color_format
    }

    /// Camera the view is seen through
    pub fn camera(&self) -> Option<CameraId> {
        self.camera
    }

    /// Replace the camera
    pub fn set_camera(&mut self, camera: Option<CameraId>) {
        self.camera = camera;
    }

    /// Set viewport and scissor independently
    pub fn set_area(&mut self, viewport: Viewport, scissor: Rect2D) {
        self.viewport = viewport;
        self.scissor = scissor;
    }

    /// Cover `extent` entirely, e.g. after a swapchain resize
    pub fn resize(&mut self, extent: Extent2D) {
        self.set_area(Viewport::from_extent(extent), Rect2D::from_extent(extent));
    }

    /// Viewport width over height; 1 for a degenerate viewport
    pub fn aspect_ratio(&self) -> f32 {
        if self.viewport.height > 0.0 {
            self.viewport.width / self.viewport.height
        } else {
            1.0
        }
    }
}

/// Per-frame driver of one view
pub struct ViewRenderer<D: GraphicsDevice + ?Sized> {
    view: RenderView,
    queue: RenderQueue,
    technique: ForwardTechnique<D>,
    logger: RenderLogger,
}

impl<D: GraphicsDevice + ?Sized> ViewRenderer<D> {
    /// Renderer for `view`; call [`init`](Self::init) before the first frame
    pub fn new(
        device: Arc<D>,
        config: ForwardConfig,
        view: RenderView,
        logger: RenderLogger,
    ) -> Self {
        let queue = RenderQueue::new(config.render_queue_capacity);
        let technique = ForwardTechnique::new(
            device,
            config,
            view.color_format(),
            logger.with_target("forward_renderer::forward"),
        );
        Self {
            view,
            queue,
            technique,
            logger,
        }
    }

    /// Create the technique's device objects for `images`
    pub fn init(&mut self, images: &[SwapchainImage]) -> RenderResult<()> {
        self.technique.init(images)?;
        self.logger.debug(format_args!(
            "View ready: {} swapchain images",
            images.len()
        ));
        Ok(())
    }

    /// Rebuild for a new swapchain and resize the view to match
    pub fn recreate(&mut self, images: &[SwapchainImage]) -> RenderResult<()> {
        if let Some(first) = images.first() {
            self.view.resize(first.extent);
        }
        self.init(images)
    }

    /// Render `scene` into swapchain image `image_index`
    ///
    /// # Panics
    ///
    /// Panics if the scene holds more lights or mesh instances than the
    /// render queue capacity.
    pub fn render(
        &mut self,
        scene: &mut Scene,
        image_ready: SemaphoreHandle,
        draw_complete: SemaphoreHandle,
        image_index: u32,
    ) -> RenderResult<()> {
        self.queue.clear();

        if let Some(camera) = self.view.camera().and_then(|id| scene.camera_mut(id)) {
            camera.set_aspect_ratio(self.view.aspect_ratio());
        }
        scene.fetch_visible_objects(&mut self.queue);

        self.logger.trace(format_args!(
            "Frame {image_index}: {} lights, {} mesh instances",
            self.queue.lights().len(),
            self.queue.mesh_instances().len()
        ));

        self.technique.render(
            &self.view,
            scene,
            &self.queue,
            image_ready,
            draw_complete,
            image_index,
        )
    }

    /// Destroy the technique's device objects
    pub fn destroy(&mut self) {
        self.technique.destroy();
    }

    /// The view
    pub fn view(&self) -> &RenderView {
        &self.view
    }

    /// The view, for camera or area changes
    pub fn view_mut(&mut self) -> &mut RenderView {
        &mut self.view
    }

    /// Queue filled by the last frame
    pub fn queue(&self) -> &RenderQueue {
        &self.queue
    }

    /// The forward technique
    pub fn technique(&self) -> &ForwardTechnique<D> {
        &self.technique
    }
}
