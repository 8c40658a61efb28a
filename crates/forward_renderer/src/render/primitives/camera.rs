//! Perspective camera
//!
//! View and projection matrices are computed on first use after a change
//! and cached until the next one. Independently of the cache, the camera
//! carries a dirty flag telling the renderer its uploaded copy is stale.
//!
//! A camera attached to a scene node is mounted on that node's world
//! transform: its position, target and up vector are then read in the
//! node's space.

use std::cell::Cell;

use bytemuck::{Pod, Zeroable};
use slotmap::new_key_type;

use crate::foundation::math::{utils, Mat4, Mat4Ext, Vec3};

new_key_type! {
    /// Key of a camera registered in a scene
    pub struct CameraId;
}

/// Camera matrices as laid out in the camera uniform block
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct CameraUniform {
    /// World to view space
    pub view: [f32; 16],
    /// View to clip space, Vulkan conventions included
    pub projection: [f32; 16],
}

/// 3D perspective camera
///
/// # Coordinate System
/// View space is right-handed and Y-up. The projection matrix folds in the
/// flip to Vulkan's Y-down clip space, so shaders compute
/// `projection * view * model * position` without further correction.
#[derive(Debug, Clone)]
pub struct Camera {
    name: String,
    position: Vec3,
    target: Vec3,
    up: Vec3,
    fov_degrees: f32,
    aspect: f32,
    near: f32,
    far: f32,
    mount: Option<Mat4>,
    view: Cell<Option<Mat4>>,
    projection: Cell<Option<Mat4>>,
    dirty: bool,
}

impl Camera {
    /// Default field of view, in degrees
    pub const DEFAULT_FOV: f32 = 45.0;
    /// Default near plane distance
    pub const DEFAULT_NEAR: f32 = 0.1;
    /// Default far plane distance
    pub const DEFAULT_FAR: f32 = 100.0;

    /// Camera at `(0, 0, 5)` looking at the origin with default projection parameters
    pub fn new(name: impl Into<String>) -> Self {
        Self::perspective(
            name,
            Vec3::new(0.0, 0.0, 5.0),
            Self::DEFAULT_FOV,
            1.0,
            Self::DEFAULT_NEAR,
            Self::DEFAULT_FAR,
        )
    }

    /// Perspective camera looking at the origin
    pub fn perspective(
        name: impl Into<String>,
        position: Vec3,
        fov_degrees: f32,
        aspect: f32,
        near: f32,
        far: f32,
    ) -> Self {
        Self {
            name: name.into(),
            position,
            target: Vec3::zeros(),
            up: Vec3::y(),
            fov_degrees,
            aspect,
            near,
            far,
            mount: None,
            view: Cell::new(None),
            projection: Cell::new(None),
            dirty: true,
        }
    }

    /// Camera name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Eye position, in the mount's space when mounted
    pub fn position(&self) -> Vec3 {
        self.position
    }

    /// Look-at point
    pub fn target(&self) -> Vec3 {
        self.target
    }

    /// Vertical field of view, in degrees
    pub fn fov(&self) -> f32 {
        self.fov_degrees
    }

    /// Width over height
    pub fn aspect_ratio(&self) -> f32 {
        self.aspect
    }

    /// Near plane distance
    pub fn near(&self) -> f32 {
        self.near
    }

    /// Far plane distance
    pub fn far(&self) -> f32 {
        self.far
    }

    /// Move the camera
    pub fn set_position(&mut self, position: Vec3) {
        self.position = position;
        self.invalidate_view();
    }

    /// Point the camera at `target`
    pub fn set_target(&mut self, target: Vec3) {
        self.target = target;
        self.invalidate_view();
    }

    /// Point the camera at `target` with a custom up vector
    pub fn look_at(&mut self, target: Vec3, up: Vec3) {
        self.target = target;
        self.up = up;
        self.invalidate_view();
    }

    /// Set the vertical field of view, in degrees
    pub fn set_fov(&mut self, fov_degrees: f32) {
        self.fov_degrees = fov_degrees;
        self.invalidate_projection();
    }

    /// Set the aspect ratio; unchanged values leave the camera clean
    pub fn set_aspect_ratio(&mut self, aspect: f32) {
        if (self.aspect - aspect).abs() > f32::EPSILON {
            self.aspect = aspect;
            self.invalidate_projection();
        }
    }

    /// Set the near plane distance
    pub fn set_near(&mut self, near: f32) {
        self.near = near;
        self.invalidate_projection();
    }

    /// Set the far plane distance
    pub fn set_far(&mut self, far: f32) {
        self.far = far;
        self.invalidate_projection();
    }

    /// World transform of the node carrying the camera
    pub fn mount(&self) -> Option<Mat4> {
        self.mount
    }

    /// Mount the camera on a node's world transform, or unmount it with `None`
    ///
    /// Setting the transform it already has leaves the camera clean.
    pub fn set_mount(&mut self, mount: Option<Mat4>) {
        if self.mount != mount {
            self.mount = mount;
            self.invalidate_view();
        }
    }

    fn invalidate_view(&mut self) {
        self.view.set(None);
        self.dirty = true;
    }

    fn invalidate_projection(&mut self) {
        self.projection.set(None);
        self.dirty = true;
    }

    /// World to view space
    pub fn view_matrix(&self) -> Mat4 {
        if let Some(view) = self.view.get() {
            return view;
        }
        let mut view = Mat4::look_at(self.position, self.target, self.up);
        if let Some(inverse) = self.mount.and_then(|mount| mount.try_inverse()) {
            view *= inverse;
        }
        self.view.set(Some(view));
        view
    }

    /// View to Vulkan clip space
    pub fn projection_matrix(&self) -> Mat4 {
        if let Some(projection) = self.projection.get() {
            return projection;
        }
        let projection = Mat4::perspective(
            utils::deg_to_rad(self.fov_degrees),
            self.aspect,
            self.near,
            self.far,
        ) * Mat4::vulkan_coordinate_transform();
        self.projection.set(Some(projection));
        projection
    }

    /// `projection * view`
    pub fn view_projection_matrix(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }

    /// Uniform block contents
    pub fn uniform(&self) -> CameraUniform {
        CameraUniform {
            view: utils::mat4_to_array(&self.view_matrix()),
            projection: utils::mat4_to_array(&self.projection_matrix()),
        }
    }

    /// Whether the uploaded copy is stale
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Mark the uploaded copy as current
    pub fn clear_dirty(&mut self) {
        self.dirty = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::Vec4;
    use approx::assert_relative_eq;

    #[test]
    fn test_defaults() {
        let camera = Camera::new("main");
        assert_relative_eq!(camera.fov(), 45.0);
        assert_relative_eq!(camera.near(), 0.1);
        assert_relative_eq!(camera.far(), 100.0);
        assert!(camera.is_dirty());
        assert_eq!(std::mem::size_of::<CameraUniform>(), 128);
    }

    #[test]
    fn test_matrices_are_cached_until_inputs_change() {
        let mut camera = Camera::new("main");
        let view = camera.view_matrix();
        assert_eq!(camera.view.get(), Some(view));

        camera.clear_dirty();
        camera.set_position(Vec3::new(0.0, 1.0, 5.0));
        assert!(camera.is_dirty());
        assert_eq!(camera.view.get(), None);
        assert!(camera.projection.get().is_none());
        assert_ne!(camera.view_matrix(), view);
    }

    #[test]
    fn test_same_aspect_keeps_camera_clean() {
        let mut camera = Camera::new("main");
        camera.clear_dirty();
        camera.set_aspect_ratio(1.0);
        assert!(!camera.is_dirty());
        camera.set_aspect_ratio(16.0 / 9.0);
        assert!(camera.is_dirty());
    }

    #[test]
    fn test_target_projects_to_screen_center() {
        let camera = Camera::perspective("main", Vec3::new(0.0, 0.0, 5.0), 60.0, 1.5, 0.1, 100.0);
        let clip = camera.view_projection_matrix() * Vec4::new(0.0, 0.0, 0.0, 1.0);
        assert_relative_eq!(clip.x / clip.w, 0.0, epsilon = 1e-6);
        assert_relative_eq!(clip.y / clip.w, 0.0, epsilon = 1e-6);
        assert!(clip.z / clip.w > 0.0 && clip.z / clip.w < 1.0);
    }

    #[test]
    fn test_mount_moves_the_eye() {
        let mut camera = Camera::new("main");
        camera.view_matrix();
        camera.clear_dirty();

        camera.set_mount(Some(Mat4::new_translation(&Vec3::new(1.0, 0.0, 2.0))));
        assert!(camera.is_dirty());
        let eye = camera.view_matrix() * Vec4::new(1.0, 0.0, 7.0, 1.0);
        assert_relative_eq!(eye, Vec4::new(0.0, 0.0, 0.0, 1.0), epsilon = 1e-5);

        camera.clear_dirty();
        camera.set_mount(camera.mount());
        assert!(!camera.is_dirty());

        camera.set_mount(None);
        assert!(camera.is_dirty());
        assert_relative_eq!(camera.view_matrix()[(2, 3)], -5.0, epsilon = 1e-6);
    }

    #[test]
    fn test_uniform_is_column_major() {
        let camera = Camera::new("main");
        let uniform = camera.uniform();
        let view = camera.view_matrix();
        assert_relative_eq!(uniform.view[12], view[(0, 3)]);
        assert_relative_eq!(uniform.view[14], view[(2, 3)]);
    }
}
