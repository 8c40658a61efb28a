//! Scene graph
//!
//! Nodes live in an arena owned by [`Scene`]. A node owns its children by
//! key and keeps its parent's key as a back-reference, so the tree has no
//! reference cycles and a subtree is torn down by walking keys.
//!
//! World transforms are memoized per node. Mutating a node's local
//! transform marks the node and its whole subtree dirty; the next
//! [`Scene::world_transform`] call on a dirty node recomputes it from the
//! parent's world transform and clears the flag.
//!
//! Cameras attached to nodes follow them: [`Scene::update_camera_mounts`]
//! pushes each carrying node's world transform into its camera, which turns
//! dirty only when that transform actually changed.

use std::sync::Arc;

use slotmap::{new_key_type, SlotMap};

use crate::foundation::math::{Mat4, Quat, Transform, Vec3};
use crate::render::lighting::{Light, LightId};
use crate::render::primitives::{Camera, CameraId, Material, Mesh};
use crate::scene::RenderQueue;

new_key_type! {
    /// Key of a node in a [`Scene`]
    pub struct NodeId;
}

/// Mesh resource plus its materials, both shared between nodes
#[derive(Debug, Clone)]
pub struct MeshInstance {
    /// Geometry
    pub mesh: Arc<Mesh>,
    /// Materials used when drawing the mesh
    pub materials: Vec<Arc<Material>>,
}

/// A scene graph node
#[derive(Debug)]
pub struct Node {
    name: String,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    transform: Transform,
    world: Mat4,
    dirty: bool,
    light: Option<LightId>,
    camera: Option<CameraId>,
    mesh_instance: Option<MeshInstance>,
}

impl Node {
    fn new(name: String, parent: Option<NodeId>) -> Self {
        Self {
            name,
            parent,
            children: Vec::new(),
            transform: Transform::identity(),
            world: Mat4::identity(),
            dirty: true,
            light: None,
            camera: None,
            mesh_instance: None,
        }
    }

    /// Node name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Parent key; `None` for the root
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Children in creation order
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// Local transform
    pub fn transform(&self) -> &Transform {
        &self.transform
    }

    /// Whether the cached world transform is stale
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Attached light
    pub fn light(&self) -> Option<LightId> {
        self.light
    }

    /// Attached camera
    pub fn camera(&self) -> Option<CameraId> {
        self.camera
    }

    /// Attached mesh instance
    pub fn mesh_instance(&self) -> Option<&MeshInstance> {
        self.mesh_instance.as_ref()
    }
}

/// Node arena plus the lights and cameras nodes refer to
#[derive(Debug)]
pub struct Scene {
    name: String,
    root: NodeId,
    nodes: SlotMap<NodeId, Node>,
    lights: SlotMap<LightId, Light>,
    cameras: SlotMap<CameraId, Camera>,
}

impl Scene {
    /// Create a scene holding only its root node
    pub fn new(name: impl Into<String>) -> Self {
        let mut nodes = SlotMap::with_key();
        let root = nodes.insert(Node::new("root".to_string(), None));
        Self {
            name: name.into(),
            root,
            nodes,
            lights: SlotMap::with_key(),
            cameras: SlotMap::with_key(),
        }
    }

    /// Scene name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Root node key
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Number of live nodes, root included
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Look a node up
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    /// Create a child of `parent`; `None` if `parent` is not in this scene
    pub fn create_child(&mut self, parent: NodeId, name: impl Into<String>) -> Option<NodeId> {
        if !self.nodes.contains_key(parent) {
            return None;
        }
        let child = self.nodes.insert(Node::new(name.into(), Some(parent)));
        self.nodes[parent].children.push(child);
        Some(child)
    }

    /// Remove a node and its whole subtree, detaching attachments
    ///
    /// Cameras carried by removed nodes are unmounted. The root cannot be
    /// removed. Returns the number of nodes removed.
    pub fn remove_node(&mut self, id: NodeId) -> usize {
        if id == self.root {
            return 0;
        }
        let Some(parent) = self.nodes.get(id).and_then(|node| node.parent) else {
            return 0;
        };
        if let Some(parent) = self.nodes.get_mut(parent) {
            parent.children.retain(|child| *child != id);
        }

        let mut removed = 0;
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if let Some(node) = self.nodes.remove(current) {
                if let Some(camera) = node.camera.and_then(|id| self.cameras.get_mut(id)) {
                    camera.set_mount(None);
                }
                stack.extend(node.children);
                removed += 1;
            }
        }
        removed
    }

    /// Depth-first search for the first node named `name`, starting at the root
    pub fn find_node(&self, name: &str) -> Option<NodeId> {
        self.find_in_subtree(self.root, name)
    }

    /// Depth-first search for `name` in the subtree rooted at `start`
    pub fn find_in_subtree(&self, start: NodeId, name: &str) -> Option<NodeId> {
        let mut stack = vec![start];
        while let Some(current) = stack.pop() {
            let node = self.nodes.get(current)?;
            if node.name == name {
                return Some(current);
            }
            stack.extend(node.children.iter().rev());
        }
        None
    }

    // --- Transforms ---

    /// Replace the local transform
    pub fn set_transform(&mut self, id: NodeId, transform: Transform) -> bool {
        self.modify_transform(id, |t| *t = transform)
    }

    /// Set the local position
    pub fn set_position(&mut self, id: NodeId, position: Vec3) -> bool {
        self.modify_transform(id, |t| t.position = position)
    }

    /// Set the local rotation
    pub fn set_rotation(&mut self, id: NodeId, rotation: Quat) -> bool {
        self.modify_transform(id, |t| t.rotation = rotation)
    }

    /// Move by `offset` in parent space
    pub fn translate(&mut self, id: NodeId, offset: Vec3) -> bool {
        self.modify_transform(id, |t| t.position += offset)
    }

    /// Apply `rotation` on top of the current local rotation
    pub fn rotate(&mut self, id: NodeId, rotation: Quat) -> bool {
        self.modify_transform(id, |t| t.rotation = rotation * t.rotation)
    }

    /// Multiply the local scale component-wise
    pub fn scale(&mut self, id: NodeId, factors: Vec3) -> bool {
        self.modify_transform(id, |t| t.scale.component_mul_assign(&factors))
    }

    fn modify_transform(&mut self, id: NodeId, apply: impl FnOnce(&mut Transform)) -> bool {
        let Some(node) = self.nodes.get_mut(id) else {
            return false;
        };
        apply(&mut node.transform);
        self.mark_dirty(id);
        true
    }

    /// Flag `id` and its subtree for world transform recomputation
    ///
    /// A clean node never has a dirty ancestor, so the walk stops at nodes
    /// that are already dirty.
    fn mark_dirty(&mut self, id: NodeId) {
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let Some(node) = self.nodes.get_mut(current) else {
                continue;
            };
            if node.dirty && current != id {
                continue;
            }
            node.dirty = true;
            stack.extend(node.children.iter().copied());
        }
    }

    /// World transform of `id`, recomputed along the dirty part of its ancestry
    pub fn world_transform(&mut self, id: NodeId) -> Option<Mat4> {
        let node = self.nodes.get(id)?;
        if !node.dirty {
            return Some(node.world);
        }

        let parent_world = match node.parent {
            Some(parent) => self.world_transform(parent)?,
            None => Mat4::identity(),
        };
        let node = self.nodes.get_mut(id)?;
        node.world = parent_world * node.transform.to_matrix();
        node.dirty = false;
        Some(node.world)
    }

    // --- Attachments ---

    /// Attach a light, returning the one it replaces
    pub fn attach_light(&mut self, id: NodeId, light: LightId) -> Option<LightId> {
        self.nodes.get_mut(id)?.light.replace(light)
    }

    /// Detach the node's light
    pub fn detach_light(&mut self, id: NodeId) -> Option<LightId> {
        self.nodes.get_mut(id)?.light.take()
    }

    /// Attach a camera, returning the one it replaces
    ///
    /// The camera follows the node's world transform from the next
    /// [`Scene::update_camera_mounts`] on. A replaced camera is unmounted.
    pub fn attach_camera(&mut self, id: NodeId, camera: CameraId) -> Option<CameraId> {
        let previous = self.nodes.get_mut(id)?.camera.replace(camera);
        if let Some(previous) = previous.filter(|previous| *previous != camera) {
            self.unmount_camera(previous);
        }
        previous
    }

    /// Detach the node's camera, which goes back to world space
    pub fn detach_camera(&mut self, id: NodeId) -> Option<CameraId> {
        let camera = self.nodes.get_mut(id)?.camera.take()?;
        self.unmount_camera(camera);
        Some(camera)
    }

    fn unmount_camera(&mut self, id: CameraId) {
        if let Some(camera) = self.cameras.get_mut(id) {
            camera.set_mount(None);
        }
    }

    /// Mount every attached camera on its node's current world transform
    pub fn update_camera_mounts(&mut self) {
        let mounted: Vec<(NodeId, CameraId)> = self
            .nodes
            .iter()
            .filter_map(|(id, node)| node.camera.map(|camera| (id, camera)))
            .collect();
        for (node, id) in mounted {
            let world = self.world_transform(node);
            if let Some(camera) = self.cameras.get_mut(id) {
                camera.set_mount(world);
            }
        }
    }

    /// Attach a mesh with an optional material, returning the instance it replaces
    pub fn attach_mesh_instance(
        &mut self,
        id: NodeId,
        mesh: Arc<Mesh>,
        material: Option<Arc<Material>>,
    ) -> Option<MeshInstance> {
        let materials = material.into_iter().collect();
        self.attach_mesh_instance_with(id, MeshInstance { mesh, materials })
    }

    /// Attach a prepared mesh instance, returning the one it replaces
    pub fn attach_mesh_instance_with(
        &mut self,
        id: NodeId,
        instance: MeshInstance,
    ) -> Option<MeshInstance> {
        self.nodes.get_mut(id)?.mesh_instance.replace(instance)
    }

    /// Detach the node's mesh instance
    pub fn detach_mesh_instance(&mut self, id: NodeId) -> Option<MeshInstance> {
        self.nodes.get_mut(id)?.mesh_instance.take()
    }

    // --- Lights and cameras ---

    /// Register a light
    pub fn add_light(&mut self, light: Light) -> LightId {
        self.lights.insert(light)
    }

    /// Look a light up
    pub fn light(&self, id: LightId) -> Option<&Light> {
        self.lights.get(id)
    }

    /// Look a light up for modification
    pub fn light_mut(&mut self, id: LightId) -> Option<&mut Light> {
        self.lights.get_mut(id)
    }

    /// Unregister a light; nodes still referring to it are skipped during traversal
    pub fn remove_light(&mut self, id: LightId) -> Option<Light> {
        self.lights.remove(id)
    }

    /// Register a camera
    pub fn add_camera(&mut self, camera: Camera) -> CameraId {
        self.cameras.insert(camera)
    }

    /// Look a camera up
    pub fn camera(&self, id: CameraId) -> Option<&Camera> {
        self.cameras.get(id)
    }

    /// Look a camera up for modification
    pub fn camera_mut(&mut self, id: CameraId) -> Option<&mut Camera> {
        self.cameras.get_mut(id)
    }

    /// Unregister a camera
    pub fn remove_camera(&mut self, id: CameraId) -> Option<Camera> {
        self.cameras.remove(id)
    }

    // --- Traversal ---

    /// Append every light and mesh instance in the tree to `queue`, depth first
    ///
    /// Nothing is culled, so neither the view nor its camera is needed here:
    /// whatever lies outside the frustum is still queued and left to the
    /// rasterizer. A culling pass would take both and go in front of the
    /// queue pushes. Children are visited in creation order.
    ///
    /// # Panics
    ///
    /// Panics if the scene holds more lights or mesh instances than `queue`
    /// can take.
    pub fn fetch_visible_objects(&self, queue: &mut RenderQueue) {
        let mut stack = vec![self.root];
        while let Some(current) = stack.pop() {
            let Some(node) = self.nodes.get(current) else {
                continue;
            };
            if let Some(light) = node.light.filter(|light| self.lights.contains_key(*light)) {
                queue.add_light(light);
            }
            if node.mesh_instance.is_some() {
                queue.add_mesh_instance(current);
            }
            stack.extend(node.children.iter().rev());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::lighting::DirectionalLight;
    use crate::render::primitives::GpuBuffer;
    use approx::assert_relative_eq;

    fn rotation_z(angle: f32) -> Quat {
        Quat::from_axis_angle(&Vec3::z_axis(), angle)
    }

    #[test]
    fn test_world_transform_is_product_of_ancestors() {
        let mut scene = Scene::new("test");
        let a = scene.create_child(scene.root(), "a").unwrap();
        let b = scene.create_child(a, "b").unwrap();
        let c = scene.create_child(b, "c").unwrap();

        scene.set_position(a, Vec3::new(1.0, 0.0, 0.0));
        scene.rotate(b, rotation_z(0.5));
        scene.scale(c, Vec3::new(2.0, 1.0, 1.0));
        scene.translate(c, Vec3::new(0.0, 3.0, 0.0));

        let expected = |scene: &Scene| {
            let m = |id| scene.node(id).unwrap().transform().to_matrix();
            m(scene.root()) * m(a) * m(b) * m(c)
        };
        assert_relative_eq!(scene.world_transform(c).unwrap(), expected(&scene), epsilon = 1e-5);
        assert!(!scene.node(a).unwrap().is_dirty());

        // Mutating an ancestor after the cache was filled invalidates the subtree
        scene.translate(a, Vec3::new(0.0, 0.0, -4.0));
        assert!(scene.node(c).unwrap().is_dirty());
        assert_relative_eq!(scene.world_transform(c).unwrap(), expected(&scene), epsilon = 1e-5);

        scene.set_rotation(b, rotation_z(-1.0));
        scene.rotate(scene.root(), rotation_z(0.25));
        assert_relative_eq!(scene.world_transform(c).unwrap(), expected(&scene), epsilon = 1e-5);
        assert_relative_eq!(
            scene.world_transform(b).unwrap(),
            scene.node(scene.root()).unwrap().transform().to_matrix()
                * scene.node(a).unwrap().transform().to_matrix()
                * scene.node(b).unwrap().transform().to_matrix(),
            epsilon = 1e-5
        );
    }

    #[test]
    fn test_dirty_flag_reaches_every_descendant() {
        let mut scene = Scene::new("test");
        let a = scene.create_child(scene.root(), "a").unwrap();
        let b = scene.create_child(a, "b").unwrap();
        let b2 = scene.create_child(a, "b2").unwrap();
        let c = scene.create_child(b, "c").unwrap();
        for id in [a, b, b2, c] {
            scene.world_transform(id);
        }

        // Only b is recomputed by this call; c stays dirty from the earlier mutation
        scene.set_position(b, Vec3::new(1.0, 1.0, 1.0));
        scene.world_transform(b);
        scene.set_position(a, Vec3::new(2.0, 0.0, 0.0));

        for id in [a, b, b2, c] {
            assert!(scene.node(id).unwrap().is_dirty());
        }
        assert_relative_eq!(
            scene.world_transform(c).unwrap(),
            Mat4::new_translation(&Vec3::new(3.0, 1.0, 1.0)),
            epsilon = 1e-6
        );
    }

    #[test]
    fn test_find_and_remove_subtree() {
        let mut scene = Scene::new("test");
        let a = scene.create_child(scene.root(), "a").unwrap();
        let b = scene.create_child(a, "b").unwrap();
        scene.create_child(b, "c").unwrap();
        let d = scene.create_child(scene.root(), "d").unwrap();

        assert_eq!(scene.find_node("b"), Some(b));
        assert_eq!(scene.find_in_subtree(d, "b"), None);
        assert_eq!(scene.remove_node(a), 3);
        assert_eq!(scene.find_node("c"), None);
        assert_eq!(scene.node_count(), 2);
        assert_eq!(scene.node(scene.root()).unwrap().children(), &[d]);
        assert_eq!(scene.remove_node(scene.root()), 0);
        assert_eq!(scene.create_child(a, "orphan"), None);
    }

    #[test]
    fn test_traversal_fills_queue_in_depth_first_order() {
        let mut scene = Scene::new("test");
        let sun = scene.add_light(Light::directional("sun", DirectionalLight::default()));
        let lamp = scene.add_light(Light::directional("lamp", DirectionalLight::default()));
        let mesh = Arc::new(Mesh::standalone(
            "quad",
            GpuBuffer::default(),
            GpuBuffer::default(),
            6,
        ));

        let a = scene.create_child(scene.root(), "a").unwrap();
        let a1 = scene.create_child(a, "a1").unwrap();
        let b = scene.create_child(scene.root(), "b").unwrap();
        scene.attach_light(a1, sun);
        scene.attach_light(b, lamp);
        scene.attach_mesh_instance(a, Arc::clone(&mesh), None);
        scene.attach_mesh_instance(b, Arc::clone(&mesh), None);

        // Replacing keeps one attachment per node
        assert_eq!(scene.attach_light(b, lamp), Some(lamp));

        let mut queue = RenderQueue::new(8);
        scene.fetch_visible_objects(&mut queue);
        assert_eq!(queue.lights(), &[sun, lamp]);
        assert_eq!(queue.mesh_instances(), &[a, b]);

        scene.remove_light(sun);
        queue.clear();
        scene.fetch_visible_objects(&mut queue);
        assert_eq!(queue.lights(), &[lamp]);
    }

    #[test]
    fn test_traversal_does_not_cull() {
        let mut scene = Scene::new("test");
        let camera = scene.add_camera(Camera::new("main"));
        let mesh = Arc::new(Mesh::standalone(
            "quad",
            GpuBuffer::default(),
            GpuBuffer::default(),
            6,
        ));

        // Behind the camera and far past its far plane
        let behind = scene.create_child(scene.root(), "behind").unwrap();
        scene.set_position(behind, Vec3::new(0.0, 0.0, 50.0));
        let distant = scene.create_child(scene.root(), "distant").unwrap();
        scene.set_position(distant, Vec3::new(0.0, 0.0, -500.0));
        scene.attach_mesh_instance(behind, Arc::clone(&mesh), None);
        scene.attach_mesh_instance(distant, mesh, None);
        assert!(scene.camera(camera).unwrap().far() < 500.0);

        let mut queue = RenderQueue::new(8);
        scene.fetch_visible_objects(&mut queue);
        assert_eq!(queue.mesh_instances(), &[behind, distant]);
    }

    #[test]
    fn test_attached_camera_follows_its_node() {
        let mut scene = Scene::new("test");
        let camera = scene.add_camera(Camera::new("main"));
        let rig = scene.create_child(scene.root(), "rig").unwrap();
        let eye = scene.create_child(rig, "eye").unwrap();
        assert_eq!(scene.attach_camera(eye, camera), None);
        assert_eq!(scene.node(eye).unwrap().camera(), Some(camera));

        scene.update_camera_mounts();
        scene.camera_mut(camera).unwrap().clear_dirty();

        // Nothing moved
        scene.update_camera_mounts();
        assert!(!scene.camera(camera).unwrap().is_dirty());

        scene.translate(rig, Vec3::new(0.0, 0.0, 2.0));
        scene.update_camera_mounts();
        let mounted = scene.camera(camera).unwrap();
        assert!(mounted.is_dirty());
        assert_relative_eq!(mounted.view_matrix()[(2, 3)], -7.0, epsilon = 1e-5);

        assert_eq!(scene.detach_camera(eye), Some(camera));
        assert_eq!(scene.camera(camera).unwrap().mount(), None);

        scene.attach_camera(eye, camera);
        scene.update_camera_mounts();
        assert_eq!(scene.remove_node(rig), 2);
        assert_eq!(scene.camera(camera).unwrap().mount(), None);
        scene.update_camera_mounts();
        assert_eq!(scene.camera(camera).unwrap().mount(), None);
    }
}
