//! Render queue for one frame
//!
//! Collects the lights and mesh instances found by scene traversal, in
//! traversal order. Both sequences are allocated once at construction and
//! only ever cleared afterwards, so filling the queue never touches the
//! allocator on the frame path.

use crate::render::lighting::LightId;
use crate::scene::NodeId;

/// Visible lights and mesh instances for one frame
#[derive(Debug)]
pub struct RenderQueue {
    lights: Vec<LightId>,
    meshes: Vec<NodeId>,
    capacity: usize,
}

impl RenderQueue {
    /// Default per-sequence capacity
    pub const DEFAULT_CAPACITY: usize = 4000;

    /// Create a queue holding up to `capacity` lights and `capacity` mesh instances
    pub fn new(capacity: usize) -> Self {
        Self {
            lights: Vec::with_capacity(capacity),
            meshes: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Drop every entry, keeping the storage
    pub fn clear(&mut self) {
        self.lights.clear();
        self.meshes.clear();
    }

    /// Append a visible light
    ///
    /// # Panics
    ///
    /// The capacity is a hard ceiling: panics when the light sequence is full.
    pub fn add_light(&mut self, light: LightId) {
        assert!(
            self.lights.len() < self.capacity,
            "render queue light capacity ({}) exceeded",
            self.capacity
        );
        self.lights.push(light);
    }

    /// Append a node carrying a mesh instance
    ///
    /// # Panics
    ///
    /// The capacity is a hard ceiling: panics when the mesh sequence is full.
    pub fn add_mesh_instance(&mut self, node: NodeId) {
        assert!(
            self.meshes.len() < self.capacity,
            "render queue mesh capacity ({}) exceeded",
            self.capacity
        );
        self.meshes.push(node);
    }

    /// Lights in insertion order
    pub fn lights(&self) -> &[LightId] {
        &self.lights
    }

    /// Mesh-carrying nodes in insertion order
    pub fn mesh_instances(&self) -> &[NodeId] {
        &self.meshes
    }

    /// Per-sequence capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Whether both sequences are empty
    pub fn is_empty(&self) -> bool {
        self.lights.is_empty() && self.meshes.is_empty()
    }
}

impl Default for RenderQueue {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::SlotMap;

    fn ids(count: usize) -> (Vec<LightId>, Vec<NodeId>) {
        let mut lights = SlotMap::<LightId, ()>::with_key();
        let mut nodes = SlotMap::<NodeId, ()>::with_key();
        (
            (0..count).map(|_| lights.insert(())).collect(),
            (0..count).map(|_| nodes.insert(())).collect(),
        )
    }

    #[test]
    fn test_fill_to_capacity_never_reallocates() {
        let (lights, nodes) = ids(16);
        let mut queue = RenderQueue::new(16);
        let light_ptr = queue.lights.as_ptr();
        let mesh_ptr = queue.meshes.as_ptr();

        for frame in 0..3 {
            queue.clear();
            assert!(queue.is_empty());
            for (light, node) in lights.iter().zip(&nodes) {
                queue.add_light(*light);
                queue.add_mesh_instance(*node);
            }
            assert_eq!(queue.lights().len(), 16, "frame {frame}");
            assert_eq!(queue.lights.as_ptr(), light_ptr);
            assert_eq!(queue.meshes.as_ptr(), mesh_ptr);
            assert!(queue.lights.capacity() >= queue.capacity());
        }
    }

    #[test]
    fn test_insertion_order_is_kept() {
        let (lights, nodes) = ids(3);
        let mut queue = RenderQueue::new(3);
        for light in lights.iter().rev() {
            queue.add_light(*light);
        }
        for node in &nodes {
            queue.add_mesh_instance(*node);
        }

        assert_eq!(queue.lights(), &[lights[2], lights[1], lights[0]]);
        assert_eq!(queue.mesh_instances(), nodes.as_slice());
    }

    #[test]
    #[should_panic(expected = "light capacity")]
    fn test_light_overflow_panics() {
        let (lights, _) = ids(3);
        let mut queue = RenderQueue::new(2);
        for light in lights {
            queue.add_light(light);
        }
    }

    #[test]
    #[should_panic(expected = "mesh capacity")]
    fn test_mesh_overflow_panics() {
        let (_, nodes) = ids(2);
        let mut queue = RenderQueue::new(1);
        for node in nodes {
            queue.add_mesh_instance(node);
        }
    }
}
