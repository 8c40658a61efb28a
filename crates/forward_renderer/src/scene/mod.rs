//! Scene management
//!
//! The scene graph owns the node tree and the lights and cameras attached
//! to it; traversal fills a [`RenderQueue`] for the frame.

pub mod render_queue;
pub mod scene_graph;

pub use render_queue::RenderQueue;
pub use scene_graph::{MeshInstance, Node, NodeId, Scene};
