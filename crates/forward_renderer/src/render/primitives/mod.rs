//! Core primitive types for rendering
//!
//! Cameras, materials and GPU-resident geometry consumed by the forward
//! technique.

pub mod camera;
pub mod material;
pub mod mesh;

pub use camera::{Camera, CameraId, CameraUniform};
pub use material::Material;
pub use mesh::{GpuBuffer, Mesh, MeshStorage, Model, SubmeshData, SubmeshRange, Vertex};
