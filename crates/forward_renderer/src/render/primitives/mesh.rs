//! GPU-resident meshes and models
//!
//! A [`Mesh`] is one indexed draw. Standalone meshes own their vertex and
//! index buffers. Meshes loaded as part of a [`Model`] share the model's
//! buffers and address their range through element offsets, which become
//! byte offsets when the buffers are bound.

use std::mem::size_of;
use std::sync::Arc;

use bytemuck::{Pod, Zeroable};

use crate::render::api::{
    BufferBinding, BufferDesc, BufferHandle, BufferUsage, DeviceError, DeviceResult,
    GraphicsDevice, MemoryHandle, MemoryLocation,
};

/// Vertex layout consumed by the forward vertex shader
///
/// `#[repr(C)]` keeps the layout identical to the vertex input description:
/// position at location 0, normal at 1, texture coordinates at 2.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    /// Position in model space
    pub position: [f32; 3],

    /// Normal vector
    pub normal: [f32; 3],

    /// Texture coordinates
    pub tex_coord: [f32; 2],
}

impl Vertex {
    /// Create a new vertex
    pub const fn new(position: [f32; 3], normal: [f32; 3], tex_coord: [f32; 2]) -> Self {
        Self {
            position,
            normal,
            tex_coord,
        }
    }
}

/// Byte size of one index
pub const INDEX_SIZE: u64 = size_of::<u32>() as u64;

/// A buffer together with the memory bound to it
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GpuBuffer {
    buffer: BufferHandle,
    memory: MemoryHandle,
    size: u64,
}

impl GpuBuffer {
    /// Wrap an existing buffer and its memory
    pub const fn new(buffer: BufferHandle, memory: MemoryHandle, size: u64) -> Self {
        Self {
            buffer,
            memory,
            size,
        }
    }

    /// Create a host-visible buffer and fill it with `data`
    ///
    /// Empty `data` is rejected before anything is created.
    pub fn upload<D: GraphicsDevice + ?Sized>(
        device: &D,
        usage: BufferUsage,
        queue_families: &[u32],
        data: &[u8],
    ) -> DeviceResult<Self> {
        if data.is_empty() {
            return Err(DeviceError::EmptyBuffer);
        }
        let size = data.len() as u64;
        let buffer = device.create_buffer(&BufferDesc {
            size,
            usage,
            queue_families,
        })?;

        let memory = match device.allocate_buffer_memory(buffer, MemoryLocation::HostVisible) {
            Ok(memory) => memory,
            Err(e) => {
                device.destroy_buffer(buffer);
                return Err(e);
            }
        };

        let uploaded = Self::new(buffer, memory, size);
        if let Err(e) = device.write_memory(memory, 0, data) {
            uploaded.destroy(device);
            return Err(e);
        }
        Ok(uploaded)
    }

    /// Buffer handle
    pub const fn buffer(&self) -> BufferHandle {
        self.buffer
    }

    /// Memory handle
    pub const fn memory(&self) -> MemoryHandle {
        self.memory
    }

    /// Size in bytes
    pub const fn size(&self) -> u64 {
        self.size
    }

    /// Release the buffer and its memory
    pub fn destroy<D: GraphicsDevice + ?Sized>(self, device: &D) {
        device.destroy_buffer(self.buffer);
        device.free_memory(self.memory);
    }
}

/// Index range of one submesh inside a model's shared buffers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmeshRange {
    /// First vertex, in vertices
    pub vertices_offset: u32,
    /// First index, in indices
    pub indices_offset: u32,
    /// Number of indices
    pub index_count: u32,
}

/// CPU-side geometry of one submesh
#[derive(Debug, Clone, Copy)]
pub struct SubmeshData<'a> {
    /// Vertices
    pub vertices: &'a [Vertex],
    /// Triangle list indices, relative to `vertices`
    pub indices: &'a [u32],
}

impl SubmeshData<'_> {
    fn is_empty(&self) -> bool {
        self.vertices.is_empty() || self.indices.is_empty()
    }
}

/// Shared vertex and index buffers holding several submeshes
#[derive(Debug)]
pub struct Model {
    name: String,
    vertex_buffer: GpuBuffer,
    index_buffer: GpuBuffer,
    submeshes: Vec<SubmeshRange>,
}

impl Model {
    /// Pack `submeshes` into one vertex and one index buffer
    ///
    /// Fails with [`DeviceError::EmptyGeometry`] when the list is empty or a
    /// submesh lacks vertices or indices.
    pub fn upload<D: GraphicsDevice + ?Sized>(
        device: &D,
        name: impl Into<String>,
        queue_families: &[u32],
        submeshes: &[SubmeshData<'_>],
    ) -> DeviceResult<Arc<Self>> {
        let name = name.into();
        if submeshes.is_empty() || submeshes.iter().any(SubmeshData::is_empty) {
            return Err(DeviceError::EmptyGeometry(name));
        }

        let mut vertices = Vec::new();
        let mut indices = Vec::new();
        let mut ranges = Vec::with_capacity(submeshes.len());

        for submesh in submeshes {
            ranges.push(SubmeshRange {
                vertices_offset: vertices.len() as u32,
                indices_offset: indices.len() as u32,
                index_count: submesh.indices.len() as u32,
            });
            vertices.extend_from_slice(submesh.vertices);
            indices.extend_from_slice(submesh.indices);
        }

        let vertex_buffer = GpuBuffer::upload(
            device,
            BufferUsage::VERTEX,
            queue_families,
            bytemuck::cast_slice(&vertices),
        )?;
        let index_buffer = match GpuBuffer::upload(
            device,
            BufferUsage::INDEX,
            queue_families,
            bytemuck::cast_slice(&indices),
        ) {
            Ok(buffer) => buffer,
            Err(e) => {
                vertex_buffer.destroy(device);
                return Err(e);
            }
        };

        Ok(Arc::new(Self {
            name,
            vertex_buffer,
            index_buffer,
            submeshes: ranges,
        }))
    }

    /// Model name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Shared vertex buffer
    pub const fn vertex_buffer(&self) -> &GpuBuffer {
        &self.vertex_buffer
    }

    /// Shared index buffer
    pub const fn index_buffer(&self) -> &GpuBuffer {
        &self.index_buffer
    }

    /// Submesh ranges in upload order
    pub fn submeshes(&self) -> &[SubmeshRange] {
        &self.submeshes
    }

    /// One mesh per submesh, each referencing the shared buffers
    pub fn meshes(self: &Arc<Self>) -> Vec<Mesh> {
        self.submeshes
            .iter()
            .enumerate()
            .map(|(i, range)| Mesh {
                name: format!("{}#{i}", self.name),
                index_count: range.index_count,
                storage: MeshStorage::Shared {
                    model: Arc::clone(self),
                    vertices_offset: range.vertices_offset,
                    indices_offset: range.indices_offset,
                },
            })
            .collect()
    }

    /// Release the shared buffers
    ///
    /// Meshes created by [`Model::meshes`] hold the model alive; recover sole
    /// ownership with [`Arc::try_unwrap`] once they are gone.
    pub fn destroy<D: GraphicsDevice + ?Sized>(self, device: &D) {
        self.vertex_buffer.destroy(device);
        self.index_buffer.destroy(device);
    }
}

/// Where a mesh's geometry lives
#[derive(Debug)]
pub enum MeshStorage {
    /// The mesh owns its buffers
    Standalone {
        /// Vertex buffer
        vertex_buffer: GpuBuffer,
        /// Index buffer
        index_buffer: GpuBuffer,
    },
    /// The mesh is a range of a model's buffers
    Shared {
        /// Owning model
        model: Arc<Model>,
        /// First vertex, in vertices
        vertices_offset: u32,
        /// First index, in indices
        indices_offset: u32,
    },
}

/// One indexed draw worth of geometry
#[derive(Debug)]
pub struct Mesh {
    name: String,
    index_count: u32,
    storage: MeshStorage,
}

impl Mesh {
    /// Mesh over buffers it takes ownership of
    pub fn standalone(
        name: impl Into<String>,
        vertex_buffer: GpuBuffer,
        index_buffer: GpuBuffer,
        index_count: u32,
    ) -> Self {
        Self {
            name: name.into(),
            index_count,
            storage: MeshStorage::Standalone {
                vertex_buffer,
                index_buffer,
            },
        }
    }

    /// Upload a standalone mesh; both slices must be non-empty
    pub fn upload<D: GraphicsDevice + ?Sized>(
        device: &D,
        name: impl Into<String>,
        queue_families: &[u32],
        vertices: &[Vertex],
        indices: &[u32],
    ) -> DeviceResult<Self> {
        let name = name.into();
        if vertices.is_empty() || indices.is_empty() {
            return Err(DeviceError::EmptyGeometry(name));
        }

        let vertex_buffer = GpuBuffer::upload(
            device,
            BufferUsage::VERTEX,
            queue_families,
            bytemuck::cast_slice(vertices),
        )?;
        let index_buffer = match GpuBuffer::upload(
            device,
            BufferUsage::INDEX,
            queue_families,
            bytemuck::cast_slice(indices),
        ) {
            Ok(buffer) => buffer,
            Err(e) => {
                vertex_buffer.destroy(device);
                return Err(e);
            }
        };

        Ok(Self::standalone(
            name,
            vertex_buffer,
            index_buffer,
            indices.len() as u32,
        ))
    }

    /// Mesh name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of indices drawn
    pub const fn index_count(&self) -> u32 {
        self.index_count
    }

    /// Geometry storage
    pub const fn storage(&self) -> &MeshStorage {
        &self.storage
    }

    /// Vertex buffer and the byte offset of this mesh's first vertex
    pub fn vertex_binding(&self) -> BufferBinding {
        match &self.storage {
            MeshStorage::Standalone { vertex_buffer, .. } => BufferBinding {
                buffer: vertex_buffer.buffer(),
                offset: 0,
            },
            MeshStorage::Shared {
                model,
                vertices_offset,
                ..
            } => BufferBinding {
                buffer: model.vertex_buffer.buffer(),
                offset: u64::from(*vertices_offset) * size_of::<Vertex>() as u64,
            },
        }
    }

    /// Index buffer and the byte offset of this mesh's first index
    pub fn index_binding(&self) -> BufferBinding {
        match &self.storage {
            MeshStorage::Standalone { index_buffer, .. } => BufferBinding {
                buffer: index_buffer.buffer(),
                offset: 0,
            },
            MeshStorage::Shared {
                model,
                indices_offset,
                ..
            } => BufferBinding {
                buffer: model.index_buffer.buffer(),
                offset: u64::from(*indices_offset) * INDEX_SIZE,
            },
        }
    }

    /// Release owned buffers; shared meshes leave the model untouched
    pub fn destroy<D: GraphicsDevice + ?Sized>(self, device: &D) {
        if let MeshStorage::Standalone {
            vertex_buffer,
            index_buffer,
        } = self.storage
        {
            vertex_buffer.destroy(device);
            index_buffer.destroy(device);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::backends::mock::MockDevice;

    fn triangle() -> [Vertex; 3] {
        [
            Vertex::new([0.0, 0.5, 0.0], [0.0, 0.0, 1.0], [0.5, 0.0]),
            Vertex::new([-0.5, -0.5, 0.0], [0.0, 0.0, 1.0], [0.0, 1.0]),
            Vertex::new([0.5, -0.5, 0.0], [0.0, 0.0, 1.0], [1.0, 1.0]),
        ]
    }

    #[test]
    fn test_vertex_layout() {
        assert_eq!(size_of::<Vertex>(), 32);
    }

    #[test]
    fn test_standalone_bindings_start_at_zero() {
        let mesh = Mesh::standalone(
            "tri",
            GpuBuffer::new(BufferHandle(1), MemoryHandle(2), 96),
            GpuBuffer::new(BufferHandle(3), MemoryHandle(4), 12),
            3,
        );
        assert_eq!(mesh.vertex_binding(), BufferBinding { buffer: BufferHandle(1), offset: 0 });
        assert_eq!(mesh.index_binding(), BufferBinding { buffer: BufferHandle(3), offset: 0 });
    }

    #[test]
    fn test_model_submeshes_use_byte_offsets() {
        let device = MockDevice::new();
        let tri = triangle();
        let quad_indices = [0, 1, 2, 2, 1, 0];
        let model = Model::upload(
            &device,
            "pair",
            &[0],
            &[
                SubmeshData { vertices: &tri, indices: &[0, 1, 2] },
                SubmeshData { vertices: &tri, indices: &quad_indices },
            ],
        )
        .unwrap();

        let meshes = model.meshes();
        assert_eq!(meshes.len(), 2);
        assert_eq!(meshes[1].index_count(), 6);
        assert_eq!(meshes[1].vertex_binding().offset, 3 * 32);
        assert_eq!(meshes[1].index_binding().offset, 3 * 4);
        assert_eq!(meshes[0].vertex_binding().buffer, model.vertex_buffer().buffer());
        assert_eq!(device.buffer_contents(model.index_buffer().memory()).len(), 36);

        drop(meshes);
        Arc::try_unwrap(model).unwrap().destroy(&device);
        assert_eq!(device.live_buffers(), 0);
        assert_eq!(device.live_memory(), 0);
    }

    #[test]
    fn test_upload_writes_vertex_bytes() {
        let device = MockDevice::new();
        let tri = triangle();
        let mesh = Mesh::upload(&device, "tri", &[0], &tri, &[0, 1, 2]).unwrap();

        let MeshStorage::Standalone { vertex_buffer, .. } = mesh.storage() else {
            panic!("expected standalone storage");
        };
        assert_eq!(
            device.buffer_contents(vertex_buffer.memory()),
            bytemuck::cast_slice::<Vertex, u8>(&tri)
        );
        assert_eq!(mesh.index_count(), 3);

        mesh.destroy(&device);
        assert_eq!(device.live_buffers(), 0);
    }

    #[test]
    fn test_empty_geometry_is_rejected() {
        let device = MockDevice::new();
        let tri = triangle();

        assert!(matches!(
            Mesh::upload(&device, "no indices", &[0], &tri, &[]),
            Err(DeviceError::EmptyGeometry(name)) if name == "no indices"
        ));
        assert!(matches!(
            Mesh::upload(&device, "no vertices", &[0], &[], &[0, 1, 2]),
            Err(DeviceError::EmptyGeometry(_))
        ));
        assert!(matches!(
            Model::upload(&device, "nothing", &[0], &[]),
            Err(DeviceError::EmptyGeometry(_))
        ));
        assert!(matches!(
            Model::upload(
                &device,
                "hollow",
                &[0],
                &[
                    SubmeshData { vertices: &tri, indices: &[0, 1, 2] },
                    SubmeshData { vertices: &tri, indices: &[] },
                ],
            ),
            Err(DeviceError::EmptyGeometry(_))
        ));
        assert!(matches!(
            GpuBuffer::upload(&device, BufferUsage::VERTEX, &[0], &[]),
            Err(DeviceError::EmptyBuffer)
        ));
        assert_eq!(device.live_buffers(), 0);
        assert_eq!(device.live_memory(), 0);
    }
}
