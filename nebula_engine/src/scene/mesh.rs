/// Mesh vertex format and GPU-resident meshes.

use std::sync::Arc;
use bytemuck::{Pod, Zeroable};
use crate::engine_bail;
use crate::error::Result;
use crate::graphics_device::{
    Buffer, BufferDesc, BufferUsage, GraphicsDevice, IndexType, InputElement, TextureFormat,
};

// ===== VERTEX =====

/// Vertex layout of every scene mesh
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub texcoord: [f32; 2],
    pub tangent: [f32; 3],
}

impl Vertex {
    pub const STRIDE: u32 = std::mem::size_of::<Vertex>() as u32;

    /// Input layout matching the field order
    pub fn input_layout() -> Vec<InputElement> {
        vec![
            InputElement { semantic: "POSITION", format: TextureFormat::R32G32B32_SFLOAT, offset: 0 },
            InputElement { semantic: "NORMAL", format: TextureFormat::R32G32B32_SFLOAT, offset: 12 },
            InputElement { semantic: "TEXCOORD", format: TextureFormat::R32G32_SFLOAT, offset: 24 },
            InputElement { semantic: "TANGENT", format: TextureFormat::R32G32B32_SFLOAT, offset: 32 },
        ]
    }

    /// Position-only layout over the same vertex buffer (depth passes)
    pub fn position_layout() -> Vec<InputElement> {
        vec![InputElement { semantic: "POSITION", format: TextureFormat::R32G32B32_SFLOAT, offset: 0 }]
    }
}

// ===== MESH DATA =====

/// Triangle mesh as produced by the importer
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MeshData {
    pub name: String,
    pub vertices: Vec<Vertex>,
    /// Triangle list indices
    pub indices: Vec<u32>,
    /// Index into the model's materials
    pub material_index: Option<usize>,
}

// ===== MESH =====

/// Mesh with its vertex and index buffers on the GPU
pub struct Mesh {
    name: String,
    vertex_buffer: Arc<dyn Buffer>,
    index_buffer: Arc<dyn Buffer>,
    index_count: u32,
    material_index: Option<usize>,
}

impl Mesh {
    /// Create and fill the buffers of `data`
    pub fn upload(device: &dyn GraphicsDevice, data: &MeshData) -> Result<Self> {
        if data.vertices.is_empty() || data.indices.is_empty() {
            engine_bail!("nebula::mesh", "Mesh '{}' has no geometry", data.name);
        }
        if data.indices.len() % 3 != 0 {
            engine_bail!("nebula::mesh", "Mesh '{}' index count {} is not a triangle list",
                data.name, data.indices.len());
        }

        let vertex_bytes: &[u8] = bytemuck::cast_slice(&data.vertices);
        let vertex_buffer = device.create_buffer(&BufferDesc {
            label: format!("{}_vertices", data.name),
            size: vertex_bytes.len() as u64,
            usage: BufferUsage::Vertex,
        })?;
        vertex_buffer.write(0, vertex_bytes)?;

        let index_bytes: &[u8] = bytemuck::cast_slice(&data.indices);
        let index_buffer = device.create_buffer(&BufferDesc {
            label: format!("{}_indices", data.name),
            size: index_bytes.len() as u64,
            usage: BufferUsage::Index,
        })?;
        index_buffer.write(0, index_bytes)?;

        Ok(Self {
            name: data.name.clone(),
            vertex_buffer,
            index_buffer,
            index_count: data.indices.len() as u32,
            material_index: data.material_index,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn vertex_buffer(&self) -> &Arc<dyn Buffer> {
        &self.vertex_buffer
    }

    pub fn index_buffer(&self) -> &Arc<dyn Buffer> {
        &self.index_buffer
    }

    pub fn index_type(&self) -> IndexType {
        IndexType::U32
    }

    pub fn index_count(&self) -> u32 {
        self.index_count
    }

    pub fn material_index(&self) -> Option<usize> {
        self.material_index
    }
}
