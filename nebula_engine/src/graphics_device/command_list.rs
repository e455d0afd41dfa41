/// CommandList trait - for recording GPU commands

use std::sync::Arc;
use crate::error::Result;
use crate::graphics_device::{
    Buffer, CpuDescriptorHandle, GpuDescriptorHandle, GpuVirtualAddress, IndexType, Pipeline,
    Texture, TransitionBarrier,
};

/// Command list for recording GPU commands
///
/// A command list owns its allocator. `begin` resets both and opens the list
/// for recording; `end` closes it so a `CommandQueue` can execute it. The
/// caller must not call `begin` while a previous submission of the same list
/// is still executing on the GPU.
pub trait CommandList: Send + Sync {
    /// Reset the allocator and begin recording
    fn begin(&mut self) -> Result<()>;

    /// Close the list
    fn end(&mut self) -> Result<()>;

    /// Record resource state transitions
    ///
    /// # Arguments
    ///
    /// * `barriers` - Transitions applied to every subresource of each texture
    fn resource_barrier(&mut self, barriers: &[TransitionBarrier<'_>]) -> Result<()>;

    /// Bind attachments and begin rendering into them
    ///
    /// # Arguments
    ///
    /// * `desc` - Color and depth attachment views, with optional clear values
    fn begin_rendering(&mut self, desc: &RenderingDesc) -> Result<()>;

    /// End the current rendering scope
    fn end_rendering(&mut self) -> Result<()>;

    /// Set the viewport
    fn set_viewport(&mut self, viewport: Viewport) -> Result<()>;

    /// Set the scissor rectangle
    fn set_scissor(&mut self, scissor: Rect2D) -> Result<()>;

    /// Bind a graphics pipeline and its root signature
    fn set_pipeline(&mut self, pipeline: &Arc<dyn Pipeline>) -> Result<()>;

    /// Set 32-bit root constants
    ///
    /// # Arguments
    ///
    /// * `parameter` - Root parameter index (must be a `Constants` parameter)
    /// * `dest_offset` - Offset in 32-bit values inside the parameter
    /// * `data` - Bytes to write, a multiple of 4
    fn set_root_constants(&mut self, parameter: u32, dest_offset: u32, data: &[u8]) -> Result<()>;

    /// Bind a constant buffer address to a `ConstantBuffer` root parameter
    fn set_root_constant_buffer(&mut self, parameter: u32, address: GpuVirtualAddress) -> Result<()>;

    /// Bind a descriptor table base to a `DescriptorTable` root parameter
    fn set_root_descriptor_table(&mut self, parameter: u32, base: GpuDescriptorHandle) -> Result<()>;

    /// Bind a vertex buffer at slot 0
    ///
    /// # Arguments
    ///
    /// * `buffer` - Buffer to bind
    /// * `stride` - Size in bytes of one vertex
    fn set_vertex_buffer(&mut self, buffer: &Arc<dyn Buffer>, stride: u32) -> Result<()>;

    /// Bind an index buffer
    fn set_index_buffer(&mut self, buffer: &Arc<dyn Buffer>, index_type: IndexType) -> Result<()>;

    /// Draw vertices
    ///
    /// # Arguments
    ///
    /// * `vertex_count` - Number of vertices to draw
    /// * `first_vertex` - Index of first vertex
    fn draw(&mut self, vertex_count: u32, first_vertex: u32) -> Result<()>;

    /// Draw indexed vertices
    ///
    /// # Arguments
    ///
    /// * `index_count` - Number of indices to draw
    /// * `first_index` - Index of first index
    /// * `vertex_offset` - Value added to vertex index before indexing into the vertex buffer
    fn draw_indexed(&mut self, index_count: u32, first_index: u32, vertex_offset: i32) -> Result<()>;

    /// Copy texel data from a buffer into texture subresources
    ///
    /// The destination must be in `ResourceState::CopyDest`.
    fn copy_buffer_to_texture(
        &mut self,
        src: &Arc<dyn Buffer>,
        dst: &dyn Texture,
        regions: &[TextureCopyRegion],
    ) -> Result<()>;
}

/// Viewport dimensions and depth range
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub min_depth: f32,
    pub max_depth: f32,
}

impl Viewport {
    /// Full-extent viewport with depth range [0, 1]
    pub fn from_extent(width: u32, height: u32) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width: width as f32,
            height: height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        }
    }
}

/// 2D rectangle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect2D {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Rect2D {
    /// Rectangle covering `[0, width) x [0, height)`
    pub fn from_extent(width: u32, height: u32) -> Self {
        Self { x: 0, y: 0, width, height }
    }
}

/// Color attachment of a rendering scope
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorAttachment {
    /// Render-target view
    pub view: CpuDescriptorHandle,
    /// Clear color, `None` to keep the existing contents
    pub clear: Option<[f32; 4]>,
}

/// Depth attachment of a rendering scope
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepthAttachment {
    /// Depth-stencil view
    pub view: CpuDescriptorHandle,
    /// Clear depth, `None` to keep the existing contents
    pub clear: Option<f32>,
}

/// Attachments bound by `begin_rendering`
#[derive(Debug, Clone, PartialEq)]
pub struct RenderingDesc {
    /// Color attachments (may be empty for depth-only passes)
    pub color: Vec<ColorAttachment>,
    /// Optional depth attachment
    pub depth: Option<DepthAttachment>,
    /// Render area width
    pub width: u32,
    /// Render area height
    pub height: u32,
}

/// One buffer-to-texture copy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureCopyRegion {
    /// Byte offset of the tightly packed texels in the source buffer
    pub buffer_offset: u64,
    /// Destination mip level
    pub mip_level: u32,
    /// Destination array layer (cube face)
    pub array_layer: u32,
    /// Width of the copied region
    pub width: u32,
    /// Height of the copied region
    pub height: u32,
}
