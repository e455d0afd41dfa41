/// Descriptor heap trait and descriptor handles

use crate::error::Result;
use crate::graphics_device::Texture;

/// Kind of views a descriptor heap stores
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DescriptorHeapKind {
    /// Render-target views (CPU only)
    RenderTarget,
    /// Depth-stencil views (CPU only)
    DepthStencil,
    /// Shader-visible CBV/SRV/UAV views
    ShaderResource,
}

impl DescriptorHeapKind {
    /// Whether shaders can index this heap
    pub fn is_shader_visible(&self) -> bool {
        matches!(self, DescriptorHeapKind::ShaderResource)
    }
}

/// CPU-side descriptor handle, used to write views and bind attachments
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CpuDescriptorHandle(pub u64);

/// GPU-side descriptor handle, bound as a descriptor table base
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GpuDescriptorHandle(pub u64);

/// View written into a descriptor slot
#[derive(Clone, Copy)]
pub enum DescriptorView<'a> {
    /// Color attachment view of one mip of one array layer
    RenderTarget {
        texture: &'a dyn Texture,
        mip: u32,
        array_layer: u32,
    },
    /// Depth attachment view
    DepthStencil {
        texture: &'a dyn Texture,
    },
    /// Sampled view of every mip and layer (cube view for cube maps)
    ShaderResource {
        texture: &'a dyn Texture,
    },
}

/// Fixed-capacity table of descriptors
///
/// Slot `i` lives at `cpu_start + i * increment_size` (and `gpu_start + i *
/// increment_size` for shader-visible heaps).
pub trait DescriptorHeap: Send + Sync {
    /// Kind of views stored
    fn kind(&self) -> DescriptorHeapKind;

    /// Number of slots
    fn capacity(&self) -> u32;

    /// Handle of slot 0
    fn cpu_start(&self) -> CpuDescriptorHandle;

    /// GPU handle of slot 0, `None` for CPU-only heaps
    fn gpu_start(&self) -> Option<GpuDescriptorHandle>;

    /// Distance in bytes between two consecutive slots
    fn increment_size(&self) -> u64;

    /// Write a view at `handle`, replacing whatever the slot held
    fn write_view(&self, handle: CpuDescriptorHandle, view: DescriptorView<'_>) -> Result<()>;
}
