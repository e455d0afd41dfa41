/// Texture trait, texture descriptor, and texture info

use bitflags::bitflags;
use crate::graphics_device::ResourceState;

/// Texture and vertex attribute format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(non_camel_case_types)]
pub enum TextureFormat {
    // Texture formats
    R8G8B8A8_SRGB,
    R8G8B8A8_UNORM,
    B8G8R8A8_SRGB,
    B8G8R8A8_UNORM,
    R16G16B16A16_SFLOAT,
    D32_FLOAT,

    // Texture and vertex attribute formats
    R32_SFLOAT,
    R32G32_SFLOAT,
    R32G32B32_SFLOAT,
    R32G32B32A32_SFLOAT,
}

impl TextureFormat {
    /// Size of one texel (or one vertex attribute) in bytes
    pub fn bytes_per_pixel(&self) -> u32 {
        match self {
            TextureFormat::R8G8B8A8_SRGB
            | TextureFormat::R8G8B8A8_UNORM
            | TextureFormat::B8G8R8A8_SRGB
            | TextureFormat::B8G8R8A8_UNORM
            | TextureFormat::D32_FLOAT
            | TextureFormat::R32_SFLOAT => 4,
            TextureFormat::R16G16B16A16_SFLOAT | TextureFormat::R32G32_SFLOAT => 8,
            TextureFormat::R32G32B32_SFLOAT => 12,
            TextureFormat::R32G32B32A32_SFLOAT => 16,
        }
    }

    /// Whether this is a depth format
    pub fn is_depth(&self) -> bool {
        matches!(self, TextureFormat::D32_FLOAT)
    }
}

/// Texture shape
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureDimension {
    /// Plain 2D texture
    D2,
    /// Cube map (6 array layers)
    Cube,
}

bitflags! {
    /// How a texture may be bound
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct TextureUsage: u32 {
        /// Sampled in shaders through a shader resource view
        const SAMPLED = 1 << 0;
        /// Bound as a color render target
        const RENDER_TARGET = 1 << 1;
        /// Bound as a depth target
        const DEPTH_STENCIL = 1 << 2;
        /// Destination of buffer-to-texture copies
        const COPY_DST = 1 << 3;
    }
}

// ===== TEXTURE DESC =====

/// Descriptor for creating a texture
#[derive(Debug, Clone)]
pub struct TextureDesc {
    /// Debug label
    pub label: String,
    /// Width in pixels of mip 0
    pub width: u32,
    /// Height in pixels of mip 0
    pub height: u32,
    /// Pixel format
    pub format: TextureFormat,
    /// 2D or cube
    pub dimension: TextureDimension,
    /// Number of mip levels (at least 1)
    pub mip_levels: u32,
    /// Usage flags
    pub usage: TextureUsage,
    /// State the texture is left in after creation
    pub initial_state: ResourceState,
}

// ===== TEXTURE INFO =====

/// Read-only properties of a created texture.
#[derive(Debug, Clone, PartialEq)]
pub struct TextureInfo {
    /// Debug label
    pub label: String,
    /// Width in pixels of mip 0
    pub width: u32,
    /// Height in pixels of mip 0
    pub height: u32,
    /// Pixel format
    pub format: TextureFormat,
    /// 2D or cube
    pub dimension: TextureDimension,
    /// Number of mip levels
    pub mip_levels: u32,
    /// Usage flags
    pub usage: TextureUsage,
}

impl TextureInfo {
    /// Build the info of a texture created from `desc`
    pub fn from_desc(desc: &TextureDesc) -> Self {
        Self {
            label: desc.label.clone(),
            width: desc.width,
            height: desc.height,
            format: desc.format,
            dimension: desc.dimension,
            mip_levels: desc.mip_levels.max(1),
            usage: desc.usage,
        }
    }

    /// 6 for cube maps, 1 otherwise
    pub fn array_layers(&self) -> u32 {
        match self.dimension {
            TextureDimension::D2 => 1,
            TextureDimension::Cube => 6,
        }
    }

    /// Extent of a mip level, never smaller than 1x1
    pub fn mip_extent(&self, mip: u32) -> (u32, u32) {
        ((self.width >> mip).max(1), (self.height >> mip).max(1))
    }
}

// ===== TEXTURE TRAIT =====

/// Texture resource trait
///
/// Implemented by backend-specific texture types (e.g., VulkanTexture).
/// The texture is destroyed when dropped.
pub trait Texture: Send + Sync {
    /// Get the read-only properties of this texture
    fn info(&self) -> &TextureInfo;
}

#[cfg(test)]
#[path = "texture_tests.rs"]
mod tests;
