/// Texture cache keyed by path hash.
///
/// Textures are decoded by an external `TextureLoader`, uploaded through a
/// staging buffer and a blocking one-shot command list, left in the
/// `ShaderResource` state and registered in the shader-visible heap.
/// Loads are synchronous; there is no streaming.

use std::hash::Hasher;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use rustc_hash::{FxHashMap, FxHasher};
use crate::error::{Error, Result};
use crate::graphics_device::{
    BufferDesc, BufferUsage, DescriptorView, GraphicsDevice, ResourceState, Texture,
    TextureCopyRegion, TextureDesc, TextureDimension, TextureFormat, TextureUsage,
    TransitionBarrier,
};
use crate::renderer::{CommandStream, DescriptorAllocator, DescriptorSlot};
use crate::{engine_debug, engine_warn};

/// Stable identifier of a texture file (hash of its normalized path)
pub type TextureId = u64;

/// Hash a texture path into its id
///
/// The path is normalized first (`\` to `/`, lower case) so the same file
/// referenced from different materials maps to one id.
pub fn texture_id(path: &Path) -> TextureId {
    let normalized = path.to_string_lossy().replace('\\', "/").to_lowercase();
    let mut hasher = FxHasher::default();
    hasher.write(normalized.as_bytes());
    hasher.finish()
}

// ===== TEXTURE SOURCE =====

/// Decoded texel data handed over by a `TextureLoader`
///
/// `data` holds every subresource tightly packed, array layer major then
/// mip level (layer 0 mips 0..n, layer 1 mips 0..n, ...).
#[derive(Debug, Clone, PartialEq)]
pub struct TextureSource {
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    pub dimension: TextureDimension,
    pub mip_levels: u32,
    pub data: Vec<u8>,
}

impl TextureSource {
    /// 1x1 texture of a single RGBA8 color
    pub fn solid_color(rgba: [u8; 4]) -> Self {
        Self {
            width: 1,
            height: 1,
            format: TextureFormat::R8G8B8A8_UNORM,
            dimension: TextureDimension::D2,
            mip_levels: 1,
            data: rgba.to_vec(),
        }
    }

    fn layers(&self) -> u32 {
        match self.dimension {
            TextureDimension::D2 => 1,
            TextureDimension::Cube => 6,
        }
    }

    /// Copy regions in `data` order
    pub fn copy_regions(&self) -> Vec<TextureCopyRegion> {
        let bpp = self.format.bytes_per_pixel() as u64;
        let mut offset = 0;
        let mut regions = Vec::with_capacity((self.layers() * self.mip_levels) as usize);
        for array_layer in 0..self.layers() {
            for mip_level in 0..self.mip_levels.max(1) {
                let width = (self.width >> mip_level).max(1);
                let height = (self.height >> mip_level).max(1);
                regions.push(TextureCopyRegion { buffer_offset: offset, mip_level, array_layer, width, height });
                offset += width as u64 * height as u64 * bpp;
            }
        }
        regions
    }

    /// Bytes `data` must hold
    pub fn expected_size(&self) -> u64 {
        let bpp = self.format.bytes_per_pixel() as u64;
        self.copy_regions()
            .iter()
            .map(|r| r.width as u64 * r.height as u64 * bpp)
            .sum()
    }

    fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(Error::InvalidResource("Texture source has zero size".to_string()));
        }
        if self.format.is_depth() {
            return Err(Error::InvalidResource("Texture source cannot use a depth format".to_string()));
        }
        if self.data.len() as u64 != self.expected_size() {
            return Err(Error::InvalidResource(format!(
                "Texture source holds {} bytes, expected {}",
                self.data.len(),
                self.expected_size()
            )));
        }
        Ok(())
    }
}

/// Decodes image files (external collaborator)
pub trait TextureLoader {
    fn load(&self, path: &Path) -> Result<TextureSource>;
}

// ===== UPLOAD =====

/// A texture resident in `ShaderResource` state with its SRV slot
#[derive(Clone)]
pub struct CachedTexture {
    pub texture: Arc<dyn Texture>,
    pub slot: DescriptorSlot,
}

/// Create a sampled texture from `source` and block until its upload completes
pub fn upload_texture(
    device: &dyn GraphicsDevice,
    stream: &mut CommandStream,
    srv: &mut DescriptorAllocator,
    label: &str,
    source: &TextureSource,
    timeout: Duration,
) -> Result<CachedTexture> {
    source.validate()?;

    let texture = device.create_texture(&TextureDesc {
        label: label.to_string(),
        width: source.width,
        height: source.height,
        format: source.format,
        dimension: source.dimension,
        mip_levels: source.mip_levels.max(1),
        usage: TextureUsage::SAMPLED | TextureUsage::COPY_DST,
        initial_state: ResourceState::CopyDest,
    })?;

    let staging = device.create_buffer(&BufferDesc {
        label: format!("{}_staging", label),
        size: source.data.len() as u64,
        usage: BufferUsage::Upload,
    })?;
    staging.write(0, &source.data)?;

    let regions = source.copy_regions();
    stream.execute_one_shot(device, timeout, |cmd| {
        cmd.copy_buffer_to_texture(&staging, texture.as_ref(), &regions)?;
        cmd.resource_barrier(&[TransitionBarrier {
            texture: texture.as_ref(),
            before: ResourceState::CopyDest,
            after: ResourceState::ShaderResource,
        }])
    })?;

    let slot = srv.allocate()?;
    srv.write_view(slot, DescriptorView::ShaderResource { texture: texture.as_ref() })?;
    Ok(CachedTexture { texture, slot })
}

// ===== TEXTURE CACHE =====

pub struct TextureCache {
    device: Arc<dyn GraphicsDevice>,
    textures: FxHashMap<TextureId, CachedTexture>,
    placeholder: CachedTexture,
    upload_timeout: Duration,
}

impl TextureCache {
    /// Create the cache and its 1x1 white placeholder
    pub fn new(
        device: Arc<dyn GraphicsDevice>,
        stream: &mut CommandStream,
        srv: &mut DescriptorAllocator,
        upload_timeout: Duration,
    ) -> Result<Self> {
        let placeholder = upload_texture(
            device.as_ref(),
            stream,
            srv,
            "placeholder_white",
            &TextureSource::solid_color([255, 255, 255, 255]),
            upload_timeout,
        )?;

        Ok(Self {
            device,
            textures: FxHashMap::default(),
            placeholder,
            upload_timeout,
        })
    }

    /// Load `path` unless already cached, and return its id
    ///
    /// A file the loader cannot decode is logged and replaced by the
    /// placeholder under the same id. GPU failures are returned.
    pub fn load(
        &mut self,
        path: &Path,
        loader: &dyn TextureLoader,
        stream: &mut CommandStream,
        srv: &mut DescriptorAllocator,
    ) -> Result<TextureId> {
        let id = texture_id(path);
        if self.textures.contains_key(&id) {
            return Ok(id);
        }

        let source = loader.load(path).and_then(|source| source.validate().map(|_| source));
        let cached = match source {
            Ok(source) => {
                engine_debug!("nebula::texture_cache", "Uploading '{}' ({}x{})", path.display(), source.width, source.height);
                upload_texture(
                    self.device.as_ref(),
                    stream,
                    srv,
                    &path.to_string_lossy(),
                    &source,
                    self.upload_timeout,
                )?
            }
            Err(e) => {
                engine_warn!("nebula::texture_cache", "Using placeholder for '{}': {}", path.display(), e);
                self.placeholder.clone()
            }
        };

        self.textures.insert(id, cached);
        Ok(id)
    }

    pub fn get(&self, id: TextureId) -> Option<&CachedTexture> {
        self.textures.get(&id)
    }

    /// SRV slot of a cached texture
    pub fn descriptor(&self, id: TextureId) -> Option<DescriptorSlot> {
        self.textures.get(&id).map(|cached| cached.slot)
    }

    /// SRV slot of `id`, or the placeholder's when `id` is `None` or unknown
    pub fn descriptor_or_placeholder(&self, id: Option<TextureId>) -> DescriptorSlot {
        id.and_then(|id| self.descriptor(id)).unwrap_or(self.placeholder.slot)
    }

    pub fn placeholder(&self) -> &CachedTexture {
        &self.placeholder
    }

    /// Number of cached ids (the placeholder itself is not counted)
    pub fn len(&self) -> usize {
        self.textures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.textures.is_empty()
    }
}

#[cfg(test)]
#[path = "texture_cache_tests.rs"]
mod tests;
