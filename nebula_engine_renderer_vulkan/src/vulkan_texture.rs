/// VulkanTexture - Vulkan implementation of the Texture trait

use ash::vk;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use gpu_allocator::MemoryLocation;
use nebula_engine::nebula::{Error, Result};
use nebula_engine::nebula::device::{
    ResourceState, Texture, TextureDesc, TextureDimension, TextureInfo, TextureUsage,
};
use nebula_engine::{engine_err, engine_error};
use std::sync::Arc;

use crate::vulkan_barrier::{destination_scope, full_range};
use crate::vulkan_context::GpuContext;
use crate::vulkan_format::{aspect_of, format_to_vk};

/// Vulkan texture implementation
///
/// Owns its image and memory, except for swap chain back buffers whose
/// image belongs to the swap chain (`allocation` is `None` and `owns_image`
/// is false).
pub struct VulkanTexture {
    ctx: Arc<GpuContext>,
    /// Vulkan image
    pub(crate) image: vk::Image,
    /// Sampled view over every mip and layer (cube view for cube maps)
    pub(crate) view: vk::ImageView,
    allocation: Option<Allocation>,
    owns_image: bool,
    /// Read-only texture properties
    pub(crate) info: TextureInfo,
}

impl VulkanTexture {
    /// Create an image, allocate device-local memory, and move it to `desc.initial_state`
    pub(crate) fn new(ctx: Arc<GpuContext>, desc: &TextureDesc) -> Result<Self> {
        let info = TextureInfo::from_desc(desc);
        let format = format_to_vk(info.format);
        let layers = info.array_layers();

        let mut usage_flags = vk::ImageUsageFlags::empty();
        if info.usage.contains(TextureUsage::SAMPLED) {
            usage_flags |= vk::ImageUsageFlags::SAMPLED;
        }
        if info.usage.contains(TextureUsage::RENDER_TARGET) {
            usage_flags |= vk::ImageUsageFlags::COLOR_ATTACHMENT;
        }
        if info.usage.contains(TextureUsage::DEPTH_STENCIL) {
            usage_flags |= vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT;
        }
        if info.usage.contains(TextureUsage::COPY_DST) {
            usage_flags |= vk::ImageUsageFlags::TRANSFER_DST;
        }

        let create_flags = match info.dimension {
            TextureDimension::Cube => vk::ImageCreateFlags::CUBE_COMPATIBLE,
            TextureDimension::D2 => vk::ImageCreateFlags::empty(),
        };

        unsafe {
            let image_create_info = vk::ImageCreateInfo::default()
                .flags(create_flags)
                .image_type(vk::ImageType::TYPE_2D)
                .format(format)
                .extent(vk::Extent3D {
                    width: info.width,
                    height: info.height,
                    depth: 1,
                })
                .mip_levels(info.mip_levels)
                .array_layers(layers)
                .samples(vk::SampleCountFlags::TYPE_1)
                .tiling(vk::ImageTiling::OPTIMAL)
                .usage(usage_flags)
                .sharing_mode(vk::SharingMode::EXCLUSIVE)
                .initial_layout(vk::ImageLayout::UNDEFINED);

            let image = ctx.device.create_image(&image_create_info, None)
                .map_err(|e| engine_err!("nebula::vulkan", "Failed to create image '{}': {:?}", info.label, e))?;

            let requirements = ctx.device.get_image_memory_requirements(image);
            let allocation = ctx.allocator()?.allocate(&AllocationCreateDesc {
                name: &info.label,
                requirements,
                location: MemoryLocation::GpuOnly,
                linear: false,
                allocation_scheme: AllocationScheme::GpuAllocatorManaged,
            });
            let allocation = match allocation {
                Ok(allocation) => allocation,
                Err(_) => {
                    let size_mb = requirements.size as f64 / (1024.0 * 1024.0);
                    engine_error!("nebula::vulkan", "Out of GPU memory for texture '{}' ({}x{}, layers: {}, {:.2} MB)",
                        info.label, info.width, info.height, layers, size_mb);
                    ctx.device.destroy_image(image, None);
                    return Err(Error::OutOfMemory);
                }
            };

            let mut texture = Self {
                ctx: Arc::clone(&ctx),
                image,
                view: vk::ImageView::null(),
                allocation: Some(allocation),
                owns_image: true,
                info,
            };

            ctx.device.bind_image_memory(image, texture.memory(), texture.memory_offset())
                .map_err(|e| engine_err!("nebula::vulkan", "Failed to bind image memory: {:?}", e))?;

            texture.view = texture.create_view(
                sampled_view_type(texture.info.dimension),
                0,
                texture.info.mip_levels,
                0,
                layers,
            )?;

            texture.transition_from_undefined(desc.initial_state)?;
            Ok(texture)
        }
    }

    /// Wrap a swap chain image; the swap chain keeps ownership of the image
    pub(crate) fn from_swapchain_image(
        ctx: Arc<GpuContext>,
        image: vk::Image,
        info: TextureInfo,
    ) -> Result<Self> {
        let mut texture = Self {
            ctx,
            image,
            view: vk::ImageView::null(),
            allocation: None,
            owns_image: false,
            info,
        };
        texture.view = texture.create_view(vk::ImageViewType::TYPE_2D, 0, 1, 0, 1)?;
        Ok(texture)
    }

    /// Recover the backend type from a trait object created by this backend
    pub(crate) fn from_dyn(texture: &dyn Texture) -> &VulkanTexture {
        unsafe { &*(texture as *const dyn Texture as *const VulkanTexture) }
    }

    /// Create a view over a mip / layer range; the caller owns the view
    pub(crate) fn create_view(
        &self,
        view_type: vk::ImageViewType,
        base_mip: u32,
        mip_count: u32,
        base_layer: u32,
        layer_count: u32,
    ) -> Result<vk::ImageView> {
        let create_info = vk::ImageViewCreateInfo::default()
            .image(self.image)
            .view_type(view_type)
            .format(format_to_vk(self.info.format))
            .components(vk::ComponentMapping {
                r: vk::ComponentSwizzle::IDENTITY,
                g: vk::ComponentSwizzle::IDENTITY,
                b: vk::ComponentSwizzle::IDENTITY,
                a: vk::ComponentSwizzle::IDENTITY,
            })
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: aspect_of(self.info.format),
                base_mip_level: base_mip,
                level_count: mip_count,
                base_array_layer: base_layer,
                layer_count,
            });

        unsafe { self.ctx.device.create_image_view(&create_info, None) }
            .map_err(|e| engine_err!("nebula::vulkan", "Failed to create view of '{}': {:?}", self.info.label, e))
    }

    fn memory(&self) -> vk::DeviceMemory {
        self.allocation.as_ref().map_or(vk::DeviceMemory::null(), |a| unsafe { a.memory() })
    }

    fn memory_offset(&self) -> u64 {
        self.allocation.as_ref().map_or(0, |a| a.offset())
    }

    fn transition_from_undefined(&self, state: ResourceState) -> Result<()> {
        if state == ResourceState::Common {
            return Ok(());
        }
        let dst = destination_scope(state);
        let barrier = vk::ImageMemoryBarrier2::default()
            .src_stage_mask(vk::PipelineStageFlags2::TOP_OF_PIPE)
            .src_access_mask(vk::AccessFlags2::NONE)
            .dst_stage_mask(dst.stage)
            .dst_access_mask(dst.access)
            .old_layout(vk::ImageLayout::UNDEFINED)
            .new_layout(dst.layout)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(self.image)
            .subresource_range(full_range(&self.info));
        let barriers = [barrier];
        let dependency = vk::DependencyInfo::default().image_memory_barriers(&barriers);

        self.ctx.one_shot(|command_buffer| unsafe {
            self.ctx.device.cmd_pipeline_barrier2(command_buffer, &dependency);
        })
    }
}

/// View type of the sampled view of a texture
pub(crate) fn sampled_view_type(dimension: TextureDimension) -> vk::ImageViewType {
    match dimension {
        TextureDimension::D2 => vk::ImageViewType::TYPE_2D,
        TextureDimension::Cube => vk::ImageViewType::CUBE,
    }
}

impl Texture for VulkanTexture {
    fn info(&self) -> &TextureInfo {
        &self.info
    }
}

impl Drop for VulkanTexture {
    fn drop(&mut self) {
        unsafe {
            if self.view != vk::ImageView::null() {
                self.ctx.device.destroy_image_view(self.view, None);
            }

            if let Some(allocation) = self.allocation.take() {
                // Don't panic if lock fails - we still need to destroy the image
                if let Ok(mut allocator) = self.ctx.allocator() {
                    allocator.free(allocation).ok();
                }
            }

            if self.owns_image {
                self.ctx.device.destroy_image(self.image, None);
            }
        }
    }
}
