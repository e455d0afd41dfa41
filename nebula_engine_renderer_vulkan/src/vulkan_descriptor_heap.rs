/// VulkanDescriptorHeap - Vulkan implementation of the DescriptorHeap trait
///
/// Render-target and depth-stencil heaps are slot tables: writing a slot
/// creates an image view and registers it in the context under the slot's
/// CPU handle, where command lists look it up in `begin_rendering`.
///
/// The shader-resource heap is a bindless array of sampled images (set 0 of
/// every pipeline layout); descriptor tables bind a base index into it.

use ash::vk;
use nebula_engine::nebula::{Error, Result};
use nebula_engine::nebula::device::{
    CpuDescriptorHandle, DescriptorHeap, DescriptorHeapKind, DescriptorView, GpuDescriptorHandle,
};
use nebula_engine::{engine_err, engine_error, engine_info};
use std::sync::Arc;

use crate::vulkan_context::{BindlessHeap, GpuContext};
use crate::vulkan_texture::VulkanTexture;

/// Distance between two slot handles
pub(crate) const DESCRIPTOR_INCREMENT: u64 = 32;

/// Slot index of `handle` in a heap starting at `base`, if it addresses one
pub(crate) fn slot_of(base: u64, capacity: u32, handle: u64) -> Option<u32> {
    let offset = handle.checked_sub(base)?;
    if offset % DESCRIPTOR_INCREMENT != 0 {
        return None;
    }
    let slot = offset / DESCRIPTOR_INCREMENT;
    (slot < capacity as u64).then_some(slot as u32)
}

struct BindlessPool {
    pool: vk::DescriptorPool,
    set: vk::DescriptorSet,
}

/// Vulkan descriptor heap implementation
pub struct VulkanDescriptorHeap {
    ctx: Arc<GpuContext>,
    kind: DescriptorHeapKind,
    capacity: u32,
    base: u64,
    bindless: Option<BindlessPool>,
}

impl VulkanDescriptorHeap {
    pub(crate) fn new(ctx: Arc<GpuContext>, kind: DescriptorHeapKind, capacity: u32) -> Result<Self> {
        if capacity == 0 {
            engine_error!("nebula::vulkan", "Descriptor heap {:?} created with zero capacity", kind);
            return Err(Error::InvalidResource(format!("{:?} heap with zero capacity", kind)));
        }

        let base = ctx.next_heap_base();
        let bindless = if kind.is_shader_visible() {
            Some(Self::create_bindless(&ctx, base, capacity)?)
        } else {
            None
        };

        engine_info!("nebula::vulkan", "Descriptor heap {:?} created ({} slots)", kind, capacity);

        Ok(Self { ctx, kind, capacity, base, bindless })
    }

    fn create_bindless(ctx: &GpuContext, base: u64, capacity: u32) -> Result<BindlessPool> {
        if capacity > ctx.max_bindless_descriptors {
            engine_error!("nebula::vulkan", "Shader-visible heap of {} slots exceeds the device limit of {}",
                capacity, ctx.max_bindless_descriptors);
            return Err(Error::InvalidResource(format!(
                "Shader-visible heap capacity {} exceeds limit {}",
                capacity, ctx.max_bindless_descriptors
            )));
        }

        unsafe {
            let pool_sizes = [vk::DescriptorPoolSize {
                ty: vk::DescriptorType::SAMPLED_IMAGE,
                descriptor_count: capacity,
            }];
            let pool_info = vk::DescriptorPoolCreateInfo::default()
                .flags(vk::DescriptorPoolCreateFlags::UPDATE_AFTER_BIND)
                .pool_sizes(&pool_sizes)
                .max_sets(1);
            let pool = ctx.device.create_descriptor_pool(&pool_info, None)
                .map_err(|e| engine_err!("nebula::vulkan", "Failed to create bindless descriptor pool: {:?}", e))?;

            let counts = [capacity];
            let mut variable_count = vk::DescriptorSetVariableDescriptorCountAllocateInfo::default()
                .descriptor_counts(&counts);
            let layouts = [ctx.bindless_set_layout];
            let allocate_info = vk::DescriptorSetAllocateInfo::default()
                .descriptor_pool(pool)
                .set_layouts(&layouts)
                .push_next(&mut variable_count);

            let set = match ctx.device.allocate_descriptor_sets(&allocate_info) {
                Ok(sets) => sets[0],
                Err(e) => {
                    ctx.device.destroy_descriptor_pool(pool, None);
                    return Err(engine_err!("nebula::vulkan", "Failed to allocate bindless descriptor set: {:?}", e));
                }
            };

            if let Err(e) = ctx.install_bindless_heap(BindlessHeap {
                set,
                gpu_start: base,
                increment: DESCRIPTOR_INCREMENT,
            }) {
                ctx.device.destroy_descriptor_pool(pool, None);
                return Err(e);
            }

            Ok(BindlessPool { pool, set })
        }
    }

    fn expect_kind(&self, expected: DescriptorHeapKind) -> Result<()> {
        if self.kind != expected {
            engine_error!("nebula::vulkan", "Cannot write a {:?} view into a {:?} heap", expected, self.kind);
            return Err(Error::InvalidResource(format!(
                "{:?} view written into {:?} heap",
                expected, self.kind
            )));
        }
        Ok(())
    }
}

impl DescriptorHeap for VulkanDescriptorHeap {
    fn kind(&self) -> DescriptorHeapKind {
        self.kind
    }

    fn capacity(&self) -> u32 {
        self.capacity
    }

    fn cpu_start(&self) -> CpuDescriptorHandle {
        CpuDescriptorHandle(self.base)
    }

    fn gpu_start(&self) -> Option<GpuDescriptorHandle> {
        self.bindless.as_ref().map(|_| GpuDescriptorHandle(self.base))
    }

    fn increment_size(&self) -> u64 {
        DESCRIPTOR_INCREMENT
    }

    fn write_view(&self, handle: CpuDescriptorHandle, view: DescriptorView<'_>) -> Result<()> {
        let Some(slot) = slot_of(self.base, self.capacity, handle.0) else {
            engine_error!("nebula::vulkan", "Handle {:#x} is outside the {:?} heap", handle.0, self.kind);
            return Err(Error::InvalidResource(format!("Handle {:#x} outside {:?} heap", handle.0, self.kind)));
        };

        match view {
            DescriptorView::RenderTarget { texture, mip, array_layer } => {
                self.expect_kind(DescriptorHeapKind::RenderTarget)?;
                let texture = VulkanTexture::from_dyn(texture);
                let view = texture.create_view(vk::ImageViewType::TYPE_2D, mip, 1, array_layer, 1)?;
                self.ctx.replace_attachment_view(handle.0, view)
            }
            DescriptorView::DepthStencil { texture } => {
                self.expect_kind(DescriptorHeapKind::DepthStencil)?;
                let texture = VulkanTexture::from_dyn(texture);
                let view = texture.create_view(vk::ImageViewType::TYPE_2D, 0, 1, 0, 1)?;
                self.ctx.replace_attachment_view(handle.0, view)
            }
            DescriptorView::ShaderResource { texture } => {
                self.expect_kind(DescriptorHeapKind::ShaderResource)?;
                let Some(bindless) = &self.bindless else {
                    return Err(engine_err!("nebula::vulkan", "Shader-resource heap has no descriptor set"));
                };
                let texture = VulkanTexture::from_dyn(texture);
                let image_info = vk::DescriptorImageInfo::default()
                    .image_view(texture.view)
                    .image_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
                let write = vk::WriteDescriptorSet::default()
                    .dst_set(bindless.set)
                    .dst_binding(0)
                    .dst_array_element(slot)
                    .descriptor_type(vk::DescriptorType::SAMPLED_IMAGE)
                    .image_info(std::slice::from_ref(&image_info));
                unsafe { self.ctx.device.update_descriptor_sets(&[write], &[]) };
                Ok(())
            }
        }
    }
}

impl Drop for VulkanDescriptorHeap {
    fn drop(&mut self) {
        match self.bindless.take() {
            Some(bindless) => {
                self.ctx.uninstall_bindless_heap(bindless.set);
                unsafe { self.ctx.device.destroy_descriptor_pool(bindless.pool, None) };
            }
            None => {
                let end = self.base + self.capacity as u64 * DESCRIPTOR_INCREMENT;
                self.ctx.release_attachment_views(self.base, end);
            }
        }
    }
}
