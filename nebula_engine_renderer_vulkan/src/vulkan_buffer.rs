/// VulkanBuffer - Vulkan implementation of the Buffer trait

use ash::vk;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use gpu_allocator::MemoryLocation;
use nebula_engine::nebula::{Error, Result};
use nebula_engine::nebula::device::{Buffer, BufferDesc, BufferUsage, GpuVirtualAddress};
use nebula_engine::{engine_bail, engine_err, engine_error};
use std::sync::Arc;

use crate::vulkan_context::GpuContext;

/// Vulkan buffer implementation
///
/// Lives in host-visible memory, mapped for its whole lifetime. Every buffer
/// is created with a device address so it can back a root constant buffer.
pub struct VulkanBuffer {
    ctx: Arc<GpuContext>,
    /// Vulkan buffer
    pub(crate) buffer: vk::Buffer,
    allocation: Option<Allocation>,
    size: u64,
    usage: BufferUsage,
    address: GpuVirtualAddress,
}

pub(crate) fn buffer_usage_to_vk(usage: BufferUsage) -> vk::BufferUsageFlags {
    let usage = match usage {
        BufferUsage::Vertex => vk::BufferUsageFlags::VERTEX_BUFFER,
        BufferUsage::Index => vk::BufferUsageFlags::INDEX_BUFFER,
        BufferUsage::Constant => vk::BufferUsageFlags::UNIFORM_BUFFER,
        BufferUsage::Upload => vk::BufferUsageFlags::TRANSFER_SRC,
    };
    usage | vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS
}

impl VulkanBuffer {
    pub(crate) fn new(ctx: Arc<GpuContext>, desc: &BufferDesc) -> Result<Self> {
        if desc.size == 0 {
            engine_error!("nebula::vulkan", "Buffer '{}' has zero size", desc.label);
            return Err(Error::InvalidResource(format!("Buffer '{}' has zero size", desc.label)));
        }

        unsafe {
            let buffer_create_info = vk::BufferCreateInfo::default()
                .size(desc.size)
                .usage(buffer_usage_to_vk(desc.usage))
                .sharing_mode(vk::SharingMode::EXCLUSIVE);

            let buffer = ctx.device.create_buffer(&buffer_create_info, None)
                .map_err(|e| engine_err!("nebula::vulkan", "Failed to create buffer '{}' of {} bytes: {:?}", desc.label, desc.size, e))?;

            let requirements = ctx.device.get_buffer_memory_requirements(buffer);
            let allocation = ctx.allocator()?.allocate(&AllocationCreateDesc {
                name: &desc.label,
                requirements,
                location: MemoryLocation::CpuToGpu,
                linear: true,
                allocation_scheme: AllocationScheme::GpuAllocatorManaged,
            });
            let allocation = match allocation {
                Ok(allocation) => allocation,
                Err(_) => {
                    let size_mb = requirements.size as f64 / (1024.0 * 1024.0);
                    engine_error!("nebula::vulkan", "Out of GPU memory for buffer '{}' (required: {:.2} MB)", desc.label, size_mb);
                    ctx.device.destroy_buffer(buffer, None);
                    return Err(Error::OutOfMemory);
                }
            };

            let mut created = Self {
                ctx: Arc::clone(&ctx),
                buffer,
                allocation: None,
                size: desc.size,
                usage: desc.usage,
                address: GpuVirtualAddress(0),
            };

            let (memory, memory_offset) = (allocation.memory(), allocation.offset());
            created.allocation = Some(allocation);
            ctx.device.bind_buffer_memory(buffer, memory, memory_offset)
                .map_err(|e| engine_err!("nebula::vulkan", "Failed to bind buffer memory: {:?}", e))?;

            let address_info = vk::BufferDeviceAddressInfo::default().buffer(buffer);
            created.address = GpuVirtualAddress(ctx.device.get_buffer_device_address(&address_info));

            Ok(created)
        }
    }

    pub(crate) fn from_arc(buffer: &Arc<dyn Buffer>) -> &VulkanBuffer {
        unsafe { &*(buffer.as_ref() as *const dyn Buffer as *const VulkanBuffer) }
    }
}

impl Buffer for VulkanBuffer {
    fn size(&self) -> u64 {
        self.size
    }

    fn usage(&self) -> BufferUsage {
        self.usage
    }

    fn gpu_address(&self) -> GpuVirtualAddress {
        self.address
    }

    fn write(&self, offset: u64, data: &[u8]) -> Result<()> {
        let end = offset.checked_add(data.len() as u64);
        if end.map_or(true, |end| end > self.size) {
            engine_error!("nebula::vulkan", "Buffer write of {} bytes at {} exceeds size {}", data.len(), offset, self.size);
            return Err(Error::InvalidResource(format!(
                "Write of {} bytes at offset {} exceeds buffer size {}",
                data.len(), offset, self.size
            )));
        }

        let Some(allocation) = &self.allocation else {
            engine_bail!("nebula::vulkan", "Buffer write failed: no GPU allocation");
        };
        let mapped_ptr = allocation
            .mapped_ptr()
            .ok_or_else(|| engine_err!("nebula::vulkan", "Buffer is not CPU-accessible"))?
            .as_ptr() as *mut u8;

        unsafe {
            std::ptr::copy_nonoverlapping(data.as_ptr(), mapped_ptr.add(offset as usize), data.len());
        }
        Ok(())
    }
}

impl Drop for VulkanBuffer {
    fn drop(&mut self) {
        unsafe {
            if let Some(allocation) = self.allocation.take() {
                // Don't panic if lock fails - we still need to destroy the buffer
                if let Ok(mut allocator) = self.ctx.allocator() {
                    allocator.free(allocation).ok();
                }
            }
            self.ctx.device.destroy_buffer(self.buffer, None);
        }
    }
}
