/// GpuContext - Shared GPU state for all Vulkan objects
///
/// Contains everything the backend objects need after device creation:
/// - Device and instance for Vulkan API calls
/// - Allocator for memory management
/// - The graphics queue (also used for present)
/// - A command pool for one-shot transitions and uploads
/// - The bindless sampled-image set layout and the attachment view registry

use ash::vk;
use gpu_allocator::vulkan::Allocator;
use nebula_engine::nebula::{Error, Result};
use nebula_engine::nebula::device::StaticSampler;
use nebula_engine::{engine_err, engine_error};
use rustc_hash::FxHashMap;
use std::mem::ManuallyDrop;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, RwLock};

use crate::vulkan_sampler::SamplerCache;

/// Shader-visible heap currently bound as set 0
#[derive(Debug, Clone, Copy)]
pub(crate) struct BindlessHeap {
    pub set: vk::DescriptorSet,
    pub gpu_start: u64,
    pub increment: u64,
}

/// Shared GPU context for all resources.
///
/// Every backend object keeps an `Arc<GpuContext>`, so the device and
/// instance are destroyed only after the last texture, heap or pipeline.
pub struct GpuContext {
    pub(crate) entry: ash::Entry,
    pub(crate) instance: ash::Instance,
    pub(crate) physical_device: vk::PhysicalDevice,
    pub(crate) device: ash::Device,

    /// GPU memory allocator
    /// Wrapped in ManuallyDrop so it is dropped BEFORE the device is destroyed
    allocator: ManuallyDrop<Mutex<Allocator>>,

    /// Graphics queue (queue submission must be externally synchronized)
    queue: Mutex<vk::Queue>,
    pub(crate) queue_family: u32,

    /// Command pool for one-shot work (TRANSIENT + RESET_COMMAND_BUFFER)
    upload_command_pool: Mutex<vk::CommandPool>,

    /// Layout of set 0: one variable-size array of sampled images
    pub(crate) bindless_set_layout: vk::DescriptorSetLayout,
    pub(crate) max_bindless_descriptors: u32,
    bindless_heap: Mutex<Option<BindlessHeap>>,

    /// Pools for the immutable-sampler sets of pipelines (set 1)
    sampler_pools: Mutex<Vec<vk::DescriptorPool>>,
    samplers: Mutex<SamplerCache>,

    /// CPU descriptor handle -> image view, for RTV/DSV heaps
    attachment_views: RwLock<FxHashMap<u64, vk::ImageView>>,
    next_heap_id: AtomicU64,

    pub(crate) debug_utils_loader: Option<ash::ext::debug_utils::Instance>,
    pub(crate) debug_messenger: Option<vk::DebugUtilsMessengerEXT>,
}

impl GpuContext {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        entry: ash::Entry,
        instance: ash::Instance,
        physical_device: vk::PhysicalDevice,
        device: ash::Device,
        allocator: Allocator,
        queue: vk::Queue,
        queue_family: u32,
        upload_command_pool: vk::CommandPool,
        bindless_set_layout: vk::DescriptorSetLayout,
        max_bindless_descriptors: u32,
        debug_utils_loader: Option<ash::ext::debug_utils::Instance>,
        debug_messenger: Option<vk::DebugUtilsMessengerEXT>,
    ) -> Self {
        Self {
            entry,
            instance,
            physical_device,
            device,
            allocator: ManuallyDrop::new(Mutex::new(allocator)),
            queue: Mutex::new(queue),
            queue_family,
            upload_command_pool: Mutex::new(upload_command_pool),
            bindless_set_layout,
            max_bindless_descriptors,
            bindless_heap: Mutex::new(None),
            sampler_pools: Mutex::new(Vec::new()),
            samplers: Mutex::new(SamplerCache::new()),
            attachment_views: RwLock::new(FxHashMap::default()),
            next_heap_id: AtomicU64::new(0),
            debug_utils_loader,
            debug_messenger,
        }
    }

    pub(crate) fn allocator(&self) -> Result<MutexGuard<'_, Allocator>> {
        self.allocator
            .lock()
            .map_err(|_| engine_err!("nebula::vulkan", "GPU allocator lock poisoned"))
    }

    pub(crate) fn queue(&self) -> Result<MutexGuard<'_, vk::Queue>> {
        self.queue
            .lock()
            .map_err(|_| engine_err!("nebula::vulkan", "Graphics queue lock poisoned"))
    }

    /// Base handle of a new descriptor heap; heaps never share a handle range
    pub(crate) fn next_heap_base(&self) -> u64 {
        (self.next_heap_id.fetch_add(1, Ordering::Relaxed) + 1) << 32
    }

    // ===== ATTACHMENT VIEWS =====

    pub(crate) fn attachment_view(&self, handle: u64) -> Option<vk::ImageView> {
        self.attachment_views.read().ok()?.get(&handle).copied()
    }

    /// Store `view` at `handle`, destroying the view it replaces
    pub(crate) fn replace_attachment_view(&self, handle: u64, view: vk::ImageView) -> Result<()> {
        let mut views = self
            .attachment_views
            .write()
            .map_err(|_| engine_err!("nebula::vulkan", "Attachment view registry lock poisoned"))?;
        if let Some(old) = views.insert(handle, view) {
            unsafe { self.device.destroy_image_view(old, None) };
        }
        Ok(())
    }

    /// Destroy every view whose handle lies in `[start, end)`
    pub(crate) fn release_attachment_views(&self, start: u64, end: u64) {
        if let Ok(mut views) = self.attachment_views.write() {
            views.retain(|&handle, view| {
                let keep = handle < start || handle >= end;
                if !keep {
                    unsafe { self.device.destroy_image_view(*view, None) };
                }
                keep
            });
        }
    }

    // ===== BINDLESS HEAP =====

    pub(crate) fn bindless_heap(&self) -> Option<BindlessHeap> {
        self.bindless_heap.lock().ok().and_then(|heap| *heap)
    }

    /// Register the shader-visible heap; only one may exist at a time
    pub(crate) fn install_bindless_heap(&self, heap: BindlessHeap) -> Result<()> {
        let mut slot = self
            .bindless_heap
            .lock()
            .map_err(|_| engine_err!("nebula::vulkan", "Bindless heap lock poisoned"))?;
        if slot.is_some() {
            engine_error!("nebula::vulkan", "A shader-visible descriptor heap already exists");
            return Err(Error::InvalidResource(
                "Only one shader-visible descriptor heap is supported".to_string(),
            ));
        }
        *slot = Some(heap);
        Ok(())
    }

    pub(crate) fn uninstall_bindless_heap(&self, set: vk::DescriptorSet) {
        if let Ok(mut slot) = self.bindless_heap.lock() {
            if slot.map(|heap| heap.set) == Some(set) {
                *slot = None;
            }
        }
    }

    // ===== SAMPLERS =====

    pub(crate) fn sampler(&self, desc: StaticSampler) -> Result<vk::Sampler> {
        let mut cache = self
            .samplers
            .lock()
            .map_err(|_| engine_err!("nebula::vulkan", "Sampler cache lock poisoned"))?;
        cache.get(&self.device, desc)
    }

    /// Allocate one immutable-sampler set, growing the pool list when exhausted
    pub(crate) fn allocate_sampler_set(&self, layout: vk::DescriptorSetLayout) -> Result<vk::DescriptorSet> {
        let mut pools = self
            .sampler_pools
            .lock()
            .map_err(|_| engine_err!("nebula::vulkan", "Sampler pool lock poisoned"))?;
        let layouts = [layout];

        if let Some(&pool) = pools.last() {
            let info = vk::DescriptorSetAllocateInfo::default()
                .descriptor_pool(pool)
                .set_layouts(&layouts);
            match unsafe { self.device.allocate_descriptor_sets(&info) } {
                Ok(sets) => return Ok(sets[0]),
                Err(vk::Result::ERROR_OUT_OF_POOL_MEMORY) | Err(vk::Result::ERROR_FRAGMENTED_POOL) => {}
                Err(e) => {
                    return Err(engine_err!("nebula::vulkan", "Failed to allocate sampler set: {:?}", e));
                }
            }
        }

        let pool = self.create_sampler_pool()?;
        pools.push(pool);
        let info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(pool)
            .set_layouts(&layouts);
        let sets = unsafe { self.device.allocate_descriptor_sets(&info) }
            .map_err(|e| engine_err!("nebula::vulkan", "Failed to allocate sampler set: {:?}", e))?;
        Ok(sets[0])
    }

    fn create_sampler_pool(&self) -> Result<vk::DescriptorPool> {
        let pool_sizes = [vk::DescriptorPoolSize {
            ty: vk::DescriptorType::SAMPLER,
            descriptor_count: 256,
        }];
        let info = vk::DescriptorPoolCreateInfo::default()
            .pool_sizes(&pool_sizes)
            .max_sets(64);
        unsafe { self.device.create_descriptor_pool(&info, None) }
            .map_err(|e| engine_err!("nebula::vulkan", "Failed to create sampler descriptor pool: {:?}", e))
    }

    // ===== ONE-SHOT SUBMISSION =====

    /// Record `record` into a throwaway command buffer, submit it and wait for the queue
    pub(crate) fn one_shot<F>(&self, record: F) -> Result<()>
    where
        F: FnOnce(vk::CommandBuffer),
    {
        let pool = self
            .upload_command_pool
            .lock()
            .map_err(|_| engine_err!("nebula::vulkan", "Upload command pool lock poisoned"))?;

        unsafe {
            let allocate_info = vk::CommandBufferAllocateInfo::default()
                .command_pool(*pool)
                .level(vk::CommandBufferLevel::PRIMARY)
                .command_buffer_count(1);
            let command_buffer = self.device.allocate_command_buffers(&allocate_info)
                .map_err(|e| engine_err!("nebula::vulkan", "Failed to allocate one-shot command buffer: {:?}", e))?[0];

            let begin_info = vk::CommandBufferBeginInfo::default()
                .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
            let result = self.device.begin_command_buffer(command_buffer, &begin_info)
                .and_then(|_| {
                    record(command_buffer);
                    self.device.end_command_buffer(command_buffer)
                })
                .and_then(|_| {
                    let queue = self.queue.lock().map_err(|_| vk::Result::ERROR_UNKNOWN)?;
                    let command_buffers = [command_buffer];
                    let submit_info = vk::SubmitInfo::default().command_buffers(&command_buffers);
                    self.device.queue_submit(*queue, &[submit_info], vk::Fence::null())?;
                    self.device.queue_wait_idle(*queue)
                });

            self.device.free_command_buffers(*pool, &[command_buffer]);
            result.map_err(|e| engine_err!("nebula::vulkan", "One-shot submission failed: {:?}", e))
        }
    }
}

impl Drop for GpuContext {
    fn drop(&mut self) {
        unsafe {
            self.device.device_wait_idle().ok();

            if let Ok(mut views) = self.attachment_views.write() {
                for (_, view) in views.drain() {
                    self.device.destroy_image_view(view, None);
                }
            }
            if let Ok(mut samplers) = self.samplers.lock() {
                samplers.destroy(&self.device);
            }
            if let Ok(mut pools) = self.sampler_pools.lock() {
                for pool in pools.drain(..) {
                    self.device.destroy_descriptor_pool(pool, None);
                }
            }
            self.device.destroy_descriptor_set_layout(self.bindless_set_layout, None);
            if let Ok(pool) = self.upload_command_pool.lock() {
                self.device.destroy_command_pool(*pool, None);
            }

            // Allocator must go before the device
            ManuallyDrop::drop(&mut self.allocator);

            self.device.destroy_device(None);

            if let (Some(loader), Some(messenger)) = (&self.debug_utils_loader, self.debug_messenger) {
                loader.destroy_debug_utils_messenger(messenger, None);
            }

            self.instance.destroy_instance(None);
        }
    }
}
