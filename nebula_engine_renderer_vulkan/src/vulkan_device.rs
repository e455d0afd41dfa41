/// VulkanDevice - Vulkan implementation of the GraphicsDevice trait
///
/// Creates the instance, picks a GPU with a queue family that can both render
/// and present to the window, enables the Vulkan 1.2/1.3 features the backend
/// relies on (timeline semaphores, dynamic rendering, synchronization2,
/// descriptor indexing, buffer device address), and hands every created
/// object a shared `GpuContext`.

use ash::vk;
use gpu_allocator::vulkan::{Allocator, AllocatorCreateDesc};
use nebula_engine::nebula::{Error, RendererConfig, Result};
use nebula_engine::nebula::device::{
    Buffer, BufferDesc, CommandList, CommandQueue, DescriptorHeap, DescriptorHeapKind, Fence,
    GraphicsDevice, Pipeline, PipelineDesc, Texture, TextureDesc,
};
use nebula_engine::{engine_err, engine_error, engine_info};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use std::ffi::{CStr, CString};
use std::sync::Arc;

use crate::vulkan_buffer::VulkanBuffer;
use crate::vulkan_command_list::VulkanCommandList;
use crate::vulkan_config::VulkanConfig;
use crate::vulkan_context::GpuContext;
use crate::vulkan_descriptor_heap::VulkanDescriptorHeap;
use crate::vulkan_pipeline::VulkanPipeline;
use crate::vulkan_sync::{VulkanFence, VulkanQueue};
use crate::vulkan_texture::VulkanTexture;

/// Upper bound on the bindless sampled-image array
const MAX_BINDLESS_DESCRIPTORS: u32 = 65536;

/// Vulkan graphics device
pub struct VulkanDevice {
    ctx: Arc<GpuContext>,
}

impl VulkanDevice {
    /// Create a Vulkan device able to present to `window`
    ///
    /// # Arguments
    ///
    /// * `window` - Window the device will present to (used for instance
    ///   extensions and queue family selection)
    /// * `config` - Renderer configuration (application name, validation)
    pub fn new<W: HasDisplayHandle + HasWindowHandle>(window: &W, config: &RendererConfig) -> Result<Self> {
        Self::new_with_config(window, config, &VulkanConfig::default())
    }

    /// Create a Vulkan device with backend-specific debug settings
    pub fn new_with_config<W: HasDisplayHandle + HasWindowHandle>(
        window: &W,
        config: &RendererConfig,
        vulkan_config: &VulkanConfig,
    ) -> Result<Self> {
        let enable_validation = cfg!(feature = "vulkan-validation") && config.enable_validation;

        unsafe {
            let entry = ash::Entry::load().map_err(|e| {
                engine_error!("nebula::vulkan", "Failed to load Vulkan library: {:?}", e);
                Error::InitializationFailed(format!("Failed to load Vulkan library: {:?}", e))
            })?;

            let app_name = CString::new(config.app_name.as_str())
                .unwrap_or_else(|_| CString::from(c"Nebula Application"));
            let app_info = vk::ApplicationInfo::default()
                .application_name(&app_name)
                .application_version(vk::make_api_version(0, 1, 0, 0))
                .engine_name(c"Nebula")
                .engine_version(vk::make_api_version(0, 0, 1, 0))
                .api_version(vk::API_VERSION_1_3);

            let display_handle = window.display_handle().map_err(|e| {
                engine_error!("nebula::vulkan", "Failed to get display handle: {}", e);
                Error::InitializationFailed(format!("Failed to get display handle: {}", e))
            })?;
            let window_handle = window.window_handle().map_err(|e| {
                engine_error!("nebula::vulkan", "Failed to get window handle: {}", e);
                Error::InitializationFailed(format!("Failed to get window handle: {}", e))
            })?;

            let mut extension_names = ash_window::enumerate_required_extensions(display_handle.as_raw())
                .map_err(|e| {
                    engine_error!("nebula::vulkan", "Failed to get required extensions: {}", e);
                    Error::InitializationFailed(format!("Failed to get required extensions: {}", e))
                })?
                .to_vec();
            if enable_validation {
                extension_names.push(ash::ext::debug_utils::NAME.as_ptr());
            }

            let layer_names = if enable_validation {
                vec![c"VK_LAYER_KHRONOS_validation".as_ptr()]
            } else {
                vec![]
            };

            let create_info = vk::InstanceCreateInfo::default()
                .application_info(&app_info)
                .enabled_layer_names(&layer_names)
                .enabled_extension_names(&extension_names);

            let instance = entry.create_instance(&create_info, None).map_err(|e| {
                engine_error!("nebula::vulkan", "Failed to create Vulkan instance: {:?}", e);
                Error::InitializationFailed(format!("Failed to create instance: {:?}", e))
            })?;

            let (debug_utils_loader, debug_messenger) = if enable_validation {
                Self::create_debug_messenger(&entry, &instance, vulkan_config)?
            } else {
                (None, None)
            };

            // Temporary surface, only for queue family selection
            let surface = ash_window::create_surface(
                &entry,
                &instance,
                display_handle.as_raw(),
                window_handle.as_raw(),
                None,
            )
            .map_err(|e| {
                engine_error!("nebula::vulkan", "Failed to create surface: {:?}", e);
                Error::InitializationFailed(format!("Failed to create surface: {:?}", e))
            })?;
            let surface_loader = ash::khr::surface::Instance::new(&entry, &instance);

            let selection = Self::pick_physical_device(&instance, &surface_loader, surface);
            surface_loader.destroy_surface(surface, None);
            let (physical_device, queue_family) = selection?;

            let properties = instance.get_physical_device_properties(physical_device);
            let device_name = CStr::from_ptr(properties.device_name.as_ptr()).to_string_lossy().into_owned();

            let mut indexing_properties = vk::PhysicalDeviceDescriptorIndexingProperties::default();
            let mut properties2 = vk::PhysicalDeviceProperties2::default().push_next(&mut indexing_properties);
            instance.get_physical_device_properties2(physical_device, &mut properties2);
            let max_bindless_descriptors = indexing_properties
                .max_descriptor_set_update_after_bind_sampled_images
                .min(MAX_BINDLESS_DESCRIPTORS);

            let queue_priorities = [1.0];
            let queue_create_infos = [vk::DeviceQueueCreateInfo::default()
                .queue_family_index(queue_family)
                .queue_priorities(&queue_priorities)];

            let device_extension_names = [ash::khr::swapchain::NAME.as_ptr()];

            let device_features = vk::PhysicalDeviceFeatures::default().sampler_anisotropy(true);
            let mut vulkan12_features = vk::PhysicalDeviceVulkan12Features::default()
                .timeline_semaphore(true)
                .buffer_device_address(true)
                .descriptor_indexing(true)
                .runtime_descriptor_array(true)
                .descriptor_binding_partially_bound(true)
                .descriptor_binding_variable_descriptor_count(true)
                .descriptor_binding_sampled_image_update_after_bind(true)
                .shader_sampled_image_array_non_uniform_indexing(true);
            let mut vulkan13_features = vk::PhysicalDeviceVulkan13Features::default()
                .dynamic_rendering(true)
                .synchronization2(true);

            let device_create_info = vk::DeviceCreateInfo::default()
                .queue_create_infos(&queue_create_infos)
                .enabled_extension_names(&device_extension_names)
                .enabled_features(&device_features)
                .push_next(&mut vulkan12_features)
                .push_next(&mut vulkan13_features);

            let device = instance
                .create_device(physical_device, &device_create_info, None)
                .map_err(|e| {
                    engine_error!("nebula::vulkan", "Failed to create logical device on '{}': {:?}", device_name, e);
                    Error::InitializationFailed(format!("Failed to create device: {:?}", e))
                })?;

            let queue = device.get_device_queue(queue_family, 0);

            let allocator = Allocator::new(&AllocatorCreateDesc {
                instance: instance.clone(),
                device: device.clone(),
                physical_device,
                debug_settings: Default::default(),
                buffer_device_address: true,
                allocation_sizes: Default::default(),
            })
            .map_err(|e| {
                engine_error!("nebula::vulkan", "Failed to create GPU allocator: {:?}", e);
                Error::InitializationFailed(format!("Failed to create allocator: {:?}", e))
            })?;

            let upload_pool_create_info = vk::CommandPoolCreateInfo::default()
                .queue_family_index(queue_family)
                .flags(vk::CommandPoolCreateFlags::TRANSIENT | vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);
            let upload_command_pool = device.create_command_pool(&upload_pool_create_info, None).map_err(|e| {
                engine_error!("nebula::vulkan", "Failed to create upload command pool: {:?}", e);
                Error::InitializationFailed(format!("Failed to create upload command pool: {:?}", e))
            })?;

            let bindless_set_layout = Self::create_bindless_layout(&device, max_bindless_descriptors)?;

            // From here on the context owns every handle and destroys them in order
            let ctx = Arc::new(GpuContext::new(
                entry,
                instance,
                physical_device,
                device,
                allocator,
                queue,
                queue_family,
                upload_command_pool,
                bindless_set_layout,
                max_bindless_descriptors,
                debug_utils_loader,
                debug_messenger,
            ));

            engine_info!("nebula::vulkan", "Vulkan device created on '{}' (queue family {}, validation: {}, bindless: {})",
                device_name, queue_family, enable_validation, max_bindless_descriptors);

            Ok(Self { ctx })
        }
    }

    #[cfg(feature = "vulkan-validation")]
    unsafe fn create_debug_messenger(
        entry: &ash::Entry,
        instance: &ash::Instance,
        vulkan_config: &VulkanConfig,
    ) -> Result<(Option<ash::ext::debug_utils::Instance>, Option<vk::DebugUtilsMessengerEXT>)> {
        let debug_utils = ash::ext::debug_utils::Instance::new(entry, instance);
        crate::debug::init_debug_config(vulkan_config.clone());

        let debug_info = vk::DebugUtilsMessengerCreateInfoEXT::default()
            .message_severity(crate::debug::severity_flags(vulkan_config.debug_severity))
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(crate::debug::vulkan_debug_callback));

        let messenger = debug_utils.create_debug_utils_messenger(&debug_info, None).map_err(|e| {
            engine_error!("nebula::vulkan", "Failed to create debug messenger: {:?}", e);
            Error::InitializationFailed(format!("Failed to create debug messenger: {:?}", e))
        })?;

        Ok((Some(debug_utils), Some(messenger)))
    }

    #[cfg(not(feature = "vulkan-validation"))]
    unsafe fn create_debug_messenger(
        _entry: &ash::Entry,
        _instance: &ash::Instance,
        _vulkan_config: &VulkanConfig,
    ) -> Result<(Option<ash::ext::debug_utils::Instance>, Option<vk::DebugUtilsMessengerEXT>)> {
        Ok((None, None))
    }

    /// First GPU with a queue family that supports graphics and can present to `surface`
    unsafe fn pick_physical_device(
        instance: &ash::Instance,
        surface_loader: &ash::khr::surface::Instance,
        surface: vk::SurfaceKHR,
    ) -> Result<(vk::PhysicalDevice, u32)> {
        let physical_devices = instance.enumerate_physical_devices().map_err(|e| {
            engine_error!("nebula::vulkan", "Failed to enumerate physical devices: {:?}", e);
            Error::InitializationFailed(format!("Failed to enumerate physical devices: {:?}", e))
        })?;

        for physical_device in physical_devices {
            let properties = instance.get_physical_device_properties(physical_device);
            if properties.api_version < vk::API_VERSION_1_3 {
                continue;
            }

            let queue_families = instance.get_physical_device_queue_family_properties(physical_device);
            let family = queue_families.iter().enumerate().find(|(i, qf)| {
                qf.queue_flags.contains(vk::QueueFlags::GRAPHICS)
                    && surface_loader
                        .get_physical_device_surface_support(physical_device, *i as u32, surface)
                        .unwrap_or(false)
            });

            if let Some((index, _)) = family {
                return Ok((physical_device, index as u32));
            }
        }

        engine_error!("nebula::vulkan", "No Vulkan 1.3 GPU with a graphics queue that can present to the window");
        Err(Error::InitializationFailed("No suitable Vulkan GPU found".to_string()))
    }

    /// Set 0 of every pipeline layout: one variable-count array of sampled images
    unsafe fn create_bindless_layout(device: &ash::Device, max_descriptors: u32) -> Result<vk::DescriptorSetLayout> {
        let bindings = [vk::DescriptorSetLayoutBinding::default()
            .binding(0)
            .descriptor_type(vk::DescriptorType::SAMPLED_IMAGE)
            .descriptor_count(max_descriptors)
            .stage_flags(vk::ShaderStageFlags::ALL_GRAPHICS)];
        let binding_flags = [vk::DescriptorBindingFlags::PARTIALLY_BOUND
            | vk::DescriptorBindingFlags::UPDATE_AFTER_BIND
            | vk::DescriptorBindingFlags::VARIABLE_DESCRIPTOR_COUNT];
        let mut flags_info = vk::DescriptorSetLayoutBindingFlagsCreateInfo::default()
            .binding_flags(&binding_flags);
        let layout_info = vk::DescriptorSetLayoutCreateInfo::default()
            .flags(vk::DescriptorSetLayoutCreateFlags::UPDATE_AFTER_BIND_POOL)
            .bindings(&bindings)
            .push_next(&mut flags_info);

        device.create_descriptor_set_layout(&layout_info, None).map_err(|e| {
            engine_error!("nebula::vulkan", "Failed to create bindless set layout: {:?}", e);
            Error::InitializationFailed(format!("Failed to create bindless set layout: {:?}", e))
        })
    }

    pub(crate) fn context(&self) -> &Arc<GpuContext> {
        &self.ctx
    }
}

impl GraphicsDevice for VulkanDevice {
    fn create_command_queue(&self) -> Result<Arc<dyn CommandQueue>> {
        Ok(Arc::new(VulkanQueue::new(Arc::clone(&self.ctx))))
    }

    fn create_fence(&self, initial_value: u64) -> Result<Arc<dyn Fence>> {
        Ok(Arc::new(VulkanFence::new(Arc::clone(&self.ctx), initial_value)?))
    }

    fn create_command_list(&self) -> Result<Box<dyn CommandList>> {
        Ok(Box::new(VulkanCommandList::new(Arc::clone(&self.ctx))?))
    }

    fn create_descriptor_heap(&self, kind: DescriptorHeapKind, capacity: u32) -> Result<Arc<dyn DescriptorHeap>> {
        Ok(Arc::new(VulkanDescriptorHeap::new(Arc::clone(&self.ctx), kind, capacity)?))
    }

    fn create_buffer(&self, desc: &BufferDesc) -> Result<Arc<dyn Buffer>> {
        Ok(Arc::new(VulkanBuffer::new(Arc::clone(&self.ctx), desc)?))
    }

    fn create_texture(&self, desc: &TextureDesc) -> Result<Arc<dyn Texture>> {
        Ok(Arc::new(VulkanTexture::new(Arc::clone(&self.ctx), desc)?))
    }

    fn create_pipeline(&self, desc: &PipelineDesc) -> Result<Arc<dyn Pipeline>> {
        Ok(Arc::new(VulkanPipeline::new(Arc::clone(&self.ctx), desc)?))
    }

    fn shader_extension(&self) -> &'static str {
        "spv"
    }

    fn wait_idle(&self) -> Result<()> {
        unsafe { self.ctx.device.device_wait_idle() }
            .map_err(|e| engine_err!("nebula::vulkan", "Failed to wait for device idle: {:?}", e))
    }
}
