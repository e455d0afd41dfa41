/// VulkanSurface - Vulkan implementation of the Surface trait
///
/// Owns the window surface and its swap chain. Back buffers are exposed as
/// non-owning `VulkanTexture`s; their image views are rebuilt on resize.

use ash::vk;
use nebula_engine::nebula::{Error, Result};
use nebula_engine::nebula::device::{
    Surface, Texture, TextureDimension, TextureFormat, TextureInfo, TextureUsage,
};
use nebula_engine::{engine_bail, engine_debug, engine_err, engine_error, engine_info};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use std::sync::Arc;

use crate::vulkan_context::GpuContext;
use crate::vulkan_device::VulkanDevice;
use crate::vulkan_format::vk_to_format;
use crate::vulkan_texture::VulkanTexture;

/// Surface format picked when the window offers it
const PREFERRED_FORMAT: vk::Format = vk::Format::B8G8R8A8_SRGB;

/// Vulkan window surface + swap chain
pub struct VulkanSurface {
    ctx: Arc<GpuContext>,

    surface: vk::SurfaceKHR,
    surface_loader: ash::khr::surface::Instance,

    swapchain: vk::SwapchainKHR,
    swapchain_loader: ash::khr::swapchain::Device,
    surface_format: vk::SurfaceFormatKHR,
    format: TextureFormat,
    extent: vk::Extent2D,
    back_buffers: Vec<Arc<VulkanTexture>>,

    /// One semaphore per acquire slot, signaled when the image is ready
    image_available_semaphores: Vec<vk::Semaphore>,
    /// One semaphore per back buffer, signaled when rendering into it is done
    render_finished_semaphores: Vec<vk::Semaphore>,

    current_frame: usize,
    current_image: usize,
    /// Present interval the swap chain was built for
    immediate: bool,
}

impl VulkanSurface {
    /// Create a surface and swap chain for a window
    ///
    /// # Arguments
    ///
    /// * `device` - Device the back buffers are rendered with
    /// * `window` - Window providing the raw display/window handles
    /// * `width` - Initial width, used when the window does not dictate the extent
    /// * `height` - Initial height
    pub fn new<W>(device: &VulkanDevice, window: &W, width: u32, height: u32) -> Result<Self>
    where
        W: HasDisplayHandle + HasWindowHandle,
    {
        let ctx = Arc::clone(device.context());

        let display_handle = window.display_handle().map_err(|e| {
            engine_error!("nebula::vulkan", "Failed to get display handle: {}", e);
            Error::InitializationFailed(format!("Failed to get display handle: {}", e))
        })?;
        let window_handle = window.window_handle().map_err(|e| {
            engine_error!("nebula::vulkan", "Failed to get window handle: {}", e);
            Error::InitializationFailed(format!("Failed to get window handle: {}", e))
        })?;

        let surface = unsafe {
            ash_window::create_surface(
                &ctx.entry,
                &ctx.instance,
                display_handle.as_raw(),
                window_handle.as_raw(),
                None,
            )
        }
        .map_err(|e| {
            engine_error!("nebula::vulkan", "Failed to create window surface: {:?}", e);
            Error::InitializationFailed(format!("Failed to create surface: {:?}", e))
        })?;
        let surface_loader = ash::khr::surface::Instance::new(&ctx.entry, &ctx.instance);
        let swapchain_loader = ash::khr::swapchain::Device::new(&ctx.instance, &ctx.device);

        let supported = unsafe {
            surface_loader.get_physical_device_surface_support(ctx.physical_device, ctx.queue_family, surface)
        }
        .unwrap_or(false);
        if !supported {
            unsafe { surface_loader.destroy_surface(surface, None) };
            engine_error!("nebula::vulkan", "Graphics queue family {} cannot present to this window", ctx.queue_family);
            return Err(Error::InitializationFailed("Queue family cannot present to the window".to_string()));
        }

        let surface_format = match Self::choose_surface_format(&ctx, &surface_loader, surface) {
            Ok(format) => format,
            Err(e) => {
                unsafe { surface_loader.destroy_surface(surface, None) };
                return Err(e);
            }
        };
        let Some(format) = vk_to_format(surface_format.format) else {
            unsafe { surface_loader.destroy_surface(surface, None) };
            engine_bail!("nebula::vulkan", "Surface format {:?} has no engine equivalent", surface_format.format);
        };

        let mut this = Self {
            ctx,
            surface,
            surface_loader,
            swapchain: vk::SwapchainKHR::null(),
            swapchain_loader,
            surface_format,
            format,
            extent: vk::Extent2D { width, height },
            back_buffers: Vec::new(),
            image_available_semaphores: Vec::new(),
            render_finished_semaphores: Vec::new(),
            current_frame: 0,
            current_image: 0,
            immediate: false,
        };
        this.recreate(width, height)?;

        engine_info!("nebula::vulkan", "Surface created: {}x{} {:?}, {} back buffers",
            this.extent.width, this.extent.height, this.format, this.back_buffers.len());
        Ok(this)
    }

    /// Create a surface for a winit window, sized from its inner size
    pub fn for_winit_window(device: &VulkanDevice, window: &winit::window::Window) -> Result<Self> {
        let size = window.inner_size();
        Self::new(device, window, size.width, size.height)
    }

    fn choose_surface_format(
        ctx: &GpuContext,
        surface_loader: &ash::khr::surface::Instance,
        surface: vk::SurfaceKHR,
    ) -> Result<vk::SurfaceFormatKHR> {
        let formats = unsafe { surface_loader.get_physical_device_surface_formats(ctx.physical_device, surface) }
            .map_err(|e| {
                engine_error!("nebula::vulkan", "Failed to query surface formats: {:?}", e);
                Error::InitializationFailed(format!("Failed to get surface formats: {:?}", e))
            })?;

        formats
            .iter()
            .find(|f| f.format == PREFERRED_FORMAT)
            .or_else(|| formats.iter().find(|f| vk_to_format(f.format).is_some()))
            .copied()
            .ok_or_else(|| {
                engine_error!("nebula::vulkan", "No supported surface format among {:?}", formats);
                Error::InitializationFailed("No supported surface format".to_string())
            })
    }

    fn choose_present_mode(&self) -> vk::PresentModeKHR {
        if !self.immediate {
            return vk::PresentModeKHR::FIFO;
        }
        let modes = unsafe {
            self.surface_loader
                .get_physical_device_surface_present_modes(self.ctx.physical_device, self.surface)
        }
        .unwrap_or_default();
        [vk::PresentModeKHR::MAILBOX, vk::PresentModeKHR::IMMEDIATE]
            .into_iter()
            .find(|mode| modes.contains(mode))
            .unwrap_or(vk::PresentModeKHR::FIFO)
    }

    /// (Re)build the swap chain, its back buffers and semaphores
    fn recreate(&mut self, width: u32, height: u32) -> Result<()> {
        let ctx = Arc::clone(&self.ctx);

        let surface_capabilities = unsafe {
            self.surface_loader
                .get_physical_device_surface_capabilities(ctx.physical_device, self.surface)
        }
        .map_err(|e| {
            engine_error!("nebula::vulkan", "Failed to get surface capabilities: {:?}", e);
            Error::InitializationFailed(format!("Failed to get surface capabilities: {:?}", e))
        })?;

        let extent = if surface_capabilities.current_extent.width != u32::MAX {
            surface_capabilities.current_extent
        } else {
            vk::Extent2D {
                width: width.clamp(
                    surface_capabilities.min_image_extent.width,
                    surface_capabilities.max_image_extent.width,
                ),
                height: height.clamp(
                    surface_capabilities.min_image_extent.height,
                    surface_capabilities.max_image_extent.height,
                ),
            }
        };

        let image_count = surface_capabilities.min_image_count + 1;
        let image_count = if surface_capabilities.max_image_count > 0 {
            image_count.min(surface_capabilities.max_image_count)
        } else {
            image_count
        };

        let old_swapchain = self.swapchain;
        let swapchain_create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(self.surface)
            .min_image_count(image_count)
            .image_format(self.surface_format.format)
            .image_color_space(self.surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(surface_capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(self.choose_present_mode())
            .clipped(true)
            .old_swapchain(old_swapchain);

        let swapchain = unsafe { self.swapchain_loader.create_swapchain(&swapchain_create_info, None) }
            .map_err(|e| {
                engine_error!("nebula::vulkan", "Failed to create swap chain: {:?}", e);
                Error::InitializationFailed(format!("Failed to create swap chain: {:?}", e))
            })?;

        // Old back buffers go before the swap chain that owns their images
        self.back_buffers.clear();
        self.destroy_semaphores();
        if old_swapchain != vk::SwapchainKHR::null() {
            unsafe { self.swapchain_loader.destroy_swapchain(old_swapchain, None) };
        }
        self.swapchain = swapchain;
        self.extent = extent;

        let images = unsafe { self.swapchain_loader.get_swapchain_images(swapchain) }.map_err(|e| {
            engine_error!("nebula::vulkan", "Failed to get swap chain images: {:?}", e);
            Error::InitializationFailed(format!("Failed to get swap chain images: {:?}", e))
        })?;

        for (i, &image) in images.iter().enumerate() {
            let info = TextureInfo {
                label: format!("back_buffer_{}", i),
                width: extent.width,
                height: extent.height,
                format: self.format,
                dimension: TextureDimension::D2,
                mip_levels: 1,
                usage: TextureUsage::RENDER_TARGET,
            };
            self.back_buffers.push(Arc::new(VulkanTexture::from_swapchain_image(Arc::clone(&ctx), image, info)?));
        }

        let semaphore_create_info = vk::SemaphoreCreateInfo::default();
        for _ in 0..images.len() {
            let available = unsafe { ctx.device.create_semaphore(&semaphore_create_info, None) }
                .map_err(|e| engine_err!("nebula::vulkan", "Failed to create image-available semaphore: {:?}", e))?;
            self.image_available_semaphores.push(available);

            let finished = unsafe { ctx.device.create_semaphore(&semaphore_create_info, None) }
                .map_err(|e| engine_err!("nebula::vulkan", "Failed to create render-finished semaphore: {:?}", e))?;
            self.render_finished_semaphores.push(finished);
        }

        self.current_frame = 0;
        self.current_image = 0;
        Ok(())
    }

    fn destroy_semaphores(&mut self) {
        unsafe {
            for semaphore in self.image_available_semaphores.drain(..) {
                self.ctx.device.destroy_semaphore(semaphore, None);
            }
            for semaphore in self.render_finished_semaphores.drain(..) {
                self.ctx.device.destroy_semaphore(semaphore, None);
            }
        }
    }

    pub(crate) fn from_dyn(surface: &dyn Surface) -> &VulkanSurface {
        unsafe { &*(surface as *const dyn Surface as *const VulkanSurface) }
    }

    /// Semaphores a submission rendering into the current back buffer uses
    ///
    /// Returns (wait on acquire, signal for present).
    pub(crate) fn sync_info(&self) -> (vk::Semaphore, vk::Semaphore) {
        (
            self.image_available_semaphores[self.current_frame],
            self.render_finished_semaphores[self.current_image],
        )
    }
}

impl Surface for VulkanSurface {
    fn back_buffer_count(&self) -> usize {
        self.back_buffers.len()
    }

    fn acquire_next_back_buffer(&mut self) -> Result<Option<usize>> {
        let result = unsafe {
            self.swapchain_loader.acquire_next_image(
                self.swapchain,
                u64::MAX,
                self.image_available_semaphores[self.current_frame],
                vk::Fence::null(),
            )
        };

        match result {
            // A suboptimal image still signals the semaphore, so it is rendered
            Ok((image_index, _is_suboptimal)) => {
                self.current_image = image_index as usize;
                Ok(Some(self.current_image))
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                engine_debug!("nebula::vulkan", "Swap chain out of date during acquire");
                Ok(None)
            }
            Err(e) => Err(engine_err!("nebula::vulkan", "Failed to acquire next swap chain image: {:?}", e)),
        }
    }

    fn current_back_buffer_index(&self) -> usize {
        self.current_image
    }

    fn back_buffer(&self, index: usize) -> Arc<dyn Texture> {
        Arc::clone(&self.back_buffers[index]) as Arc<dyn Texture>
    }

    fn present(&mut self, interval: u32) -> Result<bool> {
        let swapchains = [self.swapchain];
        let image_indices = [self.current_image as u32];
        let wait_semaphores = [self.render_finished_semaphores[self.current_image]];

        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        let result = {
            let queue = self.ctx.queue()?;
            unsafe { self.swapchain_loader.queue_present(*queue, &present_info) }
        };
        self.current_frame = (self.current_frame + 1) % self.image_available_semaphores.len();

        // The present mode is fixed per swap chain; a changed interval applies on the next resize
        let interval_changed = (interval == 0) != self.immediate;
        if interval_changed {
            self.immediate = interval == 0;
        }

        match result {
            Ok(false) => Ok(!interval_changed),
            Ok(true) | Err(vk::Result::SUBOPTIMAL_KHR) | Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(false),
            Err(e) => Err(engine_err!("nebula::vulkan", "Failed to present swap chain image: {:?}", e)),
        }
    }

    fn resize(&mut self, width: u32, height: u32) -> Result<()> {
        unsafe { self.ctx.device.device_wait_idle() }
            .map_err(|e| engine_err!("nebula::vulkan", "Failed to wait idle before swap chain resize: {:?}", e))?;
        self.recreate(width, height)?;
        engine_debug!("nebula::vulkan", "Swap chain resized to {}x{}", self.extent.width, self.extent.height);
        Ok(())
    }

    fn extent(&self) -> (u32, u32) {
        (self.extent.width, self.extent.height)
    }

    fn format(&self) -> TextureFormat {
        self.format
    }
}

impl Drop for VulkanSurface {
    fn drop(&mut self) {
        unsafe {
            self.ctx.device.device_wait_idle().ok();
        }
        self.back_buffers.clear();
        self.destroy_semaphores();
        unsafe {
            if self.swapchain != vk::SwapchainKHR::null() {
                self.swapchain_loader.destroy_swapchain(self.swapchain, None);
            }
            self.surface_loader.destroy_surface(self.surface, None);
        }
    }
}
