/*!
# Nebula Engine - Vulkan Backend

Vulkan implementation of the `nebula_engine` graphics device traits, built on
Ash for the Vulkan bindings and gpu-allocator for memory management.

The backend targets Vulkan 1.3: dynamic rendering replaces render passes,
synchronization2 barriers express resource state transitions, fences are
timeline semaphores, and the shader-visible descriptor heap is a bindless
sampled-image array. Root constants, constant-buffer addresses and
descriptor-table indices are all delivered through push constants.

```no_run
use nebula_engine::nebula::RendererConfig;
use nebula_engine_renderer_vulkan::nebula::{VulkanDevice, VulkanSurface};
# fn run(window: &winit::window::Window) -> nebula_engine::nebula::Result<()> {
let config = RendererConfig::default();
let device = VulkanDevice::new(window, &config)?;
let surface = VulkanSurface::for_winit_window(&device, window)?;
# Ok(())
# }
```
*/

mod vulkan_barrier;
mod vulkan_buffer;
mod vulkan_command_list;
mod vulkan_config;
mod vulkan_context;
mod vulkan_descriptor_heap;
mod vulkan_device;
mod vulkan_format;
mod vulkan_pipeline;
mod vulkan_sampler;
mod vulkan_swapchain;
mod vulkan_sync;
mod vulkan_texture;

#[cfg(feature = "vulkan-validation")]
mod debug;

/// Public backend namespace
pub mod nebula {
    pub use crate::vulkan_config::{DebugSeverity, VulkanConfig};
    pub use crate::vulkan_device::VulkanDevice;
    pub use crate::vulkan_swapchain::VulkanSurface;

    #[cfg(feature = "vulkan-validation")]
    pub use crate::debug::{get_validation_stats, print_validation_stats_report, ValidationStats};
}
