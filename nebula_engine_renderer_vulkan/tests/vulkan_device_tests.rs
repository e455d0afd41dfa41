//! Integration tests for the Vulkan GraphicsDevice backend
//!
//! Require a GPU and a window system, so the test is marked with #[ignore].
//! winit allows one event loop per process: a single test opens the window
//! and runs every check against one device.
//!
//! Run with: cargo test -p nebula_engine_renderer_vulkan --test vulkan_device_tests -- --ignored

use nebula_engine::nebula::device::{
    BufferDesc, BufferUsage, ColorAttachment, CommandList, DescriptorHeapKind, DescriptorView,
    GraphicsDevice, Rect2D, RenderingDesc, ResourceState, Surface, TextureCopyRegion, TextureDesc,
    TextureDimension, TextureFormat, TextureUsage, TransitionBarrier, Viewport,
};
use nebula_engine::nebula::{Error, RendererConfig};
use nebula_engine_renderer_vulkan::nebula::{VulkanDevice, VulkanSurface};
use std::time::Duration;
use winit::event_loop::EventLoop;
use winit::window::Window;

/// Helper to create a hidden test window for Vulkan
#[allow(deprecated)]
fn create_test_window() -> (Window, EventLoop<()>) {
    let event_loop = EventLoop::new().unwrap();
    let window_attrs = Window::default_attributes()
        .with_title("Vulkan GraphicsDevice Test")
        .with_inner_size(winit::dpi::PhysicalSize::new(320, 240))
        .with_visible(false);
    let window = event_loop.create_window(window_attrs).unwrap();
    (window, event_loop)
}

fn test_config() -> RendererConfig {
    RendererConfig {
        app_name: "Vulkan Device Test".to_string(),
        enable_validation: true,
        ..RendererConfig::default()
    }
}

fn color_target_desc(label: &str, width: u32, height: u32) -> TextureDesc {
    TextureDesc {
        label: label.to_string(),
        width,
        height,
        format: TextureFormat::R8G8B8A8_UNORM,
        dimension: TextureDimension::D2,
        mip_levels: 1,
        usage: TextureUsage::RENDER_TARGET | TextureUsage::SAMPLED,
        initial_state: ResourceState::RenderTarget,
    }
}

// ============================================================================
// RESOURCE TESTS
// ============================================================================

fn check_create_texture_reports_info(device: &VulkanDevice) {
    let texture = device
        .create_texture(&TextureDesc {
            label: "cube".to_string(),
            width: 64,
            height: 64,
            format: TextureFormat::R16G16B16A16_SFLOAT,
            dimension: TextureDimension::Cube,
            mip_levels: 7,
            usage: TextureUsage::SAMPLED | TextureUsage::RENDER_TARGET,
            initial_state: ResourceState::ShaderResource,
        })
        .unwrap();

    let info = texture.info();
    assert_eq!(info.label, "cube");
    assert_eq!(info.mip_levels, 7);
    assert_eq!(info.array_layers(), 6);
    assert_eq!(info.mip_extent(6), (1, 1));
}

fn check_buffer_write_and_bounds(device: &VulkanDevice) {
    let buffer = device
        .create_buffer(&BufferDesc {
            label: "constants".to_string(),
            size: 256,
            usage: BufferUsage::Constant,
        })
        .unwrap();

    assert_eq!(buffer.size(), 256);
    assert_ne!(buffer.gpu_address().0, 0);
    buffer.write(0, &[1u8; 256]).unwrap();
    assert!(matches!(buffer.write(200, &[0u8; 64]), Err(Error::InvalidResource(_))));
}

fn check_descriptor_heap_handles(device: &VulkanDevice) {
    let rtv = device.create_descriptor_heap(DescriptorHeapKind::RenderTarget, 4).unwrap();
    let srv = device.create_descriptor_heap(DescriptorHeapKind::ShaderResource, 16).unwrap();

    assert!(rtv.gpu_start().is_none());
    assert!(srv.gpu_start().is_some());
    assert_ne!(rtv.cpu_start(), srv.cpu_start());

    let texture = device.create_texture(&color_target_desc("target", 32, 32)).unwrap();
    rtv.write_view(
        rtv.cpu_start(),
        DescriptorView::RenderTarget { texture: texture.as_ref(), mip: 0, array_layer: 0 },
    )
    .unwrap();

    // A shader-resource view cannot go into a render-target heap
    let result = rtv.write_view(rtv.cpu_start(), DescriptorView::ShaderResource { texture: texture.as_ref() });
    assert!(matches!(result, Err(Error::InvalidResource(_))));
}

fn check_only_one_shader_visible_heap(device: &VulkanDevice) {
    let _srv = device.create_descriptor_heap(DescriptorHeapKind::ShaderResource, 16).unwrap();
    assert!(device.create_descriptor_heap(DescriptorHeapKind::ShaderResource, 16).is_err());
}

// ============================================================================
// SUBMISSION TESTS
// ============================================================================

fn check_fence_signal_and_wait(device: &VulkanDevice) {
    let queue = device.create_command_queue().unwrap();
    let fence = device.create_fence(0).unwrap();
    assert_eq!(fence.completed_value().unwrap(), 0);

    queue.signal(fence.as_ref(), 1).unwrap();
    assert!(fence.wait(1, Duration::from_secs(5)).unwrap());
    assert!(fence.completed_value().unwrap() >= 1);

    // Nothing will ever signal 10
    assert!(!fence.wait(10, Duration::from_millis(10)).unwrap());
}

fn check_clear_and_upload_submission(device: &VulkanDevice) {
    let queue = device.create_command_queue().unwrap();
    let fence = device.create_fence(0).unwrap();
    let rtv = device.create_descriptor_heap(DescriptorHeapKind::RenderTarget, 1).unwrap();
    let target = device.create_texture(&color_target_desc("target", 16, 16)).unwrap();
    rtv.write_view(
        rtv.cpu_start(),
        DescriptorView::RenderTarget { texture: target.as_ref(), mip: 0, array_layer: 0 },
    )
    .unwrap();

    let sampled = device
        .create_texture(&TextureDesc {
            label: "upload".to_string(),
            width: 4,
            height: 4,
            format: TextureFormat::R8G8B8A8_UNORM,
            dimension: TextureDimension::D2,
            mip_levels: 1,
            usage: TextureUsage::SAMPLED | TextureUsage::COPY_DST,
            initial_state: ResourceState::CopyDest,
        })
        .unwrap();
    let staging = device
        .create_buffer(&BufferDesc { label: "staging".to_string(), size: 64, usage: BufferUsage::Upload })
        .unwrap();
    staging.write(0, &[255u8; 64]).unwrap();

    let mut list = device.create_command_list().unwrap();
    list.begin().unwrap();
    list.copy_buffer_to_texture(
        &staging,
        sampled.as_ref(),
        &[TextureCopyRegion { buffer_offset: 0, mip_level: 0, array_layer: 0, width: 4, height: 4 }],
    )
    .unwrap();
    list.resource_barrier(&[TransitionBarrier {
        texture: sampled.as_ref(),
        before: ResourceState::CopyDest,
        after: ResourceState::ShaderResource,
    }])
    .unwrap();
    list.begin_rendering(&RenderingDesc {
        color: vec![ColorAttachment { view: rtv.cpu_start(), clear: Some([0.1, 0.2, 0.3, 1.0]) }],
        depth: None,
        width: 16,
        height: 16,
    })
    .unwrap();
    list.set_viewport(Viewport::from_extent(16, 16)).unwrap();
    list.set_scissor(Rect2D::from_extent(16, 16)).unwrap();
    list.end_rendering().unwrap();
    list.end().unwrap();

    queue.execute(list.as_ref(), None).unwrap();
    queue.signal(fence.as_ref(), 1).unwrap();
    assert!(fence.wait(1, Duration::from_secs(5)).unwrap());
}

fn check_command_list_state_errors(device: &VulkanDevice) {
    let mut list = device.create_command_list().unwrap();
    // Created closed
    assert!(list.end().is_err());
    assert!(list.draw(3, 0).is_err());

    list.begin().unwrap();
    assert!(list.begin().is_err());
    // No pipeline bound
    assert!(list.set_root_constants(0, 0, &[0u8; 4]).is_err());
    assert!(list.end_rendering().is_err());
    list.end().unwrap();
}

// ============================================================================
// SURFACE TESTS
// ============================================================================

fn check_surface_present_cycle(device: &VulkanDevice, window: &Window) {
    let mut surface = VulkanSurface::for_winit_window(device, window).unwrap();

    assert!(surface.back_buffer_count() >= 2);
    assert!(matches!(
        surface.format(),
        TextureFormat::B8G8R8A8_SRGB
            | TextureFormat::B8G8R8A8_UNORM
            | TextureFormat::R8G8B8A8_SRGB
            | TextureFormat::R8G8B8A8_UNORM
    ));

    let queue = device.create_command_queue().unwrap();
    let fence = device.create_fence(0).unwrap();
    let mut list = device.create_command_list().unwrap();

    let Some(index) = surface.acquire_next_back_buffer().unwrap() else {
        return;
    };
    assert_eq!(surface.current_back_buffer_index(), index);
    let back_buffer = surface.back_buffer(index);

    list.begin().unwrap();
    list.resource_barrier(&[TransitionBarrier {
        texture: back_buffer.as_ref(),
        before: ResourceState::Present,
        after: ResourceState::RenderTarget,
    }])
    .unwrap();
    list.resource_barrier(&[TransitionBarrier {
        texture: back_buffer.as_ref(),
        before: ResourceState::RenderTarget,
        after: ResourceState::Present,
    }])
    .unwrap();
    list.end().unwrap();

    queue.execute(list.as_ref(), Some(&surface as &dyn Surface)).unwrap();
    surface.present(1).unwrap();
    queue.signal(fence.as_ref(), 1).unwrap();
    assert!(fence.wait(1, Duration::from_secs(5)).unwrap());

    drop(back_buffer);
    surface.resize(200, 150).unwrap();
    assert!(surface.back_buffer_count() >= 2);
}

// ============================================================================
// RUNNER
// ============================================================================

#[test]
#[ignore] // Requires GPU and display
fn test_vulkan_device() {
    let (window, _event_loop) = create_test_window();
    let device = VulkanDevice::new(&window, &test_config()).unwrap();

    check_create_texture_reports_info(&device);
    check_buffer_write_and_bounds(&device);
    check_descriptor_heap_handles(&device);
    check_only_one_shader_visible_heap(&device);
    check_fence_signal_and_wait(&device);
    check_clear_and_upload_submission(&device);
    check_command_list_state_errors(&device);
    check_surface_present_cycle(&device, &window);
    device.wait_idle().unwrap();
}
