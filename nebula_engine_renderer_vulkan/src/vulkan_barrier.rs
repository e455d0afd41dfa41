/// Resource state to image layout / pipeline stage / access mapping

use ash::vk;
use nebula_engine::nebula::device::{ResourceState, TextureInfo, TransitionBarrier};

use crate::vulkan_format::aspect_of;
use crate::vulkan_texture::VulkanTexture;

/// Synchronization scope of one resource state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct StateScope {
    pub layout: vk::ImageLayout,
    pub stage: vk::PipelineStageFlags2,
    pub access: vk::AccessFlags2,
}

/// Layout the image is in while in `state`
pub(crate) fn state_layout(state: ResourceState) -> vk::ImageLayout {
    match state {
        ResourceState::Common | ResourceState::GenericRead => vk::ImageLayout::GENERAL,
        ResourceState::Present => vk::ImageLayout::PRESENT_SRC_KHR,
        ResourceState::RenderTarget => vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        ResourceState::DepthWrite => vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        ResourceState::DepthRead => vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL,
        ResourceState::ShaderResource => vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        ResourceState::CopyDest => vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        ResourceState::CopySource => vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
    }
}

fn state_stage_access(state: ResourceState) -> (vk::PipelineStageFlags2, vk::AccessFlags2) {
    match state {
        ResourceState::Common => (
            vk::PipelineStageFlags2::ALL_COMMANDS,
            vk::AccessFlags2::MEMORY_READ | vk::AccessFlags2::MEMORY_WRITE,
        ),
        ResourceState::GenericRead => (
            vk::PipelineStageFlags2::ALL_COMMANDS,
            vk::AccessFlags2::MEMORY_READ,
        ),
        ResourceState::Present => (
            vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
            vk::AccessFlags2::NONE,
        ),
        ResourceState::RenderTarget => (
            vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
            vk::AccessFlags2::COLOR_ATTACHMENT_READ | vk::AccessFlags2::COLOR_ATTACHMENT_WRITE,
        ),
        ResourceState::DepthWrite => (
            vk::PipelineStageFlags2::EARLY_FRAGMENT_TESTS | vk::PipelineStageFlags2::LATE_FRAGMENT_TESTS,
            vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_READ
                | vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_WRITE,
        ),
        ResourceState::DepthRead => (
            vk::PipelineStageFlags2::EARLY_FRAGMENT_TESTS
                | vk::PipelineStageFlags2::LATE_FRAGMENT_TESTS
                | vk::PipelineStageFlags2::FRAGMENT_SHADER,
            vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_READ | vk::AccessFlags2::SHADER_SAMPLED_READ,
        ),
        ResourceState::ShaderResource => (
            vk::PipelineStageFlags2::VERTEX_SHADER | vk::PipelineStageFlags2::FRAGMENT_SHADER,
            vk::AccessFlags2::SHADER_SAMPLED_READ,
        ),
        ResourceState::CopyDest => (
            vk::PipelineStageFlags2::COPY,
            vk::AccessFlags2::TRANSFER_WRITE,
        ),
        ResourceState::CopySource => (
            vk::PipelineStageFlags2::COPY,
            vk::AccessFlags2::TRANSFER_READ,
        ),
    }
}

/// Scope of `state` on the source side of a barrier
///
/// A presented image is never read back, so leaving `Present` discards its
/// contents (`UNDEFINED`). Stage-wise it waits on color output, the stage the
/// acquire semaphore is waited at.
pub(crate) fn source_scope(state: ResourceState) -> StateScope {
    let (stage, access) = state_stage_access(state);
    let layout = match state {
        ResourceState::Present => vk::ImageLayout::UNDEFINED,
        other => state_layout(other),
    };
    StateScope { layout, stage, access }
}

/// Scope of `state` on the destination side of a barrier
pub(crate) fn destination_scope(state: ResourceState) -> StateScope {
    let (stage, access) = match state {
        ResourceState::Present => (vk::PipelineStageFlags2::BOTTOM_OF_PIPE, vk::AccessFlags2::NONE),
        other => state_stage_access(other),
    };
    StateScope { layout: state_layout(state), stage, access }
}

/// Every mip and layer of a texture
pub(crate) fn full_range(info: &TextureInfo) -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange {
        aspect_mask: aspect_of(info.format),
        base_mip_level: 0,
        level_count: info.mip_levels,
        base_array_layer: 0,
        layer_count: info.array_layers(),
    }
}

/// Build the image barrier of one engine transition
pub(crate) fn image_barrier(barrier: &TransitionBarrier<'_>) -> vk::ImageMemoryBarrier2<'static> {
    let texture = VulkanTexture::from_dyn(barrier.texture);
    let src = source_scope(barrier.before);
    let dst = destination_scope(barrier.after);
    vk::ImageMemoryBarrier2::default()
        .src_stage_mask(src.stage)
        .src_access_mask(src.access)
        .dst_stage_mask(dst.stage)
        .dst_access_mask(dst.access)
        .old_layout(src.layout)
        .new_layout(dst.layout)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(texture.image)
        .subresource_range(full_range(&texture.info))
}

#[cfg(test)]
#[path = "vulkan_barrier_tests.rs"]
mod tests;
