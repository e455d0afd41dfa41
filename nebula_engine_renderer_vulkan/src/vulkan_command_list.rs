/// VulkanCommandList - Vulkan implementation of the CommandList trait

use ash::vk;
use nebula_engine::nebula::{Error, Result};
use nebula_engine::nebula::device::{
    Buffer, CommandList, CpuDescriptorHandle, GpuDescriptorHandle, GpuVirtualAddress, IndexType,
    Pipeline, Rect2D, RenderingDesc, Texture, TextureCopyRegion, TransitionBarrier, Viewport,
};
use nebula_engine::{engine_bail, engine_err, engine_error};
use std::sync::Arc;

use crate::vulkan_barrier::image_barrier;
use crate::vulkan_buffer::VulkanBuffer;
use crate::vulkan_context::GpuContext;
use crate::vulkan_format::{aspect_of, index_type_to_vk};
use crate::vulkan_pipeline::{VulkanPipeline, ROOT_STAGES};
use crate::vulkan_texture::VulkanTexture;

/// Vulkan command list implementation
///
/// Owns a command pool with a single primary command buffer; `begin`
/// resets the pool.
pub struct VulkanCommandList {
    ctx: Arc<GpuContext>,
    command_pool: vk::CommandPool,
    command_buffer: vk::CommandBuffer,
    is_recording: bool,
    in_rendering: bool,
    /// Pipeline whose layout receives push constants
    bound_pipeline: Option<Arc<dyn Pipeline>>,
}

impl VulkanCommandList {
    pub(crate) fn new(ctx: Arc<GpuContext>) -> Result<Self> {
        unsafe {
            let command_pool_create_info = vk::CommandPoolCreateInfo::default()
                .queue_family_index(ctx.queue_family);

            let command_pool = ctx.device.create_command_pool(&command_pool_create_info, None)
                .map_err(|e| engine_err!("nebula::vulkan", "Failed to create command pool: {:?}", e))?;

            let command_buffer_allocate_info = vk::CommandBufferAllocateInfo::default()
                .command_pool(command_pool)
                .level(vk::CommandBufferLevel::PRIMARY)
                .command_buffer_count(1);

            let command_buffer = match ctx.device.allocate_command_buffers(&command_buffer_allocate_info) {
                Ok(buffers) => buffers[0],
                Err(e) => {
                    ctx.device.destroy_command_pool(command_pool, None);
                    engine_bail!("nebula::vulkan", "Failed to allocate command buffer: {:?}", e);
                }
            };

            Ok(Self {
                ctx,
                command_pool,
                command_buffer,
                is_recording: false,
                in_rendering: false,
                bound_pipeline: None,
            })
        }
    }

    /// Get the underlying Vulkan command buffer
    pub fn command_buffer(&self) -> vk::CommandBuffer {
        self.command_buffer
    }

    pub(crate) fn from_dyn(list: &dyn CommandList) -> &VulkanCommandList {
        unsafe { &*(list as *const dyn CommandList as *const VulkanCommandList) }
    }

    fn recording(&self) -> Result<vk::CommandBuffer> {
        if !self.is_recording {
            engine_bail!("nebula::vulkan", "Command list not recording");
        }
        Ok(self.command_buffer)
    }

    fn attachment_view(&self, handle: CpuDescriptorHandle) -> Result<vk::ImageView> {
        self.ctx.attachment_view(handle.0).ok_or_else(|| {
            engine_error!("nebula::vulkan", "No attachment view written at handle {:#x}", handle.0);
            Error::InvalidResource(format!("No attachment view at handle {:#x}", handle.0))
        })
    }

    /// Write `data` into the push-constant range of root parameter `parameter`
    fn push_root(&mut self, parameter: u32, byte_offset: u32, data: &[u8]) -> Result<()> {
        let cb = self.recording()?;
        let Some(pipeline) = &self.bound_pipeline else {
            engine_bail!("nebula::vulkan", "Root parameter {} set with no pipeline bound", parameter);
        };
        let pipeline = VulkanPipeline::from_arc(pipeline);

        let Some(&base) = pipeline.root.offsets.get(parameter as usize) else {
            engine_error!("nebula::vulkan", "Pipeline '{}' has no root parameter {}", pipeline.label(), parameter);
            return Err(Error::InvalidResource(format!(
                "Root parameter {} out of range for '{}'",
                parameter,
                pipeline.label()
            )));
        };
        let offset = base + byte_offset;
        if data.len() % 4 != 0 || offset as usize + data.len() > pipeline.root.size as usize {
            engine_error!("nebula::vulkan", "Root write of {} bytes at {} overflows '{}' ({} bytes)",
                data.len(), offset, pipeline.label(), pipeline.root.size);
            return Err(Error::InvalidResource(format!(
                "Root write of {} bytes at offset {} overflows the root signature",
                data.len(),
                offset
            )));
        }

        unsafe {
            self.ctx.device.cmd_push_constants(cb, pipeline.layout, ROOT_STAGES, offset, data);
        }
        Ok(())
    }
}

impl CommandList for VulkanCommandList {
    fn begin(&mut self) -> Result<()> {
        if self.is_recording {
            engine_bail!("nebula::vulkan", "Command list already recording");
        }

        unsafe {
            self.ctx.device
                .reset_command_pool(self.command_pool, vk::CommandPoolResetFlags::empty())
                .map_err(|e| engine_err!("nebula::vulkan", "Failed to reset command pool: {:?}", e))?;

            let begin_info = vk::CommandBufferBeginInfo::default()
                .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
            self.ctx.device
                .begin_command_buffer(self.command_buffer, &begin_info)
                .map_err(|e| engine_err!("nebula::vulkan", "Failed to begin command buffer: {:?}", e))?;
        }

        self.is_recording = true;
        self.bound_pipeline = None;
        Ok(())
    }

    fn end(&mut self) -> Result<()> {
        let cb = self.recording()?;
        if self.in_rendering {
            engine_bail!("nebula::vulkan", "Command list closed inside a rendering scope");
        }

        unsafe { self.ctx.device.end_command_buffer(cb) }
            .map_err(|e| engine_err!("nebula::vulkan", "Failed to end command buffer: {:?}", e))?;

        self.is_recording = false;
        self.bound_pipeline = None;
        Ok(())
    }

    fn resource_barrier(&mut self, barriers: &[TransitionBarrier<'_>]) -> Result<()> {
        let cb = self.recording()?;
        if barriers.is_empty() {
            return Ok(());
        }
        let image_barriers: Vec<vk::ImageMemoryBarrier2> = barriers.iter().map(image_barrier).collect();
        let dependency = vk::DependencyInfo::default().image_memory_barriers(&image_barriers);
        unsafe { self.ctx.device.cmd_pipeline_barrier2(cb, &dependency) };
        Ok(())
    }

    fn begin_rendering(&mut self, desc: &RenderingDesc) -> Result<()> {
        let cb = self.recording()?;
        if self.in_rendering {
            engine_bail!("nebula::vulkan", "begin_rendering called inside a rendering scope");
        }

        let color_attachments = desc
            .color
            .iter()
            .map(|attachment| {
                let view = self.attachment_view(attachment.view)?;
                let info = vk::RenderingAttachmentInfo::default()
                    .image_view(view)
                    .image_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
                    .store_op(vk::AttachmentStoreOp::STORE);
                Ok(match attachment.clear {
                    Some(color) => info
                        .load_op(vk::AttachmentLoadOp::CLEAR)
                        .clear_value(vk::ClearValue { color: vk::ClearColorValue { float32: color } }),
                    None => info.load_op(vk::AttachmentLoadOp::LOAD),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let depth_attachment = match &desc.depth {
            Some(attachment) => {
                let view = self.attachment_view(attachment.view)?;
                let info = vk::RenderingAttachmentInfo::default()
                    .image_view(view)
                    .image_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL)
                    .store_op(vk::AttachmentStoreOp::STORE);
                Some(match attachment.clear {
                    Some(depth) => info.load_op(vk::AttachmentLoadOp::CLEAR).clear_value(vk::ClearValue {
                        depth_stencil: vk::ClearDepthStencilValue { depth, stencil: 0 },
                    }),
                    None => info.load_op(vk::AttachmentLoadOp::LOAD),
                })
            }
            None => None,
        };

        let mut rendering_info = vk::RenderingInfo::default()
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent: vk::Extent2D { width: desc.width, height: desc.height },
            })
            .layer_count(1)
            .color_attachments(&color_attachments);
        if let Some(depth) = &depth_attachment {
            rendering_info = rendering_info.depth_attachment(depth);
        }

        unsafe { self.ctx.device.cmd_begin_rendering(cb, &rendering_info) };
        self.in_rendering = true;
        Ok(())
    }

    fn end_rendering(&mut self) -> Result<()> {
        let cb = self.recording()?;
        if !self.in_rendering {
            engine_bail!("nebula::vulkan", "end_rendering called outside a rendering scope");
        }
        unsafe { self.ctx.device.cmd_end_rendering(cb) };
        self.in_rendering = false;
        Ok(())
    }

    fn set_viewport(&mut self, viewport: Viewport) -> Result<()> {
        let cb = self.recording()?;
        let vk_viewport = vk::Viewport {
            x: viewport.x,
            y: viewport.y,
            width: viewport.width,
            height: viewport.height,
            min_depth: viewport.min_depth,
            max_depth: viewport.max_depth,
        };
        unsafe { self.ctx.device.cmd_set_viewport(cb, 0, &[vk_viewport]) };
        Ok(())
    }

    fn set_scissor(&mut self, scissor: Rect2D) -> Result<()> {
        let cb = self.recording()?;
        let vk_scissor = vk::Rect2D {
            offset: vk::Offset2D { x: scissor.x, y: scissor.y },
            extent: vk::Extent2D { width: scissor.width, height: scissor.height },
        };
        unsafe { self.ctx.device.cmd_set_scissor(cb, 0, &[vk_scissor]) };
        Ok(())
    }

    fn set_pipeline(&mut self, pipeline: &Arc<dyn Pipeline>) -> Result<()> {
        let cb = self.recording()?;
        let vk_pipeline = VulkanPipeline::from_arc(pipeline);

        unsafe {
            self.ctx.device.cmd_bind_pipeline(cb, vk::PipelineBindPoint::GRAPHICS, vk_pipeline.pipeline);

            match self.ctx.bindless_heap() {
                Some(heap) => self.ctx.device.cmd_bind_descriptor_sets(
                    cb,
                    vk::PipelineBindPoint::GRAPHICS,
                    vk_pipeline.layout,
                    0,
                    &[heap.set, vk_pipeline.sampler_set],
                    &[],
                ),
                None => self.ctx.device.cmd_bind_descriptor_sets(
                    cb,
                    vk::PipelineBindPoint::GRAPHICS,
                    vk_pipeline.layout,
                    1,
                    &[vk_pipeline.sampler_set],
                    &[],
                ),
            }
        }

        self.bound_pipeline = Some(Arc::clone(pipeline));
        Ok(())
    }

    fn set_root_constants(&mut self, parameter: u32, dest_offset: u32, data: &[u8]) -> Result<()> {
        self.push_root(parameter, dest_offset * 4, data)
    }

    fn set_root_constant_buffer(&mut self, parameter: u32, address: GpuVirtualAddress) -> Result<()> {
        self.push_root(parameter, 0, &address.0.to_le_bytes())
    }

    fn set_root_descriptor_table(&mut self, parameter: u32, base: GpuDescriptorHandle) -> Result<()> {
        let Some(heap) = self.ctx.bindless_heap() else {
            engine_bail!("nebula::vulkan", "Descriptor table bound with no shader-visible heap");
        };
        let Some(offset) = base.0.checked_sub(heap.gpu_start) else {
            engine_error!("nebula::vulkan", "Descriptor table base {:#x} is not in the shader-visible heap", base.0);
            return Err(Error::InvalidResource(format!("Descriptor table base {:#x} outside heap", base.0)));
        };
        let index = (offset / heap.increment) as u32;
        self.push_root(parameter, 0, &index.to_le_bytes())
    }

    fn set_vertex_buffer(&mut self, buffer: &Arc<dyn Buffer>, _stride: u32) -> Result<()> {
        // The stride is baked into the pipeline's vertex input state
        let cb = self.recording()?;
        let vk_buffer = VulkanBuffer::from_arc(buffer);
        unsafe { self.ctx.device.cmd_bind_vertex_buffers(cb, 0, &[vk_buffer.buffer], &[0]) };
        Ok(())
    }

    fn set_index_buffer(&mut self, buffer: &Arc<dyn Buffer>, index_type: IndexType) -> Result<()> {
        let cb = self.recording()?;
        let vk_buffer = VulkanBuffer::from_arc(buffer);
        unsafe {
            self.ctx.device.cmd_bind_index_buffer(cb, vk_buffer.buffer, 0, index_type_to_vk(index_type));
        }
        Ok(())
    }

    fn draw(&mut self, vertex_count: u32, first_vertex: u32) -> Result<()> {
        let cb = self.recording()?;
        unsafe { self.ctx.device.cmd_draw(cb, vertex_count, 1, first_vertex, 0) };
        Ok(())
    }

    fn draw_indexed(&mut self, index_count: u32, first_index: u32, vertex_offset: i32) -> Result<()> {
        let cb = self.recording()?;
        unsafe { self.ctx.device.cmd_draw_indexed(cb, index_count, 1, first_index, vertex_offset, 0) };
        Ok(())
    }

    fn copy_buffer_to_texture(
        &mut self,
        src: &Arc<dyn Buffer>,
        dst: &dyn Texture,
        regions: &[TextureCopyRegion],
    ) -> Result<()> {
        let cb = self.recording()?;
        let vk_buffer = VulkanBuffer::from_arc(src);
        let texture = VulkanTexture::from_dyn(dst);

        let copies: Vec<vk::BufferImageCopy> = regions
            .iter()
            .map(|region| vk::BufferImageCopy {
                buffer_offset: region.buffer_offset,
                buffer_row_length: 0,
                buffer_image_height: 0,
                image_subresource: vk::ImageSubresourceLayers {
                    aspect_mask: aspect_of(texture.info.format),
                    mip_level: region.mip_level,
                    base_array_layer: region.array_layer,
                    layer_count: 1,
                },
                image_offset: vk::Offset3D { x: 0, y: 0, z: 0 },
                image_extent: vk::Extent3D {
                    width: region.width,
                    height: region.height,
                    depth: 1,
                },
            })
            .collect();

        unsafe {
            self.ctx.device.cmd_copy_buffer_to_image(
                cb,
                vk_buffer.buffer,
                texture.image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &copies,
            );
        }
        Ok(())
    }
}

impl Drop for VulkanCommandList {
    fn drop(&mut self) {
        unsafe {
            // Destroying the pool frees its command buffer
            self.ctx.device.destroy_command_pool(self.command_pool, None);
        }
    }
}
