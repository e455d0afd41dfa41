/// VulkanPipeline - Vulkan implementation of the Pipeline trait
///
/// The root signature becomes one push-constant block shared by the vertex
/// and fragment stages:
/// - `Constants` parameters are inlined (4 bytes per value)
/// - `ConstantBuffer` parameters are 8-byte buffer device addresses
/// - `DescriptorTable` parameters are u32 base indices into the bindless array
///
/// Set 0 is the bindless sampled-image array, set 1 holds the static
/// samplers as immutable samplers (binding `i` = register `s<i>`).

use ash::vk;
use nebula_engine::nebula::{Error, Result};
use nebula_engine::nebula::device::{
    BlendMode, Pipeline, PipelineDesc, RootParameter, RootSignatureDesc, ShaderBytecode,
};
use nebula_engine::{engine_err, engine_error, engine_debug};
use std::io::Cursor;
use std::sync::Arc;

use crate::vulkan_context::GpuContext;
use crate::vulkan_format::{
    compare_op_to_vk, cull_mode_to_vk, format_to_vk, front_face_to_vk, topology_to_vk,
};

/// Stages every root parameter is visible to
pub(crate) const ROOT_STAGES: vk::ShaderStageFlags = vk::ShaderStageFlags::from_raw(
    vk::ShaderStageFlags::VERTEX.as_raw() | vk::ShaderStageFlags::FRAGMENT.as_raw(),
);

/// Byte offsets of the root parameters inside the push-constant block
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RootLayout {
    pub offsets: Vec<u32>,
    pub size: u32,
}

pub(crate) fn root_layout(desc: &RootSignatureDesc) -> RootLayout {
    let mut offsets = Vec::with_capacity(desc.parameters.len());
    let mut offset = 0u32;
    for parameter in &desc.parameters {
        let (align, size) = match parameter {
            RootParameter::Constants { num_values, .. } => (4, num_values * 4),
            RootParameter::ConstantBuffer { .. } => (8, 8),
            RootParameter::DescriptorTable { .. } => (4, 4),
        };
        offset = offset.next_multiple_of(align);
        offsets.push(offset);
        offset += size;
    }
    RootLayout { offsets, size: offset }
}

pub(crate) fn blend_attachment(mode: BlendMode) -> vk::PipelineColorBlendAttachmentState {
    let attachment = vk::PipelineColorBlendAttachmentState::default()
        .color_write_mask(vk::ColorComponentFlags::RGBA);
    match mode {
        BlendMode::Opaque => attachment.blend_enable(false),
        BlendMode::AlphaBlend => attachment
            .blend_enable(true)
            .src_color_blend_factor(vk::BlendFactor::SRC_ALPHA)
            .dst_color_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
            .color_blend_op(vk::BlendOp::ADD)
            .src_alpha_blend_factor(vk::BlendFactor::ONE)
            .dst_alpha_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
            .alpha_blend_op(vk::BlendOp::ADD),
    }
}

/// Vulkan pipeline implementation
pub struct VulkanPipeline {
    ctx: Arc<GpuContext>,
    label: String,
    pub(crate) pipeline: vk::Pipeline,
    pub(crate) layout: vk::PipelineLayout,
    sampler_set_layout: vk::DescriptorSetLayout,
    pub(crate) sampler_set: vk::DescriptorSet,
    pub(crate) root: RootLayout,
}

fn create_shader_module(device: &ash::Device, shader: &ShaderBytecode) -> Result<vk::ShaderModule> {
    let code = ash::util::read_spv(&mut Cursor::new(&shader.code)).map_err(|e| {
        engine_error!("nebula::vulkan", "Shader '{}' is not valid SPIR-V: {}", shader.name, e);
        Error::InvalidResource(format!("Shader '{}' is not valid SPIR-V: {}", shader.name, e))
    })?;
    let create_info = vk::ShaderModuleCreateInfo::default().code(&code);
    unsafe { device.create_shader_module(&create_info, None) }
        .map_err(|e| engine_err!("nebula::vulkan", "Failed to create shader module '{}': {:?}", shader.name, e))
}

impl VulkanPipeline {
    pub(crate) fn new(ctx: Arc<GpuContext>, desc: &PipelineDesc) -> Result<Self> {
        desc.root_signature.validate()?;
        let root = root_layout(&desc.root_signature);

        let limits = unsafe { ctx.instance.get_physical_device_properties(ctx.physical_device) }.limits;
        if root.size > limits.max_push_constants_size {
            engine_error!("nebula::vulkan", "Pipeline '{}' needs {} push-constant bytes, device allows {}",
                desc.label, root.size, limits.max_push_constants_size);
            return Err(Error::InvalidResource(format!(
                "Root signature of '{}' needs {} bytes of push constants",
                desc.label, root.size
            )));
        }

        let device = &ctx.device;

        // Set 1: static samplers
        let samplers = desc
            .root_signature
            .static_samplers
            .iter()
            .map(|&sampler| ctx.sampler(sampler))
            .collect::<Result<Vec<_>>>()?;
        let sampler_bindings: Vec<vk::DescriptorSetLayoutBinding> = samplers
            .iter()
            .enumerate()
            .map(|(i, sampler)| {
                vk::DescriptorSetLayoutBinding::default()
                    .binding(i as u32)
                    .descriptor_type(vk::DescriptorType::SAMPLER)
                    .descriptor_count(1)
                    .stage_flags(ROOT_STAGES)
                    .immutable_samplers(std::slice::from_ref(sampler))
            })
            .collect();
        let sampler_layout_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&sampler_bindings);
        let sampler_set_layout = unsafe { device.create_descriptor_set_layout(&sampler_layout_info, None) }
            .map_err(|e| engine_err!("nebula::vulkan", "Failed to create sampler set layout: {:?}", e))?;

        // Layout: bindless images + samplers + push constants
        let set_layouts = [ctx.bindless_set_layout, sampler_set_layout];
        let push_constant_ranges = [vk::PushConstantRange {
            stage_flags: ROOT_STAGES,
            offset: 0,
            size: root.size,
        }];
        let mut layout_create_info = vk::PipelineLayoutCreateInfo::default().set_layouts(&set_layouts);
        if root.size > 0 {
            layout_create_info = layout_create_info.push_constant_ranges(&push_constant_ranges);
        }
        let layout = match unsafe { device.create_pipeline_layout(&layout_create_info, None) } {
            Ok(layout) => layout,
            Err(e) => {
                unsafe { device.destroy_descriptor_set_layout(sampler_set_layout, None) };
                return Err(engine_err!("nebula::vulkan", "Failed to create pipeline layout: {:?}", e));
            }
        };

        let mut pipeline = Self {
            ctx: Arc::clone(&ctx),
            label: desc.label.clone(),
            pipeline: vk::Pipeline::null(),
            layout,
            sampler_set_layout,
            sampler_set: vk::DescriptorSet::null(),
            root,
        };

        pipeline.sampler_set = ctx.allocate_sampler_set(sampler_set_layout)?;
        pipeline.pipeline = Self::create_graphics_pipeline(device, desc, layout)?;

        engine_debug!("nebula::vulkan", "Pipeline '{}' created ({} push-constant bytes)",
            desc.label, pipeline.root.size);
        Ok(pipeline)
    }

    fn create_graphics_pipeline(
        device: &ash::Device,
        desc: &PipelineDesc,
        layout: vk::PipelineLayout,
    ) -> Result<vk::Pipeline> {
        let vertex_module = create_shader_module(device, &desc.vertex_shader)?;
        let pixel_module = match &desc.pixel_shader {
            Some(shader) => match create_shader_module(device, shader) {
                Ok(module) => Some(module),
                Err(e) => {
                    unsafe { device.destroy_shader_module(vertex_module, None) };
                    return Err(e);
                }
            },
            None => None,
        };

        let mut shader_stages = vec![vk::PipelineShaderStageCreateInfo::default()
            .stage(vk::ShaderStageFlags::VERTEX)
            .module(vertex_module)
            .name(c"main")];
        if let Some(module) = pixel_module {
            shader_stages.push(
                vk::PipelineShaderStageCreateInfo::default()
                    .stage(vk::ShaderStageFlags::FRAGMENT)
                    .module(module)
                    .name(c"main"),
            );
        }

        // Vertex input: one interleaved binding, attribute i at location i
        let vertex_bindings = [vk::VertexInputBindingDescription {
            binding: 0,
            stride: desc.vertex_stride,
            input_rate: vk::VertexInputRate::VERTEX,
        }];
        let vertex_attributes: Vec<vk::VertexInputAttributeDescription> = desc
            .input_layout
            .iter()
            .enumerate()
            .map(|(location, element)| vk::VertexInputAttributeDescription {
                location: location as u32,
                binding: 0,
                format: format_to_vk(element.format),
                offset: element.offset,
            })
            .collect();
        let mut vertex_input_state = vk::PipelineVertexInputStateCreateInfo::default();
        if !vertex_attributes.is_empty() {
            vertex_input_state = vertex_input_state
                .vertex_binding_descriptions(&vertex_bindings)
                .vertex_attribute_descriptions(&vertex_attributes);
        }

        let input_assembly_state = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(topology_to_vk(desc.topology))
            .primitive_restart_enable(false);

        // Viewport state (dynamic)
        let viewports = [vk::Viewport::default()];
        let scissors = [vk::Rect2D::default()];
        let viewport_state = vk::PipelineViewportStateCreateInfo::default()
            .viewports(&viewports)
            .scissors(&scissors);

        let rasterization_state = {
            let info = vk::PipelineRasterizationStateCreateInfo::default()
                .depth_clamp_enable(false)
                .rasterizer_discard_enable(false)
                .polygon_mode(vk::PolygonMode::FILL)
                .line_width(1.0)
                .cull_mode(cull_mode_to_vk(desc.rasterization.cull_mode))
                .front_face(front_face_to_vk(desc.rasterization.front_face));
            match desc.rasterization.depth_bias {
                Some(bias) => info
                    .depth_bias_enable(true)
                    .depth_bias_constant_factor(bias.constant_factor)
                    .depth_bias_slope_factor(bias.slope_factor)
                    .depth_bias_clamp(bias.clamp),
                None => info.depth_bias_enable(false),
            }
        };

        let depth_stencil_state = vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_test_enable(desc.depth_stencil.depth_test_enable)
            .depth_write_enable(desc.depth_stencil.depth_write_enable)
            .depth_compare_op(compare_op_to_vk(desc.depth_stencil.depth_compare_op))
            .depth_bounds_test_enable(false)
            .stencil_test_enable(false);

        let multisample_state = vk::PipelineMultisampleStateCreateInfo::default()
            .sample_shading_enable(false)
            .rasterization_samples(vk::SampleCountFlags::TYPE_1);

        let blend_attachments = vec![blend_attachment(desc.blend); desc.color_formats.len()];
        let color_blend_state = vk::PipelineColorBlendStateCreateInfo::default()
            .logic_op_enable(false)
            .attachments(&blend_attachments);

        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state = vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

        // Dynamic rendering: attachment formats instead of a render pass
        let color_formats: Vec<vk::Format> = desc.color_formats.iter().map(|&f| format_to_vk(f)).collect();
        let mut rendering_info = vk::PipelineRenderingCreateInfo::default()
            .color_attachment_formats(&color_formats)
            .depth_attachment_format(desc.depth_format.map_or(vk::Format::UNDEFINED, format_to_vk));

        let pipeline_create_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&shader_stages)
            .vertex_input_state(&vertex_input_state)
            .input_assembly_state(&input_assembly_state)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterization_state)
            .depth_stencil_state(&depth_stencil_state)
            .multisample_state(&multisample_state)
            .color_blend_state(&color_blend_state)
            .dynamic_state(&dynamic_state)
            .layout(layout)
            .push_next(&mut rendering_info);

        let result = unsafe {
            device.create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_create_info], None)
        };

        unsafe {
            device.destroy_shader_module(vertex_module, None);
            if let Some(module) = pixel_module {
                device.destroy_shader_module(module, None);
            }
        }

        result
            .map(|pipelines| pipelines[0])
            .map_err(|(_, e)| engine_err!("nebula::vulkan", "Failed to create graphics pipeline '{}': {:?}", desc.label, e))
    }

    pub(crate) fn from_arc(pipeline: &Arc<dyn Pipeline>) -> &VulkanPipeline {
        unsafe { &*(pipeline.as_ref() as *const dyn Pipeline as *const VulkanPipeline) }
    }
}

impl Pipeline for VulkanPipeline {
    fn label(&self) -> &str {
        &self.label
    }
}

impl Drop for VulkanPipeline {
    fn drop(&mut self) {
        unsafe {
            if self.pipeline != vk::Pipeline::null() {
                self.ctx.device.destroy_pipeline(self.pipeline, None);
            }
            self.ctx.device.destroy_pipeline_layout(self.layout, None);
            // The sampler set is freed with its pool
            self.ctx.device.destroy_descriptor_set_layout(self.sampler_set_layout, None);
        }
    }
}

#[cfg(test)]
#[path = "vulkan_pipeline_tests.rs"]
mod tests;
