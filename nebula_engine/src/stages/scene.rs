/// Forward scene stage.
///
/// Clears the back buffer and scene depth, then draws every mesh of the
/// bound scene with its material, lit by the point lights, the shadow map
/// and the baked image-based lighting. The back buffer is left in
/// `RenderTarget` for the stages drawn on top of it.

use std::sync::Arc;
use crate::error::{Error, Result};
use crate::graphics_device::{
    BlendMode, Buffer, BufferDesc, BufferUsage, ColorAttachment, CompareOp, CullMode,
    DepthAttachment, DepthStencilState, DescriptorView, Filter, AddressMode, FrontFace,
    GraphicsDevice, Pipeline, PipelineDesc, PrimitiveTopology, RasterizationState, RenderingDesc,
    ResourceState, RootParameter, RootSignatureDesc, ShaderVisibility, StaticSampler, Texture,
    TextureFormat,
};
use crate::renderer::{DescriptorAllocator, DescriptorSlot, ShaderLibrary};
use crate::scene::{LightData, Material, SceneConstants, SharedScene, TransformBuffer, Vertex};
use crate::stages::{read_scene, scene_not_bound, StageContext, StageState};
use crate::engine_info;

/// Back buffer clear color
pub const CLEAR_COLOR: [f32; 4] = [0.25, 0.25, 0.25, 1.0];

/// Root parameter indices
const PARAM_TRANSFORM: u32 = 0;
const PARAM_MATERIAL: u32 = 1;
const PARAM_DIFFUSE: u32 = 2;
const PARAM_SCENE: u32 = 3;
const PARAM_LIGHTING: u32 = 4;
const PARAM_LIGHTS: u32 = 5;

/// Number of descriptors in the lighting table
const LIGHTING_TABLE_SIZE: u32 = 5;

/// Textures sampled by every scene draw, in lighting table order
pub struct LightingInputs<'a> {
    pub shadow_map: &'a dyn Texture,
    pub dfg: &'a dyn Texture,
    pub diffuse_ld: &'a dyn Texture,
    pub specular_ld: &'a dyn Texture,
    pub environment: &'a dyn Texture,
}

pub struct SceneStage {
    pipeline: Arc<dyn Pipeline>,
    lighting_table: DescriptorSlot,
    /// One point-light block per frame slot
    light_buffers: Vec<Arc<dyn Buffer>>,
    scene: Option<SharedScene>,
    state: StageState,
}

impl SceneStage {
    pub fn new(
        device: &dyn GraphicsDevice,
        shaders: &mut ShaderLibrary,
        srv_heap: &mut DescriptorAllocator,
        inputs: &LightingInputs<'_>,
        color_format: TextureFormat,
        frame_count: usize,
    ) -> Result<Self> {
        let lighting_table = srv_heap.allocate_range(LIGHTING_TABLE_SIZE)?;
        let ordered = [inputs.shadow_map, inputs.dfg, inputs.diffuse_ld, inputs.specular_ld, inputs.environment];
        for (i, texture) in ordered.into_iter().enumerate() {
            srv_heap.write_view(lighting_table.offset(i as u32), DescriptorView::ShaderResource { texture })?;
        }

        let light_buffers = (0..frame_count)
            .map(|slot| {
                device.create_buffer(&BufferDesc {
                    label: format!("scene_lights_{}", slot),
                    size: std::mem::size_of::<LightData>() as u64,
                    usage: BufferUsage::Constant,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let pipeline = device.create_pipeline(&PipelineDesc {
            label: "scene".to_string(),
            root_signature: RootSignatureDesc {
                parameters: vec![
                    RootParameter::ConstantBuffer { visibility: ShaderVisibility::Vertex },
                    RootParameter::ConstantBuffer { visibility: ShaderVisibility::Pixel },
                    RootParameter::DescriptorTable { num_descriptors: 1, visibility: ShaderVisibility::Pixel },
                    RootParameter::ConstantBuffer { visibility: ShaderVisibility::All },
                    RootParameter::DescriptorTable { num_descriptors: LIGHTING_TABLE_SIZE, visibility: ShaderVisibility::Pixel },
                    RootParameter::ConstantBuffer { visibility: ShaderVisibility::Pixel },
                ],
                static_samplers: vec![
                    StaticSampler::LINEAR_WRAP,
                    StaticSampler::LINEAR_CLAMP,
                    StaticSampler {
                        filter: Filter::Linear,
                        address_mode: AddressMode::Clamp,
                        comparison: Some(CompareOp::LessOrEqual),
                    },
                ],
            },
            vertex_shader: shaders.load("SimpleTexVS")?,
            pixel_shader: Some(shaders.load("SimpleTexPS")?),
            input_layout: Vertex::input_layout(),
            vertex_stride: Vertex::STRIDE,
            topology: PrimitiveTopology::TriangleList,
            rasterization: RasterizationState {
                cull_mode: CullMode::None,
                front_face: FrontFace::Clockwise,
                depth_bias: None,
            },
            depth_stencil: DepthStencilState::default(),
            blend: BlendMode::Opaque,
            color_formats: vec![color_format],
            depth_format: Some(TextureFormat::D32_FLOAT),
        })?;

        engine_info!("nebula::scene_stage", "Scene stage created");

        Ok(Self {
            pipeline,
            lighting_table,
            light_buffers,
            scene: None,
            state: StageState::NotBound,
        })
    }

    pub fn set_scene(&mut self, scene: SharedScene) {
        self.scene = Some(scene);
        self.state = StageState::Bound;
    }

    pub fn record(&mut self, ctx: &mut StageContext<'_>) -> Result<()> {
        if self.state == StageState::NotBound {
            return Err(scene_not_bound("SceneStage"));
        }
        self.state = StageState::Recording;
        let result = self.record_scene(ctx);
        self.state = StageState::Bound;
        result
    }

    fn record_scene(&mut self, ctx: &mut StageContext<'_>) -> Result<()> {
        let scene = read_scene(&self.scene, "SceneStage")?;
        let views = ctx.target_views()?;
        let camera = scene.camera();
        let (view, proj) = (camera.view(), camera.projection());

        let light_buffer = self.light_buffers.get(ctx.slot).ok_or(Error::InvalidFrameSlot {
            slot: ctx.slot,
            frame_count: self.light_buffers.len(),
        })?;
        light_buffer.write(0, bytemuck::bytes_of(scene.lights()))?;

        let scene_constants = ctx.ring.allocate(
            &SceneConstants {
                light_view_proj: ctx.frame.light_view_proj,
                camera_position: camera.position().extend(1.0),
                light_direction: ctx.frame.light_direction.extend(0.0),
            },
            ctx.slot,
        )?;
        let lighting_table = ctx.table(self.lighting_table)?;

        ctx.transition_back_buffer(ResourceState::RenderTarget)?;

        let cmd = &mut *ctx.cmd;
        cmd.begin_rendering(&RenderingDesc {
            color: vec![ColorAttachment { view: views.color, clear: Some(CLEAR_COLOR) }],
            depth: Some(DepthAttachment { view: views.depth, clear: Some(1.0) }),
            width: views.width,
            height: views.height,
        })?;
        cmd.set_viewport(views.viewport())?;
        cmd.set_scissor(views.scissor())?;
        cmd.set_pipeline(&self.pipeline)?;
        cmd.set_root_constant_buffer(PARAM_SCENE, scene_constants)?;
        cmd.set_root_descriptor_table(PARAM_LIGHTING, lighting_table)?;
        cmd.set_root_constant_buffer(PARAM_LIGHTS, light_buffer.gpu_address())?;

        let default_material = Material::default();
        for model in scene.models() {
            for mesh in model.meshes() {
                let transform = ctx.ring.allocate(&TransformBuffer { world: model.world(), view, proj }, ctx.slot)?;
                let material = model.material_of(mesh).unwrap_or(&default_material);
                let material_constants = ctx.ring.allocate(&material.to_buffer(), ctx.slot)?;
                let diffuse = ctx.table(ctx.textures.descriptor_or_placeholder(material.diffuse_texture))?;

                let cmd = &mut *ctx.cmd;
                cmd.set_root_constant_buffer(PARAM_TRANSFORM, transform)?;
                cmd.set_root_constant_buffer(PARAM_MATERIAL, material_constants)?;
                cmd.set_root_descriptor_table(PARAM_DIFFUSE, diffuse)?;
                cmd.set_vertex_buffer(mesh.vertex_buffer(), Vertex::STRIDE)?;
                cmd.set_index_buffer(mesh.index_buffer(), mesh.index_type())?;
                cmd.draw_indexed(mesh.index_count(), 0, 0)?;
                ctx.draw_calls += 1;
            }
        }

        ctx.cmd.end_rendering()?;
        Ok(())
    }

    pub fn state(&self) -> StageState {
        self.state
    }

    /// First slot of the shadow / DFG / diffuse / specular / environment table
    pub fn lighting_table(&self) -> DescriptorSlot {
        self.lighting_table
    }
}

#[cfg(test)]
#[path = "scene_tests.rs"]
mod tests;
