/// Environment skybox stage.
///
/// Draws a large cube centered on the camera, textured with the converted
/// environment cube. Depth is tested but not written, so the sky only
/// fills pixels the scene left at the far plane.

use std::sync::Arc;
use glam::{Mat4, Quat, Vec3};
use crate::error::Result;
use crate::graphics_device::{
    BlendMode, Buffer, BufferDesc, BufferUsage, ColorAttachment, CompareOp, CullMode,
    DepthAttachment, DepthStencilState, FrontFace, GraphicsDevice, InputElement, Pipeline,
    PipelineDesc, PrimitiveTopology, RasterizationState, RenderingDesc, ResourceState,
    RootParameter, RootSignatureDesc, ShaderVisibility, StaticSampler, TextureFormat,
};
use crate::renderer::{CachedTexture, ShaderLibrary};
use crate::scene::{SharedScene, TransformBuffer};
use crate::stages::{read_scene, scene_not_bound, StageContext, StageState};
use crate::engine_info;

/// Scale of the cube around the camera
pub const SKYBOX_SCALE: f32 = 1000.0;

const CUBE_VERTEX_COUNT: u32 = 36;
const CUBE_STRIDE: u32 = 12;

/// Unit cube as a non-indexed triangle list
fn cube_vertices() -> [[f32; 3]; 36] {
    const CORNERS: [[f32; 3]; 8] = [
        [-1.0, -1.0, -1.0],
        [1.0, -1.0, -1.0],
        [1.0, 1.0, -1.0],
        [-1.0, 1.0, -1.0],
        [-1.0, -1.0, 1.0],
        [1.0, -1.0, 1.0],
        [1.0, 1.0, 1.0],
        [-1.0, 1.0, 1.0],
    ];
    // Two triangles per face: -Z, +Z, -X, +X, -Y, +Y
    const FACES: [[usize; 6]; 6] = [
        [0, 2, 1, 0, 3, 2],
        [4, 5, 6, 4, 6, 7],
        [0, 4, 7, 0, 7, 3],
        [1, 2, 6, 1, 6, 5],
        [0, 1, 5, 0, 5, 4],
        [3, 7, 6, 3, 6, 2],
    ];

    let mut vertices = [[0.0; 3]; 36];
    for (i, corner) in FACES.iter().flatten().enumerate() {
        vertices[i] = CORNERS[*corner];
    }
    vertices
}

/// World matrix of the sky cube for a camera at `camera_position`
pub(crate) fn sky_world(camera_position: Vec3) -> Mat4 {
    Mat4::from_scale_rotation_translation(Vec3::splat(SKYBOX_SCALE), Quat::IDENTITY, camera_position)
}

pub struct SkyboxStage {
    pipeline: Arc<dyn Pipeline>,
    vertices: Arc<dyn Buffer>,
    environment: CachedTexture,
    scene: Option<SharedScene>,
    state: StageState,
}

impl SkyboxStage {
    pub fn new(
        device: &dyn GraphicsDevice,
        shaders: &mut ShaderLibrary,
        environment: &CachedTexture,
        color_format: TextureFormat,
    ) -> Result<Self> {
        let cube = cube_vertices();
        let bytes: &[u8] = bytemuck::cast_slice(&cube);
        let vertices = device.create_buffer(&BufferDesc {
            label: "skybox_cube".to_string(),
            size: bytes.len() as u64,
            usage: BufferUsage::Vertex,
        })?;
        vertices.write(0, bytes)?;

        let pipeline = device.create_pipeline(&PipelineDesc {
            label: "skybox".to_string(),
            root_signature: RootSignatureDesc {
                parameters: vec![
                    RootParameter::ConstantBuffer { visibility: ShaderVisibility::Vertex },
                    RootParameter::DescriptorTable { num_descriptors: 1, visibility: ShaderVisibility::Pixel },
                ],
                static_samplers: vec![StaticSampler::LINEAR_WRAP],
            },
            vertex_shader: shaders.load("SkyBoxVS")?,
            pixel_shader: Some(shaders.load("SkyBoxPS")?),
            input_layout: vec![InputElement {
                semantic: "POSITION",
                format: TextureFormat::R32G32B32_SFLOAT,
                offset: 0,
            }],
            vertex_stride: CUBE_STRIDE,
            topology: PrimitiveTopology::TriangleList,
            rasterization: RasterizationState {
                cull_mode: CullMode::None,
                front_face: FrontFace::Clockwise,
                depth_bias: None,
            },
            depth_stencil: DepthStencilState {
                depth_test_enable: true,
                depth_write_enable: false,
                depth_compare_op: CompareOp::LessOrEqual,
            },
            blend: BlendMode::Opaque,
            color_formats: vec![color_format],
            depth_format: Some(TextureFormat::D32_FLOAT),
        })?;

        engine_info!("nebula::skybox", "Skybox stage created");

        Ok(Self {
            pipeline,
            vertices,
            environment: environment.clone(),
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
            return Err(scene_not_bound("SkyboxStage"));
        }
        self.state = StageState::Recording;
        let result = self.record_sky(ctx);
        self.state = StageState::Bound;
        result
    }

    fn record_sky(&mut self, ctx: &mut StageContext<'_>) -> Result<()> {
        let scene = read_scene(&self.scene, "SkyboxStage")?;
        let views = ctx.target_views()?;
        let camera = scene.camera();

        let transform = ctx.ring.allocate(
            &TransformBuffer {
                world: sky_world(camera.position()),
                view: camera.view(),
                proj: camera.projection(),
            },
            ctx.slot,
        )?;
        let environment = ctx.table(self.environment.slot)?;

        // Already there when the scene stage ran first
        ctx.transition_back_buffer(ResourceState::RenderTarget)?;

        let cmd = &mut *ctx.cmd;
        cmd.begin_rendering(&RenderingDesc {
            color: vec![ColorAttachment { view: views.color, clear: None }],
            depth: Some(DepthAttachment { view: views.depth, clear: None }),
            width: views.width,
            height: views.height,
        })?;
        cmd.set_viewport(views.viewport())?;
        cmd.set_scissor(views.scissor())?;
        cmd.set_pipeline(&self.pipeline)?;
        cmd.set_root_constant_buffer(0, transform)?;
        cmd.set_root_descriptor_table(1, environment)?;
        cmd.set_vertex_buffer(&self.vertices, CUBE_STRIDE)?;
        cmd.draw(CUBE_VERTEX_COUNT, 0)?;
        cmd.end_rendering()?;
        ctx.draw_calls += 1;
        Ok(())
    }

    pub fn state(&self) -> StageState {
        self.state
    }

    pub fn environment(&self) -> &CachedTexture {
        &self.environment
    }
}

#[cfg(test)]
#[path = "skybox_tests.rs"]
mod tests;
