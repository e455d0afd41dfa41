/// Directional shadow map stage.
///
/// Renders the depth of every mesh as seen from the directional light into
/// a private depth texture. The texture rests in `ShaderResource` between
/// frames so the scene stage can sample it; this stage moves it to
/// `DepthWrite` for its own pass and back before returning.

use std::sync::Arc;
use glam::{EulerRot, Mat4, Quat, Vec3};
use crate::config::ShadowConfig;
use crate::error::Result;
use crate::graphics_device::{
    BlendMode, CompareOp, CpuDescriptorHandle, CullMode, DepthAttachment, DepthStencilState,
    DescriptorView, FrontFace, GraphicsDevice, Pipeline, PipelineDesc, PrimitiveTopology,
    RasterizationState, Rect2D, RenderingDesc, ResourceState, RootParameter, RootSignatureDesc,
    ShaderVisibility, TextureDesc, TextureDimension, TextureFormat, TextureUsage, TrackedTexture,
    Viewport,
};
use crate::renderer::{DescriptorAllocator, DescriptorSlot, ShaderLibrary};
use crate::scene::{SharedScene, Vertex};
use crate::stages::{read_scene, scene_not_bound, StageContext, StageState};
use crate::engine_info;

const LIGHT_NEAR: f32 = 1.0;
const LIGHT_FAR: f32 = 1000.0;

// ===== DIRECTIONAL LIGHT =====

/// Directional light placed relative to the point the camera looks at
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DirectionalLight {
    /// Rotation in degrees (pitch about X, yaw about Y, roll about Z)
    rotation_deg: Vec3,
    distance: f32,
    view_size: f32,
    target: Vec3,
}

impl DirectionalLight {
    pub fn new(config: &ShadowConfig) -> Self {
        Self {
            rotation_deg: Vec3::from_array(config.light_rotation_deg),
            distance: config.light_distance,
            view_size: config.light_view_size,
            target: Vec3::ZERO,
        }
    }

    fn rotation(&self) -> Quat {
        Quat::from_euler(
            EulerRot::YXZ,
            self.rotation_deg.y.to_radians(),
            self.rotation_deg.x.to_radians(),
            self.rotation_deg.z.to_radians(),
        )
    }

    /// Direction the light travels
    pub fn forward(&self) -> Vec3 {
        self.rotation() * Vec3::Z
    }

    pub fn up(&self) -> Vec3 {
        self.rotation() * Vec3::Y
    }

    pub fn position(&self) -> Vec3 {
        self.target - self.forward() * self.distance
    }

    pub fn view(&self) -> Mat4 {
        Mat4::look_to_lh(self.position(), self.forward(), self.up())
    }

    pub fn projection(&self) -> Mat4 {
        let half = self.view_size * 0.5;
        Mat4::orthographic_lh(-half, half, -half, half, LIGHT_NEAR, LIGHT_FAR)
    }

    pub fn view_projection(&self) -> Mat4 {
        self.projection() * self.view()
    }

    pub fn target(&self) -> Vec3 {
        self.target
    }

    pub fn set_target(&mut self, target: Vec3) {
        self.target = target;
    }

    pub fn rotation_deg(&self) -> Vec3 {
        self.rotation_deg
    }

    pub fn set_rotation_deg(&mut self, rotation: Vec3) {
        self.rotation_deg = rotation;
    }

    pub fn distance(&self) -> f32 {
        self.distance
    }

    pub fn set_distance(&mut self, distance: f32) {
        self.distance = distance;
    }
}

// ===== SHADOW STAGE =====

pub struct ShadowStage {
    depth: TrackedTexture,
    dsv: DescriptorSlot,
    depth_view: CpuDescriptorHandle,
    srv: DescriptorSlot,
    map_size: u32,
    pipeline: Arc<dyn Pipeline>,
    light: DirectionalLight,
    scene: Option<SharedScene>,
    state: StageState,
}

impl ShadowStage {
    pub fn new(
        device: &dyn GraphicsDevice,
        shaders: &mut ShaderLibrary,
        dsv_heap: &mut DescriptorAllocator,
        srv_heap: &mut DescriptorAllocator,
        config: &ShadowConfig,
    ) -> Result<Self> {
        let texture = device.create_texture(&TextureDesc {
            label: "shadow_map".to_string(),
            width: config.map_size,
            height: config.map_size,
            format: TextureFormat::D32_FLOAT,
            dimension: TextureDimension::D2,
            mip_levels: 1,
            usage: TextureUsage::DEPTH_STENCIL | TextureUsage::SAMPLED,
            initial_state: ResourceState::ShaderResource,
        })?;

        let dsv = dsv_heap.allocate()?;
        dsv_heap.write_view(dsv, DescriptorView::DepthStencil { texture: texture.as_ref() })?;
        let srv = srv_heap.allocate()?;
        srv_heap.write_view(srv, DescriptorView::ShaderResource { texture: texture.as_ref() })?;

        let pipeline = device.create_pipeline(&PipelineDesc {
            label: "shadow".to_string(),
            root_signature: RootSignatureDesc {
                parameters: vec![RootParameter::Constants {
                    num_values: 32,
                    visibility: ShaderVisibility::Vertex,
                }],
                static_samplers: Vec::new(),
            },
            vertex_shader: shaders.load("ShadowVS")?,
            pixel_shader: None,
            input_layout: Vertex::position_layout(),
            vertex_stride: Vertex::STRIDE,
            topology: PrimitiveTopology::TriangleList,
            rasterization: RasterizationState {
                cull_mode: CullMode::Front,
                front_face: FrontFace::Clockwise,
                depth_bias: None,
            },
            depth_stencil: DepthStencilState {
                depth_test_enable: true,
                depth_write_enable: true,
                depth_compare_op: CompareOp::LessOrEqual,
            },
            blend: BlendMode::Opaque,
            color_formats: Vec::new(),
            depth_format: Some(TextureFormat::D32_FLOAT),
        })?;

        engine_info!("nebula::shadow", "Shadow stage created ({}x{} depth map)", config.map_size, config.map_size);

        Ok(Self {
            depth: TrackedTexture::new(texture, ResourceState::ShaderResource),
            depth_view: dsv_heap.cpu_handle(dsv),
            dsv,
            srv,
            map_size: config.map_size,
            pipeline,
            light: DirectionalLight::new(config),
            scene: None,
            state: StageState::NotBound,
        })
    }

    pub fn set_scene(&mut self, scene: SharedScene) {
        if let Ok(guard) = scene.read() {
            self.light.set_target(guard.camera().target());
        }
        self.scene = Some(scene);
        self.state = StageState::Bound;
    }

    /// Follow the camera target
    pub fn update(&mut self, _delta_time: f32) {
        let Some(scene) = &self.scene else {
            return;
        };
        if let Ok(guard) = scene.read() {
            self.light.set_target(guard.camera().target());
        }
    }

    pub fn record(&mut self, ctx: &mut StageContext<'_>) -> Result<()> {
        if self.state == StageState::NotBound {
            return Err(scene_not_bound("ShadowStage"));
        }
        self.state = StageState::Recording;
        let result = self.record_depth(ctx);
        self.state = StageState::Bound;
        result
    }

    fn record_depth(&mut self, ctx: &mut StageContext<'_>) -> Result<()> {
        let scene = read_scene(&self.scene, "ShadowStage")?;
        let light_view_proj = self.light.view_projection();
        ctx.frame.light_view_proj = light_view_proj;
        ctx.frame.light_direction = self.light.forward();

        self.depth.transition(&mut *ctx.cmd, ResourceState::DepthWrite)?;

        let cmd = &mut *ctx.cmd;
        cmd.begin_rendering(&RenderingDesc {
            color: Vec::new(),
            depth: Some(DepthAttachment { view: self.depth_view, clear: Some(1.0) }),
            width: self.map_size,
            height: self.map_size,
        })?;
        cmd.set_viewport(Viewport::from_extent(self.map_size, self.map_size))?;
        cmd.set_scissor(Rect2D::from_extent(self.map_size, self.map_size))?;
        cmd.set_pipeline(&self.pipeline)?;

        for model in scene.models() {
            let constants = [light_view_proj, model.world()];
            cmd.set_root_constants(0, 0, bytemuck::cast_slice(&constants))?;
            for mesh in model.meshes() {
                cmd.set_vertex_buffer(mesh.vertex_buffer(), Vertex::STRIDE)?;
                cmd.set_index_buffer(mesh.index_buffer(), mesh.index_type())?;
                cmd.draw_indexed(mesh.index_count(), 0, 0)?;
                ctx.draw_calls += 1;
            }
        }

        cmd.end_rendering()?;
        self.depth.transition(&mut *ctx.cmd, ResourceState::ShaderResource)?;
        Ok(())
    }

    pub fn state(&self) -> StageState {
        self.state
    }

    pub fn light(&self) -> &DirectionalLight {
        &self.light
    }

    pub fn light_view_proj(&self) -> Mat4 {
        self.light.view_projection()
    }

    pub fn light_direction(&self) -> Vec3 {
        self.light.forward()
    }

    pub fn set_light_rotation(&mut self, rotation_deg: Vec3) {
        self.light.set_rotation_deg(rotation_deg);
    }

    pub fn set_light_distance(&mut self, distance: f32) {
        self.light.set_distance(distance);
    }

    /// Shader-visible slot of the depth map
    pub fn depth_srv(&self) -> DescriptorSlot {
        self.srv
    }

    pub fn depth_dsv(&self) -> DescriptorSlot {
        self.dsv
    }

    pub fn depth_texture(&self) -> &TrackedTexture {
        &self.depth
    }

    pub fn map_size(&self) -> u32 {
        self.map_size
    }
}

#[cfg(test)]
#[path = "shadow_tests.rs"]
mod tests;
