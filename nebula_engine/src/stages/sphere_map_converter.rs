/// Equirectangular to cube map conversion.
///
/// Draws a UV sphere textured with the equirectangular environment image
/// from the center of each cube face, once per mip. The resulting cube is
/// the skybox texture and the input of the IBL bake.

use std::f32::consts::{FRAC_PI_2, PI};
use std::sync::Arc;
use glam::{Mat4, Vec3};
use crate::error::Result;
use crate::graphics_device::{
    BlendMode, ColorAttachment, CpuDescriptorHandle, CullMode, DepthStencilState, DescriptorView,
    FrontFace, GraphicsDevice, Pipeline, PipelineDesc, PrimitiveTopology, RasterizationState,
    Rect2D, RenderingDesc, ResourceState, RootParameter, RootSignatureDesc, ShaderVisibility,
    StaticSampler, TextureDesc, TextureDimension, TextureFormat, TextureUsage, TrackedTexture,
    Viewport,
};
use crate::renderer::{CachedTexture, DescriptorAllocator, DescriptorSlot, ShaderLibrary};
use crate::scene::{Mesh, MeshData, TransformBuffer, Vertex};
use crate::stages::{execute_bake, BakeResources, StageContext, StageState};
use crate::{engine_debug, engine_info};

const TESSELLATION: u32 = 20;
const SPHERE_RADIUS: f32 = 10.0;
const FACE_NEAR: f32 = 0.1;
const FACE_FAR: f32 = 10000.0;

/// Look direction and up vector of each cube face (+X, -X, +Y, -Y, +Z, -Z)
const FACES: [(Vec3, Vec3); 6] = [
    (Vec3::X, Vec3::Y),
    (Vec3::NEG_X, Vec3::Y),
    (Vec3::Y, Vec3::NEG_Z),
    (Vec3::NEG_Y, Vec3::Z),
    (Vec3::Z, Vec3::Y),
    (Vec3::NEG_Z, Vec3::Y),
];

/// Face size and mip count of the cube converted from an image `source_width` wide
pub fn cube_size_for(source_width: u32) -> (u32, u32) {
    let size = (source_width / 4).max(1).next_power_of_two();
    (size, size.trailing_zeros() + 1)
}

/// UV sphere around the origin
fn sphere_mesh_data() -> MeshData {
    let vertical = TESSELLATION * 2;
    let horizontal = TESSELLATION * 2;

    let mut vertices = Vec::with_capacity(((vertical + 1) * (horizontal + 1)) as usize);
    for i in 0..=vertical {
        let v = 1.0 - i as f32 / vertical as f32;
        let latitude = i as f32 * PI / vertical as f32 - FRAC_PI_2;
        let (dy, dxz) = latitude.sin_cos();

        for j in 0..=horizontal {
            let u = j as f32 / horizontal as f32;
            let longitude = j as f32 * 2.0 * PI / horizontal as f32;
            let (dx, dz) = longitude.sin_cos();
            let normal = Vec3::new(dx * dxz, dy, dz * dxz);

            vertices.push(Vertex {
                position: (normal * SPHERE_RADIUS).to_array(),
                normal: normal.to_array(),
                texcoord: [u, v],
                tangent: [0.0; 3],
            });
        }
    }

    let stride = horizontal + 1;
    let mut indices = Vec::with_capacity((vertical * horizontal * 6) as usize);
    for i in 0..vertical {
        for j in 0..horizontal {
            indices.extend_from_slice(&[
                i * stride + j,
                (i + 1) * stride + j,
                i * stride + j + 1,
                i * stride + j + 1,
                (i + 1) * stride + j,
                (i + 1) * stride + j + 1,
            ]);
        }
    }

    MeshData { name: "environment_sphere".to_string(), vertices, indices, material_index: None }
}

/// View-projection of each cube face as seen from the origin
fn face_transforms() -> [TransformBuffer; 6] {
    let proj = Mat4::perspective_lh(FRAC_PI_2, 1.0, FACE_NEAR, FACE_FAR);
    FACES.map(|(direction, up)| TransformBuffer {
        world: Mat4::IDENTITY,
        view: Mat4::look_at_lh(Vec3::ZERO, direction, up),
        proj,
    })
}

pub struct SphereMapConverterStage {
    cube: TrackedTexture,
    cube_srv: DescriptorSlot,
    /// Indexed `face * mips + mip`
    face_views: Vec<CpuDescriptorHandle>,
    sphere: Mesh,
    pipeline: Arc<dyn Pipeline>,
    source: CachedTexture,
    state: StageState,
}

impl SphereMapConverterStage {
    /// Create the cube sized from `source` and its views
    pub fn new(
        device: &dyn GraphicsDevice,
        shaders: &mut ShaderLibrary,
        rtv_heap: &mut DescriptorAllocator,
        srv_heap: &mut DescriptorAllocator,
        source: &CachedTexture,
    ) -> Result<Self> {
        let (size, mips) = cube_size_for(source.texture.info().width);
        let cube = device.create_texture(&TextureDesc {
            label: "environment_cube".to_string(),
            width: size,
            height: size,
            format: TextureFormat::R32G32B32A32_SFLOAT,
            dimension: TextureDimension::Cube,
            mip_levels: mips,
            usage: TextureUsage::RENDER_TARGET | TextureUsage::SAMPLED,
            initial_state: ResourceState::ShaderResource,
        })?;

        let first = rtv_heap.allocate_range(6 * mips)?;
        let mut face_views = Vec::with_capacity((6 * mips) as usize);
        for face in 0..6 {
            for mip in 0..mips {
                let slot = first.offset(face * mips + mip);
                rtv_heap.write_view(slot, DescriptorView::RenderTarget { texture: cube.as_ref(), mip, array_layer: face })?;
                face_views.push(rtv_heap.cpu_handle(slot));
            }
        }

        let cube_srv = srv_heap.allocate()?;
        srv_heap.write_view(cube_srv, DescriptorView::ShaderResource { texture: cube.as_ref() })?;

        let pipeline = device.create_pipeline(&PipelineDesc {
            label: "sphere_to_cube".to_string(),
            root_signature: RootSignatureDesc {
                parameters: vec![
                    RootParameter::ConstantBuffer { visibility: ShaderVisibility::Vertex },
                    RootParameter::DescriptorTable { num_descriptors: 1, visibility: ShaderVisibility::Pixel },
                ],
                static_samplers: vec![StaticSampler::LINEAR_WRAP],
            },
            vertex_shader: shaders.load("SphereToCubeVS")?,
            pixel_shader: Some(shaders.load("SphereToCubePS")?),
            input_layout: Vertex::input_layout(),
            vertex_stride: Vertex::STRIDE,
            topology: PrimitiveTopology::TriangleList,
            rasterization: RasterizationState {
                cull_mode: CullMode::None,
                front_face: FrontFace::Clockwise,
                depth_bias: None,
            },
            depth_stencil: DepthStencilState::DISABLED,
            blend: BlendMode::Opaque,
            color_formats: vec![TextureFormat::R32G32B32A32_SFLOAT],
            depth_format: None,
        })?;

        let sphere = Mesh::upload(device, &sphere_mesh_data())?;

        engine_info!("nebula::sphere_to_cube", "Environment cube {}x{} with {} mips", size, size, mips);

        Ok(Self {
            cube: TrackedTexture::new(cube, ResourceState::ShaderResource),
            cube_srv,
            face_views,
            sphere,
            pipeline,
            source: source.clone(),
            state: StageState::Uninitialized,
        })
    }

    /// Convert into a one-shot command list and block until the GPU is done
    ///
    /// Returns `Ok(false)` without submitting anything when already converted.
    pub fn bake(&mut self, res: &mut BakeResources<'_>) -> Result<bool> {
        if self.state == StageState::Baked {
            return Ok(false);
        }
        execute_bake(res, |ctx| self.record_conversion(ctx))?;
        self.state = StageState::Baked;
        Ok(true)
    }

    /// Per-frame entry: converts into the frame's list when invalidated, otherwise records nothing
    pub fn record(&mut self, ctx: &mut StageContext<'_>) -> Result<()> {
        if self.state == StageState::Baked {
            return Ok(());
        }
        self.record_conversion(ctx)?;
        self.state = StageState::Baked;
        Ok(())
    }

    /// Convert a new source image into the existing cube
    ///
    /// The cube keeps the size chosen at construction.
    pub fn set_source(&mut self, source: &CachedTexture) {
        self.source = source.clone();
        self.invalidate();
    }

    pub fn invalidate(&mut self) {
        self.state = StageState::Uninitialized;
    }

    fn record_conversion(&mut self, ctx: &mut StageContext<'_>) -> Result<()> {
        let info = self.cube.texture().info().clone();
        engine_debug!("nebula::sphere_to_cube", "Converting '{}' into {} faces x {} mips",
            self.source.texture.info().label, info.array_layers(), info.mip_levels);

        let source_table = ctx.table(self.source.slot)?;
        self.cube.transition(&mut *ctx.cmd, ResourceState::RenderTarget)?;

        for (face, transform) in face_transforms().iter().enumerate() {
            let face = face as u32;
            let constants = ctx.ring.allocate(transform, ctx.slot)?;

            for mip in 0..info.mip_levels {
                let (w, h) = info.mip_extent(mip);
                let cmd = &mut *ctx.cmd;
                cmd.begin_rendering(&RenderingDesc {
                    color: vec![ColorAttachment {
                        view: self.face_views[(face * info.mip_levels + mip) as usize],
                        clear: None,
                    }],
                    depth: None,
                    width: w,
                    height: h,
                })?;
                cmd.set_viewport(Viewport::from_extent(w, h))?;
                cmd.set_scissor(Rect2D::from_extent(w, h))?;
                cmd.set_pipeline(&self.pipeline)?;
                cmd.set_root_constant_buffer(0, constants)?;
                cmd.set_root_descriptor_table(1, source_table)?;
                cmd.set_vertex_buffer(self.sphere.vertex_buffer(), Vertex::STRIDE)?;
                cmd.set_index_buffer(self.sphere.index_buffer(), self.sphere.index_type())?;
                cmd.draw_indexed(self.sphere.index_count(), 0, 0)?;
                cmd.end_rendering()?;
                ctx.draw_calls += 1;
            }
        }

        self.cube.transition(&mut *ctx.cmd, ResourceState::ShaderResource)?;
        Ok(())
    }

    pub fn state(&self) -> StageState {
        self.state
    }

    /// The converted cube with its shader-visible slot
    pub fn cube(&self) -> CachedTexture {
        CachedTexture { texture: self.cube.texture().clone(), slot: self.cube_srv }
    }

    pub fn cube_srv(&self) -> DescriptorSlot {
        self.cube_srv
    }
}

#[cfg(test)]
#[path = "sphere_map_converter_tests.rs"]
mod tests;
