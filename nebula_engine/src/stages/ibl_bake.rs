/// Image-based lighting precomputation.
///
/// Integrates the environment cube into three textures sampled by the
/// scene stage: the DFG lookup table, the diffuse irradiance cube and the
/// roughness-prefiltered specular cube. The bake runs once; afterwards the
/// stage records nothing until `invalidate` is called.

use std::sync::Arc;
use bytemuck::{Pod, Zeroable};
use crate::error::Result;
use crate::graphics_device::{
    BlendMode, Buffer, BufferDesc, BufferUsage, ColorAttachment, CpuDescriptorHandle, CullMode,
    DepthStencilState, DescriptorView, FrontFace, GraphicsDevice, InputElement, Pipeline,
    PipelineDesc, PrimitiveTopology, RasterizationState, Rect2D, RenderingDesc, ResourceState,
    RootParameter, RootSignatureDesc, ShaderVisibility, StaticSampler, Texture, TextureDesc,
    TextureDimension, TextureFormat, TextureUsage, TrackedTexture, Viewport,
};
use crate::renderer::{CachedTexture, DescriptorAllocator, DescriptorSlot, ShaderLibrary};
use crate::scene::BakeConstants;
use crate::stages::{execute_bake, BakeResources, StageContext, StageState};
use crate::engine_info;

/// Width and height of the DFG lookup table
pub const DFG_SIZE: u32 = 512;
/// Face size of the diffuse and specular cubes
pub const IRRADIANCE_SIZE: u32 = 128;
/// Mip levels of the specular cube
pub const SPECULAR_MIP_COUNT: u32 = 7;

/// Full-screen triangle vertex
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
struct QuadVertex {
    position: [f32; 2],
    texcoord: [f32; 2],
}

const FULLSCREEN_TRIANGLE: [QuadVertex; 3] = [
    QuadVertex { position: [-1.0, 1.0], texcoord: [0.0, 1.0] },
    QuadVertex { position: [3.0, 1.0], texcoord: [2.0, 1.0] },
    QuadVertex { position: [-1.0, -3.0], texcoord: [0.0, -1.0] },
];

/// Roughness integrated into mip `mip` of a cube with `mip_count` levels
pub(crate) fn mip_roughness(mip: u32, mip_count: u32) -> f32 {
    if mip_count <= 1 {
        return 0.0;
    }
    let linear = mip as f32 / (mip_count - 1) as f32;
    linear * linear
}

/// One baked output with a render-target view per face and mip
struct BakeTarget {
    texture: TrackedTexture,
    /// Indexed `face * mips + mip`
    views: Vec<CpuDescriptorHandle>,
    srv: DescriptorSlot,
    pipeline: Arc<dyn Pipeline>,
}

impl BakeTarget {
    fn new(
        device: &dyn GraphicsDevice,
        rtv_heap: &mut DescriptorAllocator,
        srv_heap: &mut DescriptorAllocator,
        desc: TextureDesc,
        pipeline: Arc<dyn Pipeline>,
    ) -> Result<Self> {
        let texture = device.create_texture(&desc)?;
        let info = texture.info().clone();
        let count = info.array_layers() * info.mip_levels;

        let first = rtv_heap.allocate_range(count)?;
        let mut views = Vec::with_capacity(count as usize);
        for array_layer in 0..info.array_layers() {
            for mip in 0..info.mip_levels {
                let slot = first.offset(array_layer * info.mip_levels + mip);
                rtv_heap.write_view(slot, DescriptorView::RenderTarget { texture: texture.as_ref(), mip, array_layer })?;
                views.push(rtv_heap.cpu_handle(slot));
            }
        }

        let srv = srv_heap.allocate()?;
        srv_heap.write_view(srv, DescriptorView::ShaderResource { texture: texture.as_ref() })?;

        Ok(Self {
            texture: TrackedTexture::new(texture, desc.initial_state),
            views,
            srv,
            pipeline,
        })
    }
}

pub struct IblBakeStage {
    dfg: BakeTarget,
    diffuse: BakeTarget,
    specular: BakeTarget,
    quad: Arc<dyn Buffer>,
    environment: CachedTexture,
    state: StageState,
}

impl IblBakeStage {
    /// Create the output textures and pipelines
    ///
    /// # Arguments
    ///
    /// * `environment` - Cube map to integrate, with its shader-visible slot
    pub fn new(
        device: &dyn GraphicsDevice,
        shaders: &mut ShaderLibrary,
        rtv_heap: &mut DescriptorAllocator,
        srv_heap: &mut DescriptorAllocator,
        environment: &CachedTexture,
    ) -> Result<Self> {
        let quad = device.create_buffer(&BufferDesc {
            label: "ibl_fullscreen_triangle".to_string(),
            size: std::mem::size_of_val(&FULLSCREEN_TRIANGLE) as u64,
            usage: BufferUsage::Vertex,
        })?;
        quad.write(0, bytemuck::cast_slice(&FULLSCREEN_TRIANGLE))?;

        let vertex_shader = shaders.load("QuadVS")?;
        let mut pipeline = |label: &str, pixel: &str, format: TextureFormat| -> Result<Arc<dyn Pipeline>> {
            device.create_pipeline(&PipelineDesc {
                label: label.to_string(),
                root_signature: RootSignatureDesc {
                    parameters: vec![
                        RootParameter::ConstantBuffer { visibility: ShaderVisibility::Pixel },
                        RootParameter::DescriptorTable { num_descriptors: 1, visibility: ShaderVisibility::Pixel },
                    ],
                    static_samplers: vec![StaticSampler::LINEAR_WRAP],
                },
                vertex_shader: vertex_shader.clone(),
                pixel_shader: Some(shaders.load(pixel)?),
                input_layout: vec![
                    InputElement { semantic: "POSITION", format: TextureFormat::R32G32_SFLOAT, offset: 0 },
                    InputElement { semantic: "TEXCOORD", format: TextureFormat::R32G32_SFLOAT, offset: 8 },
                ],
                vertex_stride: std::mem::size_of::<QuadVertex>() as u32,
                topology: PrimitiveTopology::TriangleList,
                rasterization: RasterizationState {
                    cull_mode: CullMode::None,
                    front_face: FrontFace::Clockwise,
                    depth_bias: None,
                },
                depth_stencil: DepthStencilState::DISABLED,
                blend: BlendMode::Opaque,
                color_formats: vec![format],
                depth_format: None,
            })
        };

        let dfg_pipeline = pipeline("ibl_dfg", "IntegrateDFG_PS", TextureFormat::R32G32_SFLOAT)?;
        let diffuse_pipeline = pipeline("ibl_diffuse", "IntegrateDiffuseLD_PS", TextureFormat::R32G32B32A32_SFLOAT)?;
        let specular_pipeline = pipeline("ibl_specular", "IntegrateSpecularLD_PS", TextureFormat::R32G32B32A32_SFLOAT)?;

        let output = |label: &str, size: u32, format: TextureFormat, dimension: TextureDimension, mip_levels: u32| TextureDesc {
            label: label.to_string(),
            width: size,
            height: size,
            format,
            dimension,
            mip_levels,
            usage: TextureUsage::RENDER_TARGET | TextureUsage::SAMPLED,
            initial_state: ResourceState::ShaderResource,
        };

        let dfg = BakeTarget::new(
            device, rtv_heap, srv_heap,
            output("ibl_dfg", DFG_SIZE, TextureFormat::R32G32_SFLOAT, TextureDimension::D2, 1),
            dfg_pipeline,
        )?;
        let diffuse = BakeTarget::new(
            device, rtv_heap, srv_heap,
            output("ibl_diffuse_ld", IRRADIANCE_SIZE, TextureFormat::R32G32B32A32_SFLOAT, TextureDimension::Cube, 1),
            diffuse_pipeline,
        )?;
        let specular = BakeTarget::new(
            device, rtv_heap, srv_heap,
            output("ibl_specular_ld", IRRADIANCE_SIZE, TextureFormat::R32G32B32A32_SFLOAT, TextureDimension::Cube, SPECULAR_MIP_COUNT),
            specular_pipeline,
        )?;

        Ok(Self {
            dfg,
            diffuse,
            specular,
            quad,
            environment: environment.clone(),
            state: StageState::Uninitialized,
        })
    }

    /// Bake into a one-shot command list and block until the GPU is done
    ///
    /// Returns `Ok(false)` without submitting anything when already baked.
    pub fn bake(&mut self, res: &mut BakeResources<'_>) -> Result<bool> {
        if self.state == StageState::Baked {
            return Ok(false);
        }
        engine_info!("nebula::ibl_bake", "Baking image-based lighting");
        execute_bake(res, |ctx| self.record_bake(ctx))?;
        self.state = StageState::Baked;
        engine_info!("nebula::ibl_bake", "Image-based lighting baked");
        Ok(true)
    }

    /// Per-frame entry: bakes into the frame's list when invalidated, otherwise records nothing
    pub fn record(&mut self, ctx: &mut StageContext<'_>) -> Result<()> {
        if self.state == StageState::Baked {
            return Ok(());
        }
        self.record_bake(ctx)?;
        self.state = StageState::Baked;
        Ok(())
    }

    /// Mark the outputs stale so the next `bake` or `record` integrates again
    pub fn invalidate(&mut self) {
        self.state = StageState::Uninitialized;
    }

    fn record_bake(&mut self, ctx: &mut StageContext<'_>) -> Result<()> {
        let env = self.environment.texture.info();
        let width = env.width as f32;
        let mip_count = env.mip_levels.saturating_sub(1) as f32;
        let env_table = ctx.table(self.environment.slot)?;

        for (target, roughness_by_mip) in [
            (&mut self.dfg, false),
            (&mut self.diffuse, false),
            (&mut self.specular, true),
        ] {
            target.texture.transition(&mut *ctx.cmd, ResourceState::RenderTarget)?;

            let info = target.texture.texture().info().clone();
            for face in 0..info.array_layers() {
                for mip in 0..info.mip_levels {
                    let (w, h) = info.mip_extent(mip);
                    let roughness = if roughness_by_mip { mip_roughness(mip, info.mip_levels) } else { 0.0 };
                    let constants = ctx.ring.allocate(
                        &BakeConstants { face_index: face, roughness, width, mip_count },
                        ctx.slot,
                    )?;

                    let cmd = &mut *ctx.cmd;
                    cmd.begin_rendering(&RenderingDesc {
                        color: vec![ColorAttachment {
                            view: target.views[(face * info.mip_levels + mip) as usize],
                            clear: None,
                        }],
                        depth: None,
                        width: w,
                        height: h,
                    })?;
                    cmd.set_viewport(Viewport::from_extent(w, h))?;
                    cmd.set_scissor(Rect2D::from_extent(w, h))?;
                    cmd.set_pipeline(&target.pipeline)?;
                    cmd.set_root_constant_buffer(0, constants)?;
                    cmd.set_root_descriptor_table(1, env_table)?;
                    cmd.set_vertex_buffer(&self.quad, std::mem::size_of::<QuadVertex>() as u32)?;
                    cmd.draw(3, 0)?;
                    cmd.end_rendering()?;
                    ctx.draw_calls += 1;
                }
            }

            target.texture.transition(&mut *ctx.cmd, ResourceState::ShaderResource)?;
        }
        Ok(())
    }

    pub fn state(&self) -> StageState {
        self.state
    }

    pub fn dfg_srv(&self) -> DescriptorSlot {
        self.dfg.srv
    }

    pub fn diffuse_srv(&self) -> DescriptorSlot {
        self.diffuse.srv
    }

    pub fn specular_srv(&self) -> DescriptorSlot {
        self.specular.srv
    }

    pub fn dfg_texture(&self) -> &Arc<dyn Texture> {
        self.dfg.texture.texture()
    }

    pub fn diffuse_texture(&self) -> &Arc<dyn Texture> {
        self.diffuse.texture.texture()
    }

    pub fn specular_texture(&self) -> &Arc<dyn Texture> {
        self.specular.texture.texture()
    }
}

#[cfg(test)]
#[path = "ibl_bake_tests.rs"]
mod tests;
