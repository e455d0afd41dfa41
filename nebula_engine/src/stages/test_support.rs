//! Shared fixtures for stage tests: a mock device with every substrate
//! component and a shader directory holding every stage binary.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use glam::Mat4;
use crate::error::{Error, Result};
use crate::graphics_device::mock_graphics_device::{MockGraphicsDevice, MockTexture};
use crate::graphics_device::{
    CpuDescriptorHandle, DescriptorHeapKind, ResourceState, TextureFormat, TrackedTexture,
};
use crate::renderer::{
    CommandStream, DescriptorAllocator, FrameConstantRing, ShaderLibrary, TextureCache,
    TextureLoader, TextureSource,
};
use crate::scene::{ImportedModel, MaterialDesc, MeshData, Model, Scene, SharedScene, Vertex};
use crate::stages::{FrameShared, FrameTarget, StageContext, TargetViews};

pub const TIMEOUT: Duration = Duration::from_millis(10);

pub const SHADER_NAMES: &[&str] = &[
    "ShadowVS",
    "SimpleTexVS",
    "SimpleTexPS",
    "SkyBoxVS",
    "SkyBoxPS",
    "QuadVS",
    "IntegrateDFG_PS",
    "IntegrateDiffuseLD_PS",
    "IntegrateSpecularLD_PS",
    "SphereToCubeVS",
    "SphereToCubePS",
];

/// Fresh directory holding a dummy binary for every stage shader
pub fn shader_dir(test: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("nebula_stage_shaders_{}_{}", test, std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    for name in SHADER_NAMES {
        std::fs::write(dir.join(name).with_extension("mock"), [0x44u8, 0x58, 0x42, 0x43]).unwrap();
    }
    dir
}

/// Loader that never finds a file
pub struct NoTextures;

impl TextureLoader for NoTextures {
    fn load(&self, path: &Path) -> Result<TextureSource> {
        Err(Error::InvalidResource(format!("no texture at {}", path.display())))
    }
}

/// One triangle with the default material
pub fn triangle_import(name: &str) -> ImportedModel {
    let vertex = |x: f32, y: f32| Vertex { position: [x, y, 0.0], ..Default::default() };
    ImportedModel {
        meshes: vec![MeshData {
            name: name.to_string(),
            vertices: vec![vertex(0.0, 1.0), vertex(1.0, -1.0), vertex(-1.0, -1.0)],
            indices: vec![0, 1, 2],
            material_index: Some(0),
        }],
        materials: vec![MaterialDesc::default()],
    }
}

pub struct StageHarness {
    pub device: Arc<MockGraphicsDevice>,
    pub stream: CommandStream,
    pub ring: FrameConstantRing,
    pub rtv: DescriptorAllocator,
    pub dsv: DescriptorAllocator,
    pub srv: DescriptorAllocator,
    pub textures: TextureCache,
    pub shaders: ShaderLibrary,
    pub back_buffer: TrackedTexture,
}

impl StageHarness {
    pub fn new(test: &str) -> Self {
        let device = Arc::new(MockGraphicsDevice::new());
        let mut stream = CommandStream::new(device.as_ref(), 2).unwrap();
        let ring = FrameConstantRing::new(device.as_ref(), 2, 512).unwrap();
        let rtv = DescriptorAllocator::new(device.as_ref(), DescriptorHeapKind::RenderTarget, 128).unwrap();
        let dsv = DescriptorAllocator::new(device.as_ref(), DescriptorHeapKind::DepthStencil, 8).unwrap();
        let mut srv = DescriptorAllocator::new(device.as_ref(), DescriptorHeapKind::ShaderResource, 64).unwrap();
        let textures = TextureCache::new(device.clone(), &mut stream, &mut srv, TIMEOUT).unwrap();
        let shaders = ShaderLibrary::new(shader_dir(test), "mock");
        let back_buffer = TrackedTexture::new(
            Arc::new(MockTexture::new("back_buffer_0", 64, 64, TextureFormat::B8G8R8A8_SRGB)),
            ResourceState::Present,
        );
        Self { device, stream, ring, rtv, dsv, srv, textures, shaders, back_buffer }
    }

    /// Scene with `models` single-triangle models
    pub fn scene_with_models(&mut self, models: usize) -> SharedScene {
        let mut scene = Scene::new(64, 64);
        for i in 0..models {
            let mut model = Model::from_import(
                self.device.as_ref(),
                &triangle_import(&format!("triangle_{}", i)),
                &mut self.textures,
                &NoTextures,
                &mut self.stream,
                &mut self.srv,
            )
            .unwrap();
            model.set_world(Mat4::from_translation(glam::Vec3::X * i as f32));
            scene.add_model(model);
        }
        scene.into_shared()
    }

    /// Record one frame on slot 0 through `record`, submit it and wait for it
    ///
    /// Returns what the stages shared and the number of draws.
    pub fn frame<F>(&mut self, record: F) -> Result<(FrameShared, u32)>
    where
        F: FnOnce(&mut StageContext<'_>) -> Result<()>,
    {
        self.stream.wait_for_slot(0, TIMEOUT)?;
        self.stream.reset(0)?;
        self.ring.begin_frame(0)?;

        let mut frame = FrameShared::default();
        let draw_calls;
        {
            let cmd = self.stream.active_list()?;
            let mut ctx = StageContext {
                cmd,
                slot: 0,
                ring: &mut self.ring,
                srv: &self.srv,
                textures: &self.textures,
                frame: &mut frame,
                target: Some(FrameTarget {
                    back_buffer: &mut self.back_buffer,
                    views: TargetViews {
                        color: CpuDescriptorHandle(0x10),
                        depth: CpuDescriptorHandle(0x20),
                        width: 64,
                        height: 64,
                    },
                }),
                draw_calls: 0,
            };
            let result = record(&mut ctx);
            draw_calls = ctx.draw_calls;
            result?;
        }

        self.stream.submit(None)?;
        self.stream.signal_and_advance(0)?;
        Ok((frame, draw_calls))
    }
}
