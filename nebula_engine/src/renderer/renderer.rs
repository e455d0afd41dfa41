/// Frame orchestrator.
///
/// The `Renderer` owns every GPU subsystem (command stream, constant ring,
/// descriptor allocators, shader library, texture cache), the surface, the
/// scene depth buffer, the stage list and the UI overlay. Nothing is
/// global: components receive what they need from here.
///
/// Frame sequence on slot `s = frame_index % frame_count`:
///
/// ```text
/// wait_for_slot(s) -> acquire -> reset(s) -> ring.begin_frame(s)
///   -> stages (shadow, scene, skybox) -> UI -> back buffer to Present
///   -> submit -> present -> signal_and_advance(s)
/// ```

use std::path::Path;
use std::sync::Arc;
use crate::config::RendererConfig;
use crate::error::{Error, Result};
use crate::graphics_device::{
    ColorAttachment, CpuDescriptorHandle, DescriptorHeapKind, DescriptorView, GraphicsDevice,
    RenderingDesc, ResourceState, Surface, Texture, TextureDesc, TextureDimension, TextureFormat,
    TextureUsage, TrackedTexture,
};
use crate::renderer::{
    CommandStream, DescriptorAllocator, DescriptorSlot, FrameConstantRing, ShaderLibrary,
    TextureCache, TextureLoader, UiOverlay,
};
use crate::scene::{Model, ModelImporter, SharedScene};
use crate::stages::{
    scene_not_bound, BakeResources, FrameShared, FrameTarget, IblBakeStage, LightingInputs,
    RenderStage, SceneStage, ShadowStage, SkyboxStage, SphereMapConverterStage, StageContext,
    TargetViews,
};
use crate::{engine_debug, engine_error, engine_info, engine_warn};

/// Counters of the last rendered frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RendererStats {
    pub frames_rendered: u64,
    pub draw_calls: u32,
    /// Constant ring bytes used by the last frame
    pub constant_bytes: u64,
}

/// Scene depth buffer shared by the scene and skybox stages
struct DepthTarget {
    texture: Arc<dyn Texture>,
    view: CpuDescriptorHandle,
}

impl DepthTarget {
    fn new(device: &dyn GraphicsDevice, dsv: &DescriptorAllocator, slot: DescriptorSlot, width: u32, height: u32) -> Result<Self> {
        let texture = device.create_texture(&TextureDesc {
            label: "scene_depth".to_string(),
            width,
            height,
            format: TextureFormat::D32_FLOAT,
            dimension: TextureDimension::D2,
            mip_levels: 1,
            usage: TextureUsage::DEPTH_STENCIL,
            initial_state: ResourceState::DepthWrite,
        })?;
        dsv.write_view(slot, DescriptorView::DepthStencil { texture: texture.as_ref() })?;
        Ok(Self { texture, view: dsv.cpu_handle(slot) })
    }
}

pub struct Renderer {
    config: RendererConfig,
    device: Arc<dyn GraphicsDevice>,
    surface: Box<dyn Surface>,
    stream: CommandStream,
    ring: FrameConstantRing,
    rtv: DescriptorAllocator,
    dsv: DescriptorAllocator,
    srv: DescriptorAllocator,
    shaders: ShaderLibrary,
    textures: TextureCache,

    /// One per surface back buffer, with the RTV range starting at `back_buffer_rtvs`
    back_buffers: Vec<TrackedTexture>,
    back_buffer_rtvs: DescriptorSlot,
    /// Slots reserved at `back_buffer_rtvs`
    back_buffer_rtv_count: u32,
    depth: DepthTarget,
    depth_dsv: DescriptorSlot,

    /// Recorded in order: SphereToCube, IblBake, Shadow, Scene, Skybox
    stages: Vec<RenderStage>,
    ui: Box<dyn UiOverlay>,

    scene: Option<SharedScene>,
    frame_index: u64,
    stats: RendererStats,
    /// Set when the surface reported out of date or suboptimal
    needs_resize: bool,
    shut_down: bool,
}

impl Renderer {
    /// Create every subsystem and stage, then convert the environment map and bake the IBL
    ///
    /// # Arguments
    ///
    /// * `device` - Graphics device
    /// * `surface` - Presentable surface created on `device`
    /// * `config` - Renderer configuration (validated here)
    /// * `ui` - Overlay drawn on top of every frame
    /// * `loader` - Decoder for the environment map
    pub fn new(
        device: Arc<dyn GraphicsDevice>,
        surface: Box<dyn Surface>,
        config: RendererConfig,
        mut ui: Box<dyn UiOverlay>,
        loader: &dyn TextureLoader,
    ) -> Result<Self> {
        config.validate()?;

        let mut stream = CommandStream::new(device.as_ref(), config.frame_count)?;
        let mut ring = FrameConstantRing::new(device.as_ref(), config.frame_count, config.max_constant_allocations)?;
        let mut rtv = DescriptorAllocator::new(device.as_ref(), DescriptorHeapKind::RenderTarget, config.rtv_heap_capacity)?;
        let mut dsv = DescriptorAllocator::new(device.as_ref(), DescriptorHeapKind::DepthStencil, config.dsv_heap_capacity)?;
        let mut srv = DescriptorAllocator::new(device.as_ref(), DescriptorHeapKind::ShaderResource, config.srv_heap_capacity)?;

        let font_slot = srv.allocate()?;
        ui.init(device.as_ref(), font_slot, &srv)?;

        let mut shaders = ShaderLibrary::new(config.shader_dir.clone(), device.shader_extension());
        let mut textures = TextureCache::new(device.clone(), &mut stream, &mut srv, config.drain_timeout)?;

        let environment_id = textures.load(&config.environment_map, loader, &mut stream, &mut srv)?;
        let environment = textures
            .get(environment_id)
            .cloned()
            .ok_or_else(|| Error::InvalidResource(format!("Environment map '{}' not cached", config.environment_map.display())))?;

        let back_buffer_count = surface.back_buffer_count() as u32;
        let back_buffer_rtvs = rtv.allocate_range(back_buffer_count)?;
        let back_buffers = track_back_buffers(surface.as_ref(), &rtv, back_buffer_rtvs)?;

        let (width, height) = surface.extent();
        let depth_dsv = dsv.allocate()?;
        let depth = DepthTarget::new(device.as_ref(), &dsv, depth_dsv, width, height)?;

        let converter = SphereMapConverterStage::new(device.as_ref(), &mut shaders, &mut rtv, &mut srv, &environment)?;
        let cube = converter.cube();
        let ibl = IblBakeStage::new(device.as_ref(), &mut shaders, &mut rtv, &mut srv, &cube)?;
        let shadow = ShadowStage::new(device.as_ref(), &mut shaders, &mut dsv, &mut srv, &config.shadow)?;
        let scene = SceneStage::new(
            device.as_ref(),
            &mut shaders,
            &mut srv,
            &LightingInputs {
                shadow_map: shadow.depth_texture().texture().as_ref(),
                dfg: ibl.dfg_texture().as_ref(),
                diffuse_ld: ibl.diffuse_texture().as_ref(),
                specular_ld: ibl.specular_texture().as_ref(),
                environment: cube.texture.as_ref(),
            },
            surface.format(),
            config.frame_count,
        )?;
        let skybox = SkyboxStage::new(device.as_ref(), &mut shaders, &cube, surface.format())?;

        let mut stages = vec![
            RenderStage::SphereToCube(converter),
            RenderStage::IblBake(ibl),
            RenderStage::Shadow(shadow),
            RenderStage::Scene(scene),
            RenderStage::Skybox(skybox),
        ];
        bake_environment(
            &mut stages,
            &mut BakeResources {
                device: device.as_ref(),
                stream: &mut stream,
                ring: &mut ring,
                srv: &srv,
                textures: &textures,
                timeout: config.drain_timeout,
            },
        )?;

        engine_info!("nebula::renderer", "Renderer ready: {}x{}, {} frame slots, {} back buffers, {} SRVs in use",
            width, height, config.frame_count, back_buffer_count, srv.allocated());

        Ok(Self {
            config,
            device,
            surface,
            stream,
            ring,
            rtv,
            dsv,
            srv,
            shaders,
            textures,
            back_buffers,
            back_buffer_rtvs,
            back_buffer_rtv_count: back_buffer_count,
            depth,
            depth_dsv,
            stages,
            ui,
            scene: None,
            frame_index: 0,
            stats: RendererStats::default(),
            needs_resize: false,
            shut_down: false,
        })
    }

    /// Bind `scene` to every per-frame stage
    pub fn set_scene(&mut self, scene: SharedScene) {
        if let Ok(mut guard) = scene.write() {
            let (width, height) = self.surface.extent();
            guard.camera_mut().set_viewport_size(width, height);
        }
        for stage in &mut self.stages {
            stage.set_scene(scene.clone());
        }
        self.scene = Some(scene);
    }

    /// Advance scene time, the shadow light and the UI
    pub fn update(&mut self, delta_time: f32) {
        if let Some(scene) = &self.scene {
            if let Ok(mut guard) = scene.write() {
                guard.update(delta_time);
            }
        }
        for stage in &mut self.stages {
            stage.update(delta_time);
        }
        self.ui.update(delta_time);
    }

    /// Record, submit and present one frame
    ///
    /// Returns `Ok(false)` when the surface is out of date and the frame was
    /// skipped. Whenever the surface asks to be rebuilt (out of date at
    /// acquire, suboptimal at present) `needs_resize` turns true; the caller
    /// should `resize` before the next frame.
    pub fn render(&mut self) -> Result<bool> {
        if self.shut_down {
            return Err(Error::BackendError("render called after shutdown".to_string()));
        }
        if self.scene.is_none() {
            return Err(scene_not_bound("Renderer"));
        }

        let slot = (self.frame_index % self.config.frame_count as u64) as usize;
        self.stream.wait_for_slot(slot, self.config.frame_wait_timeout)?;

        let Some(index) = self.surface.acquire_next_back_buffer()? else {
            engine_warn!("nebula::renderer", "Surface out of date, skipping frame {}", self.frame_index);
            self.needs_resize = true;
            return Ok(false);
        };
        let (width, height) = self.surface.extent();
        let views = TargetViews {
            color: self.rtv.cpu_handle(self.back_buffer_rtvs.offset(index as u32)),
            depth: self.depth.view,
            width,
            height,
        };
        let back_buffer = self.back_buffers.get_mut(index).ok_or_else(|| {
            Error::BackendError(format!("Surface returned back buffer {} of {}", index, self.surface.back_buffer_count()))
        })?;

        self.stream.reset(slot)?;
        self.ring.begin_frame(slot)?;

        let mut frame = FrameShared::default();
        let draw_calls = {
            let mut ctx = StageContext {
                cmd: self.stream.active_list()?,
                slot,
                ring: &mut self.ring,
                srv: &self.srv,
                textures: &self.textures,
                frame: &mut frame,
                target: Some(FrameTarget { back_buffer, views }),
                draw_calls: 0,
            };

            for stage in &mut self.stages {
                stage.record(&mut ctx)?;
            }

            ctx.transition_back_buffer(ResourceState::RenderTarget)?;
            ctx.cmd.begin_rendering(&RenderingDesc {
                color: vec![ColorAttachment { view: views.color, clear: None }],
                depth: None,
                width,
                height,
            })?;
            self.ui.record(&mut *ctx.cmd)?;
            ctx.cmd.end_rendering()?;

            ctx.transition_back_buffer(ResourceState::Present)?;
            ctx.draw_calls
        };

        self.stream.submit(Some(self.surface.as_ref()))?;
        if !self.surface.present(self.config.present_interval)? {
            engine_debug!("nebula::renderer", "Surface suboptimal after frame {}", self.frame_index);
            self.needs_resize = true;
        }
        self.stream.signal_and_advance(slot)?;

        self.stats = RendererStats {
            frames_rendered: self.stats.frames_rendered + 1,
            draw_calls,
            constant_bytes: self.ring.cursor(slot)?,
        };
        self.frame_index += 1;
        Ok(true)
    }

    /// Resize the surface and everything sized from it
    ///
    /// A zero-sized window (minimized) is ignored. Waits for all in-flight
    /// frames first; a drain timeout is fatal.
    pub fn resize(&mut self, width: u32, height: u32) -> Result<()> {
        if width == 0 || height == 0 {
            engine_debug!("nebula::renderer", "Ignoring resize to {}x{}", width, height);
            return Ok(());
        }

        self.stream.drain(self.config.drain_timeout)?;
        self.surface.resize(width, height)?;

        // A rebuilt swap chain may hold more images than the reserved range
        let count = self.surface.back_buffer_count() as u32;
        if count > self.back_buffer_rtv_count {
            engine_debug!("nebula::renderer", "Back buffers grew from {} to {}, reserving new RTVs",
                self.back_buffer_rtv_count, count);
            self.back_buffer_rtvs = self.rtv.allocate_range(count)?;
            self.back_buffer_rtv_count = count;
        }
        self.back_buffers = track_back_buffers(self.surface.as_ref(), &self.rtv, self.back_buffer_rtvs)?;
        self.needs_resize = false;

        let (width, height) = self.surface.extent();
        self.depth = DepthTarget::new(self.device.as_ref(), &self.dsv, self.depth_dsv, width, height)?;
        if let Some(scene) = &self.scene {
            if let Ok(mut guard) = scene.write() {
                guard.camera_mut().set_viewport_size(width, height);
            }
        }

        engine_info!("nebula::renderer", "Resized to {}x{}", width, height);
        Ok(())
    }

    /// Convert a new environment image and rebake the IBL from it
    ///
    /// The cube keeps the size chosen at start-up.
    pub fn set_environment_map(&mut self, path: &Path, loader: &dyn TextureLoader) -> Result<()> {
        self.stream.drain(self.config.drain_timeout)?;

        let id = self.textures.load(path, loader, &mut self.stream, &mut self.srv)?;
        let source = self
            .textures
            .get(id)
            .cloned()
            .ok_or_else(|| Error::InvalidResource(format!("Environment map '{}' not cached", path.display())))?;

        for stage in &mut self.stages {
            match stage {
                RenderStage::SphereToCube(converter) => converter.set_source(&source),
                RenderStage::IblBake(ibl) => ibl.invalidate(),
                _ => {}
            }
        }

        // Bakes use ring slot 0, which the drain above retired
        self.ring.begin_frame(0)?;
        bake_environment(
            &mut self.stages,
            &mut BakeResources {
                device: self.device.as_ref(),
                stream: &mut self.stream,
                ring: &mut self.ring,
                srv: &self.srv,
                textures: &self.textures,
                timeout: self.config.drain_timeout,
            },
        )?;

        engine_info!("nebula::renderer", "Environment map set to '{}'", path.display());
        Ok(())
    }

    /// Import a model file and upload it
    pub fn load_model(&mut self, path: &Path, importer: &dyn ModelImporter, loader: &dyn TextureLoader) -> Result<Model> {
        let imported = importer.import(path)?;
        let model = Model::from_import(
            self.device.as_ref(),
            &imported,
            &mut self.textures,
            loader,
            &mut self.stream,
            &mut self.srv,
        )?;
        engine_info!("nebula::renderer", "Loaded model '{}' ({} meshes)", path.display(), model.meshes().len());
        Ok(model)
    }

    /// Wait for every in-flight frame; rendering is refused afterwards
    pub fn shutdown(&mut self) -> Result<()> {
        if self.shut_down {
            return Ok(());
        }
        self.shut_down = true;
        self.stream.drain(self.config.drain_timeout)?;
        engine_info!("nebula::renderer", "Renderer shut down after {} frames", self.stats.frames_rendered);
        Ok(())
    }

    // ===== ACCESSORS =====

    pub fn stats(&self) -> RendererStats {
        self.stats
    }

    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    /// Whether the surface asked to be rebuilt since the last `resize`
    pub fn needs_resize(&self) -> bool {
        self.needs_resize
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    pub fn stages(&self) -> &[RenderStage] {
        &self.stages
    }

    pub fn stages_mut(&mut self) -> &mut [RenderStage] {
        &mut self.stages
    }

    pub fn shadow_stage_mut(&mut self) -> Option<&mut ShadowStage> {
        self.stages.iter_mut().find_map(|stage| match stage {
            RenderStage::Shadow(shadow) => Some(shadow),
            _ => None,
        })
    }

    pub fn surface(&self) -> &dyn Surface {
        self.surface.as_ref()
    }

    pub fn textures(&self) -> &TextureCache {
        &self.textures
    }

    pub fn srv_heap(&self) -> &DescriptorAllocator {
        &self.srv
    }

    pub fn command_stream(&self) -> &CommandStream {
        &self.stream
    }

    /// Depth buffer the scene and skybox stages render with
    pub fn depth_texture(&self) -> &Arc<dyn Texture> {
        &self.depth.texture
    }

    pub fn shader_count(&self) -> usize {
        self.shaders.len()
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            engine_error!("nebula::renderer", "Shutdown on drop failed: {}", e);
        }
    }
}

/// Track the surface's back buffers (in `Present`) and write their RTVs
fn track_back_buffers(surface: &dyn Surface, rtv: &DescriptorAllocator, first: DescriptorSlot) -> Result<Vec<TrackedTexture>> {
    (0..surface.back_buffer_count())
        .map(|i| {
            let texture = surface.back_buffer(i);
            rtv.write_view(
                first.offset(i as u32),
                DescriptorView::RenderTarget { texture: texture.as_ref(), mip: 0, array_layer: 0 },
            )?;
            Ok(TrackedTexture::new(texture, ResourceState::Present))
        })
        .collect()
}

/// Run the one-shot stages that are not baked yet, in stage order
fn bake_environment(stages: &mut [RenderStage], res: &mut BakeResources<'_>) -> Result<()> {
    for stage in stages {
        let baked = match stage {
            RenderStage::SphereToCube(converter) => converter.bake(res)?,
            RenderStage::IblBake(ibl) => ibl.bake(res)?,
            _ => continue,
        };
        if baked {
            engine_info!("nebula::renderer", "{} baked", stage.name());
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "renderer_tests.rs"]
mod tests;
