//! Render stages
//!
//! A frame is recorded by a fixed sequence of stages, each owning its
//! pipeline, its private textures and the descriptor slots it reserved at
//! construction. The set is closed, so it is modelled as an enum rather
//! than a trait object list.
//!
//! Per-frame stages (`Shadow`, `Scene`, `Skybox`) need a bound scene and
//! move `NotBound -> Bound -> Recording -> Bound`. One-shot stages
//! (`SphereToCube`, `IblBake`) move `Uninitialized -> Baked` and record
//! nothing afterwards until invalidated.

mod ibl_bake;
mod scene;
mod shadow;
mod skybox;
mod sphere_map_converter;

pub use ibl_bake::{IblBakeStage, DFG_SIZE, IRRADIANCE_SIZE, SPECULAR_MIP_COUNT};
pub use scene::{LightingInputs, SceneStage, CLEAR_COLOR};
pub use shadow::{DirectionalLight, ShadowStage};
pub use skybox::SkyboxStage;
pub use sphere_map_converter::{cube_size_for, SphereMapConverterStage};

use std::sync::RwLockReadGuard;
use std::time::Duration;
use glam::{Mat4, Vec3};
use crate::engine_fatal;
use crate::error::{Error, Result};
use crate::graphics_device::{
    CommandList, CpuDescriptorHandle, GpuDescriptorHandle, GraphicsDevice, Rect2D,
    ResourceState, TrackedTexture, Viewport,
};
use crate::renderer::{CommandStream, DescriptorAllocator, DescriptorSlot, FrameConstantRing, TextureCache};
use crate::scene::{Scene, SharedScene};

// ===== STAGE STATE =====

/// Lifecycle of a stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageState {
    /// Per-frame stage without a scene
    NotBound,
    /// Per-frame stage ready to record
    Bound,
    /// Per-frame stage inside `record`
    Recording,
    /// One-shot stage whose outputs are not valid yet
    Uninitialized,
    /// One-shot stage whose outputs are valid
    Baked,
}

// ===== STAGE CONTEXT =====

/// Values one stage produces for the stages recorded after it in the same frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameShared {
    pub light_view_proj: Mat4,
    /// Direction the directional light travels
    pub light_direction: Vec3,
}

impl Default for FrameShared {
    fn default() -> Self {
        Self {
            light_view_proj: Mat4::IDENTITY,
            light_direction: Vec3::NEG_Y,
        }
    }
}

/// Views and extent of the frame's color and depth attachments
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TargetViews {
    pub color: CpuDescriptorHandle,
    pub depth: CpuDescriptorHandle,
    pub width: u32,
    pub height: u32,
}

impl TargetViews {
    pub fn viewport(&self) -> Viewport {
        Viewport::from_extent(self.width, self.height)
    }

    pub fn scissor(&self) -> Rect2D {
        Rect2D::from_extent(self.width, self.height)
    }
}

/// Back buffer of the frame being recorded
pub struct FrameTarget<'a> {
    pub back_buffer: &'a mut TrackedTexture,
    pub views: TargetViews,
}

/// Everything a stage records with
pub struct StageContext<'a> {
    pub cmd: &'a mut dyn CommandList,
    /// Frame slot; selects the constant ring region
    pub slot: usize,
    pub ring: &'a mut FrameConstantRing,
    pub srv: &'a DescriptorAllocator,
    pub textures: &'a TextureCache,
    pub frame: &'a mut FrameShared,
    /// `None` for one-shot bakes, which render only into their own textures
    pub target: Option<FrameTarget<'a>>,
    /// Draws recorded so far
    pub draw_calls: u32,
}

impl<'a> StageContext<'a> {
    /// Views of the frame target
    pub fn target_views(&self) -> Result<TargetViews> {
        self.target
            .as_ref()
            .map(|target| target.views)
            .ok_or_else(|| Error::BackendError("Stage needs a frame target but none was provided".to_string()))
    }

    /// Move the back buffer to `after` (no barrier when already there)
    pub fn transition_back_buffer(&mut self, after: ResourceState) -> Result<()> {
        let Some(target) = self.target.as_mut() else {
            return Err(Error::BackendError("Stage needs a frame target but none was provided".to_string()));
        };
        target.back_buffer.transition(&mut *self.cmd, after)?;
        Ok(())
    }

    /// GPU handle of a slot in the shader-visible heap
    pub fn table(&self, slot: DescriptorSlot) -> Result<GpuDescriptorHandle> {
        shader_visible_handle(self.srv, slot)
    }
}

pub(crate) fn shader_visible_handle(srv: &DescriptorAllocator, slot: DescriptorSlot) -> Result<GpuDescriptorHandle> {
    srv.gpu_handle(slot).ok_or_else(|| {
        Error::BackendError(format!("Descriptor slot {} is not in a shader-visible heap", slot.index()))
    })
}

/// Logged error for a stage recorded before `set_scene`
pub(crate) fn scene_not_bound(stage: &str) -> Error {
    engine_fatal!("nebula::stages", Error::SceneNotBound(stage.to_string()))
}

/// Read-lock the bound scene, or fail with `SceneNotBound`
pub(crate) fn read_scene<'s>(scene: &'s Option<SharedScene>, stage: &str) -> Result<RwLockReadGuard<'s, Scene>> {
    let Some(scene) = scene else {
        return Err(scene_not_bound(stage));
    };
    scene
        .read()
        .map_err(|_| Error::BackendError(format!("Scene lock poisoned while recording {}", stage)))
}

// ===== ONE-SHOT EXECUTION =====

/// Resources a blocking bake records with
pub struct BakeResources<'a> {
    pub device: &'a dyn GraphicsDevice,
    pub stream: &'a mut CommandStream,
    pub ring: &'a mut FrameConstantRing,
    pub srv: &'a DescriptorAllocator,
    pub textures: &'a TextureCache,
    pub timeout: Duration,
}

/// Record `record` into a one-shot command list (ring slot 0, no frame target) and wait for it
pub(crate) fn execute_bake<F>(res: &mut BakeResources<'_>, record: F) -> Result<()>
where
    F: FnOnce(&mut StageContext<'_>) -> Result<()>,
{
    let ring = &mut *res.ring;
    let srv = res.srv;
    let textures = res.textures;
    res.stream.execute_one_shot(res.device, res.timeout, |cmd| {
        let mut frame = FrameShared::default();
        let mut ctx = StageContext {
            cmd,
            slot: 0,
            ring,
            srv,
            textures,
            frame: &mut frame,
            target: None,
            draw_calls: 0,
        };
        record(&mut ctx)
    })
}

// ===== RENDER STAGE =====

/// The closed set of stages
pub enum RenderStage {
    SphereToCube(SphereMapConverterStage),
    IblBake(IblBakeStage),
    Shadow(ShadowStage),
    Scene(SceneStage),
    Skybox(SkyboxStage),
}

impl RenderStage {
    pub fn name(&self) -> &'static str {
        match self {
            RenderStage::SphereToCube(_) => "SphereToCube",
            RenderStage::IblBake(_) => "IblBake",
            RenderStage::Shadow(_) => "Shadow",
            RenderStage::Scene(_) => "Scene",
            RenderStage::Skybox(_) => "Skybox",
        }
    }

    /// Record this stage's commands for the current frame
    pub fn record(&mut self, ctx: &mut StageContext<'_>) -> Result<()> {
        match self {
            RenderStage::SphereToCube(stage) => stage.record(ctx),
            RenderStage::IblBake(stage) => stage.record(ctx),
            RenderStage::Shadow(stage) => stage.record(ctx),
            RenderStage::Scene(stage) => stage.record(ctx),
            RenderStage::Skybox(stage) => stage.record(ctx),
        }
    }

    /// Bind the scene (ignored by one-shot stages)
    pub fn set_scene(&mut self, scene: SharedScene) {
        match self {
            RenderStage::Shadow(stage) => stage.set_scene(scene),
            RenderStage::Scene(stage) => stage.set_scene(scene),
            RenderStage::Skybox(stage) => stage.set_scene(scene),
            RenderStage::SphereToCube(_) | RenderStage::IblBake(_) => {}
        }
    }

    pub fn update(&mut self, delta_time: f32) {
        if let RenderStage::Shadow(stage) = self {
            stage.update(delta_time);
        }
    }

    pub fn state(&self) -> StageState {
        match self {
            RenderStage::SphereToCube(stage) => stage.state(),
            RenderStage::IblBake(stage) => stage.state(),
            RenderStage::Shadow(stage) => stage.state(),
            RenderStage::Scene(stage) => stage.state(),
            RenderStage::Skybox(stage) => stage.state(),
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support;
