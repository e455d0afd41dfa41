/// Scene: camera, models and point lights.
///
/// The scene is shared between the application and the stages as
/// `Arc<RwLock<Scene>>`. Stages take a read lock while recording; the
/// application takes a write lock between frames.

use std::sync::{Arc, RwLock};
use crate::scene::{Camera, LightData, Model};

/// Scene handle given to `Renderer::set_scene`
pub type SharedScene = Arc<RwLock<Scene>>;

pub struct Scene {
    camera: Camera,
    models: Vec<Model>,
    lights: LightData,
    runtime: f32,
}

impl Scene {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            camera: Camera::new(width, height),
            models: Vec::new(),
            lights: LightData::default(),
            runtime: 0.0,
        }
    }

    /// Wrap into the handle stages consume
    pub fn into_shared(self) -> SharedScene {
        Arc::new(RwLock::new(self))
    }

    pub fn update(&mut self, delta_time: f32) {
        self.runtime += delta_time;
    }

    pub fn add_model(&mut self, model: Model) -> usize {
        self.models.push(model);
        self.models.len() - 1
    }

    pub fn models(&self) -> &[Model] {
        &self.models
    }

    pub fn model_mut(&mut self, index: usize) -> Option<&mut Model> {
        self.models.get_mut(index)
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn camera_mut(&mut self) -> &mut Camera {
        &mut self.camera
    }

    pub fn lights(&self) -> &LightData {
        &self.lights
    }

    pub fn lights_mut(&mut self) -> &mut LightData {
        &mut self.lights
    }

    /// Seconds accumulated through `update`
    pub fn runtime(&self) -> f32 {
        self.runtime
    }
}
