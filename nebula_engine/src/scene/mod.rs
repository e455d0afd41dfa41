//! Scene data module
//!
//! Camera, models, materials, lights and the plain-old-data constant blocks
//! the stages upload through the frame constant ring.

mod camera;
mod gpu_types;
mod material;
mod mesh;
mod model;
mod scene;

pub use camera::{Camera, ProjectionMode};
pub use gpu_types::{
    BakeConstants, LightData, MaterialBuffer, PointLight, SceneConstants, TransformBuffer,
    MAX_POINT_LIGHTS,
};
pub use material::{Material, MaterialDesc};
pub use mesh::{Mesh, MeshData, Vertex};
pub use model::{ImportedModel, Model, ModelImporter};
pub use scene::{Scene, SharedScene};
