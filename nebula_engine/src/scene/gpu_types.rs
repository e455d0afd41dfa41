/// Constant blocks shared with the shaders.
///
/// Every block is `#[repr(C)]` plain old data laid out to match the HLSL
/// `cbuffer` declarations (16-byte rows, no implicit padding). Blocks that
/// go through the frame constant ring must stay within 256 bytes.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3, Vec4};

/// Number of point lights in `LightData`
pub const MAX_POINT_LIGHTS: usize = 15;

/// Per-mesh transforms (b0 of the scene and skybox pipelines)
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct TransformBuffer {
    pub world: Mat4,
    pub view: Mat4,
    pub proj: Mat4,
}

/// Per-mesh material (b1 of the scene pipeline)
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct MaterialBuffer {
    pub diffuse: Vec3,
    pub alpha: f32,
    pub specular: Vec3,
    pub shininess: f32,
}

/// Per-frame scene constants: light transform and camera
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct SceneConstants {
    pub light_view_proj: Mat4,
    /// Camera position (w = 1)
    pub camera_position: Vec4,
    /// Direction the directional light travels (w = 0)
    pub light_direction: Vec4,
}

/// Parameters of one IBL integration draw
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct BakeConstants {
    pub face_index: u32,
    pub roughness: f32,
    /// Width of the environment cube being integrated
    pub width: f32,
    /// Highest mip index of the environment cube
    pub mip_count: f32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct PointLight {
    pub position: Vec3,
    pub intensity: f32,
    pub color: Vec4,
}

impl Default for PointLight {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            intensity: 10.0,
            color: Vec4::ZERO,
        }
    }
}

/// Point lights of the scene (512 bytes, uploaded outside the ring)
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct LightData {
    pub point_lights: [PointLight; MAX_POINT_LIGHTS],
    pub active_point_lights: u32,
    pub _pad: [u32; 7],
}

impl Default for LightData {
    fn default() -> Self {
        Self {
            point_lights: [PointLight::default(); MAX_POINT_LIGHTS],
            active_point_lights: 0,
            _pad: [0; 7],
        }
    }
}

#[cfg(test)]
#[path = "gpu_types_tests.rs"]
mod tests;
