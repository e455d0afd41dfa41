/// Surface material as parsed by the importer and as resolved against the texture cache.

use std::path::PathBuf;
use glam::Vec3;
use crate::renderer::TextureId;
use crate::scene::MaterialBuffer;

/// Material as described by the model file (texture references are paths)
#[derive(Debug, Clone, PartialEq)]
pub struct MaterialDesc {
    pub diffuse: Vec3,
    pub specular: Vec3,
    pub alpha: f32,
    pub shininess: f32,
    pub diffuse_texture: Option<PathBuf>,
    pub normal_texture: Option<PathBuf>,
    pub metallic_roughness_texture: Option<PathBuf>,
    pub shininess_texture: Option<PathBuf>,
    pub specular_texture: Option<PathBuf>,
}

impl Default for MaterialDesc {
    fn default() -> Self {
        Self {
            diffuse: Vec3::splat(0.5),
            specular: Vec3::splat(0.5),
            alpha: 1.0,
            shininess: 0.0,
            diffuse_texture: None,
            normal_texture: None,
            metallic_roughness_texture: None,
            shininess_texture: None,
            specular_texture: None,
        }
    }
}

/// Material with texture references resolved to cache ids
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Material {
    pub diffuse: Vec3,
    pub specular: Vec3,
    pub alpha: f32,
    pub shininess: f32,
    pub diffuse_texture: Option<TextureId>,
    pub normal_texture: Option<TextureId>,
    pub metallic_roughness_texture: Option<TextureId>,
    pub shininess_texture: Option<TextureId>,
    pub specular_texture: Option<TextureId>,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            diffuse: Vec3::splat(0.5),
            specular: Vec3::splat(0.5),
            alpha: 1.0,
            shininess: 0.0,
            diffuse_texture: None,
            normal_texture: None,
            metallic_roughness_texture: None,
            shininess_texture: None,
            specular_texture: None,
        }
    }
}

impl Material {
    /// Constant block uploaded for meshes using this material
    pub fn to_buffer(&self) -> MaterialBuffer {
        MaterialBuffer {
            diffuse: self.diffuse,
            alpha: self.alpha,
            specular: self.specular,
            shininess: self.shininess,
        }
    }
}
