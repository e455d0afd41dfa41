/// Models: meshes, materials and a world transform.

use std::path::Path;
use glam::Mat4;
use crate::error::Result;
use crate::graphics_device::GraphicsDevice;
use crate::renderer::{CommandStream, DescriptorAllocator, TextureCache, TextureId, TextureLoader};
use crate::scene::{Material, MaterialDesc, Mesh, MeshData};

/// Output of a `ModelImporter`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImportedModel {
    pub meshes: Vec<MeshData>,
    pub materials: Vec<MaterialDesc>,
}

/// Parses model files (external collaborator)
///
/// Implementations return triangulated, left-handed geometry with
/// flipped UVs and tangents computed.
pub trait ModelImporter {
    fn import(&self, path: &Path) -> Result<ImportedModel>;
}

/// Renderable model; owns its meshes
pub struct Model {
    meshes: Vec<Mesh>,
    materials: Vec<Material>,
    world: Mat4,
}

impl Model {
    /// Upload an imported model and load its textures
    pub fn from_import(
        device: &dyn GraphicsDevice,
        imported: &ImportedModel,
        textures: &mut TextureCache,
        loader: &dyn TextureLoader,
        stream: &mut CommandStream,
        srv: &mut DescriptorAllocator,
    ) -> Result<Self> {
        let mut resolve = |path: &Option<std::path::PathBuf>| -> Result<Option<TextureId>> {
            match path {
                Some(path) => textures.load(path, loader, stream, srv).map(Some),
                None => Ok(None),
            }
        };

        let mut materials = Vec::with_capacity(imported.materials.len());
        for desc in &imported.materials {
            materials.push(Material {
                diffuse: desc.diffuse,
                specular: desc.specular,
                alpha: desc.alpha,
                shininess: desc.shininess,
                diffuse_texture: resolve(&desc.diffuse_texture)?,
                normal_texture: resolve(&desc.normal_texture)?,
                metallic_roughness_texture: resolve(&desc.metallic_roughness_texture)?,
                shininess_texture: resolve(&desc.shininess_texture)?,
                specular_texture: resolve(&desc.specular_texture)?,
            });
        }

        let meshes = imported
            .meshes
            .iter()
            .map(|data| Mesh::upload(device, data))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { meshes, materials, world: Mat4::IDENTITY })
    }

    pub fn meshes(&self) -> &[Mesh] {
        &self.meshes
    }

    /// Material of `mesh`, `None` when the mesh has none (or an out-of-range index)
    pub fn material_of(&self, mesh: &Mesh) -> Option<&Material> {
        mesh.material_index().and_then(|i| self.materials.get(i))
    }

    pub fn materials(&self) -> &[Material] {
        &self.materials
    }

    pub fn world(&self) -> Mat4 {
        self.world
    }

    pub fn set_world(&mut self, world: Mat4) {
        self.world = world;
    }
}

#[cfg(test)]
#[path = "model_tests.rs"]
mod tests;
