//! Unit tests for model.rs, mesh.rs and scene.rs

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use glam::{Mat4, Vec3};
use crate::error::{Error, Result};
use crate::graphics_device::mock_graphics_device::MockGraphicsDevice;
use crate::graphics_device::{Buffer, BufferUsage, DescriptorHeapKind};
use crate::renderer::{
    texture_id, CommandStream, DescriptorAllocator, TextureCache, TextureLoader, TextureSource,
};
use crate::scene::{ImportedModel, MaterialDesc, Mesh, MeshData, Model, Scene, Vertex};

struct WhiteLoader;

impl TextureLoader for WhiteLoader {
    fn load(&self, path: &Path) -> Result<TextureSource> {
        if path.extension().is_some_and(|e| e == "bad") {
            return Err(Error::InvalidResource("unsupported".to_string()));
        }
        Ok(TextureSource::solid_color([255; 4]))
    }
}

fn triangle(name: &str, material_index: Option<usize>) -> MeshData {
    MeshData {
        name: name.to_string(),
        vertices: vec![Vertex::default(); 3],
        indices: vec![0, 1, 2],
        material_index,
    }
}

struct Fixture {
    device: Arc<MockGraphicsDevice>,
    stream: CommandStream,
    srv: DescriptorAllocator,
    cache: TextureCache,
}

fn fixture() -> Fixture {
    let device = Arc::new(MockGraphicsDevice::new());
    let mut stream = CommandStream::new(device.as_ref(), 2).unwrap();
    let mut srv = DescriptorAllocator::new(device.as_ref(), DescriptorHeapKind::ShaderResource, 32).unwrap();
    let cache = TextureCache::new(device.clone(), &mut stream, &mut srv, Duration::from_millis(10)).unwrap();
    Fixture { device, stream, srv, cache }
}

// ============================================================================
// MESH
// ============================================================================

#[test]
fn test_vertex_stride_and_layout() {
    assert_eq!(Vertex::STRIDE, 44);
    let layout = Vertex::input_layout();
    assert_eq!(layout.len(), 4);
    assert_eq!(layout[3].offset, 32);
    assert_eq!(Vertex::position_layout().len(), 1);
}

#[test]
fn test_mesh_upload_fills_buffers() {
    let device = MockGraphicsDevice::new();
    let mesh = Mesh::upload(&device, &triangle("tri", None)).unwrap();

    assert_eq!(mesh.index_count(), 3);
    assert_eq!(mesh.vertex_buffer().size(), 3 * 44);
    assert_eq!(mesh.index_buffer().usage(), BufferUsage::Index);
    let indices = device.buffers()[1].read(0, 12);
    assert_eq!(indices, bytemuck::cast_slice::<u32, u8>(&[0, 1, 2]).to_vec());
}

#[test]
fn test_mesh_without_triangles_is_rejected() {
    let device = MockGraphicsDevice::new();
    let mut data = triangle("broken", None);
    data.indices.push(0);
    assert!(Mesh::upload(&device, &data).is_err());

    data.indices.clear();
    assert!(Mesh::upload(&device, &data).is_err());
}

// ============================================================================
// MODEL
// ============================================================================

#[test]
fn test_from_import_resolves_textures() {
    let mut f = fixture();
    let imported = ImportedModel {
        meshes: vec![triangle("a", Some(0)), triangle("b", None)],
        materials: vec![MaterialDesc {
            diffuse: Vec3::new(1.0, 0.0, 0.0),
            diffuse_texture: Some(PathBuf::from("tex/brick.png")),
            normal_texture: Some(PathBuf::from("tex/brick_n.png")),
            ..Default::default()
        }],
    };

    let model = Model::from_import(
        f.device.as_ref(), &imported, &mut f.cache, &WhiteLoader, &mut f.stream, &mut f.srv,
    )
    .unwrap();

    assert_eq!(model.meshes().len(), 2);
    let material = model.material_of(&model.meshes()[0]).unwrap();
    assert_eq!(material.diffuse_texture, Some(texture_id(Path::new("tex/brick.png"))));
    assert_eq!(material.to_buffer().diffuse, Vec3::new(1.0, 0.0, 0.0));
    assert!(model.material_of(&model.meshes()[1]).is_none());
    assert_eq!(f.cache.len(), 2);
}

#[test]
fn test_shared_texture_is_loaded_once() {
    let mut f = fixture();
    let desc = MaterialDesc { diffuse_texture: Some(PathBuf::from("tex/shared.png")), ..Default::default() };
    let imported = ImportedModel {
        meshes: vec![triangle("a", Some(0)), triangle("b", Some(1))],
        materials: vec![desc.clone(), desc],
    };

    Model::from_import(f.device.as_ref(), &imported, &mut f.cache, &WhiteLoader, &mut f.stream, &mut f.srv)
        .unwrap();

    assert_eq!(f.cache.len(), 1);
    // Placeholder + one texture
    assert_eq!(f.device.textures().len(), 2);
}

#[test]
fn test_unloadable_texture_does_not_fail_import() {
    let mut f = fixture();
    let imported = ImportedModel {
        meshes: vec![triangle("a", Some(0))],
        materials: vec![MaterialDesc { diffuse_texture: Some(PathBuf::from("x.bad")), ..Default::default() }],
    };

    let model = Model::from_import(
        f.device.as_ref(), &imported, &mut f.cache, &WhiteLoader, &mut f.stream, &mut f.srv,
    )
    .unwrap();

    let id = model.materials()[0].diffuse_texture.unwrap();
    assert_eq!(f.cache.descriptor(id), Some(f.cache.placeholder().slot));
}

#[test]
fn test_material_defaults() {
    let desc = MaterialDesc::default();
    assert_eq!(desc.diffuse, Vec3::splat(0.5));
    assert_eq!(desc.alpha, 1.0);
}

// ============================================================================
// SCENE
// ============================================================================

#[test]
fn test_scene_models_and_runtime() {
    let mut f = fixture();
    let mut scene = Scene::new(1280, 720);
    let mut model = Model::from_import(
        f.device.as_ref(), &ImportedModel::default(), &mut f.cache, &WhiteLoader, &mut f.stream, &mut f.srv,
    )
    .unwrap();
    model.set_world(Mat4::from_scale(Vec3::splat(2.0)));

    let index = scene.add_model(model);
    scene.update(0.5);
    scene.update(0.25);

    assert_eq!(index, 0);
    assert_eq!(scene.models().len(), 1);
    assert_eq!(scene.model_mut(0).unwrap().world(), Mat4::from_scale(Vec3::splat(2.0)));
    assert_eq!(scene.runtime(), 0.75);
    scene.lights_mut().active_point_lights = 2;
    assert_eq!(scene.lights().active_point_lights, 2);
}
