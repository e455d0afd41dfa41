//! Unit tests for texture.rs

use crate::graphics_device::{
    ResourceState, TextureDesc, TextureDimension, TextureFormat, TextureInfo, TextureUsage,
};

fn cube_desc(size: u32, mips: u32) -> TextureDesc {
    TextureDesc {
        label: "specular_ld".to_string(),
        width: size,
        height: size,
        format: TextureFormat::R32G32B32A32_SFLOAT,
        dimension: TextureDimension::Cube,
        mip_levels: mips,
        usage: TextureUsage::SAMPLED | TextureUsage::RENDER_TARGET,
        initial_state: ResourceState::ShaderResource,
    }
}

#[test]
fn test_bytes_per_pixel() {
    assert_eq!(TextureFormat::R8G8B8A8_UNORM.bytes_per_pixel(), 4);
    assert_eq!(TextureFormat::R32G32_SFLOAT.bytes_per_pixel(), 8);
    assert_eq!(TextureFormat::R32G32B32_SFLOAT.bytes_per_pixel(), 12);
    assert_eq!(TextureFormat::R32G32B32A32_SFLOAT.bytes_per_pixel(), 16);
}

#[test]
fn test_is_depth() {
    assert!(TextureFormat::D32_FLOAT.is_depth());
    assert!(!TextureFormat::R32_SFLOAT.is_depth());
}

#[test]
fn test_info_from_desc_cube() {
    let info = TextureInfo::from_desc(&cube_desc(128, 7));
    assert_eq!(info.array_layers(), 6);
    assert_eq!(info.mip_levels, 7);
    assert!(info.usage.contains(TextureUsage::RENDER_TARGET));
}

#[test]
fn test_info_clamps_zero_mips_to_one() {
    let info = TextureInfo::from_desc(&cube_desc(128, 0));
    assert_eq!(info.mip_levels, 1);
}

#[test]
fn test_mip_extent_halves_down_to_one() {
    let info = TextureInfo::from_desc(&cube_desc(128, 8));
    assert_eq!(info.mip_extent(0), (128, 128));
    assert_eq!(info.mip_extent(1), (64, 64));
    assert_eq!(info.mip_extent(6), (2, 2));
    assert_eq!(info.mip_extent(7), (1, 1));
    assert_eq!(info.mip_extent(12), (1, 1));
}
