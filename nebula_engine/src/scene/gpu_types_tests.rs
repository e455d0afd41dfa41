//! Layout tests for gpu_types.rs

use std::mem::size_of;
use crate::scene::{
    BakeConstants, LightData, MaterialBuffer, PointLight, SceneConstants, TransformBuffer,
};

#[test]
fn test_ring_blocks_fit_in_256_bytes() {
    assert_eq!(size_of::<TransformBuffer>(), 192);
    assert_eq!(size_of::<MaterialBuffer>(), 32);
    assert_eq!(size_of::<SceneConstants>(), 96);
    assert_eq!(size_of::<BakeConstants>(), 16);
}

#[test]
fn test_light_data_layout() {
    assert_eq!(size_of::<PointLight>(), 32);
    assert_eq!(size_of::<LightData>(), 512);
    assert_eq!(std::mem::offset_of!(LightData, active_point_lights), 480);
}

#[test]
fn test_point_light_default_intensity() {
    let lights = LightData::default();
    assert_eq!(lights.active_point_lights, 0);
    assert!(lights.point_lights.iter().all(|l| l.intensity == 10.0));
}
