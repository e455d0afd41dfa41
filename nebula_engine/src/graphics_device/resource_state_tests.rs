//! Unit tests for resource_state.rs

use std::sync::Arc;
use crate::graphics_device::mock_graphics_device::{MockGraphicsDevice, MockTexture};
use crate::graphics_device::{CommandList, GraphicsDevice, ResourceState, TextureFormat, TrackedTexture};

fn shadow_map() -> TrackedTexture {
    TrackedTexture::new(
        Arc::new(MockTexture::new("shadow_map", 256, 256, TextureFormat::D32_FLOAT)),
        ResourceState::ShaderResource,
    )
}

#[test]
fn test_transition_records_barrier_from_tracked_state() {
    let device = MockGraphicsDevice::new();
    let mut cmd = device.create_command_list().unwrap();
    cmd.begin().unwrap();
    let mut depth = shadow_map();

    assert!(depth.transition(cmd.as_mut(), ResourceState::DepthWrite).unwrap());
    assert!(depth.transition(cmd.as_mut(), ResourceState::ShaderResource).unwrap());

    assert_eq!(depth.state(), ResourceState::ShaderResource);
    assert_eq!(
        device.journal().barriers_of("shadow_map"),
        vec![
            (ResourceState::ShaderResource, ResourceState::DepthWrite),
            (ResourceState::DepthWrite, ResourceState::ShaderResource),
        ]
    );
}

#[test]
fn test_transition_to_same_state_is_noop() {
    let device = MockGraphicsDevice::new();
    let mut cmd = device.create_command_list().unwrap();
    cmd.begin().unwrap();
    let mut depth = shadow_map();

    assert!(!depth.transition(cmd.as_mut(), ResourceState::ShaderResource).unwrap());
    assert!(device.journal().barriers_of("shadow_map").is_empty());
}

#[test]
fn test_failed_transition_keeps_state() {
    let device = MockGraphicsDevice::new();
    // Never begun: the mock rejects the barrier
    let mut cmd = device.create_command_list().unwrap();
    let mut depth = shadow_map();

    assert!(depth.transition(cmd.as_mut(), ResourceState::DepthWrite).is_err());
    assert_eq!(depth.state(), ResourceState::ShaderResource);
    let _ = cmd.end();
}
