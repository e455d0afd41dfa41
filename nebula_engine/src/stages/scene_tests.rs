//! Unit tests for scene.rs

use glam::Vec3;
use crate::config::ShadowConfig;
use crate::error::Error;
use crate::graphics_device::mock_graphics_device::{MockEvent, MockTexture};
use crate::graphics_device::{ResourceState, TextureFormat};
use crate::scene::{LightData, PointLight};
use crate::stages::test_support::StageHarness;
use crate::stages::{LightingInputs, SceneStage, ShadowStage, StageState, CLEAR_COLOR};

fn shadow_stage(harness: &mut StageHarness) -> ShadowStage {
    ShadowStage::new(
        harness.device.as_ref(),
        &mut harness.shaders,
        &mut harness.dsv,
        &mut harness.srv,
        &ShadowConfig { map_size: 128, ..Default::default() },
    )
    .unwrap()
}

fn scene_stage(harness: &mut StageHarness, shadow: &ShadowStage) -> SceneStage {
    let dfg = MockTexture::new("dfg", 4, 4, TextureFormat::R32G32_SFLOAT);
    let diffuse = MockTexture::new("diffuse_ld", 4, 4, TextureFormat::R32G32B32A32_SFLOAT);
    let specular = MockTexture::new("specular_ld", 4, 4, TextureFormat::R32G32B32A32_SFLOAT);
    let environment = MockTexture::new("environment", 4, 4, TextureFormat::R32G32B32A32_SFLOAT);
    let inputs = LightingInputs {
        shadow_map: shadow.depth_texture().texture().as_ref(),
        dfg: &dfg,
        diffuse_ld: &diffuse,
        specular_ld: &specular,
        environment: &environment,
    };
    SceneStage::new(
        harness.device.as_ref(),
        &mut harness.shaders,
        &mut harness.srv,
        &inputs,
        TextureFormat::B8G8R8A8_SRGB,
        2,
    )
    .unwrap()
}

fn position(events: &[MockEvent], predicate: impl Fn(&MockEvent) -> bool) -> usize {
    events.iter().position(predicate).unwrap()
}

#[test]
fn test_lighting_table_views_in_order() {
    let mut harness = StageHarness::new("scene_table");
    let shadow = shadow_stage(&mut harness);
    let stage = scene_stage(&mut harness, &shadow);

    let heaps = harness.device.heaps();
    let labels: Vec<String> = (0..5)
        .map(|i| {
            let handle = harness.srv.cpu_handle(stage.lighting_table().offset(i));
            heaps.iter().find_map(|h| h.view_at(handle)).unwrap()
        })
        .collect();
    assert_eq!(labels, vec!["srv:shadow_map", "srv:dfg", "srv:diffuse_ld", "srv:specular_ld", "srv:environment"]);
}

#[test]
fn test_record_without_scene_fails() {
    let mut harness = StageHarness::new("scene_unbound");
    let shadow = shadow_stage(&mut harness);
    let mut stage = scene_stage(&mut harness, &shadow);
    assert_eq!(stage.state(), StageState::NotBound);

    let result = harness.frame(|ctx| stage.record(ctx));

    assert!(matches!(result, Err(Error::SceneNotBound(name)) if name == "SceneStage"));
}

#[test]
fn test_record_clears_and_draws_each_mesh() {
    let mut harness = StageHarness::new("scene_record");
    let shadow = shadow_stage(&mut harness);
    let mut stage = scene_stage(&mut harness, &shadow);
    stage.set_scene(harness.scene_with_models(3));
    harness.device.journal().clear();

    let (_, draws) = harness.frame(|ctx| stage.record(ctx)).unwrap();

    assert_eq!(draws, 3);
    let journal = harness.device.journal();
    assert_eq!(journal.draws_with("scene"), 3);
    assert!(journal.events().contains(&MockEvent::BeginRendering {
        list: 0,
        width: 64,
        height: 64,
        color_clear: Some(CLEAR_COLOR),
        depth_clear: Some(1.0),
    }));
    assert_eq!(stage.state(), StageState::Bound);
}

#[test]
fn test_back_buffer_left_in_render_target() {
    let mut harness = StageHarness::new("scene_back_buffer");
    let shadow = shadow_stage(&mut harness);
    let mut stage = scene_stage(&mut harness, &shadow);
    stage.set_scene(harness.scene_with_models(1));
    harness.device.journal().clear();

    harness.frame(|ctx| stage.record(ctx)).unwrap();

    assert_eq!(
        harness.device.journal().barriers_of("back_buffer_0"),
        vec![(ResourceState::Present, ResourceState::RenderTarget)]
    );
    assert_eq!(harness.back_buffer.state(), ResourceState::RenderTarget);
}

#[test]
fn test_constants_come_from_the_ring() {
    let mut harness = StageHarness::new("scene_ring");
    let shadow = shadow_stage(&mut harness);
    let mut stage = scene_stage(&mut harness, &shadow);
    stage.set_scene(harness.scene_with_models(2));

    harness.frame(|ctx| stage.record(ctx)).unwrap();

    // Scene constants, then transform and material per mesh
    assert_eq!(harness.ring.cursor(0).unwrap(), (1 + 2 * 2) * 256);
}

#[test]
fn test_point_lights_written_to_slot_buffer() {
    let mut harness = StageHarness::new("scene_lights");
    let shadow = shadow_stage(&mut harness);
    let mut stage = scene_stage(&mut harness, &shadow);
    let scene = harness.scene_with_models(1);
    {
        let mut guard = scene.write().unwrap();
        let lights = guard.lights_mut();
        lights.point_lights[0] = PointLight { position: Vec3::new(1.0, 2.0, 3.0), ..Default::default() };
        lights.active_point_lights = 1;
    }
    stage.set_scene(scene);

    harness.frame(|ctx| stage.record(ctx)).unwrap();

    let buffer = harness.device.buffers().into_iter().find(|b| b.label == "scene_lights_0").unwrap();
    let uploaded: LightData = bytemuck::pod_read_unaligned(&buffer.read(0, std::mem::size_of::<LightData>()));
    assert_eq!(uploaded.active_point_lights, 1);
    assert_eq!(uploaded.point_lights[0].position, Vec3::new(1.0, 2.0, 3.0));
}

#[test]
fn test_shadow_map_readable_before_scene_binds_it() {
    let mut harness = StageHarness::new("scene_after_shadow");
    let mut shadow = shadow_stage(&mut harness);
    let mut stage = scene_stage(&mut harness, &shadow);
    let scene = harness.scene_with_models(2);
    shadow.set_scene(scene.clone());
    stage.set_scene(scene);
    harness.device.journal().clear();

    let mut state_between = None;
    harness
        .frame(|ctx| {
            shadow.record(ctx)?;
            state_between = Some(shadow.depth_texture().state());
            stage.record(ctx)
        })
        .unwrap();

    assert_eq!(state_between, Some(ResourceState::ShaderResource));

    let events = harness.device.journal().events();
    let restored = position(&events, |e| matches!(e,
        MockEvent::Barrier { texture, after: ResourceState::ShaderResource, .. } if texture == "shadow_map"));
    let scene_begin = position(&events, |e| matches!(e,
        MockEvent::BeginRendering { color_clear: Some(_), .. }));
    let first_scene_draw = position(&events, |e| matches!(e,
        MockEvent::Draw { pipeline, .. } if pipeline == "scene"));
    let last_shadow_draw = events.iter().rposition(|e| matches!(e,
        MockEvent::Draw { pipeline, .. } if pipeline == "shadow")).unwrap();

    assert!(last_shadow_draw < restored);
    assert!(restored < scene_begin);
    assert!(scene_begin < first_scene_draw);
}

#[test]
fn test_scene_reads_light_from_shadow_stage() {
    let mut harness = StageHarness::new("scene_light_vp");
    let mut shadow = shadow_stage(&mut harness);
    let mut stage = scene_stage(&mut harness, &shadow);
    let scene = harness.scene_with_models(1);
    shadow.set_scene(scene.clone());
    stage.set_scene(scene);

    let (shared, _) = harness
        .frame(|ctx| {
            shadow.record(ctx)?;
            stage.record(ctx)
        })
        .unwrap();

    assert!(shared.light_view_proj.abs_diff_eq(shadow.light_view_proj(), 1e-6));
    let ring = harness.device.buffers().into_iter().find(|b| b.label == "frame_constants_0").unwrap();
    let constants: crate::scene::SceneConstants = bytemuck::pod_read_unaligned(&ring.read(0, 96));
    assert!(constants.light_view_proj.abs_diff_eq(shadow.light_view_proj(), 1e-6));
    assert_eq!(constants.light_direction.w, 0.0);
}
