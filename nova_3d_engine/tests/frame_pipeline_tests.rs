//! Integration tests for the full frame pipeline
//!
//! Drives the frame scheduler end to end over the mock GPU backend:
//! shadow and scene stages, event dispatch, presentation, deferred
//! stage teardown and surface recreation.

use std::sync::atomic::Ordering;
use std::sync::{Arc, RwLock};

use nova_3d_engine::glam::{Mat4, Vec3};
use nova_3d_engine::nova3d::frame::{FrameScheduler, RenderStage};
use nova_3d_engine::nova3d::gpu::mock_device::{mock_texture_id, MockDevice};
use nova_3d_engine::nova3d::gpu::{
    BufferDesc, BufferUsage, GraphicsDevice, ShaderDesc, ShaderStage,
};
use nova_3d_engine::nova3d::scene::{
    Camera, CameraState, Light, LightKind, LightState, Material, MaterialParams, Mesh,
    MeshInstance, NodeEvent, SceneRenderStage, SceneStageShaders, Surface, AABB,
};
use nova_3d_engine::nova3d::shadow::{ShadowMapStage, ShadowStageShaders};
use nova_3d_engine::nova3d::EngineConfig;

fn shader(name: &str, stage: ShaderStage) -> ShaderDesc {
    ShaderDesc { name: name.to_string(), stage, bytecode: vec![0; 4] }
}

fn scene_shaders() -> SceneStageShaders {
    SceneStageShaders {
        vertex: shader("scene.vert", ShaderStage::Vertex),
        fragment: shader("scene.frag", ShaderStage::Fragment),
        outline: None,
    }
}

fn shadow_shaders() -> ShadowStageShaders {
    ShadowStageShaders {
        vertex: shader("shadowmap.vert", ShaderStage::Vertex),
        fragment: None,
    }
}

fn test_camera() -> Arc<Camera> {
    let mut state = CameraState::default();
    state.projection =
        Mat4::perspective_rh(std::f32::consts::FRAC_PI_3, 1.0, state.near, state.far);
    state.view = Mat4::look_at_rh(Vec3::new(0.0, 2.0, 8.0), Vec3::ZERO, Vec3::Y);
    state.position = Vec3::new(0.0, 2.0, 8.0);
    Arc::new(Camera::new(state))
}

fn test_instance(device: &Arc<MockDevice>) -> Arc<MeshInstance> {
    let material = Arc::new(Material::new(MaterialParams::default(), None, None));
    let vertex_buffer = device
        .create_buffer(&BufferDesc { size: 1024, usage: BufferUsage::VERTEX })
        .unwrap();
    let index_buffer = device
        .create_buffer(&BufferDesc { size: 256, usage: BufferUsage::INDEX })
        .unwrap();
    let mesh = Arc::new(
        Mesh::new(
            vertex_buffer,
            index_buffer,
            vec![Surface { first_index: 0, index_count: 36, vertex_offset: 0, material }],
            AABB { min: Vec3::splat(-1.0), max: Vec3::splat(1.0) },
        )
        .unwrap(),
    );
    Arc::new(MeshInstance::new(mesh, Mat4::IDENTITY))
}

fn directional_light() -> Arc<Light> {
    let mut state = LightState::default();
    state.direction = Vec3::new(-0.4, -1.0, -0.2).normalize();
    Arc::new(Light::new(LightKind::Directional, state, true))
}

struct Pipeline {
    device: Arc<MockDevice>,
    scheduler: FrameScheduler,
    shadow_stage: Arc<RwLock<ShadowMapStage>>,
    scene_stage: Arc<RwLock<SceneRenderStage>>,
}

/// Shadow stage first, scene stage last: the scene output is the blit
/// source for presentation.
fn build_pipeline() -> Pipeline {
    let device = MockDevice::new(2, 800, 600);
    let config = EngineConfig::default();
    let mut scheduler = FrameScheduler::new(device.clone(), &config).unwrap();

    let light = directional_light();
    let shadow_stage = Arc::new(RwLock::new(
        ShadowMapStage::new(device.clone(), &config, light, shadow_shaders()).unwrap(),
    ));
    let scene_stage = Arc::new(RwLock::new(
        SceneRenderStage::new(device.clone(), &config, scene_shaders()).unwrap(),
    ));
    scene_stage
        .write()
        .unwrap()
        .register_shadow_stage(shadow_stage.clone())
        .unwrap();

    scheduler.register_stage(shadow_stage.clone()).unwrap();
    scheduler.register_stage(scene_stage.clone()).unwrap();

    scheduler.queue_event(NodeEvent::CameraActivated(test_camera()));
    scheduler.queue_event(NodeEvent::MeshAdded(test_instance(&device)));

    Pipeline { device, scheduler, shadow_stage, scene_stage }
}

// ============================================================================
// FRAME LOOP TESTS
// ============================================================================

#[test]
fn test_frames_submit_all_stages_and_present() {
    let mut pipeline = build_pipeline();
    for _ in 0..3 {
        pipeline.scheduler.draw_frame().unwrap();
    }

    let submitted = pipeline.device.submitted_frames();
    assert_eq!(submitted.len(), 3);
    // Shadow list, scene list, present list, in execution order
    for frame in &submitted {
        assert_eq!(frame.lists.len(), 3);
    }
    // Frame slots alternate with 2 frames in flight
    let slots: Vec<usize> = submitted.iter().map(|f| f.frame_slot).collect();
    assert_eq!(slots, vec![0, 1, 0]);
    // The mock swapchain hands out its 3 images in order
    assert_eq!(pipeline.device.presented_images(), vec![0, 1, 2]);
}

#[test]
fn test_present_list_blits_scene_output() {
    let mut pipeline = build_pipeline();
    pipeline.scheduler.draw_frame().unwrap();

    let submitted = pipeline.device.submitted_frames();
    let present_list = submitted[0].lists.last().unwrap();

    let scene_output = pipeline.scene_stage.read().unwrap().output_image(0).unwrap();
    let swapchain_image = pipeline.device.swapchain_image(0).unwrap();
    let expected = format!(
        "blit tex#{} -> tex#{}",
        mock_texture_id(&scene_output),
        mock_texture_id(&swapchain_image)
    );
    assert!(present_list.contains(&expected), "present list: {:?}", present_list);
    // The presentable image ends in PresentSrc
    assert!(present_list.iter().any(|c| c.contains("->PresentSrc")));
}

#[test]
fn test_shadow_pass_renders_before_scene_samples_it() {
    let mut pipeline = build_pipeline();
    pipeline.scheduler.draw_frame().unwrap();

    let submitted = pipeline.device.submitted_frames();
    let shadow_list = &submitted[0].lists[0];
    let scene_list = &submitted[0].lists[1];

    // The mesh casts a shadow in every cascade
    let cascades = EngineConfig::default().cascade_count as usize;
    let shadow_draws = shadow_list.iter().filter(|c| c.starts_with("draw_indexed")).count();
    assert_eq!(shadow_draws, cascades);
    assert!(shadow_list.iter().any(|c| c.contains("DepthAttachment->ShaderReadOnly")));

    // The scene drew the mesh once
    let scene_draws = scene_list.iter().filter(|c| c.starts_with("draw_indexed")).count();
    assert_eq!(scene_draws, 1);
}

#[test]
fn test_events_reach_stages_before_first_record() {
    let pipeline = {
        let mut p = build_pipeline();
        p.scheduler.draw_frame().unwrap();
        p
    };
    assert!(pipeline.shadow_stage.read().unwrap().is_ready(0));
    assert_eq!(pipeline.scene_stage.read().unwrap().material_count(), 1);
}

// ============================================================================
// TEARDOWN AND RECREATION TESTS
// ============================================================================

#[test]
fn test_deferred_shadow_teardown_drains_over_frames_in_flight() {
    let mut pipeline = build_pipeline();
    pipeline.scheduler.draw_frame().unwrap();

    let as_stage: Arc<RwLock<dyn RenderStage>> = pipeline.shadow_stage.clone();
    pipeline.scheduler.unregister_stage(&as_stage, false).unwrap();
    assert_eq!(pipeline.scheduler.stage_count(), 1);

    // Two more frames retire both slots; afterwards only scene + present
    pipeline.scheduler.draw_frame().unwrap();
    pipeline.scheduler.draw_frame().unwrap();
    let submitted = pipeline.device.submitted_frames();
    assert_eq!(submitted[1].lists.len(), 2);
    assert_eq!(submitted[2].lists.len(), 2);
    // Slots drained: the shadow maps are gone
    assert!(pipeline.shadow_stage.read().unwrap().shadow_map(0).is_none());
}

#[test]
fn test_resize_recreates_stage_images() {
    let mut pipeline = build_pipeline();
    pipeline.scheduler.draw_frame().unwrap();
    let old_output = pipeline.scene_stage.read().unwrap().output_image(0).unwrap();

    pipeline.scheduler.resize((1024, 768)).unwrap();
    let new_output = pipeline.scene_stage.read().unwrap().output_image(0).unwrap();
    assert_ne!(mock_texture_id(&old_output), mock_texture_id(&new_output));
    assert_eq!(new_output.info().width, 1024);

    pipeline.scheduler.draw_frame().unwrap();
    assert_eq!(pipeline.device.submitted_frames().len(), 2);
}

#[test]
fn test_stale_acquire_skips_frame_and_recreates() {
    let mut pipeline = build_pipeline();
    pipeline.device.force_stale_acquires(1);

    pipeline.scheduler.draw_frame().unwrap();
    assert_eq!(pipeline.device.submitted_frames().len(), 0);
    assert_eq!(pipeline.device.recreate_count.load(Ordering::SeqCst), 1);

    pipeline.scheduler.draw_frame().unwrap();
    assert_eq!(pipeline.device.submitted_frames().len(), 1);
}

#[test]
fn test_shutdown_cleans_every_stage() {
    let mut pipeline = build_pipeline();
    pipeline.scheduler.draw_frame().unwrap();
    pipeline.scheduler.shutdown().unwrap();

    assert_eq!(pipeline.scheduler.stage_count(), 0);
    assert!(pipeline.shadow_stage.read().unwrap().shadow_map(0).is_none());
    assert!(pipeline.scene_stage.read().unwrap().output_image(0).is_none());
}
