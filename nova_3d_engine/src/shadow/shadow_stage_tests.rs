use super::*;
use std::sync::Arc;

use glam::{Mat4, Vec3};

use crate::config::EngineConfig;
use crate::frame::stage::RenderStage;
use crate::gpu::buffer::{Buffer, BufferDesc, BufferUsage};
use crate::gpu::command_list::CommandList;
use crate::gpu::device::GraphicsDevice;
use crate::gpu::mock_device::MockDevice;
use crate::gpu::shader::{ShaderDesc, ShaderStage};
use crate::scene::camera::{Camera, CameraState};
use crate::scene::resources::{
    AABB, Light, LightKind, LightState, Material, MaterialParams, Mesh, MeshInstance, NodeEvent,
    Surface,
};

fn stage_shaders() -> ShadowStageShaders {
    ShadowStageShaders {
        vertex: ShaderDesc {
            name: "shadowmap.vert".to_string(),
            stage: ShaderStage::Vertex,
            bytecode: vec![0; 4],
        },
        fragment: Some(ShaderDesc {
            name: "shadowmap.frag".to_string(),
            stage: ShaderStage::Fragment,
            bytecode: vec![0; 4],
        }),
    }
}

fn directional_light() -> Arc<Light> {
    let mut state = LightState::default();
    state.direction = Vec3::new(-0.4, -1.0, -0.2).normalize();
    Arc::new(Light::new(LightKind::Directional, state, true))
}

fn omni_light() -> Arc<Light> {
    let mut state = LightState::default();
    state.position = Vec3::new(0.0, 4.0, 0.0);
    state.range = 25.0;
    Arc::new(Light::new(LightKind::Omni, state, true))
}

fn test_camera() -> Arc<Camera> {
    let mut state = CameraState::default();
    state.near = 0.1;
    state.far = 50.0;
    state.projection =
        Mat4::perspective_rh(std::f32::consts::FRAC_PI_3, 1.0, state.near, state.far);
    state.view = Mat4::look_at_rh(Vec3::new(0.0, 2.0, 8.0), Vec3::ZERO, Vec3::Y);
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

fn ready_stage(device: &Arc<MockDevice>, light: Arc<Light>) -> ShadowMapStage {
    let config = EngineConfig::default();
    let mut stage =
        ShadowMapStage::new(device.clone(), &config, light, stage_shaders()).unwrap();
    stage.create_images_resources().unwrap();
    stage
        .handle_node_event(&NodeEvent::CameraActivated(test_camera()))
        .unwrap();
    stage
        .handle_node_event(&NodeEvent::MeshAdded(test_instance(device)))
        .unwrap();
    stage
}

fn recorded_commands(stage: &mut ShadowMapStage, device: &Arc<MockDevice>) -> Vec<String> {
    let mut list = device.create_command_list().unwrap();
    list.begin().unwrap();
    stage.record_commands(0, list.as_mut()).unwrap();
    list.end().unwrap();
    list.as_any()
        .downcast_ref::<crate::gpu::mock_device::MockCommandList>()
        .unwrap()
        .commands
        .clone()
}

// ============================================================================
// State machine tests
// ============================================================================

#[test]
fn test_stage_idle_without_camera() {
    let device = MockDevice::new(2, 800, 600);
    let config = EngineConfig::default();
    let mut stage =
        ShadowMapStage::new(device.clone(), &config, directional_light(), stage_shaders())
            .unwrap();
    stage.create_images_resources().unwrap();
    stage
        .handle_node_event(&NodeEvent::MeshAdded(test_instance(&device)))
        .unwrap();

    stage.update(0).unwrap();
    assert!(!stage.is_ready(0));
}

#[test]
fn test_stage_idle_without_models() {
    let device = MockDevice::new(2, 800, 600);
    let config = EngineConfig::default();
    let mut stage =
        ShadowMapStage::new(device.clone(), &config, directional_light(), stage_shaders())
            .unwrap();
    stage.create_images_resources().unwrap();
    stage
        .handle_node_event(&NodeEvent::CameraActivated(test_camera()))
        .unwrap();

    stage.update(0).unwrap();
    assert!(!stage.is_ready(0));
}

#[test]
fn test_idle_stage_records_nothing() {
    let device = MockDevice::new(2, 800, 600);
    let config = EngineConfig::default();
    let mut stage =
        ShadowMapStage::new(device.clone(), &config, directional_light(), stage_shaders())
            .unwrap();
    stage.create_images_resources().unwrap();
    stage.update(0).unwrap();

    let commands = recorded_commands(&mut stage, &device);
    assert_eq!(commands, vec!["begin", "end"]);
}

#[test]
fn test_invisible_light_goes_idle() {
    let device = MockDevice::new(2, 800, 600);
    let light = directional_light();
    let mut stage = ready_stage(&device, light.clone());
    stage.update(0).unwrap();
    assert!(stage.is_ready(0));

    let mut state = light.state();
    state.visible = false;
    light.set_state(state);
    stage.update(0).unwrap();
    assert!(!stage.is_ready(0));
}

// ============================================================================
// Recording tests
// ============================================================================

#[test]
fn test_cascaded_light_renders_one_pass_per_cascade() {
    let device = MockDevice::new(2, 800, 600);
    let mut stage = ready_stage(&device, directional_light());
    stage.update(0).unwrap();

    let commands = recorded_commands(&mut stage, &device);
    let passes = commands.iter().filter(|c| c.starts_with("begin_rendering")).count();
    assert_eq!(passes, EngineConfig::default().cascade_count as usize);

    // Every pass transitions its layer in, renders depth-only, then makes
    // it samplable
    let to_attachment = commands
        .iter()
        .filter(|c| c.contains("Undefined->DepthAttachment"))
        .count();
    let to_sampled = commands
        .iter()
        .filter(|c| c.contains("DepthAttachment->ShaderReadOnly"))
        .count();
    assert_eq!(to_attachment, passes);
    assert_eq!(to_sampled, passes);
    assert!(commands.iter().any(|c| c.starts_with("set_depth_bias")));
    assert!(!commands.iter().any(|c| c.contains("color=")));
}

#[test]
fn test_max_cascade_count_updates_every_pass() {
    // Any cascade count the config accepts must fit the per-pass arrays
    let device = MockDevice::new(2, 800, 600);
    let config = EngineConfig { cascade_count: 4, ..Default::default() };
    config.validate().unwrap();

    let mut stage =
        ShadowMapStage::new(device.clone(), &config, directional_light(), stage_shaders())
            .unwrap();
    stage.create_images_resources().unwrap();
    stage
        .handle_node_event(&NodeEvent::CameraActivated(test_camera()))
        .unwrap();
    stage
        .handle_node_event(&NodeEvent::MeshAdded(test_instance(&device)))
        .unwrap();
    stage.update(0).unwrap();

    assert_eq!(stage.pass_count(), 4);
    for pass in 0..stage.pass_count() as usize {
        assert_ne!(stage.light_spaces()[pass], Mat4::IDENTITY);
    }
    // The last split lands on the far clip
    let far = test_camera().state().far;
    assert!((stage.split_depths()[3] - far).abs() < far * 1e-3);
}

#[test]
fn test_omni_light_renders_six_faces() {
    let device = MockDevice::new(2, 800, 600);
    let mut stage = ready_stage(&device, omni_light());
    stage.update(0).unwrap();

    let commands = recorded_commands(&mut stage, &device);
    let passes = commands.iter().filter(|c| c.starts_with("begin_rendering")).count();
    assert_eq!(passes, 6);
}

#[test]
fn test_consecutive_same_mesh_draws_bind_buffers_once() {
    let device = MockDevice::new(2, 800, 600);
    let mut stage = ready_stage(&device, directional_light());
    // Second instance of the same mesh
    let first = stage.models[0].clone();
    let second = Arc::new(MeshInstance::new(first.mesh.clone(), Mat4::IDENTITY));
    stage
        .handle_node_event(&NodeEvent::MeshAdded(second))
        .unwrap();
    stage.update(0).unwrap();

    let commands = recorded_commands(&mut stage, &device);
    let binds = commands.iter().filter(|c| c.starts_with("bind_vertex_buffer")).count();
    let draws = commands.iter().filter(|c| c.starts_with("draw_indexed")).count();
    let passes = EngineConfig::default().cascade_count as usize;
    // One bind per pass, two draws per pass
    assert_eq!(binds, passes);
    assert_eq!(draws, 2 * passes);
}

#[test]
fn test_omni_requires_fragment_shader() {
    let device = MockDevice::new(2, 800, 600);
    let config = EngineConfig::default();
    let mut shaders = stage_shaders();
    shaders.fragment = None;
    assert!(ShadowMapStage::new(device, &config, omni_light(), shaders).is_err());
}

// ============================================================================
// Uniform tests
// ============================================================================

#[test]
fn test_update_writes_light_space_uniform() {
    let device = MockDevice::new(2, 800, 600);
    let mut stage = ready_stage(&device, directional_light());
    stage.update(0).unwrap();

    let buffer = stage.frames[0]
        .global_buffer
        .as_any()
        .downcast_ref::<crate::gpu::mock_device::MockBuffer>()
        .unwrap()
        .contents();
    // The first cascade matrix must not be all zeroes
    assert!(buffer[0..64].iter().any(|&b| b != 0));
}

#[test]
fn test_shadow_maps_never_present() {
    let device = MockDevice::new(2, 800, 600);
    let mut stage = ready_stage(&device, directional_light());
    stage.update(0).unwrap();
    assert!(stage.output_image(0).is_none());
}

#[test]
fn test_removed_model_stops_casting() {
    let device = MockDevice::new(2, 800, 600);
    let mut stage = ready_stage(&device, directional_light());
    let instance = stage.models[0].clone();
    stage
        .handle_node_event(&NodeEvent::MeshRemoved(instance))
        .unwrap();

    stage.update(0).unwrap();
    assert!(!stage.is_ready(0));
}
