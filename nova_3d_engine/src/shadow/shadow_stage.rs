/// ShadowMapStage - renders the depth map(s) of one shadow-casting light
///
/// One stage per light. Directional lights render one pass per cascade,
/// omni lights one pass per cube face, spot lights a single pass. The
/// stage is Idle until it has an active camera, shadow-casting models
/// and a visible light; while Idle it records nothing at all, so the
/// scene stage must not sample a map that was never rendered.

use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec4};

use crate::config::EngineConfig;
use crate::error::Result;
use crate::frame::stage::RenderStage;
use crate::gpu::binding::{
    BindingDesc, BindingKind, BindingLayoutDesc, BindingResource, BindingWrite,
};
use crate::gpu::buffer::{Buffer, BufferDesc, BufferUsage, IndexType};
use crate::gpu::command_list::{CommandList, DepthAttachment, Rect2D, RenderingInfo, Viewport};
use crate::gpu::device::GraphicsDevice;
use crate::gpu::shader::{
    CullMode, FrontFace, Pipeline, PipelineDesc, ShaderDesc, ShaderStage,
};
use crate::gpu::texture::{ImageLayout, Texture, TextureFormat};
use crate::resource::binding_table::BindingTableManager;
use crate::resource::frame_buffer::{FrameBufferResource, ShadowMapFrameBuffer, ShadowMapKind};
use crate::scene::camera::Camera;
use crate::scene::frustum::Frustum;
use crate::scene::resources::{sort_instances_by_mesh, Light, LightKind, MeshInstance, NodeEvent};
use crate::shadow::cascade::{omni_face_matrices, spot_matrix, CascadeComputer};

const LOG_SOURCE: &str = "nova3d::ShadowMapStage";

/// Maximum passes of a single light (6 cube faces)
pub const MAX_SHADOW_PASSES: usize = 6;

/// Per-light uniform read by the shadow vertex and fragment shaders
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct ShadowGlobalUniform {
    light_space: [Mat4; MAX_SHADOW_PASSES],
    /// xyz = light position (omni depth linearization), w unused
    light_position: Vec4,
    far_plane: f32,
    _padding: [f32; 3],
}

/// Push constants: per-surface model matrix and the pass selector
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct ShadowPushConstants {
    model: Mat4,
    light_space_index: u32,
    _padding: [u32; 3],
}

/// Shaders the stage renders with (SPIR-V supplied by the application)
pub struct ShadowStageShaders {
    pub vertex: ShaderDesc,
    /// Required for omni lights, which write linearized distance
    pub fragment: Option<ShaderDesc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StageState {
    /// Nothing to render; recording is skipped entirely
    Idle,
    /// Matrices and uniforms are valid for the current frame
    Ready,
}

struct FrameData {
    shadow_map: Option<ShadowMapFrameBuffer>,
    global_buffer: Arc<dyn Buffer>,
    state: StageState,
}

/// Render stage drawing the shadow map(s) of one light
pub struct ShadowMapStage {
    name: String,
    device: Arc<dyn GraphicsDevice>,
    light: Arc<Light>,
    kind: ShadowMapKind,
    resolution: u32,
    depth_bias_constant: f32,
    depth_bias_slope: f32,
    cascade_computer: CascadeComputer,

    pipeline: Arc<dyn Pipeline>,
    binding_tables: BindingTableManager,
    frames: Vec<FrameData>,

    camera: Option<Arc<Camera>>,
    /// Shadow casters, sorted by mesh id
    models: Vec<Arc<MeshInstance>>,
    light_spaces: [Mat4; MAX_SHADOW_PASSES],
    split_depths: [f32; MAX_SHADOW_PASSES],
}

impl ShadowMapStage {
    pub fn new(
        device: Arc<dyn GraphicsDevice>,
        config: &EngineConfig,
        light: Arc<Light>,
        shaders: ShadowStageShaders,
    ) -> Result<Self> {
        let kind = match light.kind {
            LightKind::Directional => ShadowMapKind::Cascaded { cascades: config.cascade_count },
            LightKind::Omni => ShadowMapKind::Omni,
            LightKind::Spot => ShadowMapKind::Spot,
        };
        if light.kind == LightKind::Omni && shaders.fragment.is_none() {
            crate::engine_bail!(
                LOG_SOURCE,
                InvalidResource,
                "omni shadow maps need a fragment shader"
            );
        }

        let slots = device.frames_in_flight();
        let mut binding_tables = BindingTableManager::new(
            device.clone(),
            BindingLayoutDesc {
                bindings: vec![BindingDesc {
                    binding: 0,
                    kind: BindingKind::UniformBuffer,
                    count: 1,
                    stages: vec![ShaderStage::Vertex, ShaderStage::Fragment],
                }],
                max_tables: 0,
            },
            slots,
        )?;

        let vertex_shader = device.create_shader(&shaders.vertex)?;
        let fragment_shader = match &shaders.fragment {
            Some(desc) => Some(device.create_shader(desc)?),
            None => None,
        };
        let pipeline = device.create_pipeline(&PipelineDesc {
            vertex_shader,
            fragment_shader,
            binding_layout: binding_tables.layout().clone(),
            push_constant_size: std::mem::size_of::<ShadowPushConstants>() as u32,
            color_format: None,
            depth_format: Some(TextureFormat::D32_FLOAT),
            cull_mode: CullMode::None,
            front_face: FrontFace::CounterClockwise,
            depth_test: true,
            depth_write: true,
            depth_bias: true,
        })?;

        let mut frames = Vec::with_capacity(slots);
        for _ in 0..slots {
            frames.push(FrameData {
                shadow_map: None,
                global_buffer: device.create_buffer(&BufferDesc {
                    size: std::mem::size_of::<ShadowGlobalUniform>() as u64,
                    usage: BufferUsage::UNIFORM,
                })?,
                state: StageState::Idle,
            });
        }
        binding_tables.mark_all_dirty();

        Ok(Self {
            name: format!("shadow-light-{}", light.id),
            device,
            light,
            kind,
            resolution: config.shadow_map_resolution,
            depth_bias_constant: config.depth_bias_constant,
            depth_bias_slope: config.depth_bias_slope,
            cascade_computer: CascadeComputer::new(
                config.cascade_count,
                config.cascade_split_lambda,
                config.shadow_map_resolution,
            ),
            pipeline,
            binding_tables,
            frames,
            camera: None,
            models: Vec::new(),
            light_spaces: [Mat4::IDENTITY; MAX_SHADOW_PASSES],
            split_depths: [0.0; MAX_SHADOW_PASSES],
        })
    }

    pub fn light(&self) -> &Arc<Light> {
        &self.light
    }

    /// Shadow map of one frame slot, for the scene stage to sample
    pub fn shadow_map(&self, frame_slot: usize) -> Option<&ShadowMapFrameBuffer> {
        self.frames[frame_slot].shadow_map.as_ref()
    }

    /// Whether the slot has valid rendered content this frame
    pub fn is_ready(&self, frame_slot: usize) -> bool {
        self.frames[frame_slot].state == StageState::Ready
    }

    pub fn light_spaces(&self) -> &[Mat4; MAX_SHADOW_PASSES] {
        &self.light_spaces
    }

    pub fn split_depths(&self) -> &[f32; MAX_SHADOW_PASSES] {
        &self.split_depths
    }

    pub fn pass_count(&self) -> u32 {
        self.kind.layer_count()
    }

    fn compute_light_spaces(&mut self, camera: &crate::scene::camera::CameraState) {
        let state = self.light.state();
        match self.light.kind {
            LightKind::Directional => {
                let cascades = self
                    .cascade_computer
                    .compute(camera, state.direction.normalize());
                for (i, cascade) in cascades.iter().enumerate() {
                    self.light_spaces[i] = cascade.light_space;
                    self.split_depths[i] = cascade.split_depth;
                }
            }
            LightKind::Omni => {
                self.light_spaces[..6].copy_from_slice(&omni_face_matrices(
                    state.position,
                    state.near,
                    state.range,
                ));
            }
            LightKind::Spot => {
                self.light_spaces[0] = spot_matrix(
                    state.position,
                    state.direction,
                    state.outer_cut_off.acos() * 2.0,
                    state.near,
                    state.range,
                );
            }
        }
    }

    /// Visible shadow casters of one pass. Cascades skip culling (the
    /// fitted slice already follows the camera); omni faces and spot
    /// cones cull against the pass frustum.
    fn pass_models(&self, pass: usize) -> Vec<&Arc<MeshInstance>> {
        let frustum = match self.kind {
            ShadowMapKind::Cascaded { .. } => None,
            _ => Some(Frustum::from_view_projection(&self.light_spaces[pass])),
        };
        self.models
            .iter()
            .filter(|instance| {
                instance.is_visible()
                    && instance.casts_shadow()
                    && frustum
                        .as_ref()
                        .map(|f| f.intersects_aabb(&instance.world_aabb()))
                        .unwrap_or(true)
            })
            .collect()
    }
}

impl RenderStage for ShadowMapStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn create_images_resources(&mut self) -> Result<()> {
        for frame in &mut self.frames {
            frame.shadow_map = Some(ShadowMapFrameBuffer::new(
                &self.device,
                self.kind,
                self.resolution,
                TextureFormat::D32_FLOAT,
            )?);
        }
        Ok(())
    }

    fn cleanup_images_resources(&mut self) {
        for frame in &mut self.frames {
            if let Some(shadow_map) = &mut frame.shadow_map {
                shadow_map.cleanup();
            }
            frame.shadow_map = None;
            frame.state = StageState::Idle;
        }
    }

    fn update(&mut self, frame_slot: usize) -> Result<()> {
        let camera_state = self.camera.as_ref().map(|camera| camera.state());
        let Some(camera_state) = camera_state else {
            self.frames[frame_slot].state = StageState::Idle;
            return Ok(());
        };
        if !self.light.state().visible || self.models.is_empty() {
            self.frames[frame_slot].state = StageState::Idle;
            return Ok(());
        }
        self.compute_light_spaces(&camera_state);

        let state = self.light.state();
        let uniform = ShadowGlobalUniform {
            light_space: self.light_spaces,
            light_position: state.position.extend(0.0),
            far_plane: state.range,
            _padding: [0.0; 3],
        };
        let frame = &self.frames[frame_slot];
        frame.global_buffer.write(0, bytemuck::bytes_of(&uniform))?;

        let writes = [BindingWrite {
            binding: 0,
            resource: BindingResource::Buffer {
                buffer: &frame.global_buffer,
                offset: 0,
                size: std::mem::size_of::<ShadowGlobalUniform>() as u64,
            },
        }];
        self.binding_tables.refresh_if_dirty(frame_slot, &writes)?;
        self.frames[frame_slot].state = StageState::Ready;
        Ok(())
    }

    fn record_commands(&mut self, frame_slot: usize, commands: &mut dyn CommandList) -> Result<()> {
        if self.frames[frame_slot].state == StageState::Idle {
            return Ok(());
        }
        let Some(shadow_map) = self.frames[frame_slot].shadow_map.as_ref() else {
            return Ok(());
        };
        let Some(texture) = shadow_map.texture() else {
            return Ok(());
        };
        let texture: Arc<dyn Texture> = Arc::clone(texture);
        let resolution = shadow_map.resolution();

        for pass in 0..self.pass_count() {
            commands.transition_image(
                &texture,
                ImageLayout::Undefined,
                ImageLayout::DepthAttachment,
                pass,
                1,
            )?;
            let Some(view) = shadow_map.layer_view(pass) else {
                continue;
            };
            commands.begin_rendering(&RenderingInfo {
                color: None,
                depth: Some(DepthAttachment { view: Arc::clone(view), clear: Some(1.0) }),
                width: resolution,
                height: resolution,
            })?;
            commands.set_viewport(Viewport {
                x: 0.0,
                y: 0.0,
                width: resolution as f32,
                height: resolution as f32,
                min_depth: 0.0,
                max_depth: 1.0,
            })?;
            commands.set_scissor(Rect2D {
                x: 0,
                y: 0,
                width: resolution,
                height: resolution,
            })?;
            commands.bind_pipeline(&self.pipeline)?;
            commands.bind_binding_table(
                &self.pipeline,
                0,
                self.binding_tables.table(frame_slot),
            )?;
            commands.set_depth_bias(self.depth_bias_constant, self.depth_bias_slope)?;
            commands.set_cull_mode(CullMode::None)?;

            // Models are sorted by mesh id; rebind buffers only on change
            let mut last_mesh_id = u32::MAX;
            for instance in self.pass_models(pass as usize) {
                let mesh = &instance.mesh;
                if mesh.id != last_mesh_id {
                    commands.bind_vertex_buffer(&mesh.vertex_buffer, 0)?;
                    commands.bind_index_buffer(&mesh.index_buffer, 0, IndexType::U32)?;
                    last_mesh_id = mesh.id;
                }
                let push = ShadowPushConstants {
                    model: instance.transform(),
                    light_space_index: pass,
                    _padding: [0; 3],
                };
                commands.push_constants(
                    &self.pipeline,
                    &[ShaderStage::Vertex, ShaderStage::Fragment],
                    0,
                    bytemuck::bytes_of(&push),
                )?;
                for surface in &mesh.surfaces {
                    commands.draw_indexed(
                        surface.index_count,
                        surface.first_index,
                        surface.vertex_offset,
                    )?;
                }
            }

            commands.end_rendering()?;
            commands.transition_image(
                &texture,
                ImageLayout::DepthAttachment,
                ImageLayout::ShaderReadOnly,
                pass,
                1,
            )?;
        }
        Ok(())
    }

    fn output_image(&self, _frame_slot: usize) -> Option<Arc<dyn Texture>> {
        // Shadow maps are sampled by the scene stage, never presented
        None
    }

    fn can_be_threaded(&self) -> bool {
        true
    }

    fn handle_node_event(&mut self, event: &NodeEvent) -> Result<()> {
        match event {
            NodeEvent::MeshAdded(instance) => {
                if instance.casts_shadow()
                    && !self.models.iter().any(|m| m.id == instance.id)
                {
                    self.models.push(Arc::clone(instance));
                    sort_instances_by_mesh(&mut self.models);
                }
            }
            NodeEvent::MeshRemoved(instance) => {
                self.models.retain(|m| m.id != instance.id);
            }
            NodeEvent::CameraActivated(camera) => {
                self.camera = Some(Arc::clone(camera));
            }
            NodeEvent::LightAdded(_) | NodeEvent::LightRemoved(_) => {}
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "shadow_stage_tests.rs"]
mod tests;
