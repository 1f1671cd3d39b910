/// SceneRenderStage - the main color pass over all scene content
///
/// Owns the reference-counted material and image tables, the grow-only
/// light and model uniform arrays and the per-slot color/depth targets.
/// Shadow map stages register themselves here so their maps can be
/// sampled; lights carry the table index of their map into the shader.
///
/// Draw order is sorted by mesh id to minimize vertex/index buffer
/// rebinds; outlined instances are drawn a second time with inverted
/// winding so only the silhouette of the scaled-up outline survives
/// depth testing.

use std::sync::{Arc, RwLock};

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec4};
use rustc_hash::FxHashSet;

use crate::config::EngineConfig;
use crate::error::Result;
use crate::frame::stage::RenderStage;
use crate::gpu::binding::{
    BindingDesc, BindingKind, BindingLayoutDesc, BindingResource, BindingWrite, ImageBinding,
};
use crate::gpu::buffer::{Buffer, BufferDesc, BufferUsage, IndexType};
use crate::gpu::command_list::{
    ColorAttachment, CommandList, DepthAttachment, Rect2D, RenderingInfo, Viewport,
};
use crate::gpu::device::GraphicsDevice;
use crate::gpu::shader::{
    CullMode, FrontFace, Pipeline, PipelineDesc, ShaderDesc, ShaderStage,
};
use crate::gpu::texture::{
    AddressMode, Filter, ImageLayout, Sampler, SamplerDesc, Texture, TextureDesc, TextureFormat,
    TextureUsage,
};
use crate::resource::binding_table::{BindingTableManager, GrowableUniform};
use crate::resource::frame_buffer::{
    ColorFrameBuffer, DepthFrameBuffer, FrameBufferResource,
};
use crate::resource::ref_table::RefTable;
use crate::scene::camera::Camera;
use crate::scene::resources::{
    sort_instances_by_mesh, ImageResource, Light, LightKind, Material, MeshInstance, NodeEvent,
};
use crate::shadow::shadow_stage::{ShadowMapStage, MAX_SHADOW_PASSES};
use crate::engine_warn;

const LOG_SOURCE: &str = "nova3d::SceneRenderStage";

// Binding points of the scene descriptor layout
const BINDING_GLOBAL: u32 = 0;
const BINDING_LIGHTS: u32 = 1;
const BINDING_MATERIALS: u32 = 2;
const BINDING_MODELS: u32 = 3;
const BINDING_TEXTURES: u32 = 4;
const BINDING_SHADOW_MAPS: u32 = 5;

/// Per-frame camera and counts
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct GlobalSceneUniform {
    projection: Mat4,
    view: Mat4,
    /// xyz = camera world position
    camera_position: Vec4,
    light_count: u32,
    _padding: [u32; 3],
}

/// One packed light, shadow lookup data included
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct LightUniform {
    /// Per-cascade or per-face light-space matrices
    light_space: [Mat4; MAX_SHADOW_PASSES],
    /// xyz = position, w = kind (0 directional, 1 omni, 2 spot)
    position: Vec4,
    /// xyz = direction, w = range
    direction: Vec4,
    /// rgb = color, w = intensity
    color: Vec4,
    /// View depths where each of up to 4 cascades ends
    cascade_splits: Vec4,
    cut_off: f32,
    outer_cut_off: f32,
    /// Index into the shadow map table, -1 when the light casts none
    shadow_map_index: i32,
    cascade_count: u32,
}

/// One packed material; texture slots index the image table
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct MaterialUniform {
    albedo_color: Vec4,
    /// x = metallic, y = roughness, z = normal scale
    params: Vec4,
    /// x = albedo image index, y = normal image index, -1 when unset
    image_indices: [i32; 4],
}

/// Push constants selecting the model transform and material of a draw
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct ScenePushConstants {
    model_index: u32,
    material_index: u32,
}

/// Shaders of the scene pass (SPIR-V supplied by the application)
pub struct SceneStageShaders {
    pub vertex: ShaderDesc,
    pub fragment: ShaderDesc,
    /// Outline sub-pass shaders; outlining is skipped when absent
    pub outline: Option<(ShaderDesc, ShaderDesc)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StageState {
    /// No active camera: record only clears the output
    Idle,
    Ready,
}

/// One culled draw, resolved in the update phase
struct Draw {
    instance: Arc<MeshInstance>,
    model_index: u32,
}

struct SceneFrameData {
    color: Option<ColorFrameBuffer>,
    depth: Option<DepthFrameBuffer>,
    global_buffer: Arc<dyn Buffer>,
    materials_buffer: Arc<dyn Buffer>,
    lights: GrowableUniform,
    models: GrowableUniform,
    /// Material ids whose uniform entry is stale in this slot's buffer
    dirty_materials: FxHashSet<u32>,
    draws: Vec<Draw>,
    state: StageState,
}

/// The main scene color pass
pub struct SceneRenderStage {
    device: Arc<dyn GraphicsDevice>,
    clear_color: [f32; 4],
    max_images: usize,
    max_shadow_maps: usize,

    pipeline: Arc<dyn Pipeline>,
    outline_pipeline: Option<Arc<dyn Pipeline>>,
    binding_tables: BindingTableManager,
    frames: Vec<SceneFrameData>,

    camera: Option<Arc<Camera>>,
    /// All instances, sorted by mesh id
    models: Vec<Arc<MeshInstance>>,
    lights: Vec<Arc<Light>>,
    max_lights: usize,
    materials: RefTable<Material>,
    images: RefTable<ImageResource>,
    shadow_stages: Vec<Arc<RwLock<ShadowMapStage>>>,

    /// Fallback for unused image table slots
    blank_image: ImageBinding,
    /// Fallback for unused shadow map slots
    blank_shadow: ImageBinding,
    shadow_sampler: Arc<dyn Sampler>,
}

impl SceneRenderStage {
    pub fn new(
        device: Arc<dyn GraphicsDevice>,
        config: &EngineConfig,
        shaders: SceneStageShaders,
    ) -> Result<Self> {
        let slots = device.frames_in_flight();
        let binding_tables = BindingTableManager::new(
            device.clone(),
            Self::binding_layout(config),
            slots,
        )?;

        let vertex_shader = device.create_shader(&shaders.vertex)?;
        let fragment_shader = device.create_shader(&shaders.fragment)?;
        let pipeline = device.create_pipeline(&PipelineDesc {
            vertex_shader,
            fragment_shader: Some(fragment_shader),
            binding_layout: binding_tables.layout().clone(),
            push_constant_size: std::mem::size_of::<ScenePushConstants>() as u32,
            color_format: Some(TextureFormat::R16G16B16A16_SFLOAT),
            depth_format: Some(TextureFormat::D32_FLOAT),
            cull_mode: CullMode::Back,
            front_face: FrontFace::CounterClockwise,
            depth_test: true,
            depth_write: true,
            depth_bias: false,
        })?;
        let outline_pipeline = match &shaders.outline {
            Some((vertex, fragment)) => Some(device.create_pipeline(&PipelineDesc {
                vertex_shader: device.create_shader(vertex)?,
                fragment_shader: Some(device.create_shader(fragment)?),
                binding_layout: binding_tables.layout().clone(),
                push_constant_size: std::mem::size_of::<ScenePushConstants>() as u32,
                color_format: Some(TextureFormat::R16G16B16A16_SFLOAT),
                depth_format: Some(TextureFormat::D32_FLOAT),
                // Inverted winding: only the scaled silhouette renders
                cull_mode: CullMode::Back,
                front_face: FrontFace::Clockwise,
                depth_test: true,
                depth_write: false,
                depth_bias: false,
            })?),
            None => None,
        };

        let mut frames = Vec::with_capacity(slots);
        for _ in 0..slots {
            frames.push(SceneFrameData {
                color: None,
                depth: None,
                global_buffer: device.create_buffer(&BufferDesc {
                    size: std::mem::size_of::<GlobalSceneUniform>() as u64,
                    usage: BufferUsage::UNIFORM,
                })?,
                materials_buffer: device.create_buffer(&BufferDesc {
                    size: (std::mem::size_of::<MaterialUniform>() * config.max_materials) as u64,
                    usage: BufferUsage::UNIFORM,
                })?,
                lights: GrowableUniform::new(
                    device.clone(),
                    std::mem::size_of::<LightUniform>() as u64,
                ),
                models: GrowableUniform::new(device.clone(), std::mem::size_of::<Mat4>() as u64),
                dirty_materials: FxHashSet::default(),
                draws: Vec::new(),
                state: StageState::Idle,
            });
        }

        // 1x1 white fallback for unused texture slots
        let blank_texture = device.create_texture(&TextureDesc {
            width: 1,
            height: 1,
            format: TextureFormat::R8G8B8A8_UNORM,
            usage: TextureUsage::SAMPLED | TextureUsage::TRANSFER_DST,
            array_layers: 1,
            data: Some(vec![255, 255, 255, 255]),
        })?;
        let blank_image = ImageBinding {
            view: device.create_texture_view(&blank_texture, 0, 1)?,
            sampler: device.create_sampler(&SamplerDesc::default())?,
        };
        let shadow_sampler = device.create_sampler(&SamplerDesc {
            mag_filter: Filter::Linear,
            min_filter: Filter::Linear,
            address_mode: AddressMode::ClampToBorderWhite,
        })?;
        let blank_shadow_texture = device.create_texture(&TextureDesc {
            width: 1,
            height: 1,
            format: TextureFormat::D32_FLOAT,
            usage: TextureUsage::DEPTH_ATTACHMENT | TextureUsage::SAMPLED,
            array_layers: 1,
            data: None,
        })?;
        let blank_shadow = ImageBinding {
            view: device.create_texture_view(&blank_shadow_texture, 0, 1)?,
            sampler: shadow_sampler.clone(),
        };

        Ok(Self {
            device,
            clear_color: config.clear_color,
            max_images: config.max_images,
            max_shadow_maps: config.max_shadow_maps,
            pipeline,
            outline_pipeline,
            binding_tables,
            frames,
            camera: None,
            models: Vec::new(),
            lights: Vec::new(),
            max_lights: config.max_lights,
            materials: RefTable::new("materials", config.max_materials),
            images: RefTable::new("images", config.max_images),
            shadow_stages: Vec::new(),
            blank_image,
            blank_shadow,
            shadow_sampler,
        })
    }

    fn binding_layout(config: &EngineConfig) -> BindingLayoutDesc {
        let all = vec![ShaderStage::Vertex, ShaderStage::Fragment];
        BindingLayoutDesc {
            bindings: vec![
                BindingDesc {
                    binding: BINDING_GLOBAL,
                    kind: BindingKind::UniformBuffer,
                    count: 1,
                    stages: all.clone(),
                },
                BindingDesc {
                    binding: BINDING_LIGHTS,
                    kind: BindingKind::UniformBuffer,
                    count: 1,
                    stages: all.clone(),
                },
                BindingDesc {
                    binding: BINDING_MATERIALS,
                    kind: BindingKind::UniformBuffer,
                    count: 1,
                    stages: all.clone(),
                },
                BindingDesc {
                    binding: BINDING_MODELS,
                    kind: BindingKind::UniformBuffer,
                    count: 1,
                    stages: vec![ShaderStage::Vertex],
                },
                BindingDesc {
                    binding: BINDING_TEXTURES,
                    kind: BindingKind::CombinedImageSampler,
                    count: config.max_images as u32,
                    stages: vec![ShaderStage::Fragment],
                },
                BindingDesc {
                    binding: BINDING_SHADOW_MAPS,
                    kind: BindingKind::CombinedImageSampler,
                    count: config.max_shadow_maps as u32,
                    stages: vec![ShaderStage::Fragment],
                },
            ],
            max_tables: 0,
        }
    }

    // ===== SHADOW REGISTRY =====

    /// Register a shadow stage so its maps are sampled by this pass.
    ///
    /// The stage's position in the registry is the `shadow_map_index`
    /// packed into its light's uniform.
    pub fn register_shadow_stage(&mut self, stage: Arc<RwLock<ShadowMapStage>>) -> Result<()> {
        if self.shadow_stages.len() >= self.max_shadow_maps {
            crate::engine_bail!(
                LOG_SOURCE,
                InvalidResource,
                "shadow map table is full ({} maps)",
                self.max_shadow_maps
            );
        }
        self.shadow_stages.push(stage);
        self.binding_tables.mark_all_dirty();
        Ok(())
    }

    /// Drop the shadow stage of a light from the registry
    pub fn unregister_shadow_stage(&mut self, light_id: u32) {
        self.shadow_stages
            .retain(|stage| stage.read().unwrap().light().id != light_id);
        self.binding_tables.mark_all_dirty();
    }

    pub fn shadow_stage_count(&self) -> usize {
        self.shadow_stages.len()
    }

    pub fn material_count(&self) -> usize {
        self.materials.len()
    }

    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    // ===== CONTENT TRACKING =====

    fn add_material(&mut self, material: &Arc<Material>) -> Result<()> {
        for image in [&material.albedo_image, &material.normal_image]
            .into_iter()
            .flatten()
        {
            self.images.add(image.id, image)?;
        }
        self.materials.add(material.id, material)?;
        material.mark_dirty();
        self.binding_tables.mark_all_dirty();
        Ok(())
    }

    fn remove_material(&mut self, material: &Arc<Material>) {
        let mut table_changed = false;
        for image in [&material.albedo_image, &material.normal_image]
            .into_iter()
            .flatten()
        {
            table_changed |= self.images.remove(image.id);
        }
        table_changed |= self.materials.remove(material.id);
        if table_changed {
            // Indices shifted: every material entry may reference a moved
            // image slot, and every slot buffer is stale
            self.mark_all_materials_dirty();
            self.binding_tables.mark_all_dirty();
        }
    }

    fn mark_all_materials_dirty(&mut self) {
        for (_, material) in self.materials.iter() {
            material.mark_dirty();
        }
    }

    fn instance_materials(instance: &MeshInstance) -> Vec<Arc<Material>> {
        let mut materials: Vec<Arc<Material>> = instance
            .mesh
            .surfaces
            .iter()
            .map(|surface| Arc::clone(&surface.material))
            .collect();
        if let Some(outline) = &instance.outline_material {
            materials.push(Arc::clone(outline));
        }
        materials
    }

    // ===== UPDATE HELPERS =====

    fn write_lights(&mut self, frame_slot: usize) -> Result<()> {
        let count = self.lights.len();
        if self.frames[frame_slot].lights.ensure_capacity(count.max(1))? {
            self.binding_tables.mark_dirty(frame_slot);
        }
        for (index, light) in self.lights.iter().enumerate() {
            let state = light.state();
            let kind = match light.kind {
                LightKind::Directional => 0.0,
                LightKind::Omni => 1.0,
                LightKind::Spot => 2.0,
            };
            let mut uniform = LightUniform {
                light_space: [Mat4::IDENTITY; MAX_SHADOW_PASSES],
                position: state.position.extend(kind),
                direction: state.direction.extend(state.range),
                color: state.color,
                cascade_splits: Vec4::ZERO,
                cut_off: state.cut_off,
                outer_cut_off: state.outer_cut_off,
                shadow_map_index: -1,
                cascade_count: 0,
            };
            if light.cast_shadows {
                if let Some(position) = self
                    .shadow_stages
                    .iter()
                    .position(|stage| stage.read().unwrap().light().id == light.id)
                {
                    let stage = self.shadow_stages[position].read().unwrap();
                    uniform.shadow_map_index = position as i32;
                    uniform.light_space = *stage.light_spaces();
                    let splits = stage.split_depths();
                    uniform.cascade_splits =
                        Vec4::new(splits[0], splits[1], splits[2], splits[3]);
                    uniform.cascade_count = stage.pass_count();
                }
            }
            self.frames[frame_slot]
                .lights
                .write_element(index, bytemuck::bytes_of(&uniform))?;
        }
        Ok(())
    }

    fn write_dirty_materials(&mut self, frame_slot: usize) -> Result<()> {
        // A dirty material is stale in every slot's buffer, not just the
        // one being prepared now
        let mut newly_dirty = Vec::new();
        for (_, material) in self.materials.iter() {
            if material.is_dirty() {
                newly_dirty.push(material.id);
                material.clear_dirty();
            }
        }
        if !newly_dirty.is_empty() {
            for frame in &mut self.frames {
                frame.dirty_materials.extend(newly_dirty.iter().copied());
            }
        }

        let stale: Vec<u32> = self.frames[frame_slot].dirty_materials.drain().collect();
        for id in stale {
            let Some(index) = self.materials.index_of(id) else {
                continue; // removed since it was marked
            };
            let Some(material) = self.materials.get(index) else {
                continue;
            };
            let params = material.params();
            let image_index = |image: &Option<Arc<ImageResource>>| -> i32 {
                image
                    .as_ref()
                    .and_then(|image| self.images.index_of(image.id))
                    .map(|index| index as i32)
                    .unwrap_or(-1)
            };
            let uniform = MaterialUniform {
                albedo_color: params.albedo_color,
                params: Vec4::new(params.metallic, params.roughness, params.normal_scale, 0.0),
                image_indices: [
                    image_index(&material.albedo_image),
                    image_index(&material.normal_image),
                    -1,
                    -1,
                ],
            };
            self.frames[frame_slot].materials_buffer.write(
                (std::mem::size_of::<MaterialUniform>() as u64) * index as u64,
                bytemuck::bytes_of(&uniform),
            )?;
        }
        Ok(())
    }

    fn write_models(&mut self, frame_slot: usize) -> Result<()> {
        let count = self.models.len();
        if self.frames[frame_slot].models.ensure_capacity(count.max(1))? {
            self.binding_tables.mark_dirty(frame_slot);
        }
        for (index, instance) in self.models.iter().enumerate() {
            self.frames[frame_slot]
                .models
                .write_element(index, bytemuck::bytes_of(&instance.transform()))?;
        }
        Ok(())
    }

    fn refresh_bindings(&mut self, frame_slot: usize) -> Result<()> {
        if !self.binding_tables.is_dirty(frame_slot) {
            return Ok(());
        }
        // Image table: real entries first, blank fill behind
        let mut image_bindings = Vec::with_capacity(self.max_images);
        for (_, image) in self.images.iter() {
            image_bindings.push(ImageBinding {
                view: Arc::clone(&image.view),
                sampler: Arc::clone(&image.sampler),
            });
        }
        while image_bindings.len() < self.max_images {
            image_bindings.push(self.blank_image.clone());
        }

        let mut shadow_bindings = Vec::with_capacity(self.max_shadow_maps);
        for stage in &self.shadow_stages {
            let stage = stage.read().unwrap();
            let view = stage
                .shadow_map(frame_slot)
                .and_then(|map| map.sampling_view().cloned());
            shadow_bindings.push(match view {
                Some(view) => ImageBinding { view, sampler: self.shadow_sampler.clone() },
                None => self.blank_shadow.clone(),
            });
        }
        while shadow_bindings.len() < self.max_shadow_maps {
            shadow_bindings.push(self.blank_shadow.clone());
        }

        let frame = &self.frames[frame_slot];
        let lights_buffer = frame.lights.buffer();
        let models_buffer = frame.models.buffer();
        let (Some(lights_buffer), Some(models_buffer)) = (lights_buffer, models_buffer) else {
            return Ok(()); // buffers appear on the first ready update
        };
        let writes = [
            BindingWrite {
                binding: BINDING_GLOBAL,
                resource: BindingResource::Buffer {
                    buffer: &frame.global_buffer,
                    offset: 0,
                    size: std::mem::size_of::<GlobalSceneUniform>() as u64,
                },
            },
            BindingWrite {
                binding: BINDING_LIGHTS,
                resource: BindingResource::Buffer {
                    buffer: lights_buffer,
                    offset: 0,
                    size: lights_buffer.size(),
                },
            },
            BindingWrite {
                binding: BINDING_MATERIALS,
                resource: BindingResource::Buffer {
                    buffer: &frame.materials_buffer,
                    offset: 0,
                    size: frame.materials_buffer.size(),
                },
            },
            BindingWrite {
                binding: BINDING_MODELS,
                resource: BindingResource::Buffer {
                    buffer: models_buffer,
                    offset: 0,
                    size: models_buffer.size(),
                },
            },
            BindingWrite {
                binding: BINDING_TEXTURES,
                resource: BindingResource::Images(&image_bindings),
            },
            BindingWrite {
                binding: BINDING_SHADOW_MAPS,
                resource: BindingResource::Images(&shadow_bindings),
            },
        ];
        self.binding_tables.refresh_if_dirty(frame_slot, &writes)?;
        Ok(())
    }

    fn build_draws(&mut self, frame_slot: usize) {
        let Some(camera) = self.camera.clone() else {
            self.frames[frame_slot].draws.clear();
            return;
        };
        let frustum = camera.state().frustum();
        let draws: Vec<Draw> = self
            .models
            .iter()
            .enumerate()
            .filter(|(_, instance)| {
                instance.is_visible() && frustum.intersects_aabb(&instance.world_aabb())
            })
            .map(|(index, instance)| Draw {
                instance: Arc::clone(instance),
                model_index: index as u32,
            })
            .collect();
        self.frames[frame_slot].draws = draws;
    }

    fn record_draw(
        &self,
        commands: &mut dyn CommandList,
        pipeline: &Arc<dyn Pipeline>,
        draw: &Draw,
        material_of: impl Fn(&crate::scene::resources::Surface) -> Option<u32>,
        last_mesh_id: &mut u32,
    ) -> Result<()> {
        let mesh = &draw.instance.mesh;
        if mesh.id != *last_mesh_id {
            commands.bind_vertex_buffer(&mesh.vertex_buffer, 0)?;
            commands.bind_index_buffer(&mesh.index_buffer, 0, IndexType::U32)?;
            *last_mesh_id = mesh.id;
        }
        for surface in &mesh.surfaces {
            let Some(material_index) = material_of(surface) else {
                continue;
            };
            let push = ScenePushConstants {
                model_index: draw.model_index,
                material_index,
            };
            commands.push_constants(
                pipeline,
                &[ShaderStage::Vertex, ShaderStage::Fragment],
                0,
                bytemuck::bytes_of(&push),
            )?;
            commands.draw_indexed(surface.index_count, surface.first_index, surface.vertex_offset)?;
        }
        Ok(())
    }
}

impl RenderStage for SceneRenderStage {
    fn name(&self) -> &str {
        "scene"
    }

    fn create_images_resources(&mut self) -> Result<()> {
        let (width, height) = self.device.surface_extent();
        for frame in &mut self.frames {
            frame.color = Some(ColorFrameBuffer::new(
                &self.device,
                width,
                height,
                TextureFormat::R16G16B16A16_SFLOAT,
            )?);
            frame.depth = Some(DepthFrameBuffer::new(
                &self.device,
                width,
                height,
                TextureFormat::D32_FLOAT,
            )?);
        }
        // Shadow maps may have been recreated along with the surface
        self.binding_tables.mark_all_dirty();
        Ok(())
    }

    fn cleanup_images_resources(&mut self) {
        for frame in &mut self.frames {
            if let Some(color) = &mut frame.color {
                color.cleanup();
            }
            if let Some(depth) = &mut frame.depth {
                depth.cleanup();
            }
            frame.color = None;
            frame.depth = None;
        }
    }

    fn update(&mut self, frame_slot: usize) -> Result<()> {
        let Some(camera) = self.camera.clone() else {
            self.frames[frame_slot].state = StageState::Idle;
            return Ok(());
        };
        let camera_state = camera.state();

        self.write_lights(frame_slot)?;
        self.write_models(frame_slot)?;
        self.write_dirty_materials(frame_slot)?;

        let global = GlobalSceneUniform {
            projection: camera_state.projection,
            view: camera_state.view,
            camera_position: camera_state.position.extend(1.0),
            light_count: self.lights.len() as u32,
            _padding: [0; 3],
        };
        self.frames[frame_slot]
            .global_buffer
            .write(0, bytemuck::bytes_of(&global))?;

        self.refresh_bindings(frame_slot)?;
        self.build_draws(frame_slot);
        self.frames[frame_slot].state = StageState::Ready;
        Ok(())
    }

    fn record_commands(&mut self, frame_slot: usize, commands: &mut dyn CommandList) -> Result<()> {
        let frame = &self.frames[frame_slot];
        let (Some(color), Some(depth)) = (&frame.color, &frame.depth) else {
            return Ok(());
        };
        let (Some(color_texture), Some(color_view)) = (color.texture(), color.view()) else {
            return Ok(());
        };
        let Some(depth_texture) = depth.texture() else {
            return Ok(());
        };
        let Some(depth_view) = depth.view() else {
            return Ok(());
        };
        let color_texture: Arc<dyn Texture> = Arc::clone(color_texture);
        let depth_texture: Arc<dyn Texture> = Arc::clone(depth_texture);
        let info = color_texture.info();
        let (width, height) = (info.width, info.height);

        commands.transition_image(
            &color_texture,
            ImageLayout::Undefined,
            ImageLayout::ColorAttachment,
            0,
            1,
        )?;
        commands.transition_image(
            &depth_texture,
            ImageLayout::Undefined,
            ImageLayout::DepthAttachment,
            0,
            1,
        )?;
        commands.begin_rendering(&RenderingInfo {
            color: Some(ColorAttachment {
                view: Arc::clone(color_view),
                clear: Some(self.clear_color),
            }),
            depth: Some(DepthAttachment { view: Arc::clone(depth_view), clear: Some(1.0) }),
            width,
            height,
        })?;

        // With no camera the pass still clears, so the presentable blit
        // always has defined content
        if frame.state == StageState::Ready {
            commands.set_viewport(Viewport {
                x: 0.0,
                y: 0.0,
                width: width as f32,
                height: height as f32,
                min_depth: 0.0,
                max_depth: 1.0,
            })?;
            commands.set_scissor(Rect2D { x: 0, y: 0, width, height })?;
            commands.bind_pipeline(&self.pipeline)?;
            commands.bind_binding_table(&self.pipeline, 0, self.binding_tables.table(frame_slot))?;

            let mut last_mesh_id = u32::MAX;
            for draw in &frame.draws {
                self.record_draw(
                    commands,
                    &self.pipeline,
                    draw,
                    |surface| {
                        let index = self.materials.index_of(surface.material.id);
                        if index.is_none() {
                            engine_warn!(
                                LOG_SOURCE,
                                "surface references untracked material {}",
                                surface.material.id
                            );
                        }
                        index
                    },
                    &mut last_mesh_id,
                )?;
            }

            // Outline sub-pass: outlined instances again, inverted winding
            if let Some(outline_pipeline) = &self.outline_pipeline {
                let mut bound = false;
                let mut last_mesh_id = u32::MAX;
                for draw in &frame.draws {
                    if !draw.instance.is_outlined() {
                        continue;
                    }
                    let Some(outline_material) = &draw.instance.outline_material else {
                        continue;
                    };
                    if !bound {
                        commands.bind_pipeline(outline_pipeline)?;
                        commands.bind_binding_table(
                            outline_pipeline,
                            0,
                            self.binding_tables.table(frame_slot),
                        )?;
                        bound = true;
                    }
                    let outline_index = self.materials.index_of(outline_material.id);
                    self.record_draw(
                        commands,
                        outline_pipeline,
                        draw,
                        |_| outline_index,
                        &mut last_mesh_id,
                    )?;
                }
            }
        }

        commands.end_rendering()?;
        commands.transition_image(
            &color_texture,
            ImageLayout::ColorAttachment,
            ImageLayout::TransferSrc,
            0,
            1,
        )?;
        Ok(())
    }

    fn output_image(&self, frame_slot: usize) -> Option<Arc<dyn Texture>> {
        self.frames[frame_slot]
            .color
            .as_ref()
            .and_then(|color| color.texture().cloned())
    }

    fn can_be_threaded(&self) -> bool {
        true
    }

    fn handle_node_event(&mut self, event: &NodeEvent) -> Result<()> {
        match event {
            NodeEvent::MeshAdded(instance) => {
                if self.models.iter().any(|m| m.id == instance.id) {
                    return Ok(());
                }
                for material in Self::instance_materials(instance) {
                    self.add_material(&material)?;
                }
                self.models.push(Arc::clone(instance));
                sort_instances_by_mesh(&mut self.models);
            }
            NodeEvent::MeshRemoved(instance) => {
                let before = self.models.len();
                self.models.retain(|m| m.id != instance.id);
                if self.models.len() != before {
                    for material in Self::instance_materials(instance) {
                        self.remove_material(&material);
                    }
                }
            }
            NodeEvent::LightAdded(light) => {
                if self.lights.iter().any(|l| l.id == light.id) {
                    return Ok(());
                }
                if self.lights.len() >= self.max_lights {
                    engine_warn!(
                        LOG_SOURCE,
                        "light table is full ({} lights)",
                        self.max_lights
                    );
                    return Err(crate::error::Error::CapacityExceeded {
                        table: "lights",
                        capacity: self.max_lights,
                    });
                }
                self.lights.push(Arc::clone(light));
            }
            NodeEvent::LightRemoved(light) => {
                self.lights.retain(|l| l.id != light.id);
                self.unregister_shadow_stage(light.id);
            }
            NodeEvent::CameraActivated(camera) => {
                self.camera = Some(Arc::clone(camera));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "scene_stage_tests.rs"]
mod tests;
