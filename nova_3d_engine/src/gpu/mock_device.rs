/// Mock graphics device for unit tests (no GPU required)
///
/// Records every command as a readable string, tracks created resources,
/// and exposes manually-driven frame fences so scheduler tests can verify
/// pacing and deferred-teardown behaviour without a real GPU.

use std::any::Any;
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};

use crate::error::{Error, Result};
use crate::gpu::binding::{
    validate_binding_writes, BindingLayout, BindingLayoutDesc, BindingTable, BindingWrite,
};
use crate::gpu::buffer::{Buffer, BufferDesc, IndexType};
use crate::gpu::command_list::{CommandList, Rect2D, RenderingInfo, Viewport};
use crate::gpu::device::{Acquire, GraphicsDevice, Present};
use crate::gpu::shader::{CullMode, Pipeline, PipelineDesc, Shader, ShaderDesc, ShaderStage};
use crate::gpu::texture::{
    Filter, ImageLayout, Sampler, SamplerDesc, Texture, TextureDesc, TextureFormat, TextureInfo,
    TextureUsage, TextureView,
};

/// Number of images in the mock swapchain
pub const MOCK_SWAPCHAIN_IMAGES: u32 = 3;

static NEXT_TEXTURE_ID: AtomicU32 = AtomicU32::new(1);

// ============================================================================
// Mock Texture
// ============================================================================

#[derive(Debug)]
pub struct MockTexture {
    /// Process-unique id, usable to match blit sources in recorded commands
    pub id: u32,
    pub info: TextureInfo,
}

impl MockTexture {
    pub fn new(info: TextureInfo) -> Self {
        Self { id: NEXT_TEXTURE_ID.fetch_add(1, Ordering::Relaxed), info }
    }
}

impl Texture for MockTexture {
    fn info(&self) -> &TextureInfo {
        &self.info
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Id of a texture created by the mock device (panics on foreign textures)
pub fn mock_texture_id(texture: &Arc<dyn Texture>) -> u32 {
    texture
        .as_any()
        .downcast_ref::<MockTexture>()
        .expect("texture was not created by MockDevice")
        .id
}

// ============================================================================
// Mock Texture View
// ============================================================================

#[derive(Debug)]
pub struct MockTextureView {
    pub texture_id: u32,
    pub base_layer: u32,
    pub layer_count: u32,
}

impl TextureView for MockTextureView {
    fn base_layer(&self) -> u32 {
        self.base_layer
    }

    fn layer_count(&self) -> u32 {
        self.layer_count
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// ============================================================================
// Mock Buffer
// ============================================================================

pub struct MockBuffer {
    pub usage: crate::gpu::buffer::BufferUsage,
    data: Mutex<Vec<u8>>,
}

impl MockBuffer {
    /// Read back everything written so far (zero-initialized)
    pub fn contents(&self) -> Vec<u8> {
        self.data.lock().unwrap().clone()
    }
}

impl Buffer for MockBuffer {
    fn size(&self) -> u64 {
        self.data.lock().unwrap().len() as u64
    }

    fn write(&self, offset: u64, data: &[u8]) -> Result<()> {
        let mut guard = self.data.lock().unwrap();
        let end = offset as usize + data.len();
        if end > guard.len() {
            return Err(Error::InvalidResource(format!(
                "buffer write of {} bytes at offset {} exceeds size {}",
                data.len(),
                offset,
                guard.len()
            )));
        }
        guard[offset as usize..end].copy_from_slice(data);
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// ============================================================================
// Mock Sampler / Shader / Pipeline
// ============================================================================

pub struct MockSampler {
    pub desc: SamplerDesc,
}

impl Sampler for MockSampler {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub struct MockShader {
    pub name: String,
    pub shader_stage: ShaderStage,
}

impl Shader for MockShader {
    fn name(&self) -> &str {
        &self.name
    }

    fn stage(&self) -> ShaderStage {
        self.shader_stage
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub struct MockPipeline {
    pub push_constant_size: u32,
    pub vertex_shader_name: String,
}

impl Pipeline for MockPipeline {
    fn push_constant_size(&self) -> u32 {
        self.push_constant_size
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// ============================================================================
// Mock Binding Layout / Table
// ============================================================================

pub struct MockBindingLayout {
    pub layout_desc: BindingLayoutDesc,
}

impl BindingLayout for MockBindingLayout {
    fn desc(&self) -> &BindingLayoutDesc {
        &self.layout_desc
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub struct MockBindingTable {
    /// Number of times this table has been (re)written
    pub update_count: AtomicUsize,
}

impl BindingTable for MockBindingTable {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

// ============================================================================
// Mock CommandList
// ============================================================================

/// Command list that records every call as a readable string
pub struct MockCommandList {
    pub commands: Vec<String>,
    recording: bool,
}

impl MockCommandList {
    pub fn new() -> Self {
        Self { commands: Vec::new(), recording: false }
    }
}

impl Default for MockCommandList {
    fn default() -> Self {
        Self::new()
    }
}

fn view_id(view: &Arc<dyn TextureView>) -> String {
    match view.as_any().downcast_ref::<MockTextureView>() {
        Some(v) => format!("tex#{}:layer{}+{}", v.texture_id, v.base_layer, v.layer_count),
        None => "tex#?".to_string(),
    }
}

impl CommandList for MockCommandList {
    fn begin(&mut self) -> Result<()> {
        self.commands.clear();
        self.recording = true;
        self.commands.push("begin".to_string());
        Ok(())
    }

    fn end(&mut self) -> Result<()> {
        debug_assert!(self.recording, "end() without begin()");
        self.recording = false;
        self.commands.push("end".to_string());
        Ok(())
    }

    fn begin_rendering(&mut self, info: &RenderingInfo) -> Result<()> {
        let color = match &info.color {
            Some(att) => format!(
                " color={}{}",
                view_id(&att.view),
                if att.clear.is_some() { " clear" } else { " load" }
            ),
            None => String::new(),
        };
        let depth = match &info.depth {
            Some(att) => format!(
                " depth={}{}",
                view_id(&att.view),
                if att.clear.is_some() { " clear" } else { " load" }
            ),
            None => String::new(),
        };
        self.commands
            .push(format!("begin_rendering {}x{}{}{}", info.width, info.height, color, depth));
        Ok(())
    }

    fn end_rendering(&mut self) -> Result<()> {
        self.commands.push("end_rendering".to_string());
        Ok(())
    }

    fn transition_image(
        &mut self,
        texture: &Arc<dyn Texture>,
        old_layout: ImageLayout,
        new_layout: ImageLayout,
        base_layer: u32,
        layer_count: u32,
    ) -> Result<()> {
        self.commands.push(format!(
            "transition tex#{} {:?}->{:?} layers{}..{}",
            mock_texture_id(texture),
            old_layout,
            new_layout,
            base_layer,
            base_layer + layer_count
        ));
        Ok(())
    }

    fn blit_image(
        &mut self,
        src: &Arc<dyn Texture>,
        _src_layout: ImageLayout,
        dst: &Arc<dyn Texture>,
        _dst_layout: ImageLayout,
        _filter: Filter,
    ) -> Result<()> {
        self.commands
            .push(format!("blit tex#{} -> tex#{}", mock_texture_id(src), mock_texture_id(dst)));
        Ok(())
    }

    fn set_viewport(&mut self, viewport: Viewport) -> Result<()> {
        self.commands
            .push(format!("set_viewport {}x{}", viewport.width, viewport.height));
        Ok(())
    }

    fn set_scissor(&mut self, scissor: Rect2D) -> Result<()> {
        self.commands
            .push(format!("set_scissor {}x{}", scissor.width, scissor.height));
        Ok(())
    }

    fn bind_pipeline(&mut self, pipeline: &Arc<dyn Pipeline>) -> Result<()> {
        let name = pipeline
            .as_any()
            .downcast_ref::<MockPipeline>()
            .map(|p| p.vertex_shader_name.as_str())
            .unwrap_or("?");
        self.commands.push(format!("bind_pipeline {}", name));
        Ok(())
    }

    fn bind_binding_table(
        &mut self,
        _pipeline: &Arc<dyn Pipeline>,
        set_index: u32,
        _table: &Arc<dyn BindingTable>,
    ) -> Result<()> {
        self.commands.push(format!("bind_binding_table set={}", set_index));
        Ok(())
    }

    fn push_constants(
        &mut self,
        _pipeline: &Arc<dyn Pipeline>,
        _stages: &[ShaderStage],
        offset: u32,
        data: &[u8],
    ) -> Result<()> {
        self.commands
            .push(format!("push_constants offset={} size={}", offset, data.len()));
        Ok(())
    }

    fn bind_vertex_buffer(&mut self, _buffer: &Arc<dyn Buffer>, offset: u64) -> Result<()> {
        self.commands.push(format!("bind_vertex_buffer offset={}", offset));
        Ok(())
    }

    fn bind_index_buffer(
        &mut self,
        _buffer: &Arc<dyn Buffer>,
        offset: u64,
        index_type: IndexType,
    ) -> Result<()> {
        self.commands
            .push(format!("bind_index_buffer offset={} type={:?}", offset, index_type));
        Ok(())
    }

    fn set_depth_bias(&mut self, constant: f32, slope: f32) -> Result<()> {
        self.commands.push(format!("set_depth_bias {}/{}", constant, slope));
        Ok(())
    }

    fn set_cull_mode(&mut self, cull_mode: CullMode) -> Result<()> {
        self.commands.push(format!("set_cull_mode {:?}", cull_mode));
        Ok(())
    }

    fn draw(&mut self, vertex_count: u32, first_vertex: u32) -> Result<()> {
        self.commands.push(format!("draw count={} first={}", vertex_count, first_vertex));
        Ok(())
    }

    fn draw_indexed(&mut self, index_count: u32, first_index: u32, vertex_offset: i32) -> Result<()> {
        self.commands.push(format!(
            "draw_indexed count={} first={} voffset={}",
            index_count, first_index, vertex_offset
        ));
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// ============================================================================
// Mock Device
// ============================================================================

/// One frame fence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FenceState {
    Signaled,
    Unsignaled,
}

/// One batch recorded by `submit_frame`
#[derive(Debug, Clone)]
pub struct SubmittedFrame {
    pub frame_slot: usize,
    pub image_index: u32,
    /// Command strings of each submitted list, in submission order
    pub lists: Vec<Vec<String>>,
}

/// Headless graphics device
///
/// Fences start signaled (as a real backend creates them) and are moved to
/// unsignaled by `reset_frame`. With `set_auto_complete(false)`, fences
/// only signal through `complete_frame`, letting tests hold frames
/// in flight deliberately.
pub struct MockDevice {
    frames: usize,
    extent: Mutex<(u32, u32)>,
    fences: Mutex<Vec<FenceState>>,
    auto_complete: AtomicBool,
    stale_acquires: AtomicUsize,
    next_image: AtomicUsize,
    swapchain: Mutex<Vec<Arc<dyn Texture>>>,

    // Created-resource tracking
    pub created_buffers: AtomicUsize,
    pub created_textures: AtomicUsize,
    pub created_views: AtomicUsize,
    pub created_samplers: AtomicUsize,
    pub created_pipelines: AtomicUsize,
    pub created_binding_tables: AtomicUsize,
    pub recreate_count: AtomicUsize,

    submitted: Mutex<Vec<SubmittedFrame>>,
    presented: Mutex<Vec<u32>>,
}

impl MockDevice {
    pub fn new(frames_in_flight: usize, width: u32, height: u32) -> Arc<Self> {
        let device = Arc::new(Self {
            frames: frames_in_flight,
            extent: Mutex::new((width, height)),
            fences: Mutex::new(vec![FenceState::Signaled; frames_in_flight]),
            auto_complete: AtomicBool::new(true),
            stale_acquires: AtomicUsize::new(0),
            next_image: AtomicUsize::new(0),
            swapchain: Mutex::new(Vec::new()),
            created_buffers: AtomicUsize::new(0),
            created_textures: AtomicUsize::new(0),
            created_views: AtomicUsize::new(0),
            created_samplers: AtomicUsize::new(0),
            created_pipelines: AtomicUsize::new(0),
            created_binding_tables: AtomicUsize::new(0),
            recreate_count: AtomicUsize::new(0),
            submitted: Mutex::new(Vec::new()),
            presented: Mutex::new(Vec::new()),
        });
        device.build_swapchain(width, height);
        device
    }

    fn build_swapchain(&self, width: u32, height: u32) {
        let mut swapchain = self.swapchain.lock().unwrap();
        swapchain.clear();
        for _ in 0..MOCK_SWAPCHAIN_IMAGES {
            swapchain.push(Arc::new(MockTexture::new(TextureInfo {
                width,
                height,
                format: TextureFormat::B8G8R8A8_SRGB,
                usage: TextureUsage::COLOR_ATTACHMENT | TextureUsage::TRANSFER_DST,
                array_layers: 1,
            })) as Arc<dyn Texture>);
        }
    }

    // ===== TEST CONTROLS =====

    /// When false, fences signal only through `complete_frame`
    pub fn set_auto_complete(&self, auto: bool) {
        self.auto_complete.store(auto, Ordering::SeqCst);
    }

    /// Signal a frame slot's fence (simulates the GPU finishing that frame)
    pub fn complete_frame(&self, frame_slot: usize) {
        self.fences.lock().unwrap()[frame_slot] = FenceState::Signaled;
    }

    /// Make the next `count` acquire calls report a stale surface
    pub fn force_stale_acquires(&self, count: usize) {
        self.stale_acquires.store(count, Ordering::SeqCst);
    }

    /// All batches submitted so far
    pub fn submitted_frames(&self) -> Vec<SubmittedFrame> {
        self.submitted.lock().unwrap().clone()
    }

    /// Image indices presented so far
    pub fn presented_images(&self) -> Vec<u32> {
        self.presented.lock().unwrap().clone()
    }
}

impl GraphicsDevice for MockDevice {
    fn frames_in_flight(&self) -> usize {
        self.frames
    }

    fn surface_extent(&self) -> (u32, u32) {
        *self.extent.lock().unwrap()
    }

    fn create_buffer(&self, desc: &BufferDesc) -> Result<Arc<dyn Buffer>> {
        self.created_buffers.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(MockBuffer {
            usage: desc.usage,
            data: Mutex::new(vec![0u8; desc.size as usize]),
        }))
    }

    fn create_texture(&self, desc: &TextureDesc) -> Result<Arc<dyn Texture>> {
        self.created_textures.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(MockTexture::new(TextureInfo {
            width: desc.width,
            height: desc.height,
            format: desc.format,
            usage: desc.usage,
            array_layers: desc.array_layers,
        })))
    }

    fn create_texture_view(
        &self,
        texture: &Arc<dyn Texture>,
        base_layer: u32,
        layer_count: u32,
    ) -> Result<Arc<dyn TextureView>> {
        let info = texture.info();
        if base_layer + layer_count > info.array_layers {
            return Err(Error::InvalidResource(format!(
                "view layers {}..{} exceed texture layer count {}",
                base_layer,
                base_layer + layer_count,
                info.array_layers
            )));
        }
        self.created_views.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(MockTextureView {
            texture_id: mock_texture_id(texture),
            base_layer,
            layer_count,
        }))
    }

    fn create_sampler(&self, desc: &SamplerDesc) -> Result<Arc<dyn Sampler>> {
        self.created_samplers.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(MockSampler { desc: desc.clone() }))
    }

    fn create_shader(&self, desc: &ShaderDesc) -> Result<Arc<dyn Shader>> {
        Ok(Arc::new(MockShader { name: desc.name.clone(), shader_stage: desc.stage }))
    }

    fn create_pipeline(&self, desc: &PipelineDesc) -> Result<Arc<dyn Pipeline>> {
        crate::gpu::shader::validate_pipeline_desc(desc)?;
        self.created_pipelines.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(MockPipeline {
            push_constant_size: desc.push_constant_size,
            vertex_shader_name: desc.vertex_shader.name().to_string(),
        }))
    }

    fn create_binding_layout(&self, desc: &BindingLayoutDesc) -> Result<Arc<dyn BindingLayout>> {
        Ok(Arc::new(MockBindingLayout { layout_desc: desc.clone() }))
    }

    fn create_binding_table(&self, _layout: &Arc<dyn BindingLayout>) -> Result<Arc<dyn BindingTable>> {
        self.created_binding_tables.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(MockBindingTable { update_count: AtomicUsize::new(0) }))
    }

    fn update_binding_table(
        &self,
        layout: &Arc<dyn BindingLayout>,
        table: &Arc<dyn BindingTable>,
        writes: &[BindingWrite],
    ) -> Result<()> {
        validate_binding_writes(layout.desc(), writes)?;
        if let Some(table) = table.as_any().downcast_ref::<MockBindingTable>() {
            table.update_count.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    fn create_command_list(&self) -> Result<Box<dyn CommandList>> {
        Ok(Box::new(MockCommandList::new()))
    }

    fn wait_frame(&self, frame_slot: usize, _timeout_ns: u64) -> Result<()> {
        let mut fences = self.fences.lock().unwrap();
        match fences[frame_slot] {
            FenceState::Signaled => Ok(()),
            FenceState::Unsignaled => {
                if self.auto_complete.load(Ordering::SeqCst) {
                    fences[frame_slot] = FenceState::Signaled;
                    Ok(())
                } else {
                    Err(Error::FenceTimeout { frame_slot })
                }
            }
        }
    }

    fn wait_all_frames(&self) -> Result<()> {
        for slot in 0..self.frames {
            self.wait_frame(slot, u64::MAX)?;
        }
        Ok(())
    }

    fn reset_frame(&self, frame_slot: usize) -> Result<()> {
        self.fences.lock().unwrap()[frame_slot] = FenceState::Unsignaled;
        Ok(())
    }

    fn acquire_image(&self, _frame_slot: usize) -> Result<Acquire> {
        let stale = self.stale_acquires.load(Ordering::SeqCst);
        if stale > 0 {
            self.stale_acquires.store(stale - 1, Ordering::SeqCst);
            return Ok(Acquire::Stale);
        }
        let index = self.next_image.fetch_add(1, Ordering::SeqCst) as u32 % MOCK_SWAPCHAIN_IMAGES;
        Ok(Acquire::Image(index))
    }

    fn swapchain_image(&self, image_index: u32) -> Result<Arc<dyn Texture>> {
        self.swapchain
            .lock()
            .unwrap()
            .get(image_index as usize)
            .cloned()
            .ok_or_else(|| Error::InvalidResource(format!("no swapchain image {}", image_index)))
    }

    fn submit_frame(
        &self,
        frame_slot: usize,
        lists: &[&dyn CommandList],
        image_index: u32,
    ) -> Result<()> {
        let lists = lists
            .iter()
            .map(|list| {
                list.as_any()
                    .downcast_ref::<MockCommandList>()
                    .map(|l| l.commands.clone())
                    .unwrap_or_default()
            })
            .collect();
        self.submitted.lock().unwrap().push(SubmittedFrame { frame_slot, image_index, lists });
        Ok(())
    }

    fn present(&self, _frame_slot: usize, image_index: u32) -> Result<Present> {
        self.presented.lock().unwrap().push(image_index);
        Ok(Present::Presented)
    }

    fn recreate_swapchain(&self, extent: (u32, u32)) -> Result<()> {
        *self.extent.lock().unwrap() = extent;
        self.build_swapchain(extent.0, extent.1);
        self.recreate_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn wait_idle(&self) -> Result<()> {
        let mut fences = self.fences.lock().unwrap();
        for fence in fences.iter_mut() {
            *fence = FenceState::Signaled;
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "mock_device_tests.rs"]
mod tests;
