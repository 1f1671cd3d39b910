/// CommandList trait - for recording rendering commands

use std::any::Any;
use std::sync::Arc;
use crate::error::Result;
use crate::gpu::binding::BindingTable;
use crate::gpu::buffer::{Buffer, IndexType};
use crate::gpu::shader::{CullMode, Pipeline, ShaderStage};
use crate::gpu::texture::{Filter, ImageLayout, Texture, TextureView};

/// Viewport dimensions and depth range
#[derive(Debug, Clone, Copy)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub min_depth: f32,
    pub max_depth: f32,
}

/// 2D rectangle
#[derive(Debug, Clone, Copy)]
pub struct Rect2D {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

/// Color attachment for `begin_rendering`
///
/// `clear` = Some clears the attachment on load, None preserves its
/// current contents.
#[derive(Clone)]
pub struct ColorAttachment {
    pub view: Arc<dyn TextureView>,
    pub clear: Option<[f32; 4]>,
}

/// Depth attachment for `begin_rendering`
#[derive(Clone)]
pub struct DepthAttachment {
    pub view: Arc<dyn TextureView>,
    pub clear: Option<f32>,
}

/// Attachments and render area for one rendering scope
#[derive(Clone)]
pub struct RenderingInfo {
    pub color: Option<ColorAttachment>,
    pub depth: Option<DepthAttachment>,
    pub width: u32,
    pub height: u32,
}

/// Command list for recording rendering commands
///
/// Commands are recorded per stage and later submitted to the GPU as a
/// single batch via `GraphicsDevice::submit_frame()`. No stage submits on
/// its own; the frame scheduler owns the total submission order.
pub trait CommandList: Send + Sync {
    /// Begin recording commands (implicitly resets the list)
    fn begin(&mut self) -> Result<()>;

    /// End recording commands
    fn end(&mut self) -> Result<()>;

    /// Begin a rendering scope with the given attachments
    fn begin_rendering(&mut self, info: &RenderingInfo) -> Result<()>;

    /// End the current rendering scope
    fn end_rendering(&mut self) -> Result<()>;

    /// Transition a layer range of an image between layouts
    ///
    /// Inserted at stage boundaries so a later stage can read what an
    /// earlier one wrote.
    fn transition_image(
        &mut self,
        texture: &Arc<dyn Texture>,
        old_layout: ImageLayout,
        new_layout: ImageLayout,
        base_layer: u32,
        layer_count: u32,
    ) -> Result<()>;

    /// Blit (scaled copy) the full extent of `src` into `dst`
    ///
    /// Used by the frame scheduler to copy the final stage's output into
    /// the acquired presentable image.
    fn blit_image(
        &mut self,
        src: &Arc<dyn Texture>,
        src_layout: ImageLayout,
        dst: &Arc<dyn Texture>,
        dst_layout: ImageLayout,
        filter: Filter,
    ) -> Result<()>;

    /// Set the viewport
    fn set_viewport(&mut self, viewport: Viewport) -> Result<()>;

    /// Set the scissor rectangle
    fn set_scissor(&mut self, scissor: Rect2D) -> Result<()>;

    /// Bind a graphics pipeline
    fn bind_pipeline(&mut self, pipeline: &Arc<dyn Pipeline>) -> Result<()>;

    /// Bind a binding table to a pipeline set slot
    fn bind_binding_table(
        &mut self,
        pipeline: &Arc<dyn Pipeline>,
        set_index: u32,
        table: &Arc<dyn BindingTable>,
    ) -> Result<()>;

    /// Push constants to the pipeline
    fn push_constants(
        &mut self,
        pipeline: &Arc<dyn Pipeline>,
        stages: &[ShaderStage],
        offset: u32,
        data: &[u8],
    ) -> Result<()>;

    /// Bind a vertex buffer
    fn bind_vertex_buffer(&mut self, buffer: &Arc<dyn Buffer>, offset: u64) -> Result<()>;

    /// Bind an index buffer
    fn bind_index_buffer(
        &mut self,
        buffer: &Arc<dyn Buffer>,
        offset: u64,
        index_type: IndexType,
    ) -> Result<()>;

    /// Set the dynamic depth bias (shadow passes)
    fn set_depth_bias(&mut self, constant: f32, slope: f32) -> Result<()>;

    /// Set the dynamic cull mode
    fn set_cull_mode(&mut self, cull_mode: CullMode) -> Result<()>;

    /// Draw vertices
    fn draw(&mut self, vertex_count: u32, first_vertex: u32) -> Result<()>;

    /// Draw indexed vertices
    fn draw_indexed(&mut self, index_count: u32, first_index: u32, vertex_offset: i32) -> Result<()>;

    /// Downcast support for backends and tests
    fn as_any(&self) -> &dyn Any;
}
