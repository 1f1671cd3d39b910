/// GraphicsDevice trait - resource factory and per-frame synchronization
///
/// Implemented by backends (VulkanDevice) and by the MockDevice used in
/// tests. The frame scheduler drives every per-frame operation through
/// this trait and never touches backend types directly.

use std::sync::Arc;
use crate::error::Result;
use crate::gpu::binding::{BindingLayout, BindingLayoutDesc, BindingTable, BindingWrite};
use crate::gpu::buffer::{Buffer, BufferDesc};
use crate::gpu::command_list::CommandList;
use crate::gpu::shader::{Pipeline, PipelineDesc, Shader, ShaderDesc};
use crate::gpu::texture::{Sampler, SamplerDesc, Texture, TextureDesc, TextureView};

/// Outcome of acquiring the next presentable image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acquire {
    /// An image was acquired; the index identifies it within the swapchain
    Image(u32),
    /// The surface is stale (resized/out of date); the caller must
    /// recreate the swapchain and skip this frame
    Stale,
}

/// Outcome of presenting an acquired image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Present {
    /// The image was queued for presentation
    Presented,
    /// The surface went stale at present time; recreate before the next frame
    Stale,
}

/// Graphics device abstraction
///
/// One device owns the presentation surface, the swapchain, one
/// fence + semaphore pair per frame slot, and all GPU resource creation.
/// Methods take `&self`; backends use interior locking where required.
pub trait GraphicsDevice: Send + Sync {
    // ===== CAPABILITIES =====

    /// Number of frame slots (frames the CPU may record ahead)
    fn frames_in_flight(&self) -> usize;

    /// Current output surface extent in pixels
    fn surface_extent(&self) -> (u32, u32);

    // ===== RESOURCE FACTORY =====

    fn create_buffer(&self, desc: &BufferDesc) -> Result<Arc<dyn Buffer>>;

    fn create_texture(&self, desc: &TextureDesc) -> Result<Arc<dyn Texture>>;

    /// Create a view over a layer range of a texture
    fn create_texture_view(
        &self,
        texture: &Arc<dyn Texture>,
        base_layer: u32,
        layer_count: u32,
    ) -> Result<Arc<dyn TextureView>>;

    fn create_sampler(&self, desc: &SamplerDesc) -> Result<Arc<dyn Sampler>>;

    fn create_shader(&self, desc: &ShaderDesc) -> Result<Arc<dyn Shader>>;

    fn create_pipeline(&self, desc: &PipelineDesc) -> Result<Arc<dyn Pipeline>>;

    fn create_binding_layout(&self, desc: &BindingLayoutDesc) -> Result<Arc<dyn BindingLayout>>;

    /// Allocate one binding table from the layout's pool
    fn create_binding_table(&self, layout: &Arc<dyn BindingLayout>) -> Result<Arc<dyn BindingTable>>;

    /// Rewrite binding points of an existing table in place
    fn update_binding_table(
        &self,
        layout: &Arc<dyn BindingLayout>,
        table: &Arc<dyn BindingTable>,
        writes: &[BindingWrite],
    ) -> Result<()>;

    fn create_command_list(&self) -> Result<Box<dyn CommandList>>;

    // ===== FRAME SYNCHRONIZATION =====

    /// Wait for a frame slot's completion fence (bounded)
    ///
    /// # Errors
    ///
    /// Returns `Error::FenceTimeout` when the fence does not signal within
    /// `timeout_ns`; the caller treats this as fatal.
    fn wait_frame(&self, frame_slot: usize, timeout_ns: u64) -> Result<()>;

    /// Wait for every frame slot's completion fence
    fn wait_all_frames(&self) -> Result<()>;

    /// Reset a frame slot's completion fence to unsignaled
    fn reset_frame(&self, frame_slot: usize) -> Result<()>;

    /// Acquire the next presentable image, signaling the slot's
    /// image-available semaphore
    fn acquire_image(&self, frame_slot: usize) -> Result<Acquire>;

    /// The swapchain image behind an acquired index (blit destination)
    fn swapchain_image(&self, image_index: u32) -> Result<Arc<dyn Texture>>;

    /// Submit all recorded command lists for this frame as a single batch
    ///
    /// The batch waits on the slot's image-available semaphore, signals its
    /// render-finished semaphore, and signals the slot fence on completion.
    fn submit_frame(
        &self,
        frame_slot: usize,
        lists: &[&dyn CommandList],
        image_index: u32,
    ) -> Result<()>;

    /// Queue the acquired image for presentation, waiting on the slot's
    /// render-finished semaphore
    fn present(&self, frame_slot: usize, image_index: u32) -> Result<Present>;

    /// Recreate the swapchain for a new surface extent
    fn recreate_swapchain(&self, extent: (u32, u32)) -> Result<()>;

    /// Block until the GPU is idle (shutdown path)
    fn wait_idle(&self) -> Result<()>;
}
