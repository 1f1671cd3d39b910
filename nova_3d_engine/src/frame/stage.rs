/// RenderStage trait - one pass pipeline stage driven by the frame scheduler
///
/// A stage owns its render targets and GPU tables, records into a command
/// list the scheduler hands it, and never submits on its own. Stages are
/// registered with the `FrameScheduler`, which owns execution order,
/// synchronization and submission.

use std::sync::Arc;

use crate::error::Result;
use crate::gpu::command_list::CommandList;
use crate::gpu::texture::Texture;
use crate::scene::NodeEvent;

/// A render pass stage
///
/// Lifecycle: `create_images_resources` after registration, then per frame
/// `update` (serial) followed by `record_commands` (possibly on a worker
/// thread), and `cleanup_images_resources` before the stage is dropped.
/// `cleanup_images_resources` must be idempotent; the scheduler may call
/// it on an already-cleaned stage during shutdown.
pub trait RenderStage: Send + Sync {
    /// Stage name used in log output
    fn name(&self) -> &str;

    /// Create swapchain-extent-dependent images and per-frame resources
    fn create_images_resources(&mut self) -> Result<()>;

    /// Release everything `create_images_resources` created (idempotent)
    fn cleanup_images_resources(&mut self);

    /// Recreate extent-dependent resources after a surface change
    fn recreate_images_resources(&mut self) -> Result<()> {
        self.cleanup_images_resources();
        self.create_images_resources()
    }

    /// Per-frame CPU work: visibility, uniform uploads, binding refreshes.
    ///
    /// Runs serially on the scheduler thread, in execution order, before
    /// any recording starts.
    fn update(&mut self, frame_slot: usize) -> Result<()>;

    /// Record this stage's commands for the frame slot.
    ///
    /// The scheduler has already called `begin` on the list and will call
    /// `end` afterwards. Stages flagged `can_be_threaded` record on worker
    /// threads, one thread per stage.
    fn record_commands(&mut self, frame_slot: usize, commands: &mut dyn CommandList) -> Result<()>;

    /// The image this stage rendered for the slot, if it produces one.
    ///
    /// The scheduler blits the output of the last-registered stage into
    /// the acquired presentable image. The stage must leave the image in
    /// the transfer-source layout at the end of its recording.
    fn output_image(&self, frame_slot: usize) -> Option<Arc<dyn Texture>>;

    /// Whether `record_commands` may run on a worker thread
    fn can_be_threaded(&self) -> bool {
        false
    }

    /// React to a scene mutation (default: ignore)
    fn handle_node_event(&mut self, _event: &NodeEvent) -> Result<()> {
        Ok(())
    }
}
