/// FrameScheduler - drives the per-frame loop across registered stages
///
/// Owns stage registration order, per-slot command lists, the deferred
/// stage-teardown queue and the scene-mutation queue. One call to
/// `draw_frame` runs: fence wait, deferred teardown retirement, bounded
/// event dispatch, image acquisition (with stale-surface recovery), the
/// serial update phase, the threaded recording phase, one batched
/// submission, and presentation.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, RwLock};

use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::frame::stage::RenderStage;
use crate::gpu::command_list::CommandList;
use crate::gpu::device::{Acquire, GraphicsDevice, Present};
use crate::gpu::texture::{Filter, ImageLayout};
use crate::scene::NodeEvent;
use crate::{engine_debug, engine_info, engine_trace};

/// Upper bound on one frame fence wait; exceeding it is fatal
pub const FENCE_TIMEOUT_NS: u64 = 5_000_000_000;

const LOG_SOURCE: &str = "nova3d::FrameScheduler";

/// One registered stage with its per-slot command lists
struct StageEntry {
    stage: Arc<RwLock<dyn RenderStage>>,
    /// One list per frame slot, indexed by `frame_slot`
    command_lists: Vec<Box<dyn CommandList>>,
}

/// A stage waiting for its in-flight frames to finish before teardown
struct PendingRemoval {
    entry: StageEntry,
    /// Frame slots that may still reference the stage's resources
    slots_remaining: Vec<usize>,
}

/// Frame scheduler
///
/// Stages are stored most-recently-registered first; execution iterates
/// the list in reverse, so stages run in registration order and the
/// last-registered stage runs last and provides the presentable output.
pub struct FrameScheduler {
    device: Arc<dyn GraphicsDevice>,
    stages: Vec<StageEntry>,
    pending_removals: Vec<PendingRemoval>,
    /// Scheduler-owned per-slot list for swapchain transitions and the
    /// final blit
    present_lists: Vec<Box<dyn CommandList>>,
    event_queue: Mutex<VecDeque<NodeEvent>>,
    updates_per_frame: usize,
    current_frame: usize,
}

impl FrameScheduler {
    pub fn new(device: Arc<dyn GraphicsDevice>, config: &EngineConfig) -> Result<Self> {
        let mut present_lists = Vec::with_capacity(device.frames_in_flight());
        for _ in 0..device.frames_in_flight() {
            present_lists.push(device.create_command_list()?);
        }
        engine_debug!(
            LOG_SOURCE,
            "created with {} frame slots",
            device.frames_in_flight()
        );
        Ok(Self {
            device,
            stages: Vec::new(),
            pending_removals: Vec::new(),
            present_lists,
            event_queue: Mutex::new(VecDeque::new()),
            updates_per_frame: config.scene_updates_per_frame,
            current_frame: 0,
        })
    }

    /// Frame slot the next `draw_frame` call will use
    pub fn current_frame(&self) -> usize {
        self.current_frame
    }

    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    // ===== STAGE REGISTRATION =====

    /// Register a stage at the front of the list.
    ///
    /// The newest stage renders last and its output is blitted to the
    /// presentable image. Creates the stage's images and its per-slot
    /// command lists.
    pub fn register_stage(&mut self, stage: Arc<RwLock<dyn RenderStage>>) -> Result<()> {
        stage.write().unwrap().create_images_resources()?;
        let mut command_lists = Vec::with_capacity(self.device.frames_in_flight());
        for _ in 0..self.device.frames_in_flight() {
            command_lists.push(self.device.create_command_list()?);
        }
        engine_info!(
            LOG_SOURCE,
            "registered stage '{}'",
            stage.read().unwrap().name()
        );
        self.stages.insert(0, StageEntry { stage, command_lists });
        Ok(())
    }

    /// Unregister a stage.
    ///
    /// With `immediate` set, blocks until every in-flight frame has
    /// finished and tears the stage down before returning. Otherwise the
    /// stage is queued for teardown and released once every frame slot
    /// that may still reference it has completed one fence wait.
    pub fn unregister_stage(
        &mut self,
        stage: &Arc<RwLock<dyn RenderStage>>,
        immediate: bool,
    ) -> Result<()> {
        let Some(position) = self
            .stages
            .iter()
            .position(|entry| Arc::ptr_eq(&entry.stage, stage))
        else {
            crate::engine_bail!(
                LOG_SOURCE,
                InvalidResource,
                "unregister of a stage that is not registered"
            );
        };
        let entry = self.stages.remove(position);
        let name = entry.stage.read().unwrap().name().to_string();
        if immediate {
            self.device.wait_all_frames()?;
            entry.stage.write().unwrap().cleanup_images_resources();
            engine_info!(LOG_SOURCE, "unregistered stage '{}' (immediate)", name);
        } else {
            let slots_remaining = (0..self.device.frames_in_flight()).collect();
            self.pending_removals.push(PendingRemoval { entry, slots_remaining });
            engine_info!(LOG_SOURCE, "unregistered stage '{}' (deferred)", name);
        }
        Ok(())
    }

    // ===== SCENE MUTATIONS =====

    /// Queue a scene mutation for dispatch at the start of a frame.
    ///
    /// At most `scene_updates_per_frame` queued events are dispatched per
    /// frame; the rest carry over.
    pub fn queue_event(&self, event: NodeEvent) {
        self.event_queue.lock().unwrap().push_back(event);
    }

    /// Queued events not yet dispatched
    pub fn pending_event_count(&self) -> usize {
        self.event_queue.lock().unwrap().len()
    }

    // ===== FRAME LOOP =====

    /// Render and present one frame. No-op when no stage is registered.
    ///
    /// # Errors
    ///
    /// `Error::FenceTimeout` when the frame slot's fence does not signal;
    /// any stage error from `update` or `record_commands`. All are fatal
    /// to the frame loop.
    pub fn draw_frame(&mut self) -> Result<()> {
        if self.stages.is_empty() && self.pending_removals.is_empty() {
            return Ok(());
        }
        let slot = self.current_frame;

        self.device.wait_frame(slot, FENCE_TIMEOUT_NS)?;
        self.retire_pending_removals(slot);
        self.dispatch_events()?;

        if self.stages.is_empty() {
            self.current_frame = (slot + 1) % self.device.frames_in_flight();
            return Ok(());
        }

        let image_index = match self.device.acquire_image(slot)? {
            Acquire::Image(index) => index,
            Acquire::Stale => {
                engine_debug!(LOG_SOURCE, "stale surface on acquire, recreating");
                self.recreate_surface(self.device.surface_extent())?;
                self.current_frame = (slot + 1) % self.device.frames_in_flight();
                return Ok(());
            }
        };
        self.device.reset_frame(slot)?;

        // Serial update phase, in execution order
        for entry in self.stages.iter_mut().rev() {
            entry.stage.write().unwrap().update(slot)?;
        }

        self.record_stages(slot)?;
        self.record_present_list(slot, image_index)?;

        let mut lists: Vec<&dyn CommandList> = self
            .stages
            .iter()
            .rev()
            .map(|entry| entry.command_lists[slot].as_ref())
            .collect();
        lists.push(self.present_lists[slot].as_ref());
        self.device.submit_frame(slot, &lists, image_index)?;

        if self.device.present(slot, image_index)? == Present::Stale {
            engine_debug!(LOG_SOURCE, "stale surface on present, recreating");
            self.recreate_surface(self.device.surface_extent())?;
        }

        self.current_frame = (slot + 1) % self.device.frames_in_flight();
        Ok(())
    }

    /// Handle an explicit surface resize
    pub fn resize(&mut self, extent: (u32, u32)) -> Result<()> {
        engine_info!(LOG_SOURCE, "resize to {}x{}", extent.0, extent.1);
        self.recreate_surface(extent)
    }

    /// Tear everything down: waits for the GPU, then cleans every stage
    /// (including deferred removals)
    pub fn shutdown(&mut self) -> Result<()> {
        self.device.wait_idle()?;
        for pending in self.pending_removals.drain(..) {
            pending.entry.stage.write().unwrap().cleanup_images_resources();
        }
        for entry in self.stages.drain(..) {
            entry.stage.write().unwrap().cleanup_images_resources();
        }
        engine_info!(LOG_SOURCE, "shut down");
        Ok(())
    }

    // ===== INTERNALS =====

    /// A fence wait on `slot` has completed: that slot can no longer
    /// reference resources of deferred-removed stages.
    fn retire_pending_removals(&mut self, slot: usize) {
        for pending in &mut self.pending_removals {
            pending.slots_remaining.retain(|&s| s != slot);
        }
        for pending in &mut self.pending_removals {
            if pending.slots_remaining.is_empty() {
                let mut stage = pending.entry.stage.write().unwrap();
                engine_trace!(LOG_SOURCE, "retiring stage '{}'", stage.name());
                stage.cleanup_images_resources();
            }
        }
        self.pending_removals
            .retain(|pending| !pending.slots_remaining.is_empty());
    }

    /// Dispatch queued scene mutations to every stage, bounded per frame
    fn dispatch_events(&mut self) -> Result<()> {
        for _ in 0..self.updates_per_frame {
            let Some(event) = self.event_queue.lock().unwrap().pop_front() else {
                break;
            };
            for entry in self.stages.iter_mut().rev() {
                entry.stage.write().unwrap().handle_node_event(&event)?;
            }
        }
        Ok(())
    }

    /// Record every stage's list for the slot; threadable stages record
    /// concurrently, one worker per stage
    fn record_stages(&mut self, slot: usize) -> Result<()> {
        std::thread::scope(|scope| -> Result<()> {
            let mut handles = Vec::new();
            for entry in self.stages.iter_mut().rev() {
                let threaded = entry.stage.read().unwrap().can_be_threaded();
                let stage = Arc::clone(&entry.stage);
                let list = entry.command_lists[slot].as_mut();
                if threaded {
                    handles.push(scope.spawn(move || record_one(&stage, slot, list)));
                } else {
                    record_one(&stage, slot, list)?;
                }
            }
            for handle in handles {
                handle.join().map_err(|_| {
                    Error::ContractViolation("stage recording thread panicked".to_string())
                })??;
            }
            Ok(())
        })
    }

    /// Record swapchain transitions and the blit from the last-registered
    /// stage's output
    fn record_present_list(&mut self, slot: usize, image_index: u32) -> Result<()> {
        let source = self
            .stages
            .first()
            .and_then(|entry| entry.stage.read().unwrap().output_image(slot));
        let swapchain_image = self.device.swapchain_image(image_index)?;

        let list = self.present_lists[slot].as_mut();
        list.begin()?;
        list.transition_image(
            &swapchain_image,
            ImageLayout::Undefined,
            ImageLayout::TransferDst,
            0,
            1,
        )?;
        if let Some(source) = &source {
            list.blit_image(
                source,
                ImageLayout::TransferSrc,
                &swapchain_image,
                ImageLayout::TransferDst,
                Filter::Linear,
            )?;
        }
        list.transition_image(
            &swapchain_image,
            ImageLayout::TransferDst,
            ImageLayout::PresentSrc,
            0,
            1,
        )?;
        list.end()?;
        Ok(())
    }

    /// Recreate the swapchain and every stage's extent-dependent resources
    fn recreate_surface(&mut self, extent: (u32, u32)) -> Result<()> {
        self.device.wait_all_frames()?;
        self.device.recreate_swapchain(extent)?;
        for entry in self.stages.iter_mut().rev() {
            entry.stage.write().unwrap().recreate_images_resources()?;
        }
        Ok(())
    }
}

fn record_one(
    stage: &Arc<RwLock<dyn RenderStage>>,
    slot: usize,
    list: &mut dyn CommandList,
) -> Result<()> {
    list.begin()?;
    stage.write().unwrap().record_commands(slot, list)?;
    list.end()?;
    Ok(())
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
