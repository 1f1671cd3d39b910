/// BindingTableManager - per-slot binding tables with one-shot dirty flags
///
/// A stage owns one manager per binding layout. Tables are created once
/// per frame slot; content changes mark slots dirty, and each slot is
/// rewritten at most once, the next time that slot's frame is prepared.
/// Uniform buffers that back the tables grow but never shrink
/// (`GrowableUniform`), so a grow invalidates every slot's table.

use std::sync::Arc;

use crate::error::Result;
use crate::gpu::binding::{BindingLayout, BindingLayoutDesc, BindingTable, BindingWrite};
use crate::gpu::buffer::{Buffer, BufferDesc, BufferUsage};
use crate::gpu::device::GraphicsDevice;
use crate::engine_trace;

const LOG_SOURCE: &str = "nova3d::BindingTableManager";

/// Per-frame-slot binding tables over one layout
pub struct BindingTableManager {
    device: Arc<dyn GraphicsDevice>,
    layout: Arc<dyn BindingLayout>,
    tables: Vec<Arc<dyn BindingTable>>,
    dirty: Vec<bool>,
}

impl BindingTableManager {
    /// Create the layout and one table per frame slot; all slots start
    /// dirty so the first frame writes them.
    pub fn new(
        device: Arc<dyn GraphicsDevice>,
        mut layout_desc: BindingLayoutDesc,
        slots: usize,
    ) -> Result<Self> {
        layout_desc.max_tables = slots as u32;
        let layout = device.create_binding_layout(&layout_desc)?;
        let mut tables = Vec::with_capacity(slots);
        for _ in 0..slots {
            tables.push(device.create_binding_table(&layout)?);
        }
        Ok(Self { device, layout, tables, dirty: vec![true; slots] })
    }

    pub fn layout(&self) -> &Arc<dyn BindingLayout> {
        &self.layout
    }

    pub fn table(&self, slot: usize) -> &Arc<dyn BindingTable> {
        &self.tables[slot]
    }

    pub fn slot_count(&self) -> usize {
        self.tables.len()
    }

    /// Mark one slot for rewrite on its next frame
    pub fn mark_dirty(&mut self, slot: usize) {
        self.dirty[slot] = true;
    }

    /// Mark every slot for rewrite (content or buffer identity changed)
    pub fn mark_all_dirty(&mut self) {
        self.dirty.fill(true);
    }

    pub fn is_dirty(&self, slot: usize) -> bool {
        self.dirty[slot]
    }

    /// Rewrite the slot's table if it is dirty, then clear the flag.
    ///
    /// Returns whether a rewrite happened. The one-shot flag guarantees a
    /// slot is written at most once per invalidation even when prepared
    /// several times.
    pub fn refresh_if_dirty(&mut self, slot: usize, writes: &[BindingWrite]) -> Result<bool> {
        if !self.dirty[slot] {
            return Ok(false);
        }
        self.device
            .update_binding_table(&self.layout, &self.tables[slot], writes)?;
        self.dirty[slot] = false;
        engine_trace!(LOG_SOURCE, "refreshed binding table slot {}", slot);
        Ok(true)
    }
}

// ============================================================================
// Growable uniform buffer
// ============================================================================

/// A uniform array buffer that grows to fit and never shrinks
///
/// Backs the per-object uniform arrays: the element count only
/// ever increases, so in-flight frames reading the old buffer stay valid
/// until their fences retire.
pub struct GrowableUniform {
    device: Arc<dyn GraphicsDevice>,
    element_size: u64,
    capacity: usize,
    buffer: Option<Arc<dyn Buffer>>,
}

impl GrowableUniform {
    pub fn new(device: Arc<dyn GraphicsDevice>, element_size: u64) -> Self {
        Self { device, element_size, capacity: 0, buffer: None }
    }

    /// Grow the buffer to hold at least `count` elements.
    ///
    /// Returns `true` when a new buffer was created; the caller must then
    /// mark every binding table slot dirty.
    pub fn ensure_capacity(&mut self, count: usize) -> Result<bool> {
        if count <= self.capacity && self.buffer.is_some() {
            return Ok(false);
        }
        let new_capacity = count.max(1);
        let buffer = self.device.create_buffer(&BufferDesc {
            size: self.element_size * new_capacity as u64,
            usage: BufferUsage::UNIFORM,
        })?;
        self.buffer = Some(buffer);
        self.capacity = new_capacity;
        engine_trace!(LOG_SOURCE, "uniform buffer grown to {} elements", new_capacity);
        Ok(true)
    }

    /// Write one element's bytes
    ///
    /// # Errors
    ///
    /// `Error::InvalidResource` when the index is out of capacity or the
    /// buffer was never allocated.
    pub fn write_element(&self, index: usize, data: &[u8]) -> Result<()> {
        let Some(buffer) = &self.buffer else {
            crate::engine_bail!(LOG_SOURCE, InvalidResource, "write before first allocation");
        };
        if index >= self.capacity {
            crate::engine_bail!(
                LOG_SOURCE,
                InvalidResource,
                "element {} out of capacity {}",
                index,
                self.capacity
            );
        }
        buffer.write(self.element_size * index as u64, data)
    }

    pub fn buffer(&self) -> Option<&Arc<dyn Buffer>> {
        self.buffer.as_ref()
    }

    pub fn element_size(&self) -> u64 {
        self.element_size
    }

    /// Current element capacity (0 before the first allocation)
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
#[path = "binding_table_tests.rs"]
mod tests;
