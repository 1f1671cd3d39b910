/// RefTable - reference-counted dense index table for shader-visible arrays
///
/// Maps resource ids to stable-until-removal dense indices 0..len, the
/// positions shaders use to index uniform arrays and texture tables.
/// Adding an already-present resource only bumps its reference count;
/// removal frees the slot when the count reaches zero and rebuilds every
/// index to keep the range dense.

use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::error::Result;
use crate::{engine_trace, engine_warn};

/// Dense, reference-counted resource table with a fixed capacity
pub struct RefTable<T: ?Sized> {
    /// Table name for logs and capacity errors
    name: &'static str,
    /// Resources in insertion order; position = shader-visible index
    entries: Vec<(u32, Arc<T>)>,
    /// Resource id -> dense index
    indices: FxHashMap<u32, u32>,
    /// Resource id -> number of holders
    refcounts: FxHashMap<u32, u32>,
    capacity: usize,
}

impl<T: ?Sized> RefTable<T> {
    pub fn new(name: &'static str, capacity: usize) -> Self {
        Self {
            name,
            entries: Vec::new(),
            indices: FxHashMap::default(),
            refcounts: FxHashMap::default(),
            capacity,
        }
    }

    /// Add a holder of `resource`.
    ///
    /// Returns the resource's dense index. The first holder inserts the
    /// resource; later holders only increment its reference count.
    ///
    /// # Errors
    ///
    /// `Error::CapacityExceeded` when inserting a new resource into a
    /// full table. Indices handed out to shaders cannot be grown safely,
    /// so this is fatal rather than recoverable.
    pub fn add(&mut self, id: u32, resource: &Arc<T>) -> Result<u32> {
        if let Some(&index) = self.indices.get(&id) {
            *self
                .refcounts
                .get_mut(&id)
                .expect("refcounts out of sync with indices") += 1;
            return Ok(index);
        }
        // Reject before touching the refcounts: a failed add must leave
        // no trace, or a later remove of the same id would underflow
        if self.entries.len() >= self.capacity {
            engine_warn!(
                "nova3d::RefTable",
                "table '{}' is full ({} entries)",
                self.name,
                self.capacity
            );
            return Err(crate::error::Error::CapacityExceeded {
                table: self.name,
                capacity: self.capacity,
            });
        }
        let index = self.entries.len() as u32;
        self.entries.push((id, Arc::clone(resource)));
        self.indices.insert(id, index);
        self.refcounts.insert(id, 1);
        engine_trace!("nova3d::RefTable", "'{}' added id {} at index {}", self.name, id, index);
        Ok(index)
    }

    /// Drop one holder of the resource.
    ///
    /// Returns `true` when the last holder was dropped and the resource
    /// left the table; every remaining index may have changed, so callers
    /// must refresh anything derived from indices.
    pub fn remove(&mut self, id: u32) -> bool {
        let Some(count) = self.refcounts.get_mut(&id) else {
            engine_warn!("nova3d::RefTable", "'{}' remove of unknown id {}", self.name, id);
            return false;
        };
        *count -= 1;
        if *count > 0 {
            return false;
        }
        self.refcounts.remove(&id);
        let index = self.indices.remove(&id).expect("indices out of sync with refcounts");
        self.entries.remove(index as usize);
        // Re-densify: every entry after the removed one shifts down
        self.indices.clear();
        for (position, (entry_id, _)) in self.entries.iter().enumerate() {
            self.indices.insert(*entry_id, position as u32);
        }
        engine_trace!("nova3d::RefTable", "'{}' removed id {}", self.name, id);
        true
    }

    /// Dense index of a resource, if present
    pub fn index_of(&self, id: u32) -> Option<u32> {
        self.indices.get(&id).copied()
    }

    /// Resource at a dense index
    pub fn get(&self, index: u32) -> Option<&Arc<T>> {
        self.entries.get(index as usize).map(|(_, resource)| resource)
    }

    /// Resources in index order
    pub fn iter(&self) -> impl Iterator<Item = (u32, &Arc<T>)> {
        self.entries
            .iter()
            .enumerate()
            .map(|(index, (_, resource))| (index as u32, resource))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn contains(&self, id: u32) -> bool {
        self.indices.contains_key(&id)
    }

    /// Current holder count of a resource (0 when absent)
    pub fn ref_count(&self, id: u32) -> u32 {
        self.refcounts.get(&id).copied().unwrap_or(0)
    }
}

#[cfg(test)]
#[path = "ref_table_tests.rs"]
mod tests;
