/// Buffer trait and buffer descriptor

use std::any::Any;
use bitflags::bitflags;
use crate::error::Result;

bitflags! {
    /// Buffer usage flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct BufferUsage: u32 {
        /// Uniform buffer readable from shaders
        const UNIFORM = 1 << 0;
        /// Vertex buffer
        const VERTEX = 1 << 1;
        /// Index buffer
        const INDEX = 1 << 2;
        /// Source of a copy
        const TRANSFER_SRC = 1 << 3;
        /// Destination of a copy
        const TRANSFER_DST = 1 << 4;
    }
}

/// Descriptor for creating a buffer
///
/// All buffers created through the core are host-visible and persistently
/// mapped: per-frame uniform data is rewritten every frame, so a staging
/// path would only add copies.
#[derive(Debug, Clone)]
pub struct BufferDesc {
    /// Size in bytes
    pub size: u64,
    /// Usage flags
    pub usage: BufferUsage,
}

/// Index element width for index buffers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexType {
    U16,
    U32,
}

/// Buffer resource trait
///
/// Implemented by backend-specific buffer types (e.g., VulkanBuffer).
/// The buffer is automatically destroyed when dropped.
pub trait Buffer: Send + Sync {
    /// Size in bytes
    fn size(&self) -> u64;

    /// Write bytes at `offset`
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidResource` when the write would run past the
    /// end of the buffer.
    fn write(&self, offset: u64, data: &[u8]) -> Result<()>;

    /// Downcast support for backends and tests
    fn as_any(&self) -> &dyn Any;
}
