//! Resource lifecycle module
//!
//! Provides reference-counted shader-visible tables, per-slot binding
//! table management and stage-owned frame buffer resources.

pub mod binding_table;
pub mod frame_buffer;
pub mod ref_table;

pub use binding_table::{BindingTableManager, GrowableUniform};
pub use frame_buffer::{
    ColorFrameBuffer, DepthFrameBuffer, FrameBufferResource, ShadowMapFrameBuffer, ShadowMapKind,
};
pub use ref_table::RefTable;
