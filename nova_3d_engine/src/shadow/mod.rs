//! Shadow mapping module
//!
//! Provides cascade/omni/spot shadow projection math and the render
//! stage that draws per-light shadow maps.

pub mod cascade;
pub mod shadow_stage;

pub use cascade::{omni_face_matrices, spot_matrix, Cascade, CascadeComputer};
pub use shadow_stage::{ShadowMapStage, ShadowStageShaders, MAX_SHADOW_PASSES};
