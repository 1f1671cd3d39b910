//! Scene module
//!
//! Cameras, scene resources, frustum culling and the main color render
//! stage.

pub mod camera;
pub mod frustum;
pub mod resources;
pub mod scene_stage;

pub use camera::{Camera, CameraState};
pub use frustum::Frustum;
pub use resources::{
    next_resource_id, sort_instances_by_mesh, ImageResource, InstanceFlags, Light, LightKind,
    LightState, Material, MaterialParams, Mesh, MeshInstance, NodeEvent, Surface, AABB,
};
pub use scene_stage::{SceneRenderStage, SceneStageShaders};
