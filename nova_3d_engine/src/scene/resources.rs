/// Scene resources - meshes, materials, images, lights and the node events
/// that carry them into the render stages
///
/// Resources are passive data owned by the caller and shared with the
/// render stages through `Arc`. Stages never create scene content; they
/// receive it through `NodeEvent` dispatch and index it into their GPU
/// tables.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use bitflags::bitflags;
use glam::{Mat4, Vec3, Vec4};

use crate::gpu::buffer::Buffer;

static NEXT_RESOURCE_ID: AtomicU32 = AtomicU32::new(1);

/// Process-unique id for scene resources (images, materials, meshes,
/// instances, lights)
pub fn next_resource_id() -> u32 {
    NEXT_RESOURCE_ID.fetch_add(1, Ordering::Relaxed)
}

// ============================================================================
// AABB
// ============================================================================

/// Axis-aligned bounding box in local space
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AABB {
    /// Minimum corner (x, y, z)
    pub min: Vec3,
    /// Maximum corner (x, y, z)
    pub max: Vec3,
}

impl AABB {
    /// Transform this local-space AABB by a matrix, returning a new AABB.
    ///
    /// Uses the Arvo method: projects each matrix axis onto the AABB extents
    /// for an exact (tight) result without transforming all 8 corners.
    pub fn transformed(&self, matrix: &Mat4) -> AABB {
        let translation = matrix.col(3).truncate();
        let mut new_min = translation;
        let mut new_max = translation;

        for i in 0..3 {
            let axis = matrix.col(i).truncate();
            let a = axis * self.min[i];
            let b = axis * self.max[i];
            new_min += a.min(b);
            new_max += a.max(b);
        }

        AABB { min: new_min, max: new_max }
    }
}

// ============================================================================
// Images
// ============================================================================

/// A sampled image: texture + full view + sampler, ready for a
/// shader-visible texture table slot
pub struct ImageResource {
    pub id: u32,
    pub texture: Arc<dyn crate::gpu::texture::Texture>,
    pub view: Arc<dyn crate::gpu::texture::TextureView>,
    pub sampler: Arc<dyn crate::gpu::texture::Sampler>,
}

impl ImageResource {
    pub fn new(
        texture: Arc<dyn crate::gpu::texture::Texture>,
        view: Arc<dyn crate::gpu::texture::TextureView>,
        sampler: Arc<dyn crate::gpu::texture::Sampler>,
    ) -> Self {
        Self { id: next_resource_id(), texture, view, sampler }
    }
}

// ============================================================================
// Materials
// ============================================================================

/// Mutable shading parameters of a material
#[derive(Debug, Clone, Copy)]
pub struct MaterialParams {
    pub albedo_color: Vec4,
    pub metallic: f32,
    pub roughness: f32,
    /// Scale applied to the normal-map perturbation
    pub normal_scale: f32,
}

impl Default for MaterialParams {
    fn default() -> Self {
        Self {
            albedo_color: Vec4::ONE,
            metallic: 0.0,
            roughness: 1.0,
            normal_scale: 1.0,
        }
    }
}

/// A material shared between surfaces
///
/// Parameter mutations set the dirty flag; the scene stage uploads only
/// dirty materials each frame and clears the flag afterwards.
pub struct Material {
    pub id: u32,
    params: Mutex<MaterialParams>,
    pub albedo_image: Option<Arc<ImageResource>>,
    pub normal_image: Option<Arc<ImageResource>>,
    dirty: AtomicBool,
}

impl Material {
    pub fn new(
        params: MaterialParams,
        albedo_image: Option<Arc<ImageResource>>,
        normal_image: Option<Arc<ImageResource>>,
    ) -> Self {
        Self {
            id: next_resource_id(),
            params: Mutex::new(params),
            albedo_image,
            normal_image,
            // New materials always need their first upload
            dirty: AtomicBool::new(true),
        }
    }

    pub fn params(&self) -> MaterialParams {
        *self.params.lock().unwrap()
    }

    pub fn set_params(&self, params: MaterialParams) {
        *self.params.lock().unwrap() = params;
        self.dirty.store(true, Ordering::Release);
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    pub fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::Release);
    }

    pub fn clear_dirty(&self) {
        self.dirty.store(false, Ordering::Release);
    }
}

// ============================================================================
// Meshes
// ============================================================================

/// One drawable index range of a mesh, bound to a material
#[derive(Clone)]
pub struct Surface {
    pub first_index: u32,
    pub index_count: u32,
    pub vertex_offset: i32,
    pub material: Arc<Material>,
}

/// Geometry shared between instances
pub struct Mesh {
    pub id: u32,
    pub vertex_buffer: Arc<dyn Buffer>,
    pub index_buffer: Arc<dyn Buffer>,
    pub surfaces: Vec<Surface>,
    pub aabb: AABB,
}

impl Mesh {
    pub fn new(
        vertex_buffer: Arc<dyn Buffer>,
        index_buffer: Arc<dyn Buffer>,
        surfaces: Vec<Surface>,
        aabb: AABB,
    ) -> crate::error::Result<Self> {
        if surfaces.is_empty() {
            crate::engine_bail!(
                "nova3d::Scene",
                ContractViolation,
                "mesh created with no surfaces"
            );
        }
        Ok(Self { id: next_resource_id(), vertex_buffer, index_buffer, surfaces, aabb })
    }
}

// ============================================================================
// Mesh instances
// ============================================================================

bitflags! {
    /// Per-instance rendering flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct InstanceFlags: u32 {
        const VISIBLE     = 1 << 0;
        const CAST_SHADOW = 1 << 1;
        const OUTLINED    = 1 << 2;
    }
}

/// A placed mesh in the scene
pub struct MeshInstance {
    pub id: u32,
    pub mesh: Arc<Mesh>,
    transform: Mutex<Mat4>,
    flags: Mutex<InstanceFlags>,
    /// Material used by the outline sub-pass when `OUTLINED` is set
    pub outline_material: Option<Arc<Material>>,
}

impl MeshInstance {
    pub fn new(mesh: Arc<Mesh>, transform: Mat4) -> Self {
        Self {
            id: next_resource_id(),
            mesh,
            transform: Mutex::new(transform),
            flags: Mutex::new(InstanceFlags::VISIBLE | InstanceFlags::CAST_SHADOW),
            outline_material: None,
        }
    }

    pub fn with_outline(mesh: Arc<Mesh>, transform: Mat4, outline_material: Arc<Material>) -> Self {
        let instance = Self::new(mesh, transform);
        instance.set_flags(
            InstanceFlags::VISIBLE | InstanceFlags::CAST_SHADOW | InstanceFlags::OUTLINED,
        );
        Self { outline_material: Some(outline_material), ..instance }
    }

    pub fn transform(&self) -> Mat4 {
        *self.transform.lock().unwrap()
    }

    pub fn set_transform(&self, transform: Mat4) {
        *self.transform.lock().unwrap() = transform;
    }

    pub fn flags(&self) -> InstanceFlags {
        *self.flags.lock().unwrap()
    }

    pub fn set_flags(&self, flags: InstanceFlags) {
        *self.flags.lock().unwrap() = flags;
    }

    pub fn is_visible(&self) -> bool {
        self.flags().contains(InstanceFlags::VISIBLE)
    }

    pub fn casts_shadow(&self) -> bool {
        self.flags().contains(InstanceFlags::CAST_SHADOW)
    }

    pub fn is_outlined(&self) -> bool {
        self.flags().contains(InstanceFlags::OUTLINED)
    }

    /// World-space bounds under the current transform
    pub fn world_aabb(&self) -> AABB {
        self.mesh.aabb.transformed(&self.transform())
    }
}

// ============================================================================
// Lights
// ============================================================================

/// Kind of light source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LightKind {
    /// Infinitely distant, direction only; shadows use cascaded maps
    Directional,
    /// Point light radiating in all directions; shadows use a 6-face cubemap
    Omni,
    /// Cone light; shadows use a single perspective map
    Spot,
}

/// Mutable state of a light
#[derive(Debug, Clone, Copy)]
pub struct LightState {
    pub position: Vec3,
    pub direction: Vec3,
    /// RGB color, w = intensity
    pub color: Vec4,
    /// Maximum reach in world units (omni and spot)
    pub range: f32,
    /// Near clip distance of the light's shadow projection
    pub near: f32,
    /// Inner cone angle cosine (spot)
    pub cut_off: f32,
    /// Outer cone angle cosine (spot)
    pub outer_cut_off: f32,
    pub visible: bool,
}

impl Default for LightState {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            direction: Vec3::NEG_Z,
            color: Vec4::ONE,
            range: 10.0,
            near: 0.1,
            cut_off: 0.9659258, // cos(15°)
            outer_cut_off: 0.9396926, // cos(20°)
            visible: true,
        }
    }
}

/// A light source in the scene
pub struct Light {
    pub id: u32,
    pub kind: LightKind,
    state: Mutex<LightState>,
    pub cast_shadows: bool,
}

impl Light {
    pub fn new(kind: LightKind, state: LightState, cast_shadows: bool) -> Self {
        Self { id: next_resource_id(), kind, state: Mutex::new(state), cast_shadows }
    }

    pub fn state(&self) -> LightState {
        *self.state.lock().unwrap()
    }

    pub fn set_state(&self, state: LightState) {
        *self.state.lock().unwrap() = state;
    }
}

/// Sort instances by mesh id so consecutive draws share vertex and index
/// buffers and binds are minimized
pub fn sort_instances_by_mesh(instances: &mut Vec<Arc<MeshInstance>>) {
    use rdst::{RadixKey, RadixSort};

    #[derive(Clone, Copy)]
    struct MeshOrder {
        key: u32,
        position: u32,
    }

    impl RadixKey for MeshOrder {
        const LEVELS: usize = 4;

        #[inline]
        fn get_level(&self, level: usize) -> u8 {
            (self.key >> (level * 8)) as u8
        }
    }

    let mut orders: Vec<MeshOrder> = instances
        .iter()
        .enumerate()
        .map(|(position, instance)| MeshOrder {
            key: instance.mesh.id,
            position: position as u32,
        })
        .collect();
    orders.radix_sort_unstable();
    let sorted = orders
        .iter()
        .map(|order| Arc::clone(&instances[order.position as usize]))
        .collect();
    *instances = sorted;
}

// ============================================================================
// Node events
// ============================================================================

/// A scene mutation dispatched to every render stage
///
/// Events are queued by the caller and drained by the frame scheduler at
/// the start of each frame, bounded by the per-frame update budget.
#[derive(Clone)]
pub enum NodeEvent {
    MeshAdded(Arc<MeshInstance>),
    MeshRemoved(Arc<MeshInstance>),
    LightAdded(Arc<Light>),
    LightRemoved(Arc<Light>),
    CameraActivated(Arc<super::camera::Camera>),
}

#[cfg(test)]
#[path = "resources_tests.rs"]
mod tests;
