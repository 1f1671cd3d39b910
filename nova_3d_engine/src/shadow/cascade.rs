/// Shadow projection math: cascaded splits for directional lights, cube
/// faces for omni lights and the widened cone of spot lights
///
/// Cascade fitting slices the camera frustum by a lambda blend of
/// logarithmic and uniform splits, bounds each slice by a sphere and
/// snaps the resulting orthographic window to the shadow texel grid so
/// the map does not shimmer when the camera moves.

use glam::{Mat4, Vec3, Vec4, Vec4Swizzles};

use crate::scene::camera::CameraState;

/// One computed cascade
#[derive(Debug, Clone, Copy)]
pub struct Cascade {
    /// Light projection * view, texel-rounded
    pub light_space: Mat4,
    /// World-space view depth where this cascade ends
    pub split_depth: f32,
}

/// Cascade computer for one directional light
#[derive(Debug, Clone, Copy)]
pub struct CascadeComputer {
    cascade_count: u32,
    /// Blend between logarithmic (1.0) and uniform (0.0) split placement
    lambda: f32,
    /// Shadow map resolution, for texel snapping
    resolution: u32,
}

impl CascadeComputer {
    pub fn new(cascade_count: u32, lambda: f32, resolution: u32) -> Self {
        Self { cascade_count, lambda, resolution }
    }

    pub fn cascade_count(&self) -> u32 {
        self.cascade_count
    }

    /// Compute every cascade for the camera and light direction.
    ///
    /// Deterministic: identical inputs produce identical matrices.
    pub fn compute(&self, camera: &CameraState, light_direction: Vec3) -> Vec<Cascade> {
        let near_clip = camera.near;
        let far_clip = camera.far;
        let clip_range = far_clip - near_clip;
        let min_z = near_clip;
        let max_z = near_clip + clip_range;
        let range = max_z - min_z;
        let ratio = max_z / min_z;

        // Split depths along the view frustum, normalized to 0..1
        let mut cascade_splits = Vec::with_capacity(self.cascade_count as usize);
        for i in 0..self.cascade_count {
            let p = (i + 1) as f32 / self.cascade_count as f32;
            let log = min_z * ratio.powf(p);
            let uniform = min_z + range * p;
            let d = self.lambda * (log - uniform) + uniform;
            cascade_splits.push((d - near_clip) / clip_range);
        }

        let inv_camera = camera.view_projection().inverse();
        let mut cascades = Vec::with_capacity(self.cascade_count as usize);
        let mut last_split_dist = 0.0f32;
        for &split_dist in &cascade_splits {
            // Camera frustum corners, NDC then world space
            let mut corners = [
                Vec3::new(-1.0, 1.0, -1.0),
                Vec3::new(1.0, 1.0, -1.0),
                Vec3::new(1.0, -1.0, -1.0),
                Vec3::new(-1.0, -1.0, -1.0),
                Vec3::new(-1.0, 1.0, 1.0),
                Vec3::new(1.0, 1.0, 1.0),
                Vec3::new(1.0, -1.0, 1.0),
                Vec3::new(-1.0, -1.0, 1.0),
            ];
            for corner in &mut corners {
                let unprojected = inv_camera * corner.extend(1.0);
                *corner = unprojected.xyz() / unprojected.w;
            }

            // Slice the frustum to this cascade's near/far
            for j in 0..4 {
                let dist = corners[j + 4] - corners[j];
                corners[j + 4] = corners[j] + dist * split_dist;
                corners[j] += dist * last_split_dist;
            }

            let mut center = Vec3::ZERO;
            for corner in &corners {
                center += *corner;
            }
            center /= 8.0;

            // Bounding sphere, radius quantized to 1/16 so the ortho
            // window size stays stable across frames
            let mut radius = 0.0f32;
            for corner in &corners {
                radius = radius.max((*corner - center).length());
            }
            radius = (radius * 16.0).ceil() / 16.0;

            // Snap the center to the shadow texel grid
            let resolution = self.resolution as f32;
            let world_units_per_texel = (2.0 * radius) / resolution;
            center.x = (center.x / world_units_per_texel).floor() * world_units_per_texel;
            center.y = (center.y / world_units_per_texel).floor() * world_units_per_texel;
            center.z = (center.z / world_units_per_texel).floor() * world_units_per_texel;

            let max_extents = Vec3::splat(radius);
            let min_extents = -max_extents;
            let depth = max_extents.z - min_extents.z;

            let eye = center - light_direction * -min_extents.z;
            let view = Mat4::look_at_rh(eye, center, Vec3::Y);
            let mut projection = Mat4::orthographic_rh(
                min_extents.x,
                max_extents.x,
                min_extents.y,
                max_extents.y,
                -depth,
                depth,
            );

            // Round the projection of the world origin to a texel, and
            // fold the sub-texel remainder back into the projection
            let shadow_matrix = projection * view;
            let shadow_origin = (shadow_matrix * Vec4::new(0.0, 0.0, 0.0, 1.0)) * (resolution / 2.0);
            let rounded_origin = shadow_origin.round();
            let mut round_offset = (rounded_origin - shadow_origin) * 2.0 / resolution;
            round_offset.z = 0.0;
            round_offset.w = 0.0;
            projection.w_axis += round_offset;

            cascades.push(Cascade {
                light_space: projection * view,
                split_depth: near_clip + split_dist * clip_range,
            });
            last_split_dist = split_dist;
        }
        cascades
    }
}

// ============================================================================
// Omni and spot projections
// ============================================================================

/// Cube face order: +X, -X, +Y, -Y, +Z, -Z
const FACE_TARGETS: [Vec3; 6] = [
    Vec3::new(1.0, 0.0, 0.0),
    Vec3::new(-1.0, 0.0, 0.0),
    Vec3::new(0.0, 1.0, 0.0),
    Vec3::new(0.0, -1.0, 0.0),
    Vec3::new(0.0, 0.0, 1.0),
    Vec3::new(0.0, 0.0, -1.0),
];

const FACE_UPS: [Vec3; 6] = [
    Vec3::new(0.0, -1.0, 0.0),
    Vec3::new(0.0, -1.0, 0.0),
    Vec3::new(0.0, 0.0, 1.0),
    Vec3::new(0.0, 0.0, -1.0),
    Vec3::new(0.0, -1.0, 0.0),
    Vec3::new(0.0, -1.0, 0.0),
];

/// Per-face light-space matrices of an omni light: 90° FOV, square
/// aspect, one matrix per cube face
pub fn omni_face_matrices(position: Vec3, near: f32, range: f32) -> [Mat4; 6] {
    let projection = Mat4::perspective_rh(std::f32::consts::FRAC_PI_2, 1.0, near, range);
    std::array::from_fn(|face| {
        projection * Mat4::look_at_rh(position, position + FACE_TARGETS[face], FACE_UPS[face])
    })
}

/// Light-space matrix of a spot light.
///
/// The projection FOV is the cone angle widened by 1.5 so the shadow
/// map covers the soft outer edge of the cone.
pub fn spot_matrix(position: Vec3, direction: Vec3, fov: f32, near: f32, range: f32) -> Mat4 {
    let projection = Mat4::perspective_rh(fov * 1.5, 1.0, near, range);
    projection * Mat4::look_at_rh(position, position + direction.normalize(), Vec3::Y)
}

#[cfg(test)]
#[path = "cascade_tests.rs"]
mod tests;
