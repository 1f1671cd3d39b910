use super::*;
use glam::{Mat4, Vec3};

use crate::scene::resources::AABB;

fn perspective_vp() -> Mat4 {
    let projection = Mat4::perspective_rh(std::f32::consts::FRAC_PI_2, 1.0, 0.1, 100.0);
    let view = Mat4::look_at_rh(Vec3::ZERO, Vec3::NEG_Z, Vec3::Y);
    projection * view
}

fn aabb(center: Vec3, half: f32) -> AABB {
    AABB { min: center - Vec3::splat(half), max: center + Vec3::splat(half) }
}

// ============================================================================
// Plane extraction tests
// ============================================================================

#[test]
fn test_planes_are_normalized() {
    let frustum = Frustum::from_view_projection(&perspective_vp());
    for plane in &frustum.planes {
        let len = Vec3::new(plane.x, plane.y, plane.z).length();
        assert!((len - 1.0).abs() < 1e-4, "plane normal length {}", len);
    }
}

// ============================================================================
// Intersection tests
// ============================================================================

#[test]
fn test_box_in_front_of_camera_intersects() {
    let frustum = Frustum::from_view_projection(&perspective_vp());
    assert!(frustum.intersects_aabb(&aabb(Vec3::new(0.0, 0.0, -10.0), 1.0)));
}

#[test]
fn test_box_behind_camera_rejected() {
    let frustum = Frustum::from_view_projection(&perspective_vp());
    assert!(!frustum.intersects_aabb(&aabb(Vec3::new(0.0, 0.0, 10.0), 1.0)));
}

#[test]
fn test_box_beyond_far_plane_rejected() {
    let frustum = Frustum::from_view_projection(&perspective_vp());
    assert!(!frustum.intersects_aabb(&aabb(Vec3::new(0.0, 0.0, -200.0), 1.0)));
}

#[test]
fn test_box_far_to_the_side_rejected() {
    // 90° horizontal FOV: at z = -10 the frustum is 10 units wide each side
    let frustum = Frustum::from_view_projection(&perspective_vp());
    assert!(!frustum.intersects_aabb(&aabb(Vec3::new(50.0, 0.0, -10.0), 1.0)));
}

#[test]
fn test_box_straddling_near_plane_intersects() {
    let frustum = Frustum::from_view_projection(&perspective_vp());
    assert!(frustum.intersects_aabb(&aabb(Vec3::new(0.0, 0.0, -0.1), 0.5)));
}

#[test]
fn test_orthographic_projection_supported() {
    let projection = Mat4::orthographic_rh(-5.0, 5.0, -5.0, 5.0, 0.1, 50.0);
    let view = Mat4::look_at_rh(Vec3::ZERO, Vec3::NEG_Z, Vec3::Y);
    let frustum = Frustum::from_view_projection(&(projection * view));

    assert!(frustum.intersects_aabb(&aabb(Vec3::new(0.0, 0.0, -10.0), 1.0)));
    assert!(!frustum.intersects_aabb(&aabb(Vec3::new(20.0, 0.0, -10.0), 1.0)));
}
