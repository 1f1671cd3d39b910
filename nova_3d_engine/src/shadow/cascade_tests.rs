use super::*;
use glam::{Mat4, Vec3, Vec4};

use crate::scene::camera::CameraState;

fn test_camera() -> CameraState {
    let mut state = CameraState::default();
    state.near = 0.5;
    state.far = 100.0;
    state.fov = std::f32::consts::FRAC_PI_3;
    state.projection = Mat4::perspective_rh(state.fov, 16.0 / 9.0, state.near, state.far);
    state.view = Mat4::look_at_rh(Vec3::new(3.0, 5.0, 10.0), Vec3::ZERO, Vec3::Y);
    state
}

const LIGHT_DIR: Vec3 = Vec3::new(-0.5, -1.0, -0.3);

// ============================================================================
// Split placement tests
// ============================================================================

#[test]
fn test_splits_are_monotonic_and_end_at_far() {
    let computer = CascadeComputer::new(4, 0.95, 4096);
    let cascades = computer.compute(&test_camera(), LIGHT_DIR.normalize());

    assert_eq!(cascades.len(), 4);
    let mut previous = test_camera().near;
    for cascade in &cascades {
        assert!(cascade.split_depth > previous, "split depths must increase");
        previous = cascade.split_depth;
    }
    assert!((cascades[3].split_depth - 100.0).abs() < 0.01);
}

#[test]
fn test_lambda_zero_gives_uniform_splits() {
    let camera = test_camera();
    let computer = CascadeComputer::new(4, 0.0, 4096);
    let cascades = computer.compute(&camera, LIGHT_DIR.normalize());

    let step = (camera.far - camera.near) / 4.0;
    for (i, cascade) in cascades.iter().enumerate() {
        let expected = camera.near + step * (i + 1) as f32;
        assert!(
            (cascade.split_depth - expected).abs() < 0.01,
            "cascade {} split {} expected {}",
            i,
            cascade.split_depth,
            expected
        );
    }
}

#[test]
fn test_lambda_pulls_near_splits_closer() {
    let camera = test_camera();
    let uniform = CascadeComputer::new(4, 0.0, 4096).compute(&camera, LIGHT_DIR.normalize());
    let log = CascadeComputer::new(4, 0.95, 4096).compute(&camera, LIGHT_DIR.normalize());

    // Logarithmic placement spends more resolution near the camera
    assert!(log[0].split_depth < uniform[0].split_depth);
    assert!(log[1].split_depth < uniform[1].split_depth);
}

#[test]
fn test_single_cascade_covers_whole_range() {
    let camera = test_camera();
    let cascades = CascadeComputer::new(1, 0.5, 2048).compute(&camera, LIGHT_DIR.normalize());
    assert_eq!(cascades.len(), 1);
    assert!((cascades[0].split_depth - camera.far).abs() < 0.01);
}

// ============================================================================
// Projection tests
// ============================================================================

#[test]
fn test_camera_target_lands_inside_first_cascades() {
    // The camera looks at the origin; the origin is well within the far
    // plane, so some cascade must cover it
    let camera = test_camera();
    let cascades = CascadeComputer::new(4, 0.95, 4096).compute(&camera, LIGHT_DIR.normalize());

    let covered = cascades.iter().any(|cascade| {
        let clip = cascade.light_space * Vec4::new(0.0, 0.0, 0.0, 1.0);
        let ndc = clip / clip.w;
        ndc.x.abs() <= 1.0 && ndc.y.abs() <= 1.0 && (0.0..=1.0).contains(&ndc.z)
    });
    assert!(covered, "scene center not covered by any cascade");
}

#[test]
fn test_world_origin_projects_onto_texel_grid() {
    // Texel rounding: the world origin must land within rounding error of
    // a texel corner in shadow map space
    let resolution = 4096u32;
    let cascades =
        CascadeComputer::new(4, 0.95, resolution).compute(&test_camera(), LIGHT_DIR.normalize());

    for cascade in &cascades {
        let origin = (cascade.light_space * Vec4::new(0.0, 0.0, 0.0, 1.0))
            * (resolution as f32 / 2.0);
        for value in [origin.x, origin.y] {
            let frac = (value - value.round()).abs();
            assert!(frac < 1e-2, "origin coordinate {} is {} off the texel grid", value, frac);
        }
    }
}

#[test]
fn test_compute_is_deterministic() {
    let computer = CascadeComputer::new(4, 0.95, 4096);
    let camera = test_camera();
    let a = computer.compute(&camera, LIGHT_DIR.normalize());
    let b = computer.compute(&camera, LIGHT_DIR.normalize());
    for (x, y) in a.iter().zip(b.iter()) {
        assert_eq!(x.light_space, y.light_space);
        assert_eq!(x.split_depth, y.split_depth);
    }
}

// ============================================================================
// Omni / spot tests
// ============================================================================

#[test]
fn test_omni_faces_look_down_each_axis() {
    let position = Vec3::new(2.0, 3.0, 4.0);
    let matrices = omni_face_matrices(position, 0.1, 20.0);

    // A point along each face's axis projects to the center of that face
    let offsets = [
        Vec3::X * 5.0,
        Vec3::NEG_X * 5.0,
        Vec3::Y * 5.0,
        Vec3::NEG_Y * 5.0,
        Vec3::Z * 5.0,
        Vec3::NEG_Z * 5.0,
    ];
    for (face, offset) in offsets.iter().enumerate() {
        let clip = matrices[face] * (position + *offset).extend(1.0);
        let ndc = clip / clip.w;
        assert!(ndc.x.abs() < 1e-4, "face {} x = {}", face, ndc.x);
        assert!(ndc.y.abs() < 1e-4, "face {} y = {}", face, ndc.y);
        assert!((0.0..=1.0).contains(&ndc.z), "face {} z = {}", face, ndc.z);
    }
}

#[test]
fn test_omni_faces_are_distinct() {
    let matrices = omni_face_matrices(Vec3::ZERO, 0.1, 20.0);
    for i in 0..6 {
        for j in (i + 1)..6 {
            assert_ne!(matrices[i], matrices[j], "faces {} and {}", i, j);
        }
    }
}

#[test]
fn test_spot_projection_covers_widened_cone() {
    let fov = std::f32::consts::FRAC_PI_4;
    let matrix = spot_matrix(Vec3::ZERO, Vec3::NEG_Z, fov, 0.1, 30.0);

    // A point on the original cone edge sits inside the widened frustum
    let half = fov / 2.0;
    let edge = Vec3::new(0.0, half.tan() * 10.0, -10.0);
    let clip = matrix * edge.extend(1.0);
    let ndc = clip / clip.w;
    assert!(ndc.y.abs() < 1.0, "cone edge outside the shadow frustum: {}", ndc.y);

    // A point well outside 1.5x the cone falls outside
    let outside = Vec3::new(0.0, (fov * 1.2).tan() * 10.0, -10.0);
    let clip = matrix * outside.extend(1.0);
    let ndc = clip / clip.w;
    assert!(ndc.y.abs() > 1.0);
}
