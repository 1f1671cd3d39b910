use super::*;
use glam::{Mat4, Vec3, Vec4};

#[test]
fn test_default_state() {
    let state = CameraState::default();
    assert_eq!(state.view, Mat4::IDENTITY);
    assert_eq!(state.projection, Mat4::IDENTITY);
    assert!(state.near < state.far);
}

#[test]
fn test_view_projection_order() {
    let mut state = CameraState::default();
    state.view = Mat4::from_translation(Vec3::new(0.0, 0.0, -5.0));
    state.projection = Mat4::perspective_rh(1.0, 1.0, 0.1, 100.0);

    let vp = state.view_projection();
    // projection * view: the translation must pass through the projection
    let expected = state.projection * state.view;
    assert_eq!(vp, expected);
}

#[test]
fn test_state_snapshot_is_updatable() {
    let camera = Camera::new(CameraState::default());
    let mut state = camera.state();
    state.position = Vec3::new(1.0, 2.0, 3.0);
    state.far = 500.0;
    camera.set_state(state);

    let read_back = camera.state();
    assert_eq!(read_back.position, Vec3::new(1.0, 2.0, 3.0));
    assert_eq!(read_back.far, 500.0);
}

#[test]
fn test_cameras_get_unique_ids() {
    let a = Camera::new(CameraState::default());
    let b = Camera::new(CameraState::default());
    assert_ne!(a.id, b.id);
}

#[test]
fn test_frustum_from_state() {
    let mut state = CameraState::default();
    state.projection = Mat4::perspective_rh(std::f32::consts::FRAC_PI_2, 1.0, 0.1, 100.0);
    let frustum = state.frustum();

    // A point straight ahead lies inside every plane
    let point = Vec4::new(0.0, 0.0, -10.0, 1.0);
    for plane in &frustum.planes {
        assert!(plane.dot(point) >= 0.0);
    }
}
