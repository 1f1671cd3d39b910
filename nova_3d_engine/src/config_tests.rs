use super::*;

// ============================================================================
// Default configuration tests
// ============================================================================

#[test]
fn test_default_config_is_valid() {
    let config = EngineConfig::default();
    assert!(config.validate().is_ok());
}

#[test]
fn test_default_values() {
    let config = EngineConfig::default();
    assert_eq!(config.frames_in_flight, 2);
    assert_eq!(config.cascade_count, 4);
    assert_eq!(config.shadow_map_resolution, 4096);
    assert!((config.cascade_split_lambda - 0.95).abs() < f32::EPSILON);
}

// ============================================================================
// Validation tests
// ============================================================================

#[test]
fn test_zero_frames_in_flight_rejected() {
    let config = EngineConfig { frames_in_flight: 0, ..Default::default() };
    assert!(config.validate().is_err());
}

#[test]
fn test_too_many_frames_in_flight_rejected() {
    let config = EngineConfig { frames_in_flight: 4, ..Default::default() };
    assert!(config.validate().is_err());
}

#[test]
fn test_non_power_of_two_shadow_resolution_rejected() {
    let config = EngineConfig { shadow_map_resolution: 1000, ..Default::default() };
    assert!(config.validate().is_err());
}

#[test]
fn test_lambda_out_of_range_rejected() {
    let config = EngineConfig { cascade_split_lambda: 1.5, ..Default::default() };
    assert!(config.validate().is_err());

    let config = EngineConfig { cascade_split_lambda: -0.1, ..Default::default() };
    assert!(config.validate().is_err());
}

#[test]
fn test_cascade_count_beyond_uniform_capacity_rejected() {
    // The per-light uniform holds 4 split depths; more cascades would be
    // computed and then dropped on upload
    let config = EngineConfig { cascade_count: 4, ..Default::default() };
    assert!(config.validate().is_ok());

    let config = EngineConfig { cascade_count: 5, ..Default::default() };
    assert!(config.validate().is_err());

    let config = EngineConfig { cascade_count: 8, ..Default::default() };
    assert!(config.validate().is_err());

    let config = EngineConfig { cascade_count: 0, ..Default::default() };
    assert!(config.validate().is_err());
}

#[test]
fn test_zero_capacity_rejected() {
    let config = EngineConfig { max_images: 0, ..Default::default() };
    assert!(config.validate().is_err());

    let config = EngineConfig { max_shadow_maps: 0, ..Default::default() };
    assert!(config.validate().is_err());
}

#[test]
fn test_zero_scene_update_budget_rejected() {
    let config = EngineConfig { scene_updates_per_frame: 0, ..Default::default() };
    assert!(config.validate().is_err());
}

#[test]
fn test_custom_valid_config() {
    let config = EngineConfig {
        frames_in_flight: 3,
        shadow_map_resolution: 2048,
        cascade_count: 3,
        cascade_split_lambda: 0.5,
        ..Default::default()
    };
    assert!(config.validate().is_ok());
}
