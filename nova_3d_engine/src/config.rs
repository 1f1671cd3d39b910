//! Engine configuration
//!
//! All fixed capacities and tuning values consumed by the frame scheduler,
//! the render stages and the shadow cascade computer live here. Capacities
//! are a startup-time contract: the binding tables expose fixed-size
//! shader-visible arrays, so exceeding a capacity at runtime is fatal.

use crate::error::{Error, Result};

/// Engine configuration
///
/// Create with `EngineConfig::default()` and override fields as needed,
/// then pass to the graphics device and the frame scheduler at startup.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Number of frames the CPU may record ahead of the GPU (frame slots)
    pub frames_in_flight: usize,

    /// Shadow map width/height in texels (square maps)
    pub shadow_map_resolution: u32,

    /// Number of cascades for directional-light shadow maps (1..=4)
    pub cascade_count: u32,

    /// Blend factor between logarithmic and uniform cascade splits
    /// (0.0 = fully uniform, 1.0 = fully logarithmic)
    pub cascade_split_lambda: f32,

    /// Maximum distinct images bound to the shader-visible texture array
    pub max_images: usize,

    /// Maximum distinct materials in the materials uniform array
    pub max_materials: usize,

    /// Maximum simultaneously active lights
    pub max_lights: usize,

    /// Maximum simultaneous shadow-casting lights
    pub max_shadow_maps: usize,

    /// Constant depth bias applied during shadow-map rendering
    pub depth_bias_constant: f32,

    /// Slope-scaled depth bias applied during shadow-map rendering
    pub depth_bias_slope: f32,

    /// Maximum deferred scene mutations (node add/remove) applied per frame
    pub scene_updates_per_frame: usize,

    /// Clear color for the scene color attachment (RGBA)
    pub clear_color: [f32; 4],
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            frames_in_flight: 2,
            shadow_map_resolution: 4096,
            cascade_count: 4,
            cascade_split_lambda: 0.95,
            max_images: 200,
            max_materials: 200,
            max_lights: 100,
            max_shadow_maps: 10,
            depth_bias_constant: 1.25,
            depth_bias_slope: 1.75,
            scene_updates_per_frame: 100,
            clear_color: [0.0, 0.0, 0.0, 1.0],
        }
    }
}

impl EngineConfig {
    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns `Error::InitializationFailed` when a value is outside its
    /// supported range.
    pub fn validate(&self) -> Result<()> {
        if !(1..=3).contains(&self.frames_in_flight) {
            return Err(Error::InitializationFailed(format!(
                "frames_in_flight must be 1..=3, got {}",
                self.frames_in_flight
            )));
        }
        if self.shadow_map_resolution == 0 || !self.shadow_map_resolution.is_power_of_two() {
            return Err(Error::InitializationFailed(format!(
                "shadow_map_resolution must be a non-zero power of two, got {}",
                self.shadow_map_resolution
            )));
        }
        // The per-light uniform carries at most 4 split depths, so more
        // cascades would be computed and then silently dropped
        if !(1..=4).contains(&self.cascade_count) {
            return Err(Error::InitializationFailed(format!(
                "cascade_count must be 1..=4, got {}",
                self.cascade_count
            )));
        }
        if !(0.0..=1.0).contains(&self.cascade_split_lambda) {
            return Err(Error::InitializationFailed(format!(
                "cascade_split_lambda must be within 0.0..=1.0, got {}",
                self.cascade_split_lambda
            )));
        }
        if self.max_images == 0
            || self.max_materials == 0
            || self.max_lights == 0
            || self.max_shadow_maps == 0
        {
            return Err(Error::InitializationFailed(
                "capacities (images, materials, lights, shadow maps) must be non-zero".to_string(),
            ));
        }
        if self.scene_updates_per_frame == 0 {
            return Err(Error::InitializationFailed(
                "scene_updates_per_frame must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
