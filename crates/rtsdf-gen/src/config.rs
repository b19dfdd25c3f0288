// Fixed distance-field parameters, shared by every generation.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FieldConfig {
    /// Total distance span encoded in the field, in field pixels.
    /// Every bitmap gets `pixel_range / 2` texels of margin on each side.
    #[serde(default = "default_pixel_range")]
    pub pixel_range: f32,
    /// Store inside as low values instead of high ones.
    #[serde(default)]
    pub invert_distance: bool,
    /// Direction change (radians) below which a joint counts as smooth for
    /// multi-channel edge coloring.
    #[serde(default = "default_corner_angle_threshold")]
    pub corner_angle_threshold: f32,
    #[serde(default)]
    pub coloring_seed: u64,
    /// Line segments used to approximate each curve.
    #[serde(default = "default_curve_subdivisions")]
    pub curve_subdivisions: u32,
}

fn default_pixel_range() -> f32 {
    4.0
}

fn default_corner_angle_threshold() -> f32 {
    3.0
}

fn default_curve_subdivisions() -> u32 {
    8
}

impl Default for FieldConfig {
    fn default() -> Self {
        Self {
            pixel_range: default_pixel_range(),
            invert_distance: false,
            corner_angle_threshold: default_corner_angle_threshold(),
            coloring_seed: 0,
            curve_subdivisions: default_curve_subdivisions(),
        }
    }
}

impl FieldConfig {
    /// Margin in field pixels added around the glyph bounds.
    pub fn margin(&self) -> f32 {
        self.pixel_range * 0.5
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_fills_defaults() {
        let config: FieldConfig = serde_json::from_str(r#"{ "pixel_range": 8.0 }"#).unwrap();
        assert_eq!(config.pixel_range, 8.0);
        assert_eq!(config.curve_subdivisions, 8);
        assert!(!config.invert_distance);
        assert_eq!(config.margin(), 4.0);
    }
}
