// ============================================================================
// config.rs — slimetrail
// Simulation parameters (hot-reloadable), session sizing (restart-only) and
// the JSON scene file consumed by the hosts.
// ============================================================================

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::SimError;

/// Largest sensor window side; bounds the per-agent sampling loop.
pub const MAX_SENSOR_SIZE: f32 = 32.0;

/// The externally tunable 8-tuple. Every field can change between frames
/// without recreating any stage.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimParams {
    pub decay_rate: f32,
    pub diffusion_rate: f32,
    pub move_speed: f32,
    pub turn_speed: f32,
    pub sensor_distance: f32,
    /// Side of the square sampling window, in cells.
    pub sensor_size: f32,
    /// Offset of the left/right sensors from the heading, in radians.
    pub sensor_angle: f32,
    pub attraction_strength: f32,
}

impl Default for SimParams {
    fn default() -> Self {
        Self {
            decay_rate: 0.965,
            diffusion_rate: 0.35,
            move_speed: 0.0035,
            turn_speed: 0.2,
            sensor_distance: 0.0035,
            sensor_size: 1.0,
            sensor_angle: 0.43,
            attraction_strength: 1.0,
        }
    }
}

impl SimParams {
    /// Packs the tuple in the order the device uniform expects.
    pub fn to_array(&self) -> [f32; 8] {
        [
            self.decay_rate,
            self.diffusion_rate,
            self.move_speed,
            self.turn_speed,
            self.sensor_distance,
            self.sensor_size,
            self.sensor_angle,
            self.attraction_strength,
        ]
    }

    pub fn validate(&self) -> Result<(), SimError> {
        let named = [
            ("decay_rate", self.decay_rate),
            ("diffusion_rate", self.diffusion_rate),
            ("move_speed", self.move_speed),
            ("turn_speed", self.turn_speed),
            ("sensor_distance", self.sensor_distance),
            ("sensor_size", self.sensor_size),
            ("sensor_angle", self.sensor_angle),
            ("attraction_strength", self.attraction_strength),
        ];
        for (name, value) in named {
            if !value.is_finite() {
                return Err(SimError::InvalidConfig(format!("{name} must be finite, got {value}")));
            }
            if value < 0.0 {
                return Err(SimError::InvalidConfig(format!("{name} must be >= 0, got {value}")));
            }
        }
        if self.decay_rate > 1.0 {
            return Err(SimError::InvalidConfig(format!(
                "decay_rate must be in [0, 1], got {}",
                self.decay_rate
            )));
        }
        if self.diffusion_rate > 1.0 {
            return Err(SimError::InvalidConfig(format!(
                "diffusion_rate must be in [0, 1], got {}",
                self.diffusion_rate
            )));
        }
        if self.sensor_size > MAX_SENSOR_SIZE {
            return Err(SimError::InvalidConfig(format!(
                "sensor_size must be <= {MAX_SENSOR_SIZE}, got {}",
                self.sensor_size
            )));
        }
        Ok(())
    }
}

/// Sizing of one session. Changing any of `width`, `height` or `population`
/// means tearing down and recreating both stores.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub width: u32,
    pub height: u32,
    pub population: u32,
    /// Fixed seed for agent initialisation; `None` draws from entropy.
    pub seed: Option<u64>,
    pub params: SimParams,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            width: 1000,
            height: 1000,
            population: 50_000,
            seed: None,
            params: SimParams::default(),
        }
    }
}

impl SimConfig {
    pub fn total_cells(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Bytes of one `f32` field at this size, saturating.
    pub fn field_bytes(&self) -> u64 {
        (self.total_cells() as u64).saturating_mul(std::mem::size_of::<f32>() as u64)
    }

    pub fn validate(&self) -> Result<(), SimError> {
        // A 1-cell deposit margin on each side must still leave an interior.
        if self.width < 3 || self.height < 3 {
            return Err(SimError::InvalidConfig(format!(
                "field must be at least 3x3, got {}x{}",
                self.width, self.height
            )));
        }
        if self.population == 0 {
            return Err(SimError::InvalidConfig("population must be at least 1".into()));
        }
        self.params.validate()
    }

    /// True when moving from `self` to `other` requires a full restart.
    pub fn needs_restart(&self, other: &SimConfig) -> bool {
        self.width != other.width
            || self.height != other.height
            || self.population != other.population
            || self.seed != other.seed
    }
}

/// Everything a host needs to stand up a session plus its input providers.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneConfig {
    pub simulation: SimConfig,
    /// Greyscale image rasterised into the attraction field.
    pub attractor_image: Option<PathBuf>,
    /// Explicit boxes in normalized [-1, 1] space, `[x1, y1, x2, y2]`.
    pub points_of_interest: Vec<[f32; 4]>,
    /// Derive a single box enclosing the lit part of the attractor image.
    pub auto_points_of_interest: bool,
    /// Frames between diagnostics samples; 0 disables them.
    pub metrics_interval: u32,
}

impl SceneConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SimError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let scene: SceneConfig = serde_json::from_str(&content)?;
        scene.simulation.validate()?;
        log::info!("Loaded scene from {:?}", path);
        Ok(scene)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        SimConfig::default().validate().unwrap();
    }

    #[test]
    fn rejects_out_of_range_params() {
        let mut params = SimParams::default();
        params.decay_rate = 1.5;
        assert!(params.validate().is_err());

        let mut params = SimParams::default();
        params.move_speed = f32::NAN;
        assert!(params.validate().is_err());

        let mut params = SimParams::default();
        params.sensor_size = 100.0;
        assert!(params.validate().is_err());
    }

    #[test]
    fn rejects_degenerate_sizes() {
        let config = SimConfig {
            width: 2,
            ..SimConfig::default()
        };
        assert!(config.validate().is_err());

        let config = SimConfig {
            population: 0,
            ..SimConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn param_change_does_not_need_restart() {
        let a = SimConfig::default();
        let mut b = a.clone();
        b.params.turn_speed = 0.9;
        assert!(!a.needs_restart(&b));
        b.population += 1;
        assert!(a.needs_restart(&b));
    }

    #[test]
    fn scene_json_fills_missing_fields_with_defaults() {
        let scene: SceneConfig =
            serde_json::from_str(r#"{ "simulation": { "width": 64, "params": { "turn_speed": 0.5 } } }"#)
                .unwrap();
        assert_eq!(scene.simulation.width, 64);
        assert_eq!(scene.simulation.height, 1000);
        assert_eq!(scene.simulation.params.turn_speed, 0.5);
        assert_eq!(scene.simulation.params.decay_rate, 0.965);
        assert!(scene.points_of_interest.is_empty());
    }

    #[test]
    fn bundled_demo_scene_loads() {
        let scene = SceneConfig::load(concat!(env!("CARGO_MANIFEST_DIR"), "/scenes/demo.json")).unwrap();
        assert_eq!((scene.simulation.width, scene.simulation.height), (800, 600));
        assert_eq!(scene.simulation.seed, Some(42));
        assert_eq!(scene.points_of_interest, vec![[-0.6, -0.3, 0.6, 0.3]]);
    }
}
