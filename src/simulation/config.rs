//! Simulation configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::error::SimulationError;
use super::kernel::GROUP_SIZE;

/// Which kernel backend drives the simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SimulationBackend {
    /// Prefer GPU; if GPU init fails, fall back to CPU.
    Auto,
    /// Require GPU (fail if unavailable).
    GpuOnly,
    /// Force CPU implementation.
    CpuOnly,
}

impl Default for SimulationBackend {
    fn default() -> Self {
        Self::Auto
    }
}

/// The single water source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WaterSourceConfig {
    /// Water added per second at the source center.
    pub amount: f32,
    /// Source radius in normalized grid space (fraction of the terrain extent).
    pub radius: f32,
}

impl Default for WaterSourceConfig {
    fn default() -> Self {
        Self {
            amount: 1.0,
            radius: 0.05,
        }
    }
}

/// Physical constants forwarded to the kernel every step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicsConfig {
    pub water_density: f32,
    pub gravity: f32,
    /// Edge length of one cell.
    pub grid_size: f32,
    pub sand_dissolve_coefficient: f32,
    pub soil_dissolve_coefficient: f32,
    pub stone_dissolve_coefficient: f32,
    /// Multiplier applied to the frame delta time.
    pub delta_time_scale: f32,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            water_density: 1.0,
            gravity: 9.81,
            grid_size: 1.0,
            sand_dissolve_coefficient: 0.3,
            soil_dissolve_coefficient: 0.1,
            stone_dissolve_coefficient: 0.01,
            delta_time_scale: 1.0,
        }
    }
}

/// Everything needed to set up a simulation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Terrain extent along X in world units.
    pub terrain_width: f32,
    /// Terrain extent along Z in world units.
    pub terrain_length: f32,
    /// Cells along X; should be a multiple of 8.
    pub subdivisions_x: u32,
    /// Cells along Z; should be a multiple of 8.
    pub subdivisions_z: u32,
    /// Number of frames a driver runs.
    pub step_count: u32,
    /// Kernel steps per presented frame.
    pub steps_per_frame: u32,
    /// Initial value of the water height textures.
    pub water_texture_initial: f32,
    pub backend: SimulationBackend,
    pub source: WaterSourceConfig,
    pub physics: PhysicsConfig,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            terrain_width: 128.0,
            terrain_length: 128.0,
            subdivisions_x: 512,
            subdivisions_z: 512,
            step_count: 10,
            steps_per_frame: 20,
            water_texture_initial: 0.0,
            backend: SimulationBackend::default(),
            source: WaterSourceConfig::default(),
            physics: PhysicsConfig::default(),
        }
    }
}

impl SimulationConfig {
    /// Loads a configuration from a JSON file. Missing fields take their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self, SimulationError> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        Ok(config)
    }

    /// Checks the configuration before any resource is allocated.
    ///
    /// Subdivisions that are not multiples of the 8x8 work group are accepted, but
    /// the trailing cells are never dispatched; a warning is logged.
    pub fn validate(&self) -> Result<(), SimulationError> {
        if self.subdivisions_x == 0 || self.subdivisions_z == 0 {
            return Err(SimulationError::InvalidArgument(format!(
                "subdivisions must be positive (got {}x{})",
                self.subdivisions_x, self.subdivisions_z
            )));
        }
        if self.subdivisions_x > i32::MAX as u32 || self.subdivisions_z > i32::MAX as u32 {
            return Err(SimulationError::InvalidArgument(format!(
                "subdivisions {}x{} exceed the parameter block range",
                self.subdivisions_x, self.subdivisions_z
            )));
        }
        if !(self.terrain_width > 0.0 && self.terrain_length > 0.0) {
            return Err(SimulationError::InvalidArgument(format!(
                "terrain extent must be positive (got {}x{})",
                self.terrain_width, self.terrain_length
            )));
        }
        if self.steps_per_frame == 0 {
            return Err(SimulationError::InvalidArgument(
                "steps_per_frame must be at least 1".to_string(),
            ));
        }
        if self.subdivisions_x < GROUP_SIZE || self.subdivisions_z < GROUP_SIZE {
            return Err(SimulationError::InvalidArgument(format!(
                "subdivisions {}x{} are smaller than one {}x{} work group",
                self.subdivisions_x, self.subdivisions_z, GROUP_SIZE, GROUP_SIZE
            )));
        }
        if self.subdivisions_x % GROUP_SIZE != 0 || self.subdivisions_z % GROUP_SIZE != 0 {
            log::warn!(
                "subdivisions {}x{} are not multiples of {}; edge cells will not be simulated",
                self.subdivisions_x,
                self.subdivisions_z,
                GROUP_SIZE
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = SimulationConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.subdivisions_x, 512);
        assert_eq!(config.steps_per_frame, 20);
    }

    #[test]
    fn test_rejects_zero_subdivisions() {
        let config = SimulationConfig {
            subdivisions_z: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(SimulationError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_rejects_zero_steps_per_frame() {
        let config = SimulationConfig {
            steps_per_frame: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_non_multiple_of_group_is_accepted() {
        let config = SimulationConfig {
            subdivisions_x: 20,
            subdivisions_z: 16,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_json_round_trip() {
        let config = SimulationConfig {
            subdivisions_x: 64,
            subdivisions_z: 32,
            backend: SimulationBackend::CpuOnly,
            ..Default::default()
        };
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sim.json");
        std::fs::write(&path, serde_json::to_string_pretty(&config).unwrap()).unwrap();
        assert_eq!(SimulationConfig::from_json_file(&path).unwrap(), config);
    }

    #[test]
    fn test_json_partial_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial.json");
        std::fs::write(&path, r#"{ "subdivisions_x": 64, "physics": { "gravity": 3.7 } }"#).unwrap();
        let config = SimulationConfig::from_json_file(&path).unwrap();
        assert_eq!(config.subdivisions_x, 64);
        assert_eq!(config.subdivisions_z, 512);
        assert_eq!(config.physics.gravity, 3.7);
        assert_eq!(config.physics.grid_size, 1.0);
    }
}
