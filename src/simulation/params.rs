//! The parameter block bound to every kernel invocation.

use bytemuck::{Pod, Zeroable};
use glam::Vec3;

use super::config::SimulationConfig;

/// Constant parameters for one kernel dispatch.
///
/// Field order is part of the kernel contract and mirrored by the WGSL `Params`
/// struct. A fresh snapshot is built for every step.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct SimulationParameters {
    pub subdivisions_x: i32,
    pub subdivisions_z: i32,

    pub source_water_amount: f32,
    pub source_water_radius: f32,

    pub water_density: f32,
    pub gravity: f32,
    pub grid_size: f32,

    pub sand_dissolve_coefficient: f32,
    pub soil_dissolve_coefficient: f32,
    pub stone_dissolve_coefficient: f32,

    pub delta_time: f32,
    pub delta_time_scale: f32,

    /// Source center in normalized grid space; y is always 0.
    pub source_position: [f32; 3],
}

/// Per-step inputs that change between frames.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameInputs {
    pub delta_time: f32,
    /// Grid-space source position, or `None` when no source is attached.
    pub source_position: Option<Vec3>,
}

impl SimulationParameters {
    /// Builds the block from persistent configuration and this step's inputs.
    ///
    /// Without an attached source the injection amount is zero and the position is
    /// left at `fallback_position`, so the kernel adds no water.
    pub fn snapshot(config: &SimulationConfig, frame: FrameInputs, fallback_position: [f32; 3]) -> Self {
        let physics = &config.physics;
        let (source_water_amount, source_position) = match frame.source_position {
            Some(pos) => (config.source.amount, [pos.x, 0.0, pos.z]),
            None => (0.0, fallback_position),
        };

        Self {
            subdivisions_x: config.subdivisions_x as i32,
            subdivisions_z: config.subdivisions_z as i32,
            source_water_amount,
            source_water_radius: config.source.radius,
            water_density: physics.water_density,
            gravity: physics.gravity,
            grid_size: physics.grid_size,
            sand_dissolve_coefficient: physics.sand_dissolve_coefficient,
            soil_dissolve_coefficient: physics.soil_dissolve_coefficient,
            stone_dissolve_coefficient: physics.stone_dissolve_coefficient,
            delta_time: frame.delta_time,
            delta_time_scale: physics.delta_time_scale,
            source_position,
        }
    }

    /// Time actually advanced by one step.
    pub fn effective_delta_time(&self) -> f32 {
        (self.delta_time * self.delta_time_scale).max(0.0)
    }

    pub fn dissolve_coefficients(&self) -> [f32; 3] {
        [
            self.sand_dissolve_coefficient,
            self.soil_dissolve_coefficient,
            self.stone_dissolve_coefficient,
        ]
    }

    /// Grid dimensions as unsigned cell counts.
    pub fn dimensions(&self) -> (u32, u32) {
        (self.subdivisions_x.max(0) as u32, self.subdivisions_z.max(0) as u32)
    }
}

#[cfg(test)]
mod tests {
    use std::mem::{align_of, offset_of, size_of};

    use super::*;

    #[test]
    fn test_layout() {
        assert_eq!(size_of::<SimulationParameters>(), 60);
        assert_eq!(align_of::<SimulationParameters>(), 4);
        assert_eq!(offset_of!(SimulationParameters, subdivisions_x), 0);
        assert_eq!(offset_of!(SimulationParameters, subdivisions_z), 4);
        assert_eq!(offset_of!(SimulationParameters, source_water_amount), 8);
        assert_eq!(offset_of!(SimulationParameters, source_water_radius), 12);
        assert_eq!(offset_of!(SimulationParameters, water_density), 16);
        assert_eq!(offset_of!(SimulationParameters, gravity), 20);
        assert_eq!(offset_of!(SimulationParameters, grid_size), 24);
        assert_eq!(offset_of!(SimulationParameters, sand_dissolve_coefficient), 28);
        assert_eq!(offset_of!(SimulationParameters, soil_dissolve_coefficient), 32);
        assert_eq!(offset_of!(SimulationParameters, stone_dissolve_coefficient), 36);
        assert_eq!(offset_of!(SimulationParameters, delta_time), 40);
        assert_eq!(offset_of!(SimulationParameters, delta_time_scale), 44);
        assert_eq!(offset_of!(SimulationParameters, source_position), 48);
    }

    #[test]
    fn test_snapshot_with_source() {
        let config = SimulationConfig {
            subdivisions_x: 64,
            subdivisions_z: 32,
            ..Default::default()
        };
        let frame = FrameInputs {
            delta_time: 0.016,
            source_position: Some(Vec3::new(0.25, 3.0, 0.75)),
        };
        let params = SimulationParameters::snapshot(&config, frame, [0.0; 3]);
        assert_eq!(params.dimensions(), (64, 32));
        assert_eq!(params.source_water_amount, config.source.amount);
        assert_eq!(params.source_position, [0.25, 0.0, 0.75]);
        assert_eq!(params.delta_time, 0.016);
    }

    #[test]
    fn test_snapshot_without_source() {
        let config = SimulationConfig::default();
        let frame = FrameInputs {
            delta_time: 0.5,
            source_position: None,
        };
        let params = SimulationParameters::snapshot(&config, frame, [0.1, 0.0, 0.2]);
        assert_eq!(params.source_water_amount, 0.0);
        assert_eq!(params.source_position, [0.1, 0.0, 0.2]);
        assert_eq!(params.delta_time, 0.5);
    }

    #[test]
    fn test_effective_delta_time() {
        let mut params = SimulationParameters::zeroed();
        params.delta_time = 0.02;
        params.delta_time_scale = 5.0;
        assert!((params.effective_delta_time() - 0.1).abs() < 1e-6);
    }
}
