//! Per-cell simulation state shared with the compute kernels.

use bytemuck::{Pod, Zeroable};

/// Physical state of one grid cell.
///
/// Layout is shared with the WGSL `Cell` struct: eight `f32`s followed by a
/// 16-byte aligned `vec4<f32>`, 48 bytes in total.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct GridCell {
    /// Free water volume (water surface height).
    pub water_amount: f32,

    // Suspended in the water column.
    pub dissolved_sand_amount: f32,
    pub dissolved_soil_amount: f32,
    pub dissolved_stone_amount: f32,

    // Deposited on the ground (ground height and splat weights).
    pub sand_amount: f32,
    pub soil_amount: f32,
    pub stone_amount: f32,

    pub _padding: f32,

    /// Net horizontal flow: x along X, z along Z, y always 0, w reserved.
    pub water_velocity: [f32; 4],
}

impl GridCell {
    /// Height of the deposited sediment column.
    pub fn ground_height(&self) -> f32 {
        self.sand_amount + self.soil_amount + self.stone_amount
    }

    /// Ground plus water.
    pub fn surface_height(&self) -> f32 {
        self.ground_height() + self.water_amount
    }

    pub fn dissolved(&self) -> [f32; 3] {
        [
            self.dissolved_sand_amount,
            self.dissolved_soil_amount,
            self.dissolved_stone_amount,
        ]
    }

    pub fn deposited(&self) -> [f32; 3] {
        [self.sand_amount, self.soil_amount, self.stone_amount]
    }

    pub fn set_dissolved(&mut self, values: [f32; 3]) {
        [
            self.dissolved_sand_amount,
            self.dissolved_soil_amount,
            self.dissolved_stone_amount,
        ] = values;
    }

    pub fn set_deposited(&mut self, values: [f32; 3]) {
        [self.sand_amount, self.soil_amount, self.stone_amount] = values;
    }

    /// Dissolved plus deposited amount of every material.
    pub fn total_sediment(&self) -> f32 {
        self.dissolved().iter().sum::<f32>() + self.ground_height()
    }

    /// Splat weight in `[0, 1]`: 0 for pure sand, 0.5 for soil, 1 for stone.
    pub fn splat_weight(&self) -> f32 {
        let ground = self.ground_height();
        if ground > 1e-6 {
            ((0.5 * self.soil_amount + self.stone_amount) / ground).clamp(0.0, 1.0)
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout() {
        assert_eq!(std::mem::size_of::<GridCell>(), 48);
        assert_eq!(std::mem::offset_of!(GridCell, water_velocity), 32);
        assert_eq!(std::mem::align_of::<GridCell>(), 4);
    }

    #[test]
    fn test_zeroed_is_default() {
        assert_eq!(GridCell::zeroed(), GridCell::default());
        assert_eq!(GridCell::zeroed().ground_height(), 0.0);
    }

    #[test]
    fn test_splat_weight() {
        let mut cell = GridCell::zeroed();
        assert_eq!(cell.splat_weight(), 0.0);
        cell.set_deposited([1.0, 0.0, 0.0]);
        assert_eq!(cell.splat_weight(), 0.0);
        cell.set_deposited([0.0, 2.0, 0.0]);
        assert_eq!(cell.splat_weight(), 0.5);
        cell.set_deposited([0.0, 0.0, 3.0]);
        assert_eq!(cell.splat_weight(), 1.0);
    }

    #[test]
    fn test_total_sediment() {
        let mut cell = GridCell::zeroed();
        cell.set_deposited([1.0, 2.0, 3.0]);
        cell.set_dissolved([0.5, 0.25, 0.25]);
        cell.water_amount = 10.0;
        assert_eq!(cell.total_sediment(), 7.0);
        assert_eq!(cell.surface_height(), 16.0);
    }
}
