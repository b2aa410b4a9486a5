//! Ping-pong cell buffers and the parameter block.

use bytemuck::Zeroable;
use serde::{Deserialize, Serialize};

use crate::noise::NoiseField;
use super::cell::GridCell;
use super::error::SimulationError;
use super::params::SimulationParameters;

/// How a noise field is turned into deposited sediment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroundSeedConfig {
    /// Ground height of a cell whose noise value is 1.
    pub max_height: f32,
    /// Material split of the seeded column (sand, soil, stone); normalized on use.
    pub material_fractions: [f32; 3],
}

impl Default for GroundSeedConfig {
    fn default() -> Self {
        Self {
            max_height: 8.0,
            material_fractions: [0.2, 0.3, 0.5],
        }
    }
}

/// Owns both cell buffers and tracks which one holds the current state.
pub struct StateStore {
    subdivisions_x: u32,
    subdivisions_z: u32,
    buffers: [Vec<GridCell>; 2],
    current: usize,
    parameters: SimulationParameters,
}

fn allocate_cells(len: usize) -> Result<Vec<GridCell>, SimulationError> {
    let mut cells = Vec::new();
    cells.try_reserve_exact(len).map_err(|e| {
        SimulationError::ResourceExhaustion(format!("cell buffer of {len} cells: {e}"))
    })?;
    cells.resize(len, GridCell::zeroed());
    Ok(cells)
}

impl StateStore {
    /// Allocates two zeroed buffers of `subdivisions_x * subdivisions_z` cells.
    pub fn allocate(subdivisions_x: u32, subdivisions_z: u32) -> Result<Self, SimulationError> {
        let len = (subdivisions_x as usize)
            .checked_mul(subdivisions_z as usize)
            .ok_or_else(|| {
                SimulationError::ResourceExhaustion(format!(
                    "grid {subdivisions_x}x{subdivisions_z} overflows"
                ))
            })?;

        Ok(Self {
            subdivisions_x,
            subdivisions_z,
            buffers: [allocate_cells(len)?, allocate_cells(len)?],
            current: 0,
            parameters: SimulationParameters::zeroed(),
        })
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.subdivisions_x, self.subdivisions_z)
    }

    /// Index (0 or 1) of the buffer holding the current state.
    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn current(&self) -> &[GridCell] {
        &self.buffers[self.current]
    }

    pub fn current_mut(&mut self) -> &mut [GridCell] {
        &mut self.buffers[self.current]
    }

    /// Borrows the current buffer as input and the other one as output.
    pub fn split(&mut self) -> (&[GridCell], &mut [GridCell]) {
        let [a, b] = &mut self.buffers;
        if self.current == 0 {
            (a.as_slice(), b.as_mut_slice())
        } else {
            (b.as_slice(), a.as_mut_slice())
        }
    }

    /// Makes the last output buffer the current one.
    pub fn swap(&mut self) {
        self.current ^= 1;
    }

    /// Stores the parameter block used by the next dispatch.
    pub fn write(&mut self, params: SimulationParameters) {
        self.parameters = params;
    }

    pub fn parameters(&self) -> &SimulationParameters {
        &self.parameters
    }

    /// Raw bytes of the parameter block as bound to the kernel.
    pub fn parameter_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(&self.parameters)
    }

    /// Cell of the current state, or `None` outside the grid.
    pub fn cell(&self, x: u32, z: u32) -> Option<&GridCell> {
        if x >= self.subdivisions_x || z >= self.subdivisions_z {
            return None;
        }
        self.current()
            .get((z as usize) * (self.subdivisions_x as usize) + x as usize)
    }

    /// Writes seeded ground columns into both buffers.
    ///
    /// Kernels never write cells outside the dispatched extent, so both buffers
    /// must hold the seed. The field must match the grid dimensions. Water,
    /// dissolved sediment and velocity are left untouched.
    pub fn seed_ground(
        &mut self,
        field: &NoiseField,
        config: &GroundSeedConfig,
    ) -> Result<(), SimulationError> {
        if (field.width(), field.height()) != self.dimensions() {
            return Err(SimulationError::InvalidArgument(format!(
                "seed field is {}x{}, grid is {}x{}",
                field.width(),
                field.height(),
                self.subdivisions_x,
                self.subdivisions_z
            )));
        }
        let total: f32 = config.material_fractions.iter().sum();
        if !(total > 0.0) || config.material_fractions.iter().any(|&f| f < 0.0) {
            return Err(SimulationError::InvalidArgument(
                "material fractions must be non-negative and sum to a positive value".to_string(),
            ));
        }
        let fractions = config.material_fractions.map(|f| f / total);

        for (cell, &h) in self.current_mut().iter_mut().zip(field.values()) {
            let height = h.max(0.0) * config.max_height.max(0.0);
            cell.set_deposited(fractions.map(|f| f * height));
        }
        let (seeded, other) = self.split();
        other.copy_from_slice(seeded);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::noise::{generate_noise_map, GradientNoise, NoiseMapConfig};

    #[test]
    fn test_allocates_zeroed_buffers() {
        let mut store = StateStore::allocate(8, 4).unwrap();
        assert_eq!(store.current().len(), 32);
        assert!(store.current().iter().all(|c| *c == GridCell::zeroed()));
        let (input, output) = store.split();
        assert_eq!(input.len(), output.len());
    }

    #[test]
    fn test_swap_alternates() {
        let mut store = StateStore::allocate(8, 8).unwrap();
        for n in 0..7usize {
            assert_eq!(store.current_index(), n % 2);
            store.swap();
        }
    }

    #[test]
    fn test_split_never_aliases() {
        let mut store = StateStore::allocate(8, 8).unwrap();
        for _ in 0..4 {
            let (input, output) = store.split();
            assert_ne!(input.as_ptr(), output.as_ptr() as *const GridCell);
            output[0].water_amount += 1.0;
            store.swap();
        }
    }

    #[test]
    fn test_output_becomes_current_after_swap() {
        let mut store = StateStore::allocate(8, 8).unwrap();
        {
            let (_, output) = store.split();
            output[3].water_amount = 4.0;
        }
        assert_eq!(store.current()[3].water_amount, 0.0);
        store.swap();
        assert_eq!(store.current()[3].water_amount, 4.0);
    }

    #[test]
    fn test_write_parameters() {
        let mut store = StateStore::allocate(8, 8).unwrap();
        let mut params = SimulationParameters::zeroed();
        params.subdivisions_x = 8;
        params.delta_time = 0.25;
        store.write(params);
        assert_eq!(store.parameters().delta_time, 0.25);
        assert_eq!(store.parameter_bytes().len(), 60);
    }

    #[test]
    fn test_seed_ground() {
        let field = generate_noise_map(&GradientNoise::new(3), 16, 8, &NoiseMapConfig::default()).unwrap();
        let mut store = StateStore::allocate(16, 8).unwrap();
        let config = GroundSeedConfig {
            max_height: 10.0,
            material_fractions: [1.0, 1.0, 2.0],
        };
        store.seed_ground(&field, &config).unwrap();

        for (cell, &h) in store.current().iter().zip(field.values()) {
            assert!((cell.ground_height() - h * 10.0).abs() < 1e-4);
            assert!((cell.stone_amount - 2.0 * cell.sand_amount).abs() < 1e-4);
            assert_eq!(cell.water_amount, 0.0);
        }
    }

    #[test]
    fn test_seed_reaches_both_buffers() {
        let field = generate_noise_map(&GradientNoise::new(5), 20, 16, &NoiseMapConfig::default()).unwrap();
        let mut store = StateStore::allocate(20, 16).unwrap();
        store.seed_ground(&field, &GroundSeedConfig::default()).unwrap();

        let seeded = store.current().to_vec();
        store.swap();
        assert_eq!(store.current(), &seeded[..]);
        let edge = field.get(18, 3).unwrap() * 8.0;
        assert!((store.cell(18, 3).unwrap().ground_height() - edge).abs() < 1e-4);
    }

    #[test]
    fn test_cell_out_of_bounds() {
        let store = StateStore::allocate(8, 4).unwrap();
        assert!(store.cell(7, 3).is_some());
        assert!(store.cell(8, 0).is_none());
        assert!(store.cell(0, 4).is_none());
    }

    #[test]
    fn test_seed_rejects_wrong_size() {
        let field = generate_noise_map(&GradientNoise::new(3), 8, 8, &NoiseMapConfig::default()).unwrap();
        let mut store = StateStore::allocate(16, 8).unwrap();
        assert!(matches!(
            store.seed_ground(&field, &GroundSeedConfig::default()),
            Err(SimulationError::InvalidArgument(_))
        ));
    }
}
