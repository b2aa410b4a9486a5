//! CPU reference kernel.
//!
//! Mirrors `gpu/shaders/terrain.wgsl`. Each output cell is gathered from the input
//! buffer only, so rows are processed in parallel with rayon without any writes to
//! shared state.
//!
//! Per step and per cell:
//! 1. settle: inject source water, then exchange sediment between the ground and the
//!    water column towards the flow's carrying capacity (local, mass-conserving);
//! 2. outflow: water surface differences push water to lower 4-neighbors, limited by
//!    the water present after settling;
//! 3. transport: water and dissolved sediment leave along the outflows and arrive from
//!    the neighbors' outflows; the net flow becomes the new velocity.
//!
//! Neighbors outside the dispatched extent act as walls.

use glam::Vec2;
use rayon::prelude::*;

use crate::textures::KernelTargets;
use super::cell::GridCell;
use super::kernel::{DispatchGrid, GridKernel, KernelEntry, KernelError};
use super::params::SimulationParameters;

const MIN_WATER: f32 = 1e-4;
const MAX_FLOW_RATE: f32 = 0.25;

// +X, -X, +Z, -Z
const OFFSETS: [(i32, i32); 4] = [(1, 0), (-1, 0), (0, 1), (0, -1)];
const OPPOSITE: [usize; 4] = [1, 0, 3, 2];

#[derive(Clone, Copy)]
struct GridView<'a> {
    cells: &'a [GridCell],
    width: u32,
    covered: (u32, u32),
}

impl<'a> GridView<'a> {
    fn at(&self, x: u32, z: u32) -> &'a GridCell {
        &self.cells[(z as usize) * (self.width as usize) + x as usize]
    }

    fn neighbor(&self, x: u32, z: u32, dir: usize) -> Option<(u32, u32)> {
        let (dx, dz) = OFFSETS[dir];
        let nx = x as i64 + dx as i64;
        let nz = z as i64 + dz as i64;
        if nx < 0 || nz < 0 || nx >= self.covered.0 as i64 || nz >= self.covered.1 as i64 {
            None
        } else {
            Some((nx as u32, nz as u32))
        }
    }
}

fn source_injection(params: &SimulationParameters, x: u32, z: u32) -> f32 {
    let radius = params.source_water_radius;
    if params.source_water_amount <= 0.0 || radius <= 0.0 {
        return 0.0;
    }
    let (sx, sz) = params.dimensions();
    let uv = Vec2::new((x as f32 + 0.5) / sx as f32, (z as f32 + 0.5) / sz as f32);
    let center = Vec2::new(params.source_position[0], params.source_position[2]);
    let d = uv.distance(center);
    if d >= radius {
        return 0.0;
    }
    params.source_water_amount * params.effective_delta_time() * (1.0 - d / radius)
}

fn settle(cell: &GridCell, params: &SimulationParameters, x: u32, z: u32) -> GridCell {
    let dt = params.effective_delta_time();
    let mut out = *cell;
    out.water_amount += source_injection(params, x, z);

    let flow = Vec2::new(cell.water_velocity[0], cell.water_velocity[2]).length();
    let speed = flow / out.water_amount.max(MIN_WATER);
    let rate = dt.min(1.0);

    let mut dissolved = out.dissolved();
    let mut deposited = out.deposited();
    for (m, k) in params.dissolve_coefficients().into_iter().enumerate() {
        let capacity = k * speed * out.water_amount * params.water_density;
        let diff = capacity - dissolved[m];
        if diff > 0.0 {
            let amount = (diff * rate).min(deposited[m]);
            deposited[m] -= amount;
            dissolved[m] += amount;
        } else if diff < 0.0 {
            let amount = (-diff * rate).min(dissolved[m]);
            dissolved[m] -= amount;
            deposited[m] += amount;
        }
    }
    out.set_dissolved(dissolved);
    out.set_deposited(deposited);
    out
}

fn outflow(grid: &GridView<'_>, params: &SimulationParameters, x: u32, z: u32, available: f32) -> [f32; 4] {
    let mut flux = [0.0f32; 4];
    if available <= 0.0 {
        return flux;
    }
    let rate = (params.gravity * params.effective_delta_time() / params.grid_size.max(1e-6))
        .clamp(0.0, MAX_FLOW_RATE);
    let here = grid.at(x, z).surface_height();
    for (dir, f) in flux.iter_mut().enumerate() {
        if let Some((nx, nz)) = grid.neighbor(x, z, dir) {
            let dh = here - grid.at(nx, nz).surface_height();
            if dh > 0.0 {
                *f = dh * rate;
            }
        }
    }
    let total: f32 = flux.iter().sum();
    if total > available {
        let scale = available / total;
        for f in &mut flux {
            *f *= scale;
        }
    }
    flux
}

fn step_cell(grid: &GridView<'_>, params: &SimulationParameters, x: u32, z: u32) -> GridCell {
    let pre = settle(grid.at(x, z), params, x, z);
    let out = outflow(grid, params, x, z, pre.water_amount);
    let out_total: f32 = out.iter().sum();

    let leave = if pre.water_amount > 0.0 {
        (out_total / pre.water_amount).min(1.0)
    } else {
        0.0
    };
    let mut water = pre.water_amount - out_total;
    let mut dissolved = pre.dissolved().map(|d| d * (1.0 - leave));
    let mut net = Vec2::new(out[0] - out[1], out[2] - out[3]);

    for dir in 0..4 {
        let Some((nx, nz)) = grid.neighbor(x, z, dir) else {
            continue;
        };
        let neighbor = settle(grid.at(nx, nz), params, nx, nz);
        let inflow = outflow(grid, params, nx, nz, neighbor.water_amount)[OPPOSITE[dir]];
        if inflow <= 0.0 {
            continue;
        }
        water += inflow;
        let share = inflow / neighbor.water_amount;
        for (d, nd) in dissolved.iter_mut().zip(neighbor.dissolved()) {
            *d += nd * share;
        }
        let (dx, dz) = OFFSETS[dir];
        net -= Vec2::new(dx as f32, dz as f32) * inflow;
    }

    let dt = params.effective_delta_time();
    let velocity = if dt > 0.0 { net / dt } else { Vec2::ZERO };

    let mut cell = pre;
    cell.water_amount = water.max(0.0);
    cell.set_dissolved(dissolved.map(|d| d.max(0.0)));
    cell.water_velocity = [velocity.x, 0.0, velocity.y, 0.0];
    cell
}

/// Rayon-parallel implementation of the terrain kernel.
#[derive(Debug, Default, Clone, Copy)]
pub struct CpuKernel;

impl CpuKernel {
    pub fn new() -> Self {
        Self
    }
}

impl GridKernel for CpuKernel {
    fn name(&self) -> &str {
        "cpu"
    }

    fn find_entry(&mut self, _entry: KernelEntry) -> Result<(), KernelError> {
        Ok(())
    }

    fn initialize(
        &mut self,
        _params: &SimulationParameters,
        dispatch: DispatchGrid,
        output: &mut [GridCell],
    ) -> Result<(), KernelError> {
        dispatch.check_len(output.len())?;
        let width = dispatch.subdivisions_x as usize;
        let (cx, cz) = dispatch.covered();
        output
            .par_chunks_mut(width)
            .take(cz as usize)
            .for_each(|row| row[..cx as usize].fill(GridCell::default()));
        Ok(())
    }

    fn step(
        &mut self,
        params: &SimulationParameters,
        dispatch: DispatchGrid,
        input: &[GridCell],
        output: &mut [GridCell],
        targets: KernelTargets<'_>,
    ) -> Result<(), KernelError> {
        dispatch.check_len(input.len())?;
        dispatch.check_len(output.len())?;
        for texture in [&*targets.water_height, &*targets.ground_height, &*targets.ground_splat] {
            dispatch.check_len(texture.len())?;
        }

        let width = dispatch.subdivisions_x as usize;
        let (cx, cz) = dispatch.covered();
        let grid = GridView {
            cells: input,
            width: dispatch.subdivisions_x,
            covered: (cx, cz),
        };

        output
            .par_chunks_mut(width)
            .zip(targets.water_height.par_chunks_mut(width))
            .zip(targets.ground_height.par_chunks_mut(width))
            .zip(targets.ground_splat.par_chunks_mut(width))
            .take(cz as usize)
            .enumerate()
            .for_each(|(z, (((cells, water), ground), splat))| {
                for x in 0..cx as usize {
                    let cell = step_cell(&grid, params, x as u32, z as u32);
                    water[x] = cell.water_amount;
                    ground[x] = cell.ground_height();
                    splat[x] = cell.splat_weight();
                    cells[x] = cell;
                }
            });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use bytemuck::Zeroable;

    use super::*;
    use crate::textures::TextureCache;

    fn params(dim: u32, dt: f32) -> SimulationParameters {
        SimulationParameters {
            subdivisions_x: dim as i32,
            subdivisions_z: dim as i32,
            source_water_amount: 0.0,
            source_water_radius: 0.1,
            water_density: 1.0,
            gravity: 9.81,
            grid_size: 1.0,
            sand_dissolve_coefficient: 0.3,
            soil_dissolve_coefficient: 0.1,
            stone_dissolve_coefficient: 0.01,
            delta_time: dt,
            delta_time_scale: 1.0,
            source_position: [0.5, 0.0, 0.5],
        }
    }

    fn run_steps(
        kernel: &mut CpuKernel,
        p: &SimulationParameters,
        cells: Vec<GridCell>,
        steps: usize,
        textures: &mut TextureCache,
    ) -> Vec<GridCell> {
        let (w, h) = p.dimensions();
        let dispatch = DispatchGrid::new(w, h);
        let mut current = cells;
        let mut next = vec![GridCell::zeroed(); current.len()];
        for _ in 0..steps {
            kernel
                .step(p, dispatch, &current, &mut next, textures.live_targets())
                .unwrap();
            std::mem::swap(&mut current, &mut next);
        }
        current
    }

    fn totals(cells: &[GridCell]) -> (f32, f32) {
        let water = cells.iter().map(|c| c.water_amount).sum();
        let sediment = cells.iter().map(|c| c.total_sediment()).sum();
        (water, sediment)
    }

    #[test]
    fn test_zero_grid_without_source_is_fixed_point() {
        let p = params(8, 0.016);
        let mut textures = TextureCache::allocate(8, 8, 0.0).unwrap();
        let start = vec![GridCell::zeroed(); 64];
        let end = run_steps(&mut CpuKernel, &p, start.clone(), 3, &mut textures);
        assert_eq!(bytemuck::cast_slice::<_, u8>(&start), bytemuck::cast_slice::<_, u8>(&end));
    }

    #[test]
    fn test_source_adds_water_near_center() {
        let mut p = params(16, 0.1);
        p.source_water_amount = 2.0;
        p.source_water_radius = 0.2;
        let mut textures = TextureCache::allocate(16, 16, 0.0).unwrap();
        let end = run_steps(&mut CpuKernel, &p, vec![GridCell::zeroed(); 256], 1, &mut textures);

        let center = &end[8 * 16 + 8];
        let corner = &end[0];
        assert!(center.water_amount > 0.0);
        assert_eq!(corner.water_amount, 0.0);
        assert_eq!(
            textures.live(crate::textures::TextureId::WaterHeight).get(8, 8),
            Some(center.water_amount)
        );
    }

    #[test]
    fn test_water_flows_to_neighbors() {
        let p = params(8, 0.016);
        let mut cells = vec![GridCell::zeroed(); 64];
        cells[3 * 8 + 3].water_amount = 1.0;
        let mut textures = TextureCache::allocate(8, 8, 0.0).unwrap();
        let end = run_steps(&mut CpuKernel, &p, cells, 1, &mut textures);

        assert!(end[3 * 8 + 3].water_amount < 1.0);
        assert!(end[3 * 8 + 4].water_amount > 0.0);
        assert!(end[2 * 8 + 3].water_amount > 0.0);
        assert!((totals(&end).0 - 1.0).abs() < 1e-5);
        // Outflow is symmetric, so the net flow at the center cancels out.
        assert!(end[3 * 8 + 3].water_velocity[0].abs() < 1e-4);
        assert!(end[3 * 8 + 4].water_velocity[0] > 0.0);
    }

    #[test]
    fn test_mass_conserved_without_source() {
        let p = params(16, 0.05);
        let mut cells = vec![GridCell::zeroed(); 256];
        for (i, cell) in cells.iter_mut().enumerate() {
            let x = (i % 16) as f32;
            let z = (i / 16) as f32;
            cell.set_deposited([0.1 * x, 0.05 * z, 0.5]);
            cell.water_amount = if i % 5 == 0 { 0.8 } else { 0.1 };
        }
        let (water0, sediment0) = totals(&cells);

        let mut textures = TextureCache::allocate(16, 16, 0.0).unwrap();
        let end = run_steps(&mut CpuKernel, &p, cells, 40, &mut textures);
        let (water1, sediment1) = totals(&end);

        assert!((water1 - water0).abs() / water0 < 1e-3, "water {} -> {}", water0, water1);
        assert!((sediment1 - sediment0).abs() / sediment0 < 1e-3, "sediment {} -> {}", sediment0, sediment1);
        assert!(end.iter().all(|c| c.water_amount >= 0.0));
        assert!(end.iter().all(|c| c.dissolved().iter().chain(c.deposited().iter()).all(|&v| v >= 0.0)));
        assert!(end.iter().any(|c| c.dissolved().iter().any(|&d| d > 0.0)));
    }

    #[test]
    fn test_edge_cells_are_skipped() {
        let mut p = params(20, 0.016);
        p.subdivisions_z = 16;
        let dispatch = DispatchGrid::new(20, 16);
        let mut input = vec![GridCell::zeroed(); 320];
        input[3 * 20 + 18].water_amount = 5.0;
        let mut output = vec![GridCell::zeroed(); 320];
        output[3 * 20 + 18].water_amount = -1.0;

        let mut textures = TextureCache::allocate(20, 16, 0.0).unwrap();
        CpuKernel
            .step(&p, dispatch, &input, &mut output, textures.live_targets())
            .unwrap();
        assert_eq!(output[3 * 20 + 18].water_amount, -1.0);
        assert_eq!(output[3 * 20 + 15].water_amount, 0.0);
    }

    #[test]
    fn test_ground_textures_follow_cells() {
        let p = params(8, 0.0);
        let mut cells = vec![GridCell::zeroed(); 64];
        cells[9].set_deposited([1.0, 1.0, 2.0]);
        let mut textures = TextureCache::allocate(8, 8, 0.0).unwrap();
        run_steps(&mut CpuKernel, &p, cells, 1, &mut textures);

        use crate::textures::TextureId;
        assert_eq!(textures.live(TextureId::GroundHeight).get(1, 1), Some(4.0));
        assert_eq!(textures.live(TextureId::GroundSplat).get(1, 1), Some(0.625));
        assert_eq!(textures.live(TextureId::GroundHeight).get(0, 0), Some(0.0));
    }

    #[test]
    fn test_initialize_zeroes_covered_cells() {
        let p = params(8, 0.0);
        let mut output = vec![GridCell::zeroed(); 64];
        output[10].water_amount = 3.0;
        CpuKernel
            .initialize(&p, DispatchGrid::new(8, 8), &mut output)
            .unwrap();
        assert!(output.iter().all(|c| *c == GridCell::zeroed()));
    }

    #[test]
    fn test_rejects_wrong_buffer_size() {
        let p = params(8, 0.0);
        let mut output = vec![GridCell::zeroed(); 10];
        assert!(matches!(
            CpuKernel.initialize(&p, DispatchGrid::new(8, 8), &mut output),
            Err(KernelError::BufferSize { expected: 64, actual: 10 })
        ));
    }

    #[test]
    fn test_empty_grid_is_an_error() {
        let p = params(0, 0.016);
        let dispatch = DispatchGrid::new(0, 8);
        assert!(matches!(
            CpuKernel.initialize(&p, dispatch, &mut []),
            Err(KernelError::EmptyGrid(0, 8))
        ));

        let targets = KernelTargets {
            water_height: &mut [],
            ground_height: &mut [],
            ground_splat: &mut [],
        };
        assert!(matches!(
            CpuKernel.step(&p, dispatch, &[], &mut [], targets),
            Err(KernelError::EmptyGrid(0, 8))
        ));
    }
}
