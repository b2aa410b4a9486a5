//! The compute kernel contract.
//!
//! A kernel runs one transformation over every dispatched grid cell. Backends decide
//! how the work is executed (rayon on the CPU, compute shaders through wgpu); the
//! stepper only sees this trait.

use thiserror::Error;

use crate::textures::KernelTargets;
use super::cell::GridCell;
use super::params::SimulationParameters;

/// Work-group edge length in cells.
pub const GROUP_SIZE: u32 = 8;

#[derive(Debug, Error)]
pub enum KernelError {
    #[error("Kernel entry point '{0}' not found")]
    EntryPointNotFound(String),
    #[error("Failed to create pipeline for '{entry}': {message}")]
    PipelineCreation { entry: String, message: String },
    #[error("Buffer holds {actual} cells, expected {expected}")]
    BufferSize { expected: usize, actual: usize },
    #[error("Cannot dispatch an empty {0}x{1} grid")]
    EmptyGrid(u32, u32),
    #[error("Device cannot hold the grid: {0}")]
    ResourceExhaustion(String),
    #[error("Backend failure: {0}")]
    Backend(String),
}

impl KernelError {
    /// Configuration errors are permanent; retrying cannot help.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            KernelError::EntryPointNotFound(_) | KernelError::PipelineCreation { .. }
        )
    }

    /// Only backend failures may succeed on a second attempt.
    pub fn is_transient(&self) -> bool {
        matches!(self, KernelError::Backend(_))
    }
}

/// Named kernel entry points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KernelEntry {
    /// Populates a cell buffer from scratch without advancing time.
    InitBuffer,
    /// Advances the grid by one time step.
    Step,
}

impl KernelEntry {
    pub fn name(self) -> &'static str {
        match self {
            KernelEntry::InitBuffer => "init_buffer",
            KernelEntry::Step => "step_simulation",
        }
    }
}

/// Work-group partition of the grid.
///
/// Groups cover `floor(subdivisions / 8)` blocks per axis; cells beyond
/// `covered()` are never dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchGrid {
    pub subdivisions_x: u32,
    pub subdivisions_z: u32,
    pub groups_x: u32,
    pub groups_z: u32,
}

impl DispatchGrid {
    pub fn new(subdivisions_x: u32, subdivisions_z: u32) -> Self {
        Self {
            subdivisions_x,
            subdivisions_z,
            groups_x: subdivisions_x / GROUP_SIZE,
            groups_z: subdivisions_z / GROUP_SIZE,
        }
    }

    /// Extent of the dispatched cells.
    pub fn covered(&self) -> (u32, u32) {
        (self.groups_x * GROUP_SIZE, self.groups_z * GROUP_SIZE)
    }

    pub fn contains(&self, x: u32, z: u32) -> bool {
        let (cx, cz) = self.covered();
        x < cx && z < cz
    }

    pub fn cell_count(&self) -> usize {
        (self.subdivisions_x as usize) * (self.subdivisions_z as usize)
    }

    pub fn check_len(&self, len: usize) -> Result<(), KernelError> {
        if self.cell_count() == 0 {
            return Err(KernelError::EmptyGrid(self.subdivisions_x, self.subdivisions_z));
        }
        if len != self.cell_count() {
            return Err(KernelError::BufferSize {
                expected: self.cell_count(),
                actual: len,
            });
        }
        Ok(())
    }
}

/// A grid-wide compute kernel.
pub trait GridKernel {
    /// Backend name for logging.
    fn name(&self) -> &str;

    /// Resolves an entry point before it is dispatched.
    fn find_entry(&mut self, entry: KernelEntry) -> Result<(), KernelError>;

    /// Populates `output` from scratch.
    fn initialize(
        &mut self,
        params: &SimulationParameters,
        dispatch: DispatchGrid,
        output: &mut [GridCell],
    ) -> Result<(), KernelError>;

    /// Advances `input` by one step into `output` and writes the live textures.
    fn step(
        &mut self,
        params: &SimulationParameters,
        dispatch: DispatchGrid,
        input: &[GridCell],
        output: &mut [GridCell],
        targets: KernelTargets<'_>,
    ) -> Result<(), KernelError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatch_exact_multiple() {
        let grid = DispatchGrid::new(64, 32);
        assert_eq!((grid.groups_x, grid.groups_z), (8, 4));
        assert_eq!(grid.covered(), (64, 32));
        assert!(grid.contains(63, 31));
    }

    #[test]
    fn test_dispatch_skips_edge_cells() {
        let grid = DispatchGrid::new(20, 17);
        assert_eq!((grid.groups_x, grid.groups_z), (2, 2));
        assert_eq!(grid.covered(), (16, 16));
        assert!(grid.contains(15, 15));
        assert!(!grid.contains(16, 0));
        assert!(!grid.contains(0, 16));
    }

    #[test]
    fn test_configuration_errors() {
        assert!(KernelError::EntryPointNotFound("step".into()).is_configuration());
        assert!(!KernelError::Backend("device lost".into()).is_configuration());
        assert!(KernelError::Backend("device lost".into()).is_transient());
        assert!(!KernelError::ResourceExhaustion("too big".into()).is_configuration());
        assert!(!KernelError::ResourceExhaustion("too big".into()).is_transient());
    }

    #[test]
    fn test_empty_grid_is_rejected() {
        let grid = DispatchGrid::new(0, 16);
        assert!(matches!(grid.check_len(0), Err(KernelError::EmptyGrid(0, 16))));
        assert!(DispatchGrid::new(8, 8).check_len(64).is_ok());
    }
}
