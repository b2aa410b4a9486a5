//! Hydraulic erosion simulation over a double-buffered cell grid.
//!
//! The [`Simulation`] stepper owns the [`StateStore`] and the render textures and
//! drives a [`GridKernel`] backend: the rayon CPU kernel or the wgpu compute kernel.

mod cell;
mod config;
pub mod cpu;
mod error;
pub mod gpu;
mod kernel;
mod params;
mod stepper;
mod store;
mod transform;

pub use cell::GridCell;
pub use config::{PhysicsConfig, SimulationBackend, SimulationConfig, WaterSourceConfig};
pub use error::SimulationError;
pub use kernel::{DispatchGrid, GridKernel, KernelEntry, KernelError, GROUP_SIZE};
pub use params::{FrameInputs, SimulationParameters};
pub use stepper::{create_kernel, GroundSeed, Simulation, SimulationPhase};
pub use store::{GroundSeedConfig, StateStore};
pub use transform::world_to_grid;
