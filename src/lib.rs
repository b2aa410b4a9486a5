//! Real-time hydraulic erosion terrain simulator.
//!
//! This crate provides a double-buffered cell grid of water and sediment advanced by
//! a compute kernel, the ground and water grid meshes that render it, and fractal
//! noise for seeding the initial ground.

pub mod export;
pub mod mesh;
pub mod noise;
pub mod simulation;
pub mod textures;

pub use mesh::{GridMesh, Surface, SurfaceKind};
pub use noise::{generate_noise_map, GradientNoise, NoiseMapConfig};
pub use simulation::{Simulation, SimulationBackend, SimulationConfig, SimulationError};
pub use textures::{FloatTexture, TextureCache, TextureId};
