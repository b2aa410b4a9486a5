//! Noise generation for optional initial terrain seeding.
//!
//! Uses simdnoise gradient noise as the coherent noise source.

mod fractal;
mod source;

pub use fractal::{generate_noise_map, NoiseError, NoiseField, NoiseMapConfig};
pub use source::{ConstantNoise, GradientNoise, NoiseSource};
