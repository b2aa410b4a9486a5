//! Errors surfaced by simulation setup and stepping.

use thiserror::Error;

use crate::mesh::MeshError;
use crate::noise::NoiseError;
use crate::textures::TextureError;
use super::gpu::GpuKernelError;
use super::kernel::KernelError;
use super::stepper::SimulationPhase;

#[derive(Debug, Error)]
pub enum SimulationError {
    /// Kernel entry point missing or unusable; the attempted call did nothing.
    #[error("Kernel configuration error: {0}")]
    Configuration(String),
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Resource exhaustion: {0}")]
    ResourceExhaustion(String),
    #[error("Operation not allowed in phase {actual:?} (expected {expected})")]
    InvalidPhase {
        expected: &'static str,
        actual: SimulationPhase,
    },
    #[error("Kernel step failed: {0}")]
    Kernel(#[from] KernelError),
    #[error("GPU backend unavailable: {0}")]
    Gpu(#[from] GpuKernelError),
    #[error("Mesh error: {0}")]
    Mesh(#[from] MeshError),
    #[error("Noise error: {0}")]
    Noise(#[from] NoiseError),
    #[error("Texture error: {0}")]
    Texture(TextureError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Config parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

impl From<TextureError> for SimulationError {
    fn from(err: TextureError) -> Self {
        match err {
            TextureError::ResourceExhaustion(..) => Self::ResourceExhaustion(err.to_string()),
            other => Self::Texture(other),
        }
    }
}
