//! wgpu compute backend for the terrain kernel.

mod context;
mod pipelines;

pub use context::{GpuContext, GpuKernelError};
pub use pipelines::GpuKernel;
