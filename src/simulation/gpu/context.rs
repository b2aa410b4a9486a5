//! Headless wgpu context for compute workloads.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GpuKernelError {
    #[error("No suitable GPU adapter found")]
    NoAdapter,
    #[error("Failed to request device: {0}")]
    RequestDevice(String),
    #[error("Shader module failed to compile: {0}")]
    Shader(String),
}

/// Holds the wgpu device/queue used by the terrain kernel.
pub struct GpuContext {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub adapter_name: String,
}

impl GpuContext {
    /// Create a headless wgpu device/queue suitable for compute.
    pub async fn new() -> Result<Self, GpuKernelError> {
        let instance = wgpu::Instance::default();
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok_or(GpuKernelError::NoAdapter)?;
        let adapter_name = adapter.get_info().name;

        // Grid size is bounded by the cell buffers; take as much as the adapter offers.
        let supported = adapter.limits();
        let required_limits = wgpu::Limits {
            max_storage_buffer_binding_size: supported.max_storage_buffer_binding_size,
            max_buffer_size: supported.max_buffer_size,
            ..wgpu::Limits::default()
        };
        log::debug!(
            "adapter '{}': storage binding {} B, buffer {} B, texture {} px",
            adapter_name,
            required_limits.max_storage_buffer_binding_size,
            required_limits.max_buffer_size,
            required_limits.max_texture_dimension_2d
        );

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("terrasim-device"),
                    required_features: wgpu::Features::empty(),
                    required_limits,
                    memory_hints: wgpu::MemoryHints::Performance,
                },
                None,
            )
            .await
            .map_err(|e| GpuKernelError::RequestDevice(e.to_string()))?;

        Ok(Self {
            device,
            queue,
            adapter_name,
        })
    }

    /// Limits the device was created with.
    pub fn limits(&self) -> wgpu::Limits {
        self.device.limits()
    }
}
