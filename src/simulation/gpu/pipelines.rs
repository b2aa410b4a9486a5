//! Compute pipelines for the terrain kernel.

use std::borrow::Cow;
use std::collections::HashMap;
use std::mem::size_of;

use bytemuck::{Pod, Zeroable};

use crate::simulation::cell::GridCell;
use crate::simulation::kernel::{DispatchGrid, GridKernel, KernelEntry, KernelError};
use crate::simulation::params::SimulationParameters;
use crate::textures::{KernelTargets, TextureId};
use super::context::{GpuContext, GpuKernelError};

const TERRAIN_WGSL: &str = include_str!("shaders/terrain.wgsl");

/// Uniform blocks are sized in multiples of 16 bytes.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
struct GpuParams {
    params: SimulationParameters,
    _pad: f32,
}

struct FieldTex {
    tex: wgpu::Texture,
    view: wgpu::TextureView,
}

/// Device-side buffers for one grid size.
struct GridResources {
    dispatch: DispatchGrid,
    padded_bpr: u32,
    params: wgpu::Buffer,
    cells_in: wgpu::Buffer,
    cells_out: wgpu::Buffer,
    cells_readback: wgpu::Buffer,
    fields: [FieldTex; 3],
    field_readback: [wgpu::Buffer; 3],
    bind_group: wgpu::BindGroup,
}

fn align_to(value: u32, alignment: u32) -> u32 {
    debug_assert!(alignment.is_power_of_two());
    (value + alignment - 1) & !(alignment - 1)
}

fn extent(dispatch: &DispatchGrid) -> wgpu::Extent3d {
    wgpu::Extent3d {
        width: dispatch.subdivisions_x,
        height: dispatch.subdivisions_z,
        depth_or_array_layers: 1,
    }
}

fn create_field(device: &wgpu::Device, label: &str, dispatch: &DispatchGrid) -> FieldTex {
    let tex = device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size: extent(dispatch),
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::R32Float,
        usage: wgpu::TextureUsages::STORAGE_BINDING
            | wgpu::TextureUsages::COPY_SRC
            | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });
    let view = tex.create_view(&wgpu::TextureViewDescriptor {
        label: Some(&format!("{}-view", label)),
        format: Some(wgpu::TextureFormat::R32Float),
        dimension: Some(wgpu::TextureViewDimension::D2),
        aspect: wgpu::TextureAspect::All,
        base_mip_level: 0,
        mip_level_count: Some(1),
        base_array_layer: 0,
        array_layer_count: Some(1),
        usage: None,
    });
    FieldTex { tex, view }
}

fn unpack_f32_rows_padded(dim_x: u32, padded_bpr: u32, bytes: &[u8], out: &mut [f32]) {
    let row_bytes = padded_bpr as usize;
    for (z, dst) in out.chunks_exact_mut(dim_x as usize).enumerate() {
        let src = z * row_bytes;
        let row: &[f32] = bytemuck::cast_slice(&bytes[src..src + row_bytes]);
        dst.copy_from_slice(&row[..dim_x as usize]);
    }
}

/// Rejects grids whose buffers or textures exceed the device limits.
fn check_grid_limits(limits: &wgpu::Limits, dispatch: &DispatchGrid) -> Result<(), KernelError> {
    let (sx, sz) = (dispatch.subdivisions_x, dispatch.subdivisions_z);
    let max_dim = limits.max_texture_dimension_2d;
    if sx > max_dim || sz > max_dim {
        return Err(KernelError::ResourceExhaustion(format!(
            "{sx}x{sz} grid exceeds max_texture_dimension_2d {max_dim}"
        )));
    }

    let cells_bytes = dispatch.cell_count() as u64 * size_of::<GridCell>() as u64;
    let binding = u64::from(limits.max_storage_buffer_binding_size);
    if cells_bytes > binding {
        return Err(KernelError::ResourceExhaustion(format!(
            "{sx}x{sz} grid needs {cells_bytes} B cell buffers, max_storage_buffer_binding_size is {binding}"
        )));
    }
    let readback_bytes = u64::from(align_to(sx * 4, wgpu::COPY_BYTES_PER_ROW_ALIGNMENT)) * u64::from(sz);
    let largest = cells_bytes.max(readback_bytes);
    if largest > limits.max_buffer_size {
        return Err(KernelError::ResourceExhaustion(format!(
            "{sx}x{sz} grid needs {largest} B buffers, max_buffer_size is {}",
            limits.max_buffer_size
        )));
    }
    Ok(())
}

/// True if `source` declares a `@compute` function called `name`.
fn declares_compute_entry(source: &str, name: &str) -> bool {
    source.match_indices("@compute").any(|(at, _)| {
        let rest = &source[at..];
        rest.find("fn ")
            .map(|f| {
                let ident = rest[f + 3..].trim_start();
                let end = ident
                    .find(|c: char| !(c.is_alphanumeric() || c == '_'))
                    .unwrap_or(ident.len());
                &ident[..end] == name
            })
            .unwrap_or(false)
    })
}

fn storage_texture_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::StorageTexture {
            access: wgpu::StorageTextureAccess::WriteOnly,
            format: wgpu::TextureFormat::R32Float,
            view_dimension: wgpu::TextureViewDimension::D2,
        },
        count: None,
    }
}

fn storage_buffer_entry(binding: u32, read_only: bool) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only },
            has_dynamic_offset: false,
            min_binding_size: wgpu::BufferSize::new(size_of::<GridCell>() as u64),
        },
        count: None,
    }
}

/// Runs the terrain kernel as wgpu compute shaders.
///
/// Cell buffers stay owned by the host: every dispatch uploads the input buffer and
/// reads the output buffer and the three textures back.
pub struct GpuKernel {
    ctx: GpuContext,
    source: String,
    module: wgpu::ShaderModule,
    bgl: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    pipelines: HashMap<KernelEntry, wgpu::ComputePipeline>,
    resources: Option<GridResources>,
}

impl GpuKernel {
    /// Uses the bundled terrain shader.
    pub fn new(ctx: GpuContext) -> Result<Self, GpuKernelError> {
        Self::with_shader_source(ctx, TERRAIN_WGSL)
    }

    /// Uses a caller-provided WGSL module implementing the same bindings.
    pub fn with_shader_source(ctx: GpuContext, source: &str) -> Result<Self, GpuKernelError> {
        ctx.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let module = ctx.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("terrasim-terrain-wgsl"),
            source: wgpu::ShaderSource::Wgsl(Cow::Owned(source.to_string())),
        });
        if let Some(err) = pollster::block_on(ctx.device.pop_error_scope()) {
            return Err(GpuKernelError::Shader(err.to_string()));
        }

        let bgl = ctx.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("terrasim-terrain-bgl"),
            entries: &[
                // Params
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: wgpu::BufferSize::new(size_of::<GpuParams>() as u64),
                    },
                    count: None,
                },
                // Cells
                storage_buffer_entry(1, true),
                storage_buffer_entry(2, false),
                // Live textures
                storage_texture_entry(3),
                storage_texture_entry(4),
                storage_texture_entry(5),
            ],
        });

        let pipeline_layout = ctx.device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("terrasim-terrain-pipeline-layout"),
            bind_group_layouts: &[&bgl],
            push_constant_ranges: &[],
        });

        Ok(Self {
            ctx,
            source: source.to_string(),
            module,
            bgl,
            pipeline_layout,
            pipelines: HashMap::new(),
            resources: None,
        })
    }

    pub fn adapter_name(&self) -> &str {
        &self.ctx.adapter_name
    }

    fn create_resources(&self, dispatch: DispatchGrid) -> Result<GridResources, KernelError> {
        let device = &self.ctx.device;
        check_grid_limits(&device.limits(), &dispatch)?;

        device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let resources = self.allocate_resources(dispatch);
        let validation = pollster::block_on(device.pop_error_scope());
        let out_of_memory = pollster::block_on(device.pop_error_scope());
        if let Some(err) = out_of_memory.or(validation) {
            return Err(KernelError::ResourceExhaustion(err.to_string()));
        }
        Ok(resources)
    }

    fn allocate_resources(&self, dispatch: DispatchGrid) -> GridResources {
        let device = &self.ctx.device;
        let cells_bytes = (dispatch.cell_count() * size_of::<GridCell>()) as u64;

        let buffer = |label: &str, size: u64, usage: wgpu::BufferUsages| {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(label),
                size,
                usage,
                mapped_at_creation: false,
            })
        };

        let params = buffer(
            "terrasim-params",
            size_of::<GpuParams>() as u64,
            wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        );
        let cells_in = buffer(
            "terrasim-cells-in",
            cells_bytes,
            wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
        );
        let cells_out = buffer(
            "terrasim-cells-out",
            cells_bytes,
            wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC | wgpu::BufferUsages::COPY_DST,
        );
        let cells_readback = buffer(
            "terrasim-cells-readback",
            cells_bytes,
            wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
        );

        let fields = TextureId::ALL.map(|id| create_field(device, id.name(), &dispatch));
        let padded_bpr = align_to(dispatch.subdivisions_x * 4, wgpu::COPY_BYTES_PER_ROW_ALIGNMENT);
        let field_readback = TextureId::ALL.map(|id| {
            buffer(
                &format!("{}-readback-buffer", id.name()),
                padded_bpr as u64 * dispatch.subdivisions_z as u64,
                wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            )
        });

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("terrasim-terrain-bind-group"),
            layout: &self.bgl,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: params.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: cells_in.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: cells_out.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::TextureView(&fields[0].view),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: wgpu::BindingResource::TextureView(&fields[1].view),
                },
                wgpu::BindGroupEntry {
                    binding: 5,
                    resource: wgpu::BindingResource::TextureView(&fields[2].view),
                },
            ],
        });

        GridResources {
            dispatch,
            padded_bpr,
            params,
            cells_in,
            cells_out,
            cells_readback,
            fields,
            field_readback,
            bind_group,
        }
    }

    fn ensure_resources(&mut self, dispatch: DispatchGrid) -> Result<(), KernelError> {
        let stale = self
            .resources
            .as_ref()
            .map_or(true, |r| r.dispatch != dispatch);
        if stale {
            log::debug!(
                "allocating GPU resources for {}x{} grid",
                dispatch.subdivisions_x,
                dispatch.subdivisions_z
            );
            self.resources = None;
            self.resources = Some(self.create_resources(dispatch)?);
        }
        Ok(())
    }

    /// Maps every buffer for reading and blocks until all are ready.
    fn map_read(&self, buffers: &[&wgpu::Buffer]) -> Result<(), KernelError> {
        let (tx, rx) = std::sync::mpsc::channel();
        for buffer in buffers {
            let tx = tx.clone();
            buffer.slice(..).map_async(wgpu::MapMode::Read, move |r| {
                let _ = tx.send(r);
            });
        }
        drop(tx);
        // Block until the mapping is ready.
        self.ctx.device.poll(wgpu::Maintain::Wait);
        for _ in buffers {
            rx.recv()
                .map_err(|e| KernelError::Backend(format!("readback channel closed: {e}")))?
                .map_err(|e| KernelError::Backend(format!("buffer map failed: {e}")))?;
        }
        Ok(())
    }

    fn run(
        &self,
        entry: KernelEntry,
        params: &SimulationParameters,
        input: Option<&[GridCell]>,
        output: &mut [GridCell],
        targets: Option<KernelTargets<'_>>,
    ) -> Result<(), KernelError> {
        let res = self
            .resources
            .as_ref()
            .ok_or_else(|| KernelError::Backend("grid resources not allocated".to_string()))?;
        let pipeline = self
            .pipelines
            .get(&entry)
            .ok_or_else(|| KernelError::EntryPointNotFound(entry.name().to_string()))?;
        let dispatch = res.dispatch;
        let queue = &self.ctx.queue;

        queue.write_buffer(
            &res.params,
            0,
            bytemuck::bytes_of(&GpuParams {
                params: *params,
                _pad: 0.0,
            }),
        );
        if let Some(input) = input {
            queue.write_buffer(&res.cells_in, 0, bytemuck::cast_slice(input));
        }
        // Cells outside the dispatched extent keep their previous output contents.
        queue.write_buffer(&res.cells_out, 0, bytemuck::cast_slice(output));

        if let Some(targets) = &targets {
            let texels: [&[f32]; 3] = [
                &*targets.water_height,
                &*targets.ground_height,
                &*targets.ground_splat,
            ];
            for (field, data) in res.fields.iter().zip(texels) {
                queue.write_texture(
                    wgpu::ImageCopyTexture {
                        texture: &field.tex,
                        mip_level: 0,
                        origin: wgpu::Origin3d::ZERO,
                        aspect: wgpu::TextureAspect::All,
                    },
                    bytemuck::cast_slice(data),
                    wgpu::ImageDataLayout {
                        offset: 0,
                        bytes_per_row: Some(dispatch.subdivisions_x * 4),
                        rows_per_image: Some(dispatch.subdivisions_z),
                    },
                    extent(&dispatch),
                );
            }
        }

        let mut encoder = self.ctx.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some(&format!("terrasim-{}-encoder", entry.name())),
        });
        if dispatch.groups_x > 0 && dispatch.groups_z > 0 {
            let mut cpass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("terrasim-terrain-pass"),
                timestamp_writes: None,
            });
            cpass.set_pipeline(pipeline);
            cpass.set_bind_group(0, &res.bind_group, &[]);
            cpass.dispatch_workgroups(dispatch.groups_x, dispatch.groups_z, 1);
        }
        encoder.copy_buffer_to_buffer(
            &res.cells_out,
            0,
            &res.cells_readback,
            0,
            res.cells_readback.size(),
        );
        if targets.is_some() {
            for (field, readback) in res.fields.iter().zip(&res.field_readback) {
                encoder.copy_texture_to_buffer(
                    wgpu::ImageCopyTexture {
                        texture: &field.tex,
                        mip_level: 0,
                        origin: wgpu::Origin3d::ZERO,
                        aspect: wgpu::TextureAspect::All,
                    },
                    wgpu::ImageCopyBuffer {
                        buffer: readback,
                        layout: wgpu::ImageDataLayout {
                            offset: 0,
                            bytes_per_row: Some(res.padded_bpr),
                            rows_per_image: Some(dispatch.subdivisions_z),
                        },
                    },
                    extent(&dispatch),
                );
            }
        }
        queue.submit(Some(encoder.finish()));

        let mut readbacks = vec![&res.cells_readback];
        if targets.is_some() {
            readbacks.extend(res.field_readback.iter());
        }
        self.map_read(&readbacks)?;

        {
            let data = res.cells_readback.slice(..).get_mapped_range();
            output.copy_from_slice(bytemuck::cast_slice(&data));
        }
        res.cells_readback.unmap();

        if let Some(targets) = targets {
            let texels = [targets.water_height, targets.ground_height, targets.ground_splat];
            for (readback, out) in res.field_readback.iter().zip(texels) {
                {
                    let data = readback.slice(..).get_mapped_range();
                    unpack_f32_rows_padded(dispatch.subdivisions_x, res.padded_bpr, &data, out);
                }
                readback.unmap();
            }
        }
        Ok(())
    }

    /// Drops device resources after a failed dispatch so the next call starts clean.
    fn finish(&mut self, result: Result<(), KernelError>) -> Result<(), KernelError> {
        if result.is_err() {
            self.resources = None;
        }
        result
    }
}

impl GridKernel for GpuKernel {
    fn name(&self) -> &str {
        "wgpu"
    }

    fn find_entry(&mut self, entry: KernelEntry) -> Result<(), KernelError> {
        if self.pipelines.contains_key(&entry) {
            return Ok(());
        }
        if !declares_compute_entry(&self.source, entry.name()) {
            return Err(KernelError::EntryPointNotFound(entry.name().to_string()));
        }

        let device = &self.ctx.device;
        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some(entry.name()),
            layout: Some(&self.pipeline_layout),
            module: &self.module,
            entry_point: Some(entry.name()),
            compilation_options: wgpu::PipelineCompilationOptions::default(),
            cache: None,
        });
        if let Some(err) = pollster::block_on(device.pop_error_scope()) {
            return Err(KernelError::PipelineCreation {
                entry: entry.name().to_string(),
                message: err.to_string(),
            });
        }

        self.pipelines.insert(entry, pipeline);
        Ok(())
    }

    fn initialize(
        &mut self,
        params: &SimulationParameters,
        dispatch: DispatchGrid,
        output: &mut [GridCell],
    ) -> Result<(), KernelError> {
        dispatch.check_len(output.len())?;
        self.ensure_resources(dispatch)?;
        let result = self.run(KernelEntry::InitBuffer, params, None, output, None);
        self.finish(result)
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
        self.ensure_resources(dispatch)?;
        let result = self.run(KernelEntry::Step, params, Some(input), output, Some(targets));
        self.finish(result)
    }
}
