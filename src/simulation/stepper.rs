//! The simulation state machine.
//!
//! `Uninitialized -> Ready -> Stepping -> Presenting`, looping between the last two
//! once per frame. Every transition that touches the kernel either completes or leaves
//! the previous state in place.

use glam::{Mat4, Vec3};

use crate::mesh::{Surface, SurfaceKind};
use crate::noise::NoiseField;
use crate::textures::TextureCache;
use super::config::{SimulationBackend, SimulationConfig};
use super::cpu::CpuKernel;
use super::error::SimulationError;
use super::gpu::{GpuContext, GpuKernel};
use super::kernel::{DispatchGrid, GridKernel, KernelEntry, KernelError};
use super::params::{FrameInputs, SimulationParameters};
use super::store::{GroundSeedConfig, StateStore};
use super::transform::world_to_grid;

/// Lifecycle phase of a [`Simulation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimulationPhase {
    Uninitialized,
    Ready,
    Stepping,
    Presenting,
}

/// Optional initial ground for [`Simulation::initialize`].
#[derive(Debug, Clone)]
pub struct GroundSeed {
    pub field: NoiseField,
    pub config: GroundSeedConfig,
}

/// Everything allocated by `initialize`.
struct Runtime {
    store: StateStore,
    textures: TextureCache,
    ground: Surface,
    water: Surface,
}

/// Builds the kernel for the requested backend.
///
/// `Auto` tries the GPU first and falls back to the CPU kernel.
pub fn create_kernel(backend: SimulationBackend) -> Result<Box<dyn GridKernel>, SimulationError> {
    let run_gpu = || -> Result<Box<dyn GridKernel>, SimulationError> {
        let ctx = pollster::block_on(GpuContext::new())?;
        let kernel = GpuKernel::new(ctx)?;
        log::info!("using GPU kernel on '{}'", kernel.adapter_name());
        Ok(Box::new(kernel))
    };

    match backend {
        SimulationBackend::CpuOnly => Ok(Box::new(CpuKernel::new())),
        SimulationBackend::GpuOnly => run_gpu(),
        SimulationBackend::Auto => match run_gpu() {
            Ok(kernel) => Ok(kernel),
            Err(e) => {
                log::warn!("GPU kernel unavailable ({e}); falling back to CPU");
                Ok(Box::new(CpuKernel::new()))
            }
        },
    }
}

fn dispatch_error(e: KernelError) -> SimulationError {
    match e {
        e if e.is_configuration() => SimulationError::Configuration(e.to_string()),
        KernelError::ResourceExhaustion(message) => SimulationError::ResourceExhaustion(message),
        KernelError::EmptyGrid(..) => SimulationError::InvalidArgument(e.to_string()),
        e => SimulationError::Kernel(e),
    }
}

/// Runs one kernel call, retrying once on a transient failure.
fn dispatch_with_retry<F>(entry: KernelEntry, mut call: F) -> Result<(), SimulationError>
where
    F: FnMut() -> Result<(), KernelError>,
{
    match call() {
        Ok(()) => Ok(()),
        Err(e) if e.is_transient() => {
            log::warn!("kernel '{}' failed ({e}); retrying once", entry.name());
            call().map_err(dispatch_error)
        }
        Err(e) => Err(dispatch_error(e)),
    }
}

/// A water/erosion simulation over a fixed grid.
pub struct Simulation {
    config: SimulationConfig,
    kernel: Box<dyn GridKernel>,
    phase: SimulationPhase,
    runtime: Option<Runtime>,
    water_source: Option<Vec3>,
    terrain_transform: Mat4,
    steps_taken: u64,
}

impl Simulation {
    /// Creates a simulation with the kernel selected by `config.backend`.
    pub fn new(config: SimulationConfig) -> Result<Self, SimulationError> {
        let kernel = create_kernel(config.backend)?;
        Ok(Self::with_kernel(config, kernel))
    }

    pub fn with_kernel(config: SimulationConfig, kernel: Box<dyn GridKernel>) -> Self {
        Self {
            config,
            kernel,
            phase: SimulationPhase::Uninitialized,
            runtime: None,
            water_source: None,
            terrain_transform: Mat4::IDENTITY,
            steps_taken: 0,
        }
    }

    pub fn phase(&self) -> SimulationPhase {
        self.phase
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn kernel_name(&self) -> &str {
        self.kernel.name()
    }

    /// Number of successful steps since initialization.
    pub fn steps_taken(&self) -> u64 {
        self.steps_taken
    }

    pub fn store(&self) -> Option<&StateStore> {
        self.runtime.as_ref().map(|r| &r.store)
    }

    pub fn textures(&self) -> Option<&TextureCache> {
        self.runtime.as_ref().map(|r| &r.textures)
    }

    pub fn ground_surface(&self) -> Option<&Surface> {
        self.runtime.as_ref().map(|r| &r.ground)
    }

    pub fn water_surface(&self) -> Option<&Surface> {
        self.runtime.as_ref().map(|r| &r.water)
    }

    /// Attaches the water source at a world position, or detaches it with `None`.
    pub fn set_water_source(&mut self, world_position: Option<Vec3>) {
        self.water_source = world_position;
    }

    /// Sets the terrain's local-to-world transform.
    pub fn set_terrain_transform(&mut self, terrain_to_world: Mat4) {
        self.terrain_transform = terrain_to_world;
    }

    /// Current source position in normalized grid space.
    pub fn source_grid_position(&self) -> Option<Vec3> {
        self.water_source.map(|world| {
            world_to_grid(
                &self.terrain_transform,
                world,
                self.config.terrain_width,
                self.config.terrain_length,
            )
        })
    }

    fn dispatch_grid(&self) -> DispatchGrid {
        DispatchGrid::new(self.config.subdivisions_x, self.config.subdivisions_z)
    }

    fn find_entry(&mut self, entry: KernelEntry) -> Result<(), SimulationError> {
        self.kernel.find_entry(entry).map_err(|e| {
            log::error!("{} kernel: {e}", self.kernel.name());
            dispatch_error(e)
        })
    }

    fn require_initialized(&self, operation: &'static str) -> Result<(), SimulationError> {
        if self.phase == SimulationPhase::Uninitialized || self.runtime.is_none() {
            return Err(SimulationError::InvalidPhase {
                expected: operation,
                actual: self.phase,
            });
        }
        Ok(())
    }

    /// Allocates buffers, textures and surfaces, then runs the init kernel.
    ///
    /// Nothing is committed unless every stage succeeds.
    pub fn initialize(&mut self, seed: Option<&GroundSeed>) -> Result<(), SimulationError> {
        if self.phase != SimulationPhase::Uninitialized {
            return Err(SimulationError::InvalidPhase {
                expected: "Uninitialized",
                actual: self.phase,
            });
        }
        self.config.validate()?;
        self.find_entry(KernelEntry::InitBuffer)?;

        let config = &self.config;
        let (sx, sz) = (config.subdivisions_x, config.subdivisions_z);
        let mut store = StateStore::allocate(sx, sz)?;
        let textures = TextureCache::allocate(sx, sz, config.water_texture_initial)?;
        let ground = Surface::build(
            SurfaceKind::Ground,
            config.terrain_width,
            config.terrain_length,
            sx,
            sz,
        )?;
        let water = Surface::build(
            SurfaceKind::Water,
            config.terrain_width,
            config.terrain_length,
            sx,
            sz,
        )?;

        let frame = FrameInputs {
            delta_time: 0.0,
            source_position: self.source_grid_position(),
        };
        let params = SimulationParameters::snapshot(config, frame, [0.0; 3]);
        store.write(params);

        let dispatch = self.dispatch_grid();
        let kernel = self.kernel.as_mut();
        dispatch_with_retry(KernelEntry::InitBuffer, || {
            kernel.initialize(&params, dispatch, store.current_mut())
        })?;

        if let Some(seed) = seed {
            store.seed_ground(&seed.field, &seed.config)?;
        }

        log::info!(
            "initialized {}x{} grid on {} kernel ({} groups)",
            sx,
            sz,
            self.kernel.name(),
            dispatch.groups_x * dispatch.groups_z
        );
        self.runtime = Some(Runtime {
            store,
            textures,
            ground,
            water,
        });
        self.phase = SimulationPhase::Ready;
        self.steps_taken = 0;
        Ok(())
    }

    /// Advances the grid by one step of `delta_time` seconds.
    ///
    /// Buffers swap only when the kernel succeeds.
    pub fn step(&mut self, delta_time: f32) -> Result<(), SimulationError> {
        self.require_initialized("Ready, Stepping or Presenting")?;
        if !delta_time.is_finite() {
            return Err(SimulationError::InvalidArgument(format!(
                "delta_time must be finite (got {delta_time})"
            )));
        }
        self.find_entry(KernelEntry::Step)?;

        let source = self.source_grid_position();
        let dispatch = self.dispatch_grid();
        let runtime = self
            .runtime
            .as_mut()
            .ok_or(SimulationError::InvalidPhase {
                expected: "Ready, Stepping or Presenting",
                actual: self.phase,
            })?;

        let fallback = runtime.store.parameters().source_position;
        let frame = FrameInputs {
            delta_time,
            source_position: source,
        };
        let params = SimulationParameters::snapshot(&self.config, frame, fallback);

        let kernel = self.kernel.as_mut();
        dispatch_with_retry(KernelEntry::Step, || {
            let (input, output) = runtime.store.split();
            kernel.step(&params, dispatch, input, output, runtime.textures.live_targets())
        })?;

        runtime.store.write(params);
        runtime.store.swap();
        self.steps_taken += 1;
        self.phase = SimulationPhase::Stepping;
        log::trace!("step {} done (dt = {delta_time})", self.steps_taken);
        Ok(())
    }

    /// Copies every live texture into its presented texture.
    pub fn present(&mut self) -> Result<(), SimulationError> {
        self.require_initialized("Ready, Stepping or Presenting")?;
        if let Some(runtime) = self.runtime.as_mut() {
            runtime.textures.present_all()?;
        }
        self.phase = SimulationPhase::Presenting;
        Ok(())
    }

    /// Runs `steps_per_frame` steps and presents the result.
    pub fn advance_frame(&mut self, delta_time: f32) -> Result<(), SimulationError> {
        for _ in 0..self.config.steps_per_frame {
            self.step(delta_time)?;
        }
        self.present()
    }
}
