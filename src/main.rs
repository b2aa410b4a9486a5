//! Terrasim CLI - hydraulic erosion terrain simulator.
//!
//! Runs the simulation headless for a number of frames and exports the presented
//! textures, or inspects the meshes and noise fields it is built from.

use clap::{Parser, Subcommand, ValueEnum};
use env_logger::Env;
use glam::Vec3;
use std::error::Error;
use std::path::{Path, PathBuf};
use std::time::Instant;

use terrasim::export::{
    export_noise_png, export_texture_png, export_texture_raw, PngExportOptions, RawFormat,
};
use terrasim::mesh::{Surface, SurfaceKind};
use terrasim::noise::{generate_noise_map, GradientNoise, NoiseMapConfig};
use terrasim::simulation::{
    GridCell, GroundSeed, GroundSeedConfig, Simulation, SimulationBackend, SimulationConfig,
};
use terrasim::textures::TextureId;

/// Hydraulic erosion terrain simulator.
#[derive(Parser)]
#[command(name = "terrasim")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the simulation and export the presented textures.
    Run {
        /// JSON configuration file; missing fields take their defaults.
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Cells along X.
        #[arg(long)]
        subdivisions_x: Option<u32>,

        /// Cells along Z.
        #[arg(long)]
        subdivisions_z: Option<u32>,

        /// Number of frames to run (overrides `step_count`).
        #[arg(short, long)]
        frames: Option<u32>,

        /// Kernel steps per frame.
        #[arg(long)]
        steps_per_frame: Option<u32>,

        /// Frame time in seconds.
        #[arg(long, default_value = "0.016")]
        dt: f32,

        /// Kernel backend.
        #[arg(short, long)]
        backend: Option<BackendArg>,

        /// World position of the water source as `x y z`.
        #[arg(long, num_args = 3, value_names = ["X", "Y", "Z"], allow_negative_numbers = true)]
        source: Option<Vec<f32>>,

        /// Seed the ground from gradient noise with this seed.
        #[arg(long)]
        seed_noise: Option<i32>,

        /// Noise scale for ground seeding.
        #[arg(long, default_value = "64.0")]
        noise_scale: f32,

        /// Ground height where the seeding noise is 1.
        #[arg(long, default_value = "8.0")]
        max_height: f32,

        /// Output directory for exported textures.
        #[arg(short, long, default_value = "./output")]
        output: PathBuf,

        /// Export format.
        #[arg(long, default_value = "png")]
        format: ExportFormat,
    },

    /// Display mesh statistics for a terrain configuration.
    Mesh {
        /// Terrain extent along X.
        #[arg(long, default_value = "128.0")]
        width: f32,

        /// Terrain extent along Z.
        #[arg(long, default_value = "128.0")]
        length: f32,

        /// Cells along X.
        #[arg(long, default_value = "512")]
        subdivisions_x: u32,

        /// Cells along Z.
        #[arg(long, default_value = "512")]
        subdivisions_z: u32,
    },

    /// Generate a normalized noise field and export it as PNG.
    Noise {
        #[arg(long, default_value = "256")]
        width: u32,

        #[arg(long, default_value = "256")]
        height: u32,

        /// Noise seed.
        #[arg(short, long, default_value = "42")]
        seed: i32,

        #[arg(long, default_value = "32.0")]
        scale: f32,

        #[arg(long, default_value = "4")]
        octaves: u32,

        #[arg(long, default_value = "0.5")]
        persistence: f32,

        #[arg(long, default_value = "2.0")]
        lacunarity: f32,

        /// Output PNG path.
        #[arg(short, long, default_value = "./noise.png")]
        output: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum BackendArg {
    /// Prefer GPU, fall back to CPU.
    Auto,
    /// Require GPU.
    Gpu,
    /// CPU only.
    Cpu,
}

impl From<BackendArg> for SimulationBackend {
    fn from(arg: BackendArg) -> Self {
        match arg {
            BackendArg::Auto => SimulationBackend::Auto,
            BackendArg::Gpu => SimulationBackend::GpuOnly,
            BackendArg::Cpu => SimulationBackend::CpuOnly,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum ExportFormat {
    /// 16-bit PNG normalized to each texture's range.
    Png,
    /// 32-bit float RAW (exact values).
    RawFloat,
}

struct RunArgs {
    config: Option<PathBuf>,
    subdivisions_x: Option<u32>,
    subdivisions_z: Option<u32>,
    frames: Option<u32>,
    steps_per_frame: Option<u32>,
    dt: f32,
    backend: Option<BackendArg>,
    source: Option<Vec<f32>>,
    seed_noise: Option<i32>,
    noise_scale: f32,
    max_height: f32,
    output: PathBuf,
    format: ExportFormat,
}

fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run {
            config,
            subdivisions_x,
            subdivisions_z,
            frames,
            steps_per_frame,
            dt,
            backend,
            source,
            seed_noise,
            noise_scale,
            max_height,
            output,
            format,
        } => run_simulation(RunArgs {
            config,
            subdivisions_x,
            subdivisions_z,
            frames,
            steps_per_frame,
            dt,
            backend,
            source,
            seed_noise,
            noise_scale,
            max_height,
            output,
            format,
        }),
        Commands::Mesh {
            width,
            length,
            subdivisions_x,
            subdivisions_z,
        } => show_mesh_info(width, length, subdivisions_x, subdivisions_z),
        Commands::Noise {
            width,
            height,
            seed,
            scale,
            octaves,
            persistence,
            lacunarity,
            output,
        } => {
            let config = NoiseMapConfig {
                scale,
                octaves,
                persistence,
                lacunarity,
            };
            write_noise(width, height, seed, &config, &output)
        }
    };

    if let Err(e) = result {
        log::error!("{e}");
        std::process::exit(1);
    }
}

fn run_simulation(args: RunArgs) -> Result<(), Box<dyn Error>> {
    let mut config = match &args.config {
        Some(path) => SimulationConfig::from_json_file(path)?,
        None => SimulationConfig::default(),
    };
    if let Some(sx) = args.subdivisions_x {
        config.subdivisions_x = sx;
    }
    if let Some(sz) = args.subdivisions_z {
        config.subdivisions_z = sz;
    }
    if let Some(frames) = args.frames {
        config.step_count = frames;
    }
    if let Some(steps) = args.steps_per_frame {
        config.steps_per_frame = steps;
    }
    if let Some(backend) = args.backend {
        config.backend = backend.into();
    }
    config.validate()?;

    println!("Terrasim - Hydraulic Erosion Simulator");
    println!("======================================");
    println!(
        "Terrain: {}x{} world units, {}x{} cells",
        config.terrain_width, config.terrain_length, config.subdivisions_x, config.subdivisions_z
    );
    println!(
        "Frames: {} x {} steps, dt = {}",
        config.step_count, config.steps_per_frame, args.dt
    );
    println!("Output: {}", args.output.display());

    let seed = match args.seed_noise {
        Some(noise_seed) => {
            let noise = NoiseMapConfig {
                scale: args.noise_scale,
                ..Default::default()
            };
            let field = generate_noise_map(
                &GradientNoise::new(noise_seed),
                config.subdivisions_x,
                config.subdivisions_z,
                &noise,
            )?;
            Some(GroundSeed {
                field,
                config: GroundSeedConfig {
                    max_height: args.max_height,
                    ..Default::default()
                },
            })
        }
        None => None,
    };

    let frames = config.step_count;
    let mut sim = Simulation::new(config)?;
    println!("Kernel: {}", sim.kernel_name());
    if let Some(pos) = &args.source {
        let pos = Vec3::new(pos[0], pos[1], pos[2]);
        println!("Water source: ({}, {}, {})", pos.x, pos.y, pos.z);
        sim.set_water_source(Some(pos));
    }

    let start = Instant::now();
    sim.initialize(seed.as_ref())?;
    for frame in 0..frames {
        sim.advance_frame(args.dt)?;
        log::debug!("frame {}/{} presented", frame + 1, frames);
    }
    if frames == 0 {
        sim.present()?;
    }
    println!(
        "Simulated {} steps in {:.2?}",
        sim.steps_taken(),
        start.elapsed()
    );

    std::fs::create_dir_all(&args.output)?;
    let textures = sim
        .textures()
        .ok_or("simulation produced no textures")?;
    println!("\nExporting textures...");
    for id in TextureId::ALL {
        let texture = textures.presented(id);
        let (min, max) = texture.value_range();
        match args.format {
            ExportFormat::Png => {
                let path = args.output.join(format!("{}.png", id.name()));
                export_texture_png(texture, &path, &PngExportOptions::auto_range(texture))?;
                println!("  {} [{:.4}, {:.4}] -> {}", id.name(), min, max, path.display());
            }
            ExportFormat::RawFloat => {
                let path = args.output.join(format!("{}.raw", id.name()));
                export_texture_raw(texture, &path, RawFormat::R32Float, min, max)?;
                println!("  {} [{:.4}, {:.4}] -> {}", id.name(), min, max, path.display());
            }
        }
    }

    Ok(())
}

fn show_mesh_info(
    width: f32,
    length: f32,
    subdivisions_x: u32,
    subdivisions_z: u32,
) -> Result<(), Box<dyn Error>> {
    println!("Terrasim Mesh Information");
    println!("=========================");
    println!("Extent: {} x {}", width, length);
    println!("Subdivisions: {} x {}", subdivisions_x, subdivisions_z);

    for kind in [SurfaceKind::Ground, SurfaceKind::Water] {
        let surface = Surface::build(kind, width, length, subdivisions_x, subdivisions_z)?;
        let mesh = &surface.mesh;
        println!("\n{:?} surface:", kind);
        println!("  Vertices: {}", mesh.vertex_count());
        println!("  Triangles: {}", mesh.triangle_count());
        println!(
            "  Index buffer: {:.2} MB (u32)",
            (mesh.indices().len() * 4) as f64 / (1024.0 * 1024.0)
        );
        for binding in &surface.bindings {
            println!(
                "  {} <- {}",
                binding.slot.property_name(),
                binding.texture.name()
            );
        }
    }

    let cells = subdivisions_x as u64 * subdivisions_z as u64;
    println!(
        "\nCell buffers: 2 x {:.2} MB",
        (cells * std::mem::size_of::<GridCell>() as u64) as f64 / (1024.0 * 1024.0)
    );
    Ok(())
}

fn write_noise(
    width: u32,
    height: u32,
    seed: i32,
    config: &NoiseMapConfig,
    output: &Path,
) -> Result<(), Box<dyn Error>> {
    let start = Instant::now();
    let field = generate_noise_map(&GradientNoise::new(seed), width, height, config)?;
    if let Some(parent) = output.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    export_noise_png(&field, output)?;
    println!(
        "Noise {}x{} (seed {}) written to {} in {:.2?}",
        width,
        height,
        seed,
        output.display(),
        start.elapsed()
    );
    Ok(())
}
