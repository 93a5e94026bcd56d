use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use fluid_sim_core::simulation::diagnostics::{max_magnitude, value_range};
use fluid_sim_core::{
    BackendPreference, Compositor, DyeSplat, FieldKind, FluidConfig, FluidSimulation, Force,
    QualityPreset, TickOutcome, Vector2,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::PathBuf;
use std::time::Instant;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Scenario {
    /// One horizontal push through the center with a dye marker
    Impulse,
    /// Random splats every few ticks
    Random,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Backend {
    Auto,
    Cpu,
    Gpu,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Preset {
    Ultra,
    High,
    Medium,
    Low,
}

/// Headless fluid simulation runner
#[derive(Parser, Debug)]
#[command(name = "fluid-sim-demo")]
#[command(about = "Runs the fluid solver without a window and reports field statistics", long_about = None)]
struct Args {
    /// Scripted input pattern
    #[arg(short, long, value_enum, default_value_t = Scenario::Impulse)]
    scenario: Scenario,

    /// Number of ticks to run
    #[arg(short, long, default_value_t = 300)]
    ticks: u32,

    /// Fixed timestep in seconds (ignored with --realtime)
    #[arg(long, default_value_t = 1.0 / 60.0)]
    dt: f32,

    /// Drive ticks from the wall clock and feed the quality controller
    #[arg(long)]
    realtime: bool,

    /// Pass executor
    #[arg(short, long, value_enum, default_value_t = Backend::Auto)]
    backend: Backend,

    /// Resolution preset (overridden by --config)
    #[arg(short, long, value_enum, default_value_t = Preset::Medium)]
    preset: Preset,

    /// JSON configuration file (camelCase keys, missing keys take defaults)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Write the final composited frame as PNG
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output image width in pixels
    #[arg(long, default_value_t = 512)]
    width: u32,

    /// Output image height in pixels
    #[arg(long, default_value_t = 512)]
    height: u32,

    /// Ticks between reports
    #[arg(short, long, default_value_t = 60)]
    report_interval: u32,

    /// Random seed for the random scenario
    #[arg(long, default_value_t = 7)]
    seed: u64,

    /// Fail unless fields stay finite and dye stays within its clamp
    #[arg(short, long)]
    validate: bool,
}

fn load_config(args: &Args) -> Result<FluidConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let data = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            serde_json::from_str(&data).with_context(|| format!("parsing {}", path.display()))?
        }
        None => FluidConfig::from_preset(match args.preset {
            Preset::Ultra => QualityPreset::Ultra,
            Preset::High => QualityPreset::High,
            Preset::Medium => QualityPreset::Medium,
            Preset::Low => QualityPreset::Low,
        }),
    };
    config.backend = match args.backend {
        Backend::Auto => BackendPreference::Auto,
        Backend::Cpu => BackendPreference::Cpu,
        Backend::Gpu => BackendPreference::Gpu,
    };
    Ok(config)
}

fn report(sim: &FluidSimulation, tick: u32) -> Result<()> {
    let stats = sim.stats();
    let velocity = sim.read_field(FieldKind::Velocity)?;
    let dye = sim.read_field(FieldKind::Dye)?;
    let (_, dye_max) = value_range(dye.as_slice());
    println!(
        "tick {:>5} | t={:>6.2}s | step {:>6.2}ms | iters {:>2} | grid {} | dye {} | max |v| {:>8.2} | max dye {:.3} | div {:.4}",
        tick,
        stats.simulation_time,
        stats.last_step_ms,
        stats.pressure_iterations,
        stats.grid_resolution,
        stats.dye_resolution,
        max_magnitude(&velocity),
        dye_max,
        sim.post_projection_divergence()?,
    );
    Ok(())
}

fn validate(sim: &FluidSimulation) -> Result<()> {
    for kind in FieldKind::ALL {
        let field = sim.read_field(kind)?;
        let bad = field.count_non_finite();
        if bad > 0 {
            bail!("{kind} holds {bad} non-finite values");
        }
    }
    let dye = sim.read_field(FieldKind::Dye)?;
    let (lo, hi) = value_range(dye.as_slice());
    let dye_max = sim.config().dye_max;
    if lo < 0.0 || hi > dye_max {
        bail!("dye range [{lo}, {hi}] escapes [0, {dye_max}]");
    }
    println!("Validation passed: fields finite, dye within [0, {dye_max}]");
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let config = load_config(&args)?;

    println!("=== Fluid Simulation Demo ===\n");
    let mut sim = FluidSimulation::new(config)?;
    let (grid, dye) = sim.resolutions();
    println!(
        "Backend: {} | grid {} | dye {} | scenario {:?}\n",
        sim.backend_name(),
        grid,
        dye,
        args.scenario
    );

    let mut rng = StdRng::seed_from_u64(args.seed);
    if let Scenario::Impulse = args.scenario {
        sim.push_force(Force::new(
            Vector2::new(0.25, 0.5),
            Vector2::new(1.0, 0.0),
            0.08,
            800.0,
        ))?;
        sim.push_splat(DyeSplat::new(Vector2::new(0.25, 0.5), [0.9, 0.3, 0.1], 0.08))?;
    }

    let started = Instant::now();
    for tick in 1..=args.ticks {
        if matches!(args.scenario, Scenario::Random) && tick % 20 == 1 {
            sim.random_splats(&mut rng, 3);
        }

        if args.realtime {
            if let TickOutcome::Stepped {
                quality: Some(state),
                ..
            } = sim.tick(Instant::now())
            {
                if let Some(adjustment) = state.adjustment {
                    println!("Quality adjusted at tick {tick}: {adjustment:?}");
                }
            }
        } else {
            sim.step(args.dt);
        }

        if args.report_interval > 0 && tick % args.report_interval == 0 {
            report(&sim, tick)?;
        }
    }
    info!(
        "Ran {} ticks in {:.2}s",
        args.ticks,
        started.elapsed().as_secs_f32()
    );

    if args.validate {
        validate(&sim)?;
    }

    if let Some(path) = &args.output {
        let fields = sim.display_fields()?;
        let pixels = Compositor::default().render_rgba8(&fields, args.width, args.height);
        let Some(image) = image::RgbaImage::from_raw(args.width, args.height, pixels) else {
            bail!("compositor returned a frame of the wrong size");
        };
        image
            .save(path)
            .with_context(|| format!("writing {}", path.display()))?;
        println!("Wrote {}", path.display());
    }

    Ok(())
}
