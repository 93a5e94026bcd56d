//! Shared setup for the integration suites
#![allow(dead_code)]

use fluid_sim_core::{BackendPreference, FluidConfig, FluidSimulation, Resolution};
use tracing_subscriber::EnvFilter;

#[ctor::ctor]
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Small CPU configuration with adaptive quality off
pub fn cpu_config(grid: u32, dye: u32) -> FluidConfig {
    FluidConfig {
        grid_resolution: Resolution::square(grid),
        dye_resolution: Resolution::square(dye),
        backend: BackendPreference::Cpu,
        adaptive_quality: false,
        ..FluidConfig::default()
    }
}

/// CPU simulation built from [`cpu_config`]
pub fn cpu_simulation(grid: u32, dye: u32) -> FluidSimulation {
    FluidSimulation::new(cpu_config(grid, dye)).expect("CPU backend always available")
}
