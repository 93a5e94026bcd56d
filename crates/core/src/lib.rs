//! Fluid Simulation Core Library
//!
//! A real-time incompressible fluid solver for interactive visuals. Velocity and dye
//! live on double-buffered 2D grids; every tick runs a fixed sequence of grid-parallel
//! passes on the GPU (wgpu compute) or on the CPU (Rayon).
//!
//! ## Pipeline
//!
//! - Semi-Lagrangian self-advection with dissipation
//! - Vorticity confinement
//! - Gaussian force and dye splats
//! - Jacobi pressure projection with warm start
//! - Adaptive quality control against a frame budget

pub mod compositor;
pub mod config;
pub mod error;
pub mod simulation;
pub mod solver;

// Re-export configuration and errors
pub use config::{BackendPreference, FluidConfig, QualityPreset, Resolution};
pub use error::FluidError;

// Re-export the engine surface
pub use compositor::{Compositor, DisplayFields};
pub use simulation::{DyeSplat, FluidSimulation, Force, Phase, SimulationStats, TickOutcome};
pub use solver::{
    create_backend, FieldData, FieldKind, FluidBackend, Pass, Precision, QualityState,
};

// Re-export nalgebra's vector type used by inputs
pub use nalgebra::Vector2;
