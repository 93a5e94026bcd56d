//! C ABI for the fluid simulation core
//!
//! Instances are opaque pointers created by `fluid_sim_new` and released with
//! `fluid_sim_destroy`. Every fallible function returns a `FluidSimErrorCode`; the
//! message for the most recent failure on the calling thread is available from
//! `fluid_sim_get_last_error`.
//!
//! The C header `FluidSimFFI.h` is generated by `build.rs` at the workspace root.

mod error;
mod helpers;
mod instance;
mod queries;
mod simulation;

pub use error::{fluid_sim_get_last_error, fluid_sim_get_last_error_code, FluidSimErrorCode};
pub use instance::{
    fluid_sim_default_config, fluid_sim_destroy, fluid_sim_new, FluidSimBackend, FluidSimConfig,
    FluidSimInstance, FluidSimPreset,
};
pub use queries::{
    fluid_sim_get_stats, fluid_sim_quality, fluid_sim_read_dye, FluidSimQuality, FluidSimStats,
};
pub use simulation::{
    fluid_sim_pause, fluid_sim_push_force, fluid_sim_push_splat, fluid_sim_random_splats,
    fluid_sim_reinitialize, fluid_sim_resize, fluid_sim_resume, fluid_sim_splat_pointer,
    fluid_sim_step, fluid_sim_tick,
};
