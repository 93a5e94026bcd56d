//! Grid-based fluid solver module
//!
//! This module provides a unified GPU/CPU abstraction layer for the fluid passes.
//! The core abstraction is the `FluidBackend` trait, which has both CPU and GPU
//! implementations. Backends own every field; the step engine only describes passes.
//!
//! # Feature Flags
//!
//! - `gpu` (default): Enables GPU acceleration via wgpu. Disable with `--no-default-features`
//!   for environments without GPU access.
//!
//! # Backend Selection
//!
//! With [`BackendPreference::Auto`] the best available backend is selected:
//! 1. Try GPU (if `gpu` feature enabled and hardware available)
//! 2. Fall back to CPU (always available)
//!
//! # Example
//!
//! ```rust,ignore
//! use fluid_sim_core::solver::create_backend;
//! use fluid_sim_core::FluidConfig;
//!
//! let backend = create_backend(&FluidConfig::default())?;
//! ```

mod context;
mod cpu;
mod double_buffer;
mod fields;
pub mod kernels;
mod layout;
pub mod profiler;
pub mod quality;
mod store;
#[allow(clippy::module_name_repetitions)]
mod r#trait;

#[cfg(feature = "gpu")]
mod gpu;
#[cfg(feature = "gpu")]
mod gpu_kernels;

// Re-exports
pub use context::GpuInitResult;
pub use cpu::CpuBackend;
pub use double_buffer::{DoubleBuffer, ReadSide, WriteSide};
pub use fields::FieldData;
pub use layout::{ChannelLayout, Precision};
pub use profiler::{FrameTimer, ProfilerScope};
pub use quality::{Adjustment, QualityController, QualityKnob, QualityState};
pub use r#trait::{field_len, FieldKind, FlowField, FluidBackend, Pass, SplatPass};
pub use store::{allocate_with_fallback, CpuFieldStore, FieldStore};

#[cfg(feature = "gpu")]
pub use context::GpuContext;
#[cfg(feature = "gpu")]
pub use gpu::{GpuBackend, GpuField, GpuFieldStore};

use crate::config::{BackendPreference, FluidConfig};
use crate::error::FluidError;
use tracing::info;

#[cfg(feature = "gpu")]
use tracing::warn;

/// Create a pass executor honoring the configured backend preference
///
/// `Auto` tries the GPU and falls back to the CPU backend; `Gpu` fails instead of
/// falling back; `Cpu` never touches the GPU.
///
/// # Errors
///
/// Returns `FluidError::Device` when `Gpu` is requested and no usable device exists,
/// or the allocation error of the chosen backend.
pub fn create_backend(config: &FluidConfig) -> Result<Box<dyn FluidBackend>, FluidError> {
    let grid = config.grid_resolution;
    let dye = config.dye_resolution;

    if config.backend == BackendPreference::Cpu {
        info!("CPU backend requested ({} grid, {} dye)", grid, dye);
        return Ok(Box::new(CpuBackend::new(grid, dye)?));
    }

    #[cfg(feature = "gpu")]
    {
        let required = config.backend == BackendPreference::Gpu;
        let reason = match GpuContext::new() {
            GpuInitResult::Success(gpu_context) => {
                if gpu_context.can_allocate((grid.width, grid.height), (dye.width, dye.height)) {
                    info!(
                        "Using GPU backend: {} ({} grid, {} dye)",
                        gpu_context.adapter_name(),
                        grid,
                        dye
                    );
                    match GpuBackend::new(gpu_context, grid, dye, config.precision) {
                        Ok(backend) => return Ok(Box::new(backend)),
                        Err(e) if required => return Err(e),
                        Err(e) => {
                            warn!("GPU field allocation failed: {}. Falling back to CPU.", e);
                            format!("field allocation failed: {e}")
                        }
                    }
                } else {
                    warn!(
                        "GPU limits too small for {} grid / {} dye, falling back to CPU",
                        grid, dye
                    );
                    format!("device limits too small for {grid} grid / {dye} dye")
                }
            }
            GpuInitResult::NoGpuFound => {
                info!("No GPU found, using CPU backend");
                "no GPU adapter found".to_string()
            }
            GpuInitResult::InitFailed {
                adapter_name,
                error,
            } => {
                warn!(
                    "GPU '{}' found but failed to initialize: {}. Falling back to CPU.",
                    adapter_name, error
                );
                format!("GPU '{adapter_name}' failed to initialize: {error}")
            }
        };
        if required {
            return Err(FluidError::Device(reason));
        }
    }

    #[cfg(not(feature = "gpu"))]
    {
        if config.backend == BackendPreference::Gpu {
            return Err(FluidError::Device(
                "GPU backend requested but the `gpu` feature is disabled".into(),
            ));
        }
        info!("GPU feature disabled, using CPU backend");
    }

    Ok(Box::new(CpuBackend::new(grid, dye)?))
}
