use fluid_sim_core::{
    BackendPreference, Compositor, FluidConfig, FluidSimulation, Precision, QualityPreset,
    Resolution,
};
use std::ptr;
use std::sync::{Mutex, RwLock};
use tracing::info;

use crate::error::{DefaultFluidSimError, FluidSimErrorCode};
use crate::helpers::{track_error, track_result};

/// Resolution preset selector for C callers.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FluidSimPreset {
    /// 256 grid, 1024 dye
    Ultra = 0,
    /// 128 grid, 1024 dye
    High = 1,
    /// 128 grid, 512 dye
    Medium = 2,
    /// 64 grid, 256 dye
    Low = 3,
}

impl From<FluidSimPreset> for QualityPreset {
    fn from(preset: FluidSimPreset) -> Self {
        match preset {
            FluidSimPreset::Ultra => Self::Ultra,
            FluidSimPreset::High => Self::High,
            FluidSimPreset::Medium => Self::Medium,
            FluidSimPreset::Low => Self::Low,
        }
    }
}

/// Pass executor selector for C callers.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FluidSimBackend {
    /// GPU when available, CPU otherwise
    Auto = 0,
    /// Always the CPU backend
    Cpu = 1,
    /// GPU only; creation fails without a usable device
    Gpu = 2,
}

/// Flat, C-compatible mirror of the core configuration.
///
/// Obtain one from `fluid_sim_default_config`, adjust fields, then pass it to
/// `fluid_sim_new`. Every value is validated on creation.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct FluidSimConfig {
    pub grid_width: u32,
    pub grid_height: u32,
    pub dye_width: u32,
    pub dye_height: u32,
    pub pressure_iterations: u32,
    pub dissipation_velocity: f32,
    pub dissipation_dye: f32,
    pub curl_strength: f32,
    pub target_frame_ms: f32,
    pub pressure_warm_start: f32,
    pub splat_radius: f32,
    pub splat_force: f32,
    pub dye_max: f32,
    pub max_dt: f32,
    /// Store GPU fields at 32-bit precision instead of 16-bit
    pub single_precision: bool,
    pub adaptive_quality: bool,
    pub diagnostic_interval: u32,
    pub backend: FluidSimBackend,
}

impl From<&FluidConfig> for FluidSimConfig {
    fn from(config: &FluidConfig) -> Self {
        Self {
            grid_width: config.grid_resolution.width,
            grid_height: config.grid_resolution.height,
            dye_width: config.dye_resolution.width,
            dye_height: config.dye_resolution.height,
            pressure_iterations: config.pressure_iterations,
            dissipation_velocity: config.dissipation_velocity,
            dissipation_dye: config.dissipation_dye,
            curl_strength: config.curl_strength,
            target_frame_ms: config.target_frame_ms,
            pressure_warm_start: config.pressure_warm_start,
            splat_radius: config.splat_radius,
            splat_force: config.splat_force,
            dye_max: config.dye_max,
            max_dt: config.max_dt,
            single_precision: config.precision == Precision::Single,
            adaptive_quality: config.adaptive_quality,
            diagnostic_interval: config.diagnostic_interval,
            backend: match config.backend {
                BackendPreference::Auto => FluidSimBackend::Auto,
                BackendPreference::Cpu => FluidSimBackend::Cpu,
                BackendPreference::Gpu => FluidSimBackend::Gpu,
            },
        }
    }
}

impl From<&FluidSimConfig> for FluidConfig {
    fn from(config: &FluidSimConfig) -> Self {
        Self {
            grid_resolution: Resolution::new(config.grid_width, config.grid_height),
            dye_resolution: Resolution::new(config.dye_width, config.dye_height),
            pressure_iterations: config.pressure_iterations,
            dissipation_velocity: config.dissipation_velocity,
            dissipation_dye: config.dissipation_dye,
            curl_strength: config.curl_strength,
            target_frame_ms: config.target_frame_ms,
            pressure_warm_start: config.pressure_warm_start,
            splat_radius: config.splat_radius,
            splat_force: config.splat_force,
            dye_max: config.dye_max,
            max_dt: config.max_dt,
            precision: if config.single_precision {
                Precision::Single
            } else {
                Precision::Half
            },
            adaptive_quality: config.adaptive_quality,
            diagnostic_interval: config.diagnostic_interval,
            backend: match config.backend {
                FluidSimBackend::Auto => BackendPreference::Auto,
                FluidSimBackend::Cpu => BackendPreference::Cpu,
                FluidSimBackend::Gpu => BackendPreference::Gpu,
            },
        }
    }
}

/// The fluid simulation context handed to C callers as an opaque pointer.
///
/// # Thread Safety
/// The simulation sits behind an `RwLock`: queries take a read lock, ticks and inputs
/// take the write lock. With the GPU backend the host should still drive ticks from the
/// thread that owns the render loop.
pub struct FluidSimInstance {
    pub(crate) sim: RwLock<FluidSimulation>,
    pub(crate) compositor: Compositor,
    /// Reused RGBA8 frame for `fluid_sim_read_dye`
    pub(crate) frame: Mutex<Vec<u8>>,
}

impl FluidSimInstance {
    pub(crate) fn new(config: FluidConfig) -> Result<Box<Self>, DefaultFluidSimError> {
        let sim = FluidSimulation::new(config)?;
        info!(
            "FFI instance created on {} backend ({}x{} grid)",
            sim.backend_name(),
            sim.resolutions().0.width,
            sim.resolutions().0.height
        );
        Ok(Box::new(Self {
            sim: RwLock::new(sim),
            compositor: Compositor::default(),
            frame: Mutex::new(Vec::new()),
        }))
    }
}

/// Default configuration for a resolution preset.
#[no_mangle]
pub extern "C" fn fluid_sim_default_config(preset: FluidSimPreset) -> FluidSimConfig {
    FluidSimConfig::from(&FluidConfig::from_preset(preset.into()))
}

/// Create a new fluid simulation and return it via out-parameter.
///
/// Parameters
/// - `config`: Configuration to validate and use. Null selects the default configuration.
/// - `out_instance`: Pointer to receive the created instance. Must be non-null.
///   - On success: set to valid `FluidSimInstance` pointer
///   - On failure: set to null
///
/// Returns
/// - `FluidSimErrorCode::Ok` (0) on success
/// - `FluidSimErrorCode::NullPointer` if `out_instance` is null
/// - `FluidSimErrorCode::InvalidConfiguration` if a parameter is out of range
/// - `FluidSimErrorCode::ResourceUnavailable` if no field storage could be allocated
/// - `FluidSimErrorCode::DeviceError` if the GPU backend was required but is unusable
///
/// Call `fluid_sim_get_last_error()` for a human-readable description.
///
/// # Safety
///
/// - `out_instance` must be a valid, non-null pointer to writable memory.
/// - `config` must be null or point to a readable `FluidSimConfig`.
/// - The caller takes ownership of the returned instance and MUST call `fluid_sim_destroy`
///   exactly once.
///
/// Example (C++)
/// ```cpp
/// FluidSimConfig config = fluid_sim_default_config(FluidSimPreset::Medium);
/// FluidSimInstance* sim = nullptr;
/// if (fluid_sim_new(&config, &sim) != FluidSimErrorCode::Ok) {
///     fprintf(stderr, "Failed to create simulation: %s\n", fluid_sim_get_last_error());
///     return;
/// }
/// // ... use sim ...
/// fluid_sim_destroy(sim);
/// ```
#[no_mangle]
pub unsafe extern "C" fn fluid_sim_new(
    config: *const FluidSimConfig,
    out_instance: *mut *mut FluidSimInstance,
) -> FluidSimErrorCode {
    if out_instance.is_null() {
        return track_error(&DefaultFluidSimError::null_pointer("out_instance"));
    }

    // SAFETY: `config` is either null or readable per the caller contract.
    let config = unsafe { config.as_ref() }.map_or_else(FluidConfig::default, FluidConfig::from);

    match track_result(FluidSimInstance::new(config)) {
        Ok(instance) => {
            unsafe {
                *out_instance = Box::into_raw(instance);
            }
            FluidSimErrorCode::Ok
        }
        Err(code) => {
            unsafe {
                *out_instance = ptr::null_mut();
            }
            code
        }
    }
}

/// Destroys an instance previously created by `fluid_sim_new`.
///
/// If `ptr` is null, this function is a no-op.
///
/// # Safety
/// - The pointer MUST have been created by `fluid_sim_new` and not freed already.
/// - After calling this function, the caller must not use the pointer again.
#[no_mangle]
pub unsafe extern "C" fn fluid_sim_destroy(ptr: *mut FluidSimInstance) {
    if ptr.is_null() {
        return;
    }

    // SAFETY: the pointer came from `Box::into_raw` in `fluid_sim_new` and is dropped once.
    unsafe {
        drop(Box::from_raw(ptr));
    }
}
