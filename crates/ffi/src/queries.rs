use fluid_sim_core::SimulationStats;

use crate::error::{DefaultFluidSimError, FluidSimErrorCode};
use crate::helpers::{handle_ffi_result_error, instance_from_ptr, with_fluid_sim, with_fluid_sim_mut};
use crate::instance::FluidSimInstance;

/// Snapshot of engine counters and current quality settings.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FluidSimStats {
    pub ticks: u64,
    pub simulation_time: f32,
    pub pressure_iterations: u32,
    pub grid_width: u32,
    pub grid_height: u32,
    pub dye_width: u32,
    pub dye_height: u32,
    pub healed_fields: u64,
    pub last_step_ms: f32,
    /// 95th percentile frame time of the quality window, or a negative value when unknown
    pub p95_ms: f32,
    pub gpu_accelerated: bool,
    pub paused: bool,
}

impl FluidSimStats {
    fn from_stats(stats: &SimulationStats, p95_ms: Option<f32>) -> Self {
        Self {
            ticks: stats.ticks,
            simulation_time: stats.simulation_time,
            pressure_iterations: stats.pressure_iterations,
            grid_width: stats.grid_resolution.width,
            grid_height: stats.grid_resolution.height,
            dye_width: stats.dye_resolution.width,
            dye_height: stats.dye_resolution.height,
            healed_fields: stats.healed_fields,
            last_step_ms: stats.last_step_ms,
            p95_ms: p95_ms.unwrap_or(-1.0),
            gpu_accelerated: false,
            paused: false,
        }
    }
}

/// Read engine counters and quality settings.
///
/// # Safety
/// - `ptr` must be a valid pointer returned by `fluid_sim_new`.
/// - `out_stats` must be a valid, non-null pointer to writable memory.
#[no_mangle]
pub unsafe extern "C" fn fluid_sim_get_stats(
    ptr: *const FluidSimInstance,
    out_stats: *mut FluidSimStats,
) -> FluidSimErrorCode {
    handle_ffi_result_error(|| {
        // SAFETY: `out_stats` is null or writable per the caller contract.
        let out = unsafe { out_stats.as_mut() }
            .ok_or_else(|| DefaultFluidSimError::null_pointer("out_stats"))?;
        let instance = instance_from_ptr(ptr)?;
        *out = with_fluid_sim(instance, |sim| {
            let p95 = sim.quality().and_then(|state| state.p95_ms);
            FluidSimStats {
                gpu_accelerated: sim.is_gpu_accelerated(),
                paused: sim.is_paused(),
                ..FluidSimStats::from_stats(&sim.stats(), p95)
            }
        })?;
        Ok(())
    })
}

/// Current adaptive quality settings.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FluidSimQuality {
    /// False when adaptive quality is disabled; the other fields are then zero
    pub enabled: bool,
    pub pressure_iterations: u32,
    /// Index into the grid resolution ladder, 0 is full resolution
    pub grid_tier: u32,
    /// Index into the dye resolution ladder, 0 is full resolution
    pub dye_tier: u32,
    pub cooldown: u32,
    pub samples: u32,
    /// 95th percentile frame time, or a negative value when not yet evaluated
    pub p95_ms: f32,
}

/// Read the adaptive quality controller's state.
///
/// # Safety
/// - `ptr` must be a valid pointer returned by `fluid_sim_new`.
/// - `out_quality` must be a valid, non-null pointer to writable memory.
#[no_mangle]
pub unsafe extern "C" fn fluid_sim_quality(
    ptr: *const FluidSimInstance,
    out_quality: *mut FluidSimQuality,
) -> FluidSimErrorCode {
    handle_ffi_result_error(|| {
        // SAFETY: `out_quality` is null or writable per the caller contract.
        let out = unsafe { out_quality.as_mut() }
            .ok_or_else(|| DefaultFluidSimError::null_pointer("out_quality"))?;
        let instance = instance_from_ptr(ptr)?;
        *out = with_fluid_sim(instance, |sim| {
            sim.quality()
                .map_or_else(FluidSimQuality::default, |state| FluidSimQuality {
                    enabled: true,
                    pressure_iterations: state.pressure_iterations,
                    grid_tier: state.grid_tier as u32,
                    dye_tier: state.dye_tier as u32,
                    cooldown: state.cooldown,
                    samples: state.samples as u32,
                    p95_ms: state.p95_ms.unwrap_or(-1.0),
                })
        })?;
        Ok(())
    })
}

/// Composite the current dye, velocity and curl fields into a tightly packed RGBA8
/// image of `width` x `height` pixels, top row first.
///
/// `buffer_len` is the size of `out_rgba` in bytes and must be at least
/// `width * height * 4`. Non-finite field values are healed before compositing.
///
/// Thread-safe: takes the write lock because readback may heal fields.
///
/// # Safety
/// - `ptr` must be a valid pointer returned by `fluid_sim_new`.
/// - `out_rgba` must point to at least `buffer_len` writable bytes.
#[no_mangle]
pub unsafe extern "C" fn fluid_sim_read_dye(
    ptr: *const FluidSimInstance,
    width: u32,
    height: u32,
    out_rgba: *mut u8,
    buffer_len: usize,
) -> FluidSimErrorCode {
    handle_ffi_result_error(|| {
        if out_rgba.is_null() {
            return Err(DefaultFluidSimError::null_pointer("out_rgba"));
        }
        if width == 0 || height == 0 {
            return Err(DefaultFluidSimError::invalid_parameter(format!(
                "Output size must be positive, got {width}x{height}"
            )));
        }
        let required = (width as usize)
            .checked_mul(height as usize)
            .and_then(|pixels| pixels.checked_mul(4))
            .ok_or_else(|| {
                DefaultFluidSimError::invalid_parameter(format!(
                    "Output size {width}x{height} overflows"
                ))
            })?;
        if buffer_len < required {
            return Err(DefaultFluidSimError::buffer_too_small(required, buffer_len));
        }

        let instance = instance_from_ptr(ptr)?;
        let fields = with_fluid_sim_mut(instance, fluid_sim_core::FluidSimulation::display_fields)??;

        let mut frame = instance
            .frame
            .lock()
            .map_err(|_| DefaultFluidSimError::lock_poisoned("Mutex"))?;
        *frame = instance.compositor.render_rgba8(&fields, width, height);

        // SAFETY: `out_rgba` holds at least `required` bytes, checked above.
        let out = unsafe { std::slice::from_raw_parts_mut(out_rgba, required) };
        out.copy_from_slice(&frame[..required]);
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::{fluid_sim_default_config, fluid_sim_destroy, fluid_sim_new};
    use crate::instance::{FluidSimBackend, FluidSimPreset};
    use crate::simulation::{fluid_sim_push_splat, fluid_sim_step};
    use std::ptr;

    fn cpu_instance() -> *mut FluidSimInstance {
        let mut config = fluid_sim_default_config(FluidSimPreset::Low);
        config.backend = FluidSimBackend::Cpu;
        config.grid_width = 16;
        config.grid_height = 16;
        config.dye_width = 32;
        config.dye_height = 32;
        config.adaptive_quality = false;
        let mut sim = ptr::null_mut();
        assert_eq!(unsafe { fluid_sim_new(&config, &mut sim) }, FluidSimErrorCode::Ok);
        sim
    }

    #[test]
    fn test_stats_track_steps() {
        let sim = cpu_instance();
        unsafe {
            assert_eq!(fluid_sim_push_splat(sim, 0.5, 0.5, 1.0, 0.0, 0.0, 0.1), FluidSimErrorCode::Ok);
            assert_eq!(fluid_sim_step(sim, 0.016), FluidSimErrorCode::Ok);

            let mut stats = FluidSimStats::default();
            assert_eq!(fluid_sim_get_stats(sim, &mut stats), FluidSimErrorCode::Ok);
            assert_eq!(stats.ticks, 1);
            assert_eq!(stats.grid_width, 16);
            assert_eq!(stats.dye_width, 32);
            assert!(!stats.gpu_accelerated);
            fluid_sim_destroy(sim);
        }
    }

    #[test]
    fn test_read_dye_checks_buffer() {
        let sim = cpu_instance();
        unsafe {
            let mut small = vec![0u8; 10];
            let code = fluid_sim_read_dye(sim, 8, 8, small.as_mut_ptr(), small.len());
            assert_eq!(code, FluidSimErrorCode::BufferTooSmall);

            assert_eq!(fluid_sim_push_splat(sim, 0.5, 0.5, 1.0, 0.0, 0.0, 0.2), FluidSimErrorCode::Ok);
            assert_eq!(fluid_sim_step(sim, 0.016), FluidSimErrorCode::Ok);
            let mut frame = vec![0u8; 8 * 8 * 4];
            let code = fluid_sim_read_dye(sim, 8, 8, frame.as_mut_ptr(), frame.len());
            assert_eq!(code, FluidSimErrorCode::Ok);
            // Center pixel is red dye
            let center = (4 * 8 + 4) * 4;
            assert!(frame[center] > frame[center + 1]);
            fluid_sim_destroy(sim);
        }
    }

    #[test]
    fn test_quality_reports_disabled_controller() {
        let sim = cpu_instance();
        unsafe {
            let mut quality = FluidSimQuality {
                enabled: true,
                ..FluidSimQuality::default()
            };
            assert_eq!(fluid_sim_quality(sim, &mut quality), FluidSimErrorCode::Ok);
            assert!(!quality.enabled);
            fluid_sim_destroy(sim);
        }
    }

    #[test]
    fn test_null_instance_is_rejected() {
        let mut stats = FluidSimStats::default();
        let code = unsafe { fluid_sim_get_stats(ptr::null(), &mut stats) };
        assert_eq!(code, FluidSimErrorCode::NullPointer);
    }
}
