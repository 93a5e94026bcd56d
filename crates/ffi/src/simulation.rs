use fluid_sim_core::{DyeSplat, Force, TickOutcome, Vector2};
use std::time::Instant;

use crate::error::FluidSimErrorCode;
use crate::helpers::{handle_ffi_result_error, instance_from_ptr, require_finite, with_fluid_sim_mut};
use crate::instance::FluidSimInstance;

/// Advance the simulation by one frame measured against the wall clock.
///
/// The timestep is the time since the previous tick, capped by `max_dt`. The first
/// tick after creation or `fluid_sim_resume` integrates zero time. While paused the
/// call does nothing and writes 0 to `out_dt`.
///
/// Thread-safe: acquires `RwLock` write lock for simulation update.
///
/// # Safety
/// - `ptr` must be a valid pointer returned by `fluid_sim_new`.
/// - `out_dt` may be null; otherwise it receives the integrated timestep in seconds.
#[no_mangle]
pub unsafe extern "C" fn fluid_sim_tick(
    ptr: *const FluidSimInstance,
    out_dt: *mut f32,
) -> FluidSimErrorCode {
    handle_ffi_result_error(|| {
        let instance = instance_from_ptr(ptr)?;
        let outcome = with_fluid_sim_mut(instance, |sim| sim.tick(Instant::now()))?;
        let dt = match outcome {
            TickOutcome::Skipped => 0.0,
            TickOutcome::Stepped { dt, .. } => dt,
        };
        // SAFETY: `out_dt` is null or writable per the caller contract.
        if let Some(out) = unsafe { out_dt.as_mut() } {
            *out = dt;
        }
        Ok(())
    })
}

/// Advance the simulation by an explicit timestep in seconds.
///
/// `dt` is clamped to `[0, max_dt]`. The quality controller is not fed.
///
/// # Safety
/// `ptr` must be a valid pointer returned by `fluid_sim_new`.
#[no_mangle]
pub unsafe extern "C" fn fluid_sim_step(ptr: *const FluidSimInstance, dt: f32) -> FluidSimErrorCode {
    handle_ffi_result_error(|| {
        let dt = require_finite("dt", dt)?;
        let instance = instance_from_ptr(ptr)?;
        with_fluid_sim_mut(instance, |sim| {
            sim.step(dt);
        })
    })
}

/// Queue a velocity impulse for the next tick.
///
/// Position is in normalized canvas coordinates with the origin at the bottom-left.
/// Direction is scaled by `strength` and applied once inside a Gaussian of `radius`.
/// Returns `FluidSimErrorCode::InvalidConfiguration` for a non-positive radius or
/// non-finite values.
///
/// # Safety
/// `ptr` must be a valid pointer returned by `fluid_sim_new`.
#[no_mangle]
pub unsafe extern "C" fn fluid_sim_push_force(
    ptr: *const FluidSimInstance,
    x: f32,
    y: f32,
    dir_x: f32,
    dir_y: f32,
    radius: f32,
    strength: f32,
) -> FluidSimErrorCode {
    handle_ffi_result_error(|| {
        let instance = instance_from_ptr(ptr)?;
        with_fluid_sim_mut(instance, |sim| {
            sim.push_force(Force::new(
                Vector2::new(x, y),
                Vector2::new(dir_x, dir_y),
                radius,
                strength,
            ))
        })??;
        Ok(())
    })
}

/// Queue a dye splat for the next tick.
///
/// Returns `FluidSimErrorCode::InvalidConfiguration` for a non-positive radius or
/// non-finite values.
///
/// # Safety
/// `ptr` must be a valid pointer returned by `fluid_sim_new`.
#[no_mangle]
pub unsafe extern "C" fn fluid_sim_push_splat(
    ptr: *const FluidSimInstance,
    x: f32,
    y: f32,
    r: f32,
    g: f32,
    b: f32,
    radius: f32,
) -> FluidSimErrorCode {
    handle_ffi_result_error(|| {
        let instance = instance_from_ptr(ptr)?;
        with_fluid_sim_mut(instance, |sim| {
            sim.push_splat(DyeSplat::new(Vector2::new(x, y), [r, g, b], radius))
        })??;
        Ok(())
    })
}

/// Translate a pointer drag into a force and a dye splat using the configured splat
/// radius and force multiplier.
///
/// # Safety
/// `ptr` must be a valid pointer returned by `fluid_sim_new`.
#[no_mangle]
#[allow(clippy::too_many_arguments)]
pub unsafe extern "C" fn fluid_sim_splat_pointer(
    ptr: *const FluidSimInstance,
    x: f32,
    y: f32,
    dx: f32,
    dy: f32,
    r: f32,
    g: f32,
    b: f32,
) -> FluidSimErrorCode {
    handle_ffi_result_error(|| {
        let instance = instance_from_ptr(ptr)?;
        with_fluid_sim_mut(instance, |sim| {
            sim.splat_pointer(Vector2::new(x, y), Vector2::new(dx, dy), [r, g, b])
        })??;
        Ok(())
    })
}

/// Queue `count` splats of random position, direction and color.
///
/// # Safety
/// `ptr` must be a valid pointer returned by `fluid_sim_new`.
#[no_mangle]
pub unsafe extern "C" fn fluid_sim_random_splats(
    ptr: *const FluidSimInstance,
    count: u32,
) -> FluidSimErrorCode {
    handle_ffi_result_error(|| {
        let instance = instance_from_ptr(ptr)?;
        with_fluid_sim_mut(instance, |sim| {
            sim.random_splats(&mut rand::rng(), count as usize);
        })
    })
}

/// Stop integrating time. Ticks become no-ops until `fluid_sim_resume`.
///
/// # Safety
/// `ptr` must be a valid pointer returned by `fluid_sim_new`.
#[no_mangle]
pub unsafe extern "C" fn fluid_sim_pause(ptr: *const FluidSimInstance) -> FluidSimErrorCode {
    handle_ffi_result_error(|| {
        let instance = instance_from_ptr(ptr)?;
        with_fluid_sim_mut(instance, fluid_sim_core::FluidSimulation::pause)
    })
}

/// Resume after `fluid_sim_pause`. The next tick integrates zero time.
///
/// # Safety
/// `ptr` must be a valid pointer returned by `fluid_sim_new`.
#[no_mangle]
pub unsafe extern "C" fn fluid_sim_resume(ptr: *const FluidSimInstance) -> FluidSimErrorCode {
    handle_ffi_result_error(|| {
        let instance = instance_from_ptr(ptr)?;
        with_fluid_sim_mut(instance, fluid_sim_core::FluidSimulation::resume)
    })
}

/// Match field resolutions to a new canvas size in pixels. All fields are zeroed.
///
/// # Safety
/// `ptr` must be a valid pointer returned by `fluid_sim_new`.
#[no_mangle]
pub unsafe extern "C" fn fluid_sim_resize(
    ptr: *const FluidSimInstance,
    width: u32,
    height: u32,
) -> FluidSimErrorCode {
    handle_ffi_result_error(|| {
        let instance = instance_from_ptr(ptr)?;
        with_fluid_sim_mut(instance, |sim| sim.resize(width, height))??;
        Ok(())
    })
}

/// Rebuild the backend after a lost device. All fields are zeroed.
///
/// # Safety
/// `ptr` must be a valid pointer returned by `fluid_sim_new`.
#[no_mangle]
pub unsafe extern "C" fn fluid_sim_reinitialize(ptr: *const FluidSimInstance) -> FluidSimErrorCode {
    handle_ffi_result_error(|| {
        let instance = instance_from_ptr(ptr)?;
        with_fluid_sim_mut(instance, fluid_sim_core::FluidSimulation::reinitialize)??;
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::{fluid_sim_default_config, fluid_sim_destroy, fluid_sim_new};
    use crate::instance::{FluidSimBackend, FluidSimPreset};
    use std::ptr;

    #[test]
    fn test_invalid_inputs_report_configuration_error() {
        let mut config = fluid_sim_default_config(FluidSimPreset::Low);
        config.backend = FluidSimBackend::Cpu;
        config.adaptive_quality = false;
        let mut sim = ptr::null_mut();
        unsafe {
            assert_eq!(fluid_sim_new(&config, &mut sim), FluidSimErrorCode::Ok);
            assert_eq!(
                fluid_sim_push_force(sim, 0.5, 0.5, 1.0, 0.0, 0.0, 1.0),
                FluidSimErrorCode::InvalidConfiguration
            );
            assert_eq!(
                fluid_sim_push_splat(sim, 0.5, 0.5, f32::NAN, 0.0, 0.0, 0.1),
                FluidSimErrorCode::InvalidConfiguration
            );
            assert_eq!(
                fluid_sim_push_splat(sim, 0.5, 0.5, 1.0, 0.0, 0.0, 0.1),
                FluidSimErrorCode::Ok
            );
            fluid_sim_destroy(sim);
        }
    }
}
