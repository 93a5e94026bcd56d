//! Phase Ordering Suite
//!
//! Drives the step engine against a backend that only records the passes it is asked
//! to run, so the tick choreography can be checked without touching any field data.

mod common;

use common::cpu_config;
use fluid_sim_core::solver::{field_len, FlowField};
use fluid_sim_core::{
    DyeSplat, FieldKind, FluidBackend, FluidError, FluidSimulation, Force, Pass, Resolution,
    Vector2,
};
use std::borrow::Cow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Clone, Default)]
struct PassLog(Arc<Mutex<Vec<Pass>>>);

impl PassLog {
    fn take(&self) -> Vec<Pass> {
        std::mem::take(&mut *self.0.lock().unwrap())
    }
}

struct RecordingBackend {
    log: PassLog,
    grid: Resolution,
    dye: Resolution,
    reallocations: Arc<Mutex<Vec<(Resolution, Resolution, bool)>>>,
    /// When set, every reallocation is rejected as if the device ran out of memory
    reject_reallocation: Arc<AtomicBool>,
}

impl RecordingBackend {
    fn new(log: PassLog) -> Self {
        Self {
            log,
            grid: Resolution::square(8),
            dye: Resolution::square(8),
            reallocations: Arc::default(),
            reject_reallocation: Arc::default(),
        }
    }
}

impl FluidBackend for RecordingBackend {
    fn run(&mut self, pass: &Pass) {
        self.log.0.lock().unwrap().push(*pass);
    }

    fn read_field(&self, field: FieldKind) -> Result<Cow<'_, [f32]>, FluidError> {
        Ok(Cow::Owned(vec![0.0; field_len(field, self.grid, self.dye)]))
    }

    fn write_field(&mut self, _field: FieldKind, _data: &[f32]) -> Result<(), FluidError> {
        Ok(())
    }

    fn clear_field(&mut self, _field: FieldKind) {}

    fn reallocate(
        &mut self,
        grid: Resolution,
        dye: Resolution,
        preserve: bool,
    ) -> Result<(), FluidError> {
        if self.reject_reallocation.load(Ordering::SeqCst) {
            return Err(FluidError::Device("out of memory".into()));
        }
        self.reallocations
            .lock()
            .unwrap()
            .push((grid, dye, preserve));
        self.grid = grid;
        self.dye = dye;
        Ok(())
    }

    fn resolutions(&self) -> (Resolution, Resolution) {
        (self.grid, self.dye)
    }

    fn is_gpu_accelerated(&self) -> bool {
        false
    }

    fn name(&self) -> &str {
        "recording"
    }
}

fn recording_simulation(curl_strength: f32, iterations: u32) -> (FluidSimulation, PassLog) {
    let log = PassLog::default();
    let mut config = cpu_config(16, 32);
    config.curl_strength = curl_strength;
    config.pressure_iterations = iterations;
    let sim =
        FluidSimulation::with_backend(config, Box::new(RecordingBackend::new(log.clone())))
            .unwrap();
    (sim, log)
}

#[test]
fn test_tick_runs_phases_in_order() {
    let (mut sim, log) = recording_simulation(30.0, 6);
    sim.push_force(Force::new(Vector2::new(0.2, 0.2), Vector2::x(), 0.1, 5.0)).unwrap();
    sim.push_force(Force::new(Vector2::new(0.8, 0.8), Vector2::y(), 0.1, 5.0)).unwrap();
    sim.push_splat(DyeSplat::new(Vector2::new(0.5, 0.5), [1.0, 0.0, 0.0], 0.1)).unwrap();
    sim.step(0.016);

    let names: Vec<&str> = log.take().iter().map(Pass::name).collect();
    let mut expected = vec!["advect", "curl", "vorticity", "splat", "splat", "divergence"];
    expected.push("scale_pressure");
    expected.extend(std::iter::repeat_n("jacobi", 6));
    expected.extend(["subtract_gradient", "advect", "splat"]);
    assert_eq!(names, expected);
}

#[test]
fn test_pass_parameters_follow_config() {
    let (mut sim, log) = recording_simulation(0.0, 6);
    let config = sim.config().clone();
    sim.push_splat(DyeSplat::new(Vector2::new(0.5, 0.5), [1.0, 1.0, 1.0], 0.1)).unwrap();
    sim.step(0.02);
    let passes = log.take();

    assert_eq!(
        passes[0],
        Pass::Advect {
            field: FlowField::Velocity,
            dt: 0.02,
            dissipation: config.dissipation_velocity,
        }
    );
    // Zero confinement strength skips the vorticity pass
    assert!(!passes.iter().any(|p| matches!(p, Pass::Vorticity { .. })));
    assert!(passes.contains(&Pass::ScalePressure {
        factor: config.pressure_warm_start
    }));

    let dye_advect = passes
        .iter()
        .position(|p| {
            matches!(
                p,
                Pass::Advect {
                    field: FlowField::Dye,
                    ..
                }
            )
        })
        .unwrap();
    match passes[dye_advect + 1] {
        Pass::Splat(splat) => {
            assert_eq!(splat.target, FlowField::Dye);
            assert_eq!(splat.clamp_max, Some(config.dye_max));
        }
        other => panic!("expected dye splat after dye advection, got {other:?}"),
    }
}

#[test]
fn test_inputs_do_not_carry_over() {
    let (mut sim, log) = recording_simulation(0.0, 6);
    sim.push_force(Force::new(Vector2::new(0.5, 0.5), Vector2::x(), 0.1, 5.0)).unwrap();
    sim.step(0.016);
    log.take();

    sim.step(0.016);
    assert!(!log.take().iter().any(|p| matches!(p, Pass::Splat(_))));
}

#[test]
fn test_zero_dt_without_inputs_runs_nothing() {
    let (mut sim, log) = recording_simulation(30.0, 6);
    sim.step(0.0);
    assert!(log.take().is_empty());

    // An impulse still applies even though no time passes
    sim.push_force(Force::new(Vector2::new(0.5, 0.5), Vector2::x(), 0.1, 5.0)).unwrap();
    sim.step(0.0);
    assert!(log.take().iter().any(|p| matches!(p, Pass::Splat(_))));
}

#[test]
fn test_quality_reduction_reallocates_with_preserve() {
    let log = PassLog::default();
    let backend = RecordingBackend::new(log.clone());
    let reallocations = Arc::clone(&backend.reallocations);

    let mut config = cpu_config(16, 32);
    config.adaptive_quality = true;
    config.pressure_iterations = 6;
    config.target_frame_ms = 10.0;
    let mut sim = FluidSimulation::with_backend(config, Box::new(backend)).unwrap();
    // Initial resolution change from 8x8 to the configured one zeroes everything
    assert_eq!(
        reallocations.lock().unwrap().pop(),
        Some((Resolution::square(16), Resolution::square(32), false))
    );

    // Iterations are already at the floor, so the first reduction hits dye resolution
    let state = (0..100)
        .filter_map(|_| sim.observe_frame(50.0))
        .find(|state| state.adjustment.is_some())
        .unwrap();
    assert!(state.resolution_changed());
    assert_eq!(
        reallocations.lock().unwrap().pop(),
        Some((Resolution::square(16), Resolution::square(24), true))
    );
    assert_eq!(sim.resolutions().1, Resolution::square(24));
}

#[test]
fn test_failed_reallocation_keeps_quality_in_sync() {
    let log = PassLog::default();
    let backend = RecordingBackend::new(log);
    let reject = Arc::clone(&backend.reject_reallocation);

    let mut config = cpu_config(16, 32);
    config.adaptive_quality = true;
    config.pressure_iterations = 6;
    config.target_frame_ms = 10.0;
    let mut sim = FluidSimulation::with_backend(config, Box::new(backend)).unwrap();
    reject.store(true, Ordering::SeqCst);

    for _ in 0..500 {
        let state = sim.observe_frame(50.0).unwrap();
        assert_eq!(state.adjustment, None);
    }
    let quality = sim.quality().unwrap();
    assert_eq!(
        (quality.grid_resolution, quality.dye_resolution),
        sim.resolutions()
    );
    assert_eq!(sim.resolutions(), (Resolution::square(16), Resolution::square(32)));

    // Once allocation works again the pending reduction goes through
    reject.store(false, Ordering::SeqCst);
    let state = (0..100)
        .filter_map(|_| sim.observe_frame(50.0))
        .find(|state| state.adjustment.is_some())
        .unwrap();
    assert_eq!(state.dye_resolution, sim.resolutions().1);
    assert_eq!(sim.resolutions().1, Resolution::square(24));
}
