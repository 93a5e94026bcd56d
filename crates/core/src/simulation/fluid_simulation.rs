//! Fluid simulation step engine driving a `FluidBackend`
//!
//! `FluidSimulation` owns the backend (and through it every field), the per-tick input
//! queue, the quality controller and the frame timer. One call to [`FluidSimulation::step`]
//! runs the eight phases of [`Phase::ORDER`] to completion; there is no way to stop a
//! tick between phases.

use super::diagnostics;
use super::inputs::{
    random_color, DyeSplat, Force, InputQueue, RANDOM_DYE_INTENSITY, RANDOM_SPLAT_STRENGTH,
};
use super::{Phase, SimulationStats};
use crate::compositor::DisplayFields;
use crate::config::{validate_resolution, FluidConfig, Resolution};
use crate::error::FluidError;
use crate::solver::{
    create_backend, FieldData, FieldKind, FlowField, FluidBackend, FrameTimer, Pass,
    ProfilerScope, QualityController, QualityState,
};
use nalgebra::Vector2;
use rand::Rng;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Result of a wall-clock tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TickOutcome {
    /// The simulation is paused; fields were not touched
    Skipped,
    /// One step ran
    Stepped {
        /// Timestep actually integrated, in seconds
        dt: f32,
        /// Wall time spent in the step, in milliseconds
        step_ms: f32,
        /// Controller state after observing this frame, if adaptive quality is on
        quality: Option<QualityState>,
    },
}

/// Real-time incompressible fluid simulation
pub struct FluidSimulation {
    /// Backend-agnostic pass executor (CPU or GPU)
    backend: Box<dyn FluidBackend>,
    config: FluidConfig,

    /// Jacobi iterations for the next tick, lowered by the quality controller
    pressure_iterations: u32,
    /// Full-quality resolutions; follow the canvas aspect ratio after a resize
    base_grid: Resolution,
    base_dye: Resolution,

    inputs: InputQueue,
    quality: Option<QualityController>,
    timer: FrameTimer,
    paused: bool,

    ticks: u64,
    simulation_time: f32,
    healed_fields: u64,
}

impl FluidSimulation {
    /// Create a simulation with the backend selected by `config.backend`
    ///
    /// # Errors
    ///
    /// Returns `FluidError::Configuration` for invalid parameters, or the backend's
    /// allocation error.
    pub fn new(config: FluidConfig) -> Result<Self, FluidError> {
        config.validate()?;
        let backend = create_backend(&config)?;
        Self::assemble(config, backend)
    }

    /// Create a simulation driving an existing backend
    ///
    /// The backend is reallocated (zeroed) if its resolutions differ from `config`.
    ///
    /// # Errors
    ///
    /// Returns `FluidError::Configuration` for invalid parameters, or the backend's
    /// allocation error.
    pub fn with_backend(
        config: FluidConfig,
        mut backend: Box<dyn FluidBackend>,
    ) -> Result<Self, FluidError> {
        config.validate()?;
        if backend.resolutions() != (config.grid_resolution, config.dye_resolution) {
            backend.reallocate(config.grid_resolution, config.dye_resolution, false)?;
        }
        Self::assemble(config, backend)
    }

    fn assemble(config: FluidConfig, backend: Box<dyn FluidBackend>) -> Result<Self, FluidError> {
        info!(
            "Fluid simulation initialized: {} grid, {} dye, {} pressure iterations, backend {}",
            config.grid_resolution,
            config.dye_resolution,
            config.pressure_iterations,
            backend.name()
        );

        Ok(Self {
            backend,
            pressure_iterations: config.pressure_iterations,
            base_grid: config.grid_resolution,
            base_dye: config.dye_resolution,
            inputs: InputQueue::new(),
            quality: config
                .adaptive_quality
                .then(|| QualityController::new(&config)),
            timer: FrameTimer::new(),
            paused: false,
            ticks: 0,
            simulation_time: 0.0,
            healed_fields: 0,
            config,
        })
    }

    // ====== Inputs ======

    /// Queue a velocity impulse for the next tick
    ///
    /// # Errors
    ///
    /// Returns `FluidError::Configuration` for a non-positive radius or non-finite
    /// values; nothing is queued in that case.
    pub fn push_force(&mut self, force: Force) -> Result<(), FluidError> {
        force.validate()?;
        self.inputs.push_force(force);
        Ok(())
    }

    /// Queue a dye splat for the next tick
    ///
    /// # Errors
    ///
    /// Returns `FluidError::Configuration` for a non-positive radius or non-finite
    /// values; nothing is queued in that case.
    pub fn push_splat(&mut self, splat: DyeSplat) -> Result<(), FluidError> {
        splat.validate()?;
        self.inputs.push_splat(splat);
        Ok(())
    }

    /// Queue the force and dye produced by one pointer movement
    ///
    /// `delta` is the pointer movement since the last sample in normalized units; it is
    /// scaled by `splatForce` into an impulse. Both splats use `splatRadius`.
    ///
    /// # Errors
    ///
    /// Returns `FluidError::Configuration` for non-finite values; neither splat is
    /// queued in that case.
    pub fn splat_pointer(
        &mut self,
        position: Vector2<f32>,
        delta: Vector2<f32>,
        color: [f32; 3],
    ) -> Result<(), FluidError> {
        let radius = self.config.splat_radius;
        let force = Force::new(position, delta, radius, self.config.splat_force);
        let splat = DyeSplat::new(position, color, radius);
        force.validate()?;
        splat.validate()?;
        self.inputs.push_force(force);
        self.inputs.push_splat(splat);
        Ok(())
    }

    /// Queue `count` splats at random positions with random bright colors
    pub fn random_splats<R: Rng + ?Sized>(&mut self, rng: &mut R, count: usize) {
        let radius = self.config.splat_radius;
        for _ in 0..count {
            let position = Vector2::new(rng.random::<f32>(), rng.random::<f32>());
            let direction = Vector2::new(rng.random::<f32>() - 0.5, rng.random::<f32>() - 0.5);
            let color = random_color(rng, RANDOM_DYE_INTENSITY);
            self.inputs.push_force(Force::new(
                position,
                direction,
                radius,
                RANDOM_SPLAT_STRENGTH,
            ));
            self.inputs.push_splat(DyeSplat::new(position, color, radius));
        }
        debug!("Queued {} random splats", count);
    }

    // ====== Stepping ======

    /// Advance by one frame measured against the wall clock
    ///
    /// `dt` is the time since the previous tick, capped at `maxDt`; the first tick after
    /// construction or resume integrates zero time. The step's own duration is fed to
    /// the quality controller.
    pub fn tick(&mut self, now: Instant) -> TickOutcome {
        if self.paused {
            return TickOutcome::Skipped;
        }

        let dt = self.timer.advance(now).unwrap_or(0.0);
        let started = Instant::now();
        let dt = self.step(dt);
        let step_ms = started.elapsed().as_secs_f32() * 1000.0;
        self.timer.record(f64::from(step_ms));

        let quality = self.observe_frame(step_ms);
        TickOutcome::Stepped {
            dt,
            step_ms,
            quality,
        }
    }

    /// Run phases 1–8 once and return the timestep actually integrated
    ///
    /// `dt` is clamped to `[0, maxDt]`. A zero-length step with nothing queued leaves
    /// every field untouched: no time passes, so nothing moves.
    pub fn step(&mut self, dt: f32) -> f32 {
        let dt = if dt.is_finite() {
            dt.clamp(0.0, self.config.max_dt)
        } else {
            0.0
        };

        if dt == 0.0 && self.inputs.is_empty() {
            debug!("Zero-length step with no inputs, fields unchanged");
            return 0.0;
        }

        let _scope = ProfilerScope::new("step");
        for phase in Phase::ORDER {
            let _phase_scope = ProfilerScope::new(phase.name());
            self.run_phase(phase, dt);
        }

        self.ticks += 1;
        self.simulation_time += dt;

        if self.ticks % u64::from(self.config.diagnostic_interval) == 0 {
            self.heal_non_finite();
        }
        dt
    }

    fn run_phase(&mut self, phase: Phase, dt: f32) {
        let backend = &mut self.backend;
        let config = &self.config;

        match phase {
            Phase::AdvectVelocity => backend.run(&Pass::Advect {
                field: FlowField::Velocity,
                dt,
                dissipation: config.dissipation_velocity,
            }),
            Phase::Curl => backend.run(&Pass::Curl),
            Phase::Vorticity => {
                if config.curl_strength > 0.0 {
                    backend.run(&Pass::Vorticity {
                        strength: config.curl_strength,
                        dt,
                    });
                }
            }
            Phase::Forces => {
                for force in self.inputs.take_forces() {
                    backend.run(&Pass::Splat(force.to_pass()));
                }
            }
            Phase::Divergence => backend.run(&Pass::Divergence),
            Phase::Pressure => {
                backend.run(&Pass::ScalePressure {
                    factor: config.pressure_warm_start,
                });
                for _ in 0..self.pressure_iterations {
                    backend.run(&Pass::Jacobi);
                }
            }
            Phase::SubtractGradient => backend.run(&Pass::SubtractGradient),
            Phase::Dye => {
                backend.run(&Pass::Advect {
                    field: FlowField::Dye,
                    dt,
                    dissipation: config.dissipation_dye,
                });
                for splat in self.inputs.take_splats() {
                    backend.run(&Pass::Splat(splat.to_pass(config.dye_max)));
                }
            }
        }
    }

    /// Feed one frame duration to the quality controller and apply its decision
    ///
    /// Returns `None` when adaptive quality is disabled. A failed reallocation keeps
    /// the previous fields and rolls the controller back to the tier they match.
    pub fn observe_frame(&mut self, frame_ms: f32) -> Option<QualityState> {
        let quality = self.quality.as_mut()?;
        let mut state = quality.observe(frame_ms);

        if state.resolution_changed() {
            match self
                .backend
                .reallocate(state.grid_resolution, state.dye_resolution, true)
            {
                Ok(()) => info!(
                    "Fields resampled to {} grid, {} dye",
                    state.grid_resolution, state.dye_resolution
                ),
                Err(e) => {
                    warn!("Quality change not applied, keeping current resolution: {}", e);
                    quality.revert_last();
                    state = QualityState {
                        adjustment: None,
                        ..quality.state()
                    };
                }
            }
        }
        self.pressure_iterations = state.pressure_iterations;
        Some(state)
    }

    /// Zero every field that contains NaN or infinite values
    ///
    /// Returns the number of fields reset. Read failures are logged and skipped.
    pub fn heal_non_finite(&mut self) -> usize {
        let mut healed = 0;
        for kind in FieldKind::ALL {
            let count = match self.backend.read_field(kind) {
                Ok(data) => diagnostics::count_non_finite(&data),
                Err(e) => {
                    warn!("Diagnostics readback of {} failed: {}", kind, e);
                    continue;
                }
            };
            if count > 0 {
                let error = FluidError::NumericInstability { field: kind, count };
                warn!("{}; resetting {} to zero", error, kind);
                self.backend.clear_field(kind);
                healed += 1;
            }
        }
        self.healed_fields += healed as u64;
        healed
    }

    // ====== Lifecycle ======

    /// Stop ticking; fields keep their last state
    pub fn pause(&mut self) {
        if !self.paused {
            info!("Simulation paused at t={:.3}s", self.simulation_time);
            self.paused = true;
        }
    }

    /// Resume ticking without integrating the time spent paused
    pub fn resume(&mut self) {
        if self.paused {
            info!("Simulation resumed");
            self.paused = false;
        }
        self.timer.reset();
        if let Some(quality) = self.quality.as_mut() {
            quality.reset_window();
        }
    }

    /// Check if ticks are currently skipped
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Follow a canvas size change
    ///
    /// The grid keeps its configured short side and takes the canvas aspect ratio so
    /// texels stay square. All fields restart at zero and pending inputs are dropped.
    ///
    /// # Errors
    ///
    /// Returns `FluidError::Configuration` for a zero-sized canvas, or the backend's
    /// allocation error (previous fields are kept in that case).
    pub fn resize(&mut self, width: u32, height: u32) -> Result<(), FluidError> {
        if width == 0 || height == 0 {
            return Err(FluidError::config(
                "canvas",
                format!("must be non-zero, got {width}x{height}"),
            ));
        }
        let aspect = width as f32 / height as f32;
        let grid = Resolution::for_aspect(self.config.grid_resolution.short_side(), aspect);
        let dye = Resolution::for_aspect(self.config.dye_resolution.short_side(), aspect);
        validate_resolution("gridResolution", grid)?;
        validate_resolution("dyeResolution", dye)?;

        let (tier_grid, tier_dye) = match self.quality.as_mut() {
            Some(quality) => {
                quality.set_base_resolutions(grid, dye);
                let state = quality.state();
                (state.grid_resolution, state.dye_resolution)
            }
            None => (grid, dye),
        };

        self.backend.reallocate(tier_grid, tier_dye, false)?;
        self.base_grid = grid;
        self.base_dye = dye;
        self.inputs.clear();
        info!(
            "Resized to {}x{} canvas: {} grid, {} dye",
            width, height, tier_grid, tier_dye
        );
        Ok(())
    }

    /// Tear down and rebuild the backend at the current resolutions
    ///
    /// Used after the device or its memory was lost. Fields restart at zero.
    ///
    /// # Errors
    ///
    /// Returns the error of the new backend; the old backend is kept in that case.
    pub fn reinitialize(&mut self) -> Result<(), FluidError> {
        let (grid, dye) = self.backend.resolutions();
        let config = FluidConfig {
            grid_resolution: grid,
            dye_resolution: dye,
            ..self.config.clone()
        };
        let backend = create_backend(&config)?;
        info!("Reinitialized on {} ({} grid, {} dye)", backend.name(), grid, dye);
        self.backend = backend;
        self.inputs.clear();
        self.timer.reset();
        Ok(())
    }

    /// Apply a new configuration
    ///
    /// Tuning values take effect on the next tick. Changed resolutions reallocate
    /// every field at zero; the quality controller restarts from full quality.
    ///
    /// # Errors
    ///
    /// Returns `FluidError::Configuration` for invalid parameters (nothing changes),
    /// or the backend's allocation error.
    pub fn reconfigure(&mut self, config: FluidConfig) -> Result<(), FluidError> {
        config.validate()?;
        let resolutions = (config.grid_resolution, config.dye_resolution);
        if resolutions != (self.base_grid, self.base_dye)
            || resolutions != self.backend.resolutions()
        {
            self.backend
                .reallocate(config.grid_resolution, config.dye_resolution, false)?;
        }
        self.base_grid = config.grid_resolution;
        self.base_dye = config.dye_resolution;
        self.pressure_iterations = config.pressure_iterations;
        self.quality = config
            .adaptive_quality
            .then(|| QualityController::new(&config));
        debug!("Configuration applied: {:?}", config);
        self.config = config;
        Ok(())
    }

    // ====== Outputs ======

    /// Velocity, dye and curl for the compositor
    ///
    /// Any of the three holding non-finite values is zeroed first, so the snapshot is
    /// always finite.
    ///
    /// # Errors
    ///
    /// Returns `FluidError::Device` if a readback fails.
    pub fn display_fields(&mut self) -> Result<DisplayFields, FluidError> {
        let (grid, dye) = self.backend.resolutions();
        let velocity = self.finite_field(FieldKind::Velocity, grid)?;
        let dye_field = self.finite_field(FieldKind::Dye, dye)?;
        let curl = self.finite_field(FieldKind::Curl, grid)?;
        Ok(DisplayFields::new(velocity, dye_field, curl))
    }

    fn finite_field(
        &mut self,
        kind: FieldKind,
        resolution: Resolution,
    ) -> Result<FieldData, FluidError> {
        let mut data = self.backend.read_field(kind)?.into_owned();
        let count = diagnostics::count_non_finite(&data);
        if count > 0 {
            warn!(
                "{}; resetting {} before display",
                FluidError::NumericInstability { field: kind, count },
                kind
            );
            self.backend.clear_field(kind);
            self.healed_fields += 1;
            data.fill(0.0);
        }
        field_from(kind, resolution, data)
    }

    /// Read the current contents of a field
    ///
    /// # Errors
    ///
    /// Returns `FluidError::Device` if a readback fails.
    pub fn read_field(&self, kind: FieldKind) -> Result<FieldData, FluidError> {
        let (grid, dye) = self.backend.resolutions();
        let resolution = if kind.is_dye_resolution() { dye } else { grid };
        field_from(kind, resolution, self.backend.read_field(kind)?.into_owned())
    }

    /// Overwrite the current contents of a field, e.g. to seed a scene
    ///
    /// # Errors
    ///
    /// Returns `FluidError::Configuration` if `data` has the wrong length.
    pub fn write_field(&mut self, kind: FieldKind, data: &[f32]) -> Result<(), FluidError> {
        self.backend.write_field(kind, data)
    }

    /// Mean absolute interior divergence of the current velocity
    ///
    /// # Errors
    ///
    /// Returns `FluidError::Device` if a readback fails.
    pub fn post_projection_divergence(&self) -> Result<f32, FluidError> {
        Ok(diagnostics::mean_abs_divergence(
            &self.read_field(FieldKind::Velocity)?,
        ))
    }

    /// Mean absolute interior divergence measured before the last projection
    ///
    /// # Errors
    ///
    /// Returns `FluidError::Device` if a readback fails.
    pub fn pre_projection_divergence(&self) -> Result<f32, FluidError> {
        Ok(diagnostics::mean_abs_interior(
            &self.read_field(FieldKind::Divergence)?,
        ))
    }

    /// Snapshot of counters and current settings
    pub fn stats(&self) -> SimulationStats {
        let (grid, dye) = self.backend.resolutions();
        SimulationStats {
            ticks: self.ticks,
            simulation_time: self.simulation_time,
            pressure_iterations: self.pressure_iterations,
            grid_resolution: grid,
            dye_resolution: dye,
            healed_fields: self.healed_fields,
            last_step_ms: self.timer.last_frame_time_ms() as f32,
        }
    }

    /// Current quality state, if adaptive quality is on
    pub fn quality(&self) -> Option<QualityState> {
        self.quality.as_ref().map(QualityController::state)
    }

    /// Active configuration
    pub fn config(&self) -> &FluidConfig {
        &self.config
    }

    /// Jacobi iterations the next tick will run
    pub fn pressure_iterations(&self) -> u32 {
        self.pressure_iterations
    }

    /// Current `(grid, dye)` resolutions
    pub fn resolutions(&self) -> (Resolution, Resolution) {
        self.backend.resolutions()
    }

    /// Pending `(forces, dye splats)` for the next tick
    pub fn pending_inputs(&self) -> (usize, usize) {
        (self.inputs.force_count(), self.inputs.splat_count())
    }

    /// Check if GPU backend is being used
    pub fn is_gpu_accelerated(&self) -> bool {
        self.backend.is_gpu_accelerated()
    }

    /// Backend name for logging
    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }
}

fn field_from(kind: FieldKind, resolution: Resolution, data: Vec<f32>) -> Result<FieldData, FluidError> {
    let len = data.len();
    FieldData::from_vec(
        resolution.width as usize,
        resolution.height as usize,
        kind.channels(),
        data,
    )
    .ok_or_else(|| {
        FluidError::Device(format!(
            "{kind} readback returned {len} values for a {resolution} field"
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackendPreference;
    use crate::solver::CpuBackend;
    use approx::assert_relative_eq;

    fn config() -> FluidConfig {
        FluidConfig {
            grid_resolution: Resolution::square(32),
            dye_resolution: Resolution::square(64),
            backend: BackendPreference::Cpu,
            adaptive_quality: false,
            ..FluidConfig::default()
        }
    }

    fn simulation() -> FluidSimulation {
        FluidSimulation::new(config()).unwrap()
    }

    #[test]
    fn test_rejects_invalid_config() {
        let result = FluidSimulation::new(FluidConfig {
            curl_strength: 80.0,
            ..config()
        });
        assert!(matches!(
            result,
            Err(FluidError::Configuration {
                parameter: "curlStrength",
                ..
            })
        ));
    }

    #[test]
    fn test_with_backend_matches_config_resolution() {
        let backend = CpuBackend::new(Resolution::square(8), Resolution::square(8)).unwrap();
        let sim = FluidSimulation::with_backend(config(), Box::new(backend)).unwrap();
        assert_eq!(
            sim.resolutions(),
            (Resolution::square(32), Resolution::square(64))
        );
    }

    #[test]
    fn test_step_clamps_dt() {
        let mut sim = simulation();
        sim.push_force(Force::new(
            Vector2::new(0.5, 0.5),
            Vector2::x(),
            0.1,
            10.0,
        ))
        .unwrap();
        assert_relative_eq!(sim.step(1.0), sim.config().max_dt);
        assert_eq!(sim.step(-1.0), 0.0);
        assert_eq!(sim.step(f32::NAN), 0.0);
        assert_eq!(sim.stats().ticks, 1);
    }

    #[test]
    fn test_inputs_consumed_in_one_tick() {
        let mut sim = simulation();
        sim.splat_pointer(Vector2::new(0.5, 0.5), Vector2::new(0.01, 0.0), [1.0, 0.0, 0.0])
            .unwrap();
        assert_eq!(sim.pending_inputs(), (1, 1));
        sim.step(0.016);
        assert_eq!(sim.pending_inputs(), (0, 0));

        let dye = sim.read_field(FieldKind::Dye).unwrap();
        assert!(dye.get(32, 32, 0) > 0.0);
        assert_eq!(dye.get(32, 32, 2), 0.0);
    }

    #[test]
    fn test_pause_skips_ticks() {
        let mut sim = simulation();
        let now = Instant::now();
        sim.pause();
        assert!(sim.is_paused());
        assert_eq!(sim.tick(now), TickOutcome::Skipped);
        sim.resume();
        match sim.tick(now) {
            TickOutcome::Stepped { dt, quality, .. } => {
                assert_eq!(dt, 0.0);
                assert_eq!(quality, None);
            }
            TickOutcome::Skipped => panic!("resumed simulation skipped a tick"),
        }
    }

    #[test]
    fn test_random_splats_use_burst_strength_and_intensity() {
        let mut sim = simulation();
        sim.random_splats(&mut rand::rng(), 4);
        let forces = sim.inputs.take_forces();
        let splats = sim.inputs.take_splats();
        assert_eq!((forces.len(), splats.len()), (4, 4));
        for force in &forces {
            assert_relative_eq!(force.strength, RANDOM_SPLAT_STRENGTH);
        }
        for splat in &splats {
            let brightest = splat.color.iter().copied().fold(0.0, f32::max);
            assert_relative_eq!(brightest, RANDOM_DYE_INTENSITY, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_resize_follows_aspect_and_zeroes() {
        let mut sim = simulation();
        sim.random_splats(&mut rand::rng(), 3);
        sim.step(0.016);

        sim.resize(800, 400).unwrap();
        assert_eq!(
            sim.resolutions(),
            (Resolution::new(64, 32), Resolution::new(128, 64))
        );
        assert_eq!(sim.pending_inputs(), (0, 0));
        let dye = sim.read_field(FieldKind::Dye).unwrap();
        assert!(dye.as_slice().iter().all(|&v| v == 0.0));

        assert!(matches!(
            sim.resize(0, 10),
            Err(FluidError::Configuration { .. })
        ));
    }

    #[test]
    fn test_resize_rejects_oversized_canvas() {
        let mut sim = simulation();
        // 64 dye texels on the short side stretch far past the largest allowed edge
        assert!(matches!(
            sim.resize(1_000_000, 10),
            Err(FluidError::Configuration { .. })
        ));
        assert_eq!(
            sim.resolutions(),
            (Resolution::square(32), Resolution::square(64))
        );
    }

    #[test]
    fn test_invalid_inputs_are_rejected_before_the_solver() {
        let mut sim = simulation();
        let center = Vector2::new(15.5 / 32.0, 15.5 / 32.0);
        assert!(matches!(
            sim.push_force(Force::new(center, Vector2::x(), 0.0, 1.0)),
            Err(FluidError::Configuration { .. })
        ));
        assert!(matches!(
            sim.push_splat(DyeSplat::new(center, [f32::NAN, 0.0, 0.0], 0.1)),
            Err(FluidError::Configuration { .. })
        ));
        assert!(sim
            .splat_pointer(center, Vector2::new(f32::INFINITY, 0.0), [1.0, 0.0, 0.0])
            .is_err());
        assert_eq!(sim.pending_inputs(), (0, 0));

        sim.push_force(Force::new(center, Vector2::x(), 0.1, 1.0))
            .unwrap();
        sim.step(0.016);
        for kind in [FieldKind::Velocity, FieldKind::Dye] {
            let field = sim.read_field(kind).unwrap();
            assert_eq!(field.count_non_finite(), 0, "{kind} holds non-finite values");
        }
    }

    #[test]
    fn test_heal_resets_non_finite_fields() {
        let mut sim = simulation();
        let mut velocity = vec![0.0; 32 * 32 * 2];
        velocity[10] = f32::NAN;
        sim.write_field(FieldKind::Velocity, &velocity).unwrap();

        assert_eq!(sim.heal_non_finite(), 1);
        assert_eq!(sim.heal_non_finite(), 0);
        assert_eq!(sim.stats().healed_fields, 1);
        let velocity = sim.read_field(FieldKind::Velocity).unwrap();
        assert_eq!(velocity.count_non_finite(), 0);
    }

    #[test]
    fn test_display_fields_are_finite() {
        let mut sim = simulation();
        let mut dye = vec![0.5; 64 * 64 * 3];
        dye[0] = f32::INFINITY;
        sim.write_field(FieldKind::Dye, &dye).unwrap();

        let display = sim.display_fields().unwrap();
        assert_eq!(display.dye().count_non_finite(), 0);
        assert_eq!(display.dye().width(), 64);
        assert_eq!(display.velocity().channels(), 2);
    }

    #[test]
    fn test_reconfigure_applies_tuning() {
        let mut sim = simulation();
        let mut next = config();
        next.pressure_iterations = 10;
        next.adaptive_quality = true;
        sim.reconfigure(next).unwrap();
        assert_eq!(sim.pressure_iterations(), 10);
        assert!(sim.quality().is_some());

        let mut bad = config();
        bad.pressure_iterations = 2;
        assert!(sim.reconfigure(bad).is_err());
        assert_eq!(sim.pressure_iterations(), 10);
    }

    #[test]
    fn test_reinitialize_zeroes_fields() {
        let mut sim = simulation();
        sim.random_splats(&mut rand::rng(), 2);
        sim.step(0.016);
        sim.reinitialize().unwrap();
        assert!(!sim.is_gpu_accelerated());
        let dye = sim.read_field(FieldKind::Dye).unwrap();
        assert!(dye.as_slice().iter().all(|&v| v == 0.0));
    }
}
