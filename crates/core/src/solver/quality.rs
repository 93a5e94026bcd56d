//! Adaptive quality controller
//!
//! Holds the solver within a frame budget by trading pressure iterations, dye resolution
//! and grid resolution, in that order. The controller is a plain state machine fed one
//! frame duration at a time; it never touches fields itself.

use crate::config::{FluidConfig, Resolution, MIN_PRESSURE_ITERATIONS};
use std::collections::VecDeque;
use tracing::info;

/// Frame durations kept for the percentile
pub const WINDOW_SIZE: usize = 60;
/// Samples required before any decision
pub const MIN_SAMPLES: usize = 15;
/// Frames to wait after an adjustment
pub const COOLDOWN_FRAMES: u32 = 20;
/// P95 above `target × REDUCE_RATIO` lowers quality
pub const REDUCE_RATIO: f32 = 1.2;
/// P95 below `target × RAISE_RATIO` raises quality
pub const RAISE_RATIO: f32 = 0.7;
/// Pressure iteration step per adjustment
pub const ITERATION_STEP: u32 = 4;
/// Dye resolution scale per tier, best first
pub const DYE_TIERS: [f32; 4] = [1.0, 0.75, 0.5, 0.25];
/// Grid resolution scale per tier, best first
pub const GRID_TIERS: [f32; 3] = [1.0, 0.75, 0.5];

/// Knob changed by an adjustment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QualityKnob {
    /// Pressure iteration count
    Iterations,
    /// Dye resolution tier
    DyeResolution,
    /// Grid resolution tier
    GridResolution,
}

/// Direction of an adjustment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Adjustment {
    /// Quality lowered
    Reduced(QualityKnob),
    /// Quality raised
    Raised(QualityKnob),
}

/// Snapshot of the controller after an observation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QualityState {
    /// Jacobi iterations to run next tick
    pub pressure_iterations: u32,
    /// Index into [`GRID_TIERS`]
    pub grid_tier: usize,
    /// Index into [`DYE_TIERS`]
    pub dye_tier: usize,
    /// Grid resolution for the current tier
    pub grid_resolution: Resolution,
    /// Dye resolution for the current tier
    pub dye_resolution: Resolution,
    /// Frames left before the next adjustment may happen
    pub cooldown: u32,
    /// Samples currently in the window
    pub samples: usize,
    /// 95th percentile of the window when the last decision was evaluated
    pub p95_ms: Option<f32>,
    /// Adjustment made by the observation that produced this state
    pub adjustment: Option<Adjustment>,
}

impl QualityState {
    /// Whether the observation changed a resolution tier
    #[must_use]
    pub fn resolution_changed(&self) -> bool {
        matches!(
            self.adjustment,
            Some(
                Adjustment::Reduced(QualityKnob::DyeResolution | QualityKnob::GridResolution)
                    | Adjustment::Raised(QualityKnob::DyeResolution | QualityKnob::GridResolution)
            )
        )
    }
}

/// Frame-time driven quality state machine
#[derive(Debug, Clone)]
pub struct QualityController {
    target_ms: f32,
    max_iterations: u32,
    iterations: u32,
    grid_tier: usize,
    dye_tier: usize,
    base_grid: Resolution,
    base_dye: Resolution,
    window: VecDeque<f32>,
    cooldown: u32,
    p95_ms: Option<f32>,
    /// `(iterations, grid_tier, dye_tier)` before the most recent adjustment
    previous: Option<(u32, usize, usize)>,
}

impl QualityController {
    /// Controller starting at the configured (maximum) quality
    #[must_use]
    pub fn new(config: &FluidConfig) -> Self {
        Self {
            target_ms: config.target_frame_ms,
            max_iterations: config.pressure_iterations,
            iterations: config.pressure_iterations,
            grid_tier: 0,
            dye_tier: 0,
            base_grid: config.grid_resolution,
            base_dye: config.dye_resolution,
            window: VecDeque::with_capacity(WINDOW_SIZE),
            cooldown: 0,
            p95_ms: None,
            previous: None,
        }
    }

    /// Replace the full-quality resolutions, keeping the current tiers
    pub fn set_base_resolutions(&mut self, grid: Resolution, dye: Resolution) {
        self.base_grid = grid;
        self.base_dye = dye;
    }

    /// Forget collected samples, e.g. after a pause
    pub fn reset_window(&mut self) {
        self.window.clear();
    }

    /// Current state without recording a sample
    #[must_use]
    pub fn state(&self) -> QualityState {
        QualityState {
            pressure_iterations: self.iterations,
            grid_tier: self.grid_tier,
            dye_tier: self.dye_tier,
            grid_resolution: self.base_grid.scaled(GRID_TIERS[self.grid_tier]),
            dye_resolution: self.base_dye.scaled(DYE_TIERS[self.dye_tier]),
            cooldown: self.cooldown,
            samples: self.window.len(),
            p95_ms: self.p95_ms,
            adjustment: None,
        }
    }

    /// Record one frame duration and adjust quality if warranted
    pub fn observe(&mut self, frame_ms: f32) -> QualityState {
        if self.window.len() == WINDOW_SIZE {
            self.window.pop_front();
        }
        self.window.push_back(frame_ms);

        if self.cooldown > 0 {
            self.cooldown -= 1;
            return self.state();
        }
        if self.window.len() < MIN_SAMPLES {
            return self.state();
        }

        let p95 = percentile_95(&self.window);
        self.p95_ms = Some(p95);
        let before = (self.iterations, self.grid_tier, self.dye_tier);

        let adjustment = if p95 > self.target_ms * REDUCE_RATIO {
            self.reduce().map(Adjustment::Reduced)
        } else if p95 < self.target_ms * RAISE_RATIO {
            self.raise().map(Adjustment::Raised)
        } else {
            None
        };

        if let Some(adjustment) = adjustment {
            self.previous = Some(before);
            self.cooldown = COOLDOWN_FRAMES;
            self.window.clear();
            info!(
                "Quality {:?}: P95 {:.2} ms vs target {:.2} ms -> {} iterations, grid {}, dye {}",
                adjustment,
                p95,
                self.target_ms,
                self.iterations,
                self.base_grid.scaled(GRID_TIERS[self.grid_tier]),
                self.base_dye.scaled(DYE_TIERS[self.dye_tier]),
            );
        }

        QualityState {
            adjustment,
            ..self.state()
        }
    }

    /// Undo the most recent adjustment when it could not be applied
    ///
    /// The cooldown stays in place, so the same change is retried only after it
    /// expires. Returns false if there was nothing to undo.
    pub fn revert_last(&mut self) -> bool {
        match self.previous.take() {
            Some((iterations, grid_tier, dye_tier)) => {
                self.iterations = iterations;
                self.grid_tier = grid_tier;
                self.dye_tier = dye_tier;
                true
            }
            None => false,
        }
    }

    fn reduce(&mut self) -> Option<QualityKnob> {
        if self.iterations > MIN_PRESSURE_ITERATIONS {
            self.iterations = self
                .iterations
                .saturating_sub(ITERATION_STEP)
                .max(MIN_PRESSURE_ITERATIONS);
            Some(QualityKnob::Iterations)
        } else if self.dye_tier + 1 < DYE_TIERS.len() {
            self.dye_tier += 1;
            Some(QualityKnob::DyeResolution)
        } else if self.grid_tier + 1 < GRID_TIERS.len() {
            self.grid_tier += 1;
            Some(QualityKnob::GridResolution)
        } else {
            None
        }
    }

    fn raise(&mut self) -> Option<QualityKnob> {
        if self.grid_tier > 0 {
            self.grid_tier -= 1;
            Some(QualityKnob::GridResolution)
        } else if self.dye_tier > 0 {
            self.dye_tier -= 1;
            Some(QualityKnob::DyeResolution)
        } else if self.iterations < self.max_iterations {
            self.iterations = (self.iterations + ITERATION_STEP).min(self.max_iterations);
            Some(QualityKnob::Iterations)
        } else {
            None
        }
    }
}

/// Nearest-rank 95th percentile
fn percentile_95(samples: &VecDeque<f32>) -> f32 {
    let mut sorted: Vec<f32> = samples.iter().copied().collect();
    sorted.sort_by(f32::total_cmp);
    let rank = ((sorted.len() as f32) * 0.95).ceil() as usize;
    sorted[rank.saturating_sub(1).min(sorted.len() - 1)]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controller() -> QualityController {
        QualityController::new(&FluidConfig {
            grid_resolution: Resolution::square(128),
            dye_resolution: Resolution::square(512),
            pressure_iterations: 20,
            target_frame_ms: 16.0,
            ..FluidConfig::default()
        })
    }

    #[test]
    fn test_percentile_nearest_rank() {
        let samples: VecDeque<f32> = (1..=20).map(|v| v as f32).collect();
        assert_eq!(percentile_95(&samples), 19.0);
        let samples: VecDeque<f32> = (1..=100).rev().map(|v| v as f32).collect();
        assert_eq!(percentile_95(&samples), 95.0);
    }

    #[test]
    fn test_no_decision_before_minimum_samples() {
        let mut controller = controller();
        for _ in 0..MIN_SAMPLES - 1 {
            let state = controller.observe(100.0);
            assert_eq!(state.adjustment, None);
            assert_eq!(state.p95_ms, None);
        }
        let state = controller.observe(100.0);
        assert_eq!(
            state.adjustment,
            Some(Adjustment::Reduced(QualityKnob::Iterations))
        );
        assert_eq!(state.pressure_iterations, 16);
        assert_eq!(state.cooldown, COOLDOWN_FRAMES);
        assert_eq!(state.samples, 0);
    }

    #[test]
    fn test_cooldown_blocks_adjustments() {
        let mut controller = controller();
        for _ in 0..MIN_SAMPLES {
            controller.observe(100.0);
        }
        for _ in 0..COOLDOWN_FRAMES {
            assert_eq!(controller.observe(100.0).adjustment, None);
        }
        // Window refilled during cooldown, so the next frame decides
        assert!(controller.observe(100.0).adjustment.is_some());
    }

    #[test]
    fn test_within_band_holds_steady() {
        let mut controller = controller();
        for _ in 0..200 {
            assert_eq!(controller.observe(16.0).adjustment, None);
        }
        assert_eq!(controller.state().pressure_iterations, 20);
    }

    #[test]
    fn test_reduce_order_iterations_then_dye_then_grid() {
        let mut controller = controller();
        let knobs: Vec<QualityKnob> = (0..1000)
            .filter_map(|_| match controller.observe(40.0).adjustment {
                Some(Adjustment::Reduced(knob)) => Some(knob),
                Some(Adjustment::Raised(_)) => panic!("raised under load"),
                None => None,
            })
            .collect();

        use QualityKnob::{DyeResolution as D, GridResolution as G, Iterations as I};
        assert_eq!(knobs, vec![I, I, I, I, D, D, D, G, G]);

        let state = controller.state();
        assert_eq!(state.pressure_iterations, MIN_PRESSURE_ITERATIONS);
        assert_eq!(state.dye_resolution, Resolution::square(128));
        assert_eq!(state.grid_resolution, Resolution::square(64));
    }

    #[test]
    fn test_raise_order_is_reverse() {
        let mut controller = controller();
        for _ in 0..1000 {
            controller.observe(40.0);
        }
        let knobs: Vec<QualityKnob> = (0..1000)
            .filter_map(|_| match controller.observe(2.0).adjustment {
                Some(Adjustment::Raised(knob)) => Some(knob),
                Some(Adjustment::Reduced(_)) => panic!("reduced when idle"),
                None => None,
            })
            .collect();

        use QualityKnob::{DyeResolution as D, GridResolution as G, Iterations as I};
        assert_eq!(knobs, vec![G, G, D, D, D, I, I, I, I]);
        let state = controller.state();
        assert_eq!(state.pressure_iterations, 20);
        assert_eq!(state.grid_resolution, Resolution::square(128));
        assert_eq!(state.dye_resolution, Resolution::square(512));
    }

    #[test]
    fn test_resolution_changed_flag() {
        let mut state = controller().state();
        assert!(!state.resolution_changed());
        state.adjustment = Some(Adjustment::Reduced(QualityKnob::DyeResolution));
        assert!(state.resolution_changed());
        state.adjustment = Some(Adjustment::Raised(QualityKnob::Iterations));
        assert!(!state.resolution_changed());
    }

    #[test]
    fn test_revert_restores_previous_tier() {
        let mut controller = QualityController::new(&FluidConfig {
            grid_resolution: Resolution::square(64),
            dye_resolution: Resolution::square(128),
            pressure_iterations: MIN_PRESSURE_ITERATIONS,
            target_frame_ms: 16.0,
            ..FluidConfig::default()
        });
        assert!(!controller.revert_last());

        let state = (0..100)
            .map(|_| controller.observe(40.0))
            .find(|state| state.adjustment.is_some())
            .unwrap();
        assert_eq!(state.dye_tier, 1);

        assert!(controller.revert_last());
        let reverted = controller.state();
        assert_eq!(reverted.dye_tier, 0);
        assert_eq!(reverted.dye_resolution, Resolution::square(128));
        assert_eq!(reverted.cooldown, COOLDOWN_FRAMES);
        assert!(!controller.revert_last());
    }
}
