//! Solver step engine
//!
//! `FluidSimulation` sequences the solver passes of one tick, owns the per-tick input
//! queue and applies adaptive quality decisions:
//! - Self-advection, curl and vorticity confinement
//! - External force injection
//! - Divergence, Jacobi pressure projection and gradient subtraction
//! - Dye transport and dye splats

pub mod diagnostics;
mod fluid_simulation;
pub mod inputs;

pub use fluid_simulation::{FluidSimulation, TickOutcome};
pub use inputs::{DyeSplat, Force};

use crate::config::Resolution;
use std::fmt;

/// Phases of one tick, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Semi-Lagrangian transport of velocity along itself
    AdvectVelocity,
    /// Curl of velocity
    Curl,
    /// Vorticity confinement force (skipped when strength is zero)
    Vorticity,
    /// Pending forces as Gaussian velocity splats
    Forces,
    /// Divergence of velocity
    Divergence,
    /// Warm start plus N Jacobi iterations
    Pressure,
    /// Pressure gradient removed from velocity
    SubtractGradient,
    /// Dye advection followed by pending dye splats
    Dye,
}

impl Phase {
    /// The only valid order; every tick runs all of them
    pub const ORDER: [Phase; 8] = [
        Phase::AdvectVelocity,
        Phase::Curl,
        Phase::Vorticity,
        Phase::Forces,
        Phase::Divergence,
        Phase::Pressure,
        Phase::SubtractGradient,
        Phase::Dye,
    ];

    /// Name used for profiling scopes
    pub const fn name(&self) -> &'static str {
        match self {
            Phase::AdvectVelocity => "advect_velocity",
            Phase::Curl => "curl",
            Phase::Vorticity => "vorticity",
            Phase::Forces => "forces",
            Phase::Divergence => "divergence",
            Phase::Pressure => "pressure",
            Phase::SubtractGradient => "subtract_gradient",
            Phase::Dye => "dye",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Simulation counters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulationStats {
    /// Steps that integrated time or consumed inputs
    pub ticks: u64,
    /// Integrated time in seconds
    pub simulation_time: f32,
    /// Jacobi iterations per tick
    pub pressure_iterations: u32,
    /// Current grid resolution
    pub grid_resolution: Resolution,
    /// Current dye resolution
    pub dye_resolution: Resolution,
    /// Fields reset because they held non-finite values
    pub healed_fields: u64,
    /// Wall time of the last ticked step in milliseconds
    pub last_step_ms: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_order_is_fixed() {
        assert_eq!(Phase::ORDER.first(), Some(&Phase::AdvectVelocity));
        assert_eq!(Phase::ORDER.last(), Some(&Phase::Dye));
        let divergence = Phase::ORDER.iter().position(|&p| p == Phase::Divergence);
        let pressure = Phase::ORDER.iter().position(|&p| p == Phase::Pressure);
        let gradient = Phase::ORDER.iter().position(|&p| p == Phase::SubtractGradient);
        assert!(divergence < pressure && pressure < gradient);
        assert_eq!(Phase::Pressure.to_string(), "pressure");
    }
}
