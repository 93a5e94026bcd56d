//! Per-tick input queue
//!
//! Forces and dye splats arrive from the host's gesture collector in normalized
//! coordinates (Y up) and live for exactly one tick: the engine drains the queue while
//! running the force and dye phases, so nothing is retained across ticks.

use crate::error::FluidError;
use crate::solver::{FlowField, SplatPass};
use nalgebra::Vector2;
use rand::Rng;

/// Velocity impulse
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Force {
    /// Center in normalized coordinates, Y up
    pub position: Vector2<f32>,
    /// Direction of the impulse (not required to be unit length)
    pub direction: Vector2<f32>,
    /// Gaussian radius in normalized units
    pub radius: f32,
    /// Scale applied to `direction`, giving grid texels per second at the center
    pub strength: f32,
}

impl Force {
    /// Create an impulse
    pub fn new(position: Vector2<f32>, direction: Vector2<f32>, radius: f32, strength: f32) -> Self {
        Self {
            position,
            direction,
            radius,
            strength,
        }
    }

    /// Reject a non-positive radius or any non-finite component
    ///
    /// # Errors
    ///
    /// Returns `FluidError::Configuration` naming the offending value.
    pub fn validate(&self) -> Result<(), FluidError> {
        require_finite("force.position", &[self.position.x, self.position.y])?;
        require_finite("force.direction", &[self.direction.x, self.direction.y])?;
        require_finite("force.strength", &[self.strength])?;
        require_radius("force.radius", self.radius)
    }

    /// Velocity increment at the center
    pub fn impulse(&self) -> Vector2<f32> {
        self.direction * self.strength
    }

    pub(crate) fn to_pass(self) -> SplatPass {
        let impulse = self.impulse();
        SplatPass {
            target: FlowField::Velocity,
            point: [self.position.x, self.position.y],
            value: [impulse.x, impulse.y, 0.0],
            radius: self.radius,
            clamp_max: None,
        }
    }
}

/// Color injection
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DyeSplat {
    /// Center in normalized coordinates, Y up
    pub position: Vector2<f32>,
    /// RGB increment at the center
    pub color: [f32; 3],
    /// Gaussian radius in normalized units
    pub radius: f32,
}

impl DyeSplat {
    /// Create a dye splat
    pub fn new(position: Vector2<f32>, color: [f32; 3], radius: f32) -> Self {
        Self {
            position,
            color,
            radius,
        }
    }

    /// Reject a non-positive radius or any non-finite component
    ///
    /// # Errors
    ///
    /// Returns `FluidError::Configuration` naming the offending value.
    pub fn validate(&self) -> Result<(), FluidError> {
        require_finite("splat.position", &[self.position.x, self.position.y])?;
        require_finite("splat.color", &self.color)?;
        require_radius("splat.radius", self.radius)
    }

    pub(crate) fn to_pass(self, dye_max: f32) -> SplatPass {
        SplatPass {
            target: FlowField::Dye,
            point: [self.position.x, self.position.y],
            value: self.color,
            radius: self.radius,
            clamp_max: Some(dye_max),
        }
    }
}

/// Inputs waiting for the next tick
#[derive(Debug, Default)]
pub struct InputQueue {
    forces: Vec<Force>,
    splats: Vec<DyeSplat>,
}

impl InputQueue {
    /// Create an empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a force for the next tick
    pub fn push_force(&mut self, force: Force) {
        self.forces.push(force);
    }

    /// Queue a dye splat for the next tick
    pub fn push_splat(&mut self, splat: DyeSplat) {
        self.splats.push(splat);
    }

    /// Take every pending force
    pub fn take_forces(&mut self) -> Vec<Force> {
        std::mem::take(&mut self.forces)
    }

    /// Take every pending dye splat
    pub fn take_splats(&mut self) -> Vec<DyeSplat> {
        std::mem::take(&mut self.splats)
    }

    /// Number of pending forces
    pub fn force_count(&self) -> usize {
        self.forces.len()
    }

    /// Number of pending dye splats
    pub fn splat_count(&self) -> usize {
        self.splats.len()
    }

    /// Check if nothing is pending
    pub fn is_empty(&self) -> bool {
        self.forces.is_empty() && self.splats.is_empty()
    }

    /// Drop everything pending
    pub fn clear(&mut self) {
        self.forces.clear();
        self.splats.clear();
    }
}

/// Dye intensity of a pointer splat relative to a fully saturated color
pub const POINTER_DYE_INTENSITY: f32 = 0.15;
/// Dye intensity of the startup burst
pub const RANDOM_DYE_INTENSITY: f32 = POINTER_DYE_INTENSITY * 10.0;
/// Impulse strength of the startup burst, in grid texels per second
pub const RANDOM_SPLAT_STRENGTH: f32 = 1000.0;

/// Every value must be finite
pub(crate) fn require_finite(parameter: &'static str, values: &[f32]) -> Result<(), FluidError> {
    match values.iter().find(|v| !v.is_finite()) {
        Some(value) => Err(FluidError::config(
            parameter,
            format!("must be finite, got {value}"),
        )),
        None => Ok(()),
    }
}

/// Gaussian radii must be finite and positive
pub(crate) fn require_radius(parameter: &'static str, radius: f32) -> Result<(), FluidError> {
    if radius.is_finite() && radius > 0.0 {
        Ok(())
    } else {
        Err(FluidError::config(
            parameter,
            format!("must be finite and positive, got {radius}"),
        ))
    }
}

/// Random fully saturated color scaled by `intensity`
pub fn random_color<R: Rng + ?Sized>(rng: &mut R, intensity: f32) -> [f32; 3] {
    let [r, g, b] = hsv_to_rgb(rng.random::<f32>(), 1.0, 1.0);
    [r * intensity, g * intensity, b * intensity]
}

/// HSV to RGB with every component in `[0, 1]`
pub fn hsv_to_rgb(h: f32, s: f32, v: f32) -> [f32; 3] {
    let h = h.rem_euclid(1.0) * 6.0;
    let sector = h.floor();
    let f = h - sector;
    let p = v * (1.0 - s);
    let q = v * (1.0 - f * s);
    let t = v * (1.0 - (1.0 - f) * s);

    match sector as u32 {
        0 => [v, t, p],
        1 => [q, v, p],
        2 => [p, v, t],
        3 => [p, q, v],
        4 => [t, p, v],
        _ => [v, p, q],
    }
}
