//! Pass executor trait definition
//!
//! This module defines the `FluidBackend` trait, the backend-agnostic interface the step
//! engine drives. Both CPU and GPU backends implement it. A backend owns every field;
//! the engine only describes passes and never holds a reference to backend storage.

use crate::config::Resolution;
use crate::error::FluidError;
use std::borrow::Cow;
use std::fmt;

/// Grid-resident fields owned by a backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    /// Velocity in grid texels per second (2 channels, double-buffered)
    Velocity,
    /// Pigment color (3 channels, double-buffered, dye resolution)
    Dye,
    /// Pressure (1 channel, double-buffered)
    Pressure,
    /// Velocity divergence (1 channel)
    Divergence,
    /// Velocity curl (1 channel)
    Curl,
}

impl FieldKind {
    /// Every field, in allocation order
    pub const ALL: [FieldKind; 5] = [
        Self::Velocity,
        Self::Dye,
        Self::Pressure,
        Self::Divergence,
        Self::Curl,
    ];

    /// Logical channel count
    #[must_use]
    pub const fn channels(&self) -> usize {
        match self {
            Self::Velocity => 2,
            Self::Dye => 3,
            Self::Pressure | Self::Divergence | Self::Curl => 1,
        }
    }

    /// Whether the field lives at dye resolution rather than grid resolution
    #[must_use]
    pub const fn is_dye_resolution(&self) -> bool {
        matches!(self, Self::Dye)
    }

    /// Short name used in logs and errors
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Velocity => "velocity",
            Self::Dye => "dye",
            Self::Pressure => "pressure",
            Self::Divergence => "divergence",
            Self::Curl => "curl",
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Fields that are transported and splatted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlowField {
    /// Velocity grid
    Velocity,
    /// Dye field
    Dye,
}

impl From<FlowField> for FieldKind {
    fn from(field: FlowField) -> Self {
        match field {
            FlowField::Velocity => Self::Velocity,
            FlowField::Dye => Self::Dye,
        }
    }
}

/// Gaussian injection into velocity or dye
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SplatPass {
    /// Field receiving the splat
    pub target: FlowField,
    /// Center in normalized coordinates, Y up
    pub point: [f32; 2],
    /// Increment at the center; velocity uses the first two components
    pub value: [f32; 3],
    /// Gaussian radius in normalized units (measured along Y)
    pub radius: f32,
    /// Clamp the result to `[0, max]` after adding
    pub clamp_max: Option<f32>,
}

/// One grid-parallel pass
///
/// Every pass reads the read side of its inputs and writes the write side of exactly one
/// output, which is then swapped. Passes are pure functions of their inputs and the
/// values carried here.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Pass {
    /// Semi-Lagrangian transport of `field` along velocity, divided by `1 + dissipation·dt`
    Advect {
        /// Transported field
        field: FlowField,
        /// Timestep in seconds
        dt: f32,
        /// Dissipation rate
        dissipation: f32,
    },
    /// Central-difference curl of velocity into the curl field
    Curl,
    /// Vorticity confinement force added to velocity
    Vorticity {
        /// Confinement strength
        strength: f32,
        /// Timestep in seconds
        dt: f32,
    },
    /// Gaussian splat
    Splat(SplatPass),
    /// Central-difference divergence of velocity with free-slip edges
    Divergence,
    /// Multiply pressure by `factor` (Jacobi warm start)
    ScalePressure {
        /// Scale applied to last tick's pressure
        factor: f32,
    },
    /// One Jacobi relaxation of the pressure Poisson equation
    Jacobi,
    /// Subtract the pressure gradient from velocity
    SubtractGradient,
}

impl Pass {
    /// Field written by this pass
    #[must_use]
    pub fn output(&self) -> FieldKind {
        match self {
            Self::Advect { field, .. } => (*field).into(),
            Self::Splat(splat) => splat.target.into(),
            Self::Curl => FieldKind::Curl,
            Self::Vorticity { .. } | Self::SubtractGradient => FieldKind::Velocity,
            Self::Divergence => FieldKind::Divergence,
            Self::ScalePressure { .. } | Self::Jacobi => FieldKind::Pressure,
        }
    }

    /// Short name used for profiling
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Advect { .. } => "advect",
            Self::Curl => "curl",
            Self::Vorticity { .. } => "vorticity",
            Self::Splat(_) => "splat",
            Self::Divergence => "divergence",
            Self::ScalePressure { .. } => "scale_pressure",
            Self::Jacobi => "jacobi",
            Self::SubtractGradient => "subtract_gradient",
        }
    }
}

/// Backend-agnostic pass executor and field owner
///
/// Field data crossing this interface is row-major, bottom row first, with
/// `FieldKind::channels` interleaved `f32` values per texel.
pub trait FluidBackend: Send + Sync {
    /// Execute one pass; the written field is swapped before this returns
    fn run(&mut self, pass: &Pass);

    /// Read the current read side of a field
    ///
    /// # Errors
    ///
    /// Returns `FluidError::Device` if a GPU readback fails.
    fn read_field(&self, field: FieldKind) -> Result<Cow<'_, [f32]>, FluidError>;

    /// Overwrite the read side of a field
    ///
    /// # Errors
    ///
    /// Returns `FluidError::Configuration` if `data` has the wrong length.
    fn write_field(&mut self, field: FieldKind, data: &[f32]) -> Result<(), FluidError>;

    /// Zero both sides of a field
    fn clear_field(&mut self, field: FieldKind);

    /// Replace all fields with new ones at the given resolutions
    ///
    /// With `preserve`, velocity, dye and pressure are resampled into the new fields;
    /// otherwise everything starts at zero. Old storage is released before returning.
    ///
    /// # Errors
    ///
    /// Returns `FluidError::Resource` or `FluidError::Unsupported` if the new fields
    /// cannot be allocated. The backend keeps its previous fields in that case.
    fn reallocate(
        &mut self,
        grid: Resolution,
        dye: Resolution,
        preserve: bool,
    ) -> Result<(), FluidError>;

    /// Current `(grid, dye)` resolutions
    fn resolutions(&self) -> (Resolution, Resolution);

    /// Check if this is the GPU backend
    fn is_gpu_accelerated(&self) -> bool;

    /// Human-readable backend name for logging
    fn name(&self) -> &str;
}

/// Expected scalar count for `field` at the given resolutions
#[must_use]
pub fn field_len(field: FieldKind, grid: Resolution, dye: Resolution) -> usize {
    let resolution = if field.is_dye_resolution() { dye } else { grid };
    resolution.cells() * field.channels()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pass_outputs() {
        assert_eq!(Pass::Curl.output(), FieldKind::Curl);
        assert_eq!(Pass::Jacobi.output(), FieldKind::Pressure);
        assert_eq!(
            Pass::Advect {
                field: FlowField::Dye,
                dt: 0.016,
                dissipation: 1.0
            }
            .output(),
            FieldKind::Dye
        );
        assert_eq!(Pass::SubtractGradient.output(), FieldKind::Velocity);
    }

    #[test]
    fn test_field_len_uses_dye_resolution_for_dye() {
        let grid = Resolution::new(8, 4);
        let dye = Resolution::new(16, 8);
        assert_eq!(field_len(FieldKind::Velocity, grid, dye), 64);
        assert_eq!(field_len(FieldKind::Dye, grid, dye), 384);
        assert_eq!(field_len(FieldKind::Pressure, grid, dye), 32);
    }
}
