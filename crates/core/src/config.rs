//! Solver configuration surface
//!
//! `FluidConfig` is the only way parameters enter the core. Every value is checked by
//! [`FluidConfig::validate`] before an engine is built or reconfigured, so the solver
//! never runs with out-of-range parameters.

use crate::error::FluidError;
use crate::solver::Precision;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lowest pressure iteration count accepted by the configuration boundary
pub const MIN_PRESSURE_ITERATIONS: u32 = 6;
/// Highest pressure iteration count accepted by the configuration boundary
pub const MAX_PRESSURE_ITERATIONS: u32 = 40;
/// Upper bound for vorticity confinement strength
pub const MAX_CURL_STRENGTH: f32 = 50.0;
/// Largest timestep the engine will ever integrate (seconds)
pub const MAX_DT: f32 = 1.0 / 30.0;
/// Largest field edge accepted before asking the platform
pub const MAX_RESOLUTION: u32 = 8192;

/// Grid size in texels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resolution {
    /// Width in texels
    pub width: u32,
    /// Height in texels
    pub height: u32,
}

impl Resolution {
    /// Create a resolution
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Square resolution
    #[must_use]
    pub const fn square(size: u32) -> Self {
        Self::new(size, size)
    }

    /// Number of texels
    #[must_use]
    pub fn cells(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Shorter edge
    #[must_use]
    pub fn short_side(&self) -> u32 {
        self.width.min(self.height)
    }

    /// Width over height
    #[must_use]
    pub fn aspect(&self) -> f32 {
        self.width as f32 / self.height.max(1) as f32
    }

    /// Scale both edges, never dropping below one texel
    #[must_use]
    pub fn scaled(&self, factor: f32) -> Self {
        let scale = |v: u32| ((v as f32 * factor).round() as u32).max(1);
        Self::new(scale(self.width), scale(self.height))
    }

    /// Resolution whose short side is `short_side` and whose aspect matches `aspect`
    ///
    /// The long side is rounded to the nearest texel. Used to keep grid texels square
    /// when the canvas is not.
    #[must_use]
    pub fn for_aspect(short_side: u32, aspect: f32) -> Self {
        let stretch = if aspect < 1.0 { 1.0 / aspect } else { aspect };
        let long_side = ((short_side as f32) * stretch).round() as u32;
        if aspect >= 1.0 {
            Self::new(long_side.max(short_side), short_side)
        } else {
            Self::new(short_side, long_side.max(short_side))
        }
    }

    /// Size of one texel in normalized coordinates
    #[must_use]
    pub fn texel_size(&self) -> (f32, f32) {
        (1.0 / self.width as f32, 1.0 / self.height as f32)
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Quality preset determining initial grid and dye resolution
///
/// Presets only pick resolutions; iteration counts and dissipation stay at their
/// defaults. The adaptive controller may lower resolution below the preset at runtime
/// but never above it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QualityPreset {
    /// 256 grid, 1024 dye
    Ultra,
    /// 128 grid, 1024 dye
    High,
    /// 128 grid, 512 dye
    Medium,
    /// 64 grid, 256 dye
    Low,
}

impl QualityPreset {
    /// Short side of the velocity grid for this preset
    #[must_use]
    pub const fn grid_size(&self) -> u32 {
        match self {
            Self::Ultra => 256,
            Self::High | Self::Medium => 128,
            Self::Low => 64,
        }
    }

    /// Short side of the dye field for this preset
    #[must_use]
    pub const fn dye_size(&self) -> u32 {
        match self {
            Self::Ultra | Self::High => 1024,
            Self::Medium => 512,
            Self::Low => 256,
        }
    }

    /// Recommended preset when nothing is known about the hardware
    #[must_use]
    pub fn recommended() -> Self {
        Self::Medium
    }
}

/// Which pass executor to build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BackendPreference {
    /// GPU when available, CPU otherwise
    #[default]
    Auto,
    /// Always the Rayon CPU backend
    Cpu,
    /// GPU only; construction fails if no device is usable
    Gpu,
}

/// Complete solver configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FluidConfig {
    /// Velocity/pressure grid resolution
    pub grid_resolution: Resolution,
    /// Dye field resolution (usually finer than the grid)
    pub dye_resolution: Resolution,
    /// Jacobi iterations per tick, within [6, 40]
    pub pressure_iterations: u32,
    /// Velocity dissipation rate, within (0, 1]
    pub dissipation_velocity: f32,
    /// Dye dissipation rate, within (0, 1]
    pub dissipation_dye: f32,
    /// Vorticity confinement strength, within [0, 50]
    pub curl_strength: f32,
    /// Frame budget the quality controller aims for
    pub target_frame_ms: f32,
    /// Fraction of last tick's pressure used as the Jacobi initial guess, within [0, 1)
    pub pressure_warm_start: f32,
    /// Radius of pointer splats in normalized units
    pub splat_radius: f32,
    /// Multiplier from pointer delta to injected velocity
    pub splat_force: f32,
    /// Upper clamp for dye channels after splatting
    pub dye_max: f32,
    /// Timestep cap in seconds, within (0, 1/30]
    pub max_dt: f32,
    /// Preferred storage precision for GPU fields
    pub precision: Precision,
    /// Enable the adaptive quality controller
    pub adaptive_quality: bool,
    /// Ticks between non-finite diagnostics readbacks
    pub diagnostic_interval: u32,
    /// Pass executor selection
    pub backend: BackendPreference,
}

impl Default for FluidConfig {
    fn default() -> Self {
        Self::from_preset(QualityPreset::High)
    }
}

impl FluidConfig {
    /// Configuration with the resolutions of `preset` and default tuning
    #[must_use]
    pub fn from_preset(preset: QualityPreset) -> Self {
        Self {
            grid_resolution: Resolution::square(preset.grid_size()),
            dye_resolution: Resolution::square(preset.dye_size()),
            pressure_iterations: 20,
            dissipation_velocity: 0.2,
            dissipation_dye: 1.0,
            curl_strength: 30.0,
            target_frame_ms: 1000.0 / 60.0,
            pressure_warm_start: 0.8,
            splat_radius: 0.035,
            splat_force: 6000.0,
            dye_max: 1.0,
            max_dt: MAX_DT,
            precision: Precision::Half,
            adaptive_quality: true,
            diagnostic_interval: 60,
            backend: BackendPreference::Auto,
        }
    }

    /// Reject out-of-range parameters
    ///
    /// # Errors
    ///
    /// Returns `FluidError::Configuration` naming the first offending parameter.
    pub fn validate(&self) -> Result<(), FluidError> {
        validate_resolution("gridResolution", self.grid_resolution)?;
        validate_resolution("dyeResolution", self.dye_resolution)?;

        if !(MIN_PRESSURE_ITERATIONS..=MAX_PRESSURE_ITERATIONS).contains(&self.pressure_iterations)
        {
            return Err(FluidError::config(
                "pressureIterations",
                format!(
                    "must be within [{MIN_PRESSURE_ITERATIONS}, {MAX_PRESSURE_ITERATIONS}], got {}",
                    self.pressure_iterations
                ),
            ));
        }
        validate_unit_rate("dissipationVelocity", self.dissipation_velocity)?;
        validate_unit_rate("dissipationDye", self.dissipation_dye)?;

        if !(0.0..=MAX_CURL_STRENGTH).contains(&self.curl_strength) {
            return Err(FluidError::config(
                "curlStrength",
                format!("must be within [0, {MAX_CURL_STRENGTH}], got {}", self.curl_strength),
            ));
        }
        validate_positive("targetFrameMs", self.target_frame_ms)?;

        if !(0.0..1.0).contains(&self.pressure_warm_start) {
            return Err(FluidError::config(
                "pressureWarmStart",
                format!("must be within [0, 1), got {}", self.pressure_warm_start),
            ));
        }
        validate_positive("splatRadius", self.splat_radius)?;
        validate_positive("splatForce", self.splat_force)?;
        validate_positive("dyeMax", self.dye_max)?;

        if !(self.max_dt > 0.0 && self.max_dt <= MAX_DT) {
            return Err(FluidError::config(
                "maxDt",
                format!("must be within (0, {MAX_DT}], got {}", self.max_dt),
            ));
        }
        if self.diagnostic_interval == 0 {
            return Err(FluidError::config("diagnosticInterval", "must be at least 1"));
        }
        Ok(())
    }
}

/// Reject empty resolutions and edges beyond [`MAX_RESOLUTION`]
pub(crate) fn validate_resolution(
    parameter: &'static str,
    resolution: Resolution,
) -> Result<(), FluidError> {
    if resolution.width == 0 || resolution.height == 0 {
        return Err(FluidError::config(
            parameter,
            format!("must be non-zero, got {resolution}"),
        ));
    }
    if resolution.width > MAX_RESOLUTION || resolution.height > MAX_RESOLUTION {
        return Err(FluidError::config(
            parameter,
            format!("exceeds {MAX_RESOLUTION} texels per side, got {resolution}"),
        ));
    }
    Ok(())
}

fn validate_unit_rate(parameter: &'static str, value: f32) -> Result<(), FluidError> {
    if value > 0.0 && value <= 1.0 {
        Ok(())
    } else {
        Err(FluidError::config(
            parameter,
            format!("must be within (0, 1], got {value}"),
        ))
    }
}

fn validate_positive(parameter: &'static str, value: f32) -> Result<(), FluidError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(FluidError::config(
            parameter,
            format!("must be finite and positive, got {value}"),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(FluidConfig::default().validate().is_ok());
        for preset in [
            QualityPreset::Low,
            QualityPreset::Medium,
            QualityPreset::High,
            QualityPreset::Ultra,
        ] {
            assert!(FluidConfig::from_preset(preset).validate().is_ok());
        }
    }

    #[test]
    fn test_rejects_out_of_range_parameters() {
        let cases: Vec<(&str, Box<dyn Fn(&mut FluidConfig)>)> = vec![
            ("gridResolution", Box::new(|c: &mut FluidConfig| c.grid_resolution = Resolution::new(0, 64))),
            ("dyeResolution", Box::new(|c: &mut FluidConfig| c.dye_resolution = Resolution::new(64, 9000))),
            ("pressureIterations", Box::new(|c: &mut FluidConfig| c.pressure_iterations = 5)),
            ("pressureIterations", Box::new(|c: &mut FluidConfig| c.pressure_iterations = 41)),
            ("dissipationVelocity", Box::new(|c: &mut FluidConfig| c.dissipation_velocity = 0.0)),
            ("dissipationDye", Box::new(|c: &mut FluidConfig| c.dissipation_dye = 1.5)),
            ("curlStrength", Box::new(|c: &mut FluidConfig| c.curl_strength = -1.0)),
            ("targetFrameMs", Box::new(|c: &mut FluidConfig| c.target_frame_ms = f32::NAN)),
            ("pressureWarmStart", Box::new(|c: &mut FluidConfig| c.pressure_warm_start = 1.0)),
            ("splatRadius", Box::new(|c: &mut FluidConfig| c.splat_radius = -0.1)),
            ("maxDt", Box::new(|c: &mut FluidConfig| c.max_dt = 0.1)),
            ("diagnosticInterval", Box::new(|c: &mut FluidConfig| c.diagnostic_interval = 0)),
        ];

        for (expected, mutate) in cases {
            let mut config = FluidConfig::default();
            mutate(&mut config);
            match config.validate() {
                Err(FluidError::Configuration { parameter, .. }) => {
                    assert_eq!(parameter, expected);
                }
                other => panic!("expected {expected} to be rejected, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_resolution_for_aspect() {
        assert_eq!(Resolution::for_aspect(128, 2.0), Resolution::new(256, 128));
        assert_eq!(Resolution::for_aspect(128, 0.5), Resolution::new(128, 256));
        assert_eq!(Resolution::for_aspect(128, 1.0), Resolution::square(128));
    }

    #[test]
    fn test_resolution_scaled_never_zero() {
        assert_eq!(Resolution::new(128, 64).scaled(0.5), Resolution::new(64, 32));
        assert_eq!(Resolution::new(1, 1).scaled(0.25), Resolution::new(1, 1));
    }

    #[test]
    fn test_preset_sizes() {
        assert_eq!(QualityPreset::Ultra.grid_size(), 256);
        assert_eq!(QualityPreset::Low.dye_size(), 256);
        assert_eq!(QualityPreset::recommended(), QualityPreset::Medium);
    }
}
