//! Field health measurements
//!
//! Host-side checks run on read-back field data: interior divergence for the
//! incompressibility invariant, non-finite counts for the self-healing pass and peak
//! magnitudes for boundedness.

use crate::solver::FieldData;

/// Mean absolute central-difference divergence over interior texels
///
/// Uses the same `0.5·((R−L)+(T−B))` stencil as the divergence pass. Edge texels are
/// excluded; a grid without interior texels reports zero.
pub fn mean_abs_divergence(velocity: &FieldData) -> f32 {
    let (width, height) = (velocity.width(), velocity.height());
    if width < 3 || height < 3 || velocity.channels() < 2 {
        return 0.0;
    }

    let mut total = 0.0_f64;
    for y in 1..height - 1 {
        for x in 1..width - 1 {
            let left = velocity.get(x - 1, y, 0);
            let right = velocity.get(x + 1, y, 0);
            let bottom = velocity.get(x, y - 1, 1);
            let top = velocity.get(x, y + 1, 1);
            total += f64::from(0.5 * (right - left + top - bottom)).abs();
        }
    }
    (total / ((width - 2) * (height - 2)) as f64) as f32
}

/// Mean absolute value of a scalar field over interior texels
pub fn mean_abs_interior(field: &FieldData) -> f32 {
    let (width, height) = (field.width(), field.height());
    if width < 3 || height < 3 {
        return 0.0;
    }
    let mut total = 0.0_f64;
    for y in 1..height - 1 {
        for x in 1..width - 1 {
            total += f64::from(field.get(x, y, 0)).abs();
        }
    }
    (total / ((width - 2) * (height - 2)) as f64) as f32
}

/// Number of NaN or infinite scalars
pub fn count_non_finite(data: &[f32]) -> usize {
    data.iter().filter(|v| !v.is_finite()).count()
}

/// Largest vector magnitude over all texels, using every channel
pub fn max_magnitude(field: &FieldData) -> f32 {
    field
        .as_slice()
        .chunks(field.channels())
        .map(|texel| texel.iter().map(|c| c * c).sum::<f32>().sqrt())
        .fold(0.0, f32::max)
}

/// Smallest and largest scalar over all channels
pub fn value_range(data: &[f32]) -> (f32, f32) {
    data.iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        })
}
