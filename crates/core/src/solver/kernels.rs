//! CPU implementations of the solver kernels
//!
//! Each kernel reads one or more input fields and writes a distinct output field, one
//! row per Rayon task. Neighbor lookups clamp to the grid edge. Row 0 is the bottom of
//! the domain, so "top" is `y + 1`.

use super::fields::FieldData;
use super::r#trait::SplatPass;
use rayon::prelude::*;

/// Clamp applied to each velocity component after vorticity confinement
pub const VELOCITY_LIMIT: f32 = 1000.0;

/// Run `texel` for every output texel, in parallel over rows
#[inline]
fn for_each_texel(out: &mut FieldData, texel: impl Fn(usize, usize, &mut [f32]) + Sync) {
    let width = out.width();
    let channels = out.channels();
    out.as_mut_slice()
        .par_chunks_mut(width * channels)
        .enumerate()
        .for_each(|(y, row)| {
            for (x, value) in row.chunks_mut(channels).enumerate() {
                texel(x, y, value);
            }
        });
}

/// Map a texel center of a `from`-sized grid to texel-space coordinates of a `to`-sized grid
#[inline]
fn remap(x: usize, y: usize, from: (usize, usize), to: (usize, usize)) -> (f32, f32) {
    if from == to {
        return (x as f32, y as f32);
    }
    let sx = to.0 as f32 / from.0 as f32;
    let sy = to.1 as f32 / from.1 as f32;
    ((x as f32 + 0.5) * sx - 0.5, (y as f32 + 0.5) * sy - 0.5)
}

#[inline]
fn shape(field: &FieldData) -> (usize, usize) {
    (field.width(), field.height())
}

/// Semi-Lagrangian advection of `source` along `velocity` into `out`
///
/// `out` has the resolution of `source`. Velocity is in grid texels per second, so the
/// backtrace is scaled from grid texels to source texels. With `dt == 0` every output
/// texel equals the source texel exactly.
pub fn advect(
    velocity: &FieldData,
    source: &FieldData,
    out: &mut FieldData,
    dt: f32,
    dissipation: f32,
) {
    let decay = 1.0 + dissipation * dt;
    let scale_x = source.width() as f32 / velocity.width() as f32;
    let scale_y = source.height() as f32 / velocity.height() as f32;
    let (from, to) = (shape(source), shape(velocity));

    for_each_texel(out, |x, y, value| {
        let (vx, vy) = remap(x, y, from, to);
        let v = velocity.sample(vx, vy);
        let px = x as f32 - dt * v[0] * scale_x;
        let py = y as f32 - dt * v[1] * scale_y;
        let sampled = source.sample(px, py);
        for (c, out) in value.iter_mut().enumerate() {
            *out = sampled[c] / decay;
        }
    });
}

/// Central-difference curl of velocity
pub fn curl(velocity: &FieldData, out: &mut FieldData) {
    for_each_texel(out, |x, y, value| {
        let (x, y) = (x as isize, y as isize);
        let left = velocity.texel(x - 1, y)[1];
        let right = velocity.texel(x + 1, y)[1];
        let top = velocity.texel(x, y + 1)[0];
        let bottom = velocity.texel(x, y - 1)[0];
        value[0] = 0.5 * (right - left - top + bottom);
    });
}

/// Add the vorticity confinement force to velocity
///
/// The force follows the normalized gradient of |curl| rotated by 90°, scaled by the
/// local curl and `strength`.
pub fn vorticity(
    velocity: &FieldData,
    curl: &FieldData,
    out: &mut FieldData,
    strength: f32,
    dt: f32,
) {
    for_each_texel(out, |x, y, value| {
        let (xi, yi) = (x as isize, y as isize);
        let left = curl.texel(xi - 1, yi)[0].abs();
        let right = curl.texel(xi + 1, yi)[0].abs();
        let top = curl.texel(xi, yi + 1)[0].abs();
        let bottom = curl.texel(xi, yi - 1)[0].abs();
        let center = curl.texel(xi, yi)[0];

        let mut fx = 0.5 * (top - bottom);
        let mut fy = 0.5 * (right - left);
        let length = (fx * fx + fy * fy).sqrt() + 0.0001;
        fx = fx / length * strength * center;
        fy = -(fy / length * strength * center);

        let v = velocity.texel(xi, yi);
        value[0] = (v[0] + fx * dt).clamp(-VELOCITY_LIMIT, VELOCITY_LIMIT);
        value[1] = (v[1] + fy * dt).clamp(-VELOCITY_LIMIT, VELOCITY_LIMIT);
    });
}

/// Add a Gaussian-weighted increment to `base`
///
/// `weight = exp(-d² / (2·radius²))` with the X distance stretched by the field's aspect
/// ratio so splats stay round on non-square grids.
pub fn splat(base: &FieldData, out: &mut FieldData, splat: &SplatPass) {
    let width = base.width() as f32;
    let height = base.height() as f32;
    let aspect = width / height;
    let denominator = 2.0 * splat.radius * splat.radius;

    for_each_texel(out, |x, y, value| {
        let mut dx = (x as f32 + 0.5) / width - splat.point[0];
        let dy = (y as f32 + 0.5) / height - splat.point[1];
        dx *= aspect;
        let weight = (-(dx * dx + dy * dy) / denominator).exp();

        let current = base.texel(x as isize, y as isize);
        for (c, out) in value.iter_mut().enumerate() {
            let increment = splat.value.get(c).copied().unwrap_or(0.0);
            let mut next = current[c] + increment * weight;
            if let Some(max) = splat.clamp_max {
                next = next.clamp(0.0, max);
            }
            *out = next;
        }
    });
}

/// Central-difference divergence with free-slip edges
///
/// A neighbor outside the grid contributes the negated center component, so flow
/// through the boundary counts as divergence and gets projected away.
pub fn divergence(velocity: &FieldData, out: &mut FieldData) {
    let width = velocity.width() as isize;
    let height = velocity.height() as isize;

    for_each_texel(out, |x, y, value| {
        let (x, y) = (x as isize, y as isize);
        let center = velocity.texel(x, y);
        let left = if x == 0 {
            -center[0]
        } else {
            velocity.texel(x - 1, y)[0]
        };
        let right = if x == width - 1 {
            -center[0]
        } else {
            velocity.texel(x + 1, y)[0]
        };
        let bottom = if y == 0 {
            -center[1]
        } else {
            velocity.texel(x, y - 1)[1]
        };
        let top = if y == height - 1 {
            -center[1]
        } else {
            velocity.texel(x, y + 1)[1]
        };
        value[0] = 0.5 * (right - left + top - bottom);
    });
}

/// Multiply every value by `factor`
pub fn scale(input: &FieldData, out: &mut FieldData, factor: f32) {
    out.as_mut_slice()
        .par_iter_mut()
        .zip(input.as_slice().par_iter())
        .for_each(|(dst, src)| *dst = src * factor);
}

/// One Jacobi relaxation: `p = (L + R + T + B - div) / 4`
pub fn jacobi(pressure: &FieldData, divergence: &FieldData, out: &mut FieldData) {
    for_each_texel(out, |x, y, value| {
        let (x, y) = (x as isize, y as isize);
        let left = pressure.texel(x - 1, y)[0];
        let right = pressure.texel(x + 1, y)[0];
        let top = pressure.texel(x, y + 1)[0];
        let bottom = pressure.texel(x, y - 1)[0];
        let div = divergence.texel(x, y)[0];
        value[0] = 0.25 * (left + right + top + bottom - div);
    });
}

/// Subtract the pressure gradient `(R - L, T - B)` from velocity
///
/// No 0.5 factor here; it is paired with the 0.5 in [`divergence`] and the two must
/// change together.
pub fn subtract_gradient(pressure: &FieldData, velocity: &FieldData, out: &mut FieldData) {
    for_each_texel(out, |x, y, value| {
        let (x, y) = (x as isize, y as isize);
        let left = pressure.texel(x - 1, y)[0];
        let right = pressure.texel(x + 1, y)[0];
        let top = pressure.texel(x, y + 1)[0];
        let bottom = pressure.texel(x, y - 1)[0];
        let v = velocity.texel(x, y);
        value[0] = v[0] - (right - left);
        value[1] = v[1] - (top - bottom);
    });
}

/// Bilinear resample of `source` into `out`, scaling each channel by `channel_scale`
pub fn resample(source: &FieldData, out: &mut FieldData, channel_scale: [f32; 4]) {
    let (from, to) = (shape(out), shape(source));
    for_each_texel(out, |x, y, value| {
        let (px, py) = remap(x, y, from, to);
        let sampled = source.sample(px, py);
        for (c, out) in value.iter_mut().enumerate() {
            *out = sampled[c] * channel_scale[c];
        }
    });
}
