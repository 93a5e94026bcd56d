//! Display compositor
//!
//! Turns a read-only snapshot of the solver fields into an RGBA8 image. Post effects
//! (bloom, sunrays, color grading) belong to the host and are not done here.

use crate::solver::FieldData;
use nalgebra::Vector3;
use rayon::prelude::*;

/// Read-only field snapshot handed to the compositor
#[derive(Debug, Clone)]
pub struct DisplayFields {
    velocity: FieldData,
    dye: FieldData,
    curl: FieldData,
}

impl DisplayFields {
    /// Bundle a snapshot
    pub fn new(velocity: FieldData, dye: FieldData, curl: FieldData) -> Self {
        Self {
            velocity,
            dye,
            curl,
        }
    }

    /// Divergence-free velocity in grid texels per second
    pub fn velocity(&self) -> &FieldData {
        &self.velocity
    }

    /// RGB dye
    pub fn dye(&self) -> &FieldData {
        &self.dye
    }

    /// Curl of velocity
    pub fn curl(&self) -> &FieldData {
        &self.curl
    }
}

/// Dye-to-image compositor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Compositor {
    /// Darken dye by its brightness gradient for a raised look
    pub shading: bool,
}

impl Default for Compositor {
    fn default() -> Self {
        Self { shading: true }
    }
}

impl Compositor {
    /// Render the dye into a `width`×`height` RGBA8 image, first row at the top
    ///
    /// Alpha is the brightest color channel so empty regions stay transparent.
    pub fn render_rgba8(&self, fields: &DisplayFields, width: u32, height: u32) -> Vec<u8> {
        let (width, height) = (width as usize, height as usize);
        let mut pixels = vec![0_u8; width * height * 4];
        if width == 0 || height == 0 {
            return pixels;
        }
        let texel = (1.0 / width as f32, 1.0 / height as f32);

        pixels
            .par_chunks_mut(width * 4)
            .enumerate()
            .for_each(|(row, line)| {
                let v = 1.0 - (row as f32 + 0.5) / height as f32;
                for (x, pixel) in line.chunks_mut(4).enumerate() {
                    let u = (x as f32 + 0.5) / width as f32;
                    let rgba = self.shade(&fields.dye, u, v, texel);
                    for (dst, value) in pixel.iter_mut().zip(rgba) {
                        *dst = to_byte(value);
                    }
                }
            });
        pixels
    }

    fn shade(&self, dye: &FieldData, u: f32, v: f32, texel: (f32, f32)) -> [f32; 4] {
        let color = rgb(dye.sample_uv(u, v));
        let color = if self.shading {
            let left = rgb(dye.sample_uv(u - texel.0, v)).norm();
            let right = rgb(dye.sample_uv(u + texel.0, v)).norm();
            let top = rgb(dye.sample_uv(u, v + texel.1)).norm();
            let bottom = rgb(dye.sample_uv(u, v - texel.1)).norm();

            let texel_len = (texel.0 * texel.0 + texel.1 * texel.1).sqrt();
            let normal = Vector3::new(right - left, top - bottom, texel_len).normalize();
            let diffuse = (normal.z + 0.7).clamp(0.7, 1.0);
            color * diffuse
        } else {
            color
        };
        let alpha = color.x.max(color.y).max(color.z);
        [color.x, color.y, color.z, alpha]
    }
}

fn rgb(sample: [f32; 4]) -> Vector3<f32> {
    Vector3::new(sample[0], sample[1], sample[2])
}

fn to_byte(value: f32) -> u8 {
    (value.clamp(0.0, 1.0) * 255.0).round() as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(dye: FieldData) -> DisplayFields {
        let (w, h) = (dye.width(), dye.height());
        DisplayFields::new(FieldData::new(w, h, 2), dye, FieldData::new(w, h, 1))
    }

    #[test]
    fn test_empty_dye_is_transparent() {
        let image = Compositor::default().render_rgba8(&snapshot(FieldData::new(4, 4, 3)), 8, 8);
        assert_eq!(image.len(), 8 * 8 * 4);
        assert!(image.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_uniform_dye_is_unshaded() {
        let mut dye = FieldData::new(4, 4, 3);
        for y in 0..4 {
            for x in 0..4 {
                dye.set(x, y, 0, 1.0);
            }
        }
        let image = Compositor::default().render_rgba8(&snapshot(dye), 4, 4);
        for pixel in image.chunks(4) {
            assert_eq!(pixel, &[255, 0, 0, 255]);
        }
    }

    #[test]
    fn test_first_row_is_top_of_domain() {
        let mut dye = FieldData::new(2, 2, 3);
        dye.set(0, 1, 1, 1.0);
        dye.set(1, 1, 1, 1.0);
        let image = Compositor { shading: false }.render_rgba8(&snapshot(dye), 2, 2);
        // Top row green, bottom row empty
        assert_eq!(&image[0..4], &[0, 255, 0, 255]);
        assert_eq!(&image[8..12], &[0, 0, 0, 0]);
    }

    #[test]
    fn test_shading_darkens_edges() {
        let mut dye = FieldData::new(8, 8, 3);
        for y in 0..8 {
            for x in 4..8 {
                dye.set(x, y, 2, 1.0);
            }
        }
        let flat = Compositor { shading: false }.render_rgba8(&snapshot(dye.clone()), 8, 8);
        let shaded = Compositor::default().render_rgba8(&snapshot(dye), 8, 8);
        let sum = |image: &[u8]| image.iter().map(|&b| u32::from(b)).sum::<u32>();
        assert!(sum(&shaded) < sum(&flat));
    }
}
