//! Field data structures for the CPU backend
//!
//! A `FieldData` stores a 2D grid of 1 to 4 interleaved `f32` channels in row-major
//! order. Row 0 is the bottom of the domain, matching normalized coordinates with Y
//! measured upward. All reads are edge-clamped, never wrapped.

use std::collections::TryReserveError;

/// Grid-resident field for the CPU backend
#[derive(Debug, Clone, PartialEq)]
pub struct FieldData {
    data: Vec<f32>,
    width: usize,
    height: usize,
    channels: usize,
}

impl FieldData {
    /// Create a zeroed field
    ///
    /// # Panics
    ///
    /// Panics if `channels` is not within `1..=4`.
    #[must_use]
    pub fn new(width: usize, height: usize, channels: usize) -> Self {
        assert!((1..=4).contains(&channels), "fields hold 1 to 4 channels");
        Self {
            data: vec![0.0; width * height * channels],
            width,
            height,
            channels,
        }
    }

    /// Create a zeroed field, reporting allocation failure instead of aborting
    ///
    /// # Errors
    ///
    /// Returns the allocator error if the backing storage cannot be reserved.
    pub fn try_new(width: usize, height: usize, channels: usize) -> Result<Self, TryReserveError> {
        let len = width * height * channels;
        let mut data = Vec::new();
        data.try_reserve_exact(len)?;
        data.resize(len, 0.0);
        Ok(Self {
            data,
            width,
            height,
            channels,
        })
    }

    /// Wrap existing row-major data; `None` if the length does not match the shape
    #[must_use]
    pub fn from_vec(width: usize, height: usize, channels: usize, data: Vec<f32>) -> Option<Self> {
        if !(1..=4).contains(&channels) || data.len() != width * height * channels {
            return None;
        }
        Some(Self {
            data,
            width,
            height,
            channels,
        })
    }

    /// Grid width in texels
    #[must_use]
    pub fn width(&self) -> usize {
        self.width
    }

    /// Grid height in texels
    #[must_use]
    pub fn height(&self) -> usize {
        self.height
    }

    /// Channels per texel
    #[must_use]
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Interleaved values in row-major order
    #[must_use]
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// Mutable interleaved values in row-major order
    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        &mut self.data
    }

    /// Channel `c` of texel `(x, y)`
    ///
    /// # Panics
    ///
    /// Panics if the coordinates or channel are out of bounds.
    #[must_use]
    pub fn get(&self, x: usize, y: usize, c: usize) -> f32 {
        assert!(
            x < self.width && y < self.height && c < self.channels,
            "Coordinates out of bounds"
        );
        self.data[(y * self.width + x) * self.channels + c]
    }

    /// Set channel `c` of texel `(x, y)`
    ///
    /// # Panics
    ///
    /// Panics if the coordinates or channel are out of bounds.
    pub fn set(&mut self, x: usize, y: usize, c: usize, value: f32) {
        assert!(
            x < self.width && y < self.height && c < self.channels,
            "Coordinates out of bounds"
        );
        self.data[(y * self.width + x) * self.channels + c] = value;
    }

    /// Texel at signed coordinates, clamped to the nearest edge texel
    #[inline]
    #[must_use]
    pub fn texel(&self, x: isize, y: isize) -> &[f32] {
        let x = x.clamp(0, self.width as isize - 1) as usize;
        let y = y.clamp(0, self.height as isize - 1) as usize;
        let start = (y * self.width + x) * self.channels;
        &self.data[start..start + self.channels]
    }

    /// Bilinear sample at texel-space position `(px, py)`
    ///
    /// Texel centers sit at integer positions. The position is clamped to the grid, which
    /// is equivalent to clamp-to-edge addressing with linear filtering. Channels beyond
    /// `channels()` are zero.
    #[inline]
    #[must_use]
    pub fn sample(&self, px: f32, py: f32) -> [f32; 4] {
        let px = px.clamp(0.0, (self.width - 1) as f32);
        let py = py.clamp(0.0, (self.height - 1) as f32);
        let x0 = px.floor();
        let y0 = py.floor();
        let tx = px - x0;
        let ty = py - y0;
        let (x0, y0) = (x0 as isize, y0 as isize);

        let a = self.texel(x0, y0);
        let b = self.texel(x0 + 1, y0);
        let c = self.texel(x0, y0 + 1);
        let d = self.texel(x0 + 1, y0 + 1);

        let mut out = [0.0; 4];
        for ch in 0..self.channels {
            let bottom = a[ch] + (b[ch] - a[ch]) * tx;
            let top = c[ch] + (d[ch] - c[ch]) * tx;
            out[ch] = bottom + (top - bottom) * ty;
        }
        out
    }

    /// Bilinear sample at normalized coordinates `(u, v)` in `[0, 1]²`
    #[inline]
    #[must_use]
    pub fn sample_uv(&self, u: f32, v: f32) -> [f32; 4] {
        self.sample(
            u * self.width as f32 - 0.5,
            v * self.height as f32 - 0.5,
        )
    }

    /// Fill every channel of every texel
    pub fn fill(&mut self, value: f32) {
        self.data.fill(value);
    }

    /// Number of NaN or infinite values
    #[must_use]
    pub fn count_non_finite(&self) -> usize {
        self.data.iter().filter(|v| !v.is_finite()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_creation() {
        let field = FieldData::new(10, 20, 2);
        assert_eq!(field.width(), 10);
        assert_eq!(field.height(), 20);
        assert_eq!(field.as_slice().len(), 400);
        assert!(field.as_slice().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_field_get_set_interleaved() {
        let mut field = FieldData::new(10, 10, 2);
        field.set(3, 4, 1, 123.45);
        assert_eq!(field.get(3, 4, 1), 123.45);
        assert_eq!(field.get(3, 4, 0), 0.0);

        // Row-major, channels interleaved
        let index = (4 * 10 + 3) * 2 + 1;
        assert_eq!(field.as_slice()[index], 123.45);
    }

    #[test]
    fn test_texel_clamps_to_edge() {
        let mut field = FieldData::new(4, 4, 1);
        field.set(0, 0, 0, 7.0);
        field.set(3, 3, 0, 9.0);
        assert_eq!(field.texel(-5, -1)[0], 7.0);
        assert_eq!(field.texel(10, 42)[0], 9.0);
    }

    #[test]
    fn test_sample_interpolates_between_centers() {
        let mut field = FieldData::new(2, 1, 1);
        field.set(0, 0, 0, 1.0);
        field.set(1, 0, 0, 3.0);
        assert_eq!(field.sample(0.0, 0.0)[0], 1.0);
        assert_eq!(field.sample(0.5, 0.0)[0], 2.0);
        assert_eq!(field.sample(1.0, 0.0)[0], 3.0);
        // Outside the grid clamps
        assert_eq!(field.sample(-3.0, 0.0)[0], 1.0);
        assert_eq!(field.sample(7.0, 2.0)[0], 3.0);
        // Normalized: u = 0.5 sits halfway between the two centers
        assert_eq!(field.sample_uv(0.5, 0.5)[0], 2.0);
    }

    #[test]
    fn test_count_non_finite() {
        let mut field = FieldData::new(3, 3, 1);
        field.set(1, 1, 0, f32::NAN);
        field.set(2, 2, 0, f32::INFINITY);
        assert_eq!(field.count_non_finite(), 2);
        field.fill(0.0);
        assert_eq!(field.count_non_finite(), 0);
    }

    #[test]
    fn test_from_vec_checks_shape() {
        let field = FieldData::from_vec(2, 2, 2, vec![1.0; 8]).unwrap();
        assert_eq!(field.get(1, 1, 1), 1.0);
        assert!(FieldData::from_vec(2, 2, 2, vec![1.0; 7]).is_none());
        assert!(FieldData::from_vec(1, 1, 5, vec![1.0; 5]).is_none());
    }

    #[test]
    #[should_panic(expected = "Coordinates out of bounds")]
    fn test_field_bounds_check() {
        let field = FieldData::new(10, 10, 1);
        let _ = field.get(10, 5, 0);
    }
}
