//! Channel layouts for grid-resident fields
//!
//! A layout names how many scalar channels a field stores and at which precision.
//! Platforms do not support every combination as a writable float target, so callers
//! always allocate from a ranked fallback list (see [`ChannelLayout::fallbacks`]).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Storage precision of a field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Precision {
    /// 16-bit float storage
    #[default]
    Half,
    /// 32-bit float storage
    Single,
}

/// Channel count and precision of a field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelLayout {
    channels: u8,
    precision: Precision,
}

impl ChannelLayout {
    /// Create a layout with 1 to 4 channels
    ///
    /// # Panics
    ///
    /// Panics if `channels` is outside `1..=4`.
    #[must_use]
    pub const fn new(channels: u8, precision: Precision) -> Self {
        assert!(channels >= 1 && channels <= 4, "fields hold 1 to 4 channels");
        Self {
            channels,
            precision,
        }
    }

    /// Number of scalar channels per texel
    #[must_use]
    pub const fn channels(&self) -> usize {
        self.channels as usize
    }

    /// Storage precision
    #[must_use]
    pub const fn precision(&self) -> Precision {
        self.precision
    }

    /// Ranked list of layouts able to hold this one, best first
    ///
    /// Channel count widens first (R → RG → RGBA) at the requested precision, then the
    /// same chain repeats at single precision. The requested layout is always first.
    /// Wider layouts still hold the same logical channels; the extra ones are unused.
    #[must_use]
    pub fn fallbacks(&self) -> Vec<ChannelLayout> {
        let precisions: &[Precision] = match self.precision {
            Precision::Half => &[Precision::Half, Precision::Single],
            Precision::Single => &[Precision::Single],
        };
        let mut widths = vec![self.channels];
        widths.extend([1_u8, 2, 4].into_iter().filter(|&c| c > self.channels));

        let mut ranked = Vec::with_capacity(precisions.len() * widths.len());
        for &precision in precisions {
            for &channels in &widths {
                ranked.push(Self::new(channels, precision));
            }
        }
        ranked
    }
}

impl fmt::Display for ChannelLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let channels = match self.channels {
            1 => "R",
            2 => "RG",
            3 => "RGB",
            _ => "RGBA",
        };
        let bits = match self.precision {
            Precision::Half => 16,
            Precision::Single => 32,
        };
        write!(f, "{channels}{bits}F")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_half_fallbacks_widen_then_promote() {
        let ranked = ChannelLayout::new(1, Precision::Half).fallbacks();
        let names: Vec<String> = ranked.iter().map(ToString::to_string).collect();
        assert_eq!(
            names,
            vec!["R16F", "RG16F", "RGBA16F", "R32F", "RG32F", "RGBA32F"]
        );
    }

    #[test]
    fn test_vector_single_fallbacks() {
        let ranked = ChannelLayout::new(2, Precision::Single).fallbacks();
        let names: Vec<String> = ranked.iter().map(ToString::to_string).collect();
        assert_eq!(names, vec!["RG32F", "RGBA32F"]);
    }

    #[test]
    fn test_color_layout_falls_back_to_rgba() {
        let ranked = ChannelLayout::new(3, Precision::Half).fallbacks();
        let names: Vec<String> = ranked.iter().map(ToString::to_string).collect();
        assert_eq!(names, vec!["RGB16F", "RGBA16F", "RGB32F", "RGBA32F"]);
    }

    #[test]
    #[should_panic(expected = "fields hold 1 to 4 channels")]
    fn test_rejects_zero_channels() {
        let _ = ChannelLayout::new(0, Precision::Half);
    }
}
