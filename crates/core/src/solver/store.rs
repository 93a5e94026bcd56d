//! Field store: allocation of grid-resident fields
//!
//! A store turns `(width, height, layout)` into backend storage or a `Resource` error.
//! Callers never pick a layout directly; they go through [`allocate_with_fallback`],
//! which walks the ranked list from [`ChannelLayout::fallbacks`].

use super::double_buffer::DoubleBuffer;
use super::fields::FieldData;
use super::layout::ChannelLayout;
use crate::error::FluidError;
use tracing::{debug, warn};

/// Allocator for one kind of field storage
pub trait FieldStore {
    /// Backend field handle
    type Field;

    /// Allocate one zeroed field
    ///
    /// # Errors
    ///
    /// Returns `FluidError::Resource` if the platform cannot satisfy the layout or size.
    fn allocate(
        &self,
        width: u32,
        height: u32,
        layout: ChannelLayout,
    ) -> Result<Self::Field, FluidError>;

    /// Allocate a read/write pair of identical fields
    ///
    /// # Errors
    ///
    /// Returns `FluidError::Resource` if either side cannot be allocated.
    fn allocate_double(
        &self,
        width: u32,
        height: u32,
        layout: ChannelLayout,
    ) -> Result<DoubleBuffer<Self::Field>, FluidError> {
        let first = self.allocate(width, height, layout)?;
        let second = self.allocate(width, height, layout)?;
        Ok(DoubleBuffer::new(first, second))
    }
}

/// Try each layout in `preferred.fallbacks()` until `attempt` succeeds
///
/// Only `Resource` errors move on to the next layout; anything else is returned as is.
///
/// # Errors
///
/// Returns `FluidError::Unsupported` when every layout was rejected.
pub fn allocate_with_fallback<T>(
    label: &'static str,
    preferred: ChannelLayout,
    mut attempt: impl FnMut(ChannelLayout) -> Result<T, FluidError>,
) -> Result<(T, ChannelLayout), FluidError> {
    let ranked = preferred.fallbacks();
    for layout in &ranked {
        match attempt(*layout) {
            Ok(field) => {
                if *layout != preferred {
                    warn!(
                        "{}: layout {} unavailable, using fallback {}",
                        label, preferred, layout
                    );
                }
                return Ok((field, *layout));
            }
            Err(FluidError::Resource { reason, .. }) => {
                debug!("{}: layout {} rejected: {}", label, layout, reason);
            }
            Err(other) => return Err(other),
        }
    }
    Err(FluidError::Unsupported {
        label,
        tried: ranked.len(),
    })
}

/// Host-memory store used by the CPU backend
///
/// Every layout is representable since CPU fields are always `f32`; only the size can
/// fail, and that surfaces as a `Resource` error instead of an abort.
#[derive(Debug, Clone, Copy, Default)]
pub struct CpuFieldStore;

impl FieldStore for CpuFieldStore {
    type Field = FieldData;

    fn allocate(
        &self,
        width: u32,
        height: u32,
        layout: ChannelLayout,
    ) -> Result<FieldData, FluidError> {
        let resource_error = |reason: String| FluidError::Resource {
            layout,
            width,
            height,
            reason,
        };
        if width == 0 || height == 0 {
            return Err(resource_error("zero-sized field".into()));
        }
        FieldData::try_new(width as usize, height as usize, layout.channels())
            .map_err(|e| resource_error(e.to_string()))
    }
}
