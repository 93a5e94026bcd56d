//! Error taxonomy for the fluid core
//!
//! Resource and configuration errors are returned synchronously to the caller of the
//! failing operation. Numeric instability is only ever logged by the step engine, which
//! heals the affected field in place.

use crate::solver::{ChannelLayout, FieldKind};
use thiserror::Error;

/// Errors produced by the fluid core
#[derive(Debug, Error)]
pub enum FluidError {
    /// A storage layout/precision or size cannot be satisfied at allocation time
    #[error("cannot allocate {width}x{height} field with layout {layout}: {reason}")]
    Resource {
        /// Requested layout
        layout: ChannelLayout,
        /// Requested width in texels
        width: u32,
        /// Requested height in texels
        height: u32,
        /// Why the platform rejected it
        reason: String,
    },

    /// Every layout in a fallback list was rejected
    #[error("no supported storage layout for {label} (tried {tried} layouts)")]
    Unsupported {
        /// Field label used for logging
        label: &'static str,
        /// Number of layouts attempted
        tried: usize,
    },

    /// A parameter is out of range; rejected before it reaches the solver
    #[error("invalid configuration `{parameter}`: {message}")]
    Configuration {
        /// Name of the offending parameter
        parameter: &'static str,
        /// Constraint that was violated
        message: String,
    },

    /// A field contains NaN or infinite values
    #[error("{field} contains {count} non-finite values")]
    NumericInstability {
        /// Offending field
        field: FieldKind,
        /// Number of non-finite scalars found
        count: usize,
    },

    /// GPU device failure during readback or upload
    #[error("device error: {0}")]
    Device(String),
}

impl FluidError {
    /// Shorthand for a configuration error
    pub fn config(parameter: &'static str, message: impl Into<String>) -> Self {
        Self::Configuration {
            parameter,
            message: message.into(),
        }
    }
}
