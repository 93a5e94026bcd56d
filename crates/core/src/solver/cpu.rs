//! CPU-based pass executor
//!
//! This module provides a CPU implementation of the `FluidBackend` trait using
//! `Vec<f32>` fields and Rayon for parallelism. This backend is always available and
//! serves as a fallback when GPU acceleration is not available.

use super::double_buffer::DoubleBuffer;
use super::fields::FieldData;
use super::kernels;
use super::layout::{ChannelLayout, Precision};
use super::r#trait::{field_len, FieldKind, FlowField, FluidBackend, Pass};
use super::store::{allocate_with_fallback, CpuFieldStore, FieldStore};
use crate::config::Resolution;
use crate::error::FluidError;
use std::borrow::Cow;
use tracing::debug;

struct CpuFields {
    velocity: DoubleBuffer<FieldData>,
    dye: DoubleBuffer<FieldData>,
    pressure: DoubleBuffer<FieldData>,
    divergence: FieldData,
    curl: FieldData,
}

impl CpuFields {
    fn allocate(grid: Resolution, dye: Resolution) -> Result<Self, FluidError> {
        let store = CpuFieldStore;
        let double = |label, kind: FieldKind, resolution: Resolution| {
            let layout = ChannelLayout::new(kind.channels() as u8, Precision::Single);
            allocate_with_fallback(label, layout, |layout| {
                store.allocate_double(resolution.width, resolution.height, layout)
            })
            .map(|(field, _)| field)
        };
        let single = |label, kind: FieldKind| {
            let layout = ChannelLayout::new(kind.channels() as u8, Precision::Single);
            allocate_with_fallback(label, layout, |layout| {
                store.allocate(grid.width, grid.height, layout)
            })
            .map(|(field, _)| field)
        };

        Ok(Self {
            velocity: double("velocity", FieldKind::Velocity, grid)?,
            dye: double("dye", FieldKind::Dye, dye)?,
            pressure: double("pressure", FieldKind::Pressure, grid)?,
            divergence: single("divergence", FieldKind::Divergence)?,
            curl: single("curl", FieldKind::Curl)?,
        })
    }
}

/// CPU pass executor using Rayon for parallelism
///
/// Runs the same kernels as the GPU backend on host memory. Every pass writes the write
/// side of its output and swaps it before returning.
pub struct CpuBackend {
    fields: CpuFields,
    grid: Resolution,
    dye_resolution: Resolution,
}

impl CpuBackend {
    /// Create a CPU backend with zeroed fields
    ///
    /// # Errors
    ///
    /// Returns `FluidError::Unsupported` if host memory for the fields cannot be reserved.
    pub fn new(grid: Resolution, dye: Resolution) -> Result<Self, FluidError> {
        let fields = CpuFields::allocate(grid, dye)?;
        debug!("CPU backend allocated: grid {}, dye {}", grid, dye);
        Ok(Self {
            fields,
            grid,
            dye_resolution: dye,
        })
    }

    fn field(&self, kind: FieldKind) -> &FieldData {
        match kind {
            FieldKind::Velocity => self.fields.velocity.read(),
            FieldKind::Dye => self.fields.dye.read(),
            FieldKind::Pressure => self.fields.pressure.read(),
            FieldKind::Divergence => &self.fields.divergence,
            FieldKind::Curl => &self.fields.curl,
        }
    }

    fn field_mut(&mut self, kind: FieldKind) -> &mut FieldData {
        match kind {
            FieldKind::Velocity => self.fields.velocity.read_mut(),
            FieldKind::Dye => self.fields.dye.read_mut(),
            FieldKind::Pressure => self.fields.pressure.read_mut(),
            FieldKind::Divergence => &mut self.fields.divergence,
            FieldKind::Curl => &mut self.fields.curl,
        }
    }
}

impl FluidBackend for CpuBackend {
    fn run(&mut self, pass: &Pass) {
        let fields = &mut self.fields;
        match *pass {
            Pass::Advect {
                field: FlowField::Velocity,
                dt,
                dissipation,
            } => fields.velocity.write_pass(|read, mut write| {
                kernels::advect(&read, &read, &mut write, dt, dissipation);
            }),
            Pass::Advect {
                field: FlowField::Dye,
                dt,
                dissipation,
            } => {
                let velocity = fields.velocity.read();
                fields.dye.write_pass(|read, mut write| {
                    kernels::advect(velocity, &read, &mut write, dt, dissipation);
                });
            }
            Pass::Curl => kernels::curl(fields.velocity.read(), &mut fields.curl),
            Pass::Vorticity { strength, dt } => {
                let curl = &fields.curl;
                fields.velocity.write_pass(|read, mut write| {
                    kernels::vorticity(&read, curl, &mut write, strength, dt);
                });
            }
            Pass::Splat(ref splat) => {
                let target = match splat.target {
                    FlowField::Velocity => &mut fields.velocity,
                    FlowField::Dye => &mut fields.dye,
                };
                target.write_pass(|read, mut write| kernels::splat(&read, &mut write, splat));
            }
            Pass::Divergence => {
                kernels::divergence(fields.velocity.read(), &mut fields.divergence);
            }
            Pass::ScalePressure { factor } => fields.pressure.write_pass(|read, mut write| {
                kernels::scale(&read, &mut write, factor);
            }),
            Pass::Jacobi => {
                let divergence = &fields.divergence;
                fields.pressure.write_pass(|read, mut write| {
                    kernels::jacobi(&read, divergence, &mut write);
                });
            }
            Pass::SubtractGradient => {
                let pressure = fields.pressure.read();
                fields.velocity.write_pass(|read, mut write| {
                    kernels::subtract_gradient(pressure, &read, &mut write);
                });
            }
        }
    }

    fn read_field(&self, field: FieldKind) -> Result<Cow<'_, [f32]>, FluidError> {
        Ok(Cow::Borrowed(self.field(field).as_slice()))
    }

    fn write_field(&mut self, field: FieldKind, data: &[f32]) -> Result<(), FluidError> {
        let expected = field_len(field, self.grid, self.dye_resolution);
        if data.len() != expected {
            return Err(FluidError::config(
                field.label(),
                format!("expected {expected} values, got {}", data.len()),
            ));
        }
        self.field_mut(field).as_mut_slice().copy_from_slice(data);
        Ok(())
    }

    fn clear_field(&mut self, field: FieldKind) {
        let fields = &mut self.fields;
        let buffer = match field {
            FieldKind::Velocity => &mut fields.velocity,
            FieldKind::Dye => &mut fields.dye,
            FieldKind::Pressure => &mut fields.pressure,
            FieldKind::Divergence => return fields.divergence.fill(0.0),
            FieldKind::Curl => return fields.curl.fill(0.0),
        };
        for slot in buffer.slots_mut() {
            slot.fill(0.0);
        }
    }

    fn reallocate(
        &mut self,
        grid: Resolution,
        dye: Resolution,
        preserve: bool,
    ) -> Result<(), FluidError> {
        let mut fresh = CpuFields::allocate(grid, dye)?;

        if preserve {
            // Velocity is measured in grid texels, so it scales with the grid
            let velocity_scale = [
                grid.width as f32 / self.grid.width as f32,
                grid.height as f32 / self.grid.height as f32,
                1.0,
                1.0,
            ];
            let old = &self.fields;
            fresh.velocity.write_pass(|_, mut write| {
                kernels::resample(old.velocity.read(), &mut write, velocity_scale);
            });
            fresh.dye.write_pass(|_, mut write| {
                kernels::resample(old.dye.read(), &mut write, [1.0; 4]);
            });
            fresh.pressure.write_pass(|_, mut write| {
                kernels::resample(old.pressure.read(), &mut write, [1.0; 4]);
            });
        }

        self.fields = fresh;
        self.grid = grid;
        self.dye_resolution = dye;
        debug!(
            "CPU backend reallocated: grid {}, dye {} (preserve: {})",
            grid, dye, preserve
        );
        Ok(())
    }

    fn resolutions(&self) -> (Resolution, Resolution) {
        (self.grid, self.dye_resolution)
    }

    fn is_gpu_accelerated(&self) -> bool {
        false
    }

    fn name(&self) -> &str {
        "CPU (Rayon)"
    }
}
