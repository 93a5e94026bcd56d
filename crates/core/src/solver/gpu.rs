//! GPU-based pass executor
//!
//! This module provides a GPU implementation of the `FluidBackend` trait using wgpu
//! compute shaders. This backend is only available when the `gpu` feature is enabled.
//!
//! # Storage
//!
//! Every field is a 2D texture in a float format that the adapter can bind as a
//! write-only storage texture. Passes read textures with `textureLoad` and do their own
//! bilinear filtering, so no sampler or filterable format is required.
//!
//! # Readback
//!
//! Field data crosses the host boundary through the export/import kernels, which copy
//! between a texture and a tightly packed `array<vec4<f32>>` storage buffer. This avoids
//! row-alignment rules and half-float conversion on the host.

use super::context::GpuContext;
use super::double_buffer::DoubleBuffer;
use super::gpu_kernels::{Kernel, KernelCache, PassParams};
use super::layout::{ChannelLayout, Precision};
use super::r#trait::{field_len, FieldKind, FlowField, FluidBackend, Pass};
use super::store::{allocate_with_fallback, FieldStore};
use crate::config::Resolution;
use crate::error::FluidError;
use std::borrow::Cow;
use tracing::{debug, error, info};
use wgpu::util::DeviceExt;

/// Texture format storing `layout`, if one exists
fn texture_format(layout: ChannelLayout) -> Option<wgpu::TextureFormat> {
    use wgpu::TextureFormat as F;
    match (layout.channels(), layout.precision()) {
        (1, Precision::Half) => Some(F::R16Float),
        (2, Precision::Half) => Some(F::Rg16Float),
        (4, Precision::Half) => Some(F::Rgba16Float),
        (1, Precision::Single) => Some(F::R32Float),
        (2, Precision::Single) => Some(F::Rg32Float),
        (4, Precision::Single) => Some(F::Rgba32Float),
        _ => None,
    }
}

/// Texture-backed field
///
/// The texture is destroyed when the field is dropped, so replacing a field frees its
/// GPU memory immediately.
pub struct GpuField {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    layout: ChannelLayout,
    format: wgpu::TextureFormat,
    size: [u32; 2],
}

impl GpuField {
    /// Storage layout actually allocated
    #[must_use]
    pub fn layout(&self) -> ChannelLayout {
        self.layout
    }

    fn texel_count(&self) -> usize {
        self.size[0] as usize * self.size[1] as usize
    }
}

impl Drop for GpuField {
    fn drop(&mut self) {
        self.texture.destroy();
    }
}

/// Field store allocating storage textures on one device
pub struct GpuFieldStore<'a> {
    context: &'a GpuContext,
}

impl<'a> GpuFieldStore<'a> {
    /// Store allocating on `context`
    #[must_use]
    pub fn new(context: &'a GpuContext) -> Self {
        Self { context }
    }
}

impl FieldStore for GpuFieldStore<'_> {
    type Field = GpuField;

    fn allocate(
        &self,
        width: u32,
        height: u32,
        layout: ChannelLayout,
    ) -> Result<GpuField, FluidError> {
        let reject = |reason: String| FluidError::Resource {
            layout,
            width,
            height,
            reason,
        };
        let Some(format) = texture_format(layout) else {
            return Err(reject("no texture format with this channel count".into()));
        };
        if !self.context.supports_storage(format) {
            return Err(reject(format!("{format:?} is not storage capable")));
        }
        let max_dimension = self.context.max_texture_dimension();
        if width == 0 || height == 0 || width.max(height) > max_dimension {
            return Err(reject(format!(
                "size outside 1..={max_dimension} texels per side"
            )));
        }

        let device = self.context.device();
        device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Fluid Field"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::STORAGE_BINDING
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let validation = pollster::block_on(device.pop_error_scope());
        let out_of_memory = pollster::block_on(device.pop_error_scope());
        if let Some(e) = validation.or(out_of_memory) {
            return Err(reject(e.to_string()));
        }

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Ok(GpuField {
            texture,
            view,
            layout,
            format,
            size: [width, height],
        })
    }
}

struct GpuFields {
    velocity: DoubleBuffer<GpuField>,
    dye: DoubleBuffer<GpuField>,
    pressure: DoubleBuffer<GpuField>,
    divergence: GpuField,
    curl: GpuField,
}

impl GpuFields {
    fn allocate(
        context: &GpuContext,
        grid: Resolution,
        dye: Resolution,
        precision: Precision,
    ) -> Result<Self, FluidError> {
        let store = GpuFieldStore::new(context);
        let preferred = |kind: FieldKind| ChannelLayout::new(kind.channels() as u8, precision);
        let double = |kind: FieldKind, resolution: Resolution| {
            allocate_with_fallback(kind.label(), preferred(kind), |layout| {
                store.allocate_double(resolution.width, resolution.height, layout)
            })
            .map(|(field, layout)| {
                debug!("{}: {} {}", kind, resolution, layout);
                field
            })
        };
        let single = |kind: FieldKind| {
            allocate_with_fallback(kind.label(), preferred(kind), |layout| {
                store.allocate(grid.width, grid.height, layout)
            })
            .map(|(field, _)| field)
        };

        Ok(Self {
            velocity: double(FieldKind::Velocity, grid)?,
            dye: double(FieldKind::Dye, dye)?,
            pressure: double(FieldKind::Pressure, grid)?,
            divergence: single(FieldKind::Divergence)?,
            curl: single(FieldKind::Curl)?,
        })
    }

    fn read(&self, kind: FieldKind) -> &GpuField {
        match kind {
            FieldKind::Velocity => self.velocity.read(),
            FieldKind::Dye => self.dye.read(),
            FieldKind::Pressure => self.pressure.read(),
            FieldKind::Divergence => &self.divergence,
            FieldKind::Curl => &self.curl,
        }
    }

    fn formats(&self) -> Vec<wgpu::TextureFormat> {
        let mut formats = Vec::with_capacity(FieldKind::ALL.len());
        for kind in FieldKind::ALL {
            let format = self.read(kind).format;
            if !formats.contains(&format) {
                formats.push(format);
            }
        }
        formats
    }
}

/// Device, pipelines and the shared uniform buffer
struct GpuExecutor {
    context: GpuContext,
    kernels: KernelCache,
    params: wgpu::Buffer,
}

impl GpuExecutor {
    fn submit(&self, kernel: Kernel, params: &PassParams, inputs: [&GpuField; 2], output: &GpuField) {
        let device = self.context.device();
        let queue = self.context.queue();
        queue.write_buffer(&self.params, 0, bytemuck::bytes_of(params));

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Fluid Pass Encoder"),
        });
        let encoded = self.kernels.encode(
            device,
            &mut encoder,
            kernel,
            &self.params,
            [&inputs[0].view, &inputs[1].view],
            (&output.view, output.format),
            output.size,
        );
        if !encoded {
            error!("No pipeline for {:?} writing {:?}", kernel, output.format);
            return;
        }
        queue.submit(std::iter::once(encoder.finish()));
    }

    fn prepare(&mut self, fields: &GpuFields) {
        for format in fields.formats() {
            self.kernels.prepare(self.context.device(), format);
        }
    }

    fn wait_idle(&self) {
        let _ = self.context.device().poll(wgpu::Maintain::Wait);
    }
}

fn params_for(target: &GpuField) -> PassParams {
    PassParams {
        target_size: target.size,
        ..PassParams::default()
    }
}

/// GPU pass executor using wgpu compute shaders
pub struct GpuBackend {
    executor: GpuExecutor,
    fields: GpuFields,
    grid: Resolution,
    dye_resolution: Resolution,
    precision: Precision,
    name: String,
}

impl GpuBackend {
    /// Create a GPU backend with zeroed fields
    ///
    /// # Errors
    ///
    /// Returns `FluidError::Unsupported` if no storage layout works for some field.
    pub fn new(
        context: GpuContext,
        grid: Resolution,
        dye: Resolution,
        precision: Precision,
    ) -> Result<Self, FluidError> {
        let fields = GpuFields::allocate(&context, grid, dye, precision)?;
        let kernels = KernelCache::new(context.device());
        let params = context.device().create_buffer(&wgpu::BufferDescriptor {
            label: Some("Pass Params"),
            size: std::mem::size_of::<PassParams>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let name = format!("GPU ({})", context.adapter_name());
        let mut executor = GpuExecutor {
            context,
            kernels,
            params,
        };
        executor.prepare(&fields);
        info!("GPU backend allocated: grid {}, dye {}", grid, dye);

        Ok(Self {
            executor,
            fields,
            grid,
            dye_resolution: dye,
            precision,
            name,
        })
    }

    /// Storage layout allocated for `kind`
    #[must_use]
    pub fn layout(&self, kind: FieldKind) -> ChannelLayout {
        self.fields.read(kind).layout()
    }
}

impl FluidBackend for GpuBackend {
    fn run(&mut self, pass: &Pass) {
        let exec = &self.executor;
        let fields = &mut self.fields;
        let grid = [self.grid.width, self.grid.height];

        match *pass {
            Pass::Advect {
                field: FlowField::Velocity,
                dt,
                dissipation,
            } => fields.velocity.write_pass(|read, write| {
                let params = PassParams {
                    source_size: grid,
                    velocity_size: grid,
                    dt,
                    dissipation,
                    ..params_for(&write)
                };
                exec.submit(Kernel::Advect, &params, [&read, &read], &write);
            }),
            Pass::Advect {
                field: FlowField::Dye,
                dt,
                dissipation,
            } => {
                let velocity = fields.velocity.read();
                fields.dye.write_pass(|read, write| {
                    let params = PassParams {
                        source_size: read.size,
                        velocity_size: grid,
                        dt,
                        dissipation,
                        ..params_for(&write)
                    };
                    exec.submit(Kernel::Advect, &params, [velocity, &read], &write);
                });
            }
            Pass::Curl => {
                let velocity = fields.velocity.read();
                exec.submit(
                    Kernel::Curl,
                    &params_for(&fields.curl),
                    [velocity, velocity],
                    &fields.curl,
                );
            }
            Pass::Vorticity { strength, dt } => {
                let curl = &fields.curl;
                fields.velocity.write_pass(|read, write| {
                    let params = PassParams {
                        scalar: strength,
                        dt,
                        ..params_for(&write)
                    };
                    exec.submit(Kernel::Vorticity, &params, [&read, curl], &write);
                });
            }
            Pass::Splat(ref splat) => {
                let target = match splat.target {
                    FlowField::Velocity => &mut fields.velocity,
                    FlowField::Dye => &mut fields.dye,
                };
                target.write_pass(|read, write| {
                    let [vx, vy, vz] = splat.value;
                    let params = PassParams {
                        point: splat.point,
                        radius: splat.radius,
                        aspect: write.size[0] as f32 / write.size[1] as f32,
                        value: [vx, vy, vz, 0.0],
                        clamp_max: splat.clamp_max.unwrap_or(0.0),
                        ..params_for(&write)
                    };
                    exec.submit(Kernel::Splat, &params, [&read, &read], &write);
                });
            }
            Pass::Divergence => {
                let velocity = fields.velocity.read();
                exec.submit(
                    Kernel::Divergence,
                    &params_for(&fields.divergence),
                    [velocity, velocity],
                    &fields.divergence,
                );
            }
            Pass::ScalePressure { factor } => fields.pressure.write_pass(|read, write| {
                let params = PassParams {
                    scalar: factor,
                    ..params_for(&write)
                };
                exec.submit(Kernel::Scale, &params, [&read, &read], &write);
            }),
            Pass::Jacobi => {
                let divergence = &fields.divergence;
                fields.pressure.write_pass(|read, write| {
                    exec.submit(Kernel::Jacobi, &params_for(&write), [&read, divergence], &write);
                });
            }
            Pass::SubtractGradient => {
                let pressure = fields.pressure.read();
                fields.velocity.write_pass(|read, write| {
                    exec.submit(Kernel::Gradient, &params_for(&write), [pressure, &read], &write);
                });
            }
        }
    }

    fn read_field(&self, kind: FieldKind) -> Result<Cow<'_, [f32]>, FluidError> {
        let field = self.fields.read(kind);
        let device = self.executor.context.device();
        let queue = self.executor.context.queue();
        let bytes = (field.texel_count() * 16) as u64;

        let texels = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Export Texels"),
            size: bytes,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        let staging = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Export Staging"),
            size: bytes,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        queue.write_buffer(
            &self.executor.params,
            0,
            bytemuck::bytes_of(&params_for(field)),
        );
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Readback Encoder"),
        });
        self.executor.kernels.encode_export(
            device,
            &mut encoder,
            &self.executor.params,
            &field.view,
            &texels,
            field.size,
        );
        encoder.copy_buffer_to_buffer(&texels, 0, &staging, 0, bytes);
        queue.submit(std::iter::once(encoder.finish()));

        let slice = staging.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        let _ = device.poll(wgpu::Maintain::Wait);
        rx.recv()
            .map_err(|e| FluidError::Device(format!("readback of {kind} abandoned: {e}")))?
            .map_err(|e| FluidError::Device(format!("readback of {kind} failed: {e}")))?;

        let channels = kind.channels();
        let mapped = slice.get_mapped_range();
        let values: Vec<f32> = bytemuck::cast_slice::<u8, f32>(&mapped)
            .chunks_exact(4)
            .flat_map(|texel| texel[..channels].iter().copied())
            .collect();
        drop(mapped);
        staging.unmap();
        Ok(Cow::Owned(values))
    }

    fn write_field(&mut self, kind: FieldKind, data: &[f32]) -> Result<(), FluidError> {
        let expected = field_len(kind, self.grid, self.dye_resolution);
        if data.len() != expected {
            return Err(FluidError::config(
                kind.label(),
                format!("expected {expected} values, got {}", data.len()),
            ));
        }

        let channels = kind.channels();
        let mut padded = vec![0.0_f32; data.len() / channels * 4];
        for (texel, values) in padded.chunks_exact_mut(4).zip(data.chunks_exact(channels)) {
            texel[..channels].copy_from_slice(values);
        }

        let field = self.fields.read(kind);
        let device = self.executor.context.device();
        let texels = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Import Texels"),
            contents: bytemuck::cast_slice(&padded),
            usage: wgpu::BufferUsages::STORAGE,
        });
        self.executor.context.queue().write_buffer(
            &self.executor.params,
            0,
            bytemuck::bytes_of(&params_for(field)),
        );
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Upload Encoder"),
        });
        let encoded = self.executor.kernels.encode_import(
            device,
            &mut encoder,
            &self.executor.params,
            &texels,
            (&field.view, field.format),
            field.size,
        );
        if !encoded {
            return Err(FluidError::Device(format!(
                "no import pipeline for {:?}",
                field.format
            )));
        }
        self.executor
            .context
            .queue()
            .submit(std::iter::once(encoder.finish()));
        Ok(())
    }

    fn clear_field(&mut self, kind: FieldKind) {
        let fields = &self.fields;
        let targets: Vec<&GpuField> = match kind {
            FieldKind::Velocity => fields.velocity.slots().collect(),
            FieldKind::Dye => fields.dye.slots().collect(),
            FieldKind::Pressure => fields.pressure.slots().collect(),
            FieldKind::Divergence => vec![&fields.divergence],
            FieldKind::Curl => vec![&fields.curl],
        };
        let queue = self.executor.context.queue();
        for field in targets {
            let block = field.format.block_copy_size(None).unwrap_or(16);
            let zeros = vec![0_u8; field.texel_count() * block as usize];
            queue.write_texture(
                wgpu::ImageCopyTexture {
                    texture: &field.texture,
                    mip_level: 0,
                    origin: wgpu::Origin3d::ZERO,
                    aspect: wgpu::TextureAspect::All,
                },
                &zeros,
                wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(field.size[0] * block),
                    rows_per_image: Some(field.size[1]),
                },
                wgpu::Extent3d {
                    width: field.size[0],
                    height: field.size[1],
                    depth_or_array_layers: 1,
                },
            );
        }
    }

    fn reallocate(
        &mut self,
        grid: Resolution,
        dye: Resolution,
        preserve: bool,
    ) -> Result<(), FluidError> {
        let mut fresh = GpuFields::allocate(&self.executor.context, grid, dye, self.precision)?;
        self.executor.prepare(&fresh);

        if preserve {
            let exec = &self.executor;
            let old = &self.fields;
            let velocity_scale = [
                grid.width as f32 / self.grid.width as f32,
                grid.height as f32 / self.grid.height as f32,
                1.0,
                1.0,
            ];
            let resample = |source: &GpuField, target: &GpuField, value: [f32; 4]| {
                let params = PassParams {
                    source_size: source.size,
                    value,
                    ..params_for(target)
                };
                exec.submit(Kernel::Resample, &params, [source, source], target);
            };
            fresh.velocity.write_pass(|_, write| {
                resample(old.velocity.read(), &write, velocity_scale);
            });
            fresh.dye.write_pass(|_, write| resample(old.dye.read(), &write, [1.0; 4]));
            fresh.pressure.write_pass(|_, write| {
                resample(old.pressure.read(), &write, [1.0; 4]);
            });
        }
        // Old textures may still be referenced by submitted work
        self.executor.wait_idle();

        self.fields = fresh;
        self.grid = grid;
        self.dye_resolution = dye;
        debug!(
            "GPU backend reallocated: grid {}, dye {} (preserve: {})",
            grid, dye, preserve
        );
        Ok(())
    }

    fn resolutions(&self) -> (Resolution, Resolution) {
        (self.grid, self.dye_resolution)
    }

    fn is_gpu_accelerated(&self) -> bool {
        true
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::GpuInitResult;

    fn gpu_backend(precision: Precision) -> Option<GpuBackend> {
        match GpuContext::new() {
            GpuInitResult::Success(context) => Some(
                GpuBackend::new(
                    context,
                    Resolution::new(24, 16),
                    Resolution::new(48, 32),
                    precision,
                )
                .unwrap(),
            ),
            _ => None,
        }
    }

    #[test]
    fn test_texture_formats() {
        let half = |c| texture_format(ChannelLayout::new(c, Precision::Half));
        assert_eq!(half(1), Some(wgpu::TextureFormat::R16Float));
        assert_eq!(half(3), None);
        assert_eq!(
            texture_format(ChannelLayout::new(4, Precision::Single)),
            Some(wgpu::TextureFormat::Rgba32Float)
        );
    }

    #[test]
    fn test_upload_then_readback() {
        let Some(mut backend) = gpu_backend(Precision::Half) else {
            return;
        };
        // Dye falls back from RGB to RGBA storage
        assert_eq!(backend.layout(FieldKind::Dye).channels(), 4);

        let dye: Vec<f32> = (0..48 * 32 * 3).map(|i| (i % 4) as f32 * 0.25).collect();
        backend.write_field(FieldKind::Dye, &dye).unwrap();
        assert_eq!(backend.read_field(FieldKind::Dye).unwrap().as_ref(), dye.as_slice());
    }

    #[test]
    fn test_passes_swap_and_clear() {
        let Some(mut backend) = gpu_backend(Precision::Single) else {
            return;
        };
        backend.write_field(FieldKind::Pressure, &[1.0; 24 * 16]).unwrap();
        let before = backend.fields.pressure.read_index();
        backend.run(&Pass::ScalePressure { factor: 0.5 });
        assert_ne!(backend.fields.pressure.read_index(), before);
        let pressure = backend.read_field(FieldKind::Pressure).unwrap();
        assert!(pressure.iter().all(|&v| v == 0.5));

        backend.clear_field(FieldKind::Pressure);
        let pressure = backend.read_field(FieldKind::Pressure).unwrap();
        assert!(pressure.iter().all(|&v| v == 0.0));
    }
}
