//! Compute pipelines for the GPU backend
//!
//! Each kernel is a WGSL module assembled from the shared `params.wgsl` and
//! `sampling.wgsl` prologues plus a kernel body. Storage texture formats are part of
//! the shader source, so pipelines are built per `(kernel, output format)` and cached.
//!
//! Bind group layout for passes:
//! - binding 0: `PassParams` uniform
//! - binding 1: primary input texture
//! - binding 2: secondary input texture
//! - binding 3: output storage texture

use bytemuck::{Pod, Zeroable};
use rustc_hash::FxHashMap;
use tracing::debug;

/// Workgroup edge used by every kernel (`@workgroup_size(16, 16)`)
pub const WORKGROUP_SIZE: u32 = 16;

const PARAMS_WGSL: &str = include_str!("shaders/params.wgsl");
const SAMPLING_WGSL: &str = include_str!("shaders/sampling.wgsl");

/// Uniforms shared by every kernel (must match WGSL struct layout)
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, Pod, Zeroable)]
pub struct PassParams {
    pub target_size: [u32; 2],
    pub source_size: [u32; 2],
    pub velocity_size: [u32; 2],
    pub dt: f32,
    pub dissipation: f32,
    pub point: [f32; 2],
    pub radius: f32,
    pub aspect: f32,
    pub value: [f32; 4],
    pub scalar: f32,
    pub clamp_max: f32,
    pub _pad: [f32; 2],
}

/// Kernels writing a field texture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kernel {
    Advect,
    Curl,
    Vorticity,
    Splat,
    Divergence,
    Scale,
    Jacobi,
    Gradient,
    Resample,
    Import,
}

impl Kernel {
    const ALL: [Kernel; 10] = [
        Self::Advect,
        Self::Curl,
        Self::Vorticity,
        Self::Splat,
        Self::Divergence,
        Self::Scale,
        Self::Jacobi,
        Self::Gradient,
        Self::Resample,
        Self::Import,
    ];

    fn body(self) -> &'static str {
        match self {
            Self::Advect => include_str!("shaders/advect.wgsl"),
            Self::Curl => include_str!("shaders/curl.wgsl"),
            Self::Vorticity => include_str!("shaders/vorticity.wgsl"),
            Self::Splat => include_str!("shaders/splat.wgsl"),
            Self::Divergence => include_str!("shaders/divergence.wgsl"),
            Self::Scale => include_str!("shaders/scale.wgsl"),
            Self::Jacobi => include_str!("shaders/jacobi.wgsl"),
            Self::Gradient => include_str!("shaders/gradient.wgsl"),
            Self::Resample => include_str!("shaders/resample.wgsl"),
            Self::Import => include_str!("shaders/import.wgsl"),
        }
    }

    fn source(self, format: wgpu::TextureFormat) -> String {
        let body = self.body();
        let mut source = String::with_capacity(PARAMS_WGSL.len() + SAMPLING_WGSL.len() + body.len());
        source.push_str(PARAMS_WGSL);
        if self != Self::Import {
            source.push_str(SAMPLING_WGSL);
        }
        source.push_str(body);
        source.replace("{{FORMAT}}", wgsl_format(format))
    }
}

/// WGSL storage texel format name
pub fn wgsl_format(format: wgpu::TextureFormat) -> &'static str {
    match format {
        wgpu::TextureFormat::R16Float => "r16float",
        wgpu::TextureFormat::Rg16Float => "rg16float",
        wgpu::TextureFormat::Rgba16Float => "rgba16float",
        wgpu::TextureFormat::R32Float => "r32float",
        wgpu::TextureFormat::Rg32Float => "rg32float",
        _ => "rgba32float",
    }
}

fn uniform_entry() -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding: 0,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn texture_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable: false },
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled: false,
        },
        count: None,
    }
}

fn storage_texture_entry(format: wgpu::TextureFormat) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding: 3,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::StorageTexture {
            access: wgpu::StorageTextureAccess::WriteOnly,
            format,
            view_dimension: wgpu::TextureViewDimension::D2,
        },
        count: None,
    }
}

fn storage_buffer_entry(binding: u32, read_only: bool) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

struct CachedPipeline {
    layout: wgpu::BindGroupLayout,
    pipeline: wgpu::ComputePipeline,
}

/// Pipelines keyed by kernel and output format, plus the export pipeline
pub struct KernelCache {
    pipelines: FxHashMap<(Kernel, wgpu::TextureFormat), CachedPipeline>,
    export: CachedPipeline,
}

impl KernelCache {
    /// Build the export pipeline; field pipelines are added by [`KernelCache::prepare`]
    pub fn new(device: &wgpu::Device) -> Self {
        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Export Bind Group Layout"),
            entries: &[uniform_entry(), texture_entry(1), storage_buffer_entry(2, false)],
        });
        let mut source = String::from(PARAMS_WGSL);
        source.push_str(include_str!("shaders/export.wgsl"));
        let pipeline = create_pipeline(device, "Export", &source, &layout);
        Self {
            pipelines: FxHashMap::default(),
            export: CachedPipeline { layout, pipeline },
        }
    }

    /// Make sure every kernel has a pipeline writing `format`
    pub fn prepare(&mut self, device: &wgpu::Device, format: wgpu::TextureFormat) {
        for kernel in Kernel::ALL {
            if self.pipelines.contains_key(&(kernel, format)) {
                continue;
            }
            let entries: Vec<wgpu::BindGroupLayoutEntry> = if kernel == Kernel::Import {
                vec![uniform_entry(), storage_buffer_entry(1, true), storage_texture_entry(format)]
            } else {
                vec![
                    uniform_entry(),
                    texture_entry(1),
                    texture_entry(2),
                    storage_texture_entry(format),
                ]
            };
            let label = format!("{kernel:?} {format:?}");
            let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some(&label),
                entries: &entries,
            });
            let pipeline = create_pipeline(device, &label, &kernel.source(format), &layout);
            debug!("Built compute pipeline: {}", label);
            self.pipelines
                .insert((kernel, format), CachedPipeline { layout, pipeline });
        }
    }

    /// Record one field-writing pass into `encoder`
    ///
    /// Returns `false` if no pipeline was prepared for the output format.
    #[allow(clippy::too_many_arguments)]
    pub fn encode(
        &self,
        device: &wgpu::Device,
        encoder: &mut wgpu::CommandEncoder,
        kernel: Kernel,
        params: &wgpu::Buffer,
        inputs: [&wgpu::TextureView; 2],
        output: (&wgpu::TextureView, wgpu::TextureFormat),
        size: [u32; 2],
    ) -> bool {
        let Some(cached) = self.pipelines.get(&(kernel, output.1)) else {
            return false;
        };
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Pass Bind Group"),
            layout: &cached.layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: params.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(inputs[0]),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(inputs[1]),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::TextureView(output.0),
                },
            ],
        });
        dispatch(encoder, &cached.pipeline, &bind_group, size);
        true
    }

    /// Record an upload from `texels` into a field
    #[allow(clippy::too_many_arguments)]
    pub fn encode_import(
        &self,
        device: &wgpu::Device,
        encoder: &mut wgpu::CommandEncoder,
        params: &wgpu::Buffer,
        texels: &wgpu::Buffer,
        output: (&wgpu::TextureView, wgpu::TextureFormat),
        size: [u32; 2],
    ) -> bool {
        let Some(cached) = self.pipelines.get(&(Kernel::Import, output.1)) else {
            return false;
        };
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Import Bind Group"),
            layout: &cached.layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: params.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: texels.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::TextureView(output.0),
                },
            ],
        });
        dispatch(encoder, &cached.pipeline, &bind_group, size);
        true
    }

    /// Record a readback of a field into `texels`
    pub fn encode_export(
        &self,
        device: &wgpu::Device,
        encoder: &mut wgpu::CommandEncoder,
        params: &wgpu::Buffer,
        input: &wgpu::TextureView,
        texels: &wgpu::Buffer,
        size: [u32; 2],
    ) {
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Export Bind Group"),
            layout: &self.export.layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: params.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(input),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: texels.as_entire_binding(),
                },
            ],
        });
        dispatch(encoder, &self.export.pipeline, &bind_group, size);
    }
}

fn create_pipeline(
    device: &wgpu::Device,
    label: &str,
    source: &str,
    layout: &wgpu::BindGroupLayout,
) -> wgpu::ComputePipeline {
    let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Wgsl(source.into()),
    });
    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some(label),
        bind_group_layouts: &[layout],
        push_constant_ranges: &[],
    });
    device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
        label: Some(label),
        layout: Some(&pipeline_layout),
        module: &module,
        entry_point: "main",
        compilation_options: wgpu::PipelineCompilationOptions::default(),
        cache: None,
    })
}

fn dispatch(
    encoder: &mut wgpu::CommandEncoder,
    pipeline: &wgpu::ComputePipeline,
    bind_group: &wgpu::BindGroup,
    size: [u32; 2],
) {
    let mut compute_pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
        label: Some("Fluid Pass"),
        timestamp_writes: None,
    });
    compute_pass.set_pipeline(pipeline);
    compute_pass.set_bind_group(0, bind_group, &[]);
    compute_pass.dispatch_workgroups(
        size[0].div_ceil(WORKGROUP_SIZE),
        size[1].div_ceil(WORKGROUP_SIZE),
        1,
    );
}
