//! Data-parallel backend on a wgpu compute device.
//!
//! One invocation per pixel in 16x16 workgroups. Coordinates and `z` are
//! float32 on the device, so counts may drift from the float64 backends by a
//! few iterations near the set boundary. Each invocation also adds its count
//! into a 64-bit total kept as two 32-bit atomics (`lo` plus carry into `hi`).

use std::num::NonZeroU64;
use std::sync::mpsc;

use bytemuck::{Pod, Zeroable};
use wgpu::util::DeviceExt;

use crate::{error::ComputeError, grid::IterationGrid, viewport::Viewport};

use super::ComputeOutput;

pub const WORKGROUP_SIZE: u32 = 16;

const SHADER: &str = r#"
struct Params {
    re_min: f32,
    re_max: f32,
    im_min: f32,
    im_max: f32,
    width: u32,
    height: u32,
    max_iter: u32,
    _pad: u32,
};

struct Total {
    lo: atomic<u32>,
    hi: atomic<u32>,
};

@group(0) @binding(0) var<uniform> params: Params;
@group(0) @binding(1) var<storage, read_write> counts: array<u32>;
@group(0) @binding(2) var<storage, read_write> total: Total;

fn axis(lo: f32, hi: f32, i: u32, n: u32) -> f32 {
    if (n < 2u) {
        return lo;
    }
    return lo + (hi - lo) * f32(i) / f32(n - 1u);
}

@compute @workgroup_size(16, 16, 1)
fn main(@builtin(global_invocation_id) id: vec3<u32>) {
    if (id.x >= params.width || id.y >= params.height) {
        return;
    }
    let cr = axis(params.re_min, params.re_max, id.x, params.width);
    let ci = axis(params.im_min, params.im_max, id.y, params.height);

    var zr = 0.0;
    var zi = 0.0;
    var count = params.max_iter;
    for (var i = 0u; i < params.max_iter; i = i + 1u) {
        let zr2 = zr * zr;
        let zi2 = zi * zi;
        zi = 2.0 * zr * zi + ci;
        zr = zr2 - zi2 + cr;
        if (zr * zr + zi * zi > 4.0) {
            count = i;
            break;
        }
    }
    counts[id.y * params.width + id.x] = count;

    let before = atomicAdd(&total.lo, count);
    if (before > 0xffffffffu - count) {
        atomicAdd(&total.hi, 1u);
    }
}
"#;

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct GpuParams {
    re_min: f32,
    re_max: f32,
    im_min: f32,
    im_max: f32,
    width: u32,
    height: u32,
    max_iter: u32,
    _pad: u32,
}

impl From<&Viewport> for GpuParams {
    fn from(v: &Viewport) -> Self {
        Self {
            re_min: v.re_min() as f32,
            re_max: v.re_max() as f32,
            im_min: v.im_min() as f32,
            im_max: v.im_max() as f32,
            width: v.width(),
            height: v.height(),
            max_iter: v.max_iter(),
            _pad: 0,
        }
    }
}

pub struct GpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    pipeline: wgpu::ComputePipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    adapter_name: String,
}

impl GpuBackend {
    /// Acquires an adapter and device and builds the pipeline.
    pub fn new() -> Result<Self, ComputeError> {
        pollster::block_on(Self::init())
    }

    async fn init() -> Result<Self, ComputeError> {
        let instance = wgpu::Instance::default();
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok_or_else(|| ComputeError::BackendUnavailable("no compute adapter found".into()))?;

        let info = adapter.get_info();
        log::info!("GPU adapter: {} ({:?})", info.name, info.backend);

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("mandelbench-device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::downlevel_defaults()
                        .using_resolution(adapter.limits()),
                },
                None,
            )
            .await
            .map_err(|e| ComputeError::BackendUnavailable(format!("device request failed: {e}")))?;

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("escape-bind-group-layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: NonZeroU64::new(std::mem::size_of::<GpuParams>() as u64),
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Storage { read_only: false },
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Storage { read_only: false },
                        has_dynamic_offset: false,
                        min_binding_size: NonZeroU64::new(8),
                    },
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("escape-pipeline-layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("escape-shader"),
            source: wgpu::ShaderSource::Wgsl(SHADER.into()),
        });

        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("escape-pipeline"),
            layout: Some(&pipeline_layout),
            module: &module,
            entry_point: "main",
        });

        Ok(Self {
            device,
            queue,
            pipeline,
            bind_group_layout,
            adapter_name: info.name,
        })
    }

    pub fn adapter_name(&self) -> &str {
        &self.adapter_name
    }

    fn check_limits(&self, viewport: &Viewport) -> Result<(u32, u32), ComputeError> {
        let limits = self.device.limits();
        let counts_size = viewport.pixel_count() as u64 * 4;
        if counts_size > u64::from(limits.max_storage_buffer_binding_size) {
            return Err(ComputeError::DeviceFailure(format!(
                "{counts_size}-byte grid exceeds storage binding limit {}",
                limits.max_storage_buffer_binding_size
            )));
        }
        let groups_x = viewport.width().div_ceil(WORKGROUP_SIZE);
        let groups_y = viewport.height().div_ceil(WORKGROUP_SIZE);
        let max_groups = limits.max_compute_workgroups_per_dimension;
        if groups_x > max_groups || groups_y > max_groups {
            return Err(ComputeError::DeviceFailure(format!(
                "dispatch {groups_x}x{groups_y} exceeds {max_groups} workgroups per dimension"
            )));
        }
        Ok((groups_x, groups_y))
    }

    pub fn compute(&self, viewport: &Viewport) -> Result<ComputeOutput, ComputeError> {
        viewport.validate()?;
        let (groups_x, groups_y) = self.check_limits(viewport)?;
        let counts_size = viewport.pixel_count() as u64 * 4;
        let total_size = 8u64;

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);

        let params = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("escape-params"),
            contents: bytemuck::bytes_of(&GpuParams::from(viewport)),
            usage: wgpu::BufferUsages::UNIFORM,
        });
        let counts = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("escape-counts"),
            size: counts_size,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        let total = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("escape-total"),
            contents: bytemuck::cast_slice(&[0u32; 2]),
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
        });
        let counts_readback = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("escape-counts-readback"),
            size: counts_size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let total_readback = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("escape-total-readback"),
            size: total_size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("escape-bind-group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: params.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: counts.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: total.as_entire_binding(),
                },
            ],
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("escape-encoder"),
            });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("escape-pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.dispatch_workgroups(groups_x, groups_y, 1);
        }
        encoder.copy_buffer_to_buffer(&counts, 0, &counts_readback, 0, counts_size);
        encoder.copy_buffer_to_buffer(&total, 0, &total_readback, 0, total_size);
        self.queue.submit(Some(encoder.finish()));

        if let Some(err) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(ComputeError::DeviceFailure(err.to_string()));
        }

        let data = self.read_back(&counts_readback, |bytes| {
            bytemuck::cast_slice::<u8, u32>(bytes).to_vec()
        })?;
        let total_iterations = self.read_back(&total_readback, |bytes| {
            let words: &[u32] = bytemuck::cast_slice(bytes);
            (u64::from(words[1]) << 32) | u64::from(words[0])
        })?;

        let grid = IterationGrid::from_vec(viewport.width(), viewport.height(), data)
            .ok_or_else(|| ComputeError::DeviceFailure("readback size mismatch".into()))?;
        Ok(ComputeOutput {
            grid,
            total_iterations: Some(total_iterations),
        })
    }

    fn read_back<T>(
        &self,
        buffer: &wgpu::Buffer,
        decode: impl FnOnce(&[u8]) -> T,
    ) -> Result<T, ComputeError> {
        let slice = buffer.slice(..);
        let (sender, receiver) = mpsc::sync_channel(1);
        slice.map_async(wgpu::MapMode::Read, move |r| {
            let _ = sender.send(r);
        });
        self.device.poll(wgpu::Maintain::Wait);
        receiver
            .recv()
            .map_err(|_| ComputeError::DeviceFailure("map callback dropped".into()))?
            .map_err(|e| ComputeError::DeviceFailure(format!("buffer map failed: {e}")))?;

        let value = {
            let mapped = slice.get_mapped_range();
            decode(&mapped)
        };
        buffer.unmap();
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_params_layout_matches_shader() {
        assert_eq!(std::mem::size_of::<GpuParams>(), 32);
    }

    #[test]
    fn test_params_narrow_bounds_to_f32() {
        let view = Viewport::new(
            -0.5,
            0.5,
            -0.25,
            0.25,
            crate::config::PresetConfig {
                width: 3,
                height: 2,
                max_iter: 9,
            },
        )
        .unwrap();
        let params = GpuParams::from(&view);
        assert_eq!(params.re_min, -0.5f32);
        assert_eq!(params.im_max, 0.25f32);
        assert_eq!((params.width, params.height, params.max_iter), (3, 2, 9));
    }
}
