//! Scatter-accumulate compute pass.

use crate::accumulate::TILE_SIZE;
use crate::gpu::atlas::{workgroup_count, AtlasResources};
use crate::gpu::color_capture::ColorCaptureTarget;
use crate::gpu::identification::{IdentificationOutput, IdentificationTargets};
use crate::gpu::pipeline;

/// Invocations per workgroup along each axis (`@workgroup_size(8, 8, 1)`).
const WORKGROUP_SIZE: u32 = 8;

/// The accumulators hold this frame's sums and must be merged next.
///
/// Only [`ScatterPass::record`] creates one, and only
/// `MergePass::record` consumes it.
#[derive(Debug)]
pub struct Accumulated {
    atlas_size: (u32, u32),
}

impl Accumulated {
    pub fn atlas_size(&self) -> (u32, u32) {
        self.atlas_size
    }
}

pub struct ScatterPass {
    pipeline: wgpu::ComputePipeline,
    bind_group_layout: wgpu::BindGroupLayout,
}

impl ScatterPass {
    pub fn new(device: &wgpu::Device) -> Self {
        let texture_entry = |binding: u32| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: false },
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            count: None,
        };

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Scatter Bind Group Layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                // Object ids
                texture_entry(1),
                // Viewport colour
                texture_entry(2),
                wgpu::BindGroupLayoutEntry {
                    binding: 3,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Storage { read_only: true },
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 4,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Storage { read_only: false },
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
            ],
        });

        let pipeline = pipeline::create_compute_pipeline(
            device,
            "Scatter Pipeline",
            &bind_group_layout,
            wgpu::include_wgsl!("scatter.wgsl"),
            "cs_scatter",
        );

        Self { pipeline, bind_group_layout }
    }

    /// Record the scatter dispatch after the identification pass.
    ///
    /// `atlas` must already hold this frame's cell table and params.
    pub fn record(
        &self,
        device: &wgpu::Device,
        encoder: &mut wgpu::CommandEncoder,
        identification: IdentificationOutput,
        targets: &IdentificationTargets,
        color: &ColorCaptureTarget,
        atlas: &AtlasResources,
    ) -> Accumulated {
        debug_assert_eq!(identification.size(), targets.size());
        debug_assert_eq!(targets.size(), color.size());

        // Views change with the viewport size, so the bind group is per frame
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Scatter Bind Group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: atlas.params.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&targets.object_id_view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(&color.view),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: atlas.cells.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: atlas.accumulator.as_entire_binding(),
                },
            ],
        });

        let (width, height) = identification.size();
        {
            let mut cpass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Scatter Pass"),
                timestamp_writes: None,
            });
            cpass.set_pipeline(&self.pipeline);
            cpass.set_bind_group(0, &bind_group, &[]);

            let gx = workgroup_count(width.div_ceil(TILE_SIZE), WORKGROUP_SIZE);
            let gy = workgroup_count(height.div_ceil(TILE_SIZE), WORKGROUP_SIZE);
            cpass.dispatch_workgroups(gx, gy, 1);
        }

        Accumulated {
            atlas_size: atlas.size(),
        }
    }
}
