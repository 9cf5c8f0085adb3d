//! Merge compute pass: the only writer of the atlas texture and the only place
//! the accumulators are cleared.

use crate::gpu::atlas::{workgroup_count, AtlasResources, ATLAS_FORMAT};
use crate::gpu::pipeline;
use crate::gpu::scatter::Accumulated;

const WORKGROUP_SIZE: u32 = 8;

/// The atlas texture holds a complete frame.
#[derive(Debug)]
pub struct MergedAtlas {
    size: (u32, u32),
}

impl MergedAtlas {
    pub fn size(&self) -> (u32, u32) {
        self.size
    }
}

pub struct MergePass {
    pipeline: wgpu::ComputePipeline,
    bind_group: wgpu::BindGroup,
}

impl MergePass {
    pub fn new(device: &wgpu::Device, atlas: &AtlasResources) -> Self {
        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Merge Bind Group Layout"),
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
                    ty: wgpu::BindingType::StorageTexture {
                        access: wgpu::StorageTextureAccess::WriteOnly,
                        format: ATLAS_FORMAT,
                        view_dimension: wgpu::TextureViewDimension::D2,
                    },
                    count: None,
                },
            ],
        });

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Merge Bind Group"),
            layout: &bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: atlas.params.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: atlas.accumulator.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(&atlas.view),
                },
            ],
        });

        let pipeline = pipeline::create_compute_pipeline(
            device,
            "Merge Pipeline",
            &bind_group_layout,
            wgpu::include_wgsl!("merge.wgsl"),
            "cs_merge",
        );

        Self { pipeline, bind_group }
    }

    /// Record the merge dispatch. Takes the scatter pass's token, so it can
    /// only be recorded after it.
    pub fn record(&self, encoder: &mut wgpu::CommandEncoder, accumulated: Accumulated) -> MergedAtlas {
        let (width, height) = accumulated.atlas_size();
        {
            let mut cpass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Merge Pass"),
                timestamp_writes: None,
            });
            cpass.set_pipeline(&self.pipeline);
            cpass.set_bind_group(0, &self.bind_group, &[]);
            cpass.dispatch_workgroups(
                workgroup_count(width, WORKGROUP_SIZE),
                workgroup_count(height, WORKGROUP_SIZE),
                1,
            );
        }

        MergedAtlas { size: (width, height) }
    }
}
