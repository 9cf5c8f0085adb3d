//! Atlas-sized GPU state: accumulators, cell table and the atlas texture.

use bytemuck::{Pod, Zeroable};

use crate::config::PipelineConfig;
use crate::layout::{CellTable, GpuCell};

pub const ATLAS_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

/// Accumulator words per atlas pixel: sumR, sumG, sumB, sampleCount.
pub const ACCUMULATOR_CHANNELS: u64 = 4;

/// Matches `AtlasParams` in `scatter.wgsl` and `merge.wgsl`.
#[repr(C)]
#[derive(Debug, Copy, Clone, Default, PartialEq, Pod, Zeroable)]
pub struct AtlasParams {
    pub viewport_size: [u32; 2],
    pub atlas_size: [u32; 2],
    pub cell_capacity: u32,
    pub _pad: [u32; 3],
}

pub struct AtlasResources {
    width: u32,
    height: u32,
    cell_capacity: u32,
    /// `atomic<u32>` x4 per atlas pixel. Zero between frames.
    pub accumulator: wgpu::Buffer,
    pub cells: wgpu::Buffer,
    pub params: wgpu::Buffer,
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
}

impl AtlasResources {
    pub fn new(device: &wgpu::Device, config: &PipelineConfig) -> Self {
        let (width, height) = (config.atlas_width, config.atlas_height);

        // New buffers are zero-filled, so the accumulators start clear
        let accumulator = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Atlas Accumulator Buffer"),
            size: width as u64 * height as u64 * ACCUMULATOR_CHANNELS * 4,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        let cells = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Cell Viewport Buffer"),
            size: (config.cell_capacity as usize * std::mem::size_of::<GpuCell>()) as u64,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let params = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Atlas Params Buffer"),
            size: std::mem::size_of::<AtlasParams>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Atlas Texture"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: ATLAS_FORMAT,
            usage: wgpu::TextureUsages::STORAGE_BINDING
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        log::info!(
            "Created {}x{} atlas with {} cell slots",
            width,
            height,
            config.cell_capacity
        );

        Self {
            width,
            height,
            cell_capacity: config.cell_capacity,
            accumulator,
            cells,
            params,
            texture,
            view,
        }
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Upload this frame's cell table and viewport size.
    pub fn upload(&self, queue: &wgpu::Queue, viewport_size: (u32, u32), cells: &CellTable) {
        debug_assert_eq!(cells.capacity(), self.cell_capacity);

        let params = AtlasParams {
            viewport_size: [viewport_size.0, viewport_size.1],
            atlas_size: [self.width, self.height],
            cell_capacity: self.cell_capacity,
            _pad: [0; 3],
        };
        queue.write_buffer(&self.params, 0, bytemuck::bytes_of(&params));
        queue.write_buffer(&self.cells, 0, bytemuck::cast_slice(&cells.to_gpu()));
    }
}

/// Workgroups needed to cover `extent` items with groups of `group_size`.
pub fn workgroup_count(extent: u32, group_size: u32) -> u32 {
    extent.div_ceil(group_size).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_params_layout() {
        assert_eq!(std::mem::size_of::<AtlasParams>(), 32);
        assert_eq!(std::mem::size_of::<GpuCell>(), 16);
    }

    #[test]
    fn test_workgroup_count() {
        assert_eq!(workgroup_count(1024, 8), 128);
        assert_eq!(workgroup_count(1025, 8), 129);
        assert_eq!(workgroup_count(0, 8), 1);
    }
}
