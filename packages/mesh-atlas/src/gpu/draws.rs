//! Per-draw uniforms shared by the identification and colour capture passes.
//!
//! Every draw owns one 256-byte slot in a dynamic uniform buffer. All slots are
//! written before the render passes are recorded, since `queue.write_buffer`
//! takes effect at submit time rather than at its position in the pass.

use bytemuck::{Pod, Zeroable};

use crate::camera::ViewportInfo;
use crate::gpu::mesh::MeshBufferCache;
use crate::objects::DrawItem;

/// Maximum number of draws per frame; one uniform slot each.
pub const MAX_DRAWS_PER_FRAME: usize = 256;

/// Uniform buffer alignment (WebGPU minUniformBufferOffsetAlignment is typically 256 bytes)
pub const UNIFORM_ALIGNMENT: usize = 256;

#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
pub struct DrawUniforms {
    pub view_proj: [[f32; 4]; 4],
    pub model: [[f32; 4]; 4],
    pub color: [f32; 4],
    pub object_id: f32,
    pub near: f32,
    pub far: f32,
    pub _pad0: f32,
    // Padding to reach 256-byte alignment (160 bytes of data + 96 bytes padding)
    pub _padding: [f32; 24],
}

impl DrawUniforms {
    pub fn new(viewport: &ViewportInfo, draw: &DrawItem) -> Self {
        Self {
            view_proj: viewport.view_proj.to_cols_array_2d(),
            model: draw.world.to_cols_array_2d(),
            color: draw.color,
            object_id: draw.id.as_f32(),
            near: viewport.near,
            far: viewport.far,
            _pad0: 0.0,
            _padding: [0.0; 24],
        }
    }
}

/// The dynamic uniform buffer and its bind group.
pub struct DrawUniformBuffer {
    buffer: wgpu::Buffer,
    layout: wgpu::BindGroupLayout,
    bind_group: wgpu::BindGroup,
}

impl DrawUniformBuffer {
    pub fn new(device: &wgpu::Device) -> Self {
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Draw Uniform Buffer (Dynamic)"),
            size: (UNIFORM_ALIGNMENT * MAX_DRAWS_PER_FRAME) as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: true,
                    min_binding_size: wgpu::BufferSize::new(std::mem::size_of::<DrawUniforms>() as u64),
                },
                count: None,
            }],
            label: Some("draw_bind_group_layout"),
        });

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout: &layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer: &buffer,
                    offset: 0,
                    size: wgpu::BufferSize::new(std::mem::size_of::<DrawUniforms>() as u64),
                }),
            }],
            label: Some("draw_bind_group"),
        });

        Self { buffer, layout, bind_group }
    }

    pub fn layout(&self) -> &wgpu::BindGroupLayout {
        &self.layout
    }

    /// Write one slot per draw. Returns how many draws fit.
    pub fn write(&self, queue: &wgpu::Queue, viewport: &ViewportInfo, draws: &[DrawItem]) -> usize {
        if draws.len() > MAX_DRAWS_PER_FRAME {
            log::warn!(
                "Too many visible objects ({} > {}), some will not be rendered",
                draws.len(),
                MAX_DRAWS_PER_FRAME
            );
        }

        let count = draws.len().min(MAX_DRAWS_PER_FRAME);
        for (slot, draw) in draws[..count].iter().enumerate() {
            let uniforms = DrawUniforms::new(viewport, draw);
            queue.write_buffer(
                &self.buffer,
                (slot * UNIFORM_ALIGNMENT) as u64,
                bytemuck::cast_slice(&[uniforms]),
            );
        }
        count
    }

    pub fn dynamic_offset(slot: usize) -> u32 {
        (slot * UNIFORM_ALIGNMENT) as u32
    }

    /// Issue the first `count` draws, using the slots written by [`Self::write`].
    pub fn record_draws(
        &self,
        render_pass: &mut wgpu::RenderPass<'_>,
        meshes: &MeshBufferCache,
        draws: &[DrawItem],
        count: usize,
    ) {
        for (slot, draw) in draws.iter().take(count).enumerate() {
            let Some(buffers) = meshes.get(draw.mesh) else {
                log::debug!("No buffers for mesh {:?}, object {} not drawn", draw.mesh, draw.id.0);
                continue;
            };
            render_pass.set_bind_group(0, &self.bind_group, &[Self::dynamic_offset(slot)]);
            render_pass.set_vertex_buffer(0, buffers.vertex_buffer.slice(..));
            render_pass.set_index_buffer(buffers.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
            render_pass.draw_indexed(0..buffers.num_indices, 0, 0..1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_slot_size() {
        assert_eq!(std::mem::size_of::<DrawUniforms>(), UNIFORM_ALIGNMENT);
        assert_eq!(DrawUniformBuffer::dynamic_offset(3), 768);
    }
}
