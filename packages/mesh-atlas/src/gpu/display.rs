//! Debug display of the pipeline's textures.
//!
//! Textures are registered by name in a [`DisplayRegistry`]. [`DebugDisplay`]
//! draws one of them on a quad into a caller-supplied target, fitted to the
//! target's aspect ratio. Single-channel textures are shown as grey, remapped
//! from their `{min, max}` range; multi-channel textures are shown as is.

use std::collections::HashMap;

use bytemuck::{Pod, Zeroable};
use wgpu::util::DeviceExt;

use crate::gpu::pipeline;

pub const OBJECT_ID: &str = "Object ID";
pub const DEPTH_LINEARIZED: &str = "Depth Linearized";
pub const COLOR: &str = "Color";
pub const ATLAS: &str = "Atlas";

/// Value range mapped to black..white for single-channel display.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValueRange {
    pub min: f32,
    pub max: f32,
}

impl ValueRange {
    /// Never empty: `max` is kept strictly above `min`.
    pub fn new(min: f32, max: f32) -> Self {
        let max = if max > min { max } else { min + 1.0 };
        Self { min, max }
    }
}

impl Default for ValueRange {
    fn default() -> Self {
        Self { min: 0.0, max: 1.0 }
    }
}

pub struct DisplayTextureInfo {
    pub view: wgpu::TextureView,
    pub size: (u32, u32),
    pub multi_channel: bool,
    pub range: ValueRange,
}

impl DisplayTextureInfo {
    pub fn new(texture: &wgpu::Texture, multi_channel: bool, range: ValueRange) -> Self {
        Self {
            view: texture.create_view(&wgpu::TextureViewDescriptor::default()),
            size: (texture.width(), texture.height()),
            multi_channel,
            range,
        }
    }
}

/// Named debug textures.
#[derive(Default)]
pub struct DisplayRegistry {
    entries: HashMap<String, DisplayTextureInfo>,
}

impl DisplayRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: &str, info: DisplayTextureInfo) {
        self.entries.insert(name.to_string(), info);
    }

    pub fn get(&self, name: &str) -> Option<&DisplayTextureInfo> {
        self.entries.get(name)
    }

    pub fn set_range(&mut self, name: &str, range: ValueRange) -> bool {
        match self.entries.get_mut(name) {
            Some(info) => {
                info.range = range;
                true
            }
            None => false,
        }
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Half extents of the preview quad in NDC.
///
/// Landscape (or square) textures span the full target width, portrait ones
/// the full target height; the other axis keeps the texture's aspect ratio.
pub fn fit_quad(texture_size: (u32, u32), target_size: (u32, u32)) -> [f32; 2] {
    let texture_aspect = texture_size.0 as f32 / texture_size.1.max(1) as f32;
    let target_aspect = target_size.0 as f32 / target_size.1.max(1) as f32;
    let d = texture_aspect / target_aspect;

    if texture_size.0 >= texture_size.1 {
        [1.0, 1.0 / d]
    } else {
        [d, 1.0]
    }
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
struct QuadVertex {
    position: [f32; 2],
    uv: [f32; 2],
}

impl QuadVertex {
    const ATTRIBS: [wgpu::VertexAttribute; 2] = wgpu::vertex_attr_array![0 => Float32x2, 1 => Float32x2];

    fn desc() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<QuadVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRIBS,
        }
    }
}

/// Two triangles covering `[-sx, sx] x [-sy, sy]`.
fn quad_vertices([sx, sy]: [f32; 2]) -> [QuadVertex; 6] {
    [
        QuadVertex { position: [-sx, -sy], uv: [0.0, 1.0] },
        QuadVertex { position: [ sx, -sy], uv: [1.0, 1.0] },
        QuadVertex { position: [ sx,  sy], uv: [1.0, 0.0] },
        QuadVertex { position: [-sx, -sy], uv: [0.0, 1.0] },
        QuadVertex { position: [ sx,  sy], uv: [1.0, 0.0] },
        QuadVertex { position: [-sx,  sy], uv: [0.0, 0.0] },
    ]
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
struct DisplayUniforms {
    range_min: f32,
    range_max: f32,
    multi_channel: u32,
    _pad: u32,
}

/// Draws registry entries. One preview per queue submission: the quad and
/// uniforms are rewritten on every call.
pub struct DebugDisplay {
    bind_group_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    /// One pipeline per target format, built on first use.
    pipelines: HashMap<wgpu::TextureFormat, wgpu::RenderPipeline>,
    uniform_buffer: wgpu::Buffer,
    quad_vertex_buffer: wgpu::Buffer,
}

impl DebugDisplay {
    pub fn new(device: &wgpu::Device) -> Self {
        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Debug Display Bind Group Layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: false },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Debug Display Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Debug Display Uniform Buffer"),
            size: std::mem::size_of::<DisplayUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let quad_vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Debug Display Quad Buffer"),
            contents: bytemuck::cast_slice(&quad_vertices([1.0, 1.0])),
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
        });

        Self {
            bind_group_layout,
            pipeline_layout,
            pipelines: HashMap::new(),
            uniform_buffer,
            quad_vertex_buffer,
        }
    }

    /// Draw the texture registered as `name` into `target`.
    ///
    /// Returns false, drawing nothing, when no such texture is registered.
    pub fn draw(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        registry: &DisplayRegistry,
        name: &str,
        target: &wgpu::TextureView,
        target_format: wgpu::TextureFormat,
        target_size: (u32, u32),
    ) -> bool {
        let Some(info) = registry.get(name) else {
            log::debug!("Debug texture '{}' not found, preview skipped", name);
            return false;
        };

        let uniforms = DisplayUniforms {
            range_min: info.range.min,
            range_max: info.range.max,
            multi_channel: info.multi_channel as u32,
            _pad: 0,
        };
        queue.write_buffer(&self.uniform_buffer, 0, bytemuck::bytes_of(&uniforms));
        queue.write_buffer(
            &self.quad_vertex_buffer,
            0,
            bytemuck::cast_slice(&quad_vertices(fit_quad(info.size, target_size))),
        );

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Debug Display Bind Group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: self.uniform_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&info.view),
                },
            ],
        });

        let pipeline_layout = &self.pipeline_layout;
        let render_pipeline = self.pipelines.entry(target_format).or_insert_with(|| {
            pipeline::create_display_pipeline(device, pipeline_layout, QuadVertex::desc(), target_format)
        });

        let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Debug Display Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: target,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        render_pass.set_pipeline(render_pipeline);
        render_pass.set_bind_group(0, &bind_group, &[]);
        render_pass.set_vertex_buffer(0, self.quad_vertex_buffer.slice(..));
        render_pass.draw(0..6, 0..1);

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_landscape_spans_width() {
        // 2:1 texture on a 1:1 target: full width, half height
        assert_eq!(fit_quad((200, 100), (100, 100)), [1.0, 0.5]);
    }

    #[test]
    fn test_portrait_spans_height() {
        // 1:2 texture on a 1:1 target: half width, full height
        assert_eq!(fit_quad((100, 200), (100, 100)), [0.5, 1.0]);
    }

    #[test]
    fn test_matching_aspect_fills_target() {
        assert_eq!(fit_quad((1920, 1080), (1280, 720)), [1.0, 1.0]);
    }

    #[test]
    fn test_value_range_never_empty() {
        let range = ValueRange::new(3.0, 3.0);
        assert!(range.max > range.min);
        assert_eq!(ValueRange::new(0.0, 5.0).max, 5.0);
    }
}
