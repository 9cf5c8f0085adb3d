//! Off-screen viewport colour image, the colour source of the scatter pass.

use crate::camera::ViewportInfo;
use crate::gpu::draws::DrawUniformBuffer;
use crate::gpu::identification::IdentificationOutput;
use crate::gpu::mesh::MeshBufferCache;
use crate::gpu::pipeline::{self, DEPTH_FORMAT};
use crate::objects::DrawItem;

pub const COLOR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

pub struct ColorCaptureTarget {
    width: u32,
    height: u32,
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    depth_view: wgpu::TextureView,
}

impl ColorCaptureTarget {
    pub fn new(device: &wgpu::Device, width: u32, height: u32) -> Self {
        let size = wgpu::Extent3d {
            width: width.max(1),
            height: height.max(1),
            depth_or_array_layers: 1,
        };

        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Viewport Color Texture"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: COLOR_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let depth = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Viewport Color Depth Texture"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });

        Self {
            width: size.width,
            height: size.height,
            view: texture.create_view(&wgpu::TextureViewDescriptor::default()),
            depth_view: depth.create_view(&wgpu::TextureViewDescriptor::default()),
            texture,
        }
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

pub struct ColorCapturePass {
    pipeline: wgpu::RenderPipeline,
}

impl ColorCapturePass {
    pub fn new(device: &wgpu::Device, uniforms: &DrawUniformBuffer) -> Self {
        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Color Capture Pipeline Layout"),
            bind_group_layouts: &[uniforms.layout()],
            push_constant_ranges: &[],
        });

        Self {
            pipeline: pipeline::create_color_capture_pipeline(device, &layout, COLOR_FORMAT),
        }
    }

    /// Draw the same objects as the identification pass, shaded, into `target`.
    ///
    /// Reuses the uniform slots written for the identification pass, so it
    /// takes that pass's output and hands it back unchanged.
    pub fn record(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        target: &ColorCaptureTarget,
        viewport: &ViewportInfo,
        clear_color: [f32; 4],
        uniforms: &DrawUniformBuffer,
        meshes: &MeshBufferCache,
        draws: &[DrawItem],
        identification: IdentificationOutput,
    ) -> IdentificationOutput {
        debug_assert_eq!(target.size(), viewport.size());
        let [r, g, b, a] = clear_color.map(f64::from);

        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Color Capture Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &target.view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color { r, g, b, a }),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &target.depth_view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Discard,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            render_pass.set_pipeline(&self.pipeline);
            uniforms.record_draws(&mut render_pass, meshes, draws, identification.draws());
        }

        identification
    }
}
