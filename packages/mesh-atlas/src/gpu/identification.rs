//! Identification pass.
//!
//! Renders every visible mesh into two single-channel float targets: the
//! object id and the normalized linear depth. The float format is picked per
//! adapter (`R32Float`, or `R16Float` where that is not renderable). A `Depth24Plus` attachment resolves occlusion,
//! so draw order does not matter.

use crate::camera::ViewportInfo;
use crate::gpu::draws::DrawUniformBuffer;
use crate::gpu::mesh::MeshBufferCache;
use crate::gpu::pipeline::{self, DEPTH_FORMAT, ID_TARGET_USAGES};
use crate::objects::DrawItem;

/// Viewport-sized targets written by the identification pass.
pub struct IdentificationTargets {
    width: u32,
    height: u32,
    pub object_id: wgpu::Texture,
    pub object_id_view: wgpu::TextureView,
    pub linearized_depth: wgpu::Texture,
    pub linearized_depth_view: wgpu::TextureView,
    depth_view: wgpu::TextureView,
}

impl IdentificationTargets {
    pub fn new(device: &wgpu::Device, width: u32, height: u32, id_format: wgpu::TextureFormat) -> Self {
        let size = wgpu::Extent3d {
            width: width.max(1),
            height: height.max(1),
            depth_or_array_layers: 1,
        };

        let create_texture = |label: &str, format: wgpu::TextureFormat, usage: wgpu::TextureUsages| {
            device.create_texture(&wgpu::TextureDescriptor {
                label: Some(label),
                size,
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format,
                usage,
                view_formats: &[],
            })
        };

        let object_id = create_texture("Object ID Texture", id_format, ID_TARGET_USAGES);
        let linearized_depth = create_texture("Linearized Depth Texture", id_format, ID_TARGET_USAGES);
        let depth = create_texture(
            "Identification Depth Texture",
            DEPTH_FORMAT,
            wgpu::TextureUsages::RENDER_ATTACHMENT,
        );

        Self {
            width: size.width,
            height: size.height,
            object_id_view: object_id.create_view(&wgpu::TextureViewDescriptor::default()),
            linearized_depth_view: linearized_depth.create_view(&wgpu::TextureViewDescriptor::default()),
            depth_view: depth.create_view(&wgpu::TextureViewDescriptor::default()),
            object_id,
            linearized_depth,
        }
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// Proof that the identification pass was recorded for this frame's targets.
///
/// Consumed by the scatter pass, which must come after it in the encoder.
#[derive(Debug)]
pub struct IdentificationOutput {
    size: (u32, u32),
    draws: usize,
}

impl IdentificationOutput {
    pub fn size(&self) -> (u32, u32) {
        self.size
    }

    pub fn draws(&self) -> usize {
        self.draws
    }
}

pub struct IdentificationPass {
    pipeline: wgpu::RenderPipeline,
}

impl IdentificationPass {
    pub fn new(device: &wgpu::Device, uniforms: &DrawUniformBuffer, id_format: wgpu::TextureFormat) -> Self {
        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Identification Pipeline Layout"),
            bind_group_layouts: &[uniforms.layout()],
            push_constant_ranges: &[],
        });

        Self {
            pipeline: pipeline::create_identification_pipeline(device, &layout, id_format),
        }
    }

    /// Record the pass. Uniform slots for `draws` must already be written.
    pub fn record(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        targets: &IdentificationTargets,
        viewport: &ViewportInfo,
        uniforms: &DrawUniformBuffer,
        meshes: &MeshBufferCache,
        draws: &[DrawItem],
        count: usize,
    ) -> IdentificationOutput {
        debug_assert_eq!(targets.size(), viewport.size());

        let clear_zero = wgpu::Operations {
            load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
            store: wgpu::StoreOp::Store,
        };

        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Identification Pass"),
                color_attachments: &[
                    Some(wgpu::RenderPassColorAttachment {
                        view: &targets.object_id_view,
                        resolve_target: None,
                        ops: clear_zero,
                    }),
                    Some(wgpu::RenderPassColorAttachment {
                        view: &targets.linearized_depth_view,
                        resolve_target: None,
                        ops: clear_zero,
                    }),
                ],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &targets.depth_view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            render_pass.set_pipeline(&self.pipeline);
            uniforms.record_draws(&mut render_pass, meshes, draws, count);
        }

        IdentificationOutput {
            size: targets.size(),
            draws: count,
        }
    }
}
