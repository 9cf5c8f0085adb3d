//! Host integration: explicit lifecycle around one [`AtlasPipeline`].
//!
//! The host owns the wgpu device and queue and holds the only reference to the
//! pipeline. `create_pipeline` and `delete_pipeline` may be called any number
//! of times; `render_frame` creates the pipeline on demand.

use anyhow::{anyhow, bail, Context, Result};

use crate::config::PipelineConfig;
use crate::frame::FrameOutcome;
use crate::gpu::atlas::{ACCUMULATOR_CHANNELS, ATLAS_FORMAT};
use crate::gpu::color_capture::COLOR_FORMAT;
use crate::gpu::pipeline::select_id_format;
use crate::mesh_asset::MeshId;
use crate::pipeline::{AtlasPipeline, FrameContext};

pub struct AtlasHost {
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: PipelineConfig,
    id_format: wgpu::TextureFormat,
    pipeline: Option<AtlasPipeline>,
}

/// Pick the id target format and check the other fixed formats, given the
/// allowed usages the adapter reports for each format.
pub fn check_formats(
    config: &PipelineConfig,
    usages_of: impl Fn(wgpu::TextureFormat) -> wgpu::TextureUsages,
) -> Result<wgpu::TextureFormat> {
    let id_format = select_id_format(config.cell_capacity, &usages_of).ok_or_else(|| {
        anyhow!(
            "Adapter cannot render object ids: R32Float is not renderable and R16Float {}",
            if config.cell_capacity > crate::gpu::pipeline::HALF_FLOAT_EXACT_INTEGER + 1 {
                "cannot hold the configured cell capacity"
            } else {
                "is not renderable either"
            }
        )
    })?;

    let atlas_usages = wgpu::TextureUsages::STORAGE_BINDING | wgpu::TextureUsages::TEXTURE_BINDING;
    if !usages_of(ATLAS_FORMAT).contains(atlas_usages) {
        bail!("Adapter cannot use {:?} as a storage texture", ATLAS_FORMAT);
    }
    if !usages_of(COLOR_FORMAT).contains(wgpu::TextureUsages::RENDER_ATTACHMENT) {
        bail!("Adapter cannot render to {:?}", COLOR_FORMAT);
    }
    Ok(id_format)
}

fn ensure_pipeline<'a>(
    slot: &'a mut Option<AtlasPipeline>,
    device: &wgpu::Device,
    config: &PipelineConfig,
    id_format: wgpu::TextureFormat,
) -> &'a mut AtlasPipeline {
    slot.get_or_insert_with(|| {
        log::info!("Creating atlas pipeline (id format {:?})", id_format);
        AtlasPipeline::new(device, config.clone(), id_format)
    })
}

impl AtlasHost {
    /// Wrap an existing device created from `adapter`. Fails if the
    /// configuration does not fit the device limits or the adapter lacks a
    /// required texture format capability.
    pub fn new(adapter: &wgpu::Adapter, device: wgpu::Device, queue: wgpu::Queue, config: PipelineConfig) -> Result<Self> {
        config.validate().map_err(|e| anyhow!("Invalid pipeline config: {}", e))?;
        let id_format = check_formats(&config, |format| {
            adapter.get_texture_format_features(format).allowed_usages
        })?;

        let limits = device.limits();
        if config.atlas_width > limits.max_texture_dimension_2d
            || config.atlas_height > limits.max_texture_dimension_2d
        {
            bail!(
                "Atlas {}x{} exceeds the device texture limit of {}",
                config.atlas_width,
                config.atlas_height,
                limits.max_texture_dimension_2d
            );
        }
        let accumulator_bytes = config.atlas_pixels() as u64 * ACCUMULATOR_CHANNELS * 4;
        if accumulator_bytes > limits.max_storage_buffer_binding_size as u64 {
            bail!(
                "Atlas accumulators need {} bytes, device allows {} per storage binding",
                accumulator_bytes,
                limits.max_storage_buffer_binding_size
            );
        }

        Ok(Self {
            device,
            queue,
            config,
            id_format,
            pipeline: None,
        })
    }

    /// Request an adapter and device without a surface.
    pub async fn headless(config: PipelineConfig) -> Result<Self> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor::default());
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None, // Headless
                force_fallback_adapter: false,
            })
            .await
            .ok_or_else(|| anyhow!("No adapter found"))?;

        log::info!("Using adapter: {}", adapter.get_info().name);

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor::default(), None)
            .await
            .context("Failed to create device")?;

        Self::new(&adapter, device, queue, config)
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn pipeline(&self) -> Option<&AtlasPipeline> {
        self.pipeline.as_ref()
    }

    pub fn pipeline_mut(&mut self) -> Option<&mut AtlasPipeline> {
        self.pipeline.as_mut()
    }

    pub fn id_format(&self) -> wgpu::TextureFormat {
        self.id_format
    }

    pub fn has_pipeline(&self) -> bool {
        self.pipeline.is_some()
    }

    pub fn create_pipeline(&mut self) -> &mut AtlasPipeline {
        ensure_pipeline(&mut self.pipeline, &self.device, &self.config, self.id_format)
    }

    /// Release every GPU resource of the pipeline. No-op without one.
    pub fn delete_pipeline(&mut self) {
        if self.pipeline.take().is_some() {
            log::info!("Deleted atlas pipeline");
        }
    }

    pub fn render_frame(&mut self, ctx: &FrameContext<'_>) -> FrameOutcome {
        let pipeline = ensure_pipeline(&mut self.pipeline, &self.device, &self.config, self.id_format);
        pipeline.render_frame(&self.device, &self.queue, ctx)
    }

    /// Record a debug preview of `name` into `target`. Returns false when there
    /// is no pipeline or no texture of that name.
    pub fn draw_debug(
        &mut self,
        encoder: &mut wgpu::CommandEncoder,
        name: &str,
        target: &wgpu::TextureView,
        target_format: wgpu::TextureFormat,
        target_size: (u32, u32),
    ) -> bool {
        let (device, queue) = (&self.device, &self.queue);
        match self.pipeline.as_mut() {
            Some(pipeline) => pipeline.draw_debug(device, queue, encoder, name, target, target_format, target_size),
            None => false,
        }
    }

    /// Forward a mesh change to the buffer cache. Returns false when there is
    /// no pipeline or the mesh had no buffers.
    pub fn notify_mesh_changed(&mut self, mesh: MeshId) -> bool {
        self.pipeline
            .as_mut()
            .is_some_and(|pipeline| pipeline.notify_mesh_changed(mesh))
    }

    /// Evict buffers of meshes the scene reports as deleted. `live` lists the
    /// meshes that still exist.
    pub fn prune_meshes(&mut self, live: impl IntoIterator<Item = MeshId>) -> usize {
        self.pipeline
            .as_mut()
            .map_or(0, |pipeline| pipeline.prune_meshes(live))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOT_RENDERABLE: wgpu::TextureUsages = wgpu::TextureUsages::TEXTURE_BINDING
        .union(wgpu::TextureUsages::COPY_SRC)
        .union(wgpu::TextureUsages::COPY_DST)
        .union(wgpu::TextureUsages::STORAGE_BINDING);

    #[test]
    fn test_full_support_uses_r32float() {
        let format = check_formats(&PipelineConfig::default(), |_| wgpu::TextureUsages::all()).unwrap();
        assert_eq!(format, wgpu::TextureFormat::R32Float);
    }

    #[test]
    fn test_unrenderable_r32float_falls_back() {
        let usages_of = |format: wgpu::TextureFormat| match format {
            wgpu::TextureFormat::R32Float => NOT_RENDERABLE,
            _ => wgpu::TextureUsages::all(),
        };
        let format = check_formats(&PipelineConfig::default(), usages_of).unwrap();
        assert_eq!(format, wgpu::TextureFormat::R16Float);
    }

    #[test]
    fn test_missing_capabilities_are_errors() {
        let no_float_targets = |format: wgpu::TextureFormat| match format {
            wgpu::TextureFormat::R32Float | wgpu::TextureFormat::R16Float => NOT_RENDERABLE,
            _ => wgpu::TextureUsages::all(),
        };
        assert!(check_formats(&PipelineConfig::default(), no_float_targets).is_err());

        let no_storage_atlas = |format: wgpu::TextureFormat| {
            if format == ATLAS_FORMAT {
                wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING
            } else {
                wgpu::TextureUsages::all()
            }
        };
        let err = check_formats(&PipelineConfig::default(), no_storage_atlas).unwrap_err();
        assert!(err.to_string().contains("storage texture"));

        let large = PipelineConfig { cell_capacity: 4096, ..PipelineConfig::default() };
        let only_half = |format: wgpu::TextureFormat| match format {
            wgpu::TextureFormat::R32Float => NOT_RENDERABLE,
            _ => wgpu::TextureUsages::all(),
        };
        let err = check_formats(&large, only_half).unwrap_err();
        assert!(err.to_string().contains("cell capacity"));
    }
}
