//! Frame orchestrator.
//!
//! [`AtlasPipeline`] owns every GPU resource of the atlas pipeline and runs one
//! frame per [`AtlasPipeline::render_frame`] call:
//!
//! 1. query the active viewport (skip the frame if there is none),
//! 2. recreate viewport-sized targets if the size changed,
//! 3. sync the object arena and solve the layout,
//! 4. record identification, colour capture, scatter and merge in one encoder.
//!
//! Each stage returns a token the next one consumes, so the passes can only be
//! recorded in order. Every stage is its own wgpu pass, which places a full
//! barrier between them.

use crate::camera::ViewportSource;
use crate::config::PipelineConfig;
use crate::frame::{FrameOutcome, FrameState, FrameStateMachine, FrameStats, SkipReason};
use crate::gpu::atlas::AtlasResources;
use crate::gpu::color_capture::{ColorCapturePass, ColorCaptureTarget};
use crate::gpu::display::{self, DebugDisplay, DisplayRegistry, DisplayTextureInfo, ValueRange};
use crate::gpu::draws::DrawUniformBuffer;
use crate::gpu::identification::{IdentificationPass, IdentificationTargets};
use crate::gpu::merge::MergePass;
use crate::gpu::mesh::MeshBufferCache;
use crate::gpu::scatter::ScatterPass;
use crate::layout::{solve_layout, AtlasLayout, LayoutParams};
use crate::mesh_asset::MeshId;
use crate::objects::ObjectArena;
use crate::scene::{ObjectKey, SceneSource};

/// Collaborators queried by `render_frame`.
pub struct FrameContext<'a> {
    pub scene: &'a dyn SceneSource,
    pub viewport: &'a dyn ViewportSource,
}

/// Targets that follow the viewport size.
struct ViewportTargets {
    identification: IdentificationTargets,
    color: ColorCaptureTarget,
}

pub struct AtlasPipeline {
    config: PipelineConfig,
    /// Format of the object id and linearized depth targets.
    id_format: wgpu::TextureFormat,
    meshes: MeshBufferCache,
    arena: ObjectArena,
    uniforms: DrawUniformBuffer,
    identification: IdentificationPass,
    color_capture: ColorCapturePass,
    scatter: ScatterPass,
    merge: MergePass,
    atlas: AtlasResources,
    viewport_targets: Option<ViewportTargets>,
    display: DebugDisplay,
    registry: DisplayRegistry,
    state: FrameStateMachine,
    layout: AtlasLayout,
    /// Objects with changed settings that the last layout placed.
    changed: Vec<ObjectKey>,
    frame: u64,
}

impl AtlasPipeline {
    /// `id_format` must be renderable on `device`; see
    /// [`select_id_format`](crate::gpu::pipeline::select_id_format).
    pub fn new(device: &wgpu::Device, config: PipelineConfig, id_format: wgpu::TextureFormat) -> Self {
        let uniforms = DrawUniformBuffer::new(device);
        let atlas = AtlasResources::new(device, &config);

        let mut registry = DisplayRegistry::new();
        registry.insert(
            display::ATLAS,
            DisplayTextureInfo::new(&atlas.texture, true, ValueRange::default()),
        );

        let mut state = FrameStateMachine::new();
        state.initialize();

        Self {
            identification: IdentificationPass::new(device, &uniforms, id_format),
            color_capture: ColorCapturePass::new(device, &uniforms),
            scatter: ScatterPass::new(device),
            merge: MergePass::new(device, &atlas),
            display: DebugDisplay::new(device),
            layout: AtlasLayout::empty(config.cell_capacity),
            meshes: MeshBufferCache::new(),
            arena: ObjectArena::new(),
            viewport_targets: None,
            changed: Vec::new(),
            frame: 0,
            config,
            id_format,
            uniforms,
            atlas,
            registry,
            state,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn id_format(&self) -> wgpu::TextureFormat {
        self.id_format
    }

    pub fn state(&self) -> FrameState {
        self.state.state()
    }

    /// Layout of the last rendered frame.
    pub fn layout(&self) -> &AtlasLayout {
        &self.layout
    }

    pub fn arena(&self) -> &ObjectArena {
        &self.arena
    }

    pub fn registry(&self) -> &DisplayRegistry {
        &self.registry
    }

    pub fn atlas_texture(&self) -> &wgpu::Texture {
        &self.atlas.texture
    }

    pub fn identification_targets(&self) -> Option<&IdentificationTargets> {
        self.viewport_targets.as_ref().map(|t| &t.identification)
    }

    pub fn color_target(&self) -> Option<&ColorCaptureTarget> {
        self.viewport_targets.as_ref().map(|t| &t.color)
    }

    /// Objects whose changed settings were included in the last layout. The
    /// host clears their dirty flags; objects that got no cell stay dirty.
    pub fn changed_objects(&self) -> &[ObjectKey] {
        &self.changed
    }

    pub fn mesh_cache(&self) -> &MeshBufferCache {
        &self.meshes
    }

    /// Drop cached buffers for `mesh`; they are rebuilt before its next draw.
    pub fn notify_mesh_changed(&mut self, mesh: MeshId) -> bool {
        let dropped = self.meshes.invalidate(mesh);
        if dropped {
            log::debug!("Mesh {:?} changed, buffers invalidated", mesh);
        }
        dropped
    }

    /// Drop cached buffers for meshes the scene no longer has.
    pub fn prune_meshes(&mut self, live: impl IntoIterator<Item = MeshId>) -> usize {
        let removed = self.meshes.prune(live);
        if removed > 0 {
            log::debug!("Pruned {} mesh buffer(s)", removed);
        }
        removed
    }

    fn resize(&mut self, device: &wgpu::Device, size: (u32, u32)) {
        log::info!("Viewport resized to {}x{}, recreating targets", size.0, size.1);

        let identification = IdentificationTargets::new(device, size.0, size.1, self.id_format);
        let color = ColorCaptureTarget::new(device, size.0, size.1);

        self.registry.insert(
            display::OBJECT_ID,
            DisplayTextureInfo::new(
                &identification.object_id,
                false,
                ValueRange::new(0.0, self.arena.max_id() as f32),
            ),
        );
        self.registry.insert(
            display::DEPTH_LINEARIZED,
            DisplayTextureInfo::new(&identification.linearized_depth, false, ValueRange::default()),
        );
        self.registry.insert(
            display::COLOR,
            DisplayTextureInfo::new(&color.texture, true, ValueRange::default()),
        );

        self.viewport_targets = Some(ViewportTargets { identification, color });
    }

    /// Run one frame. Never fails: a frame either completes or is skipped, in
    /// which case the previous atlas stays in place.
    pub fn render_frame(&mut self, device: &wgpu::Device, queue: &wgpu::Queue, ctx: &FrameContext<'_>) -> FrameOutcome {
        let Some(viewport) = ctx.viewport.active_viewport() else {
            log::debug!("No active viewport, frame skipped");
            return FrameOutcome::Skipped(SkipReason::NoActiveViewport);
        };
        if viewport.width == 0 || viewport.height == 0 {
            log::debug!("Viewport has no area, frame skipped");
            return FrameOutcome::Skipped(SkipReason::EmptyViewport);
        }
        let size = viewport.size();

        let resized = self.state.begin(size);
        if resized {
            self.resize(device, size);
            self.state.resized(size);
        }

        self.frame += 1;
        let objects = self.arena.sync(ctx.scene, self.frame);
        if !objects.dirty.is_empty() {
            log::debug!("Settings changed for {} object(s)", objects.dirty.len());
        }

        for draw in &objects.draws {
            if let Some(asset) = ctx.scene.mesh(draw.mesh) {
                self.meshes.ensure(device, asset);
            }
        }

        let layout = solve_layout(&objects.layout_requests, &LayoutParams::from(&self.config));
        self.atlas.upload(queue, size, &layout.cells);
        let draw_count = self.uniforms.write(queue, &viewport, &objects.draws);

        let Some(targets) = self.viewport_targets.as_ref() else {
            // begin() reports a resize whenever no targets exist
            self.state.finish();
            return FrameOutcome::Skipped(SkipReason::EmptyViewport);
        };

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Atlas Frame Encoder"),
        });

        let identified = self.identification.record(
            &mut encoder,
            &targets.identification,
            &viewport,
            &self.uniforms,
            &self.meshes,
            &objects.draws,
            draw_count,
        );
        let identified = self.color_capture.record(
            &mut encoder,
            &targets.color,
            &viewport,
            self.config.clear_color,
            &self.uniforms,
            &self.meshes,
            &objects.draws,
            identified,
        );
        let accumulated = self.scatter.record(
            device,
            &mut encoder,
            identified,
            &targets.identification,
            &targets.color,
            &self.atlas,
        );
        let merged = self.merge.record(&mut encoder, accumulated);
        queue.submit(Some(encoder.finish()));

        self.registry.set_range(
            display::OBJECT_ID,
            ValueRange::new(0.0, self.arena.max_id() as f32),
        );
        self.state.finish();

        let stats = FrameStats {
            frame: self.frame,
            viewport: size,
            resized,
            draws: draw_count,
            placed: layout.placed.len(),
            dropped: layout.dropped.len(),
            shelf_height: layout.shelf_height,
        };
        log::debug!(
            "Frame {}: {} draws, {} cells in {}x{} atlas",
            stats.frame,
            stats.draws,
            stats.placed,
            merged.size().0,
            merged.size().1
        );

        self.changed = self.arena.settled(&objects.dirty, &layout.placed);
        self.layout = layout;
        FrameOutcome::Rendered(stats)
    }

    /// Draw the debug texture `name` into `target`. Unknown names are skipped.
    pub fn draw_debug(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        name: &str,
        target: &wgpu::TextureView,
        target_format: wgpu::TextureFormat,
        target_size: (u32, u32),
    ) -> bool {
        self.display
            .draw(device, queue, encoder, &self.registry, name, target, target_format, target_size)
    }
}
