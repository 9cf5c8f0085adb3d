use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use crate::camera::FixedViewport;
use crate::config::PipelineConfig;
use crate::frame::FrameOutcome;
use crate::gpu::readback;
use crate::host::AtlasHost;
use crate::layout::{solve_layout, LayoutParams};
use crate::objects::ObjectArena;
use crate::pipeline::FrameContext;
use crate::scene::Scene;
use crate::scene_file::SceneDescription;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render a scene and write the atlas to disk
    Render {
        /// Scene description (JSON)
        #[arg(long)]
        scene: PathBuf,

        /// Output PNG for the atlas
        #[arg(long)]
        out: PathBuf,

        /// Pipeline config (JSON); defaults are used when omitted
        #[arg(long)]
        config: Option<PathBuf>,

        /// Viewport width
        #[arg(long, default_value_t = 800)]
        width: u32,

        /// Viewport height
        #[arg(long, default_value_t = 600)]
        height: u32,

        /// Number of frames to run before reading the atlas back
        #[arg(long, default_value_t = 1)]
        frames: u32,

        /// Also write the intermediate buffers into this directory
        #[arg(long)]
        dump_dir: Option<PathBuf>,

        /// Debug texture to draw into preview.png ("Object ID", "Depth Linearized", "Color", "Atlas")
        #[arg(long)]
        preview: Option<String>,
    },
    /// Print the atlas layout of a scene without rendering
    Layout {
        /// Scene description (JSON)
        #[arg(long)]
        scene: PathBuf,

        /// Pipeline config (JSON); defaults are used when omitted
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Render { scene, out, config, width, height, frames, dump_dir, preview } => {
            let options = RenderOptions { width, height, frames, dump_dir, preview };
            pollster::block_on(render_offline(&scene, &out, config.as_deref(), options))?;
        }
        Commands::Layout { scene, config } => {
            print_layout(&scene, config.as_deref())?;
        }
    }
    Ok(())
}

struct RenderOptions {
    width: u32,
    height: u32,
    frames: u32,
    dump_dir: Option<PathBuf>,
    preview: Option<String>,
}

fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    let config = match path {
        Some(path) => PipelineConfig::from_file(path).map_err(|e| anyhow!(e))?,
        None => PipelineConfig::default(),
    };
    config.validate().map_err(|e| anyhow!("Invalid pipeline config: {}", e))?;
    Ok(config)
}

fn load_scene(path: &Path) -> Result<(SceneDescription, Scene)> {
    let description = SceneDescription::from_file(path).map_err(|e| anyhow!(e))?;
    let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
    let scene = description.build(base_dir)?;
    Ok((description, scene))
}

fn save_rgba8(path: &Path, data: &[u8], width: u32, height: u32) -> Result<()> {
    image::save_buffer(path, data, width, height, image::ColorType::Rgba8)
        .with_context(|| format!("Failed to write {:?}", path))
}

async fn render_offline(scene_path: &Path, out: &Path, config_path: Option<&Path>, options: RenderOptions) -> Result<()> {
    let config = load_config(config_path)?;
    let (description, mut scene) = load_scene(scene_path)?;
    let viewport = FixedViewport {
        camera: description.camera,
        width: options.width,
        height: options.height,
    };

    let mut host = AtlasHost::headless(config).await?;
    host.create_pipeline();

    println!(
        "Rendering {} frame(s) of {} objects at {}x{}...",
        options.frames,
        scene.len(),
        options.width,
        options.height
    );

    let mut last = None;
    for _ in 0..options.frames.max(1) {
        let outcome = host.render_frame(&FrameContext { scene: &scene, viewport: &viewport });
        if let FrameOutcome::Skipped(reason) = &outcome {
            log::warn!("Frame skipped: {:?}", reason);
        }
        if let Some(pipeline) = host.pipeline() {
            scene.acknowledge(pipeline.changed_objects());
        }
        last = Some(outcome);
    }
    host.prune_meshes(scene.meshes.ids());

    let pipeline = host.pipeline().ok_or_else(|| anyhow!("Pipeline was not created"))?;
    let (device, queue) = (host.device(), host.queue());

    if let Some(stats) = last.as_ref().and_then(FrameOutcome::stats) {
        println!(
            "Frame {}: {} draws, {} placed, {} dropped, shelf height {}",
            stats.frame, stats.draws, stats.placed, stats.dropped, stats.shelf_height
        );
    }
    for (id, reason) in &pipeline.layout().dropped {
        log::warn!("Object {} dropped from the atlas: {:?}", id.0, reason);
    }

    let atlas = pipeline.atlas_texture();
    let atlas_pixels = readback::read_rgba8(device, queue, atlas)?;
    save_rgba8(out, &atlas_pixels, atlas.width(), atlas.height())?;
    println!("Atlas written to {:?}", out);

    if let Some(dir) = &options.dump_dir {
        std::fs::create_dir_all(dir).with_context(|| format!("Failed to create {:?}", dir))?;

        if let (Some(targets), Some(color)) = (pipeline.identification_targets(), pipeline.color_target()) {
            let (width, height) = targets.size();

            let ids = readback::read_float(device, queue, &targets.object_id)?;
            let max_id = pipeline.arena().max_id().max(1) as f32;
            save_rgba8(&dir.join("object_id.png"), &readback::grey_rgba8(&ids, 0.0, max_id), width, height)?;

            let depth = readback::read_float(device, queue, &targets.linearized_depth)?;
            save_rgba8(&dir.join("depth.png"), &readback::grey_rgba8(&depth, 0.0, 1.0), width, height)?;

            let colors = readback::read_rgba8(device, queue, &color.texture)?;
            save_rgba8(&dir.join("color.png"), &colors, width, height)?;
        } else {
            log::warn!("No frame was rendered, intermediate buffers not written");
        }

        if let Some(name) = &options.preview {
            render_preview(&mut host, name, (options.width, options.height), &dir.join("preview.png"))?;
        }
        println!("Intermediate buffers written to {:?}", dir);
    } else if options.preview.is_some() {
        log::warn!("--preview needs --dump-dir, preview not written");
    }

    Ok(())
}

fn render_preview(host: &mut AtlasHost, name: &str, size: (u32, u32), path: &Path) -> Result<()> {
    const PREVIEW_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

    let texture = host.device().create_texture(&wgpu::TextureDescriptor {
        label: Some("Preview Texture"),
        size: wgpu::Extent3d { width: size.0, height: size.1, depth_or_array_layers: 1 },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: PREVIEW_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
        view_formats: &[],
    });
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

    let mut encoder = host.device().create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("Preview Encoder"),
    });
    {
        // Clear to black; the preview quad may not cover the whole target
        let _clear = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Preview Clear Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
    }
    if !host.draw_debug(&mut encoder, name, &view, PREVIEW_FORMAT, size) {
        let mut known: Vec<_> = host
            .pipeline()
            .map(|pipeline| pipeline.registry().names().collect())
            .unwrap_or_default();
        known.sort_unstable();
        println!("Unknown debug texture '{}' (available: {})", name, known.join(", "));
    }
    host.queue().submit(Some(encoder.finish()));

    let pixels = readback::read_rgba8(host.device(), host.queue(), &texture)?;
    save_rgba8(path, &pixels, size.0, size.1)
}

fn print_layout(scene_path: &Path, config_path: Option<&Path>) -> Result<()> {
    let config = load_config(config_path)?;
    let (_, scene) = load_scene(scene_path)?;

    let mut arena = ObjectArena::new();
    let objects = arena.sync(&scene, 1);
    let layout = solve_layout(&objects.layout_requests, &LayoutParams::from(&config));

    let name_of = |id: crate::objects::ObjectId| {
        arena
            .get(id)
            .and_then(|record| scene.get(record.key))
            .map_or("?", |entry| entry.name.as_str())
    };

    println!(
        "Atlas {}x{}, {} requests, {} placed, shelf height {}",
        config.atlas_width,
        config.atlas_height,
        objects.layout_requests.len(),
        layout.placed.len(),
        layout.shelf_height
    );
    for (id, cell) in layout.cells.iter() {
        println!(
            "  #{:<4} {:<24} x={:<5} y={:<5} {}x{}",
            id.0,
            name_of(id),
            cell.x,
            cell.y,
            cell.width,
            cell.height
        );
    }
    for (id, reason) in &layout.dropped {
        println!("  #{:<4} {:<24} dropped: {:?}", id.0, name_of(*id), reason);
    }
    Ok(())
}
