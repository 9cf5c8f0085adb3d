//! Run the wgpu passes on a real adapter and check them against the CPU
//! kernels. Skipped when no adapter is available.
//!
//! Run with: cargo test --test gpu_frames

use std::path::Path;

use mesh_atlas::accumulate::{AtlasAccumulator, SourceFrame, TaskOrder};
use mesh_atlas::camera::FixedViewport;
use mesh_atlas::config::PipelineConfig;
use mesh_atlas::frame::FrameOutcome;
use mesh_atlas::gpu::readback;
use mesh_atlas::host::AtlasHost;
use mesh_atlas::pipeline::FrameContext;
use mesh_atlas::scene::Scene;
use mesh_atlas::scene_file::SceneDescription;

const VIEWPORT: u32 = 64;

const SCENE: &str = r#"{
    "camera": { "position": [0, 0, 6], "target": [0, 0, 0], "near": 0.5, "far": 20 },
    "objects": [
        { "name": "left", "mesh": { "primitive": "cube" }, "position": [-1.2, 0, 0],
          "color": [1, 0.2, 0.1, 1], "enabled": true,
          "resolution": { "width": 5, "height": 5, "power": true } },
        { "name": "right", "mesh": { "primitive": "sphere" }, "position": [1.2, 0, 0],
          "color": [0.1, 0.4, 1, 1], "enabled": true,
          "resolution": { "width": 4, "height": 5, "power": true } }
    ]
}"#;

fn config() -> PipelineConfig {
    PipelineConfig {
        atlas_width: 64,
        atlas_height: 64,
        cell_capacity: 16,
        ..PipelineConfig::default()
    }
}

fn setup() -> Option<(AtlasHost, Scene, FixedViewport)> {
    let host = match pollster::block_on(AtlasHost::headless(config())) {
        Ok(host) => host,
        Err(e) => {
            eprintln!("skipping GPU test: {:#}", e);
            return None;
        }
    };
    let description = SceneDescription::from_json(SCENE).unwrap();
    let scene = description.build(Path::new(".")).unwrap();
    let viewport = FixedViewport {
        camera: description.camera,
        width: VIEWPORT,
        height: VIEWPORT,
    };
    Some((host, scene, viewport))
}

fn render(host: &mut AtlasHost, scene: &Scene, viewport: &FixedViewport) -> Vec<u8> {
    let outcome = host.render_frame(&FrameContext { scene, viewport });
    assert!(matches!(outcome, FrameOutcome::Rendered(_)), "{:?}", outcome);

    let pipeline = host.pipeline().unwrap();
    readback::read_rgba8(host.device(), host.queue(), pipeline.atlas_texture()).unwrap()
}

#[test]
fn repeated_frames_give_identical_atlases() {
    let Some((mut host, scene, viewport)) = setup() else {
        return;
    };

    let first = render(&mut host, &scene, &viewport);
    let second = render(&mut host, &scene, &viewport);

    assert_eq!(first.len(), 64 * 64 * 4);
    assert!(first.chunks_exact(4).any(|p| p[3] == 255), "atlas is empty");
    assert!(first == second, "atlas changed between identical frames");
}

#[test]
fn gpu_atlas_matches_cpu_kernels() {
    let Some((mut host, scene, viewport)) = setup() else {
        return;
    };
    let gpu_atlas = render(&mut host, &scene, &viewport);

    let pipeline = host.pipeline().unwrap();
    let (device, queue) = (host.device(), host.queue());
    let targets = pipeline.identification_targets().unwrap();
    let ids = readback::read_float(device, queue, &targets.object_id).unwrap();
    let colors = readback::read_rgba8(device, queue, &pipeline.color_target().unwrap().texture).unwrap();

    let mut frame = SourceFrame::new(VIEWPORT, VIEWPORT);
    frame.ids = ids;
    frame.colors = colors
        .chunks_exact(4)
        .map(|p| [p[0], p[1], p[2], p[3]].map(|c| c as f32 / 255.0))
        .collect();
    assert!(frame.ids.iter().any(|&id| id == 1.0));
    assert!(frame.ids.iter().any(|&id| id == 2.0));

    let accumulator = AtlasAccumulator::new(64, 64);
    let stats = accumulator.scatter(&frame, &pipeline.layout().cells, TaskOrder::Reversed);
    assert!(stats.samples > 0);
    let cpu_atlas = accumulator.merge().to_rgba8();

    // Float division on the GPU may round the last bit differently
    for (i, (g, c)) in gpu_atlas.iter().zip(&cpu_atlas).enumerate() {
        assert!(
            g.abs_diff(*c) <= 1,
            "atlas pixel {} channel {}: gpu {} cpu {}",
            i / 4,
            i % 4,
            g,
            c
        );
    }
}

#[test]
fn background_only_frame_leaves_atlas_clear() {
    let Some((mut host, _, viewport)) = setup() else {
        return;
    };
    let empty = Scene::new();

    let atlas = render(&mut host, &empty, &viewport);
    assert!(atlas.iter().all(|&b| b == 0));
}
