//! End-to-end checks of the CPU path: scene description, object ids, layout,
//! then the reference scatter and merge kernels.
//!
//! Run with: cargo test --test atlas_scenarios

use std::path::Path;

use mesh_atlas::accumulate::{AtlasAccumulator, SourceFrame, TaskOrder};
use mesh_atlas::layout::{solve_layout, CellViewport, DropReason, LayoutParams};
use mesh_atlas::objects::{ObjectArena, ObjectId};
use mesh_atlas::scene_file::SceneDescription;

fn params(width: u32, height: u32) -> LayoutParams {
    LayoutParams {
        atlas_width: width,
        atlas_height: height,
        cell_capacity: 16,
        reject_oversized: true,
    }
}

fn scene_json(resolutions: &[(u32, u32)]) -> String {
    let objects: Vec<String> = resolutions
        .iter()
        .enumerate()
        .map(|(i, (w, h))| {
            format!(
                r#"{{ "name": "obj{}", "mesh": {{ "primitive": "cube" }}, "enabled": true,
                     "resolution": {{ "width": {}, "height": {} }} }}"#,
                i, w, h
            )
        })
        .collect();
    format!(r#"{{ "objects": [{}] }}"#, objects.join(","))
}

#[test]
fn two_objects_share_the_first_shelf() {
    let description = SceneDescription::from_json(&scene_json(&[(64, 64), (64, 128)])).unwrap();
    let scene = description.build(Path::new(".")).unwrap();

    let mut arena = ObjectArena::new();
    let objects = arena.sync(&scene, 1);
    let layout = solve_layout(&objects.layout_requests, &params(256, 256));

    assert_eq!(layout.cells.get(ObjectId(1)), Some(CellViewport::new(0, 0, 64, 64)));
    assert_eq!(layout.cells.get(ObjectId(2)), Some(CellViewport::new(64, 0, 64, 128)));
    assert_eq!(layout.shelf_height, 128);
    assert!(layout.dropped.is_empty());
}

#[test]
fn third_large_object_runs_out_of_atlas() {
    let description = SceneDescription::from_json(&scene_json(&[(200, 200); 3])).unwrap();
    let scene = description.build(Path::new(".")).unwrap();

    let mut arena = ObjectArena::new();
    let objects = arena.sync(&scene, 1);
    let layout = solve_layout(&objects.layout_requests, &params(256, 256));

    assert_eq!(layout.cells.get(ObjectId(1)), Some(CellViewport::new(0, 0, 200, 200)));
    assert_eq!(layout.cells.get(ObjectId(2)), Some(CellViewport::new(0, 200, 200, 200)));
    assert_eq!(layout.cells.get(ObjectId(3)), None);
    assert_eq!(layout.dropped, vec![(ObjectId(3), DropReason::AtlasFull)]);
}

#[test]
fn disabled_and_hidden_objects_get_no_cell() {
    let json = r#"{ "objects": [
        { "name": "on", "mesh": { "primitive": "cube" }, "enabled": true },
        { "name": "off", "mesh": { "primitive": "cube" } },
        { "name": "hidden", "mesh": { "primitive": "plane" }, "enabled": true, "visible": false }
    ] }"#;
    let scene = SceneDescription::from_json(json).unwrap().build(Path::new(".")).unwrap();

    let mut arena = ObjectArena::new();
    let objects = arena.sync(&scene, 1);
    assert_eq!(objects.draws.len(), 2);

    let layout = solve_layout(&objects.layout_requests, &params(256, 256));
    assert_eq!(layout.placed, vec![ObjectId(1)]);
    // Default resolution
    assert_eq!(layout.cells.get(ObjectId(1)), Some(CellViewport::new(0, 0, 64, 128)));
}

#[test]
fn full_frame_through_scatter_and_merge() {
    let description = SceneDescription::from_json(&scene_json(&[(8, 8), (8, 8)])).unwrap();
    let scene = description.build(Path::new(".")).unwrap();

    let mut arena = ObjectArena::new();
    let objects = arena.sync(&scene, 1);
    let layout = solve_layout(&objects.layout_requests, &params(32, 32));

    // Left half of a 16x16 viewport is object 1 (red), right half object 2 (blue)
    let mut frame = SourceFrame::new(16, 16);
    for y in 0..16 {
        for x in 0..16 {
            if x < 8 {
                frame.set(x, y, 1, [1.0, 0.0, 0.0, 1.0]);
            } else {
                frame.set(x, y, 2, [0.0, 0.0, 1.0, 1.0]);
            }
        }
    }

    let accumulator = AtlasAccumulator::new(32, 32);
    let stats = accumulator.scatter(&frame, &layout.cells, TaskOrder::Forward);
    assert_eq!(stats.samples, 256);
    assert_eq!(stats.background, 0);

    let image = accumulator.merge();
    assert!(accumulator.is_clear());

    // Object 1 covers the left half of its cell at (0, 0)
    assert_eq!(image.get(0, 0), [1.0, 0.0, 0.0, 1.0]);
    assert_eq!(image.get(7, 0), [0.0, 0.0, 0.0, 0.0]);
    // Object 2 covers the right half of its cell at (8, 0)
    assert_eq!(image.get(12, 7), [0.0, 0.0, 1.0, 1.0]);
    assert_eq!(image.get(8, 0), [0.0, 0.0, 0.0, 0.0]);
    // Outside every cell
    assert_eq!(image.get(20, 20), [0.0, 0.0, 0.0, 0.0]);
}

#[test]
fn background_pixels_never_reach_the_atlas() {
    let description = SceneDescription::from_json(&scene_json(&[(16, 16)])).unwrap();
    let scene = description.build(Path::new(".")).unwrap();

    let mut arena = ObjectArena::new();
    let objects = arena.sync(&scene, 1);
    let layout = solve_layout(&objects.layout_requests, &params(16, 16));

    let mut frame = SourceFrame::new(16, 16);
    for y in 0..16 {
        for x in 0..16 {
            frame.set(x, y, 0, [1.0, 1.0, 1.0, 1.0]);
        }
    }

    let accumulator = AtlasAccumulator::new(16, 16);
    let stats = accumulator.scatter(&frame, &layout.cells, TaskOrder::Reversed);
    assert_eq!(stats.samples, 0);
    assert_eq!(stats.background, 256);
    assert!(accumulator.is_clear());
}
