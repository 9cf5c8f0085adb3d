//! CPU versions of the scatter-accumulate and merge kernels.
//!
//! These follow `scatter.wgsl` and `merge.wgsl` step for step, using the same
//! f32 arithmetic for the pixel-to-atlas mapping. Tests use them to check the
//! accumulation properties without an adapter, and to compare against atlases
//! read back from the GPU. Tiles are processed on the rayon pool; tasks only
//! communicate through atomic adds.

use std::sync::atomic::{AtomicU32, Ordering};

use rayon::prelude::*;

use crate::layout::{CellTable, CellViewport};

/// Source pixels covered by one scatter task along each axis.
pub const TILE_SIZE: u32 = 4;

/// Identification ids and viewport colours for one frame, row-major.
#[derive(Debug, Clone)]
pub struct SourceFrame {
    pub width: u32,
    pub height: u32,
    pub ids: Vec<f32>,
    pub colors: Vec<[f32; 4]>,
}

impl SourceFrame {
    pub fn new(width: u32, height: u32) -> Self {
        let len = (width * height) as usize;
        Self {
            width,
            height,
            ids: vec![0.0; len],
            colors: vec![[0.0; 4]; len],
        }
    }

    pub fn set(&mut self, x: u32, y: u32, id: u32, color: [f32; 4]) {
        let index = (y * self.width + x) as usize;
        self.ids[index] = id as f32;
        self.colors[index] = color;
    }

    fn index(&self, x: u32, y: u32) -> usize {
        (y * self.width + x) as usize
    }
}

/// Iteration order of scatter tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOrder {
    Forward,
    Reversed,
}

/// Counters from one scatter run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScatterStats {
    pub samples: u64,
    pub background: u64,
    /// Pixels whose object has no cell, or whose target lies outside the atlas.
    pub unmapped: u64,
}

impl ScatterStats {
    fn merge(self, other: Self) -> Self {
        Self {
            samples: self.samples + other.samples,
            background: self.background + other.background,
            unmapped: self.unmapped + other.unmapped,
        }
    }
}

/// Quantize a colour channel to the 0..=255 accumulator range.
pub fn quantize_channel(value: f32) -> u32 {
    (value.clamp(0.0, 1.0) * 255.0).round() as u32
}

/// Recover an object id from its float encoding.
pub fn decode_id(value: f32) -> u32 {
    value.round().max(0.0) as u32
}

/// Map source pixel (x, y) into `cell` by linear interpolation.
pub fn map_to_cell(x: u32, y: u32, viewport_width: u32, viewport_height: u32, cell: &CellViewport) -> (u32, u32) {
    let atlas_x = (x as f32 / viewport_width as f32 * cell.width as f32 + cell.x as f32).floor();
    let atlas_y = (y as f32 / viewport_height as f32 * cell.height as f32 + cell.y as f32).floor();
    (atlas_x as u32, atlas_y as u32)
}

/// Per-pixel (sumR, sumG, sumB, sampleCount) accumulators.
#[derive(Debug)]
pub struct AtlasAccumulator {
    width: u32,
    height: u32,
    cells: Vec<[AtomicU32; 4]>,
}

impl AtlasAccumulator {
    pub fn new(width: u32, height: u32) -> Self {
        let cells = (0..(width * height) as usize).map(|_| Default::default()).collect();
        Self { width, height, cells }
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Current (sumR, sumG, sumB, count) of an atlas pixel.
    pub fn load(&self, x: u32, y: u32) -> [u32; 4] {
        let cell = &self.cells[(y * self.width + x) as usize];
        std::array::from_fn(|i| cell[i].load(Ordering::Relaxed))
    }

    pub fn is_clear(&self) -> bool {
        self.cells
            .par_iter()
            .all(|cell| cell.iter().all(|c| c.load(Ordering::Relaxed) == 0))
    }

    /// Scatter every identified source pixel into its object's cell.
    pub fn scatter(&self, frame: &SourceFrame, cells: &CellTable, order: TaskOrder) -> ScatterStats {
        let tiles_x = frame.width.div_ceil(TILE_SIZE);
        let tiles_y = frame.height.div_ceil(TILE_SIZE);
        let tile_count = tiles_x * tiles_y;

        let run = |tile: u32| self.scatter_tile(frame, cells, tile % tiles_x, tile / tiles_x, order);

        match order {
            TaskOrder::Forward => (0..tile_count).into_par_iter().map(run).reduce(ScatterStats::default, ScatterStats::merge),
            TaskOrder::Reversed => (0..tile_count)
                .into_par_iter()
                .rev()
                .map(run)
                .reduce(ScatterStats::default, ScatterStats::merge),
        }
    }

    fn scatter_tile(&self, frame: &SourceFrame, cells: &CellTable, tile_x: u32, tile_y: u32, order: TaskOrder) -> ScatterStats {
        let mut stats = ScatterStats::default();
        let mut pixels: Vec<(u32, u32)> = (0..TILE_SIZE * TILE_SIZE)
            .map(|i| (tile_x * TILE_SIZE + i % TILE_SIZE, tile_y * TILE_SIZE + i / TILE_SIZE))
            .filter(|&(x, y)| x < frame.width && y < frame.height)
            .collect();
        if order == TaskOrder::Reversed {
            pixels.reverse();
        }

        for (x, y) in pixels {
            let index = frame.index(x, y);
            let id = decode_id(frame.ids[index]);
            if id == 0 {
                stats.background += 1;
                continue;
            }

            let cell = cells.get_clamped(id);
            if cell.is_empty() {
                stats.unmapped += 1;
                continue;
            }

            let (atlas_x, atlas_y) = map_to_cell(x, y, frame.width, frame.height, &cell);
            if atlas_x >= self.width || atlas_y >= self.height {
                stats.unmapped += 1;
                continue;
            }

            let color = frame.colors[index];
            let target = &self.cells[(atlas_y * self.width + atlas_x) as usize];
            for channel in 0..3 {
                target[channel].fetch_add(quantize_channel(color[channel]), Ordering::Relaxed);
            }
            target[3].fetch_add(1, Ordering::Relaxed);
            stats.samples += 1;
        }

        stats
    }

    /// Resolve the accumulated sums into colours and zero every accumulator.
    pub fn merge(&self) -> AtlasImage {
        let pixels = self
            .cells
            .par_iter()
            .map(|cell| {
                let sums: [u32; 4] = std::array::from_fn(|i| cell[i].swap(0, Ordering::Relaxed));
                merge_texel(sums)
            })
            .collect();

        AtlasImage { width: self.width, height: self.height, pixels }
    }
}

/// Average one accumulator cell. Unsampled cells are transparent black.
pub fn merge_texel([r, g, b, count]: [u32; 4]) -> [f32; 4] {
    if count == 0 {
        return [0.0; 4];
    }
    let denominator = count as f32 * 255.0;
    [r as f32 / denominator, g as f32 / denominator, b as f32 / denominator, 1.0]
}

/// Merged atlas colours, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct AtlasImage {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<[f32; 4]>,
}

impl AtlasImage {
    pub fn get(&self, x: u32, y: u32) -> [f32; 4] {
        self.pixels[(y * self.width + x) as usize]
    }

    /// 8-bit RGBA, matching the `Rgba8Unorm` atlas texture.
    pub fn to_rgba8(&self) -> Vec<u8> {
        self.pixels
            .iter()
            .flat_map(|p| p.map(|c| (c.clamp(0.0, 1.0) * 255.0).round() as u8))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{solve_layout, LayoutParams, LayoutRequest};
    use crate::objects::ObjectId;

    fn params() -> LayoutParams {
        LayoutParams { atlas_width: 64, atlas_height: 64, cell_capacity: 8, reject_oversized: true }
    }

    /// A 32x16 viewport: left half object 1, right half object 2, a band of
    /// background on the last row.
    fn sample_frame() -> SourceFrame {
        let mut frame = SourceFrame::new(32, 16);
        for y in 0..15 {
            for x in 0..32 {
                let id = if x < 16 { 1 } else { 2 };
                let shade = (x * 8 + y) as f32 / 300.0;
                frame.set(x, y, id, [shade, 1.0 - shade, 0.5, 1.0]);
            }
        }
        frame
    }

    fn sample_cells() -> CellTable {
        let requests = [
            LayoutRequest { id: ObjectId(1), width: 8, height: 8 },
            LayoutRequest { id: ObjectId(2), width: 16, height: 4 },
        ];
        solve_layout(&requests, &params()).cells
    }

    fn snapshot(acc: &AtlasAccumulator) -> Vec<[u32; 4]> {
        let (w, h) = acc.size();
        (0..h).flat_map(|y| (0..w).map(move |x| (x, y))).map(|(x, y)| acc.load(x, y)).collect()
    }

    #[test]
    fn test_background_never_contributes() {
        let mut frame = SourceFrame::new(8, 8);
        frame.colors.fill([1.0, 1.0, 1.0, 1.0]);
        let acc = AtlasAccumulator::new(64, 64);

        let stats = acc.scatter(&frame, &sample_cells(), TaskOrder::Forward);
        assert_eq!(stats.samples, 0);
        assert_eq!(stats.background, 64);
        assert!(acc.is_clear());
    }

    #[test]
    fn test_sample_counts_match_mapping() {
        let frame = sample_frame();
        let cells = sample_cells();
        let acc = AtlasAccumulator::new(64, 64);
        let stats = acc.scatter(&frame, &cells, TaskOrder::Forward);

        let mut expected = vec![0u32; 64 * 64];
        for y in 0..frame.height {
            for x in 0..frame.width {
                let id = decode_id(frame.ids[frame.index(x, y)]);
                if id == 0 {
                    continue;
                }
                let (ax, ay) = map_to_cell(x, y, frame.width, frame.height, &cells.get_clamped(id));
                expected[(ay * 64 + ax) as usize] += 1;
            }
        }

        let counts: Vec<u32> = snapshot(&acc).iter().map(|c| c[3]).collect();
        assert_eq!(counts, expected);
        assert_eq!(stats.samples, 32 * 15);
        assert_eq!(stats.background, 32);
    }

    #[test]
    fn test_task_order_does_not_change_sums() {
        let frame = sample_frame();
        let cells = sample_cells();

        let forward = AtlasAccumulator::new(64, 64);
        forward.scatter(&frame, &cells, TaskOrder::Forward);
        let reversed = AtlasAccumulator::new(64, 64);
        reversed.scatter(&frame, &cells, TaskOrder::Reversed);

        assert_eq!(snapshot(&forward), snapshot(&reversed));
    }

    #[test]
    fn test_merge_range_and_empty_cells() {
        let acc = AtlasAccumulator::new(64, 64);
        acc.scatter(&sample_frame(), &sample_cells(), TaskOrder::Forward);
        let image = acc.merge();

        assert!(image.pixels.iter().flatten().all(|c| (0.0..=1.0).contains(c)));
        // Far corner lies outside every cell
        assert_eq!(image.get(63, 63), [0.0, 0.0, 0.0, 0.0]);
        assert_eq!(image.get(0, 0)[3], 1.0);
        assert!(acc.is_clear());
    }

    #[test]
    fn test_merge_averages() {
        assert_eq!(merge_texel([255 * 3, 0, 255, 3]), [1.0, 0.0, 1.0 / 3.0, 1.0]);
        assert_eq!(merge_texel([0, 0, 0, 0]), [0.0; 4]);
    }

    #[test]
    fn test_repeated_frames_are_identical() {
        let frame = sample_frame();
        let cells = sample_cells();
        let acc = AtlasAccumulator::new(64, 64);

        acc.scatter(&frame, &cells, TaskOrder::Forward);
        let first = acc.merge();
        acc.scatter(&frame, &cells, TaskOrder::Forward);
        let second = acc.merge();

        assert_eq!(first.to_rgba8(), second.to_rgba8());
        assert_eq!(first, second);
    }

    #[test]
    fn test_out_of_range_id_is_clamped() {
        let requests = [LayoutRequest { id: ObjectId(7), width: 4, height: 4 }];
        let cells = solve_layout(&requests, &params()).cells;

        let mut frame = SourceFrame::new(4, 4);
        frame.set(0, 0, 1000, [1.0, 0.0, 0.0, 1.0]);
        let acc = AtlasAccumulator::new(64, 64);
        let stats = acc.scatter(&frame, &cells, TaskOrder::Forward);

        assert_eq!(stats.samples, 1);
        assert_eq!(acc.load(0, 0), [255, 0, 0, 1]);
    }

    #[test]
    fn test_overhanging_cell_is_clipped() {
        let mut frame = SourceFrame::new(4, 4);
        for y in 0..4 {
            for x in 0..4 {
                frame.set(x, y, 1, [0.5; 4]);
            }
        }
        let requests = [LayoutRequest { id: ObjectId(1), width: 8, height: 8 }];
        let mut p = params();
        p.atlas_width = 4;
        p.atlas_height = 4;
        p.reject_oversized = false;
        let cells = solve_layout(&requests, &p).cells;

        let acc = AtlasAccumulator::new(4, 4);
        let stats = acc.scatter(&frame, &cells, TaskOrder::Forward);
        assert_eq!(stats.samples, 4);
        assert_eq!(stats.unmapped, 12);
    }

    #[test]
    fn test_quantize_and_decode() {
        assert_eq!(quantize_channel(0.5), 128);
        assert_eq!(quantize_channel(2.0), 255);
        assert_eq!(decode_id(2.9999), 3);
    }
}
