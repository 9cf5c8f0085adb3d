//! Shelf packing of per-object cells into the atlas.
//!
//! The layout is rebuilt from scratch every frame. Objects are placed strictly
//! in ascending id order, left to right in rows ("shelves"). A row ends when
//! the next cell would cross the right edge of the atlas; the next row starts at
//! the bottom of the tallest cell placed so far. Packing stops once a new row
//! would start at or below the bottom edge of the atlas.

use bytemuck::{Pod, Zeroable};

use crate::objects::ObjectId;

/// Requested cell size for one enabled object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutRequest {
    pub id: ObjectId,
    pub width: u32,
    pub height: u32,
}

/// A placed rectangle in atlas pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct CellViewport {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl CellViewport {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    /// An empty cell means "not in the atlas this frame".
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }
}

/// GPU form of a [`CellViewport`], one per table slot.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct GpuCell {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl From<CellViewport> for GpuCell {
    fn from(cell: CellViewport) -> Self {
        Self {
            x: cell.x as f32,
            y: cell.y as f32,
            width: cell.width as f32,
            height: cell.height as f32,
        }
    }
}

/// Dense table of cells indexed by object id. Slot 0 is always empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellTable {
    cells: Vec<CellViewport>,
}

impl CellTable {
    pub fn new(capacity: u32) -> Self {
        Self {
            cells: vec![CellViewport::default(); capacity.max(1) as usize],
        }
    }

    pub fn capacity(&self) -> u32 {
        self.cells.len() as u32
    }

    /// Cell for `id`, or `None` if the object is not in the atlas this frame.
    pub fn get(&self, id: ObjectId) -> Option<CellViewport> {
        self.cells.get(id.index()).copied().filter(|c| !c.is_empty())
    }

    /// Lookup used by the scatter pass: out-of-range ids are clamped to the
    /// last slot instead of failing.
    pub fn get_clamped(&self, id: u32) -> CellViewport {
        let index = (id as usize).min(self.cells.len() - 1);
        self.cells[index]
    }

    fn set(&mut self, id: ObjectId, cell: CellViewport) {
        self.cells[id.index()] = cell;
    }

    pub fn iter(&self) -> impl Iterator<Item = (ObjectId, CellViewport)> + '_ {
        self.cells
            .iter()
            .enumerate()
            .filter(|(_, c)| !c.is_empty())
            .map(|(i, c)| (ObjectId(i as u32), *c))
    }

    pub fn to_gpu(&self) -> Vec<GpuCell> {
        self.cells.iter().map(|c| GpuCell::from(*c)).collect()
    }
}

/// Why an object did not get a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Id does not fit in the cell table.
    TableCapacity,
    /// Packing ran past the bottom of the atlas.
    AtlasFull,
    /// Requested size exceeds the atlas in at least one dimension.
    Oversized,
}

/// Result of one layout solve.
#[derive(Debug, Clone)]
pub struct AtlasLayout {
    pub cells: CellTable,
    pub placed: Vec<ObjectId>,
    pub dropped: Vec<(ObjectId, DropReason)>,
    /// Bottom of the tallest cell placed so far.
    pub shelf_height: u32,
}

impl AtlasLayout {
    pub fn empty(capacity: u32) -> Self {
        Self {
            cells: CellTable::new(capacity),
            placed: Vec::new(),
            dropped: Vec::new(),
            shelf_height: 0,
        }
    }
}

/// Packing parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutParams {
    pub atlas_width: u32,
    pub atlas_height: u32,
    pub cell_capacity: u32,
    pub reject_oversized: bool,
}

impl From<&crate::config::PipelineConfig> for LayoutParams {
    fn from(config: &crate::config::PipelineConfig) -> Self {
        Self {
            atlas_width: config.atlas_width,
            atlas_height: config.atlas_height,
            cell_capacity: config.cell_capacity,
            reject_oversized: config.reject_oversized,
        }
    }
}

/// Pack `requests` into the atlas.
///
/// `requests` must be sorted by ascending id (as produced by
/// `ObjectArena::sync`); they are placed in the order given.
pub fn solve_layout(requests: &[LayoutRequest], params: &LayoutParams) -> AtlasLayout {
    let mut layout = AtlasLayout::empty(params.cell_capacity);
    let (mut x, mut y) = (0u32, 0u32);
    let mut shelf_height = 0u32;

    for (index, request) in requests.iter().enumerate() {
        debug_assert!(index == 0 || requests[index - 1].id < request.id);

        if request.id.0 == 0 || request.id.0 >= params.cell_capacity {
            log::warn!(
                "Object {} exceeds cell table capacity {}, dropped from atlas",
                request.id.0,
                params.cell_capacity
            );
            layout.dropped.push((request.id, DropReason::TableCapacity));
            continue;
        }

        if params.reject_oversized
            && (request.width > params.atlas_width || request.height > params.atlas_height)
        {
            log::warn!(
                "Object {} requests {}x{}, larger than the {}x{} atlas; dropped",
                request.id.0,
                request.width,
                request.height,
                params.atlas_width,
                params.atlas_height
            );
            layout.dropped.push((request.id, DropReason::Oversized));
            continue;
        }

        if x + request.width > params.atlas_width {
            x = 0;
            y = shelf_height;
        }

        if y >= params.atlas_height {
            let remaining = &requests[index..];
            log::warn!(
                "Atlas {}x{} is full, {} object(s) dropped this frame",
                params.atlas_width,
                params.atlas_height,
                remaining.len()
            );
            layout
                .dropped
                .extend(remaining.iter().map(|r| (r.id, DropReason::AtlasFull)));
            break;
        }

        let cell = CellViewport::new(x, y, request.width, request.height);
        layout.cells.set(request.id, cell);
        layout.placed.push(request.id);

        x = cell.right();
        shelf_height = shelf_height.max(cell.bottom());
    }

    layout.shelf_height = shelf_height;
    layout
}

#[cfg(test)]
mod tests {
    use super::*;

    fn overlaps(a: &CellViewport, b: &CellViewport) -> bool {
        a.x < b.right() && b.x < a.right() && a.y < b.bottom() && b.y < a.bottom()
    }

    fn params(width: u32, height: u32) -> LayoutParams {
        LayoutParams {
            atlas_width: width,
            atlas_height: height,
            cell_capacity: 256,
            reject_oversized: true,
        }
    }

    fn request(id: u32, width: u32, height: u32) -> LayoutRequest {
        LayoutRequest { id: ObjectId(id), width, height }
    }

    #[test]
    fn test_two_objects_share_a_shelf() {
        let layout = solve_layout(&[request(1, 64, 64), request(2, 64, 128)], &params(256, 256));

        assert_eq!(layout.cells.get(ObjectId(1)), Some(CellViewport::new(0, 0, 64, 64)));
        assert_eq!(layout.cells.get(ObjectId(2)), Some(CellViewport::new(64, 0, 64, 128)));
        assert_eq!(layout.shelf_height, 128);
        assert!(layout.dropped.is_empty());
    }

    #[test]
    fn test_wrap_and_drop_when_full() {
        let requests = [request(1, 200, 200), request(2, 200, 200), request(3, 200, 200)];
        let layout = solve_layout(&requests, &params(256, 256));

        assert_eq!(layout.cells.get(ObjectId(1)), Some(CellViewport::new(0, 0, 200, 200)));
        // Second row starts at the bottom of the first; it overhangs the atlas
        // and the scatter pass clips it.
        assert_eq!(layout.cells.get(ObjectId(2)), Some(CellViewport::new(0, 200, 200, 200)));
        assert_eq!(layout.cells.get(ObjectId(3)), None);
        assert_eq!(layout.dropped, vec![(ObjectId(3), DropReason::AtlasFull)]);
    }

    #[test]
    fn test_empty_input() {
        let layout = solve_layout(&[], &params(256, 256));
        assert!(layout.placed.is_empty());
        assert_eq!(layout.cells.iter().count(), 0);
        assert_eq!(layout.shelf_height, 0);
    }

    #[test]
    fn test_deterministic() {
        let requests: Vec<_> = (1..40).map(|i| request(i, 8 + (i * 13) % 90, 8 + (i * 7) % 70)).collect();
        let a = solve_layout(&requests, &params(512, 512));
        let b = solve_layout(&requests, &params(512, 512));
        assert_eq!(a.cells, b.cells);
        assert_eq!(a.dropped, b.dropped);
    }

    #[test]
    fn test_non_overlapping_within_bounds() {
        // 24 cells of at most 64x64 in a 512x512 atlas: total area fits and
        // every row holds at least 8 cells.
        let requests: Vec<_> = (1..25).map(|i| request(i, 16 + (i * 11) % 49, 16 + (i * 5) % 49)).collect();
        let layout = solve_layout(&requests, &params(512, 512));
        assert_eq!(layout.placed.len(), requests.len());

        let cells: Vec<_> = layout.cells.iter().map(|(_, c)| c).collect();
        for (i, a) in cells.iter().enumerate() {
            assert!(a.right() <= 512 && a.bottom() <= 512, "{:?} out of bounds", a);
            for b in &cells[i + 1..] {
                assert!(!overlaps(a, b), "{:?} overlaps {:?}", a, b);
            }
        }
    }

    #[test]
    fn test_table_capacity() {
        let mut p = params(1024, 1024);
        p.cell_capacity = 3;
        let layout = solve_layout(&[request(1, 8, 8), request(2, 8, 8), request(3, 8, 8)], &p);

        assert_eq!(layout.placed, vec![ObjectId(1), ObjectId(2)]);
        assert_eq!(layout.dropped, vec![(ObjectId(3), DropReason::TableCapacity)]);
        assert_eq!(layout.cells.capacity(), 3);
    }

    #[test]
    fn test_oversized_rejected() {
        let layout = solve_layout(&[request(1, 300, 16), request(2, 32, 32)], &params(256, 256));
        assert_eq!(layout.dropped, vec![(ObjectId(1), DropReason::Oversized)]);
        assert_eq!(layout.cells.get(ObjectId(2)), Some(CellViewport::new(0, 0, 32, 32)));
    }

    #[test]
    fn test_oversized_placed_when_allowed() {
        let mut p = params(256, 256);
        p.reject_oversized = false;
        let layout = solve_layout(&[request(1, 300, 16)], &p);
        assert_eq!(layout.cells.get(ObjectId(1)), Some(CellViewport::new(0, 0, 300, 16)));
    }

    #[test]
    fn test_clamped_lookup() {
        let mut p = params(256, 256);
        p.cell_capacity = 4;
        let layout = solve_layout(&[request(3, 10, 10)], &p);
        assert_eq!(layout.cells.get_clamped(999), CellViewport::new(0, 0, 10, 10));
        assert!(layout.cells.get_clamped(0).is_empty());
    }
}
