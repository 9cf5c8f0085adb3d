//! Object arena: stable integer ids for scene objects.
//!
//! Host objects are identified by an [`ObjectKey`]. The first time a key is
//! observed it receives the next [`ObjectId`] (starting at 1; 0 means "no
//! object"). Ids are never reused within a session, and records are indexed
//! directly by id.

use std::collections::HashMap;

use crate::layout::LayoutRequest;
use crate::mesh_asset::MeshId;
use crate::scene::{ObjectKey, SceneSource};

/// Per-pixel object identifier written by the identification pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(pub u32);

impl ObjectId {
    /// Reserved id for background pixels.
    pub const NONE: ObjectId = ObjectId(0);

    pub fn index(self) -> usize {
        self.0 as usize
    }

    /// Float encoding used in the identification buffer.
    pub fn as_f32(self) -> f32 {
        self.0 as f32
    }
}

/// What the arena remembers about an object.
#[derive(Debug, Clone)]
pub struct ObjectRecord {
    pub key: ObjectKey,
    pub id: ObjectId,
    pub mesh: MeshId,
    pub enabled: bool,
    pub resolution: (u32, u32),
    /// Frame on which the object was last reported by the scene.
    pub last_seen_frame: u64,
}

/// One draw in the identification and colour passes.
#[derive(Debug, Clone, Copy)]
pub struct DrawItem {
    pub id: ObjectId,
    pub mesh: MeshId,
    pub world: glam::Mat4,
    pub color: [f32; 4],
}

/// The arena's view of a single frame.
#[derive(Debug, Default)]
pub struct FrameObjects {
    /// Visible objects in scene order.
    pub draws: Vec<DrawItem>,
    /// Visible, enabled objects in ascending id order.
    pub layout_requests: Vec<LayoutRequest>,
    /// Objects whose settings changed since the host last acknowledged them.
    pub dirty: Vec<ObjectKey>,
}

#[derive(Debug)]
pub struct ObjectArena {
    /// Dense table indexed by id; slot 0 is always empty.
    records: Vec<Option<ObjectRecord>>,
    ids: HashMap<ObjectKey, ObjectId>,
}

impl Default for ObjectArena {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectArena {
    pub fn new() -> Self {
        Self {
            records: vec![None],
            ids: HashMap::new(),
        }
    }

    /// Id for `key`, assigning the next one on first encounter.
    pub fn id_for(&mut self, key: ObjectKey, mesh: MeshId) -> ObjectId {
        if let Some(&id) = self.ids.get(&key) {
            return id;
        }

        let id = ObjectId(self.records.len() as u32);
        self.records.push(Some(ObjectRecord {
            key,
            id,
            mesh,
            enabled: false,
            resolution: (0, 0),
            last_seen_frame: 0,
        }));
        self.ids.insert(key, id);
        log::debug!("Assigned object id {} to {:?}", id.0, key);
        id
    }

    pub fn get(&self, id: ObjectId) -> Option<&ObjectRecord> {
        self.records.get(id.index()).and_then(|r| r.as_ref())
    }

    pub fn lookup(&self, key: ObjectKey) -> Option<ObjectId> {
        self.ids.get(&key).copied()
    }

    /// Highest id handed out so far (0 when empty).
    pub fn max_id(&self) -> u32 {
        (self.records.len() - 1) as u32
    }

    /// Records that were not reported on `frame`.
    pub fn stale(&self, frame: u64) -> impl Iterator<Item = &ObjectRecord> {
        self.records
            .iter()
            .flatten()
            .filter(move |r| r.last_seen_frame != frame)
    }

    /// Keys from `dirty` whose object got a cell in `placed`. Only these may
    /// have their dirty flag cleared.
    pub fn settled(&self, dirty: &[ObjectKey], placed: &[ObjectId]) -> Vec<ObjectKey> {
        placed
            .iter()
            .filter_map(|&id| self.get(id))
            .map(|record| record.key)
            .filter(|key| dirty.contains(key))
            .collect()
    }

    /// Read the scene for `frame`, refresh records and build the frame's draw
    /// list and layout input. Invisible objects get no id until first seen
    /// visible.
    pub fn sync(&mut self, scene: &dyn SceneSource, frame: u64) -> FrameObjects {
        let mut out = FrameObjects::default();

        for object in scene.objects() {
            if object.settings.is_resolution_dirty() {
                out.dirty.push(object.key);
            }
            if !object.visible {
                continue;
            }
            if scene.mesh(object.mesh).is_none() {
                log::warn!("Object {:?} references unknown mesh {:?}, skipping", object.key, object.mesh);
                continue;
            }

            let id = self.id_for(object.key, object.mesh);
            if let Some(record) = self.records[id.index()].as_mut() {
                record.mesh = object.mesh;
                record.enabled = object.settings.enabled();
                record.resolution = object.settings.resolution().pixels();
                record.last_seen_frame = frame;
            }

            out.draws.push(DrawItem {
                id,
                mesh: object.mesh,
                world: object.world,
                color: object.color,
            });

            if object.settings.enabled() {
                let (width, height) = object.settings.resolution().pixels();
                out.layout_requests.push(LayoutRequest { id, width, height });
            }
        }

        out.layout_requests.sort_by_key(|r| r.id);
        out
    }
}
