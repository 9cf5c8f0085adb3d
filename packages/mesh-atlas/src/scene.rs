//! Scene provider contract and an in-memory scene.
//!
//! The pipeline does not own scene data. Each frame it asks a [`SceneSource`]
//! for the mesh-bearing objects and reads their visibility, atlas settings,
//! world transform and mesh. [`Scene`] is the in-memory implementation used by
//! the command line tool and the tests.

use std::collections::HashMap;

use crate::mesh_asset::{MeshAsset, MeshAssetRegistry, MeshId};
use crate::settings::ObjectSettings;

/// Stable host-side identity of a scene object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey(pub u64);

/// Transform component for scene objects.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub position: glam::Vec3,
    /// Euler angles in radians, applied in XYZ order.
    pub rotation: glam::Vec3,
    pub scale: glam::Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: glam::Vec3::ZERO,
            rotation: glam::Vec3::ZERO,
            scale: glam::Vec3::ONE,
        }
    }
}

impl Transform {
    /// Model = Translation * Rotation * Scale
    pub fn matrix(&self) -> glam::Mat4 {
        let rotation = glam::Quat::from_euler(
            glam::EulerRot::XYZ,
            self.rotation.x,
            self.rotation.y,
            self.rotation.z,
        );
        glam::Mat4::from_scale_rotation_translation(self.scale, rotation, self.position)
    }
}

/// A frame-time view of one mesh-bearing object.
#[derive(Debug, Clone, Copy)]
pub struct SceneObject<'a> {
    pub key: ObjectKey,
    pub visible: bool,
    pub settings: &'a ObjectSettings,
    pub world: glam::Mat4,
    pub mesh: MeshId,
    pub color: [f32; 4],
}

/// Supplies the objects to render each frame.
pub trait SceneSource {
    /// All mesh-bearing objects, visible or not.
    fn objects(&self) -> Vec<SceneObject<'_>>;

    /// Geometry for a mesh referenced by an object.
    fn mesh(&self, id: MeshId) -> Option<&MeshAsset>;
}

/// An object stored in a [`Scene`].
#[derive(Debug, Clone)]
pub struct SceneEntry {
    pub name: String,
    pub mesh: MeshId,
    pub transform: Transform,
    pub color: [f32; 4],
    pub visible: bool,
    pub settings: ObjectSettings,
}

impl SceneEntry {
    pub fn new(name: &str, mesh: MeshId) -> Self {
        Self {
            name: name.to_string(),
            mesh,
            transform: Transform::default(),
            color: [1.0, 1.0, 1.0, 1.0],
            visible: true,
            settings: ObjectSettings::default(),
        }
    }
}

/// In-memory scene: objects plus the meshes they reference.
#[derive(Debug, Default)]
pub struct Scene {
    pub meshes: MeshAssetRegistry,
    entries: HashMap<ObjectKey, SceneEntry>,
    /// Insertion order, used as iteration order.
    order: Vec<ObjectKey>,
    next_key: u64,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, entry: SceneEntry) -> ObjectKey {
        self.next_key += 1;
        let key = ObjectKey(self.next_key);
        self.entries.insert(key, entry);
        self.order.push(key);
        key
    }

    pub fn remove(&mut self, key: ObjectKey) -> bool {
        self.order.retain(|k| *k != key);
        self.entries.remove(&key).is_some()
    }

    pub fn get(&self, key: ObjectKey) -> Option<&SceneEntry> {
        self.entries.get(&key)
    }

    pub fn get_mut(&mut self, key: ObjectKey) -> Option<&mut SceneEntry> {
        self.entries.get_mut(&key)
    }

    /// Find an object by name.
    pub fn find(&self, name: &str) -> Option<ObjectKey> {
        self.order
            .iter()
            .copied()
            .find(|key| self.entries.get(key).is_some_and(|e| e.name == name))
    }

    pub fn entries(&self) -> impl Iterator<Item = (ObjectKey, &SceneEntry)> {
        self.order.iter().filter_map(|&key| self.entries.get(&key).map(|e| (key, e)))
    }

    /// Clear the settings dirty flag of each listed object.
    pub fn acknowledge(&mut self, keys: &[ObjectKey]) {
        for key in keys {
            if let Some(entry) = self.entries.get_mut(key) {
                entry.settings.clear_resolution_dirty();
            }
        }
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

impl SceneSource for Scene {
    fn objects(&self) -> Vec<SceneObject<'_>> {
        self.entries()
            .map(|(key, entry)| SceneObject {
                key,
                visible: entry.visible,
                settings: &entry.settings,
                world: entry.transform.matrix(),
                mesh: entry.mesh,
                color: entry.color,
            })
            .collect()
    }

    fn mesh(&self, id: MeshId) -> Option<&MeshAsset> {
        self.meshes.get(id).map(|asset| asset.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh_asset::Primitive;

    #[test]
    fn test_transform_matrix_order() {
        let transform = Transform {
            position: glam::Vec3::new(1.0, 2.0, 3.0),
            rotation: glam::Vec3::new(0.0, std::f32::consts::FRAC_PI_2, 0.0),
            scale: glam::Vec3::splat(2.0),
        };
        let p = transform.matrix().transform_point3(glam::Vec3::X);
        // Scale to (2,0,0), rotate 90 degrees about Y to (0,0,-2), then translate
        assert!((p - glam::Vec3::new(1.0, 2.0, 1.0)).length() < 1e-5);
    }

    #[test]
    fn test_scene_iteration_order_and_removal() {
        let mut scene = Scene::new();
        let mesh = scene.meshes.insert_primitive(Primitive::Cube);
        let a = scene.add(SceneEntry::new("a", mesh));
        let b = scene.add(SceneEntry::new("b", mesh));
        let c = scene.add(SceneEntry::new("c", mesh));

        let keys: Vec<_> = scene.objects().iter().map(|o| o.key).collect();
        assert_eq!(keys, vec![a, b, c]);

        assert!(scene.remove(b));
        assert!(!scene.remove(b));
        assert_eq!(scene.find("c"), Some(c));
        assert_eq!(scene.find("b"), None);
        assert_eq!(scene.len(), 2);
    }

    #[test]
    fn test_acknowledge_clears_dirty_flags() {
        let mut scene = Scene::new();
        let mesh = scene.meshes.insert_primitive(Primitive::Cube);
        let a = scene.add(SceneEntry::new("a", mesh));
        let b = scene.add(SceneEntry::new("b", mesh));

        scene.acknowledge(&[a, ObjectKey(999)]);
        assert!(!scene.get(a).unwrap().settings.is_resolution_dirty());
        assert!(scene.get(b).unwrap().settings.is_resolution_dirty());
    }

    #[test]
    fn test_scene_source_resolves_meshes() {
        let mut scene = Scene::new();
        let mesh = scene.meshes.insert_primitive(Primitive::Plane);
        scene.add(SceneEntry::new("floor", mesh));

        let objects = scene.objects();
        assert_eq!(objects.len(), 1);
        assert!(objects[0].visible);
        assert!(!objects[0].settings.enabled());
        assert_eq!(scene.mesh(objects[0].mesh).unwrap().triangle_count(), 2);
    }
}
