//! JSON scene descriptions for the command line tool.
//!
//! ```json
//! {
//!   "camera": { "position": [4, 3, 6], "target": [0, 0, 0] },
//!   "objects": [
//!     { "name": "box", "mesh": { "primitive": "cube" }, "enabled": true,
//!       "resolution": { "width": 6, "height": 7, "power": true } },
//!     { "name": "statue", "mesh": { "obj": "statue.obj" }, "position": [2, 0, 0] }
//!   ]
//! }
//! ```
//!
//! Rotations are Euler XYZ in degrees. OBJ paths are relative to the scene file.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

use crate::camera::Camera;
use crate::mesh_asset::{MeshId, Primitive};
use crate::scene::{Scene, SceneEntry, Transform};
use crate::settings::{ObjectSettings, RenderResolution, ResolutionSpec};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MeshSource {
    Primitive(String),
    Obj(PathBuf),
}

fn default_scale() -> [f32; 3] {
    [1.0, 1.0, 1.0]
}

fn default_color() -> [f32; 4] {
    [1.0, 1.0, 1.0, 1.0]
}

fn default_visible() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectDescription {
    pub name: String,
    pub mesh: MeshSource,
    #[serde(default)]
    pub position: [f32; 3],
    /// Euler XYZ, degrees.
    #[serde(default)]
    pub rotation: [f32; 3],
    #[serde(default = "default_scale")]
    pub scale: [f32; 3],
    #[serde(default = "default_color")]
    pub color: [f32; 4],
    #[serde(default = "default_visible")]
    pub visible: bool,
    #[serde(default)]
    pub enabled: bool,
    /// Defaults to 64x128.
    #[serde(default)]
    pub resolution: Option<ResolutionSpec>,
}

impl ObjectDescription {
    fn transform(&self) -> Transform {
        Transform {
            position: glam::Vec3::from(self.position),
            rotation: glam::Vec3::from(self.rotation.map(f32::to_radians)),
            scale: glam::Vec3::from(self.scale),
        }
    }

    fn settings(&self) -> ObjectSettings {
        let resolution = self.resolution.map(RenderResolution::from).unwrap_or_default();
        ObjectSettings::new(self.enabled, resolution)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneDescription {
    #[serde(default)]
    pub camera: Camera,
    #[serde(default)]
    pub objects: Vec<ObjectDescription>,
}

impl SceneDescription {
    pub fn from_file(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read scene file {:?}: {}", path, e))?;
        Self::from_json(&content).map_err(|e| format!("Failed to parse scene file {:?}: {}", path, e))
    }

    pub fn from_json(json: &str) -> Result<Self, String> {
        serde_json::from_str(json).map_err(|e| e.to_string())
    }

    pub fn validate(&self) -> Result<(), String> {
        let camera = &self.camera;
        if !(camera.near > 0.0 && camera.far > camera.near) {
            return Err(format!(
                "Camera clip planes must satisfy 0 < near < far (near {}, far {})",
                camera.near, camera.far
            ));
        }
        if !(camera.fov > 0.0 && camera.fov < 180.0) {
            return Err(format!("Camera fov must be in (0, 180), got {}", camera.fov));
        }

        let mut names = HashSet::new();
        for object in &self.objects {
            if object.name.is_empty() {
                return Err("Object name cannot be empty".to_string());
            }
            if !names.insert(object.name.as_str()) {
                return Err(format!("Duplicate object name '{}'", object.name));
            }
            if let MeshSource::Primitive(name) = &object.mesh {
                if Primitive::from_str(name).is_none() {
                    return Err(format!("Object '{}': unknown primitive '{}'", object.name, name));
                }
            }
            if object.scale.iter().any(|s| *s == 0.0) {
                return Err(format!("Object '{}': scale components must be non-zero", object.name));
            }
        }
        Ok(())
    }

    /// Build the in-memory scene. Primitives and OBJ files are loaded once and
    /// shared between objects that reference them.
    pub fn build(&self, base_dir: &Path) -> Result<Scene> {
        self.validate().map_err(|e| anyhow!("Invalid scene: {}", e))?;

        let mut scene = Scene::new();
        let mut primitives: HashMap<Primitive, MeshId> = HashMap::new();
        let mut obj_files: HashMap<PathBuf, MeshId> = HashMap::new();

        for object in &self.objects {
            let mesh = match &object.mesh {
                MeshSource::Primitive(name) => {
                    let primitive = Primitive::from_str(name)
                        .ok_or_else(|| anyhow!("Unknown primitive '{}'", name))?;
                    *primitives
                        .entry(primitive)
                        .or_insert_with(|| scene.meshes.insert_primitive(primitive))
                }
                MeshSource::Obj(relative) => {
                    let path = base_dir.join(relative);
                    match obj_files.get(&path) {
                        Some(id) => *id,
                        None => {
                            let content = std::fs::read_to_string(&path)
                                .with_context(|| format!("Failed to read OBJ file {:?}", path))?;
                            let id = scene
                                .meshes
                                .insert_obj(&object.name, &content)
                                .map_err(|e| anyhow!("{:?}: {}", path, e))?;
                            obj_files.insert(path, id);
                            id
                        }
                    }
                }
            };

            let mut entry = SceneEntry::new(&object.name, mesh);
            entry.transform = object.transform();
            entry.color = object.color;
            entry.visible = object.visible;
            entry.settings = object.settings();
            scene.add(entry);
        }

        log::info!(
            "Loaded scene with {} objects and {} meshes",
            scene.len(),
            scene.meshes.len()
        );
        Ok(scene)
    }
}
