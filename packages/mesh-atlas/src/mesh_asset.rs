//! Mesh asset loading and management.
//!
//! Meshes come either from the built-in primitives or from Wavefront OBJ
//! content. OBJ normals are used when present and generated otherwise, using
//! area-weighted averaging of adjacent face normals.

use std::collections::HashMap;
use std::sync::Arc;

use crate::gpu::mesh::Vertex;

/// Stable identity of a mesh in the asset registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MeshId(pub u64);

/// Triangle geometry ready for upload.
#[derive(Debug, Clone)]
pub struct MeshAsset {
    pub id: MeshId,
    pub name: String,
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
}

impl MeshAsset {
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }
}

/// Built-in primitive shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Primitive {
    Cube,
    Plane,
    Sphere,
}

impl Primitive {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "cube" => Some(Primitive::Cube),
            "plane" => Some(Primitive::Plane),
            "sphere" => Some(Primitive::Sphere),
            _ => None,
        }
    }

    pub fn geometry(self) -> (Vec<Vertex>, Vec<u32>) {
        match self {
            Primitive::Cube => create_cube_geometry(),
            Primitive::Plane => create_plane_geometry(),
            Primitive::Sphere => create_sphere_geometry(),
        }
    }
}

/// Parse OBJ content into vertices and triangle indices.
///
/// All models in the file are merged into one mesh.
pub fn parse_obj(obj_content: &str) -> Result<(Vec<Vertex>, Vec<u32>), String> {
    let mut cursor = std::io::Cursor::new(obj_content.as_bytes());

    let load_options = tobj::LoadOptions {
        triangulate: true,
        single_index: true,
        ..Default::default()
    };

    let (models, _materials) = tobj::load_obj_buf(
        &mut cursor,
        &load_options,
        |_| Ok((vec![], HashMap::new())),
    )
    .map_err(|e| format!("Failed to parse OBJ: {}", e))?;

    if models.is_empty() {
        return Err("OBJ file contains no models".to_string());
    }

    let mut positions: Vec<[f32; 3]> = Vec::new();
    let mut normals: Vec<[f32; 3]> = Vec::new();
    let mut indices = Vec::new();
    let mut has_normals = true;

    for model in &models {
        let mesh = &model.mesh;
        if mesh.positions.is_empty() {
            continue;
        }

        let vertex_offset = positions.len() as u32;
        let model_has_normals = mesh.normals.len() == mesh.positions.len();
        has_normals &= model_has_normals;

        for (i, p) in mesh.positions.chunks_exact(3).enumerate() {
            positions.push([p[0], p[1], p[2]]);
            if model_has_normals {
                let n = &mesh.normals[i * 3..i * 3 + 3];
                normals.push([n[0], n[1], n[2]]);
            }
        }

        indices.extend(mesh.indices.iter().map(|idx| vertex_offset + idx));
    }

    if positions.is_empty() {
        return Err("OBJ file contains no vertices".to_string());
    }

    let normals = if has_normals && normals.len() == positions.len() {
        normals
    } else {
        compute_vertex_normals(&positions, &indices)
    };

    let vertices = positions
        .iter()
        .zip(normals.iter())
        .map(|(position, normal)| Vertex::new(*position, *normal, [1.0; 3]))
        .collect();

    Ok((vertices, indices))
}

/// Compute area-weighted vertex normals from face normals.
fn compute_vertex_normals(positions: &[[f32; 3]], indices: &[u32]) -> Vec<[f32; 3]> {
    let mut normals = vec![glam::Vec3::ZERO; positions.len()];

    for tri in indices.chunks_exact(3) {
        let [i0, i1, i2] = [tri[0] as usize, tri[1] as usize, tri[2] as usize];
        if i0 >= positions.len() || i1 >= positions.len() || i2 >= positions.len() {
            continue;
        }

        let p0 = glam::Vec3::from(positions[i0]);
        let p1 = glam::Vec3::from(positions[i1]);
        let p2 = glam::Vec3::from(positions[i2]);

        // Unnormalized: magnitude is twice the triangle area
        let face_normal = (p1 - p0).cross(p2 - p0);
        for idx in [i0, i1, i2] {
            normals[idx] += face_normal;
        }
    }

    normals
        .into_iter()
        .map(|n| n.try_normalize().unwrap_or(glam::Vec3::Y).to_array())
        .collect()
}

/// Unit cube centered at origin with per-face normals.
pub fn create_cube_geometry() -> (Vec<Vertex>, Vec<u32>) {
    let faces: [([f32; 3], [f32; 3], [f32; 3]); 6] = [
        // (normal, u axis, v axis)
        ([0.0, 0.0, 1.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
        ([0.0, 0.0, -1.0], [-1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
        ([0.0, 1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, -1.0]),
        ([0.0, -1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]),
        ([1.0, 0.0, 0.0], [0.0, 0.0, -1.0], [0.0, 1.0, 0.0]),
        ([-1.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 1.0, 0.0]),
    ];

    let mut vertices = Vec::with_capacity(24);
    let mut indices = Vec::with_capacity(36);

    for (normal, u, v) in faces {
        let n = glam::Vec3::from(normal);
        let u = glam::Vec3::from(u);
        let v = glam::Vec3::from(v);
        let base = vertices.len() as u32;

        for (su, sv) in [(-0.5, -0.5), (0.5, -0.5), (0.5, 0.5), (-0.5, 0.5)] {
            let position = n * 0.5 + u * su + v * sv;
            vertices.push(Vertex::new(position.to_array(), normal, [1.0; 3]));
        }
        indices.extend_from_slice(&[base, base + 1, base + 2, base + 2, base + 3, base]);
    }

    (vertices, indices)
}

/// Unit plane in the XZ plane (Y up), centered at origin.
pub fn create_plane_geometry() -> (Vec<Vertex>, Vec<u32>) {
    let up = [0.0, 1.0, 0.0];
    let vertices = vec![
        Vertex::new([-0.5, 0.0, 0.5], up, [1.0; 3]),
        Vertex::new([0.5, 0.0, 0.5], up, [1.0; 3]),
        Vertex::new([0.5, 0.0, -0.5], up, [1.0; 3]),
        Vertex::new([-0.5, 0.0, -0.5], up, [1.0; 3]),
    ];
    let indices = vec![0, 1, 2, 2, 3, 0];

    (vertices, indices)
}

/// UV sphere centered at origin with radius 0.5.
/// Uses 16 latitude rings and 32 longitude segments.
pub fn create_sphere_geometry() -> (Vec<Vertex>, Vec<u32>) {
    let lat_segments = 16u32;
    let lon_segments = 32u32;
    let radius = 0.5;

    let mut vertices = Vec::new();
    let mut indices = Vec::new();

    for lat in 0..=lat_segments {
        let theta = std::f32::consts::PI * (lat as f32) / (lat_segments as f32);
        for lon in 0..=lon_segments {
            let phi = 2.0 * std::f32::consts::PI * (lon as f32) / (lon_segments as f32);
            let normal = [phi.cos() * theta.sin(), theta.cos(), phi.sin() * theta.sin()];
            let position = [normal[0] * radius, normal[1] * radius, normal[2] * radius];
            vertices.push(Vertex::new(position, normal, [1.0; 3]));
        }
    }

    for lat in 0..lat_segments {
        for lon in 0..lon_segments {
            let first = lat * (lon_segments + 1) + lon;
            let second = first + lon_segments + 1;

            // Counter-clockwise seen from outside
            indices.extend_from_slice(&[first, first + 1, second]);
            indices.extend_from_slice(&[second, first + 1, second + 1]);
        }
    }

    (vertices, indices)
}

/// Registry of mesh assets, shared between scene objects.
#[derive(Debug, Default)]
pub struct MeshAssetRegistry {
    assets: HashMap<MeshId, Arc<MeshAsset>>,
    next_id: u64,
}

impl MeshAssetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register geometry under a fresh id.
    pub fn insert(&mut self, name: &str, vertices: Vec<Vertex>, indices: Vec<u32>) -> MeshId {
        self.next_id += 1;
        let id = MeshId(self.next_id);
        self.assets.insert(id, Arc::new(MeshAsset { id, name: name.to_string(), vertices, indices }));
        id
    }

    pub fn insert_primitive(&mut self, primitive: Primitive) -> MeshId {
        let (vertices, indices) = primitive.geometry();
        self.insert(&format!("{:?}", primitive).to_lowercase(), vertices, indices)
    }

    pub fn insert_obj(&mut self, name: &str, obj_content: &str) -> Result<MeshId, String> {
        let (vertices, indices) = parse_obj(obj_content)?;
        Ok(self.insert(name, vertices, indices))
    }

    /// Replace the geometry of an existing mesh, keeping its id.
    ///
    /// Callers must tell the pipeline via `notify_mesh_changed` so cached GPU
    /// buffers are rebuilt.
    pub fn replace(&mut self, id: MeshId, vertices: Vec<Vertex>, indices: Vec<u32>) -> bool {
        let Some(existing) = self.assets.get(&id) else {
            return false;
        };
        let name = existing.name.clone();
        self.assets.insert(id, Arc::new(MeshAsset { id, name, vertices, indices }));
        true
    }

    pub fn get(&self, id: MeshId) -> Option<&Arc<MeshAsset>> {
        self.assets.get(&id)
    }

    pub fn remove(&mut self, id: MeshId) -> bool {
        self.assets.remove(&id).is_some()
    }

    pub fn ids(&self) -> impl Iterator<Item = MeshId> + '_ {
        self.assets.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_obj_parsing() {
        let obj_content = r#"
            v 0 0 0
            v 1 0 0
            v 0 1 0
            f 1 2 3
        "#;

        let (vertices, indices) = parse_obj(obj_content).unwrap();
        assert_eq!(vertices.len(), 3);
        assert_eq!(indices, vec![0, 1, 2]);
        // Generated normal faces +Z for a CCW triangle in the XY plane
        assert!((vertices[0].normal[2] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_obj_without_vertices_fails() {
        assert!(parse_obj("# empty\n").is_err());
    }

    #[test]
    fn test_primitive_geometry_indices_in_range() {
        for primitive in [Primitive::Cube, Primitive::Plane, Primitive::Sphere] {
            let (vertices, indices) = primitive.geometry();
            assert_eq!(indices.len() % 3, 0);
            assert!(indices.iter().all(|&i| (i as usize) < vertices.len()));
        }
    }

    #[test]
    fn test_cube_faces_point_outward() {
        let (vertices, _) = create_cube_geometry();
        assert_eq!(vertices.len(), 24);
        for v in &vertices {
            let p = glam::Vec3::from(v.position);
            let n = glam::Vec3::from(v.normal);
            assert!((p.dot(n) - 0.5).abs() < 1e-6);
        }
    }

    #[test]
    fn test_registry_ids_and_replace() {
        let mut registry = MeshAssetRegistry::new();
        let cube = registry.insert_primitive(Primitive::Cube);
        let plane = registry.insert_primitive(Primitive::Plane);
        assert_ne!(cube, plane);
        assert_eq!(registry.get(cube).unwrap().name, "cube");

        let (vertices, indices) = create_plane_geometry();
        assert!(registry.replace(cube, vertices, indices));
        assert_eq!(registry.get(cube).unwrap().triangle_count(), 2);
        assert_eq!(registry.get(cube).unwrap().name, "cube");

        assert!(registry.remove(plane));
        assert!(!registry.replace(plane, vec![], vec![]));
        assert_eq!(registry.len(), 1);
    }
}
