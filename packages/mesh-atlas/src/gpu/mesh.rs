//! Vertex layout and the per-mesh GPU buffer cache.

use std::collections::HashMap;

use bytemuck::{Pod, Zeroable};
use wgpu::util::DeviceExt;

use crate::mesh_asset::{MeshAsset, MeshId};

#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub color: [f32; 3],
}

impl Vertex {
    pub const fn new(position: [f32; 3], normal: [f32; 3], color: [f32; 3]) -> Self {
        Self { position, normal, color }
    }

    const ATTRIBS: [wgpu::VertexAttribute; 3] =
        wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x3, 2 => Float32x3];

    pub fn desc() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<Vertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRIBS,
        }
    }
}

/// Draw-ready buffers for one mesh.
pub struct MeshBuffers {
    pub vertex_buffer: wgpu::Buffer,
    pub index_buffer: wgpu::Buffer,
    pub num_indices: u32,
}

/// Vertex/index buffers keyed by mesh, built on first use.
///
/// Entries are only dropped through [`MeshBufferCache::invalidate`],
/// [`MeshBufferCache::prune`] or [`MeshBufferCache::clear`]; meshes deleted by
/// the host keep their buffers until the host prunes them.
#[derive(Default)]
pub struct MeshBufferCache {
    buffers: HashMap<MeshId, MeshBuffers>,
}

impl MeshBufferCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upload `asset` unless buffers for its id already exist.
    pub fn ensure(&mut self, device: &wgpu::Device, asset: &MeshAsset) {
        if self.buffers.contains_key(&asset.id) {
            return;
        }

        log::debug!(
            "Building buffers for mesh {:?} ({} vertices, {} triangles)",
            asset.id,
            asset.vertices.len(),
            asset.triangle_count()
        );

        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("Mesh Vertex Buffer: {}", asset.name)),
            contents: bytemuck::cast_slice(&asset.vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("Mesh Index Buffer: {}", asset.name)),
            contents: bytemuck::cast_slice(&asset.indices),
            usage: wgpu::BufferUsages::INDEX,
        });

        self.buffers.insert(asset.id, MeshBuffers {
            vertex_buffer,
            index_buffer,
            num_indices: asset.indices.len() as u32,
        });
    }

    pub fn get(&self, id: MeshId) -> Option<&MeshBuffers> {
        self.buffers.get(&id)
    }

    /// Drop the buffers of a mesh whose geometry changed; they are rebuilt on
    /// the next frame that draws it.
    pub fn invalidate(&mut self, id: MeshId) -> bool {
        self.buffers.remove(&id).is_some()
    }

    /// Drop buffers for every mesh not in `live`. Returns how many were removed.
    pub fn prune(&mut self, live: impl IntoIterator<Item = MeshId>) -> usize {
        let live: std::collections::HashSet<MeshId> = live.into_iter().collect();
        let before = self.buffers.len();
        self.buffers.retain(|id, _| live.contains(id));
        before - self.buffers.len()
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }
}
