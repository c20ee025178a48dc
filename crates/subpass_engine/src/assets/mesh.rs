//! Mesh import and upload
//!
//! Every model in a file is flattened into one vertex range and one index
//! range. Sub-meshes do not keep their own materials.

use bytemuck::{Pod, Zeroable};
use std::path::Path;

use ash::vk;

use super::{AssetError, AssetResult};
use crate::render::vulkan::{ActiveRenderPass, Region};
use crate::render::RenderContext;

/// Interleaved vertex as the mesh shaders read it
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    /// Object-space position
    pub position: [f32; 3],
    /// Object-space normal
    pub normal: [f32; 3],
    /// Texture coordinate
    pub uv: [f32; 2],
}

/// Float counts of the vertex attributes in declaration order
pub const VERTEX_ATTRIBUTE_WIDTHS: [u32; 3] = [3, 3, 2];

/// Imported vertex and index data, not yet on the GPU
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshData {
    /// Flattened vertices
    pub vertices: Vec<Vertex>,
    /// Triangle list indices into `vertices`
    pub indices: Vec<u32>,
}

impl MeshData {
    /// Append one imported mesh, rebasing its indices past the current vertices
    pub fn append(&mut self, mesh: &tobj::Mesh) {
        let base = self.vertices.len() as u32;
        let vertex_count = mesh.positions.len() / 3;

        self.vertices.extend((0..vertex_count).map(|i| {
            let normal = if mesh.normals.len() >= 3 * (i + 1) {
                [mesh.normals[3 * i], mesh.normals[3 * i + 1], mesh.normals[3 * i + 2]]
            } else {
                [0.0; 3]
            };
            let uv = if mesh.texcoords.len() >= 2 * (i + 1) {
                [mesh.texcoords[2 * i], 1.0 - mesh.texcoords[2 * i + 1]]
            } else {
                [0.0; 2]
            };
            Vertex {
                position: [mesh.positions[3 * i], mesh.positions[3 * i + 1], mesh.positions[3 * i + 2]],
                normal,
                uv,
            }
        }));
        self.indices.extend(mesh.indices.iter().map(|&index| base + index));
    }

    /// Flatten all meshes of one file
    pub fn from_meshes<'a>(meshes: impl IntoIterator<Item = &'a tobj::Mesh>) -> Self {
        let mut data = Self::default();
        for mesh in meshes {
            data.append(mesh);
        }
        data
    }

    /// Import a Wavefront OBJ file
    pub fn import_obj(path: impl AsRef<Path>) -> AssetResult<Self> {
        let path = path.as_ref();
        let options = tobj::LoadOptions {
            single_index: true,
            triangulate: true,
            ..Default::default()
        };
        let (models, _materials) = tobj::load_obj(path, &options).map_err(|e| AssetError::MeshImport {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        if models.is_empty() {
            return Err(AssetError::MeshImport {
                path: path.display().to_string(),
                reason: "file contains no meshes".to_string(),
            });
        }

        let data = Self::from_meshes(models.iter().map(|model| &model.mesh));
        log::info!(
            "Imported {}: {} models, {} vertices, {} indices",
            path.display(),
            models.len(),
            data.vertices.len(),
            data.indices.len()
        );
        Ok(data)
    }
}

/// Mesh resident in the device-local buffer
#[derive(Debug, Clone, Copy)]
pub struct Mesh {
    /// Vertex data
    pub vertex_region: Region,
    /// `u32` index data
    pub index_region: Region,
    /// Number of indices
    pub index_count: u32,
}

impl Mesh {
    /// Copy `data` into new device regions through the staging path
    pub fn upload(context: &mut RenderContext, data: &MeshData) -> AssetResult<Self> {
        let vertex_bytes: &[u8] = bytemuck::cast_slice(&data.vertices);
        let index_bytes: &[u8] = bytemuck::cast_slice(&data.indices);

        let vertex_region = context.allocate_device_region(vertex_bytes.len() as vk::DeviceSize, 16)?;
        let index_region = context.allocate_device_region(index_bytes.len() as vk::DeviceSize, 16)?;
        context.write_to_device_region(&vertex_region, vertex_bytes, 0)?;
        context.write_to_device_region(&index_region, index_bytes, 0)?;

        Ok(Self {
            vertex_region,
            index_region,
            index_count: data.indices.len() as u32,
        })
    }

    /// Bind this mesh's buffers and draw `instance_count` instances
    pub fn draw(&self, pass: &mut ActiveRenderPass<'_>, instance_count: u32) {
        pass.bind_vertex_buffers(0, &[self.vertex_region.buffer], &[self.vertex_region.offset]);
        pass.bind_index_buffer(self.index_region.buffer, self.index_region.offset);
        pass.draw_indexed(self.index_count, instance_count, 0, 0, 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn triangle(offset: f32) -> tobj::Mesh {
        tobj::Mesh {
            positions: vec![offset, 0.0, 0.0, offset + 1.0, 0.0, 0.0, offset, 1.0, 0.0],
            normals: vec![0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0],
            texcoords: vec![0.0, 0.0, 1.0, 0.0, 0.0, 0.25],
            indices: vec![0, 1, 2],
            ..Default::default()
        }
    }

    #[test]
    fn test_vertex_is_tightly_packed() {
        let widths: u32 = VERTEX_ATTRIBUTE_WIDTHS.iter().sum();
        assert_eq!(std::mem::size_of::<Vertex>(), widths as usize * 4);
    }

    #[test]
    fn test_models_flatten_into_one_range() {
        let meshes = [triangle(0.0), triangle(5.0)];
        let data = MeshData::from_meshes(meshes.iter());

        assert_eq!(data.vertices.len(), 6);
        assert_eq!(data.indices, vec![0, 1, 2, 3, 4, 5]);
        assert_relative_eq!(data.vertices[3].position[0], 5.0);
    }

    #[test]
    fn test_v_is_flipped() {
        let data = MeshData::from_meshes([triangle(0.0)].iter());
        assert_relative_eq!(data.vertices[0].uv[1], 1.0);
        assert_relative_eq!(data.vertices[2].uv[1], 0.75);
    }

    #[test]
    fn test_missing_attributes_default_to_zero() {
        let mesh = tobj::Mesh {
            positions: vec![1.0, 2.0, 3.0],
            indices: vec![0],
            ..Default::default()
        };
        let data = MeshData::from_meshes([mesh].iter());
        assert_eq!(data.vertices[0].normal, [0.0; 3]);
        assert_eq!(data.vertices[0].uv, [0.0; 2]);
        assert_eq!(data.vertices[0].position, [1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_import_missing_file_fails() {
        assert!(matches!(
            MeshData::import_obj("no/such/mesh.obj"),
            Err(AssetError::MeshImport { .. })
        ));
    }

    #[test]
    fn test_import_obj_file() {
        let dir = std::env::temp_dir().join(format!("subpass_engine_mesh_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("quad.obj");
        std::fs::write(
            &path,
            "v 0 0 0\nv 1 0 0\nv 1 1 0\nv 0 1 0\nvt 0 0\nvt 1 0\nvt 1 1\nvt 0 1\nvn 0 0 1\n\
             f 1/1/1 2/2/1 3/3/1 4/4/1\n",
        )
        .unwrap();

        let data = MeshData::import_obj(&path).unwrap();
        assert_eq!(data.vertices.len(), 4);
        // The quad is triangulated.
        assert_eq!(data.indices.len(), 6);
        assert!(data.vertices.iter().all(|v| v.normal == [0.0, 0.0, 1.0]));

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
