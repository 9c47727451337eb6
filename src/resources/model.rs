//! Model (mesh) resources.
//!
//! Vertex data is a flat, GPU-upload-ready buffer; `Vertex` is `Pod` so the
//! fastfile codec can cast the whole slice to bytes in one go instead of
//! walking fields.

use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3};

use crate::database::Handle;
use crate::errors::{KilnError, Result};
use crate::fastfile::{FastfileReader, FastfileWriter};
use crate::resources::{Material, SourceRef};

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: Vec3,
    pub normal: Vec3,
    pub uv: Vec2,
}

#[derive(Debug, Clone)]
pub struct Model {
    pub name: String,
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
    /// Soft link: material name from the OBJ's `usemtl` (or the description
    /// file).
    pub material_name: Option<String>,
    /// Resolved binding for `material_name`; never serialized.
    pub material: Option<Handle<Material>>,
    pub source: Option<SourceRef>,
}

impl Model {
    /// Empty mesh stand-in: zero vertices, draws nothing, dereferences
    /// nothing.
    #[must_use]
    pub fn fallback(name: &str) -> Self {
        Self {
            name: name.to_string(),
            vertices: Vec::new(),
            indices: Vec::new(),
            material_name: None,
            material: None,
            source: None,
        }
    }

    #[must_use]
    pub fn has_unresolved_link(&self) -> bool {
        self.material_name.is_some() && self.material.is_none()
    }

    pub fn serialize(&self, w: &mut FastfileWriter) {
        w.write_str(&self.name);
        w.write_u32(self.vertices.len() as u32);
        w.write_bytes(bytemuck::cast_slice(&self.vertices));
        w.write_u32(self.indices.len() as u32);
        w.write_bytes(bytemuck::cast_slice(&self.indices));
        w.write_str(self.material_name.as_deref().unwrap_or(""));
    }

    pub fn deserialize(r: &mut FastfileReader<'_>) -> Result<Self> {
        let name = r.read_str()?;

        let vertex_count = r.read_u32()? as usize;
        let vertex_bytes = r.read_bytes()?;
        if vertex_bytes.len() != vertex_count * std::mem::size_of::<Vertex>() {
            return Err(KilnError::Load {
                name,
                message: format!(
                    "vertex payload is {} bytes, expected {} vertices",
                    vertex_bytes.len(),
                    vertex_count
                ),
            });
        }
        let vertices: Vec<Vertex> = bytemuck::cast_slice(&vertex_bytes).to_vec();

        let index_count = r.read_u32()? as usize;
        let index_bytes = r.read_bytes()?;
        if index_bytes.len() != index_count * std::mem::size_of::<u32>() {
            return Err(KilnError::Load {
                name,
                message: format!(
                    "index payload is {} bytes, expected {} indices",
                    index_bytes.len(),
                    index_count
                ),
            });
        }
        let indices: Vec<u32> = bytemuck::cast_slice(&index_bytes).to_vec();

        let material_name = r.read_str()?;
        Ok(Self {
            name,
            vertices,
            indices,
            material_name: (!material_name.is_empty()).then_some(material_name),
            material: None,
            source: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vertex_payload_round_trip() {
        let model = Model {
            name: "tri".to_string(),
            vertices: vec![
                Vertex {
                    position: Vec3::new(0.0, 0.0, 0.0),
                    normal: Vec3::Z,
                    uv: Vec2::ZERO,
                },
                Vertex {
                    position: Vec3::new(1.0, 0.0, 0.0),
                    normal: Vec3::Z,
                    uv: Vec2::X,
                },
                Vertex {
                    position: Vec3::new(0.0, 1.0, 0.0),
                    normal: Vec3::Z,
                    uv: Vec2::Y,
                },
            ],
            indices: vec![0, 1, 2],
            material_name: Some("wall".to_string()),
            material: None,
            source: None,
        };

        let mut w = FastfileWriter::section();
        model.serialize(&mut w);
        let bytes = w.into_bytes();

        let back = Model::deserialize(&mut FastfileReader::section(&bytes, "tri")).unwrap();
        assert_eq!(back.vertices, model.vertices);
        assert_eq!(back.indices, model.indices);
        assert_eq!(back.material_name.as_deref(), Some("wall"));
    }
}
