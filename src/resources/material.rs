//! Material resources.
//!
//! A material's texture reference is a *soft link*: the description file
//! names the texture, and the name is resolved to a live handle in the
//! post-merge resolve pass ([`crate::hotreload::resolve`]). Until then (or
//! when the target is missing) `diffuse_texture` stays unbound and the
//! renderer falls back to the flat diffuse color.

use glam::Vec4;

use crate::database::Handle;
use crate::errors::Result;
use crate::fastfile::{FastfileReader, FastfileWriter};
use crate::resources::{SourceRef, Texture};

#[derive(Debug, Clone)]
pub struct Material {
    pub name: String,
    pub diffuse: Vec4,
    pub specular: Vec4,
    pub shininess: f32,
    pub opacity: f32,
    /// Soft link: the *name* of the diffuse texture, from the description
    /// file. Survives serialization.
    pub diffuse_map: Option<String>,
    /// Resolved binding for `diffuse_map`. Never serialized; rebuilt by the
    /// resolver after every merge.
    pub diffuse_texture: Option<Handle<Texture>>,
    pub source: Option<SourceRef>,
}

impl Material {
    /// Untextured mid-grey stand-in.
    #[must_use]
    pub fn fallback(name: &str) -> Self {
        Self {
            name: name.to_string(),
            diffuse: Vec4::new(0.5, 0.5, 0.5, 1.0),
            specular: Vec4::ZERO,
            shininess: 0.0,
            opacity: 1.0,
            diffuse_map: None,
            diffuse_texture: None,
            source: None,
        }
    }

    /// Whether the soft link still needs resolving.
    #[must_use]
    pub fn has_unresolved_link(&self) -> bool {
        self.diffuse_map.is_some() && self.diffuse_texture.is_none()
    }

    pub fn serialize(&self, w: &mut FastfileWriter) {
        w.write_str(&self.name);
        for c in self.diffuse.to_array() {
            w.write_f32(c);
        }
        for c in self.specular.to_array() {
            w.write_f32(c);
        }
        w.write_f32(self.shininess);
        w.write_f32(self.opacity);
        w.write_str(self.diffuse_map.as_deref().unwrap_or(""));
    }

    pub fn deserialize(r: &mut FastfileReader<'_>) -> Result<Self> {
        let name = r.read_str()?;
        let diffuse = Vec4::new(r.read_f32()?, r.read_f32()?, r.read_f32()?, r.read_f32()?);
        let specular = Vec4::new(r.read_f32()?, r.read_f32()?, r.read_f32()?, r.read_f32()?);
        let shininess = r.read_f32()?;
        let opacity = r.read_f32()?;
        let map = r.read_str()?;
        Ok(Self {
            name,
            diffuse,
            specular,
            shininess,
            opacity,
            diffuse_map: (!map.is_empty()).then_some(map),
            diffuse_texture: None,
            source: None,
        })
    }
}
