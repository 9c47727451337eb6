//! Shader resources.
//!
//! The "compiled" payload is the preprocessed source text produced by
//! [`ShaderConverter`](crate::convert::shader::ShaderConverter); actual GPU
//! compilation belongs to the renderer, which is an external collaborator.

use crate::errors::{KilnError, Result};
use crate::fastfile::{FastfileReader, FastfileWriter};
use crate::resources::SourceRef;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ShaderStage {
    #[default]
    Vertex,
    Fragment,
    Compute,
}

impl ShaderStage {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ShaderStage::Vertex => "vertex",
            ShaderStage::Fragment => "fragment",
            ShaderStage::Compute => "compute",
        }
    }

    pub(crate) fn to_tag(self) -> u8 {
        match self {
            ShaderStage::Vertex => 0,
            ShaderStage::Fragment => 1,
            ShaderStage::Compute => 2,
        }
    }

    pub(crate) fn from_tag(tag: u8, label: &str) -> Result<Self> {
        match tag {
            0 => Ok(ShaderStage::Vertex),
            1 => Ok(ShaderStage::Fragment),
            2 => Ok(ShaderStage::Compute),
            other => Err(KilnError::Load {
                name: label.to_string(),
                message: format!("unknown shader stage tag {other}"),
            }),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Shader {
    pub name: String,
    pub stage: ShaderStage,
    /// Preprocessed source, comments stripped, ready to hand to the
    /// graphics backend.
    pub compiled: String,
    pub source: Option<SourceRef>,
}

impl Shader {
    /// Empty-source stand-in; the renderer treats an empty shader as
    /// pass-through.
    #[must_use]
    pub fn fallback(name: &str) -> Self {
        Self {
            name: name.to_string(),
            stage: ShaderStage::default(),
            compiled: String::new(),
            source: None,
        }
    }

    pub fn serialize(&self, w: &mut FastfileWriter) {
        w.write_str(&self.name);
        w.write_u8(self.stage.to_tag());
        w.write_str(&self.compiled);
    }

    pub fn deserialize(r: &mut FastfileReader<'_>) -> Result<Self> {
        let name = r.read_str()?;
        let stage = ShaderStage::from_tag(r.read_u8()?, &name)?;
        let compiled = r.read_str()?;
        Ok(Self {
            name,
            stage,
            compiled,
            source: None,
        })
    }
}
