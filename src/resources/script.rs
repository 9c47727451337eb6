//! Script resources.
//!
//! Scripts pass through the pipeline as validated UTF-8 text; the scripting
//! runtime that executes them is an external collaborator.

use crate::errors::Result;
use crate::fastfile::{FastfileReader, FastfileWriter};
use crate::resources::SourceRef;

#[derive(Debug, Clone)]
pub struct Script {
    pub name: String,
    pub text: String,
    pub source: Option<SourceRef>,
}

impl Script {
    /// Empty script stand-in; running it is a no-op.
    #[must_use]
    pub fn fallback(name: &str) -> Self {
        Self {
            name: name.to_string(),
            text: String::new(),
            source: None,
        }
    }

    pub fn serialize(&self, w: &mut FastfileWriter) {
        w.write_str(&self.name);
        w.write_str(&self.text);
    }

    pub fn deserialize(r: &mut FastfileReader<'_>) -> Result<Self> {
        let name = r.read_str()?;
        let text = r.read_str()?;
        Ok(Self {
            name,
            text,
            source: None,
        })
    }
}
