//! Runtime resource types.
//!
//! A resource is addressed by a `(kind, name)` pair: names are unique within
//! a kind, and the allocation behind a published resource never moves (see
//! [`crate::database`]). Each concrete type knows how to encode itself into
//! a fastfile payload and how to decode one back, and carries enough source
//! information to answer "has my source file changed?" during a scan cycle.

pub mod material;
pub mod model;
pub mod script;
pub mod shader;
pub mod texture;

pub use material::Material;
pub use model::{Model, Vertex};
pub use script::Script;
pub use shader::{Shader, ShaderStage};
pub use texture::{FilterMode, PixelFormat, SamplerDesc, Texture, WrapMode};

use crate::convert::stamp::TimestampedFile;
use crate::errors::Result;
use crate::manifest::ResourceDecl;

/// Stable type tag for a resource, assigned at registration and fixed for
/// the process lifetime. Section order in composite fastfiles and the
/// soft-link resolve order both follow the declaration order here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKind {
    Shader,
    Texture,
    Material,
    Model,
    Script,
}

impl ResourceKind {
    /// All kinds, in the fixed dependency order.
    pub const ALL: [ResourceKind; 5] = [
        ResourceKind::Shader,
        ResourceKind::Texture,
        ResourceKind::Material,
        ResourceKind::Model,
        ResourceKind::Script,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ResourceKind::Shader => "shader",
            ResourceKind::Texture => "texture",
            ResourceKind::Material => "material",
            ResourceKind::Model => "model",
            ResourceKind::Script => "script",
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a loaded resource came from: its declaration plus the timestamps
/// its cache artifact was derived from. Resources declared inline in a
/// manifest (materials without a `filename`) have no source of their own;
/// manifest-change handling covers them.
#[derive(Debug, Clone)]
pub struct SourceRef {
    pub decl: ResourceDecl,
    pub dependencies: Vec<TimestampedFile>,
}

impl SourceRef {
    /// Re-stats every dependency and compares against the recorded stamps.
    /// `Ok(true)` iff any dependency changed (including appearing or
    /// disappearing). I/O failures propagate as `Checking` errors so the
    /// scanner can treat them as "retry next cycle".
    pub fn any_dependency_changed(&self) -> Result<bool> {
        for recorded in &self.dependencies {
            let mut fresh = recorded.clone();
            if fresh.update()? {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

/// Uniform access to a resource's source record, so the scanner can walk
/// every kind with one code path.
pub trait Reloadable {
    fn source_ref(&self) -> Option<&SourceRef>;
}

macro_rules! impl_reloadable {
    ($($ty:ty),+) => {
        $(impl Reloadable for $ty {
            fn source_ref(&self) -> Option<&SourceRef> {
                self.source.as_ref()
            }
        })+
    };
}

impl_reloadable!(Shader, Texture, Material, Model, Script);
