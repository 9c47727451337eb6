pub mod convert;
pub mod database;
pub mod errors;
pub mod fastfile;
pub mod hotreload;
pub mod manager;
pub mod manifest;
pub mod resources;
pub mod settings;

pub use convert::composite::CompositeConverter;
pub use convert::{converter_for, AssetStatus, ConvertStatus, Converter};
pub use database::{Handle, ResourceDatabase, ResourceType};
pub use errors::{KilnError, Result};
pub use hotreload::scanner::Scanner;
pub use hotreload::StagedBatch;
pub use manager::ResourceManager;
pub use manifest::{parse_manifest, Manifest, ResourceDecl};
pub use resources::{Material, Model, ResourceKind, Script, Shader, Texture};
pub use settings::PipelineSettings;
