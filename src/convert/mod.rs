//! Converter Framework
//!
//! A converter turns one authored source asset into a cached, load-ready
//! fastfile artifact. The public contract is two operations, always called
//! in this order:
//!
//! 1. [`Converter::check_dependencies`]: recomputes the cache key, stats
//!    every dependency and reports [`AssetStatus`]. Cheap; produced fresh
//!    on every call, never cached.
//! 2. [`Converter::convert`]: no-op when up to date (unless forced),
//!    otherwise runs the kind-specific transform and writes the artifact.
//!    A failure mid-write deletes the partial file, so a crashed conversion
//!    can never be mistaken for up-to-date later.
//!
//! The cache key hashes the absolute source path *and* every conversion
//! parameter that affects output bytes, so editing parameters invalidates
//! the cache exactly like editing content. Per-kind converters live in the
//! sibling modules and are dispatched through a small registry of trait
//! objects ([`converter_for`]).

pub mod composite;
pub mod material;
pub mod model;
pub mod script;
pub mod shader;
pub mod stamp;
pub mod texture;

use std::path::{Path, PathBuf};

use xxhash_rust::xxh3::xxh3_64;

use crate::database::ResourceDatabase;
use crate::errors::{KilnError, Result};
use crate::manifest::ResourceDecl;
use crate::resources::{ResourceKind, SourceRef};
use crate::settings::PipelineSettings;
use stamp::TimestampedFile;

// ============================================================================
// Status types
// ============================================================================

/// Result of a dependency check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetStatus {
    /// Cache artifact exists and is newer than every dependency.
    UpToDate,
    /// Artifact missing, or some dependency is newer.
    OutOfDate,
    /// An I/O failure prevented checking. Treated as "assume stale, retry
    /// next cycle" by the scanner, and as a hard failure by the CLI.
    CheckingError,
}

/// Result of a conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConvertStatus {
    Success,
    /// Usage help was printed instead of converting (CLI path).
    HelpDisplayed,
    /// The source was malformed. Distinct from `Error` so tooling can
    /// report "fix your file" separately from "pipeline broke".
    ParseError,
    Error,
}

/// A manifest's dependency metadata: the stamps a check observed plus the
/// verdict. Recomputed on every `check_dependencies` call.
#[derive(Debug, Clone)]
pub struct ConvertHeader {
    pub dependencies: Vec<TimestampedFile>,
    pub status: AssetStatus,
}

// ============================================================================
// Converter trait & registry
// ============================================================================

/// One resource kind's conversion capability.
pub trait Converter: Send {
    fn kind(&self) -> ResourceKind;
    fn name(&self) -> &str;

    /// Stats the cache artifact against every declared dependency.
    fn check_dependencies(&mut self) -> AssetStatus;

    /// Converts if stale (or `force`), writing the cache artifact.
    fn convert(&mut self, force: bool) -> ConvertStatus;

    /// Turns the cache artifact into a live resource and stages it into
    /// `staging`. On failure the caller decides between propagating (initial
    /// load) and falling back to the kind's default (hot reload).
    fn load_into(&self, staging: &ResourceDatabase) -> Result<()>;

    /// The artifact's payload bytes (header stripped), for aggregation into
    /// a combined fastfile.
    fn artifact_payload(&self) -> Result<Vec<u8>>;

    /// Stages the kind's default stand-in under this converter's name, used
    /// when [`load_into`](Self::load_into) fails so the renderer never
    /// dereferences a missing resource.
    fn stage_fallback(&self, staging: &ResourceDatabase);
}

/// Instantiates the matching per-kind converter for a declaration.
///
/// This registry replaces the original engine's macro-expanded per-type
/// dispatch with plain trait objects.
#[must_use]
pub fn converter_for(
    decl: &ResourceDecl,
    manifest_path: &Path,
    settings: &PipelineSettings,
) -> Box<dyn Converter> {
    match decl {
        ResourceDecl::Shader(d) => Box::new(shader::ShaderConverter::new(d.clone(), settings)),
        ResourceDecl::Texture(d) => Box::new(texture::TextureConverter::new(d.clone(), settings)),
        ResourceDecl::Material(d) => Box::new(material::MaterialConverter::new(
            d.clone(),
            manifest_path,
            settings,
        )),
        ResourceDecl::Model(d) => Box::new(model::ModelConverter::new(d.clone(), settings)),
        ResourceDecl::Script(d) => Box::new(script::ScriptConverter::new(d.clone(), settings)),
    }
}

// ============================================================================
// Shared converter plumbing
// ============================================================================

/// Deterministic cache artifact path:
/// `cache_dir/<kind>/<basename>_<xxh3(abs_path, params)>.ffi`.
#[must_use]
pub fn cache_artifact_path(
    settings: &PipelineSettings,
    kind: ResourceKind,
    source: &Path,
    params: &str,
) -> PathBuf {
    let absolute = std::path::absolute(source).unwrap_or_else(|_| source.to_path_buf());
    let hash = xxh3_64(format!("{}|{params}", absolute.display()).as_bytes());
    let basename = source
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("asset");
    settings
        .cache_dir
        .join(kind.as_str())
        .join(format!("{basename}_{hash:016x}.ffi"))
}

/// The state shared by every per-kind converter: identity, dependency list,
/// cache path and the last observed status.
pub(crate) struct ConverterCore {
    pub kind: ResourceKind,
    pub name: String,
    pub dep_paths: Vec<PathBuf>,
    pub cache_path: PathBuf,
    pub status: AssetStatus,
}

impl ConverterCore {
    pub fn new(
        kind: ResourceKind,
        name: impl Into<String>,
        settings: &PipelineSettings,
        key_source: &Path,
        dep_paths: Vec<PathBuf>,
        params: &str,
    ) -> Self {
        Self {
            kind,
            name: name.into(),
            dep_paths,
            cache_path: cache_artifact_path(settings, kind, key_source, params),
            status: AssetStatus::OutOfDate,
        }
    }

    /// Fresh dependency check. Stores and returns the verdict; the stamps
    /// themselves are returned in the header for callers that want them.
    pub fn check(&mut self) -> ConvertHeader {
        let mut dependencies = Vec::with_capacity(self.dep_paths.len());
        for path in &self.dep_paths {
            match TimestampedFile::try_new(path) {
                Ok(stamp) => dependencies.push(stamp),
                Err(err) => {
                    log::warn!("{} \"{}\": {err}", self.kind, self.name);
                    self.status = AssetStatus::CheckingError;
                    return ConvertHeader {
                        dependencies,
                        status: AssetStatus::CheckingError,
                    };
                }
            }
        }

        let artifact = match TimestampedFile::try_new(&self.cache_path) {
            Ok(stamp) => stamp,
            Err(err) => {
                log::warn!("{} \"{}\": {err}", self.kind, self.name);
                self.status = AssetStatus::CheckingError;
                return ConvertHeader {
                    dependencies,
                    status: AssetStatus::CheckingError,
                };
            }
        };

        let stale = !artifact.is_valid()
            || dependencies
                .iter()
                .any(|dep| artifact.is_stale_relative_to(dep));
        self.status = if stale {
            AssetStatus::OutOfDate
        } else {
            AssetStatus::UpToDate
        };
        ConvertHeader {
            dependencies,
            status: self.status,
        }
    }

    /// Writes the artifact bytes, deleting any partial file on failure so a
    /// later check can never mistake it for up to date.
    pub fn write_artifact(&self, bytes: &[u8]) -> Result<()> {
        if let Some(parent) = self.cache_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        if let Err(err) = std::fs::write(&self.cache_path, bytes) {
            let _ = std::fs::remove_file(&self.cache_path);
            return Err(err.into());
        }
        Ok(())
    }

    /// Reads the artifact back and strips the fastfile header, leaving the
    /// resource payload.
    pub fn read_artifact_payload(&self) -> Result<Vec<u8>> {
        let bytes = std::fs::read(&self.cache_path).map_err(|err| KilnError::Load {
            name: self.name.clone(),
            message: format!("cannot read cache artifact: {err}"),
        })?;
        let reader =
            crate::fastfile::FastfileReader::new(&bytes, self.cache_path.display().to_string())?;
        Ok(reader.remaining_slice().to_vec())
    }

    /// Dependency stamps as observed right now, recorded into the staged
    /// resource so the scanner can later ask "did anything change?".
    pub fn source_ref(&self, decl: ResourceDecl) -> SourceRef {
        SourceRef {
            decl,
            dependencies: self.dep_paths.iter().map(TimestampedFile::new).collect(),
        }
    }

    /// Shared `convert` skeleton: skip when fresh, run the transform, map
    /// error taxonomy onto [`ConvertStatus`], clean up on failure.
    pub fn run_convert(
        &mut self,
        force: bool,
        transform: impl FnOnce() -> Result<Vec<u8>>,
    ) -> ConvertStatus {
        match self.status {
            AssetStatus::UpToDate if !force => return ConvertStatus::Success,
            AssetStatus::CheckingError => return ConvertStatus::Error,
            _ => {}
        }
        match transform() {
            Ok(bytes) => match self.write_artifact(&bytes) {
                Ok(()) => {
                    self.status = AssetStatus::UpToDate;
                    log::debug!(
                        "converted {} \"{}\" -> {}",
                        self.kind,
                        self.name,
                        self.cache_path.display()
                    );
                    ConvertStatus::Success
                }
                Err(err) => {
                    log::error!("{} \"{}\": {err}", self.kind, self.name);
                    ConvertStatus::Error
                }
            },
            Err(err @ KilnError::Parse { .. }) => {
                log::error!("{} \"{}\": {err}", self.kind, self.name);
                ConvertStatus::ParseError
            }
            Err(err) => {
                log::error!("{} \"{}\": {err}", self.kind, self.name);
                ConvertStatus::Error
            }
        }
    }
}
